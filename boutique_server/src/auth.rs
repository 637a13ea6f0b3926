//! Bearer-token authentication.
//!
//! The storefront backend holds the service key and mints short-lived signed tokens for its users; customers get
//! a `Customer` token scoped to their own id, back-office users a `Staff` token. Tokens are
//! `base64(payload).base64(hmac-sha256(payload))` with payload `customer_id:role:expiry`, verified on every
//! request by the [`AuthenticatedUser`] extractor. Privileged operations (ledger postings, shipment attachment,
//! marking orders paid) additionally require the staff role, so a customer credential can never grant itself
//! credit.
use std::{
    fmt::Display,
    future::{ready, Ready},
    str::FromStr,
};

use actix_web::{dev::Payload, http::header, web, FromRequest, HttpRequest};
use boutique_common::Secret;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use log::*;
use sha2::Sha256;

use crate::{config::AuthConfig, errors::ServerError};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Customer,
    Staff,
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Customer => write!(f, "customer"),
            Role::Staff => write!(f, "staff"),
        }
    }
}

impl FromStr for Role {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Self::Customer),
            "staff" => Ok(Self::Staff),
            s => Err(ServerError::AuthenticationError(format!("Unknown role: {s}"))),
        }
    }
}

/// The verified identity attached to a request.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub customer_id: String,
    pub role: Role,
}

impl AuthenticatedUser {
    pub fn is_staff(&self) -> bool {
        self.role == Role::Staff
    }

    /// Staff see everything; customers only themselves.
    pub fn can_act_for(&self, customer_id: &str) -> bool {
        self.is_staff() || self.customer_id == customer_id
    }

    pub fn require_staff(&self) -> Result<(), ServerError> {
        if self.is_staff() {
            Ok(())
        } else {
            Err(ServerError::InsufficientPermissions("This operation requires a staff credential".to_string()))
        }
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(extract_user(req))
    }
}

fn extract_user(req: &HttpRequest) -> Result<AuthenticatedUser, ServerError> {
    let issuer = req
        .app_data::<web::Data<TokenIssuer>>()
        .ok_or_else(|| ServerError::InitializeError("TokenIssuer is not registered".to_string()))?;
    let header = req
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or_else(|| ServerError::AuthenticationError("No bearer token provided".to_string()))?;
    let token = header
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ServerError::AuthenticationError("Malformed authorization header".to_string()))?;
    issuer.verify(token)
}

/// Issues and verifies the HMAC-signed bearer tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    secret: Secret<String>,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Self {
        Self { secret: config.token_secret.clone(), ttl: config.token_ttl }
    }

    pub fn issue(&self, customer_id: &str, role: Role) -> Result<String, ServerError> {
        if customer_id.trim().is_empty() || customer_id.contains(':') {
            return Err(ServerError::ValidationError("customer_id must be non-empty and must not contain ':'".to_string()));
        }
        let expiry = (Utc::now() + self.ttl).timestamp();
        let payload = format!("{customer_id}:{role}:{expiry}");
        let signature = self.sign(&payload)?;
        trace!("💻️ Issued {role} token for {customer_id}");
        Ok(format!("{}.{signature}", base64::encode(&payload)))
    }

    pub fn verify(&self, token: &str) -> Result<AuthenticatedUser, ServerError> {
        let (payload_b64, signature) = token
            .split_once('.')
            .ok_or_else(|| ServerError::AuthenticationError("Token is not in the correct format".to_string()))?;
        let payload = base64::decode(payload_b64)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or_else(|| ServerError::AuthenticationError("Token payload is not valid".to_string()))?;
        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        let signature = base64::decode(signature)
            .map_err(|_| ServerError::AuthenticationError("Token signature is not valid".to_string()))?;
        mac.verify_slice(&signature)
            .map_err(|_| ServerError::AuthenticationError("Token signature is invalid".to_string()))?;

        let mut parts = payload.splitn(3, ':');
        let (customer_id, role, expiry) = match (parts.next(), parts.next(), parts.next()) {
            (Some(c), Some(r), Some(e)) => (c, r, e),
            _ => return Err(ServerError::AuthenticationError("Token payload is incomplete".to_string())),
        };
        let expiry = expiry
            .parse::<i64>()
            .map_err(|_| ServerError::AuthenticationError("Token expiry is not valid".to_string()))?;
        if expiry < Utc::now().timestamp() {
            return Err(ServerError::AuthenticationError("Token has expired".to_string()));
        }
        Ok(AuthenticatedUser { customer_id: customer_id.to_string(), role: role.parse()? })
    }

    fn sign(&self, payload: &str) -> Result<String, ServerError> {
        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        Ok(base64::encode(mac.finalize().into_bytes()))
    }

    fn mac(&self) -> Result<HmacSha256, ServerError> {
        HmacSha256::new_from_slice(self.secret.reveal().as_bytes())
            .map_err(|e| ServerError::InitializeError(format!("Invalid token secret: {e}")))
    }
}

/// Verifies the HMAC signature the payment processor stamps on webhook bodies.
pub fn verify_webhook_signature(secret: &Secret<String>, body: &[u8], signature: &str) -> Result<(), ServerError> {
    let mut mac = HmacSha256::new_from_slice(secret.reveal().as_bytes())
        .map_err(|e| ServerError::InitializeError(format!("Invalid webhook secret: {e}")))?;
    mac.update(body);
    let signature = base64::decode(signature)
        .map_err(|_| ServerError::AuthenticationError("Webhook signature is not valid base64".to_string()))?;
    mac.verify_slice(&signature)
        .map_err(|_| ServerError::AuthenticationError("Webhook signature mismatch".to_string()))
}

/// Computes the signature a caller must attach to a webhook body. Exists for tests and for local tooling.
pub fn webhook_signature(secret: &Secret<String>, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.reveal().as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    base64::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod test {
    use super::*;

    fn issuer() -> TokenIssuer {
        let config = AuthConfig {
            token_secret: Secret::new("test-secret".to_string()),
            ..AuthConfig::default()
        };
        TokenIssuer::new(&config)
    }

    #[test]
    fn tokens_round_trip() {
        let issuer = issuer();
        let token = issuer.issue("cust-1", Role::Customer).expect("Error issuing token");
        let user = issuer.verify(&token).expect("Error verifying token");
        assert_eq!(user.customer_id, "cust-1");
        assert_eq!(user.role, Role::Customer);
        assert!(!user.is_staff());
        assert!(user.can_act_for("cust-1"));
        assert!(!user.can_act_for("cust-2"));
    }

    #[test]
    fn tampered_tokens_are_rejected() {
        let issuer = issuer();
        let token = issuer.issue("cust-1", Role::Customer).expect("Error issuing token");
        // Swap the payload for a staff claim, keeping the original signature
        let forged_payload = base64::encode("cust-1:staff:9999999999");
        let signature = token.split_once('.').map(|(_, s)| s.to_string()).expect("Token has two parts");
        let forged = format!("{forged_payload}.{signature}");
        assert!(issuer.verify(&forged).is_err());
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let config = AuthConfig {
            token_secret: Secret::new("test-secret".to_string()),
            token_ttl: Duration::hours(-1),
            ..AuthConfig::default()
        };
        let issuer = TokenIssuer::new(&config);
        let token = issuer.issue("cust-1", Role::Customer).expect("Error issuing token");
        assert!(issuer.verify(&token).is_err());
    }

    #[test]
    fn staff_tokens_carry_the_role() {
        let issuer = issuer();
        let token = issuer.issue("backoffice", Role::Staff).expect("Error issuing token");
        let user = issuer.verify(&token).expect("Error verifying token");
        assert!(user.is_staff());
        assert!(user.can_act_for("anyone"));
        assert!(user.require_staff().is_ok());
    }

    #[test]
    fn webhook_signatures_verify() {
        let secret = Secret::new("hook-secret".to_string());
        let body = br#"{"package_order_id": 7}"#;
        let signature = webhook_signature(&secret, body);
        assert!(verify_webhook_signature(&secret, body, &signature).is_ok());
        assert!(verify_webhook_signature(&secret, b"something else", &signature).is_err());
    }
}
