//! Transactional mail integration.
//!
//! Package lifecycle events are forwarded to the mail provider as templated sends addressed by customer
//! reference (the provider holds the actual address book). Delivery is strictly fire-and-forget: a failed send
//! is logged and dropped, and never affects the state transition that triggered it.
use std::{future::Future, pin::Pin, sync::Arc};

use boutique_engine::{db_types::OpenPackage, events::EventHooks};
use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
};
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::MailerConfig;

#[derive(Debug, Clone, Error)]
pub enum MailerError {
    #[error("Could not initialize the mailer client. {0}")]
    Initialization(String),
    #[error("Could not reach the mail API. {0}")]
    SendError(String),
    #[error("The mail API rejected the send ({status}): {message}")]
    QueryError { status: u16, message: String },
}

#[derive(Clone)]
pub struct MailerApi {
    config: MailerConfig,
    client: Arc<Client>,
}

impl MailerApi {
    pub fn new(config: MailerConfig) -> Result<Self, MailerError> {
        let mut headers = HeaderMap::with_capacity(2);
        let val = HeaderValue::from_str(config.api_key.reveal().as_str())
            .map_err(|e| MailerError::Initialization(e.to_string()))?;
        headers.insert("api-key", val);
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client =
            Client::builder().default_headers(headers).build().map_err(|e| MailerError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    /// Queue one templated send. Errors are returned so callers can log them, but nothing retries here: the
    /// provider handles its own redelivery.
    pub async fn send(&self, template: &str, customer_id: &str, params: Value) -> Result<(), MailerError> {
        let url = format!("{}/v1/transactional/send", self.config.base_url.trim_end_matches('/'));
        let body = json!({
            "sender": self.config.sender,
            "to_customer": customer_id,
            "template": template,
            "params": params,
        });
        trace!("📧️ Sending '{template}' to customer {customer_id}");
        let response = self.client.post(url).json(&body).send().await.map_err(|e| MailerError::SendError(e.to_string()))?;
        if response.status().is_success() {
            debug!("📧️ '{template}' queued for customer {customer_id}");
            Ok(())
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| MailerError::SendError(e.to_string()))?;
            Err(MailerError::QueryError { status, message })
        }
    }

    async fn notify(&self, template: &str, package: &OpenPackage, params: Value) {
        if let Err(e) = self.send(template, &package.customer_id, params).await {
            // Fire and forget: the transition already happened, the mail just didn't.
            warn!("📧️ Could not send '{template}' for package #{}: {e}", package.id);
        }
    }
}

/// Wires the mailer into the engine's event hooks. One template per lifecycle event.
pub fn mail_hooks(mailer: MailerApi) -> EventHooks {
    let mut hooks = EventHooks::default();
    let m = mailer.clone();
    hooks.on_package_opened(move |ev| {
        let mailer = m.clone();
        boxed(async move {
            let params = json!({ "package_id": ev.package.id, "closes_at": ev.package.closes_at });
            mailer.notify("package-opened", &ev.package, params).await;
        })
    });
    let m = mailer.clone();
    hooks.on_order_added(move |ev| {
        let mailer = m.clone();
        boxed(async move {
            let params = json!({
                "package_id": ev.package.id,
                "order_id": ev.package_order.order_id,
                "closes_at": ev.package.closes_at,
            });
            mailer.notify("order-added", &ev.package, params).await;
        })
    });
    let m = mailer.clone();
    hooks.on_closing_soon(move |ev| {
        let mailer = m.clone();
        boxed(async move {
            let params = json!({ "package_id": ev.package.id, "closes_at": ev.package.closes_at });
            mailer.notify("package-closing-soon", &ev.package, params).await;
        })
    });
    let m = mailer.clone();
    hooks.on_package_closed(move |ev| {
        let mailer = m.clone();
        boxed(async move {
            let params = json!({ "package_id": ev.package.id });
            mailer.notify("package-closed", &ev.package, params).await;
        })
    });
    let m = mailer;
    hooks.on_package_shipped(move |ev| {
        let mailer = m.clone();
        boxed(async move {
            let params = json!({
                "package_id": ev.package.id,
                "tracking_number": ev.package.tracking_number,
                "final_weight_g": ev.package.final_weight_g,
            });
            mailer.notify("package-shipped", &ev.package, params).await;
        })
    });
    hooks
}

/// Hooks that only log, used when the mailer is disabled so package events stay observable in development.
pub fn log_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks.on_package_opened(|ev| {
        boxed(async move { info!("📧️ (mailer disabled) package #{} opened", ev.package.id) })
    });
    hooks.on_order_added(|ev| {
        boxed(async move {
            info!("📧️ (mailer disabled) order {} added to package #{}", ev.package_order.order_id, ev.package.id)
        })
    });
    hooks.on_closing_soon(|ev| {
        boxed(async move { info!("📧️ (mailer disabled) package #{} closes soon", ev.package.id) })
    });
    hooks.on_package_closed(|ev| {
        boxed(async move { info!("📧️ (mailer disabled) package #{} closed", ev.package.id) })
    });
    hooks.on_package_shipped(|ev| {
        boxed(async move { info!("📧️ (mailer disabled) package #{} shipped", ev.package.id) })
    });
    hooks
}

fn boxed<F>(f: F) -> Pin<Box<dyn Future<Output = ()> + Send>>
where F: Future<Output = ()> + Send + 'static {
    Box::pin(f)
}
