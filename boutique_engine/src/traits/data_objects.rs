use boutique_common::Eur;
use serde::{Deserialize, Serialize};

use crate::db_types::OpenPackage;

/// The two cached balances held against a customer profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balances {
    pub wallet: Eur,
    pub loyalty: Eur,
}

/// Result of comparing the cached balances against a full ledger replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceAudit {
    pub customer_id: String,
    pub cached: Balances,
    pub replayed: Balances,
}

impl BalanceAudit {
    pub fn is_consistent(&self) -> bool {
        self.cached == self.replayed
    }
}

/// What one pass of the package sweep did.
#[derive(Debug, Clone, Default)]
pub struct SweepOutcome {
    /// Packages transitioned `Active → Closed` because their deadline passed.
    pub closed: Vec<OpenPackage>,
    /// Packages flagged for a closing-soon warning this pass.
    pub reminded: Vec<OpenPackage>,
}

impl SweepOutcome {
    pub fn closed_count(&self) -> usize {
        self.closed.len()
    }

    pub fn reminded_count(&self) -> usize {
        self.reminded.len()
    }
}
