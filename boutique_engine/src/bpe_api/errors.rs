use thiserror::Error;

use crate::traits::{LedgerError, PackageError, ReturnError};

/// Errors surfaced by the package flow API, which straddles the package state machine and the ledger (cashback
/// postings).
#[derive(Debug, Clone, Error)]
pub enum PackageFlowError {
    #[error("{0}")]
    PackageError(#[from] PackageError),
    #[error("{0}")]
    LedgerError(#[from] LedgerError),
}

/// Errors surfaced by the return flow API, which reads orders and the ledger while driving the return lifecycle.
#[derive(Debug, Clone, Error)]
pub enum ReturnFlowError {
    #[error("{0}")]
    ReturnError(#[from] ReturnError),
    #[error("{0}")]
    PackageError(#[from] PackageError),
    #[error("{0}")]
    LedgerError(#[from] LedgerError),
}
