mod eur;

pub mod helpers;
pub mod op;
mod secret;

pub use eur::{Eur, EurConversionError, EUR_CURRENCY_CODE, EUR_CURRENCY_CODE_LOWER};
pub use secret::Secret;
