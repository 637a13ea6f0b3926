use crate::traits::{CouponManagement, LedgerManagement, PackageManagement, ReturnManagement};

/// The full contract a backend must satisfy to host the boutique engine: the four management traits plus a
/// cloneable handle the server can share across workers.
#[allow(async_fn_in_trait)]
pub trait StorefrontDatabase:
    Clone + PackageManagement + LedgerManagement + ReturnManagement + CouponManagement
{
    /// The URL of the database.
    fn url(&self) -> &str;

    /// Closes the database connection.
    async fn close(&mut self) {}
}
