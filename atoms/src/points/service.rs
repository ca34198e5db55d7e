use async_trait::async_trait;

use super::error::PointsError;
use super::model::{ClaimReceipt, PointsTransaction};
use crate::detections::ScanResult;
use crate::users::User;

/// Where balances, scans and transactions live.
///
/// Awards are additive only: nothing here can lower a balance.
#[async_trait]
pub trait PointsService: Send + Sync {
    /// Create the account with 0 points if missing, otherwise return it as stored
    async fn ensure_account(&self, user_id: &str, user_email: &str) -> Result<User, PointsError>;

    async fn get_user(&self, user_id: &str) -> Result<Option<User>, PointsError>;

    /// Add `amount` and record a transaction. Returns the new balance.
    async fn award(&self, user_id: &str, amount: u32, description: &str) -> Result<u64, PointsError>;

    /// Most recent first
    async fn history(&self, user_id: &str, limit: usize) -> Result<Vec<PointsTransaction>, PointsError>;

    /// Remember a scan so its points can be claimed later
    async fn record_scan(&self, user_id: &str, scan: &ScanResult) -> Result<(), PointsError>;

    /// Award a recorded scan's points. Succeeds at most once per scan.
    async fn claim_scan(&self, user_id: &str, scan_id: &str) -> Result<ClaimReceipt, PointsError>;
}
