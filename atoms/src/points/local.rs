use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::error::PointsError;
use super::model::{claim_description, ClaimReceipt, PointsTransaction, ScanRecord};
use super::service::PointsService;
use crate::detections::ScanResult;
use crate::storage::{LocalStore, StoreTxn, SCANS_KEY, TRANSACTIONS_KEY, USER_DATA_KEY};
use crate::users::User;

type Users = HashMap<String, User>;
type Transactions = HashMap<String, Vec<PointsTransaction>>;
type Scans = HashMap<String, HashMap<String, ScanRecord>>;

/// Mock-mode ledger kept in the local key/value store.
/// Nothing here is reconciled with a server.
pub struct LocalPointsService {
    store: Arc<LocalStore>,
}

impl LocalPointsService {
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }
}

/// Add `amount` to the balance and prepend the transaction, both staged in `txn`.
/// Yields `UserNotFound` without staging anything when the account is missing.
fn stage_credit(
    txn: &mut StoreTxn<'_>,
    user_id: &str,
    amount: u32,
    transaction: &PointsTransaction,
) -> Result<Result<u64, PointsError>, String> {
    let mut users: Users = txn.get(USER_DATA_KEY)?;
    let Some(user) = users.get_mut(user_id) else {
        return Ok(Err(PointsError::UserNotFound));
    };
    user.user_points = user.user_points.saturating_add(u64::from(amount));
    let balance = user.user_points;

    let mut all: Transactions = txn.get(TRANSACTIONS_KEY)?;
    // newest first, same as the mock history list
    all.entry(user_id.to_string())
        .or_default()
        .insert(0, transaction.clone());

    txn.put(USER_DATA_KEY, &users)?;
    txn.put(TRANSACTIONS_KEY, &all)?;
    Ok(Ok(balance))
}

#[async_trait]
impl PointsService for LocalPointsService {
    async fn ensure_account(&self, user_id: &str, user_email: &str) -> Result<User, PointsError> {
        let user = self.store.update::<Users, _, _>(USER_DATA_KEY, |users| {
            let user = users
                .entry(user_id.to_string())
                .or_insert_with(|| User::new(user_id, user_email));
            user.user_last_login = Some(chrono::Utc::now().to_rfc3339());
            Ok(user.clone())
        })?;
        Ok(user)
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<User>, PointsError> {
        let users: Users = self.store.get(USER_DATA_KEY)?.unwrap_or_default();
        Ok(users.get(user_id).cloned())
    }

    async fn award(&self, user_id: &str, amount: u32, description: &str) -> Result<u64, PointsError> {
        if amount == 0 {
            return self
                .get_user(user_id)
                .await?
                .map(|u| u.user_points)
                .ok_or(PointsError::UserNotFound);
        }

        let transaction = PointsTransaction::earned(amount, description);
        self.store
            .transaction(|txn| stage_credit(txn, user_id, amount, &transaction))?
    }

    async fn history(&self, user_id: &str, limit: usize) -> Result<Vec<PointsTransaction>, PointsError> {
        let all: Transactions = self.store.get(TRANSACTIONS_KEY)?.unwrap_or_default();
        Ok(all
            .get(user_id)
            .map(|txns| txns.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn record_scan(&self, user_id: &str, scan: &ScanResult) -> Result<(), PointsError> {
        self.store.update::<Scans, _, _>(SCANS_KEY, |all| {
            all.entry(user_id.to_string())
                .or_default()
                .insert(scan.scan_id.clone(), ScanRecord::from(scan));
            Ok(())
        })?;
        Ok(())
    }

    async fn claim_scan(&self, user_id: &str, scan_id: &str) -> Result<ClaimReceipt, PointsError> {
        // Flag flip, balance and history commit together or not at all
        let outcome = self.store.transaction(|txn| {
            let mut scans: Scans = txn.get(SCANS_KEY)?;
            let Some(record) = scans.get_mut(user_id).and_then(|s| s.get_mut(scan_id)) else {
                return Ok(Err(PointsError::ScanNotFound));
            };
            if record.has_battery {
                return Ok(Err(PointsError::BatteryRedirect));
            }
            if record.claimed {
                return Ok(Err(PointsError::AlreadyClaimed));
            }
            if record.claimable_points == 0 {
                return Ok(Err(PointsError::NothingToClaim));
            }

            let amount = record.claimable_points;
            let transaction = PointsTransaction::earned(amount, &claim_description(scan_id));
            let balance = match stage_credit(txn, user_id, amount, &transaction)? {
                Ok(balance) => balance,
                Err(e) => return Ok(Err(e)),
            };

            record.claimed = true;
            record.claimed_at = Some(chrono::Utc::now().to_rfc3339());
            txn.put(SCANS_KEY, &scans)?;
            Ok(Ok((amount, balance, transaction)))
        })?;
        let (amount, balance, transaction) = outcome?;

        tracing::info!("🏅 Local claim: user={} scan={} awarded={}", user_id, scan_id, amount);

        Ok(ClaimReceipt {
            scan_id: scan_id.to_string(),
            awarded: amount,
            balance,
            transaction,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detections::{BoundingBox, Detection, WasteCategory, WeightTable};

    fn service() -> LocalPointsService {
        LocalPointsService::new(Arc::new(LocalStore::in_memory()))
    }

    fn scan(labels: &[&str]) -> ScanResult {
        let detections = labels
            .iter()
            .map(|l| Detection::new(WasteCategory::parse(l), 0.9, BoundingBox::default()))
            .collect();
        ScanResult::from_detections(&WeightTable::default(), detections)
    }

    #[tokio::test]
    async fn ensure_account_keeps_existing_balance() {
        let svc = service();
        let user = svc.ensure_account("u1", "kim@example.com").await.unwrap();
        assert_eq!(user.user_points, 0);
        assert_eq!(user.user_name, "kim");

        svc.award("u1", 25, "bonus").await.unwrap();
        let again = svc.ensure_account("u1", "kim@example.com").await.unwrap();
        assert_eq!(again.user_points, 25);
    }

    #[tokio::test]
    async fn claim_awards_exactly_once() {
        let svc = service();
        svc.ensure_account("u1", "kim@example.com").await.unwrap();

        let s = scan(&["plastic", "paper"]);
        svc.record_scan("u1", &s).await.unwrap();

        let receipt = svc.claim_scan("u1", &s.scan_id).await.unwrap();
        assert_eq!(receipt.awarded, 20);
        assert_eq!(receipt.balance, 20);

        assert_eq!(
            svc.claim_scan("u1", &s.scan_id).await.unwrap_err(),
            PointsError::AlreadyClaimed
        );
        let user = svc.get_user("u1").await.unwrap().unwrap();
        assert_eq!(user.user_points, 20);

        let history = svc.history("u1", 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].amount, 20);
    }

    #[tokio::test]
    async fn battery_and_unknown_scans_are_not_claimable() {
        let svc = service();
        svc.ensure_account("u1", "kim@example.com").await.unwrap();

        let battery = scan(&["plastic", "battery"]);
        svc.record_scan("u1", &battery).await.unwrap();
        assert_eq!(
            svc.claim_scan("u1", &battery.scan_id).await.unwrap_err(),
            PointsError::BatteryRedirect
        );

        let nothing = scan(&["other"]);
        svc.record_scan("u1", &nothing).await.unwrap();
        assert_eq!(
            svc.claim_scan("u1", &nothing.scan_id).await.unwrap_err(),
            PointsError::NothingToClaim
        );

        assert_eq!(
            svc.claim_scan("u1", "missing").await.unwrap_err(),
            PointsError::ScanNotFound
        );
        // another user's scan id is not visible
        assert_eq!(
            svc.claim_scan("u2", &battery.scan_id).await.unwrap_err(),
            PointsError::ScanNotFound
        );

        assert_eq!(svc.get_user("u1").await.unwrap().unwrap().user_points, 0);
    }

    #[tokio::test]
    async fn history_is_newest_first_and_limited() {
        let svc = service();
        svc.ensure_account("u1", "kim@example.com").await.unwrap();
        for amount in [5, 10, 15] {
            svc.award("u1", amount, "test").await.unwrap();
        }

        let history = svc.history("u1", 2).await.unwrap();
        assert_eq!(history.iter().map(|t| t.amount).collect::<Vec<_>>(), vec![15, 10]);
    }

    #[tokio::test]
    async fn failed_claim_can_be_retried() {
        let svc = service();
        let s = scan(&["plastic"]);
        svc.record_scan("u1", &s).await.unwrap();

        // no account yet: nothing may change, including the claimed flag
        assert_eq!(
            svc.claim_scan("u1", &s.scan_id).await.unwrap_err(),
            PointsError::UserNotFound
        );
        assert!(svc.history("u1", 10).await.unwrap().is_empty());

        svc.ensure_account("u1", "kim@example.com").await.unwrap();
        let receipt = svc.claim_scan("u1", &s.scan_id).await.unwrap();
        assert_eq!(receipt.awarded, 15);
        assert_eq!(receipt.balance, 15);
        assert_eq!(svc.get_user("u1").await.unwrap().unwrap().user_points, 15);
    }

    #[tokio::test]
    async fn award_to_missing_user_fails() {
        let svc = service();
        assert_eq!(svc.award("ghost", 5, "x").await.unwrap_err(), PointsError::UserNotFound);
    }
}
