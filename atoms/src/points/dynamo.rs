use aws_sdk_dynamodb::operation::transact_write_items::TransactWriteItemsError;
use aws_sdk_dynamodb::types::{AttributeValue, CancellationReason, Put, TransactWriteItem, Update};
use aws_sdk_dynamodb::Client as DynamoClient;
use async_trait::async_trait;

use super::error::PointsError;
use super::model::{claim_description, ClaimReceipt, PointsTransaction, ScanRecord};
use super::service::PointsService;
use crate::detections::ScanResult;
use crate::users::{self, User};

/// Points ledger on the single DynamoDB table.
///
/// Layout (PK / SK):
/// - `USER#id` / `USER#id`            user document with `user_points`
/// - `USER#id` / `SCAN#scan_id`       recorded scan + `claimed` flag
/// - `USER#id` / `TXN#<ts>#<uuid>`    points transaction
pub struct DynamoPointsService {
    client: DynamoClient,
    table_name: String,
}

impl DynamoPointsService {
    pub fn new(client: DynamoClient, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    async fn get_scan(&self, user_id: &str, scan_id: &str) -> Result<Option<ScanRecord>, String> {
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("PK", AttributeValue::S(format!("USER#{}", user_id)))
            .key("SK", AttributeValue::S(format!("SCAN#{}", scan_id)))
            .send()
            .await
            .map_err(|e| format!("DynamoDB get_item error: {}", e))?;

        Ok(result.item().map(|item| ScanRecord {
            scan_id: scan_id.to_string(),
            total_points: item
                .get("total_points")
                .and_then(|v| v.as_n().ok())
                .and_then(|n| n.parse().ok())
                .unwrap_or(0),
            claimable_points: item
                .get("claimable_points")
                .and_then(|v| v.as_n().ok())
                .and_then(|n| n.parse().ok())
                .unwrap_or(0),
            has_battery: item
                .get("has_battery")
                .and_then(|v| v.as_bool().ok())
                .copied()
                .unwrap_or(false),
            claimed: item
                .get("claimed")
                .and_then(|v| v.as_bool().ok())
                .copied()
                .unwrap_or(false),
            created_at: item
                .get("created_at")
                .and_then(|v| v.as_s().ok())
                .map(|s| s.to_string())
                .unwrap_or_default(),
            claimed_at: item
                .get("claimed_at")
                .and_then(|v| v.as_s().ok())
                .map(|s| s.to_string()),
        }))
    }

    fn transaction_put(&self, user_id: &str, transaction: &PointsTransaction) -> Result<Put, String> {
        Put::builder()
            .table_name(&self.table_name)
            .item("PK", AttributeValue::S(format!("USER#{}", user_id)))
            .item(
                "SK",
                AttributeValue::S(format!("TXN#{}#{}", transaction.timestamp, transaction.id)),
            )
            .item("txn_id", AttributeValue::S(transaction.id.clone()))
            .item("description", AttributeValue::S(transaction.description.clone()))
            .item("amount", AttributeValue::N(transaction.amount.to_string()))
            .item("created_at", AttributeValue::S(transaction.timestamp.clone()))
            .build()
            .map_err(|e| format!("Failed to build transaction put: {}", e))
    }

    /// Balance increment + history entry, written in one DynamoDB transaction
    /// after any `leading` items. Returns the balance read back afterwards.
    async fn credit(
        &self,
        user_id: &str,
        amount: u32,
        transaction: &PointsTransaction,
        leading: Vec<TransactWriteItem>,
    ) -> Result<u64, PointsError> {
        let user_index = leading.len();
        let mut items = leading;
        items.push(
            TransactWriteItem::builder()
                .update(users::credit_update(&self.table_name, user_id, amount)?)
                .build(),
        );
        items.push(
            TransactWriteItem::builder()
                .put(self.transaction_put(user_id, transaction)?)
                .build(),
        );

        let written = self
            .client
            .transact_write_items()
            .set_transact_items(Some(items))
            .send()
            .await;

        if let Err(e) = written {
            if let Some(TransactWriteItemsError::TransactionCanceledException(cancelled)) = e.as_service_error() {
                return Err(cancellation_error(cancelled.cancellation_reasons(), user_index));
            }
            return Err(PointsError::Storage(format!("DynamoDB transact_write_items error: {}", e)));
        }

        users::get_user(&self.client, &self.table_name, user_id)
            .await?
            .map(|u| u.user_points)
            .ok_or(PointsError::UserNotFound)
    }
}

/// Map a cancelled write transaction to the item that failed its condition.
/// Items before `user_index` guard the scan's claimed flag.
fn cancellation_error(reasons: &[CancellationReason], user_index: usize) -> PointsError {
    let failed = reasons
        .iter()
        .position(|r| r.code() == Some("ConditionalCheckFailed"));

    match failed {
        Some(i) if i < user_index => PointsError::AlreadyClaimed,
        Some(i) if i == user_index => PointsError::UserNotFound,
        _ => {
            let codes: Vec<&str> = reasons.iter().filter_map(|r| r.code()).collect();
            PointsError::Storage(format!("DynamoDB transaction cancelled: {}", codes.join(",")))
        }
    }
}

#[async_trait]
impl PointsService for DynamoPointsService {
    async fn ensure_account(&self, user_id: &str, user_email: &str) -> Result<User, PointsError> {
        Ok(users::ensure_user(&self.client, &self.table_name, user_id, user_email).await?)
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<User>, PointsError> {
        Ok(users::get_user(&self.client, &self.table_name, user_id).await?)
    }

    async fn award(&self, user_id: &str, amount: u32, description: &str) -> Result<u64, PointsError> {
        if amount == 0 {
            return self
                .get_user(user_id)
                .await?
                .map(|u| u.user_points)
                .ok_or(PointsError::UserNotFound);
        }
        self.credit(user_id, amount, &PointsTransaction::earned(amount, description), Vec::new())
            .await
    }

    async fn history(&self, user_id: &str, limit: usize) -> Result<Vec<PointsTransaction>, PointsError> {
        let result = self
            .client
            .query()
            .table_name(&self.table_name)
            .key_condition_expression("PK = :pk AND begins_with(SK, :sk_prefix)")
            .expression_attribute_values(":pk", AttributeValue::S(format!("USER#{}", user_id)))
            .expression_attribute_values(":sk_prefix", AttributeValue::S("TXN#".to_string()))
            .scan_index_forward(false)
            .limit(i32::try_from(limit).unwrap_or(i32::MAX))
            .send()
            .await
            .map_err(|e| format!("DynamoDB query error: {}", e))?;

        let transactions = result
            .items()
            .iter()
            .map(|item| PointsTransaction {
                id: item
                    .get("txn_id")
                    .and_then(|v| v.as_s().ok())
                    .map(|s| s.to_string())
                    .unwrap_or_default(),
                description: item
                    .get("description")
                    .and_then(|v| v.as_s().ok())
                    .map(|s| s.to_string())
                    .unwrap_or_default(),
                amount: item
                    .get("amount")
                    .and_then(|v| v.as_n().ok())
                    .and_then(|n| n.parse().ok())
                    .unwrap_or(0),
                timestamp: item
                    .get("created_at")
                    .and_then(|v| v.as_s().ok())
                    .map(|s| s.to_string())
                    .unwrap_or_default(),
            })
            .collect();

        Ok(transactions)
    }

    async fn record_scan(&self, user_id: &str, scan: &ScanResult) -> Result<(), PointsError> {
        let record = ScanRecord::from(scan);

        self.client
            .put_item()
            .table_name(&self.table_name)
            .item("PK", AttributeValue::S(format!("USER#{}", user_id)))
            .item("SK", AttributeValue::S(format!("SCAN#{}", record.scan_id)))
            .item("total_points", AttributeValue::N(record.total_points.to_string()))
            .item("claimable_points", AttributeValue::N(record.claimable_points.to_string()))
            .item("has_battery", AttributeValue::Bool(record.has_battery))
            .item("claimed", AttributeValue::Bool(false))
            .item("detection_count", AttributeValue::N(scan.detections.len().to_string()))
            .item("created_at", AttributeValue::S(record.created_at.clone()))
            .send()
            .await
            .map_err(|e| format!("DynamoDB put_item error: {}", e))?;

        Ok(())
    }

    async fn claim_scan(&self, user_id: &str, scan_id: &str) -> Result<ClaimReceipt, PointsError> {
        let record = self
            .get_scan(user_id, scan_id)
            .await?
            .ok_or(PointsError::ScanNotFound)?;

        if record.has_battery {
            return Err(PointsError::BatteryRedirect);
        }
        if record.claimed {
            return Err(PointsError::AlreadyClaimed);
        }
        if record.claimable_points == 0 {
            return Err(PointsError::NothingToClaim);
        }

        // The flag flip, the credit and the history entry commit together.
        // The condition keeps two sessions racing on the same scan to one award.
        let now = chrono::Utc::now().to_rfc3339();
        let flip = Update::builder()
            .table_name(&self.table_name)
            .key("PK", AttributeValue::S(format!("USER#{}", user_id)))
            .key("SK", AttributeValue::S(format!("SCAN#{}", scan_id)))
            .update_expression("SET claimed = :claimed, claimed_at = :now")
            .condition_expression("claimed = :unclaimed")
            .expression_attribute_values(":claimed", AttributeValue::Bool(true))
            .expression_attribute_values(":unclaimed", AttributeValue::Bool(false))
            .expression_attribute_values(":now", AttributeValue::S(now))
            .build()
            .map_err(|e| format!("Failed to build claim update: {}", e))?;

        let amount = record.claimable_points;
        let transaction = PointsTransaction::earned(amount, &claim_description(scan_id));
        let balance = self
            .credit(
                user_id,
                amount,
                &transaction,
                vec![TransactWriteItem::builder().update(flip).build()],
            )
            .await?;

        tracing::info!("🏅 Claimed scan {} for user {}: +{} (balance {})", scan_id, user_id, amount, balance);

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

    fn reasons(codes: &[&str]) -> Vec<CancellationReason> {
        codes
            .iter()
            .map(|c| CancellationReason::builder().code(*c).build())
            .collect()
    }

    #[test]
    fn failed_scan_condition_means_already_claimed() {
        let r = reasons(&["ConditionalCheckFailed", "None", "None"]);
        assert_eq!(cancellation_error(&r, 1), PointsError::AlreadyClaimed);
    }

    #[test]
    fn failed_user_condition_means_missing_user() {
        let r = reasons(&["None", "ConditionalCheckFailed", "None"]);
        assert_eq!(cancellation_error(&r, 1), PointsError::UserNotFound);

        // plain award: the user update is the first item
        let r = reasons(&["ConditionalCheckFailed", "None"]);
        assert_eq!(cancellation_error(&r, 0), PointsError::UserNotFound);
    }

    #[test]
    fn other_cancellations_are_storage_errors() {
        let r = reasons(&["None", "TransactionConflict", "None"]);
        assert!(matches!(cancellation_error(&r, 1), PointsError::Storage(_)));
    }
}
