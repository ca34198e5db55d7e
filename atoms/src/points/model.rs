use serde::{Deserialize, Serialize};

use crate::detections::ScanResult;

/// One entry in a user's points history
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PointsTransaction {
    pub id: String,
    pub description: String,
    pub amount: i64,
    pub timestamp: String,
}

impl PointsTransaction {
    pub fn earned(amount: u32, description: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            description: description.to_string(),
            amount: i64::from(amount),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// What the ledger keeps about a scan so it can be claimed exactly once
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ScanRecord {
    pub scan_id: String,
    pub total_points: u32,
    pub claimable_points: u32,
    pub has_battery: bool,
    pub claimed: bool,
    pub created_at: String,
    pub claimed_at: Option<String>,
}

impl From<&ScanResult> for ScanRecord {
    fn from(scan: &ScanResult) -> Self {
        Self {
            scan_id: scan.scan_id.clone(),
            total_points: scan.total_points,
            claimable_points: scan.claimable_points(),
            has_battery: scan.has_battery,
            claimed: false,
            created_at: scan.created_at.clone(),
            claimed_at: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ClaimPayload {
    pub scan_id: String,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ClaimReceipt {
    pub scan_id: String,
    pub awarded: u32,
    pub balance: u64,
    pub transaction: PointsTransaction,
}

#[derive(Debug, Serialize, Clone)]
pub struct PointsBalance {
    pub user_id: String,
    pub total_points: u64,
    pub recent_transactions: Vec<PointsTransaction>,
}

/// Earning summary for `GET /points/stats`
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct PointsStats {
    pub total_points: u64,
    pub total_earned: i64,
    pub transaction_count: usize,
    pub environmental_impact: EnvironmentalImpact,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct EnvironmentalImpact {
    pub co2_reduction_grams: f64,
    pub recyclable_items: f64,
}

/// Points one recyclable item is reckoned at when estimating impact
pub const POINTS_PER_RECYCLABLE: f64 = 10.0;
/// CO2 saved per recycled item, in grams
pub const CO2_GRAMS_PER_ITEM: f64 = 100.0;

impl PointsStats {
    pub fn from_history(total_points: u64, transactions: &[PointsTransaction]) -> Self {
        let total_earned: i64 = transactions
            .iter()
            .map(|t| t.amount)
            .filter(|amount| *amount > 0)
            .sum();
        let recyclable_items = total_earned as f64 / POINTS_PER_RECYCLABLE;

        Self {
            total_points,
            total_earned,
            transaction_count: transactions.len(),
            environmental_impact: EnvironmentalImpact {
                co2_reduction_grams: recyclable_items * CO2_GRAMS_PER_ITEM,
                recyclable_items,
            },
        }
    }
}

/// Description written on every scan claim
pub fn claim_description(scan_id: &str) -> String {
    format!("재활용 항목 적립: {}", scan_id)
}
