use serde::{Deserialize, Serialize};

// ========== REPLIES ==========
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatReply {
    BatteryBins {
        query: String,
        results: Vec<BatteryBin>,
    },
    WasteFees {
        query: String,
        results: Vec<WasteFee>,
    },
    General {
        query: String,
        message: String,
    },
}

impl ChatReply {
    pub fn query(&self) -> &str {
        match self {
            ChatReply::BatteryBins { query, .. }
            | ChatReply::WasteFees { query, .. }
            | ChatReply::General { query, .. } => query,
        }
    }
}

// ========== BATTERY BINS ==========
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BatteryBin {
    pub address: String,
    pub location: String,
    pub opening_hours: String,
}

// ========== WASTE FEES ==========
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct WasteFee {
    pub region: String,
    pub item: String,
    pub specification: String,
    pub fee: String,
    pub fee_won: u32,
}

// ========== REQUEST ==========
#[derive(Debug, Deserialize)]
pub struct ChatPayload {
    #[serde(default)]
    pub message: String,
}
