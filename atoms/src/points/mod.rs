// Re-export model types, the service seam and its implementations
pub mod dynamo;
pub mod error;
pub mod http;
pub mod local;
pub mod model;
pub mod service;

pub use dynamo::DynamoPointsService;
pub use error::PointsError;
pub use http::*;
pub use local::LocalPointsService;
pub use model::{
    ClaimPayload, ClaimReceipt, EnvironmentalImpact, PointsBalance, PointsStats, PointsTransaction,
    ScanRecord,
};
pub use service::PointsService;
