// Re-export model types and scoring functions
pub mod model;
pub mod scoring;

pub use model::{
    BoundingBox, Detection, ScanOutcome, ScanResult, SpecialMessage, SpecialMessageKind,
    WasteCategory, BATTERY_REDIRECT_PATH,
};
pub use scoring::{score, WeightTable};
