#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PointsError {
    #[error("User not found")]
    UserNotFound,

    #[error("Scan not found")]
    ScanNotFound,

    #[error("Points for this scan were already claimed")]
    AlreadyClaimed,

    #[error("Batteries are handled by the battery disposal service")]
    BatteryRedirect,

    #[error("No recyclable items found")]
    NothingToClaim,

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<String> for PointsError {
    fn from(e: String) -> Self {
        PointsError::Storage(e)
    }
}
