pub mod detections;
pub mod points;
pub mod storage;
pub mod users;
