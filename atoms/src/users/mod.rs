pub mod model;
pub mod service;

pub use model::{display_name_for, User};
pub use service::*;
