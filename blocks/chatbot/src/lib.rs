pub mod chat;
pub mod rules;
pub mod types;

pub use rules::respond;
pub use types::ChatReply;
