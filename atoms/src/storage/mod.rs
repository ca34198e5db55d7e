pub mod local;

pub use local::{
    LocalStore, StoreTxn, AUTH_TOKEN_KEY, SCANS_KEY, TRANSACTIONS_KEY, USERS_KEY, USER_DATA_KEY,
};
