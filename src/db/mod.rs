pub mod models;
pub mod store;

pub use models::{ResourceQuota, VpsRecord, VpsStatus};
pub use store::{JsonFileStore, Store, StoreError, StoredRecord};
