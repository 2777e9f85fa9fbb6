pub mod alarms;
pub mod cache;
pub mod config;
pub mod filter;
pub mod logging;
pub mod metrics;
pub mod record;
pub mod service;
pub mod stats;
pub mod store;
pub mod timestamp;

pub use config::AppConfig;
pub use filter::Query;
pub use record::Record;
pub use service::Service;
pub use store::RecordStore;
