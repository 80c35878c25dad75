//! Configuration for the scrape orchestrator: a typestate builder
//! producing an immutable `ServiceConfig`.

pub mod builder;
pub mod types;

pub use builder::{Complete, Incomplete, ServiceConfigBuilder};
pub use types::{AdmissionConfig, CacheConfig, PoolConfig, ServiceConfig};
