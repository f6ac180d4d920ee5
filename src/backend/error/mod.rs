//! Gateway error types.
//!
//! - `GatewayError` - the error taxonomy every dispatched action resolves to
//! - `StoreError` - failures surfaced by the persistence adapters
//! - `conversion` - mapping errors onto wire frames and bounding store calls

pub mod conversion;
pub mod types;

pub use conversion::with_store_timeout;
pub use types::{GatewayError, StoreError};
