//! Data models
//!
//! Catalog and billing entities shared between the server and API clients.
//! All IDs and references are strings; timestamps are Unix millis.

pub mod capacity_rule;
pub mod invoice;
pub mod offering;

// Re-exports
pub use capacity_rule::*;
pub use invoice::*;
pub use offering::*;
