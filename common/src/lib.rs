//! Provides the paginated listing client and the helpers shared by fleetbench binaries.
#![deny(missing_docs)]
pub mod pagination;
pub mod retry;
pub mod session;
#[cfg(feature = "telemetry")]
pub mod telemetry;
