//! fm-core: Core abstractions and configuration for fwdmng
//!
//! This crate provides the shared domain types, error enums and the
//! persisted configuration model used by the tunnel engine and the CLI.

pub mod address;
pub mod config;
pub mod error;
pub mod types;

pub use address::{BindAddr, RemoteAddr};
pub use types::{ByteCount, ForwardId, HostId, HostStatus};
