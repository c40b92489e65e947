//! Shared pieces of the `tradfrid` and `tradfri-set` binaries.

pub mod config;
pub mod set;
