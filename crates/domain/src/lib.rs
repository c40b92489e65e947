//! # tradfri-domain
//!
//! Pure domain model for controlling a handful of bridge-connected devices.
//!
//! ## Responsibilities
//! - Light state, power and the quantized level table
//! - Remote actions and their brightness semantics
//! - Device announcements
//! - Outbound commands and inter-process control signals
//! - The topic scheme mapping friendly names onto broker topics
//! - Typed errors shared by every layer
//!
//! ## Dependency rule
//! This crate has **no internal dependencies** and does no IO.
//! IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod topic;

pub mod announcement;
pub mod command;
pub mod level;
pub mod light;
pub mod remote;
