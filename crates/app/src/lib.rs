//! # tradfri-app
//!
//! Application layer — the two long-running components, the messaging layer
//! they share, and the **port definition** for the broker.
//!
//! ## Responsibilities
//! - Define the `Broker` port that transport adapters implement
//! - Encode commands and decode inbound messages (`codec`)
//! - Ref-counted, typed subscriptions with a supervisory channel for
//!   protocol violations (`subscriptions`)
//! - The explicit `Context` handed to every component
//! - Components:
//!   - `BrightnessController` — turns remote clicks into level steps
//!   - `EchoSuppressionCoordinator` — resets the light when it powers on at
//!     non-default levels
//! - Provide an **in-process broker** that doesn't need IO
//!
//! ## Dependency rule
//! Depends on `tradfri-domain` only (plus `tokio` for channels and timers).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod brightness_controller;
pub mod codec;
pub mod command_sender;
pub mod context;
pub mod echo_suppression;
pub mod in_process_broker;
pub mod ports;
pub mod subscriptions;
