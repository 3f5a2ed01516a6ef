//! # Alarm Monitor – Core
//!
//! Shared vocabulary used by every other alarm-monitor crate:
//!
//! - **Events** – persisted, timestamped alarm transitions
//! - **Signals** – decoded `On` / `Off` tokens from the serial link
//! - **Alarm state** – `Idle` / `Active` plus the alert handle reference
//! - **Notifications** – fan-out of state / alert / connection changes to
//!   whatever presentation layer is listening

pub mod notify;
pub mod types;

pub use notify::{Notification, Notifier};
pub use types::*;
