//! Alarm crate: sub-modules.

pub mod decoder;
pub mod alert;
pub mod machine;

pub use decoder::{decode, DecodeError, TOKEN_OFF, TOKEN_ON};
pub use alert::AlertCoordinator;
pub use machine::{transition, AlarmStateMachine, AlarmStateMachineState, TransitionOutcome};
