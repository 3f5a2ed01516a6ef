//! # Alarm Monitor – Alarm Pipeline
//!
//! - **Decoder** – raw serial line → `Signal::On` / `Signal::Off`, or a
//!   `DecodeError` that never leaves the pipeline
//! - **State machine** – `Idle` / `Active` transitions, event persistence,
//!   alert raise / clear
//! - **Alert coordinator** – at most one presented alert at a time

pub mod alarm;
