//! # Alarm Monitor – Event Store
//!
//! Append-only, durable log of alarm transitions:
//!
//! - **Append** – store-assigned ids, durable before returning
//! - **Query** – optional timestamp bounds and limit, newest first
//! - **Single writer** – concurrent appends are serialised; readers run
//!   alongside writes

pub mod store;
