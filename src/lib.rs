//! Group control message reconciliation.
//!
//! Applies control events (create/update, quit, info request) for a group to
//! a locally persisted roster, records each applied change as a canonical
//! control message in the group's conversation thread, and schedules the
//! follow-up work (avatar downloads, roster pushes) in the background.
//!
//! - [`core`] - Classification, reconciliation rules and materialization
//! - [`app`] - Per-group serialization, side-effect dispatch, the processor
//! - [`ds`] - Inbound envelopes and the wire codec
//! - [`storage`] - In-memory collaborator stores
//! - [`protos`] - Wire message definitions

pub mod app;
pub mod core;
pub mod ds;
pub mod protos;
pub mod storage;
