//! Variable Sync: keeps narrative-authored entity state coherent.
//!
//! A text generator writes `setter('prefix.entity.<name>.<field>', value)`
//! directives into its output. This crate parses them, persists them into a
//! message-scoped variable store, and reconciles that store into an in-memory
//! cache with derived size calculations, driven by host lifecycle events.

pub mod core;
pub mod schema;
