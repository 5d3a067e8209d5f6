//! Process wiring and small shared helpers.

pub mod bootstrap;
pub mod retry;
