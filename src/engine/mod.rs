//! Scan engine: the scan lock and the put-option scan orchestrator.

pub mod lock;
pub mod scanner;
