//! VALUEWATCH: put-option scanner and DCF valuation tracker
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod app;
pub mod archive;
pub mod cache;
pub mod cli;
pub mod config;
pub mod dashboard;
pub mod engine;
pub mod market_data;
pub mod storage;
pub mod types;
pub mod valuation;
