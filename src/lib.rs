//! SNIPEWATCH — Auction House Snipe Detection Agent
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod api;
pub mod baseline;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod notify;
pub mod rules;
pub mod storage;
pub mod types;
