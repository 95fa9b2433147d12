// src/lib.rs

//! Phishing URL risk analysis: concurrent probes, one aggregated verdict.

pub mod config;
pub mod core;
pub mod logging;
