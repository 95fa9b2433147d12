// src/core/mod.rs

// Analysis engine: data model, the probe set and the orchestrator that runs
// it, plus the network clients the probes share.

pub mod aggregator;
pub mod browser;
pub mod error;
pub mod models;
pub mod net;
pub mod orchestrator;
pub mod probes;
pub mod whois;
