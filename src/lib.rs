//! cutool - component usage audit.
//!
//! Builds a per-market URL inventory from sitemaps, captures each page (with
//! headless rendering for script-heavy pages), detects UI components with
//! DOM heuristics, and gates detection precision against human review labels.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod detection;
pub mod discovery;
pub mod export;
pub mod fetch;
pub mod gate;
pub mod models;
pub mod repository;
pub mod scrapers;
pub mod storage;
