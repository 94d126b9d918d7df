//! ClickGuard - ad-click fraud scoring and auto-block service
//!
//! Scores tracked clicks (fingerprint + behavior + history) into a fraud score
//! and verdict, and blocks abusive IPs per site for a time window.
//!
//! # Architecture
//! - `detection`: Rule tables, historical signals and the scorer
//! - `blocking`: Auto-block engine, trigger queue and periodic tasks
//! - `ingestion`: Tracker event pipeline and the injected click counter
//! - `storage`: `EventStore` trait with SeaORM and in-memory backends
//! - `api`: HTTP services
//! - `interfaces`: Command-line commands
//! - `config`: Configuration management
//! - `runtime`: Application lifecycle and execution modes
//! - `system`: Logging

pub mod api;
pub mod blocking;
pub mod cli;
pub mod config;
pub mod detection;
pub mod errors;
pub mod ingestion;
pub mod interfaces;
pub mod runtime;
pub mod storage;
pub mod system;
pub mod utils;
