// src/lib.rs
// Library interface for ct-sentinel
pub mod cert_parser;
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod ct_log;
pub mod database;
pub mod error;
pub mod matcher;
pub mod monitor;
pub mod sink;
pub mod stats;
pub mod supervisor;
pub mod types;
