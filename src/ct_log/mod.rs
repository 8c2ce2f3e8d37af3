// src/ct_log/mod.rs
pub mod client;
pub mod scanner;
pub mod types;

pub use client::CtLogClient;
pub use scanner::{HttpLogScanner, LogScanner, ScanObserver, ScanOptions};
pub use types::{GetEntriesResponse, RawLogEntry, SignedTreeHead};
