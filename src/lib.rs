//! Strongbox Server Library
//!
//! Encrypted multipart uploads to S3-compatible storage. The server binary
//! in main.rs wires these modules together.
//!
//! # Modules
//!
//! - `upload`: chunking, per-part encryption, background upload sessions and
//!   the progress registry
//! - `storage`: the multipart object store seam and its S3 client
//! - `db`: SQLite completion records and upload history
//! - `routes`: HTTP surface

pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod state;
pub mod storage;
pub mod upload;
