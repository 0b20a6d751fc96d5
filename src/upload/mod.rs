//! Encrypted Multipart Upload Module
//!
//! Moves an in-memory file to S3 as a multipart upload:
//! - SHA-1 content fingerprint of the plaintext
//! - Fixed-size chunking, one chunk per part
//! - Every part encrypted on its own under a per-upload session key
//! - Background sessions with progress published to a shared registry
//!
//! Flow:
//! 1. Caller submits bytes, file name, upload id and owner id
//! 2. Coordinator registers the upload and returns immediately
//! 3. A background task uploads the encrypted parts, updating progress
//! 4. On success the object is finalized and a completion record written;
//!    on failure the multipart upload is aborted

pub mod chunker;
pub mod cipher;
pub mod coordinator;
pub mod hash;
pub mod naming;
pub mod reconcile;
pub mod registry;
pub mod types;

pub use chunker::{Chunk, Chunker};
pub use cipher::{CipherError, CipherMode, PartCipher, SessionKey};
pub use coordinator::UploadCoordinator;
pub use hash::{compute_hash, verify_hash, EMPTY_HASH};
pub use reconcile::{reconcile_stale_uploads, start_reconcile_task};
pub use registry::ProgressRegistry;
pub use types::*;
