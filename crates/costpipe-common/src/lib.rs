//! Costpipe Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the Costpipe workspace.
//!
//! # Overview
//!
//! - **Error Handling**: Common error type and result alias
//! - **Checksums**: File digests used to verify staged uploads
//! - **Logging**: Console/file subscriber setup and the per-run log file
//! - **Object paths**: Prefix joining and basename rules shared by staging and archive
//!
//! # Example
//!
//! ```no_run
//! use costpipe_common::checksum::verify_file_md5_base64;
//! use costpipe_common::object_path;
//!
//! fn check(path: &str, md5_hash: &str) -> costpipe_common::Result<String> {
//!     verify_file_md5_base64(path, md5_hash)?;
//!     Ok(object_path::join("staging", "0001.csv"))
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;
pub mod object_path;
pub mod types;

// Re-export commonly used types
pub use error::{CommonError, Result};
