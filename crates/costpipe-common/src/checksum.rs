//! MD5 digests of local files
//!
//! Object stores report the MD5 of every stored blob as base64 (`md5Hash` in
//! the Cloud Storage metadata). Staged uploads are checked against it.

use crate::error::{CommonError, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::io::Read;
use std::path::Path;

const BUFFER_SIZE: usize = 8192;

/// Raw MD5 digest of everything `reader` yields
pub fn md5_digest<R: Read>(reader: &mut R) -> Result<[u8; 16]> {
    let mut buffer = [0u8; BUFFER_SIZE];
    let mut context = md5::Context::new();
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        context.consume(&buffer[..n]);
    }
    Ok(context.compute().0)
}

/// Hex MD5 of a file
pub fn file_md5_hex(path: impl AsRef<Path>) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    Ok(hex::encode(md5_digest(&mut file)?))
}

/// Check a file against the base64 MD5 reported by an object store.
///
/// Both sides of a [`CommonError::ChecksumMismatch`] are rendered as hex.
pub fn verify_file_md5_base64(path: impl AsRef<Path>, expected_base64: &str) -> Result<()> {
    let expected = STANDARD
        .decode(expected_base64.trim())
        .map_err(|e| CommonError::InvalidChecksum(e.to_string()))?;

    let actual = file_md5_hex(path)?;
    let expected = hex::encode(expected);
    if actual == expected {
        Ok(())
    } else {
        Err(CommonError::ChecksumMismatch { expected, actual })
    }
}
