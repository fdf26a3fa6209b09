//! Reading credentials from files.

use std::path::Path;

use crate::error::{Error, Result};

/// Read a secret (token, password) from a file, trimming surrounding whitespace.
///
/// Mounted secrets usually end with a newline, which must not become part of
/// an `Authorization` header.
pub fn read_secret_file(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| Error::SecretFile {
        path: path.display().to_string(),
        source,
    })?;

    let secret = raw.trim();
    if secret.is_empty() {
        return Err(Error::EmptySecret {
            path: path.display().to_string(),
        });
    }

    Ok(secret.to_string())
}
