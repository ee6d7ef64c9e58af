//! Sparse conversion and compression of raw partition images.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::process::{Cmd, CmdFailure};

/// Convert a raw image to its sparse representation, then compress it.
///
/// Produces `<raw>.sparse` and `<raw>.lz4`, removing a stale `.lz4` first so
/// the destination is always freshly written. Returns the compressed path.
/// The sparse intermediate is transient and never consumed downstream.
pub fn compress_image(
    raw: &Path,
    sparsifier: &Path,
    compressor: &Path,
    working_dir: &Path,
) -> Result<PathBuf> {
    let sparse = path_with_suffix(raw, ".sparse");
    let compressed = path_with_suffix(raw, ".lz4");

    Cmd::new(sparsifier)
        .arg("-s")
        .arg_path(raw)
        .arg_path(&sparse)
        .current_dir(working_dir)
        .run()
        .map_err(|err| stage_error(err, raw))?;

    if compressed.exists() {
        fs::remove_file(&compressed).map_err(|err| {
            Error::io(
                format!("removing stale compressed image '{}'", compressed.display()),
                err,
            )
        })?;
    }

    Cmd::new(compressor)
        .args(["-4", "-B4"])
        .arg_path(&sparse)
        .arg_path(&compressed)
        .current_dir(working_dir)
        .run()
        .map_err(|err| stage_error(err, &sparse))?;

    Ok(compressed)
}

fn stage_error(err: CmdFailure, source_path: &Path) -> Error {
    match err {
        CmdFailure::Spawn { tool, source } => Error::ToolNotFound { tool, source },
        CmdFailure::Exit { tool, status } => Error::CompressionFailed {
            tool,
            source_path: source_path.to_path_buf(),
            status,
        },
    }
}

fn path_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}
