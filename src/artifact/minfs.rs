//! Data-partition image construction via the external filesystem formatter.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::process::{Cmd, CmdFailure};

/// Build the data-partition image from the given manifests.
///
/// The formatter overwrites `dest` and prints the number of entries copied
/// as the last line of its stdout; that count is returned for the
/// user-facing summary only. With an empty manifest list the step is
/// skipped entirely: no formatter invocation, no image file, `Ok(None)`.
pub fn build_data_image(
    manifests: &[PathBuf],
    dest: &Path,
    formatter: &Path,
    working_dir: &Path,
) -> Result<Option<u64>> {
    if manifests.is_empty() {
        return Ok(None);
    }

    let mut cmd = Cmd::new(formatter).arg_path(dest).arg("create");
    for manifest in manifests {
        cmd = cmd.arg("--manifest").arg_path(manifest);
    }

    let stdout = cmd
        .current_dir(working_dir)
        .run_capture()
        .map_err(|err| match err {
            CmdFailure::Spawn { tool, source } => Error::ToolNotFound { tool, source },
            CmdFailure::Exit { tool, status } => Error::ImageBuildFailed {
                tool,
                image: dest.to_path_buf(),
                status,
            },
        })?;

    Ok(Some(parse_file_count(&stdout)))
}

/// Last non-empty stdout line, parsed as the copied-entry count.
/// An unparsable count is reported as zero, not an error.
fn parse_file_count(stdout: &str) -> u64 {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .next_back()
        .and_then(|line| line.trim().parse().ok())
        .unwrap_or(0)
}
