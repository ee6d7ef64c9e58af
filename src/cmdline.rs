//! Kernel command-line composition.
//!
//! The command-line file is a single line of space-separated `key=value`
//! tokens. Pre-existing user content is preserved verbatim; generated
//! directives are only ever appended. Key uniqueness is not enforced here:
//! shadowing semantics belong to the consuming bootloader.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Filename used when no user-supplied command-line file exists.
const GENERATED_CMDLINE: &str = "kernel_cmdline";

/// Pick the command-line file the composer will extend.
///
/// A user-supplied file is used as-is (and never truncated). Otherwise a
/// fresh file under `temp_dir` is targeted, removing a stale copy from a
/// previous run so generated directives do not accumulate.
pub fn prepare_target(user_file: Option<&Path>, temp_dir: &Path) -> Result<PathBuf> {
    if let Some(path) = user_file {
        return Ok(path.to_path_buf());
    }
    let generated = temp_dir.join(GENERATED_CMDLINE);
    if generated.exists() {
        fs::remove_file(&generated).map_err(|err| {
            Error::io(
                format!("removing stale cmdline '{}'", generated.display()),
                err,
            )
        })?;
    }
    Ok(generated)
}

/// Append one space-prefixed `key=value` token per directive.
pub fn append_directives(path: &Path, directives: &[(&str, &str)]) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| Error::io(format!("opening cmdline '{}'", path.display()), err))?;

    for (key, value) in directives {
        write!(file, " {}={}", key, value)
            .map_err(|err| Error::io(format!("appending to cmdline '{}'", path.display()), err))?;
    }
    Ok(())
}
