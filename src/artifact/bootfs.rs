//! Boot archive construction via the external archive packer.
//!
//! Three archives are built here: the self-contained recovery archive
//! (kernel + boot data + command line), the boot-data sub-archive merged
//! from boot manifests, and the final installer archive that nests the
//! compressed partition images. The final archive is promoted to the
//! canonical name; whatever previously held that name is preserved under
//! the no-installer name, never deleted.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::RecoveryCmdline;
use crate::error::{Error, Result};
use crate::process::{Cmd, CmdFailure};

/// Canonical name of the boot archive the bootloader consumes.
pub const CANONICAL_ARCHIVE: &str = "user.bootfs";

/// Name under which the previous canonical archive is preserved.
pub const PREVIOUS_ARCHIVE: &str = "user-noinstaller.bootfs";

/// Staged filename for a literal recovery command line.
const RECOVERY_CMDLINE_FILE: &str = "recovery.cmdline";

/// Merge boot manifests into a boot-data sub-archive.
///
/// With manifests present, packs them (on top of `base`, when given) into a
/// fresh archive at `dest`. With no manifests the base passes through
/// unchanged, possibly absent: no packer invocation, no file written.
pub fn build_bootdata(
    packer: &Path,
    dest: &Path,
    base: Option<&Path>,
    manifests: &[PathBuf],
    working_dir: &Path,
) -> Result<Option<PathBuf>> {
    if manifests.is_empty() {
        return Ok(base.map(Path::to_path_buf));
    }

    let mut cmd = Cmd::new(packer)
        .arg("-c")
        .arg("--target=boot")
        .arg("-o")
        .arg_path(dest);
    if let Some(base) = base {
        cmd = cmd.arg_path(base);
    }
    for manifest in manifests {
        cmd = cmd.arg_path(manifest);
    }

    cmd.current_dir(working_dir)
        .run()
        .map_err(|err| archive_error(err, dest))?;
    Ok(Some(dest.to_path_buf()))
}

/// Materialize the recovery command line as a file the packer can read.
///
/// A user-supplied file is used in place; the built-in default is staged
/// under `temp_dir`.
pub fn stage_recovery_cmdline(cmdline: &RecoveryCmdline, temp_dir: &Path) -> Result<PathBuf> {
    match cmdline {
        RecoveryCmdline::File(path) => Ok(path.clone()),
        RecoveryCmdline::Literal(content) => {
            let staged = temp_dir.join(RECOVERY_CMDLINE_FILE);
            fs::write(&staged, content).map_err(|err| {
                Error::io(
                    format!("staging recovery cmdline '{}'", staged.display()),
                    err,
                )
            })?;
            Ok(staged)
        }
    }
}

/// Build the self-contained recovery boot archive.
///
/// The result is opaque to this pipeline: it is embedded into the ESP as a
/// single file and never parsed here.
pub fn build_recovery_archive(
    packer: &Path,
    kernel: &Path,
    manifest: &Path,
    cmdline_file: &Path,
    dest: &Path,
    working_dir: &Path,
) -> Result<()> {
    Cmd::new(packer)
        .arg("-o")
        .arg_path(dest)
        .arg_path(kernel)
        .arg("-C")
        .arg_path(cmdline_file)
        .arg_path(manifest)
        .current_dir(working_dir)
        .run()
        .map_err(|err| archive_error(err, dest))
}

/// Compose the final installer archive and promote it to the canonical
/// name.
///
/// The packer merges the boot-data sub-archive, the auxiliary manifest
/// (which embeds the compressed partition images), and the runtime system
/// manifests into `staging_output`. A packer failure aborts before any
/// rename, leaving the prior canonical file untouched. Returns the
/// canonical path.
pub fn compose_installer(
    packer: &Path,
    staging_output: &Path,
    bootdata: Option<&Path>,
    aux_manifest: &Path,
    runtime_manifests: &[PathBuf],
    runtime_dir: &Path,
) -> Result<PathBuf> {
    let mut cmd = Cmd::new(packer)
        .arg("-c")
        .arg("--target=system")
        .arg("-o")
        .arg_path(staging_output);
    if let Some(bootdata) = bootdata {
        cmd = cmd.arg_path(bootdata);
    }
    cmd = cmd.arg_path(aux_manifest);
    for manifest in runtime_manifests {
        cmd = cmd.arg_path(manifest);
    }

    cmd.current_dir(runtime_dir)
        .run()
        .map_err(|err| archive_error(err, staging_output))?;

    promote(staging_output)
}

/// Shift the freshly built archive into the canonical name, preserving the
/// previous canonical file under the no-installer name.
///
/// A failure here is unrecoverable: the canonical path may be left without
/// a valid archive.
fn promote(staging_output: &Path) -> Result<PathBuf> {
    let dir = staging_output.parent().unwrap_or_else(|| Path::new("."));
    let canonical = dir.join(CANONICAL_ARCHIVE);
    let previous = dir.join(PREVIOUS_ARCHIVE);

    if canonical.exists() {
        fs::rename(&canonical, &previous).map_err(|source| Error::OutputSwapFailed {
            from: canonical.clone(),
            to: previous,
            source,
        })?;
    }

    fs::rename(staging_output, &canonical).map_err(|source| Error::OutputSwapFailed {
        from: staging_output.to_path_buf(),
        to: canonical.clone(),
        source,
    })?;
    Ok(canonical)
}

fn archive_error(err: CmdFailure, output: &Path) -> Error {
    match err {
        CmdFailure::Spawn { tool, source } => Error::ToolNotFound { tool, source },
        CmdFailure::Exit { tool, status } => Error::ArchiveBuildFailed {
            tool,
            output: output.to_path_buf(),
            status,
        },
    }
}
