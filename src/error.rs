//! Typed failure taxonomy for the imager pipeline.
//!
//! Every stage reports failure through one of these variants, carrying the
//! failing tool and path so the report is actionable without a re-run.
//! There are no retries anywhere; the first failure aborts the pipeline.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the installer image pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// A required input was not found after resolution.
    #[error("required {artifact} not found at '{}'", .path.display())]
    MissingArtifact {
        artifact: &'static str,
        path: PathBuf,
    },

    /// A configuration selector was outside its enumerated set, or an
    /// artifact had no basis for resolution.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// An external tool binary could not be executed.
    #[error("unable to execute '{tool}': {source}")]
    ToolNotFound {
        tool: String,
        #[source]
        source: io::Error,
    },

    /// The filesystem formatter exited non-zero.
    #[error("'{tool}' failed building image '{}' ({status})", .image.display())]
    ImageBuildFailed {
        tool: String,
        image: PathBuf,
        status: ExitStatus,
    },

    /// The sparsifier or compressor exited non-zero.
    #[error("'{tool}' failed compressing '{}' ({status})", .source_path.display())]
    CompressionFailed {
        tool: String,
        source_path: PathBuf,
        status: ExitStatus,
    },

    /// A FAT tool exited non-zero.
    #[error("'{tool}' failed on FAT entry '{remote}' ({status})")]
    FatToolFailed {
        tool: String,
        remote: String,
        status: ExitStatus,
    },

    /// The archive packer exited non-zero.
    #[error("'{tool}' failed building archive '{}' ({status})", .output.display())]
    ArchiveBuildFailed {
        tool: String,
        output: PathBuf,
        status: ExitStatus,
    },

    /// Promoting the freshly built archive to the canonical name failed.
    ///
    /// Unrecoverable: the canonical path may be left without a valid
    /// archive.
    #[error("failed to promote '{}' to '{}': {source}", .from.display(), .to.display())]
    OutputSwapFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Local file work failed (manifest or cmdline authoring).
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// Wrap a local I/O failure with the path it concerns.
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}
