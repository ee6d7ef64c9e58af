//! Manifest handling.
//!
//! Manifests are UTF-8 text, one `virtual_path=source_path` entry per line.
//! The data-partition formatter parses manifest contents itself; this module
//! only filters candidate manifests and authors the auxiliary manifest that
//! embeds the compressed partition images into the final archive.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Preamble line marking an auxiliary manifest for the nested-archive merge.
pub const BOOTFS_PREAMBLE: &str = "user.bootfs";

/// On-archive path of the compressed data-partition image.
pub const DATA_IMG_PATH: &str = "installer/user_fs.lz4";

/// On-archive path of the compressed ESP image.
pub const ESP_IMG_PATH: &str = "installer/efi_fs.lz4";

/// True if `path` exists and has content.
pub fn is_non_empty_file(path: &Path) -> bool {
    fs::metadata(path).map(|meta| meta.len() > 0).unwrap_or(false)
}

/// Filter candidate manifests down to those that exist and are non-empty,
/// preserving input order.
///
/// Missing or empty manifests are dropped silently: an installer may
/// legitimately have no boot-partition contents.
pub fn existing_non_empty(candidates: &[&Path]) -> Vec<PathBuf> {
    candidates
        .iter()
        .filter(|path| is_non_empty_file(path))
        .map(|path| path.to_path_buf())
        .collect()
}

/// Author the auxiliary manifest embedding the compressed partition images.
///
/// The data-image entry is omitted when the data partition step was skipped;
/// the ESP entry is always present.
pub fn write_aux_manifest(
    dest: &Path,
    data_image: Option<&Path>,
    esp_image: &Path,
) -> Result<()> {
    let mut file = fs::File::create(dest)
        .map_err(|err| Error::io(format!("creating aux manifest '{}'", dest.display()), err))?;

    let mut write = |line: String| {
        file.write_all(line.as_bytes())
            .map_err(|err| Error::io(format!("writing aux manifest '{}'", dest.display()), err))
    };

    write(format!("{}\n", BOOTFS_PREAMBLE))?;
    if let Some(data) = data_image {
        write(format!("{}={}\n", DATA_IMG_PATH, data.display()))?;
    }
    write(format!("{}={}\n", ESP_IMG_PATH, esp_image.display()))?;
    Ok(())
}
