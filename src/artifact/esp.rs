//! ESP/FAT image assembly via the external FAT tools.
//!
//! Directory and copy operations are strictly ordered: the EFI directory
//! tree is created before anything is copied into it. Copies probe the FAT
//! image first, so re-running in the same working directory never embeds
//! the same entry twice.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::process::{Cmd, CmdFailure};

/// On-ESP kernel image name.
pub const FILE_KERNEL: &str = "kernel.bin";

/// On-ESP ramdisk (boot-data sub-archive) name.
pub const FILE_RAMDISK: &str = "ramdisk.bin";

/// On-ESP kernel command-line file name.
pub const FILE_CMDLINE: &str = "cmdline";

/// On-ESP recovery boot archive name.
pub const FILE_RECOVERY: &str = "recovery.bin";

pub const DIR_EFI: &str = "EFI";
pub const DIR_EFI_BOOT: &str = "EFI/BOOT";

/// Outcome of a FAT copy request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatCopy {
    /// The local file was copied in.
    Copied,
    /// The remote entry already existed; the copy was skipped.
    AlreadyPresent,
}

/// The three FAT tool binaries plus the working directory every call runs
/// in.
#[derive(Debug, Clone)]
pub struct FatTools {
    mcopy: PathBuf,
    mmd: PathBuf,
    mdir: PathBuf,
    working_dir: PathBuf,
}

impl FatTools {
    pub fn new(mcopy: &Path, mmd: &Path, mdir: &Path, working_dir: &Path) -> Self {
        Self {
            mcopy: mcopy.to_path_buf(),
            mmd: mmd.to_path_buf(),
            mdir: mdir.to_path_buf(),
            working_dir: working_dir.to_path_buf(),
        }
    }

    /// Create a directory inside the FAT image.
    pub fn mkdir(&self, image: &Path, dir: &str) -> Result<()> {
        Cmd::new(&self.mmd)
            .arg("-i")
            .arg_path(image)
            .arg(format!("::{}", dir))
            .current_dir(&self.working_dir)
            .run()
            .map_err(|err| fat_error(err, dir))
    }

    /// Probe whether `remote` exists inside the FAT image. Read-only.
    pub fn entry_exists(&self, image: &Path, remote: &str) -> Result<bool> {
        let probe = Cmd::new(&self.mdir)
            .arg("-i")
            .arg_path(image)
            .arg(format!("::{}", remote))
            .current_dir(&self.working_dir)
            .quiet()
            .run();
        match probe {
            Ok(()) => Ok(true),
            Err(CmdFailure::Exit { .. }) => Ok(false),
            Err(CmdFailure::Spawn { tool, source }) => Err(Error::ToolNotFound { tool, source }),
        }
    }

    /// Copy `local` into the FAT image at `remote`.
    ///
    /// An already-present remote entry is an explicit outcome, not an
    /// error: the copy is skipped and [`FatCopy::AlreadyPresent`] returned,
    /// leaving the image contents untouched.
    pub fn copy_in(&self, image: &Path, local: &Path, remote: &str) -> Result<FatCopy> {
        if self.entry_exists(image, remote)? {
            return Ok(FatCopy::AlreadyPresent);
        }

        Cmd::new(&self.mcopy)
            .arg("-i")
            .arg_path(image)
            .arg_path(local)
            .arg(format!("::{}", remote))
            .current_dir(&self.working_dir)
            .run()
            .map_err(|err| fat_error(err, remote))?;
        Ok(FatCopy::Copied)
    }
}

fn fat_error(err: CmdFailure, remote: &str) -> Error {
    match err {
        CmdFailure::Spawn { tool, source } => Error::ToolNotFound { tool, source },
        CmdFailure::Exit { tool, status } => Error::FatToolFailed {
            tool,
            remote: remote.to_string(),
            status,
        },
    }
}

/// Everything the ESP carries.
#[derive(Debug)]
pub struct EspLayout<'a> {
    pub bootloader: &'a Path,
    /// On-ESP bootloader path, e.g. `EFI/BOOT/BOOTX64.EFI`.
    pub bootloader_remote: &'a str,
    pub kernel: &'a Path,
    /// Boot-data sub-archive; absent when no boot manifests exist.
    pub ramdisk: Option<&'a Path>,
    pub recovery_archive: &'a Path,
    pub cmdline: &'a Path,
}

/// Assemble the ESP: create the EFI tree, then copy the boot files in.
pub fn assemble(tools: &FatTools, image: &Path, layout: &EspLayout) -> Result<()> {
    tools.mkdir(image, DIR_EFI)?;
    tools.mkdir(image, DIR_EFI_BOOT)?;

    let mut copies: Vec<(&Path, &str)> = vec![
        (layout.bootloader, layout.bootloader_remote),
        (layout.kernel, FILE_KERNEL),
    ];
    if let Some(ramdisk) = layout.ramdisk {
        copies.push((ramdisk, FILE_RAMDISK));
    }
    copies.push((layout.recovery_archive, FILE_RECOVERY));
    copies.push((layout.cmdline, FILE_CMDLINE));

    for (local, remote) in copies {
        if tools.copy_in(image, local, remote)? == FatCopy::AlreadyPresent {
            println!("  '{}' already present, skipping", remote);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::fake_tool;
    use std::fs;
    use tempfile::TempDir;

    // Fake FAT tools over a sidecar directory: the "image" is a plain file
    // whose entries live under `<image>.dir/`. mcopy appends a marker to
    // the image file so content changes are observable.
    const FAKE_MDIR: &str = r#"test -e "$2.dir/${3#::}""#;
    const FAKE_MMD: &str = r#"mkdir "$2.dir/${3#::}""#;
    const FAKE_MCOPY: &str = r#"mkdir -p "$(dirname "$2.dir/${4#::}")"
cp "$3" "$2.dir/${4#::}"
echo "copied ${4#::}" >> "$2""#;

    fn fat_fixture(temp: &TempDir) -> (FatTools, PathBuf) {
        let mcopy = fake_tool(temp.path(), "mcopy", FAKE_MCOPY);
        let mmd = fake_tool(temp.path(), "mmd", FAKE_MMD);
        let mdir = fake_tool(temp.path(), "mdir", FAKE_MDIR);
        let image = temp.path().join("efi_fs.img");
        fs::write(&image, b"").unwrap();
        fs::create_dir(temp.path().join("efi_fs.img.dir")).unwrap();
        (
            FatTools::new(&mcopy, &mmd, &mdir, temp.path()),
            image,
        )
    }

    #[test]
    fn second_copy_is_already_present_and_leaves_image_unchanged() {
        let temp = TempDir::new().unwrap();
        let (tools, image) = fat_fixture(&temp);

        let local = temp.path().join("kernel.bin");
        fs::write(&local, b"kernel bytes").unwrap();

        assert_eq!(
            tools.copy_in(&image, &local, FILE_KERNEL).unwrap(),
            FatCopy::Copied
        );
        let snapshot = fs::read(&image).unwrap();

        assert_eq!(
            tools.copy_in(&image, &local, FILE_KERNEL).unwrap(),
            FatCopy::AlreadyPresent
        );
        assert_eq!(fs::read(&image).unwrap(), snapshot);
    }

    #[test]
    fn mkdir_failure_is_fat_tool_failed() {
        let temp = TempDir::new().unwrap();
        let (tools, image) = fat_fixture(&temp);

        tools.mkdir(&image, DIR_EFI).unwrap();
        // mmd fails on an existing directory.
        let err = tools.mkdir(&image, DIR_EFI).unwrap_err();
        match err {
            Error::FatToolFailed { remote, .. } => assert_eq!(remote, DIR_EFI),
            other => panic!("expected FatToolFailed, got {:?}", other),
        }
    }

    #[test]
    fn missing_fat_tool_is_tool_not_found() {
        let temp = TempDir::new().unwrap();
        let mdir = fake_tool(temp.path(), "mdir", FAKE_MDIR);
        let tools = FatTools::new(
            &temp.path().join("no-such-mcopy"),
            &temp.path().join("no-such-mmd"),
            &mdir,
            temp.path(),
        );
        let image = temp.path().join("efi_fs.img");
        fs::write(&image, b"").unwrap();
        fs::create_dir(temp.path().join("efi_fs.img.dir")).unwrap();

        let local = temp.path().join("kernel.bin");
        fs::write(&local, b"kernel").unwrap();
        let err = tools.copy_in(&image, &local, FILE_KERNEL).unwrap_err();
        assert!(matches!(err, Error::ToolNotFound { .. }));
    }

    #[test]
    fn assemble_creates_tree_before_copies() {
        let temp = TempDir::new().unwrap();
        let (tools, image) = fat_fixture(&temp);

        let bootloader = temp.path().join("bootx64.efi");
        let kernel = temp.path().join("kernel.bin");
        let ramdisk = temp.path().join("ramdisk.bin");
        let recovery = temp.path().join("recovery.bin");
        let cmdline = temp.path().join("cmdline");
        for (path, content) in [
            (&bootloader, "loader"),
            (&kernel, "kernel"),
            (&ramdisk, "ramdisk"),
            (&recovery, "recovery"),
            (&cmdline, "a=b"),
        ] {
            fs::write(path, content).unwrap();
        }

        assemble(
            &tools,
            &image,
            &EspLayout {
                bootloader: &bootloader,
                bootloader_remote: "EFI/BOOT/BOOTX64.EFI",
                kernel: &kernel,
                ramdisk: Some(&ramdisk),
                recovery_archive: &recovery,
                cmdline: &cmdline,
            },
        )
        .unwrap();

        let sidecar = temp.path().join("efi_fs.img.dir");
        assert!(sidecar.join("EFI/BOOT/BOOTX64.EFI").exists());
        assert!(sidecar.join(FILE_KERNEL).exists());
        assert!(sidecar.join(FILE_RAMDISK).exists());
        assert!(sidecar.join(FILE_RECOVERY).exists());
        assert_eq!(
            fs::read(sidecar.join(FILE_CMDLINE)).unwrap(),
            b"a=b"
        );
    }

    #[test]
    fn assemble_skips_absent_ramdisk() {
        let temp = TempDir::new().unwrap();
        let (tools, image) = fat_fixture(&temp);

        let bootloader = temp.path().join("bootx64.efi");
        let kernel = temp.path().join("kernel.bin");
        let recovery = temp.path().join("recovery.bin");
        let cmdline = temp.path().join("cmdline");
        for path in [&bootloader, &kernel, &recovery, &cmdline] {
            fs::write(path, b"x").unwrap();
        }

        assemble(
            &tools,
            &image,
            &EspLayout {
                bootloader: &bootloader,
                bootloader_remote: "EFI/BOOT/BOOTX64.EFI",
                kernel: &kernel,
                ramdisk: None,
                recovery_archive: &recovery,
                cmdline: &cmdline,
            },
        )
        .unwrap();

        let sidecar = temp.path().join("efi_fs.img.dir");
        assert!(!sidecar.join(FILE_RAMDISK).exists());
        assert!(sidecar.join(FILE_RECOVERY).exists());
    }
}
