//! Top-level orchestration of the installer image pipeline.
//!
//! Strictly sequential: every external-tool call blocks to completion
//! before the next stage starts. The first failure aborts the run; no
//! stage retries. Intermediate files (raw and sparse images, the auxiliary
//! manifest) are left behind on abort.

use std::fs;
use std::path::PathBuf;

use crate::artifact::{bootfs, compress, esp, minfs};
use crate::cmdline;
use crate::config::ResolvedArtifacts;
use crate::error::{Error, Result};
use crate::manifest;

/// Build-dir filename for boot-data sub-archives.
const BOOTDATA_ARCHIVE: &str = "installer.bootdata.bootfs";

/// Build-dir filename for the recovery boot archive.
const RECOVERY_ARCHIVE: &str = "recovery.bin";

/// What a completed run produced.
#[derive(Debug)]
pub struct RunSummary {
    /// Entries copied into the data partition; `None` when the step was
    /// skipped for lack of manifests.
    pub data_files: Option<u64>,
    /// Canonical path of the installer boot archive.
    pub canonical: PathBuf,
}

/// Run the full pipeline over an already-resolved artifact set.
pub fn run(artifacts: &ResolvedArtifacts) -> Result<RunSummary> {
    fs::create_dir_all(&artifacts.temp_dir).map_err(|err| {
        Error::io(
            format!("creating temp dir '{}'", artifacts.temp_dir.display()),
            err,
        )
    })?;

    // Data partition: build, sparsify, compress.
    println!("Copying files to disk image.");
    let system_manifests = manifest::existing_non_empty(&[&artifacts.system_manifest]);
    let data_files = minfs::build_data_image(
        &system_manifests,
        &artifacts.disk,
        &artifacts.formatter,
        &artifacts.working_dir,
    )?;

    let compressed_data = match data_files {
        Some(count) => {
            println!("\nCopied {} files", count);
            println!(
                "Compressing system disk image to {}.lz4",
                artifacts.disk.display()
            );
            Some(compress::compress_image(
                &artifacts.disk,
                &artifacts.sparsifier,
                &artifacts.lz4,
                &artifacts.working_dir,
            )?)
        }
        None => {
            println!("\nNo system manifests; skipping data partition");
            None
        }
    };

    // Boot-side inputs for the ESP.
    let boot_manifests = manifest::existing_non_empty(&[&artifacts.boot_manifest]);
    let ramdisk = bootfs::build_bootdata(
        &artifacts.packer,
        &artifacts.build_dir.join(BOOTDATA_ARCHIVE),
        None,
        &boot_manifests,
        &artifacts.build_dir,
    )?;

    let recovery_cmdline =
        bootfs::stage_recovery_cmdline(&artifacts.recovery_cmdline, &artifacts.temp_dir)?;
    let recovery_archive = artifacts.build_dir.join(RECOVERY_ARCHIVE);
    bootfs::build_recovery_archive(
        &artifacts.packer,
        &artifacts.recovery_kernel,
        &artifacts.recovery_manifest,
        &recovery_cmdline,
        &recovery_archive,
        &artifacts.working_dir,
    )?;

    let cmdline_file =
        cmdline::prepare_target(artifacts.kernel_cmdline.as_deref(), &artifacts.temp_dir)?;
    cmdline::append_directives(
        &cmdline_file,
        &[
            (
                "thread.set.priority.allowed",
                if artifacts.thread_exp_enabled {
                    "true"
                } else {
                    "false"
                },
            ),
            ("sys_mount", artifacts.sys_mount.as_str()),
        ],
    )?;
    println!("Composed command line '{}'", cmdline_file.display());

    let fat = esp::FatTools::new(
        &artifacts.mcopy,
        &artifacts.mmd,
        &artifacts.mdir,
        &artifacts.working_dir,
    );
    let bootloader_remote = artifacts.bootloader_remote_path();
    esp::assemble(
        &fat,
        &artifacts.esp_disk,
        &esp::EspLayout {
            bootloader: &artifacts.bootloader,
            bootloader_remote: &bootloader_remote,
            kernel: &artifacts.kernel,
            ramdisk: ramdisk.as_deref(),
            recovery_archive: &recovery_archive,
            cmdline: &cmdline_file,
        },
    )?;

    println!(
        "Compressing ESP disk image to {}.lz4",
        artifacts.esp_disk.display()
    );
    let compressed_esp = compress::compress_image(
        &artifacts.esp_disk,
        &artifacts.sparsifier,
        &artifacts.lz4,
        &artifacts.working_dir,
    )?;

    // Runtime layer: manifests and boot data from the runtime directory.
    let runtime_system = artifacts.runtime_dir.join("system.manifest");
    let runtime_boot = artifacts.runtime_dir.join("boot.manifest");
    let runtime_system_manifests = manifest::existing_non_empty(&[&runtime_system]);
    let runtime_boot_manifests = manifest::existing_non_empty(&[&runtime_boot]);

    let runtime_bootdata = bootfs::build_bootdata(
        &artifacts.packer,
        &artifacts.runtime_dir.join(BOOTDATA_ARCHIVE),
        None,
        &runtime_boot_manifests,
        &artifacts.runtime_dir,
    )?;

    // Nest the compressed images into the final archive.
    let aux_manifest = artifacts.aux_manifest_path();
    manifest::write_aux_manifest(
        &aux_manifest,
        compressed_data.as_deref(),
        &compressed_esp,
    )?;

    println!("Creating installer bootfs");
    let canonical = bootfs::compose_installer(
        &artifacts.packer,
        &artifacts.output,
        runtime_bootdata.as_deref(),
        &aux_manifest,
        &runtime_system_manifests,
        &artifacts.runtime_dir,
    )?;

    println!("Installer bootfs at {}", canonical.display());
    Ok(RunSummary {
        data_files,
        canonical,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ImagerOptions;
    use crate::testutil::fake_tool;
    use std::path::Path;
    use tempfile::TempDir;

    const FAKE_FORMATTER: &str = r#"dest="$1"; shift 2
: > "$dest"
count=0
while [ -n "$1" ]; do
  if [ "$1" = "--manifest" ]; then
    shift
    count=$((count + $(grep -c . "$1")))
    cat "$1" >> "$dest"
  fi
  shift
done
echo "$count""#;
    const FAKE_SPARSE: &str = r#"cp "$2" "$3""#;
    const FAKE_LZ4: &str = r#"cp "$3" "$4""#;
    const FAKE_MDIR: &str = r#"test -e "$2.dir/${3#::}""#;
    const FAKE_MMD: &str = r#"mkdir -p "$2.dir/${3#::}""#;
    const FAKE_MCOPY: &str = r#"mkdir -p "$(dirname "$2.dir/${4#::}")"
cp "$3" "$2.dir/${4#::}""#;
    const FAKE_PACKER: &str = r#"out=""
inputs=""
while [ -n "$1" ]; do
  case "$1" in
    -o) shift; out="$1";;
    -c|-C|--target=*) ;;
    *) inputs="$inputs $1";;
  esac
  shift
done
cat $inputs > "$out""#;

    fn fixture(root: &Path) -> ImagerOptions {
        let tools = root.join("tools");
        fs::create_dir_all(&tools).unwrap();
        fake_tool(&tools, "minfs", FAKE_FORMATTER);
        fake_tool(&tools, "sparse", FAKE_SPARSE);
        fake_tool(&tools, "lz4", FAKE_LZ4);
        fake_tool(&tools, "mdir", FAKE_MDIR);
        fake_tool(&tools, "mmd", FAKE_MMD);
        fake_tool(&tools, "mcopy", FAKE_MCOPY);
        fake_tool(&tools, "mkbootfs", FAKE_PACKER);

        let build = root.join("build");
        let kernel_build = root.join("build-kernel");
        let user_build = root.join("build-user");
        fs::create_dir_all(&build).unwrap();
        fs::create_dir_all(kernel_build.join("bootloader")).unwrap();
        fs::create_dir_all(&user_build).unwrap();

        fs::write(kernel_build.join("kernel.bin"), b"kernel|").unwrap();
        fs::write(kernel_build.join("bootloader/bootx64.efi"), b"loader").unwrap();
        fs::write(user_build.join("bootfs.manifest"), b"netstack=/src/netstack\n").unwrap();
        fs::write(build.join("system.manifest"), b"bin/sh=/src/sh\nbin/ls=/src/ls\n").unwrap();
        fs::write(build.join("boot.manifest"), b"boot/drv=/src/drv\n").unwrap();

        let esp_disk = root.join("efi_fs.img");
        fs::write(&esp_disk, b"").unwrap();
        fs::create_dir(root.join("efi_fs.img.dir")).unwrap();

        ImagerOptions {
            temp_dir: Some(root.join("build-installer")),
            disk: root.join("user_fs.img"),
            esp_disk,
            formatter: tools.join("minfs"),
            mcopy: tools.join("mcopy"),
            mmd: tools.join("mmd"),
            mdir: tools.join("mdir"),
            lz4: tools.join("lz4"),
            tools_dir: tools,
            build_dir: build,
            kernel_build_dir: Some(kernel_build),
            user_build_dir: Some(user_build),
            arch: "X64".to_string(),
            sys_mount: "any".to_string(),
            ..ImagerOptions::default()
        }
    }

    #[test]
    fn full_run_produces_canonical_archive() {
        let temp = TempDir::new().unwrap();
        let opts = fixture(temp.path());
        let resolved = ResolvedArtifacts::resolve(&opts, temp.path()).unwrap();

        let summary = run(&resolved).unwrap();

        assert_eq!(summary.data_files, Some(2));
        assert_eq!(
            summary.canonical,
            temp.path().join("build").join(bootfs::CANONICAL_ARCHIVE)
        );

        // Compressed images sit beside the working disks.
        assert!(temp.path().join("user_fs.img.lz4").exists());
        assert!(temp.path().join("efi_fs.img.lz4").exists());

        // The ESP carries the full boot set.
        let sidecar = temp.path().join("efi_fs.img.dir");
        assert!(sidecar.join("EFI/BOOT/BOOTX64.EFI").exists());
        assert!(sidecar.join(esp::FILE_KERNEL).exists());
        assert!(sidecar.join(esp::FILE_RAMDISK).exists());
        assert!(sidecar.join(esp::FILE_RECOVERY).exists());
        let esp_cmdline = fs::read_to_string(sidecar.join(esp::FILE_CMDLINE)).unwrap();
        assert!(esp_cmdline.contains("thread.set.priority.allowed=true"));
        assert!(esp_cmdline.contains("sys_mount=any"));

        // The final archive nests the aux manifest naming both images.
        let archive = fs::read_to_string(&summary.canonical).unwrap();
        assert!(archive.contains(manifest::BOOTFS_PREAMBLE));
        assert!(archive.contains(manifest::DATA_IMG_PATH));
        assert!(archive.contains(manifest::ESP_IMG_PATH));
        // Runtime system manifest was merged in.
        assert!(archive.contains("bin/sh=/src/sh"));
    }

    #[test]
    fn rerun_preserves_previous_canonical() {
        let temp = TempDir::new().unwrap();
        let opts = fixture(temp.path());
        let resolved = ResolvedArtifacts::resolve(&opts, temp.path()).unwrap();

        let first = run(&resolved).unwrap();
        let first_bytes = fs::read(&first.canonical).unwrap();

        let second = run(&resolved).unwrap();
        assert_eq!(second.canonical, first.canonical);
        assert_eq!(
            fs::read(temp.path().join("build").join(bootfs::PREVIOUS_ARCHIVE)).unwrap(),
            first_bytes
        );
    }

    #[test]
    fn missing_system_manifest_skips_data_partition() {
        let temp = TempDir::new().unwrap();
        let opts = fixture(temp.path());
        fs::remove_file(temp.path().join("build/system.manifest")).unwrap();
        let resolved = ResolvedArtifacts::resolve(&opts, temp.path()).unwrap();

        let summary = run(&resolved).unwrap();

        assert_eq!(summary.data_files, None);
        assert!(!temp.path().join("user_fs.img").exists());
        assert!(!temp.path().join("user_fs.img.lz4").exists());

        let archive = fs::read_to_string(&summary.canonical).unwrap();
        assert!(!archive.contains(manifest::DATA_IMG_PATH));
        assert!(archive.contains(manifest::ESP_IMG_PATH));
    }

    #[test]
    fn disable_thread_exp_flips_the_directive() {
        let temp = TempDir::new().unwrap();
        let mut opts = fixture(temp.path());
        opts.disable_thread_exp = true;
        opts.sys_mount = "none".to_string();
        let resolved = ResolvedArtifacts::resolve(&opts, temp.path()).unwrap();

        run(&resolved).unwrap();

        let esp_cmdline = fs::read_to_string(
            temp.path().join("efi_fs.img.dir").join(esp::FILE_CMDLINE),
        )
        .unwrap();
        assert!(esp_cmdline.contains("thread.set.priority.allowed=false"));
        assert!(esp_cmdline.contains("sys_mount=none"));
    }
}
