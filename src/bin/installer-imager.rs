//! CLI entry point for the installer image pipeline.
//!
//! Exit code is `0` on success and `1` on any resolution or tool failure.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use installer_imager::config::{ImagerOptions, ResolvedArtifacts};
use installer_imager::pipeline;

#[derive(Parser)]
#[command(name = "installer-imager")]
#[command(about = "Assemble the installer boot archive from build manifests", long_about = None)]
struct Args {
    /// Directory for temporary files
    #[arg(long, value_name = "DIR")]
    temp_dir: Option<PathBuf>,

    /// File to use as the data-partition disk image
    #[arg(long, value_name = "FILE")]
    disk: PathBuf,

    /// File to use as the ESP disk image
    #[arg(long, value_name = "FILE")]
    esp_disk: PathBuf,

    /// Path to the filesystem formatter binary
    #[arg(long, value_name = "BIN")]
    formatter: PathBuf,

    /// Path to the mcopy binary
    #[arg(long, value_name = "BIN")]
    mcopy: PathBuf,

    /// Path to the mmd binary
    #[arg(long, value_name = "BIN")]
    mmd: PathBuf,

    /// Path to the mdir binary
    #[arg(long, value_name = "BIN")]
    mdir: PathBuf,

    /// Path to the lz4 compressor binary
    #[arg(long, value_name = "BIN")]
    lz4: PathBuf,

    /// Directory holding the build tools (sparse, mkbootfs)
    #[arg(long, value_name = "DIR")]
    tools_dir: PathBuf,

    /// Path to the archive packer, if not under --tools-dir
    #[arg(long, value_name = "BIN")]
    packer: Option<PathBuf>,

    /// Location of system build output
    #[arg(long, value_name = "DIR")]
    build_dir: PathBuf,

    /// Directory holding kernel build artifacts
    #[arg(long, value_name = "DIR")]
    kernel_build_dir: Option<PathBuf>,

    /// Directory holding user-space build artifacts
    #[arg(long, value_name = "DIR")]
    user_build_dir: Option<PathBuf>,

    /// Directory to take recovery artifacts from
    #[arg(long, value_name = "DIR")]
    recovery_build_dir: Option<PathBuf>,

    /// Output directory containing the runtime available to the installer
    #[arg(long, value_name = "DIR")]
    runtime_dir: Option<PathBuf>,

    /// Location of the kernel image
    #[arg(long, value_name = "FILE")]
    kernel: Option<PathBuf>,

    /// Location of the EFI bootloader
    #[arg(long, value_name = "FILE")]
    bootloader: Option<PathBuf>,

    /// Location of the primary file manifest
    #[arg(long, value_name = "FILE")]
    system_manifest: Option<PathBuf>,

    /// Location of the boot partition manifest
    #[arg(long, value_name = "FILE")]
    boot_manifest: Option<PathBuf>,

    /// File with pre-existing kernel command line options
    #[arg(long, value_name = "FILE")]
    kernel_cmdline: Option<PathBuf>,

    /// Kernel to use for the recovery boot path
    #[arg(long, value_name = "FILE")]
    recovery_kernel: Option<PathBuf>,

    /// Boot-data manifest for the recovery boot path
    #[arg(long, value_name = "FILE")]
    recovery_manifest: Option<PathBuf>,

    /// Command-line file for the recovery boot path
    #[arg(long, value_name = "FILE")]
    recovery_cmdline: Option<PathBuf>,

    /// Target CPU architecture
    #[arg(long, default_value = "X64", value_name = "X64|ARM|AA64")]
    arch: String,

    /// System volume mount mode
    #[arg(long, default_value = "any", value_name = "local|any|none")]
    sys_mount: String,

    /// Disable the experimental thread prioritization directive
    #[arg(long)]
    disable_thread_exp: bool,

    /// Where to put the staged boot archive before promotion
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,
}

impl Args {
    fn into_options(self) -> ImagerOptions {
        ImagerOptions {
            temp_dir: self.temp_dir,
            disk: self.disk,
            esp_disk: self.esp_disk,
            formatter: self.formatter,
            mcopy: self.mcopy,
            mmd: self.mmd,
            mdir: self.mdir,
            lz4: self.lz4,
            tools_dir: self.tools_dir,
            packer: self.packer,
            build_dir: self.build_dir,
            kernel_build_dir: self.kernel_build_dir,
            user_build_dir: self.user_build_dir,
            recovery_build_dir: self.recovery_build_dir,
            runtime_dir: self.runtime_dir,
            kernel: self.kernel,
            bootloader: self.bootloader,
            system_manifest: self.system_manifest,
            boot_manifest: self.boot_manifest,
            kernel_cmdline: self.kernel_cmdline,
            recovery_kernel: self.recovery_kernel,
            recovery_manifest: self.recovery_manifest,
            recovery_cmdline: self.recovery_cmdline,
            arch: self.arch,
            sys_mount: self.sys_mount,
            disable_thread_exp: self.disable_thread_exp,
            output: self.output,
        }
    }
}

fn main() -> Result<()> {
    let opts = Args::parse().into_options();

    let working_dir = std::env::current_dir().context("resolving current directory")?;
    let artifacts = ResolvedArtifacts::resolve(&opts, &working_dir)?;
    pipeline::run(&artifacts)?;
    Ok(())
}
