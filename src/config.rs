//! Run configuration: the raw option bundle, selector enums, and the
//! resolved artifact set the rest of the pipeline consumes.
//!
//! Resolution is computed exactly once per run and performs only read-only
//! existence checks. Explicit overrides always win over conventional paths
//! derived from the build directories.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Default directives for the recovery/netboot command line.
pub const DEFAULT_RECOVERY_CMDLINE: &str = "netsvc.netboot=true virtcon.font=18x32";

/// Target CPU architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X64,
    Arm,
    Aa64,
}

impl Arch {
    /// The spelling used in the on-ESP bootloader filename.
    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::X64 => "X64",
            Arch::Arm => "ARM",
            Arch::Aa64 => "AA64",
        }
    }
}

impl FromStr for Arch {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "X64" => Ok(Arch::X64),
            "ARM" => Ok(Arch::Arm),
            "AA64" => Ok(Arch::Aa64),
            other => Err(Error::InvalidConfiguration(format!(
                "architecture '{}' is not recognized (expected X64, ARM, or AA64)",
                other
            ))),
        }
    }
}

/// System volume mount mode baked into the kernel command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysMount {
    Local,
    Any,
    None,
}

impl SysMount {
    pub fn as_str(&self) -> &'static str {
        match self {
            SysMount::Local => "local",
            SysMount::Any => "any",
            SysMount::None => "none",
        }
    }
}

impl FromStr for SysMount {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "local" => Ok(SysMount::Local),
            "any" => Ok(SysMount::Any),
            "none" => Ok(SysMount::None),
            other => Err(Error::InvalidConfiguration(format!(
                "sys-mount '{}' is not recognized (expected local, any, or none)",
                other
            ))),
        }
    }
}

/// Recovery command line: a user-supplied file, or the built-in default.
#[derive(Debug, Clone)]
pub enum RecoveryCmdline {
    File(PathBuf),
    Literal(&'static str),
}

/// Raw option bundle, straight from the CLI.
#[derive(Debug, Clone, Default)]
pub struct ImagerOptions {
    pub temp_dir: Option<PathBuf>,
    pub disk: PathBuf,
    pub esp_disk: PathBuf,

    pub formatter: PathBuf,
    pub mcopy: PathBuf,
    pub mmd: PathBuf,
    pub mdir: PathBuf,
    pub lz4: PathBuf,
    pub tools_dir: PathBuf,
    pub packer: Option<PathBuf>,

    pub build_dir: PathBuf,
    pub kernel_build_dir: Option<PathBuf>,
    pub user_build_dir: Option<PathBuf>,
    pub recovery_build_dir: Option<PathBuf>,
    pub runtime_dir: Option<PathBuf>,

    pub kernel: Option<PathBuf>,
    pub bootloader: Option<PathBuf>,
    pub system_manifest: Option<PathBuf>,
    pub boot_manifest: Option<PathBuf>,
    pub kernel_cmdline: Option<PathBuf>,

    pub recovery_kernel: Option<PathBuf>,
    pub recovery_manifest: Option<PathBuf>,
    pub recovery_cmdline: Option<PathBuf>,

    pub arch: String,
    pub sys_mount: String,
    pub disable_thread_exp: bool,
    pub output: Option<PathBuf>,
}

/// The fully-resolved input set for one pipeline run.
///
/// Immutable once computed. Any missing required member is a terminal
/// condition before any image work begins.
#[derive(Debug, Clone)]
pub struct ResolvedArtifacts {
    pub arch: Arch,
    pub sys_mount: SysMount,
    pub thread_exp_enabled: bool,

    pub disk: PathBuf,
    pub esp_disk: PathBuf,

    pub kernel: PathBuf,
    pub bootloader: PathBuf,
    pub system_manifest: PathBuf,
    pub boot_manifest: PathBuf,
    pub kernel_cmdline: Option<PathBuf>,

    pub recovery_kernel: PathBuf,
    pub recovery_manifest: PathBuf,
    pub recovery_cmdline: RecoveryCmdline,

    pub formatter: PathBuf,
    pub mcopy: PathBuf,
    pub mmd: PathBuf,
    pub mdir: PathBuf,
    pub lz4: PathBuf,
    pub sparsifier: PathBuf,
    pub packer: PathBuf,

    pub build_dir: PathBuf,
    pub runtime_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub output: PathBuf,
    pub working_dir: PathBuf,
}

impl ResolvedArtifacts {
    /// Resolve the option bundle against the given process working
    /// directory.
    ///
    /// Selector validation happens before any path is examined, so an
    /// out-of-range value never reaches the filesystem.
    pub fn resolve(opts: &ImagerOptions, working_dir: &Path) -> Result<Self> {
        let arch: Arch = opts.arch.parse()?;
        let sys_mount: SysMount = opts.sys_mount.parse()?;

        let kernel = resolve_artifact(
            opts.kernel.as_deref(),
            opts.kernel_build_dir.as_deref(),
            "kernel.bin",
            "either --kernel or --kernel-build-dir is required",
        )?;
        ensure_exists(&kernel, "kernel")?;

        let bootloader = resolve_artifact(
            opts.bootloader.as_deref(),
            opts.kernel_build_dir.as_deref(),
            "bootloader/bootx64.efi",
            "either --bootloader or --kernel-build-dir is required",
        )?;
        // Only the X64 boot path goes through the EFI loader.
        if arch == Arch::X64 {
            ensure_exists(&bootloader, "EFI bootloader")?;
        }

        let recovery_kernel = match (&opts.recovery_kernel, &opts.recovery_build_dir) {
            (Some(explicit), _) => explicit.clone(),
            (None, Some(dir)) => dir.join("kernel.bin"),
            (None, None) => kernel.clone(),
        };

        let recovery_manifest = resolve_artifact(
            opts.recovery_manifest.as_deref(),
            opts.user_build_dir.as_deref(),
            "bootfs.manifest",
            "either --recovery-manifest or --user-build-dir is required",
        )?;
        ensure_exists(&recovery_manifest, "recovery boot-data manifest")?;

        let recovery_cmdline = match &opts.recovery_cmdline {
            Some(path) => {
                ensure_exists(path, "recovery cmdline file")?;
                RecoveryCmdline::File(path.clone())
            }
            None => RecoveryCmdline::Literal(DEFAULT_RECOVERY_CMDLINE),
        };

        let system_manifest = opts
            .system_manifest
            .clone()
            .unwrap_or_else(|| opts.build_dir.join("system.manifest"));
        let boot_manifest = opts
            .boot_manifest
            .clone()
            .unwrap_or_else(|| opts.build_dir.join("boot.manifest"));

        let sparsifier = opts.tools_dir.join("sparse");
        let packer = opts
            .packer
            .clone()
            .unwrap_or_else(|| opts.tools_dir.join("mkbootfs"));
        for (tool, path) in [
            ("filesystem formatter", &opts.formatter),
            ("mcopy tool", &opts.mcopy),
            ("mmd tool", &opts.mmd),
            ("mdir tool", &opts.mdir),
            ("compressor", &opts.lz4),
            ("sparsifier", &sparsifier),
            ("archive packer", &packer),
        ] {
            ensure_exists(path, tool)?;
        }

        // A relative data-disk path is anchored at the working directory.
        let disk = if opts.disk.is_absolute() {
            opts.disk.clone()
        } else {
            working_dir.join(&opts.disk)
        };

        let temp_dir = opts
            .temp_dir
            .clone()
            .unwrap_or_else(|| working_dir.join("build-installer"));
        let runtime_dir = opts
            .runtime_dir
            .clone()
            .unwrap_or_else(|| opts.build_dir.clone());
        let output = opts
            .output
            .clone()
            .unwrap_or_else(|| opts.build_dir.join("installer.bootfs"));

        Ok(Self {
            arch,
            sys_mount,
            thread_exp_enabled: !opts.disable_thread_exp,
            disk,
            esp_disk: opts.esp_disk.clone(),
            kernel,
            bootloader,
            system_manifest,
            boot_manifest,
            kernel_cmdline: opts.kernel_cmdline.clone(),
            recovery_kernel,
            recovery_manifest,
            recovery_cmdline,
            formatter: opts.formatter.clone(),
            mcopy: opts.mcopy.clone(),
            mmd: opts.mmd.clone(),
            mdir: opts.mdir.clone(),
            lz4: opts.lz4.clone(),
            sparsifier,
            packer,
            build_dir: opts.build_dir.clone(),
            runtime_dir,
            temp_dir,
            output,
            working_dir: working_dir.to_path_buf(),
        })
    }

    /// Auxiliary manifest path used by the final composition step.
    pub fn aux_manifest_path(&self) -> PathBuf {
        self.temp_dir.join("installer.manifest")
    }

    /// On-ESP path of the bootloader, derived from the architecture.
    pub fn bootloader_remote_path(&self) -> String {
        format!("EFI/BOOT/BOOT{}.EFI", self.arch.as_str())
    }
}

fn resolve_artifact(
    explicit: Option<&Path>,
    base_dir: Option<&Path>,
    conventional: &str,
    unresolved_msg: &str,
) -> Result<PathBuf> {
    match (explicit, base_dir) {
        (Some(path), _) => Ok(path.to_path_buf()),
        (None, Some(dir)) => Ok(dir.join(conventional)),
        (None, None) => Err(Error::InvalidConfiguration(unresolved_msg.to_string())),
    }
}

fn ensure_exists(path: &Path, artifact: &'static str) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    Err(Error::MissingArtifact {
        artifact,
        path: path.to_path_buf(),
    })
}
