//! Image and archive builders.
//!
//! This module wraps the external binary-format builders:
//! - [`minfs`] - data-partition images via the filesystem formatter
//! - [`compress`] - sparse conversion and compression of raw images
//! - [`esp`] - ESP/FAT assembly via the FAT tools
//! - [`bootfs`] - boot archives via the archive packer, including the final
//!   nested installer archive
//!
//! Every builder is a pure function of already-resolved inputs; sequencing
//! belongs to the [`crate::pipeline`] orchestrator.

pub mod bootfs;
pub mod compress;
pub mod esp;
pub mod minfs;
