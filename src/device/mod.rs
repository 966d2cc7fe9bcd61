// This module defines the device side of the offload pass: the program image the pass
// accumulates, the interface through which that image is compiled to a relocatable object,
// and the interface through which the compiled object's section table is read back. The pass
// only depends on the DeviceCompiler and ObjectInspector traits; ElfImageCompiler and
// ElfInspector are the concrete implementations shipped with the crate, built on the object
// crate's writer and reader. DeviceTarget names the instruction set and execution model an
// image is compiled for.

//! Device program image, compilation and object inspection.
//!
//! - [`image`] - [`DeviceImage`], [`DeviceFunction`] and their [`Argument`]s
//! - [`elf`] - [`ElfImageCompiler`], the reference [`DeviceCompiler`]
//! - [`inspect`] - [`ObjectInspector`] and the `object`-based [`ElfInspector`]

pub mod elf;
pub mod image;
pub mod inspect;

pub use elf::ElfImageCompiler;
pub use image::{Argument, ArgumentKind, DeviceFunction, DeviceImage, Linkage};
pub use inspect::{ElfInspector, ObjectInspector, SectionInfo};

use crate::x64::EncodingError;
use std::fmt;
use thiserror::Error;

/// Operating environment the device code runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetOs {
    /// Code loaded and run by the coprocessor's remote runtime.
    HexagonRemote,
    /// Remote execution model simulated in the host process.
    Simulator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetArch {
    Hexagon,
    X86_64,
}

/// Instruction set and execution model of a device image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceTarget {
    pub os: TargetOs,
    pub arch: TargetArch,
    pub bits: u8,
}

impl DeviceTarget {
    pub const fn hexagon_remote() -> Self {
        Self { os: TargetOs::HexagonRemote, arch: TargetArch::Hexagon, bits: 32 }
    }

    pub const fn simulator() -> Self {
        Self { os: TargetOs::Simulator, arch: TargetArch::X86_64, bits: 64 }
    }

    /// Parse the `Display` form, e.g. `hexagon-32-remote`.
    pub fn from_name(name: &str) -> Option<Self> {
        [Self::hexagon_remote(), Self::simulator()].into_iter().find(|t| t.to_string() == name)
    }
}

impl Default for DeviceTarget {
    fn default() -> Self {
        Self::simulator()
    }
}

impl fmt::Display for DeviceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arch = match self.arch {
            TargetArch::Hexagon => "hexagon",
            TargetArch::X86_64 => "x86",
        };
        let os = match self.os {
            TargetOs::HexagonRemote => "remote",
            TargetOs::Simulator => "sim",
        };
        write!(f, "{arch}-{}-{os}", self.bits)
    }
}

/// Errors reported by a device image compiler.
#[derive(Error, Debug)]
pub enum DeviceCompileError {
    #[error("No device backend for target {target}")]
    UnsupportedTarget { target: String },

    #[error("Device function {function} is ill-formed: {reason}")]
    IllFormed { function: String, reason: String },

    #[error("Encoding {function} failed: {source}")]
    Encoding {
        function: String,
        #[source]
        source: EncodingError,
    },

    #[error("Failed to write device object: {0}")]
    Object(#[from] object::write::Error),
}

/// Compiles a device image to a relocatable object.
///
/// Implementations must be deterministic: the same image yields the same bytes.
pub trait DeviceCompiler {
    fn compile(&self, image: &DeviceImage) -> Result<Vec<u8>, DeviceCompileError>;
}

impl<C: DeviceCompiler + ?Sized> DeviceCompiler for &C {
    fn compile(&self, image: &DeviceImage) -> Result<Vec<u8>, DeviceCompileError> {
        (**self).compile(image)
    }
}
