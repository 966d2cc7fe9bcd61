//! Offload injection for device-tagged loops.
//!
//! Pipelines schedule some loops on a remote device (a Hexagon DSP) by
//! tagging them with a [`DeviceApi`](ir::DeviceApi). This crate rewrites such
//! a host program: every tagged loop is extracted into a device function,
//! the functions are compiled together into one relocatable device image,
//! and each loop is replaced by a marshaled call into the offload runtime.
//! The compiled image is embedded in the host program and the runtime is
//! initialized before the first call.
//!
//! # Primary Usage
//!
//! ```ignore
//! use offload::{OffloadConfig, OffloadPass};
//! use offload::text::parse_program;
//!
//! let program = parse_program(&text)?;
//! let injected = OffloadPass::new(OffloadConfig::default()).run(program.body)?;
//! println!("{}", injected.body);
//! ```
//!
//! # Architecture
//!
//! - [`ir`] - statement/expression IR, traversal and substitution
//! - [`offload`] - the pass: closures, device functions, call sites, offsets
//! - [`device`] - device image model, the image compiler and object inspection
//! - [`x64`] - x86-64 encoding used by the simulator image compiler
//! - [`core`] - shared infrastructure (errors, session)
//! - [`text`] - text form of host programs and the FileCheck runner

pub mod core;
pub mod device;
pub mod ir;
pub mod offload;
pub mod text;
pub mod x64;

pub use core::{OffloadError, OffloadResult, OffloadSession, SessionStats};
pub use device::{DeviceCompiler, DeviceImage, DeviceTarget, ElfImageCompiler, ElfInspector, ObjectInspector};
pub use offload::{DeviceBlob, Injected, OffloadConfig, OffloadPass};
