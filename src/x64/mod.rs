//! x86-64 architecture-specific components.
//!
//! Used by the simulator device backend to emit real code into the device
//! object:
//! - Instruction encoding using iced-x86
//! - System V argument assignment for argv thunks

pub mod calling_convention;
pub mod encoder;

pub use calling_convention::{AsmReg, CCAssigner, CCAssignment, RegBank, SysVAssigner};
pub use encoder::{EncodedCode, EncodingError, X64Encoder};
