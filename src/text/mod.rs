//! Text form of host programs, and a FileCheck-style runner over it.
//!
//! Host programs are written the way the IR printer prints them, wrapped in a
//! `pipeline` header declaring the parameters:
//!
//! ```text
//! ; Comments start with semicolon
//! pipeline brighten(k: uint8, input: buffer<uint8, 1>, output: buffer<uint8, 1>) {
//!   for<hexagon> (x, 0, output.extent.0) {
//!     output[x] = (input[x] + k)
//!   }
//! }
//! ```
//!
//! A buffer parameter `b` implicitly declares `b.buffer` and the
//! `b.min.N`/`b.extent.N`/`b.stride.N` variables for each dimension.

use crate::ir::{Stmt, Type};
use std::fmt;

pub mod check;
pub mod parser;

pub use check::{CheckDirective, TestRunner, TestSpec};
pub use parser::{parse_program, ParseError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Scalar(Type),
    Buffer { ty: Type, dimensions: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ParamKind::Scalar(ty) => write!(f, "{}: {}", self.name, ty),
            ParamKind::Buffer { ty, dimensions } => write!(f, "{}: buffer<{}, {}>", self.name, ty, dimensions),
        }
    }
}

/// A named host pipeline: its parameters and body.
#[derive(Debug, Clone, PartialEq)]
pub struct HostProgram {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Stmt,
}

impl HostProgram {
    /// The same pipeline with its body replaced.
    pub fn with_body(&self, body: Stmt) -> Self {
        Self { name: self.name.clone(), params: self.params.clone(), body }
    }
}

impl fmt::Display for HostProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params = self.params.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
        writeln!(f, "pipeline {}({}) {{", self.name, params)?;
        write!(f, "{:1}", self.body)?;
        writeln!(f, "}}")
    }
}
