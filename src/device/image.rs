// The device-side program image accumulated by the offload pass. A DeviceImage holds the
// target descriptor and an ordered list of DeviceFunctions, one per offloaded region, each
// with its Argument list and the region it runs. The argument order is fixed (input buffers,
// then input scalars, then output buffers) and must agree with the host call-site marshaling;
// both sides are built from the same Argument list. The image is append-only while the pass
// runs and is handed to a DeviceCompiler exactly once.

use super::DeviceTarget;
use crate::ir::{Stmt, Type};
use std::fmt;

/// Role of a device function argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgumentKind {
    InputBuffer,
    InputScalar,
    OutputBuffer,
}

impl ArgumentKind {
    pub fn is_buffer(self) -> bool {
        !matches!(self, ArgumentKind::InputScalar)
    }
}

/// One parameter of a synthesized device function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    pub name: String,
    pub kind: ArgumentKind,
    /// Element type for buffers, value type for scalars.
    pub ty: Type,
    /// Zero for scalars.
    pub dimensions: u8,
}

impl Argument {
    pub fn new(name: impl Into<String>, kind: ArgumentKind, ty: Type, dimensions: u8) -> Self {
        Self { name: name.into(), kind, ty, dimensions }
    }

    pub fn is_buffer(&self) -> bool {
        self.kind.is_buffer()
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ArgumentKind::InputScalar => write!(f, "{}: {}", self.name, self.ty),
            ArgumentKind::InputBuffer => write!(f, "{}: buffer<{}, {}>", self.name, self.ty, self.dimensions),
            ArgumentKind::OutputBuffer => write!(f, "{}: out buffer<{}, {}>", self.name, self.ty, self.dimensions),
        }
    }
}

/// Linkage of a function in the device image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Linkage {
    /// Callable from the host through the runtime.
    #[default]
    External,
    Internal,
}

/// A standalone function extracted from an offloaded region.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceFunction {
    pub name: String,
    pub args: Vec<Argument>,
    pub body: Stmt,
    pub linkage: Linkage,
}

impl DeviceFunction {
    /// Name of the entry that unpacks an argument vector and calls this function.
    pub fn argv_name(&self) -> String {
        format!("{}_argv", self.name)
    }
}

/// The accumulated device program.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceImage {
    pub name: String,
    pub target: DeviceTarget,
    pub functions: Vec<DeviceFunction>,
}

impl DeviceImage {
    pub fn new(name: impl Into<String>, target: DeviceTarget) -> Self {
        Self { name: name.into(), target, functions: Vec::new() }
    }

    pub fn append(&mut self, function: DeviceFunction) -> &DeviceFunction {
        self.functions.push(function);
        let last = self.functions.len() - 1;
        &self.functions[last]
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn function(&self, name: &str) -> Option<&DeviceFunction> {
        self.functions.iter().find(|f| f.name == name)
    }
}

impl fmt::Display for DeviceImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "module {} ({})", self.name, self.target)?;
        for function in &self.functions {
            let args = function.args.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
            writeln!(f, "func {}({}) {{", function.name, args)?;
            write!(f, "{:1}", function.body)?;
            writeln!(f, "}}")?;
        }
        Ok(())
    }
}
