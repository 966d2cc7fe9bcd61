// Contracts of the coprocessor runtime that synthesized host code calls into. Only the shapes
// are described here: the runtime itself is provided by the coprocessor's support library.
// remote_initialize loads a device blob once and stores an opaque module handle in the state
// cell; remote_run executes one device function through its argv entry, given two marshaled
// argument groups. Both return 0 on success. Names of device-side symbols the pass relies on
// (function prefix, section naming, the runtime's own initializer) live here as well, because
// the device backend and the resolver must agree on them.

use crate::ir::{Expr, Type};

/// Prefix of every synthesized device function.
pub const DEVICE_FUNCTION_PREFIX: &str = "offload_";

/// Device-side initializer whose offset is handed to `remote_initialize`.
/// It must not start with [`DEVICE_FUNCTION_PREFIX`], so no region can claim it.
pub const INIT_RUNTIME_FUNCTION: &str = "hexagon_init_runtime";

/// Prefix of the result variable bound around each `remote_run` call.
pub const RUN_RESULT_PREFIX: &str = "remote_run_result";

/// Prefix of the result variable bound around the `remote_initialize` call.
pub const INIT_RESULT_PREFIX: &str = "init_result";

/// Name of the section holding `function`.
pub fn text_section_name(function: &str) -> String {
    format!(".text.{function}")
}

/// C-level type of a runtime parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeType {
    /// `void *`
    Handle,
    /// `void **`
    HandlePtr,
    /// `const uint8_t *`
    Bytes,
    /// `const char *`
    CString,
    /// `uint64_t []`
    SizeArray,
    /// `void *[]`
    PtrArray,
    /// `int []`
    FlagArray,
    U32,
    U64,
    I32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeParam {
    pub name: &'static str,
    pub ty: RuntimeType,
}

const fn param(name: &'static str, ty: RuntimeType) -> RuntimeParam {
    RuntimeParam { name, ty }
}

/// An entry point of the coprocessor runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeSignature {
    pub name: &'static str,
    pub params: &'static [RuntimeParam],
    pub returns: RuntimeType,
}

impl RuntimeSignature {
    /// An extern call to this entry point.
    pub fn call(&self, args: Vec<Expr>) -> Expr {
        debug_assert_eq!(args.len(), self.params.len(), "arity of {}", self.name);
        Expr::call_extern(Type::int(32), self.name, args)
    }
}

/// `int remote_run(void *state, uint32_t argv_offset, const char *name,
/// uint64_t in_sizes[], void *in_ptrs[], int in_flags[],
/// uint64_t out_sizes[], void *out_ptrs[], int out_flags[])`
pub const REMOTE_RUN: RuntimeSignature = RuntimeSignature {
    name: "remote_run",
    params: &[
        param("state", RuntimeType::Handle),
        param("argv_offset", RuntimeType::U32),
        param("name", RuntimeType::CString),
        param("input_sizes", RuntimeType::SizeArray),
        param("input_ptrs", RuntimeType::PtrArray),
        param("input_flags", RuntimeType::FlagArray),
        param("output_sizes", RuntimeType::SizeArray),
        param("output_ptrs", RuntimeType::PtrArray),
        param("output_flags", RuntimeType::FlagArray),
    ],
    returns: RuntimeType::I32,
};

/// `int remote_initialize(void **state, const uint8_t *code, uint64_t size,
/// uint32_t init_offset)`
pub const REMOTE_INITIALIZE: RuntimeSignature = RuntimeSignature {
    name: "remote_initialize",
    params: &[
        param("state_ptr", RuntimeType::HandlePtr),
        param("code", RuntimeType::Bytes),
        param("size", RuntimeType::U64),
        param("init_offset", RuntimeType::U32),
    ],
    returns: RuntimeType::I32,
};

/// Runtime entry points synthesized code may call.
pub const ENTRY_POINTS: [RuntimeSignature; 2] = [REMOTE_RUN, REMOTE_INITIALIZE];
