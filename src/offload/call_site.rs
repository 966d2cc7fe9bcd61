// Host-side call-site synthesis. The region being offloaded is replaced by a call to the
// runtime's remote_run entry, which needs every argument of the device function marshaled
// into two groups of parallel arrays: one for inputs and one for outputs. Each entry is a
// (size, pointer, flag) triple. Buffers are passed as a pointer to their descriptor, found
// in the `<name>.buffer` variable, with a size equal to the host pointer width. Scalars are
// boxed into an addressable struct and their size is the scalar's byte width. Flags tell the
// runtime how the device uses the memory: 0 scalar, 1 read-only buffer, 2 write-only buffer,
// 3 buffer both read and written. Both size arrays end with a zero entry, which is how the
// runtime finds the end of a group. The offset of the function's argv entry is not known
// yet, so a placeholder is reserved for it.
//
// Every runtime call is bound to a fresh result variable and followed by an assertion that it
// is zero, so a runtime failure aborts the pipeline with the status as the message.

use super::closure::Closure;
use super::placeholder::PlaceholderRegistry;
use super::runtime::{text_section_name, REMOTE_RUN, RUN_RESULT_PREFIX};
use crate::core::{OffloadResult, OffloadSession};
use crate::device::{Argument, ArgumentKind};
use crate::ir::{Expr, Stmt, Type};

pub const FLAG_SCALAR: i32 = 0;
pub const FLAG_INPUT_BUFFER: i32 = 1;
pub const FLAG_OUTPUT_BUFFER: i32 = 2;
pub const FLAG_INOUT_BUFFER: i32 = 3;

/// One marshaled argument group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallDescriptor {
    /// One size per argument, then the zero terminator.
    pub sizes: Vec<Expr>,
    pub ptrs: Vec<Expr>,
    pub flags: Vec<Expr>,
}

impl CallDescriptor {
    fn push(&mut self, size: usize, ptr: Expr, flag: i32) {
        self.sizes.push(Expr::uint(size as u64, 64));
        self.ptrs.push(ptr);
        self.flags.push(Expr::int(i64::from(flag)));
    }

    fn terminate(&mut self) {
        self.sizes.push(Expr::uint(0, 64));
    }

    /// Number of arguments, not counting the terminator.
    pub fn len(&self) -> usize {
        self.ptrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ptrs.is_empty()
    }

    /// The three arrays as `make_struct` arguments of a runtime call.
    fn into_call_args(self) -> [Expr; 3] {
        [Expr::make_struct(self.sizes), Expr::make_struct(self.ptrs), Expr::make_struct(self.flags)]
    }
}

/// The synthesized replacement for one region.
#[derive(Debug, Clone, PartialEq)]
pub struct CallSite {
    /// Placeholder for the argv entry's offset.
    pub argv_offset: Expr,
    pub stmt: Stmt,
}

/// Bind `call` to a fresh `<prefix>$N` and assert that it returned zero.
pub fn checked_call(session: &mut OffloadSession, prefix: &str, call: Expr) -> Stmt {
    let result_name = session.unique_name(prefix);
    let result = Expr::var(result_name.clone(), Type::int(32));
    Stmt::let_stmt(result_name, call, Stmt::assert(Expr::eq(result.clone(), Expr::int(0)), result))
}

/// Builds `remote_run` call sites sharing one module state cell.
pub struct CallSiteBuilder<'a> {
    /// Value of the module state cell.
    pub state: &'a Expr,
    pub registry: &'a mut PlaceholderRegistry,
    pub session: &'a mut OffloadSession,
    /// Size reported for buffer descriptor pointers.
    pub pointer_bytes: u8,
}

impl CallSiteBuilder<'_> {
    /// Marshal `args` into the input and output groups.
    pub fn marshal(&self, args: &[Argument], closure: &Closure) -> (CallDescriptor, CallDescriptor) {
        let mut inputs = CallDescriptor::default();
        let mut outputs = CallDescriptor::default();
        let buffer_ptr = |name: &str| Expr::var(format!("{name}.buffer"), Type::handle());

        for arg in args {
            match arg.kind {
                ArgumentKind::InputBuffer => {
                    inputs.push(self.pointer_bytes as usize, buffer_ptr(&arg.name), FLAG_INPUT_BUFFER)
                }
                ArgumentKind::InputScalar => inputs.push(
                    arg.ty.bytes(),
                    Expr::make_struct(vec![Expr::var(arg.name.clone(), arg.ty)]),
                    FLAG_SCALAR,
                ),
                ArgumentKind::OutputBuffer => {
                    let read = closure.buffers.get(&arg.name).is_some_and(|b| b.read);
                    let flag = if read { FLAG_INOUT_BUFFER } else { FLAG_OUTPUT_BUFFER };
                    outputs.push(self.pointer_bytes as usize, buffer_ptr(&arg.name), flag)
                }
            }
        }

        inputs.terminate();
        outputs.terminate();
        (inputs, outputs)
    }

    /// Synthesize the call replacing the region compiled to `function`.
    pub fn build(&mut self, function: &str, args: &[Argument], closure: &Closure) -> OffloadResult<CallSite> {
        let (inputs, outputs) = self.marshal(args, closure);
        let argv_offset = self.registry.reserve(text_section_name(&format!("{function}_argv")))?;
        self.session.record_reserved();

        let mut call_args = vec![self.state.clone(), argv_offset.clone(), Expr::string(function)];
        call_args.extend(inputs.into_call_args());
        call_args.extend(outputs.into_call_args());
        let stmt = checked_call(self.session, RUN_RESULT_PREFIX, REMOTE_RUN.call(call_args));

        Ok(CallSite { argv_offset, stmt })
    }
}
