//! Statement/expression IR consumed and produced by the offload pass.
//!
//! The IR is a small Halide-style tree: loops carry a [`DeviceApi`] tag that
//! marks offload regions, buffers are accessed by name with one index per
//! dimension, and constant data compiled into the host artifact hangs off
//! [`Expr::Load`] as an [`EmbeddedBuffer`].
//!
//! - [`visit`] - read-only [`Visitor`] and rewriting [`Mutator`] traits
//! - [`scope`] - shadowing name table for binding-aware traversals
//! - [`substitute`] - replace free variable references with expressions
//! - [`printer`] - `Display` implementations producing the text form

pub mod types;
pub mod node;
pub mod visit;
pub mod scope;
pub mod substitute;
pub mod printer;

pub use types::{Type, TypeCode};
pub use node::{BinOp, Callee, DeviceApi, EmbeddedBuffer, Expr, ForKind, Intrinsic, Stmt};
pub use visit::{Mutator, Visitor, mutate};
pub use scope::Scope;
pub use substitute::{free_references, substitute, substitute_expr};
