// This module defines the IR node types the offload pass operates on: a Halide-style
// statement/expression tree. Expressions cover immediates, typed variables, casts, binary
// arithmetic and comparisons, selects, multi-dimensional buffer loads, extern and intrinsic
// calls, and expression-level lets. Statements cover let bindings, assertions, loops tagged
// with a device API, stores, allocations, conditionals, evaluated expressions and blocks.
// Loads may carry an EmbeddedBuffer: constant storage compiled into the host artifact, which
// is how the module state cell and the device blob are attached to the rewritten program.
// Nodes are plain owned enums so rewrites are structural; constructors normalize the common
// shapes (e.g. Block flattening) so rewritten trees compare equal to hand-built ones.

use super::types::Type;
use std::sync::Arc;

/// Binary operators. Comparisons and logical operators produce `bool`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Min,
    Max,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinOp {
    pub fn yields_bool(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge | BinOp::And | BinOp::Or
        )
    }

    /// Infix spelling; `None` for operators printed as calls.
    pub fn symbol(self) -> Option<&'static str> {
        let s = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::Min | BinOp::Max => return None,
        };
        Some(s)
    }
}

/// Compiler-known calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    /// Address of the storage a `Load` reads from.
    AddressOf,
    /// Packs its arguments into a stack-allocated struct and yields a pointer to it.
    MakeStruct,
}

impl Intrinsic {
    pub fn name(self) -> &'static str {
        match self {
            Intrinsic::AddressOf => "address_of",
            Intrinsic::MakeStruct => "make_struct",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "address_of" => Some(Intrinsic::AddressOf),
            "make_struct" => Some(Intrinsic::MakeStruct),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Callee {
    Extern(String),
    Intrinsic(Intrinsic),
}

impl Callee {
    pub fn name(&self) -> &str {
        match self {
            Callee::Extern(name) => name,
            Callee::Intrinsic(intrinsic) => intrinsic.name(),
        }
    }
}

/// Constant storage compiled into the host artifact's data segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedBuffer {
    pub name: String,
    pub ty: Type,
    pub data: Vec<u8>,
}

impl EmbeddedBuffer {
    /// A single zero-initialized element of `ty`.
    pub fn zeroed(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            data: vec![0; ty.bytes()],
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    IntImm {
        value: i64,
        ty: Type,
    },
    UIntImm {
        value: u64,
        ty: Type,
    },
    FloatImm {
        value: f64,
        ty: Type,
    },
    StringImm(String),
    Variable {
        name: String,
        ty: Type,
    },
    Cast {
        ty: Type,
        value: Box<Expr>,
    },
    Binary {
        op: BinOp,
        a: Box<Expr>,
        b: Box<Expr>,
    },
    Not(Box<Expr>),
    Select {
        condition: Box<Expr>,
        true_value: Box<Expr>,
        false_value: Box<Expr>,
    },
    Load {
        ty: Type,
        buffer: String,
        indices: Vec<Expr>,
        image: Option<Arc<EmbeddedBuffer>>,
    },
    Call {
        ty: Type,
        callee: Callee,
        args: Vec<Expr>,
    },
    Let {
        name: String,
        value: Box<Expr>,
        body: Box<Expr>,
    },
}

impl Expr {
    pub fn int(value: i64) -> Self {
        Expr::IntImm { value, ty: Type::int(32) }
    }

    pub fn uint(value: u64, bits: u8) -> Self {
        Expr::UIntImm { value, ty: Type::uint(bits) }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Expr::StringImm(value.into())
    }

    pub fn var(name: impl Into<String>, ty: Type) -> Self {
        Expr::Variable { name: name.into(), ty }
    }

    pub fn binary(op: BinOp, a: Expr, b: Expr) -> Self {
        Expr::Binary { op, a: Box::new(a), b: Box::new(b) }
    }

    pub fn eq(a: Expr, b: Expr) -> Self {
        Self::binary(BinOp::Eq, a, b)
    }

    pub fn load(ty: Type, buffer: impl Into<String>, indices: Vec<Expr>) -> Self {
        Expr::Load { ty, buffer: buffer.into(), indices, image: None }
    }

    /// Load element `index` of an embedded constant buffer.
    pub fn load_embedded(image: &Arc<EmbeddedBuffer>, index: i64) -> Self {
        Expr::Load {
            ty: image.ty,
            buffer: image.name.clone(),
            indices: vec![Expr::int(index)],
            image: Some(Arc::clone(image)),
        }
    }

    pub fn call_extern(ty: Type, name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call { ty, callee: Callee::Extern(name.into()), args }
    }

    pub fn call_intrinsic(ty: Type, intrinsic: Intrinsic, args: Vec<Expr>) -> Self {
        Expr::Call { ty, callee: Callee::Intrinsic(intrinsic), args }
    }

    pub fn address_of(load: Expr) -> Self {
        Self::call_intrinsic(Type::handle(), Intrinsic::AddressOf, vec![load])
    }

    pub fn make_struct(fields: Vec<Expr>) -> Self {
        Self::call_intrinsic(Type::handle(), Intrinsic::MakeStruct, fields)
    }

    pub fn ty(&self) -> Type {
        match self {
            Expr::IntImm { ty, .. }
            | Expr::UIntImm { ty, .. }
            | Expr::FloatImm { ty, .. }
            | Expr::Variable { ty, .. }
            | Expr::Cast { ty, .. }
            | Expr::Load { ty, .. }
            | Expr::Call { ty, .. } => *ty,
            Expr::StringImm(_) => Type::handle(),
            Expr::Binary { op, a, .. } => {
                if op.yields_bool() {
                    Type::bool().with_lanes(a.ty().lanes)
                } else {
                    a.ty()
                }
            }
            Expr::Not(value) => value.ty(),
            Expr::Select { true_value, .. } => true_value.ty(),
            Expr::Let { body, .. } => body.ty(),
        }
    }
}

/// How a loop's iterations are executed on its device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ForKind {
    #[default]
    Serial,
    Parallel,
}

/// Device a loop is scheduled on. Anything but `Host` marks an offload region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeviceApi {
    #[default]
    Host,
    Hexagon,
}

impl DeviceApi {
    pub fn name(self) -> &'static str {
        match self {
            DeviceApi::Host => "host",
            DeviceApi::Hexagon => "hexagon",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "host" => Some(DeviceApi::Host),
            "hexagon" => Some(DeviceApi::Hexagon),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    LetStmt {
        name: String,
        value: Expr,
        body: Box<Stmt>,
    },
    Assert {
        condition: Expr,
        message: Expr,
    },
    For {
        name: String,
        min: Expr,
        extent: Expr,
        kind: ForKind,
        device: DeviceApi,
        body: Box<Stmt>,
    },
    Store {
        buffer: String,
        value: Expr,
        indices: Vec<Expr>,
    },
    Allocate {
        name: String,
        ty: Type,
        extents: Vec<Expr>,
        body: Box<Stmt>,
    },
    IfThenElse {
        condition: Expr,
        then_case: Box<Stmt>,
        else_case: Option<Box<Stmt>>,
    },
    Evaluate(Expr),
    Block(Vec<Stmt>),
}

impl Stmt {
    pub fn let_stmt(name: impl Into<String>, value: Expr, body: Stmt) -> Self {
        Stmt::LetStmt { name: name.into(), value, body: Box::new(body) }
    }

    pub fn assert(condition: Expr, message: Expr) -> Self {
        Stmt::Assert { condition, message }
    }

    pub fn for_loop(name: impl Into<String>, min: Expr, extent: Expr, device: DeviceApi, body: Stmt) -> Self {
        Stmt::For {
            name: name.into(),
            min,
            extent,
            kind: ForKind::Serial,
            device,
            body: Box::new(body),
        }
    }

    pub fn store(buffer: impl Into<String>, value: Expr, indices: Vec<Expr>) -> Self {
        Stmt::Store { buffer: buffer.into(), value, indices }
    }

    /// Sequence statements, flattening nested blocks. A single statement is
    /// returned as-is rather than wrapped.
    pub fn block(stmts: impl IntoIterator<Item = Stmt>) -> Self {
        let mut flat = Vec::new();
        for stmt in stmts {
            match stmt {
                Stmt::Block(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        if flat.len() == 1 {
            flat.pop().unwrap_or(Stmt::Block(Vec::new()))
        } else {
            Stmt::Block(flat)
        }
    }
}
