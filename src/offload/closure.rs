// Capture analysis for a device region. Closure::extract walks a statement and records every
// scalar variable and every buffer it references that is not bound inside the statement
// itself. Let, LetStmt, For and Allocate introduce bindings; a Scope tracks them so a name
// bound in one subtree is still captured where it appears free in another. Buffers are
// recorded once by name with separate read and write flags; their dimensionality is the number
// of index expressions used to access them. Loads of embedded constants are compiled into the
// host artifact and are never captured. Both maps are ordered by name so the capture set, and
// everything derived from it (the device signature and the marshaled call), is deterministic.

use crate::ir::{visit, Expr, Scope, Stmt, Type, Visitor};
use std::collections::BTreeMap;

/// How a region uses a captured buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferRef {
    /// Element type.
    pub ty: Type,
    pub dimensions: u8,
    pub read: bool,
    pub write: bool,
}

/// Free scalars and buffers of a region.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Closure {
    pub vars: BTreeMap<String, Type>,
    pub buffers: BTreeMap<String, BufferRef>,
}

impl Closure {
    pub fn extract(stmt: &Stmt) -> Self {
        let mut builder = ClosureBuilder::default();
        builder.visit_stmt(stmt);
        builder.closure
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty() && self.buffers.is_empty()
    }

    /// Buffers the region only reads.
    pub fn input_buffers(&self) -> impl Iterator<Item = (&str, &BufferRef)> {
        self.buffers.iter().filter(|(_, b)| !b.write).map(|(n, b)| (n.as_str(), b))
    }

    /// Buffers the region writes, whether or not it also reads them.
    pub fn output_buffers(&self) -> impl Iterator<Item = (&str, &BufferRef)> {
        self.buffers.iter().filter(|(_, b)| b.write).map(|(n, b)| (n.as_str(), b))
    }
}

#[derive(Default)]
struct ClosureBuilder {
    closure: Closure,
    ignore: Scope,
}

impl ClosureBuilder {
    fn found_buffer(&mut self, name: &str, ty: Type, dimensions: usize, write: bool) {
        if self.ignore.contains(name) {
            return;
        }
        let dimensions = u8::try_from(dimensions).unwrap_or(u8::MAX);
        let entry = self.closure.buffers.entry(name.to_string()).or_insert(BufferRef {
            ty,
            dimensions,
            read: false,
            write: false,
        });
        if entry.dimensions != dimensions {
            log::warn!(
                "Buffer {name} accessed with {} and {dimensions} indices, using the larger",
                entry.dimensions
            );
            entry.dimensions = entry.dimensions.max(dimensions);
        }
        if entry.ty != ty {
            log::warn!("Buffer {name} accessed as both {} and {ty}", entry.ty);
        }
        if write {
            entry.write = true;
        } else {
            entry.read = true;
        }
    }

    fn bound<F: FnOnce(&mut Self)>(&mut self, name: &str, f: F) {
        self.ignore.push(name, ());
        f(self);
        self.ignore.pop(name);
    }
}

impl Visitor for ClosureBuilder {
    fn visit_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Variable { name, ty } => {
                if !self.ignore.contains(name) {
                    self.closure.vars.entry(name.clone()).or_insert(*ty);
                }
            }
            Expr::Let { name, value, body } => {
                self.visit_expr(value);
                self.bound(name, |b| b.visit_expr(body));
            }
            Expr::Load { ty, buffer, indices, image } => {
                if image.is_none() {
                    self.found_buffer(buffer, *ty, indices.len(), false);
                }
                visit::visit_expr_children(self, expr);
            }
            _ => visit::visit_expr_children(self, expr),
        }
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::LetStmt { name, value, body } => {
                self.visit_expr(value);
                self.bound(name, |b| b.visit_stmt(body));
            }
            Stmt::For { name, min, extent, body, .. } => {
                self.visit_expr(min);
                self.visit_expr(extent);
                self.bound(name, |b| b.visit_stmt(body));
            }
            Stmt::Allocate { name, extents, body, .. } => {
                extents.iter().for_each(|e| self.visit_expr(e));
                self.bound(name, |b| b.visit_stmt(body));
            }
            Stmt::Store { buffer, value, indices } => {
                self.found_buffer(buffer, value.ty(), indices.len(), true);
                visit::visit_stmt_children(self, stmt);
            }
            _ => visit::visit_stmt_children(self, stmt),
        }
    }
}
