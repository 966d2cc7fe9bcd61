// Traversal infrastructure for the IR: a read-only Visitor and a rewriting Mutator. Both are
// traits with default methods that dispatch on the node variant and recurse into children, so
// an implementation overrides only the variants it cares about and delegates the rest to the
// *_children functions. A Mutator returns Ok(None) for "unchanged"; parents are rebuilt only
// when at least one child came back rewritten, which keeps untouched subtrees (and whole
// programs with nothing to rewrite) byte-identical to their input. Mutators are fallible via
// an associated Error type so passes can abort a traversal with a diagnostic.

//! Visitor and mutator traits over [`Expr`] and [`Stmt`].

use super::node::{Expr, Stmt};

/// Read-only traversal.
pub trait Visitor {
    fn visit_expr(&mut self, expr: &Expr) {
        visit_expr_children(self, expr);
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        visit_stmt_children(self, stmt);
    }
}

pub fn visit_expr_children<V: Visitor + ?Sized>(v: &mut V, expr: &Expr) {
    match expr {
        Expr::IntImm { .. }
        | Expr::UIntImm { .. }
        | Expr::FloatImm { .. }
        | Expr::StringImm(_)
        | Expr::Variable { .. } => {}
        Expr::Cast { value, .. } | Expr::Not(value) => v.visit_expr(value),
        Expr::Binary { a, b, .. } => {
            v.visit_expr(a);
            v.visit_expr(b);
        }
        Expr::Select { condition, true_value, false_value } => {
            v.visit_expr(condition);
            v.visit_expr(true_value);
            v.visit_expr(false_value);
        }
        Expr::Load { indices, .. } => indices.iter().for_each(|e| v.visit_expr(e)),
        Expr::Call { args, .. } => args.iter().for_each(|e| v.visit_expr(e)),
        Expr::Let { value, body, .. } => {
            v.visit_expr(value);
            v.visit_expr(body);
        }
    }
}

pub fn visit_stmt_children<V: Visitor + ?Sized>(v: &mut V, stmt: &Stmt) {
    match stmt {
        Stmt::LetStmt { value, body, .. } => {
            v.visit_expr(value);
            v.visit_stmt(body);
        }
        Stmt::Assert { condition, message } => {
            v.visit_expr(condition);
            v.visit_expr(message);
        }
        Stmt::For { min, extent, body, .. } => {
            v.visit_expr(min);
            v.visit_expr(extent);
            v.visit_stmt(body);
        }
        Stmt::Store { value, indices, .. } => {
            v.visit_expr(value);
            indices.iter().for_each(|e| v.visit_expr(e));
        }
        Stmt::Allocate { extents, body, .. } => {
            extents.iter().for_each(|e| v.visit_expr(e));
            v.visit_stmt(body);
        }
        Stmt::IfThenElse { condition, then_case, else_case } => {
            v.visit_expr(condition);
            v.visit_stmt(then_case);
            if let Some(else_case) = else_case {
                v.visit_stmt(else_case);
            }
        }
        Stmt::Evaluate(value) => v.visit_expr(value),
        Stmt::Block(stmts) => stmts.iter().for_each(|s| v.visit_stmt(s)),
    }
}

/// Structural rewrite. `Ok(None)` means the node is unchanged.
pub trait Mutator {
    type Error;

    fn mutate_expr(&mut self, expr: &Expr) -> Result<Option<Expr>, Self::Error> {
        mutate_expr_children(self, expr)
    }

    fn mutate_stmt(&mut self, stmt: &Stmt) -> Result<Option<Stmt>, Self::Error> {
        mutate_stmt_children(self, stmt)
    }
}

/// Run `m` over `stmt`, handing back the original when nothing changed.
pub fn mutate<M: Mutator + ?Sized>(m: &mut M, stmt: Stmt) -> Result<Stmt, M::Error> {
    Ok(m.mutate_stmt(&stmt)?.unwrap_or(stmt))
}

fn keep_expr(new: Option<Expr>, old: &Expr) -> Box<Expr> {
    Box::new(new.unwrap_or_else(|| old.clone()))
}

fn keep_stmt(new: Option<Stmt>, old: &Stmt) -> Box<Stmt> {
    Box::new(new.unwrap_or_else(|| old.clone()))
}

fn mutate_exprs<M: Mutator + ?Sized>(m: &mut M, exprs: &[Expr]) -> Result<Option<Vec<Expr>>, M::Error> {
    let mut rebuilt: Option<Vec<Expr>> = None;
    for (i, expr) in exprs.iter().enumerate() {
        match m.mutate_expr(expr)? {
            Some(new) => rebuilt.get_or_insert_with(|| exprs[..i].to_vec()).push(new),
            None => {
                if let Some(out) = rebuilt.as_mut() {
                    out.push(expr.clone());
                }
            }
        }
    }
    Ok(rebuilt)
}

fn mutate_stmts<M: Mutator + ?Sized>(m: &mut M, stmts: &[Stmt]) -> Result<Option<Vec<Stmt>>, M::Error> {
    let mut rebuilt: Option<Vec<Stmt>> = None;
    for (i, stmt) in stmts.iter().enumerate() {
        match m.mutate_stmt(stmt)? {
            Some(new) => rebuilt.get_or_insert_with(|| stmts[..i].to_vec()).push(new),
            None => {
                if let Some(out) = rebuilt.as_mut() {
                    out.push(stmt.clone());
                }
            }
        }
    }
    Ok(rebuilt)
}

pub fn mutate_expr_children<M: Mutator + ?Sized>(m: &mut M, expr: &Expr) -> Result<Option<Expr>, M::Error> {
    let rebuilt = match expr {
        Expr::IntImm { .. }
        | Expr::UIntImm { .. }
        | Expr::FloatImm { .. }
        | Expr::StringImm(_)
        | Expr::Variable { .. } => None,
        Expr::Cast { ty, value } => m
            .mutate_expr(value)?
            .map(|value| Expr::Cast { ty: *ty, value: Box::new(value) }),
        Expr::Not(value) => m.mutate_expr(value)?.map(|value| Expr::Not(Box::new(value))),
        Expr::Binary { op, a, b } => {
            let new_a = m.mutate_expr(a)?;
            let new_b = m.mutate_expr(b)?;
            if new_a.is_none() && new_b.is_none() {
                None
            } else {
                Some(Expr::Binary {
                    op: *op,
                    a: keep_expr(new_a, a),
                    b: keep_expr(new_b, b),
                })
            }
        }
        Expr::Select { condition, true_value, false_value } => {
            let new_c = m.mutate_expr(condition)?;
            let new_t = m.mutate_expr(true_value)?;
            let new_f = m.mutate_expr(false_value)?;
            if new_c.is_none() && new_t.is_none() && new_f.is_none() {
                None
            } else {
                Some(Expr::Select {
                    condition: keep_expr(new_c, condition),
                    true_value: keep_expr(new_t, true_value),
                    false_value: keep_expr(new_f, false_value),
                })
            }
        }
        Expr::Load { ty, buffer, indices, image } => mutate_exprs(m, indices)?.map(|indices| Expr::Load {
            ty: *ty,
            buffer: buffer.clone(),
            indices,
            image: image.clone(),
        }),
        Expr::Call { ty, callee, args } => mutate_exprs(m, args)?.map(|args| Expr::Call {
            ty: *ty,
            callee: callee.clone(),
            args,
        }),
        Expr::Let { name, value, body } => {
            let new_value = m.mutate_expr(value)?;
            let new_body = m.mutate_expr(body)?;
            if new_value.is_none() && new_body.is_none() {
                None
            } else {
                Some(Expr::Let {
                    name: name.clone(),
                    value: keep_expr(new_value, value),
                    body: keep_expr(new_body, body),
                })
            }
        }
    };
    Ok(rebuilt)
}

pub fn mutate_stmt_children<M: Mutator + ?Sized>(m: &mut M, stmt: &Stmt) -> Result<Option<Stmt>, M::Error> {
    let rebuilt = match stmt {
        Stmt::LetStmt { name, value, body } => {
            let new_value = m.mutate_expr(value)?;
            let new_body = m.mutate_stmt(body)?;
            if new_value.is_none() && new_body.is_none() {
                None
            } else {
                Some(Stmt::LetStmt {
                    name: name.clone(),
                    value: new_value.unwrap_or_else(|| value.clone()),
                    body: keep_stmt(new_body, body),
                })
            }
        }
        Stmt::Assert { condition, message } => {
            let new_c = m.mutate_expr(condition)?;
            let new_m = m.mutate_expr(message)?;
            if new_c.is_none() && new_m.is_none() {
                None
            } else {
                Some(Stmt::Assert {
                    condition: new_c.unwrap_or_else(|| condition.clone()),
                    message: new_m.unwrap_or_else(|| message.clone()),
                })
            }
        }
        Stmt::For { name, min, extent, kind, device, body } => {
            let new_min = m.mutate_expr(min)?;
            let new_extent = m.mutate_expr(extent)?;
            let new_body = m.mutate_stmt(body)?;
            if new_min.is_none() && new_extent.is_none() && new_body.is_none() {
                None
            } else {
                Some(Stmt::For {
                    name: name.clone(),
                    min: new_min.unwrap_or_else(|| min.clone()),
                    extent: new_extent.unwrap_or_else(|| extent.clone()),
                    kind: *kind,
                    device: *device,
                    body: keep_stmt(new_body, body),
                })
            }
        }
        Stmt::Store { buffer, value, indices } => {
            let new_value = m.mutate_expr(value)?;
            let new_indices = mutate_exprs(m, indices)?;
            if new_value.is_none() && new_indices.is_none() {
                None
            } else {
                Some(Stmt::Store {
                    buffer: buffer.clone(),
                    value: new_value.unwrap_or_else(|| value.clone()),
                    indices: new_indices.unwrap_or_else(|| indices.clone()),
                })
            }
        }
        Stmt::Allocate { name, ty, extents, body } => {
            let new_extents = mutate_exprs(m, extents)?;
            let new_body = m.mutate_stmt(body)?;
            if new_extents.is_none() && new_body.is_none() {
                None
            } else {
                Some(Stmt::Allocate {
                    name: name.clone(),
                    ty: *ty,
                    extents: new_extents.unwrap_or_else(|| extents.clone()),
                    body: keep_stmt(new_body, body),
                })
            }
        }
        Stmt::IfThenElse { condition, then_case, else_case } => {
            let new_c = m.mutate_expr(condition)?;
            let new_then = m.mutate_stmt(then_case)?;
            let new_else = match else_case {
                Some(else_case) => m.mutate_stmt(else_case)?,
                None => None,
            };
            if new_c.is_none() && new_then.is_none() && new_else.is_none() {
                None
            } else {
                Some(Stmt::IfThenElse {
                    condition: new_c.unwrap_or_else(|| condition.clone()),
                    then_case: keep_stmt(new_then, then_case),
                    else_case: match (new_else, else_case) {
                        (Some(new), _) => Some(Box::new(new)),
                        (None, old) => old.clone(),
                    },
                })
            }
        }
        Stmt::Evaluate(value) => m.mutate_expr(value)?.map(Stmt::Evaluate),
        Stmt::Block(stmts) => mutate_stmts(m, stmts)?.map(Stmt::Block),
    };
    Ok(rebuilt)
}
