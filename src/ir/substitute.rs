// Generic "replace free reference with expression" rewrite. Every Variable whose name appears
// in the replacement map is swapped for the mapped expression, except where a Let, LetStmt,
// For or Allocate inside the tree rebinds that name: the inner binding shadows the replacement
// for the extent of its body, exactly as name lookup does. Nodes are rebuilt only along paths
// that actually contained a replaced reference. The offload backpatcher is the main client,
// turning section-name placeholders into literal offsets.

use super::node::{Expr, Stmt};
use super::scope::Scope;
use super::visit::{mutate_expr_children, mutate_stmt_children, Mutator, Visitor, visit_expr_children};
use hashbrown::HashMap;
use std::convert::Infallible;

struct Substitute<'a> {
    replacements: &'a HashMap<String, Expr>,
    hidden: Scope,
}

impl Substitute<'_> {
    fn shadows(&self, name: &str) -> bool {
        self.replacements.contains_key(name)
    }
}

impl Mutator for Substitute<'_> {
    type Error = Infallible;

    fn mutate_expr(&mut self, expr: &Expr) -> Result<Option<Expr>, Infallible> {
        match expr {
            Expr::Variable { name, .. } => {
                if self.hidden.contains(name) {
                    return Ok(None);
                }
                Ok(self.replacements.get(name).cloned())
            }
            Expr::Let { name, value, body } if self.shadows(name) => {
                let new_value = self.mutate_expr(value)?;
                self.hidden.push(name, ());
                let new_body = self.mutate_expr(body);
                self.hidden.pop(name);
                let new_body = new_body?;
                if new_value.is_none() && new_body.is_none() {
                    return Ok(None);
                }
                Ok(Some(Expr::Let {
                    name: name.clone(),
                    value: Box::new(new_value.unwrap_or_else(|| (**value).clone())),
                    body: Box::new(new_body.unwrap_or_else(|| (**body).clone())),
                }))
            }
            _ => mutate_expr_children(self, expr),
        }
    }

    fn mutate_stmt(&mut self, stmt: &Stmt) -> Result<Option<Stmt>, Infallible> {
        let bound = match stmt {
            Stmt::LetStmt { name, .. } | Stmt::For { name, .. } | Stmt::Allocate { name, .. } => name,
            _ => return mutate_stmt_children(self, stmt),
        };
        if !self.shadows(bound) {
            return mutate_stmt_children(self, stmt);
        }

        // The bound name is visible only in the body; the remaining
        // operands are evaluated in the enclosing scope.
        let rebuilt = match stmt {
            Stmt::LetStmt { name, value, body } => {
                let new_value = self.mutate_expr(value)?;
                let new_body = self.hidden_body(name, body)?;
                (new_value.is_some() || new_body.is_some()).then(|| Stmt::LetStmt {
                    name: name.clone(),
                    value: new_value.unwrap_or_else(|| value.clone()),
                    body: Box::new(new_body.unwrap_or_else(|| (**body).clone())),
                })
            }
            Stmt::For { name, min, extent, kind, device, body } => {
                let new_min = self.mutate_expr(min)?;
                let new_extent = self.mutate_expr(extent)?;
                let new_body = self.hidden_body(name, body)?;
                (new_min.is_some() || new_extent.is_some() || new_body.is_some()).then(|| Stmt::For {
                    name: name.clone(),
                    min: new_min.unwrap_or_else(|| min.clone()),
                    extent: new_extent.unwrap_or_else(|| extent.clone()),
                    kind: *kind,
                    device: *device,
                    body: Box::new(new_body.unwrap_or_else(|| (**body).clone())),
                })
            }
            Stmt::Allocate { name, ty, extents, body } => {
                let mut changed = false;
                let mut new_extents = Vec::with_capacity(extents.len());
                for extent in extents {
                    match self.mutate_expr(extent)? {
                        Some(new) => {
                            changed = true;
                            new_extents.push(new);
                        }
                        None => new_extents.push(extent.clone()),
                    }
                }
                let new_body = self.hidden_body(name, body)?;
                (changed || new_body.is_some()).then(|| Stmt::Allocate {
                    name: name.clone(),
                    ty: *ty,
                    extents: new_extents,
                    body: Box::new(new_body.unwrap_or_else(|| (**body).clone())),
                })
            }
            _ => unreachable!("only binding statements reach here"),
        };
        Ok(rebuilt)
    }
}

impl Substitute<'_> {
    fn hidden_body(&mut self, name: &str, body: &Stmt) -> Result<Option<Stmt>, Infallible> {
        self.hidden.push(name, ());
        let result = self.mutate_stmt(body);
        self.hidden.pop(name);
        result
    }
}

/// Replace free references to the keys of `replacements` throughout `stmt`.
pub fn substitute(replacements: &HashMap<String, Expr>, stmt: Stmt) -> Stmt {
    if replacements.is_empty() {
        return stmt;
    }
    let mut mutator = Substitute { replacements, hidden: Scope::new() };
    match mutator.mutate_stmt(&stmt) {
        Ok(Some(rewritten)) => rewritten,
        Ok(None) => stmt,
        Err(never) => match never {},
    }
}

/// Expression form of [`substitute`].
pub fn substitute_expr(replacements: &HashMap<String, Expr>, expr: Expr) -> Expr {
    let mut mutator = Substitute { replacements, hidden: Scope::new() };
    match mutator.mutate_expr(&expr) {
        Ok(Some(rewritten)) => rewritten,
        Ok(None) => expr,
        Err(never) => match never {},
    }
}

/// Free references to any of `names` remaining in `stmt`, in traversal order.
pub fn free_references<'a>(stmt: &Stmt, names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    struct Finder<'n> {
        names: Vec<&'n str>,
        found: Vec<String>,
    }

    impl Visitor for Finder<'_> {
        fn visit_expr(&mut self, expr: &Expr) {
            if let Expr::Variable { name, .. } = expr {
                if self.names.contains(&name.as_str()) && !self.found.contains(name) {
                    self.found.push(name.clone());
                }
            }
            visit_expr_children(self, expr);
        }
    }

    let mut finder = Finder { names: names.into_iter().collect(), found: Vec::new() };
    finder.visit_stmt(stmt);
    finder.found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, DeviceApi, Type};

    fn x() -> Expr {
        Expr::var("x", Type::int(32))
    }

    fn replace_x_with(value: i64) -> HashMap<String, Expr> {
        let mut map = HashMap::new();
        map.insert("x".to_string(), Expr::int(value));
        map
    }

    #[test]
    fn replaces_free_reference() {
        let stmt = Stmt::store("out", Expr::binary(BinOp::Add, x(), Expr::int(1)), vec![Expr::int(0)]);
        let result = substitute(&replace_x_with(7), stmt);
        assert_eq!(
            result,
            Stmt::store("out", Expr::binary(BinOp::Add, Expr::int(7), Expr::int(1)), vec![Expr::int(0)])
        );
    }

    #[test]
    fn loop_variable_shadows_replacement() {
        // for x in [x, x + 10): out[x] = x
        let stmt = Stmt::for_loop(
            "x",
            x(),
            Expr::int(10),
            DeviceApi::Host,
            Stmt::store("out", x(), vec![x()]),
        );
        let result = substitute(&replace_x_with(3), stmt);
        let Stmt::For { min, body, .. } = result else { panic!("expected loop") };
        assert_eq!(min, Expr::int(3));
        assert_eq!(*body, Stmt::store("out", x(), vec![x()]));
    }

    #[test]
    fn let_value_sees_outer_binding() {
        let expr = Expr::Let {
            name: "x".to_string(),
            value: Box::new(x()),
            body: Box::new(x()),
        };
        let result = substitute_expr(&replace_x_with(4), expr);
        assert_eq!(
            result,
            Expr::Let {
                name: "x".to_string(),
                value: Box::new(Expr::int(4)),
                body: Box::new(x()),
            }
        );
    }

    #[test]
    fn free_references_reports_survivors() {
        let stmt = Stmt::block([
            Stmt::Evaluate(x()),
            Stmt::Evaluate(Expr::var("y", Type::int(32))),
        ]);
        assert_eq!(free_references(&stmt, ["y", "z"]), vec!["y".to_string()]);
    }
}
