// Display implementations for IR nodes. The output is the Halide-style text form also accepted
// by the text parser: binary operators are fully parenthesized, non-int32 immediates carry a
// cast prefix, loops print their device tag as for<hexagon>, and statements are printed one
// per line with two-space indentation inside braces. A LetStmt binds over the rest of its
// block when printed, so a LetStmt that is not in tail position is wrapped in its own braces
// to keep the printed form unambiguous.

use super::node::{BinOp, Expr, ForKind, DeviceApi, Stmt};
use super::types::TypeCode;
use std::fmt::{self, Write};

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::IntImm { value, ty } => {
                if ty.code == TypeCode::Int && ty.bits == 32 && ty.lanes == 1 {
                    write!(f, "{value}")
                } else {
                    write!(f, "({ty}){value}")
                }
            }
            Expr::UIntImm { value, ty } => write!(f, "({ty}){value}"),
            Expr::FloatImm { value, ty } => {
                if ty.bits == 32 {
                    write!(f, "{:?}f", *value as f32)
                } else {
                    write!(f, "{value:?}")
                }
            }
            Expr::StringImm(value) => write!(f, "{value:?}"),
            Expr::Variable { name, .. } => f.write_str(name),
            Expr::Cast { ty, value } => write!(f, "({ty}){value}"),
            Expr::Binary { op, a, b } => match op.symbol() {
                Some(symbol) => write!(f, "({a} {symbol} {b})"),
                None => {
                    let name = if *op == BinOp::Min { "min" } else { "max" };
                    write!(f, "{name}({a}, {b})")
                }
            },
            Expr::Not(value) => write!(f, "!{value}"),
            Expr::Select { condition, true_value, false_value } => {
                write!(f, "select({condition}, {true_value}, {false_value})")
            }
            Expr::Load { buffer, indices, .. } => {
                write!(f, "{buffer}[")?;
                write_list(f, indices)?;
                f.write_char(']')
            }
            Expr::Call { callee, args, .. } => {
                write!(f, "{}(", callee.name())?;
                write_list(f, args)?;
                f.write_char(')')
            }
            Expr::Let { name, value, body } => write!(f, "(let {name} = {value} in {body})"),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, exprs: &[Expr]) -> fmt::Result {
    for (i, expr) in exprs.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{expr}")?;
    }
    Ok(())
}

struct StmtPrinter<'a, 'f> {
    f: &'a mut fmt::Formatter<'f>,
    indent: usize,
}

impl StmtPrinter<'_, '_> {
    fn line(&mut self, args: fmt::Arguments<'_>) -> fmt::Result {
        for _ in 0..self.indent {
            self.f.write_str("  ")?;
        }
        self.f.write_fmt(args)?;
        self.f.write_char('\n')
    }

    fn nested(&mut self, stmt: &Stmt) -> fmt::Result {
        self.indent += 1;
        let result = self.print(stmt);
        self.indent -= 1;
        result
    }

    fn print(&mut self, stmt: &Stmt) -> fmt::Result {
        match stmt {
            Stmt::LetStmt { name, value, body } => {
                self.line(format_args!("let {name} = {value}"))?;
                self.print(body)
            }
            Stmt::Assert { condition, message } => self.line(format_args!("assert({condition}, {message})")),
            Stmt::For { name, min, extent, kind, device, body } => {
                let kind = match kind {
                    ForKind::Serial => "",
                    ForKind::Parallel => "parallel ",
                };
                let device = match device {
                    DeviceApi::Host => String::new(),
                    other => format!("<{}>", other.name()),
                };
                self.line(format_args!("{kind}for{device} ({name}, {min}, {extent}) {{"))?;
                self.nested(body)?;
                self.line(format_args!("}}"))
            }
            Stmt::Store { buffer, value, indices } => {
                let indices = indices.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
                self.line(format_args!("{buffer}[{indices}] = {value}"))
            }
            Stmt::Allocate { name, ty, extents, body } => {
                let mut dims = ty.to_string();
                for extent in extents {
                    write!(dims, " * {extent}")?;
                }
                self.line(format_args!("allocate {name}[{dims}] {{"))?;
                self.nested(body)?;
                self.line(format_args!("}}"))
            }
            Stmt::IfThenElse { condition, then_case, else_case } => {
                self.line(format_args!("if ({condition}) {{"))?;
                self.nested(then_case)?;
                if let Some(else_case) = else_case {
                    self.line(format_args!("}} else {{"))?;
                    self.nested(else_case)?;
                }
                self.line(format_args!("}}"))
            }
            Stmt::Evaluate(value) => self.line(format_args!("{value}")),
            Stmt::Block(stmts) => {
                let last = stmts.len().saturating_sub(1);
                for (i, stmt) in stmts.iter().enumerate() {
                    if i != last && matches!(stmt, Stmt::LetStmt { .. }) {
                        self.line(format_args!("{{"))?;
                        self.nested(stmt)?;
                        self.line(format_args!("}}"))?;
                    } else {
                        self.print(stmt)?;
                    }
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let indent = f.width().unwrap_or(0);
        StmtPrinter { f, indent }.print(self)
    }
}

#[cfg(test)]
mod tests {
    use crate::ir::{BinOp, DeviceApi, Expr, Stmt, Type};

    #[test]
    fn prints_tagged_loop() {
        let x = Expr::var("x", Type::int(32));
        let body = Stmt::store(
            "out",
            Expr::binary(BinOp::Mul, Expr::load(Type::uint(8), "in", vec![x.clone()]), Expr::int(2)),
            vec![x],
        );
        let stmt = Stmt::for_loop("x", Expr::int(0), Expr::int(16), DeviceApi::Hexagon, body);
        assert_eq!(
            stmt.to_string(),
            "for<hexagon> (x, 0, 16) {\n  out[x] = (in[x] * 2)\n}\n"
        );
    }

    #[test]
    fn typed_immediates_carry_casts() {
        assert_eq!(Expr::uint(0, 64).to_string(), "(uint64)0");
        assert_eq!(Expr::int(-3).to_string(), "-3");
        assert_eq!(Expr::string("f").to_string(), "\"f\"");
    }

    #[test]
    fn non_tail_let_is_braced() {
        let stmt = Stmt::block([
            Stmt::let_stmt("r", Expr::int(1), Stmt::Evaluate(Expr::var("r", Type::int(32)))),
            Stmt::Evaluate(Expr::int(2)),
        ]);
        assert_eq!(stmt.to_string(), "{\n  let r = 1\n  r\n}\n2\n");
    }
}
