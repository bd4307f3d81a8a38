//! AST → Python source text.
//!
//! Standard precedence-driven unparsing: parenthesize a child whenever its
//! precedence is below what its position requires, indent suites by four
//! spaces, print `pass` for empty suites, and separate top-level
//! definitions with a blank line.

use crate::ast::*;

const INDENT: &str = "    ";

/// Render a decompiled module to source text with a trailing newline.
pub fn unparse_module(module: &Module) -> String {
    let mut up = Unparser::new();
    up.emit_body(&module.body, 0, true);
    if !up.out.ends_with('\n') {
        up.out.push('\n');
    }
    up.out
}

/// Render a single expression. Handy for diagnostics and tests.
pub fn unparse_expr(expr: &Expr) -> String {
    let mut up = Unparser::new();
    up.write_expr(expr, 0);
    up.out
}

struct Unparser {
    out: String,
}

impl Unparser {
    fn new() -> Self {
        Self { out: String::new() }
    }

    fn emit_body(&mut self, body: &[Stmt], depth: usize, toplevel: bool) {
        if body.is_empty() {
            self.line(depth, "pass");
            return;
        }
        for (i, stmt) in body.iter().enumerate() {
            if toplevel && i > 0 && is_definition(stmt) {
                self.out.push('\n');
            }
            self.emit_stmt(stmt, depth);
        }
    }

    fn emit_stmt(&mut self, stmt: &Stmt, depth: usize) {
        match &stmt.kind {
            StmtKind::FunctionDef {
                name,
                args,
                body,
                decorators,
            } => {
                self.emit_decorators(decorators, depth);
                self.line(depth, &format!("def {}({}):", name, args.join(", ")));
                self.emit_body(body, depth + 1, false);
            }
            StmtKind::ClassDef {
                name,
                bases,
                keywords,
                body,
                decorators,
            } => {
                self.emit_decorators(decorators, depth);
                let mut head = Vec::new();
                for b in bases {
                    head.push(unparse_expr(b));
                }
                for kw in keywords {
                    head.push(format!("{}={}", kw.arg, unparse_expr(&kw.value)));
                }
                if head.is_empty() {
                    self.line(depth, &format!("class {}:", name));
                } else {
                    self.line(depth, &format!("class {}({}):", name, head.join(", ")));
                }
                self.emit_body(body, depth + 1, false);
            }
            StmtKind::Import { names } => {
                self.line(depth, &format!("import {}", aliases(names)));
            }
            StmtKind::ImportFrom {
                module,
                names,
                level,
            } => {
                let dots = ".".repeat(*level as usize);
                self.line(
                    depth,
                    &format!("from {}{} import {}", dots, module, aliases(names)),
                );
            }
            StmtKind::Assign { targets, value } => {
                let mut s = String::new();
                for t in targets {
                    s.push_str(&self.target(t));
                    s.push_str(" = ");
                }
                s.push_str(&unparse_expr(value));
                self.line(depth, &s);
            }
            StmtKind::AugAssign { target, op, value } => {
                self.line(
                    depth,
                    &format!(
                        "{} {}= {}",
                        self.target(target),
                        op.symbol(),
                        unparse_expr(value)
                    ),
                );
            }
            StmtKind::Return { value } => match value {
                Some(v) => self.line(depth, &format!("return {}", unparse_expr(v))),
                None => self.line(depth, "return"),
            },
            StmtKind::Expr { value } => {
                self.line(depth, &unparse_expr(value));
            }
            StmtKind::If { test, body, orelse } => {
                self.emit_if(test, body, orelse, depth, "if");
            }
            StmtKind::While { test, body } => {
                self.line(depth, &format!("while {}:", unparse_expr(test)));
                self.emit_body(body, depth + 1, false);
            }
            StmtKind::For { target, iter, body } => {
                self.line(
                    depth,
                    &format!("for {} in {}:", self.target(target), unparse_expr(iter)),
                );
                self.emit_body(body, depth + 1, false);
            }
            StmtKind::Break => self.line(depth, "break"),
            StmtKind::Continue => self.line(depth, "continue"),
            StmtKind::Pass => self.line(depth, "pass"),
        }
    }

    fn emit_if(&mut self, test: &Expr, body: &[Stmt], orelse: &[Stmt], depth: usize, kw: &str) {
        self.line(depth, &format!("{} {}:", kw, unparse_expr(test)));
        self.emit_body(body, depth + 1, false);
        match orelse {
            [] => {}
            // A lone nested if in the else chain collapses to elif.
            [Stmt {
                kind: StmtKind::If {
                    test: t2,
                    body: b2,
                    orelse: o2,
                },
                ..
            }] => {
                self.emit_if(t2, b2, o2, depth, "elif");
            }
            other => {
                self.line(depth, "else:");
                self.emit_body(other, depth + 1, false);
            }
        }
    }

    fn emit_decorators(&mut self, decorators: &[Expr], depth: usize) {
        for d in decorators {
            self.line(depth, &format!("@{}", unparse_expr(d)));
        }
    }

    /// Assignment targets: store-context tuples print without parentheses.
    fn target(&self, e: &Expr) -> String {
        match e {
            Expr::Tuple {
                elts,
                ctx: Ctx::Store,
            } => elts
                .iter()
                .map(unparse_expr)
                .collect::<Vec<_>>()
                .join(", "),
            other => unparse_expr(other),
        }
    }

    fn line(&mut self, depth: usize, text: &str) {
        for _ in 0..depth {
            self.out.push_str(INDENT);
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    // ── Expressions ───────────────────────────────────────────────

    fn write_expr(&mut self, e: &Expr, min_prec: u8) {
        let p = prec(e);
        let need_parens = p < min_prec;
        if need_parens {
            self.out.push('(');
        }
        match e {
            Expr::Constant(c) => self.write_constant(c),
            Expr::Name { id, .. } => self.out.push_str(id),
            Expr::Tuple { elts, .. } => {
                self.out.push('(');
                for (i, elt) in elts.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.write_expr(elt, 0);
                }
                if elts.len() == 1 {
                    self.out.push(',');
                }
                self.out.push(')');
            }
            Expr::List { elts, .. } => {
                self.out.push('[');
                for (i, elt) in elts.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.write_expr(elt, 0);
                }
                self.out.push(']');
            }
            Expr::Attribute { value, attr, .. } => {
                self.write_expr(value, ATOM);
                self.out.push('.');
                self.out.push_str(attr);
            }
            Expr::Subscript { value, index, .. } => {
                self.write_expr(value, ATOM);
                self.out.push('[');
                self.write_expr(index, 0);
                self.out.push(']');
            }
            Expr::Call {
                func,
                args,
                keywords,
            } => {
                self.write_expr(func, ATOM);
                self.out.push('(');
                let mut first = true;
                for a in args {
                    if !first {
                        self.out.push_str(", ");
                    }
                    first = false;
                    self.write_expr(a, 0);
                }
                for kw in keywords {
                    if !first {
                        self.out.push_str(", ");
                    }
                    first = false;
                    self.out.push_str(&kw.arg);
                    self.out.push('=');
                    self.write_expr(&kw.value, 0);
                }
                self.out.push(')');
            }
            Expr::BinOp {
                left, op, right, ..
            } => {
                // Power is right-associative; everything else binds left.
                let (lp, rp) = if *op == BinOpKind::Pow {
                    (p + 1, p)
                } else {
                    (p, p + 1)
                };
                self.write_expr(left, lp);
                self.out.push(' ');
                self.out.push_str(op.symbol());
                self.out.push(' ');
                self.write_expr(right, rp);
            }
            Expr::UnaryOp { op, operand } => {
                match op {
                    UnaryOpKind::Not => self.out.push_str("not "),
                }
                self.write_expr(operand, p);
            }
            Expr::Compare {
                left,
                ops,
                comparators,
            } => {
                self.write_expr(left, p + 1);
                for (op, c) in ops.iter().cycle().zip(comparators.iter()) {
                    self.out.push(' ');
                    self.out.push_str(op.symbol());
                    self.out.push(' ');
                    self.write_expr(c, p + 1);
                }
            }
            Expr::Unknown { opcode, .. } => {
                self.out.push_str("__unknown_op__('");
                self.out.push_str(opcode);
                self.out.push_str("')");
            }
        }
        if need_parens {
            self.out.push(')');
        }
    }

    fn write_constant(&mut self, c: &Constant) {
        match c {
            Constant::None => self.out.push_str("None"),
            Constant::True => self.out.push_str("True"),
            Constant::False => self.out.push_str("False"),
            Constant::Int(n) => self.out.push_str(&n.to_string()),
            Constant::Str(s) => {
                self.out.push('\'');
                for ch in s.chars() {
                    match ch {
                        '\\' => self.out.push_str("\\\\"),
                        '\'' => self.out.push_str("\\'"),
                        '\n' => self.out.push_str("\\n"),
                        '\r' => self.out.push_str("\\r"),
                        '\t' => self.out.push_str("\\t"),
                        other => self.out.push(other),
                    }
                }
                self.out.push('\'');
            }
            Constant::Literal(raw) => self.out.push_str(raw),
        }
    }
}

fn aliases(names: &[Alias]) -> String {
    names
        .iter()
        .map(|a| match &a.asname {
            Some(asname) => format!("{} as {}", a.name, asname),
            None => a.name.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn is_definition(stmt: &Stmt) -> bool {
    matches!(
        stmt.kind,
        StmtKind::FunctionDef { .. } | StmtKind::ClassDef { .. }
    )
}

const ATOM: u8 = 18;

/// Python operator precedence, collapsed to what the AST subset needs.
fn prec(e: &Expr) -> u8 {
    match e {
        Expr::UnaryOp {
            op: UnaryOpKind::Not,
            ..
        } => 6,
        Expr::Compare { .. } => 7,
        Expr::BinOp { op, .. } => match op {
            BinOpKind::BitOr => 8,
            BinOpKind::BitXor => 9,
            BinOpKind::BitAnd => 10,
            BinOpKind::LShift | BinOpKind::RShift => 11,
            BinOpKind::Add | BinOpKind::Sub => 12,
            BinOpKind::Mul | BinOpKind::Div | BinOpKind::FloorDiv | BinOpKind::Mod => 13,
            BinOpKind::Pow => 15,
        },
        _ => ATOM,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::*;

    fn name(id: &str) -> Expr {
        Expr::name(id, Ctx::Load)
    }

    fn int(n: i64) -> Expr {
        Expr::Constant(Constant::Int(n))
    }

    fn binop(left: Expr, op: BinOpKind, right: Expr) -> Expr {
        Expr::BinOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
            inplace: false,
        }
    }

    #[test]
    fn test_precedence_parenthesization() {
        // (a + b) * c needs parens; a + b * c does not.
        let e = binop(binop(name("a"), BinOpKind::Add, name("b")), BinOpKind::Mul, name("c"));
        assert_eq!(unparse_expr(&e), "(a + b) * c");

        let e = binop(name("a"), BinOpKind::Add, binop(name("b"), BinOpKind::Mul, name("c")));
        assert_eq!(unparse_expr(&e), "a + b * c");
    }

    #[test]
    fn test_left_associativity() {
        // (a - b) - c prints bare; a - (b - c) keeps parens.
        let e = binop(binop(name("a"), BinOpKind::Sub, name("b")), BinOpKind::Sub, name("c"));
        assert_eq!(unparse_expr(&e), "a - b - c");

        let e = binop(name("a"), BinOpKind::Sub, binop(name("b"), BinOpKind::Sub, name("c")));
        assert_eq!(unparse_expr(&e), "a - (b - c)");
    }

    #[test]
    fn test_power_right_associativity() {
        let e = binop(name("a"), BinOpKind::Pow, binop(name("b"), BinOpKind::Pow, name("c")));
        assert_eq!(unparse_expr(&e), "a ** b ** c");
    }

    #[test]
    fn test_compare_and_not() {
        let cmp = Expr::Compare {
            left: Box::new(name("x")),
            ops: vec![CmpOp::Gt],
            comparators: vec![int(1)],
        };
        assert_eq!(unparse_expr(&cmp), "x > 1");

        let e = Expr::UnaryOp {
            op: UnaryOpKind::Not,
            operand: Box::new(cmp),
        };
        assert_eq!(unparse_expr(&e), "not x > 1");
    }

    #[test]
    fn test_string_escapes() {
        let e = Expr::Constant(Constant::Str("a'b\nc".into()));
        assert_eq!(unparse_expr(&e), "'a\\'b\\nc'");
    }

    #[test]
    fn test_singleton_tuple() {
        let e = Expr::Tuple {
            elts: vec![int(1)],
            ctx: Ctx::Load,
        };
        assert_eq!(unparse_expr(&e), "(1,)");
    }

    #[test]
    fn test_call_with_keywords() {
        let e = Expr::Call {
            func: Box::new(name("f")),
            args: vec![int(1)],
            keywords: vec![Keyword {
                arg: "mode".into(),
                value: int(2),
            }],
        };
        assert_eq!(unparse_expr(&e), "f(1, mode=2)");
    }

    #[test]
    fn test_empty_function_body_prints_pass() {
        let module = Module {
            body: vec![Stmt::new(StmtKind::FunctionDef {
                name: "f".into(),
                args: vec![],
                body: vec![],
                decorators: vec![],
            })],
        };
        assert_eq!(unparse_module(&module), "def f():\n    pass\n");
    }

    #[test]
    fn test_elif_chain() {
        let inner = Stmt::new(StmtKind::If {
            test: name("b"),
            body: vec![Stmt::new(StmtKind::Pass)],
            orelse: vec![Stmt::new(StmtKind::Break)],
        });
        let module = Module {
            body: vec![Stmt::new(StmtKind::If {
                test: name("a"),
                body: vec![Stmt::new(StmtKind::Pass)],
                orelse: vec![inner],
            })],
        };
        assert_eq!(
            unparse_module(&module),
            "if a:\n    pass\nelif b:\n    pass\nelse:\n    break\n"
        );
    }

    #[test]
    fn test_blank_line_between_toplevel_defs() {
        let def = |n: &str| {
            Stmt::new(StmtKind::FunctionDef {
                name: n.into(),
                args: vec![],
                body: vec![],
                decorators: vec![],
            })
        };
        let module = Module {
            body: vec![def("f"), def("g")],
        };
        assert_eq!(
            unparse_module(&module),
            "def f():\n    pass\n\ndef g():\n    pass\n"
        );
    }

    #[test]
    fn test_tuple_assignment_target() {
        let module = Module {
            body: vec![Stmt::new(StmtKind::Assign {
                targets: vec![Expr::Tuple {
                    elts: vec![Expr::name("a", Ctx::Store), Expr::name("b", Ctx::Store)],
                    ctx: Ctx::Store,
                }],
                value: Expr::Tuple {
                    elts: vec![int(1), int(2)],
                    ctx: Ctx::Load,
                },
            })],
        };
        assert_eq!(unparse_module(&module), "a, b = (1, 2)\n");
    }
}
