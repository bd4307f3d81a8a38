//! Structured control-flow recovery.
//!
//! The VM compiler erases all structure; these routines recognize its
//! emission patterns against the CFG and rebuild `if`, `while`, and `for`
//! statements. Each construct owns a half-open instruction range and lifts
//! its regions recursively, so nesting falls out of the recursion.
//!
//! Recognized shapes:
//! - `POP_JUMP_IF_*` forward: an `if`, with an optional else region behind
//!   the unconditional jump that ends the then-range.
//! - `JUMP` forward into a loop header (per the dominator back-edge set):
//!   the jump-to-test `while` layout.
//! - a loop header reached linearly: a bottom-tested loop, lifted as
//!   `while True:` with a trailing conditional `break`.
//! - `FOR_ITER`: a `for` loop; the exit offset travels on the aux stack as
//!   the innermost loop context.
//! - `JUMP`/`UNWIND_JUMP` at the innermost loop's exit or head: `break` /
//!   `continue`.

use crate::ast::{Constant, Ctx, Expr, Stmt, StmtKind, UnaryOpKind};
use crate::bytecode::OpCode;
use crate::error::Result;

use super::{AuxMarker, Lifter};

impl<'m> Lifter<'m> {
    /// `POP_JUMP_IF_FALSE` / `POP_JUMP_IF_TRUE` (`jump_on_true`).
    pub(super) fn lift_cond_jump(
        &mut self,
        i: usize,
        end: usize,
        jump_on_true: bool,
        out: &mut Vec<Stmt>,
    ) -> Result<usize> {
        let block = self.block;
        let instr = &block.instructions[i];
        let line = self.current_line;
        let Some(target) = instr.jump_target() else {
            self.warnings
                .push(format!("conditional jump without target at {}", instr.offset));
            self.pop_expr()?;
            return Ok(i + 1);
        };

        if target <= instr.offset {
            // A backward conditional outside the recognized loop shapes:
            // repeat-if-taken, so degrade to a conditional continue.
            let test = self.pop_expr()?;
            let test = if jump_on_true { test } else { negate(test) };
            self.warnings.push(format!(
                "backward conditional jump at {} lifted as conditional continue",
                instr.offset
            ));
            out.push(Stmt::at(
                StmtKind::If {
                    test,
                    body: vec![Stmt::new(StmtKind::Continue)],
                    orelse: Vec::new(),
                },
                line,
            ));
            return Ok(i + 1);
        }

        let test = self.pop_expr()?;
        let test = if jump_on_true { negate(test) } else { test };
        let t_idx = block.index_at_or_after(target).min(end);

        // The then-range ending in an unconditional forward jump over the
        // target opens an else region, unless that jump is a break or
        // continue, which belongs to the body.
        let mut body_end = t_idx;
        let mut join_idx = t_idx;
        if t_idx > i + 1 {
            let last = &block.instructions[t_idx - 1];
            if last.opcode == OpCode::Jump {
                if let Some(join) = last.jump_target() {
                    if join > target && self.loop_exit_stmt(join).is_none() {
                        body_end = t_idx - 1;
                        join_idx = block.index_at_or_after(join).min(end);
                    }
                }
            }
        }

        let mut body = Vec::new();
        self.lift_range(i + 1, body_end, &mut body)?;
        let mut orelse = Vec::new();
        if join_idx > t_idx {
            self.lift_range(t_idx, join_idx, &mut orelse)?;
        }
        out.push(Stmt::at(StmtKind::If { test, body, orelse }, line));
        Ok(join_idx.max(t_idx))
    }

    /// Unconditional `JUMP`.
    pub(super) fn lift_jump(
        &mut self,
        i: usize,
        end: usize,
        out: &mut Vec<Stmt>,
    ) -> Result<usize> {
        let block = self.block;
        let instr = &block.instructions[i];
        let Some(target) = instr.jump_target() else {
            self.warnings
                .push(format!("JUMP without target at {}", instr.offset));
            return Ok(i + 1);
        };

        if let Some(kind) = self.loop_exit_stmt(target) {
            self.push_stmt(out, kind);
            return Ok(i + 1);
        }

        if target > instr.offset && self.cfg.is_loop_header(target) {
            return self.lift_while(i, end, target, out);
        }

        // Usually the else-boundary of an if, which lift_cond_jump
        // consumes; reaching one directly means an unrecognized shape.
        self.warnings
            .push(format!("unattributed JUMP at offset {}", instr.offset));
        Ok(i + 1)
    }

    /// The jump-to-test `while` layout: `JUMP Lt; body...; Lt: test;
    /// POP_JUMP_IF_* body`.
    fn lift_while(
        &mut self,
        i: usize,
        end: usize,
        test_off: u32,
        out: &mut Vec<Stmt>,
    ) -> Result<usize> {
        let block = self.block;
        let line = self.current_line;
        let body_start = i + 1;
        let body_off = block.instructions.get(body_start).map(|x| x.offset);
        let test_idx = block.index_at_or_after(test_off).min(end);

        // The conditional that closes the loop jumps back to the body.
        let mut cond_idx = None;
        for j in test_idx..end {
            let ins = &block.instructions[j];
            if matches!(ins.opcode, OpCode::PopJumpIfTrue | OpCode::PopJumpIfFalse)
                && ins.jump_target() == body_off
            {
                cond_idx = Some(j);
                break;
            }
        }
        let Some(cond) = cond_idx else {
            self.warnings.push(format!(
                "jump into loop header at {} without a matching test",
                test_off
            ));
            return Ok(i + 1);
        };
        let exit_off = block
            .instructions
            .get(cond + 1)
            .map(|x| x.offset)
            .unwrap_or(u32::MAX);

        self.aux.push(AuxMarker::Loop {
            head: test_off,
            exit: exit_off,
        });

        // The condition region produces one expression and no statements.
        let mut cond_stmts = Vec::new();
        self.lift_range(test_idx, cond, &mut cond_stmts)?;
        if !cond_stmts.is_empty() {
            self.warnings
                .push(format!("statements inside loop condition at {}", test_off));
        }
        let test = self.pop_expr()?;
        let test = if block.instructions[cond].opcode == OpCode::PopJumpIfFalse {
            negate(test)
        } else {
            test
        };

        let mut body = Vec::new();
        self.lift_range(body_start, test_idx, &mut body)?;
        self.aux.pop();

        out.push(Stmt::at(StmtKind::While { test, body }, line));
        Ok(cond + 1)
    }

    /// A loop header reached linearly: a bottom-tested loop. Returns
    /// `None` when no back-jump is found in range, letting the caller
    /// dispatch the instruction normally.
    pub(super) fn try_bottom_loop(
        &mut self,
        i: usize,
        end: usize,
        out: &mut Vec<Stmt>,
    ) -> Result<Option<usize>> {
        let block = self.block;
        let head_off = block.instructions[i].offset;
        let line = self.current_line;

        let mut back = None;
        for j in i..end {
            let ins = &block.instructions[j];
            if matches!(
                ins.opcode,
                OpCode::Jump | OpCode::PopJumpIfTrue | OpCode::PopJumpIfFalse
            ) && ins.jump_target() == Some(head_off)
            {
                back = Some(j);
            }
        }
        let Some(back) = back else {
            return Ok(None);
        };
        let exit_off = block
            .instructions
            .get(back + 1)
            .map(|x| x.offset)
            .unwrap_or(u32::MAX);

        self.aux.push(AuxMarker::Loop {
            head: head_off,
            exit: exit_off,
        });
        let mut body = Vec::new();
        self.lift_range(i, back, &mut body)?;

        // The closing jump: unconditional is the bare repeat; conditional
        // carries the loop's real test, emitted as a trailing break.
        let closing = &block.instructions[back];
        match closing.opcode {
            OpCode::PopJumpIfTrue | OpCode::PopJumpIfFalse => {
                let test = self.pop_expr()?;
                let break_test = if closing.opcode == OpCode::PopJumpIfTrue {
                    negate(test)
                } else {
                    test
                };
                body.push(Stmt::new(StmtKind::If {
                    test: break_test,
                    body: vec![Stmt::new(StmtKind::Break)],
                    orelse: Vec::new(),
                }));
            }
            _ => {}
        }
        self.aux.pop();

        out.push(Stmt::at(
            StmtKind::While {
                test: Expr::Constant(Constant::True),
                body,
            },
            line,
        ));
        Ok(Some(back + 1))
    }

    /// `FOR_ITER <delta>`: iterate the expression on top of the stack.
    pub(super) fn lift_for(&mut self, i: usize, end: usize, out: &mut Vec<Stmt>) -> Result<usize> {
        let block = self.block;
        let instr = &block.instructions[i];
        let line = self.current_line;
        let Some(delta) = instr.uint_operand() else {
            self.warnings
                .push(format!("FOR_ITER without delta at {}", instr.offset));
            return Ok(i + 1);
        };
        let head_off = instr.offset;
        let exit_off = head_off + delta;
        let iter = self.pop_expr()?;

        // The loop variable is the store immediately after FOR_ITER.
        let (target, body_start) = match block.instructions.get(i + 1) {
            Some(s) if s.opcode == OpCode::StoreName => (
                Expr::name(s.name_operand().unwrap_or("_"), Ctx::Store),
                i + 2,
            ),
            Some(s) if s.opcode == OpCode::StoreFast => {
                let n = s.uint_operand().unwrap_or(0) as usize;
                (Expr::name(self.fast_name(n), Ctx::Store), i + 2)
            }
            _ => {
                self.warnings.push(format!(
                    "FOR_ITER at {} without a loop-variable store",
                    head_off
                ));
                (Expr::name("_", Ctx::Store), i + 1)
            }
        };

        let exit_idx = block.index_at_or_after(exit_off).min(end);
        // Exclude the jump back to the FOR_ITER head.
        let mut body_end = exit_idx;
        if exit_idx > body_start {
            let last = &block.instructions[exit_idx - 1];
            if last.opcode == OpCode::Jump && last.jump_target() == Some(head_off) {
                body_end = exit_idx - 1;
            }
        }

        self.aux.push(AuxMarker::Loop {
            head: head_off,
            exit: exit_off,
        });
        let mut body = Vec::new();
        self.lift_range(body_start, body_end, &mut body)?;
        self.aux.pop();

        out.push(Stmt::at(StmtKind::For { target, iter, body }, line));
        Ok(exit_idx)
    }

    /// `UNWIND_JUMP` leaving a loop (or restarting it) through exception
    /// state; the first target names where flow resumes.
    pub(super) fn lift_unwind_jump(&mut self, i: usize, out: &mut Vec<Stmt>) -> Result<usize> {
        let block = self.block;
        let instr = &block.instructions[i];
        if let Some(&target) = instr.jump_targets().first() {
            if let Some(kind) = self.loop_exit_stmt(target) {
                self.push_stmt(out, kind);
                return Ok(i + 1);
            }
        }
        self.warnings.push(format!(
            "UNWIND_JUMP at {} without a recognized loop target",
            instr.offset
        ));
        Ok(i + 1)
    }
}

/// Logical negation, simplified: `not (a > b)` folds to `a <= b`, and a
/// double negation cancels.
fn negate(e: Expr) -> Expr {
    use crate::ast::CmpOp::*;
    match e {
        Expr::UnaryOp {
            op: UnaryOpKind::Not,
            operand,
        } => *operand,
        Expr::Compare {
            left,
            ops,
            comparators,
        } if ops.len() == 1 => {
            let flipped = match ops[0] {
                Eq => NotEq,
                NotEq => Eq,
                Lt => GtE,
                GtE => Lt,
                Gt => LtE,
                LtE => Gt,
            };
            Expr::Compare {
                left,
                ops: vec![flipped],
                comparators,
            }
        }
        other => Expr::UnaryOp {
            op: UnaryOpKind::Not,
            operand: Box::new(other),
        },
    }
}
