//! Stack-machine lifter: abstract interpretation of bytecode into AST.
//!
//! The lifter walks a code block's instructions in order and, per opcode,
//! mutates an operand stack of typed values and an auxiliary marker stack,
//! appending statements as they emerge. Expressions accumulate on the
//! operand stack until an opcode with statement semantics (a store, a
//! return, a discarded call) consumes them.
//!
//! Invariant: after each instruction the operand stack holds exactly what
//! the VM's concrete stack would hold at the same program point, modeled
//! at the AST level. Nested lifts for `MAKE_FUNCTION` use fresh stacks.

mod control;

use tracing::{debug, warn};

use crate::ast::{
    Alias, BinOpKind, CmpOp, Constant, Ctx, Expr, Keyword, Module, Stmt, StmtKind,
};
use crate::bytecode::{CodeBlock, Instruction, OpCode, ParsedModule, MODULE_BLOCK};
use crate::cfg::{build_cfg, Cfg};
use crate::error::{Error, Result};

/// Lift the whole module, starting from the `<module>` entry block.
///
/// Expects every code block's basic blocks to be partitioned already
/// (see [`crate::cfg::build_basic_blocks`]); lifting still works without
/// the partition, but loop recovery degrades.
pub fn lift_module(module: &ParsedModule) -> Result<Module> {
    let entry = module
        .entry()
        .ok_or_else(|| Error::DescriptorNotFound(MODULE_BLOCK.to_string()))?;
    let mut lifter = Lifter::new(module, entry);
    let body = lifter.lift_body()?;
    for w in &lifter.warnings {
        warn!("{}", w);
    }
    Ok(Module { body })
}

// ─── Stack values and markers ─────────────────────────────────────

/// What the operand stack holds. Almost always an expression; imports and
/// definitions travel as typed pending values until their store lands.
#[derive(Clone, Debug)]
enum Value {
    Expr(Expr),
    /// The module object produced by `IMPORT_NAME`, still collecting
    /// aliases.
    Import(PendingImport),
    /// A function definition awaiting its store.
    Def(Stmt),
    /// A class definition already appended to the statement list; the
    /// store that follows may still rename it.
    DefRef(String),
}

#[derive(Clone, Debug)]
struct PendingImport {
    module: String,
    names: Vec<Alias>,
    from: bool,
    level: u32,
}

impl PendingImport {
    fn to_stmt(&self) -> StmtKind {
        if self.from {
            StmtKind::ImportFrom {
                module: self.module.clone(),
                names: self.names.clone(),
                level: self.level,
            }
        } else {
            StmtKind::Import {
                names: self.names.clone(),
            }
        }
    }
}

/// Decompile-time metadata the VM encodes implicitly in instruction
/// ordering.
#[derive(Clone, Debug)]
enum AuxMarker {
    /// An import alias awaiting its store; carries the imported name.
    ImportAlias(String),
    /// `LOAD_BUILD_CLASS` seen; the next `CALL_FUNCTION` materializes a
    /// class.
    BuildClass,
    /// Innermost loop context: continue target and break target offsets.
    Loop { head: u32, exit: u32 },
}

// ─── Lifter ───────────────────────────────────────────────────────

pub(crate) struct Lifter<'m> {
    module: &'m ParsedModule,
    block: &'m CodeBlock,
    cfg: Cfg,
    stack: Vec<Value>,
    aux: Vec<AuxMarker>,
    local_names: Vec<String>,
    current_line: Option<u32>,
    cur_offset: u32,
    pub(crate) warnings: Vec<String>,
}

impl<'m> Lifter<'m> {
    pub(crate) fn new(module: &'m ParsedModule, block: &'m CodeBlock) -> Self {
        Self {
            module,
            block,
            cfg: build_cfg(block),
            stack: Vec::new(),
            aux: Vec::new(),
            local_names: Vec::new(),
            current_line: None,
            cur_offset: 0,
            warnings: Vec::new(),
        }
    }

    /// Lift the whole code block to a statement list.
    pub(crate) fn lift_body(&mut self) -> Result<Vec<Stmt>> {
        debug!("lifting '{}'", self.block.name);
        let mut out = Vec::new();
        self.lift_range(0, self.block.instructions.len(), &mut out)?;
        strip_implicit_return(&mut out);
        if !self.stack.is_empty() {
            self.warnings.push(format!(
                "operand stack not empty after lifting '{}' ({} values left)",
                self.block.name,
                self.stack.len()
            ));
        }
        Ok(out)
    }

    /// True when the operand stack drained completely.
    #[cfg(test)]
    pub(crate) fn stack_is_balanced(&self) -> bool {
        self.stack.is_empty()
    }

    fn lift_range(&mut self, start: usize, end: usize, out: &mut Vec<Stmt>) -> Result<()> {
        let mut i = start;
        while i < end {
            let block = self.block;
            let instr = &block.instructions[i];
            // A loop header reached linearly (not through a jump-to-test
            // or FOR_ITER shape) is a bottom-tested loop.
            if self.cfg.is_loop_header(instr.offset)
                && instr.opcode != OpCode::ForIter
                && !self.in_loop(instr.offset)
            {
                if let Some(next) = self.try_bottom_loop(i, end, out)? {
                    i = next;
                    continue;
                }
            }
            i = self.lift_instruction(i, end, out)?;
        }
        Ok(())
    }

    fn lift_instruction(&mut self, i: usize, end: usize, out: &mut Vec<Stmt>) -> Result<usize> {
        let block = self.block;
        let instr = &block.instructions[i];
        if instr.line.is_some() {
            self.current_line = instr.line;
        }
        self.cur_offset = instr.offset;

        match &instr.opcode {
            // ── Constants ──
            OpCode::LoadConstSmallInt => match instr.int_operand() {
                Some(n) => self.push(Expr::Constant(Constant::Int(n))),
                None => self.degrade(instr),
            },
            OpCode::LoadConstNone => self.push(Expr::Constant(Constant::None)),
            OpCode::LoadConstTrue => self.push(Expr::Constant(Constant::True)),
            OpCode::LoadConstFalse => self.push(Expr::Constant(Constant::False)),
            OpCode::LoadConstString => self.push(Expr::Constant(Constant::Str(
                instr.quoted_operand().to_string(),
            ))),
            OpCode::LoadConstObj => {
                // `<kind>=<value>`; only the value is retained.
                let payload = instr
                    .operands
                    .split_once('=')
                    .map(|(_, v)| v)
                    .unwrap_or(&instr.operands)
                    .trim();
                let payload = payload
                    .strip_prefix('\'')
                    .and_then(|p| p.strip_suffix('\''))
                    .unwrap_or(payload);
                self.push(Expr::Constant(Constant::Literal(payload.to_string())));
            }

            // ── Names ──
            OpCode::LoadName | OpCode::LoadGlobal => match instr.name_operand() {
                Some(name) => self.push(Expr::name(name, Ctx::Load)),
                None => self.degrade(instr),
            },
            OpCode::LoadFast => match instr.uint_operand() {
                Some(n) => {
                    let name = self.fast_name(n as usize);
                    self.push(Expr::name(name, Ctx::Load));
                }
                None => self.degrade(instr),
            },
            OpCode::LoadAttr | OpCode::LoadMethod => {
                let attr = instr.name_operand().unwrap_or_default().to_string();
                let value = self.pop_expr()?;
                self.push(Expr::Attribute {
                    value: Box::new(value),
                    attr,
                    ctx: Ctx::Load,
                });
            }
            OpCode::LoadSubscr => {
                let index = self.pop_expr()?;
                let value = self.pop_expr()?;
                self.push(Expr::Subscript {
                    value: Box::new(value),
                    index: Box::new(index),
                    ctx: Ctx::Load,
                });
            }
            OpCode::LoadBuildClass => self.aux.push(AuxMarker::BuildClass),

            // ── Collections ──
            OpCode::BuildTuple | OpCode::BuildList => {
                let n = instr.uint_operand().unwrap_or(0) as usize;
                let mut elts = Vec::with_capacity(n);
                for _ in 0..n {
                    elts.insert(0, self.pop_expr()?);
                }
                let e = if instr.opcode == OpCode::BuildTuple {
                    Expr::Tuple {
                        elts,
                        ctx: Ctx::Load,
                    }
                } else {
                    Expr::List {
                        elts,
                        ctx: Ctx::Load,
                    }
                };
                self.push(e);
            }

            // ── Stores ──
            OpCode::StoreName => {
                let name = instr.name_operand().unwrap_or_default().to_string();
                self.store(&name, out)?;
            }
            OpCode::StoreFast => {
                let n = instr.uint_operand().unwrap_or(0) as usize;
                let name = self.fast_name(n);
                self.store(&name, out)?;
            }
            OpCode::StoreAttr => {
                let attr = instr.name_operand().unwrap_or_default().to_string();
                let obj = self.pop_expr()?;
                let value = self.pop_expr()?;
                let target = Expr::Attribute {
                    value: Box::new(obj),
                    attr,
                    ctx: Ctx::Store,
                };
                self.emit_assign(target, value, out);
            }

            // ── Imports ──
            OpCode::ImportName => self.import_name(instr)?,
            OpCode::ImportFrom => self.import_from(instr)?,

            // ── Calls and definitions ──
            OpCode::CallFunction | OpCode::CallMethod => return self.call(i, out),
            OpCode::MakeFunction => self.make_function(instr)?,
            OpCode::ReturnValue => {
                let value = match self.pop_expr()? {
                    Expr::Constant(Constant::None) => None,
                    v => Some(v),
                };
                self.push_stmt(out, StmtKind::Return { value });
            }

            // ── Stack utilities ──
            OpCode::PopTop => {
                self.pop_value()?;
            }
            OpCode::DupTop => {
                let top = match self.stack.last() {
                    Some(v) => v.clone(),
                    None => return Err(self.underflow()),
                };
                self.stack.push(top);
            }
            OpCode::RotTwo => {
                let len = self.stack.len();
                if len < 2 {
                    return Err(self.underflow());
                }
                self.stack.swap(len - 1, len - 2);
            }
            OpCode::RotThree => {
                // Bottom of the top three moves to the top.
                let len = self.stack.len();
                if len < 3 {
                    return Err(self.underflow());
                }
                let bottom = self.stack.remove(len - 3);
                self.stack.push(bottom);
            }

            // ── Operators ──
            OpCode::BinaryOp => self.binary_op(instr)?,

            // ── Control flow ──
            OpCode::GetIterStack => {} // the iterable is already on top
            OpCode::ForIter => return self.lift_for(i, end, out),
            OpCode::PopJumpIfFalse => return self.lift_cond_jump(i, end, false, out),
            OpCode::PopJumpIfTrue => return self.lift_cond_jump(i, end, true, out),
            OpCode::Jump => return self.lift_jump(i, end, out),
            OpCode::UnwindJump => return self.lift_unwind_jump(i, out),

            OpCode::Unknown(name) => {
                self.warnings
                    .push(format!("unknown opcode '{}' at offset {}", name, instr.offset));
                self.push(Expr::Unknown {
                    opcode: name.clone(),
                    operands: instr.operands.clone(),
                });
            }
        }
        Ok(i + 1)
    }

    // ── Stores ────────────────────────────────────────────────────

    fn store(&mut self, name: &str, out: &mut Vec<Stmt>) -> Result<()> {
        if self.has_import_markers() {
            return self.import_store(name, out);
        }
        match self.stack.last() {
            Some(Value::Def(_)) => {
                let Some(Value::Def(mut def)) = self.stack.pop() else {
                    unreachable!()
                };
                // The name is carried by the def itself; no Assign wrapper.
                if let StmtKind::FunctionDef { name: def_name, .. } = &mut def.kind {
                    if def_name != name {
                        *def_name = name.to_string();
                    }
                }
                out.push(def);
                Ok(())
            }
            Some(Value::DefRef(_)) => {
                let Some(Value::DefRef(class_name)) = self.stack.pop() else {
                    unreachable!()
                };
                if class_name != name {
                    if let Some(Stmt {
                        kind: StmtKind::ClassDef { name: n, .. },
                        ..
                    }) = out.last_mut()
                    {
                        *n = name.to_string();
                    }
                }
                Ok(())
            }
            _ => {
                let value = self.pop_expr()?;
                let target = Expr::name(name, Ctx::Store);
                self.emit_assign(target, value, out);
                Ok(())
            }
        }
    }

    /// Emit an assignment, recovering `x += y` when the value is an
    /// in-place binop whose left side is the target.
    fn emit_assign(&mut self, target: Expr, value: Expr, out: &mut Vec<Stmt>) {
        if let Expr::BinOp {
            left,
            op,
            right,
            inplace: true,
        } = &value
        {
            if left.same_target(&target) {
                let kind = StmtKind::AugAssign {
                    target,
                    op: *op,
                    value: (**right).clone(),
                };
                self.push_stmt(out, kind);
                return;
            }
        }
        self.push_stmt(
            out,
            StmtKind::Assign {
                targets: vec![target],
                value,
            },
        );
    }

    // ── Imports ───────────────────────────────────────────────────

    fn import_name(&mut self, instr: &Instruction) -> Result<()> {
        let module_name = instr.quoted_operand().to_string();
        let fromlist = self.pop_expr()?;
        let level = match self.pop_expr()? {
            Expr::Constant(Constant::Int(n)) if n > 0 => n as u32,
            _ => 0,
        };
        match fromlist {
            Expr::Tuple { elts, .. } => {
                let mut names = Vec::with_capacity(elts.len());
                for e in &elts {
                    if let Expr::Constant(Constant::Str(s)) = e {
                        self.aux.push(AuxMarker::ImportAlias(s.clone()));
                        names.push(Alias::plain(s.clone()));
                    } else {
                        self.warnings
                            .push(format!("non-string name in fromlist of '{}'", module_name));
                    }
                }
                self.stack.push(Value::Import(PendingImport {
                    module: module_name,
                    names,
                    from: false,
                    level,
                }));
            }
            _ => {
                // `Constant(None)` fromlist: a plain `import m`.
                self.aux.push(AuxMarker::ImportAlias(module_name.clone()));
                self.stack.push(Value::Import(PendingImport {
                    module: module_name.clone(),
                    names: vec![Alias::plain(module_name)],
                    from: false,
                    level,
                }));
            }
        }
        Ok(())
    }

    fn import_from(&mut self, instr: &Instruction) -> Result<()> {
        let name = instr.quoted_operand().to_string();
        if let Some(Value::Import(p)) = self.stack.last_mut() {
            p.from = true;
        } else {
            self.warnings
                .push(format!("IMPORT_FROM '{}' without a pending import", name));
        }
        self.stack.push(Value::Expr(Expr::name(name, Ctx::Load)));
        Ok(())
    }

    /// A store that lands while import-alias markers are pending.
    fn import_store(&mut self, bound: &str, out: &mut Vec<Stmt>) -> Result<()> {
        match self.pop_value()? {
            Value::Import(mut p) => {
                // Plain import: the store consumes the module object and
                // closes the group.
                self.remove_import_marker(None);
                if p.names.is_empty() {
                    p.names.push(Alias::plain(p.module.clone()));
                }
                let alias = &mut p.names[0];
                // `import a.b` binds `a`.
                let binding = alias.name.split('.').next().unwrap_or("").to_string();
                if binding != bound {
                    alias.asname = Some(bound.to_string());
                }
                let kind = p.to_stmt();
                self.push_stmt(out, kind);
                Ok(())
            }
            Value::Expr(Expr::Name { id, .. }) => {
                // From-import member pushed by IMPORT_FROM.
                self.remove_import_marker(Some(&id));
                if let Some(Value::Import(p)) = self.stack.last_mut() {
                    if let Some(alias) = p.names.iter_mut().find(|a| a.name == id) {
                        if alias.name != bound {
                            alias.asname = Some(bound.to_string());
                        }
                    } else {
                        let mut alias = Alias::plain(id.clone());
                        if id != bound {
                            alias.asname = Some(bound.to_string());
                        }
                        p.names.push(alias);
                    }
                }
                if !self.has_import_markers() {
                    let completed = match self.stack.last() {
                        Some(Value::Import(p)) => Some(p.to_stmt()),
                        _ => None,
                    };
                    if let Some(kind) = completed {
                        self.push_stmt(out, kind);
                    }
                }
                Ok(())
            }
            Value::Expr(e) => {
                // Not import-related after all; fall back to a plain
                // assignment.
                let target = Expr::name(bound, Ctx::Store);
                self.emit_assign(target, e, out);
                Ok(())
            }
            other => {
                self.warnings
                    .push(format!("unexpected value stored during import: {:?}", other));
                Ok(())
            }
        }
    }

    fn has_import_markers(&self) -> bool {
        self.aux
            .iter()
            .any(|m| matches!(m, AuxMarker::ImportAlias(_)))
    }

    /// Remove the matching import marker, preferring an exact name match
    /// and falling back to the topmost one.
    fn remove_import_marker(&mut self, name: Option<&str>) {
        let by_name = name.and_then(|want| {
            self.aux
                .iter()
                .rposition(|m| matches!(m, AuxMarker::ImportAlias(n) if n == want))
        });
        let idx = by_name.or_else(|| {
            self.aux
                .iter()
                .rposition(|m| matches!(m, AuxMarker::ImportAlias(_)))
        });
        if let Some(i) = idx {
            self.aux.remove(i);
        }
    }

    // ── Calls and definitions ─────────────────────────────────────

    fn call(&mut self, i: usize, out: &mut Vec<Stmt>) -> Result<usize> {
        let block = self.block;
        let instr = &block.instructions[i];
        let Some((p, q)) = instr.call_counts() else {
            self.degrade(instr);
            return Ok(i + 1);
        };

        if instr.opcode == OpCode::CallFunction
            && matches!(self.aux.last(), Some(AuxMarker::BuildClass))
        {
            return self.materialize_class(i, p, q, out);
        }

        let keywords = self.pop_keywords(q)?;
        let mut args = Vec::with_capacity(p);
        for _ in 0..p {
            args.insert(0, self.pop_expr()?);
        }
        let func = self.pop_expr()?;
        let call = Expr::Call {
            func: Box::new(func),
            args,
            keywords,
        };

        // Lookahead: a call followed by POP_TOP is a statement; the pop
        // that follows merely discards.
        let is_stmt = block
            .instructions
            .get(i + 1)
            .map(|n| n.opcode == OpCode::PopTop)
            .unwrap_or(false);
        if is_stmt {
            self.push_stmt(out, StmtKind::Expr { value: call.clone() });
        }
        self.push(call);
        Ok(i + 1)
    }

    fn pop_keywords(&mut self, q: usize) -> Result<Vec<Keyword>> {
        let mut keywords = Vec::with_capacity(q);
        for _ in 0..q {
            let value = self.pop_expr()?;
            let key = self.pop_expr()?;
            match key {
                Expr::Constant(Constant::Str(s)) => keywords.insert(0, Keyword { arg: s, value }),
                Expr::Name { id, .. } => keywords.insert(0, Keyword { arg: id, value }),
                other => {
                    self.warnings
                        .push(format!("keyword argument with non-name key: {:?}", other));
                }
            }
        }
        Ok(keywords)
    }

    /// The `CALL_FUNCTION` that follows `LOAD_BUILD_CLASS`.
    fn materialize_class(
        &mut self,
        i: usize,
        p: usize,
        q: usize,
        out: &mut Vec<Stmt>,
    ) -> Result<usize> {
        let keywords = self.pop_keywords(q)?;
        let mut bases = Vec::new();
        for _ in 0..p.saturating_sub(2) {
            bases.insert(0, self.pop_expr()?);
        }
        let name = match self.pop_expr()? {
            Expr::Constant(Constant::Str(s)) => s,
            other => {
                self.warnings
                    .push(format!("class name is not a string constant: {:?}", other));
                String::from("<class>")
            }
        };
        let body = match self.pop_value()? {
            Value::Def(Stmt {
                kind: StmtKind::FunctionDef { body, .. },
                ..
            }) => body,
            other => {
                self.warnings
                    .push(format!("class body is not a function: {:?}", other));
                Vec::new()
            }
        };
        self.aux.pop(); // BuildClass sentinel
        let kind = StmtKind::ClassDef {
            name: name.clone(),
            bases,
            keywords,
            body,
            decorators: Vec::new(),
        };
        self.push_stmt(out, kind);
        self.stack.push(Value::DefRef(name));
        Ok(i + 1)
    }

    fn make_function(&mut self, instr: &Instruction) -> Result<()> {
        let desc = instr.name_operand().unwrap_or_default();
        let child = self
            .module
            .get(desc)
            .ok_or_else(|| Error::DescriptorNotFound(desc.to_string()))?;
        debug!("descending into '{}' ({})", child.name, desc);
        let mut sub = Lifter::new(self.module, child);
        let body = sub.lift_body()?;
        self.warnings.append(&mut sub.warnings);
        let def = Stmt::at(
            StmtKind::FunctionDef {
                name: child.name.clone(),
                args: child.args.clone(),
                body,
                decorators: Vec::new(),
            },
            self.current_line,
        );
        self.stack.push(Value::Def(def));
        Ok(())
    }

    // ── Operators ─────────────────────────────────────────────────

    fn binary_op(&mut self, instr: &Instruction) -> Result<()> {
        let mut toks = instr.operands.split_whitespace();
        let arity: usize = toks.next().and_then(|t| t.parse().ok()).unwrap_or(1);
        let Some(dunder) = toks.next() else {
            self.degrade(instr);
            return Ok(());
        };

        if let Some(op) = cmp_of_dunder(dunder) {
            let mut comparators = Vec::with_capacity(arity);
            for _ in 0..arity {
                comparators.insert(0, self.pop_expr()?);
            }
            let left = self.pop_expr()?;
            self.push(Expr::Compare {
                left: Box::new(left),
                ops: vec![op],
                comparators,
            });
            return Ok(());
        }
        if let Some((op, inplace)) = binop_of_dunder(dunder) {
            let right = self.pop_expr()?;
            let left = self.pop_expr()?;
            self.push(Expr::BinOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
                inplace,
            });
            return Ok(());
        }

        // Unknown method tag: consume the declared operands so the stack
        // stays balanced, leave a placeholder.
        self.warnings
            .push(format!("unknown BINARY_OP method '{}'", dunder));
        for _ in 0..arity + 1 {
            self.pop_expr()?;
        }
        self.push(Expr::Unknown {
            opcode: "BINARY_OP".to_string(),
            operands: instr.operands.clone(),
        });
        Ok(())
    }

    // ── Plumbing ──────────────────────────────────────────────────

    fn push(&mut self, e: Expr) {
        self.stack.push(Value::Expr(e));
    }

    fn pop_value(&mut self) -> Result<Value> {
        match self.stack.pop() {
            Some(v) => Ok(v),
            None => Err(self.underflow()),
        }
    }

    fn pop_expr(&mut self) -> Result<Expr> {
        match self.pop_value()? {
            Value::Expr(e) => Ok(e),
            Value::Import(p) => Ok(Expr::name(p.module, Ctx::Load)),
            Value::Def(def) => {
                let name = match &def.kind {
                    StmtKind::FunctionDef { name, .. } => name.clone(),
                    _ => String::from("<def>"),
                };
                self.warnings
                    .push(format!("function value '{}' flattened to a name", name));
                Ok(Expr::name(name, Ctx::Load))
            }
            Value::DefRef(name) => Ok(Expr::name(name, Ctx::Load)),
        }
    }

    fn underflow(&self) -> Error {
        Error::StackUnderflow {
            block: self.block.name.clone(),
            offset: self.cur_offset,
        }
    }

    fn degrade(&mut self, instr: &Instruction) {
        self.warnings.push(format!(
            "unhandled operand form '{} {}' at offset {}",
            instr.opcode, instr.operands, instr.offset
        ));
        self.push(Expr::Unknown {
            opcode: instr.opcode.name().to_string(),
            operands: instr.operands.clone(),
        });
    }

    fn push_stmt(&mut self, out: &mut Vec<Stmt>, kind: StmtKind) {
        out.push(Stmt::at(kind, self.current_line));
    }

    /// Resolve a `LOAD_FAST`/`STORE_FAST` slot: a parameter name, or a
    /// synthesized `local_k` beyond the parameter count.
    fn fast_name(&mut self, n: usize) -> String {
        let block = self.block;
        if n < block.args.len() {
            return block.args[n].clone();
        }
        let k = n - block.args.len();
        while self.local_names.len() <= k {
            self.local_names.push(format!("local_{}", self.local_names.len()));
        }
        self.local_names[k].clone()
    }

    fn in_loop(&self, head: u32) -> bool {
        self.aux
            .iter()
            .any(|m| matches!(m, AuxMarker::Loop { head: h, .. } if *h == head))
    }

    /// `break`/`continue` against the innermost loop, by jump target.
    fn loop_exit_stmt(&self, target: u32) -> Option<StmtKind> {
        for m in self.aux.iter().rev() {
            if let AuxMarker::Loop { head, exit } = m {
                if target == *exit {
                    return Some(StmtKind::Break);
                }
                if target == *head {
                    return Some(StmtKind::Continue);
                }
                return None;
            }
        }
        None
    }
}

/// Drop the compiler's implicit trailing `return None`. An explicit bare
/// `return` as the very last statement is indistinguishable and is dropped
/// with it.
fn strip_implicit_return(out: &mut Vec<Stmt>) {
    if matches!(
        out.last(),
        Some(Stmt {
            kind: StmtKind::Return { value: None },
            ..
        })
    ) {
        out.pop();
    }
}

fn binop_of_dunder(dunder: &str) -> Option<(BinOpKind, bool)> {
    let core = dunder.strip_prefix("__")?.strip_suffix("__")?;
    if let Some(op) = core_binop(core) {
        return Some((op, false));
    }
    if let Some(rest) = core.strip_prefix('i') {
        if let Some(op) = core_binop(rest) {
            return Some((op, true));
        }
    }
    None
}

fn core_binop(core: &str) -> Option<BinOpKind> {
    use BinOpKind::*;
    Some(match core {
        "add" => Add,
        "sub" => Sub,
        "mul" => Mul,
        "truediv" => Div,
        "floordiv" => FloorDiv,
        "mod" => Mod,
        "pow" => Pow,
        "lshift" => LShift,
        "rshift" => RShift,
        "and" => BitAnd,
        "or" => BitOr,
        "xor" => BitXor,
        _ => return None,
    })
}

fn cmp_of_dunder(dunder: &str) -> Option<CmpOp> {
    Some(match dunder {
        "__eq__" => CmpOp::Eq,
        "__ne__" => CmpOp::NotEq,
        "__lt__" => CmpOp::Lt,
        "__le__" => CmpOp::LtE,
        "__gt__" => CmpOp::Gt,
        "__ge__" => CmpOp::GtE,
        _ => return None,
    })
}
