//! Bytecode model — instructions, code blocks, basic blocks.
//!
//! Opcode text is resolved to a closed `OpCode` enum exactly once, in the
//! disassembly parser; everything downstream matches on variants. Strings
//! outside the recognized set map to `Unknown` and survive until the lifter
//! decides what to do with them.

use std::collections::HashMap;
use std::fmt;

/// Display name of the module-level code block, the decompilation entry.
pub const MODULE_BLOCK: &str = "<module>";

// ─── Opcodes ──────────────────────────────────────────────────────

/// Opcode set of the supported bytecode version.
///
/// The set is closed: every opcode the VM's disassembler can print is
/// either a variant here or lands in `Unknown`. `Unknown` opcodes are not
/// an error at parse time; the lifter degrades them to placeholders.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OpCode {
    LoadConstSmallInt,
    LoadConstNone,
    LoadConstTrue,
    LoadConstFalse,
    LoadConstString,
    LoadConstObj,
    LoadName,
    LoadGlobal,
    LoadFast,
    LoadAttr,
    LoadMethod,
    LoadSubscr,
    LoadBuildClass,
    StoreName,
    StoreFast,
    StoreAttr,
    ImportName,
    ImportFrom,
    BuildTuple,
    BuildList,
    MakeFunction,
    CallFunction,
    CallMethod,
    ReturnValue,
    PopTop,
    DupTop,
    RotTwo,
    RotThree,
    BinaryOp,
    ForIter,
    GetIterStack,
    PopJumpIfTrue,
    PopJumpIfFalse,
    Jump,
    UnwindJump,
    Unknown(String),
}

impl OpCode {
    pub fn parse(text: &str) -> OpCode {
        match text {
            "LOAD_CONST_SMALL_INT" => OpCode::LoadConstSmallInt,
            "LOAD_CONST_NONE" => OpCode::LoadConstNone,
            "LOAD_CONST_TRUE" => OpCode::LoadConstTrue,
            "LOAD_CONST_FALSE" => OpCode::LoadConstFalse,
            "LOAD_CONST_STRING" => OpCode::LoadConstString,
            "LOAD_CONST_OBJ" => OpCode::LoadConstObj,
            "LOAD_NAME" => OpCode::LoadName,
            "LOAD_GLOBAL" => OpCode::LoadGlobal,
            "LOAD_FAST" => OpCode::LoadFast,
            "LOAD_ATTR" => OpCode::LoadAttr,
            "LOAD_METHOD" => OpCode::LoadMethod,
            "LOAD_SUBSCR" => OpCode::LoadSubscr,
            "LOAD_BUILD_CLASS" => OpCode::LoadBuildClass,
            "STORE_NAME" => OpCode::StoreName,
            "STORE_FAST" => OpCode::StoreFast,
            "STORE_ATTR" => OpCode::StoreAttr,
            "IMPORT_NAME" => OpCode::ImportName,
            "IMPORT_FROM" => OpCode::ImportFrom,
            "BUILD_TUPLE" => OpCode::BuildTuple,
            "BUILD_LIST" => OpCode::BuildList,
            "MAKE_FUNCTION" => OpCode::MakeFunction,
            "CALL_FUNCTION" => OpCode::CallFunction,
            "CALL_METHOD" => OpCode::CallMethod,
            "RETURN_VALUE" => OpCode::ReturnValue,
            "POP_TOP" => OpCode::PopTop,
            "DUP_TOP" => OpCode::DupTop,
            "ROT_TWO" => OpCode::RotTwo,
            "ROT_THREE" => OpCode::RotThree,
            "BINARY_OP" => OpCode::BinaryOp,
            "FOR_ITER" => OpCode::ForIter,
            "GET_ITER_STACK" => OpCode::GetIterStack,
            "POP_JUMP_IF_TRUE" => OpCode::PopJumpIfTrue,
            "POP_JUMP_IF_FALSE" => OpCode::PopJumpIfFalse,
            "JUMP" => OpCode::Jump,
            "UNWIND_JUMP" => OpCode::UnwindJump,
            other => OpCode::Unknown(other.to_string()),
        }
    }

    /// The textual opcode name as the VM prints it.
    pub fn name(&self) -> &str {
        match self {
            OpCode::LoadConstSmallInt => "LOAD_CONST_SMALL_INT",
            OpCode::LoadConstNone => "LOAD_CONST_NONE",
            OpCode::LoadConstTrue => "LOAD_CONST_TRUE",
            OpCode::LoadConstFalse => "LOAD_CONST_FALSE",
            OpCode::LoadConstString => "LOAD_CONST_STRING",
            OpCode::LoadConstObj => "LOAD_CONST_OBJ",
            OpCode::LoadName => "LOAD_NAME",
            OpCode::LoadGlobal => "LOAD_GLOBAL",
            OpCode::LoadFast => "LOAD_FAST",
            OpCode::LoadAttr => "LOAD_ATTR",
            OpCode::LoadMethod => "LOAD_METHOD",
            OpCode::LoadSubscr => "LOAD_SUBSCR",
            OpCode::LoadBuildClass => "LOAD_BUILD_CLASS",
            OpCode::StoreName => "STORE_NAME",
            OpCode::StoreFast => "STORE_FAST",
            OpCode::StoreAttr => "STORE_ATTR",
            OpCode::ImportName => "IMPORT_NAME",
            OpCode::ImportFrom => "IMPORT_FROM",
            OpCode::BuildTuple => "BUILD_TUPLE",
            OpCode::BuildList => "BUILD_LIST",
            OpCode::MakeFunction => "MAKE_FUNCTION",
            OpCode::CallFunction => "CALL_FUNCTION",
            OpCode::CallMethod => "CALL_METHOD",
            OpCode::ReturnValue => "RETURN_VALUE",
            OpCode::PopTop => "POP_TOP",
            OpCode::DupTop => "DUP_TOP",
            OpCode::RotTwo => "ROT_TWO",
            OpCode::RotThree => "ROT_THREE",
            OpCode::BinaryOp => "BINARY_OP",
            OpCode::ForIter => "FOR_ITER",
            OpCode::GetIterStack => "GET_ITER_STACK",
            OpCode::PopJumpIfTrue => "POP_JUMP_IF_TRUE",
            OpCode::PopJumpIfFalse => "POP_JUMP_IF_FALSE",
            OpCode::Jump => "JUMP",
            OpCode::UnwindJump => "UNWIND_JUMP",
            OpCode::Unknown(s) => s,
        }
    }

    /// True for the jump family the CFG builder cuts on: any opcode whose
    /// printed name contains `JUMP`, including unrecognized ones.
    pub fn is_jump(&self) -> bool {
        match self {
            OpCode::Jump
            | OpCode::UnwindJump
            | OpCode::PopJumpIfTrue
            | OpCode::PopJumpIfFalse => true,
            OpCode::Unknown(s) => s.contains("JUMP"),
            _ => false,
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ─── Instructions ─────────────────────────────────────────────────

/// One decoded instruction row of the disassembly.
///
/// `operands` keeps the raw textual tail; typed accessors below parse the
/// shapes the lifter needs (integers, quoted strings, `n=.. nkw=..`
/// argument counts, jump targets).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    /// Byte position within the owning code block.
    pub offset: u32,
    pub opcode: OpCode,
    pub operands: String,
    /// Source line the VM recorded for this offset, if any.
    pub line: Option<u32>,
}

impl Instruction {
    pub fn new(offset: u32, opcode: OpCode, operands: String, line: Option<u32>) -> Self {
        Self {
            offset,
            opcode,
            operands,
            line,
        }
    }

    /// Whole-operand integer, e.g. `LOAD_CONST_SMALL_INT -3`.
    pub fn int_operand(&self) -> Option<i64> {
        self.operands.trim().parse().ok()
    }

    /// First operand token as an unsigned integer (indices, counts).
    pub fn uint_operand(&self) -> Option<u32> {
        self.operands.split_whitespace().next()?.parse().ok()
    }

    /// Operand with one surrounding pair of single quotes stripped.
    /// `IMPORT_NAME 'os'` yields `os`. Falls back to the raw text when the
    /// quotes are absent.
    pub fn quoted_operand(&self) -> &str {
        let t = self.operands.trim();
        t.strip_prefix('\'')
            .and_then(|t| t.strip_suffix('\''))
            .unwrap_or(t)
    }

    /// First operand token, for name-carrying opcodes (`LOAD_NAME os`).
    pub fn name_operand(&self) -> Option<&str> {
        self.operands.split_whitespace().next()
    }

    /// Absolute jump target (single-target jump family).
    pub fn jump_target(&self) -> Option<u32> {
        self.uint_operand()
    }

    /// All absolute jump targets; `UNWIND_JUMP` carries two.
    pub fn jump_targets(&self) -> Vec<u32> {
        match self.opcode {
            OpCode::UnwindJump => self
                .operands
                .split_whitespace()
                .take(2)
                .filter_map(|t| t.parse().ok())
                .collect(),
            _ => self.jump_target().into_iter().collect(),
        }
    }

    /// Positional/keyword argument counts from a `n=<p> nkw=<q>` tail.
    pub fn call_counts(&self) -> Option<(usize, usize)> {
        let mut n = None;
        let mut nkw = None;
        for tok in self.operands.split_whitespace() {
            if let Some(v) = tok.strip_prefix("n=") {
                n = v.parse().ok();
            } else if let Some(v) = tok.strip_prefix("nkw=") {
                nkw = v.parse().ok();
            }
        }
        Some((n?, nkw?))
    }

    pub(crate) fn line_str(&self) -> String {
        match self.line {
            Some(n) => format!("   # line {}", n),
            None => String::new(),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}{}",
            self.offset,
            self.opcode,
            self.operands,
            self.line_str()
        )
    }
}

// ─── Code blocks ──────────────────────────────────────────────────

/// A basic block: a maximal straight-line run of instructions.
///
/// Blocks index into the owning `CodeBlock`'s instruction vector as a
/// half-open range, so the partition is total and duplicate-free by
/// construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BasicBlock {
    /// `L<entry offset>`.
    pub label: String,
    /// Index of the first instruction in the owning block.
    pub start: usize,
    /// One past the last instruction.
    pub end: usize,
}

impl BasicBlock {
    pub fn new(entry_offset: u32, start: usize, end: usize) -> Self {
        Self {
            label: format!("L{}", entry_offset),
            start,
            end,
        }
    }
}

/// One compilation unit: a module body, function, class body, or
/// comprehension.
#[derive(Clone, Debug, Default)]
pub struct CodeBlock {
    /// Display name, e.g. `<module>`, `foo`, `MyClass`.
    pub name: String,
    /// Originating source file name.
    pub source: String,
    /// Opaque key the VM uses to cross-reference code blocks.
    pub descriptor: String,
    /// Ordered parameter names.
    pub args: Vec<String>,
    pub instructions: Vec<Instruction>,
    /// Filled by the CFG pass; empty until then.
    pub basic_blocks: Vec<BasicBlock>,
    /// Bytecode offset → source line.
    pub line_info: HashMap<u32, u32>,
}

impl CodeBlock {
    pub fn new(name: String, source: String, descriptor: String) -> Self {
        Self {
            name,
            source,
            descriptor,
            ..Default::default()
        }
    }

    pub fn push_instruction(&mut self, instr: Instruction) {
        self.instructions.push(instr);
    }

    /// Index of the first instruction at or after `offset`, capped at the
    /// instruction count. Offsets are strictly increasing, so this is a
    /// binary search.
    pub fn index_at_or_after(&self, offset: u32) -> usize {
        self.instructions
            .partition_point(|instr| instr.offset < offset)
    }
}

// ─── Module map ───────────────────────────────────────────────────

/// All code blocks of one parsed module, in dump order, indexed by
/// descriptor.
#[derive(Debug, Default)]
pub struct ParsedModule {
    pub blocks: Vec<CodeBlock>,
    by_descriptor: HashMap<String, usize>,
}

impl ParsedModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, block: CodeBlock) {
        self.by_descriptor
            .insert(block.descriptor.clone(), self.blocks.len());
        self.blocks.push(block);
    }

    pub fn get(&self, descriptor: &str) -> Option<&CodeBlock> {
        self.by_descriptor.get(descriptor).map(|&i| &self.blocks[i])
    }

    /// The module-level entry block, found by name rather than position.
    pub fn entry(&self) -> Option<&CodeBlock> {
        self.blocks.iter().find(|b| b.name == MODULE_BLOCK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_roundtrip() {
        for text in ["LOAD_CONST_SMALL_INT", "STORE_NAME", "UNWIND_JUMP"] {
            assert_eq!(OpCode::parse(text).name(), text);
        }
        let unknown = OpCode::parse("LOAD_DEREF");
        assert_eq!(unknown, OpCode::Unknown("LOAD_DEREF".to_string()));
        assert_eq!(unknown.name(), "LOAD_DEREF");
    }

    #[test]
    fn test_jump_family_includes_unknown_jumps() {
        assert!(OpCode::parse("POP_JUMP_IF_FALSE").is_jump());
        assert!(OpCode::parse("UNWIND_JUMP").is_jump());
        assert!(OpCode::parse("SOME_NEW_JUMP").is_jump());
        assert!(!OpCode::parse("LOAD_NAME").is_jump());
        assert!(!OpCode::parse("FOR_ITER").is_jump());
    }

    #[test]
    fn test_operand_accessors() {
        let i = Instruction::new(4, OpCode::ImportName, "'machine'".into(), None);
        assert_eq!(i.quoted_operand(), "machine");

        let i = Instruction::new(0, OpCode::LoadConstSmallInt, "-7".into(), None);
        assert_eq!(i.int_operand(), Some(-7));

        let i = Instruction::new(10, OpCode::CallFunction, "n=2 nkw=1".into(), None);
        assert_eq!(i.call_counts(), Some((2, 1)));

        let i = Instruction::new(8, OpCode::UnwindJump, "30 1".into(), None);
        assert_eq!(i.jump_targets(), vec![30, 1]);
    }

    #[test]
    fn test_index_at_or_after() {
        let mut cb = CodeBlock::new("<module>".into(), "t.py".into(), "d0".into());
        for off in [0u32, 2, 4, 8] {
            cb.push_instruction(Instruction::new(off, OpCode::PopTop, String::new(), None));
        }
        assert_eq!(cb.index_at_or_after(0), 0);
        assert_eq!(cb.index_at_or_after(3), 2);
        assert_eq!(cb.index_at_or_after(8), 3);
        assert_eq!(cb.index_at_or_after(9), 4);
    }
}
