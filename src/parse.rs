//! Parser for the VM's verbose disassembly dump.
//!
//! The dump interleaves code-block headers, prelude metadata, line-number
//! tables, and instruction rows. Classification is line-oriented, first
//! match wins:
//!
//! - `mem` prefix        → end of disassembly, stop.
//! - blank, `(`, `Raw bytecode` → skip.
//! - `File `             → a new code block begins.
//! - `arg names:`        → parameter names of the current block.
//! - two leading spaces  → `bc=<n> line=<n>` line-info row.
//! - one leading space   → other prelude noise, skip.
//! - anything else       → an instruction row.
//!
//! One wrinkle: the VM's disassembler is not newline-safe for string
//! constants, so an instruction row whose first token is not an integer is
//! the continuation of the previous instruction's operand.

use tracing::{debug, info};

use crate::bytecode::{CodeBlock, Instruction, OpCode, ParsedModule};
use crate::error::{Error, Result};

/// Parse the full disassembly text into a module map.
pub fn parse_disassembly(text: &str) -> Result<ParsedModule> {
    Parser::new().run(text)
}

struct Parser {
    module: ParsedModule,
    current: Option<CodeBlock>,
}

impl Parser {
    fn new() -> Self {
        Self {
            module: ParsedModule::new(),
            current: None,
        }
    }

    fn run(mut self, text: &str) -> Result<ParsedModule> {
        for (idx, raw) in text.lines().enumerate() {
            let lineno = idx + 1;
            if raw.starts_with("mem") {
                break;
            }
            if raw.trim().is_empty() || raw.starts_with('(') || raw.starts_with("Raw bytecode") {
                continue;
            }
            if raw.starts_with("File ") {
                self.begin_block(raw, lineno)?;
                continue;
            }
            if raw.starts_with("arg names:") {
                if let Some(block) = self.current.as_mut() {
                    block.args = raw.split_whitespace().skip(2).map(str::to_string).collect();
                }
                continue;
            }
            if raw.starts_with("  ") {
                self.line_info_row(raw, lineno)?;
                continue;
            }
            if raw.starts_with(' ') {
                continue;
            }
            self.instruction_row(raw, lineno)?;
        }
        if let Some(block) = self.current.take() {
            self.module.insert(block);
        }
        Ok(self.module)
    }

    /// `File <source>, code block '<name>' (descriptor: <desc>, ...)`.
    fn begin_block(&mut self, raw: &str, lineno: usize) -> Result<()> {
        if let Some(block) = self.current.take() {
            self.module.insert(block);
        }

        let source = raw[5..]
            .split(',')
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| malformed(lineno, "File header without source name"))?
            .to_string();
        let name = raw
            .split('\'')
            .nth(1)
            .ok_or_else(|| malformed(lineno, "File header without quoted block name"))?
            .to_string();
        let descriptor = raw
            .split_whitespace()
            .nth(6)
            .map(|t| t.trim_end_matches(',').to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| malformed(lineno, "File header without descriptor"))?;

        info!("code block '{}' ({})", name, descriptor);
        self.current = Some(CodeBlock::new(name, source, descriptor));
        Ok(())
    }

    /// `  bc=<offset> line=<line>`.
    fn line_info_row(&mut self, raw: &str, lineno: usize) -> Result<()> {
        let block = self
            .current
            .as_mut()
            .ok_or_else(|| malformed(lineno, "line-info row outside of a code block"))?;

        let mut parts = raw.split_whitespace();
        let bc = field_value(parts.next(), "bc")
            .ok_or_else(|| malformed(lineno, "line-info row without bc=<offset>"))?;
        let line = field_value(parts.next(), "line")
            .ok_or_else(|| malformed(lineno, "line-info row without line=<line>"))?;
        block.line_info.insert(bc, line);
        Ok(())
    }

    /// `<offset> <OPCODE> <operands...>`, or a continuation of the previous
    /// instruction's string operand when the offset fails to parse.
    fn instruction_row(&mut self, raw: &str, lineno: usize) -> Result<()> {
        let block = self
            .current
            .as_mut()
            .ok_or_else(|| malformed(lineno, "instruction row outside of a code block"))?;

        let line = raw.trim();
        let mut parts = line.split_whitespace();
        let first = parts
            .next()
            .ok_or_else(|| malformed(lineno, "empty instruction row"))?;

        let offset: u32 = match first.parse() {
            Ok(n) => n,
            Err(_) => {
                // A raw newline was printed inside a string constant.
                let last = block.instructions.last_mut().ok_or_else(|| {
                    malformed(lineno, "continuation row with no preceding instruction")
                })?;
                debug!("operand continuation at line {}", lineno);
                last.operands.push('\n');
                last.operands.push_str(line);
                return Ok(());
            }
        };

        let opcode = parts
            .next()
            .map(OpCode::parse)
            .ok_or_else(|| malformed(lineno, "instruction row without opcode"))?;
        let operands = parts.collect::<Vec<_>>().join(" ");
        let srcline = block.line_info.get(&offset).copied();
        block.push_instruction(Instruction::new(offset, opcode, operands, srcline));
        Ok(())
    }
}

fn malformed(line: usize, reason: &str) -> Error {
    Error::Parse {
        line,
        reason: reason.to_string(),
    }
}

/// `bc=12` with key `bc` → `12`.
fn field_value(token: Option<&str>, key: &str) -> Option<u32> {
    let (k, v) = token?.split_once('=')?;
    if k != key {
        return None;
    }
    v.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::OpCode;

    const DUMP: &str = "\
File test.py, code block '<module>' (descriptor: 4300e2e0, bytecode @4300e320 12 bytes)
Raw bytecode (code_info_size=5, bytecode_size=7):
 54 65 05 60 20 51 34 01 16 02 59 63
arg names:
(N_STATE 2)
(N_EXC_STACK 0)
  bc=0 line=1
00 LOAD_CONST_SMALL_INT 42
02 STORE_NAME x
04 LOAD_CONST_NONE
05 RETURN_VALUE
mem: total=1234
";

    #[test]
    fn test_parses_module_block() {
        let module = parse_disassembly(DUMP).unwrap();
        assert_eq!(module.blocks.len(), 1);
        let block = module.entry().unwrap();
        assert_eq!(block.name, "<module>");
        assert_eq!(block.source, "test.py");
        assert_eq!(block.descriptor, "4300e2e0");
        assert_eq!(block.instructions.len(), 4);
        assert_eq!(block.instructions[0].opcode, OpCode::LoadConstSmallInt);
        assert_eq!(block.instructions[0].operands, "42");
        assert_eq!(block.instructions[0].line, Some(1));
        assert_eq!(block.instructions[1].line, None);
    }

    #[test]
    fn test_stops_at_mem_line() {
        let module = parse_disassembly(DUMP).unwrap();
        // Nothing after "mem:" leaks into the block.
        let block = module.entry().unwrap();
        assert_eq!(block.instructions.last().unwrap().opcode, OpCode::ReturnValue);
    }

    #[test]
    fn test_arg_names() {
        let dump = "\
File lib.py, code block 'f' (descriptor: aa01, bytecode @aa10 4 bytes)
arg names: x y
00 LOAD_FAST 0
02 RETURN_VALUE
";
        let module = parse_disassembly(dump).unwrap();
        assert_eq!(module.get("aa01").unwrap().args, vec!["x", "y"]);
    }

    #[test]
    fn test_multiline_string_constant() {
        let dump = "\
File t.py, code block '<module>' (descriptor: b2, bytecode @b8 9 bytes)
00 LOAD_CONST_STRING 'first
second'
04 STORE_NAME s
06 LOAD_CONST_NONE
07 RETURN_VALUE
";
        let module = parse_disassembly(dump).unwrap();
        let block = module.entry().unwrap();
        assert_eq!(block.instructions[0].operands, "'first\nsecond'");
        assert_eq!(block.instructions[0].quoted_operand(), "first\nsecond");
    }

    #[test]
    fn test_two_blocks_keyed_by_descriptor() {
        let dump = "\
File t.py, code block '<module>' (descriptor: d0, bytecode @d8 4 bytes)
00 MAKE_FUNCTION d1
02 STORE_NAME f
File t.py, code block 'f' (descriptor: d1, bytecode @e0 2 bytes)
arg names:
00 LOAD_CONST_NONE
01 RETURN_VALUE
";
        let module = parse_disassembly(dump).unwrap();
        assert_eq!(module.blocks.len(), 2);
        assert!(module.get("d0").is_some());
        assert_eq!(module.get("d1").unwrap().name, "f");
    }

    #[test]
    fn test_malformed_file_header() {
        let err = parse_disassembly("File \n").unwrap_err();
        match err {
            Error::Parse { line, .. } => assert_eq!(line, 1),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_continuation_without_instruction_fails() {
        let dump = "\
File t.py, code block '<module>' (descriptor: c0, bytecode @c8 2 bytes)
stray text row
";
        assert!(matches!(
            parse_disassembly(dump),
            Err(Error::Parse { line: 2, .. })
        ));
    }
}
