//! unmpy — reconstruct Python source from MicroPython `.mpy` modules.
//!
//! The pipeline runs strictly forward: the VM's verbose disassembly text
//! is parsed into code blocks ([`parse`]), each block is partitioned into
//! basic blocks by jump-target analysis ([`cfg`]), the stack machine is
//! abstractly interpreted back into a Python AST ([`lift`]), and the tree
//! is unparsed to source text ([`unparse`]). Modules are independent;
//! the CLI fans them out one worker per module.

pub mod ast;
pub mod bytecode;
pub mod cfg;
pub mod diagnostic;
pub mod emit;
pub mod error;
pub mod lift;
pub mod parse;
pub mod unparse;
pub mod vm;

pub use error::{Error, Result};

use bytecode::ParsedModule;

/// Parse disassembly text and partition every code block into basic
/// blocks.
pub fn parse_and_partition(dis: &str) -> Result<ParsedModule> {
    let mut module = parse::parse_disassembly(dis)?;
    for block in module.blocks.iter_mut() {
        cfg::build_basic_blocks(block);
    }
    Ok(module)
}

/// Full pipeline: disassembly text in, Python source out.
pub fn decompile_source(dis: &str) -> Result<String> {
    let module = parse_and_partition(dis)?;
    let ast = lift::lift_module(&module)?;
    Ok(unparse::unparse_module(&ast))
}
