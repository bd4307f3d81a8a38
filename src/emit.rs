//! Output assembly: banners, the `.s` disassembly listing, and the
//! error-sentinel fallback.

use crate::bytecode::{OpCode, ParsedModule};
use crate::error::Error;

/// The four-line `####` banner every output file starts with, followed by
/// one blank line.
pub fn banner(action: &str, version: &str) -> String {
    let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    let c1 = format!("{} with unmpy ({})", action, version);
    let c2 = format!("At: {}", now);
    let width = c1.len().max(c2.len());
    let frame = "#".repeat(width + 6);
    format!(
        "{}\n## {:<width$} ##\n## {:<width$} ##\n{}\n\n",
        frame,
        c1,
        c2,
        frame,
        width = width
    )
}

/// Banner plus payload.
pub fn render_with_banner(action: &str, version: &str, payload: &str) -> String {
    let mut out = banner(action, version);
    out.push_str(payload);
    out
}

/// Human-readable listing of the parsed module: per code block a comment
/// header, then instructions grouped under basic-block labels, with
/// `# line N` trailers and `MAKE_FUNCTION` descriptors annotated with the
/// resolved function name.
pub fn disassembly_listing(module: &ParsedModule) -> String {
    let mut out = String::new();
    for block in &module.blocks {
        out.push_str(&format!("## Source: {}\n", block.source));
        out.push_str(&format!("## Name:   {}\n", block.name));
        out.push_str(&format!("## Args:   [{}]\n", block.args.join(", ")));

        let ranges: Vec<(Option<&str>, usize, usize)> = if block.basic_blocks.is_empty() {
            vec![(None, 0, block.instructions.len())]
        } else {
            block
                .basic_blocks
                .iter()
                .map(|bb| (Some(bb.label.as_str()), bb.start, bb.end))
                .collect()
        };

        for (label, start, end) in ranges {
            if let Some(label) = label {
                out.push_str(label);
                out.push_str(":\n");
            }
            for instr in &block.instructions[start..end] {
                if instr.line.is_some() {
                    out.push('\n');
                }
                let operands = if instr.opcode == OpCode::MakeFunction {
                    match module.get(instr.operands.trim()) {
                        Some(child) => format!("{}({})", instr.operands.trim(), child.name),
                        None => instr.operands.clone(),
                    }
                } else {
                    instr.operands.clone()
                };
                out.push_str(&format!(
                    "  {} {}{}\n",
                    instr.opcode,
                    operands,
                    instr.line_str()
                ));
            }
        }
        out.push('\n');
    }
    out
}

/// Best-effort output for a module that failed to decompile: the error as
/// comment rows, then a bare `ERROR` sentinel.
pub fn error_sentinel(version: &str, err: &Error) -> String {
    let mut out = banner("Decompiled", version);
    for line in err.to_string().lines() {
        out.push_str("# ERROR: ");
        out.push_str(line);
        out.push('\n');
    }
    out.push_str("ERROR\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{CodeBlock, Instruction, OpCode, ParsedModule};

    #[test]
    fn test_banner_shape() {
        let b = banner("Disassembled", "v1.2.3");
        let lines: Vec<&str> = b.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("####"));
        assert!(lines[1].contains("Disassembled with unmpy (v1.2.3)"));
        assert!(lines[2].starts_with("## At: "));
        assert_eq!(lines[0], lines[3]);
        assert_eq!(lines[4], "");
        assert_eq!(lines[0].len(), lines[1].len());
        assert_eq!(lines[1].len(), lines[2].len());
    }

    #[test]
    fn test_listing_annotates_make_function() {
        let mut module = ParsedModule::new();
        let mut top = CodeBlock::new("<module>".into(), "t.py".into(), "d0".into());
        top.push_instruction(Instruction::new(
            0,
            OpCode::MakeFunction,
            "d1".into(),
            Some(1),
        ));
        let f = CodeBlock::new("f".into(), "t.py".into(), "d1".into());
        module.insert(top);
        module.insert(f);

        let listing = disassembly_listing(&module);
        assert!(listing.contains("MAKE_FUNCTION d1(f)"));
        assert!(listing.contains("# line 1"));
        assert!(listing.contains("## Name:   <module>"));
    }

    #[test]
    fn test_error_sentinel_contains_error_marker() {
        let s = error_sentinel(
            "v0",
            &Error::DescriptorNotFound("deadbeef".into()),
        );
        assert!(s.contains("# ERROR: unknown code block descriptor 'deadbeef'"));
        assert!(s.ends_with("ERROR\n"));
    }
}
