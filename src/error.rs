//! Error taxonomy for the decompilation pipeline.
//!
//! Per-module errors are caught at the module boundary in the CLI; a
//! sentinel output is written and processing continues with the next
//! module. `UnsupportedOpcode` exists for completeness but is normally
//! surfaced as a warning plus an `Expr::Unknown` placeholder instead of
//! being raised.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed disassembly input. File-level: abort this module.
    #[error("malformed disassembly at line {line}: {reason}")]
    Parse { line: usize, reason: String },

    /// An opcode outside the recognized set, raised only where a
    /// placeholder cannot stand in for the value.
    #[error("unsupported opcode '{0}'")]
    UnsupportedOpcode(String),

    /// Attempted pop on an empty operand stack while lifting.
    #[error("operand stack underflow at offset {offset} in '{block}'")]
    StackUnderflow { block: String, offset: u32 },

    /// `MAKE_FUNCTION` referenced a descriptor absent from the parsed
    /// blocks.
    #[error("unknown code block descriptor '{0}'")]
    DescriptorNotFound(String),

    /// The VM subprocess failed or produced no recognizable output.
    #[error("VM invocation failed: {0}")]
    VmInvocation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
