use thiserror::Error;

/// Primary error type for sift operations.
///
/// Structured variants for the failure modes of the value codec and the
/// bytecode engine. The VM keeps its own small integer error register on
/// the hot path (see `sift-vm`); handlers translate into these variants
/// at the driver boundary.
#[derive(Error, Debug)]
pub enum SiftError {
    // === Value framing ===
    /// A value header, varuint, or container length violated framing rules.
    #[error("corrupt value encoding: {detail}")]
    Corrupt { detail: &'static str },

    /// A varuint ran past the end of the buffer.
    #[error("truncated varuint at offset {offset}")]
    TruncatedVarUint { offset: usize },

    /// A value's declared span exceeds the remaining buffer.
    #[error("value of {size} bytes exceeds remaining buffer of {remaining}")]
    ValueOverrun { size: usize, remaining: usize },

    /// A reserved type code was encountered.
    #[error("reserved type code {tag:#04x}")]
    ReservedType { tag: u8 },

    /// A symbol id is outside the active symbol table.
    #[error("symbol {symbol} not in symbol table (max {max})")]
    SymbolOutOfRange { symbol: u32, max: u32 },

    // === Typed reads ===
    /// A typed read found a different type tag than required.
    #[error("type mismatch: wanted {wanted}, found {found}")]
    TypeMismatch {
        wanted: &'static str,
        found: &'static str,
    },

    // === Bytecode engine ===
    /// The instruction stream referenced an invalid opcode tag.
    #[error("invalid opcode {opcode:#06x} at pc {pc}")]
    InvalidOpcode { opcode: u16, pc: usize },

    /// The current build cannot execute this opcode.
    #[error("opcode {name} is not supported by this backend")]
    NotSupported { name: &'static str },

    /// An opcode needed more scratch than the arena holds even after growth.
    #[error("scratch arena exhausted: opcode needs {needed} bytes, capacity {capacity}")]
    ScratchExhausted { needed: usize, capacity: usize },

    /// A `trap` opcode fired.
    #[error("trap at pc {pc}")]
    Trap { pc: usize },

    /// The VM halted with an error register set.
    #[error("bytecode error {code} at pc {pc} (info {info:#x})")]
    Bytecode { code: u16, pc: usize, info: u64 },

    // === Program construction ===
    /// A program referenced a register slot outside the allocated stack.
    #[error("register slot {slot} out of range (stack holds {cells} cells)")]
    SlotOutOfRange { slot: u16, cells: usize },

    /// A program referenced a dictionary entry that was never interned.
    #[error("dictionary slot {slot} out of range")]
    DictOutOfRange { slot: u16 },
}

/// Result alias used across the workspace.
pub type Result<T> = std::result::Result<T, SiftError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_are_stable() {
        let e = SiftError::SymbolOutOfRange { symbol: 17, max: 9 };
        assert_eq!(e.to_string(), "symbol 17 not in symbol table (max 9)");

        let e = SiftError::TypeMismatch {
            wanted: "struct",
            found: "list",
        };
        assert_eq!(e.to_string(), "type mismatch: wanted struct, found list");
    }
}
