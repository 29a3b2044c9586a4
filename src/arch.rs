//! Architecture abstraction.
//!
//! This module defines the `Architecture` trait, which encapsulates all
//! architecture-specific relocation logic. The core relocator stays generic:
//! it hands each backend an opcode word, the word's position in the output
//! image, and the resolved target address, and the backend decides how the
//! opcode's fields change.

use anyhow::Result;

pub mod arm;
pub mod mips;

/// Working state for a single relocation entry.
///
/// The core fills in `opcode`, `opcode_offset` and `relocation_base`;
/// `set_symbol_address` fills in the translated symbol fields; the backend
/// rewrites `opcode` in place.
#[derive(Debug, Default, Clone, Copy)]
pub struct RelocationData {
    /// The 32-bit word being patched.
    pub opcode: u32,
    /// Byte offset of that word in the output image.
    pub opcode_offset: u32,
    /// Final absolute address the relocation refers to.
    pub relocation_base: u32,
    /// The symbol value after architecture normalization.
    pub symbol_address: u32,
    /// `STT_*` type of the target after normalization.
    pub target_symbol_type: u8,
    /// Architecture-specific target info (e.g. processor mode).
    pub target_symbol_info: u32,
}

/// A target architecture's relocation semantics.
pub trait Architecture {
    /// The `e_machine` value objects for this architecture carry.
    fn machine(&self) -> u16;

    /// Normalizes an ELF symbol value for this architecture and records the
    /// translated type and info in `rd`. Deterministic given its inputs.
    fn set_symbol_address(&self, rd: &mut RelocationData, address: u32, sym_type: u8);

    /// Applies relocation `rel_type` to `rd.opcode`. On failure the error
    /// carries a user-facing message; the caller leaves the opcode
    /// unpatched and continues with the remaining entries.
    fn relocate_opcode(&self, rel_type: u32, rd: &mut RelocationData) -> Result<()>;
}
