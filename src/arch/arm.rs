//! ARM architecture backend.
//!
//! Implements the `Architecture` trait for little-endian ARM (ELF32),
//! including Thumb interworking. ELF encodes Thumb function addresses with
//! bit 0 set; the backend strips that bit during symbol translation and
//! records the processor mode in the target info so relocations can
//! reconstruct it.
//!
//! Reference: "ELF for the ARM Architecture" (IHI 0044).

use anyhow::{bail, Result};
use object::elf;

use super::{Architecture, RelocationData};

/// Target info values recorded by `set_symbol_address`.
pub const MODE_ARM: u32 = 0;
pub const MODE_THUMB: u32 = 1;

/// The ARM backend.
pub struct Arm;

impl Architecture for Arm {
    fn machine(&self) -> u16 {
        elf::EM_ARM
    }

    fn set_symbol_address(&self, rd: &mut RelocationData, address: u32, sym_type: u8) {
        if sym_type == elf::STT_FUNC && address & 1 != 0 {
            rd.symbol_address = address & !1;
            rd.target_symbol_info = MODE_THUMB;
        } else {
            rd.symbol_address = address;
            rd.target_symbol_info = MODE_ARM;
        }
        rd.target_symbol_type = sym_type;
    }

    fn relocate_opcode(&self, rel_type: u32, rd: &mut RelocationData) -> Result<()> {
        let thumb_func =
            rd.target_symbol_type == elf::STT_FUNC && rd.target_symbol_info == MODE_THUMB;

        match rel_type {
            elf::R_ARM_ABS32 => {
                // Thumb functions get their mode bit back in data words.
                rd.opcode = if thumb_func {
                    rd.relocation_base | 1
                } else {
                    rd.relocation_base
                };
            }

            elf::R_ARM_PC24 | elf::R_ARM_CALL | elf::R_ARM_JUMP24 => {
                // ARM B/BL: signed 24-bit word offset from PC+8.
                let offset = rd.relocation_base.wrapping_sub(rd.opcode_offset + 8) as i32;
                if !(-0x0200_0000..0x0200_0000).contains(&offset) {
                    bail!(
                        "Branch target {:#010X} out of range at {:#010X}",
                        rd.relocation_base,
                        rd.opcode_offset
                    );
                }
                if thumb_func {
                    if rel_type != elf::R_ARM_CALL {
                        bail!(
                            "Cannot jump from ARM to Thumb target {:#010X} without BLX",
                            rd.relocation_base
                        );
                    }
                    // BL -> BLX; the H bit carries the halfword step.
                    let h = (offset as u32 >> 1) & 1;
                    rd.opcode = 0xFA00_0000 | (h << 24) | ((offset as u32 >> 2) & 0x00FF_FFFF);
                } else {
                    if offset & 3 != 0 {
                        bail!(
                            "Unaligned ARM branch target {:#010X}",
                            rd.relocation_base
                        );
                    }
                    rd.opcode =
                        (rd.opcode & 0xFF00_0000) | ((offset as u32 >> 2) & 0x00FF_FFFF);
                }
            }

            elf::R_ARM_THM_PC22 => {
                // Thumb BL pair, read as one word: low halfword holds the
                // upper instruction. Signed 23-bit byte offset from PC+4.
                if !thumb_func {
                    bail!(
                        "Cannot call ARM target {:#010X} from Thumb code without BLX",
                        rd.relocation_base
                    );
                }
                let offset = rd.relocation_base.wrapping_sub(rd.opcode_offset + 4) as i32;
                if !(-0x0040_0000..0x0040_0000).contains(&offset) {
                    bail!(
                        "Branch target {:#010X} out of range at {:#010X}",
                        rd.relocation_base,
                        rd.opcode_offset
                    );
                }
                if offset & 1 != 0 {
                    bail!(
                        "Unaligned Thumb branch target {:#010X}",
                        rd.relocation_base
                    );
                }
                let upper = rd.opcode & 0xFFFF;
                let lower = (rd.opcode >> 16) & 0xFFFF;
                let new_upper = (upper & 0xF800) | ((offset as u32 >> 12) & 0x7FF);
                let new_lower = (lower & 0xF800) | ((offset as u32 >> 1) & 0x7FF);
                rd.opcode = new_upper | (new_lower << 16);
            }

            elf::R_ARM_MOVW_ABS_NC => {
                let value = if thumb_func {
                    rd.relocation_base | 1
                } else {
                    rd.relocation_base
                };
                rd.opcode = encode_movw_movt(rd.opcode, value & 0xFFFF);
            }

            elf::R_ARM_MOVT_ABS => {
                rd.opcode = encode_movw_movt(rd.opcode, rd.relocation_base >> 16);
            }

            _ => bail!("Unknown ARM relocation type {}", rel_type),
        }

        Ok(())
    }
}

/// ARM MOVW/MOVT immediate fields: imm4 in bits [19:16], imm12 in [11:0].
fn encode_movw_movt(insn: u32, value: u32) -> u32 {
    let imm12 = value & 0xFFF;
    let imm4 = (value >> 12) & 0xF;
    (insn & 0xFFF0_F000) | (imm4 << 16) | imm12
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translated(address: u32, sym_type: u8) -> RelocationData {
        let mut rd = RelocationData::default();
        Arm.set_symbol_address(&mut rd, address, sym_type);
        rd
    }

    #[test]
    fn thumb_bit_stripped_for_functions() {
        let rd = translated(0x0800_0101, elf::STT_FUNC);
        assert_eq!(rd.symbol_address, 0x0800_0100);
        assert_eq!(rd.target_symbol_info, MODE_THUMB);

        // Data symbols keep odd addresses.
        let rd = translated(0x0800_0101, elf::STT_OBJECT);
        assert_eq!(rd.symbol_address, 0x0800_0101);
        assert_eq!(rd.target_symbol_info, MODE_ARM);
    }

    #[test]
    fn abs32_restores_thumb_bit() {
        let mut rd = translated(0x0800_0101, elf::STT_FUNC);
        rd.relocation_base = 0x0800_0100;
        Arm.relocate_opcode(elf::R_ARM_ABS32, &mut rd).unwrap();
        assert_eq!(rd.opcode, 0x0800_0101);

        let mut rd = translated(0x0800_0230, elf::STT_OBJECT);
        rd.relocation_base = 0x0800_0230;
        Arm.relocate_opcode(elf::R_ARM_ABS32, &mut rd).unwrap();
        assert_eq!(rd.opcode, 0x0800_0230);
    }

    #[test]
    fn arm_branch_offsets() {
        // BL forward: target 8 bytes past PC+8.
        let mut rd = translated(0x8010, elf::STT_FUNC);
        rd.opcode = 0xEB00_0000;
        rd.opcode_offset = 0x8000;
        rd.relocation_base = 0x8010;
        Arm.relocate_opcode(elf::R_ARM_CALL, &mut rd).unwrap();
        assert_eq!(rd.opcode, 0xEB00_0002);

        // B backward.
        let mut rd = translated(0x8000, elf::STT_FUNC);
        rd.opcode = 0xEA00_0000;
        rd.opcode_offset = 0x8010;
        rd.relocation_base = 0x8000;
        Arm.relocate_opcode(elf::R_ARM_JUMP24, &mut rd).unwrap();
        assert_eq!(rd.opcode, 0xEAFF_FFFA);
    }

    #[test]
    fn arm_branch_out_of_range() {
        let mut rd = translated(0x0400_0000, elf::STT_FUNC);
        rd.opcode = 0xEB00_0000;
        rd.opcode_offset = 0;
        rd.relocation_base = 0x0400_0000;
        assert!(Arm.relocate_opcode(elf::R_ARM_CALL, &mut rd).is_err());
    }

    #[test]
    fn call_to_thumb_becomes_blx() {
        let mut rd = translated(0x8013, elf::STT_FUNC);
        rd.opcode = 0xEB00_0000;
        rd.opcode_offset = 0x8000;
        rd.relocation_base = rd.symbol_address; // 0x8012
        Arm.relocate_opcode(elf::R_ARM_CALL, &mut rd).unwrap();
        // offset = 0x8012 - 0x8008 = 0xA -> imm24 = 2, H = 1
        assert_eq!(rd.opcode, 0xFB00_0002);

        // A plain jump cannot interwork.
        let mut rd = translated(0x8013, elf::STT_FUNC);
        rd.opcode = 0xEA00_0000;
        rd.opcode_offset = 0x8000;
        rd.relocation_base = rd.symbol_address;
        assert!(Arm.relocate_opcode(elf::R_ARM_JUMP24, &mut rd).is_err());
    }

    #[test]
    fn thumb_call_encoding() {
        let mut rd = translated(0x201, elf::STT_FUNC);
        rd.opcode = 0xF800_F000; // BL placeholder halfword pair
        rd.opcode_offset = 0x100;
        rd.relocation_base = rd.symbol_address; // 0x200
        Arm.relocate_opcode(elf::R_ARM_THM_PC22, &mut rd).unwrap();
        // offset = 0x200 - 0x104 = 0xFC
        assert_eq!(rd.opcode & 0xFFFF, 0xF000);
        assert_eq!(rd.opcode >> 16, 0xF800 | (0xFC >> 1));
    }

    #[test]
    fn thumb_call_to_arm_fails() {
        let mut rd = translated(0x200, elf::STT_FUNC);
        rd.opcode = 0xF800_F000;
        rd.opcode_offset = 0x100;
        rd.relocation_base = 0x200;
        assert!(Arm.relocate_opcode(elf::R_ARM_THM_PC22, &mut rd).is_err());
    }

    #[test]
    fn movw_movt_split_immediate() {
        let mut rd = translated(0x1234_5678, elf::STT_OBJECT);
        rd.relocation_base = 0x1234_5678;

        rd.opcode = 0xE300_0000; // MOVW r0, #0
        Arm.relocate_opcode(elf::R_ARM_MOVW_ABS_NC, &mut rd).unwrap();
        assert_eq!(rd.opcode, 0xE305_0678);

        rd.opcode = 0xE340_0000; // MOVT r0, #0
        Arm.relocate_opcode(elf::R_ARM_MOVT_ABS, &mut rd).unwrap();
        assert_eq!(rd.opcode, 0xE341_0234);
    }

    #[test]
    fn unknown_type_is_an_error() {
        let mut rd = RelocationData::default();
        let err = Arm.relocate_opcode(0x7F, &mut rd).unwrap_err();
        assert!(err.to_string().contains("Unknown ARM relocation type"));
    }
}
