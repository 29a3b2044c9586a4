//! Test helper that assembles minimal ELF-32 object images in memory.
//!
//! The layout is fixed: null section, then the caller's sections in order,
//! then `.symtab` and `.strtab`. Symbol 0 is the null symbol; caller
//! symbols start at index 1.

use object::elf;

use crate::elf::{EI_CLASS, EI_DATA, EI_VERSION};

pub struct SectionSpec {
    pub sh_type: u32,
    pub flags: u32,
    pub align: u32,
    /// `sh_info`; for `SHT_REL` sections the index of the patched section.
    pub info: u32,
    pub data: Vec<u8>,
    /// Size to record for `SHT_NOBITS` sections (which carry no data).
    pub nobits_size: u32,
}

pub struct SymbolSpec {
    pub name: &'static str,
    pub value: u32,
    pub size: u32,
    /// `st_info`; pass an `STT_*` constant (binding bits optional).
    pub info: u8,
    pub shndx: u16,
}

/// Encodes one 8-byte `SHT_REL` entry.
pub fn rel_entry(offset: u32, symbol_num: u32, rel_type: u32) -> [u8; 8] {
    let info = (symbol_num << 8) | (rel_type & 0xFF);
    let mut out = [0u8; 8];
    out[0..4].copy_from_slice(&offset.to_le_bytes());
    out[4..8].copy_from_slice(&info.to_le_bytes());
    out
}

pub fn build_object(machine: u16, sections: &[SectionSpec], symbols: &[SymbolSpec]) -> Vec<u8> {
    let symtab_index = sections.len() as u32 + 1;
    let strtab_index = sections.len() as u32 + 2;
    let shnum = sections.len() + 3;

    // String table: leading NUL, then each symbol name.
    let mut strtab = vec![0u8];
    let mut name_offsets = Vec::with_capacity(symbols.len());
    for sym in symbols {
        name_offsets.push(strtab.len() as u32);
        strtab.extend_from_slice(sym.name.as_bytes());
        strtab.push(0);
    }

    // Symbol table: null symbol, then the caller's symbols.
    let mut symtab = vec![0u8; 16];
    for (sym, &name_off) in symbols.iter().zip(&name_offsets) {
        symtab.extend_from_slice(&name_off.to_le_bytes()); // st_name
        symtab.extend_from_slice(&sym.value.to_le_bytes()); // st_value
        symtab.extend_from_slice(&sym.size.to_le_bytes()); // st_size
        symtab.push(sym.info); // st_info
        symtab.push(0); // st_other
        symtab.extend_from_slice(&sym.shndx.to_le_bytes()); // st_shndx
    }

    // Section bodies follow the ELF header, 4-byte aligned.
    let mut image = vec![0u8; 52];
    let mut offsets = Vec::with_capacity(sections.len());
    for sec in sections {
        while image.len() % 4 != 0 {
            image.push(0);
        }
        offsets.push(image.len() as u32);
        if sec.sh_type != elf::SHT_NOBITS {
            image.extend_from_slice(&sec.data);
        }
    }
    while image.len() % 4 != 0 {
        image.push(0);
    }
    let symtab_off = image.len() as u32;
    image.extend_from_slice(&symtab);
    let strtab_off = image.len() as u32;
    image.extend_from_slice(&strtab);

    while image.len() % 4 != 0 {
        image.push(0);
    }
    let e_shoff = image.len() as u32;

    let mut shdr = |sh_type: u32,
                    flags: u32,
                    offset: u32,
                    size: u32,
                    link: u32,
                    info: u32,
                    align: u32,
                    entsize: u32| {
        image.extend_from_slice(&0u32.to_le_bytes()); // sh_name
        image.extend_from_slice(&sh_type.to_le_bytes());
        image.extend_from_slice(&flags.to_le_bytes());
        image.extend_from_slice(&0u32.to_le_bytes()); // sh_addr
        image.extend_from_slice(&offset.to_le_bytes());
        image.extend_from_slice(&size.to_le_bytes());
        image.extend_from_slice(&link.to_le_bytes());
        image.extend_from_slice(&info.to_le_bytes());
        image.extend_from_slice(&align.to_le_bytes());
        image.extend_from_slice(&entsize.to_le_bytes());
    };

    shdr(elf::SHT_NULL, 0, 0, 0, 0, 0, 0, 0);
    for (sec, &offset) in sections.iter().zip(&offsets) {
        let (size, link) = if sec.sh_type == elf::SHT_NOBITS {
            (sec.nobits_size, 0)
        } else if sec.sh_type == elf::SHT_REL {
            (sec.data.len() as u32, symtab_index)
        } else {
            (sec.data.len() as u32, 0)
        };
        shdr(sec.sh_type, sec.flags, offset, size, link, sec.info, sec.align, 0);
    }
    shdr(
        elf::SHT_SYMTAB,
        0,
        symtab_off,
        symtab.len() as u32,
        strtab_index,
        1,
        4,
        16,
    );
    shdr(elf::SHT_STRTAB, 0, strtab_off, strtab.len() as u32, 0, 0, 1, 0);

    // Patch the ELF header in place.
    image[0..4].copy_from_slice(&elf::ELFMAG);
    image[EI_CLASS] = elf::ELFCLASS32;
    image[EI_DATA] = elf::ELFDATA2LSB;
    image[EI_VERSION] = elf::EV_CURRENT;
    image[16..18].copy_from_slice(&elf::ET_REL.to_le_bytes());
    image[18..20].copy_from_slice(&machine.to_le_bytes());
    image[20..24].copy_from_slice(&1u32.to_le_bytes()); // e_version
    image[32..36].copy_from_slice(&e_shoff.to_le_bytes());
    image[40..42].copy_from_slice(&52u16.to_le_bytes()); // e_ehsize
    image[46..48].copy_from_slice(&40u16.to_le_bytes()); // e_shentsize
    image[48..50].copy_from_slice(&(shnum as u16).to_le_bytes());

    image
}
