//! ELF-32 object file reader.
//!
//! Parses relocatable little-endian ELF objects: file header, section
//! headers, symbol table, string table, and `SHT_REL` relocation sections.
//! The wire structures are unaligned, so everything is decoded field by
//! field through `ByteBuffer`'s little-endian accessors; the `object` crate
//! supplies the ELF constants.
//!
//! Only what the relocator needs is exposed. There is no support for
//! program headers beyond counting them, and `SHT_RELA` sections are left
//! untouched.

use anyhow::{bail, Result};
use object::elf;

use crate::buffer::ByteBuffer;

const EHDR_SIZE: usize = 52;
const SHDR_SIZE: usize = 40;
const SYM_SIZE: usize = 16;

// e_ident byte indices; not exposed by the `object` crate's `elf` module.
pub(crate) const EI_CLASS: usize = 4;
pub(crate) const EI_DATA: usize = 5;
pub(crate) const EI_VERSION: usize = 6;
const REL_SIZE: usize = 8;

/// One section header.
#[derive(Debug, Clone)]
pub struct ElfSection {
    pub sh_type: u32,
    pub flags: u32,
    pub offset: u32,
    pub size: u32,
    pub link: u32,
    pub info: u32,
    pub addralign: u32,
    pub entsize: u32,
}

/// One symbol table entry.
#[derive(Debug, Clone, Copy)]
pub struct ElfSymbol {
    /// Offset of the name in the symbol string table.
    pub name: u32,
    pub value: u32,
    pub size: u32,
    pub info: u8,
    pub shndx: u16,
}

impl ElfSymbol {
    pub fn binding(&self) -> u8 {
        self.info >> 4
    }

    pub fn sym_type(&self) -> u8 {
        self.info & 0xF
    }
}

/// One `SHT_REL` relocation entry.
#[derive(Debug, Clone, Copy)]
pub struct ElfRel {
    pub offset: u32,
    pub info: u32,
}

impl ElfRel {
    pub fn symbol_num(&self) -> u32 {
        self.info >> 8
    }

    pub fn rel_type(&self) -> u32 {
        self.info & 0xFF
    }
}

/// A parsed ELF-32 object. Owns its byte image; sections and symbols are
/// decoded views into it.
pub struct ElfFile {
    data: ByteBuffer,
    e_type: u16,
    e_machine: u16,
    e_phnum: u16,
    sections: Vec<ElfSection>,
    symtab: Option<usize>,
}

impl ElfFile {
    pub fn parse(data: ByteBuffer) -> Result<ElfFile> {
        if data.len() < EHDR_SIZE {
            bail!("too small for an ELF header");
        }
        if data.as_slice()[0..4] != elf::ELFMAG {
            bail!("not an ELF file");
        }
        if data.as_slice()[EI_CLASS] != elf::ELFCLASS32 {
            bail!("not a 32-bit ELF file");
        }
        if data.as_slice()[EI_DATA] != elf::ELFDATA2LSB {
            bail!("not a little-endian ELF file");
        }

        let e_type = data.read_u16(16)?;
        let e_machine = data.read_u16(18)?;
        let e_shoff = data.read_u32(32)? as usize;
        let e_phnum = data.read_u16(44)?;
        let e_shentsize = data.read_u16(46)? as usize;
        let e_shnum = data.read_u16(48)? as usize;

        if e_shnum > 0 && e_shentsize < SHDR_SIZE {
            bail!("section header entry size {} is too small", e_shentsize);
        }

        let mut sections = Vec::with_capacity(e_shnum);
        for i in 0..e_shnum {
            let base = e_shoff + i * e_shentsize;
            if base + SHDR_SIZE > data.len() {
                bail!("section header {} lies outside the file", i);
            }
            let section = ElfSection {
                sh_type: data.read_u32(base + 4)?,
                flags: data.read_u32(base + 8)?,
                offset: data.read_u32(base + 16)?,
                size: data.read_u32(base + 20)?,
                link: data.read_u32(base + 24)?,
                info: data.read_u32(base + 28)?,
                addralign: data.read_u32(base + 32)?,
                entsize: data.read_u32(base + 36)?,
            };

            // NOBITS sections occupy no file space, so their offset may
            // legally point past the end.
            if section.sh_type != elf::SHT_NOBITS
                && section.sh_type != elf::SHT_NULL
                && (section.offset as usize + section.size as usize) > data.len()
            {
                bail!("section {} data lies outside the file", i);
            }
            sections.push(section);
        }

        let symtab = sections
            .iter()
            .position(|s| s.sh_type == elf::SHT_SYMTAB);

        Ok(ElfFile {
            data,
            e_type,
            e_machine,
            e_phnum,
            sections,
            symtab,
        })
    }

    /// The `e_type` field; relocatable objects are `ET_REL`.
    pub fn file_type(&self) -> u16 {
        self.e_type
    }

    pub fn machine(&self) -> u16 {
        self.e_machine
    }

    /// Number of program headers. Relocatable objects must have none.
    pub fn segment_count(&self) -> u16 {
        self.e_phnum
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    pub fn section(&self, index: usize) -> &ElfSection {
        &self.sections[index]
    }

    /// The raw bytes of a section. `SHT_NOBITS` sections yield an empty
    /// slice.
    pub fn section_data(&self, section: &ElfSection) -> Result<&[u8]> {
        if section.sh_type == elf::SHT_NOBITS {
            return Ok(&[]);
        }
        self.data
            .slice(section.offset as usize, section.size as usize)
    }

    /// Decodes the 8-byte entries of a `SHT_REL` section.
    pub fn rel_entries(&self, section: &ElfSection) -> Result<Vec<ElfRel>> {
        let base = section.offset as usize;
        let count = section.size as usize / REL_SIZE;
        let mut entries = Vec::with_capacity(count);
        for i in 0..count {
            let pos = base + i * REL_SIZE;
            entries.push(ElfRel {
                offset: self.data.read_u32(pos)?,
                info: self.data.read_u32(pos + 4)?,
            });
        }
        Ok(entries)
    }

    pub fn symbol_count(&self) -> usize {
        match self.symtab {
            Some(i) => self.sections[i].size as usize / SYM_SIZE,
            None => 0,
        }
    }

    pub fn symbol(&self, index: usize) -> Result<ElfSymbol> {
        let Some(symtab) = self.symtab else {
            bail!("object has no symbol table");
        };
        if index >= self.symbol_count() {
            bail!("symbol index {} out of range", index);
        }
        let base = self.sections[symtab].offset as usize + index * SYM_SIZE;
        Ok(ElfSymbol {
            name: self.data.read_u32(base)?,
            value: self.data.read_u32(base + 4)?,
            size: self.data.read_u32(base + 8)?,
            info: self.data.as_slice()[base + 12],
            shndx: self.data.read_u16(base + 14)?,
        })
    }

    /// The NUL-terminated string at `offset` in the symbol string table,
    /// as raw bytes. Missing string table or out-of-range offsets yield an
    /// empty name.
    pub fn str_table_string(&self, offset: u32) -> &[u8] {
        let Some(symtab) = self.symtab else {
            return &[];
        };
        let strtab_index = self.sections[symtab].link as usize;
        if strtab_index >= self.sections.len() {
            return &[];
        }
        let strtab = &self.sections[strtab_index];
        let Ok(data) = self.section_data(strtab) else {
            return &[];
        };
        let start = offset as usize;
        if start >= data.len() {
            return &[];
        }
        let end = data[start..]
            .iter()
            .position(|&b| b == 0)
            .map(|p| start + p)
            .unwrap_or(data.len());
        &data[start..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testobj::{build_object, rel_entry, SectionSpec, SymbolSpec};

    fn text_section(data: Vec<u8>) -> SectionSpec {
        SectionSpec {
            sh_type: elf::SHT_PROGBITS,
            flags: elf::SHF_ALLOC | elf::SHF_EXECINSTR,
            align: 4,
            info: 0,
            data,
            nobits_size: 0,
        }
    }

    #[test]
    fn parses_minimal_object() {
        let image = build_object(
            elf::EM_MIPS,
            &[text_section(vec![0u8; 8])],
            &[SymbolSpec {
                name: "Main",
                value: 0,
                size: 8,
                info: elf::STT_FUNC,
                shndx: 1,
            }],
        );
        let elf = ElfFile::parse(ByteBuffer::from_vec(image)).unwrap();

        assert_eq!(elf.file_type(), elf::ET_REL);
        assert_eq!(elf.machine(), elf::EM_MIPS);
        assert_eq!(elf.segment_count(), 0);
        // null + .text + .symtab + .strtab
        assert_eq!(elf.section_count(), 4);
        assert_eq!(elf.section(1).sh_type, elf::SHT_PROGBITS);
        assert_eq!(elf.section_data(elf.section(1)).unwrap().len(), 8);

        // Symbol 0 is the null symbol.
        assert_eq!(elf.symbol_count(), 2);
        let sym = elf.symbol(1).unwrap();
        assert_eq!(sym.sym_type(), elf::STT_FUNC);
        assert_eq!(sym.shndx, 1);
        assert_eq!(elf.str_table_string(sym.name), b"Main");
    }

    #[test]
    fn rejects_bad_magic_and_class() {
        let mut image = build_object(elf::EM_MIPS, &[], &[]);
        let mut broken = image.clone();
        broken[0] = 0x7E;
        assert!(ElfFile::parse(ByteBuffer::from_vec(broken)).is_err());

        image[EI_CLASS] = elf::ELFCLASS64;
        assert!(ElfFile::parse(ByteBuffer::from_vec(image)).is_err());
    }

    #[test]
    fn rejects_truncated_section() {
        let mut image = build_object(elf::EM_MIPS, &[text_section(vec![0u8; 8])], &[]);
        // Inflate .text's size field far past the end of the file.
        let e_shoff = u32::from_le_bytes(image[32..36].try_into().unwrap()) as usize;
        let size_field = e_shoff + 40 + 20;
        image[size_field..size_field + 4].copy_from_slice(&0x10000u32.to_le_bytes());
        assert!(ElfFile::parse(ByteBuffer::from_vec(image)).is_err());
    }

    #[test]
    fn decodes_rel_entries() {
        let mut rel_data = Vec::new();
        rel_data.extend_from_slice(&rel_entry(0x10, 2, 4));
        rel_data.extend_from_slice(&rel_entry(0x20, 1, 5));
        let image = build_object(
            elf::EM_MIPS,
            &[
                text_section(vec![0u8; 0x40]),
                SectionSpec {
                    sh_type: elf::SHT_REL,
                    flags: 0,
                    align: 4,
                    info: 1,
                    data: rel_data,
                    nobits_size: 0,
                },
            ],
            &[],
        );
        let elf = ElfFile::parse(ByteBuffer::from_vec(image)).unwrap();
        let rels = elf.rel_entries(elf.section(2)).unwrap();
        assert_eq!(rels.len(), 2);
        assert_eq!(rels[0].offset, 0x10);
        assert_eq!(rels[0].symbol_num(), 2);
        assert_eq!(rels[0].rel_type(), 4);
        assert_eq!(rels[1].symbol_num(), 1);
        assert_eq!(rels[1].rel_type(), 5);
    }

    #[test]
    fn missing_string_is_empty() {
        let image = build_object(elf::EM_MIPS, &[], &[]);
        let elf = ElfFile::parse(ByteBuffer::from_vec(image)).unwrap();
        assert_eq!(elf.str_table_string(0xFFFF), b"");
    }
}
