//! ELF object relocator.
//!
//! 1. Load an archive (or bare object), parse each member
//! 2. Export OBJECT/FUNC symbols into the shared symbol table
//! 3. Place sections at a base address, patch opcodes, resolve symbols
//! 4. Publish debug symbol records
//!
//! `relocate` is designed to be called repeatedly by an outer fixed-point
//! loop: label addresses feed back into relocations, so the caller passes
//! the same base address again until `data_changed` reports a stable image.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use object::elf;
use tracing::{debug, info};

use crate::arch::{Architecture, RelocationData};
use crate::archive::load_archive;
use crate::buffer::ByteBuffer;
use crate::diag::{Diagnostics, Level};
use crate::elf::ElfFile;
use crate::symbol::{LabelHandle, SymbolTable};
use crate::symdata::SymbolData;
use crate::utils::{align_up, fold_ascii_lower};

/// A section that occupies space in the output image, together with the
/// index of the `SHT_REL` section that patches it, if any.
pub struct LoadableSection {
    pub index: usize,
    pub rel_index: Option<usize>,
}

/// An OBJECT or FUNC symbol retained for export.
pub struct ExportedSymbol {
    /// Lowercased name.
    pub name: String,
    /// `st_value` after architecture normalization.
    pub relative_address: u32,
    /// `st_shndx`: a real section index, `SHN_ABS` or `SHN_COMMON`.
    pub section: u16,
    pub size: u32,
    pub sym_type: u8,
    pub relocated_address: u32,
    pub label: Option<LabelHandle>,
}

/// One loaded object file.
pub struct ObjectFile {
    pub elf: ElfFile,
    pub sections: Vec<LoadableSection>,
    pub symbols: Vec<ExportedSymbol>,
    pub name: String,
}

/// Loads relocatable objects and links them into a flat byte image.
pub struct Relocator<A: Architecture> {
    arch: A,
    files: Vec<ObjectFile>,
    output: ByteBuffer,
    data_changed: bool,
}

impl<A: Architecture> Relocator<A> {
    pub fn new(arch: A) -> Self {
        Self {
            arch,
            files: Vec::new(),
            output: ByteBuffer::new(),
            data_changed: false,
        }
    }

    /// The relocated image of the last `relocate` pass.
    pub fn output_data(&self) -> &ByteBuffer {
        &self.output
    }

    /// Whether the last pass produced a different image or moved a symbol.
    pub fn data_changed(&self) -> bool {
        self.data_changed
    }

    pub fn files(&self) -> &[ObjectFile] {
        &self.files
    }

    /// Loads and validates every object in the archive at `path`.
    pub fn init(&mut self, path: &Path) -> Result<()> {
        let entries = load_archive(path)?;
        if entries.is_empty() {
            bail!("Could not load library");
        }

        for entry in entries {
            let elf = ElfFile::parse(entry.data)
                .with_context(|| format!("Could not load object file {}", entry.name))?;

            if elf.file_type() != elf::ET_REL {
                bail!(
                    "Unexpected ELF type {} in object file {}",
                    elf.file_type(),
                    entry.name
                );
            }
            if elf.segment_count() != 0 {
                bail!(
                    "Unexpected segment count {} in object file {}",
                    elf.segment_count(),
                    entry.name
                );
            }
            if elf.machine() != self.arch.machine() {
                bail!(
                    "Unexpected machine {} in object file {}",
                    elf.machine(),
                    entry.name
                );
            }

            // Collect the sections that occupy memory, each with its
            // relocation sibling (the SHT_REL section whose info field
            // names this section's index).
            let mut sections = Vec::new();
            for s in 0..elf.section_count() {
                let sec = elf.section(s);
                if sec.flags & elf::SHF_ALLOC == 0 {
                    continue;
                }
                if sec.sh_type == elf::SHT_PROGBITS || sec.sh_type == elf::SHT_NOBITS {
                    let rel_index = (0..elf.section_count()).find(|&k| {
                        let rel = elf.section(k);
                        rel.sh_type == elf::SHT_REL && rel.info as usize == s
                    });
                    sections.push(LoadableSection { index: s, rel_index });
                }
            }

            // Only data and function symbols are worth exporting.
            let mut symbols = Vec::new();
            for i in 0..elf.symbol_count() {
                let sym = elf.symbol(i)?;
                let sym_type = sym.sym_type();
                if sym_type == elf::STT_OBJECT || sym_type == elf::STT_FUNC {
                    symbols.push(ExportedSymbol {
                        name: fold_ascii_lower(elf.str_table_string(sym.name)),
                        relative_address: sym.value,
                        section: sym.shndx,
                        size: sym.size,
                        sym_type,
                        relocated_address: 0,
                        label: None,
                    });
                }
            }

            debug!(
                "loaded {}: {} loadable sections, {} exportable symbols",
                entry.name,
                sections.len(),
                symbols.len()
            );
            self.files.push(ObjectFile {
                elf,
                sections,
                symbols,
                name: entry.name,
            });
        }

        info!("loaded {} object(s)", self.files.len());
        Ok(())
    }

    /// Publishes every retained symbol into the shared symbol table.
    ///
    /// Labels are seeded with value 0; a later `relocate` pass writes the
    /// real addresses. Returns false if any symbol could not be exported;
    /// the remaining symbols are still processed.
    pub fn export_symbols(&mut self, table: &mut SymbolTable, diag: &mut Diagnostics) -> bool {
        let mut ok = true;

        for file in &mut self.files {
            for sym in &mut file.symbols {
                if sym.label.is_some() {
                    continue;
                }

                let Some(handle) = table.get_label(&sym.name) else {
                    diag.print(Level::Error, format!("Invalid label name \"{}\"", sym.name));
                    ok = false;
                    continue;
                };
                if table.label(handle).is_defined() {
                    diag.print(
                        Level::Error,
                        format!("Label \"{}\" already defined", sym.name),
                    );
                    ok = false;
                    continue;
                }

                let mut rd = RelocationData::default();
                self.arch
                    .set_symbol_address(&mut rd, sym.relative_address, sym.sym_type);
                sym.relative_address = rd.symbol_address;
                sym.label = Some(handle);

                let label = table.label_mut(handle);
                label.set_info(rd.target_symbol_info);
                label.set_update_info(false);
                label.set_value(0);
                label.set_defined(true);
            }
        }

        ok
    }

    /// Runs one relocation pass over all loaded objects.
    ///
    /// On return `memory_address` holds the total size consumed rather than
    /// the end address. Errors are queued on `diag`; the pass always runs
    /// to completion so every problem is reported at once.
    pub fn relocate(
        &mut self,
        table: &mut SymbolTable,
        memory_address: &mut u32,
        diag: &mut Diagnostics,
    ) -> bool {
        let old_crc = crc32fast::hash(self.output.as_slice());
        self.output.clear();
        self.data_changed = false;

        let start = *memory_address;
        let mut ok = true;
        for index in 0..self.files.len() {
            if !self.relocate_file(index, table, memory_address, diag) {
                ok = false;
            }
        }

        if crc32fast::hash(self.output.as_slice()) != old_crc {
            self.data_changed = true;
        }

        *memory_address -= start;
        ok
    }

    fn relocate_file(
        &mut self,
        file_index: usize,
        table: &mut SymbolTable,
        relocation_address: &mut u32,
        diag: &mut Diagnostics,
    ) -> bool {
        let start = *relocation_address;
        let mut ok = true;

        // Section placement: advance to each section's alignment, in the
        // order the object lists them.
        let mut offsets: HashMap<usize, u32> = HashMap::new();
        for entry in &self.files[file_index].sections {
            let sec = self.files[file_index].elf.section(entry.index);
            *relocation_address = align_up(*relocation_address, sec.addralign);
            offsets.insert(entry.index, *relocation_address);
            *relocation_address += sec.size;
        }

        let data_start = self.output.len();
        self.output
            .reserve_bytes((*relocation_address - start) as usize);

        // Copy and patch each section.
        for entry_index in 0..self.files[file_index].sections.len() {
            let file = &self.files[file_index];
            let entry = &file.sections[entry_index];
            let sec = file.elf.section(entry.index);
            if sec.sh_type == elf::SHT_NOBITS {
                // reserve_bytes already zeroed the space.
                continue;
            }

            let mut section_data = match file.elf.section_data(sec) {
                Ok(data) => ByteBuffer::from_vec(data.to_vec()),
                Err(e) => {
                    diag.queue(Level::Error, format!("{}: {}", file.name, e));
                    ok = false;
                    continue;
                }
            };

            if let Some(rel_index) = entry.rel_index {
                let rels = match file.elf.rel_entries(file.elf.section(rel_index)) {
                    Ok(rels) => rels,
                    Err(e) => {
                        diag.queue(Level::Error, format!("{}: {}", file.name, e));
                        ok = false;
                        continue;
                    }
                };

                for rel in rels {
                    let pos = rel.offset as usize;

                    let sym_num = rel.symbol_num();
                    if sym_num == 0 {
                        diag.queue(
                            Level::Warning,
                            format!("Invalid symbol num {:06X}", sym_num),
                        );
                        ok = false;
                        continue;
                    }
                    let sym = match file.elf.symbol(sym_num as usize) {
                        Ok(sym) => sym,
                        Err(e) => {
                            diag.queue(Level::Error, format!("{}: {}", file.name, e));
                            ok = false;
                            continue;
                        }
                    };

                    let opcode = match section_data.read_u32(pos) {
                        Ok(opcode) => opcode,
                        Err(_) => {
                            diag.queue(
                                Level::Error,
                                format!("Invalid relocation offset {:08X}", rel.offset),
                            );
                            ok = false;
                            continue;
                        }
                    };

                    let mut rd = RelocationData {
                        opcode,
                        opcode_offset: offsets[&entry.index] + rel.offset,
                        ..Default::default()
                    };
                    self.arch
                        .set_symbol_address(&mut rd, sym.value, sym.sym_type());

                    if rd.target_symbol_type == elf::STT_NOTYPE && sym.shndx == elf::SHN_UNDEF {
                        // External reference: resolve through the shared
                        // symbol table.
                        let name = fold_ascii_lower(file.elf.str_table_string(sym.name));
                        let Some(handle) = table.get_label(&name) else {
                            diag.queue(
                                Level::Error,
                                format!("Invalid external symbol {}", name),
                            );
                            ok = false;
                            continue;
                        };
                        let label = table.label(handle);
                        if !label.is_defined() {
                            diag.queue(
                                Level::Error,
                                format!("Undefined external symbol {}", name),
                            );
                            ok = false;
                            continue;
                        }
                        rd.relocation_base = label.value();
                        rd.target_symbol_type = if label.is_data() {
                            elf::STT_OBJECT
                        } else {
                            elf::STT_FUNC
                        };
                        rd.target_symbol_info = label.info();
                    } else {
                        rd.relocation_base = offsets
                            .get(&(sym.shndx as usize))
                            .copied()
                            .unwrap_or(0)
                            .wrapping_add(rd.symbol_address);
                    }

                    if let Err(e) = self.arch.relocate_opcode(rel.rel_type(), &mut rd) {
                        diag.queue(Level::Error, e.to_string());
                        ok = false;
                        continue;
                    }

                    if let Err(e) = section_data.write_u32(pos, rd.opcode) {
                        diag.queue(Level::Error, format!("{}: {}", file.name, e));
                        ok = false;
                    }
                }
            }

            let dest = data_start + (offsets[&entry.index] - start) as usize;
            if let Err(e) = self.output.write_slice(dest, section_data.as_slice()) {
                diag.queue(Level::Error, format!("{}: {}", file.name, e));
                ok = false;
            }
        }

        // Resolve symbol addresses and push them into the labels.
        let file = &mut self.files[file_index];
        let mut moved = false;
        for sym in &mut file.symbols {
            let old_address = sym.relocated_address;

            match sym.section {
                // Absolute symbols are not relocated.
                elf::SHN_ABS => sym.relocated_address = sym.relative_address,
                // Common symbols get allocated here; their value carries
                // the alignment requirement.
                elf::SHN_COMMON => {
                    let common_start = *relocation_address;
                    *relocation_address = align_up(*relocation_address, sym.relative_address);
                    sym.relocated_address = *relocation_address;
                    *relocation_address += sym.size;
                    self.output
                        .reserve_bytes((*relocation_address - common_start) as usize);
                }
                section => {
                    sym.relocated_address = sym
                        .relative_address
                        .wrapping_add(offsets.get(&(section as usize)).copied().unwrap_or(0));
                }
            }

            if let Some(handle) = sym.label {
                table.label_mut(handle).set_value(sym.relocated_address);
            }
            if old_address != sym.relocated_address {
                moved = true;
            }
        }
        if moved {
            self.data_changed = true;
        }

        ok
    }

    /// Publishes address/name records, data spans and function extents for
    /// every retained symbol.
    ///
    /// Must run after a converged `relocate`; otherwise the addresses are
    /// the zero placeholders seeded by `export_symbols`.
    pub fn write_symbols(&self, sym_data: &mut SymbolData) {
        for file in &self.files {
            for sym in &file.symbols {
                sym_data.add_label(sym.relocated_address, &sym.name);

                match sym.sym_type {
                    elf::STT_OBJECT => sym_data.add_data(sym.relocated_address, sym.size),
                    elf::STT_FUNC => {
                        sym_data.start_function(sym.relocated_address);
                        sym_data.end_function(sym.relocated_address + sym.size);
                    }
                    _ => {}
                }
            }
        }
    }
}
