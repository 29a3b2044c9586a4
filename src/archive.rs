//! Unix `ar` archive reader.
//!
//! Object libraries arrive either as a System V `ar` archive of ELF objects
//! or as a single bare ELF file; both shapes are flattened into a list of
//! named entries. Non-ELF members (the archive symbol index `/`, the
//! extended-name table `//`) are skipped, which falls out naturally from
//! checking each body for the ELF magic.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use memmap2::Mmap;
use object::elf;
use tracing::debug;

use crate::buffer::ByteBuffer;
use crate::utils::file_name_from_path;

pub const AR_MAGIC: &[u8; 8] = b"!<arch>\n";

/// Fixed 60-byte member header layout:
/// `name[16] mtime[12] uid[6] gid[6] mode[8] size[10] magic[2]`.
const AR_HEADER_SIZE: usize = 60;
const AR_NAME_LEN: usize = 16;
const AR_SIZE_OFF: usize = 48;
const AR_SIZE_LEN: usize = 10;

/// One archive member.
pub struct ArEntry {
    pub name: String,
    pub data: ByteBuffer,
}

/// Maps `path` into memory and parses it as an archive.
pub fn load_archive(path: &Path) -> Result<Vec<ArEntry>> {
    let file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mmap = unsafe { Mmap::map(&file) }
        .with_context(|| format!("failed to map {}", path.display()))?;
    Ok(parse_archive(&mmap, path))
}

/// Parses an archive image. A bare ELF file yields a single entry named
/// after the input path's leaf; anything that is neither an archive nor an
/// ELF file yields no entries.
pub fn parse_archive(data: &[u8], path: &Path) -> Vec<ArEntry> {
    let mut result = Vec::new();

    if data.len() < AR_MAGIC.len() || &data[..AR_MAGIC.len()] != AR_MAGIC {
        if data.len() >= 4 && data[..4] == elf::ELFMAG {
            result.push(ArEntry {
                name: file_name_from_path(path),
                data: ByteBuffer::from_vec(data.to_vec()),
            });
        }
        return result;
    }

    let mut pos = AR_MAGIC.len();
    while pos + AR_HEADER_SIZE <= data.len() {
        let header = &data[pos..pos + AR_HEADER_SIZE];
        pos += AR_HEADER_SIZE;

        let size = parse_decimal(&header[AR_SIZE_OFF..AR_SIZE_OFF + AR_SIZE_LEN]);
        if pos + size > data.len() {
            debug!("archive member at {:#x} runs past the end, stopping", pos);
            break;
        }

        let body = &data[pos..pos + size];
        if body.len() >= 4 && body[..4] == elf::ELFMAG {
            result.push(ArEntry {
                name: member_name(&header[..AR_NAME_LEN]),
                data: ByteBuffer::from_vec(body.to_vec()),
            });
        }

        pos += size;
        // Member bodies are padded to even offsets.
        if pos % 2 == 1 {
            pos += 1;
        }
    }

    result
}

/// ASCII decimal, space-padded.
fn parse_decimal(field: &[u8]) -> usize {
    let mut value = 0usize;
    for &b in field {
        if !b.is_ascii_digit() {
            break;
        }
        value = value * 10 + (b - b'0') as usize;
    }
    value
}

/// The name field up to the first space, with the single trailing `/`
/// terminator stripped.
fn member_name(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == b' ').unwrap_or(field.len());
    let mut name = &field[..end];
    if let Some((&b'/', rest)) = name.split_last() {
        name = rest;
    }
    String::from_utf8_lossy(name).into_owned()
}
