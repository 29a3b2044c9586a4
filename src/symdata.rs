//! Debug symbol sink.
//!
//! After relocation has converged, the relocator publishes address/name
//! bindings, data spans, and function extents here so the surrounding
//! assembler can write them out for debuggers.

use std::fmt::Write;

/// A span of bytes known to hold data rather than code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataSpan {
    pub address: u32,
    pub size: u32,
}

/// A function extent, closed by `end_function`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionExtent {
    pub start: u32,
    pub end: u32,
}

/// Collects debug symbol records.
#[derive(Debug, Default)]
pub struct SymbolData {
    labels: Vec<(u32, String)>,
    data_spans: Vec<DataSpan>,
    functions: Vec<FunctionExtent>,
    open_function: Option<u32>,
}

impl SymbolData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `name` to `address`.
    pub fn add_label(&mut self, address: u32, name: &str) {
        self.labels.push((address, name.to_string()));
    }

    /// Marks `size` bytes at `address` as data.
    pub fn add_data(&mut self, address: u32, size: u32) {
        self.data_spans.push(DataSpan { address, size });
    }

    pub fn start_function(&mut self, address: u32) {
        // An unclosed extent is dropped; the last start wins.
        self.open_function = Some(address);
    }

    pub fn end_function(&mut self, address: u32) {
        if let Some(start) = self.open_function.take() {
            self.functions.push(FunctionExtent {
                start,
                end: address,
            });
        }
    }

    pub fn labels(&self) -> &[(u32, String)] {
        &self.labels
    }

    pub fn data_spans(&self) -> &[DataSpan] {
        &self.data_spans
    }

    pub fn functions(&self) -> &[FunctionExtent] {
        &self.functions
    }

    /// Renders the label bindings as an address/name listing, one
    /// `XXXXXXXX name` line per label.
    pub fn write_listing(&self) -> String {
        let mut out = String::new();
        for (address, name) in &self.labels {
            let _ = writeln!(out, "{:08X} {}", address, name);
        }
        out
    }
}
