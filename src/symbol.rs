//! Symbol table management.
//!
//! This module defines the shared label table that the relocator publishes
//! into and resolves external references against. In the full assembler the
//! same table backs labels defined in source; here it is a collaborator
//! owned by the caller so the relocator stays testable in isolation.

use std::collections::HashMap;

/// A handle to a label in a `SymbolTable`.
///
/// Handles are plain indices and stay valid for the lifetime of the table;
/// labels are never removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LabelHandle(usize);

/// One named address in the table.
#[derive(Debug)]
pub struct Label {
    name: String,
    value: u32,
    defined: bool,
    info: u32,
    update_info: bool,
    data: bool,
}

impl Label {
    fn new(name: String) -> Self {
        Self {
            name,
            value: 0,
            defined: false,
            info: 0,
            update_info: true,
            data: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn set_value(&mut self, value: u32) {
        self.value = value;
    }

    pub fn is_defined(&self) -> bool {
        self.defined
    }

    pub fn set_defined(&mut self, defined: bool) {
        self.defined = defined;
    }

    /// Architecture-specific info bits (e.g. processor mode of the target).
    pub fn info(&self) -> u32 {
        self.info
    }

    pub fn set_info(&mut self, info: u32) {
        self.info = info;
    }

    /// Whether the assembler may still overwrite the info bits when the
    /// label is encountered in source. Imported symbols turn this off.
    pub fn update_info(&self) -> bool {
        self.update_info
    }

    pub fn set_update_info(&mut self, update: bool) {
        self.update_info = update;
    }

    /// Data-vs-function classification.
    pub fn is_data(&self) -> bool {
        self.data
    }

    pub fn set_data(&mut self, data: bool) {
        self.data = data;
    }
}

/// Maps label names to labels, creating them on first lookup.
#[derive(Debug, Default)]
pub struct SymbolTable {
    labels: Vec<Label>,
    by_name: HashMap<String, LabelHandle>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up `name` at global scope, creating an undefined label on first
    /// use. Returns `None` if the name is not a valid label name.
    pub fn get_label(&mut self, name: &str) -> Option<LabelHandle> {
        if let Some(&handle) = self.by_name.get(name) {
            return Some(handle);
        }
        if !is_valid_label_name(name) {
            return None;
        }
        let handle = LabelHandle(self.labels.len());
        self.labels.push(Label::new(name.to_string()));
        self.by_name.insert(name.to_string(), handle);
        Some(handle)
    }

    pub fn label(&self, handle: LabelHandle) -> &Label {
        &self.labels[handle.0]
    }

    pub fn label_mut(&mut self, handle: LabelHandle) -> &mut Label {
        &mut self.labels[handle.0]
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '.' || c == '@' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '@')
}
