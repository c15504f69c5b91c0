// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Label and equate storage.
//!
//! Labels are redefined on every layout pass as the address cursor reaches
//! them; a forward reference therefore resolves against the previous pass's
//! value until the fixpoint stabilizes. Equates are set once and never move.

use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct SymbolTable {
    values: HashMap<String, i64>,
    labels: HashMap<String, u32>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define or move a label. Returns the defining line of a conflicting
    /// equate, if the name is already taken by one.
    pub fn define_label(&mut self, name: &str, address: u64, line: u32) -> Result<(), ()> {
        if self.values.contains_key(name) && !self.labels.contains_key(name) {
            return Err(());
        }
        self.values.insert(name.to_string(), address as i64);
        self.labels.insert(name.to_string(), line);
        Ok(())
    }

    /// Set an equate. Fails if the name is already a label.
    pub fn set(&mut self, name: &str, value: i64) -> Result<(), ()> {
        if self.labels.contains_key(name) {
            return Err(());
        }
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        self.values.get(name).copied()
    }

    pub fn is_label(&self, name: &str) -> bool {
        self.labels.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// All symbols sorted by value, for listing/map output.
    pub fn sorted(&self) -> Vec<(&str, i64)> {
        let mut entries: Vec<(&str, i64)> = self
            .values
            .iter()
            .map(|(name, value)| (name.as_str(), *value))
            .collect();
        entries.sort_by_key(|(name, value)| (*value, name.to_string()));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_can_move_between_passes() {
        let mut table = SymbolTable::new();
        table.define_label("loop", 0x8000_0010, 3).unwrap();
        assert_eq!(table.get("loop"), Some(0x8000_0010));
        table.define_label("loop", 0x8000_000c, 3).unwrap();
        assert_eq!(table.get("loop"), Some(0x8000_000c));
    }

    #[test]
    fn equate_and_label_names_conflict() {
        let mut table = SymbolTable::new();
        table.set("size", 16).unwrap();
        assert!(table.define_label("size", 0, 1).is_err());
        table.define_label("start", 0x1000, 1).unwrap();
        assert!(table.set("start", 5).is_err());
    }

    #[test]
    fn sorted_orders_by_value_then_name() {
        let mut table = SymbolTable::new();
        table.set("b", 2).unwrap();
        table.set("a", 2).unwrap();
        table.set("c", 1).unwrap();
        let names: Vec<&str> = table.sorted().iter().map(|(n, _)| *n).collect();
        assert_eq!(names, ["c", "a", "b"]);
    }
}
