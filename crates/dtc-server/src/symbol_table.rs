//! Per-session symbol-id aliasing.
//!
//! Each session maps canonical symbols to its own `u16` ids, allocated from
//! 1 on first subscribe. Ids are stable for the session's lifetime and are
//! never reused after unsubscribe, so a late update cannot alias onto a
//! different symbol.

use ahash::AHashMap;
use dtc_core::error::BridgeError;

/// Session-local `symbol_text ↔ u16` mapping.
#[derive(Debug, Default)]
pub struct SymbolTable {
    by_symbol: AHashMap<String, u16>,
    by_id: AHashMap<u16, String>,
    next_id: u16,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self { by_symbol: AHashMap::new(), by_id: AHashMap::new(), next_id: 1 }
    }

    /// Id for a canonical symbol, allocating on first use.
    pub fn allocate(&mut self, canonical: &str) -> Result<u16, BridgeError> {
        if let Some(&id) = self.by_symbol.get(canonical) {
            return Ok(id);
        }
        if self.next_id == u16::MAX {
            return Err(BridgeError::Internal("session symbol ids exhausted".into()));
        }
        let id = self.next_id;
        self.next_id += 1;
        self.by_symbol.insert(canonical.to_string(), id);
        self.by_id.insert(id, canonical.to_string());
        Ok(id)
    }

    /// Id previously allocated for a symbol, if any.
    pub fn id_for(&self, canonical: &str) -> Option<u16> {
        self.by_symbol.get(canonical).copied()
    }

    /// Symbol behind a session-local id.
    pub fn symbol_for(&self, id: u16) -> Option<&str> {
        self.by_id.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_symbol.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_symbol.is_empty()
    }
}
