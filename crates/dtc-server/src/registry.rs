//! Global symbol catalog.
//!
//! Maps canonical symbols (`BASE-QUOTE`) to [`SymbolInfo`] in both
//! directions (name and numeric id). Seeded at startup with the default
//! product set; mutated afterwards only by administrative subscribe calls.
//! Read-mostly, so lookups take a read lock.

use std::sync::{Arc, RwLock};

use ahash::AHashMap;
use dtc_core::dtc::SecurityDefinitionResponse;
use dtc_core::error::BridgeError;
use dtc_core::{normalized_symbol, split_canonical};

/// Products registered at startup, ids 1–9.
pub const DEFAULT_SYMBOLS: [&str; 9] = [
    "STRK-USDC",
    "USDC-EUR",
    "SOL-USDC",
    "BTC-USDC",
    "ETH-USDC",
    "LTC-USDC",
    "LINK-USDC",
    "XRP-USDC",
    "ADA-USDC",
];

/// One catalog entry.
#[derive(Debug, Clone)]
pub struct SymbolInfo {
    pub numeric_id: u32,
    /// `BASE-QUOTE` uppercase; the wire and registry form.
    pub canonical: String,
    pub display: String,
    pub base: String,
    pub quote: String,
    pub exchange: String,
    pub active: bool,
    pub price_increment: f64,
    pub size_increment: f64,
}

impl SymbolInfo {
    /// Build an entry from its canonical name, deriving base and quote.
    pub fn from_canonical(
        numeric_id: u32,
        canonical: &str,
        exchange: &str,
    ) -> Result<Self, BridgeError> {
        let canonical = canonical.to_ascii_uppercase();
        let (base, quote) = split_canonical(&canonical)
            .ok_or_else(|| BridgeError::Config(format!("bad canonical symbol '{canonical}'")))?;
        Ok(Self {
            numeric_id,
            display: normalized_symbol(&canonical),
            base: base.to_string(),
            quote: quote.to_string(),
            canonical,
            exchange: exchange.to_string(),
            active: true,
            price_increment: 0.01,
            size_increment: 1e-8,
        })
    }
}

#[derive(Default)]
struct RegistryInner {
    by_canonical: AHashMap<String, Arc<SymbolInfo>>,
    by_id: AHashMap<u32, Arc<SymbolInfo>>,
    next_id: u32,
}

/// Thread-safe symbol catalog.
pub struct SymbolRegistry {
    inner: RwLock<RegistryInner>,
}

impl Default for SymbolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                by_canonical: AHashMap::new(),
                by_id: AHashMap::new(),
                next_id: 1,
            }),
        }
    }

    /// A registry seeded with [`DEFAULT_SYMBOLS`].
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        for symbol in DEFAULT_SYMBOLS {
            registry.allocate(symbol).expect("default symbols are well-formed");
        }
        registry
    }

    /// Add a fully specified entry. Re-registering an identical
    /// `(canonical, id)` pair is a no-op; the same name under a different
    /// id is a conflict.
    pub fn register(&self, info: SymbolInfo) -> Result<(), BridgeError> {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        if let Some(existing) = inner.by_canonical.get(&info.canonical) {
            if existing.numeric_id == info.numeric_id {
                return Ok(());
            }
            return Err(BridgeError::Config(format!(
                "symbol '{}' already registered as id {} (attempted id {})",
                info.canonical, existing.numeric_id, info.numeric_id
            )));
        }
        if inner.by_id.contains_key(&info.numeric_id) {
            return Err(BridgeError::Config(format!(
                "symbol id {} already in use",
                info.numeric_id
            )));
        }
        inner.next_id = inner.next_id.max(info.numeric_id + 1);
        let info = Arc::new(info);
        inner.by_canonical.insert(info.canonical.clone(), info.clone());
        inner.by_id.insert(info.numeric_id, info);
        Ok(())
    }

    /// Get the entry for a canonical symbol, creating it with the next free
    /// id when absent.
    pub fn allocate(&self, canonical: &str) -> Result<Arc<SymbolInfo>, BridgeError> {
        let canonical = canonical.to_ascii_uppercase();
        {
            let inner = self.inner.read().expect("registry lock poisoned");
            if let Some(info) = inner.by_canonical.get(&canonical) {
                return Ok(info.clone());
            }
        }
        let mut inner = self.inner.write().expect("registry lock poisoned");
        // Re-check: another writer may have raced us between the locks.
        if let Some(info) = inner.by_canonical.get(&canonical) {
            return Ok(info.clone());
        }
        let id = inner.next_id;
        let info = Arc::new(SymbolInfo::from_canonical(id, &canonical, "coinbase")?);
        inner.next_id += 1;
        inner.by_canonical.insert(canonical, info.clone());
        inner.by_id.insert(id, info.clone());
        Ok(info)
    }

    pub fn by_canonical(&self, canonical: &str) -> Option<Arc<SymbolInfo>> {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .by_canonical
            .get(&canonical.to_ascii_uppercase())
            .cloned()
    }

    pub fn by_id(&self, id: u32) -> Option<Arc<SymbolInfo>> {
        self.inner.read().expect("registry lock poisoned").by_id.get(&id).cloned()
    }

    pub fn contains(&self, canonical: &str) -> bool {
        self.by_canonical(canonical).is_some()
    }

    /// Every entry, ordered by numeric id.
    pub fn all(&self) -> Vec<Arc<SymbolInfo>> {
        let inner = self.inner.read().expect("registry lock poisoned");
        let mut symbols: Vec<Arc<SymbolInfo>> = inner.by_id.values().cloned().collect();
        symbols.sort_by_key(|s| s.numeric_id);
        symbols
    }

    /// Case-insensitive substring search over canonical names.
    pub fn search(&self, text: &str) -> Vec<Arc<SymbolInfo>> {
        let needle = text.to_ascii_uppercase();
        self.all()
            .into_iter()
            .filter(|s| needle.is_empty() || s.canonical.contains(&needle))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("registry lock poisoned").by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wire-ready security definition for a catalog entry.
    pub fn security_definition(
        &self,
        request_id: u32,
        canonical: &str,
    ) -> Option<SecurityDefinitionResponse> {
        let info = self.by_canonical(canonical)?;
        Some(SecurityDefinitionResponse {
            request_id,
            symbol: info.canonical.clone(),
            exchange: info.exchange.clone(),
            security_type: 3, // forex-style pair; closest DTC category
            description: info.display.clone(),
            min_price_increment: info.price_increment as f32,
            currency: info.quote.clone(),
            exchange_symbol: info.canonical.clone(),
            ..Default::default()
        })
    }
}
