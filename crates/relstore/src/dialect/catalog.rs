//! Ordered registry of dialects, matched against a live connection.
//!
//! The [`DialectCatalog`] is explicitly constructed and handed to the storage
//! layer rather than living in a global, so tests can register their own
//! entries and the scan order is always visible.

use std::sync::Arc;

use tracing::{debug, info};

use super::{builtins, Dialect};
use crate::driver::DatabaseProduct;

/// One catalog entry: a product name, an optional version, and its dialect.
#[derive(Debug, Clone)]
pub struct DialectEntry {
    /// Product name as reported by the driver (compared case-insensitively).
    pub product: String,
    /// Major version that must match exactly, or any version if `None`.
    pub major: Option<u32>,
    /// Minor version that must match exactly, or any minor if `None`.
    pub minor: Option<u32>,
    /// Dialect used when this entry matches.
    pub dialect: Arc<Dialect>,
}

impl DialectEntry {
    /// Entry matching every version of a product.
    pub fn any_version(product: impl Into<String>, dialect: Dialect) -> Self {
        Self {
            product: product.into(),
            major: None,
            minor: None,
            dialect: Arc::new(dialect),
        }
    }

    /// Entry matching one major (and optionally minor) version of a product.
    pub fn version(
        product: impl Into<String>,
        major: u32,
        minor: Option<u32>,
        dialect: Dialect,
    ) -> Self {
        Self {
            product: product.into(),
            major: Some(major),
            minor,
            dialect: Arc::new(dialect),
        }
    }

    /// Whether a reported product matches this entry.
    pub fn matches(&self, product: &DatabaseProduct) -> bool {
        self.product.eq_ignore_ascii_case(&product.name)
            && self.major.map_or(true, |m| m == product.major)
            && self.minor.map_or(true, |m| m == product.minor)
    }
}

/// Ordered list of dialect entries plus a fallback.
#[derive(Debug, Clone)]
pub struct DialectCatalog {
    entries: Vec<DialectEntry>,
    default: Arc<Dialect>,
}

impl DialectCatalog {
    /// Create an empty catalog with the given fallback dialect.
    pub fn new(default: Dialect) -> Self {
        Self {
            entries: Vec::new(),
            default: Arc::new(default),
        }
    }

    /// Create a catalog with the built-in dialects registered.
    ///
    /// Scan order puts version-specific entries before the generic entry for
    /// the same product. PostgreSQL is the fallback.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new(builtins::postgres());

        catalog.register(DialectEntry::version("MySQL", 5, Some(6), builtins::mysql_5_6()));
        catalog.register(DialectEntry::any_version("MySQL", builtins::mysql()));
        catalog.register(DialectEntry::any_version("MariaDB", builtins::mysql()));
        catalog.register(DialectEntry::any_version("PostgreSQL", builtins::postgres()));
        catalog.register(DialectEntry::any_version(
            crate::driver::sqlite::PRODUCT_NAME,
            builtins::sqlite(),
        ));
        catalog.register(DialectEntry::any_version("H2", builtins::h2()));

        catalog
    }

    /// Append an entry at the end of the scan order.
    pub fn register(&mut self, entry: DialectEntry) {
        self.entries.push(entry);
    }

    /// Insert an entry ahead of every existing one.
    pub fn register_first(&mut self, entry: DialectEntry) {
        self.entries.insert(0, entry);
    }

    /// Entries in scan order.
    pub fn entries(&self) -> &[DialectEntry] {
        &self.entries
    }

    /// The fallback dialect.
    pub fn default_dialect(&self) -> Arc<Dialect> {
        self.default.clone()
    }

    /// Find a dialect by its own name (e.g. "postgres").
    pub fn find(&self, name: &str) -> Option<Arc<Dialect>> {
        if self.default.name().eq_ignore_ascii_case(name) {
            return Some(self.default.clone());
        }
        self.entries
            .iter()
            .find(|e| e.dialect.name().eq_ignore_ascii_case(name))
            .map(|e| e.dialect.clone())
    }

    /// Pick the dialect for a connected product.
    ///
    /// The first matching entry wins; if none matches, the fallback is used.
    pub fn resolve(&self, product: &DatabaseProduct) -> Arc<Dialect> {
        match self.entries.iter().find(|e| e.matches(product)) {
            Some(entry) => {
                info!(
                    "Using {} dialect for {} {}.{}",
                    entry.dialect.name(),
                    product.name,
                    product.major,
                    product.minor
                );
                entry.dialect.clone()
            }
            None => {
                debug!(
                    "No dialect registered for {} {}.{}",
                    product.name, product.major, product.minor
                );
                info!(
                    "Falling back to {} dialect for {}",
                    self.default.name(),
                    product.name
                );
                self.default.clone()
            }
        }
    }
}

impl Default for DialectCatalog {
    fn default() -> Self {
        Self::with_builtins()
    }
}
