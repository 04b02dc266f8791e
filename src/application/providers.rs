//! Provider registry: an explicit name-to-constructor table built at startup
//! from a static list. No self-registration, no global mutable state, and no
//! import-order dependence.

use std::collections::HashMap;
use std::sync::Arc;

use super::speak::GenerationGateway;

/// Shared resources handed to provider constructors. The HTTP client is
/// constructed once at process start and owned here rather than living in a
/// process-wide singleton; dropping the context at shutdown releases it.
#[derive(Clone)]
pub struct ProviderContext {
    pub http: reqwest::Client,
}

impl ProviderContext {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

pub type ProviderConstructor = fn(&ProviderContext) -> Arc<dyn GenerationGateway>;

/// One registrable provider.
#[derive(Clone, Copy)]
pub struct ProviderEntry {
    pub name: &'static str,
    pub description: &'static str,
    pub build: ProviderConstructor,
}

/// Immutable lookup table from provider name to constructor.
pub struct ProviderRegistry {
    entries: HashMap<&'static str, ProviderEntry>,
}

impl ProviderRegistry {
    /// Build the table from a static entry list. Duplicate names are a
    /// programming error and panic at startup rather than shadowing silently.
    pub fn from_entries(entries: &[ProviderEntry]) -> Self {
        let mut table = HashMap::with_capacity(entries.len());
        for entry in entries {
            if table.insert(entry.name, *entry).is_some() {
                panic!("provider `{}` registered twice", entry.name);
            }
        }
        Self { entries: table }
    }

    /// Construct the named provider, or `None` when no such provider is
    /// registered.
    pub fn build(
        &self,
        name: &str,
        context: &ProviderContext,
    ) -> Option<Arc<dyn GenerationGateway>> {
        self.entries.get(name).map(|entry| (entry.build)(context))
    }

    pub fn describe(&self, name: &str) -> Option<&'static str> {
        self.entries.get(name).map(|entry| entry.description)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
