use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use stasis_store::Symbol;

use crate::error::QrlResult;

/// A loaded code chunk: its exported symbols by name.
#[derive(Clone, Debug, Default)]
pub struct Module {
    exports: HashMap<String, Symbol>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style export registration.
    pub fn export(mut self, name: impl Into<String>, symbol: Symbol) -> Self {
        self.exports.insert(name.into(), symbol);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.exports.get(name)
    }

    /// Exported names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.exports.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// The platform's code-loading primitive.
///
/// This is the only thing the resolver needs from its environment. A browser
/// platform would fetch and evaluate a script; a server platform might look
/// the chunk up in a compiled-in registry.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Load the chunk at `chunk`. May suspend.
    async fn load(&self, chunk: &str) -> QrlResult<Arc<Module>>;
}
