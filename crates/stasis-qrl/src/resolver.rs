use std::sync::Arc;

use tracing::{debug, warn};

use stasis_store::{Qrl, Symbol, Value};

use crate::error::{QrlError, QrlResult};
use crate::platform::Platform;

/// Resolves and invokes QRLs through a [`Platform`].
#[derive(Clone)]
pub struct QrlResolver {
    platform: Arc<dyn Platform>,
}

impl QrlResolver {
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self { platform }
    }

    /// Resolve `qrl` to its symbol, loading the chunk on first use.
    ///
    /// The result is memoized on `qrl`; see [`Qrl::resolve_with`] for the
    /// single-flight and retry behavior.
    pub async fn resolve(&self, qrl: &Qrl) -> QrlResult<Symbol> {
        if let Some(symbol) = qrl.cached() {
            return Ok(symbol);
        }
        qrl.resolve_with(|| self.load_symbol(qrl)).await
    }

    /// Resolve `qrl`, then call it with its captured values and `args`.
    pub async fn invoke(&self, qrl: &Qrl, args: &[Value]) -> QrlResult<Value> {
        let symbol = self.resolve(qrl).await?;
        symbol
            .call(qrl.captures(), args)
            .map_err(|source| QrlError::Invocation {
                qrl: qrl.to_string(),
                source,
            })
    }

    async fn load_symbol(&self, qrl: &Qrl) -> QrlResult<Symbol> {
        debug!(chunk = qrl.chunk(), symbol = qrl.symbol(), "loading chunk for QRL");
        let module = self.platform.load(qrl.chunk()).await.inspect_err(|e| {
            warn!(chunk = qrl.chunk(), error = %e, "QRL chunk load failed");
        })?;
        module
            .get(qrl.symbol())
            .cloned()
            .ok_or_else(|| QrlError::SymbolNotFound {
                chunk: qrl.chunk().to_string(),
                symbol: qrl.symbol().to_string(),
            })
    }
}

impl std::fmt::Debug for QrlResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QrlResolver").finish_non_exhaustive()
    }
}
