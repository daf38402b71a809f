//! Lazy symbol references.
//!
//! A [`Qrl`] names an exported symbol inside a code chunk and carries the
//! values that symbol closes over. It does not know how to load code; the
//! loader is supplied by the caller of [`Qrl::resolve_with`], and the result
//! is memoized on the QRL itself.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::error::InvokeError;
use crate::value::Value;

type SymbolFn = dyn Fn(&[Value], &[Value]) -> Result<Value, InvokeError> + Send + Sync;

/// A resolved, callable symbol.
///
/// The callable receives the QRL's captured values first and the call
/// arguments second.
#[derive(Clone)]
pub struct Symbol {
    func: Arc<SymbolFn>,
}

impl Symbol {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&[Value], &[Value]) -> Result<Value, InvokeError> + Send + Sync + 'static,
    {
        Self {
            func: Arc::new(func),
        }
    }

    pub fn call(&self, captures: &[Value], args: &[Value]) -> Result<Value, InvokeError> {
        (self.func)(captures, args)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({:p})", Arc::as_ptr(&self.func))
    }
}

/// Lazy reference to `symbol` exported by `chunk`, plus captured values.
#[derive(Clone)]
pub struct Qrl {
    inner: Arc<QrlInner>,
}

struct QrlInner {
    chunk: String,
    symbol: String,
    captures: Vec<Value>,
    resolved: OnceCell<Symbol>,
}

impl Qrl {
    pub fn new(chunk: impl Into<String>, symbol: impl Into<String>, captures: Vec<Value>) -> Self {
        Self {
            inner: Arc::new(QrlInner {
                chunk: chunk.into(),
                symbol: symbol.into(),
                captures,
                resolved: OnceCell::new(),
            }),
        }
    }

    /// A QRL whose symbol is already known; resolving it never loads.
    pub fn resolved(
        chunk: impl Into<String>,
        symbol_name: impl Into<String>,
        captures: Vec<Value>,
        symbol: Symbol,
    ) -> Self {
        Self {
            inner: Arc::new(QrlInner {
                chunk: chunk.into(),
                symbol: symbol_name.into(),
                captures,
                resolved: OnceCell::new_with(Some(symbol)),
            }),
        }
    }

    pub fn chunk(&self) -> &str {
        &self.inner.chunk
    }

    pub fn symbol(&self) -> &str {
        &self.inner.symbol
    }

    pub fn captures(&self) -> &[Value] {
        &self.inner.captures
    }

    /// The memoized symbol, if a resolution has completed.
    pub fn cached(&self) -> Option<Symbol> {
        self.inner.resolved.get().cloned()
    }

    pub fn is_resolved(&self) -> bool {
        self.inner.resolved.initialized()
    }

    /// Resolve through `load`, memoizing the result.
    ///
    /// Single-flight: while one resolution is in progress, other callers wait
    /// for it instead of calling their own loader. If `load` fails, or the
    /// resolving future is dropped before it finishes, the memo stays empty and
    /// the next call runs its loader.
    pub async fn resolve_with<F, Fut, E>(&self, load: F) -> Result<Symbol, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Symbol, E>>,
    {
        self.inner.resolved.get_or_try_init(load).await.cloned()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for Qrl {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Qrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Qrl")
            .field("chunk", &self.inner.chunk)
            .field("symbol", &self.inner.symbol)
            .field("captures", &self.inner.captures.len())
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

impl fmt::Display for Qrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.inner.chunk, self.inner.symbol)
    }
}
