use std::any::Any;
use std::fmt;
use std::sync::Arc;

use stasis_types::Scalar;

use crate::qrl::Qrl;
use crate::store::Store;

/// A live value held by a store field or a Props attribute.
///
/// Equality follows reference semantics for the identity-bearing variants:
/// two `Store` values are equal only if they are the same store, and likewise
/// for `Qrl` and `Native`. Lists compare element-wise under the same rule.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Store(Store),
    Qrl(Qrl),
    List(Vec<Value>),
    /// Host-only data (handles, closures). Never serializable.
    Native(NativeValue),
}

impl Value {
    /// Short type label used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::Text(_) => "text",
            Self::Store(_) => "store",
            Self::Qrl(_) => "qrl",
            Self::List(_) => "list",
            Self::Native(n) => n.type_name(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_store(&self) -> Option<&Store> {
        match self {
            Self::Store(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_qrl(&self) -> Option<&Qrl> {
        match self {
            Self::Qrl(q) => Some(q),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// The scalar form of this value, if it is a primitive.
    pub fn to_scalar(&self) -> Option<Scalar> {
        match self {
            Self::Null => Some(Scalar::Null),
            Self::Bool(b) => Some(Scalar::Bool(*b)),
            Self::Number(n) => Some(Scalar::Number(*n)),
            Self::Text(s) => Some(Scalar::Text(s.clone())),
            _ => None,
        }
    }

    /// Flatten nested lists into a single sequence of non-list values.
    ///
    /// A non-list value flattens to a one-element vector.
    pub fn flatten(&self) -> Vec<Value> {
        let mut out = Vec::new();
        flatten_into(self, &mut out);
        out
    }
}

fn flatten_into(value: &Value, out: &mut Vec<Value>) {
    match value {
        Value::List(items) => {
            for item in items {
                flatten_into(item, out);
            }
        }
        other => out.push(other.clone()),
    }
}

/// Element-wise comparison of two sequences using identity for stores and QRLs.
pub fn identical(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x == y)
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Store(a), Self::Store(b)) => a.ptr_eq(b),
            (Self::Qrl(a), Self::Qrl(b)) => a.ptr_eq(b),
            (Self::List(a), Self::List(b)) => identical(a, b),
            (Self::Native(a), Self::Native(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "Null"),
            Self::Bool(b) => write!(f, "Bool({b})"),
            Self::Number(n) => write!(f, "Number({n})"),
            Self::Text(s) => write!(f, "Text({s:?})"),
            Self::Store(s) => write!(f, "{s:?}"),
            Self::Qrl(q) => write!(f, "{q:?}"),
            Self::List(items) => f.debug_list().entries(items).finish(),
            Self::Native(n) => write!(f, "{n:?}"),
        }
    }
}

impl From<Scalar> for Value {
    fn from(s: Scalar) -> Self {
        match s {
            Scalar::Null => Self::Null,
            Scalar::Bool(b) => Self::Bool(b),
            Scalar::Number(n) => Self::Number(n),
            Scalar::Text(t) => Self::Text(t),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Store> for Value {
    fn from(s: Store) -> Self {
        Self::Store(s)
    }
}

impl From<&Store> for Value {
    fn from(s: &Store) -> Self {
        Self::Store(s.clone())
    }
}

impl From<Qrl> for Value {
    fn from(q: Qrl) -> Self {
        Self::Qrl(q)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

impl From<NativeValue> for Value {
    fn from(n: NativeValue) -> Self {
        Self::Native(n)
    }
}

/// Opaque host-side data carried through stores without being serialized.
#[derive(Clone)]
pub struct NativeValue {
    type_name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
}

impl NativeValue {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            value: Arc::new(value),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }
}

impl fmt::Debug for NativeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Native({})", self.type_name)
    }
}
