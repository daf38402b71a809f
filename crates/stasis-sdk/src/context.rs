use std::sync::OnceLock;

use stasis_props::Props;
use stasis_qrl::QrlResolver;
use stasis_store::{Qrl, Value};
use stasis_types::HostId;

use crate::document::Document;
use crate::error::{SdkError, SdkResult};

/// Per-invocation view of one host node.
///
/// The node's Props are fetched on first use and reused afterwards, so a
/// handler that never touches its node's state never hydrates it.
#[derive(Debug)]
pub struct InvokeContext {
    host: HostId,
    props: OnceLock<Props>,
}

impl InvokeContext {
    pub fn new(host: HostId) -> Self {
        Self {
            host,
            props: OnceLock::new(),
        }
    }

    pub fn host(&self) -> HostId {
        self.host
    }

    /// The node's Props, fetched from `document` on first call.
    pub fn props(&self, document: &mut Document) -> SdkResult<Props> {
        if let Some(props) = self.props.get() {
            return Ok(props.clone());
        }
        let props = document.get_props(self.host)?;
        Ok(self.props.get_or_init(|| props).clone())
    }

    /// Resolve `qrl` and call it with `args`.
    pub async fn invoke(&self, resolver: &QrlResolver, qrl: &Qrl, args: &[Value]) -> SdkResult<Value> {
        Ok(resolver.invoke(qrl, args).await?)
    }

    /// Read attribute `attr` of the node and invoke it as a QRL.
    pub async fn invoke_attr(
        &self,
        document: &mut Document,
        resolver: &QrlResolver,
        attr: &str,
        args: &[Value],
    ) -> SdkResult<Value> {
        let value = self
            .props(document)?
            .read(attr)?
            .ok_or_else(|| SdkError::MissingAttribute {
                host: self.host,
                attr: attr.to_string(),
            })?;
        let qrl: Qrl = match value {
            Value::Qrl(qrl) => qrl,
            other => {
                return Err(SdkError::NotCallable {
                    host: self.host,
                    attr: attr.to_string(),
                    type_name: other.type_name(),
                })
            }
        };
        self.invoke(resolver, &qrl, args).await
    }
}
