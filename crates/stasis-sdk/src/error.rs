use thiserror::Error;

use stasis_types::HostId;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("{host} has no attribute {attr}")]
    MissingAttribute { host: HostId, attr: String },

    #[error("attribute {attr} on {host} is a {type_name}, not a qrl")]
    NotCallable {
        host: HostId,
        attr: String,
        type_name: &'static str,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("host error: {0}")]
    Host(#[from] stasis_host::HostError),

    #[error("graph error: {0}")]
    Graph(#[from] stasis_graph::GraphError),

    #[error("props error: {0}")]
    Props(#[from] stasis_props::PropsError),

    #[error("store error: {0}")]
    Store(#[from] stasis_store::StoreError),

    #[error("qrl error: {0}")]
    Qrl(#[from] stasis_qrl::QrlError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SdkResult<T> = Result<T, SdkError>;
