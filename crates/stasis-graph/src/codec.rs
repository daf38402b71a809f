//! Versioned JSON envelope for [`SerializedState`].
//!
//! ```json
//! { "version": 1, "digest": "<blake3 hex>", "roots": {...}, "entries": [...] }
//! ```
//!
//! The digest covers `roots` and `entries` under a domain tag, so a table that
//! was truncated or edited after suspension is rejected before any store is
//! rebuilt from it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use stasis_types::{HostId, RefId};

use crate::error::{GraphError, GraphResult};
use crate::table::{Entry, SerializedState};

/// Envelope version written by this crate.
pub const FORMAT_VERSION: u32 = 1;

const DIGEST_DOMAIN: &[u8] = b"stasis-state-v1:";

/// A sealed table: the state plus its version and digest.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub version: u32,
    pub digest: String,
    pub roots: BTreeMap<HostId, BTreeMap<String, RefId>>,
    pub entries: Vec<Entry>,
}

#[derive(Serialize)]
struct Body<'a> {
    roots: &'a BTreeMap<HostId, BTreeMap<String, RefId>>,
    entries: &'a [Entry],
}

/// Stateless encoder/decoder for sealed tables.
pub struct StateCodec;

impl StateCodec {
    /// BLAKE3 digest of `state`, hex encoded.
    pub fn digest(state: &SerializedState) -> GraphResult<String> {
        let body = serde_json::to_vec(&Body {
            roots: &state.roots,
            entries: &state.entries,
        })
        .map_err(|e| GraphError::Serialization(e.to_string()))?;
        let mut hasher = blake3::Hasher::new();
        hasher.update(DIGEST_DOMAIN);
        hasher.update(&body);
        Ok(hex::encode(hasher.finalize().as_bytes()))
    }

    pub fn seal(state: &SerializedState) -> GraphResult<Envelope> {
        Ok(Envelope {
            version: FORMAT_VERSION,
            digest: Self::digest(state)?,
            roots: state.roots.clone(),
            entries: state.entries.clone(),
        })
    }

    /// Check the version (and the digest, if `verify_digest`) and unwrap.
    pub fn unseal(envelope: Envelope, verify_digest: bool) -> GraphResult<SerializedState> {
        if envelope.version != FORMAT_VERSION {
            return Err(GraphError::UnsupportedVersion(envelope.version));
        }
        let state = SerializedState {
            roots: envelope.roots,
            entries: envelope.entries,
        };
        if verify_digest {
            let computed = Self::digest(&state)?;
            if computed != envelope.digest {
                warn!(expected = %envelope.digest, computed = %computed, "state digest mismatch");
                return Err(GraphError::DigestMismatch {
                    expected: envelope.digest,
                    computed,
                });
            }
        }
        Ok(state)
    }

    pub fn encode(state: &SerializedState) -> GraphResult<String> {
        serde_json::to_string(&Self::seal(state)?)
            .map_err(|e| GraphError::Serialization(e.to_string()))
    }

    /// Decode and verify the digest.
    pub fn decode(json: &str) -> GraphResult<SerializedState> {
        Self::decode_with(json, true)
    }

    pub fn decode_with(json: &str, verify_digest: bool) -> GraphResult<SerializedState> {
        let envelope: Envelope =
            serde_json::from_str(json).map_err(|e| GraphError::Serialization(e.to_string()))?;
        Self::unseal(envelope, verify_digest)
    }
}
