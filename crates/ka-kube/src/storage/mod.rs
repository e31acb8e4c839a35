//! Ledger storage drivers
//!
//! The ledger is a single JSON record. Drivers only know how to read and
//! write it once; [`save_with_retry`] adds the conflict retry on top.
//!
//! - **ConfigMap** (default): `binaryData["data"]` of a ConfigMap
//! - **Mock**: in memory, for tests

mod configmap;
mod mock;

pub use configmap::ConfigMapLedgerStore;
pub use mock::{MockLedgerStore, OperationCounts};

use async_trait::async_trait;
use ka_core::StateLedger;

use crate::error::{KubeError, Result};
use crate::retry::{RetryPolicy, retry_on_conflict};

/// Key holding the encoded ledger
pub const DATA_KEY: &str = "data";

/// Persistence for the state ledger
///
/// Implementations must be Send + Sync for use across reconcile tasks.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Read the persisted ledger, or an empty one when nothing was saved yet
    async fn load(&self) -> Result<StateLedger>;

    /// Write the ledger once; a concurrent writer surfaces as a conflict
    async fn save(&self, ledger: &StateLedger) -> Result<()>;
}

/// Save, retrying conflicting writes with `policy`
pub async fn save_with_retry(
    store: &dyn LedgerStore,
    ledger: &StateLedger,
    policy: RetryPolicy,
) -> Result<()> {
    retry_on_conflict(policy, move || store.save(ledger)).await
}

/// Encode a ledger for storage
pub fn encode_ledger(ledger: &StateLedger) -> Result<Vec<u8>> {
    serde_json::to_vec(ledger).map_err(|e| KubeError::Ledger(format!("failed to encode: {e}")))
}

/// Decode stored bytes; empty data is an empty ledger
pub fn decode_ledger(data: &[u8]) -> Result<StateLedger> {
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(StateLedger::new());
    }
    serde_json::from_slice(data).map_err(|e| KubeError::Ledger(format!("failed to decode: {e}")))
}
