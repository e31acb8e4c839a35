//! Mock ledger driver for testing
//!
//! Stores the ledger in memory and counts operations. Conflicts and write
//! failures can be injected to exercise retry and durability paths.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use ka_core::StateLedger;

use super::LedgerStore;
use crate::error::{KubeError, Result};

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub loads: usize,
    /// Save attempts, including conflicting and failing ones
    pub saves: usize,
    pub conflicts: usize,
}

#[derive(Default)]
struct MockLedgerState {
    ledger: Option<StateLedger>,
    counts: OperationCounts,
    pending_conflicts: u32,
    fail_after_saves: Option<usize>,
}

/// In-memory ledger store
#[derive(Clone, Default)]
pub struct MockLedgerStore {
    state: Arc<RwLock<MockLedgerState>>,
}

impl MockLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an already persisted ledger
    pub fn with_ledger(ledger: StateLedger) -> Self {
        let store = Self::new();
        store.write().ledger = Some(ledger);
        store
    }

    /// Make the next `count` saves conflict
    pub fn inject_conflicts(&self, count: u32) {
        self.write().pending_conflicts = count;
    }

    /// Let `successful` more saves through, then fail every save
    pub fn fail_after(&self, successful: usize) {
        let mut state = self.write();
        state.fail_after_saves = Some(state.counts.saves + successful);
    }

    /// Last successfully saved ledger
    pub fn stored(&self) -> Option<StateLedger> {
        self.read().ledger.clone()
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> OperationCounts {
        self.read().counts.clone()
    }

    /// Reset operation counts
    pub fn reset_counts(&self) {
        self.write().counts = OperationCounts::default();
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, MockLedgerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, MockLedgerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl LedgerStore for MockLedgerStore {
    async fn load(&self) -> Result<StateLedger> {
        let mut state = self.write();
        state.counts.loads += 1;
        Ok(state.ledger.clone().unwrap_or_default())
    }

    async fn save(&self, ledger: &StateLedger) -> Result<()> {
        let mut state = self.write();
        state.counts.saves += 1;

        if state.pending_conflicts > 0 {
            state.pending_conflicts -= 1;
            state.counts.conflicts += 1;
            return Err(KubeError::Conflict("ledger record was modified".to_string()));
        }
        if state
            .fail_after_saves
            .is_some_and(|limit| state.counts.saves > limit)
        {
            return Err(KubeError::Ledger("injected write failure".to_string()));
        }

        state.ledger = Some(ledger.clone());
        Ok(())
    }
}
