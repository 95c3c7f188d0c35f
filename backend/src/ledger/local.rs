//! In-memory usage ledger.

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::UsageLedger;
use crate::db::repository::RepositoryResult;
use crate::models::{HubId, UsageBlock};

#[derive(Debug, Clone, Default)]
pub struct LocalLedger {
    blocks: Arc<RwLock<BTreeMap<(HubId, DateTime<Utc>), UsageBlock>>>,
}

impl LocalLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blocks stored across all hubs.
    pub fn len(&self) -> usize {
        self.blocks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.read().is_empty()
    }
}

#[async_trait]
impl UsageLedger for LocalLedger {
    async fn health_check(&self) -> RepositoryResult<bool> {
        Ok(true)
    }

    async fn record_block(&self, block: &UsageBlock) -> RepositoryResult<()> {
        let mut block = block.clone();
        block.timestamp = block.timestamp.trunc_subsecs(0);
        self.blocks
            .write()
            .insert((block.hub_id.clone(), block.timestamp), block);
        Ok(())
    }

    async fn blocks_for_hub(
        &self,
        hub_id: &HubId,
        limit: usize,
    ) -> RepositoryResult<Vec<UsageBlock>> {
        Ok(self
            .blocks
            .read()
            .iter()
            .rev()
            .filter(|((hub, _), _)| hub == hub_id)
            .take(limit)
            .map(|(_, block)| block.clone())
            .collect())
    }

    async fn get_block(
        &self,
        hub_id: &HubId,
        timestamp: DateTime<Utc>,
    ) -> RepositoryResult<Option<UsageBlock>> {
        Ok(self
            .blocks
            .read()
            .get(&(hub_id.clone(), timestamp.trunc_subsecs(0)))
            .cloned())
    }
}
