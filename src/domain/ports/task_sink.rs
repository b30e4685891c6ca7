//! Task sink port - write-through persistence behind the task registry.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::TaskSnapshot;

/// Write-through persistence for task snapshots. The registry remains the
/// authoritative in-memory source; sink failures are logged, never surfaced
/// into coordination.
#[async_trait]
pub trait TaskSink: Send + Sync {
    async fn upsert(&self, snapshot: &TaskSnapshot) -> DomainResult<()>;
}

/// A sink that discards writes. Used in tests and persistence-less setups.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTaskSink;

#[async_trait]
impl TaskSink for NullTaskSink {
    async fn upsert(&self, _snapshot: &TaskSnapshot) -> DomainResult<()> {
        Ok(())
    }
}
