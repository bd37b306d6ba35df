//! The storage operations a shard owner exposes to remote coordinators.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;

use anyhow::{Result, anyhow, bail};
use tokio::sync::RwLock;
use tracing::debug;

use crate::message::{Point, ShardId};

/// Shard-level writes and schema deletions executed on the owning node.
///
/// The service calls these from many sessions at once, so implementations
/// must tolerate concurrent use. Errors are relayed to the remote caller as
/// text only.
pub trait ShardStore: Send + Sync + 'static {
    /// Appends `points` to the shard in the given order.
    fn write_to_shard(
        &self,
        shard_id: ShardId,
        points: Vec<Point>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Ensures the shard exists. Creating an existing shard is not an error.
    fn create_shard(
        &self,
        database: &str,
        policy: &str,
        shard_id: ShardId,
    ) -> impl Future<Output = Result<()>> + Send;

    fn delete_database(&self, database: &str) -> impl Future<Output = Result<()>> + Send;

    fn delete_measurement(
        &self,
        database: &str,
        name: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Drops series selected by opaque query-language sources and condition.
    fn delete_series(
        &self,
        database: &str,
        sources: Vec<String>,
        condition: Option<String>,
    ) -> impl Future<Output = Result<()>> + Send;

    fn delete_retention_policy(
        &self,
        database: &str,
        name: &str,
    ) -> impl Future<Output = Result<()>> + Send;
}

struct Shard {
    database: String,
    policy: String,
    points: Vec<Point>,
}

#[derive(Default)]
struct MemInner {
    // database -> retention policy -> shard ids
    databases: BTreeMap<String, BTreeMap<String, BTreeSet<ShardId>>>,
    shards: HashMap<ShardId, Shard>,
}

impl MemInner {
    fn shard_ids(&self, database: &str) -> Result<Vec<ShardId>> {
        let policies = self
            .databases
            .get(database)
            .ok_or_else(|| anyhow!("database not found: {database}"))?;
        Ok(policies.values().flatten().copied().collect())
    }

    /// Removes matching points from every shard in `database`, returning how many went.
    fn retain_points<F>(&mut self, database: &str, mut drop_point: F) -> Result<usize>
    where
        F: FnMut(&Point) -> bool,
    {
        let mut removed = 0;
        for id in self.shard_ids(database)? {
            if let Some(shard) = self.shards.get_mut(&id) {
                let before = shard.points.len();
                shard.points.retain(|point| !drop_point(point));
                removed += before - shard.points.len();
            }
        }
        Ok(removed)
    }
}

/// In-memory [`ShardStore`]: databases own retention policies, policies own
/// shards, and shards keep their points in arrival order.
///
/// Not persisted across restarts.
#[derive(Clone, Default)]
pub struct MemStore {
    inner: Arc<RwLock<MemInner>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn points(&self, shard_id: ShardId) -> Option<Vec<Point>> {
        let inner = self.inner.read().await;
        inner.shards.get(&shard_id).map(|shard| shard.points.clone())
    }

    pub async fn has_shard(&self, shard_id: ShardId) -> bool {
        self.inner.read().await.shards.contains_key(&shard_id)
    }

    pub async fn databases(&self) -> Vec<String> {
        self.inner.read().await.databases.keys().cloned().collect()
    }
}

impl ShardStore for MemStore {
    async fn write_to_shard(&self, shard_id: ShardId, points: Vec<Point>) -> Result<()> {
        let mut inner = self.inner.write().await;
        let shard = inner
            .shards
            .get_mut(&shard_id)
            .ok_or_else(|| anyhow!("shard not found: {shard_id}"))?;
        debug!(shard_id, count = points.len(), "appending points");
        shard.points.extend(points);
        Ok(())
    }

    async fn create_shard(&self, database: &str, policy: &str, shard_id: ShardId) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.shards.get(&shard_id) {
            if existing.database == database && existing.policy == policy {
                return Ok(());
            }
            bail!(
                "shard {shard_id} already belongs to {}.{}",
                existing.database,
                existing.policy
            );
        }

        inner
            .databases
            .entry(database.to_string())
            .or_default()
            .entry(policy.to_string())
            .or_default()
            .insert(shard_id);
        inner.shards.insert(
            shard_id,
            Shard {
                database: database.to_string(),
                policy: policy.to_string(),
                points: Vec::new(),
            },
        );
        debug!(database, policy, shard_id, "created shard");
        Ok(())
    }

    async fn delete_database(&self, database: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let ids = inner.shard_ids(database)?;
        for id in ids {
            inner.shards.remove(&id);
        }
        inner.databases.remove(database);
        Ok(())
    }

    async fn delete_measurement(&self, database: &str, name: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let removed =
            inner.retain_points(database, |point| *point.measurement() == *name.as_bytes())?;
        if removed == 0 {
            bail!("measurement not found: {name}");
        }
        Ok(())
    }

    async fn delete_series(
        &self,
        database: &str,
        sources: Vec<String>,
        condition: Option<String>,
    ) -> Result<()> {
        if let Some(condition) = condition {
            bail!("unsupported delete condition: {condition}");
        }

        let mut inner = self.inner.write().await;
        let removed = inner.retain_points(database, |point| {
            sources.is_empty()
                || sources
                    .iter()
                    .any(|source| *point.measurement() == *source.as_bytes())
        })?;
        debug!(database, removed, "deleted series");
        Ok(())
    }

    async fn delete_retention_policy(&self, database: &str, name: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let policies = inner
            .databases
            .get_mut(database)
            .ok_or_else(|| anyhow!("database not found: {database}"))?;
        let ids = policies
            .remove(name)
            .ok_or_else(|| anyhow!("retention policy not found: {name}"))?;
        for id in ids {
            inner.shards.remove(&id);
        }
        Ok(())
    }
}
