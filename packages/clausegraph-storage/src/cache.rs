//! Coherent per-tenant section cache
//!
//! Search legs scan a tenant's sections with their vectors; reloading them
//! from SQLite on every query would dominate latency. The cache holds one
//! immutable snapshot per tenant, populated lazily on first read and
//! invalidated on any write to that tenant. Readers share the `Arc`; the
//! single writer is whoever invalidates.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tracing::debug;

use crate::domain::StoredSection;

const DEFAULT_MAX_TENANTS: u64 = 256;
const DEFAULT_TTL: Duration = Duration::from_secs(3600);

#[derive(Clone)]
pub struct TenantCache {
    inner: Cache<String, Arc<Vec<StoredSection>>>,
}

impl TenantCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_TENANTS)
    }

    pub fn with_capacity(max_tenants: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_tenants)
            .time_to_live(DEFAULT_TTL)
            .build();
        Self { inner }
    }

    pub async fn get(&self, tenant_id: &str) -> Option<Arc<Vec<StoredSection>>> {
        self.inner.get(tenant_id).await
    }

    pub async fn insert(&self, tenant_id: &str, snapshot: Arc<Vec<StoredSection>>) {
        self.inner.insert(tenant_id.to_string(), snapshot).await;
    }

    /// Drop a tenant's snapshot after a write so the next read repopulates.
    pub async fn invalidate(&self, tenant_id: &str) {
        debug!(tenant = tenant_id, "invalidating tenant section cache");
        self.inner.invalidate(tenant_id).await;
    }
}

impl Default for TenantCache {
    fn default() -> Self {
        Self::new()
    }
}
