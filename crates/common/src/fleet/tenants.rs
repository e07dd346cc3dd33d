//! Tenant directory: bootstrap, API key verification and rotation

use crate::auth::{generate_secret, CredentialHasher, API_KEY_PREFIX};
use crate::clock::SharedClock;
use crate::db::models::Tenant;
use crate::db::Repository;
use crate::errors::{AppError, Result};
use crate::metrics;
use std::time::Instant;
use uuid::Uuid;

const MAX_TENANT_NAME_LEN: usize = 128;

/// Issues and verifies tenant admin API keys
#[derive(Clone)]
pub struct TenantDirectory {
    repo: Repository,
    hasher: CredentialHasher,
    clock: SharedClock,
}

impl TenantDirectory {
    pub fn new(repo: Repository, hasher: CredentialHasher, clock: SharedClock) -> Self {
        Self { repo, hasher, clock }
    }

    /// Create a tenant and return it with its plaintext API key.
    ///
    /// The key is only ever returned here; the store keeps its hash.
    pub async fn create_tenant(&self, name: &str) -> Result<(Tenant, String)> {
        let name = name.trim();
        if name.is_empty() || name.len() > MAX_TENANT_NAME_LEN {
            return Err(AppError::invalid_field(
                "name",
                format!("Tenant name must be 1-{} characters", MAX_TENANT_NAME_LEN),
            ));
        }

        let api_key = generate_secret(API_KEY_PREFIX);
        let hash = self.hasher.hash(&api_key)?;
        let tenant = self
            .repo
            .create_tenant(name.to_string(), hash, self.clock.now())
            .await?;

        tracing::info!(tenant_id = %tenant.id, tenant = %tenant.name, "Tenant created");
        Ok((tenant, api_key))
    }

    /// Resolve an API key to its tenant by scanning every tenant hash
    pub async fn verify_api_key(&self, api_key: &str) -> Result<Option<Tenant>> {
        let candidates: Vec<(Tenant, String)> = self
            .repo
            .list_tenants()
            .await?
            .into_iter()
            .map(|tenant| {
                let hash = tenant.api_key_hash.clone();
                (tenant, hash)
            })
            .collect();

        let start = Instant::now();
        let found = self
            .hasher
            .find_match_blocking(api_key.to_string(), candidates)
            .await?;
        metrics::record_credential_scan("tenant_key", start.elapsed().as_secs_f64());

        Ok(found)
    }

    /// Replace a tenant's API key. The old key stops working immediately.
    pub async fn rotate_key(&self, tenant_id: Uuid) -> Result<String> {
        let api_key = generate_secret(API_KEY_PREFIX);
        let hash = self.hasher.hash(&api_key)?;

        if !self.repo.update_tenant_key_hash(tenant_id, hash).await? {
            return Err(AppError::NotFound {
                resource_type: "Tenant".to_string(),
                id: tenant_id.to_string(),
            });
        }

        tracing::info!(tenant_id = %tenant_id, "Tenant API key rotated");
        Ok(api_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HashingConfig;
    use crate::{DbPool, ManualClock};
    use std::sync::Arc;

    async fn directory() -> TenantDirectory {
        let repo = Repository::new(DbPool::in_memory().await.unwrap());
        let hasher = CredentialHasher::new(&HashingConfig::insecure_fast()).unwrap();
        TenantDirectory::new(repo, hasher, Arc::new(ManualClock::default()))
    }

    #[tokio::test]
    async fn test_create_and_verify() {
        let directory = directory().await;
        let (acme, acme_key) = directory.create_tenant("acme").await.unwrap();
        let (globex, globex_key) = directory.create_tenant("globex").await.unwrap();

        assert!(acme_key.starts_with(API_KEY_PREFIX));
        assert_eq!(directory.verify_api_key(&acme_key).await.unwrap().unwrap().id, acme.id);
        assert_eq!(directory.verify_api_key(&globex_key).await.unwrap().unwrap().id, globex.id);
        assert!(directory.verify_api_key("ak_nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_name_validation_and_uniqueness() {
        let directory = directory().await;
        assert!(matches!(
            directory.create_tenant("   ").await.unwrap_err(),
            AppError::Validation { .. }
        ));

        directory.create_tenant("acme").await.unwrap();
        assert!(matches!(
            directory.create_tenant(" acme ").await.unwrap_err(),
            AppError::Conflict { .. }
        ));
    }

    #[tokio::test]
    async fn test_rotate_key_invalidates_old_key() {
        let directory = directory().await;
        let (tenant, old_key) = directory.create_tenant("acme").await.unwrap();

        let new_key = directory.rotate_key(tenant.id).await.unwrap();
        assert_ne!(old_key, new_key);
        assert!(directory.verify_api_key(&old_key).await.unwrap().is_none());
        assert_eq!(directory.verify_api_key(&new_key).await.unwrap().unwrap().id, tenant.id);

        let err = directory.rotate_key(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }
}
