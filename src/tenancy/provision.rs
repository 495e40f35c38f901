use std::path::PathBuf;
use std::sync::Arc;

use crate::db::libsql::{StoreBootstrap, TenantStore};
use crate::db::{AccountStore, TenantUserStore};
use crate::error::ProvisioningError;
use crate::tenancy::TenantLocator;

/// Ensures a tenant's store exists and holds its user record.
pub struct Provisioner {
    locator: TenantLocator,
    accounts: Arc<dyn AccountStore>,
}

impl Provisioner {
    pub fn new(locator: TenantLocator, accounts: Arc<dyn AccountStore>) -> Self {
        Self { locator, accounts }
    }

    pub fn locator(&self) -> &TenantLocator {
        &self.locator
    }

    /// Idempotent; call it before any tenant-store access.
    ///
    /// Creates the directory and schema when missing, then mirrors the
    /// account's credential hash into the store's user table without
    /// overwriting an existing row. A missing credential is logged and skipped
    /// so a later call can fill it in.
    pub async fn ensure_tenant_store(
        &self,
        email: &str,
        account_id: i64,
    ) -> Result<PathBuf, ProvisioningError> {
        let store = self.ensure_and_open(email, account_id).await?;
        Ok(store.path().to_path_buf())
    }

    /// Like [`Self::ensure_tenant_store`], returning the open store.
    pub async fn ensure_and_open(
        &self,
        email: &str,
        account_id: i64,
    ) -> Result<TenantStore, ProvisioningError> {
        let path = self.locator.locate(email);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ProvisioningError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let (store, bootstrap) = TenantStore::bootstrap(&path).await?;
        if bootstrap == StoreBootstrap::Created {
            tracing::info!(email, account_id, "Provisioned tenant store");
        }

        match self.accounts.get_credential_hash(account_id).await? {
            Some(hash) => {
                if store.insert_user_if_absent(email, &hash).await? {
                    tracing::debug!(email, account_id, "Mirrored tenant user");
                }
            }
            None => {
                tracing::warn!(
                    email,
                    account_id,
                    "No credential hash for account; tenant user not created yet"
                );
            }
        }

        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::db::libsql::MasterStore;
    use crate::db::{GlossaryStore, NewAccountParams};

    struct TestProvisioner {
        provisioner: Provisioner,
        master: Arc<MasterStore>,
        tmpdir: tempfile::TempDir,
    }

    async fn setup_provisioner() -> TestProvisioner {
        let tmpdir = tempfile::tempdir().expect("tempdir");
        let master = Arc::new(
            MasterStore::open(&tmpdir.path().join("master.db"))
                .await
                .expect("master store"),
        );
        let provisioner = Provisioner::new(
            TenantLocator::new(tmpdir.path().join("tenants")),
            master.clone(),
        );
        TestProvisioner {
            provisioner,
            master,
            tmpdir,
        }
    }

    #[tokio::test]
    async fn repeated_provisioning_yields_one_user_and_one_seed() {
        let fixture = setup_provisioner().await;
        fixture
            .master
            .insert_account(&NewAccountParams {
                email: "a@x.com".to_string(),
                credential_hash: "hash".to_string(),
                is_admin: false,
            })
            .await
            .expect("account");

        let mut paths = Vec::new();
        for _ in 0..3 {
            paths.push(
                fixture
                    .provisioner
                    .ensure_tenant_store("a@x.com", 1)
                    .await
                    .expect("provision"),
            );
        }
        assert!(paths.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(
            paths[0],
            fixture.tmpdir.path().join("tenants").join("a_at_x_dot_com.db")
        );

        let store = TenantStore::open(&paths[0]).await.expect("open");
        assert_eq!(store.count_users().await.expect("users"), 1);
        assert_eq!(store.list_glossary().await.expect("glossary").len(), 4);
    }

    #[tokio::test]
    async fn missing_credential_still_creates_store_and_heals_later() {
        let fixture = setup_provisioner().await;
        let path = fixture
            .provisioner
            .ensure_tenant_store("late@x.com", 1)
            .await
            .expect("provision without account");
        let store = TenantStore::open(&path).await.expect("open");
        assert_eq!(store.count_users().await.expect("users"), 0);

        fixture
            .master
            .insert_account(&NewAccountParams {
                email: "late@x.com".to_string(),
                credential_hash: "hash".to_string(),
                is_admin: false,
            })
            .await
            .expect("account");
        fixture
            .provisioner
            .ensure_tenant_store("late@x.com", 1)
            .await
            .expect("retry");
        assert_eq!(store.count_users().await.expect("users"), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_provisioning_is_safe() {
        let fixture = setup_provisioner().await;
        fixture
            .master
            .insert_account(&NewAccountParams {
                email: "a@x.com".to_string(),
                credential_hash: "hash".to_string(),
                is_admin: false,
            })
            .await
            .expect("account");
        let provisioner = Arc::new(fixture.provisioner);

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let provisioner = Arc::clone(&provisioner);
                tokio::spawn(async move { provisioner.ensure_tenant_store("a@x.com", 1).await })
            })
            .collect();
        for handle in handles {
            handle.await.expect("join").expect("provision");
        }

        let store = TenantStore::open(&provisioner.locator().locate("a@x.com"))
            .await
            .expect("open");
        assert_eq!(store.count_users().await.expect("users"), 1);
        assert_eq!(store.list_glossary().await.expect("glossary").len(), 4);
    }
}
