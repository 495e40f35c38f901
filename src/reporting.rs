//! Read-only admin views across the master directory and all tenant stores.

use std::sync::Arc;

use serde::Serialize;

use crate::db::libsql::TenantStore;
use crate::db::{
    AccountStore, AccountSummary, DocumentRecord, DocumentStore, MasterTable, TableDump,
    TableReader, TenantDatabase, TenantTable,
};
use crate::error::DatabaseError;
use crate::tenancy::TenantLocator;

/// A document tagged with the tenant that owns it.
#[derive(Debug, Clone, Serialize)]
pub struct TenantDocument {
    pub tenant_email: String,
    #[serde(flatten)]
    pub document: DocumentRecord,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantCounts {
    pub tenant_email: String,
    pub users: i64,
    pub documents: i64,
}

pub struct AdminReports {
    accounts: Arc<dyn AccountStore>,
    locator: TenantLocator,
}

impl AdminReports {
    pub fn new(accounts: Arc<dyn AccountStore>, locator: TenantLocator) -> Self {
        Self { accounts, locator }
    }

    /// Newest first.
    pub async fn list_accounts(&self) -> Result<Vec<AccountSummary>, DatabaseError> {
        self.accounts.list_accounts().await
    }

    pub async fn list_tenant_emails(&self) -> Result<Vec<String>, DatabaseError> {
        self.accounts.list_tenant_emails().await
    }

    /// `name` must be one of the allow-listed master tables.
    pub async fn read_master_table(&self, name: &str) -> Result<TableDump, DatabaseError> {
        let table: MasterTable = name.parse()?;
        self.accounts.read_master_table(table).await
    }

    /// `name` must be one of the allow-listed tenant tables. A tenant without
    /// a store is `NotFound`.
    pub async fn read_tenant_table(
        &self,
        tenant_email: &str,
        name: &str,
    ) -> Result<TableDump, DatabaseError> {
        let table: TenantTable = name.parse()?;
        let store = self.open_tenant(tenant_email).await?;
        store.read_table(table).await
    }

    pub async fn tenant_counts(&self, tenant_email: &str) -> Result<TenantCounts, DatabaseError> {
        let store = self.open_tenant(tenant_email).await?;
        let (users, documents) = store.counts().await?;
        Ok(TenantCounts {
            tenant_email: tenant_email.to_string(),
            users,
            documents,
        })
    }

    /// Every tenant's documents, newest first within each tenant.
    ///
    /// Tenants whose store is missing or unreadable are skipped with a warning.
    pub async fn all_documents(&self) -> Result<Vec<TenantDocument>, DatabaseError> {
        let mut out = Vec::new();
        for email in self.accounts.list_tenant_emails().await? {
            let documents = match self.open_tenant(&email).await {
                Ok(store) => store.list_documents().await,
                Err(err) => Err(err),
            };
            match documents {
                Ok(documents) => out.extend(documents.into_iter().map(|document| TenantDocument {
                    tenant_email: email.clone(),
                    document,
                })),
                Err(err) => {
                    tracing::warn!(tenant = %email, error = %err, "Skipping unreadable tenant store");
                }
            }
        }
        Ok(out)
    }

    async fn open_tenant(&self, email: &str) -> Result<TenantStore, DatabaseError> {
        TenantStore::open(&self.locator.locate(email)).await
    }
}
