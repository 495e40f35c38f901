//! Tenant routing and provisioning.

mod locator;
mod provision;

pub use locator::{TenantLocator, sanitize_tenant_name};
pub use provision::Provisioner;
