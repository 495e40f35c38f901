use async_trait::async_trait;

/// Delivers password-reset tokens out of band (for example by email).
#[async_trait]
pub trait ResetMailer: Send + Sync {
    async fn send_reset(&self, email: &str, token: &str) -> Result<(), String>;
}
