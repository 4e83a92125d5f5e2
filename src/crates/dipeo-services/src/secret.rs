//! Secret/key store trait (§6). Values returned by this trait must
//! never be logged; `dipeo_support::logging::sanitize_for_logging`
//! exists for call sites that accidentally format one into a message.

use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, service: &str) -> Result<String>;
}
