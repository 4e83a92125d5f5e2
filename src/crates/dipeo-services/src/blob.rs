//! File system / blob store trait used by DB and API_JOB handlers (§6).

use crate::error::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    Append,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Validates that `path` can be opened in `mode`; does not return a
    /// handle, since reads/writes go through `get`/`put`.
    async fn open(&self, path: &str, mode: OpenMode) -> Result<()>;

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<String>;

    async fn get(&self, key: &str, version: Option<&str>) -> Result<Vec<u8>>;

    fn list(&self, prefix: &str) -> BoxStream<'_, Result<String>>;
}
