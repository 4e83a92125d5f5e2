//! Memory selector trait consumed synchronously by PERSON_JOB (§6).

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Called inline from PERSON_JOB to pick which prior messages a person
/// node sees. Must be deterministic given the same inputs — the
/// scheduler does not retry selection on its own.
#[async_trait]
pub trait MemorySelector: Send + Sync {
    async fn select(
        &self,
        person_id: &str,
        candidates: &[String],
        task_preview: &str,
        criteria: &Value,
        at_most: usize,
    ) -> Result<Vec<String>>;
}

/// Returns the last `at_most` candidates, unconditionally. Useful as a
/// default and in tests.
#[derive(Debug, Clone, Default)]
pub struct RecencyMemorySelector;

#[async_trait]
impl MemorySelector for RecencyMemorySelector {
    async fn select(
        &self,
        _person_id: &str,
        candidates: &[String],
        _task_preview: &str,
        _criteria: &Value,
        at_most: usize,
    ) -> Result<Vec<String>> {
        let start = candidates.len().saturating_sub(at_most);
        Ok(candidates[start..].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recency_selector_keeps_last_n() {
        let sel = RecencyMemorySelector;
        let candidates: Vec<String> = (0..5).map(|i| i.to_string()).collect();
        let picked = sel
            .select("p1", &candidates, "", &Value::Null, 2)
            .await
            .unwrap();
        assert_eq!(picked, vec!["3", "4"]);
    }

    #[tokio::test]
    async fn recency_selector_handles_at_most_larger_than_candidates() {
        let sel = RecencyMemorySelector;
        let candidates: Vec<String> = vec!["a".into()];
        let picked = sel
            .select("p1", &candidates, "", &Value::Null, 5)
            .await
            .unwrap();
        assert_eq!(picked, vec!["a"]);
    }
}
