//! Recovery from the API Gateway 8192-character input limit
//!
//! The DiscoverGranules workflow definition is large enough that some
//! requests embedding it are rejected. The workaround swaps it for the small
//! HelloWorld definition in the stack's internal bucket, reissues the request
//! and puts the original back.

use crate::cloud::ObjectStore;
use crate::cumulus_api::config::STACK_PREFIX;
use crate::cumulus_api::types::CumulusError;
use crate::plugins::PluginContext;
use std::future::Future;
use std::sync::Arc;

const SWAPPED_WORKFLOW: &str = "DiscoverGranules.json";
const REPLACEMENT_WORKFLOW: &str = "HelloWorldWorkflow.json";

pub struct WorkflowSwap {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    target_key: String,
    replacement_key: String,
}

impl WorkflowSwap {
    pub fn new(store: Arc<dyn ObjectStore>, stack_prefix: &str) -> Self {
        let key_prefix = format!("{}/workflows/", stack_prefix);
        Self {
            store,
            bucket: format!("{}-internal", stack_prefix),
            target_key: format!("{}{}", key_prefix, SWAPPED_WORKFLOW),
            replacement_key: format!("{}{}", key_prefix, REPLACEMENT_WORKFLOW),
        }
    }

    /// Requires `STACK_PREFIX` and an object store on the context
    pub fn from_context(ctx: &PluginContext) -> Result<Self, CumulusError> {
        let prefix = ctx.config.get(STACK_PREFIX).ok_or_else(|| {
            tracing::error!("Handling payload limit: STACK_PREFIX is not set");
            CumulusError::Config(
                "The STACK_PREFIX environment variable has not been set".to_string(),
            )
        })?;
        let store = ctx.object_store("payload limit remediation")?;
        Ok(Self::new(Arc::clone(store), prefix))
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn target_key(&self) -> &str {
        &self.target_key
    }

    /// Swap the workflow, run `reissue`, then restore the original definition
    ///
    /// The restore runs whether or not `reissue` succeeds. A failed restore
    /// is reported unless the reissue itself already failed.
    pub async fn run<T, F, Fut>(&self, reissue: F) -> Result<T, CumulusError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CumulusError>>,
    {
        tracing::info!(
            "Handling 8192 character limit error: swapping s3://{}/{}",
            self.bucket,
            self.target_key
        );

        let saved = self
            .store
            .get_object_body(&self.bucket, &self.target_key)
            .await
            .map_err(|e| {
                tracing::error!("Failed to save {}: {}", self.target_key, e);
                CumulusError::Storage(e)
            })?;
        self.store
            .copy_object(&self.bucket, &self.replacement_key, &self.target_key)
            .await
            .map_err(|e| {
                tracing::error!("Failed to swap in {}: {}", self.replacement_key, e);
                CumulusError::Storage(e)
            })?;

        tracing::info!("Reissuing API request");
        let result = reissue().await;

        let restored = self
            .store
            .put_object(&self.bucket, &self.target_key, saved)
            .await;

        match (result, restored) {
            (result, Ok(())) => {
                tracing::debug!("Restored s3://{}/{}", self.bucket, self.target_key);
                result
            }
            (Ok(_), Err(e)) => {
                tracing::error!("Failed to restore {}: {}", self.target_key, e);
                Err(CumulusError::Storage(e))
            }
            (Err(err), Err(e)) => {
                tracing::error!("Failed to restore {}: {}", self.target_key, e);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::InMemoryObjectStore;

    fn seeded_store() -> InMemoryObjectStore {
        let store = InMemoryObjectStore::new();
        store.insert("ghrc-internal", "ghrc/workflows/DiscoverGranules.json", b"discover".to_vec());
        store.insert("ghrc-internal", "ghrc/workflows/HelloWorldWorkflow.json", b"hello".to_vec());
        store
    }

    #[tokio::test]
    async fn test_swap_is_visible_during_reissue_and_restored_after() {
        let store = seeded_store();
        let swap = WorkflowSwap::new(Arc::new(store.clone()), "ghrc");
        assert_eq!(swap.bucket(), "ghrc-internal");

        let observer = store.clone();
        let seen = swap
            .run(|| async move {
                Ok(observer.object("ghrc-internal", "ghrc/workflows/DiscoverGranules.json"))
            })
            .await
            .unwrap();

        assert_eq!(seen, Some(b"hello".to_vec()));
        assert_eq!(
            store.object("ghrc-internal", "ghrc/workflows/DiscoverGranules.json"),
            Some(b"discover".to_vec())
        );
    }

    #[tokio::test]
    async fn test_restore_runs_when_reissue_fails() {
        let store = seeded_store();
        let swap = WorkflowSwap::new(Arc::new(store.clone()), "ghrc");

        let result: Result<(), _> = swap
            .run(|| async { Err(CumulusError::Plugin("still too large".to_string())) })
            .await;

        assert!(matches!(result, Err(CumulusError::Plugin(_))));
        assert_eq!(
            store.object("ghrc-internal", "ghrc/workflows/DiscoverGranules.json"),
            Some(b"discover".to_vec())
        );
    }

    #[tokio::test]
    async fn test_missing_workflow_aborts_before_reissue() {
        let swap = WorkflowSwap::new(Arc::new(InMemoryObjectStore::new()), "ghrc");
        let mut called = false;
        let result = swap
            .run(|| {
                called = true;
                async { Ok(()) }
            })
            .await;
        assert!(matches!(result, Err(CumulusError::Storage(_))));
        assert!(!called);
    }
}
