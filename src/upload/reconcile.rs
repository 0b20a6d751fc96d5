//! Stale multipart cleanup
//!
//! Sessions that die before their abort runs (process crash, lost network)
//! leave open multipart uploads behind. The sweep aborts every one under the
//! upload prefix that is older than the cutoff.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::storage::MultipartStore;

use super::types::{UploadError, OBJECT_KEY_PREFIX};

/// Abort open multipart uploads under `prefix` initiated more than
/// `older_than` ago.
///
/// Returns the number of uploads aborted. Uploads with no known start time
/// are skipped.
pub async fn reconcile_stale_uploads(
    store: &dyn MultipartStore,
    prefix: &str,
    older_than: Duration,
) -> Result<usize, UploadError> {
    let cutoff = chrono::Duration::from_std(older_than)
        .ok()
        .and_then(|age| Utc::now().checked_sub_signed(age))
        .ok_or_else(|| UploadError::InvalidInput(format!("cutoff {:?} out of range", older_than)))?;

    let pending = store.list_pending_multiparts(prefix).await?;
    let mut aborted = 0;

    for upload in pending {
        let Some(initiated) = upload.initiated else {
            continue;
        };
        if initiated >= cutoff {
            continue;
        }

        match store.abort_multipart(&upload.handle).await {
            Ok(()) => {
                aborted += 1;
                tracing::info!(
                    object_key = %upload.handle.key,
                    initiated = %initiated,
                    "Aborted stale multipart upload"
                );
            }
            Err(e) => {
                tracing::warn!(
                    object_key = %upload.handle.key,
                    error = %e,
                    "Failed to abort stale multipart upload"
                );
            }
        }
    }

    Ok(aborted)
}

/// Run the sweep now and then every `every`
pub fn start_reconcile_task(
    store: Arc<dyn MultipartStore>,
    older_than: Duration,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);

        loop {
            interval.tick().await;
            match reconcile_stale_uploads(store.as_ref(), OBJECT_KEY_PREFIX, older_than).await {
                Ok(0) => tracing::debug!("No stale multipart uploads"),
                Ok(count) => tracing::info!(count = count, "Reconciled stale multipart uploads"),
                Err(e) => tracing::warn!(error = %e, "Multipart reconciliation failed"),
            }
        }
    })
}
