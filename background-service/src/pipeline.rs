use chrono::Utc;
use database::SeenStore;
use postwatch_core::{
    AlertMessage, CoreError, ErrorReporter, Handle, Notifier, PostFilter, ProfileFetcher,
    StoreError,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of one handle's task within a cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandleReport {
    pub fetch_failed: bool,
    pub posts_seen: usize,
    pub relevant: usize,
    pub already_alerted: usize,
    pub alerts_sent: usize,
    pub send_failures: usize,
    pub store_failures: usize,
}

/// Everything a worker needs besides its own fetcher. Cloned into each task;
/// the store is the only state shared between tasks.
#[derive(Clone)]
pub struct Pipeline {
    filter: Arc<PostFilter>,
    store: SeenStore,
    notifier: Arc<dyn Notifier>,
}

impl Pipeline {
    pub fn new(filter: Arc<PostFilter>, store: SeenStore, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            filter,
            store,
            notifier,
        }
    }

    /// Fetch, filter, dedupe and alert for a single handle. Errors never
    /// leave this function; they are logged and counted in the report.
    pub async fn process_handle(&self, handle: &Handle, fetcher: &dyn ProfileFetcher) -> HandleReport {
        let reporter = ErrorReporter::new();
        let mut report = HandleReport::default();

        info!(handle = %handle, "Processing account");
        let snapshot = match fetcher.fetch(handle).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(handle = %handle, "Skipping account this cycle");
                reporter.report_warning(&CoreError::from(e));
                report.fetch_failed = true;
                return report;
            }
        };

        for post in &snapshot.posts {
            report.posts_seen += 1;
            if !self.filter.is_relevant(post, Utc::now()) {
                continue;
            }
            report.relevant += 1;

            match self
                .store
                .already_notified(handle.as_str(), &post.permalink)
                .await
            {
                Ok(true) => {
                    debug!(handle = %handle, permalink = %post.permalink, "Skipping already alerted post");
                    report.already_alerted += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    // Unknown seen-state: leave it for the next cycle rather than risk a repeat
                    report.store_failures += 1;
                    reporter.report_warning(&CoreError::from(e));
                    continue;
                }
            }

            let message = AlertMessage::new(handle, &snapshot.follower_count, post).render();
            if let Err(e) = self.notifier.send(&message).await {
                warn!(
                    handle = %handle,
                    permalink = %post.permalink,
                    "Alert not delivered, will retry next cycle: {}",
                    e
                );
                report.send_failures += 1;
                continue;
            }
            report.alerts_sent += 1;

            match self
                .store
                .mark_notified(handle.as_str(), &post.permalink)
                .await
            {
                Ok(()) => {}
                Err(StoreError::AlreadyExists { .. }) => {
                    debug!(handle = %handle, permalink = %post.permalink, "Post was marked concurrently");
                }
                Err(e) => {
                    report.store_failures += 1;
                    reporter.report_error(&CoreError::from(e));
                }
            }
        }

        info!(
            handle = %handle,
            posts = report.posts_seen,
            relevant = report.relevant,
            sent = report.alerts_sent,
            "Finished account"
        );
        report
    }
}
