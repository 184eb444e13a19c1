pub mod pipeline;


pub use pipeline::{HandleReport, Pipeline};

use database::SeenStore;
use postwatch_core::{AppConfig, FetcherFactory, Handle, HandleSource, Notifier, PostFilter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Idle,
    Dispatching,
    AwaitingCompletion,
    Sleeping,
}

/// Totals for one pass over the watch list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle: u64,
    pub dispatched: usize,
    pub fetch_failures: usize,
    pub panicked: usize,
    pub posts_seen: usize,
    pub relevant: usize,
    pub already_alerted: usize,
    pub alerts_sent: usize,
    pub send_failures: usize,
    pub store_failures: usize,
}

impl CycleReport {
    fn absorb(&mut self, report: &HandleReport) {
        if report.fetch_failed {
            self.fetch_failures += 1;
        }
        self.posts_seen += report.posts_seen;
        self.relevant += report.relevant;
        self.already_alerted += report.already_alerted;
        self.alerts_sent += report.alerts_sent;
        self.send_failures += report.send_failures;
        self.store_failures += report.store_failures;
    }
}

/// Polls every handle on the watch list on a fixed cadence with a bounded
/// number of concurrent workers.
pub struct BackgroundService {
    handles: HandleSource,
    fetchers: Arc<dyn FetcherFactory>,
    pipeline: Pipeline,
    polling_interval: Duration,
    max_workers: usize,
    cycle: AtomicU64,
    state: watch::Sender<ServiceState>,
    shutdown: watch::Sender<bool>,
}

impl BackgroundService {
    pub fn new(
        handles: HandleSource,
        fetchers: Arc<dyn FetcherFactory>,
        notifier: Arc<dyn Notifier>,
        store: SeenStore,
        filter: PostFilter,
    ) -> Self {
        let (state, _) = watch::channel(ServiceState::Idle);
        let (shutdown, _) = watch::channel(false);
        Self {
            handles,
            fetchers,
            pipeline: Pipeline::new(Arc::new(filter), store, notifier),
            polling_interval: Duration::ZERO,
            max_workers: 5,
            cycle: AtomicU64::new(0),
            state,
            shutdown,
        }
    }

    pub fn from_config(
        config: &AppConfig,
        fetchers: Arc<dyn FetcherFactory>,
        notifier: Arc<dyn Notifier>,
        store: SeenStore,
    ) -> Self {
        let handles = HandleSource::new(&config.users_file).with_dedupe(config.dedupe_handles);
        let filter = PostFilter::new(config.post_max_age, &config.keywords);
        Self::new(handles, fetchers, notifier, store, filter)
            .with_polling_interval(config.check_interval)
            .with_max_workers(config.num_workers)
    }

    pub fn with_polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = interval;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn state(&self) -> ServiceState {
        *self.state.borrow()
    }

    /// Runs cycles until [`stop`](Self::stop) is called. A cycle in progress
    /// always completes; shutdown is observed between cycles and while
    /// sleeping.
    pub async fn run(&self) {
        let mut shutdown = self.shutdown.subscribe();
        info!(
            workers = self.max_workers,
            interval_secs = self.polling_interval.as_secs(),
            "Background service started"
        );

        while !*shutdown.borrow_and_update() {
            let report = self.run_cycle().await;

            self.state.send_replace(ServiceState::Sleeping);
            info!(
                cycle = report.cycle,
                "Cycle complete. Sleeping for {} seconds...",
                self.polling_interval.as_secs()
            );
            tokio::select! {
                _ = tokio::time::sleep(self.polling_interval) => {}
                _ = shutdown.changed() => {}
            }
        }

        self.state.send_replace(ServiceState::Idle);
        info!("Background service stopped");
    }

    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    /// One full pass: reload the watch list, fan out, and wait for every
    /// task to finish.
    pub async fn run_cycle(&self) -> CycleReport {
        let cycle = self.cycle.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_replace(ServiceState::Dispatching);

        let handles = self.handles.load().await;
        info!(
            cycle,
            handles = handles.len(),
            workers = self.max_workers,
            "Starting processing cycle"
        );

        let mut report = CycleReport {
            cycle,
            dispatched: handles.len(),
            ..CycleReport::default()
        };

        let slots = Arc::new(Semaphore::new(self.max_workers));
        let tasks: Vec<_> = handles
            .into_iter()
            .map(|handle| {
                let task = self.spawn_worker(handle.clone(), slots.clone());
                (handle, task)
            })
            .collect();

        self.state.send_replace(ServiceState::AwaitingCompletion);
        for (handle, task) in tasks {
            match task.await {
                Ok(handle_report) => report.absorb(&handle_report),
                Err(e) if e.is_panic() => {
                    error!(handle = %handle, "Worker panicked; other accounts are unaffected");
                    report.panicked += 1;
                }
                Err(e) => {
                    warn!(handle = %handle, "Worker did not complete: {}", e);
                    report.panicked += 1;
                }
            }
        }

        info!(
            cycle,
            dispatched = report.dispatched,
            fetch_failures = report.fetch_failures,
            alerts_sent = report.alerts_sent,
            send_failures = report.send_failures,
            "Cycle finished"
        );
        report
    }

    fn spawn_worker(
        &self,
        handle: Handle,
        slots: Arc<Semaphore>,
    ) -> tokio::task::JoinHandle<HandleReport> {
        let pipeline = self.pipeline.clone();
        let fetchers = self.fetchers.clone();

        tokio::spawn(async move {
            let Ok(_permit) = slots.acquire_owned().await else {
                warn!(handle = %handle, "Worker pool closed before task could start");
                return HandleReport::default();
            };
            let fetcher = fetchers.fetcher();
            pipeline.process_handle(&handle, fetcher.as_ref()).await
        })
    }
}
