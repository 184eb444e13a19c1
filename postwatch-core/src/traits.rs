use crate::{FetchError, Handle, NotifyError, ProfileSnapshot};
use async_trait::async_trait;

/// Loads a profile page and extracts what is visible on first render.
#[async_trait]
pub trait ProfileFetcher: Send + Sync {
    async fn fetch(&self, handle: &Handle) -> Result<ProfileSnapshot, FetchError>;
}

/// Hands out one fetcher per dispatched task. Rendering sessions are never
/// shared between concurrent tasks.
pub trait FetcherFactory: Send + Sync {
    fn fetcher(&self) -> Box<dyn ProfileFetcher>;
}

impl<F> FetcherFactory for F
where
    F: Fn() -> Box<dyn ProfileFetcher> + Send + Sync,
{
    fn fetcher(&self) -> Box<dyn ProfileFetcher> {
        self()
    }
}

/// Outbound alert channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &str) -> Result<(), NotifyError>;
}
