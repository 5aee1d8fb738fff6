//! Shutdown hooks run by the host application during teardown

use futures_util::future::BoxFuture;
use std::future::Future;

type Hook = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Ordered registry of teardown steps, owned by the composition root
#[derive(Default)]
pub struct ShutdownHooks {
    hooks: Vec<(String, Hook)>,
}

impl ShutdownHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, Fut>(&mut self, name: impl Into<String>, hook: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.hooks
            .push((name.into(), Box::new(move || Box::pin(hook()))));
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run every hook in registration order. A hook that panics is logged
    /// and the remaining hooks still run.
    pub async fn run_all(self) {
        for (name, hook) in self.hooks {
            tracing::info!(hook = %name, "Running shutdown hook");
            if let Err(e) = tokio::spawn(hook()).await {
                tracing::error!(hook = %name, "Shutdown hook failed: {}", e);
            }
        }
    }
}
