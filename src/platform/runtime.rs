use std::future::Future;
use std::sync::LazyLock;

use tokio::runtime::{Builder, Handle, Runtime};

// Hosts such as Cordova call into the plugin from their own threads, so when
// there is no ambient Tokio runtime the work runs on a dedicated one.
static BACKGROUND_RUNTIME: LazyLock<Option<Runtime>> = LazyLock::new(|| {
    Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("firebase-database-bridge")
        .enable_all()
        .build()
        .ok()
});

/// Runs `future` in the background on the current Tokio runtime, or on the
/// crate's own runtime when called from outside one.
///
/// Returns `false` when no runtime could be found or started.
pub fn spawn_detached<F>(future: F) -> bool
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(handle) = Handle::try_current() {
        handle.spawn(future);
        return true;
    }
    match BACKGROUND_RUNTIME.as_ref() {
        Some(runtime) => {
            runtime.spawn(future);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn spawns_without_an_ambient_runtime() {
        let (sender, receiver) = std::sync::mpsc::channel();
        assert!(spawn_detached(async move {
            let _ = sender.send(42);
        }));
        assert_eq!(receiver.recv_timeout(Duration::from_secs(5)), Ok(42));
    }

    #[tokio::test]
    async fn spawns_on_the_ambient_runtime() {
        let (sender, receiver) = tokio::sync::oneshot::channel();
        assert!(spawn_detached(async move {
            let _ = sender.send("done");
        }));
        assert_eq!(receiver.await, Ok("done"));
    }
}
