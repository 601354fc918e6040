//! Process-wide compiler backend.

use rhai::Engine;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::OnceCell;
use tracing::{debug, error};

use crate::config::BackendProfile;

/// Where the active backend came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendOrigin {
    /// Built-in limits.
    Native,
    /// A profile read from disk.
    Portable(PathBuf),
}

/// An initialized compiler backend.
#[derive(Debug, Clone)]
pub struct Backend {
    profile: BackendProfile,
    origin: BackendOrigin,
}

impl Backend {
    /// Engine limits of this backend.
    pub fn profile(&self) -> &BackendProfile {
        &self.profile
    }

    /// Where this backend came from.
    pub fn origin(&self) -> &BackendOrigin {
        &self.origin
    }

    /// A parse-only engine with this backend's limits.
    pub fn parser(&self) -> Engine {
        let mut engine = Engine::new_raw();
        self.profile.apply(&mut engine);
        engine
    }
}

/// Lazily initializes the compiler backend exactly once.
///
/// Concurrent first callers share the same in-flight initialization. A failed
/// initialization is recorded and every later compile reports it instead of
/// retrying.
#[derive(Debug, Default)]
pub struct CompilerRuntime {
    state: OnceCell<Result<Arc<Backend>, String>>,
    init_count: AtomicUsize,
}

impl CompilerRuntime {
    /// Create an uninitialized runtime.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide runtime.
    pub fn global() -> Arc<CompilerRuntime> {
        static GLOBAL: OnceLock<Arc<CompilerRuntime>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(CompilerRuntime::new())).clone()
    }

    /// Initialize the backend. Idempotent.
    ///
    /// Without an override the native profile is used; with one, a portable
    /// profile is read from that location. Failure is recorded, not returned.
    pub async fn initialize(&self, backend_location_override: Option<&Path>) {
        self.state
            .get_or_init(|| async {
                self.init_count.fetch_add(1, Ordering::SeqCst);
                let result = load_backend(backend_location_override).await;
                match &result {
                    Ok(backend) => debug!(origin = ?backend.origin, "compiler backend ready"),
                    Err(reason) => error!(%reason, "compiler backend failed to initialize"),
                }
                result
            })
            .await;
    }

    /// The initialized backend, or the reason initialization failed.
    pub fn backend(&self) -> Result<Arc<Backend>, String> {
        match self.state.get() {
            Some(Ok(backend)) => Ok(backend.clone()),
            Some(Err(reason)) => Err(reason.clone()),
            None => Err("compiler backend is not initialized".to_string()),
        }
    }

    /// Check whether a backend is ready for use.
    pub fn is_ready(&self) -> bool {
        matches!(self.state.get(), Some(Ok(_)))
    }

    /// How many times the underlying initialization actually ran.
    pub fn init_count(&self) -> usize {
        self.init_count.load(Ordering::SeqCst)
    }
}

async fn load_backend(location: Option<&Path>) -> Result<Arc<Backend>, String> {
    let backend = match location {
        None => Backend {
            profile: BackendProfile::default(),
            origin: BackendOrigin::Native,
        },
        Some(path) => Backend {
            profile: BackendProfile::from_file(path)
                .await
                .map_err(|e| e.to_string())?,
            origin: BackendOrigin::Portable(path.to_path_buf()),
        },
    };
    Ok(Arc::new(backend))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_native_backend() {
        let runtime = CompilerRuntime::new();
        assert!(!runtime.is_ready());
        assert!(runtime.backend().is_err());

        runtime.initialize(None).await;
        let backend = runtime.backend().unwrap();
        assert_eq!(backend.origin(), &BackendOrigin::Native);
        assert_eq!(backend.profile(), &BackendProfile::default());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_initialize_runs_once() {
        let runtime = Arc::new(CompilerRuntime::new());
        let calls = (0..16).map(|_| {
            let runtime = runtime.clone();
            tokio::spawn(async move { runtime.initialize(None).await })
        });
        for result in futures::future::join_all(calls).await {
            result.unwrap();
        }

        assert_eq!(runtime.init_count(), 1);
        assert!(runtime.is_ready());
    }

    #[tokio::test]
    async fn test_portable_profile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backend.toml");
        std::fs::write(&path, "timeout_ms = 250\n").unwrap();

        let runtime = CompilerRuntime::new();
        runtime.initialize(Some(path.as_path())).await;

        let backend = runtime.backend().unwrap();
        assert_eq!(backend.origin(), &BackendOrigin::Portable(path.clone()));
        assert_eq!(backend.profile().timeout_ms, 250);
    }

    #[tokio::test]
    async fn test_failure_is_recorded_not_retried() {
        let runtime = CompilerRuntime::new();
        runtime.initialize(Some(Path::new("/nonexistent/backend.toml"))).await;
        assert!(runtime.backend().unwrap_err().contains("backend.toml"));

        runtime.initialize(None).await;
        assert_eq!(runtime.init_count(), 1);
        assert!(!runtime.is_ready());
    }
}
