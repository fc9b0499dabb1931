// In-memory module loader for unit tests.
use std::os::fd::OwnedFd;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::core::error::{Error, ErrorKind};
use crate::core::loader::{ModuleLoader, ServeOutcome};

pub(crate) struct FakeLoader {
    pub loads: AtomicUsize,
    pub unloads: AtomicUsize,
    pub serves: AtomicUsize,
    pub count_queries: AtomicUsize,
    fail_library: Option<String>,
    outcome: Mutex<ServeOutcome>,
    clients: Mutex<Option<u32>>,
    last_path: Mutex<Option<PathBuf>>,
}

impl Default for FakeLoader {
    fn default() -> Self {
        Self {
            loads: AtomicUsize::new(0),
            unloads: AtomicUsize::new(0),
            serves: AtomicUsize::new(0),
            count_queries: AtomicUsize::new(0),
            fail_library: None,
            outcome: Mutex::new(ServeOutcome::Handled),
            clients: Mutex::new(Some(0)),
            last_path: Mutex::new(None),
        }
    }
}

impl FakeLoader {
    pub fn failing_on(library: &str) -> Self {
        Self {
            fail_library: Some(library.to_string()),
            ..Self::default()
        }
    }

    pub fn set_outcome(&self, outcome: ServeOutcome) {
        *self.outcome.lock().expect("lock") = outcome;
    }

    pub fn set_clients(&self, clients: Option<u32>) {
        *self.clients.lock().expect("lock") = clients;
    }

    pub fn last_path(&self) -> Option<PathBuf> {
        self.last_path.lock().expect("lock").clone()
    }
}

impl ModuleLoader for FakeLoader {
    type Handle = PathBuf;

    fn load(&self, path: &Path) -> Result<PathBuf, Error> {
        *self.last_path.lock().expect("lock") = Some(path.to_path_buf());
        if let Some(fail) = &self.fail_library {
            if path.ends_with(fail) {
                return Err(Error::new(ErrorKind::UnableToLoad).with_path(path));
            }
        }
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(path.to_path_buf())
    }

    fn serve(&self, _handle: &PathBuf, _symbol: &str, endpoint: OwnedFd) -> ServeOutcome {
        self.serves.fetch_add(1, Ordering::SeqCst);
        drop(endpoint);
        *self.outcome.lock().expect("lock")
    }

    fn client_count(&self, _handle: &PathBuf, _symbol: &str) -> Option<u32> {
        self.count_queries.fetch_add(1, Ordering::SeqCst);
        *self.clients.lock().expect("lock")
    }

    fn unload(&self, _handle: PathBuf) {
        self.unloads.fetch_add(1, Ordering::SeqCst);
    }
}
