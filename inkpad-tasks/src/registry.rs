//! Task discovery and lifecycle across search roots.
//!
//! The registry scans a set of root directories for task JSON documents,
//! keeps the parsed task list, watches the filesystem, and reloads whenever
//! anything underneath a root changes.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};

use crate::error::Error;
use crate::host::HostBridge;
use crate::loader;
use crate::task::Task;

/// Config-manager identity of workspaces that use the recognized bundle
/// layout; only those contribute a workspace task folder.
pub const RECOGNIZED_CONFIG_IDENTITY: &str = "vx.vnotex";

/// Name of the configuration folder inside a bundle-layout workspace.
const WORKSPACE_CONFIG_FOLDER: &str = "vx_notebook";

/// A single edit raises several watch events (directory + file); events
/// arriving within this window coalesce into one reload.
const DEBOUNCE_QUIET_PERIOD: Duration = Duration::from_millis(300);

/// Host-supplied registry configuration.
#[derive(Clone, Debug)]
pub struct RegistryConfig {
    /// Application-scope task folder (shipped defaults).
    pub app_task_dir: PathBuf,
    /// User-scope task folder (per-user config location).
    pub user_task_dir: PathBuf,
    /// Locale tag used to decode locale-tagged strings.
    pub locale: Option<String>,
}

type Subscriber = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct RegistryState {
    search_roots: Vec<PathBuf>,
    /// All task JSON files seen on the last scan; some may be invalid.
    files: Vec<PathBuf>,
    tasks: Vec<Arc<Task>>,
}

struct RegistryShared {
    host: Arc<dyn HostBridge>,
    config: RegistryConfig,
    state: RwLock<RegistryState>,
    watcher: Mutex<Option<RecommendedWatcher>>,
    subscribers: Mutex<Vec<Subscriber>>,
    events_tx: Sender<()>,
}

/// Maintains the set of known tasks across multiple search roots.
pub struct TaskRegistry {
    shared: Arc<RegistryShared>,
    events_rx: Mutex<Option<Receiver<()>>>,
}

impl TaskRegistry {
    /// Creates a registry; no loading happens until [`Self::init`].
    pub fn new(host: Arc<dyn HostBridge>, config: RegistryConfig) -> Self {
        let (events_tx, events_rx) = channel();
        Self {
            shared: Arc::new(RegistryShared {
                host,
                config,
                state: RwLock::new(RegistryState::default()),
                watcher: Mutex::new(None),
                subscribers: Mutex::new(vec![]),
                events_tx,
            }),
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    /// Appends a search root. Takes effect on the next reload.
    pub fn add_search_path(&self, path: &Path) {
        self.shared
            .state
            .write()
            .unwrap()
            .search_roots
            .push(path.to_path_buf());
    }

    /// Computes the effective root set, loads tasks, installs watches, and
    /// starts reacting to filesystem changes. Call once the host is ready.
    pub fn init(&self) {
        self.shared.compute_roots();
        self.shared.reload();

        if let Some(events_rx) = self.events_rx.lock().unwrap().take() {
            let shared = Arc::downgrade(&self.shared);
            std::thread::spawn(move || debounce_loop(events_rx, shared));
        }
    }

    /// Rescans every root, replaces the task list, re-arms watches, and
    /// fires `tasks_changed` once.
    pub fn reload(&self) {
        self.shared.reload();
    }

    /// Rescans every root and replaces the task list without touching the
    /// root set or the watches.
    pub fn refresh(&self) {
        self.shared.load_and_swap();
        self.shared.notify_changed();
    }

    /// Recomputes the root set for the newly active workspace and reloads.
    pub fn workspace_changed(&self) {
        self.shared.compute_roots();
        self.shared.reload();
    }

    /// Snapshot of the current top-level tasks.
    pub fn tasks(&self) -> Vec<Arc<Task>> {
        self.shared.state.read().unwrap().tasks.clone()
    }

    /// Registers a callback invoked after every reload.
    pub fn on_tasks_changed(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.shared
            .subscribers
            .lock()
            .unwrap()
            .push(Box::new(callback));
    }

    /// Removes the task's backing file, then drops every task loaded from
    /// it.
    pub fn delete_task(&self, task: &Task) -> Result<(), Error> {
        std::fs::remove_file(task.file())?;
        {
            let mut state = self.shared.state.write().unwrap();
            state.tasks.retain(|known| known.file() != task.file());
            state.files.retain(|file| file != task.file());
        }
        self.shared.notify_changed();
        Ok(())
    }
}

impl RegistryShared {
    /// Effective roots: application scope, user scope, and the active
    /// workspace's task subfolder when the workspace uses the recognized
    /// bundle layout.
    fn compute_roots(&self) {
        let mut roots = vec![
            self.config.app_task_dir.clone(),
            self.config.user_task_dir.clone(),
        ];

        if let Some(workspace) = self.host.current_workspace() {
            if workspace.config_identity == RECOGNIZED_CONFIG_IDENTITY {
                let dir = workspace
                    .root_path
                    .join(WORKSPACE_CONFIG_FOLDER)
                    .join("tasks");
                if dir.is_dir() {
                    roots.push(dir);
                }
            } else {
                tracing::warn!(
                    identity = %workspace.config_identity,
                    "unknown workspace config type, tasks will not be loaded"
                );
            }
        }

        self.state.write().unwrap().search_roots = roots;
    }

    fn reload(&self) {
        self.load_and_swap();
        self.rearm_watches();
        self.notify_changed();
    }

    /// Rescans every root recursively and atomically replaces the file and
    /// task lists. A file that fails to parse is skipped with a diagnostic
    /// and never prevents others from loading.
    fn load_and_swap(&self) {
        let roots = self.state.read().unwrap().search_roots.clone();

        let mut files = vec![];
        for root in &roots {
            collect_task_files(root, &mut files);
        }

        let locale = self.config.locale.as_deref();
        let mut tasks = Vec::with_capacity(files.len());
        for file in &files {
            match loader::load_task_file(file, locale) {
                Ok(task) => tasks.push(Arc::new(task)),
                Err(err) => {
                    tracing::warn!(file = %file.display(), %err, "skipping task file");
                }
            }
        }
        tracing::debug!(count = tasks.len(), "loaded tasks");

        let mut state = self.state.write().unwrap();
        state.files = files;
        state.tasks = tasks;
    }

    /// Replaces the watcher with a fresh one covering every current root
    /// recursively (which subsumes the individual task files).
    fn rearm_watches(&self) {
        let events_tx = self.events_tx.clone();
        let mut watcher = match RecommendedWatcher::new(
            move |event: Result<Event, notify::Error>| {
                if let Ok(event) = event {
                    if matches!(
                        event.kind,
                        notify::EventKind::Modify(_)
                            | notify::EventKind::Create(_)
                            | notify::EventKind::Remove(_)
                    ) {
                        let _ = events_tx.send(());
                    }
                }
            },
            notify::Config::default(),
        ) {
            Ok(watcher) => watcher,
            Err(err) => {
                tracing::warn!(%err, "failed to create filesystem watcher");
                return;
            }
        };

        let roots = self.state.read().unwrap().search_roots.clone();
        for root in &roots {
            if root.is_dir() {
                if let Err(err) = watcher.watch(root, RecursiveMode::Recursive) {
                    tracing::warn!(root = %root.display(), %err, "failed to watch root");
                }
            }
        }

        *self.watcher.lock().unwrap() = Some(watcher);
    }

    fn notify_changed(&self) {
        let subscribers = self.subscribers.lock().unwrap();
        for subscriber in subscribers.iter() {
            subscriber();
        }
    }
}

fn debounce_loop(events_rx: Receiver<()>, shared: Weak<RegistryShared>) {
    while events_rx.recv().is_ok() {
        // Wait for the event storm to settle before reloading.
        loop {
            match events_rx.recv_timeout(DEBOUNCE_QUIET_PERIOD) {
                Ok(()) => continue,
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }
        let Some(shared) = shared.upgrade() else {
            return;
        };
        shared.reload();
    }
}

/// Recursively collects `*.json` files under `dir`. A missing or unreadable
/// directory contributes nothing.
fn collect_task_files(dir: &Path, files: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_task_files(&path, files);
        } else if path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
}
