//! Watch mode: re-running the pipeline when the directory tree changes.
//!
//! The controller owns a dynamic set of per-directory subscriptions and a
//! single event loop multiplexing four inputs: filesystem events, the
//! debounce timer, run completion, and the interrupt flag. All watch-set and
//! timer state is mutated only on this loop; the worker thread running a
//! pipeline pass shares nothing with it but the completion channel.

use crossbeam_channel::{after, bounded, never, select, Receiver, Sender};
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::discovery;
use crate::error::Result;

/// Quiet period after the last filesystem event before a run starts.
///
/// A recursive delete arrives as a cascade of individual notifications; the
/// window has to be long enough to absorb the whole cascade so it triggers
/// one run, not one per file.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_secs(1);

/// How often the loop wakes to poll the interrupt flag when nothing else is
/// happening.
const INTERRUPT_POLL: Duration = Duration::from_millis(200);

/// Simplified filesystem event classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Create,
    Remove,
    Rename,
    Other,
}

impl From<EventKind> for ChangeKind {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Create(_) => ChangeKind::Create,
            EventKind::Remove(_) => ChangeKind::Remove,
            EventKind::Modify(ModifyKind::Name(_)) => ChangeKind::Rename,
            _ => ChangeKind::Other,
        }
    }
}

/// The subscription side of a filesystem watcher.
///
/// The controller only ever subscribes single directories; recursion is
/// handled by the watch set itself so that membership stays explicit and
/// per-directory.
pub trait WatchBackend {
    fn watch(&mut self, path: &Path) -> notify::Result<()>;
    fn unwatch(&mut self, path: &Path) -> notify::Result<()>;
}

impl WatchBackend for RecommendedWatcher {
    fn watch(&mut self, path: &Path) -> notify::Result<()> {
        Watcher::watch(self, path, RecursiveMode::NonRecursive)
    }

    fn unwatch(&mut self, path: &Path) -> notify::Result<()> {
        Watcher::unwatch(self, path)
    }
}

/// The set of directories currently subscribed, and the single source of
/// truth for membership decisions (e.g. which side of a rename we saw).
pub struct WatchSet<B> {
    backend: B,
    dirs: BTreeSet<PathBuf>,
}

impl<B: WatchBackend> WatchSet<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            dirs: BTreeSet::new(),
        }
    }

    /// Subscribes every non-hidden directory under (and including) `root`.
    ///
    /// Individual subscription failures are logged and skipped; failing to
    /// enumerate the tree at all is an error.
    pub fn watch_tree(&mut self, root: &Path) -> Result<()> {
        for dir in discovery::subdirectories(root)? {
            if self.dirs.contains(&dir) {
                continue;
            }
            match self.backend.watch(&dir) {
                Ok(()) => {
                    log::debug!("watching {}", dir.display());
                    self.dirs.insert(dir);
                }
                Err(e) => log::warn!("failed to watch {}: {e}", dir.display()),
            }
        }
        Ok(())
    }

    /// Unsubscribes `path` and every watched descendant of it.
    ///
    /// No-op when `path` itself is not watched.
    pub fn remove_tree(&mut self, path: &Path) {
        if !self.dirs.contains(path) {
            return;
        }
        let doomed: Vec<PathBuf> = self
            .dirs
            .iter()
            .filter(|dir| dir.starts_with(path))
            .cloned()
            .collect();
        for dir in doomed {
            // Unwatching a deleted path usually fails; membership is what
            // matters here.
            if let Err(e) = self.backend.unwatch(&dir) {
                log::debug!("unwatch {}: {e}", dir.display());
            }
            log::debug!("unwatching {}", dir.display());
            self.dirs.remove(&dir);
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.dirs.contains(path)
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }

    /// Unsubscribes everything. Called when the controller stops.
    pub fn clear(&mut self) {
        for dir in std::mem::take(&mut self.dirs) {
            let _ = self.backend.unwatch(&dir);
        }
    }
}

/// Drives the debounced watch-and-rerun cycle.
///
/// States are implicit in two flags owned by the loop: a run is in flight
/// (`running`), and a trigger arrived while it was (`rerun_pending`). Two
/// runs never overlap; at most one follow-up run is queued.
pub struct WatchController<B> {
    set: WatchSet<B>,
    events: Receiver<notify::Result<Event>>,
    debounce: Duration,
    runner: Arc<dyn Fn() + Send + Sync>,
    stop: Box<dyn Fn() -> bool + Send>,
}

impl<B: WatchBackend> WatchController<B> {
    pub fn new(
        backend: B,
        events: Receiver<notify::Result<Event>>,
        debounce: Duration,
        runner: Arc<dyn Fn() + Send + Sync>,
        stop: Box<dyn Fn() -> bool + Send>,
    ) -> Self {
        Self {
            set: WatchSet::new(backend),
            events,
            debounce,
            runner,
            stop,
        }
    }

    /// Subscribes the initial tree under `root`.
    pub fn watch_root(&mut self, root: &Path) -> Result<()> {
        self.set.watch_tree(root)
    }

    /// Number of directories currently watched.
    pub fn watched_dirs(&self) -> usize {
        self.set.len()
    }

    /// Runs the event loop until an interrupt is requested or the event
    /// source closes. All subscriptions are dropped on the way out; an
    /// in-flight run is left to finish on its own.
    pub fn run_loop(&mut self) {
        let events = self.events.clone();
        let (done_tx, done_rx) = bounded::<()>(1);
        let idle = never::<Instant>();
        let mut timer: Option<Receiver<Instant>> = None;
        let mut running = false;
        let mut rerun_pending = false;

        loop {
            if (self.stop)() {
                break;
            }
            let timer_rx = match &timer {
                Some(t) => t.clone(),
                None => idle.clone(),
            };
            select! {
                recv(events) -> msg => match msg {
                    Ok(Ok(event)) => {
                        self.apply(&event);
                        // Every event restarts the window, coalescing bursts.
                        timer = Some(after(self.debounce));
                    }
                    Ok(Err(e)) => log::error!("watch stream error: {e}"),
                    Err(_) => break,
                },
                recv(timer_rx) -> _ => {
                    timer = None;
                    if running {
                        rerun_pending = true;
                    } else {
                        running = true;
                        spawn_run(&self.runner, &done_tx);
                    }
                },
                recv(done_rx) -> _ => {
                    running = false;
                    if rerun_pending {
                        rerun_pending = false;
                        running = true;
                        spawn_run(&self.runner, &done_tx);
                    }
                },
                default(INTERRUPT_POLL) => {}
            }
        }

        self.set.clear();
    }

    fn apply(&mut self, event: &Event) {
        let kind = ChangeKind::from(event.kind);
        for path in &event.paths {
            log::debug!("{kind:?} event for {}", path.display());
            match kind {
                ChangeKind::Create => self.add_created(path),
                ChangeKind::Remove => self.set.remove_tree(path),
                // A rename is observed as a single path; which side it is
                // can only be inferred from current membership. Simultaneous
                // bulk renames can misclassify.
                ChangeKind::Rename => {
                    if self.set.contains(path) {
                        self.set.remove_tree(path);
                    } else {
                        self.add_created(path);
                    }
                }
                ChangeKind::Other => {}
            }
        }
    }

    fn add_created(&mut self, path: &Path) {
        if !path.is_dir() || is_hidden(path) {
            return;
        }
        if let Err(e) = self.set.watch_tree(path) {
            log::warn!("failed to watch {}: {e}", path.display());
        }
    }
}

fn spawn_run(runner: &Arc<dyn Fn() + Send + Sync>, done: &Sender<()>) {
    let runner = Arc::clone(runner);
    let done = done.clone();
    std::thread::spawn(move || {
        runner();
        let _ = done.send(());
    });
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use crossbeam_channel::unbounded;
    use notify::event::{CreateKind, RemoveKind, RenameMode};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::thread;

    /// Records subscriptions instead of talking to the OS.
    #[derive(Default, Clone)]
    struct FakeBackend {
        watched: Arc<Mutex<Vec<PathBuf>>>,
        unwatched: Arc<Mutex<Vec<PathBuf>>>,
    }

    impl WatchBackend for FakeBackend {
        fn watch(&mut self, path: &Path) -> notify::Result<()> {
            self.watched.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }

        fn unwatch(&mut self, path: &Path) -> notify::Result<()> {
            self.unwatched.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }
    }

    fn event(kind: EventKind, path: &Path) -> notify::Result<Event> {
        Ok(Event {
            kind,
            paths: vec![path.to_path_buf()],
            attrs: Default::default(),
        })
    }

    fn tree() -> assert_fs::TempDir {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("a/one.go").write_str("").unwrap();
        temp.child("a/b/two.go").write_str("").unwrap();
        temp.child("c/three.go").write_str("").unwrap();
        temp.child(".hidden/four.go").write_str("").unwrap();
        temp
    }

    #[test]
    fn change_kind_classification() {
        assert_eq!(
            ChangeKind::from(EventKind::Create(CreateKind::Folder)),
            ChangeKind::Create
        );
        assert_eq!(
            ChangeKind::from(EventKind::Remove(RemoveKind::Any)),
            ChangeKind::Remove
        );
        assert_eq!(
            ChangeKind::from(EventKind::Modify(ModifyKind::Name(RenameMode::Any))),
            ChangeKind::Rename
        );
        assert_eq!(
            ChangeKind::from(EventKind::Modify(ModifyKind::Any)),
            ChangeKind::Other
        );
        assert_eq!(ChangeKind::from(EventKind::Any), ChangeKind::Other);
    }

    #[test]
    fn watch_tree_subscribes_non_hidden_directories() {
        let temp = tree();
        let backend = FakeBackend::default();
        let mut set = WatchSet::new(backend.clone());
        set.watch_tree(temp.path()).unwrap();

        assert_eq!(set.len(), 4); // root, a, a/b, c
        assert!(set.contains(temp.path()));
        assert!(set.contains(&temp.path().join("a/b")));
        assert!(!set.contains(&temp.path().join(".hidden")));
        assert_eq!(backend.watched.lock().unwrap().len(), 4);
        temp.close().unwrap();
    }

    #[test]
    fn remove_tree_drops_descendants() {
        let temp = tree();
        let backend = FakeBackend::default();
        let mut set = WatchSet::new(backend.clone());
        set.watch_tree(temp.path()).unwrap();

        set.remove_tree(&temp.path().join("a"));
        assert!(!set.contains(&temp.path().join("a")));
        assert!(!set.contains(&temp.path().join("a/b")));
        assert!(set.contains(&temp.path().join("c")));
        assert_eq!(backend.unwatched.lock().unwrap().len(), 2);
        temp.close().unwrap();
    }

    #[test]
    fn remove_tree_ignores_unwatched_paths() {
        let temp = tree();
        let mut set = WatchSet::new(FakeBackend::default());
        set.watch_tree(temp.path()).unwrap();
        let before = set.len();

        set.remove_tree(&temp.path().join(".hidden"));
        set.remove_tree(Path::new("/nowhere/at/all"));
        assert_eq!(set.len(), before);
        temp.close().unwrap();
    }

    #[test]
    fn clear_unsubscribes_everything() {
        let temp = tree();
        let backend = FakeBackend::default();
        let mut set = WatchSet::new(backend.clone());
        set.watch_tree(temp.path()).unwrap();
        let watched = set.len();

        set.clear();
        assert!(set.is_empty());
        assert_eq!(backend.unwatched.lock().unwrap().len(), watched);
        temp.close().unwrap();
    }

    fn controller(
        backend: FakeBackend,
        events: Receiver<notify::Result<Event>>,
        debounce: Duration,
        runs: Arc<AtomicUsize>,
        run_for: Duration,
        stop: Arc<AtomicBool>,
    ) -> WatchController<FakeBackend> {
        WatchController::new(
            backend,
            events,
            debounce,
            Arc::new(move || {
                runs.fetch_add(1, Ordering::SeqCst);
                thread::sleep(run_for);
            }),
            Box::new(move || stop.load(Ordering::SeqCst)),
        )
    }

    #[test]
    fn created_directories_join_the_watch_set() {
        let temp = tree();
        let (_tx, rx) = unbounded();
        let stop = Arc::new(AtomicBool::new(false));
        let mut ctrl = controller(
            FakeBackend::default(),
            rx,
            Duration::from_millis(10),
            Arc::new(AtomicUsize::new(0)),
            Duration::ZERO,
            stop,
        );
        ctrl.watch_root(temp.path()).unwrap();
        let before = ctrl.watched_dirs();

        temp.child("fresh/sub/file.go").write_str("").unwrap();
        ctrl.apply(
            &event(EventKind::Create(CreateKind::Folder), &temp.path().join("fresh"))
                .unwrap(),
        );
        assert_eq!(ctrl.watched_dirs(), before + 2);
        temp.close().unwrap();
    }

    #[test]
    fn created_hidden_directories_are_ignored() {
        let temp = tree();
        let (_tx, rx) = unbounded();
        let stop = Arc::new(AtomicBool::new(false));
        let mut ctrl = controller(
            FakeBackend::default(),
            rx,
            Duration::from_millis(10),
            Arc::new(AtomicUsize::new(0)),
            Duration::ZERO,
            stop,
        );
        ctrl.watch_root(temp.path()).unwrap();
        let before = ctrl.watched_dirs();

        temp.child(".cache/file").write_str("").unwrap();
        ctrl.apply(
            &event(EventKind::Create(CreateKind::Folder), &temp.path().join(".cache"))
                .unwrap(),
        );
        assert_eq!(ctrl.watched_dirs(), before);
        temp.close().unwrap();
    }

    #[test]
    fn rename_direction_follows_membership() {
        let temp = tree();
        let (_tx, rx) = unbounded();
        let stop = Arc::new(AtomicBool::new(false));
        let mut ctrl = controller(
            FakeBackend::default(),
            rx,
            Duration::from_millis(10),
            Arc::new(AtomicUsize::new(0)),
            Duration::ZERO,
            stop,
        );
        ctrl.watch_root(temp.path()).unwrap();
        let rename = EventKind::Modify(ModifyKind::Name(RenameMode::Any));

        // Watched path: treated as the old name disappearing.
        ctrl.apply(&event(rename, &temp.path().join("a")).unwrap());
        assert_eq!(ctrl.watched_dirs(), 2); // root and c

        // Unwatched existing path: treated as the new name appearing.
        temp.child("renamed/file.go").write_str("").unwrap();
        ctrl.apply(&event(rename, &temp.path().join("renamed")).unwrap());
        assert_eq!(ctrl.watched_dirs(), 3);
        temp.close().unwrap();
    }

    #[test]
    fn event_bursts_trigger_exactly_one_run() {
        let (tx, rx) = unbounded();
        let runs = Arc::new(AtomicUsize::new(0));
        let stop = Arc::new(AtomicBool::new(false));
        let mut ctrl = controller(
            FakeBackend::default(),
            rx,
            Duration::from_millis(50),
            runs.clone(),
            Duration::ZERO,
            stop.clone(),
        );
        let handle = thread::spawn(move || ctrl.run_loop());

        // A recursive delete shows up as a cascade of individual events.
        for i in 0..50 {
            let path = PathBuf::from(format!("/watched/tree/file{i}"));
            tx.send(event(EventKind::Remove(RemoveKind::Any), &path))
                .unwrap();
        }
        thread::sleep(Duration::from_millis(600));

        stop.store(true, Ordering::SeqCst);
        handle.join().unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn a_trigger_during_a_run_queues_one_follow_up() {
        let (tx, rx) = unbounded();
        let runs = Arc::new(AtomicUsize::new(0));
        let stop = Arc::new(AtomicBool::new(false));
        let mut ctrl = controller(
            FakeBackend::default(),
            rx,
            Duration::from_millis(50),
            runs.clone(),
            Duration::from_millis(400),
            stop.clone(),
        );
        let handle = thread::spawn(move || ctrl.run_loop());

        let path = PathBuf::from("/watched/tree/file");
        tx.send(event(EventKind::Remove(RemoveKind::Any), &path))
            .unwrap();
        // Let the first run start, then trigger twice more while it is busy.
        thread::sleep(Duration::from_millis(150));
        tx.send(event(EventKind::Remove(RemoveKind::Any), &path))
            .unwrap();
        thread::sleep(Duration::from_millis(20));
        tx.send(event(EventKind::Remove(RemoveKind::Any), &path))
            .unwrap();

        thread::sleep(Duration::from_millis(1200));
        stop.store(true, Ordering::SeqCst);
        handle.join().unwrap();

        // First run plus exactly one coalesced follow-up.
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn stop_unsubscribes_all_watches() {
        let temp = tree();
        let (_tx, rx) = unbounded();
        let backend = FakeBackend::default();
        let runs = Arc::new(AtomicUsize::new(0));
        let stop = Arc::new(AtomicBool::new(false));
        let mut ctrl = controller(
            backend.clone(),
            rx,
            Duration::from_millis(50),
            runs.clone(),
            Duration::ZERO,
            stop.clone(),
        );
        ctrl.watch_root(temp.path()).unwrap();
        let watched = ctrl.watched_dirs();
        assert!(watched > 0);

        let handle = thread::spawn(move || ctrl.run_loop());
        thread::sleep(Duration::from_millis(100));
        stop.store(true, Ordering::SeqCst);
        handle.join().unwrap();

        assert_eq!(backend.unwatched.lock().unwrap().len(), watched);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        temp.close().unwrap();
    }

    #[test]
    fn closed_event_stream_ends_the_loop() {
        let (tx, rx) = unbounded();
        let runs = Arc::new(AtomicUsize::new(0));
        let stop = Arc::new(AtomicBool::new(false));
        let mut ctrl = controller(
            FakeBackend::default(),
            rx,
            Duration::from_millis(50),
            runs,
            Duration::ZERO,
            stop,
        );
        drop(tx);
        let handle = thread::spawn(move || ctrl.run_loop());
        handle.join().unwrap();
    }
}
