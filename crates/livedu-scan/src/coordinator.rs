//! Single-flight scan coordination and event fan-out.

use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;

use livedu_core::{Node, ScanConfig, ScanError, ScanEvent, ScanProgress};

use crate::estimate::{DuEstimator, SizeEstimator};
use crate::limiter::ConcurrencyLimiter;
use crate::progress::ProgressCounters;
use crate::walker::{FillContext, TreeWalker};
use crate::working::WorkingTree;

/// Owns at most one active scan and fans its events out to subscribers.
///
/// Requesting the path that is already being scanned attaches to the
/// running scan; requesting any other path cancels it and starts over.
/// The scan runs on its own task, so it outlives any subscriber.
///
/// Cloning a coordinator yields another handle to the same state.
#[derive(Clone)]
pub struct ScanCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    walker: TreeWalker,
    active: Mutex<Option<Arc<ScanShared>>>,
    next_scan_id: AtomicU64,
    walker_starts: AtomicU64,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(scan) = self.active.get_mut().take() {
            scan.supersede();
        }
    }
}

impl ScanCoordinator {
    /// Create a coordinator using `du` for estimates past the depth limit.
    pub fn new(config: ScanConfig) -> Result<Self, ScanError> {
        let estimator = Arc::new(DuEstimator::new(config.estimate_timeout));
        Self::with_estimator(config, estimator)
    }

    /// Create a coordinator with a custom size estimator.
    pub fn with_estimator(
        config: ScanConfig,
        estimator: Arc<dyn SizeEstimator>,
    ) -> Result<Self, ScanError> {
        let limiter = Arc::new(ConcurrencyLimiter::new(config.concurrency));
        let walker = TreeWalker::new(config, limiter, estimator)?;
        Ok(Self {
            inner: Arc::new(Inner {
                walker,
                active: Mutex::new(None),
                next_scan_id: AtomicU64::new(1),
                walker_starts: AtomicU64::new(0),
            }),
        })
    }

    /// Configuration shared by every scan of this coordinator.
    pub fn config(&self) -> &ScanConfig {
        self.inner.walker.config()
    }

    /// Start a scan of `path` with the configured depth limit, or attach
    /// to the one already running.
    ///
    /// A new scan is started when there is no scan, when the active scan is
    /// for another path, or when it was cancelled or finished with an error.
    /// Otherwise the existing scan (running or successfully done) is
    /// returned and nothing new is started.
    pub async fn request_scan(&self, path: impl AsRef<Path>) -> Result<ScanHandle, ScanError> {
        self.start_scan(path, self.config().max_depth).await
    }

    /// Like [`request_scan`](Self::request_scan) with an explicit depth limit.
    ///
    /// Scans are identified by path alone: attaching to a running scan keeps
    /// that scan's depth limit.
    pub async fn start_scan(
        &self,
        path: impl AsRef<Path>,
        max_depth: u32,
    ) -> Result<ScanHandle, ScanError> {
        let path = self.inner.walker.check_root(path.as_ref()).await?;

        let mut active = self.inner.active.lock();
        if let Some(current) = active.as_ref() {
            if current.path == path && current.is_reusable() {
                tracing::debug!(path = %path.display(), scan = current.id, "attaching to existing scan");
                return Ok(ScanHandle {
                    scan: current.clone(),
                });
            }
            tracing::info!(
                old = %current.path.display(),
                new = %path.display(),
                scan = current.id,
                "superseding scan"
            );
            current.supersede();
        }

        let id = self.inner.next_scan_id.fetch_add(1, Ordering::Relaxed);
        let scan = Arc::new(ScanShared::new(id, path, max_depth));
        self.inner.walker_starts.fetch_add(1, Ordering::Relaxed);
        spawn_scan(self.inner.walker.clone(), scan.clone());
        *active = Some(scan.clone());

        Ok(ScanHandle { scan })
    }

    /// Subscribe to the current scan, if there is one.
    pub fn subscribe(&self) -> Option<Subscription> {
        self.current().map(|handle| handle.subscribe())
    }

    /// Handle to the current scan, if there is one.
    pub fn current(&self) -> Option<ScanHandle> {
        self.inner
            .active
            .lock()
            .as_ref()
            .map(|scan| ScanHandle { scan: scan.clone() })
    }

    /// Cancel the current scan without starting another.
    ///
    /// Its subscribers receive no further events.
    pub fn cancel(&self) {
        if let Some(scan) = self.inner.active.lock().as_ref() {
            tracing::info!(path = %scan.path.display(), scan = scan.id, "cancelling scan");
            scan.supersede();
        }
    }

    /// One-shot scan of a single subtree, independent of the active scan.
    ///
    /// Shares the concurrency limiter with streaming scans.
    pub async fn expand_subtree(
        &self,
        path: impl AsRef<Path>,
        max_depth: u32,
    ) -> Result<Node, ScanError> {
        let path = self.inner.walker.check_root(path.as_ref()).await?;
        Ok(self.inner.walker.walk(&path, max_depth).await)
    }

    /// Number of walkers started over this coordinator's lifetime.
    pub fn walker_starts(&self) -> u64 {
        self.inner.walker_starts.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for ScanCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanCoordinator")
            .field("walker", &self.inner.walker)
            .field("walker_starts", &self.walker_starts())
            .finish_non_exhaustive()
    }
}

/// Handle to one scan.
#[derive(Debug, Clone)]
pub struct ScanHandle {
    scan: Arc<ScanShared>,
}

impl ScanHandle {
    /// Scan identifier, unique within its coordinator.
    pub fn id(&self) -> u64 {
        self.scan.id
    }

    /// Depth limit of this scan.
    pub fn max_depth(&self) -> u32 {
        self.scan.max_depth
    }

    /// Canonical root path being scanned.
    pub fn path(&self) -> &Path {
        &self.scan.path
    }

    /// Subscribe to this scan's events.
    ///
    /// The current state is delivered right away: the latest snapshot and
    /// progress while running, or the terminal event once finished. A
    /// subscription to a cancelled scan yields nothing.
    pub fn subscribe(&self) -> Subscription {
        self.scan.subscribe()
    }

    /// Whether the scan finished, successfully or not.
    pub fn is_done(&self) -> bool {
        self.scan.state.lock().done
    }

    /// Whether the scan was cancelled or superseded.
    pub fn is_cancelled(&self) -> bool {
        self.scan.cancel.is_cancelled()
    }

    /// Error message, if the scan failed.
    pub fn error(&self) -> Option<String> {
        self.scan.state.lock().error.clone()
    }

    /// Latest published progress.
    pub fn progress(&self) -> ScanProgress {
        self.scan.state.lock().last_progress
    }

    /// Latest published tree.
    pub fn snapshot(&self) -> Option<Arc<Node>> {
        self.scan.state.lock().last_snapshot.clone()
    }
}

/// A stream of [`ScanEvent`]s for one scan.
///
/// Ends after `Done` or `Error`, or silently if the scan is cancelled.
/// Dropping the subscription unsubscribes; the scan keeps running.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<ScanEvent>,
    scan: Weak<ScanShared>,
}

impl Subscription {
    /// Receive the next event, or `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<ScanEvent> {
        self.rx.recv().await
    }

    /// Receive an event if one is already queued.
    pub fn try_recv(&mut self) -> Option<ScanEvent> {
        self.rx.try_recv().ok()
    }

    /// Stop receiving events. Equivalent to dropping the subscription.
    pub fn unsubscribe(self) {}
}

impl Stream for Subscription {
    type Item = ScanEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(scan) = self.scan.upgrade() {
            scan.state
                .lock()
                .subscribers
                .retain(|(id, _)| *id != self.id);
        }
    }
}

/// State shared between a scan's task, its handles and subscriptions.
#[derive(Debug)]
struct ScanShared {
    id: u64,
    path: PathBuf,
    max_depth: u32,
    cancel: CancellationToken,
    state: Mutex<ScanState>,
}

#[derive(Debug, Default)]
struct ScanState {
    last_snapshot: Option<Arc<Node>>,
    last_progress: ScanProgress,
    done: bool,
    error: Option<String>,
    subscribers: Vec<(u64, mpsc::UnboundedSender<ScanEvent>)>,
    next_subscriber: u64,
}

impl ScanState {
    fn broadcast(&mut self, event: &ScanEvent) {
        self.subscribers
            .retain(|(_, tx)| tx.send(event.clone()).is_ok());
    }

    /// Events that bring a new subscriber up to date.
    fn catch_up(&self) -> Option<ScanEvent> {
        if let Some(message) = &self.error {
            return Some(ScanEvent::Error {
                message: message.clone(),
            });
        }
        let tree = self.last_snapshot.clone()?;
        Some(if self.done {
            ScanEvent::Done { tree }
        } else {
            ScanEvent::progress(tree, self.last_progress)
        })
    }
}

impl ScanShared {
    fn new(id: u64, path: PathBuf, max_depth: u32) -> Self {
        Self {
            id,
            path,
            max_depth,
            cancel: CancellationToken::new(),
            state: Mutex::new(ScanState::default()),
        }
    }

    /// Running, or finished successfully.
    fn is_reusable(&self) -> bool {
        !self.cancel.is_cancelled() && self.state.lock().error.is_none()
    }

    fn subscribe(self: &Arc<Self>) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock();
        let id = state.next_subscriber;
        state.next_subscriber += 1;

        if !self.cancel.is_cancelled() {
            if let Some(event) = state.catch_up() {
                let _ = tx.send(event);
            }
            // Finished scans send nothing more; dropping `tx` ends the stream.
            if !state.done {
                state.subscribers.push((id, tx));
            }
        }

        Subscription {
            id,
            rx,
            scan: Arc::downgrade(self),
        }
    }

    /// Cancel the scan and close every subscriber's stream.
    ///
    /// Cancelling under the state lock means no publish can slip in after
    /// subscribers have been dropped.
    fn supersede(&self) {
        let mut state = self.state.lock();
        self.cancel.cancel();
        state.subscribers.clear();
    }

    fn publish_progress(&self, tree: Node, progress: ScanProgress) {
        let mut state = self.state.lock();
        if self.cancel.is_cancelled() || state.done {
            return;
        }
        let tree = Arc::new(tree);
        state.last_snapshot = Some(tree.clone());
        state.last_progress = progress;
        state.broadcast(&ScanEvent::progress(tree, progress));
    }

    fn finish(&self, result: Result<Node, String>, progress: ScanProgress) {
        let mut state = self.state.lock();
        if self.cancel.is_cancelled() || state.done {
            return;
        }
        state.done = true;
        state.last_progress = progress;
        let event = match result {
            Ok(tree) => {
                let tree = Arc::new(tree);
                state.last_snapshot = Some(tree.clone());
                ScanEvent::Done { tree }
            }
            Err(message) => {
                state.error = Some(message.clone());
                ScanEvent::Error { message }
            }
        };
        state.broadcast(&event);
        state.subscribers.clear();
    }
}

/// Run a scan on its own task, reporting a panicking walk as an error.
fn spawn_scan(walker: TreeWalker, scan: Arc<ScanShared>) {
    tokio::spawn(async move {
        let task = tokio::spawn(run_scan(walker, scan.clone()));
        match task.await {
            Err(err) if err.is_panic() => {
                tracing::warn!(path = %scan.path.display(), error = %err, "scan task panicked");
                scan.finish(Err(format!("Scan failed: {err}")), ScanProgress::default());
            }
            _ => {}
        }
    });
}

async fn run_scan(walker: TreeWalker, scan: Arc<ScanShared>) {
    let started = Instant::now();
    tracing::info!(path = %scan.path.display(), scan = scan.id, "scan started");

    if let Err(err) = walker.check_root(&scan.path).await {
        tracing::warn!(path = %scan.path.display(), error = %err, "scan root unavailable");
        scan.finish(Err(err.to_string()), ScanProgress::default());
        return;
    }

    let config = walker.config();
    let snapshotter = walker.snapshotter();
    let tree = Mutex::new(WorkingTree::new(Node::root(&scan.path)));
    let counters = ProgressCounters::new();
    let dirty = AtomicBool::new(false);
    let on_change = || dirty.store(true, Ordering::Release);
    let cx = FillContext {
        tree: &tree,
        max_depth: scan.max_depth,
        on_change: &on_change,
        progress: &counters,
        cancel: &scan.cancel,
    };

    counters.record_found();
    let mut walk = walker.fill(&cx, WorkingTree::root_id(), scan.path.clone(), 0);

    let period = config.tick_interval;
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = scan.cancel.cancelled() => {
                tracing::debug!(path = %scan.path.display(), scan = scan.id, "scan cancelled");
                return;
            }
            _ = &mut walk => break,
            _ = ticker.tick() => {
                if dirty.swap(false, Ordering::AcqRel) {
                    let snapshot = snapshotter.snapshot(&tree);
                    scan.publish_progress(snapshot, counters.snapshot());
                }
            }
        }
    }

    let progress = counters.snapshot();
    let tree = snapshotter.snapshot(&tree);
    tracing::info!(
        path = %scan.path.display(),
        scan = scan.id,
        size = tree.size,
        dirs = progress.dirs_completed,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "scan finished"
    );
    scan.finish(Ok(tree), progress);
}
