//! Bounded, deduplicating thumbnail scheduler
//!
//! Requests are answered from the cache on the submitting thread when
//! possible. Misses become jobs keyed by fingerprint, target size and resize
//! mode; a second request for a key that is already queued or running attaches
//! to the existing job instead of generating again.
//!
//! Jobs wait in two FIFO queues, visible before prefetch. Every new job hands
//! one task to the rayon pool, and each task claims whichever runnable job has
//! the highest priority at the moment it starts, so a visible request that
//! arrives late still overtakes queued prefetch work.
//!
//! Results stream out of [`ThumbnailScheduler::results`] in completion order.
//! Requests whose waiters were all cancelled are dropped before decoding.

use crate::error::{ErrorKind, ThumbnailError};
use crate::fingerprint::Fingerprint;
use crate::generate::{
    source_dimensions, Generate, ImageGenerator, ResizeMode, TargetSize, ThumbnailFormat,
};
use crate::source::SourceFile;
use crate::store::{CacheEntry, CacheStore};
use crate::ThumbnailConfig;
use crossbeam_channel::{unbounded, Receiver, Sender};
use image::{DynamicImage, GenericImageView};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

pub type RequestId = u64;

/// Visible items are served before prefetch work
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Prefetch,
    Visible,
}

#[derive(Debug, Clone)]
pub struct ThumbnailRequest {
    pub source: SourceFile,
    pub target: TargetSize,
    pub mode: ResizeMode,
    pub priority: Priority,
}

impl ThumbnailRequest {
    pub fn new(source: SourceFile, target: TargetSize, mode: ResizeMode) -> Self {
        Self {
            source,
            target,
            mode,
            priority: Priority::Visible,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

/// Lifecycle of one request
///
/// `Pending -> CacheHit -> Delivered` on the fast path,
/// `Pending -> Queued -> Running -> Delivered | Failed` otherwise.
/// Any non-terminal state may move to `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestState {
    Pending,
    CacheHit,
    Queued,
    Running,
    Delivered,
    Failed,
    Cancelled,
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestState::Delivered | RequestState::Failed | RequestState::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provenance {
    CacheHit,
    Generated,
}

#[derive(Debug, Clone)]
pub struct ThumbnailResult {
    pub request_id: RequestId,
    pub fingerprint: Fingerprint,
    pub path: PathBuf,
    pub bitmap: Arc<DynamicImage>,
    pub provenance: Provenance,
    /// False when the thumbnail only lives in memory (degraded store or failed write)
    pub persisted: bool,
}

impl ThumbnailResult {
    pub fn dimensions(&self) -> (u32, u32) {
        self.bitmap.dimensions()
    }
}

#[derive(Debug, Clone)]
pub struct ThumbnailFailure {
    pub request_id: RequestId,
    pub path: PathBuf,
    /// Absent when the source could not even be fingerprinted
    pub fingerprint: Option<Fingerprint>,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone)]
pub enum ThumbnailEvent {
    Ready(ThumbnailResult),
    Failed(ThumbnailFailure),
}

impl ThumbnailEvent {
    pub fn request_id(&self) -> RequestId {
        match self {
            ThumbnailEvent::Ready(result) => result.request_id,
            ThumbnailEvent::Failed(failure) => failure.request_id,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            ThumbnailEvent::Ready(result) => &result.path,
            ThumbnailEvent::Failed(failure) => &failure.path,
        }
    }
}

/// Counter snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub submitted: usize,
    pub cache_hits: usize,
    /// Generator invocations
    pub generated: usize,
    /// Requests that attached to a job already in flight
    pub deduplicated: usize,
    pub delivered: usize,
    pub failed: usize,
    pub cancelled: usize,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicUsize,
    cache_hits: AtomicUsize,
    generated: AtomicUsize,
    deduplicated: AtomicUsize,
    delivered: AtomicUsize,
    failed: AtomicUsize,
    cancelled: AtomicUsize,
}

impl Counters {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> SchedulerStats {
        SchedulerStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            generated: self.generated.load(Ordering::Relaxed),
            deduplicated: self.deduplicated.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct JobKey {
    fingerprint: Fingerprint,
    target: TargetSize,
    mode: ResizeMode,
}

struct InFlight {
    source: SourceFile,
    waiters: Vec<RequestId>,
    priority: Priority,
    running: bool,
}

struct Tracked {
    path: PathBuf,
    state: RequestState,
}

#[derive(Default)]
struct SchedulerState {
    requests: HashMap<RequestId, Tracked>,
    jobs: HashMap<JobKey, InFlight>,
    visible: VecDeque<JobKey>,
    prefetch: VecDeque<JobKey>,
}

impl SchedulerState {
    fn pop_job(&mut self) -> Option<JobKey> {
        self.visible.pop_front().or_else(|| self.prefetch.pop_front())
    }
}

type Outcome = Result<(Arc<DynamicImage>, Provenance, bool), ThumbnailError>;

struct Shared {
    store: Arc<CacheStore>,
    generator: Arc<dyn Generate>,
    format: ThumbnailFormat,
    state: Mutex<SchedulerState>,
    events: Sender<ThumbnailEvent>,
    counters: Counters,
}

/// Accepts thumbnail requests and streams results back
pub struct ThumbnailScheduler {
    shared: Arc<Shared>,
    pool: rayon::ThreadPool,
    results: Receiver<ThumbnailEvent>,
    next_id: AtomicU64,
    workers: usize,
}

impl ThumbnailScheduler {
    /// Scheduler backed by the production image generator
    pub fn new(store: Arc<CacheStore>, config: &ThumbnailConfig) -> Result<Self, ThumbnailError> {
        Self::with_generator(store, Arc::new(ImageGenerator), config)
    }

    pub fn with_generator(
        store: Arc<CacheStore>,
        generator: Arc<dyn Generate>,
        config: &ThumbnailConfig,
    ) -> Result<Self, ThumbnailError> {
        let workers = config.worker_count();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("thumb-worker-{}", i))
            .build()?;
        let (events, results) = unbounded();

        debug!(workers, format = %config.format, "thumbnail scheduler started");
        Ok(Self {
            shared: Arc::new(Shared {
                store,
                generator,
                format: config.format,
                state: Mutex::new(SchedulerState::default()),
                events,
                counters: Counters::default(),
            }),
            pool,
            results,
            next_id: AtomicU64::new(1),
            workers,
        })
    }

    /// Submit one request. Never blocks on decoding or generation.
    ///
    /// The outcome arrives as exactly one event on [`results`](Self::results),
    /// unless the request is cancelled first.
    pub fn submit(&self, request: ThumbnailRequest) -> RequestId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let shared = &self.shared;
        Counters::bump(&shared.counters.submitted);
        shared.state.lock().requests.insert(
            id,
            Tracked {
                path: request.source.path.clone(),
                state: RequestState::Pending,
            },
        );

        let fingerprint = match Fingerprint::resolve(&request.source) {
            Ok(fingerprint) => fingerprint,
            Err(e) => {
                shared.fail(&[id], &request.source.path, None, &e);
                return id;
            }
        };
        let key = JobKey {
            fingerprint,
            target: request.target,
            mode: request.mode,
        };

        if let Some((entry, bitmap)) = shared.cached(&key, &request.source.path) {
            Counters::bump(&shared.counters.cache_hits);
            shared.transition(id, RequestState::CacheHit);
            shared.deliver(
                &[id],
                &key.fingerprint,
                &request.source.path,
                bitmap,
                Provenance::CacheHit,
                entry.path.is_some(),
            );
            return id;
        }

        let spawn = {
            let mut guard = shared.state.lock();
            let state = &mut *guard;
            // Cancelled while the cache was being checked
            match state.requests.get(&id) {
                Some(tracked) if tracked.state == RequestState::Pending => {}
                _ => return id,
            }

            match state.jobs.get_mut(&key) {
                Some(job) => {
                    Counters::bump(&shared.counters.deduplicated);
                    job.waiters.push(id);
                    if job.running {
                        set_state(&mut state.requests, id, RequestState::Running);
                    } else {
                        set_state(&mut state.requests, id, RequestState::Queued);
                        if request.priority > job.priority {
                            // The stale prefetch entry is skipped once this one is claimed
                            job.priority = request.priority;
                            state.visible.push_back(key.clone());
                        }
                    }
                    trace!(request = id, source = %request.source.path.display(), "attached to in-flight job");
                    false
                }
                None => {
                    set_state(&mut state.requests, id, RequestState::Queued);
                    match request.priority {
                        Priority::Visible => state.visible.push_back(key.clone()),
                        Priority::Prefetch => state.prefetch.push_back(key.clone()),
                    }
                    state.jobs.insert(
                        key,
                        InFlight {
                            source: request.source,
                            waiters: vec![id],
                            priority: request.priority,
                            running: false,
                        },
                    );
                    true
                }
            }
        };

        if spawn {
            let shared = Arc::clone(&self.shared);
            self.pool.spawn(move || shared.run_next());
        }
        id
    }

    pub fn submit_all(&self, requests: impl IntoIterator<Item = ThumbnailRequest>) -> Vec<RequestId> {
        requests.into_iter().map(|request| self.submit(request)).collect()
    }

    /// Cancel a request. Returns false when it already finished or is unknown.
    ///
    /// A job is dropped before decoding once all of its requests are cancelled.
    /// A job that is already running completes and is still cached.
    pub fn cancel(&self, id: RequestId) -> bool {
        let mut state = self.shared.state.lock();
        self.shared.cancel_locked(&mut state, id)
    }

    pub fn cancel_many(&self, ids: impl IntoIterator<Item = RequestId>) -> usize {
        let mut state = self.shared.state.lock();
        ids.into_iter()
            .filter(|id| self.shared.cancel_locked(&mut state, *id))
            .count()
    }

    pub fn cancel_all(&self) -> usize {
        let mut state = self.shared.state.lock();
        let ids: Vec<RequestId> = state.requests.keys().copied().collect();
        ids.into_iter()
            .filter(|id| self.shared.cancel_locked(&mut state, *id))
            .count()
    }

    pub fn state(&self, id: RequestId) -> Option<RequestState> {
        self.shared.state.lock().requests.get(&id).map(|t| t.state)
    }

    /// Path of a tracked request
    pub fn request_path(&self, id: RequestId) -> Option<PathBuf> {
        self.shared.state.lock().requests.get(&id).map(|t| t.path.clone())
    }

    /// Forget requests in a terminal state. Returns how many were dropped.
    pub fn prune_finished(&self) -> usize {
        let mut state = self.shared.state.lock();
        let before = state.requests.len();
        state.requests.retain(|_, tracked| !tracked.state.is_terminal());
        before - state.requests.len()
    }

    /// Jobs queued or running
    pub fn in_flight(&self) -> usize {
        self.shared.state.lock().jobs.len()
    }

    /// The result stream. All clones share one queue.
    pub fn results(&self) -> Receiver<ThumbnailEvent> {
        self.results.clone()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.shared.counters.snapshot()
    }

    pub fn worker_count(&self) -> usize {
        self.workers
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.shared.store
    }
}

impl std::fmt::Debug for ThumbnailScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThumbnailScheduler")
            .field("workers", &self.workers)
            .field("stats", &self.stats())
            .finish()
    }
}

fn set_state(requests: &mut HashMap<RequestId, Tracked>, id: RequestId, state: RequestState) {
    if let Some(tracked) = requests.get_mut(&id) {
        tracked.state = state;
    }
}

impl Shared {
    /// Cached thumbnail for `key`, if present and sized for the request.
    ///
    /// The store holds one entry per fingerprint, whatever size it was made
    /// for. A fit entry depends on the source's aspect ratio, so the source
    /// header is read to tell which size the request should get.
    fn cached(&self, key: &JobKey, source: &Path) -> Option<(CacheEntry, Arc<DynamicImage>)> {
        let (entry, bitmap) = self.store.load(&key.fingerprint)?;
        let expected = match key.mode {
            ResizeMode::Crop => Some((key.target.width, key.target.height)),
            ResizeMode::Fit => {
                source_dimensions(source).map(|dims| key.mode.output_dimensions(dims, key.target))
            }
        };
        if expected == Some((entry.width, entry.height)) {
            return Some((entry, bitmap));
        }

        debug!(
            fingerprint = %key.fingerprint,
            cached = %TargetSize::new(entry.width, entry.height),
            wanted = %key.target,
            mode = %key.mode,
            "cached thumbnail does not match the request; regenerating"
        );
        None
    }

    fn transition(&self, id: RequestId, next: RequestState) {
        let mut state = self.state.lock();
        if let Some(tracked) = state.requests.get_mut(&id) {
            if !tracked.state.is_terminal() {
                tracked.state = next;
            }
        }
    }

    fn cancel_locked(&self, state: &mut SchedulerState, id: RequestId) -> bool {
        match state.requests.get_mut(&id) {
            Some(tracked) if !tracked.state.is_terminal() => {
                tracked.state = RequestState::Cancelled;
                Counters::bump(&self.counters.cancelled);
                true
            }
            _ => false,
        }
    }

    /// Pool task body: claim the best runnable job and run it
    fn run_next(&self) {
        if let Some((key, source)) = self.claim_next() {
            self.run_job(key, source);
        }
    }

    fn claim_next(&self) -> Option<(JobKey, SourceFile)> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        while let Some(key) = state.pop_job() {
            // Promoted jobs appear in both queues; the second pop finds them gone or running
            let Some(job) = state.jobs.get_mut(&key) else {
                continue;
            };
            if job.running {
                continue;
            }

            let requests = &state.requests;
            job.waiters.retain(|id| {
                requests
                    .get(id)
                    .is_some_and(|tracked| tracked.state == RequestState::Queued)
            });
            if job.waiters.is_empty() {
                debug!(source = %job.source.path.display(), "all requests cancelled; skipping");
                state.jobs.remove(&key);
                continue;
            }

            job.running = true;
            for id in &job.waiters {
                set_state(&mut state.requests, *id, RequestState::Running);
            }
            return Some((key, job.source.clone()));
        }
        None
    }

    fn run_job(&self, key: JobKey, source: SourceFile) {
        // Another job may have filled the cache since this one was queued
        let outcome = match self.cached(&key, &source.path) {
            Some((entry, bitmap)) => {
                Counters::bump(&self.counters.cache_hits);
                Ok((bitmap, Provenance::CacheHit, entry.path.is_some()))
            }
            None => self.generate(&key, &source),
        };

        // The job leaves the table only after the store holds its result, so a
        // request that misses the table afterwards is guaranteed a cache hit
        let waiters = self
            .state
            .lock()
            .jobs
            .remove(&key)
            .map(|job| job.waiters)
            .unwrap_or_default();

        match outcome {
            Ok((bitmap, provenance, persisted)) => self.deliver(
                &waiters,
                &key.fingerprint,
                &source.path,
                bitmap,
                provenance,
                persisted,
            ),
            Err(e) => self.fail(&waiters, &source.path, Some(&key.fingerprint), &e),
        }
    }

    fn generate(&self, key: &JobKey, source: &SourceFile) -> Outcome {
        Counters::bump(&self.counters.generated);
        let started = std::time::Instant::now();

        let generated = panic::catch_unwind(AssertUnwindSafe(|| {
            self.generator.generate(&source.path, key.target, key.mode)
        }))
        .unwrap_or_else(|_| {
            Err(ThumbnailError::Decode {
                path: source.path.clone(),
                message: "decoder panicked".to_string(),
            })
        });
        let bitmap = Arc::new(generated?);

        let persisted = match self.store.put(&key.fingerprint, &bitmap, self.format) {
            Ok(entry) => entry.path.is_some(),
            Err(e) => {
                warn!("thumbnail for {} kept in memory only: {}", source.path.display(), e);
                false
            }
        };

        debug!(
            source = %source.path.display(),
            size = %key.target,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "generated thumbnail"
        );
        Ok((bitmap, Provenance::Generated, persisted))
    }

    fn deliver(
        &self,
        ids: &[RequestId],
        fingerprint: &Fingerprint,
        path: &Path,
        bitmap: Arc<DynamicImage>,
        provenance: Provenance,
        persisted: bool,
    ) {
        let live = self.finish(ids, RequestState::Delivered);
        for id in live {
            Counters::bump(&self.counters.delivered);
            let result = ThumbnailResult {
                request_id: id,
                fingerprint: fingerprint.clone(),
                path: path.to_path_buf(),
                bitmap: Arc::clone(&bitmap),
                provenance,
                persisted,
            };
            self.emit(ThumbnailEvent::Ready(result));
        }
    }

    fn fail(
        &self,
        ids: &[RequestId],
        path: &Path,
        fingerprint: Option<&Fingerprint>,
        error: &ThumbnailError,
    ) {
        warn!("thumbnail failed for {}: {}", path.display(), error);
        let live = self.finish(ids, RequestState::Failed);
        for id in live {
            Counters::bump(&self.counters.failed);
            self.emit(ThumbnailEvent::Failed(ThumbnailFailure {
                request_id: id,
                path: path.to_path_buf(),
                fingerprint: fingerprint.cloned(),
                kind: error.kind(),
                message: error.to_string(),
            }));
        }
    }

    /// Move every non-terminal request in `ids` to `terminal`; returns the ones moved
    fn finish(&self, ids: &[RequestId], terminal: RequestState) -> Vec<RequestId> {
        let mut state = self.state.lock();
        ids.iter()
            .copied()
            .filter(|id| match state.requests.get_mut(id) {
                Some(tracked) if !tracked.state.is_terminal() => {
                    tracked.state = terminal;
                    true
                }
                _ => false,
            })
            .collect()
    }

    fn emit(&self, event: ThumbnailEvent) {
        if self.events.send(event).is_err() {
            trace!("result receiver dropped");
        }
    }
}
