// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Binding queue
//!
//! Key-partitioned work queue for operations that need exclusive access to a
//! binding context (a connection's metadata and binder).
//!
//! ## Overview
//!
//! - One dispatcher task drains the queue and routes items to per-key lanes
//! - A lane runs its items in enqueue order, one at a time
//! - Lanes for different keys run concurrently
//! - Bind operations run on blocking worker threads under a timeout
//!
//! ## Item lifecycle
//!
//! ```text
//! Queued → Running → Completed
//!                  → TimedOut   (lock wait or binding timeout)
//!                  → Faulted    (error or panic)
//!        → Canceled            (token canceled, queue cleared or closed)
//! ```
//!
//! A timed-out worker is abandoned, not killed. Its cancellation token is
//! canceled and it keeps the context lock until it returns, so the next item
//! for the same key waits for it (bounded by that item's lock timeout).
//!
//! ## Example
//!
//! ```rust,ignore
//! let queue: BindingQueue<MyContext> = BindingQueue::new();
//! let handle = queue
//!     .queue_binding_operation(
//!         BindingRequest::new("conn-key", |ctx: &MyContext, _token| Ok(ctx.lookup()))
//!             .with_timeout_operation(|_ctx| Vec::new()),
//!     )
//!     .expect("operation given");
//! let items = handle.wait().await?;
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default time a bind operation may run
pub const DEFAULT_BINDING_TIMEOUT: Duration = Duration::from_millis(500);

/// Default time an item waits for its context lock
pub const DEFAULT_WAIT_FOR_LOCK_TIMEOUT: Duration = Duration::from_secs(60);

/// Operation run against a binding context
pub type BindOperation<C, R> =
    Box<dyn FnOnce(&C, &CancellationToken) -> anyhow::Result<R> + Send + 'static>;

/// Fallback producing a result when the lock wait or the operation times out
pub type TimeoutOperation<C, R> = Box<dyn FnOnce(&C) -> R + Send + 'static>;

/// Fallback producing a result when the operation fails
pub type ErrorHandler<R> = Box<dyn FnOnce(anyhow::Error) -> R + Send + 'static>;

/// State held behind one queue key
pub trait BindingContext: Send + Sync + 'static {
    /// Build the context for a key the queue has not seen yet
    fn create(key: &str) -> Self;
}

/// Why an item produced no value
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindingError {
    /// The context lock wasn't acquired in time
    #[error("timed out after {waited:?} waiting for binding context '{key}'")]
    LockTimeout { key: String, waited: Duration },

    /// The operation ran past its binding timeout
    #[error("binding operation on '{key}' timed out after {after:?}")]
    TimedOut { key: String, after: Duration },

    /// The operation returned an error or panicked
    #[error("binding operation on '{key}' failed: {message}")]
    Faulted { key: String, message: String },

    /// The item was canceled before it ran
    #[error("binding operation was canceled")]
    Canceled,

    /// The queue processor has been stopped
    #[error("binding queue is closed")]
    QueueClosed,
}

impl BindingError {
    /// True for both lock and binding timeouts
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            BindingError::LockTimeout { .. } | BindingError::TimedOut { .. }
        )
    }
}

/// Where an item is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ItemState {
    Queued,
    Running,
    Completed,
    TimedOut,
    Faulted,
    Canceled,
}

impl ItemState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ItemState::Queued,
            1 => ItemState::Running,
            2 => ItemState::Completed,
            3 => ItemState::TimedOut,
            4 => ItemState::Faulted,
            _ => ItemState::Canceled,
        }
    }

    /// True once the item has produced its outcome
    pub fn is_finished(self) -> bool {
        !matches!(self, ItemState::Queued | ItemState::Running)
    }
}

/// Final state of an item and the value it produced
///
/// `result` is `Ok` for a normal result and also when a timeout operation or
/// error handler supplied the value; `state` tells which path produced it.
#[derive(Debug)]
pub struct BindingOutcome<R> {
    pub state: ItemState,
    pub result: Result<R, BindingError>,
}

/// Timeouts applied to requests that don't set their own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSettings {
    pub binding_timeout: Duration,
    pub wait_for_lock_timeout: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            binding_timeout: DEFAULT_BINDING_TIMEOUT,
            wait_for_lock_timeout: DEFAULT_WAIT_FOR_LOCK_TIMEOUT,
        }
    }
}

/// A unit of work to queue against one key
pub struct BindingRequest<C, R> {
    key: String,
    bind_operation: Option<BindOperation<C, R>>,
    timeout_operation: Option<TimeoutOperation<C, R>>,
    error_handler: Option<ErrorHandler<R>>,
    binding_timeout: Option<Duration>,
    wait_for_lock_timeout: Option<Duration>,
    cancellation: Option<CancellationToken>,
}

impl<C, R> BindingRequest<C, R> {
    pub fn new<F>(key: impl Into<String>, bind_operation: F) -> Self
    where
        F: FnOnce(&C, &CancellationToken) -> anyhow::Result<R> + Send + 'static,
    {
        Self {
            bind_operation: Some(Box::new(bind_operation)),
            ..Self::empty(key)
        }
    }

    /// A request with no bind operation; queuing it is a no-op
    pub fn empty(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            bind_operation: None,
            timeout_operation: None,
            error_handler: None,
            binding_timeout: None,
            wait_for_lock_timeout: None,
            cancellation: None,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Builder method: value to return when the item times out
    pub fn with_timeout_operation<F>(mut self, timeout_operation: F) -> Self
    where
        F: FnOnce(&C) -> R + Send + 'static,
    {
        self.timeout_operation = Some(Box::new(timeout_operation));
        self
    }

    /// Builder method: value to return when the operation fails
    pub fn with_error_handler<F>(mut self, error_handler: F) -> Self
    where
        F: FnOnce(anyhow::Error) -> R + Send + 'static,
    {
        self.error_handler = Some(Box::new(error_handler));
        self
    }

    /// Builder method: override the queue's binding timeout
    pub fn with_binding_timeout(mut self, timeout: Duration) -> Self {
        self.binding_timeout = Some(timeout);
        self
    }

    /// Builder method: override the queue's lock timeout
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.wait_for_lock_timeout = Some(timeout);
        self
    }

    /// Builder method: token the caller can cancel
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

impl<C, R> fmt::Debug for BindingRequest<C, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingRequest")
            .field("key", &self.key)
            .field("has_bind_operation", &self.bind_operation.is_some())
            .field("binding_timeout", &self.binding_timeout)
            .field("wait_for_lock_timeout", &self.wait_for_lock_timeout)
            .finish_non_exhaustive()
    }
}

/// Caller's side of a queued item
#[derive(Debug)]
pub struct QueueItemHandle<R> {
    key: String,
    state: Arc<AtomicU8>,
    receiver: oneshot::Receiver<BindingOutcome<R>>,
}

impl<R> QueueItemHandle<R> {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current lifecycle state
    pub fn state(&self) -> ItemState {
        ItemState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Wait for the item to finish
    pub async fn outcome(self) -> BindingOutcome<R> {
        self.receiver.await.unwrap_or_else(|_| closed_outcome())
    }

    /// Wait for the item and return only its result
    pub async fn wait(self) -> Result<R, BindingError> {
        self.outcome().await.result
    }

    /// Take the outcome if the item has finished
    ///
    /// Returns `Some` at most once with the real outcome.
    pub fn try_outcome(&mut self) -> Option<BindingOutcome<R>> {
        match self.receiver.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(closed_outcome()),
        }
    }
}

fn closed_outcome<R>() -> BindingOutcome<R> {
    BindingOutcome {
        state: ItemState::Canceled,
        result: Err(BindingError::QueueClosed),
    }
}

/// Exclusive access to a context outside the queue
///
/// Queue items for the same key wait until the guard is dropped.
pub struct ContextGuard<C> {
    context: Arc<C>,
    _guard: OwnedMutexGuard<()>,
}

impl<C> ContextGuard<C> {
    pub fn context(&self) -> &Arc<C> {
        &self.context
    }
}

impl<C> Deref for ContextGuard<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.context
    }
}

type Work<C> = Box<dyn QueuedWork<C>>;

#[async_trait]
trait QueuedWork<C: BindingContext>: Send {
    fn key(&self) -> &str;

    fn epoch(&self) -> u64;

    async fn run(self: Box<Self>, lane: &Lane<C>);

    /// Finish without running
    fn reject(self: Box<Self>, error: BindingError);
}

struct QueueItem<C, R> {
    key: String,
    epoch: u64,
    bind_operation: BindOperation<C, R>,
    timeout_operation: Option<TimeoutOperation<C, R>>,
    error_handler: Option<ErrorHandler<R>>,
    binding_timeout: Duration,
    wait_for_lock_timeout: Duration,
    token: CancellationToken,
    state: Arc<AtomicU8>,
    completion: oneshot::Sender<BindingOutcome<R>>,
}

/// Run a caller-supplied fallback, mapping a panic to `Faulted`
fn run_fallback<R>(
    key: &str,
    fallback_state: ItemState,
    fallback: impl FnOnce() -> R,
) -> (ItemState, Result<R, BindingError>) {
    match panic::catch_unwind(AssertUnwindSafe(fallback)) {
        Ok(value) => (fallback_state, Ok(value)),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(key, %message, "binding fallback panicked");
            (
                ItemState::Faulted,
                Err(BindingError::Faulted {
                    key: key.to_string(),
                    message,
                }),
            )
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("callback panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("callback panicked: {message}")
    } else {
        "callback panicked".to_string()
    }
}

fn finish<R>(
    state: &AtomicU8,
    completion: oneshot::Sender<BindingOutcome<R>>,
    item_state: ItemState,
    result: Result<R, BindingError>,
) {
    state.store(item_state as u8, Ordering::Release);
    // The caller may have dropped its handle
    let _ = completion.send(BindingOutcome {
        state: item_state,
        result,
    });
}

#[async_trait]
impl<C: BindingContext, R: Send + 'static> QueuedWork<C> for QueueItem<C, R> {
    fn key(&self) -> &str {
        &self.key
    }

    fn epoch(&self) -> u64 {
        self.epoch
    }

    async fn run(self: Box<Self>, lane: &Lane<C>) {
        let QueueItem {
            key,
            bind_operation,
            timeout_operation,
            error_handler,
            binding_timeout,
            wait_for_lock_timeout,
            token,
            state,
            completion,
            ..
        } = *self;

        if token.is_cancelled() {
            debug!(key = %key, "binding operation canceled before start");
            finish(&state, completion, ItemState::Canceled, Err(BindingError::Canceled));
            return;
        }

        let guard =
            match tokio::time::timeout(wait_for_lock_timeout, lane.lock.clone().lock_owned()).await
            {
                Ok(guard) => guard,
                Err(_) => {
                    warn!(key = %key, waited = ?wait_for_lock_timeout, "timed out waiting for binding context");
                    let (item_state, result) = match timeout_operation {
                        Some(on_timeout) => run_fallback(&key, ItemState::TimedOut, || {
                            on_timeout(&lane.context)
                        }),
                        None => (
                            ItemState::TimedOut,
                            Err(BindingError::LockTimeout {
                                key,
                                waited: wait_for_lock_timeout,
                            }),
                        ),
                    };
                    finish(&state, completion, item_state, result);
                    return;
                }
            };

        if token.is_cancelled() {
            debug!(key = %key, "binding operation canceled while waiting for lock");
            finish(&state, completion, ItemState::Canceled, Err(BindingError::Canceled));
            return;
        }

        state.store(ItemState::Running as u8, Ordering::Release);

        let context = lane.context.clone();
        let worker_token = token.child_token();
        let operation_token = worker_token.clone();
        let worker = tokio::task::spawn_blocking(move || {
            // Held until the operation returns, even after a timeout
            let _guard = guard;
            bind_operation(&context, &operation_token)
        });

        let failure = match tokio::time::timeout(binding_timeout, worker).await {
            Ok(Ok(Ok(value))) => {
                finish(&state, completion, ItemState::Completed, Ok(value));
                return;
            }
            Ok(Ok(Err(err))) => err,
            Ok(Err(join_err)) => anyhow::anyhow!("binding operation panicked: {join_err}"),
            Err(_) => {
                worker_token.cancel();
                warn!(key = %key, timeout = ?binding_timeout, "binding operation timed out, abandoning worker");
                let (item_state, result) = match timeout_operation {
                    Some(on_timeout) => run_fallback(&key, ItemState::TimedOut, || {
                        on_timeout(&lane.context)
                    }),
                    None => (
                        ItemState::TimedOut,
                        Err(BindingError::TimedOut {
                            key,
                            after: binding_timeout,
                        }),
                    ),
                };
                finish(&state, completion, item_state, result);
                return;
            }
        };

        warn!(key = %key, error = %format!("{failure:#}"), "binding operation failed");
        let result = match error_handler {
            Some(handler) => run_fallback(&key, ItemState::Faulted, || handler(failure)).1,
            None => Err(BindingError::Faulted {
                key,
                message: format!("{failure:#}"),
            }),
        };
        finish(&state, completion, ItemState::Faulted, result);
    }

    fn reject(self: Box<Self>, error: BindingError) {
        let QueueItem { state, completion, .. } = *self;
        finish(&state, completion, ItemState::Canceled, Err(error));
    }
}

#[derive(Debug, Default)]
struct QueueCounters {
    /// Items accepted and not yet finished
    pending: AtomicUsize,
    /// Bumped by `clear_queue`; older items are canceled
    epoch: AtomicU64,
}

impl QueueCounters {
    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    fn finished_one(&self) {
        self.pending.fetch_sub(1, Ordering::AcqRel);
    }
}

struct Lane<C> {
    key: String,
    context: Arc<C>,
    lock: Arc<Mutex<()>>,
    counters: Arc<QueueCounters>,
    retired: CancellationToken,
}

async fn run_lane<C: BindingContext>(lane: Lane<C>, mut items: mpsc::UnboundedReceiver<Work<C>>) {
    while let Some(item) = items.recv().await {
        if lane.retired.is_cancelled() || item.epoch() < lane.counters.epoch() {
            item.reject(BindingError::Canceled);
        } else {
            item.run(&lane).await;
        }
        lane.counters.finished_one();
    }
    debug!(key = %lane.key, "binding lane stopped");
}

struct ContextEntry<C: BindingContext> {
    context: Arc<C>,
    lock: Arc<Mutex<()>>,
    lane: mpsc::UnboundedSender<Work<C>>,
    retired: CancellationToken,
    last_activity: StdMutex<Instant>,
}

impl<C: BindingContext> ContextEntry<C> {
    fn touch(&self) {
        *self
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }
}

struct Shared<C: BindingContext> {
    contexts: RwLock<HashMap<String, Arc<ContextEntry<C>>>>,
    counters: Arc<QueueCounters>,
    settings: QueueSettings,
}

impl<C: BindingContext> Shared<C> {
    async fn entry(&self, key: &str) -> Arc<ContextEntry<C>> {
        if let Some(entry) = self.contexts.read().await.get(key) {
            entry.touch();
            return entry.clone();
        }

        let mut contexts = self.contexts.write().await;
        let entry = contexts
            .entry(key.to_string())
            .or_insert_with(|| self.spawn_context(key))
            .clone();
        entry.touch();
        entry
    }

    /// Swap out an entry whose lane task has exited
    ///
    /// An entry another caller already put in its place is reused.
    async fn replace_dead_entry(
        &self,
        key: &str,
        dead: &Arc<ContextEntry<C>>,
    ) -> Arc<ContextEntry<C>> {
        let mut contexts = self.contexts.write().await;
        match contexts.get(key) {
            Some(current) if !Arc::ptr_eq(current, dead) => current.clone(),
            _ => {
                dead.retired.cancel();
                let entry = self.spawn_context(key);
                contexts.insert(key.to_string(), entry.clone());
                entry
            }
        }
    }

    fn spawn_context(&self, key: &str) -> Arc<ContextEntry<C>> {
        let context = Arc::new(C::create(key));
        let lock = Arc::new(Mutex::new(()));
        let retired = CancellationToken::new();
        let (sender, receiver) = mpsc::unbounded_channel();

        tokio::spawn(run_lane(
            Lane {
                key: key.to_string(),
                context: context.clone(),
                lock: lock.clone(),
                counters: self.counters.clone(),
                retired: retired.clone(),
            },
            receiver,
        ));

        debug!(key, "created binding context");
        Arc::new(ContextEntry {
            context,
            lock,
            lane: sender,
            retired,
            last_activity: StdMutex::new(Instant::now()),
        })
    }
}

async fn dispatch<C: BindingContext>(
    shared: Arc<Shared<C>>,
    mut receiver: mpsc::UnboundedReceiver<Work<C>>,
) {
    while let Some(item) = receiver.recv().await {
        if item.epoch() < shared.counters.epoch() {
            item.reject(BindingError::Canceled);
            shared.counters.finished_one();
            continue;
        }

        let entry = shared.entry(item.key()).await;
        let Err(mpsc::error::SendError(item)) = entry.lane.send(item) else {
            continue;
        };

        warn!(key = %item.key(), "binding lane is gone, restarting it");
        let entry = shared.replace_dead_entry(item.key(), &entry).await;
        if let Err(mpsc::error::SendError(item)) = entry.lane.send(item) {
            item.reject(BindingError::Canceled);
            shared.counters.finished_one();
        }
    }
    debug!("binding queue dispatcher stopped");
}

/// Key-partitioned queue of binding operations
///
/// Must be created inside a tokio runtime.
pub struct BindingQueue<C: BindingContext> {
    shared: Arc<Shared<C>>,
    sender: StdMutex<Option<mpsc::UnboundedSender<Work<C>>>>,
    dispatcher: StdMutex<Option<JoinHandle<()>>>,
}

impl<C: BindingContext> BindingQueue<C> {
    /// Create a queue with default timeouts and start its dispatcher
    pub fn new() -> Self {
        Self::with_settings(QueueSettings::default())
    }

    /// Create a queue with the given default timeouts
    pub fn with_settings(settings: QueueSettings) -> Self {
        let shared = Arc::new(Shared {
            contexts: RwLock::new(HashMap::new()),
            counters: Arc::new(QueueCounters::default()),
            settings,
        });
        let (sender, receiver) = mpsc::unbounded_channel();
        let dispatcher = tokio::spawn(dispatch(shared.clone(), receiver));

        Self {
            shared,
            sender: StdMutex::new(Some(sender)),
            dispatcher: StdMutex::new(Some(dispatcher)),
        }
    }

    pub fn settings(&self) -> QueueSettings {
        self.shared.settings
    }

    /// Queue a request
    ///
    /// Returns `None`, queuing nothing, when the request has no bind
    /// operation. After [`Self::stop_queue_processor`] the returned handle
    /// resolves to `QueueClosed`.
    pub fn queue_binding_operation<R: Send + 'static>(
        &self,
        request: BindingRequest<C, R>,
    ) -> Option<QueueItemHandle<R>> {
        let BindingRequest {
            key,
            bind_operation,
            timeout_operation,
            error_handler,
            binding_timeout,
            wait_for_lock_timeout,
            cancellation,
        } = request;
        let bind_operation = bind_operation?;

        let (completion, receiver) = oneshot::channel();
        let state = Arc::new(AtomicU8::new(ItemState::Queued as u8));
        let handle = QueueItemHandle {
            key: key.clone(),
            state: state.clone(),
            receiver,
        };

        let item: Work<C> = Box::new(QueueItem {
            key,
            epoch: self.shared.counters.epoch(),
            bind_operation,
            timeout_operation,
            error_handler,
            binding_timeout: binding_timeout.unwrap_or(self.shared.settings.binding_timeout),
            wait_for_lock_timeout: wait_for_lock_timeout
                .unwrap_or(self.shared.settings.wait_for_lock_timeout),
            token: cancellation.unwrap_or_default(),
            state,
            completion,
        });

        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        match sender.as_ref() {
            Some(sender) => {
                self.shared.counters.pending.fetch_add(1, Ordering::AcqRel);
                if let Err(mpsc::error::SendError(item)) = sender.send(item) {
                    self.shared.counters.finished_one();
                    item.reject(BindingError::QueueClosed);
                }
            }
            None => item.reject(BindingError::QueueClosed),
        }

        Some(handle)
    }

    /// Cancel every item that has not started yet
    pub fn clear_queue(&self) {
        let epoch = self.shared.counters.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        info!(epoch, "cleared binding queue");
    }

    /// True when no item is queued or running
    pub fn is_queue_empty(&self) -> bool {
        self.pending_count() == 0
    }

    pub fn pending_count(&self) -> usize {
        self.shared.counters.pending.load(Ordering::Acquire)
    }

    /// Stop accepting work and wait for the dispatcher to drain
    ///
    /// Returns false if the dispatcher didn't stop within `timeout`. Items
    /// already routed to a lane still run.
    pub async fn stop_queue_processor(&self, timeout: Duration) -> bool {
        drop(
            self.sender
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );

        let dispatcher = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(dispatcher) = dispatcher else {
            return true;
        };

        match tokio::time::timeout(timeout, dispatcher).await {
            Ok(_) => {
                info!("binding queue processor stopped");
                true
            }
            Err(_) => {
                warn!(timeout = ?timeout, "binding queue processor did not stop in time");
                false
            }
        }
    }

    /// Context for `key`, created on first use
    pub async fn get_or_create_binding_context(&self, key: &str) -> Arc<C> {
        self.shared.entry(key).await.context.clone()
    }

    pub async fn binding_context_exists(&self, key: &str) -> bool {
        self.shared.contexts.read().await.contains_key(key)
    }

    pub async fn binding_context_keys(&self) -> Vec<String> {
        self.shared.contexts.read().await.keys().cloned().collect()
    }

    /// Every context with its key
    pub async fn binding_contexts(&self) -> Vec<(String, Arc<C>)> {
        self.shared
            .contexts
            .read()
            .await
            .iter()
            .map(|(key, entry)| (key.clone(), entry.context.clone()))
            .collect()
    }

    /// Remove a context
    ///
    /// Items still queued for it are canceled. A running item finishes
    /// against the removed context.
    pub async fn remove_binding_context(&self, key: &str) -> Option<Arc<C>> {
        let entry = self.shared.contexts.write().await.remove(key)?;
        entry.retired.cancel();
        debug!(key, "removed binding context");
        Some(entry.context.clone())
    }

    /// Take exclusive access to a context, creating it if needed
    ///
    /// # Errors
    ///
    /// Returns `LockTimeout` if the lock isn't free within `wait`.
    pub async fn lock_binding_context(
        &self,
        key: &str,
        wait: Duration,
    ) -> Result<ContextGuard<C>, BindingError> {
        let entry = self.shared.entry(key).await;
        let guard = tokio::time::timeout(wait, entry.lock.clone().lock_owned())
            .await
            .map_err(|_| BindingError::LockTimeout {
                key: key.to_string(),
                waited: wait,
            })?;

        Ok(ContextGuard {
            context: entry.context.clone(),
            _guard: guard,
        })
    }

    /// Remove contexts unused for at least `max_idle`
    ///
    /// Contexts whose lock is held are kept. Returns the removed contexts.
    pub async fn prune_idle_contexts(&self, max_idle: Duration) -> Vec<(String, Arc<C>)> {
        let mut contexts = self.shared.contexts.write().await;
        let idle: Vec<String> = contexts
            .iter()
            .filter(|(_, entry)| entry.idle_for() >= max_idle && entry.lock.try_lock().is_ok())
            .map(|(key, _)| key.clone())
            .collect();

        let mut removed = Vec::with_capacity(idle.len());
        for key in idle {
            if let Some(entry) = contexts.remove(&key) {
                entry.retired.cancel();
                removed.push((key, entry.context.clone()));
            }
        }

        if !removed.is_empty() {
            info!(count = removed.len(), "pruned idle binding contexts");
        }
        removed
    }
}

impl<C: BindingContext> Default for BindingQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: BindingContext> fmt::Debug for BindingQueue<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingQueue")
            .field("settings", &self.shared.settings)
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}
