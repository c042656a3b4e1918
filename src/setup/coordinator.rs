use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::error::{LayoutError, Result};
use crate::logging::{LogLevel, Logger, SETUP_TARGET, elapsed_us, emit, json_kv, json_str};
use crate::metrics::LayoutMetrics;
use crate::model::ConstraintModel;

use super::queue::CallbackPoster;

/// The active model, shared between the container and setup observers.
pub type SharedModel = Arc<Mutex<ConstraintModel>>;

/// One-shot observer fired after the next completed setup.
pub type SetupObserver = Box<dyn FnOnce(SharedModel) + Send + 'static>;

/// Persistent observer fired for every failed async setup.
pub type FailureObserver = Arc<dyn Fn(&SetupFailure) + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupState {
    PreSetup,
    SetupInProgress,
    PostSetup,
}

/// Why a setup attempt produced no model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupFailure {
    pub epoch: u64,
    pub message: String,
    /// The constraint text was rejected, so retrying the same source fails again.
    pub constraint_error: bool,
}

#[derive(Default)]
struct SetupShared {
    active: RwLock<Option<SharedModel>>,
    epoch: AtomicU64,
    in_flight: Mutex<Option<u64>>,
    layout_requested: AtomicBool,
    observers: Mutex<Vec<SetupObserver>>,
    failure_observers: Mutex<Vec<FailureObserver>>,
    last_failure: Mutex<Option<SetupFailure>>,
}

/// Handle to a background setup worker.
#[derive(Debug)]
pub struct SetupTicket {
    epoch: u64,
    handle: JoinHandle<()>,
}

impl SetupTicket {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Wait for the worker to finish building. Completion itself still has to
    /// be delivered by the callback queue.
    pub fn join(self) -> Result<()> {
        self.handle.join().map_err(|_| LayoutError::SetupPanicked)
    }
}

/// Tracks the active model and at most one current setup attempt.
///
/// Every attempt captures an epoch. Completion is delivered on the host
/// callback queue and only publishes when the epoch is still current, so a
/// newer setup or a detach makes older completions inert.
#[derive(Clone)]
pub struct SetupCoordinator {
    shared: Arc<SetupShared>,
    poster: CallbackPoster,
    logger: Option<Logger>,
    metrics: Option<Arc<Mutex<LayoutMetrics>>>,
}

impl SetupCoordinator {
    pub fn new(poster: CallbackPoster) -> Self {
        Self {
            shared: Arc::new(SetupShared::default()),
            poster,
            logger: None,
            metrics: None,
        }
    }

    pub fn with_logger(mut self, logger: Option<Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_metrics(mut self, metrics: Option<Arc<Mutex<LayoutMetrics>>>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Build a model on a new worker thread.
    pub fn start_async<F>(&self, build: F) -> Result<SetupTicket>
    where
        F: FnOnce() -> Result<ConstraintModel> + Send + 'static,
    {
        let epoch = self.begin()?;
        let started = Instant::now();

        let shared = Arc::clone(&self.shared);
        let poster = self.poster.clone();
        let logger = self.logger.clone();
        let metrics = self.metrics.clone();

        let handle = thread::Builder::new()
            .name(format!("cassowary-setup-{epoch}"))
            .spawn(move || {
                emit(
                    logger.as_ref(),
                    LogLevel::Debug,
                    SETUP_TARGET,
                    "worker_started",
                    [json_kv("epoch", epoch), elapsed_us("spawn_us", started)],
                );
                let built = build();
                emit(
                    logger.as_ref(),
                    LogLevel::Debug,
                    SETUP_TARGET,
                    "worker_finished",
                    [
                        json_kv("epoch", epoch),
                        json_kv("ok", built.is_ok()),
                        elapsed_us("elapsed_us", started),
                    ],
                );

                let posted = Instant::now();
                let delivered = poster.post({
                    let logger = logger.clone();
                    move || {
                        emit(
                            logger.as_ref(),
                            LogLevel::Debug,
                            SETUP_TARGET,
                            "completion_delivered",
                            [json_kv("epoch", epoch), elapsed_us("queue_latency_us", posted)],
                        );
                        complete(&shared, logger.as_ref(), metrics.as_ref(), epoch, built);
                    }
                });
                if !delivered {
                    emit(
                        logger.as_ref(),
                        LogLevel::Warn,
                        SETUP_TARGET,
                        "completion_dropped",
                        [json_kv("epoch", epoch)],
                    );
                }
            })?;

        Ok(SetupTicket { epoch, handle })
    }

    /// Build on the caller's thread and publish immediately.
    pub fn run_sync<F>(&self, build: F) -> Result<SharedModel>
    where
        F: FnOnce() -> Result<ConstraintModel>,
    {
        let epoch = self.begin()?;
        let started = Instant::now();
        match build() {
            Ok(model) => {
                let model = install(&self.shared, self.logger.as_ref(), epoch, model)?;
                record(self.metrics.as_ref(), LayoutMetrics::record_setup_completed);
                let pending = drain(&self.shared.observers)?;
                for observer in pending {
                    let model = Arc::clone(&model);
                    self.poster.post(move || observer(model));
                }
                emit(
                    self.logger.as_ref(),
                    LogLevel::Debug,
                    SETUP_TARGET,
                    "sync_setup_complete",
                    [json_kv("epoch", epoch), elapsed_us("elapsed_us", started)],
                );
                Ok(model)
            }
            Err(err) => {
                clear_in_flight(&self.shared, epoch)?;
                record(self.metrics.as_ref(), LayoutMetrics::record_setup_failed);
                set_failure(&self.shared, epoch, &err)?;
                emit(
                    self.logger.as_ref(),
                    LogLevel::Warn,
                    SETUP_TARGET,
                    "sync_setup_failed",
                    [json_kv("epoch", epoch), json_str("error", err.to_string())],
                );
                Err(err)
            }
        }
    }

    /// Queue `observer` for the next completed setup, or post it straight to
    /// the callback queue when a model is already active.
    pub fn on_setup_complete<F>(&self, observer: F) -> Result<()>
    where
        F: FnOnce(SharedModel) + Send + 'static,
    {
        let mut observers = self
            .shared
            .observers
            .lock()
            .map_err(|_| LayoutError::Poisoned)?;
        match self.active()? {
            Some(model) => {
                self.poster.post(move || observer(model));
            }
            None => observers.push(Box::new(observer)),
        }
        Ok(())
    }

    pub fn on_setup_failed<F>(&self, observer: F) -> Result<()>
    where
        F: Fn(&SetupFailure) + Send + Sync + 'static,
    {
        self.shared
            .failure_observers
            .lock()
            .map_err(|_| LayoutError::Poisoned)?
            .push(Arc::new(observer));
        Ok(())
    }

    /// Invalidate any in-flight setup. Its completion is discarded.
    pub fn detach(&self) -> Result<()> {
        let epoch = self.shared.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        *self
            .shared
            .in_flight
            .lock()
            .map_err(|_| LayoutError::Poisoned)? = None;
        emit(
            self.logger.as_ref(),
            LogLevel::Debug,
            SETUP_TARGET,
            "detached",
            [json_kv("epoch", epoch)],
        );
        Ok(())
    }

    pub fn active(&self) -> Result<Option<SharedModel>> {
        let guard = self.shared.active.read().map_err(|_| LayoutError::Poisoned)?;
        Ok(guard.clone())
    }

    pub fn state(&self) -> Result<SetupState> {
        if self.active()?.is_some() {
            return Ok(SetupState::PostSetup);
        }
        let in_flight = self
            .shared
            .in_flight
            .lock()
            .map_err(|_| LayoutError::Poisoned)?;
        Ok(if in_flight.is_some() {
            SetupState::SetupInProgress
        } else {
            SetupState::PreSetup
        })
    }

    pub fn epoch(&self) -> u64 {
        self.shared.epoch.load(Ordering::Acquire)
    }

    /// Returns whether a completed setup asked for a fresh layout, clearing the flag.
    pub fn take_layout_request(&self) -> bool {
        self.shared.layout_requested.swap(false, Ordering::AcqRel)
    }

    pub fn last_failure(&self) -> Result<Option<SetupFailure>> {
        let guard = self
            .shared
            .last_failure
            .lock()
            .map_err(|_| LayoutError::Poisoned)?;
        Ok(guard.clone())
    }

    fn begin(&self) -> Result<u64> {
        let epoch = self.shared.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        *self
            .shared
            .in_flight
            .lock()
            .map_err(|_| LayoutError::Poisoned)? = Some(epoch);
        record(self.metrics.as_ref(), LayoutMetrics::record_setup_started);
        emit(
            self.logger.as_ref(),
            LogLevel::Debug,
            SETUP_TARGET,
            "setup_started",
            [json_kv("epoch", epoch)],
        );
        Ok(epoch)
    }
}

impl std::fmt::Debug for SetupCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetupCoordinator")
            .field("epoch", &self.epoch())
            .finish_non_exhaustive()
    }
}

/// Completion step; runs on the callback queue.
fn complete(
    shared: &SetupShared,
    logger: Option<&Logger>,
    metrics: Option<&Arc<Mutex<LayoutMetrics>>>,
    epoch: u64,
    built: Result<ConstraintModel>,
) {
    if shared.epoch.load(Ordering::Acquire) != epoch {
        record(metrics, LayoutMetrics::record_setup_discarded);
        emit(
            logger,
            LogLevel::Debug,
            SETUP_TARGET,
            "setup_discarded",
            [
                json_kv("epoch", epoch),
                json_kv("current_epoch", shared.epoch.load(Ordering::Acquire)),
            ],
        );
        return;
    }

    let outcome = match built {
        Ok(model) => install(shared, logger, epoch, model).and_then(|model| {
            record(metrics, LayoutMetrics::record_setup_completed);
            for observer in drain(&shared.observers)? {
                observer(Arc::clone(&model));
            }
            Ok(())
        }),
        Err(err) => {
            record(metrics, LayoutMetrics::record_setup_failed);
            emit(
                logger,
                LogLevel::Warn,
                SETUP_TARGET,
                "setup_failed",
                [json_kv("epoch", epoch), json_str("error", err.to_string())],
            );
            notify_failure(shared, epoch, &err)
        }
    };
    if let Err(err) = outcome {
        emit(
            logger,
            LogLevel::Error,
            SETUP_TARGET,
            "completion_error",
            [json_kv("epoch", epoch), json_str("error", err.to_string())],
        );
    }
}

/// Publish `model`, then request a layout. Observers are left to the caller.
fn install(
    shared: &SetupShared,
    logger: Option<&Logger>,
    epoch: u64,
    model: ConstraintModel,
) -> Result<SharedModel> {
    let fingerprint = model.fingerprint().to_hex().to_string();
    let nodes = model.nodes().count();
    let model = Arc::new(Mutex::new(model));
    *shared.active.write().map_err(|_| LayoutError::Poisoned)? = Some(Arc::clone(&model));
    clear_in_flight(shared, epoch)?;
    shared.layout_requested.store(true, Ordering::Release);
    emit(
        logger,
        LogLevel::Debug,
        SETUP_TARGET,
        "model_installed",
        [
            json_kv("epoch", epoch),
            json_kv("nodes", nodes),
            json_str("fingerprint", fingerprint),
        ],
    );
    Ok(model)
}

fn clear_in_flight(shared: &SetupShared, epoch: u64) -> Result<()> {
    let mut in_flight = shared.in_flight.lock().map_err(|_| LayoutError::Poisoned)?;
    if *in_flight == Some(epoch) {
        *in_flight = None;
    }
    Ok(())
}

fn set_failure(shared: &SetupShared, epoch: u64, err: &LayoutError) -> Result<SetupFailure> {
    let failure = SetupFailure {
        epoch,
        message: err.to_string(),
        constraint_error: err.is_constraint_error(),
    };
    *shared.last_failure.lock().map_err(|_| LayoutError::Poisoned)? = Some(failure.clone());
    Ok(failure)
}

fn notify_failure(shared: &SetupShared, epoch: u64, err: &LayoutError) -> Result<()> {
    clear_in_flight(shared, epoch)?;
    let failure = set_failure(shared, epoch, err)?;
    let observers: Vec<FailureObserver> = shared
        .failure_observers
        .lock()
        .map_err(|_| LayoutError::Poisoned)?
        .clone();
    for observer in observers {
        observer(&failure);
    }
    Ok(())
}

fn drain(observers: &Mutex<Vec<SetupObserver>>) -> Result<Vec<SetupObserver>> {
    let mut guard = observers.lock().map_err(|_| LayoutError::Poisoned)?;
    Ok(std::mem::take(&mut *guard))
}

fn record(metrics: Option<&Arc<Mutex<LayoutMetrics>>>, update: fn(&mut LayoutMetrics)) {
    if let Some(metrics) = metrics {
        if let Ok(mut guard) = metrics.lock() {
            update(&mut guard);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::logging::MemorySink;
    use crate::setup::CallbackQueue;

    fn build(constraints: &'static [&'static str]) -> impl FnOnce() -> Result<ConstraintModel> + Send {
        move || ConstraintModel::build(Some(constraints), 1.0)
    }

    fn counter() -> (Arc<AtomicUsize>, impl FnOnce(SharedModel) + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let observed = Arc::clone(&count);
        (count, move |_model: SharedModel| {
            observed.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn async_setup_publishes_on_the_queue() {
        let queue = CallbackQueue::new();
        let metrics = Arc::new(Mutex::new(LayoutMetrics::new()));
        let coordinator = SetupCoordinator::new(queue.poster()).with_metrics(Some(metrics.clone()));
        let (count, observer) = counter();
        coordinator.on_setup_complete(observer).unwrap();

        let ticket = coordinator.start_async(build(&["a.width == 10"])).unwrap();
        ticket.join().unwrap();
        assert_eq!(coordinator.state().unwrap(), SetupState::SetupInProgress);
        assert!(coordinator.active().unwrap().is_none());

        assert_eq!(queue.run_pending(), 1);
        assert_eq!(coordinator.state().unwrap(), SetupState::PostSetup);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(coordinator.take_layout_request());
        assert!(!coordinator.take_layout_request());

        let snapshot = metrics.lock().unwrap().snapshot();
        assert_eq!(snapshot.setups_started, 1);
        assert_eq!(snapshot.setups_completed, 1);
    }

    #[test]
    fn detach_discards_completion() {
        let queue = CallbackQueue::new();
        let metrics = Arc::new(Mutex::new(LayoutMetrics::new()));
        let coordinator = SetupCoordinator::new(queue.poster()).with_metrics(Some(metrics.clone()));
        let (count, observer) = counter();
        coordinator.on_setup_complete(observer).unwrap();

        let ticket = coordinator.start_async(build(&["a.width == 10"])).unwrap();
        coordinator.detach().unwrap();
        ticket.join().unwrap();
        queue.run_pending();

        assert!(coordinator.active().unwrap().is_none());
        assert_eq!(coordinator.state().unwrap(), SetupState::PreSetup);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(!coordinator.take_layout_request());
        assert_eq!(metrics.lock().unwrap().snapshot().setups_discarded, 1);
    }

    #[test]
    fn newer_setup_supersedes_older() {
        let queue = CallbackQueue::new();
        let coordinator = SetupCoordinator::new(queue.poster());
        let (count, observer) = counter();
        coordinator.on_setup_complete(observer).unwrap();

        let first = coordinator.start_async(build(&["old.width == 10"])).unwrap();
        let second = coordinator.start_async(build(&["new.width == 20"])).unwrap();
        assert!(second.epoch() > first.epoch());
        first.join().unwrap();
        second.join().unwrap();
        assert_eq!(queue.run_pending(), 2);

        let model = coordinator.active().unwrap().unwrap();
        let model = model.lock().unwrap();
        assert!(model.node_by_name("new").is_ok());
        assert!(model.node_by_name("old").is_err());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn observers_after_setup_are_posted_not_called() {
        let queue = CallbackQueue::new();
        let coordinator = SetupCoordinator::new(queue.poster());
        coordinator.run_sync(build(&["a.width == 10"])).unwrap();

        let (count, observer) = counter();
        coordinator.on_setup_complete(observer).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
        queue.run_pending();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn sync_setup_delivers_pending_observers_through_the_queue() {
        let queue = CallbackQueue::new();
        let coordinator = SetupCoordinator::new(queue.poster());
        let (count, observer) = counter();
        coordinator.on_setup_complete(observer).unwrap();

        coordinator.run_sync(build(&["a.width == 10"])).unwrap();
        assert_eq!(coordinator.state().unwrap(), SetupState::PostSetup);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(queue.run_pending(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_async_setup_keeps_previous_model() {
        let queue = CallbackQueue::new();
        let sink = MemorySink::new();
        let coordinator =
            SetupCoordinator::new(queue.poster()).with_logger(Some(Logger::new(sink.clone())));
        let original = coordinator.run_sync(build(&["a.width == 10"])).unwrap();

        let failures = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&failures);
        coordinator
            .on_setup_failed(move |failure| seen.lock().unwrap().push(failure.clone()))
            .unwrap();

        let ticket = coordinator
            .start_async(build(&["a.width == 10", "a.width >= 20"]))
            .unwrap();
        let epoch = ticket.epoch();
        ticket.join().unwrap();
        queue.run_pending();

        let failures = failures.lock().unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].epoch, epoch);
        assert!(failures[0].constraint_error);
        assert_eq!(coordinator.last_failure().unwrap().as_ref(), Some(&failures[0]));
        let active = coordinator.active().unwrap().unwrap();
        assert!(Arc::ptr_eq(&active, &original));
        assert!(sink.messages_for(SETUP_TARGET).iter().any(|m| m == "setup_failed"));
    }

    #[test]
    fn failed_sync_setup_returns_the_error() {
        let queue = CallbackQueue::new();
        let coordinator = SetupCoordinator::new(queue.poster());
        let err = coordinator.run_sync(build(&["a.width ==="])).unwrap_err();
        assert!(matches!(err, LayoutError::Syntax { .. }));
        assert!(err.is_constraint_error());
        assert!(!LayoutError::SetupPanicked.is_constraint_error());
        assert_eq!(coordinator.state().unwrap(), SetupState::PreSetup);
        assert!(coordinator.last_failure().unwrap().is_some());
        assert_eq!(queue.run_pending(), 0);
    }
}
