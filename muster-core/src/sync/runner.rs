//! Sequential sync step runner.
//!
//! A [`SyncRunner`] owns a fixed, ordered list of named async steps. Each
//! call to [`SyncRunner::sync_now`] runs them one after another:
//!
//! - single-flight: a call made while a run is active returns
//!   [`SyncOutcome::AlreadyRunning`] without starting anything;
//! - fail-fast: the first failing step ends the run;
//! - cooperative cancellation: [`SyncRunner::cancel`] is observed before the
//!   next step starts, never in the middle of one.
//!
//! Progress is broadcast as [`SyncEvent`]s to every subscriber.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::SyncResult;
use super::event::{SyncEvent, SyncEventKind};
use crate::clock::{Clock, SystemClock};

/// Events buffered per subscriber before slow receivers start lagging.
const EVENT_CAPACITY: usize = 64;

type StepFn = Box<dyn Fn() -> BoxFuture<'static, SyncResult<()>> + Send + Sync>;

struct Step {
    name: String,
    run: StepFn,
}

/// How a call to [`SyncRunner::sync_now`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed,
    Failed { step: String, error: String },
    Cancelled,
    /// Another run was active; nothing was started.
    AlreadyRunning,
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SyncOutcome::Completed)
    }
}

/// State retained between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStatus {
    pub running: bool,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_reason: Option<String>,
}

/// Collects steps for a [`SyncRunner`]. Steps cannot be added after `build`.
pub struct SyncRunnerBuilder {
    steps: Vec<Step>,
    clock: Arc<dyn Clock>,
}

impl SyncRunnerBuilder {
    pub fn step<F, Fut>(mut self, name: impl Into<String>, run: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = SyncResult<()>> + Send + 'static,
    {
        self.steps.push(Step {
            name: name.into(),
            run: Box::new(move || Box::pin(run())),
        });
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> SyncRunner {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        SyncRunner {
            steps: self.steps,
            clock: self.clock,
            events,
            running: AtomicBool::new(false),
            active: Mutex::new(None),
            status: Mutex::new(SyncStatus::default()),
        }
    }
}

pub struct SyncRunner {
    steps: Vec<Step>,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<SyncEvent>,
    running: AtomicBool,
    /// Cancellation token of the active run, if any.
    active: Mutex<Option<CancellationToken>>,
    status: Mutex<SyncStatus>,
}

impl SyncRunner {
    pub fn builder() -> SyncRunnerBuilder {
        SyncRunnerBuilder {
            steps: Vec::new(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Registered step names in execution order.
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }

    /// Receives every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn status(&self) -> SyncStatus {
        let mut status = lock(&self.status).clone();
        status.running = self.is_running();
        status
    }

    /// Requests cancellation of the active run. Returns false if none is active.
    pub fn cancel(&self) -> bool {
        match lock(&self.active).as_ref() {
            Some(token) => {
                token.cancel();
                debug!("Sync cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Runs every step in order unless a run is already active.
    pub async fn sync_now(&self, reason: &str) -> SyncOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(reason, "Sync already running, ignoring trigger");
            return SyncOutcome::AlreadyRunning;
        }

        let token = CancellationToken::new();
        *lock(&self.active) = Some(token.clone());
        let _guard = RunGuard { runner: self };

        lock(&self.status).last_reason = Some(reason.to_string());
        info!(reason, steps = self.steps.len(), "Sync started");
        self.emit(SyncEvent::new(SyncEventKind::Started, self.clock.now()).with_message(reason));

        for step in &self.steps {
            if token.is_cancelled() {
                info!(next_step = %step.name, "Sync cancelled");
                self.emit(
                    SyncEvent::new(SyncEventKind::Cancelled, self.clock.now()).with_step(&step.name),
                );
                return SyncOutcome::Cancelled;
            }

            debug!(step = %step.name, "Sync step started");
            self.emit(SyncEvent::new(SyncEventKind::StepStarted, self.clock.now()).with_step(&step.name));

            match (step.run)().await {
                Ok(()) => {
                    debug!(step = %step.name, "Sync step succeeded");
                    self.emit(
                        SyncEvent::new(SyncEventKind::StepSucceeded, self.clock.now())
                            .with_step(&step.name),
                    );
                }
                Err(e) => {
                    let error = e.to_string();
                    warn!(step = %step.name, error = %error, "Sync step failed, aborting run");
                    self.emit(
                        SyncEvent::new(SyncEventKind::StepFailed, self.clock.now())
                            .with_step(&step.name)
                            .with_message(error.clone()),
                    );
                    self.emit(
                        SyncEvent::new(SyncEventKind::Finished { failed: true }, self.clock.now())
                            .with_message(error.clone()),
                    );
                    lock(&self.status).last_error = Some(format!("{}: {}", step.name, error));
                    return SyncOutcome::Failed {
                        step: step.name.clone(),
                        error,
                    };
                }
            }
        }

        let finished_at = self.clock.now();
        {
            let mut status = lock(&self.status);
            status.last_success_at = Some(finished_at);
            status.last_error = None;
        }
        info!("Sync finished");
        self.emit(SyncEvent::new(SyncEventKind::Finished { failed: false }, finished_at));
        SyncOutcome::Completed
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Clears the single-flight flag and the active token when a run ends,
/// including when the run future is dropped mid-step.
struct RunGuard<'a> {
    runner: &'a SyncRunner,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        lock(&self.runner.active).take();
        self.runner.running.store(false, Ordering::Release);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::sync::SyncError;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::{broadcast::error::TryRecvError, Notify};

    fn drain(rx: &mut broadcast::Receiver<SyncEvent>) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return events,
                Err(TryRecvError::Lagged(_)) => continue,
            }
        }
    }

    fn kinds(events: &[SyncEvent]) -> Vec<(SyncEventKind, Option<String>)> {
        events.iter().map(|e| (e.kind, e.step.clone())).collect()
    }

    fn recorder() -> Arc<Mutex<Vec<&'static str>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn recording_step(
        log: &Arc<Mutex<Vec<&'static str>>>,
        name: &'static str,
    ) -> impl Fn() -> BoxFuture<'static, SyncResult<()>> + Send + Sync + 'static {
        let log = log.clone();
        move || {
            let log = log.clone();
            Box::pin(async move {
                log.lock().unwrap().push(name);
                Ok::<(), SyncError>(())
            })
        }
    }

    #[tokio::test]
    async fn test_empty_runner_finishes_immediately() {
        let runner = SyncRunner::builder().build();
        let mut rx = runner.subscribe();

        assert_eq!(runner.sync_now("manual").await, SyncOutcome::Completed);

        let events = drain(&mut rx);
        assert_eq!(
            kinds(&events),
            vec![
                (SyncEventKind::Started, None),
                (SyncEventKind::Finished { failed: false }, None),
            ]
        );
        assert_eq!(events[0].message.as_deref(), Some("manual"));
        assert!(runner.status().last_success_at.is_some());
    }

    #[tokio::test]
    async fn test_steps_run_in_registration_order() {
        let log = recorder();
        let runner = SyncRunner::builder()
            .step("a", recording_step(&log, "a"))
            .step("b", recording_step(&log, "b"))
            .step("c", recording_step(&log, "c"))
            .build();
        let mut rx = runner.subscribe();

        assert!(runner.sync_now("manual").await.is_success());
        assert!(runner.sync_now("again").await.is_success());

        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c", "a", "b", "c"]);
        assert_eq!(runner.step_names(), vec!["a", "b", "c"]);
        let first_run: Vec<_> = kinds(&drain(&mut rx)).into_iter().take(8).collect();
        assert_eq!(
            first_run,
            vec![
                (SyncEventKind::Started, None),
                (SyncEventKind::StepStarted, Some("a".to_string())),
                (SyncEventKind::StepSucceeded, Some("a".to_string())),
                (SyncEventKind::StepStarted, Some("b".to_string())),
                (SyncEventKind::StepSucceeded, Some("b".to_string())),
                (SyncEventKind::StepStarted, Some("c".to_string())),
                (SyncEventKind::StepSucceeded, Some("c".to_string())),
                (SyncEventKind::Finished { failed: false }, None),
            ]
        );
    }

    #[tokio::test]
    async fn test_first_failure_aborts_remaining_steps() {
        let log = recorder();
        let runner = SyncRunner::builder()
            .step("a", recording_step(&log, "a"))
            .step("b", || async {
                Err::<(), _>(SyncError::Service(ServiceError::Persistence(
                    "disk full".into(),
                )))
            })
            .step("c", recording_step(&log, "c"))
            .build();
        let mut rx = runner.subscribe();

        let outcome = runner.sync_now("manual").await;

        assert_eq!(
            outcome,
            SyncOutcome::Failed {
                step: "b".to_string(),
                error: "Persistence error: disk full".to_string(),
            }
        );
        assert_eq!(*log.lock().unwrap(), vec!["a"]);
        let events = kinds(&drain(&mut rx));
        assert_eq!(
            &events[events.len() - 2..],
            &[
                (SyncEventKind::StepFailed, Some("b".to_string())),
                (SyncEventKind::Finished { failed: true }, None),
            ]
        );
        let status = runner.status();
        assert!(status.last_success_at.is_none());
        assert_eq!(status.last_error.as_deref(), Some("b: Persistence error: disk full"));
        assert!(!status.running);
    }

    #[tokio::test]
    async fn test_success_clears_last_error() {
        let fail = Arc::new(AtomicBool::new(true));
        let flag = fail.clone();
        let runner = SyncRunner::builder()
            .step("flaky", move || {
                let fail = flag.load(Ordering::SeqCst);
                async move {
                    if fail {
                        Err(SyncError::Service(ServiceError::Network("offline".into())))
                    } else {
                        Ok(())
                    }
                }
            })
            .build();

        assert!(!runner.sync_now("first").await.is_success());
        assert!(runner.status().last_error.is_some());

        fail.store(false, Ordering::SeqCst);
        assert!(runner.sync_now("second").await.is_success());
        let status = runner.status();
        assert!(status.last_error.is_none());
        assert_eq!(status.last_reason.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_sync_now_is_single_flight() {
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let (s, r, n) = (started.clone(), release.clone(), runs.clone());
        let runner = Arc::new(
            SyncRunner::builder()
                .step("slow", move || {
                    let (s, r, n) = (s.clone(), r.clone(), n.clone());
                    async move {
                        n.fetch_add(1, Ordering::SeqCst);
                        s.notify_one();
                        r.notified().await;
                        Ok::<(), SyncError>(())
                    }
                })
                .build(),
        );

        let background = {
            let runner = runner.clone();
            tokio::spawn(async move { runner.sync_now("first").await })
        };
        started.notified().await;

        assert!(runner.is_running());
        assert_eq!(runner.sync_now("second").await, SyncOutcome::AlreadyRunning);

        release.notify_one();
        assert_eq!(background.await.unwrap(), SyncOutcome::Completed);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!runner.is_running());
    }

    #[tokio::test]
    async fn test_cancel_takes_effect_before_next_step() {
        let log = recorder();
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());

        let (s, r) = (started.clone(), release.clone());
        let runner = Arc::new(
            SyncRunner::builder()
                .step("one", recording_step(&log, "one"))
                .step("two", move || {
                    let (s, r) = (s.clone(), r.clone());
                    async move {
                        s.notify_one();
                        r.notified().await;
                        Ok::<(), SyncError>(())
                    }
                })
                .step("three", recording_step(&log, "three"))
                .build(),
        );
        let mut rx = runner.subscribe();

        let background = {
            let runner = runner.clone();
            tokio::spawn(async move { runner.sync_now("manual").await })
        };
        started.notified().await;
        assert!(runner.cancel());
        release.notify_one();

        assert_eq!(background.await.unwrap(), SyncOutcome::Cancelled);
        assert_eq!(*log.lock().unwrap(), vec!["one"]);
        let events = drain(&mut rx);
        let last = events.last().unwrap();
        assert_eq!(last.kind, SyncEventKind::Cancelled);
        assert_eq!(last.step.as_deref(), Some("three"));
        assert!(events
            .iter()
            .any(|e| e.kind == SyncEventKind::StepSucceeded && e.step.as_deref() == Some("two")));
    }

    #[tokio::test]
    async fn test_cancel_without_active_run_is_noop() {
        let log = recorder();
        let runner = SyncRunner::builder().step("a", recording_step(&log, "a")).build();

        assert!(!runner.cancel());
        assert!(runner.sync_now("manual").await.is_success());
        assert_eq!(*log.lock().unwrap(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_every_subscriber_sees_every_event() {
        let runner = SyncRunner::builder().step("a", || async { Ok::<(), SyncError>(()) }).build();
        let mut first = runner.subscribe();
        let mut second = runner.subscribe();

        runner.sync_now("manual").await;

        let a = drain(&mut first);
        let b = drain(&mut second);
        assert_eq!(a.len(), 4);
        assert_eq!(a, b);
    }
}
