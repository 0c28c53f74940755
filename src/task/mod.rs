//! Cancellable, pausable long-running work units with progress reporting.
//!
//! A [`Task`] owns the whole lifecycle shell — single-owner execution, begun
//! and ended events, cancellation, pausing, the blocking result handle — and
//! invokes a caller-supplied body closure to do the actual work. The shell is
//! the only caller of the body, so the lifecycle guarantees cannot be
//! bypassed by an implementation.
//!
//! Cancellation is cooperative: the body polls
//! [`TaskContext::check_point`] at its suspension points and unwinds with
//! [`ClusterError::Cancelled`] once a cancel request is observed. Pausing
//! parks the worker inside the same checkpoint until resumed or cancelled.

mod events;

pub use events::{ListenerId, TaskListener};

use crate::error::ClusterError;
use events::EventSupport;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Terminal state of a task run. `NotFinished` is the value before the run
/// completes; every run transitions exactly once to one of the other three.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskOutcome {
    NotFinished,
    Success,
    Cancelled,
    Error,
}

/// Minimal cancellation probe handed to external collaborators (file
/// loaders, factories) so long I/O can poll a running task's cancel flag.
pub trait Cancelable {
    fn is_cancelled(&self) -> bool;
}

// Lock helper that survives listener panics instead of poisoning the task.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct Flags {
    outcome: TaskOutcome,
    begun: bool,
    ended: bool,
    running: bool,
    cancel: bool,
    pause: bool,
    begin_progress: f64,
    end_progress: f64,
    progress: f64,
    sticky_error: Option<String>,
    error: Option<ClusterError>,
}

impl Flags {
    fn fresh(begin_progress: f64, end_progress: f64) -> Self {
        Self {
            outcome: TaskOutcome::NotFinished,
            begun: false,
            ended: false,
            running: false,
            cancel: false,
            pause: false,
            begin_progress,
            end_progress,
            progress: begin_progress,
            sticky_error: None,
            error: None,
        }
    }
}

struct Core {
    name: String,
    flags: Mutex<Flags>,
    cond: Condvar,
    events: EventSupport,
}

type Body<V> = Box<dyn FnMut(&TaskContext) -> Result<V, ClusterError> + Send>;

/// A single-owner long-running operation.
///
/// The generic parameter `V` is the result type surfaced by [`Task::get`].
/// `Task` is `Sync`, so one instance can be driven from a worker thread while
/// other threads cancel, pause, or block on the result.
pub struct Task<V> {
    core: Arc<Core>,
    body: Mutex<Body<V>>,
    result: Mutex<Option<V>>,
}

/// Checkpoint and reporting interface handed to a task body while it runs.
pub struct TaskContext {
    core: Arc<Core>,
}

impl<V> Task<V> {
    pub fn new(
        name: impl Into<String>,
        body: impl FnMut(&TaskContext) -> Result<V, ClusterError> + Send + 'static,
    ) -> Self {
        Self {
            core: Arc::new(Core {
                name: name.into(),
                flags: Mutex::new(Flags::fresh(0.0, 1.0)),
                cond: Condvar::new(),
                events: EventSupport::new(),
            }),
            body: Mutex::new(Box::new(body)),
            result: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Registers a listener for lifecycle events. Normally done before the
    /// task is started.
    pub fn add_listener(&self, listener: Box<dyn TaskListener>) -> ListenerId {
        self.core.events.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) {
        self.core.events.remove(id);
    }

    /// Sets the progress window reported by this task. Must be called before
    /// the run starts; endpoints default to [0.0, 1.0].
    pub fn set_progress_endpoints(&self, begin: f64, end: f64) -> Result<(), ClusterError> {
        if begin < 0.0 || end < 0.0 || begin > end {
            return Err(ClusterError::InvalidConfig(format!(
                "invalid progress endpoints (begin == {begin}, end == {end})"
            )));
        }
        let mut flags = lock(&self.core.flags);
        if flags.begun {
            return Err(ClusterError::InvalidState(
                "progress endpoints must be set before the task runs".into(),
            ));
        }
        flags.begin_progress = begin;
        flags.end_progress = end;
        flags.progress = begin;
        Ok(())
    }

    /// Executes the task body on the calling thread.
    ///
    /// Fails immediately with [`ClusterError::RejectedExecution`] if another
    /// thread currently owns the run, or [`ClusterError::InvalidState`] if a
    /// finished task was not [`reset`](Task::reset). Body failures do not
    /// surface here; they are recorded as the terminal outcome and reported
    /// through [`Task::get`].
    pub fn run(&self) -> Result<(), ClusterError> {
        {
            let mut flags = lock(&self.core.flags);
            if flags.running {
                return Err(ClusterError::RejectedExecution);
            }
            if flags.begun {
                return Err(ClusterError::InvalidState(
                    "task already ran; call reset() before running it again".into(),
                ));
            }
            flags.running = true;
            flags.begun = true;
            flags.outcome = TaskOutcome::NotFinished;
        }
        self.core.events.fire_begun();

        let cancelled_before_body = lock(&self.core.flags).cancel;
        let body_result: Result<V, ClusterError> = if cancelled_before_body {
            // Cancel requested before the run started: terminal Cancelled
            // without ever invoking the body.
            Err(ClusterError::Cancelled)
        } else {
            let context = TaskContext {
                core: Arc::clone(&self.core),
            };
            let mut body = lock(&self.body);
            match catch_unwind(AssertUnwindSafe(|| (*body)(&context))) {
                Ok(result) => result,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    log::error!("panic in task {}: {}", self.core.name, message);
                    Err(ClusterError::Panic(message))
                }
            }
        };

        let outcome;
        {
            let mut flags = lock(&self.core.flags);
            // A sticky error posted from another thread overrides a body
            // that returned normally.
            let body_result = match (body_result, flags.sticky_error.take()) {
                (Ok(_), Some(message)) => Err(ClusterError::TaskFailed(message)),
                (result, _) => result,
            };
            outcome = match body_result {
                Ok(value) => {
                    *lock(&self.result) = Some(value);
                    TaskOutcome::Success
                }
                Err(ClusterError::Cancelled) => TaskOutcome::Cancelled,
                Err(error) => {
                    flags.error = Some(error);
                    TaskOutcome::Error
                }
            };
            flags.outcome = outcome;
            flags.ended = true;
            flags.running = false;
        }
        self.core.cond.notify_all();
        self.core.events.fire_ended(outcome);
        Ok(())
    }

    /// Requests cooperative cancellation. Returns `true` if the request was
    /// newly registered.
    ///
    /// A task that has begun is only cancelled when `may_interrupt_if_running`
    /// is set. A paused task is woken so the cancel can be observed. The body
    /// must not sit in unbounded blocking waits of its own; collaborators are
    /// expected to poll [`Cancelable::is_cancelled`].
    pub fn cancel(&self, may_interrupt_if_running: bool) -> bool {
        let mut flags = lock(&self.core.flags);
        if (!flags.begun || may_interrupt_if_running) && !flags.cancel && !flags.ended {
            flags.cancel = true;
            drop(flags);
            self.core.cond.notify_all();
            true
        } else {
            false
        }
    }

    /// Pauses a running task at its next checkpoint.
    pub fn pause(&self) {
        let mut flags = lock(&self.core.flags);
        if !flags.pause && flags.begun && !flags.ended {
            flags.pause = true;
            drop(flags);
            self.core.cond.notify_all();
        }
    }

    /// Resumes a paused task.
    pub fn resume(&self) {
        let mut flags = lock(&self.core.flags);
        if flags.pause {
            flags.pause = false;
            drop(flags);
            self.core.cond.notify_all();
        }
    }

    /// Returns the task to `Idle` so it can run again. Legal only before the
    /// first run or from a terminal state.
    pub fn reset(&self) -> Result<(), ClusterError> {
        let mut flags = lock(&self.core.flags);
        if flags.begun && !flags.ended {
            return Err(ClusterError::InvalidState(
                "cannot reset while the task is running".into(),
            ));
        }
        *flags = Flags::fresh(flags.begin_progress, flags.end_progress);
        drop(flags);
        *lock(&self.result) = None;
        Ok(())
    }

    pub fn is_begun(&self) -> bool {
        lock(&self.core.flags).begun
    }

    pub fn is_ended(&self) -> bool {
        lock(&self.core.flags).ended
    }

    pub fn is_paused(&self) -> bool {
        lock(&self.core.flags).pause
    }

    /// Outcome of the last run; `NotFinished` while idle or running.
    pub fn outcome(&self) -> TaskOutcome {
        lock(&self.core.flags).outcome
    }

    /// Last reported progress, within the configured endpoints.
    pub fn progress(&self) -> f64 {
        lock(&self.core.flags).progress
    }
}

impl<V: Clone> Task<V> {
    /// Blocks until the task reaches a terminal state, then returns the
    /// result. A `Cancelled` outcome surfaces as
    /// [`ClusterError::Cancelled`]; an `Error` outcome surfaces its captured
    /// cause. The result is retained until [`Task::reset`], so repeated
    /// calls keep returning it.
    pub fn get(&self) -> Result<V, ClusterError> {
        let mut flags = lock(&self.core.flags);
        while !flags.ended {
            flags = self
                .core
                .cond
                .wait(flags)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        self.result_after_ended(&flags)
    }

    /// Like [`Task::get`], but gives up with [`ClusterError::Timeout`] after
    /// `timeout`. A zero timeout on a running task times out immediately.
    pub fn get_timeout(&self, timeout: Duration) -> Result<V, ClusterError> {
        let deadline = Instant::now() + timeout;
        let mut flags = lock(&self.core.flags);
        while !flags.ended {
            let now = Instant::now();
            if now >= deadline {
                return Err(ClusterError::Timeout);
            }
            let (guard, _) = self
                .core
                .cond
                .wait_timeout(flags, deadline - now)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            flags = guard;
        }
        self.result_after_ended(&flags)
    }

    fn result_after_ended(&self, flags: &Flags) -> Result<V, ClusterError> {
        match flags.outcome {
            TaskOutcome::Success => Ok(lock(&self.result)
                .clone()
                .expect("successful task stores a result")),
            TaskOutcome::Cancelled => Err(ClusterError::Cancelled),
            TaskOutcome::Error => Err(flags
                .error
                .clone()
                .unwrap_or_else(|| ClusterError::TaskFailed("unknown task error".into()))),
            TaskOutcome::NotFinished => unreachable!("terminal wait ended without an outcome"),
        }
    }
}

impl<V> Cancelable for Task<V> {
    fn is_cancelled(&self) -> bool {
        lock(&self.core.flags).cancel
    }
}

impl TaskContext {
    /// Polls the cancel and pause flags.
    ///
    /// Returns `Err(Cancelled)` once cancellation was requested and parks the
    /// calling thread while the task is paused (firing the paused/resumed
    /// events around the park). A sticky error posted from another thread
    /// also surfaces here.
    pub fn check_point(&self) -> Result<(), ClusterError> {
        {
            let flags = lock(&self.core.flags);
            if let Some(message) = flags.sticky_error.clone() {
                return Err(ClusterError::TaskFailed(message));
            }
            if flags.cancel {
                return Err(ClusterError::Cancelled);
            }
            if !flags.pause {
                return Ok(());
            }
        }

        self.core.events.fire_paused();
        {
            let mut flags = lock(&self.core.flags);
            while flags.pause && !flags.cancel {
                // Timed wait so a missed notification can never hang the
                // worker for good.
                let (guard, _) = self
                    .core
                    .cond
                    .wait_timeout(flags, Duration::from_secs(1))
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                flags = guard;
            }
            if flags.cancel {
                return Err(ClusterError::Cancelled);
            }
        }
        self.core.events.fire_resumed();
        Ok(())
    }

    /// Reports a human-readable status line to listeners.
    pub fn post_message(&self, message: &str) {
        {
            let flags = lock(&self.core.flags);
            if !flags.begun || flags.ended {
                return;
            }
        }
        self.core.events.fire_message(message);
    }

    /// Reports progress as a fraction in [0, 1] of this task's work.
    ///
    /// The fraction is mapped into the configured [begin, end] window and
    /// clamped so reported progress never decreases within a run.
    pub fn post_progress(&self, fraction: f64) {
        let value;
        {
            let mut flags = lock(&self.core.flags);
            if !flags.begun || flags.ended {
                return;
            }
            let span = flags.end_progress - flags.begin_progress;
            let absolute = flags.begin_progress + fraction.clamp(0.0, 1.0) * span;
            value = absolute.max(flags.progress);
            flags.progress = value;
        }
        self.core.events.fire_progress(value);
    }

    /// Records a failure from a helper thread. The error is observed at the
    /// owning thread's next checkpoint (and at the run boundary) and turns
    /// the outcome into `Error`. A body failing on its own thread should
    /// instead return [`ClusterError::TaskFailed`] directly.
    pub fn post_sticky_error(&self, message: &str) {
        let mut flags = lock(&self.core.flags);
        if flags.sticky_error.is_none() {
            flags.sticky_error = Some(message.to_string());
        }
    }

    pub fn is_cancelled(&self) -> bool {
        lock(&self.core.flags).cancel
    }
}

impl Cancelable for TaskContext {
    fn is_cancelled(&self) -> bool {
        TaskContext::is_cancelled(self)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<String>>>,
    }

    impl Recorder {
        fn take(&self) -> Vec<String> {
            lock(&self.events).clone()
        }
    }

    impl TaskListener for Recorder {
        fn task_begun(&mut self) {
            lock(&self.events).push("begun".into());
        }
        fn task_message(&mut self, message: &str) {
            lock(&self.events).push(format!("message:{message}"));
        }
        fn task_progress(&mut self, progress: f64) {
            lock(&self.events).push(format!("progress:{progress:.2}"));
        }
        fn task_paused(&mut self) {
            lock(&self.events).push("paused".into());
        }
        fn task_resumed(&mut self) {
            lock(&self.events).push("resumed".into());
        }
        fn task_ended(&mut self, outcome: TaskOutcome) {
            lock(&self.events).push(format!("ended:{outcome:?}"));
        }
    }

    #[test]
    fn successful_run_event_order() {
        let task = Task::new("demo", |ctx: &TaskContext| {
            ctx.post_message("working");
            ctx.post_progress(0.5);
            ctx.post_progress(1.0);
            Ok(42usize)
        });
        let recorder = Recorder::default();
        task.add_listener(Box::new(recorder.clone()));

        task.run().unwrap();
        assert_eq!(task.outcome(), TaskOutcome::Success);
        assert_eq!(task.get().unwrap(), 42);
        // get() keeps returning the retained result.
        assert_eq!(task.get().unwrap(), 42);

        assert_eq!(
            recorder.take(),
            vec![
                "begun",
                "message:working",
                "progress:0.50",
                "progress:1.00",
                "ended:Success"
            ]
        );
    }

    #[test]
    fn progress_is_windowed_and_monotone() {
        let task = Task::new("demo", |ctx: &TaskContext| {
            ctx.post_progress(0.5);
            ctx.post_progress(0.25); // must not go backwards
            ctx.post_progress(1.0);
            Ok(())
        });
        task.set_progress_endpoints(0.2, 0.6).unwrap();
        let recorder = Recorder::default();
        task.add_listener(Box::new(recorder.clone()));

        task.run().unwrap();
        assert_eq!(
            recorder.take(),
            vec!["begun", "progress:0.40", "progress:0.40", "progress:0.60", "ended:Success"]
        );
        assert_approx_eq!(task.progress(), 0.6);
    }

    #[test]
    fn endpoints_rejected_after_start() {
        let task = Task::new("demo", |_: &TaskContext| Ok(()));
        assert!(task.set_progress_endpoints(0.5, 0.2).is_err());
        task.run().unwrap();
        assert!(matches!(
            task.set_progress_endpoints(0.0, 1.0),
            Err(ClusterError::InvalidState(_))
        ));
    }

    #[test]
    fn cancel_before_start_skips_body() {
        let calls = Arc::new(AtomicUsize::new(0));
        let body_calls = Arc::clone(&calls);
        let task = Task::new("demo", move |_: &TaskContext| {
            body_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert!(task.cancel(false));
        task.run().unwrap();
        assert_eq!(task.outcome(), TaskOutcome::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(matches!(task.get(), Err(ClusterError::Cancelled)));
    }

    #[test]
    fn checkpoint_surfaces_cancel() {
        let task: Arc<Task<()>> = Arc::new(Task::new("demo", |ctx: &TaskContext| loop {
            ctx.check_point()?;
            std::thread::sleep(Duration::from_millis(1));
        }));

        let worker = {
            let task = Arc::clone(&task);
            std::thread::spawn(move || task.run())
        };
        while !task.is_begun() {
            std::thread::yield_now();
        }
        assert!(task.cancel(true));
        worker.join().unwrap().unwrap();
        assert_eq!(task.outcome(), TaskOutcome::Cancelled);
    }

    #[test]
    fn rerun_requires_reset() {
        let task = Task::new("demo", |_: &TaskContext| Ok(1u8));
        task.run().unwrap();
        assert!(matches!(task.run(), Err(ClusterError::InvalidState(_))));
        task.reset().unwrap();
        task.run().unwrap();
        assert_eq!(task.get().unwrap(), 1);
    }

    #[test]
    fn concurrent_run_rejected() {
        let task: Arc<Task<()>> = Arc::new(Task::new("demo", |ctx: &TaskContext| {
            while !ctx.is_cancelled() {
                std::thread::sleep(Duration::from_millis(1));
            }
            Err(ClusterError::Cancelled)
        }));

        let worker = {
            let task = Arc::clone(&task);
            std::thread::spawn(move || task.run())
        };
        while !task.is_begun() {
            std::thread::yield_now();
        }
        assert!(matches!(task.run(), Err(ClusterError::RejectedExecution)));
        task.cancel(true);
        worker.join().unwrap().unwrap();
    }

    #[test]
    fn body_error_and_panic_become_error_outcome() {
        let task = Task::new("demo", |_: &TaskContext| -> Result<(), ClusterError> {
            Err(ClusterError::TaskFailed("bad input".into()))
        });
        task.run().unwrap();
        assert_eq!(task.outcome(), TaskOutcome::Error);
        assert_eq!(
            task.get(),
            Err(ClusterError::TaskFailed("bad input".into()))
        );

        let task = Task::new("demo", |_: &TaskContext| -> Result<(), ClusterError> {
            panic!("boom")
        });
        task.run().unwrap();
        assert_eq!(task.get(), Err(ClusterError::Panic("boom".into())));
    }

    #[test]
    fn sticky_error_overrides_success() {
        let task = Task::new("demo", |ctx: &TaskContext| {
            ctx.post_sticky_error("worker thread died");
            Ok(())
        });
        task.run().unwrap();
        assert_eq!(
            task.get(),
            Err(ClusterError::TaskFailed("worker thread died".into()))
        );
    }

    #[test]
    fn get_timeout_on_running_task() {
        let task: Arc<Task<()>> = Arc::new(Task::new("demo", |ctx: &TaskContext| {
            while !ctx.is_cancelled() {
                std::thread::sleep(Duration::from_millis(1));
            }
            Err(ClusterError::Cancelled)
        }));

        let worker = {
            let task = Arc::clone(&task);
            std::thread::spawn(move || task.run())
        };
        while !task.is_begun() {
            std::thread::yield_now();
        }
        assert!(matches!(
            task.get_timeout(Duration::ZERO),
            Err(ClusterError::Timeout)
        ));
        assert!(matches!(
            task.get_timeout(Duration::from_millis(5)),
            Err(ClusterError::Timeout)
        ));
        task.cancel(true);
        worker.join().unwrap().unwrap();
    }

    #[test]
    fn pause_and_resume_fire_events() {
        let task: Arc<Task<u32>> = Arc::new(Task::new("demo", |ctx: &TaskContext| {
            for _ in 0..200 {
                ctx.check_point()?;
                std::thread::sleep(Duration::from_millis(1));
            }
            Ok(7)
        }));
        let recorder = Recorder::default();
        task.add_listener(Box::new(recorder.clone()));

        let worker = {
            let task = Arc::clone(&task);
            std::thread::spawn(move || task.run())
        };
        while !task.is_begun() {
            std::thread::yield_now();
        }
        task.pause();
        // Give the worker time to park and fire the paused event.
        while !recorder.take().contains(&"paused".to_string()) {
            std::thread::sleep(Duration::from_millis(1));
        }
        task.resume();
        task.cancel(true);
        worker.join().unwrap().unwrap();

        let events = recorder.take();
        assert_eq!(events.first().map(String::as_str), Some("begun"));
        assert_eq!(
            events.last().map(String::as_str),
            Some("ended:Cancelled")
        );
        let paused = events.iter().position(|e| e == "paused").unwrap();
        if let Some(resumed) = events.iter().position(|e| e == "resumed") {
            assert!(paused < resumed);
        }
    }
}
