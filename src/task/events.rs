use super::TaskOutcome;
use std::sync::Mutex;

/// Observer interface for task lifecycle events.
///
/// Listeners are invoked synchronously on the thread that produced the event
/// (usually the task's worker thread) and must return quickly; a listener
/// that blocks stalls the task itself.
///
/// Guarantees: `task_begun` fires exactly once and before any message or
/// progress event; `task_ended` fires exactly once and is always the last
/// event of a run.
pub trait TaskListener: Send {
    fn task_begun(&mut self) {}
    fn task_message(&mut self, _message: &str) {}
    fn task_progress(&mut self, _progress: f64) {}
    fn task_paused(&mut self) {}
    fn task_resumed(&mut self) {}
    fn task_ended(&mut self, _outcome: TaskOutcome) {}
}

/// Handle returned by listener registration, used to unregister.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListenerId(usize);

#[derive(Default)]
pub(crate) struct EventSupport {
    listeners: Mutex<Vec<(ListenerId, Box<dyn TaskListener>)>>,
    next_id: Mutex<usize>,
}

impl EventSupport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Box<dyn TaskListener>) -> ListenerId {
        let mut next = super::lock(&self.next_id);
        let id = ListenerId(*next);
        *next += 1;
        super::lock(&self.listeners).push((id, listener));
        id
    }

    pub fn remove(&self, id: ListenerId) {
        super::lock(&self.listeners).retain(|(lid, _)| *lid != id);
    }

    fn for_each(&self, mut f: impl FnMut(&mut dyn TaskListener)) {
        for (_, listener) in super::lock(&self.listeners).iter_mut() {
            f(listener.as_mut());
        }
    }

    pub fn fire_begun(&self) {
        self.for_each(|l| l.task_begun());
    }

    pub fn fire_message(&self, message: &str) {
        self.for_each(|l| l.task_message(message));
    }

    pub fn fire_progress(&self, progress: f64) {
        self.for_each(|l| l.task_progress(progress));
    }

    pub fn fire_paused(&self) {
        self.for_each(|l| l.task_paused());
    }

    pub fn fire_resumed(&self) {
        self.for_each(|l| l.task_resumed());
    }

    pub fn fire_ended(&self, outcome: TaskOutcome) {
        self.for_each(|l| l.task_ended(outcome));
    }
}
