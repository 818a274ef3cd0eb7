//! Background task execution and event debouncing (spec.md §4.12, §5).
//!
//! Grounded on the pack's own background-work examples
//! (`other_examples/manifests/cNameHitch-gitr`,
//! `other_examples/manifests/mrkline-backpak`, both depending on
//! `crossbeam`-family crates) for the crate choice; the single-worker
//! queue and debounce window shapes are a direct implementation of
//! spec.md §4.12/§5, since the teacher invokes everything synchronously
//! from its own CLI and has no background runner of its own.

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, Sender};
use tracing::warn;

use crate::snapshot::CancellationToken;

type Job = Box<dyn FnOnce() + Send>;

/// A single background worker draining a FIFO queue of jobs.
pub struct TaskRunner {
    sender: Option<Sender<Job>>,
    thread: Option<JoinHandle<()>>,
}

impl TaskRunner {
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();
        let thread = std::thread::spawn(move || {
            for job in receiver {
                job();
            }
        });
        Self {
            sender: Some(sender),
            thread: Some(thread),
        }
    }

    /// Queues `f` and returns a handle whose `join()` blocks for the
    /// result. `name` is only used for diagnostics.
    pub fn submit<T, F>(&self, name: &str, f: F) -> JobHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (result_tx, result_rx) = crossbeam_channel::bounded(1);
        let name = name.to_string();
        let job: Job = Box::new(move || {
            let result = f();
            if result_tx.send(result).is_err() {
                warn!(job = %name, "job result receiver dropped before completion");
            }
        });

        let delivered = self.sender.as_ref().is_some_and(|sender| sender.send(job).is_ok());
        if !delivered {
            warn!(job = %name, "task runner is shutting down, job dropped");
        }

        JobHandle { receiver: result_rx }
    }
}

impl Default for TaskRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskRunner {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// A handle to a queued job's eventual result.
pub struct JobHandle<T> {
    receiver: crossbeam_channel::Receiver<T>,
}

impl<T> JobHandle<T> {
    /// Blocks until the job completes, or returns `None` if the runner was
    /// dropped (and therefore the job never ran).
    pub fn join(self) -> Option<T> {
        self.receiver.recv().ok()
    }
}

/// Coalesces a burst of events into a single callback invocation, firing
/// `window` after the last event in the burst (spec.md §5: "each new
/// event resets the window").
pub struct Debouncer {
    sender: Option<crossbeam_channel::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Debouncer {
    pub fn new<F>(window: Duration, mut on_fire: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let (sender, receiver) = crossbeam_channel::unbounded::<()>();
        let thread = std::thread::spawn(move || loop {
            if receiver.recv().is_err() {
                return;
            }
            loop {
                match receiver.recv_timeout(window) {
                    Ok(()) => continue,
                    Err(RecvTimeoutError::Timeout) => break,
                    Err(RecvTimeoutError::Disconnected) => return,
                }
            }
            on_fire();
        });
        Self {
            sender: Some(sender),
            thread: Some(thread),
        }
    }

    /// Records an event, resetting the debounce window.
    pub fn trigger(&self) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(());
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// How a new debounced event is handled when the previous fire is still
/// running (spec.md §5). `FinishThenFresh` is the documented default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebouncePolicy {
    FinishThenFresh,
    CancelInFlight,
}

struct CoalescerState {
    running: bool,
    pending: bool,
    cancel: Option<CancellationToken>,
}

/// Ties a [`Debouncer`] to a [`TaskRunner`] so a burst of save events
/// produces at most one running snapshot build at a time, with the
/// policy from spec.md §5 governing what happens to an event that
/// arrives while a build is still in flight.
pub struct SnapshotCoalescer {
    debouncer: Debouncer,
}

impl SnapshotCoalescer {
    pub fn new<F>(window: Duration, policy: DebouncePolicy, runner: Arc<TaskRunner>, build: F) -> Self
    where
        F: Fn(&CancellationToken) + Send + Sync + 'static,
    {
        let build: Arc<dyn Fn(&CancellationToken) + Send + Sync> = Arc::new(build);
        let state = Arc::new(Mutex::new(CoalescerState {
            running: false,
            pending: false,
            cancel: None,
        }));

        let debouncer = Debouncer::new(window, move || {
            fire(Arc::clone(&build), Arc::clone(&state), Arc::clone(&runner), policy);
        });

        Self { debouncer }
    }

    /// Records a save/change event, resetting the debounce window.
    pub fn notify(&self) {
        self.debouncer.trigger();
    }
}

fn fire(
    build: Arc<dyn Fn(&CancellationToken) + Send + Sync>,
    state: Arc<Mutex<CoalescerState>>,
    runner: Arc<TaskRunner>,
    policy: DebouncePolicy,
) {
    let mut guard = state.lock().unwrap();
    if guard.running {
        if policy == DebouncePolicy::CancelInFlight {
            if let Some(token) = &guard.cancel {
                token.cancel();
            }
        }
        guard.pending = true;
        return;
    }

    guard.running = true;
    guard.pending = false;
    let token = CancellationToken::new();
    guard.cancel = Some(token.clone());
    drop(guard);

    let job_state = Arc::clone(&state);
    let job_build = Arc::clone(&build);
    let job_runner = Arc::clone(&runner);
    runner.submit("snapshot-coalescer", move || {
        job_build(&token);

        let rerun = {
            let mut guard = job_state.lock().unwrap();
            guard.running = false;
            guard.cancel = None;
            let pending = guard.pending;
            guard.pending = false;
            pending
        };

        if rerun {
            fire(job_build, job_state, job_runner, policy);
        }
    });
}
