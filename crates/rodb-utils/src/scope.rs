//! Bounded parallel execution scope.
//!
//! `Scope::run` executes a finite set of fallible tasks with a target
//! parallelism of `2 × CPU` by default. Admission is *loose*: when every
//! seat is taken the submitting thread runs the task inline instead of
//! blocking, so a task that re-enters the scope cannot deadlock it.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::cancel::{CancelToken, Cancelled};

/// Error produced by [`Scope::run`].
#[derive(Debug, thiserror::Error)]
pub enum ScopeError<E> {
    /// The first task error raised; remaining tasks were not started.
    #[error("{0}")]
    Task(E),

    /// The cancellation token fired before all tasks were admitted.
    #[error("operation cancelled")]
    Cancelled,
}

impl<E> ScopeError<E> {
    /// Unwrap into the task error, mapping the cancelled case.
    pub fn into_task_error(self, cancelled: impl FnOnce() -> E) -> E {
        match self {
            Self::Task(e) => e,
            Self::Cancelled => cancelled(),
        }
    }
}

impl<E> From<Cancelled> for ScopeError<E> {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

/// A reusable parallel fan-out scope.
pub struct Scope {
    target: usize,
    /// Seats still available for worker threads.
    seats: Mutex<usize>,
    /// Lowest observed free-seat count. Diagnostics only.
    floor: AtomicUsize,
    token: CancelToken,
}

impl Scope {
    /// Create a scope with the default target parallelism of `2 × CPU`.
    pub fn new(token: CancelToken) -> Arc<Self> {
        let cpus = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(2);
        Self::with_parallelism(cpus * 2, token)
    }

    /// Create a scope with an explicit target parallelism (≥ 1).
    pub fn with_parallelism(target: usize, token: CancelToken) -> Arc<Self> {
        let target = target.max(1);
        Arc::new(Self {
            target,
            seats: Mutex::new(target),
            floor: AtomicUsize::new(target),
            token,
        })
    }

    /// The configured target parallelism.
    pub fn target_parallelism(&self) -> usize {
        self.target
    }

    /// Lowest free-seat count observed so far. Diagnostics only.
    pub fn floor(&self) -> usize {
        self.floor.load(Ordering::Relaxed)
    }

    /// The cancellation token this scope observes.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.token
    }

    /// Run all tasks, returning their results in submission order.
    ///
    /// The first task error stops admission of the remaining tasks and is
    /// propagated; results of sibling tasks are discarded. The cancellation
    /// token is checked before each admission.
    pub fn run<T, E, F>(&self, tasks: Vec<F>) -> Result<Vec<T>, ScopeError<E>>
    where
        F: FnOnce() -> Result<T, E> + Send,
        T: Send,
        E: Send,
    {
        let slots: Mutex<Vec<Option<T>>> = Mutex::new((0..tasks.len()).map(|_| None).collect());
        let first_err: Mutex<Option<ScopeError<E>>> = Mutex::new(None);
        let failed = AtomicBool::new(false);

        crossbeam::thread::scope(|s| {
            for (i, task) in tasks.into_iter().enumerate() {
                if failed.load(Ordering::SeqCst) {
                    break;
                }
                if self.token.is_cancelled() {
                    record_err(&first_err, &failed, ScopeError::Cancelled);
                    break;
                }

                if self.try_take_seat() {
                    let slots = &slots;
                    let first_err = &first_err;
                    let failed = &failed;
                    s.spawn(move |_| {
                        match task() {
                            Ok(value) => slots.lock().unwrap()[i] = Some(value),
                            Err(e) => record_err(first_err, failed, ScopeError::Task(e)),
                        }
                        self.give_seat();
                    });
                } else {
                    // Loose admission: no seat free, run on this thread.
                    match task() {
                        Ok(value) => slots.lock().unwrap()[i] = Some(value),
                        Err(e) => record_err(&first_err, &failed, ScopeError::Task(e)),
                    }
                }
            }
        })
        .expect("scope worker panicked");

        if let Some(err) = first_err.into_inner().unwrap() {
            return Err(err);
        }
        let results = slots
            .into_inner()
            .unwrap()
            .into_iter()
            .map(|slot| slot.expect("task completed without result"))
            .collect();
        Ok(results)
    }

    fn try_take_seat(&self) -> bool {
        let mut seats = self.seats.lock().unwrap();
        if *seats == 0 {
            return false;
        }
        *seats -= 1;
        self.floor.fetch_min(*seats, Ordering::Relaxed);
        true
    }

    fn give_seat(&self) {
        *self.seats.lock().unwrap() += 1;
    }
}

fn record_err<E>(first_err: &Mutex<Option<E>>, failed: &AtomicBool, err: E) {
    let mut guard = first_err.lock().unwrap();
    if guard.is_none() {
        *guard = Some(err);
        failed.store(true, Ordering::SeqCst);
    }
}
