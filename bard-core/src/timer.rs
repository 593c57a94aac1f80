//! Delayed task execution.
//!
//! Chord flushes and delayed broadcasts both go through [`Schedule`]. Two
//! drivers exist: [`TimerThread`] runs tasks on its own thread against the wall
//! clock, [`TickTimer`] holds them until the owner advances it to a given time
//! (the simulation tick, or a test).

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

pub type Task = Box<dyn FnOnce() + Send + 'static>;

pub trait Schedule: Send + Sync {
    /// Run `task` once, no earlier than `delay_ms` from now.
    fn schedule(&self, delay_ms: u64, task: Task);
}

struct Entry<T> {
    due: T,
    seq: u64,
    task: Task,
}

impl<T: Ord> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T: Ord> Eq for Entry<T> {}

impl<T: Ord> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Reversed so BinaryHeap pops the earliest due, then the earliest scheduled.
impl<T: Ord> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

fn run_task(task: Task) {
    if catch_unwind(AssertUnwindSafe(task)).is_err() {
        log::error!(target: "timer", "scheduled task panicked");
    }
}

// ── Tick-driven ─────────────────────────────────────────────────

struct TickQueue {
    now_ms: u64,
    seq: u64,
    heap: BinaryHeap<Entry<u64>>,
}

/// Timer advanced explicitly by its owner.
pub struct TickTimer {
    queue: Mutex<TickQueue>,
}

impl TickTimer {
    pub fn new(now_ms: u64) -> Self {
        Self {
            queue: Mutex::new(TickQueue {
                now_ms,
                seq: 0,
                heap: BinaryHeap::new(),
            }),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.queue.lock().now_ms
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().heap.len()
    }

    /// Move the clock forward and run every task now due, in due order.
    /// Tasks scheduled by a running task with zero delay run in the same call.
    /// Returns the number of tasks run.
    pub fn advance_to(&self, now_ms: u64) -> usize {
        {
            let mut q = self.queue.lock();
            q.now_ms = q.now_ms.max(now_ms);
        }
        let mut ran = 0;
        loop {
            let task = {
                let mut q = self.queue.lock();
                let now = q.now_ms;
                match q.heap.peek() {
                    Some(entry) if entry.due <= now => q.heap.pop().map(|e| e.task),
                    _ => None,
                }
            };
            match task {
                Some(task) => {
                    run_task(task);
                    ran += 1;
                }
                None => return ran,
            }
        }
    }
}

impl Schedule for TickTimer {
    fn schedule(&self, delay_ms: u64, task: Task) {
        let mut q = self.queue.lock();
        let seq = q.seq;
        q.seq += 1;
        let due = q.now_ms.saturating_add(delay_ms);
        q.heap.push(Entry { due, seq, task });
    }
}

// ── Thread-driven ───────────────────────────────────────────────

enum TimerCmd {
    Schedule { due: Instant, task: Task },
    Shutdown,
}

/// Timer with its own thread. Dropping it stops the thread; tasks not yet due
/// are discarded.
pub struct TimerThread {
    cmd_tx: Sender<TimerCmd>,
    join_handle: Option<JoinHandle<()>>,
}

impl TimerThread {
    pub fn spawn() -> std::io::Result<Self> {
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        let join_handle = std::thread::Builder::new()
            .name("bard-timer".into())
            .spawn(move || timer_loop(cmd_rx))?;
        Ok(Self {
            cmd_tx,
            join_handle: Some(join_handle),
        })
    }
}

impl Schedule for TimerThread {
    fn schedule(&self, delay_ms: u64, task: Task) {
        let due = Instant::now() + Duration::from_millis(delay_ms);
        if self.cmd_tx.send(TimerCmd::Schedule { due, task }).is_err() {
            log::warn!(target: "timer", "timer thread gone, dropping task");
        }
    }
}

impl Drop for TimerThread {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(TimerCmd::Shutdown);
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

fn timer_loop(cmd_rx: Receiver<TimerCmd>) {
    const IDLE_WAIT: Duration = Duration::from_millis(250);

    let mut heap: BinaryHeap<Entry<Instant>> = BinaryHeap::new();
    let mut seq = 0u64;

    loop {
        let wait = heap
            .peek()
            .map(|e| e.due.saturating_duration_since(Instant::now()))
            .unwrap_or(IDLE_WAIT);

        crossbeam_channel::select! {
            recv(cmd_rx) -> result => {
                match result {
                    Ok(TimerCmd::Schedule { due, task }) => {
                        heap.push(Entry { due, seq, task });
                        seq += 1;
                    }
                    Ok(TimerCmd::Shutdown) | Err(_) => break,
                }
            }
            default(wait) => {}
        }

        let now = Instant::now();
        while heap.peek().is_some_and(|e| e.due <= now) {
            if let Some(entry) = heap.pop() {
                run_task(entry.task);
            }
        }
    }

    if !heap.is_empty() {
        log::debug!(target: "timer", "discarding {} pending tasks on shutdown", heap.len());
    }
}
