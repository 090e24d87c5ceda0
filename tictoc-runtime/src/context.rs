//! Timer contexts: per-thread records feeding one shared registry.
//!
//! Each thread keeps, per context it has used, a [`ThreadRecord`] that only
//! it writes to. Finished trees move into the context's registry:
//!
//! - when the thread exits (the thread-local container flushes in `Drop`),
//! - when any thread runs a collection, which drains every idle record.
//!
//! Reset bumps a generation counter. A record holding data from an older
//! generation is cleared instead of flushed, so data from before a reset
//! cannot reappear in a later report.

use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::thread::{self, ThreadId};

use crate::collector::{Finished, Records, SharedRecord, ThreadRecord};
use crate::config::Config;
use crate::error::{Result, TimerError};
use crate::registry::{Registry, ThreadEntry};
use crate::render::{Report, ThreadTree, MAIN_THREAD_HEADER};
use crate::stack::TimerStack;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

struct Shared {
    id: u64,
    config: Config,
    registry: Mutex<Registry>,
    generation: AtomicU64,
    records: Records,
}

impl Shared {
    fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Move the tree of `record` into the registry. The record lock is
    /// released before the registry lock is taken.
    fn flush(&self, record: &Mutex<ThreadRecord>, force: bool) {
        let finished = {
            let mut record = record.lock().unwrap_or_else(|e| e.into_inner());
            record.refresh(self.generation());
            record.take(force)
        };
        if let Some(finished) = finished {
            self.absorb(finished);
        }
    }

    fn absorb(&self, finished: Finished) {
        let Finished {
            thread,
            name,
            generation,
            tree,
        } = finished;
        let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        // A reset may have run between taking the tree and getting here.
        if self.generation() != generation {
            tracing::debug!(context = self.id, ?thread, "discarding timers recorded before reset");
            return;
        }
        registry.register(thread, name, tree);
        tracing::debug!(context = self.id, ?thread, "flushed thread timers");
    }
}

struct Slot {
    context: u64,
    shared: Weak<Shared>,
    record: SharedRecord,
}

/// The records of one thread, across all contexts.
#[derive(Default)]
struct LocalStacks {
    slots: Vec<Slot>,
}

impl LocalStacks {
    /// The record of `shared` on this thread, if it has been used here.
    fn find(&self, shared: &Arc<Shared>) -> Option<SharedRecord> {
        self.slots
            .iter()
            .find(|s| s.context == shared.id)
            .map(|s| Arc::clone(&s.record))
    }

    fn get_or_insert(&mut self, shared: &Arc<Shared>) -> SharedRecord {
        if let Some(record) = self.find(shared) {
            return record;
        }
        self.slots.retain(|s| s.shared.strong_count() > 0);
        let record = Arc::new(Mutex::new(ThreadRecord::for_current_thread(
            shared.generation(),
        )));
        shared.records.add(Arc::clone(&record));
        self.slots.push(Slot {
            context: shared.id,
            shared: Arc::downgrade(shared),
            record: Arc::clone(&record),
        });
        record
    }
}

impl Drop for LocalStacks {
    fn drop(&mut self) {
        for slot in &self.slots {
            if let Some(shared) = slot.shared.upgrade() {
                shared.flush(&slot.record, true);
                shared.records.remove(&slot.record);
            }
        }
    }
}

thread_local! {
    static LOCAL: RefCell<LocalStacks> = RefCell::new(LocalStacks::default());
}

/// A set of timers with its own registry.
///
/// Cloning is cheap and yields a handle to the same context. Independent
/// contexts never see each other's timings, even on the same thread.
#[derive(Clone)]
pub struct Timers {
    shared: Arc<Shared>,
}

impl fmt::Debug for Timers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timers")
            .field("id", &self.shared.id)
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

impl Default for Timers {
    fn default() -> Self {
        Self::new()
    }
}

impl Timers {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            shared: Arc::new(Shared {
                id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
                config,
                registry: Mutex::new(Registry::default()),
                generation: AtomicU64::new(0),
                records: Records::default(),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    fn with_stack<R>(&self, f: impl FnOnce(&mut TimerStack) -> R) -> R {
        let record = LOCAL.with(|local| local.borrow_mut().get_or_insert(&self.shared));
        let mut record = record.lock().unwrap_or_else(|e| e.into_inner());
        record.refresh(self.shared.generation());
        f(&mut record.stack)
    }

    fn peek_stack<R>(&self, f: impl FnOnce(Option<&TimerStack>) -> R) -> R {
        match LOCAL.with(|local| local.borrow().find(&self.shared)) {
            Some(record) => {
                let mut record = record.lock().unwrap_or_else(|e| e.into_inner());
                record.refresh(self.shared.generation());
                f(Some(&record.stack))
            }
            None => f(None),
        }
    }

    /// Start the interval `name` below the innermost open interval of the
    /// calling thread.
    pub fn tic(&self, name: &str) -> Result<()> {
        self.with_stack(|stack| stack.tic(name))
    }

    /// Stop the innermost open interval, which must be called `name`.
    pub fn toc(&self, name: &str) -> Result<()> {
        self.with_stack(|stack| stack.toc(name))
    }

    /// Start `name` now and stop it when the returned span is dropped.
    pub fn scope(&self, name: &str) -> Result<Span> {
        self.tic(name)?;
        Ok(Span {
            timers: self.clone(),
            name: name.to_owned(),
            finished: false,
        })
    }

    /// Time one call of `f` as the interval `name`.
    pub fn time<R>(&self, name: &str, f: impl FnOnce() -> R) -> Result<R> {
        self.tic(name)?;
        let out = f();
        self.toc(name)?;
        Ok(out)
    }

    /// Whether the calling thread has an interval open in this context.
    pub fn is_open(&self) -> bool {
        self.peek_stack(|stack| stack.is_some_and(TimerStack::is_open))
    }

    /// Labels of the calling thread's open intervals, outermost first.
    pub fn open_intervals(&self) -> Vec<String> {
        self.peek_stack(|stack| stack.map(TimerStack::open_path).unwrap_or_default())
    }

    /// Move every finished tree into the registry: the calling thread's own
    /// and those of all other live threads that have nothing open.
    ///
    /// Never waits for other threads beyond the brief lock of their record.
    /// Threads with an interval still open keep their tree until a later
    /// collection or until they exit.
    pub fn collect_all(&self) {
        let records = self.shared.records.snapshot();
        tracing::debug!(context = self.shared.id, threads = records.len(), "collecting timers");
        for record in &records {
            self.shared.flush(record, false);
        }
    }

    /// Collect everything and take a snapshot of the registry.
    ///
    /// Fails while the calling thread still has an open interval, since that
    /// interval could never appear in the snapshot.
    pub fn report(&self) -> Result<Report> {
        if let Some(open) = self.peek_stack(|stack| stack.and_then(|s| s.open_label().map(str::to_owned))) {
            return Err(TimerError::UnstoppedInterval(open));
        }
        self.collect_all();

        let me = thread::current().id();
        let registry = self.shared.registry.lock().unwrap_or_else(|e| e.into_inner());
        let threads = registry
            .entries()
            .iter()
            .map(|entry| ThreadTree::new(header(entry, me), entry.tree.clone()))
            .collect();
        Ok(Report::new(threads).with_render_config(self.shared.config.render.clone()))
    }

    /// The text form of [`Timers::report`].
    pub fn render_report(&self) -> Result<String> {
        Ok(self.report()?.to_string())
    }

    /// Forget every timing of every thread, including intervals still open.
    pub fn reset(&self) {
        // Drain first so no tree in flight can land after the clear.
        self.collect_all();
        let generation = {
            let mut registry = self.shared.registry.lock().unwrap_or_else(|e| e.into_inner());
            registry.clear();
            self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1
        };
        // Every record is cleared now, open intervals included.
        for record in self.shared.records.snapshot() {
            record
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .refresh(generation);
        }
        tracing::debug!(context = self.shared.id, "timers reset");
    }

    /// Whether nothing has been collected yet.
    pub fn is_empty(&self) -> bool {
        self.shared
            .registry
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty()
    }

    /// Number of live threads that have used this context.
    pub fn active_threads(&self) -> usize {
        self.shared.records.len()
    }
}

fn header(entry: &ThreadEntry, me: ThreadId) -> String {
    if entry.thread == me {
        MAIN_THREAD_HEADER.to_owned()
    } else if let Some(name) = &entry.name {
        format!("thread '{name}'")
    } else {
        format!("thread {:?}", entry.thread)
    }
}

/// RAII interval. Stops its timer on drop.
#[must_use = "dropping the span immediately stops the timer; bind it with `let _span = ...`"]
pub struct Span {
    timers: Timers,
    name: String,
    finished: bool,
}

impl Span {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop the interval now, reporting a failing toc instead of logging it.
    pub fn finish(mut self) -> Result<()> {
        self.finished = true;
        self.timers.toc(&self.name)
    }
}

impl Drop for Span {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.timers.toc(&self.name) {
                tracing::warn!(error = %e, "span dropped out of order");
            }
        }
    }
}

/// The process-wide context behind the crate's free functions.
pub fn global() -> &'static Timers {
    static GLOBAL: OnceLock<Timers> = OnceLock::new();
    GLOBAL.get_or_init(Timers::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    fn sleep_ms(ms: u64) {
        thread::sleep(Duration::from_millis(ms));
    }

    #[test]
    fn tic_toc_round_trip_reports_duration_and_count() {
        let timers = Timers::new();
        timers.tic("X").unwrap();
        sleep_ms(20);
        timers.toc("X").unwrap();

        let report = timers.report().unwrap();
        let main = report.thread(MAIN_THREAD_HEADER).unwrap();
        let x = main.root().find_child("X").unwrap();
        assert_eq!(x.calls(), 1);
        assert!(x.elapsed() >= Duration::from_millis(20));

        timers.reset();
        timers.tic("X").unwrap();
        sleep_ms(10);
        timers.toc("X").unwrap();
        timers.tic("X").unwrap();
        sleep_ms(10);
        timers.toc("X").unwrap();
        let report = timers.report().unwrap();
        let x = report.threads()[0].root().find_child("X").unwrap();
        assert_eq!(x.calls(), 2);
        assert!(x.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn contexts_are_independent() {
        let a = Timers::new();
        let b = Timers::new();
        a.tic("only-a").unwrap();
        a.toc("only-a").unwrap();
        assert!(b.report().unwrap().is_empty());
        assert!(b.toc("only-a").is_err());
        assert_eq!(a.report().unwrap().threads().len(), 1);
    }

    #[test]
    fn report_fails_while_interval_open() {
        let timers = Timers::new();
        timers.tic("label1").unwrap();
        let err = timers.report().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnstoppedInterval);
        assert!(timers.is_open());
        timers.toc("label1").unwrap();
        assert!(timers.report().is_ok());
    }

    #[test]
    fn reset_twice_reports_nothing() {
        let timers = Timers::new();
        timers.time("work", || sleep_ms(1)).unwrap();
        timers.reset();
        timers.reset();
        assert_eq!(timers.render_report().unwrap(), "No timings to report.\n");
        assert!(timers.is_empty());
    }

    #[test]
    fn reset_discards_open_intervals() {
        let timers = Timers::new();
        timers.tic("dangling").unwrap();
        timers.reset();
        assert!(!timers.is_open());
        assert_eq!(
            timers.toc("dangling").unwrap_err().kind(),
            ErrorKind::NoOpenInterval
        );
        assert!(timers.report().unwrap().is_empty());
    }

    #[test]
    fn repeated_reports_accumulate() {
        let timers = Timers::new();
        timers.time("step", || ()).unwrap();
        let first = timers.report().unwrap();
        assert_eq!(first.threads()[0].root().find_child("step").unwrap().calls(), 1);

        timers.time("step", || ()).unwrap();
        let second = timers.report().unwrap();
        assert_eq!(second.threads().len(), 1);
        assert_eq!(second.threads()[0].root().find_child("step").unwrap().calls(), 2);
    }

    #[test]
    fn scope_stops_on_drop() {
        let timers = Timers::new();
        {
            let _outer = timers.scope("outer").unwrap();
            let inner = timers.scope("inner").unwrap();
            assert_eq!(inner.name(), "inner");
            assert_eq!(timers.open_intervals(), vec!["outer", "inner"]);
            inner.finish().unwrap();
        }
        assert!(!timers.is_open());
        let report = timers.report().unwrap();
        let outer = report.threads()[0].root().find_child("outer").unwrap();
        assert_eq!(outer.find_child("inner").unwrap().calls(), 1);
    }

    #[test]
    fn exiting_thread_flushes_into_registry() {
        let timers = Timers::new();
        let worker = timers.clone();
        thread::Builder::new()
            .name("exit-flush".into())
            .spawn(move || {
                worker.time("in thread", || sleep_ms(5)).unwrap();
            })
            .unwrap()
            .join()
            .unwrap();

        let report = timers.report().unwrap();
        let tree = report.thread("thread 'exit-flush'").unwrap();
        assert_eq!(tree.root().find_child("in thread").unwrap().calls(), 1);
        assert!(report.thread(MAIN_THREAD_HEADER).is_none());
    }

    #[test]
    fn thread_exiting_with_open_interval_still_flushes() {
        let timers = Timers::new();
        let worker = timers.clone();
        thread::spawn(move || {
            worker.tic("never closed").unwrap();
            sleep_ms(2);
        })
        .join()
        .unwrap();

        let report = timers.report().unwrap();
        let node = report.threads()[0].root().find_child("never closed").unwrap();
        assert_eq!(node.calls(), 1);
        assert!(!node.is_running());
    }

    #[test]
    fn stale_stack_from_before_reset_is_discarded() {
        let timers = Timers::new();
        let worker = timers.clone();
        let (ready_tx, ready_rx) = mpsc::channel();
        let (go_tx, go_rx) = mpsc::channel::<()>();
        let handle = thread::spawn(move || {
            worker.time("before reset", || ()).unwrap();
            ready_tx.send(()).unwrap();
            go_rx.recv().unwrap();
        });
        ready_rx.recv().unwrap();
        timers.reset();
        go_tx.send(()).unwrap();
        handle.join().unwrap();

        assert!(timers.report().unwrap().is_empty());
    }

    #[test]
    fn idle_live_thread_is_collected_without_exiting() {
        let timers = Timers::new();
        let worker = timers.clone();
        let (ready_tx, ready_rx) = mpsc::channel();
        let (go_tx, go_rx) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("idle".into())
            .spawn(move || {
                worker.time("done early", || ()).unwrap();
                ready_tx.send(()).unwrap();
                go_rx.recv().unwrap();
            })
            .unwrap();
        ready_rx.recv().unwrap();

        let report = timers.report().unwrap();
        let idle = report.thread("thread 'idle'").unwrap();
        assert_eq!(idle.root().find_child("done early").unwrap().calls(), 1);
        assert_eq!(timers.active_threads(), 1);

        go_tx.send(()).unwrap();
        handle.join().unwrap();
        assert_eq!(timers.active_threads(), 0);
        // Nothing new was recorded, so the exit flush adds nothing.
        let report = timers.report().unwrap();
        let idle = report.thread("thread 'idle'").unwrap();
        assert_eq!(idle.root().find_child("done early").unwrap().calls(), 1);
    }

    #[test]
    fn busy_thread_does_not_hold_up_collection() {
        let timers = Timers::new();
        let worker = timers.clone();
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (stopped_tx, stopped_rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("busy".into())
            .spawn(move || {
                worker.tic("waiting for main").unwrap();
                started_tx.send(()).unwrap();
                release_rx.recv().unwrap();
                worker.toc("waiting for main").unwrap();
                stopped_tx.send(()).unwrap();
                // Stay alive until the main thread is done.
                let _ = release_rx.recv();
            })
            .unwrap();
        started_rx.recv().unwrap();

        timers.time("main work", || ()).unwrap();
        let start = Instant::now();
        let report = timers.report().unwrap();
        assert!(start.elapsed() < Duration::from_millis(500));
        assert!(report.thread("thread 'busy'").is_none());
        assert!(report.thread(MAIN_THREAD_HEADER).is_some());

        release_tx.send(()).unwrap();
        stopped_rx.recv().unwrap();
        let report = timers.report().unwrap();
        let busy = report.thread("thread 'busy'").unwrap();
        assert_eq!(busy.root().find_child("waiting for main").unwrap().calls(), 1);

        drop(release_tx);
        handle.join().unwrap();
    }

    #[test]
    fn reset_clears_open_intervals_of_other_threads() {
        let timers = Timers::new();
        let worker = timers.clone();
        let (ready_tx, ready_rx) = mpsc::channel();
        let (go_tx, go_rx) = mpsc::channel::<()>();
        let (checked_tx, checked_rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            worker.tic("open across reset").unwrap();
            ready_tx.send(()).unwrap();
            go_rx.recv().unwrap();
            checked_tx.send(worker.is_open()).unwrap();
        });
        ready_rx.recv().unwrap();
        timers.reset();
        go_tx.send(()).unwrap();
        assert!(!checked_rx.recv().unwrap());
        handle.join().unwrap();
        assert!(timers.report().unwrap().is_empty());
    }

    #[test]
    fn failed_toc_leaves_state_unchanged() {
        let timers = Timers::new();
        timers.tic("a").unwrap();
        assert!(timers.toc("b").is_err());
        assert_eq!(timers.open_intervals(), vec!["a"]);
        timers.toc("a").unwrap();
    }
}
