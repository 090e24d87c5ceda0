//! Nested tic/toc wall-clock timers with per-thread collection.
//!
//! Mark the start and end of named intervals on any thread; intervals opened
//! while another is open become its children. Each thread records into its
//! own tree, and finished trees are gathered into one registry per context
//! when the thread exits or a report is requested.
//!
//! ```
//! let timers = tictoc_runtime::Timers::new();
//! timers.tic("load").unwrap();
//! timers.time("parse", || ()).unwrap();
//! timers.toc("load").unwrap();
//! println!("{}", timers.render_report().unwrap());
//! ```
//!
//! The free functions operate on the process-wide [`global()`] context.

mod collector;
mod config;
mod context;
mod error;
mod node;
mod registry;
mod render;
mod stack;

pub use config::{Config, RenderConfig};
pub use context::{global, Span, Timers};
pub use error::{ErrorKind, Result, TimerError};
pub use node::IntervalNode;
pub use render::{Report, ThreadTree, TimeUnit, MAIN_THREAD_HEADER};

/// Start `name` on the calling thread (global context).
pub fn tic(name: &str) -> Result<()> {
    global().tic(name)
}

/// Stop `name` on the calling thread (global context).
pub fn toc(name: &str) -> Result<()> {
    global().toc(name)
}

/// Start `name` and stop it when the returned span drops (global context).
pub fn scope(name: &str) -> Result<Span> {
    global().scope(name)
}

/// Time one call of `f` as `name` (global context).
pub fn time<R>(name: &str, f: impl FnOnce() -> R) -> Result<R> {
    global().time(name, f)
}

/// Move every finished per-thread tree into the global registry.
pub fn collect_all() {
    global().collect_all()
}

/// Snapshot of the global timings. Fails while the caller has an interval open.
pub fn report() -> Result<Report> {
    global().report()
}

/// The global report as text.
pub fn render_report() -> Result<String> {
    global().render_report()
}

/// Forget all global timings of all threads.
pub fn reset() {
    global().reset()
}
