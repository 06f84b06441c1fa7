//! Background runtime for one project: a file watcher feeding the
//! notification batcher, a flush loop persisting batches, optional
//! sync-on-change, and Ctrl-C interruptible one-shot syncs.

mod error;
mod interrupt;
mod runtime;

pub use error::DaemonError;
pub use interrupt::{interruptible, run_interruptible};
pub use runtime::{init_tracing, run, start_blocking, WatchOptions, DEBOUNCE_WINDOW};
