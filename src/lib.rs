pub mod canon;
pub mod error;
pub mod eval;
pub mod fs;
mod glob;
pub mod graph;
pub mod load;
pub mod parse;
pub mod process;
mod process_posix;
pub mod progress;
pub mod rules;
pub mod run;
pub mod scanner;
mod signal;
pub mod stale;
mod task;
pub mod trace;
pub mod work;

pub use glob::glob;

#[cfg(not(any(windows, target_arch = "wasm32")))]
use jemallocator::Jemalloc;

#[cfg(not(any(windows, target_arch = "wasm32")))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;
