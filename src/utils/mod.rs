//! Filesystem and terminal helpers shared by the pipeline stages.
//!
//! - [`fs`] - async file reads and writes with path-carrying errors
//! - [`progress`] - progress bars and the transform completion counter

pub mod fs;
pub mod progress;

pub use fs::{ensure_parent_dir, read_file, read_text_file, write_file};
pub use progress::{CompletionCounter, ProgressBar};
