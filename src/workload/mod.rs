//! Converts MapReduce application names to actual application code.
//!
//! Every workload here treats its input keys as file paths, which makes
//! the mapping cache worthwhile: a second run over the same files replays
//! the cached pairs instead of reading and scanning them again.
//!
//! # Example
//!
//! To get the word count application:
//! ```
//! # use anyhow::Result;
//! use mrcache::workload::{self, Workload};
//! # fn main() -> Result<()> {
//! let wc = workload::named("wc")?;
//! assert_eq!(wc, Workload::WordCount);
//! # Ok(())
//! # }
//! ```

use anyhow::{bail, Result};

pub mod grep;
pub mod wc;

/// The applications the standalone binary knows how to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Workload {
    WordCount,
    Grep,
}

/// Gets the [`Workload`] named `name`.
///
/// Returns [`None`] if no application with the given name was found.
pub fn try_named(name: &str) -> Option<Workload> {
    match name {
        "wc" => Some(Workload::WordCount),
        "grep" => Some(Workload::Grep),
        _ => None,
    }
}

/// Gets the [`Workload`] named `name`.
///
/// Returns an [`anyhow::Error`] if no application with the given name was found.
pub fn named(name: &str) -> Result<Workload> {
    match try_named(name) {
        Some(app) => Ok(app),
        None => bail!("No app named `{}` found.", name),
    }
}
