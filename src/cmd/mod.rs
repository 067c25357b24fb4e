//! Command-line argument definitions for the binaries.

pub mod standalone;
