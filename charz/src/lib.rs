//! Standard-cell characterization.
//!
//! Drives an analog circuit simulator over a library of standard cells and
//! folds the measurements into a Liberty timing library: input pin
//! capacitance from AC sweeps, combinational propagation delays and output
//! transitions from worst-case transient analyses, and sequential
//! setup/hold constraints from a binary search around the metastable
//! window.
//!
//! The pipeline: a TOML configuration ([`config::Config`]) describes the
//! library and its cells; [`cell::Cell`] models each cell's ports,
//! functions, and state; [`procedures`] turn cells into independent
//! simulation tasks; [`planner::Planner`] runs the tasks on a worker pool
//! and assembles the library group; [`run`] ties the stages together
//! behind the `charz` command-line interface.
#![warn(missing_docs)]

pub mod cell;
pub mod compare;
pub mod config;
pub mod error;
pub mod planner;
pub mod procedures;
pub mod run;
pub mod variation;

#[cfg(test)]
mod tests;

pub use config::Config;
pub use error::{Error, Result};
pub use run::{run, RunOptions};
