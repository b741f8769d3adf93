//! Xyce backend for the characterization engine.
//!
//! Renders a [`spice::Deck`] as a Xyce netlist, runs `Xyce` (optionally
//! under `mpirun`) through a generated run script, and parses measurement
//! scalars from the `.mt0` file and saved vectors from the `.prn` tables.
#![warn(missing_docs)]

#[cfg(any(unix, target_os = "redox"))]
use std::os::unix::prelude::PermissionsExt;
use std::path::PathBuf;

use spice::deck::Analysis;
use spice::sim::{SimContext, SimRecord, Simulator};
use spice::{Deck, SimError};
use tracing::debug;

use crate::templates::{write_run_script, RunScriptContext};

pub mod error;
pub mod netlist;
pub mod output;
pub(crate) mod templates;

#[cfg(test)]
mod tests;

/// How many processes a Xyce run occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parallelism {
    /// A single serial `Xyce` process.
    #[default]
    Serial,
    /// `mpirun -np <processes> Xyce`.
    Parallel {
        /// The MPI process count.
        processes: usize,
    },
}

/// The Xyce simulator.
#[derive(Debug, Clone, Default)]
pub struct Xyce {
    /// Process layout of each run.
    pub parallelism: Parallelism,
    /// Extra flags appended to the `Xyce` invocation.
    pub flags: String,
    /// Optional shell rc file sourced before invoking Xyce.
    pub bashrc: Option<PathBuf>,
}

impl Xyce {
    /// Creates a serial backend with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a parallel backend running under `mpirun -np <processes>`.
    pub fn parallel(processes: usize) -> Self {
        Self {
            parallelism: Parallelism::Parallel { processes },
            ..Self::default()
        }
    }
}

impl Simulator for Xyce {
    fn name(&self) -> &'static str {
        "xyce"
    }

    fn simulate(&self, ctx: &SimContext, deck: &Deck) -> Result<SimRecord, SimError> {
        std::fs::create_dir_all(&ctx.work_dir)?;
        let netlist = ctx.work_dir.join("netlist.cir");
        let log_path = ctx.work_dir.join("xyce.log");
        let err_path = ctx.work_dir.join("xyce.err");
        let run_script = ctx.work_dir.join("simulate.sh");

        let mut f = std::fs::File::create(&netlist)?;
        netlist::write_deck(&mut f, deck)?;

        let processes = match self.parallelism {
            Parallelism::Serial => None,
            Parallelism::Parallel { processes } => Some(processes),
        };
        write_run_script(
            RunScriptContext {
                netlist: &netlist,
                log_path: &log_path,
                err_path: &err_path,
                bashrc: self.bashrc.as_ref(),
                flags: &self.flags,
                processes,
            },
            &run_script,
        )
        .map_err(SimError::from)?;
        let mut perms = std::fs::metadata(&run_script)?.permissions();
        #[cfg(any(unix, target_os = "redox"))]
        perms.set_mode(0o744);
        std::fs::set_permissions(&run_script, perms)?;

        spice::exec::run_script(ctx, &run_script)?;

        let mut measures = indexmap::IndexMap::new();
        if !deck.measurements.is_empty() {
            let mt0 = ctx.work_dir.join("netlist.cir.mt0");
            if mt0.is_file() {
                let text = std::fs::read_to_string(&mt0)?;
                measures = output::parse_measurements(&text, deck).map_err(SimError::from)?;
            }
        }

        // Transient prints land in `<netlist>.prn`, AC prints in
        // `<netlist>.FD.prn`; records keep deck analysis order.
        let mut analyses = Vec::new();
        if !deck.saves.is_empty() {
            for analysis in &deck.analyses {
                let table = match analysis {
                    Analysis::Tran { .. } => ctx.work_dir.join("netlist.cir.prn"),
                    Analysis::AcDecade { .. } => ctx.work_dir.join("netlist.cir.FD.prn"),
                };
                if table.is_file() {
                    let text = std::fs::read_to_string(&table)?;
                    analyses.push(output::parse_prn(&text).map_err(SimError::from)?);
                }
            }
        }
        debug!(
            measures = measures.len(),
            analyses = analyses.len(),
            "parsed xyce results"
        );
        Ok(SimRecord { measures, analyses })
    }
}
