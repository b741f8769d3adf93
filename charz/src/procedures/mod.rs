//! Characterization procedures.
//!
//! A procedure is a factory producing independent [`Task`]s for one cell.
//! Each task runs its own simulations, folds the measurements, and returns
//! a fresh partial `cell` group; the planner merges those groups into the
//! library. Procedures are looked up by configured name in [`REGISTRY`].

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use arcstr::ArcStr;
use indexmap::IndexMap;
use lazy_static::lazy_static;
use liberty::Group;
use spice::{SimContext, SimRecord, Simulator};
use tracing::debug;

use crate::cell::Cell;
use crate::config::{ConfigError, LibraryUnits, LogicThresholds, NamedNodes, Settings};
use crate::error::{Error, Result};

pub mod capacitance;
pub mod combinational;
mod harness;
pub mod sequential;

/// The shared simulation environment: units, thresholds, supplies, and
/// debug artifact placement.
#[derive(Debug, Clone)]
pub struct SimEnv {
    /// Library units.
    pub units: LibraryUnits,
    /// Logic thresholds.
    pub thresholds: LogicThresholds,
    /// Supply and well nodes.
    pub nodes: NamedNodes,
    /// Simulation temperature in degrees Celsius.
    pub temperature: f64,
    /// Keep per-task artifacts.
    pub debug: bool,
    /// Root of the artifact tree.
    pub debug_dir: PathBuf,
}

impl SimEnv {
    /// Builds the environment from validated settings.
    pub fn new(settings: &Settings) -> Result<Self> {
        Ok(Self {
            units: settings.units.parse().map_err(Error::Config)?,
            thresholds: settings.logic_thresholds,
            nodes: settings.named_nodes.clone(),
            temperature: settings.temperature,
            debug: settings.debug,
            debug_dir: settings.debug_dir.clone(),
        })
    }

    /// The supply voltage.
    pub fn vdd(&self) -> f64 {
        self.nodes.primary_power.voltage
    }

    /// The ground voltage.
    pub fn vss(&self) -> f64 {
        self.nodes.primary_ground.voltage
    }

    /// The voltage at `percent` of the supply swing.
    pub fn threshold(&self, percent: f64) -> f64 {
        self.vss() + percent / 100.0 * (self.vdd() - self.vss())
    }

    /// Full-swing transition time in seconds for a slew expressed in
    /// library time units. Slews are measured between the low and high
    /// thresholds, so the full swing takes `slew / (high - low)`.
    pub fn slew_seconds(&self, slew: f64) -> f64 {
        let fraction = (self.thresholds.high - self.thresholds.low) / 100.0;
        self.units.time.to_si(slew) / fraction
    }

    /// The artifact directory of one simulation job.
    pub fn work_dir(&self, cell: &str, procedure: &str, variation: &str, job: &str) -> PathBuf {
        self.debug_dir
            .join(cell)
            .join(procedure)
            .join(variation)
            .join(job)
    }

    /// The wall-clock budget of one simulation, derived from its slowest
    /// stimulus edge with a generous floor.
    pub fn timeout(&self, slew: f64) -> Duration {
        let budget = 100.0 * self.slew_seconds(slew) * 1e6;
        Duration::from_secs_f64(budget.max(60.0))
    }
}

/// One cell together with everything needed to simulate it.
#[derive(Clone)]
pub struct CellUnderTest {
    /// The cell model.
    pub cell: Arc<Cell>,
    /// The simulator backend.
    pub simulator: Arc<dyn Simulator>,
    /// The simulation environment.
    pub env: Arc<SimEnv>,
}

/// Execution context handed to a running task.
pub struct TaskCtx {
    /// Cooperative cancellation flag shared with the dispatcher.
    pub cancel: Arc<AtomicBool>,
}

/// An independent unit of characterization work.
pub struct Task {
    /// The cell being characterized.
    pub cell: ArcStr,
    /// The producing procedure's registry name.
    pub procedure: &'static str,
    /// The variation label, for diagnostics and artifact paths.
    pub variation: String,
    run: Box<dyn FnOnce(&TaskCtx) -> Result<Group> + Send>,
}

impl Task {
    /// Creates a task around its work closure.
    pub fn new(
        cell: ArcStr,
        procedure: &'static str,
        variation: String,
        run: impl FnOnce(&TaskCtx) -> Result<Group> + Send + 'static,
    ) -> Self {
        Self {
            cell,
            procedure,
            variation,
            run: Box::new(run),
        }
    }

    /// Runs the task to completion, wrapping any failure with the task's
    /// identity.
    pub fn execute(self, ctx: &TaskCtx) -> Result<Group> {
        debug!(
            cell = %self.cell,
            procedure = self.procedure,
            variation = %self.variation,
            "running task"
        );
        (self.run)(ctx).map_err(|source| Error::ProcedureFailed {
            cell: self.cell,
            procedure: self.procedure,
            variation: self.variation,
            source: Box::new(source),
        })
    }
}

/// A procedure: produces the tasks characterizing one cell.
pub type ProcedureFn = fn(&CellUnderTest, &Settings) -> Result<Vec<Task>>;

lazy_static! {
    /// Registered procedures by configured name.
    pub static ref REGISTRY: IndexMap<&'static str, ProcedureFn> = {
        let mut m: IndexMap<&'static str, ProcedureFn> = IndexMap::new();
        m.insert(capacitance::NAME, capacitance::tasks as ProcedureFn);
        m.insert(combinational::NAME, combinational::tasks as ProcedureFn);
        m.insert(sequential::NAME, sequential::tasks as ProcedureFn);
        m
    };
}

/// Looks up a configured procedure name; `key` names the configuration
/// key in the error.
pub fn lookup(key: &str, name: &str) -> Result<ProcedureFn> {
    REGISTRY
        .get(name)
        .copied()
        .ok_or_else(|| {
            Error::Config(ConfigError::UnknownProcedure {
                key: key.to_string(),
                name: name.to_string(),
            })
        })
}

/// Runs one deck inside its artifact directory, honoring cancellation and
/// the slew-derived timeout. Artifacts are removed afterwards unless the
/// run is in debug mode.
pub(crate) fn run_deck(
    cut: &CellUnderTest,
    ctx: &TaskCtx,
    procedure: &str,
    variation: &str,
    job: &str,
    deck: &spice::Deck,
    slew: f64,
) -> Result<SimRecord> {
    let work_dir = cut.env.work_dir(&cut.cell.name, procedure, variation, job);
    let sim_ctx = SimContext::new(&work_dir)
        .with_timeout(cut.env.timeout(slew))
        .with_cancel(ctx.cancel.clone());
    let result = cut.simulator.simulate(&sim_ctx, deck);
    if let Ok(record) = &result {
        if cut.env.debug || !cut.cell.params.plots.is_empty() {
            harness::dump_waveforms(&work_dir, record)?;
        }
    }
    if !cut.env.debug && cut.cell.params.plots.is_empty() {
        let _ = std::fs::remove_dir_all(&work_dir);
    }
    result.map_err(Error::Sim)
}
