//! The run driver: configuration in, finished `.lib` out.
//!
//! Loads and validates the configuration, builds the cell models, selects
//! the simulator backend, collects every procedure's tasks, hands them to
//! the planner, and renders the assembled library. Relative paths in the
//! configuration (netlists, models, result and debug directories) are
//! anchored at the configuration file's directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use liberty::{Group, Value};
use ngspice::Ngspice;
use regex::Regex;
use spice::Simulator;
use tracing::{info, warn};
use xyce::Xyce;

use crate::cell::{Cell, Direction, Role, Trigger};
use crate::config::{Backend, Config, Settings};
use crate::error::{Error, Result};
use crate::planner::{attach_templates, Planner};
use crate::procedures::{lookup, CellUnderTest, SimEnv, Task};

/// Decimal digits for general float attributes.
const PRECISION: usize = 4;
/// Decimal digits inside LUT index and value blocks.
const LUT_PRECISION: usize = 6;

/// Options of one `run` invocation.
#[derive(Debug)]
pub struct RunOptions {
    /// A `.toml` file or a directory containing `charz.toml`.
    pub config: PathBuf,
    /// Overrides `<results_dir>/<lib_name>.lib`.
    pub output: Option<PathBuf>,
    /// Overrides the worker count.
    pub jobs: Option<usize>,
    /// Cell-name filters, OR-combined; empty selects every cell.
    pub filters: Vec<Regex>,
    /// Keep per-task simulation artifacts.
    pub debug: bool,
    /// A reference library to compare the result against.
    pub compare_with: Option<PathBuf>,
}

/// Characterizes a library end to end and writes the `.lib` file.
pub fn run(options: &RunOptions) -> Result<()> {
    let (mut config, base_dir) = load(&options.config)?;
    config.settings.debug |= options.debug;
    let simulator = backend_simulator(config.settings.simulation.backend);
    let jobs = job_count(&config.settings, options.jobs);
    let library = characterize(&config, &base_dir, simulator, jobs, &options.filters)?;

    let results_dir = anchored(&config.settings.results_dir, &base_dir);
    let out_path = match &options.output {
        Some(path) => path.clone(),
        None => results_dir.join(format!("{}.lib", config.settings.lib_name)),
    };
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&out_path, library.to_liberty(0, PRECISION, LUT_PRECISION))?;
    info!(path = %out_path.display(), "library written");

    if let Some(reference) = &options.compare_with {
        crate::compare::compare(reference, &out_path, &results_dir)?;
    }
    Ok(())
}

/// Resolves the configuration path and its anchor directory.
fn load(path: &Path) -> Result<(Config, PathBuf)> {
    let config = Config::load(path).map_err(Error::Config)?;
    let base_dir = if path.is_dir() {
        path.to_path_buf()
    } else {
        path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf()
    };
    Ok((config, base_dir))
}

fn anchored(path: &Path, base_dir: &Path) -> PathBuf {
    if path.is_relative() {
        base_dir.join(path)
    } else {
        path.to_path_buf()
    }
}

/// The simulator implementing the configured backend.
pub fn backend_simulator(backend: Backend) -> Arc<dyn Simulator> {
    match backend {
        // The shared-library binding is served by the same batch driver.
        Backend::NgspiceShared | Backend::NgspiceSubprocess => Arc::new(Ngspice::new()),
        Backend::XyceSerial => Arc::new(Xyce::new()),
        Backend::XyceParallel => Arc::new(Xyce::parallel(host_parallelism())),
    }
}

fn host_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1)
}

/// The worker count: CLI override first, then the `multithreaded` flag.
pub fn job_count(settings: &Settings, requested: Option<usize>) -> usize {
    match requested {
        Some(jobs) => jobs.max(1),
        None if settings.multithreaded => host_parallelism(),
        None => 1,
    }
}

/// Characterizes every selected cell against `simulator` and returns the
/// assembled library group.
pub fn characterize(
    config: &Config,
    base_dir: &Path,
    simulator: Arc<dyn Simulator>,
    jobs: usize,
    filters: &[Regex],
) -> Result<Group> {
    let settings = &config.settings;
    let env = Arc::new(SimEnv::new(settings)?);
    let mut library = library_header(settings)?;

    let mut tasks: Vec<Task> = Vec::new();
    for name in config.cells.keys() {
        if !selected(name, filters) {
            continue;
        }
        let cell_config = config.cell(name).ok_or_else(|| {
            Error::Internal(format!("cell `{name}` vanished from the configuration"))
        })?;
        let cell = Arc::new(Cell::build(name, &cell_config, base_dir)?);
        info!(cell = %cell.name, "cell model built");
        library.add_group(base_cell_group(&cell, settings)?);
        let cut = CellUnderTest {
            cell,
            simulator: simulator.clone(),
            env: env.clone(),
        };
        for (key, procedure) in [
            (
                "settings.simulation.input_capacitance_procedure",
                &settings.simulation.input_capacitance_procedure,
            ),
            (
                "settings.simulation.combinational_delay_procedure",
                &settings.simulation.combinational_delay_procedure,
            ),
            (
                "settings.simulation.metastability_delay_procedure",
                &settings.simulation.metastability_delay_procedure,
            ),
        ] {
            let factory = lookup(key, procedure)?;
            tasks.extend(factory(&cut, settings)?);
        }
    }
    if tasks.is_empty() {
        warn!("no cells selected; writing an empty library");
    }

    Planner::new(jobs, settings.omit_on_failure).execute(tasks, &mut library)?;
    attach_templates(&mut library);
    Ok(library)
}

fn selected(name: &str, filters: &[Regex]) -> bool {
    filters.is_empty() || filters.iter().any(|re| re.is_match(name))
}

/// The library group with its fixed header attributes.
fn library_header(settings: &Settings) -> Result<Group> {
    let units = &settings.units;
    let mut library =
        Group::with_identifier("library", settings.lib_name.clone()).map_err(Error::Liberty)?;
    library.add_attribute("technology", Value::List(vec![Value::from("cmos")]));
    library.add_attribute("delay_model", "table_lookup");
    library.add_attribute("time_unit", format!("1{}", units.time).as_str());
    library.add_attribute("voltage_unit", format!("1{}", units.voltage).as_str());
    library.add_attribute("current_unit", format!("1{}", units.current).as_str());
    library.add_attribute(
        "pulling_resistance_unit",
        format!("1{}", units.pulling_resistance).as_str(),
    );
    library.add_attribute(
        "leakage_power_unit",
        format!("1{}", units.leakage_power).as_str(),
    );
    library.add_attribute(
        "capacitive_load_unit",
        Value::List(vec![
            Value::Int(1),
            Value::from(units.capacitive_load.as_str()),
        ]),
    );
    library.add_attribute("revision", "1.0");
    library.add_attribute("nom_temperature", settings.temperature);
    library.add_attribute("nom_voltage", settings.named_nodes.primary_power.voltage);
    let thresholds = settings.logic_thresholds;
    library.add_attribute("slew_lower_threshold_pct_rise", thresholds.low);
    library.add_attribute("slew_lower_threshold_pct_fall", thresholds.low);
    library.add_attribute("slew_upper_threshold_pct_rise", thresholds.high);
    library.add_attribute("slew_upper_threshold_pct_fall", thresholds.high);
    library.add_attribute("input_threshold_pct_rise", thresholds.rising);
    library.add_attribute("input_threshold_pct_fall", thresholds.falling);
    library.add_attribute("output_threshold_pct_rise", thresholds.rising);
    library.add_attribute("output_threshold_pct_fall", thresholds.falling);
    Ok(library)
}

/// The skeleton `cell` group the procedure results merge into: area,
/// supply pins, pin directions, and the sequential storage group.
fn base_cell_group(cell: &Cell, settings: &Settings) -> Result<Group> {
    let mut group = Group::with_identifier("cell", cell.name.clone()).map_err(Error::Liberty)?;
    if let Some(area) = cell.params.area {
        group.add_attribute("area", area);
    }

    for (node, pg_type) in [
        (Some(&settings.named_nodes.primary_power), "primary_power"),
        (Some(&settings.named_nodes.primary_ground), "primary_ground"),
        (settings.named_nodes.pwell.as_ref(), "pwell"),
        (settings.named_nodes.nwell.as_ref(), "nwell"),
    ] {
        let Some(node) = node else { continue };
        if !cell.subckt.has_port(&node.name) {
            continue;
        }
        let mut pg_pin =
            Group::with_identifier("pg_pin", node.name.clone()).map_err(Error::Liberty)?;
        pg_pin.add_attribute("pg_type", pg_type);
        pg_pin.add_attribute("voltage_name", node.name.clone());
        group.add_group(pg_pin);
    }

    if let Some(model) = &cell.sequential {
        let mut ff =
            Group::with_identifier("ff", model.alias.clone()).map_err(Error::Liberty)?;
        let clock = model.function.clock();
        ff.add_attribute(
            "clocked_on",
            clock.asserted().to_string().as_str(),
        );
        ff.add_attribute("next_state", model.function.data().to_string().as_str());
        if let Some(preset) = model.function.preset() {
            ff.add_attribute("preset", preset.asserted().to_string().as_str());
        }
        if let Some(clear) = model.function.clear() {
            ff.add_attribute("clear", clear.asserted().to_string().as_str());
        }
        group.add_group(ff);
    }

    for port in cell.ports.values() {
        if !port.role.is_signal() {
            continue;
        }
        let mut pin =
            Group::with_identifier("pin", port.name.clone()).map_err(Error::Liberty)?;
        pin.add_attribute("direction", port.direction.attribute());
        if port.role == Role::Clock && port.trigger == Trigger::Edge {
            pin.add_attribute("clock", true);
        }
        if port.direction != Direction::Input {
            let function = match &cell.sequential {
                Some(model) if model.output == port.name => {
                    Some(model.alias.to_string())
                }
                _ => cell
                    .functions
                    .get(&port.name)
                    .map(|f| f.to_string()),
            };
            if let Some(function) = function {
                pin.add_attribute("function", function.as_str());
            }
        }
        group.add_group(pin);
    }
    Ok(group)
}
