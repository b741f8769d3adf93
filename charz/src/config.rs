//! The library description file.
//!
//! One TOML file describes a library: global settings (simulator backend,
//! units, supply nodes, logic thresholds) plus one `[cells.<NAME>]` table
//! per cell. `[settings.cell_defaults]` takes the same keys as a cell
//! table and fills in whatever a cell omits.

use std::path::{Path, PathBuf};

use arcstr::ArcStr;
use indexmap::IndexMap;
use liberty::units::SiValue;
use logic::Control;
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error as ThisError;

/// Possible configuration errors. Each message names the offending key.
#[derive(ThisError, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("error reading configuration {path}")]
    Read {
        /// The unreadable path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The configuration file is not valid TOML or violates the schema.
    #[error("error parsing configuration {path}: {source}")]
    Parse {
        /// The offending file.
        path: PathBuf,
        /// The TOML error, which carries the key path.
        #[source]
        source: Box<toml::de::Error>,
    },
    /// A value that fails a semantic check.
    #[error("invalid value for `{key}`: {message}")]
    Invalid {
        /// The offending key path.
        key: String,
        /// What is wrong with it.
        message: String,
    },
    /// A procedure name with no registry entry.
    #[error("`{key}` names unknown procedure `{name}`")]
    UnknownProcedure {
        /// The offending key path.
        key: String,
        /// The unknown name.
        name: String,
    },
}

/// A `"<posedge|negedge> <PIN>"` control specification.
pub fn parse_control(key: &str, value: &str) -> Result<Control, ConfigError> {
    let mut parts = value.split_whitespace();
    let edge = parts.next().unwrap_or("");
    let pin = parts.next();
    match (edge, pin, parts.next()) {
        ("posedge", Some(pin), None) => Ok(Control::active_high(pin.to_ascii_uppercase())),
        ("negedge", Some(pin), None) => Ok(Control::active_low(pin.to_ascii_uppercase())),
        _ => Err(ConfigError::Invalid {
            key: key.to_string(),
            message: format!("expected `posedge <pin>` or `negedge <pin>`, got `{value}`"),
        }),
    }
}

/// The simulator backend to drive.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    /// ngspice through its shared-library binding; served by the batch
    /// subprocess driver.
    NgspiceShared,
    /// ngspice as a batch subprocess.
    NgspiceSubprocess,
    /// A single serial Xyce process.
    XyceSerial,
    /// Xyce under `mpirun`.
    XyceParallel,
}

impl Default for Backend {
    fn default() -> Self {
        Self::NgspiceSubprocess
    }
}

/// Procedure selection per characterization concern.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Simulation {
    /// The backend name.
    #[serde(default)]
    pub backend: Backend,
    /// The procedure measuring input pin capacitance.
    #[serde(default = "default_capacitance_procedure")]
    pub input_capacitance_procedure: String,
    /// The procedure measuring combinational delays.
    #[serde(default = "default_combinational_procedure")]
    pub combinational_delay_procedure: String,
    /// The procedure measuring setup/hold constraints.
    #[serde(default = "default_metastability_procedure")]
    pub metastability_delay_procedure: String,
}

fn default_capacitance_procedure() -> String {
    "ac_sweep".to_string()
}

fn default_combinational_procedure() -> String {
    "combinational_worst_case".to_string()
}

fn default_metastability_procedure() -> String {
    "metastability_binary_search_worst_case".to_string()
}

impl Default for Simulation {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            input_capacitance_procedure: default_capacitance_procedure(),
            combinational_delay_procedure: default_combinational_procedure(),
            metastability_delay_procedure: default_metastability_procedure(),
        }
    }
}

/// Library unit strings, SI-prefixed, round-tripped verbatim into the
/// `.lib` header.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Units {
    /// Time unit, e.g. `ns`.
    pub time: String,
    /// Voltage unit.
    pub voltage: String,
    /// Current unit.
    pub current: String,
    /// Capacitive load unit.
    pub capacitive_load: String,
    /// Pulling resistance unit.
    pub pulling_resistance: String,
    /// Leakage power unit.
    pub leakage_power: String,
    /// Energy unit.
    pub energy: String,
}

impl Default for Units {
    fn default() -> Self {
        Self {
            time: "ns".to_string(),
            voltage: "V".to_string(),
            current: "uA".to_string(),
            capacitive_load: "fF".to_string(),
            pulling_resistance: "kohm".to_string(),
            leakage_power: "nW".to_string(),
            energy: "fJ".to_string(),
        }
    }
}

/// [`Units`] with every string parsed into an [`SiValue`].
#[derive(Debug, Clone)]
pub struct LibraryUnits {
    /// Time unit.
    pub time: SiValue,
    /// Voltage unit.
    pub voltage: SiValue,
    /// Current unit.
    pub current: SiValue,
    /// Capacitive load unit.
    pub capacitive_load: SiValue,
    /// Pulling resistance unit.
    pub pulling_resistance: SiValue,
    /// Leakage power unit.
    pub leakage_power: SiValue,
    /// Energy unit.
    pub energy: SiValue,
}

impl Units {
    /// Parses every unit string, naming the offending key on failure.
    pub fn parse(&self) -> Result<LibraryUnits, ConfigError> {
        let one = |key: &str, value: &str| {
            value.parse::<SiValue>().map_err(|e| ConfigError::Invalid {
                key: format!("settings.units.{key}"),
                message: e.to_string(),
            })
        };
        Ok(LibraryUnits {
            time: one("time", &self.time)?,
            voltage: one("voltage", &self.voltage)?,
            current: one("current", &self.current)?,
            capacitive_load: one("capacitive_load", &self.capacitive_load)?,
            pulling_resistance: one("pulling_resistance", &self.pulling_resistance)?,
            leakage_power: one("leakage_power", &self.leakage_power)?,
            energy: one("energy", &self.energy)?,
        })
    }
}

/// A named supply or well node.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Node {
    /// The net name in the cell netlists.
    pub name: ArcStr,
    /// The DC voltage applied to it.
    pub voltage: f64,
}

/// The supply and well nodes of the library.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NamedNodes {
    /// The primary power node.
    pub primary_power: Node,
    /// The primary ground node.
    pub primary_ground: Node,
    /// The p-well tap, if the process exposes one.
    pub pwell: Option<Node>,
    /// The n-well tap, if the process exposes one.
    pub nwell: Option<Node>,
}

impl NamedNodes {
    /// Every configured node.
    pub fn all(&self) -> Vec<&Node> {
        let mut out = vec![&self.primary_power, &self.primary_ground];
        out.extend(self.pwell.as_ref());
        out.extend(self.nwell.as_ref());
        out
    }

    /// Finds a node by name, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&Node> {
        self.all()
            .into_iter()
            .find(|n| n.name.eq_ignore_ascii_case(name))
    }
}

/// Logic threshold percentages of the supply swing.
#[derive(Debug, Copy, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LogicThresholds {
    /// Slew measurement low threshold.
    pub low: f64,
    /// Slew measurement high threshold.
    pub high: f64,
    /// Delay threshold for rising signals.
    pub rising: f64,
    /// Delay threshold for falling signals.
    pub falling: f64,
}

impl Default for LogicThresholds {
    fn default() -> Self {
        Self {
            low: 20.0,
            high: 80.0,
            rising: 50.0,
            falling: 50.0,
        }
    }
}

impl LogicThresholds {
    fn validate(&self) -> Result<(), ConfigError> {
        let check = |key: &str, v: f64| {
            if !(0.0..=100.0).contains(&v) {
                return Err(ConfigError::Invalid {
                    key: format!("settings.logic_thresholds.{key}"),
                    message: format!("{v} is not a percentage in 0..100"),
                });
            }
            Ok(())
        };
        check("low", self.low)?;
        check("high", self.high)?;
        check("rising", self.rising)?;
        check("falling", self.falling)?;
        if self.low >= self.high {
            return Err(ConfigError::Invalid {
                key: "settings.logic_thresholds".to_string(),
                message: format!("low ({}) must be below high ({})", self.low, self.high),
            });
        }
        Ok(())
    }
}

/// One `[cells.<NAME>]` table. Every field is optional so the same type
/// serves as `[settings.cell_defaults]`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CellConfig {
    /// Path to the cell's SPICE netlist.
    pub netlist: Option<PathBuf>,
    /// Model entries: `path`, `path section`, or a directory.
    #[serde(default)]
    pub models: Vec<String>,
    /// Input pin names.
    #[serde(default)]
    pub inputs: Vec<String>,
    /// Output pin names.
    #[serde(default)]
    pub outputs: Vec<String>,
    /// Inout pin names.
    #[serde(default)]
    pub inouts: Vec<String>,
    /// `"<OUT> = <expr>"` function declarations.
    #[serde(default)]
    pub functions: Vec<String>,
    /// Data slew axis, in library time units.
    #[serde(default)]
    pub data_slews: Vec<Decimal>,
    /// Output load axis, in library capacitance units.
    #[serde(default)]
    pub loads: Vec<Decimal>,
    /// Cell area.
    pub area: Option<f64>,
    /// Clock specification, `"posedge CLK"` form.
    pub clock: Option<String>,
    /// Enable specification.
    pub enable: Option<String>,
    /// Asynchronous preset specification.
    pub set: Option<String>,
    /// Asynchronous clear specification.
    pub reset: Option<String>,
    /// `"<ALIAS> = <OUTPUT>"` state feedback aliases.
    #[serde(default)]
    pub state: Vec<String>,
    /// `"<PIN> <COMPLEMENT>"` differential pairs.
    #[serde(default)]
    pub pairs: Vec<String>,
    /// Setup search range `[lo, hi]`, library time units.
    pub setup_time_range: Option<[Decimal; 2]>,
    /// Hold search range `[lo, hi]`, library time units.
    pub hold_time_range: Option<[Decimal; 2]>,
    /// Clock slew axis, library time units.
    #[serde(default)]
    pub clock_slews: Vec<Decimal>,
    /// Nets whose waveforms are dumped as CSV under the debug directory.
    #[serde(default)]
    pub plots: Vec<String>,
}

impl CellConfig {
    /// Fills in every omitted field from `defaults`.
    pub fn merged_with(&self, defaults: &CellConfig) -> CellConfig {
        fn pick<T: Clone>(ours: &Option<T>, theirs: &Option<T>) -> Option<T> {
            ours.clone().or_else(|| theirs.clone())
        }
        fn pick_vec<T: Clone>(ours: &[T], theirs: &[T]) -> Vec<T> {
            if ours.is_empty() {
                theirs.to_vec()
            } else {
                ours.to_vec()
            }
        }
        CellConfig {
            netlist: pick(&self.netlist, &defaults.netlist),
            models: pick_vec(&self.models, &defaults.models),
            inputs: pick_vec(&self.inputs, &defaults.inputs),
            outputs: pick_vec(&self.outputs, &defaults.outputs),
            inouts: pick_vec(&self.inouts, &defaults.inouts),
            functions: pick_vec(&self.functions, &defaults.functions),
            data_slews: pick_vec(&self.data_slews, &defaults.data_slews),
            loads: pick_vec(&self.loads, &defaults.loads),
            area: pick(&self.area, &defaults.area),
            clock: pick(&self.clock, &defaults.clock),
            enable: pick(&self.enable, &defaults.enable),
            set: pick(&self.set, &defaults.set),
            reset: pick(&self.reset, &defaults.reset),
            state: pick_vec(&self.state, &defaults.state),
            pairs: pick_vec(&self.pairs, &defaults.pairs),
            setup_time_range: pick(&self.setup_time_range, &defaults.setup_time_range),
            hold_time_range: pick(&self.hold_time_range, &defaults.hold_time_range),
            clock_slews: pick_vec(&self.clock_slews, &defaults.clock_slews),
            plots: pick_vec(&self.plots, &defaults.plots),
        }
    }
}

/// The `[settings]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// The library name; also the default output file stem.
    pub lib_name: String,
    /// Simulation temperature in degrees Celsius.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// False forces sequential execution.
    #[serde(default = "default_true")]
    pub multithreaded: bool,
    /// Where the `.lib` (and compare artifacts) are written.
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
    /// Keep per-task simulation artifacts.
    #[serde(default)]
    pub debug: bool,
    /// Root of the per-task artifact tree.
    #[serde(default = "default_debug_dir")]
    pub debug_dir: PathBuf,
    /// Skip failed tasks instead of aborting the run.
    #[serde(default)]
    pub omit_on_failure: bool,
    /// Backend and procedure selection.
    #[serde(default)]
    pub simulation: Simulation,
    /// Library units.
    #[serde(default)]
    pub units: Units,
    /// Supply and well nodes.
    pub named_nodes: NamedNodes,
    /// Logic thresholds.
    #[serde(default)]
    pub logic_thresholds: LogicThresholds,
    /// Defaults merged under every cell.
    #[serde(default)]
    pub cell_defaults: CellConfig,
}

fn default_temperature() -> f64 {
    25.0
}

fn default_true() -> bool {
    true
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_debug_dir() -> PathBuf {
    PathBuf::from("debug")
}

/// A parsed library description.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Global settings.
    pub settings: Settings,
    /// Cells to characterize, in declaration order.
    #[serde(default)]
    pub cells: IndexMap<ArcStr, CellConfig>,
}

impl Config {
    /// Loads a configuration from a `.toml` file or from `charz.toml`
    /// inside a directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut path = path.as_ref().to_path_buf();
        if path.is_dir() {
            path = path.join("charz.toml");
        }
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let config = Self::from_str_at(&text, &path)?;
        Ok(config)
    }

    /// Parses configuration text; `path` is used in diagnostics only.
    pub fn from_str_at(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source: Box::new(source),
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.settings.logic_thresholds.validate()?;
        self.settings.units.parse()?;
        let vdd = self.settings.named_nodes.primary_power.voltage;
        let vss = self.settings.named_nodes.primary_ground.voltage;
        if vdd <= vss {
            return Err(ConfigError::Invalid {
                key: "settings.named_nodes".to_string(),
                message: format!("primary_power ({vdd}) must be above primary_ground ({vss})"),
            });
        }
        for (name, cell) in &self.cells {
            let merged = cell.merged_with(&self.settings.cell_defaults);
            let key = |field: &str| format!("cells.{name}.{field}");
            if merged.netlist.is_none() {
                return Err(ConfigError::Invalid {
                    key: key("netlist"),
                    message: "no netlist configured".to_string(),
                });
            }
            if merged.inputs.is_empty() && merged.inouts.is_empty() {
                return Err(ConfigError::Invalid {
                    key: key("inputs"),
                    message: "cell has no inputs".to_string(),
                });
            }
            for (field, range) in [
                ("setup_time_range", &merged.setup_time_range),
                ("hold_time_range", &merged.hold_time_range),
            ] {
                if let Some([lo, hi]) = range {
                    if lo >= hi {
                        return Err(ConfigError::Invalid {
                            key: key(field),
                            message: format!("range [{lo}, {hi}] is empty"),
                        });
                    }
                }
            }
            if let Some(clock) = &merged.clock {
                parse_control(&key("clock"), clock)?;
                if merged.clock_slews.is_empty() {
                    return Err(ConfigError::Invalid {
                        key: key("clock_slews"),
                        message: "sequential cell has no clock slews".to_string(),
                    });
                }
                if merged.setup_time_range.is_none() || merged.hold_time_range.is_none() {
                    return Err(ConfigError::Invalid {
                        key: key("setup_time_range"),
                        message: "sequential cell needs setup and hold ranges".to_string(),
                    });
                }
            }
            for (field, control) in [
                ("enable", &merged.enable),
                ("set", &merged.set),
                ("reset", &merged.reset),
            ] {
                if let Some(spec) = control {
                    parse_control(&key(field), spec)?;
                }
            }
        }
        Ok(())
    }

    /// The merged configuration of one cell.
    pub fn cell(&self, name: &str) -> Option<CellConfig> {
        self.cells
            .get(name)
            .map(|c| c.merged_with(&self.settings.cell_defaults))
    }
}
