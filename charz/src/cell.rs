//! The cell model.
//!
//! A [`Cell`] ties together the declared ports, the parsed Boolean
//! functions, the optional sequential state model, the scanned subcircuit,
//! and the per-cell characterization parameters. From it the procedures
//! derive timing paths, the non-masking conditions that sensitize them,
//! and the per-condition pin-state assignments that fully determine one
//! simulation deck.

use std::path::{Path, PathBuf};

use arcstr::ArcStr;
use indexmap::IndexMap;
use logic::{Control, Function, PinState, StateFunction};
use rust_decimal::prelude::ToPrimitive;
use spice::deck::Include;
use spice::Subckt;

use crate::config::{parse_control, CellConfig, ConfigError};
use crate::error::{Error, Result};

/// Pin direction.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    /// An input pin.
    Input,
    /// An output pin.
    Output,
    /// A bidirectional pin.
    Inout,
}

impl Direction {
    /// The Liberty `direction` attribute value.
    pub fn attribute(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
            Self::Inout => "inout",
        }
    }
}

/// What a pin does for the cell.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Role {
    /// An ordinary data pin.
    Logic,
    /// The clock.
    Clock,
    /// A clock/latch enable.
    Enable,
    /// An asynchronous preset.
    Set,
    /// An asynchronous clear.
    Reset,
    /// Power supply.
    Power,
    /// Ground.
    Ground,
    /// P-well tap.
    Pwell,
    /// N-well tap.
    Nwell,
    /// An analog pin, excluded from digital characterization.
    Analog,
}

impl Role {
    /// True for roles that carry digital signals.
    pub fn is_signal(&self) -> bool {
        matches!(
            self,
            Self::Logic | Self::Clock | Self::Enable | Self::Set | Self::Reset
        )
    }
}

/// Edge or level sensitivity of a control pin.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Edge-triggered.
    Edge,
    /// Level-sensitive.
    Level,
}

/// One leg of a (possibly differential) port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinRef {
    /// The pin name.
    pub name: ArcStr,
    /// True for the inverting leg of a differential pair.
    pub inverting: bool,
}

/// A cell port.
#[derive(Debug, Clone)]
pub struct Port {
    /// Canonical (uppercase) pin name, unique per cell.
    pub name: ArcStr,
    /// Pin direction.
    pub direction: Direction,
    /// Pin role.
    pub role: Role,
    /// Edge or level sensitivity.
    pub trigger: Trigger,
    /// True for active-low controls.
    pub inverted: bool,
    /// The complement pin of a differential pair, if any.
    pub pair: Option<ArcStr>,
}

impl Port {
    fn signal(name: ArcStr, direction: Direction) -> Self {
        Self {
            name,
            direction,
            role: Role::Logic,
            trigger: Trigger::Level,
            inverted: false,
            pair: None,
        }
    }

    /// The physical pins of this port: the port itself, plus the inverting
    /// complement for a differential pair.
    pub fn pins(&self) -> Vec<PinRef> {
        let mut out = vec![PinRef {
            name: self.name.clone(),
            inverting: false,
        }];
        if let Some(pair) = &self.pair {
            out.push(PinRef {
                name: pair.clone(),
                inverting: true,
            });
        }
        out
    }
}

/// A transition direction.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Low to high.
    Rise,
    /// High to low.
    Fall,
}

impl Transition {
    /// Both directions, in enumeration order.
    pub const BOTH: [Transition; 2] = [Transition::Rise, Transition::Fall];

    /// The matching transition pin state.
    pub fn state(&self) -> PinState {
        match self {
            Self::Rise => PinState::Rise,
            Self::Fall => PinState::Fall,
        }
    }

    /// A lowercase label for naming.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Rise => "rise",
            Self::Fall => "fall",
        }
    }
}

/// One candidate input-to-output timing path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingPath {
    /// The driving input pin.
    pub input: ArcStr,
    /// The input transition direction.
    pub input_dir: Transition,
    /// The receiving output pin.
    pub output: ArcStr,
    /// The output transition direction.
    pub output_dir: Transition,
}

/// The static unateness of a timing arc.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TimingSense {
    /// Output always follows the input direction.
    PositiveUnate,
    /// Output always opposes the input direction.
    NegativeUnate,
    /// Direction depends on the other inputs.
    NonUnate,
}

impl TimingSense {
    /// The Liberty `timing_sense` attribute value.
    pub fn attribute(&self) -> &'static str {
        match self {
            Self::PositiveUnate => "positive_unate",
            Self::NegativeUnate => "negative_unate",
            Self::NonUnate => "non_unate",
        }
    }
}

/// The full pin-state assignment of one simulation deck: which pins
/// transition, which hold a level, and which are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinStateMap {
    /// The transitioning input.
    pub target_input: ArcStr,
    /// Its transition.
    pub input_state: PinState,
    /// Stable input levels, including non-operand inputs at their inactive
    /// levels.
    pub stable_inputs: IndexMap<ArcStr, bool>,
    /// The observed output.
    pub target_output: ArcStr,
    /// Its expected transition.
    pub output_state: PinState,
    /// Outputs left unloaded and unmeasured.
    pub ignored_outputs: Vec<ArcStr>,
}

/// The sequential state model of a cell: a feedback alias bound to an
/// output, expanded into a next-state function.
#[derive(Debug, Clone)]
pub struct SequentialModel {
    /// The internal feedback alias.
    pub alias: ArcStr,
    /// The output it mirrors.
    pub output: ArcStr,
    /// The expanded state function.
    pub function: StateFunction,
}

/// Per-cell characterization parameters, converted to library units.
#[derive(Debug, Clone)]
pub struct CellParams {
    /// Data slew axis.
    pub data_slews: Vec<f64>,
    /// Output load axis.
    pub loads: Vec<f64>,
    /// Clock slew axis (sequential cells).
    pub clock_slews: Vec<f64>,
    /// Setup bisection range.
    pub setup_range: Option<(f64, f64)>,
    /// Hold bisection range.
    pub hold_range: Option<(f64, f64)>,
    /// Cell area.
    pub area: Option<f64>,
    /// Resolved model includes.
    pub models: Vec<Include>,
    /// Nets to dump as CSV waveforms.
    pub plots: Vec<ArcStr>,
}

/// A cell ready for characterization.
#[derive(Debug, Clone)]
pub struct Cell {
    /// The cell name (matches the `.subckt` name).
    pub name: ArcStr,
    /// Ports by canonical name.
    pub ports: IndexMap<ArcStr, Port>,
    /// Combinational functions keyed by output name.
    pub functions: IndexMap<ArcStr, Function>,
    /// The sequential model, if the cell has one.
    pub sequential: Option<SequentialModel>,
    /// The scanned subcircuit.
    pub subckt: Subckt,
    /// The netlist the subcircuit was scanned from.
    pub netlist: PathBuf,
    /// Characterization parameters.
    pub params: CellParams,
}

fn canonical(name: &str) -> ArcStr {
    ArcStr::from(name.trim().to_ascii_uppercase())
}

fn decimals(values: &[rust_decimal::Decimal], key: String) -> Result<Vec<f64>> {
    values
        .iter()
        .map(|d| {
            d.to_f64().ok_or_else(|| {
                Error::Config(ConfigError::Invalid {
                    key: key.clone(),
                    message: format!("{d} is not representable"),
                })
            })
        })
        .collect()
}

fn rebase(include: Include, base: &Path) -> Include {
    let join = |p: PathBuf| if p.is_relative() { base.join(p) } else { p };
    match include {
        Include::File(p) => Include::File(join(p)),
        Include::Section(p, s) => Include::Section(join(p), s),
        Include::Directory(p) => Include::Directory(join(p)),
    }
}

impl Cell {
    /// Builds the model of one configured cell. `base_dir` anchors
    /// relative netlist and model paths.
    pub fn build(name: &str, config: &CellConfig, base_dir: &Path) -> Result<Self> {
        let name = canonical(name);
        let key = |field: &str| format!("cells.{name}.{field}");
        let mut ports: IndexMap<ArcStr, Port> = IndexMap::new();
        let mut add = |port: Port| -> Result<()> {
            if ports.insert(port.name.clone(), port.clone()).is_some() {
                return Err(Error::Config(ConfigError::Invalid {
                    key: format!("cells.{name}"),
                    message: format!("pin `{}` declared more than once", port.name),
                }));
            }
            Ok(())
        };
        for input in &config.inputs {
            add(Port::signal(canonical(input), Direction::Input))?;
        }
        for output in &config.outputs {
            add(Port::signal(canonical(output), Direction::Output))?;
        }
        for inout in &config.inouts {
            add(Port::signal(canonical(inout), Direction::Inout))?;
        }

        let mut controls: IndexMap<ArcStr, Control> = IndexMap::new();
        let mut clock = None;
        for (field, spec, role, trigger) in [
            ("clock", &config.clock, Role::Clock, Trigger::Edge),
            ("enable", &config.enable, Role::Enable, Trigger::Level),
            ("set", &config.set, Role::Set, Trigger::Level),
            ("reset", &config.reset, Role::Reset, Trigger::Level),
        ] {
            let Some(spec) = spec else { continue };
            let control = parse_control(&key(field), spec).map_err(Error::Config)?;
            let port = ports.entry(control.name.clone()).or_insert_with(|| {
                Port::signal(control.name.clone(), Direction::Input)
            });
            port.role = role;
            port.trigger = trigger;
            port.inverted = control.inverted;
            if role == Role::Clock {
                clock = Some(control.clone());
            }
            controls.insert(control.name.clone(), control);
        }

        for pair in &config.pairs {
            let mut parts = pair.split_whitespace();
            let (Some(main), Some(complement), None) =
                (parts.next(), parts.next(), parts.next())
            else {
                return Err(Error::Config(ConfigError::Invalid {
                    key: key("pairs"),
                    message: format!("expected `<pin> <complement>`, got `{pair}`"),
                }));
            };
            let (main, complement) = (canonical(main), canonical(complement));
            // The complement is a leg of the main port, not a port itself.
            ports.shift_remove(&complement);
            match ports.get_mut(&main) {
                Some(port) => port.pair = Some(complement),
                None => {
                    return Err(Error::Config(ConfigError::Invalid {
                        key: key("pairs"),
                        message: format!("`{main}` is not a declared pin"),
                    }))
                }
            }
        }

        let mut aliases: IndexMap<ArcStr, ArcStr> = IndexMap::new();
        for entry in &config.state {
            let Some((alias, target)) = entry.split_once('=') else {
                return Err(Error::Config(ConfigError::Invalid {
                    key: key("state"),
                    message: format!("expected `<alias> = <output>`, got `{entry}`"),
                }));
            };
            let (alias, target) = (canonical(alias), canonical(target));
            match ports.get(&target) {
                Some(port) if port.direction != Direction::Input => {
                    aliases.insert(alias, target);
                }
                _ => {
                    return Err(Error::Function(logic::Error::StateAlias {
                        alias,
                        target,
                    }))
                }
            }
        }
        // One storage element per cell; a second alias would otherwise be
        // accepted and then characterized against nothing.
        if aliases.len() > 1 {
            let names: Vec<&str> = aliases.keys().map(ArcStr::as_str).collect();
            return Err(Error::Config(ConfigError::Invalid {
                key: key("state"),
                message: format!(
                    "one state alias per cell is supported; got `{}`",
                    names.join("`, `")
                ),
            }));
        }

        let mut functions: IndexMap<ArcStr, Function> = IndexMap::new();
        for entry in &config.functions {
            let Some((lhs, rhs)) = entry.split_once('=') else {
                return Err(Error::Config(ConfigError::Invalid {
                    key: key("functions"),
                    message: format!("expected `<output> = <expr>`, got `{entry}`"),
                }));
            };
            let output = canonical(lhs);
            match ports.get(&output) {
                Some(port) if port.direction != Direction::Input => {}
                _ => {
                    return Err(Error::Config(ConfigError::Invalid {
                        key: key("functions"),
                        message: format!("`{output}` is not an output or inout pin"),
                    }))
                }
            }
            let function = Function::parse(&rhs.to_ascii_uppercase())?;
            for operand in function.operands() {
                let known = aliases.contains_key(operand)
                    || ports
                        .get(operand)
                        .is_some_and(|p| p.direction != Direction::Output);
                if !known {
                    return Err(Error::Function(logic::Error::UnknownOperand(
                        operand.clone(),
                    )));
                }
            }
            functions.insert(output, function);
        }

        let sequential = match (&clock, aliases.first()) {
            (Some(clock), Some((alias, output))) => {
                let data = functions
                    .get(output)
                    .ok_or_else(|| {
                        Error::Config(ConfigError::Invalid {
                            key: key("state"),
                            message: format!("state output `{output}` has no function"),
                        })
                    })?
                    .expr()
                    .clone();
                let mut function = StateFunction::new(data, alias.clone(), clock.clone());
                for control in controls.values() {
                    match ports[&control.name].role {
                        Role::Enable => function = function.with_enable(control.clone()),
                        Role::Set => function = function.with_preset(control.clone()),
                        Role::Reset => function = function.with_clear(control.clone()),
                        _ => {}
                    }
                }
                // Surface an over-wide expansion now rather than per task.
                function.next_state()?;
                Some(SequentialModel {
                    alias: alias.clone(),
                    output: output.clone(),
                    function,
                })
            }
            _ => None,
        };

        let netlist_path = config.netlist.clone().ok_or_else(|| {
            Error::Config(ConfigError::Invalid {
                key: key("netlist"),
                message: "no netlist configured".to_string(),
            })
        })?;
        let netlist = if netlist_path.is_relative() {
            base_dir.join(netlist_path)
        } else {
            netlist_path
        };
        let subckt = spice::netlist::scan_subckt(&netlist, &name)?;
        for port in ports.values() {
            for pin in port.pins() {
                if !subckt.has_port(&pin.name) {
                    return Err(Error::Config(ConfigError::Invalid {
                        key: format!("cells.{name}"),
                        message: format!(
                            "pin `{}` is not a port of .subckt {name}",
                            pin.name
                        ),
                    }));
                }
            }
        }

        let params = CellParams {
            data_slews: decimals(&config.data_slews, key("data_slews"))?,
            loads: decimals(&config.loads, key("loads"))?,
            clock_slews: decimals(&config.clock_slews, key("clock_slews"))?,
            setup_range: match &config.setup_time_range {
                Some([lo, hi]) => {
                    let v = decimals(&[*lo, *hi], key("setup_time_range"))?;
                    Some((v[0], v[1]))
                }
                None => None,
            },
            hold_range: match &config.hold_time_range {
                Some([lo, hi]) => {
                    let v = decimals(&[*lo, *hi], key("hold_time_range"))?;
                    Some((v[0], v[1]))
                }
                None => None,
            },
            area: config.area,
            models: config
                .models
                .iter()
                .map(|entry| rebase(Include::from_config(entry), base_dir))
                .collect(),
            plots: config.plots.iter().map(|p| canonical(p)).collect(),
        };

        Ok(Self {
            name,
            ports,
            functions,
            sequential,
            subckt,
            netlist,
            params,
        })
    }

    /// Signal input ports (inouts included as drivers).
    pub fn inputs(&self) -> impl Iterator<Item = &Port> {
        self.ports.values().filter(|p| {
            p.role.is_signal() && matches!(p.direction, Direction::Input | Direction::Inout)
        })
    }

    /// Signal output ports (inouts included as receivers).
    pub fn outputs(&self) -> impl Iterator<Item = &Port> {
        self.ports.values().filter(|p| {
            p.role.is_signal() && matches!(p.direction, Direction::Output | Direction::Inout)
        })
    }

    /// The clock control, for sequential cells.
    pub fn clock(&self) -> Option<&Control> {
        self.sequential.as_ref().map(|s| s.function.clock())
    }

    /// Every candidate timing path: the Cartesian product of drivers,
    /// receivers, and both transition directions, self-pairs excluded.
    /// Intentionally a superset of realizable paths; masked paths yield no
    /// non-masking conditions.
    pub fn paths(&self) -> Vec<TimingPath> {
        let mut out = Vec::new();
        for input in self.inputs() {
            for output in self.outputs() {
                if input.name == output.name {
                    continue;
                }
                for input_dir in Transition::BOTH {
                    for output_dir in Transition::BOTH {
                        out.push(TimingPath {
                            input: input.name.clone(),
                            input_dir,
                            output: output.name.clone(),
                            output_dir,
                        });
                    }
                }
            }
        }
        out
    }

    /// The inactive level of a stable non-operand input: controls
    /// deasserted for set/reset, asserted for enables, low otherwise.
    pub(crate) fn resting_level(&self, port: &Port) -> bool {
        match port.role {
            Role::Set | Role::Reset => port.inverted,
            Role::Enable => !port.inverted,
            _ => false,
        }
    }

    /// The pin-state assignments that sensitize `path`: test vectors of
    /// the output's function whose transitioning input and output match
    /// the path exactly. Empty for masked or function-less paths.
    pub fn nonmasking_conditions(&self, path: &TimingPath) -> Vec<PinStateMap> {
        let Some(function) = self.functions.get(&path.output) else {
            return Vec::new();
        };
        // Sequential outputs are characterized by the metastability
        // procedure, not as combinational arcs.
        if self
            .sequential
            .as_ref()
            .is_some_and(|s| s.output == path.output)
        {
            return Vec::new();
        }
        let operands = function.operands();
        let mut out = Vec::new();
        for vector in function.test_vectors() {
            let target = &operands[vector.target_input()];
            if *target != path.input
                || vector.inputs()[vector.target_input()] != path.input_dir.state()
                || vector.output() != path.output_dir.state()
            {
                continue;
            }
            let mut stable_inputs: IndexMap<ArcStr, bool> = operands
                .iter()
                .zip(vector.inputs())
                .filter(|(name, state)| !state.is_transition() && *name != &path.output)
                .map(|(name, state)| (name.clone(), state.settled()))
                .collect();
            for port in self.inputs() {
                if port.name != path.input && !stable_inputs.contains_key(&port.name) {
                    stable_inputs.insert(port.name.clone(), self.resting_level(port));
                }
            }
            let ignored_outputs = self
                .outputs()
                .filter(|p| p.name != path.output)
                .map(|p| p.name.clone())
                .collect();
            out.push(PinStateMap {
                target_input: path.input.clone(),
                input_state: path.input_dir.state(),
                stable_inputs,
                target_output: path.output.clone(),
                output_state: path.output_dir.state(),
                ignored_outputs,
            });
        }
        out
    }

    /// The static unateness of the `input -> output` arc, considering
    /// every condition that sensitizes it. `None` for masked arcs.
    pub fn timing_sense(&self, input: &str, output: &str) -> Option<TimingSense> {
        let function = self.functions.get(output)?;
        let operands = function.operands();
        let mut agree = false;
        let mut oppose = false;
        for vector in function.test_vectors() {
            if operands[vector.target_input()] != input {
                continue;
            }
            let same = vector.inputs()[vector.target_input()] == vector.output();
            agree |= same;
            oppose |= !same;
        }
        match (agree, oppose) {
            (true, false) => Some(TimingSense::PositiveUnate),
            (false, true) => Some(TimingSense::NegativeUnate),
            (true, true) => Some(TimingSense::NonUnate),
            (false, false) => None,
        }
    }
}
