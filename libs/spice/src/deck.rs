//! The simulator-neutral deck model.
//!
//! A [`Deck`] fully describes one simulation: model includes, the device
//! under test and its wiring, passive components, sources, analyses, and
//! named measurements. Backends render it into their own dialect;
//! validation here is deterministic and happens before any simulator runs.

use std::path::{Path, PathBuf};

use arcstr::ArcStr;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{DeckError, PortWiringError};
use crate::netlist::Subckt;

/// A model reference from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Include {
    /// A plain file, emitted as `.include <path>`.
    File(PathBuf),
    /// A file with a named section, emitted as `.lib <path> <section>`.
    Section(PathBuf, ArcStr),
    /// A directory holding one include per subcircuit.
    Directory(PathBuf),
}

/// An [`Include`] after directory resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolvedInclude {
    /// `.include <path>`
    Include(PathBuf),
    /// `.lib <path> <section>`
    Lib(PathBuf, ArcStr),
}

const DIR_EXTENSIONS: [&str; 3] = ["sp", "spice", "cir"];

impl Include {
    /// Resolves this include for the given subcircuit. Directory includes
    /// look for `<dir>/<subckt>.{sp,spice,cir}`, first hit wins.
    pub fn resolve(&self, subckt: &str) -> Result<ResolvedInclude, DeckError> {
        match self {
            Self::File(path) => Ok(ResolvedInclude::Include(path.clone())),
            Self::Section(path, section) => {
                Ok(ResolvedInclude::Lib(path.clone(), section.clone()))
            }
            Self::Directory(dir) => {
                for ext in DIR_EXTENSIONS {
                    let candidate = dir.join(format!("{subckt}.{ext}"));
                    if candidate.is_file() {
                        return Ok(ResolvedInclude::Include(candidate));
                    }
                }
                Err(DeckError::ModelNotFound {
                    cell: ArcStr::from(subckt),
                    dir: dir.clone(),
                })
            }
        }
    }

    /// Parses a configuration model entry: `path`, `path section`, or a
    /// directory path.
    pub fn from_config(entry: &str) -> Self {
        match entry.trim().split_once(char::is_whitespace) {
            Some((path, section)) => {
                Self::Section(PathBuf::from(path), ArcStr::from(section.trim()))
            }
            None => {
                let path = Path::new(entry.trim());
                if path.is_dir() {
                    Self::Directory(path.to_path_buf())
                } else {
                    Self::File(path.to_path_buf())
                }
            }
        }
    }
}

/// An independent source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Source {
    /// A DC voltage source.
    Vdc {
        /// Source name without the leading `V`.
        name: ArcStr,
        /// Positive node.
        pos: ArcStr,
        /// Negative node.
        neg: ArcStr,
        /// Voltage in volts.
        value: f64,
    },
    /// A piecewise-linear voltage source.
    Vpwl {
        /// Source name without the leading `V`.
        name: ArcStr,
        /// Positive node.
        pos: ArcStr,
        /// Negative node.
        neg: ArcStr,
        /// `(time, voltage)` vertices, strictly monotone in time.
        points: Vec<(f64, f64)>,
    },
    /// An AC current source.
    Iac {
        /// Source name without the leading `I`.
        name: ArcStr,
        /// Positive node.
        pos: ArcStr,
        /// Negative node.
        neg: ArcStr,
        /// AC magnitude in amperes.
        magnitude: f64,
    },
}

impl Source {
    /// The source name.
    pub fn name(&self) -> &ArcStr {
        match self {
            Self::Vdc { name, .. } | Self::Vpwl { name, .. } | Self::Iac { name, .. } => name,
        }
    }

    fn validate(&self) -> Result<(), DeckError> {
        if let Self::Vpwl { name, points, .. } = self {
            if points.is_empty() {
                return Err(DeckError::EmptyPwl { name: name.clone() });
            }
            for pair in points.windows(2) {
                if pair[1].0 <= pair[0].0 {
                    return Err(DeckError::PwlNotMonotone { name: name.clone() });
                }
            }
        }
        Ok(())
    }
}

/// A passive component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Component {
    /// A two-terminal resistor.
    Resistor {
        /// Component name without the leading `R`.
        name: ArcStr,
        /// Positive node.
        pos: ArcStr,
        /// Negative node.
        neg: ArcStr,
        /// Resistance in ohms.
        value: f64,
    },
    /// A two-terminal capacitor.
    Capacitor {
        /// Component name without the leading `C`.
        name: ArcStr,
        /// Positive node.
        pos: ArcStr,
        /// Negative node.
        neg: ArcStr,
        /// Capacitance in farads.
        value: f64,
    },
}

/// An analysis statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Analysis {
    /// A transient analysis.
    Tran {
        /// The suggested timestep in seconds.
        step: f64,
        /// The stop time in seconds.
        stop: f64,
    },
    /// A decade AC sweep.
    AcDecade {
        /// Points per decade.
        points_per_decade: u32,
        /// Start frequency in hertz.
        fstart: f64,
        /// Stop frequency in hertz.
        fstop: f64,
    },
}

/// A threshold-crossing direction.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeDir {
    /// A rising crossing.
    Rise,
    /// A falling crossing.
    Fall,
    /// Either direction.
    Cross,
}

/// Which crossing of a threshold an [`Event`] refers to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Occurrence {
    /// The n-th crossing, 1-based.
    Nth(u32),
    /// The final crossing before the simulation ends. The critical edge of
    /// a propagation measurement is the last output crossing.
    Last,
}

/// A threshold crossing on a node voltage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// The net whose voltage is observed.
    pub signal: ArcStr,
    /// The threshold voltage in volts.
    pub value: f64,
    /// The crossing direction.
    pub dir: EdgeDir,
    /// Which crossing.
    pub occurrence: Occurrence,
}

impl Event {
    /// A rising crossing, first occurrence.
    pub fn rise(signal: impl Into<ArcStr>, value: f64) -> Self {
        Self {
            signal: signal.into(),
            value,
            dir: EdgeDir::Rise,
            occurrence: Occurrence::Nth(1),
        }
    }

    /// A falling crossing, first occurrence.
    pub fn fall(signal: impl Into<ArcStr>, value: f64) -> Self {
        Self {
            signal: signal.into(),
            value,
            dir: EdgeDir::Fall,
            occurrence: Occurrence::Nth(1),
        }
    }

    /// Selects the last crossing instead of the first.
    pub fn last(mut self) -> Self {
        self.occurrence = Occurrence::Last;
        self
    }
}

/// A named trigger/target measurement over a transient analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// The measurement name; results are read back by this name.
    pub name: ArcStr,
    /// The trigger event.
    pub trig: Event,
    /// The target event.
    pub targ: Event,
}

/// The device under test: one `X` instance of the scanned subcircuit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    /// The instance name without the leading `X`.
    pub name: ArcStr,
    /// The scanned subcircuit.
    pub subckt: Subckt,
    /// `(port, net)` pairs. Order need not match the subcircuit; emission
    /// reorders to the authoritative port order.
    pub connections: Vec<(ArcStr, ArcStr)>,
}

impl Instance {
    /// The nets in the subcircuit's authoritative port order.
    ///
    /// Fails with [`PortWiringError`] unless the connections cover every
    /// subcircuit port exactly once.
    pub fn ordered_nets(&self) -> Result<Vec<ArcStr>, PortWiringError> {
        let ports: IndexMap<unicase::UniCase<String>, &ArcStr> = self
            .subckt
            .ports
            .iter()
            .map(|p| (unicase::UniCase::new(p.to_string()), p))
            .collect();
        for (port, _) in &self.connections {
            if !ports.contains_key(&unicase::UniCase::new(port.to_string())) {
                return Err(PortWiringError::UnknownPort {
                    cell: self.subckt.name.clone(),
                    port: port.clone(),
                });
            }
        }
        let mut nets = Vec::with_capacity(self.subckt.ports.len());
        for port in &self.subckt.ports {
            let key = unicase::UniCase::new(port.to_string());
            let matches: Vec<&ArcStr> = self
                .connections
                .iter()
                .filter(|(p, _)| unicase::UniCase::new(p.to_string()) == key)
                .map(|(_, net)| net)
                .collect();
            if matches.len() != 1 {
                return Err(PortWiringError::WrongCount {
                    cell: self.subckt.name.clone(),
                    port: port.clone(),
                    count: matches.len(),
                });
            }
            nets.push(matches[0].clone());
        }
        Ok(nets)
    }
}

/// A complete simulation deck.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deck {
    /// The deck title (first line of the netlist).
    pub title: ArcStr,
    /// Model includes.
    pub includes: Vec<Include>,
    /// Backend-neutral simulator options.
    pub options: IndexMap<ArcStr, ArcStr>,
    /// The device under test.
    pub instance: Instance,
    /// Passive components.
    pub components: Vec<Component>,
    /// Independent sources.
    pub sources: Vec<Source>,
    /// Analyses, emitted in order.
    pub analyses: Vec<Analysis>,
    /// Named measurements over the transient analysis.
    pub measurements: Vec<Measurement>,
    /// Nets whose waveforms should be saved.
    pub saves: Vec<ArcStr>,
    /// Simulation temperature in degrees Celsius.
    pub temperature: f64,
}

impl Deck {
    /// Creates an empty deck around the device under test.
    pub fn new(title: impl Into<ArcStr>, instance: Instance) -> Self {
        Self {
            title: title.into(),
            includes: Vec::new(),
            options: IndexMap::new(),
            instance,
            components: Vec::new(),
            sources: Vec::new(),
            analyses: Vec::new(),
            measurements: Vec::new(),
            saves: Vec::new(),
            temperature: 25.0,
        }
    }

    /// Validates the deck: instance wiring, PWL monotonicity, and the
    /// presence of an analysis. Fails fast, with no side effects.
    pub fn validate(&self) -> Result<(), DeckError> {
        self.instance.ordered_nets()?;
        for source in &self.sources {
            source.validate()?;
        }
        if self.analyses.is_empty() {
            return Err(DeckError::NoAnalysis {
                title: self.title.clone(),
            });
        }
        Ok(())
    }

    /// The transient analysis of this deck, if any.
    pub fn tran(&self) -> Option<(f64, f64)> {
        self.analyses.iter().find_map(|a| match a {
            Analysis::Tran { step, stop } => Some((*step, *stop)),
            _ => None,
        })
    }
}
