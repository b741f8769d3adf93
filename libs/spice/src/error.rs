//! SPICE-layer errors.

use std::path::PathBuf;
use std::time::Duration;

use arcstr::ArcStr;
use thiserror::Error as ThisError;

/// Errors scanning a netlist for a subcircuit definition.
#[derive(ThisError, Debug)]
pub enum NetlistError {
    /// The netlist file could not be read.
    #[error("error reading netlist {path}")]
    Io {
        /// The unreadable path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// No `.subckt` line for the requested cell.
    #[error("no .subckt definition for `{cell}` in {path}")]
    SubcktNotFound {
        /// The cell searched for.
        cell: ArcStr,
        /// The netlist searched.
        path: PathBuf,
    },
    /// A `.subckt` line with no ports.
    #[error(".subckt `{cell}` declares no ports")]
    EmptyPorts {
        /// The offending cell.
        cell: ArcStr,
    },
}

/// Errors wiring an instance against its subcircuit's port list.
#[derive(ThisError, Debug)]
pub enum PortWiringError {
    /// A connection names a port the subcircuit does not declare.
    #[error("connection references port `{port}`, which `.subckt {cell}` does not declare")]
    UnknownPort {
        /// The subcircuit.
        cell: ArcStr,
        /// The undeclared port.
        port: ArcStr,
    },
    /// A subcircuit port wired zero times or more than once.
    #[error("port `{port}` of `.subckt {cell}` is wired {count} times; expected exactly once")]
    WrongCount {
        /// The subcircuit.
        cell: ArcStr,
        /// The port.
        port: ArcStr,
        /// How many connections named it.
        count: usize,
    },
}

/// Errors building a simulation deck. These are deterministic and occur
/// before any simulator is invoked.
#[derive(ThisError, Debug)]
pub enum DeckError {
    /// Instance wiring does not cover the subcircuit ports.
    #[error(transparent)]
    PortWiring(#[from] PortWiringError),
    /// A PWL source whose vertices are not strictly increasing in time.
    #[error("pwl source `{name}` is not monotone in time")]
    PwlNotMonotone {
        /// The source name.
        name: ArcStr,
    },
    /// A PWL source with no vertices.
    #[error("pwl source `{name}` has no vertices")]
    EmptyPwl {
        /// The source name.
        name: ArcStr,
    },
    /// A directory model path containing no include for the subcircuit.
    #[error("no model for subcircuit `{cell}` under {dir}")]
    ModelNotFound {
        /// The subcircuit.
        cell: ArcStr,
        /// The directory searched.
        dir: PathBuf,
    },
    /// A deck without any analysis statement.
    #[error("deck `{title}` has no analysis")]
    NoAnalysis {
        /// The deck title.
        title: ArcStr,
    },
}

/// Errors running a simulation or reading its results.
#[derive(ThisError, Debug)]
pub enum SimError {
    /// The deck was invalid.
    #[error(transparent)]
    Deck(#[from] DeckError),
    /// The simulator exited non-zero or reported a failed measurement.
    #[error("simulation failed: {0}")]
    Failed(String),
    /// The simulator exceeded its wall-clock budget.
    #[error("simulation timed out after {0:?}")]
    Timeout(Duration),
    /// The run was canceled before or during execution.
    #[error("simulation canceled")]
    Canceled,
    /// A requested measurement was absent from the simulator output.
    #[error("measurement `{0}` missing from simulator output")]
    MeasurementMissing(ArcStr),
    /// I/O error writing the deck or reading results.
    #[error("io error")]
    Io(#[from] std::io::Error),
}
