//! Engine-level errors.

use arcstr::ArcStr;
use thiserror::Error as ThisError;

use crate::config::ConfigError;

/// The result type returned by engine functions.
pub type Result<T> = std::result::Result<T, Error>;

/// Possible characterization errors.
#[derive(ThisError, Debug)]
pub enum Error {
    /// A configuration problem.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A netlist scanning problem.
    #[error(transparent)]
    Netlist(#[from] spice::NetlistError),
    /// A Boolean function problem.
    #[error(transparent)]
    Function(#[from] logic::Error),
    /// A Liberty model problem.
    #[error(transparent)]
    Liberty(#[from] liberty::Error),
    /// A simulation problem: deck validation, subprocess failure, timeout,
    /// or a missing measurement.
    #[error(transparent)]
    Sim(#[from] spice::SimError),
    /// A characterization task that could not produce its result.
    #[error("procedure `{procedure}` failed for cell `{cell}` at {variation}: {source}")]
    ProcedureFailed {
        /// The cell being characterized.
        cell: ArcStr,
        /// The procedure name.
        procedure: &'static str,
        /// The variation label.
        variation: String,
        /// What went wrong.
        #[source]
        source: Box<Error>,
    },
    /// An invariant violation inside the engine itself.
    #[error("internal error: {0}")]
    Internal(String),
    /// I/O error.
    #[error("io error")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The process exit code this error maps to: 1 for configuration and
    /// model problems, 2 for simulator failures that aborted the run,
    /// 3 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Netlist(_) | Self::Function(_) | Self::Liberty(_) => 1,
            Self::Sim(spice::SimError::Deck(_)) => 1,
            Self::Sim(_) => 2,
            Self::ProcedureFailed { source, .. } => source.exit_code(),
            Self::Internal(_) | Self::Io(_) => 3,
        }
    }
}
