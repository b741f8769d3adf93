//! ngspice errors.

use spice::SimError;
use thiserror::Error as ThisError;

/// The result type returned by ngspice library functions.
pub type Result<T> = std::result::Result<T, Error>;

/// Possible ngspice errors.
#[derive(ThisError, Debug)]
pub enum Error {
    /// I/O error.
    #[error("io error")]
    Io(#[from] std::io::Error),
    /// Template parsing/rendering error.
    #[error("template error")]
    Template(#[from] tera::Error),
    /// Error parsing the output rawfile.
    #[error("error parsing output rawfile: {0}")]
    RawfileParse(String),
    /// A measurement that ngspice reported as failed.
    #[error("measurement `{0}` failed")]
    MeasurementFailed(String),
}

impl From<Error> for SimError {
    fn from(value: Error) -> Self {
        match value {
            Error::Io(e) => SimError::Io(e),
            Error::Template(e) => SimError::Failed(format!("template error: {e}")),
            Error::RawfileParse(msg) => SimError::Failed(format!("rawfile parse error: {msg}")),
            Error::MeasurementFailed(name) => {
                SimError::Failed(format!("measurement `{name}` failed"))
            }
        }
    }
}
