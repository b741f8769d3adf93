//! Xyce errors.

use spice::SimError;
use thiserror::Error as ThisError;

/// The result type returned by Xyce library functions.
pub type Result<T> = std::result::Result<T, Error>;

/// Possible Xyce errors.
#[derive(ThisError, Debug)]
pub enum Error {
    /// I/O error.
    #[error("io error")]
    Io(#[from] std::io::Error),
    /// Template parsing/rendering error.
    #[error("template error")]
    Template(#[from] tera::Error),
    /// Error parsing a `.prn` output table.
    #[error("error parsing output table: {0}")]
    TableParse(String),
    /// A measurement that Xyce reported as failed.
    #[error("measurement `{0}` failed")]
    MeasurementFailed(String),
}

impl From<Error> for SimError {
    fn from(value: Error) -> Self {
        match value {
            Error::Io(e) => SimError::Io(e),
            Error::Template(e) => SimError::Failed(format!("template error: {e}")),
            Error::TableParse(msg) => SimError::Failed(format!("table parse error: {msg}")),
            Error::MeasurementFailed(name) => {
                SimError::Failed(format!("measurement `{name}` failed"))
            }
        }
    }
}
