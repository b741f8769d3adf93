//! The simulator execution contract.
//!
//! A backend turns a [`Deck`](crate::deck::Deck) into a dialect-specific
//! netlist, runs it, and parses the results into a [`SimRecord`]:
//! measurement scalars by name, plus the saved waveforms of each analysis.
//! Raw waveforms live only for the lifetime of one job.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use arcstr::ArcStr;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::deck::Deck;
use crate::error::SimError;

/// Everything a backend needs besides the deck itself.
#[derive(Debug, Clone)]
pub struct SimContext {
    /// Directory where the deck, run script, and outputs are written.
    /// Exclusively owned by one job.
    pub work_dir: PathBuf,
    /// Wall-clock budget for the simulator subprocess.
    pub timeout: Duration,
    /// Cooperative cancellation flag, shared with the dispatcher.
    pub cancel: Arc<AtomicBool>,
}

impl SimContext {
    /// Creates a context with the given working directory, a generous
    /// timeout, and a fresh cancellation flag.
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            timeout: Duration::from_secs(300),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Sets the wall-clock budget.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Shares the given cancellation flag.
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }
}

/// A saved data vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SignalData {
    /// Real-valued samples (transient analyses).
    Real(Vec<f64>),
    /// Complex samples (AC analyses).
    Complex {
        /// Real parts.
        real: Vec<f64>,
        /// Imaginary parts.
        imag: Vec<f64>,
    },
}

impl SignalData {
    /// The magnitude of each sample.
    pub fn magnitude(&self) -> Vec<f64> {
        match self {
            Self::Real(v) => v.iter().map(|x| x.abs()).collect(),
            Self::Complex { real, imag } => real
                .iter()
                .zip(imag)
                .map(|(re, im)| re.hypot(*im))
                .collect(),
        }
    }

    /// The number of samples.
    pub fn len(&self) -> usize {
        match self {
            Self::Real(v) => v.len(),
            Self::Complex { real, .. } => real.len(),
        }
    }

    /// True when no samples were saved.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The saved vectors of one analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    /// The sweep variable: time for transient, frequency for AC.
    pub sweep: Vec<f64>,
    /// Saved signals by name.
    pub signals: IndexMap<ArcStr, SignalData>,
}

impl AnalysisRecord {
    /// Looks up a saved signal case-insensitively.
    pub fn signal(&self, name: &str) -> Option<&SignalData> {
        self.signals
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }
}

/// A parsed simulation result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimRecord {
    /// Measurement values by requested name.
    pub measures: IndexMap<ArcStr, f64>,
    /// One record per analysis, in deck order.
    pub analyses: Vec<AnalysisRecord>,
}

impl SimRecord {
    /// Reads a measurement by name.
    pub fn measure(&self, name: &str) -> Result<f64, SimError> {
        self.measures
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| *v)
            .ok_or_else(|| SimError::MeasurementMissing(ArcStr::from(name)))
    }

    /// Reads a measurement, mapping absence to `None` rather than an error.
    pub fn try_measure(&self, name: &str) -> Option<f64> {
        self.measure(name).ok()
    }
}

/// A simulator backend.
pub trait Simulator: Send + Sync {
    /// The backend's name, used in logs and debug paths.
    fn name(&self) -> &'static str;

    /// Runs one deck to completion and parses its results.
    fn simulate(&self, ctx: &SimContext, deck: &Deck) -> Result<SimRecord, SimError>;
}
