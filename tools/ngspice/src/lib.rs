//! ngspice backend for the characterization engine.
//!
//! Renders a [`spice::Deck`] as an ngspice batch netlist, runs
//! `ngspice -b` through a generated run script, and parses measurement
//! scalars from the log and saved vectors from the ASCII rawfile.
#![warn(missing_docs)]

#[cfg(any(unix, target_os = "redox"))]
use std::os::unix::prelude::PermissionsExt;

use arcstr::ArcStr;
use indexmap::IndexMap;
use spice::sim::{AnalysisRecord, SignalData, SimContext, SimRecord, Simulator};
use spice::{Deck, SimError};
use tracing::debug;

use crate::rawfile::RawData;
use crate::templates::{write_run_script, RunScriptContext};

pub mod error;
pub mod netlist;
pub mod rawfile;
pub(crate) mod templates;

#[cfg(test)]
mod tests;

/// The ngspice simulator.
///
/// Both the `ngspice-shared` and `ngspice-subprocess` backend names are
/// served by the batch subprocess driver; the shared-library binding would
/// change no interface.
#[derive(Debug, Clone, Default)]
pub struct Ngspice {
    /// Extra flags appended to the `ngspice` invocation.
    pub flags: String,
    /// Optional shell rc file sourced before invoking ngspice.
    pub bashrc: Option<std::path::PathBuf>,
}

impl Ngspice {
    /// Creates a backend with default options.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Simulator for Ngspice {
    fn name(&self) -> &'static str {
        "ngspice"
    }

    fn simulate(&self, ctx: &SimContext, deck: &Deck) -> Result<SimRecord, SimError> {
        std::fs::create_dir_all(&ctx.work_dir)?;
        let netlist = ctx.work_dir.join("netlist.spice");
        let raw_path = ctx.work_dir.join("data.raw");
        let log_path = ctx.work_dir.join("ngspice.log");
        let err_path = ctx.work_dir.join("ngspice.err");
        let run_script = ctx.work_dir.join("simulate.sh");

        let mut f = std::fs::File::create(&netlist)?;
        netlist::write_deck(&mut f, deck, "data.raw")?;

        write_run_script(
            RunScriptContext {
                netlist: &netlist,
                log_path: &log_path,
                err_path: &err_path,
                bashrc: self.bashrc.as_ref(),
                flags: &self.flags,
            },
            &run_script,
        )
        .map_err(SimError::from)?;
        let mut perms = std::fs::metadata(&run_script)?.permissions();
        #[cfg(any(unix, target_os = "redox"))]
        perms.set_mode(0o744);
        std::fs::set_permissions(&run_script, perms)?;

        spice::exec::run_script(ctx, &run_script)?;

        let log = std::fs::read_to_string(&log_path)?;
        let measures = parse_measurements(&log, deck).map_err(SimError::from)?;

        let mut analyses = Vec::new();
        if !deck.saves.is_empty() && raw_path.is_file() {
            let contents = std::fs::read_to_string(&raw_path)?;
            let raw = rawfile::parse(&contents).map_err(SimError::from)?;
            for block in raw {
                analyses.push(to_analysis_record(block));
            }
        }
        debug!(
            measures = measures.len(),
            analyses = analyses.len(),
            "parsed ngspice results"
        );
        Ok(SimRecord { measures, analyses })
    }
}

/// Extracts `name = value` measurement lines from the batch log.
///
/// Only names the deck actually requested are read; ngspice prints other
/// `=` lines too. A requested measurement whose value token contains
/// `failed` or an error marker makes the whole simulation a failure.
fn parse_measurements(
    log: &str,
    deck: &Deck,
) -> Result<IndexMap<ArcStr, f64>, crate::error::Error> {
    let mut out = IndexMap::new();
    for line in log.lines() {
        let Some((name, rest)) = line.split_once('=') else {
            continue;
        };
        let name = name.trim();
        let Some(requested) = deck
            .measurements
            .iter()
            .find(|m| m.name.eq_ignore_ascii_case(name))
        else {
            continue;
        };
        let token = rest.trim().split_whitespace().next().unwrap_or("");
        if let Ok(value) = token.parse::<f64>() {
            out.insert(requested.name.clone(), value);
        } else if token.contains("failed") || token.contains("Error") {
            return Err(crate::error::Error::MeasurementFailed(name.to_string()));
        }
    }
    Ok(out)
}

fn to_analysis_record(block: rawfile::RawAnalysis<'_>) -> AnalysisRecord {
    let mut signals = IndexMap::new();
    let sweep;
    match block.data {
        RawData::Real(mut values) => {
            sweep = if values.is_empty() {
                Vec::new()
            } else {
                values.remove(0)
            };
            for (name, data) in block.variables.iter().skip(1).zip(values) {
                signals.insert(ArcStr::from(*name), SignalData::Real(data));
            }
        }
        RawData::Complex { mut real, mut imag } => {
            // The sweep variable (frequency) is stored complex with a zero
            // imaginary part.
            sweep = if real.is_empty() {
                Vec::new()
            } else {
                imag.remove(0);
                real.remove(0)
            };
            for (i, name) in block.variables.iter().skip(1).enumerate() {
                signals.insert(
                    ArcStr::from(*name),
                    SignalData::Complex {
                        real: real[i].clone(),
                        imag: imag[i].clone(),
                    },
                );
            }
        }
    }
    AnalysisRecord { sweep, signals }
}
