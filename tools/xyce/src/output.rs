//! Parsers for Xyce output artifacts.
//!
//! Measurement scalars come back in a `.mt0` file of `name = value` lines;
//! saved waveforms come back as whitespace-separated `.prn` tables whose
//! header names the columns (`TIME`/`FREQ` first, then `V(net)` or the
//! `VR(net)`/`VI(net)` pair for AC sweeps).

use arcstr::ArcStr;
use indexmap::IndexMap;
use spice::sim::{AnalysisRecord, SignalData};
use spice::Deck;

use crate::error::Error;

/// Extracts `name = value` lines from a `.mt0` measurement file.
///
/// Only names the deck actually requested are read. A `FAILED` value for a
/// requested measurement makes the whole simulation a failure.
pub fn parse_measurements(text: &str, deck: &Deck) -> Result<IndexMap<ArcStr, f64>, Error> {
    let mut out = IndexMap::new();
    for line in text.lines() {
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
        } else if token.eq_ignore_ascii_case("failed") {
            return Err(Error::MeasurementFailed(name.to_string()));
        }
    }
    Ok(out)
}

/// Strips the `V(...)`, `VR(...)`, or `VI(...)` wrapper from a column name.
fn column_net(column: &str) -> Option<(&str, Part)> {
    let paren = column.find('(')?;
    let inner = column[paren + 1..].strip_suffix(')')?;
    match &column[..paren].to_ascii_uppercase()[..] {
        "V" => Some((inner, Part::Whole)),
        "VR" => Some((inner, Part::Real)),
        "VI" => Some((inner, Part::Imag)),
        _ => None,
    }
}

#[derive(PartialEq, Eq)]
enum Part {
    Whole,
    Real,
    Imag,
}

/// Parses a `.prn` table into an [`AnalysisRecord`].
///
/// The first column is the sweep variable. The trailing
/// `End of Xyce(TM) Simulation` footer is tolerated.
pub fn parse_prn(text: &str) -> Result<AnalysisRecord, Error> {
    let mut lines = text.lines();
    let header = lines
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| Error::TableParse("empty output table".to_string()))?;
    let columns: Vec<&str> = header.split_whitespace().collect();
    if columns.len() < 2 {
        return Err(Error::TableParse(format!(
            "output table header has {} columns; expected at least 2",
            columns.len()
        )));
    }

    let mut data: Vec<Vec<f64>> = vec![Vec::new(); columns.len()];
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        // The footer line starts with a non-numeric token.
        if tokens[0].parse::<f64>().is_err() {
            break;
        }
        if tokens.len() != columns.len() {
            return Err(Error::TableParse(format!(
                "output table row has {} values; expected {}",
                tokens.len(),
                columns.len()
            )));
        }
        for (column, token) in data.iter_mut().zip(&tokens) {
            let value = token
                .parse::<f64>()
                .map_err(|_| Error::TableParse(format!("bad value `{token}`")))?;
            column.push(value);
        }
    }

    let mut iter = data.into_iter();
    let sweep = iter.next().unwrap_or_default();
    let mut signals: IndexMap<ArcStr, SignalData> = IndexMap::new();
    for (column, values) in columns[1..].iter().zip(iter) {
        let (net, part) = match column_net(column) {
            Some((net, part)) => (net, part),
            None => {
                signals.insert(ArcStr::from(*column), SignalData::Real(values));
                continue;
            }
        };
        if part == Part::Whole {
            signals.insert(ArcStr::from(net), SignalData::Real(values));
            continue;
        }
        let slot = signals
            .entry(ArcStr::from(net))
            .or_insert_with(|| SignalData::Complex {
                real: Vec::new(),
                imag: Vec::new(),
            });
        match (slot, part) {
            (SignalData::Complex { real, .. }, Part::Real) => *real = values,
            (SignalData::Complex { imag, .. }, Part::Imag) => *imag = values,
            _ => {
                return Err(Error::TableParse(format!(
                    "net `{net}` printed both real and complex"
                )))
            }
        }
    }
    Ok(AnalysisRecord { sweep, signals })
}
