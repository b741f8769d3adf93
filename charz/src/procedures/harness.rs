//! Deck construction shared by the procedures.
//!
//! Net naming convention: every subcircuit port is wired to a net named
//! after it in lowercase; supply ports are wired to the configured node
//! names. Differential pairs are expanded here, the complement leg driven
//! with the mirrored stimulus and loaded like its partner.

use std::io::Write;
use std::path::Path;

use arcstr::ArcStr;
use logic::PinState;
use spice::deck::{Component, Deck, Instance, Source};
use spice::sim::{AnalysisRecord, SignalData, SimRecord};

use crate::cell::PinStateMap;
use crate::error::Result;
use crate::procedures::CellUnderTest;

/// The net a pin is wired to.
pub(crate) fn net(pin: &str) -> ArcStr {
    ArcStr::from(pin.to_ascii_lowercase())
}

/// A deck with the DUT wired, supplies sourced, temperature set, and model
/// includes attached. Stimulus, loads, analyses, and measurements are the
/// caller's.
pub(crate) fn base_deck(cut: &CellUnderTest, title: impl Into<ArcStr>) -> Deck {
    let cell = &cut.cell;
    let env = &cut.env;
    let connections = cell
        .subckt
        .ports
        .iter()
        .map(|port| {
            let wired = match env.nodes.get(port) {
                Some(node) => net(&node.name),
                None => net(port),
            };
            (port.clone(), wired)
        })
        .collect();
    let instance = Instance {
        name: ArcStr::from("dut"),
        subckt: cell.subckt.clone(),
        connections,
    };
    let mut deck = Deck::new(title, instance);
    deck.temperature = env.temperature;
    deck.includes = cell.params.models.clone();
    for node in env.nodes.all() {
        deck.sources.push(Source::Vdc {
            name: net(&node.name),
            pos: net(&node.name),
            neg: ArcStr::from("0"),
            value: node.voltage,
        });
    }
    deck
}

/// A three-vertex full-swing ramp: flat until `t_edge`, then a linear
/// transition of duration `transit` seconds.
pub(crate) fn ramp(v0: f64, v1: f64, t_edge: f64, transit: f64) -> Vec<(f64, f64)> {
    vec![(0.0, v0), (t_edge, v0), (t_edge + transit, v1)]
}

/// Applies one pin-state assignment: the target input ramps at `t_edge`
/// over `transit` seconds, stable inputs hold their DC levels, target
/// outputs carry `load_farads` to ground, ignored outputs stay open.
pub(crate) fn apply_states(
    deck: &mut Deck,
    cut: &CellUnderTest,
    states: &PinStateMap,
    t_edge: f64,
    transit: f64,
    load_farads: f64,
) {
    let env = &cut.env;
    let (vss, vdd) = (env.vss(), env.vdd());
    for port in cut.cell.inputs() {
        for pin in port.pins() {
            let pin_net = net(&pin.name);
            if port.name == states.target_input {
                let state = if pin.inverting {
                    states.input_state.mirrored()
                } else {
                    states.input_state
                };
                let (v0, v1) = match state {
                    PinState::Rise => (vss, vdd),
                    _ => (vdd, vss),
                };
                deck.sources.push(Source::Vpwl {
                    name: pin_net.clone(),
                    pos: pin_net,
                    neg: ArcStr::from("0"),
                    points: ramp(v0, v1, t_edge, transit),
                });
            } else {
                let level = states
                    .stable_inputs
                    .get(&port.name)
                    .copied()
                    .unwrap_or(false)
                    ^ pin.inverting;
                deck.sources.push(Source::Vdc {
                    name: pin_net.clone(),
                    pos: pin_net,
                    neg: ArcStr::from("0"),
                    value: if level { vdd } else { vss },
                });
            }
        }
    }
    for port in cut.cell.outputs() {
        if port.name != states.target_output {
            continue;
        }
        for pin in port.pins() {
            let pin_net = net(&pin.name);
            deck.components.push(Component::Capacitor {
                name: arcstr::format!("l_{pin_net}"),
                pos: pin_net,
                neg: ArcStr::from("0"),
                value: load_farads,
            });
        }
    }
}

/// Looks up a saved waveform by net, tolerating the `v(net)` spelling
/// simulators use for voltage vectors.
pub(crate) fn signal<'a>(record: &'a AnalysisRecord, pin_net: &str) -> Option<&'a SignalData> {
    record
        .signal(pin_net)
        .or_else(|| record.signal(&format!("v({pin_net})")))
}

/// Dumps each analysis of a record as a CSV file next to its netlist.
pub(crate) fn dump_waveforms(dir: &Path, record: &SimRecord) -> Result<()> {
    for (i, analysis) in record.analyses.iter().enumerate() {
        let path = dir.join(format!("waves_{i}.csv"));
        let mut f = std::fs::File::create(path)?;
        write!(f, "sweep")?;
        for name in analysis.signals.keys() {
            write!(f, ",{name}")?;
        }
        writeln!(f)?;
        let columns: Vec<Vec<f64>> = analysis
            .signals
            .values()
            .map(SignalData::magnitude)
            .collect();
        for (row, t) in analysis.sweep.iter().enumerate() {
            write!(f, "{t:e}")?;
            for column in &columns {
                write!(f, ",{:e}", column.get(row).copied().unwrap_or(f64::NAN))?;
            }
            writeln!(f)?;
        }
    }
    Ok(())
}
