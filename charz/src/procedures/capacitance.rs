//! Input pin capacitance by AC sweep.
//!
//! A small AC current is injected into the pin and the resulting voltage
//! observed across a decade sweep. The pin conductance `i / |v|` of a
//! capacitive load grows linearly with frequency at slope `2*pi*C`, so a
//! least-squares slope fit recovers the capacitance.

use liberty::Group;
use spice::deck::{Analysis, Component, Source};
use spice::SimError;
use tracing::debug;

use crate::cell::Direction;
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::procedures::{harness, run_deck, CellUnderTest, Task, TaskCtx};

/// The registry name of this procedure.
pub const NAME: &str = "ac_sweep";

const AC_CURRENT: f64 = 1e-6;
const SHUNT_OHMS: f64 = 1e10;
const POINTS_PER_DECADE: u32 = 100;
const FSTART: f64 = 10.0;
const FSTOP: f64 = 1e10;

/// One task per signal input pin, both legs of a differential pair.
pub fn tasks(cut: &CellUnderTest, _settings: &Settings) -> Result<Vec<Task>> {
    let mut out = Vec::new();
    for port in cut.cell.inputs() {
        let direction = port.direction;
        for pin in port.pins() {
            let cut = cut.clone();
            let target = pin.name.clone();
            let variation = format!("pin_{}", target.to_ascii_lowercase());
            out.push(Task::new(
                cut.cell.name.clone(),
                NAME,
                variation.clone(),
                move |ctx| measure_pin(&cut, ctx, &variation, &target, direction),
            ));
        }
    }
    Ok(out)
}

fn build_deck(cut: &CellUnderTest, target: &str) -> spice::Deck {
    let mut deck = harness::base_deck(
        cut,
        format!("{} input capacitance of {target}", cut.cell.name),
    );
    let vss = cut.env.vss();
    let target_net = harness::net(target);
    deck.sources.push(Source::Iac {
        name: target_net.clone(),
        pos: target_net.clone(),
        neg: arcstr::literal!("0"),
        magnitude: AC_CURRENT,
    });
    deck.components.push(Component::Resistor {
        name: arcstr::format!("sh_{target_net}"),
        pos: target_net.clone(),
        neg: arcstr::literal!("0"),
        value: SHUNT_OHMS,
    });
    for port in cut.cell.inputs() {
        for pin in port.pins() {
            if pin.name == target {
                continue;
            }
            let pin_net = harness::net(&pin.name);
            deck.sources.push(Source::Vdc {
                name: pin_net.clone(),
                pos: pin_net,
                neg: arcstr::literal!("0"),
                value: vss,
            });
        }
    }
    let load = cut.cell.params.loads.first().copied().unwrap_or(0.0);
    let load_farads = cut.env.units.capacitive_load.to_si(load);
    for port in cut.cell.outputs() {
        for pin in port.pins() {
            let pin_net = harness::net(&pin.name);
            deck.components.push(Component::Resistor {
                name: arcstr::format!("sh_{pin_net}"),
                pos: pin_net.clone(),
                neg: arcstr::literal!("0"),
                value: SHUNT_OHMS,
            });
            deck.components.push(Component::Capacitor {
                name: arcstr::format!("l_{pin_net}"),
                pos: pin_net,
                neg: arcstr::literal!("0"),
                value: load_farads,
            });
        }
    }
    deck.analyses.push(Analysis::AcDecade {
        points_per_decade: POINTS_PER_DECADE,
        fstart: FSTART,
        fstop: FSTOP,
    });
    deck.saves.push(harness::net(target));
    deck
}

fn measure_pin(
    cut: &CellUnderTest,
    ctx: &TaskCtx,
    variation: &str,
    target: &str,
    direction: Direction,
) -> Result<Group> {
    let deck = build_deck(cut, target);
    let record = run_deck(cut, ctx, NAME, variation, "sweep", &deck, 0.0)?;
    let target_net = harness::net(target);
    let analysis = record
        .analyses
        .first()
        .ok_or_else(|| Error::Sim(SimError::MeasurementMissing(target_net.clone())))?;
    let voltage = harness::signal(analysis, &target_net)
        .ok_or_else(|| Error::Sim(SimError::MeasurementMissing(target_net.clone())))?;
    let capacitance = fit_capacitance(&analysis.sweep, &voltage.magnitude());
    let value = cut.env.units.capacitive_load.from_si(capacitance);
    debug!(cell = %cut.cell.name, pin = target, capacitance = value, "fitted pin capacitance");

    let mut cell_group = Group::with_identifier("cell", cut.cell.name.clone())?;
    let mut pin_group = Group::with_identifier("pin", target)?;
    pin_group.add_attribute("direction", direction.attribute());
    pin_group.add_attribute("capacitance", value);
    cell_group.add_group(pin_group);
    Ok(cell_group)
}

/// Least-squares slope of conductance versus frequency, through the
/// origin, divided by `2*pi`.
fn fit_capacitance(frequencies: &[f64], magnitudes: &[f64]) -> f64 {
    let mut num = 0.0;
    let mut den = 0.0;
    for (&f, &v) in frequencies.iter().zip(magnitudes) {
        if v <= 0.0 {
            continue;
        }
        let g = AC_CURRENT / v;
        num += f * g;
        den += f * f;
    }
    if den == 0.0 {
        return 0.0;
    }
    num / den / (2.0 * std::f64::consts::PI)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn slope_fit_recovers_the_capacitance() {
        let c = 5e-15;
        let frequencies: Vec<f64> = (1..=60).map(|i| 10f64.powf(i as f64 / 6.0)).collect();
        let magnitudes: Vec<f64> = frequencies
            .iter()
            .map(|f| AC_CURRENT / (2.0 * std::f64::consts::PI * f * c))
            .collect();
        assert_relative_eq!(
            fit_capacitance(&frequencies, &magnitudes),
            c,
            max_relative = 1e-9
        );
    }
}
