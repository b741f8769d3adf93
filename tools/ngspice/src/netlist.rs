//! Deck rendering in ngspice syntax.

use std::io::Write;

use spice::deck::{
    Analysis, Component, Deck, EdgeDir, Measurement, Occurrence, ResolvedInclude, Source,
};
use spice::DeckError;

type Result<T> = std::result::Result<T, spice::SimError>;

/// Formats a float the way ngspice reads it back most reliably.
fn num(v: f64) -> String {
    format!("{v:e}")
}

fn occurrence(dir: EdgeDir, occurrence: Occurrence) -> String {
    let key = match dir {
        EdgeDir::Rise => "rise",
        EdgeDir::Fall => "fall",
        EdgeDir::Cross => "cross",
    };
    match occurrence {
        Occurrence::Nth(n) => format!("{key}={n}"),
        Occurrence::Last => format!("{key}=LAST"),
    }
}

fn write_measurement(w: &mut (impl Write + ?Sized), m: &Measurement) -> std::io::Result<()> {
    writeln!(
        w,
        ".meas tran {} trig v({}) val={} {} targ v({}) val={} {}",
        m.name,
        m.trig.signal,
        num(m.trig.value),
        occurrence(m.trig.dir, m.trig.occurrence),
        m.targ.signal,
        num(m.targ.value),
        occurrence(m.targ.dir, m.targ.occurrence),
    )
}

/// Writes `deck` as an ngspice batch netlist.
///
/// The control block forces an ASCII rawfile and writes it to
/// `raw_name` relative to the working directory.
pub fn write_deck(w: &mut (impl Write + ?Sized), deck: &Deck, raw_name: &str) -> Result<()> {
    deck.validate().map_err(spice::SimError::from)?;
    let includes = deck
        .includes
        .iter()
        .map(|i| i.resolve(&deck.instance.subckt.name))
        .collect::<std::result::Result<Vec<_>, DeckError>>()
        .map_err(spice::SimError::from)?;
    let nets = deck
        .instance
        .ordered_nets()
        .map_err(|e| spice::SimError::from(DeckError::from(e)))?;

    writeln!(w, "* {}", deck.title).map_err(spice::SimError::Io)?;
    let inner = |w: &mut dyn Write| -> std::io::Result<()> {
        writeln!(w, ".temp {}", deck.temperature)?;
        for (key, value) in &deck.options {
            writeln!(w, ".options {key}={value}")?;
        }
        for include in includes {
            match include {
                ResolvedInclude::Include(path) => {
                    writeln!(w, ".include \"{}\"", path.display())?
                }
                ResolvedInclude::Lib(path, section) => {
                    writeln!(w, ".lib \"{}\" {}", path.display(), section)?
                }
            }
        }
        writeln!(w)?;

        write!(w, "X{}", deck.instance.name)?;
        for net in nets {
            write!(w, " {net}")?;
        }
        writeln!(w, " {}", deck.instance.subckt.name)?;

        for component in &deck.components {
            match component {
                Component::Resistor {
                    name,
                    pos,
                    neg,
                    value,
                } => writeln!(w, "R{name} {pos} {neg} {}", num(*value))?,
                Component::Capacitor {
                    name,
                    pos,
                    neg,
                    value,
                } => writeln!(w, "C{name} {pos} {neg} {}", num(*value))?,
            }
        }

        for source in &deck.sources {
            match source {
                Source::Vdc {
                    name,
                    pos,
                    neg,
                    value,
                } => writeln!(w, "V{name} {pos} {neg} dc {}", num(*value))?,
                Source::Vpwl {
                    name,
                    pos,
                    neg,
                    points,
                } => {
                    write!(w, "V{name} {pos} {neg} PWL(")?;
                    for (i, (t, v)) in points.iter().enumerate() {
                        if i > 0 {
                            write!(w, " ")?;
                        }
                        write!(w, "{} {}", num(*t), num(*v))?;
                    }
                    writeln!(w, ")")?;
                }
                Source::Iac {
                    name,
                    pos,
                    neg,
                    magnitude,
                } => writeln!(w, "I{name} {pos} {neg} dc 0 ac {}", num(*magnitude))?,
            }
        }
        writeln!(w)?;

        if !deck.saves.is_empty() {
            write!(w, ".save")?;
            for save in &deck.saves {
                write!(w, " v({save})")?;
            }
            writeln!(w)?;
        }
        for analysis in &deck.analyses {
            match analysis {
                Analysis::Tran { step, stop } => {
                    writeln!(w, ".tran {} {}", num(*step), num(*stop))?
                }
                Analysis::AcDecade {
                    points_per_decade,
                    fstart,
                    fstop,
                } => writeln!(
                    w,
                    ".ac dec {points_per_decade} {} {}",
                    num(*fstart),
                    num(*fstop)
                )?,
            }
        }
        for measurement in &deck.measurements {
            write_measurement(w, measurement)?;
        }

        writeln!(w)?;
        writeln!(w, ".control")?;
        writeln!(w, "set filetype=ascii")?;
        writeln!(w, "run")?;
        writeln!(w, "write {raw_name}")?;
        writeln!(w, ".endc")?;
        writeln!(w, ".end")?;
        Ok(())
    };
    inner(&mut { w }).map_err(spice::SimError::Io)
}

#[cfg(test)]
mod tests {
    use arcstr::ArcStr;
    use spice::deck::{Event, Instance};
    use spice::Subckt;

    use super::*;

    fn deck() -> Deck {
        let mut deck = Deck::new(
            "INVX1 A rise -> Y fall",
            Instance {
                name: ArcStr::from("dut"),
                subckt: Subckt {
                    name: ArcStr::from("INVX1"),
                    ports: vec!["A".into(), "Y".into(), "VDD".into(), "VSS".into()],
                },
                connections: vec![
                    ("A".into(), "a".into()),
                    ("Y".into(), "y".into()),
                    ("VDD".into(), "vdd".into()),
                    ("VSS".into(), "0".into()),
                ],
            },
        );
        deck.sources.push(Source::Vdc {
            name: "vdd".into(),
            pos: "vdd".into(),
            neg: "0".into(),
            value: 1.1,
        });
        deck.sources.push(Source::Vpwl {
            name: "a".into(),
            pos: "a".into(),
            neg: "0".into(),
            points: vec![(0.0, 0.0), (1e-10, 0.0), (2.666e-10, 1.1)],
        });
        deck.components.push(Component::Capacitor {
            name: "load".into(),
            pos: "y".into(),
            neg: "0".into(),
            value: 1e-14,
        });
        deck.analyses.push(Analysis::Tran {
            step: 1e-13,
            stop: 1e-8,
        });
        deck.measurements.push(Measurement {
            name: "t_a_to_y_prop".into(),
            trig: Event::rise("a", 0.55),
            targ: Event::fall("y", 0.55).last(),
        });
        deck.saves.push("a".into());
        deck.saves.push("y".into());
        deck
    }

    #[test]
    fn renders_the_full_deck() {
        let mut out = Vec::new();
        write_deck(&mut out, &deck(), "data.raw").unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("* INVX1 A rise -> Y fall\n"));
        assert!(text.contains("Xdut a y vdd 0 INVX1\n"));
        assert!(text.contains("Cload y 0 1e-14\n"));
        assert!(text.contains("Va a 0 PWL(0e0 0e0 1e-10 0e0 2.666e-10 1.1e0)\n"));
        assert!(text.contains(".tran 1e-13 1e-8\n"));
        assert!(text.contains(
            ".meas tran t_a_to_y_prop trig v(a) val=5.5e-1 rise=1 targ v(y) val=5.5e-1 fall=LAST\n"
        ));
        assert!(text.contains(".save v(a) v(y)\n"));
        assert!(text.contains("set filetype=ascii\n"));
        assert!(text.trim_end().ends_with(".end"));
    }

    #[test]
    fn invalid_wiring_fails_before_emission() {
        let mut deck = deck();
        deck.instance.connections.pop();
        let mut out = Vec::new();
        assert!(write_deck(&mut out, &deck, "data.raw").is_err());
    }
}
