//! Deck rendering in Xyce syntax.
//!
//! Xyce reads mostly the same card set as ngspice; the differences that
//! matter here are the measurement syntax (`TRIG V(a)=0.55 RISE=1`), the
//! `.PRINT` statements that replace `.save`, and temperature via
//! `.OPTIONS DEVICE TEMP`.

use std::io::Write;

use spice::deck::{
    Analysis, Component, Deck, EdgeDir, Measurement, Occurrence, ResolvedInclude, Source,
};
use spice::DeckError;

type Result<T> = std::result::Result<T, spice::SimError>;

fn num(v: f64) -> String {
    format!("{v:e}")
}

fn occurrence(dir: EdgeDir, occurrence: Occurrence) -> String {
    let key = match dir {
        EdgeDir::Rise => "RISE",
        EdgeDir::Fall => "FALL",
        EdgeDir::Cross => "CROSS",
    };
    match occurrence {
        Occurrence::Nth(n) => format!("{key}={n}"),
        Occurrence::Last => format!("{key}=LAST"),
    }
}

fn write_measurement(w: &mut (impl Write + ?Sized), m: &Measurement) -> std::io::Result<()> {
    writeln!(
        w,
        ".MEASURE TRAN {} TRIG V({})={} {} TARG V({})={} {}",
        m.name,
        m.trig.signal,
        num(m.trig.value),
        occurrence(m.trig.dir, m.trig.occurrence),
        m.targ.signal,
        num(m.targ.value),
        occurrence(m.targ.dir, m.targ.occurrence),
    )
}

/// Writes `deck` as a Xyce netlist.
pub fn write_deck(w: &mut (impl Write + ?Sized), deck: &Deck) -> Result<()> {
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
        writeln!(w, ".OPTIONS DEVICE TEMP={}", deck.temperature)?;
        for (key, value) in &deck.options {
            writeln!(w, ".OPTIONS {key}={value}")?;
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
                } => writeln!(w, "V{name} {pos} {neg} {}", num(*value))?,
                Source::Vpwl {
                    name,
                    pos,
                    neg,
                    points,
                } => {
                    write!(w, "V{name} {pos} {neg} PWL")?;
                    for (t, v) in points {
                        write!(w, " {} {}", num(*t), num(*v))?;
                    }
                    writeln!(w)?;
                }
                Source::Iac {
                    name,
                    pos,
                    neg,
                    magnitude,
                } => writeln!(w, "I{name} {pos} {neg} AC {}", num(*magnitude))?,
            }
        }
        writeln!(w)?;

        for analysis in &deck.analyses {
            match analysis {
                Analysis::Tran { step, stop } => {
                    writeln!(w, ".TRAN {} {}", num(*step), num(*stop))?;
                    if !deck.saves.is_empty() {
                        write!(w, ".PRINT TRAN FORMAT=NOINDEX")?;
                        for save in &deck.saves {
                            write!(w, " V({save})")?;
                        }
                        writeln!(w)?;
                    }
                }
                Analysis::AcDecade {
                    points_per_decade,
                    fstart,
                    fstop,
                } => {
                    writeln!(
                        w,
                        ".AC DEC {points_per_decade} {} {}",
                        num(*fstart),
                        num(*fstop)
                    )?;
                    if !deck.saves.is_empty() {
                        write!(w, ".PRINT AC FORMAT=NOINDEX")?;
                        for save in &deck.saves {
                            write!(w, " VR({save}) VI({save})")?;
                        }
                        writeln!(w)?;
                    }
                }
            }
        }
        for measurement in &deck.measurements {
            write_measurement(w, measurement)?;
        }
        writeln!(w, ".END")?;
        Ok(())
    };
    inner(&mut { w }).map_err(spice::SimError::Io)
}
