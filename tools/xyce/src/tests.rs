use approx::assert_relative_eq;
use arcstr::ArcStr;
use spice::deck::{Analysis, Deck, Event, Instance, Measurement};
use spice::sim::SignalData;
use spice::Subckt;

use crate::netlist::write_deck;
use crate::output::{parse_measurements, parse_prn};

fn measured_deck() -> Deck {
    let mut deck = Deck::new(
        "tb",
        Instance {
            name: ArcStr::from("dut"),
            subckt: Subckt {
                name: ArcStr::from("INVX1"),
                ports: vec!["A".into(), "Y".into()],
            },
            connections: vec![("A".into(), "a".into()), ("Y".into(), "y".into())],
        },
    );
    deck.analyses.push(Analysis::Tran {
        step: 1e-13,
        stop: 1e-9,
    });
    deck.measurements.push(Measurement {
        name: "t_a_to_y_prop".into(),
        trig: Event::rise("a", 0.55),
        targ: Event::fall("y", 0.55).last(),
    });
    deck
}

#[test]
fn decks_render_through_a_trait_object_writer() {
    let mut sink = Vec::new();
    let writer: &mut dyn std::io::Write = &mut sink;
    write_deck(writer, &measured_deck()).unwrap();
    let text = String::from_utf8(sink).unwrap();
    assert!(text.contains(".MEASURE TRAN t_a_to_y_prop TRIG V(a)"));
}

#[test]
fn mt0_measurements_are_read_by_name() {
    let text = "\
T_A_TO_Y_PROP = 1.234000e-11
unrelated = 7
";
    let measures = parse_measurements(text, &measured_deck()).unwrap();
    assert_eq!(measures.len(), 1);
    assert_eq!(measures["t_a_to_y_prop"], 1.234e-11);
}

#[test]
fn failed_measurements_fail_the_simulation() {
    let text = "T_A_TO_Y_PROP = FAILED\n";
    assert!(parse_measurements(text, &measured_deck()).is_err());
}

#[test]
fn transient_tables_parse_into_real_signals() {
    let text = "\
TIME           V(Y)          V(A)
0.000000e+00   1.100000e+00  0.000000e+00
1.000000e-10   5.500000e-01  5.500000e-01
2.000000e-10   0.000000e+00  1.100000e+00
End of Xyce(TM) Simulation
";
    let record = parse_prn(text).unwrap();
    assert_eq!(record.sweep, vec![0.0, 1e-10, 2e-10]);
    let y = record.signal("y").unwrap();
    assert_eq!(*y, SignalData::Real(vec![1.1, 0.55, 0.0]));
    assert!(record.signal("a").is_some());
}

#[test]
fn ac_tables_pair_real_and_imaginary_columns() {
    let text = "\
FREQ           VR(N)         VI(N)
1.000000e+01   1.000000e+00  0.000000e+00
1.000000e+02   7.071000e-01  -7.071000e-01
End of Xyce(TM) Simulation
";
    let record = parse_prn(text).unwrap();
    assert_eq!(record.sweep, vec![10.0, 100.0]);
    let n = record.signal("n").unwrap();
    let mags = n.magnitude();
    assert_relative_eq!(mags[0], 1.0);
    assert_relative_eq!(mags[1], 1.0, epsilon = 1e-3);
}

#[test]
fn ragged_tables_are_rejected() {
    let text = "\
TIME V(Y)
0.0 1.0
1.0
";
    assert!(parse_prn(text).is_err());
}
