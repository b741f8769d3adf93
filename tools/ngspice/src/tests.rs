use arcstr::ArcStr;
use spice::deck::{Analysis, Deck, Event, Instance, Measurement};
use spice::Subckt;

use crate::netlist::write_deck;
use crate::parse_measurements;

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
    deck.measurements.push(Measurement {
        name: "t_a_to_y_tran".into(),
        trig: Event::fall("y", 0.88).last(),
        targ: Event::fall("y", 0.22).last(),
    });
    deck
}

#[test]
fn decks_render_through_a_trait_object_writer() {
    // write_deck hands a `&mut dyn Write` to its line helpers; feed it
    // one from the outside as well.
    let mut sink = Vec::new();
    let writer: &mut dyn std::io::Write = &mut sink;
    write_deck(writer, &measured_deck(), "out.raw").unwrap();
    let text = String::from_utf8(sink).unwrap();
    assert!(text.contains(".meas tran t_a_to_y_prop trig v(a)"));
    assert!(text.contains("targ v(y)"));
}

#[test]
fn requested_measurements_are_read_by_name() {
    let log = "\
Note: some banner
t_a_to_y_prop  =  1.234e-11 targ=  2e-10 trig= 1.877e-10
unrelated = garbage
t_a_to_y_tran = 4.5e-12
";
    let measures = parse_measurements(log, &measured_deck()).unwrap();
    assert_eq!(measures.len(), 2);
    assert_eq!(measures["t_a_to_y_prop"], 1.234e-11);
    assert_eq!(measures["t_a_to_y_tran"], 4.5e-12);
}

#[test]
fn missing_measurements_are_simply_absent() {
    let log = "t_a_to_y_prop = 1e-12\n";
    let measures = parse_measurements(log, &measured_deck()).unwrap();
    assert!(measures.contains_key("t_a_to_y_prop"));
    assert!(!measures.contains_key("t_a_to_y_tran"));
}

#[test]
fn failed_measurement_tokens_fail_the_simulation() {
    let log = "t_a_to_y_prop = failed\n";
    assert!(parse_measurements(log, &measured_deck()).is_err());
}
