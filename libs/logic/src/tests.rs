use indexmap::IndexMap;

use crate::state::{Control, StateFunction};
use crate::{Expr, Function, PinState};

#[test]
fn operands_are_sorted_and_unique() {
    let f = Function::parse("B & A | A & C").unwrap();
    assert_eq!(f.operands(), ["A", "B", "C"]);
}

#[test]
fn truth_table_of_and2() {
    let f = Function::parse("A & B").unwrap();
    let table = f.truth_table();
    assert_eq!(table.len(), 4);
    assert_eq!(table[0], (vec![false, false], false));
    assert_eq!(table[3], (vec![true, true], true));
}

#[test]
fn and2_test_vectors_require_the_other_input_high() {
    let f = Function::parse("A & B").unwrap();
    let vectors = f.test_vectors();
    // Two sensitizable adjacencies (01->11 and 10->11), each in both
    // directions.
    assert_eq!(vectors.len(), 4);
    for v in &vectors {
        let stable = v
            .inputs()
            .iter()
            .find(|s| !s.is_transition())
            .copied()
            .unwrap();
        assert_eq!(stable, PinState::H);
        // AND is positive unate: output follows the input direction.
        assert_eq!(v.output(), v.inputs()[v.target_input()]);
    }
}

#[test]
fn inverter_test_vectors() {
    let f = Function::parse("!A").unwrap();
    let vectors = f.test_vectors();
    assert_eq!(vectors.len(), 2);
    assert_eq!(vectors[0].inputs(), [PinState::Rise]);
    assert_eq!(vectors[0].output(), PinState::Fall);
    assert_eq!(vectors[1].inputs(), [PinState::Fall]);
    assert_eq!(vectors[1].output(), PinState::Rise);
}

#[test]
fn xor_sensitizes_every_adjacency() {
    let f = Function::parse("A ^ B").unwrap();
    let vectors = f.test_vectors();
    // All four truth-table edges differ in output, twice each.
    assert_eq!(vectors.len(), 8);
    // Both output directions appear for each transitioning input.
    for k in 0..2 {
        let dirs: Vec<PinState> = vectors
            .iter()
            .filter(|v| v.target_input() == k)
            .map(|v| v.output())
            .collect();
        assert!(dirs.contains(&PinState::Rise));
        assert!(dirs.contains(&PinState::Fall));
    }
}

#[test]
fn every_differing_adjacency_is_covered_exactly_twice() {
    let f = Function::parse("A & B | C").unwrap();
    let table = f.truth_table();
    let n = f.operands().len();
    let vectors = f.test_vectors();
    let mut expected = 0;
    for row in 0..table.len() {
        for k in 0..n {
            let mask = 1usize << (n - 1 - k);
            if row & mask == 0 && table[row].1 != table[row | mask].1 {
                expected += 2;
                let matching = vectors
                    .iter()
                    .filter(|v| {
                        v.target_input() == k
                            && v.inputs()
                                .iter()
                                .enumerate()
                                .all(|(j, s)| {
                                    j == k || s.initial() == table[row].0[j]
                                })
                    })
                    .count();
                assert_eq!(matching, 2, "row {row} operand {k}");
            }
        }
    }
    assert_eq!(vectors.len(), expected);
}

#[test]
fn display_round_trips_through_the_parser() {
    for source in ["!A", "A&B", "A^B", "(A|B)&!C", "A~^B", "!(A&B)|C"] {
        let f = Function::parse(source).unwrap();
        let reparsed = Function::parse(&f.to_string()).unwrap();
        assert_eq!(f, reparsed, "{source}");
    }
}

fn assignment(pairs: &[(&str, bool)]) -> IndexMap<arcstr::ArcStr, bool> {
    pairs
        .iter()
        .map(|(name, value)| (arcstr::ArcStr::from(*name), *value))
        .collect()
}

#[test]
fn clock_gating_holds_state_regardless_of_data() {
    let sf = StateFunction::new(
        Expr::var("D"),
        "Qi",
        Control::active_high("CLK"),
    )
    .with_clear(Control::active_low("RST"));
    for d in [false, true] {
        for q in [false, true] {
            let next = sf
                .eval(&assignment(&[
                    ("CLK", false),
                    ("RST", true),
                    ("D", d),
                    ("Qi", q),
                ]))
                .unwrap();
            assert_eq!(next, q, "D={d} Qi={q}");
        }
    }
}

#[test]
fn clear_overrides_clock_and_preset_wins_over_data() {
    let sf = StateFunction::new(Expr::var("D"), "Qi", Control::active_high("CLK"))
        .with_preset(Control::active_low("S"))
        .with_clear(Control::active_low("R"));
    // Clear asserted (low): next state is 0 no matter what.
    let next = sf
        .eval(&assignment(&[
            ("CLK", true),
            ("D", true),
            ("Qi", true),
            ("S", true),
            ("R", false),
        ]))
        .unwrap();
    assert!(!next);
    // Preset asserted, clear deasserted: next state is 1.
    let next = sf
        .eval(&assignment(&[
            ("CLK", false),
            ("D", false),
            ("Qi", false),
            ("S", false),
            ("R", true),
        ]))
        .unwrap();
    assert!(next);
}

#[test]
fn transparent_latch_captures_while_clock_high() {
    let sf = StateFunction::new(Expr::var("D"), "Qi", Control::active_high("CLK"));
    let next = sf
        .eval(&assignment(&[("CLK", true), ("D", true), ("Qi", false)]))
        .unwrap();
    assert!(next);
}

#[test]
fn enable_gates_the_data_path() {
    let sf = StateFunction::new(Expr::var("D"), "Qi", Control::active_high("CLK"))
        .with_enable(Control::active_high("EN"));
    let next = sf
        .eval(&assignment(&[
            ("CLK", true),
            ("EN", false),
            ("D", true),
            ("Qi", false),
        ]))
        .unwrap();
    assert!(!next);
}

#[test]
fn data_pins_exclude_controls_and_state() {
    let sf = StateFunction::new(
        Expr::var("D").and(Expr::var("EN").not()).or(Expr::var("Qi")),
        "Qi",
        Control::active_high("CLK"),
    )
    .with_enable(Control::active_high("EN"));
    assert_eq!(sf.data_pins(), ["D"]);
}

#[test]
fn data_conditions_deassert_async_controls() {
    let sf = StateFunction::new(Expr::var("D"), "Qi", Control::active_high("CLK"))
        .with_preset(Control::active_low("S"))
        .with_clear(Control::active_low("R"));
    let conditions = sf.data_conditions();
    // Active-low controls deassert at 1.
    assert_eq!(conditions.get("S"), Some(&true));
    assert_eq!(conditions.get("R"), Some(&true));
}

#[test]
fn too_many_operands_is_an_error() {
    let expr = (0..17)
        .map(|i| Expr::var(format!("X{i}")))
        .reduce(Expr::and)
        .unwrap();
    assert!(Function::from_expr(expr).is_err());
}
