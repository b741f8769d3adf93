use crate::lut::{LookupTable, TableTemplate};
use crate::parse::parse_library;
use crate::{Group, Value};

fn demo_library() -> Group {
    let mut lib = Group::with_identifier("library", "demo").unwrap();
    lib.add_attribute("comment", "");
    lib.add_attribute("date", "Mon Jan 1 00:00:00 2001");
    lib.add_attribute("technology", Value::List(vec!["cmos".into()]));
    lib.add_attribute("delay_model", "table_lookup");
    lib.add_attribute("time_unit", "1ns");
    lib.add_attribute(
        "capacitive_load_unit",
        Value::List(vec![Value::Int(1), "pF".into()]),
    );
    lib.add_attribute("nom_temperature", 25.0);

    let template = TableTemplate::new_2d(
        "delay_template_2x2",
        "input_net_transition",
        vec![0.1, 0.5],
        "total_output_net_capacitance",
        vec![0.01, 0.1],
    );
    lib.add_item(template.clone());

    let mut cell = Group::with_identifier("cell", "INV").unwrap();
    cell.add_attribute("area", 1.2);
    let mut pin = Group::with_identifier("pin", "Y").unwrap();
    pin.add_attribute("direction", "output");
    pin.add_attribute("function", "!A");
    let mut timing = Group::new("timing").unwrap().with_tag("A");
    timing.add_attribute("related_pin", "A");
    timing.add_attribute("timing_sense", "negative_unate");
    let lut = LookupTable::with_values(
        "cell_rise",
        template,
        vec![0.11, 0.25, 0.13, 0.31],
    )
    .unwrap();
    timing.add_item(lut);
    pin.add_group(timing);
    cell.add_group(pin);
    lib.add_group(cell);
    lib
}

#[test]
fn header_attributes_come_first_in_canonical_order() {
    let text = demo_library().to_liberty_default();
    let pos = |needle: &str| text.find(needle).unwrap_or_else(|| panic!("missing {needle}"));
    assert!(pos("technology") < pos("delay_model"));
    assert!(pos("delay_model") < pos("date"));
    assert!(pos("date") < pos("comment"));
    assert!(pos("comment") < pos("time_unit"));
    assert!(pos("time_unit") < pos("capacitive_load_unit"));
    // Non-header attributes follow the header block.
    assert!(pos("capacitive_load_unit") < pos("nom_temperature"));
    // Templates and cells come after all attributes.
    assert!(pos("nom_temperature") < pos("lu_table_template"));
}

#[test]
fn rendering_is_strictly_indented_and_closed() {
    let text = demo_library().to_liberty_default();
    assert!(text.starts_with("library (demo) {\n"));
    assert!(text.ends_with("} /* end library */\n"));
    assert!(text.contains("  cell (INV) {\n"));
    assert!(text.contains("    pin (Y) {\n"));
    assert!(text.contains("      timing () {\n"));
    assert!(text.contains("    } /* end pin */\n"));
    assert!(text.contains("        values ( \\\n"));
    assert!(text.contains("\"0.110000, 0.250000\", \\\n"));
    assert!(text.contains("\"0.130000, 0.310000\" \\\n"));
}

#[test]
fn self_merge_is_idempotent() {
    let mut lib = demo_library();
    let copy = lib.clone();
    lib.merge(copy).unwrap();
    assert_eq!(lib.to_liberty_default(), demo_library().to_liberty_default());
}

#[test]
fn merge_requires_matching_names() {
    let mut a = Group::with_identifier("cell", "INV").unwrap();
    let b = Group::with_identifier("cell", "BUF").unwrap();
    assert!(a.merge(b).is_err());
}

#[test]
fn merge_unions_attributes_with_other_winning() {
    let mut a = Group::with_identifier("pin", "A").unwrap();
    a.add_attribute("direction", "input");
    a.add_attribute("capacitance", 1.0);
    let mut b = Group::with_identifier("pin", "A").unwrap();
    b.add_attribute("capacitance", 2.0);
    a.merge(b).unwrap();
    assert_eq!(a.attribute("direction").unwrap().as_str(), Some("input"));
    assert_eq!(a.attribute("capacitance").unwrap().as_float(), Some(2.0));
}

#[test]
fn parse_of_writer_output_preserves_structure() {
    let lib = demo_library();
    let text = lib.to_liberty_default();
    let parsed = parse_library(&text).unwrap();
    assert_eq!(parsed.identifier().map(|s| s.as_str()), Some("demo"));
    let cell = parsed.sub_group("cell", Some("INV")).unwrap();
    let pin = cell.sub_group("pin", Some("Y")).unwrap();
    let timing = pin.sub_groups().find(|g| g.name() == "timing").unwrap();
    assert_eq!(
        timing.attribute("timing_sense").unwrap().as_str(),
        Some("negative_unate")
    );
    let lut = timing
        .sub_group("cell_rise", Some("delay_template_2x2"))
        .unwrap();
    assert_eq!(
        lut.attribute("values").unwrap().numbers(),
        vec![0.11, 0.25, 0.13, 0.31]
    );
}

#[test]
fn invalid_group_names_are_rejected()  {
    assert!(Group::new("has space").is_err());
    assert!(Group::new("").is_err());
    assert!(Group::with_identifier("cell", "bad-name").is_err());
}

#[test]
fn referenced_templates_are_collected_once() {
    let lib = demo_library();
    let templates = lib.referenced_templates();
    assert_eq!(templates.len(), 1);
    assert_eq!(templates[0].name(), "delay_template_2x2");
}
