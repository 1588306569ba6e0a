use comfy_table::{Attribute, Cell, Color, Table, modifiers, presets};

use crate::tools::EntitySummary;

pub fn build_entities_table<'a>(entities: impl IntoIterator<Item = &'a EntitySummary>) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED).apply_modifier(modifiers::UTF8_ROUND_CORNERS);
    table.enforce_styling();
    table.set_header(vec!["Entity", "Name", "State"]);
    for entity in entities {
        table.add_row(vec![
            Cell::new(&entity.entity_id),
            Cell::new(&entity.friendly_name).add_attribute(Attribute::Dim),
            Cell::new(format!("{} {}", entity.state, entity.unit_of_measurement).trim_end()).fg(
                match entity.state.as_str() {
                    "unavailable" | "unknown" => Color::DarkYellow,
                    _ => Color::Green,
                },
            ),
        ]);
    }
    table
}
