/*!
  Serialization of a build's derived encoding description for downstream
  consumers: the compiler backend's generated definitions on one hand, and a
  human-readable dump for inspecting what a configuration derives to on the
  other.
*/

use prettytable::{format as TableFormat, Table};
use strum::IntoEnumIterator;

use crate::config::HardwareConfig;
use crate::error::EncodingError;
use crate::layout::{
  format_width_bits, register_field_width, FormatKind, InstructionFormat, OPCODE_BITS,
};
use crate::packet::PacketLayout;
use crate::schedule::{MergeAnchor, SlotSchedule};

/**
  Everything the configuration derives to: the slot schedule, the placed
  instruction formats, and the packet geometry. Built once and handed to
  whichever serializer the caller wants.
*/
pub struct BackendDescription {
  pub config: HardwareConfig,
  pub reg_width: u32,
  pub schedule: SlotSchedule,
  pub formats: Vec<InstructionFormat>,
  pub packet_layout: PacketLayout,
}

impl BackendDescription {

  pub fn derive(config: &HardwareConfig, anchor: MergeAnchor)
    -> Result<BackendDescription, EncodingError>
  {
    let reg_width = register_field_width(config.num_regs);
    let schedule = SlotSchedule::allocate(config, anchor)?;
    let formats: Vec<InstructionFormat> = FormatKind::iter()
      .map(|kind| InstructionFormat::layout(kind, reg_width))
      .collect();
    let packet_layout = PacketLayout::derive(&schedule, format_width_bits(reg_width));
    Ok(BackendDescription{
      config: *config,
      reg_width,
      schedule,
      formats,
      packet_layout,
    })
  }

}

/// Renders a `BackendDescription` into some textual target format.
pub trait BackendSerializer {
  fn serialize(&self, description: &BackendDescription) -> String;
}

/**
  The TableGen-flavored serializer consumed by the compiler backend's build:
  one `FuncUnit` def per scheduling resource, grouped by slot with the branch
  unit last, followed by one record per instruction format listing every
  field's absolute bit range.
*/
pub struct TablegenSerializer;

impl BackendSerializer for TablegenSerializer {
  fn serialize(&self, description: &BackendDescription) -> String {
    let mut out = String::new();
    out.push_str("// Generated scheduling resources and instruction formats.\n");
    out.push_str(&format!(
      "// {} slots, {} byte packets, {} bit register fields.\n",
      description.schedule.slots.len(),
      description.packet_layout.packet_width_bytes,
      description.reg_width
    ));

    for slot in &description.schedule.slots {
      out.push('\n');
      out.push_str(&format!("// Slot {} ({})\n", slot.index, slot.role));
      for name in slot.unit_names() {
        out.push_str(&format!("def {} : FuncUnit;\n", name));
      }
    }
    out.push_str("\ndef BranchUnit : FuncUnit;\n");

    for format in &description.formats {
      out.push('\n');
      out.push_str(&format!("def Format{} : InstrFormat {{\n", format.kind));
      out.push_str(&format!("  let Width = {};\n", format.total_width_bits));
      out.push_str("  let Fields = [\n");
      for field in &format.fields {
        let (hi, lo) = field.bit_range();
        out.push_str(&format!("    \"{} {}:{}\",\n", field.name, hi, lo));
      }
      out.push_str(&format!("    \"opcode {}:0\",\n", OPCODE_BITS - 1));
      out.push_str("  ];\n}\n");
    }
    out
  }
}

lazy_static! {
  static ref TABLE_DISPLAY_FORMAT: TableFormat::TableFormat =
    TableFormat::FormatBuilder::new()
      .column_separator('│')
      .borders(' ')
      .separator(
        TableFormat::LinePosition::Title,
        TableFormat::LineSeparator::new('─', '┼', ' ', ' ')
      )
      .separator(
        TableFormat::LinePosition::Bottom,
        TableFormat::LineSeparator::new('─', '┴', ' ', ' ')
      )
      .padding(1, 1)
      .build();
}

fn make_schedule_table(schedule: &SlotSchedule) -> Table {
  let mut table = Table::new();
  table.set_format(*TABLE_DISPLAY_FORMAT);
  table.set_titles(row![ubr->"Slot", ubl->"Role", ubl->"Units"]);
  for slot in &schedule.slots {
    let units: Vec<String> = slot.unit_names().iter().map(|a| a.to_string()).collect();
    table.add_row(row![r->format!("{}", slot.index), slot.role, units.join(", ")]);
  }
  table.add_row(row![r->"", "", "BranchUnit"]);
  table
}

fn make_format_table(format: &InstructionFormat) -> Table {
  let mut table = Table::new();
  table.set_format(*TABLE_DISPLAY_FORMAT);
  table.set_titles(row![ubl->"Field", ubr->"Bits", ubr->"Width", ubl->"Kind"]);
  for field in &format.fields {
    let (hi, lo) = field.bit_range();
    let kind = if field.is_register {
      "register"
    } else if field.src.is_some() {
      "immediate"
    } else {
      ""
    };
    table.add_row(row![
      field.name,
      r->format!("[{}:{}]", hi, lo),
      r->format!("{}", field.width),
      kind
    ]);
  }
  table.add_row(row!["opcode", r->format!("[{}:0]", OPCODE_BITS - 1), r->format!("{}", OPCODE_BITS), ""]);
  table
}

/// The human-readable dump behind the `dump` command.
pub fn render_summary(description: &BackendDescription) -> String {
  let mut out = String::new();
  out.push_str(&format!(
    "{} ALUs, {} BFUs, {} registers ({} bit register fields)\n",
    description.config.num_alus,
    description.config.num_bfus,
    description.config.num_regs,
    description.reg_width
  ));
  out.push_str(&format!(
    "{} sub-instructions of {} bytes per packet, {} bytes total\n\n",
    description.packet_layout.packet_size_in_subinstrs(),
    description.packet_layout.sub_instr_width_bytes,
    description.packet_layout.packet_width_bytes
  ));
  out.push_str(&make_schedule_table(&description.schedule).to_string());
  for format in &description.formats {
    out.push_str(&format!("\nFormat {} ({} bits)\n", format.kind, format.total_width_bits));
    out.push_str(&make_format_table(format).to_string());
  }
  out
}
