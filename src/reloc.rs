/*!
  The branch/jump relocation resolver and the disassembly-stream assembler
  built on top of it.

  Resolution is a strict two-pass affair. Forward references are common, so
  the whole symbol table is built and frozen before any sub-instruction is
  rewritten; only then does the assembler stream through the disassembly,
  grouping sub-instructions into packets and patching a packet-relative
  offset into each branch or jump that carries a fixup annotation.

  Symbol addresses are byte addresses from the disassembler. They are stored
  as packet indices, and an address that does not land on the packet grid is
  rejected outright: it means the disassembly and the configured packet
  geometry disagree, and every offset computed from it would be garbage.
*/

use std::collections::HashMap;
use std::convert::TryFrom;
use std::str::FromStr;

use bimap::BiMap;
use num_enum::TryFromPrimitive;
use string_cache::DefaultAtom;
use strum_macros::{Display as StrumDisplay, EnumString, IntoStaticStr};

use crate::error::EncodingError;
use crate::layout::{fits_signed, FormatKind, InstructionFormat};
use crate::packet::{u64_to_word, word_to_u64, Packet, PacketLayout};

/// The two control-flow fixup kinds that carry semantic weight for packet
/// assembly. Everything else in the stream is reported and passed through.
#[derive(StrumDisplay, EnumString, IntoStaticStr, Copy, Clone, Eq, PartialEq, Debug)]
pub enum RelocKind {
  #[strum(serialize = "R_PRIMATE_BRANCH")]
  Branch,
  #[strum(serialize = "R_PRIMATE_JAL")]
  Jump,
}

impl RelocKind {
  pub fn format_kind(&self) -> FormatKind {
    match self {
      RelocKind::Branch => FormatKind::B,
      RelocKind::Jump   => FormatKind::J,
    }
  }

  fn expected_opcode(&self) -> MajorOpcode {
    match self {
      RelocKind::Branch => MajorOpcode::Branch,
      RelocKind::Jump   => MajorOpcode::Jal,
    }
  }
}

/// The major opcode in bits [6:0] of a sub-instruction word.
#[derive(TryFromPrimitive, Copy, Clone, Eq, PartialEq, Debug)]
#[repr(u8)]
pub enum MajorOpcode {
  Load    = 0x03,
  MiscMem = 0x0f,
  OpImm   = 0x13,
  Auipc   = 0x17,
  Store   = 0x23,
  Op      = 0x33,
  Lui     = 0x37,
  Branch  = 0x63,
  Jalr    = 0x67,
  Jal     = 0x6f,
  System  = 0x73,
}

/**
  Mapping from symbol name to packet index, built once from the symbol-table
  dump and read-only thereafter. Several names may share one packet index
  (the section symbol and the first function both sit at address 0, and
  labels can alias), so the full mapping is a plain map keyed by name; a
  separate first-wins canonical index lets diagnostics name the symbol that
  owns a packet.
*/
pub struct SymbolTable {
  names: HashMap<DefaultAtom, u64>,
  canonical: BiMap<DefaultAtom, u64>,
}

/// Lines of preamble before the rows of an objdump symbol-table or
/// disassembly dump.
const DUMP_HEADER_LINES: usize = 4;

impl SymbolTable {

  pub fn new() -> SymbolTable {
    SymbolTable{ names: HashMap::new(), canonical: BiMap::new() }
  }

  /**
    Parses `objdump -t` style text: a fixed header, then rows whose first
    token is a hex byte address and whose last token is the symbol name.
    Every address must be an exact multiple of the packet width; anything
    else means the disassembly does not align with the configured packet
    geometry.
  */
  pub fn parse(text: &str, layout: &PacketLayout) -> Result<SymbolTable, EncodingError> {
    let mut symtab = SymbolTable::new();
    for line in text.lines().skip(DUMP_HEADER_LINES) {
      let toks: Vec<&str> = line.split_whitespace().collect();
      if toks.len() < 2 {
        continue;
      }
      let address = match u64::from_str_radix(toks[0], 16) {
        Ok(a) => a,
        Err(_e) => continue // Not a symbol row.
      };
      let name = toks[toks.len() - 1];
      if address % layout.packet_width_bytes as u64 != 0 {
        return Err(EncodingError::Config(format!(
          "symbol {} at {:#x} is not aligned to the {} byte packet width",
          name, address, layout.packet_width_bytes
        )));
      }
      symtab.insert(name, address / layout.packet_width_bytes as u64);
    }
    Ok(symtab)
  }

  pub fn insert(&mut self, name: &str, packet_index: u64) {
    let atom = DefaultAtom::from(name);
    // First name in wins as the packet's canonical symbol; aliases at the
    // same index must never evict it.
    let _ = self.canonical.insert_no_overwrite(atom.clone(), packet_index);
    self.names.insert(atom, packet_index);
  }

  pub fn packet_index(&self, name: &str) -> Option<u64> {
    self.names.get(&DefaultAtom::from(name)).cloned()
  }

  /// The canonical (first inserted) symbol at a packet index.
  pub fn symbol_at(&self, packet_index: u64) -> Option<&DefaultAtom> {
    self.canonical.get_by_right(&packet_index)
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

}

/**
  Rewrites one branch/jump sub-instruction word against a frozen symbol
  table. The offset is measured in packets, signed; its implicit low zero
  bit is never encoded. The immediate's current bit positions are zeroed
  before the scattered offset is OR-ed in, so resolving an already-resolved
  word with the same inputs reproduces it exactly.
*/
pub fn resolve(
    packet_index: u64,
    word: u64,
    target: &str,
    kind: RelocKind,
    symtab: &SymbolTable,
    reg_width: u32,
  ) -> Result<u64, EncodingError>
{
  let target_index = symtab.packet_index(target)
    .ok_or_else(|| EncodingError::UnknownSymbol(target.to_string()))?;
  let format = InstructionFormat::layout(kind.format_kind(), reg_width);
  let bits = format.encoded_imm_bits();

  let offset_packets = target_index as i64 - packet_index as i64;
  if !fits_signed(offset_packets, bits) {
    return Err(EncodingError::RelocationOverflow{ kind, offset: offset_packets, bits });
  }

  let cleared = word & !format.immediate_mask();
  Ok(cleared | format.scatter_value(offset_packets))
}

/**
  Streams `objdump -dr` style text into resolved packets.

  Recognized line shapes, after the fixed header:
    `<hex addr> <name>:`                      symbol definition, skipped
    `<hex addr>: <bytes...> <mnemonic...>`    one sub-instruction word
    tab-indented `<hex addr>: <kind> <sym>`   fixup for the previous word
  Anything else is reported to stderr and skipped, matching the original
  tool's tolerance for decorative disassembler output.
*/
pub struct PacketAssembler<'a> {
  layout: &'a PacketLayout,
  symtab: &'a SymbolTable,
  reg_width: u32,
  packets: Vec<Packet>,
  current: Vec<Vec<u8>>,
}

impl<'a> PacketAssembler<'a> {

  pub fn new(layout: &'a PacketLayout, symtab: &'a SymbolTable, reg_width: u32)
    -> PacketAssembler<'a>
  {
    PacketAssembler{
      layout,
      symtab,
      reg_width,
      packets: Vec::new(),
      current: Vec::new(),
    }
  }

  pub fn assemble(mut self, disasm_text: &str) -> Result<Vec<Packet>, EncodingError> {
    for line in disasm_text.lines().skip(DUMP_HEADER_LINES) {
      if line.starts_with('\t') {
        self.apply_annotation(line)?;
        continue;
      }
      let trimmed = line.trim();
      if trimmed.is_empty() || is_symbol_definition(trimmed) {
        continue;
      }
      match self.parse_sub_instruction(trimmed) {
        Some(word) => self.push_word(word)?,
        None => {
          eprintln!("warning: skipping unrecognized line `{}`", trimmed);
        }
      }
    }

    if !self.current.is_empty() {
      return Err(EncodingError::MalformedPacket{
        expected: self.layout.packet_width_bytes,
        found: self.current.len() * self.layout.sub_instr_width_bytes
      });
    }
    Ok(self.packets)
  }

  fn push_word(&mut self, word: Vec<u8>) -> Result<(), EncodingError> {
    self.current.push(word);
    if self.current.len() == self.layout.packet_size_in_subinstrs() {
      let words = std::mem::replace(&mut self.current, Vec::new());
      self.packets.push(Packet::from_words(words, self.layout)?);
    }
    Ok(())
  }

  /// `<hex addr>: <n LE byte tokens> <mnemonic...>`, word returned in wire
  /// order.
  fn parse_sub_instruction(&self, line: &str) -> Option<Vec<u8>> {
    let colon = line.find(':')?;
    u64::from_str_radix(line[..colon].trim(), 16).ok()?;
    let toks: Vec<&str> = line[colon + 1..].split_whitespace().collect();
    let width = self.layout.sub_instr_width_bytes;
    if toks.len() < width {
      return None;
    }
    let mut word = Vec::with_capacity(width);
    for tok in toks[..width].iter().rev() {
      if tok.len() != 2 {
        return None;
      }
      word.push(u8::from_str_radix(tok, 16).ok()?);
    }
    Some(word)
  }

  fn apply_annotation(&mut self, line: &str) -> Result<(), EncodingError> {
    let trimmed = line.trim();
    let colon = match trimmed.find(':') {
      Some(i) => i,
      None => return Ok(())
    };
    let address = match u64::from_str_radix(trimmed[..colon].trim(), 16) {
      Ok(a) => a,
      Err(_e) => return Ok(())
    };
    let toks: Vec<&str> = trimmed[colon + 1..].split_whitespace().collect();
    if toks.len() < 2 {
      return Ok(());
    }
    let kind = match RelocKind::from_str(toks[0]) {
      Ok(kind) => kind,
      Err(_e) => {
        // Only the two control-flow kinds matter for packet assembly.
        eprintln!("warning: {}", EncodingError::UnsupportedFixup(toks[0].to_string()));
        return Ok(());
      }
    };
    let target = toks[1];
    let packet_index = address / self.layout.packet_width_bytes as u64;

    let word = match self.last_word_mut() {
      Some(w) => word_to_u64(w)?,
      None => {
        return Err(EncodingError::Config(
          format!("fixup at {:#x} precedes any sub-instruction", address)
        ));
      }
    };

    if let Ok(opcode) = MajorOpcode::try_from((word & 0x7f) as u8) {
      if opcode != kind.expected_opcode() {
        eprintln!(
          "warning: {} fixup at {:#x} applied to a {:?} sub-instruction",
          kind, address, opcode
        );
      }
    }

    let resolved = resolve(packet_index, word, target, kind, self.symtab, self.reg_width)?;
    if let Some(word_bytes) = self.last_word_mut() {
      let width = word_bytes.len();
      *word_bytes = u64_to_word(resolved, width);
    }
    Ok(())
  }

  /// The most recently accumulated word. The word may already have been
  /// flushed into a full packet when the fixup lands on a packet's last
  /// sub-instruction.
  fn last_word_mut(&mut self) -> Option<&mut Vec<u8>> {
    if !self.current.is_empty() {
      return self.current.last_mut();
    }
    let size = self.layout.packet_size_in_subinstrs();
    self.packets.last_mut().map(|p| p.word_mut(size - 1))
  }

}

fn is_symbol_definition(line: &str) -> bool {
  let toks: Vec<&str> = line.split_whitespace().collect();
  toks.len() == 2
    && toks[0].chars().all(|c| c.is_ascii_hexdigit())
    && toks[1].starts_with('<')
    && toks[1].ends_with(">:")
}

/// Renders resolved packets as the packed hex stream, one packet per line.
pub fn render_hex(packets: &[Packet], layout: &PacketLayout) -> String {
  let mut out = String::new();
  for packet in packets {
    out.push_str(&packet.to_hex_line(layout));
    out.push('\n');
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::HardwareConfig;
  use crate::layout::{format_width_bits, register_field_width};
  use crate::schedule::{MergeAnchor, SlotSchedule};

  fn small_layout() -> PacketLayout {
    let cfg = HardwareConfig::new(1, 2, 32).unwrap();
    let schedule = SlotSchedule::allocate(&cfg, MergeAnchor::Low).unwrap();
    PacketLayout::derive(&schedule, format_width_bits(register_field_width(32)))
  }

  fn symtab_with(entries: &[(&str, u64)]) -> SymbolTable {
    let mut symtab = SymbolTable::new();
    for (name, index) in entries {
      symtab.insert(name, *index);
    }
    symtab
  }

  // beq x1, x2 with a zero immediate.
  const BEQ: u64 = 0x0020_8063;
  // jal x0 with a zero immediate.
  const JAL: u64 = 0x0000_006f;

  #[test]
  fn branch_three_packets_ahead_recovers_exactly_three() {
    let symtab = symtab_with(&[("target", 5)]);
    let resolved = resolve(2, BEQ, "target", RelocKind::Branch, &symtab, 5).unwrap();
    let format = InstructionFormat::layout(FormatKind::B, 5);
    assert_eq!(format.gather_value(resolved), 3);
    // Non-immediate bits are untouched.
    assert_eq!(resolved & !format.immediate_mask(), BEQ);
  }

  #[test]
  fn resolution_is_idempotent_for_fixed_inputs() {
    let symtab = symtab_with(&[("loop", 1)]);
    let once = resolve(7, BEQ, "loop", RelocKind::Branch, &symtab, 5).unwrap();
    let twice = resolve(7, once, "loop", RelocKind::Branch, &symtab, 5).unwrap();
    assert_eq!(once, twice);
  }

  #[test]
  fn backward_jump_resolves_negative() {
    let symtab = symtab_with(&[("head", 0)]);
    let resolved = resolve(6, JAL, "head", RelocKind::Jump, &symtab, 5).unwrap();
    let format = InstructionFormat::layout(FormatKind::J, 5);
    assert_eq!(format.gather_value(resolved), -6);
  }

  #[test]
  fn overflowing_offset_is_fatal() {
    let symtab = symtab_with(&[("far", 5000)]);
    let err = resolve(0, BEQ, "far", RelocKind::Branch, &symtab, 5).unwrap_err();
    match err {
      EncodingError::RelocationOverflow{kind, offset, bits} => {
        assert_eq!(kind, RelocKind::Branch);
        assert_eq!(offset, 5000);
        assert_eq!(bits, 12);
      }
      other => panic!("unexpected error {:?}", other)
    }
  }

  #[test]
  fn unknown_symbol_is_fatal() {
    let symtab = SymbolTable::new();
    assert!(matches!(
      resolve(0, BEQ, "nowhere", RelocKind::Branch, &symtab, 5),
      Err(EncodingError::UnknownSymbol(_))
    ));
  }

  #[test]
  fn symbol_table_rejects_misaligned_addresses() {
    let layout = small_layout();
    let text = "\n\nSYMBOL TABLE:\n\n\
                00000000 l    F .text  00000000 main\n\
                00000014 l      .text  00000000 crooked\n";
    assert!(SymbolTable::parse(text, &layout).is_err());
  }

  #[test]
  fn symbol_table_stores_packet_indices() {
    let layout = small_layout(); // 24 byte packets
    let text = "\n\nSYMBOL TABLE:\n\n\
                00000000 l    F .text  00000000 main\n\
                00000030 l      .text  00000000 target\n";
    let symtab = SymbolTable::parse(text, &layout).unwrap();
    assert_eq!(symtab.packet_index("main"), Some(0));
    assert_eq!(symtab.packet_index("target"), Some(2));
    assert_eq!(symtab.symbol_at(2).map(|a| a.as_ref()), Some("target"));
  }

  #[test]
  fn aliased_symbols_share_a_packet_index() {
    let layout = small_layout(); // 24 byte packets
    let text = "\n\nSYMBOL TABLE:\n\n\
                00000000 l    d  .text  00000000 .text\n\
                00000000 g    F  .text  00000000 main\n\
                00000018 l       .text  00000000 target\n";
    let symtab = SymbolTable::parse(text, &layout).unwrap();
    assert_eq!(symtab.packet_index(".text"), Some(0));
    assert_eq!(symtab.packet_index("main"), Some(0));
    assert_eq!(symtab.packet_index("target"), Some(1));
    assert_eq!(symtab.len(), 3);
    // The first name parsed stays the packet's canonical symbol.
    assert_eq!(symtab.symbol_at(0).map(|a| a.as_ref()), Some(".text"));
  }

  #[test]
  fn unhandled_fixup_kinds_pass_through_unmodified() {
    let layout = small_layout();
    let symtab = symtab_with(&[("value", 1)]);

    let mut text = String::from("\n\n\n\n");
    for addr in &[0u64, 4] {
      text.push_str(&format!("{:8x}: 13 00 00 00   nop\n", addr));
    }
    text.push_str("       8: 37 05 00 00   lui x10, 0\n");
    text.push_str("\t\t\t8: R_PRIMATE_HI20 value\n");
    for addr in &[0xcu64, 0x10, 0x14] {
      text.push_str(&format!("{:8x}: 13 00 00 00   nop\n", addr));
    }

    let assembler = PacketAssembler::new(&layout, &symtab, 5);
    let packets = assembler.assemble(&text).unwrap();
    assert_eq!(packets.len(), 1);
    // The lui word is byte-identical; the fixup was only reported.
    assert_eq!(packets[0].words()[2], vec![0x00, 0x00, 0x05, 0x37]);
  }

  #[test]
  fn assembles_and_resolves_a_stream() {
    let layout = small_layout(); // 6 sub-instructions, 24 bytes
    let symtab = symtab_with(&[("main", 0), ("target", 1)]);

    // Packet 0 ends in a branch to `target`; packet 1 is all nops.
    let mut text = String::from("\nfile.o:     file format elf32-primate\n\nDisassembly:\n");
    text.push_str("00000000 <main>:\n");
    for addr in &[0u64, 4, 8, 12, 16] {
      text.push_str(&format!("{:8x}: 13 00 00 00   nop\n", addr));
    }
    text.push_str("      14: 63 80 20 00   beq x1, x2, 0\n");
    text.push_str("\t\t\t14: R_PRIMATE_BRANCH target\n");
    text.push_str("00000018 <target>:\n");
    for addr in &[0x18u64, 0x1c, 0x20, 0x24, 0x28, 0x2c] {
      text.push_str(&format!("{:8x}: 13 00 00 00   nop\n", addr));
    }

    let assembler = PacketAssembler::new(&layout, &symtab, 5);
    let packets = assembler.assemble(&text).unwrap();
    assert_eq!(packets.len(), 2);

    let hex = render_hex(&packets, &layout);
    let lines: Vec<&str> = hex.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].len(), 48);
    // Branch unit leads the line; offset of +1 packet lands in imm[3:0].
    assert!(lines[0].starts_with("00208163"));
    assert_eq!(lines[1], "00000013".repeat(6));
  }

  #[test]
  fn trailing_partial_packet_is_fatal() {
    let layout = small_layout();
    let symtab = SymbolTable::new();
    let mut text = String::from("\n\n\n\n");
    for addr in &[0u64, 4, 8] {
      text.push_str(&format!("{:8x}: 13 00 00 00   nop\n", addr));
    }
    let assembler = PacketAssembler::new(&layout, &symtab, 5);
    assert!(matches!(
      assembler.assemble(&text),
      Err(EncodingError::MalformedPacket{..})
    ));
  }
}
