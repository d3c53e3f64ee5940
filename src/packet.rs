/*!
  The packet codec packs and unpacks fixed-size multi-instruction bundles.

  A packet holds one sub-instruction word per unit in the schedule's packet
  order, branch unit last. The wire form concatenates the words in reverse
  slot order, which is also how the downstream disassembly lists a packet's
  sub-instructions, so the branch unit's word leads every encoded packet.
  Within a word the wire form is most significant byte first; the two
  ingestion points (the textual disassembly and ELF text sections, both
  little-endian) reverse their bytes on the way in.
*/

use string_cache::DefaultAtom;

use crate::error::EncodingError;
use crate::schedule::SlotSchedule;

/// The derived packet geometry of one build.
#[derive(Clone, Debug)]
pub struct PacketLayout {
  pub sub_instr_width_bytes: usize,
  pub slot_order_unit_names: Vec<DefaultAtom>,
  pub packet_width_bytes: usize,
}

impl PacketLayout {

  pub fn derive(schedule: &SlotSchedule, total_width_bits: u32) -> PacketLayout {
    let sub_instr_width_bytes = (total_width_bits / 8) as usize;
    let slot_order_unit_names = schedule.packet_order().to_vec();
    let packet_width_bytes = sub_instr_width_bytes * slot_order_unit_names.len();
    PacketLayout{ sub_instr_width_bytes, slot_order_unit_names, packet_width_bytes }
  }

  pub fn packet_size_in_subinstrs(&self) -> usize {
    self.slot_order_unit_names.len()
  }

}

/**
  One packet's sub-instruction words in slot order. Words are byte strings of
  `sub_instr_width_bytes` each, most significant byte first.
*/
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Packet {
  words: Vec<Vec<u8>>,
}

impl Packet {

  pub fn from_words(words: Vec<Vec<u8>>, layout: &PacketLayout) -> Result<Packet, EncodingError> {
    let found: usize = words.iter().map(Vec::len).sum();
    if words.len() != layout.packet_size_in_subinstrs() || found != layout.packet_width_bytes {
      return Err(EncodingError::MalformedPacket{
        expected: layout.packet_width_bytes,
        found
      });
    }
    Ok(Packet{ words })
  }

  pub fn words(&self) -> &[Vec<u8>] {
    &self.words
  }

  pub fn word_mut(&mut self, index: usize) -> &mut Vec<u8> {
    &mut self.words[index]
  }

  /// Concatenates the words in reverse slot order.
  pub fn encode(&self, layout: &PacketLayout) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(layout.packet_width_bytes);
    for word in self.words.iter().rev() {
      bytes.extend_from_slice(word);
    }
    bytes
  }

  /// The exact inverse of `encode`: split, reverse, assign to slots in
  /// original order.
  pub fn decode(bytes: &[u8], layout: &PacketLayout) -> Result<Packet, EncodingError> {
    if bytes.len() != layout.packet_width_bytes {
      return Err(EncodingError::MalformedPacket{
        expected: layout.packet_width_bytes,
        found: bytes.len()
      });
    }
    let mut words: Vec<Vec<u8>> =
      bytes.chunks(layout.sub_instr_width_bytes)
           .map(<[u8]>::to_vec)
           .collect();
    words.reverse();
    Ok(Packet{ words })
  }

  /// One line of `2 * packet_width_bytes` hex characters, most significant
  /// sub-instruction first.
  pub fn to_hex_line(&self, layout: &PacketLayout) -> String {
    let mut line = String::with_capacity(2 * layout.packet_width_bytes);
    for byte in self.encode(layout) {
      line.push_str(&format!("{:02x}", byte));
    }
    line
  }

}

/// Reads a word out of little-endian memory bytes into wire (most significant
/// byte first) order.
pub fn word_from_memory(chunk: &[u8]) -> Vec<u8> {
  chunk.iter().rev().cloned().collect()
}

/// Numeric value of a wire-order word. The resolver manipulates words as
/// integers, which caps the sub-instruction width it can handle at 8 bytes.
pub fn word_to_u64(bytes: &[u8]) -> Result<u64, EncodingError> {
  if bytes.len() > 8 {
    return Err(EncodingError::Config(
      format!("sub-instruction width of {} bytes exceeds the resolver's 64-bit words", bytes.len())
    ));
  }
  Ok(bytes.iter().fold(0u64, |value, &b| (value << 8) | u64::from(b)))
}

/// Inverse of `word_to_u64`.
pub fn u64_to_word(value: u64, width_bytes: usize) -> Vec<u8> {
  (0..width_bytes)
    .rev()
    .map(|i| (value >> (8 * i)) as u8)
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::HardwareConfig;
  use crate::schedule::MergeAnchor;

  fn small_layout() -> PacketLayout {
    // 1 ALU, 2 BFUs: one green slot and one blue slot, 6 sub-instructions.
    let cfg = HardwareConfig::new(1, 2, 32).unwrap();
    let schedule = SlotSchedule::allocate(&cfg, MergeAnchor::Low).unwrap();
    PacketLayout::derive(&schedule, 32)
  }

  #[test]
  fn scenario_geometry() {
    let cfg = HardwareConfig::new(4, 3, 32).unwrap();
    let schedule = SlotSchedule::allocate(&cfg, MergeAnchor::Low).unwrap();
    let layout = PacketLayout::derive(&schedule, 32);
    assert_eq!(layout.sub_instr_width_bytes, 4);
    assert_eq!(layout.packet_size_in_subinstrs(), 17);
    assert_eq!(layout.packet_width_bytes, 68);
  }

  #[test]
  fn encode_decode_round_trip() {
    let layout = small_layout();
    let words: Vec<Vec<u8>> = (0..6u8)
      .map(|i| vec![i, i + 10, i + 20, i + 30])
      .collect();
    let packet = Packet::from_words(words, &layout).unwrap();
    let bytes = packet.encode(&layout);
    assert_eq!(bytes.len(), layout.packet_width_bytes);
    // Branch unit's word leads the wire form.
    assert_eq!(&bytes[0..4], &[5, 15, 25, 35]);
    let decoded = Packet::decode(&bytes, &layout).unwrap();
    assert_eq!(decoded, packet);
  }

  #[test]
  fn decode_rejects_wrong_size() {
    let layout = small_layout();
    let err = Packet::decode(&[0u8; 23], &layout).unwrap_err();
    match err {
      EncodingError::MalformedPacket{expected, found} => {
        assert_eq!(expected, 24);
        assert_eq!(found, 23);
      }
      other => panic!("unexpected error {:?}", other)
    }
  }

  #[test]
  fn hex_line_is_reverse_slot_order() {
    let layout = small_layout();
    let mut words = vec![vec![0u8; 4]; 6];
    words[0] = vec![0x00, 0x00, 0x00, 0x13]; // nop in slot 0
    words[5] = vec![0xde, 0xad, 0xbe, 0xef]; // branch unit
    let packet = Packet::from_words(words, &layout).unwrap();
    let line = packet.to_hex_line(&layout);
    assert_eq!(line.len(), 48);
    assert!(line.starts_with("deadbeef"));
    assert!(line.ends_with("00000013"));
  }

  #[test]
  fn word_helpers_round_trip() {
    let word = word_from_memory(&[0x13, 0x00, 0x00, 0x00]);
    assert_eq!(word, vec![0x00, 0x00, 0x00, 0x13]);
    let value = word_to_u64(&word).unwrap();
    assert_eq!(value, 0x13);
    assert_eq!(u64_to_word(value, 4), word);
  }
}
