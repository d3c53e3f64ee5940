/*!
  Extraction of packets and memory images from a linked ELF executable.

  The instruction stream lives in `.text` as little-endian sub-instruction
  words, already laid out in wire order, so a packet is one fixed-size chunk
  of the section with each word's bytes reversed. Constant data lives in
  `.rodata` and `.data`; both are flattened into a single word-addressed
  memory image, with each section placed at `sh_offset / 4` the way the
  hardware's memory initializer expects.
*/

use elf::endian::AnyEndian;
use elf::ElfBytes;

use crate::error::EncodingError;
use crate::packet::{word_from_memory, Packet, PacketLayout};

/// Everything the loader pulls out of one executable.
pub struct ProgramImage {
  pub packets: Vec<Packet>,
  pub memory: Vec<u32>,
}

pub fn load_elf(bytes: &[u8], layout: &PacketLayout) -> Result<ProgramImage, EncodingError> {
  let file = ElfBytes::<AnyEndian>::minimal_parse(bytes)
    .map_err(|e| EncodingError::Container(e.to_string()))?;

  let text = section_bytes(&file, ".text")?
    .ok_or_else(|| EncodingError::Container("no .text section".to_string()))?;
  let packets = extract_packets(text.0, layout)?;

  let mut memory: Vec<u32> = Vec::new();
  for name in &[".rodata", ".data"] {
    if let Some((data, offset)) = section_bytes(&file, name)? {
      place_section(&mut memory, data, offset, name)?;
    }
  }

  Ok(ProgramImage{ packets, memory })
}

fn section_bytes<'a>(file: &ElfBytes<'a, AnyEndian>, name: &str)
  -> Result<Option<(&'a [u8], u64)>, EncodingError>
{
  let header = match file.section_header_by_name(name)
    .map_err(|e| EncodingError::Container(e.to_string()))?
  {
    Some(h) => h,
    None => return Ok(None)
  };
  let (data, compression) = file.section_data(&header)
    .map_err(|e| EncodingError::Container(e.to_string()))?;
  if compression.is_some() {
    return Err(EncodingError::Container(format!("section {} is compressed", name)));
  }
  Ok(Some((data, header.sh_offset)))
}

/**
  Chunks raw `.text` bytes into packets. Within each packet-sized chunk the
  sub-instruction words sit in ascending-address slot order, branch unit
  last, with little-endian bytes; the wire form wants the words reversed
  (most significant slot first) and each word's bytes big-endian. A trailing
  partial chunk means the section was not produced for this packet geometry.
*/
pub fn extract_packets(text: &[u8], layout: &PacketLayout)
  -> Result<Vec<Packet>, EncodingError>
{
  if text.len() % layout.packet_width_bytes != 0 {
    return Err(EncodingError::MalformedPacket{
      expected: layout.packet_width_bytes,
      found: text.len() % layout.packet_width_bytes
    });
  }
  let mut packets = Vec::with_capacity(text.len() / layout.packet_width_bytes);
  for chunk in text.chunks(layout.packet_width_bytes) {
    let mut wire = Vec::with_capacity(layout.packet_width_bytes);
    for word in chunk.chunks(layout.sub_instr_width_bytes).rev() {
      wire.extend(word_from_memory(word));
    }
    packets.push(Packet::decode(&wire, layout)?);
  }
  Ok(packets)
}

/**
  Places one data section into the word-addressed memory image at
  `offset / 4`, zero-filling any gap before it. A short final chunk is
  zero-extended; an offset off the word grid is an error.
*/
pub fn place_section(image: &mut Vec<u32>, data: &[u8], offset: u64, section: &str)
  -> Result<(), EncodingError>
{
  if offset % 4 != 0 {
    return Err(EncodingError::MalformedSection{
      section: section.to_string(),
      offset
    });
  }
  let base = (offset / 4) as usize;
  if image.len() < base {
    image.resize(base, 0);
  }
  for (i, chunk) in data.chunks(4).enumerate() {
    let mut bytes = [0u8; 4];
    bytes[..chunk.len()].copy_from_slice(chunk);
    let word = u32::from_le_bytes(bytes);
    if base + i < image.len() {
      image[base + i] = word;
    } else {
      image.push(word);
    }
  }
  Ok(())
}

/// The hardware memory initializer's format: one byte per line, most
/// significant byte of each word first, two lowercase hex characters.
pub fn render_memory_init(words: &[u32]) -> String {
  let mut out = String::with_capacity(words.len() * 12);
  for word in words {
    for byte in &word.to_be_bytes() {
      out.push_str(&format!("{:02x}\n", byte));
    }
  }
  out
}
