//! The error type shared by every stage of the toolchain. All of these are fatal for the
//! current run except `UnsupportedFixup`, which the assembler reports and skips.

use std::fmt::{Display, Formatter};

use crate::reloc::RelocKind;

#[derive(Debug)]
pub enum EncodingError {
  /// Invalid or missing hardware parameters, or an input that contradicts the
  /// derived geometry (e.g. a symbol address off the packet grid).
  Config(String),
  /// A packet whose byte length does not match the derived `PacketLayout`.
  MalformedPacket{
    expected: usize,
    found: usize
  },
  /// An ELF section whose offset is not aligned to the memory word size.
  MalformedSection{
    section: String,
    offset: u64
  },
  /// A fixup names a symbol that is not in the symbol table.
  UnknownSymbol(String),
  /// A packet-relative offset that does not fit the immediate of the fixup kind.
  RelocationOverflow{
    kind: RelocKind,
    offset: i64,
    bits: u32
  },
  /// A fixup kind the packet assembler does not handle. Reported and skipped,
  /// never propagated as an `Err`.
  UnsupportedFixup(String),
  /// ELF container could not be read. The container reader is an external
  /// collaborator, so its parse errors are carried as text.
  Container(String),
  Io(std::io::Error),
}

impl Display for EncodingError {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {

      EncodingError::Config(msg) => {
        write!(f, "configuration error: {}", msg)
      }

      EncodingError::MalformedPacket{expected, found} => {
        write!(f, "malformed packet: expected {} bytes, found {}", expected, found)
      }

      EncodingError::MalformedSection{section, offset} => {
        write!(f, "section {} offset {:#x} is not a multiple of the memory word size", section, offset)
      }

      EncodingError::UnknownSymbol(name) => {
        write!(f, "relocation target `{}` is not in the symbol table", name)
      }

      EncodingError::RelocationOverflow{kind, offset, bits} => {
        write!(f, "{} offset of {} packets does not fit in {} bits", kind, offset, bits)
      }

      EncodingError::UnsupportedFixup(kind) => {
        write!(f, "unhandled fixup kind {}", kind)
      }

      EncodingError::Container(msg) => {
        write!(f, "ELF container error: {}", msg)
      }

      EncodingError::Io(e) => {
        write!(f, "I/O error: {}", e)
      }

    }
  }
}

impl std::error::Error for EncodingError {}

impl From<std::io::Error> for EncodingError {
  fn from(e: std::io::Error) -> EncodingError {
    EncodingError::Io(e)
  }
}
