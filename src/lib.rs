/*!

  Encoding toolkit for configurable Primate VLIW builds.

  A build is parametrized by its number of general (green) and specialized
  (blue) functional units and by the size of its register file. From those
  three numbers this crate derives everything downstream tooling needs: the
  slot schedule, the bit-level instruction formats, the packet geometry, and
  the serialized backend description. On top of the derived geometry sit the
  two binary-side tools: the fixup resolver that packs a disassembly stream
  into resolved packets, and the loader that extracts packets and memory
  images from a linked executable.

*/

#[macro_use] extern crate prettytable;
#[macro_use] extern crate lazy_static;

pub mod config;
pub mod emit;
pub mod error;
pub mod layout;
pub mod loader;
pub mod packet;
pub mod reloc;
pub mod schedule;

pub use crate::config::HardwareConfig;
pub use crate::error::EncodingError;
pub use crate::schedule::{MergeAnchor, SlotSchedule};
