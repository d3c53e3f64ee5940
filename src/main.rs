/*!
  The `primate-tools` command line: thin drivers over the library for the
  four things a build's tooling pipeline needs to do with a configuration.
*/

use std::env;
use std::fs;
use std::process::exit;

use primate_encoding::config::HardwareConfig;
use primate_encoding::emit::{render_summary, BackendDescription, BackendSerializer, TablegenSerializer};
use primate_encoding::error::EncodingError;
use primate_encoding::layout::{format_width_bits, register_field_width};
use primate_encoding::loader::{load_elf, render_memory_init};
use primate_encoding::packet::PacketLayout;
use primate_encoding::reloc::{render_hex, PacketAssembler, SymbolTable};
use primate_encoding::schedule::{MergeAnchor, SlotSchedule};

const USAGE: &str = "\
usage: primate-tools <command> [args]

  describe <primate.cfg> <out.td>
      write the generated backend definitions

  dump <primate.cfg>
      print the derived slot schedule and instruction formats

  asm <primate.cfg> <disasm.txt> <symtab.txt> <out.hex>
      resolve fixups in a disassembly stream and pack it into packet hex

  load <primate.cfg> <program.elf> <pgm.hex> <mem.init>
      extract packets and the memory image from a linked executable
";

fn read_config(path: &str) -> Result<HardwareConfig, EncodingError> {
  let text = fs::read_to_string(path)?;
  HardwareConfig::parse(&text)
}

fn packet_layout_for(cfg: &HardwareConfig) -> Result<PacketLayout, EncodingError> {
  let schedule = SlotSchedule::allocate(cfg, MergeAnchor::Low)?;
  let width = format_width_bits(register_field_width(cfg.num_regs));
  Ok(PacketLayout::derive(&schedule, width))
}

fn expect_args(args: &[String], count: usize, command: &str) -> Result<(), EncodingError> {
  if args.len() != count {
    return Err(EncodingError::Config(
      format!("`{}` takes {} arguments, got {}", command, count, args.len())
    ));
  }
  Ok(())
}

fn run_describe(args: &[String]) -> Result<(), EncodingError> {
  expect_args(args, 2, "describe")?;
  let cfg = read_config(&args[0])?;
  let description = BackendDescription::derive(&cfg, MergeAnchor::Low)?;
  fs::write(&args[1], TablegenSerializer.serialize(&description))?;
  Ok(())
}

fn run_dump(args: &[String]) -> Result<(), EncodingError> {
  expect_args(args, 1, "dump")?;
  let cfg = read_config(&args[0])?;
  let description = BackendDescription::derive(&cfg, MergeAnchor::Low)?;
  println!("{}", render_summary(&description));
  Ok(())
}

fn run_asm(args: &[String]) -> Result<(), EncodingError> {
  expect_args(args, 4, "asm")?;
  let cfg = read_config(&args[0])?;
  let layout = packet_layout_for(&cfg)?;
  let disasm = fs::read_to_string(&args[1])?;
  let symtab_text = fs::read_to_string(&args[2])?;
  let symtab = SymbolTable::parse(&symtab_text, &layout)?;
  let assembler = PacketAssembler::new(&layout, &symtab, register_field_width(cfg.num_regs));
  let packets = assembler.assemble(&disasm)?;
  fs::write(&args[3], render_hex(&packets, &layout))?;
  Ok(())
}

fn run_load(args: &[String]) -> Result<(), EncodingError> {
  expect_args(args, 4, "load")?;
  let cfg = read_config(&args[0])?;
  let layout = packet_layout_for(&cfg)?;
  let bytes = fs::read(&args[1])?;
  let image = load_elf(&bytes, &layout)?;
  fs::write(&args[2], render_hex(&image.packets, &layout))?;
  fs::write(&args[3], render_memory_init(&image.memory))?;
  Ok(())
}

fn main() {
  let args: Vec<String> = env::args().collect();
  if args.len() < 2 {
    eprint!("{}", USAGE);
    exit(2);
  }

  let result = match args[1].as_str() {
    "describe" => run_describe(&args[2..]),
    "dump"     => run_dump(&args[2..]),
    "asm"      => run_asm(&args[2..]),
    "load"     => run_load(&args[2..]),
    other => {
      eprint!("unknown command `{}`\n{}", other, USAGE);
      exit(2);
    }
  };

  if let Err(e) = result {
    eprintln!("error: {}", e);
    exit(1);
  }
}
