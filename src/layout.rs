/*!
  The bit-field layout engine computes the exact bit positions of every field
  of every instruction format, parametrized by the derived register-field
  width.

  The baseline encoding is the 32-bit RV32I layout: a 7-bit opcode in bits
  [6:0] and, in the widest format, four 5-bit register fields plus 12 bits of
  function/immediate fields. Growing the register file widens every register
  field to `ceil(log2(num_regs))` bits; the shared format width is the widest
  format's natural size rounded up to whole bytes. Fields keep their baseline
  stacking order, so at a register width of 5 every format is bit-for-bit the
  baseline and external decode tooling built against it keeps working.

  Split immediates (S, B, J) keep the baseline piece order as well. Branch and
  jump targets are packet-aligned, so the low bit of their immediate is never
  encoded; each piece carries a map from source value bits to its position in
  the instruction word.
*/

use strum_macros::{Display as StrumDisplay, EnumIter, EnumString, IntoStaticStr};

/// Opcode placement is invariant across formats and register widths.
pub const OPCODE_BITS: u32 = 7;

/// `ceil(log2(num_regs))`, the width of every register field in one build.
/// Computed once per build and shared by all formats. Requires `num_regs >= 2`.
pub fn register_field_width(num_regs: u32) -> u32 {
  32 - (num_regs - 1).leading_zeros()
}

fn byte_align(bits: u32) -> u32 {
  (bits + 7) / 8 * 8
}

/// The shared width of every instruction format in a build: the widest
/// format's natural size, padded to whole bytes. R4 (four register fields
/// plus 5 function bits) governs for wide register files; U and J (one
/// register field plus a 20 bit immediate) govern for narrow ones. Both
/// reach exactly 32 bits at the baseline register width of 5.
pub fn format_width_bits(reg_width: u32) -> u32 {
  byte_align((4 * reg_width + 12).max(reg_width + 27))
}

/// The thirteen supported instruction-format kinds.
#[derive(
  StrumDisplay, EnumString, IntoStaticStr, EnumIter,
  Copy, Clone, Eq, PartialEq, Debug, Hash
)]
pub enum FormatKind {
  R,
  R4,
  R4Frm,
  RAtomic,
  RFrm,
  IBase,
  I,
  IShift,
  IShiftW,
  S,
  B,
  U,
  J,
}

/// Which bits of the source immediate value a scattered piece carries.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct SrcBits {
  pub hi: u32,
  pub lo: u32,
}

impl SrcBits {
  fn width(&self) -> u32 {
    self.hi - self.lo + 1
  }
}

/**
  One field of an instruction format. `lo` is the absolute bit position of the
  field's least significant bit. `src` is present only for pieces of a split
  immediate; contiguous fields have none.
*/
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Field {
  pub name: &'static str,
  pub width: u32,
  pub lo: u32,
  pub is_register: bool,
  pub src: Option<SrcBits>,
}

impl Field {
  pub fn hi(&self) -> u32 {
    self.lo + self.width - 1
  }

  /// Absolute bit range as `(hi, lo)`.
  pub fn bit_range(&self) -> (u32, u32) {
    (self.hi(), self.lo)
  }
}

/// A field before placement: name, width, register flag, immediate source bits.
struct FieldSpec(&'static str, Width, bool, Option<SrcBits>);

enum Width {
  Reg,
  Fixed(u32),
}

fn src(hi: u32, lo: u32) -> Option<SrcBits> {
  Some(SrcBits{ hi, lo })
}

/// Declared field order per kind, most significant field first. Register
/// fields scale with the register width; everything else keeps its baseline
/// width.
fn field_specs(kind: FormatKind) -> Vec<FieldSpec> {
  use Width::{Fixed, Reg};
  match kind {
    FormatKind::R => vec![
      FieldSpec("funct7", Fixed(7), false, None),
      FieldSpec("rs2", Reg, true, None),
      FieldSpec("rs1", Reg, true, None),
      FieldSpec("funct3", Fixed(3), false, None),
      FieldSpec("rd", Reg, true, None),
    ],
    FormatKind::R4 => vec![
      FieldSpec("rs3", Reg, true, None),
      FieldSpec("funct2", Fixed(2), false, None),
      FieldSpec("rs2", Reg, true, None),
      FieldSpec("rs1", Reg, true, None),
      FieldSpec("funct3", Fixed(3), false, None),
      FieldSpec("rd", Reg, true, None),
    ],
    FormatKind::R4Frm => vec![
      FieldSpec("rs3", Reg, true, None),
      FieldSpec("funct2", Fixed(2), false, None),
      FieldSpec("rs2", Reg, true, None),
      FieldSpec("rs1", Reg, true, None),
      FieldSpec("frm", Fixed(3), false, None),
      FieldSpec("rd", Reg, true, None),
    ],
    FormatKind::RAtomic => vec![
      FieldSpec("funct5", Fixed(5), false, None),
      FieldSpec("aq", Fixed(1), false, None),
      FieldSpec("rl", Fixed(1), false, None),
      FieldSpec("rs2", Reg, true, None),
      FieldSpec("rs1", Reg, true, None),
      FieldSpec("funct3", Fixed(3), false, None),
      FieldSpec("rd", Reg, true, None),
    ],
    FormatKind::RFrm => vec![
      FieldSpec("funct7", Fixed(7), false, None),
      FieldSpec("rs2", Reg, true, None),
      FieldSpec("rs1", Reg, true, None),
      FieldSpec("frm", Fixed(3), false, None),
      FieldSpec("rd", Reg, true, None),
    ],
    // The 12 immediate bits of IBase belong to its refinements; the base
    // format only places the register and function fields.
    FormatKind::IBase => vec![
      FieldSpec("reserved", Fixed(12), false, None),
      FieldSpec("rs1", Reg, true, None),
      FieldSpec("funct3", Fixed(3), false, None),
      FieldSpec("rd", Reg, true, None),
    ],
    FormatKind::I => vec![
      FieldSpec("imm12", Fixed(12), false, None),
      FieldSpec("rs1", Reg, true, None),
      FieldSpec("funct3", Fixed(3), false, None),
      FieldSpec("rd", Reg, true, None),
    ],
    FormatKind::IShift => vec![
      FieldSpec("funct5", Fixed(5), false, None),
      FieldSpec("shamt", Fixed(7), false, None),
      FieldSpec("rs1", Reg, true, None),
      FieldSpec("funct3", Fixed(3), false, None),
      FieldSpec("rd", Reg, true, None),
    ],
    FormatKind::IShiftW => vec![
      FieldSpec("funct7", Fixed(7), false, None),
      FieldSpec("shamt", Fixed(5), false, None),
      FieldSpec("rs1", Reg, true, None),
      FieldSpec("funct3", Fixed(3), false, None),
      FieldSpec("rd", Reg, true, None),
    ],
    FormatKind::S => vec![
      FieldSpec("imm[11:5]", Fixed(7), false, src(11, 5)),
      FieldSpec("rs2", Reg, true, None),
      FieldSpec("rs1", Reg, true, None),
      FieldSpec("funct3", Fixed(3), false, None),
      FieldSpec("imm[4:0]", Fixed(5), false, src(4, 0)),
    ],
    FormatKind::B => vec![
      FieldSpec("imm[11]", Fixed(1), false, src(11, 11)),
      FieldSpec("imm[9:4]", Fixed(6), false, src(9, 4)),
      FieldSpec("rs2", Reg, true, None),
      FieldSpec("rs1", Reg, true, None),
      FieldSpec("funct3", Fixed(3), false, None),
      FieldSpec("imm[3:0]", Fixed(4), false, src(3, 0)),
      FieldSpec("imm[10]", Fixed(1), false, src(10, 10)),
    ],
    FormatKind::U => vec![
      FieldSpec("imm20", Fixed(20), false, None),
      FieldSpec("rd", Reg, true, None),
    ],
    FormatKind::J => vec![
      FieldSpec("imm[19]", Fixed(1), false, src(19, 19)),
      FieldSpec("imm[9:0]", Fixed(10), false, src(9, 0)),
      FieldSpec("imm[10]", Fixed(1), false, src(10, 10)),
      FieldSpec("imm[18:11]", Fixed(8), false, src(18, 11)),
      FieldSpec("rd", Reg, true, None),
    ],
  }
}

/**
  One instruction format with every field placed. Fields are ordered most
  significant first, tile the word from bit 7 through the top bit with no
  gaps or overlaps, and exclude the opcode, which always occupies [6:0].
  Formats narrower than the shared width carry an explicit `pad` field at the
  top; at the baseline register width of 5 no format needs one.
*/
#[derive(Clone, Debug)]
pub struct InstructionFormat {
  pub kind: FormatKind,
  pub fields: Vec<Field>,
  pub total_width_bits: u32,
}

impl InstructionFormat {

  pub fn layout(kind: FormatKind, reg_width: u32) -> InstructionFormat {
    let total_width_bits = format_width_bits(reg_width);
    let specs = field_specs(kind);

    let mut fields: Vec<Field> = Vec::with_capacity(specs.len() + 1);
    let mut cursor = OPCODE_BITS;
    for FieldSpec(name, width, is_register, src) in specs.into_iter().rev() {
      let width = match width {
        Width::Reg => reg_width,
        Width::Fixed(n) => n
      };
      fields.push(Field{ name, width, lo: cursor, is_register, src });
      cursor += width;
    }
    if cursor > total_width_bits {
      // Cannot happen for the thirteen supported kinds; an overflow here
      // means the field tables above are inconsistent with the shared width.
      unreachable!("format {} overflows its {} bit width", kind, total_width_bits);
    }
    if cursor < total_width_bits {
      fields.push(Field{
        name: "pad",
        width: total_width_bits - cursor,
        lo: cursor,
        is_register: false,
        src: None
      });
    }
    fields.reverse();

    InstructionFormat{ kind, fields, total_width_bits }
  }

  /// The mask of every instruction bit belonging to the scattered immediate.
  pub fn immediate_mask(&self) -> u64 {
    self.fields.iter()
      .filter(|f| f.src.is_some())
      .fold(0u64, |mask, f| mask | (bit_mask(f.width) << f.lo))
  }

  /// Number of encoded bits in the scattered immediate, zero if the format
  /// has none.
  pub fn encoded_imm_bits(&self) -> u32 {
    self.fields.iter()
      .filter_map(|f| f.src)
      .map(|s| s.hi + 1)
      .max()
      .unwrap_or(0)
  }

  /// Scatters the low `encoded_imm_bits()` of `value` into the immediate's
  /// instruction-bit positions.
  pub fn scatter_value(&self, value: i64) -> u64 {
    let encoded = (value as u64) & bit_mask(self.encoded_imm_bits());
    self.fields.iter()
      .filter_map(|f| f.src.map(|s| (f, s)))
      .fold(0u64, |word, (f, s)| {
        word | (((encoded >> s.lo) & bit_mask(s.width())) << f.lo)
      })
  }

  /// Gathers the scattered immediate out of `word` and sign-extends it.
  pub fn gather_value(&self, word: u64) -> i64 {
    let bits = self.encoded_imm_bits();
    let raw = self.fields.iter()
      .filter_map(|f| f.src.map(|s| (f, s)))
      .fold(0u64, |value, (f, s)| {
        value | (((word >> f.lo) & bit_mask(s.width())) << s.lo)
      });
    sign_extend(raw, bits)
  }

}

fn bit_mask(width: u32) -> u64 {
  if width >= 64 { u64::max_value() } else { (1u64 << width) - 1 }
}

fn sign_extend(raw: u64, bits: u32) -> i64 {
  if bits == 0 {
    return 0;
  }
  if raw & (1u64 << (bits - 1)) != 0 {
    (raw | !bit_mask(bits)) as i64
  } else {
    raw as i64
  }
}

/// Whether `value` fits a signed `bits`-bit immediate.
pub fn fits_signed(value: i64, bits: u32) -> bool {
  value >= -(1i64 << (bits - 1)) && value < (1i64 << (bits - 1))
}
