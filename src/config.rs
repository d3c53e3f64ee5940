/*!
  Parsing and holding the hardware-configuration parameters that every derived
  encoding rule depends on. The configuration file is the `primate.cfg` emitted
  by the architecture generator: one `KEY=value` pair per line. Only three keys
  matter here; the generator also writes keys like `NUM_THREADS` and `IP_WIDTH`
  for other consumers, and those pass through unrecognized.

  Missing, duplicated, or zero-valued recognized keys fail fast instead of
  leaving a parameter silently unset.
*/

use nom::{
  bytes::complete::take_while1,
  character::complete::{not_line_ending, space0},
  sequence::{delimited, separated_pair},
  bytes::complete::tag,
  IResult,
};

use crate::error::EncodingError;

/// The number of reserved specialized slots every build carries: one I/O unit
/// and one load-store unit.
pub const RESERVED_BFUS: u32 = 2;

/**
  The hardware parameters of one Primate build. Immutable once parsed.

  `num_bfus` as stored already includes the two hidden reserved units (I/O and
  load-store), so it is always at least `RESERVED_BFUS`. The value in the
  configuration file is the user-visible count of custom specialized units.
*/
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct HardwareConfig {
  pub num_alus: u32,
  pub num_bfus: u32,
  pub num_regs: u32,
}

fn kv_line(line: &str) -> IResult<&str, (&str, &str)> {
  separated_pair(
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    delimited(space0, tag("="), space0),
    not_line_ending
  )(line)
}

/// Sets `slot` once; a second occurrence of the same key is an error.
fn set_once(slot: &mut Option<u32>, key: &str, value: &str) -> Result<(), EncodingError> {
  if slot.is_some() {
    return Err(EncodingError::Config(format!("duplicate key {}", key)));
  }
  let parsed = value.trim().parse::<u32>().map_err(|_| {
    EncodingError::Config(format!("key {} has non-integer value `{}`", key, value.trim()))
  })?;
  *slot = Some(parsed);
  Ok(())
}

impl HardwareConfig {

  /**
    Parses the textual `KEY=value` form. Recognized keys are `NUM_ALUS`,
    `NUM_BFUS`, and `NUM_REGS`; anything else is ignored. The stored
    `num_bfus` is the file's value plus the two reserved units.
  */
  pub fn parse(text: &str) -> Result<HardwareConfig, EncodingError> {
    let mut num_alus: Option<u32> = None;
    let mut num_bfus: Option<u32> = None;
    let mut num_regs: Option<u32> = None;

    for line in text.lines() {
      if line.trim().is_empty() {
        continue;
      }
      let (key, value) = match kv_line(line) {
        Ok((_rest, pair)) => pair,
        Err(_e) => {
          return Err(EncodingError::Config(format!("malformed config line `{}`", line)));
        }
      };
      match key {
        "NUM_ALUS" => set_once(&mut num_alus, key, value)?,
        "NUM_BFUS" => set_once(&mut num_bfus, key, value)?,
        "NUM_REGS" => set_once(&mut num_regs, key, value)?,
        _other => {} // Keys for other consumers of primate.cfg.
      }
    }

    let num_alus = num_alus
      .ok_or_else(|| EncodingError::Config("missing key NUM_ALUS".to_string()))?;
    let num_bfus = num_bfus
      .ok_or_else(|| EncodingError::Config("missing key NUM_BFUS".to_string()))?;
    let num_regs = num_regs
      .ok_or_else(|| EncodingError::Config("missing key NUM_REGS".to_string()))?;

    HardwareConfig::new(num_alus, num_bfus + RESERVED_BFUS, num_regs)
  }

  /// Constructs from already-adjusted values, i.e. `num_bfus` counts the two
  /// reserved units.
  pub fn new(num_alus: u32, num_bfus: u32, num_regs: u32) -> Result<HardwareConfig, EncodingError> {
    if num_alus == 0 {
      return Err(EncodingError::Config("NUM_ALUS must be nonzero".to_string()));
    }
    if num_bfus < RESERVED_BFUS {
      return Err(EncodingError::Config(
        format!("NUM_BFUS must include the {} reserved units", RESERVED_BFUS)
      ));
    }
    if num_regs < 2 {
      return Err(EncodingError::Config("NUM_REGS must be at least 2".to_string()));
    }
    Ok(HardwareConfig{ num_alus, num_bfus, num_regs })
  }

}

#[cfg(test)]
mod tests {
  use super::*;

  const SAMPLE: &str = "NUM_ALUS=4\nNUM_BFUS=1\nNUM_REGS=32\nNUM_THREADS=16\nIP_WIDTH=32\n";

  #[test]
  fn parses_and_adds_reserved_units() {
    let cfg = HardwareConfig::parse(SAMPLE).unwrap();
    assert_eq!(cfg.num_alus, 4);
    assert_eq!(cfg.num_bfus, 3); // 1 custom + I/O + LSU
    assert_eq!(cfg.num_regs, 32);
  }

  #[test]
  fn unrecognized_keys_are_ignored() {
    let text = format!("{}IMM_WIDTH=20\n", SAMPLE);
    assert!(HardwareConfig::parse(&text).is_ok());
  }

  #[test]
  fn duplicate_key_is_rejected() {
    let text = format!("{}NUM_ALUS=2\n", SAMPLE);
    assert!(HardwareConfig::parse(&text).is_err());
  }

  #[test]
  fn missing_key_is_rejected() {
    assert!(HardwareConfig::parse("NUM_ALUS=4\nNUM_BFUS=1\n").is_err());
  }

  #[test]
  fn zero_alus_is_rejected() {
    assert!(HardwareConfig::parse("NUM_ALUS=0\nNUM_BFUS=1\nNUM_REGS=32\n").is_err());
  }

  #[test]
  fn tiny_register_file_is_rejected() {
    assert!(HardwareConfig::new(1, 2, 1).is_err());
  }
}
