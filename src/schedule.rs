/*!
  The slot allocator maps the configured mix of general (green) and specialized
  (blue) functional units onto an ordered list of VLIW issue slots.

  A slot can host a green unit, a blue unit, or both (merged). Each green slot
  additionally carries two extract units and one insert unit, the read and
  write ports into the wide aggregate register file that moves structured
  values between green and blue units. The last and second-to-last
  blue-capable slots are reserved for the I/O unit and the load-store unit.

  Unit names are interned atoms: the layout engine, the packet codec, and the
  backend emitter all refer to the same unit by the same atom, so the schedule
  built here must be the one handed to every downstream component.
*/

use std::fmt::{Display, Formatter};

use string_cache::DefaultAtom;
use strum_macros::{Display as StrumDisplay, IntoStaticStr};

use crate::config::HardwareConfig;
use crate::error::EncodingError;

/**
  Where merging is anchored when one unit kind outnumbers the other.

  The original sources describe merging as starting "with the last BFU slot"
  but implement it anchored at slot 0. `Low` reproduces the implemented
  behavior bit-for-bit and is the default everywhere; `High` is the behavior
  the comment described, kept as an explicit, tested policy rather than a
  silent fix.
*/
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum MergeAnchor {
  Low,
  High,
}

#[derive(StrumDisplay, IntoStaticStr, Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum SlotRole {
  PlainGreen,
  PlainBlue,
  MergedGreenBlue,
  IOUnit,
  MergedIOUnit,
  LSUUnit,
  MergedLSUUnit,
}

impl SlotRole {
  /// Role is a pure function of the slot's capabilities and whether it sits
  /// at the reserved I/O or load-store index.
  fn resolve(has_green: bool, has_blue: bool, is_io: bool, is_lsu: bool)
    -> Option<SlotRole>
  {
    match (has_green, has_blue) {
      (true, true) if is_io  => Some(SlotRole::MergedIOUnit),
      (true, true) if is_lsu => Some(SlotRole::MergedLSUUnit),
      (true, true)           => Some(SlotRole::MergedGreenBlue),
      (true, false)          => Some(SlotRole::PlainGreen),
      (false, true) if is_io  => Some(SlotRole::IOUnit),
      (false, true) if is_lsu => Some(SlotRole::LSUUnit),
      (false, true)           => Some(SlotRole::PlainBlue),
      (false, false)          => None,
    }
  }

  pub fn is_io(&self) -> bool {
    match self {
      SlotRole::IOUnit | SlotRole::MergedIOUnit => true,
      _ => false
    }
  }

  pub fn is_lsu(&self) -> bool {
    match self {
      SlotRole::LSUUnit | SlotRole::MergedLSUUnit => true,
      _ => false
    }
  }
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Slot {
  pub index: u32,
  pub has_green: bool,
  pub has_blue: bool,
  pub role: SlotRole,
}

impl Slot {
  /// The name of the slot's primary functional unit. The reserved units are
  /// singletons and carry no slot index.
  pub fn primary_unit_name(&self) -> DefaultAtom {
    match self.role {
      SlotRole::PlainGreen      => DefaultAtom::from(format!("GreenUnit{}", self.index).as_str()),
      SlotRole::PlainBlue       => DefaultAtom::from(format!("BlueUnit{}", self.index).as_str()),
      SlotRole::MergedGreenBlue => DefaultAtom::from(format!("GreenBlueUnit{}", self.index).as_str()),
      SlotRole::IOUnit          => DefaultAtom::from("IOUnit"),
      SlotRole::MergedIOUnit    => DefaultAtom::from("GreenIOUnit"),
      SlotRole::LSUUnit         => DefaultAtom::from("LSUUnit"),
      SlotRole::MergedLSUUnit   => DefaultAtom::from("GreenLSUUnit"),
    }
  }

  /// All unit names the slot contributes, in packet order: extract ports,
  /// primary unit, insert port.
  pub fn unit_names(&self) -> Vec<DefaultAtom> {
    let mut names = Vec::new();
    if self.has_green {
      names.push(DefaultAtom::from(format!("ExtractUnit{}a", self.index).as_str()));
      names.push(DefaultAtom::from(format!("ExtractUnit{}b", self.index).as_str()));
    }
    names.push(self.primary_unit_name());
    if self.has_green {
      names.push(DefaultAtom::from(format!("InsertUnit{}", self.index).as_str()));
    }
    names
  }
}

impl Display for Slot {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "slot {} ({})", self.index, self.role)
  }
}

/**
  The ordered slot list for one build, plus the packet-order unit name list
  that both the scheduling-resource emission and the physical sub-instruction
  order are read from. The branch unit is appended after all slots.
*/
#[derive(Clone, Debug)]
pub struct SlotSchedule {
  pub slots: Vec<Slot>,
  pub io_index: u32,
  pub lsu_index: u32,
  packet_order: Vec<DefaultAtom>,
}

impl SlotSchedule {

  pub fn allocate(cfg: &HardwareConfig, anchor: MergeAnchor)
    -> Result<SlotSchedule, EncodingError>
  {
    let num_alus = cfg.num_alus as usize;
    let num_bfus = cfg.num_bfus as usize;
    let num_slots = num_alus.max(num_bfus);

    // The minority kind occupies a contiguous run of slots; the anchor picks
    // which end of the schedule that run starts from.
    let covered = |i: usize, count: usize| -> bool {
      match anchor {
        MergeAnchor::Low  => i < count,
        MergeAnchor::High => i >= num_slots - count,
      }
    };
    let greens: Vec<bool> = (0..num_slots)
      .map(|i| num_alus >= num_bfus || covered(i, num_alus))
      .collect();
    let blues: Vec<bool> = (0..num_slots)
      .map(|i| num_alus < num_bfus || covered(i, num_bfus))
      .collect();

    // Reserved units live in the last two blue-capable slots.
    let blue_indices: Vec<usize> =
      (0..num_slots).filter(|&i| blues[i]).collect();
    let io_index = blue_indices[blue_indices.len() - 1] as u32;
    let lsu_index = blue_indices[blue_indices.len() - 2] as u32;

    let mut slots = Vec::with_capacity(num_slots);
    for i in 0..num_slots {
      let role = SlotRole::resolve(
          greens[i], blues[i],
          i as u32 == io_index,
          i as u32 == lsu_index
        )
        .ok_or_else(|| EncodingError::Config(
          format!("slot {} is neither green nor blue", i)
        ))?;
      slots.push(Slot{ index: i as u32, has_green: greens[i], has_blue: blues[i], role });
    }

    let mut packet_order: Vec<DefaultAtom> = Vec::new();
    for slot in &slots {
      packet_order.extend(slot.unit_names());
    }
    packet_order.push(DefaultAtom::from("BranchUnit"));

    Ok(SlotSchedule{ slots, io_index, lsu_index, packet_order })
  }

  /// Unit names in physical sub-instruction order, branch unit last.
  pub fn packet_order(&self) -> &[DefaultAtom] {
    &self.packet_order
  }

  /// One position for the branch unit, four per green-capable slot, one per
  /// blue-only slot.
  pub fn packet_size_in_subinstrs(&self) -> usize {
    self.packet_order.len()
  }

}

#[cfg(test)]
mod tests {
  use super::*;

  fn cfg(num_alus: u32, num_bfus: u32) -> HardwareConfig {
    HardwareConfig::new(num_alus, num_bfus, 32).unwrap()
  }

  #[test]
  fn four_alus_three_bfus_low_anchor() {
    let schedule = SlotSchedule::allocate(&cfg(4, 3), MergeAnchor::Low).unwrap();
    assert_eq!(schedule.slots.len(), 4);
    let roles: Vec<SlotRole> = schedule.slots.iter().map(|s| s.role).collect();
    assert_eq!(roles, vec![
      SlotRole::MergedGreenBlue,
      SlotRole::MergedLSUUnit,
      SlotRole::MergedIOUnit,
      SlotRole::PlainGreen,
    ]);
    assert_eq!(schedule.packet_size_in_subinstrs(), 17);
  }

  #[test]
  fn four_alus_three_bfus_high_anchor() {
    let schedule = SlotSchedule::allocate(&cfg(4, 3), MergeAnchor::High).unwrap();
    let roles: Vec<SlotRole> = schedule.slots.iter().map(|s| s.role).collect();
    assert_eq!(roles, vec![
      SlotRole::PlainGreen,
      SlotRole::MergedGreenBlue,
      SlotRole::MergedLSUUnit,
      SlotRole::MergedIOUnit,
    ]);
    // Anchoring moves the merge, not the packet size.
    assert_eq!(schedule.packet_size_in_subinstrs(), 17);
  }

  #[test]
  fn more_bfus_than_alus() {
    let schedule = SlotSchedule::allocate(&cfg(1, 4), MergeAnchor::Low).unwrap();
    let roles: Vec<SlotRole> = schedule.slots.iter().map(|s| s.role).collect();
    assert_eq!(roles, vec![
      SlotRole::MergedGreenBlue,
      SlotRole::PlainBlue,
      SlotRole::LSUUnit,
      SlotRole::IOUnit,
    ]);
    // 1 branch + 4 for the single green slot + 3 blue-only slots.
    assert_eq!(schedule.packet_size_in_subinstrs(), 8);
  }

  #[test]
  fn role_totality_and_reserved_uniqueness() {
    for num_alus in 1..=16u32 {
      for num_bfus in 2..=16u32 {
        for &anchor in &[MergeAnchor::Low, MergeAnchor::High] {
          let schedule = SlotSchedule::allocate(&cfg(num_alus, num_bfus), anchor).unwrap();
          let greens = schedule.slots.iter().filter(|s| s.has_green).count();
          let blue_only = schedule.slots.iter().filter(|s| !s.has_green && s.has_blue).count();
          assert_eq!(
            schedule.packet_size_in_subinstrs(),
            1 + 4 * greens + blue_only
          );
          assert_eq!(schedule.slots.iter().filter(|s| s.role.is_io()).count(), 1);
          assert_eq!(schedule.slots.iter().filter(|s| s.role.is_lsu()).count(), 1);
        }
      }
    }
  }

  #[test]
  fn unit_names_in_packet_order() {
    let schedule = SlotSchedule::allocate(&cfg(1, 2), MergeAnchor::Low).unwrap();
    let names: Vec<&str> = schedule.packet_order().iter().map(|a| a.as_ref()).collect();
    assert_eq!(names, vec![
      "ExtractUnit0a", "ExtractUnit0b", "GreenLSUUnit", "InsertUnit0",
      "IOUnit",
      "BranchUnit",
    ]);
  }
}
