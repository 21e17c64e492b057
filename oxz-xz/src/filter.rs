//! Filter identities and chain rules.
//!
//! A block carries 1 to 4 filters. LZMA2 must be the last and only
//! compression filter; Delta and the BCJ family may only appear before it,
//! and no filter ID may appear twice. IA-64 and RISC-V BCJ IDs are part of
//! the format but not implemented here; they are recognized and rejected
//! rather than misinterpreted.

use crate::bcj::{BcjArch, BcjFilter};
use crate::delta::Delta;
use oxz_core::error::{OxzError, Result};

/// Delta filter ID.
pub const FILTER_ID_DELTA: u64 = 0x03;
/// BCJ x86 filter ID.
pub const FILTER_ID_X86: u64 = 0x04;
/// BCJ PowerPC filter ID.
pub const FILTER_ID_PPC: u64 = 0x05;
/// BCJ IA-64 filter ID (recognized, not implemented).
pub const FILTER_ID_IA64: u64 = 0x06;
/// BCJ ARM filter ID.
pub const FILTER_ID_ARM: u64 = 0x07;
/// BCJ ARM-Thumb filter ID.
pub const FILTER_ID_ARM_THUMB: u64 = 0x08;
/// BCJ SPARC filter ID.
pub const FILTER_ID_SPARC: u64 = 0x09;
/// BCJ ARM64 filter ID.
pub const FILTER_ID_ARM64: u64 = 0x0A;
/// BCJ RISC-V filter ID (recognized, not implemented).
pub const FILTER_ID_RISCV: u64 = 0x0B;
/// LZMA2 filter ID.
pub const FILTER_ID_LZMA2: u64 = 0x21;

/// A filter descriptor as stored in a block header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFilter {
    /// Filter ID.
    pub id: u64,
    /// Raw filter properties.
    pub props: Vec<u8>,
}

/// A non-terminal filter selection for the encoder. LZMA2 is implied as
/// the terminal filter and is not part of this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterSpec {
    /// Byte-wise delta with the given distance (1..=256).
    Delta {
        /// Delta distance.
        distance: usize,
    },
    /// BCJ transform for one instruction set.
    Bcj {
        /// Target architecture.
        arch: BcjArch,
    },
}

impl FilterSpec {
    /// The wire filter ID.
    pub fn id(self) -> u64 {
        match self {
            FilterSpec::Delta { .. } => FILTER_ID_DELTA,
            FilterSpec::Bcj { arch } => match arch {
                BcjArch::X86 => FILTER_ID_X86,
                BcjArch::PowerPc => FILTER_ID_PPC,
                BcjArch::Arm => FILTER_ID_ARM,
                BcjArch::ArmThumb => FILTER_ID_ARM_THUMB,
                BcjArch::Sparc => FILTER_ID_SPARC,
                BcjArch::Arm64 => FILTER_ID_ARM64,
            },
        }
    }

    /// The wire properties (BCJ filters use the implicit zero start offset).
    pub fn props(self) -> Vec<u8> {
        match self {
            FilterSpec::Delta { distance } => vec![(distance - 1) as u8],
            FilterSpec::Bcj { .. } => Vec::new(),
        }
    }

    /// Validate encoder-side parameters.
    pub fn validate(self) -> Result<()> {
        if let FilterSpec::Delta { distance } = self {
            if !(1..=256).contains(&distance) {
                return Err(OxzError::invalid_header(format!(
                    "delta distance {distance} out of range 1..=256"
                )));
            }
        }
        Ok(())
    }
}

/// An instantiated non-terminal filter, ready to transform block payloads.
pub enum Stage {
    /// Delta transform.
    Delta(Delta),
    /// BCJ transform.
    Bcj(BcjFilter),
}

impl Stage {
    /// Undo the transform over a whole block, in place. BCJ leaves its
    /// uninspectable tail verbatim, which is the end-of-stream rule.
    pub fn decode(&mut self, buf: &mut [u8]) {
        match self {
            Stage::Delta(delta) => delta.decode(buf),
            Stage::Bcj(bcj) => {
                bcj.apply(buf);
            }
        }
    }

    /// Apply the transform over a whole block, in place.
    pub fn encode(&mut self, buf: &mut [u8]) {
        match self {
            Stage::Delta(delta) => delta.encode(buf),
            Stage::Bcj(bcj) => {
                bcj.apply(buf);
            }
        }
    }
}

fn bcj_arch_for_id(id: u64) -> Option<BcjArch> {
    match id {
        FILTER_ID_X86 => Some(BcjArch::X86),
        FILTER_ID_PPC => Some(BcjArch::PowerPc),
        FILTER_ID_ARM => Some(BcjArch::Arm),
        FILTER_ID_ARM_THUMB => Some(BcjArch::ArmThumb),
        FILTER_ID_SPARC => Some(BcjArch::Sparc),
        FILTER_ID_ARM64 => Some(BcjArch::Arm64),
        _ => None,
    }
}

/// Build the runtime stage for a non-terminal filter descriptor.
pub fn build_stage(raw: &RawFilter, encoder: bool) -> Result<Stage> {
    if raw.id == FILTER_ID_DELTA {
        if raw.props.len() != 1 {
            return Err(OxzError::invalid_header(format!(
                "delta filter wants 1 property byte, got {}",
                raw.props.len()
            )));
        }
        return Ok(Stage::Delta(Delta::new(raw.props[0] as usize + 1)?));
    }

    if let Some(arch) = bcj_arch_for_id(raw.id) {
        let start = match raw.props.len() {
            0 => 0u32,
            4 => u32::from_le_bytes(raw.props[..4].try_into().expect("length checked")),
            n => {
                return Err(OxzError::invalid_header(format!(
                    "BCJ filter wants 0 or 4 property bytes, got {n}"
                )));
            }
        };
        if start as usize % arch.alignment() != 0 {
            return Err(OxzError::invalid_header(format!(
                "BCJ start offset {start} not aligned to {}",
                arch.alignment()
            )));
        }
        return Ok(Stage::Bcj(BcjFilter::new(arch, start as usize, encoder)));
    }

    Err(OxzError::unsupported_filter(raw.id))
}

/// Validate a parsed filter chain against the ordering rules.
pub fn validate_chain(filters: &[RawFilter]) -> Result<()> {
    let Some((last, front)) = filters.split_last() else {
        return Err(OxzError::invalid_header("empty filter chain"));
    };

    if last.id != FILTER_ID_LZMA2 {
        // Either an unknown ID or a known non-terminal filter in the
        // terminal slot.
        return match known_filter(last.id) {
            true => Err(OxzError::invalid_header(format!(
                "filter {:#x} cannot terminate the chain",
                last.id
            ))),
            false => Err(OxzError::unsupported_filter(last.id)),
        };
    }
    if last.props.len() != 1 {
        return Err(OxzError::invalid_header(format!(
            "LZMA2 filter wants 1 property byte, got {}",
            last.props.len()
        )));
    }

    for filter in front {
        if filter.id == FILTER_ID_LZMA2 {
            return Err(OxzError::invalid_header(
                "LZMA2 must be the last filter in the chain",
            ));
        }
        if filter.id == FILTER_ID_IA64 || filter.id == FILTER_ID_RISCV {
            return Err(OxzError::unsupported_filter(filter.id));
        }
        if filter.id != FILTER_ID_DELTA && bcj_arch_for_id(filter.id).is_none() {
            return Err(OxzError::unsupported_filter(filter.id));
        }
    }

    for (i, a) in filters.iter().enumerate() {
        if filters.iter().skip(i + 1).any(|b| b.id == a.id) {
            return Err(OxzError::invalid_header(format!(
                "filter {:#x} appears twice in the chain",
                a.id
            )));
        }
    }

    Ok(())
}

fn known_filter(id: u64) -> bool {
    id == FILTER_ID_DELTA || id == FILTER_ID_LZMA2 || bcj_arch_for_id(id).is_some()
        || id == FILTER_ID_IA64
        || id == FILTER_ID_RISCV
}
