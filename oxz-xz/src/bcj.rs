//! Branch/Call/Jump filters.
//!
//! Each BCJ variant rewrites relative branch displacements of one
//! instruction set into absolute form (and back), which turns repeated
//! calls to the same target into repeated byte patterns the LZ stage can
//! match. All variants are symmetric: the same scanner runs on both sides
//! with only the add/subtract direction flipped.
//!
//! `apply` filters as much of the buffer as the instruction window allows
//! and returns that length; trailing bytes that cannot be fully inspected
//! are left for the next call, or pass through verbatim at end of data.

/// Supported BCJ instruction sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BcjArch {
    /// x86 and x86-64 (0xE8/0xE9 CALL and JMP rel32).
    X86,
    /// PowerPC big-endian branch-and-link.
    PowerPc,
    /// ARM 32-bit BL.
    Arm,
    /// ARM Thumb BL pairs.
    ArmThumb,
    /// SPARC CALL.
    Sparc,
    /// ARM64 BL and ADRP.
    Arm64,
}

impl BcjArch {
    /// Instruction alignment of the architecture.
    pub fn alignment(self) -> usize {
        match self {
            BcjArch::X86 => 1,
            BcjArch::ArmThumb => 2,
            _ => 4,
        }
    }
}

/// One direction of one BCJ transform.
#[derive(Debug)]
pub struct BcjFilter {
    arch: BcjArch,
    is_encoder: bool,
    pos: usize,
    prev_mask: u32,
}

impl BcjFilter {
    /// Create a filter. `start_offset` is the absolute position of the
    /// first byte, normally zero.
    pub fn new(arch: BcjArch, start_offset: usize, is_encoder: bool) -> Self {
        // Displacements are relative to the end of the instruction on x86,
        // ARM (pc+8), and Thumb (pc+4); the aligned RISC targets use the
        // instruction start.
        let base = match arch {
            BcjArch::X86 => 5,
            BcjArch::Arm => 8,
            BcjArch::ArmThumb => 4,
            _ => 0,
        };
        Self {
            arch,
            is_encoder,
            pos: start_offset + base,
            prev_mask: 0,
        }
    }

    /// Transform the filterable prefix of `buf` in place and return its
    /// length.
    pub fn apply(&mut self, buf: &mut [u8]) -> usize {
        match self.arch {
            BcjArch::X86 => self.x86_code(buf),
            BcjArch::PowerPc => self.ppc_code(buf),
            BcjArch::Arm => self.arm_code(buf),
            BcjArch::ArmThumb => self.arm_thumb_code(buf),
            BcjArch::Sparc => self.sparc_code(buf),
            BcjArch::Arm64 => self.arm64_code(buf),
        }
    }

    fn x86_code(&mut self, buf: &mut [u8]) -> usize {
        const MASK_TO_ALLOWED_STATUS: [bool; 8] =
            [true, true, true, false, true, false, false, false];
        const MASK_TO_BIT_NUMBER: [u32; 8] = [0, 1, 2, 2, 3, 3, 3, 3];

        fn test_msbyte(b: u8) -> bool {
            b == 0x00 || b == 0xFF
        }

        let len = buf.len();
        if len < 5 {
            return 0;
        }
        let end = len - 5;

        let mut prev_pos: i64 = -1;
        let mut i = 0usize;
        while i <= end {
            if buf[i] & 0xFE != 0xE8 {
                i += 1;
                continue;
            }

            let off = i as i64 - prev_pos;
            prev_pos = i as i64;

            if off > 3 {
                self.prev_mask = 0;
            } else {
                self.prev_mask = (self.prev_mask << (off - 1)) & 7;
                if self.prev_mask != 0 {
                    let b = buf[i + 4 - MASK_TO_BIT_NUMBER[self.prev_mask as usize] as usize];
                    if !MASK_TO_ALLOWED_STATUS[self.prev_mask as usize] || test_msbyte(b) {
                        self.prev_mask = ((self.prev_mask << 1) & 7) | 1;
                        i += 1;
                        continue;
                    }
                }
            }

            if test_msbyte(buf[i + 4]) {
                let mut src = u32::from_le_bytes([buf[i + 1], buf[i + 2], buf[i + 3], buf[i + 4]]);
                let dest;
                loop {
                    let p = (self.pos + i) as u32;
                    let d = if self.is_encoder {
                        src.wrapping_add(p)
                    } else {
                        src.wrapping_sub(p)
                    };
                    if self.prev_mask == 0 {
                        dest = d;
                        break;
                    }
                    let index = MASK_TO_BIT_NUMBER[self.prev_mask as usize] * 8;
                    let probe = (d >> (24 - index)) as u8;
                    if !test_msbyte(probe) {
                        dest = d;
                        break;
                    }
                    src = d ^ ((1u32 << (32 - index)) - 1);
                }
                buf[i + 1] = dest as u8;
                buf[i + 2] = (dest >> 8) as u8;
                buf[i + 3] = (dest >> 16) as u8;
                buf[i + 4] = if dest & 0x0100_0000 != 0 { 0xFF } else { 0x00 };
                i += 5;
            } else {
                self.prev_mask = ((self.prev_mask << 1) & 7) | 1;
                i += 1;
            }
        }

        let off = i as i64 - prev_pos;
        self.prev_mask = if off > 3 {
            0
        } else {
            (self.prev_mask << (off - 1)) & 7
        };
        self.pos += i;
        i
    }

    fn ppc_code(&mut self, buf: &mut [u8]) -> usize {
        let len = buf.len();
        if len < 4 {
            return 0;
        }
        let end = len - 4;
        let mut i = 0;
        while i <= end {
            // Major opcode 18 (b/bl/ba/bla) with the link bit set.
            if buf[i] & 0xFC == 0x48 && buf[i + 3] & 0x03 == 1 {
                let src = (((buf[i] & 0x03) as u32) << 24)
                    | ((buf[i + 1] as u32) << 16)
                    | ((buf[i + 2] as u32) << 8)
                    | ((buf[i + 3] & 0xFC) as u32);

                let p = (self.pos + i) as u32;
                let dest = if self.is_encoder {
                    src.wrapping_add(p)
                } else {
                    src.wrapping_sub(p)
                };

                buf[i] = 0x48 | ((dest >> 24) & 0x03) as u8;
                buf[i + 1] = (dest >> 16) as u8;
                buf[i + 2] = (dest >> 8) as u8;
                buf[i + 3] = (buf[i + 3] & 0x03) | (dest & 0xFC) as u8;
            }
            i += 4;
        }
        self.pos += i;
        i
    }

    fn arm_code(&mut self, buf: &mut [u8]) -> usize {
        let len = buf.len();
        if len < 4 {
            return 0;
        }
        let end = len - 4;
        let mut i = 0;
        while i <= end {
            if buf[i + 3] == 0xEB {
                let src = (((buf[i + 2] as i32) << 16)
                    | ((buf[i + 1] as i32) << 8)
                    | (buf[i] as i32))
                    << 2;
                let p = (self.pos + i) as i32;
                let dest = (if self.is_encoder { src + p } else { src - p }) >> 2;
                buf[i + 2] = ((dest >> 16) & 0xFF) as u8;
                buf[i + 1] = ((dest >> 8) & 0xFF) as u8;
                buf[i] = (dest & 0xFF) as u8;
            }
            i += 4;
        }
        self.pos += i;
        i
    }

    fn arm_thumb_code(&mut self, buf: &mut [u8]) -> usize {
        let len = buf.len();
        if len < 4 {
            return 0;
        }
        let end = len - 4;
        let mut i = 0;
        while i <= end {
            let b1 = buf[i + 1] as i32;
            let b3 = buf[i + 3] as i32;

            if (b3 & 0xF8) == 0xF8 && (b1 & 0xF8) == 0xF0 {
                let b2 = buf[i + 2] as i32;
                let b0 = buf[i] as i32;

                let src =
                    (((b1 & 0x07) << 19) | ((b0 & 0xFF) << 11) | ((b3 & 0x07) << 8) | (b2 & 0xFF))
                        << 1;
                let p = (self.pos + i) as i32;
                let dest = (if self.is_encoder { src + p } else { src - p }) >> 1;

                buf[i + 1] = (0xF0 | ((dest >> 19) & 0x07)) as u8;
                buf[i] = (dest >> 11) as u8;
                buf[i + 3] = (0xF8 | ((dest >> 8) & 0x07)) as u8;
                buf[i + 2] = (dest & 0xFF) as u8;
                i += 2;
            }
            i += 2;
        }
        self.pos += i;
        i
    }

    fn sparc_code(&mut self, buf: &mut [u8]) -> usize {
        let len = buf.len();
        if len < 4 {
            return 0;
        }
        let end = len - 4;
        let mut i = 0;
        while i <= end {
            if (buf[i] == 0x40 && buf[i + 1] & 0xC0 == 0x00)
                || (buf[i] == 0x7F && buf[i + 1] & 0xC0 == 0xC0)
            {
                let src = u32::from_be_bytes([buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]) << 2;
                let p = (self.pos + i) as u32;
                let dest = (if self.is_encoder {
                    src.wrapping_add(p)
                } else {
                    src.wrapping_sub(p)
                }) >> 2;
                let dest = (0x4000_0000u32.wrapping_sub(dest & 0x40_0000))
                    | 0x4000_0000
                    | (dest & 0x3F_FFFF);
                buf[i..i + 4].copy_from_slice(&dest.to_be_bytes());
            }
            i += 4;
        }
        self.pos += i;
        i
    }

    fn arm64_code(&mut self, buf: &mut [u8]) -> usize {
        let len = buf.len();
        if len < 4 {
            return 0;
        }
        let end = len - 4;
        let mut i = 0;
        while i <= end {
            let src = i32::from_le_bytes([buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]);
            let p = (self.pos + i) as i32;

            // BL
            if (src >> 26) & 0x3F == 0x25 {
                let addr = if self.is_encoder {
                    src.wrapping_add(p >> 2)
                } else {
                    src.wrapping_sub(p >> 2)
                };
                let dest = (addr & 0x03FF_FFFF) | (0x94 << 24);
                buf[i..i + 4].copy_from_slice(&dest.to_le_bytes());
            }

            // ADRP, only for the +/-512 MiB range the transform can express.
            if (src >> 24) & 0x9F == 0x90 {
                let addr = ((src >> 29) & 3) | ((src >> 3) & 0x001F_FFFC);

                if (addr.wrapping_add(0x0002_0000) & 0x001C_0000) == 0 {
                    let addr = if self.is_encoder {
                        addr.wrapping_add(p >> 12)
                    } else {
                        addr.wrapping_sub(p >> 12)
                    };

                    let mut dest = (0x90 << 24) | (src & 0x1F);
                    dest |= (addr & 3) << 29;
                    dest |= (addr & 0x0003_FFFC) << 3;
                    dest |= 0i32.wrapping_sub(addr & 0x0002_0000) & 0x00E0_0000;
                    buf[i..i + 4].copy_from_slice(&dest.to_le_bytes());
                }
            }

            i += 4;
        }
        self.pos += i;
        i
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(arch: BcjArch, data: &[u8]) {
        let mut encoded = data.to_vec();
        let done = BcjFilter::new(arch, 0, true).apply(&mut encoded);
        assert!(done <= data.len());

        let mut decoded = encoded.clone();
        let done_dec = BcjFilter::new(arch, 0, false).apply(&mut decoded);
        assert_eq!(done, done_dec, "both directions must filter equally far");
        assert_eq!(decoded, data, "{arch:?} roundtrip");
    }

    fn sample_code() -> Vec<u8> {
        // A spread of values that trips each scanner's patterns somewhere.
        let mut data = Vec::new();
        for i in 0u32..600 {
            data.extend_from_slice(&i.wrapping_mul(0x0101_0101).to_le_bytes());
        }
        // x86-style calls with 0x00/0xFF displacement MSBs.
        data.extend_from_slice(&[0xE8, 0x12, 0x34, 0x00, 0x00]);
        data.extend_from_slice(&[0xE9, 0xEE, 0xCD, 0xAB, 0xFF]);
        // ARM BL.
        data.extend_from_slice(&[0x12, 0x34, 0x56, 0xEB]);
        // ARM64 BL.
        data.extend_from_slice(&0x9400_1234u32.to_le_bytes());
        // PowerPC bl.
        data.extend_from_slice(&[0x48, 0x00, 0x12, 0x35]);
        // SPARC call.
        data.extend_from_slice(&[0x40, 0x00, 0x00, 0x42]);
        data
    }

    #[test]
    fn test_roundtrip_all_arches() {
        let data = sample_code();
        for arch in [
            BcjArch::X86,
            BcjArch::PowerPc,
            BcjArch::Arm,
            BcjArch::ArmThumb,
            BcjArch::Sparc,
            BcjArch::Arm64,
        ] {
            roundtrip(arch, &data);
        }
    }

    #[test]
    fn test_x86_rewrites_call_displacement() {
        // CALL rel32 at position 0: E8 xx xx xx 00.
        let mut buf = [0xE8, 0x10, 0x00, 0x00, 0x00, 0x90, 0x90, 0x90];
        let done = BcjFilter::new(BcjArch::X86, 0, true).apply(&mut buf);
        assert!(done >= 5);
        assert_ne!(&buf[1..5], &[0x10, 0x00, 0x00, 0x00], "displacement must change");

        let mut back = buf;
        BcjFilter::new(BcjArch::X86, 0, false).apply(&mut back);
        assert_eq!(back[..5], [0xE8, 0x10, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_x86_leaves_non_branch_bytes() {
        let data = [0x90u8; 64];
        let mut buf = data;
        BcjFilter::new(BcjArch::X86, 0, true).apply(&mut buf);
        assert_eq!(buf, data);
    }

    #[test]
    fn test_short_buffers_pass_through() {
        for arch in [BcjArch::X86, BcjArch::Arm, BcjArch::Sparc] {
            let mut buf = [0xE8u8, 0x01, 0x02];
            let done = BcjFilter::new(arch, 0, true).apply(&mut buf);
            assert_eq!(done, 0, "{arch:?}: nothing fully inspectable");
            assert_eq!(buf, [0xE8, 0x01, 0x02]);
        }
    }

    #[test]
    fn test_split_application_matches_oneshot() {
        // Filtering in two pieces (with the unfiltered tail carried to the
        // second call) must equal filtering in one piece.
        let data = sample_code();

        let mut whole = data.clone();
        let whole_done = BcjFilter::new(BcjArch::Arm, 0, true).apply(&mut whole);

        let mut filter = BcjFilter::new(BcjArch::Arm, 0, true);
        let mut split = data.clone();
        let cut = 1003;
        let first = filter.apply(&mut split[..cut]);
        let _second = filter.apply(&mut split[first..]);
        assert_eq!(&split[..whole_done], &whole[..whole_done]);
    }

    #[test]
    fn test_alignment() {
        assert_eq!(BcjArch::X86.alignment(), 1);
        assert_eq!(BcjArch::ArmThumb.alignment(), 2);
        assert_eq!(BcjArch::Arm64.alignment(), 4);
    }
}
