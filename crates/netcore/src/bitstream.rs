//! Bit-level message reader/writer, ported from the bit-packing rules in
//! `qcommon/msg.c` (`MSG_WriteBits`/`MSG_ReadBits`): a single cursor
//! counts absolute bits written or read, `oob` selects byte-aligned mode
//! (out-of-band packets) over the adaptive Huffman bitstream mode, and
//! overflow latches rather than panicking so a runaway write never
//! corrupts earlier data in the buffer.

use crate::huffman::HuffmanCodec;

pub struct BitStream {
    data: Vec<u8>,
    max_size: usize,
    cur_size: usize,
    bit_cursor: usize,
    max_bits: usize,
    overflowed: bool,
    oob: bool,
}

impl BitStream {
    pub fn new(max_size: usize) -> Self {
        Self {
            data: vec![0u8; max_size],
            max_size,
            cur_size: 0,
            bit_cursor: 0,
            max_bits: max_size * 8,
            overflowed: false,
            oob: false,
        }
    }

    pub fn new_oob(max_size: usize) -> Self {
        let mut bs = Self::new(max_size);
        bs.oob = true;
        bs
    }

    /// Loads raw bytes for reading, e.g. bytes that crossed a real wire.
    /// `max_size` must be at least `bytes.len()`.
    pub fn from_bytes(max_size: usize, bytes: &[u8]) -> Self {
        let mut bs = Self::new(max_size.max(bytes.len()));
        bs.data[..bytes.len()].copy_from_slice(bytes);
        bs.cur_size = bytes.len();
        bs
    }

    pub fn clear(&mut self) {
        self.cur_size = 0;
        self.overflowed = false;
        self.bit_cursor = 0;
    }

    /// Switches a buffer from out-of-band (aligned) mode into bitstream
    /// (Huffman) mode. Mirrors `MSG_Bitstream`.
    pub fn set_bitstream_mode(&mut self) {
        self.oob = false;
    }

    pub fn set_oob_mode(&mut self) {
        self.oob = true;
    }

    pub fn begin_read(&mut self) {
        self.bit_cursor = 0;
        self.oob = false;
    }

    pub fn begin_read_oob(&mut self) {
        self.bit_cursor = 0;
        self.oob = true;
    }

    pub fn copy_from(&mut self, other: &BitStream) {
        if self.max_size < other.cur_size {
            panic!("BitStream::copy_from: can't copy into a smaller buffer");
        }
        self.data[..other.cur_size].copy_from_slice(&other.data[..other.cur_size]);
        self.cur_size = other.cur_size;
        self.bit_cursor = other.bit_cursor;
        self.max_bits = other.max_bits;
        self.overflowed = other.overflowed;
        self.oob = other.oob;
    }

    pub fn data(&self) -> &[u8] {
        &self.data[..self.cur_size]
    }

    pub fn cur_size(&self) -> usize {
        self.cur_size
    }

    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    pub fn is_oob(&self) -> bool {
        self.oob
    }

    /// `(bit_cursor >> 3) + 1`, matching `msg->readcount`'s off-by-one
    /// convention: call sites treat `read_count() > cur_size()` as EOF.
    pub fn read_count(&self) -> usize {
        (self.bit_cursor >> 3) + 1
    }

    fn ensure_room(&mut self, end_byte: usize) -> bool {
        if end_byte > self.max_size {
            self.overflowed = true;
            return false;
        }
        true
    }

    pub fn write_bits(&mut self, codec: &mut HuffmanCodec, value: i32, bits: i32) {
        assert!(bits != 0 && bits >= -31 && bits <= 32, "write_bits: bad bits {bits}");

        if self.overflowed {
            return;
        }

        let bits = if bits < 0 { -bits } else { bits };
        let mut value = value as u32;

        if self.oob {
            match bits {
                8 => {
                    if !self.ensure_room(self.cur_size + 1) {
                        return;
                    }
                    self.data[self.cur_size] = value as u8;
                    self.cur_size += 1;
                    self.bit_cursor += 8;
                }
                16 => {
                    if !self.ensure_room(self.cur_size + 2) {
                        return;
                    }
                    self.data[self.cur_size..self.cur_size + 2]
                        .copy_from_slice(&(value as u16).to_le_bytes());
                    self.cur_size += 2;
                    self.bit_cursor += 16;
                }
                32 => {
                    if !self.ensure_room(self.cur_size + 4) {
                        return;
                    }
                    self.data[self.cur_size..self.cur_size + 4]
                        .copy_from_slice(&value.to_le_bytes());
                    self.cur_size += 4;
                    self.bit_cursor += 32;
                }
                _ => panic!("write_bits: can't write {bits} bits in oob mode"),
            }
        } else {
            if bits < 32 {
                value &= 0xffff_ffffu32 >> (32 - bits);
            }
            let nbits = bits & 7;
            if nbits != 0 {
                let end_byte = (self.bit_cursor + nbits as usize) / 8 + 1;
                if !self.ensure_room(end_byte) {
                    return;
                }
                for _ in 0..nbits {
                    codec.put_bit(&mut self.data, self.bit_cursor, (value & 1) as u8);
                    self.bit_cursor += 1;
                    value >>= 1;
                }
            }
            let remaining = bits - nbits;
            if remaining != 0 {
                let mut i = 0;
                while i < remaining {
                    let end_byte = self.bit_cursor / 8 + 2;
                    if !self.ensure_room(end_byte) {
                        return;
                    }
                    let written = codec.put_symbol(&mut self.data, self.bit_cursor, (value & 0xFF) as u8);
                    self.bit_cursor += written;
                    value >>= 8;
                    i += 8;
                }
            }
            self.cur_size = (self.bit_cursor >> 3) + 1;
        }

        if self.bit_cursor > self.max_bits {
            self.overflowed = true;
        }
    }

    pub fn read_bits(&mut self, codec: &mut HuffmanCodec, bits: i32) -> i32 {
        if self.bit_cursor >= self.max_bits {
            return 0;
        }

        let sgn = bits < 0;
        let bits = if sgn { -bits } else { bits };
        let mut value: u32 = 0;

        if self.oob {
            let byte_idx = self.bit_cursor / 8;
            match bits {
                8 => {
                    value = *self.data.get(byte_idx).unwrap_or(&0) as u32;
                    self.bit_cursor += 8;
                }
                16 => {
                    let hi = *self.data.get(byte_idx + 1).unwrap_or(&0);
                    let lo = *self.data.get(byte_idx).unwrap_or(&0);
                    value = u16::from_le_bytes([lo, hi]) as u32;
                    self.bit_cursor += 16;
                }
                32 => {
                    let mut bytes = [0u8; 4];
                    for (i, b) in bytes.iter_mut().enumerate() {
                        *b = *self.data.get(byte_idx + i).unwrap_or(&0);
                    }
                    value = u32::from_le_bytes(bytes);
                    self.bit_cursor += 32;
                }
                _ => panic!("read_bits: can't read {bits} bits in oob mode"),
            }
        } else {
            let nbits = bits & 7;
            let mut bit_index = self.bit_cursor;
            if nbits != 0 {
                for i in 0..nbits {
                    let b = codec.get_bit(&self.data, bit_index);
                    value |= (b as u32) << i;
                    bit_index += 1;
                }
            }
            let remaining = bits - nbits;
            if remaining != 0 {
                let mut i = 0;
                while i < remaining {
                    let (sym, consumed) = codec.get_symbol(&self.data, bit_index);
                    bit_index += consumed;
                    value |= (sym as u32) << (i + nbits);
                    i += 8;
                }
            }
            self.bit_cursor = bit_index;
        }

        if sgn && bits < 32 {
            if value & (1 << (bits - 1)) != 0 {
                value |= !0u32 ^ ((1u32 << bits) - 1);
            }
        }

        value as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (HuffmanCodec, HuffmanCodec) {
        (HuffmanCodec::new(), HuffmanCodec::new())
    }

    #[test]
    fn round_trips_unsigned_widths() {
        let (mut wc, mut rc) = pair();
        let mut bs = BitStream::new(64);
        bs.write_bits(&mut wc, 5, 3);
        bs.write_bits(&mut wc, 200, 8);
        bs.write_bits(&mut wc, 70000, 32);
        bs.begin_read();
        assert_eq!(bs.read_bits(&mut rc, 3), 5);
        assert_eq!(bs.read_bits(&mut rc, 8), 200);
        assert_eq!(bs.read_bits(&mut rc, 32), 70000);
    }

    #[test]
    fn negative_bits_sign_extend_on_read() {
        let (mut wc, mut rc) = pair();
        let mut bs = BitStream::new(64);
        bs.write_bits(&mut wc, -5, -8);
        bs.begin_read();
        assert_eq!(bs.read_bits(&mut rc, -8), -5);
    }

    #[test]
    fn oob_mode_round_trips_aligned_widths() {
        let (mut wc, mut rc) = pair();
        let mut bs = BitStream::new_oob(64);
        bs.write_bits(&mut wc, 0x1234, 16);
        bs.write_bits(&mut wc, -1, 32);
        bs.begin_read_oob();
        assert_eq!(bs.read_bits(&mut rc, 16), 0x1234);
        assert_eq!(bs.read_bits(&mut rc, 32), -1);
    }

    #[test]
    fn overflow_latches_and_drops_further_writes() {
        let (mut wc, _rc) = pair();
        let mut bs = BitStream::new(1);
        bs.write_bits(&mut wc, 1, 32);
        assert!(bs.overflowed());
        let size_before = bs.cur_size();
        bs.write_bits(&mut wc, 2, 32);
        assert_eq!(bs.cur_size(), size_before);
    }

    #[test]
    fn read_past_end_returns_zero_without_advancing() {
        let (_wc, mut rc) = pair();
        let mut bs = BitStream::new(1);
        bs.begin_read();
        bs.bit_cursor = bs.max_bits;
        assert_eq!(bs.read_bits(&mut rc, 8), 0);
        assert_eq!(bs.bit_cursor, bs.max_bits);
    }

    #[test]
    #[should_panic]
    fn write_bits_rejects_zero_width() {
        let (mut wc, _rc) = pair();
        let mut bs = BitStream::new(16);
        bs.write_bits(&mut wc, 1, 0);
    }

    #[test]
    fn arbitrary_widths_round_trip_modulo_two_pow_bits() {
        use rand::Rng;
        let (mut wc, mut rc) = pair();
        let mut bs = BitStream::new(4096);
        let mut rng = rand::thread_rng();
        let mut expected = Vec::new();
        for _ in 0..256 {
            let bits: i32 = rng.gen_range(1..=32);
            let value: i32 = rng.gen();
            bs.write_bits(&mut wc, value, bits);
            if !bs.overflowed() {
                expected.push((value, bits));
            }
        }
        bs.begin_read();
        for (value, bits) in expected {
            let got = bs.read_bits(&mut rc, bits) as u32;
            let want = (value as u32) & (0xffff_ffffu32 >> (32 - bits));
            assert_eq!(got, want);
        }
    }
}
