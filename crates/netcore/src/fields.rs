//! Shared infrastructure for the delta codec: a tagged field-kind
//! enum plus per-value encode/decode helpers used by both the entity and
//! player state delta paths. Fixed-schema records expose their fields
//! through a static `&[FieldDesc]` table and a `get_field`/`set_field`
//! pair instead of pointer/offset arithmetic.

use crate::bitstream::BitStream;
use crate::huffman::HuffmanCodec;
use std::fmt;

pub const FLOAT_INT_BITS: i32 = 13;
pub const FLOAT_INT_BIAS: i32 = 1 << (FLOAT_INT_BITS - 1);

#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    /// `bits` carries the sign convention used by `BitStream::write_bits`:
    /// negative means "signed two's complement value of this width".
    Int { bits: i32 },
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Int(i32),
    Float(f32),
}

#[derive(Debug, Clone, Copy)]
pub struct FieldDesc {
    pub name: &'static str,
    pub kind: FieldKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolError {
    BadLastChanged(i32),
    BadEntityNumber(i32),
    BadFieldCount { expected: usize, got: usize },
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::BadLastChanged(lc) => write!(f, "bad last-changed index {lc}"),
            ProtocolError::BadEntityNumber(n) => write!(f, "bad entity number {n}"),
            ProtocolError::BadFieldCount { expected, got } => {
                write!(f, "field count mismatch: expected {expected}, got {got}")
            }
        }
    }
}

impl std::error::Error for ProtocolError {}

pub fn write_field_value(bs: &mut BitStream, codec: &mut HuffmanCodec, kind: FieldKind, value: FieldValue) {
    match kind {
        FieldKind::Float => {
            let v = match value {
                FieldValue::Float(f) => f,
                FieldValue::Int(i) => i as f32,
            };
            if v == 0.0 {
                bs.write_bits(codec, 0, 1);
                return;
            }
            bs.write_bits(codec, 1, 1);
            if v.fract() == 0.0 {
                let iv = v as i32;
                let biased = iv + FLOAT_INT_BIAS;
                if (0..(1 << FLOAT_INT_BITS)).contains(&biased) {
                    bs.write_bits(codec, 0, 1);
                    bs.write_bits(codec, biased, FLOAT_INT_BITS);
                    return;
                }
            }
            bs.write_bits(codec, 1, 1);
            bs.write_bits(codec, v.to_bits() as i32, 32);
        }
        FieldKind::Int { bits } => {
            let v = match value {
                FieldValue::Int(i) => i,
                FieldValue::Float(f) => f as i32,
            };
            if v == 0 {
                bs.write_bits(codec, 0, 1);
            } else {
                bs.write_bits(codec, 1, 1);
                bs.write_bits(codec, v, bits);
            }
        }
    }
}

pub fn read_field_value(bs: &mut BitStream, codec: &mut HuffmanCodec, kind: FieldKind) -> FieldValue {
    match kind {
        FieldKind::Float => {
            let nonzero = bs.read_bits(codec, 1);
            if nonzero == 0 {
                return FieldValue::Float(0.0);
            }
            let small = bs.read_bits(codec, 1);
            if small == 0 {
                let biased = bs.read_bits(codec, FLOAT_INT_BITS);
                FieldValue::Float((biased - FLOAT_INT_BIAS) as f32)
            } else {
                let bits = bs.read_bits(codec, 32) as u32;
                FieldValue::Float(f32::from_bits(bits))
            }
        }
        FieldKind::Int { bits } => {
            let nonzero = bs.read_bits(codec, 1);
            if nonzero == 0 {
                return FieldValue::Int(0);
            }
            FieldValue::Int(bs.read_bits(codec, bits))
        }
    }
}

/// Runs the shared "scan fields, build last-changed prefix, emit per-field
/// changed bit + value" loop used by both the entity and player state
/// delta encoders.
pub fn last_changed_index(from: &[FieldValue], to: &[FieldValue]) -> i32 {
    let mut lc = 0i32;
    for i in 0..from.len() {
        if from[i] != to[i] {
            lc = (i + 1) as i32;
        }
    }
    lc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_zero_round_trips() {
        let mut wc = HuffmanCodec::new();
        let mut rc = HuffmanCodec::new();
        let mut bs = BitStream::new(64);
        write_field_value(&mut bs, &mut wc, FieldKind::Float, FieldValue::Float(0.0));
        bs.begin_read();
        assert_eq!(read_field_value(&mut bs, &mut rc, FieldKind::Float), FieldValue::Float(0.0));
    }

    #[test]
    fn float_small_integer_path_round_trips() {
        let mut wc = HuffmanCodec::new();
        let mut rc = HuffmanCodec::new();
        let mut bs = BitStream::new(64);
        write_field_value(&mut bs, &mut wc, FieldKind::Float, FieldValue::Float(3.0));
        bs.begin_read();
        assert_eq!(read_field_value(&mut bs, &mut rc, FieldKind::Float), FieldValue::Float(3.0));
    }

    #[test]
    fn float_raw_path_round_trips_fractional_values() {
        let mut wc = HuffmanCodec::new();
        let mut rc = HuffmanCodec::new();
        let mut bs = BitStream::new(64);
        write_field_value(&mut bs, &mut wc, FieldKind::Float, FieldValue::Float(3.14159));
        bs.begin_read();
        assert_eq!(
            read_field_value(&mut bs, &mut rc, FieldKind::Float),
            FieldValue::Float(3.14159)
        );
    }

    #[test]
    fn signed_int_round_trips() {
        let mut wc = HuffmanCodec::new();
        let mut rc = HuffmanCodec::new();
        let mut bs = BitStream::new(64);
        write_field_value(&mut bs, &mut wc, FieldKind::Int { bits: -16 }, FieldValue::Int(-1234));
        bs.begin_read();
        assert_eq!(
            read_field_value(&mut bs, &mut rc, FieldKind::Int { bits: -16 }),
            FieldValue::Int(-1234)
        );
    }
}
