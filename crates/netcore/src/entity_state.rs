//! Entity state record and its delta codec.
//!
//! `EntityState` carries everything needed to reconstruct one networked
//! entity on the client: its trajectory (position and angle, each
//! described as a start point, a velocity, and a start time so idle
//! entities cost nothing to extrapolate), plus a fixed tail of gameplay
//! scalars. `number` is deliberately excluded from the field table -- it
//! identifies which entity a delta belongs to and is framed separately on
//! the wire, never delta-coded against itself.

use crate::bitstream::BitStream;
use crate::fields::{
    last_changed_index, read_field_value, write_field_value, FieldDesc, FieldKind, FieldValue,
    ProtocolError,
};
use crate::huffman::HuffmanCodec;

pub const MAX_ENTITIES: i32 = 1024;
pub const GENTITYNUM_BITS: i32 = 10;

macro_rules! entity_fields {
    ($($field:ident: $kind:expr),+ $(,)?) => {
        #[derive(Debug, Clone, Copy, PartialEq, Default)]
        pub struct EntityState {
            pub number: i32,
            $(pub $field: FieldSlot),+
        }

        impl EntityState {
            pub fn field_descs() -> &'static [FieldDesc] {
                static DESCS: &[FieldDesc] = &[
                    $(FieldDesc { name: stringify!($field), kind: $kind }),+
                ];
                DESCS
            }

            pub fn get_field(&self, idx: usize) -> FieldValue {
                let mut i = 0;
                $(
                    if idx == i { return self.$field.into(); }
                    i += 1;
                )+
                let _ = i;
                panic!("EntityState::get_field: index {idx} out of range");
            }

            pub fn set_field(&mut self, idx: usize, value: FieldValue) {
                let mut i = 0;
                $(
                    if idx == i { self.$field = FieldSlot::from(value); return; }
                    i += 1;
                )+
                let _ = i;
                panic!("EntityState::set_field: index {idx} out of range");
            }
        }
    };
}

/// A field is either an integer or a float slot; the macro above picks
/// the conversion based on what the caller stores, so a single generic
/// wrapper type keeps `EntityState`'s struct definition readable instead
/// of repeating `i32`/`f32` per field by hand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldSlot {
    I(i32),
    F(f32),
}

impl Default for FieldSlot {
    fn default() -> Self {
        FieldSlot::I(0)
    }
}

impl From<FieldValue> for FieldSlot {
    fn from(v: FieldValue) -> Self {
        match v {
            FieldValue::Int(i) => FieldSlot::I(i),
            FieldValue::Float(f) => FieldSlot::F(f),
        }
    }
}

impl From<FieldSlot> for FieldValue {
    fn from(v: FieldSlot) -> Self {
        match v {
            FieldSlot::I(i) => FieldValue::Int(i),
            FieldSlot::F(f) => FieldValue::Float(f),
        }
    }
}

impl From<i32> for FieldSlot {
    fn from(v: i32) -> Self {
        FieldSlot::I(v)
    }
}
impl From<f32> for FieldSlot {
    fn from(v: f32) -> Self {
        FieldSlot::F(v)
    }
}

entity_fields! {
    pos_tr_type: FieldKind::Int { bits: 8 },
    pos_tr_time: FieldKind::Int { bits: 32 },
    pos_tr_duration: FieldKind::Int { bits: 32 },
    pos_tr_base_0: FieldKind::Float,
    pos_tr_base_1: FieldKind::Float,
    pos_tr_base_2: FieldKind::Float,
    pos_tr_delta_0: FieldKind::Float,
    pos_tr_delta_1: FieldKind::Float,
    pos_tr_delta_2: FieldKind::Float,
    apos_tr_type: FieldKind::Int { bits: 8 },
    apos_tr_time: FieldKind::Int { bits: 32 },
    apos_tr_duration: FieldKind::Int { bits: 32 },
    apos_tr_base_0: FieldKind::Float,
    apos_tr_base_1: FieldKind::Float,
    apos_tr_base_2: FieldKind::Float,
    apos_tr_delta_0: FieldKind::Float,
    apos_tr_delta_1: FieldKind::Float,
    apos_tr_delta_2: FieldKind::Float,
    time: FieldKind::Int { bits: 32 },
    time2: FieldKind::Int { bits: 32 },
    origin_0: FieldKind::Float,
    origin_1: FieldKind::Float,
    origin_2: FieldKind::Float,
    origin2_0: FieldKind::Float,
    origin2_1: FieldKind::Float,
    origin2_2: FieldKind::Float,
    angles_0: FieldKind::Float,
    angles_1: FieldKind::Float,
    angles_2: FieldKind::Float,
    angles2_0: FieldKind::Float,
    angles2_1: FieldKind::Float,
    angles2_2: FieldKind::Float,
    other_entity_num: FieldKind::Int { bits: GENTITYNUM_BITS },
    other_entity_num2: FieldKind::Int { bits: GENTITYNUM_BITS },
    ground_entity_num: FieldKind::Int { bits: GENTITYNUM_BITS },
    constant_light: FieldKind::Int { bits: 32 },
    loop_sound: FieldKind::Int { bits: 8 },
    model_index: FieldKind::Int { bits: 10 },
    model_index2: FieldKind::Int { bits: 10 },
    client_num: FieldKind::Int { bits: 8 },
    frame: FieldKind::Int { bits: 16 },
    solid: FieldKind::Int { bits: 24 },
    event: FieldKind::Int { bits: 10 },
    event_parm: FieldKind::Int { bits: 8 },
    powerups: FieldKind::Int { bits: 16 },
    weapon: FieldKind::Int { bits: 8 },
    legs_anim: FieldKind::Int { bits: 10 },
    torso_anim: FieldKind::Int { bits: 10 },
    generic1: FieldKind::Int { bits: -8 },
    event_sequence: FieldKind::Int { bits: 8 },
    surface_flags: FieldKind::Int { bits: 8 },
}

fn all_fields(e: &EntityState) -> Vec<FieldValue> {
    let n = EntityState::field_descs().len();
    (0..n).map(|i| e.get_field(i)).collect()
}

pub enum EntityDelta {
    Removed,
    Unchanged,
    Updated(EntityState),
}

/// Encodes `to` (or a removal, when `to` is `None`) as a delta against
/// `from`. `force` skips the "identical, emit nothing" shortcut so a
/// baseline can always be transmitted on first sight of an entity.
pub fn encode_entity_delta(
    bs: &mut BitStream,
    codec: &mut HuffmanCodec,
    from: &EntityState,
    to: Option<(&EntityState, i32)>,
    force: bool,
) {
    match to {
        None => {
            bs.write_bits(codec, from.number, GENTITYNUM_BITS);
            bs.write_bits(codec, 1, 1);
        }
        Some((to_state, to_number)) => {
            assert_ne!(to_number, 0, "entity number 0 cannot be delta target");
            let from_vals = all_fields(from);
            let to_vals = all_fields(to_state);
            let lc = last_changed_index(&from_vals, &to_vals);

            if lc == 0 && !force {
                return;
            }

            bs.write_bits(codec, to_number, GENTITYNUM_BITS);
            bs.write_bits(codec, 0, 1);

            if lc == 0 {
                bs.write_bits(codec, 0, 1);
                return;
            }

            bs.write_bits(codec, 1, 1);
            bs.write_bits(codec, lc, 8);

            let descs = EntityState::field_descs();
            for i in 0..lc as usize {
                if from_vals[i] == to_vals[i] {
                    bs.write_bits(codec, 0, 1);
                } else {
                    bs.write_bits(codec, 1, 1);
                    write_field_value(bs, codec, descs[i].kind, to_vals[i]);
                }
            }
        }
    }
}

pub fn decode_entity_delta(
    bs: &mut BitStream,
    codec: &mut HuffmanCodec,
    from: &EntityState,
) -> Result<(i32, EntityDelta), ProtocolError> {
    let number = bs.read_bits(codec, GENTITYNUM_BITS);
    if !(0..MAX_ENTITIES).contains(&number) {
        return Err(ProtocolError::BadEntityNumber(number));
    }
    let removed = bs.read_bits(codec, 1);
    if removed != 0 {
        return Ok((number, EntityDelta::Removed));
    }
    let has_delta = bs.read_bits(codec, 1);
    if has_delta == 0 {
        return Ok((number, EntityDelta::Unchanged));
    }
    let lc = bs.read_bits(codec, 8);
    let descs = EntityState::field_descs();
    if lc < 0 || lc as usize > descs.len() {
        return Err(ProtocolError::BadLastChanged(lc));
    }
    let mut result = *from;
    result.number = number;
    for i in 0..lc as usize {
        let changed = bs.read_bits(codec, 1);
        if changed != 0 {
            let v = read_field_value(bs, codec, descs[i].kind);
            result.set_field(i, v);
        }
    }
    Ok((number, EntityDelta::Updated(result)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(number: i32, frame: i32, ox: f32) -> EntityState {
        let mut e = EntityState { number, ..Default::default() };
        e.set_field(40, FieldValue::Int(frame)); // `frame`
        e.set_field(20, FieldValue::Float(ox)); // `origin_0`
        e
    }

    #[test]
    fn forced_delta_round_trips_to_exact_value() {
        let mut wc = HuffmanCodec::new();
        let mut rc = HuffmanCodec::new();
        let mut bs = BitStream::new(4096);
        let from = EntityState::default();
        let to = sample(42, 7, 128.5);
        encode_entity_delta(&mut bs, &mut wc, &from, Some((&to, 42)), true);
        bs.begin_read();
        let (number, delta) = decode_entity_delta(&mut bs, &mut rc, &from).unwrap();
        assert_eq!(number, 42);
        match delta {
            EntityDelta::Updated(got) => assert_eq!(got, to),
            _ => panic!("expected Updated"),
        }
    }

    #[test]
    fn identical_states_emit_zero_bits_unless_forced() {
        let mut wc = HuffmanCodec::new();
        let mut bs = BitStream::new(64);
        let a = sample(5, 3, 10.0);
        encode_entity_delta(&mut bs, &mut wc, &a, Some((&a, 5)), false);
        assert_eq!(bs.cur_size(), 0);
    }

    #[test]
    fn removal_round_trips() {
        let mut wc = HuffmanCodec::new();
        let mut rc = HuffmanCodec::new();
        let mut bs = BitStream::new(64);
        let from = sample(9, 1, 0.0);
        encode_entity_delta(&mut bs, &mut wc, &from, None, false);
        bs.begin_read();
        let (number, delta) = decode_entity_delta(&mut bs, &mut rc, &from).unwrap();
        assert_eq!(number, 9);
        assert!(matches!(delta, EntityDelta::Removed));
    }

    #[test]
    fn bad_last_changed_index_is_a_protocol_error() {
        let mut wc = HuffmanCodec::new();
        let mut rc = HuffmanCodec::new();
        let mut bs = BitStream::new(64);
        bs.write_bits(&mut wc, 3, GENTITYNUM_BITS);
        bs.write_bits(&mut wc, 0, 1);
        bs.write_bits(&mut wc, 1, 1);
        bs.write_bits(&mut wc, 255, 8); // lc far beyond field count
        bs.begin_read();
        let from = EntityState::default();
        let err = decode_entity_delta(&mut bs, &mut rc, &from).unwrap_err();
        assert!(matches!(err, ProtocolError::BadLastChanged(255)));
    }
}
