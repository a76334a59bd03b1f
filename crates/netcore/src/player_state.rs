//! Player state record and its delta codec. Structurally similar to the
//! entity state codec in `entity_state.rs` but with no removal bit and
//! no "identical, emit nothing" shortcut -- a player state delta always
//! carries its last-changed prefix, even if it is zero -- plus four
//! bitmap-addressed scalar arrays appended after the fixed fields.

use crate::bitstream::BitStream;
use crate::fields::{
    last_changed_index, read_field_value, write_field_value, FieldDesc, FieldKind, FieldValue,
    ProtocolError,
};
use crate::huffman::HuffmanCodec;

pub const MAX_STATS: usize = 16;
pub const MAX_PERSISTANT: usize = 16;
pub const MAX_WEAPONS: usize = 16;
pub const MAX_POWERUPS: usize = 16;

macro_rules! player_fields {
    ($($field:ident: $kind:expr),+ $(,)?) => {
        #[derive(Debug, Clone, Copy, PartialEq)]
        pub struct PlayerState {
            $(pub $field: super::entity_state::FieldSlot),+,
            pub stats: [i32; MAX_STATS],
            pub persistant: [i32; MAX_PERSISTANT],
            pub ammo: [i32; MAX_WEAPONS],
            pub powerups: [i32; MAX_POWERUPS],
        }

        impl Default for PlayerState {
            fn default() -> Self {
                Self {
                    $($field: Default::default()),+,
                    stats: [0; MAX_STATS],
                    persistant: [0; MAX_PERSISTANT],
                    ammo: [0; MAX_WEAPONS],
                    powerups: [0; MAX_POWERUPS],
                }
            }
        }

        impl PlayerState {
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
                panic!("PlayerState::get_field: index {idx} out of range");
            }

            pub fn set_field(&mut self, idx: usize, value: FieldValue) {
                let mut i = 0;
                $(
                    if idx == i { self.$field = super::entity_state::FieldSlot::from(value); return; }
                    i += 1;
                )+
                let _ = i;
                panic!("PlayerState::set_field: index {idx} out of range");
            }
        }
    };
}

player_fields! {
    command_time: FieldKind::Int { bits: 32 },
    pm_type: FieldKind::Int { bits: 8 },
    bob_cycle: FieldKind::Int { bits: 8 },
    pm_flags: FieldKind::Int { bits: 16 },
    pm_time: FieldKind::Int { bits: -16 },
    origin_0: FieldKind::Float,
    origin_1: FieldKind::Float,
    origin_2: FieldKind::Float,
    velocity_0: FieldKind::Float,
    velocity_1: FieldKind::Float,
    velocity_2: FieldKind::Float,
    weapon_time: FieldKind::Int { bits: -16 },
    gravity: FieldKind::Int { bits: 16 },
    speed: FieldKind::Int { bits: 16 },
    delta_angles_0: FieldKind::Int { bits: 16 },
    delta_angles_1: FieldKind::Int { bits: 16 },
    delta_angles_2: FieldKind::Int { bits: 16 },
    ground_entity_num: FieldKind::Int { bits: 10 },
    legs_timer: FieldKind::Int { bits: 16 },
    legs_anim: FieldKind::Int { bits: 10 },
    torso_timer: FieldKind::Int { bits: 16 },
    torso_anim: FieldKind::Int { bits: 10 },
    movement_dir: FieldKind::Int { bits: 4 },
    grapple_point_0: FieldKind::Float,
    grapple_point_1: FieldKind::Float,
    grapple_point_2: FieldKind::Float,
    event_sequence: FieldKind::Int { bits: 8 },
    event1: FieldKind::Int { bits: 10 },
    event_parm1: FieldKind::Int { bits: 8 },
    event2: FieldKind::Int { bits: 10 },
    event_parm2: FieldKind::Int { bits: 8 },
    external_event: FieldKind::Int { bits: 10 },
    external_event_parm: FieldKind::Int { bits: 8 },
    external_event_time: FieldKind::Int { bits: 32 },
    client_num: FieldKind::Int { bits: 8 },
    weapon: FieldKind::Int { bits: 8 },
    weapon_state: FieldKind::Int { bits: 4 },
    view_angles_0: FieldKind::Float,
    view_angles_1: FieldKind::Float,
    view_angles_2: FieldKind::Float,
    view_height: FieldKind::Int { bits: -8 },
    damage_event: FieldKind::Int { bits: 8 },
    damage_yaw: FieldKind::Int { bits: 8 },
    damage_pitch: FieldKind::Int { bits: 8 },
    damage_count: FieldKind::Int { bits: 8 },
    generic1: FieldKind::Int { bits: -8 },
    loop_sound: FieldKind::Int { bits: 16 },
    jumppad_ent: FieldKind::Int { bits: 10 },
}

fn all_fields(p: &PlayerState) -> Vec<FieldValue> {
    let n = PlayerState::field_descs().len();
    (0..n).map(|i| p.get_field(i)).collect()
}

fn write_array_delta(bs: &mut BitStream, codec: &mut HuffmanCodec, from: &[i32], to: &[i32], value_bits: i32) {
    let changed = from != to;
    bs.write_bits(codec, changed as i32, 1);
    if !changed {
        return;
    }
    let n = from.len();
    let mut bitmap: u32 = 0;
    for i in 0..n {
        if from[i] != to[i] {
            bitmap |= 1 << i;
        }
    }
    bs.write_bits(codec, bitmap as i32, n as i32);
    for i in 0..n {
        if (bitmap >> i) & 1 != 0 {
            bs.write_bits(codec, to[i], value_bits);
        }
    }
}

fn read_array_delta(bs: &mut BitStream, codec: &mut HuffmanCodec, from: &[i32], value_bits: i32, n: usize) -> Vec<i32> {
    let changed = bs.read_bits(codec, 1);
    if changed == 0 {
        return from.to_vec();
    }
    let bitmap = bs.read_bits(codec, n as i32) as u32;
    let mut out = from.to_vec();
    for i in 0..n {
        if (bitmap >> i) & 1 != 0 {
            out[i] = bs.read_bits(codec, value_bits);
        }
    }
    out
}

pub fn encode_player_delta(bs: &mut BitStream, codec: &mut HuffmanCodec, from: &PlayerState, to: &PlayerState) {
    let from_vals = all_fields(from);
    let to_vals = all_fields(to);
    let lc = last_changed_index(&from_vals, &to_vals);
    bs.write_bits(codec, lc, 8);

    let descs = PlayerState::field_descs();
    for i in 0..lc as usize {
        if from_vals[i] == to_vals[i] {
            bs.write_bits(codec, 0, 1);
        } else {
            bs.write_bits(codec, 1, 1);
            write_field_value(bs, codec, descs[i].kind, to_vals[i]);
        }
    }

    let any_changed = from.stats != to.stats
        || from.persistant != to.persistant
        || from.ammo != to.ammo
        || from.powerups != to.powerups;
    bs.write_bits(codec, any_changed as i32, 1);
    if any_changed {
        write_array_delta(bs, codec, &from.stats, &to.stats, -16);
        write_array_delta(bs, codec, &from.persistant, &to.persistant, -16);
        write_array_delta(bs, codec, &from.ammo, &to.ammo, -16);
        write_array_delta(bs, codec, &from.powerups, &to.powerups, 32);
    }
}

pub fn decode_player_delta(
    bs: &mut BitStream,
    codec: &mut HuffmanCodec,
    from: &PlayerState,
) -> Result<PlayerState, ProtocolError> {
    let descs = PlayerState::field_descs();
    let lc = bs.read_bits(codec, 8);
    if lc < 0 || lc as usize > descs.len() {
        return Err(ProtocolError::BadLastChanged(lc));
    }
    let mut result = *from;
    for i in 0..lc as usize {
        let changed = bs.read_bits(codec, 1);
        if changed != 0 {
            let v = read_field_value(bs, codec, descs[i].kind);
            result.set_field(i, v);
        }
    }

    let any_changed = bs.read_bits(codec, 1);
    if any_changed != 0 {
        result.stats = read_array_delta(bs, codec, &from.stats, -16, MAX_STATS).try_into().unwrap();
        result.persistant = read_array_delta(bs, codec, &from.persistant, -16, MAX_PERSISTANT)
            .try_into()
            .unwrap();
        result.ammo = read_array_delta(bs, codec, &from.ammo, -16, MAX_WEAPONS).try_into().unwrap();
        result.powerups = read_array_delta(bs, codec, &from.powerups, 32, MAX_POWERUPS)
            .try_into()
            .unwrap();
    }
    Ok(result)
}
