//! Wire opcodes and the gamestate packet layout. Out-of-band packets are
//! framed with a leading `0xFFFFFFFF` sequence sentinel; everything else
//! is sequenced and carried in bitstream (Huffman) mode.

use netcore::bitstream::BitStream;
use netcore::entity_state::{encode_entity_delta, decode_entity_delta, EntityDelta, EntityState};
use netcore::fields::ProtocolError;
use netcore::huffman::HuffmanCodec;
use netcore::lzss::{compress_stream, expand, LzContext};
use netcore::message::{read_byte, read_long, read_short, read_string, write_byte, write_long, write_short, write_string};

pub const OOB_SEQUENCE: i32 = -1; // 0xFFFFFFFF as i32

#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(u8)]
pub enum SvcOp {
    GameState = 1,
    ConfigString = 2,
    Baseline = 3,
    ServerCommand = 4,
    Download = 5,
    Snapshot = 6,
    Eof = 7,
    ZCmd = 8,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(u8)]
pub enum ClcOp {
    ClientCommand = 1,
    Move = 2,
    MoveNoDelta = 3,
}

/// Assembles one gamestate packet: the client's last acknowledged
/// reliable command, every non-empty configstring, every baseline
/// (delta-encoded from a null entity, forced so it's always present),
/// then the trailer identifying the receiving client and the collision
/// checksum it should expect to match.
///
/// Entity number 0 (the world) is never baselined -- `encode_entity_delta`
/// refuses a zero target number -- so callers filter it out of `baselines`
/// before calling this.
#[allow(clippy::too_many_arguments)]
pub fn write_gamestate(
    bs: &mut BitStream,
    codec: &mut HuffmanCodec,
    last_client_command: i32,
    reliable_sequence: i32,
    configstrings: impl Iterator<Item = (u16, String)>,
    baselines: impl Iterator<Item = (i32, EntityState)>,
    client_num: i32,
    checksum_feed: i32,
) {
    write_long(bs, codec, last_client_command);
    write_byte(bs, codec, SvcOp::GameState as u8);
    write_long(bs, codec, reliable_sequence);

    for (index, value) in configstrings {
        write_byte(bs, codec, SvcOp::ConfigString as u8);
        write_short(bs, codec, index);
        write_string(bs, codec, &value);
    }

    let null_entity = EntityState::default();
    for (number, state) in baselines {
        write_byte(bs, codec, SvcOp::Baseline as u8);
        encode_entity_delta(bs, codec, &null_entity, Some((&state, number)), true);
    }

    write_byte(bs, codec, SvcOp::Eof as u8);
    write_long(bs, codec, client_num);
    write_long(bs, codec, checksum_feed);
    write_byte(bs, codec, SvcOp::Eof as u8);
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedGameState {
    pub last_client_command: i32,
    pub reliable_sequence: i32,
    pub configstrings: Vec<(u16, String)>,
    pub baselines: Vec<(i32, EntityState)>,
    pub client_num: i32,
    pub checksum_feed: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameStateParseError(pub String);

/// Parses a packet built by [`write_gamestate`]. Exercised by tests on
/// this side of the wire; a real client-side decoder lives outside this
/// workspace.
pub fn read_gamestate(bs: &mut BitStream, codec: &mut HuffmanCodec) -> Result<ParsedGameState, GameStateParseError> {
    let last_client_command = read_long(bs, codec);
    let op = read_byte(bs, codec);
    if op != SvcOp::GameState as u8 {
        return Err(GameStateParseError(format!("expected svc_gamestate, got {op}")));
    }
    let reliable_sequence = read_long(bs, codec);

    let mut configstrings = Vec::new();
    let mut baselines = Vec::new();
    let null_entity = EntityState::default();
    loop {
        let op = read_byte(bs, codec);
        if op == SvcOp::ConfigString as u8 {
            let index = read_short(bs, codec);
            let value = read_string(bs, codec);
            configstrings.push((index, value));
        } else if op == SvcOp::Baseline as u8 {
            let (number, delta) = decode_entity_delta(bs, codec, &null_entity)
                .map_err(|e: ProtocolError| GameStateParseError(e.to_string()))?;
            match delta {
                EntityDelta::Updated(state) => baselines.push((number, state)),
                _ => return Err(GameStateParseError("baseline entry was not an update".to_string())),
            }
        } else if op == SvcOp::Eof as u8 {
            break;
        } else {
            return Err(GameStateParseError(format!("unexpected opcode {op} in gamestate body")));
        }
    }

    let client_num = read_long(bs, codec);
    let checksum_feed = read_long(bs, codec);
    let trailer = read_byte(bs, codec);
    if trailer != SvcOp::Eof as u8 {
        return Err(GameStateParseError(format!("expected trailing svc_EOF, got {trailer}")));
    }

    Ok(ParsedGameState { last_client_command, reliable_sequence, configstrings, baselines, client_num, checksum_feed })
}

/// Number of bytes needed to hold `value` unsigned, 1..=4.
fn byte_width(value: i32) -> u32 {
    match value as u32 {
        0..=0xff => 1,
        0x100..=0xffff => 2,
        0x1_0000..=0xff_ffff => 3,
        _ => 4,
    }
}

/// Frames one `svc_zcmd` command: opcode, a small in-order delta
/// sequence (bounded to `0..8` since zcmds are only ever sent in
/// strict reliable-sequence order -- see `netcore::lzss`), a char-width
/// selector, the reliable sequence number packed into as few bytes as
/// it needs, a reserved bit, then the LZSS token stream for `command`.
pub fn write_zcmd(
    bs: &mut BitStream,
    codec: &mut HuffmanCodec,
    lz: &mut LzContext,
    delta_seq: i32,
    reliable_sequence: i32,
    eight_bit_chars: bool,
    command: &str,
) {
    write_byte(bs, codec, SvcOp::ZCmd as u8);
    bs.write_bits(codec, delta_seq & 0x7, 3);
    bs.write_bits(codec, eight_bit_chars as i32, 1);
    let width = byte_width(reliable_sequence);
    bs.write_bits(codec, (width - 1) as i32, 2);
    bs.write_bits(codec, reliable_sequence, (width * 8) as i32);
    bs.write_bits(codec, 0, 1); // reserved

    let bytes: Vec<u8> = if eight_bit_chars {
        command.as_bytes().to_vec()
    } else {
        command.bytes().map(|b| b & 0x7f).collect()
    };
    compress_stream(lz, bs, codec, &bytes);
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedZCmd {
    pub delta_seq: i32,
    pub reliable_sequence: i32,
    pub eight_bit_chars: bool,
    pub command: String,
}

/// Parses one `svc_zcmd` frame written by [`write_zcmd`]. Assumes the
/// leading `SvcOp::ZCmd` opcode byte has already been consumed by the
/// caller's dispatch loop.
pub fn read_zcmd(bs: &mut BitStream, codec: &mut HuffmanCodec, lz: &mut LzContext) -> ParsedZCmd {
    let delta_seq = bs.read_bits(codec, 3);
    let eight_bit_chars = bs.read_bits(codec, 1) != 0;
    let width = (bs.read_bits(codec, 2) + 1) as i32;
    let reliable_sequence = bs.read_bits(codec, width * 8);
    let _reserved = bs.read_bits(codec, 1);
    let bytes = expand(lz, bs, codec, netcore::message::MAX_STRING_CHARS);
    let command = String::from_utf8_lossy(&bytes).into_owned();
    ParsedZCmd { delta_seq, reliable_sequence, eight_bit_chars, command }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netcore::entity_state::FieldValue;

    #[test]
    fn zcmd_round_trips_one_command() {
        let mut wc = HuffmanCodec::new();
        let mut rc = HuffmanCodec::new();
        let mut enc_lz = LzContext::new();
        let mut dec_lz = LzContext::new();
        let mut bs = BitStream::new(4096);

        write_zcmd(&mut bs, &mut wc, &mut enc_lz, 1, 300, true, "print \"hello\"");

        bs.begin_read();
        let op = read_byte(&mut bs, &mut rc);
        assert_eq!(op, SvcOp::ZCmd as u8);
        let parsed = read_zcmd(&mut bs, &mut rc, &mut dec_lz);
        assert_eq!(parsed.delta_seq, 1);
        assert_eq!(parsed.reliable_sequence, 300);
        assert!(parsed.eight_bit_chars);
        assert_eq!(parsed.command, "print \"hello\"");
    }

    #[test]
    fn zcmd_seven_bit_flag_round_trips_with_a_small_sequence() {
        let mut wc = HuffmanCodec::new();
        let mut rc = HuffmanCodec::new();
        let mut enc_lz = LzContext::new();
        let mut dec_lz = LzContext::new();
        let mut bs = BitStream::new(4096);

        write_zcmd(&mut bs, &mut wc, &mut enc_lz, 0, 1, false, "say hi");

        bs.begin_read();
        read_byte(&mut bs, &mut rc);
        let parsed = read_zcmd(&mut bs, &mut rc, &mut dec_lz);
        assert!(!parsed.eight_bit_chars);
        assert_eq!(parsed.reliable_sequence, 1);
        assert_eq!(parsed.command, "say hi");
    }

    #[test]
    fn gamestate_round_trips_configstrings_and_baselines() {
        let mut wc = HuffmanCodec::new();
        let mut rc = HuffmanCodec::new();
        let mut bs = BitStream::new(16384);

        let mut e1 = EntityState { number: 1, ..Default::default() };
        e1.set_field(40, FieldValue::Int(3)); // frame
        let baselines = vec![(1i32, e1)];
        let configstrings = vec![(0u16, "mapname\\q3dm1".to_string()), (5u16, "0".to_string())];

        write_gamestate(
            &mut bs,
            &mut wc,
            42,
            7,
            configstrings.clone().into_iter(),
            baselines.clone().into_iter(),
            3,
            0xBEEF,
        );

        bs.begin_read();
        let parsed = read_gamestate(&mut bs, &mut rc).unwrap();
        assert_eq!(parsed.last_client_command, 42);
        assert_eq!(parsed.reliable_sequence, 7);
        assert_eq!(parsed.configstrings, configstrings);
        assert_eq!(parsed.baselines.len(), 1);
        assert_eq!(parsed.baselines[0].0, 1);
        assert_eq!(parsed.baselines[0].1, e1);
        assert_eq!(parsed.client_num, 3);
        assert_eq!(parsed.checksum_feed, 0xBEEFu32 as i32);
    }

    #[test]
    fn gamestate_round_trips_with_no_baselines_or_configstrings() {
        let mut wc = HuffmanCodec::new();
        let mut rc = HuffmanCodec::new();
        let mut bs = BitStream::new(256);
        write_gamestate(&mut bs, &mut wc, -1, 0, std::iter::empty(), std::iter::empty(), 0, 0);
        bs.begin_read();
        let parsed = read_gamestate(&mut bs, &mut rc).unwrap();
        assert!(parsed.configstrings.is_empty());
        assert!(parsed.baselines.is_empty());
        assert_eq!(parsed.client_num, 0);
    }
}
