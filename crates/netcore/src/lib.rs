#![allow(dead_code)]
#![allow(clippy::too_many_arguments)]

//! Wire-protocol core: bit-level message codec, delta encoding of entity
//! and player state, the reliable command compressor, and the per-client
//! reliable command ring. No knowledge of clients, maps, or ticks lives
//! here -- that belongs to `gameserver`.

pub mod bitstream;
pub mod entity_state;
pub mod fields;
pub mod huffman;
pub mod lzss;
pub mod message;
pub mod packet_queue;
pub mod player_state;
pub mod reliable;
pub mod user_cmd;

pub use bitstream::BitStream;
pub use fields::ProtocolError;
pub use huffman::HuffmanCodec;
