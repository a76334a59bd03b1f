//! The server session: configstrings, baselines, the per-client
//! snapshot history, and the map spawn/restart/tick sequencing that ties
//! the wire codec in `netcore` to the external game VM and collision
//! boundaries.

use std::collections::{BTreeMap, VecDeque};

use netcore::entity_state::{decode_entity_delta, encode_entity_delta, EntityDelta, EntityState};
use netcore::fields::ProtocolError;
use netcore::huffman::HuffmanCodec;
use netcore::message;
use netcore::player_state::{decode_player_delta, encode_player_delta, PlayerState};
use netcore::reliable::MAX_RELIABLE_COMMANDS;
use netcore::user_cmd::{decode_user_cmd_delta, UserCommand};
use netcore::BitStream;

use crate::client::{resolve_client_ref, Client, ClientState, NO_DELTA_MESSAGE};
use crate::diag::{Diagnostics, DropError, ErrorKind};
use crate::gamevm::GameVm;
use crate::maploader::MapLoader;
use crate::packet::{self, SvcOp};

pub const MAX_CONFIGSTRINGS: usize = 1024;
pub const MAX_MSGLEN: usize = 16384;
pub const PACKET_BACKUP: i32 = 64;

/// Reliable commands shorter than this are sent as plain
/// `svc_serverCommand` text; longer ones go through the `svc_zcmd` LZSS
/// compressor, since compression overhead isn't worth paying for a
/// one-line `cs`/`print`.
pub const ZCMD_THRESHOLD: usize = 32;

pub const CS_SERVERINFO: usize = 0;
pub const CS_SYSTEMINFO: usize = 1;
pub const CS_WARMUP: usize = 5;
pub const CS_MODELS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Dead,
    Loading,
    Game,
}

pub struct SessionConfig {
    pub maxclients: usize,
    pub sv_fps: i32,
    pub sv_zombietime_ms: i64,
    pub sv_timeout_ms: i64,
    pub g_do_warmup: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { maxclients: 32, sv_fps: 20, sv_zombietime_ms: 2000, sv_timeout_ms: 40_000, g_do_warmup: false }
    }
}

struct FrameRecord {
    frame_num: i32,
    entities: BTreeMap<i32, EntityState>,
}

pub struct ServerSession<G: GameVm, M: MapLoader> {
    pub time: i64,
    pub server_id: i32,
    pub restart_time: i64,
    pub restarted_server_id: i32,
    pub restarting: bool,
    pub mapname: String,
    pub configstrings: Vec<String>,
    pub baselines: Vec<EntityState>,
    pub baseline_used: Vec<bool>,
    pub checksum_feed: u32,
    pub state: ServerState,
    pub clients: Vec<Client>,
    pub config: SessionConfig,
    pub diag: Diagnostics,
    pub game: G,
    pub maploader: M,
    /// Set by [`Self::set_maxclients`]; a latched change only takes effect
    /// on the next map spawn/restart, mirroring `sv_maxclients`'s
    /// `CVAR_LATCH` behavior.
    pending_maxclients: Option<usize>,
    frame_num: i32,
    frame_history: VecDeque<FrameRecord>,
}

impl<G: GameVm, M: MapLoader> ServerSession<G, M> {
    pub fn new(config: SessionConfig, game: G, maploader: M) -> Self {
        let maxclients = config.maxclients;
        Self {
            time: 0,
            server_id: 0,
            restart_time: 0,
            restarted_server_id: 0,
            restarting: false,
            mapname: String::new(),
            configstrings: vec![String::new(); MAX_CONFIGSTRINGS],
            baselines: vec![EntityState::default(); netcore::entity_state::MAX_ENTITIES as usize],
            baseline_used: vec![false; netcore::entity_state::MAX_ENTITIES as usize],
            checksum_feed: 0,
            state: ServerState::Dead,
            clients: (0..maxclients).map(|_| Client::new(MAX_CONFIGSTRINGS)).collect(),
            config,
            diag: Diagnostics::default(),
            game,
            maploader,
            pending_maxclients: None,
            frame_num: 0,
            frame_history: VecDeque::new(),
        }
    }

    /// Latches a new `sv_maxclients` value: takes effect on the next map
    /// spawn or restart rather than immediately, matching the source
    /// cvar's `CVAR_LATCH` flag.
    pub fn set_maxclients(&mut self, n: usize) {
        if n != self.clients.len() {
            self.pending_maxclients = Some(n);
        }
    }

    /// Whether a latched cvar (currently only `sv_maxclients`) has a
    /// pending change that forces a full respawn instead of a light
    /// `map_restart`.
    pub fn latched_dirty(&self) -> bool {
        self.pending_maxclients.is_some()
    }

    /// Resizes `clients[]` to `n` slots, preserving every slot currently
    /// `>= CONNECTED`. Slots dropped by a shrink are disconnected first.
    fn resize_clients(&mut self, n: usize) {
        let old_len = self.clients.len();
        if n < old_len {
            for i in n..old_len {
                if self.clients[i].is_connected_or_better() {
                    self.drop_client(i, "server is shrinking the client pool");
                }
            }
            self.clients.truncate(n);
        } else {
            self.clients.extend((old_len..n).map(|_| Client::new(MAX_CONFIGSTRINGS)));
        }
        self.config.maxclients = n;
    }

    // ---- map spawn / restart -------------------------------------------------

    /// Full map spawn, steps 3 and 6-13 of the spawn sequence: hunk-clear,
    /// VM process stop, and snapshot-storage allocation (steps 1, 2, 5)
    /// have no counterpart in this workspace, since there's no hunk
    /// allocator or external VM process to tear down.
    pub fn spawn_server(&mut self, mapname: &str) -> Result<(), DropError> {
        let checksum = self
            .maploader
            .load_map(mapname, false)
            .map_err(|e| self.diag.error(ErrorKind::Drop, e.0))?;

        if let Some(n) = self.pending_maxclients.take() {
            self.resize_clients(n);
        }

        self.server_id = self.server_id.wrapping_add(1) | 1;
        self.checksum_feed = rand::random();
        self.configstrings.iter_mut().for_each(|c| c.clear());
        self.baseline_used.iter_mut().for_each(|u| *u = false);
        self.frame_history.clear();
        self.frame_num = 0;

        self.state = ServerState::Loading;
        self.mapname = mapname.to_string();
        self.game.init(self.time as i32, self.server_id, false);
        for _ in 0..3 {
            self.time += 100;
            self.game.run_frame(self.time as i32);
        }

        self.create_baseline();

        for i in 0..self.clients.len() {
            if self.clients[i].state >= ClientState::Connected {
                let is_bot = self.clients[i].is_bot;
                match self.game.client_connect(i, false, is_bot) {
                    Ok(()) => {
                        self.clients[i].begin_connected(MAX_CONFIGSTRINGS);
                        if is_bot {
                            self.clients[i].mark_primed();
                            self.clients[i].mark_active();
                            self.game.client_begin(i);
                        }
                    }
                    Err(reason) => self.drop_client(i, &reason.0),
                }
            }
        }

        self.time += 100;
        self.game.run_frame(self.time as i32);
        self.state = ServerState::Game;

        self.configstrings[CS_SERVERINFO] = format!("\\mapname\\{mapname}\\checksum\\{checksum}");
        self.configstrings[CS_SYSTEMINFO] = format!("\\sv_fps\\{}", self.config.sv_fps);
        self.diag.printf(&format!("heartbeat: map {mapname}\n"));
        Ok(())
    }

    /// Creates a baseline from every currently-linked, in-use entity.
    pub fn create_baseline(&mut self) {
        for e in self.game.linked_entities() {
            if !e.in_use {
                continue;
            }
            let n = e.state.number as usize;
            if n < self.baselines.len() {
                self.baselines[n] = e.state;
                self.baseline_used[n] = true;
            }
        }
    }

    /// `map_restart [delay]`. With `delay > 0`, schedules the restart and
    /// broadcasts it via `CS_WARMUP`; a pending restart is a no-op until
    /// it expires. With `delay == 0`, restarts immediately. If a latched
    /// cvar (e.g. `sv_maxclients`) is dirty, this escalates to a full
    /// respawn of the current map instead of the light restart path.
    pub fn map_restart(&mut self, delay_secs: i32) {
        if self.restarting && self.time < self.restart_time {
            return;
        }
        if delay_secs > 0 {
            self.restarting = true;
            self.restart_time = self.time + (delay_secs as i64) * 1000;
            let value = self.restart_time.to_string();
            self.set_configstring(CS_WARMUP, &value);
            return;
        }
        self.do_restart();
    }

    fn do_restart(&mut self) {
        if self.latched_dirty() {
            self.restarting = false;
            let mapname = self.mapname.clone();
            let _ = self.spawn_server(&mapname);
            return;
        }
        self.restarting = false;
        self.restarted_server_id = self.server_id;
        self.server_id = self.server_id.wrapping_add(1) | 1;
        self.game.init(self.time as i32, self.server_id, true);
        for _ in 0..3 {
            self.time += 100;
            self.game.run_frame(self.time as i32);
        }
        for i in 0..self.clients.len() {
            if self.clients[i].state >= ClientState::Connected {
                self.enqueue_reliable(i, "map_restart".to_string());
                let is_bot = self.clients[i].is_bot;
                if let Err(reason) = self.game.client_connect(i, false, is_bot) {
                    let msg = reason.0.clone();
                    self.drop_client(i, &msg);
                }
            }
        }
    }

    // ---- configstrings ---------------------------------------------------

    pub fn set_configstring(&mut self, index: usize, value: &str) {
        if self.configstrings[index] == value {
            return;
        }
        self.configstrings[index] = value.to_string();
        for i in 0..self.clients.len() {
            match self.clients[i].state {
                ClientState::Active => self.send_configstring_update(i, index),
                ClientState::Primed => self.clients[i].cs_updated[index] = true,
                _ => {}
            }
        }
    }

    fn send_configstring_update(&mut self, client_idx: usize, index: usize) {
        let value = self.configstrings[index].clone();
        if value.len() < message::MAX_STRING_CHARS - 24 {
            self.enqueue_reliable(client_idx, format!("cs {index} \"{value}\""));
            return;
        }
        let bytes = value.as_bytes();
        let len = bytes.len();
        let third = len.div_ceil(3);
        let b0 = third.min(len);
        let b1 = (third * 2).min(len);
        let parts = [&bytes[0..b0], &bytes[b0..b1], &bytes[b1..len]];
        for (i, part) in parts.iter().enumerate() {
            let tag = match i {
                0 => "bcs0",
                1 => "bcs1",
                _ => "bcs2",
            };
            let text = String::from_utf8_lossy(part);
            self.enqueue_reliable(client_idx, format!("{tag} {index} \"{text}\""));
        }
    }

    fn enqueue_reliable(&mut self, client_idx: usize, cmd: String) {
        if self.clients[client_idx].reliable.add_command(cmd).is_err() {
            self.drop_client(client_idx, "Server command overflow");
        }
    }

    // ---- client lifecycle -------------------------------------------------

    pub fn connect_client(&mut self, slot: usize, userinfo: String, is_bot: bool) -> Result<(), DropError> {
        if self.clients[slot].state != ClientState::Free && self.clients[slot].state != ClientState::Zombie {
            return Err(self.diag.error(ErrorKind::Drop, "slot already in use"));
        }
        self.game
            .client_connect(slot, true, is_bot)
            .map_err(|reason| DropError(reason.0))?;
        self.clients[slot] = Client::new(MAX_CONFIGSTRINGS);
        self.clients[slot].is_bot = is_bot;
        self.clients[slot].apply_userinfo(userinfo);
        self.clients[slot].last_connect_time = self.time;
        self.clients[slot].last_packet_time = self.time;
        self.clients[slot].begin_connected(MAX_CONFIGSTRINGS);
        Ok(())
    }

    /// Assembles the gamestate packet for a just-connected (or
    /// reconnecting) client and marks it `PRIMED`.
    pub fn send_gamestate(&mut self, client_idx: usize) -> Vec<u8> {
        let reliable_sequence = self.clients[client_idx].reliable.sequence();
        let last_client_command = self.clients[client_idx].last_client_command;
        let configstrings: Vec<(u16, String)> = self
            .configstrings
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_empty())
            .map(|(i, v)| (i as u16, v.clone()))
            .collect();
        let baselines: Vec<(i32, EntityState)> = self
            .baseline_used
            .iter()
            .enumerate()
            .filter(|&(n, used)| *used && n != 0)
            .map(|(n, _)| (n as i32, self.baselines[n]))
            .collect();

        let mut bs = BitStream::new(MAX_MSGLEN);
        packet::write_gamestate(
            &mut bs,
            &mut self.clients[client_idx].tx_codec,
            last_client_command,
            reliable_sequence,
            configstrings.into_iter(),
            baselines.into_iter(),
            client_idx as i32,
            self.checksum_feed as i32,
        );
        bs.data().to_vec()
    }

    /// Assembles every reliable command in `(acknowledge, sequence]` for
    /// `client_idx` into one packet: short commands are framed as plain
    /// `svc_serverCommand` text, long ones go through the `svc_zcmd`
    /// LZSS compressor sharing the client's persistent dictionary.
    pub fn build_reliable_commands_packet(&mut self, client_idx: usize) -> Vec<u8> {
        let pending: Vec<(i32, String)> = self.clients[client_idx]
            .reliable
            .pending()
            .into_iter()
            .map(|(seq, cmd)| (seq, cmd.to_string()))
            .collect();

        let mut bs = BitStream::new(MAX_MSGLEN);
        let client = &mut self.clients[client_idx];
        for (seq, cmd) in &pending {
            if cmd.len() >= ZCMD_THRESHOLD {
                packet::write_zcmd(&mut bs, &mut client.tx_codec, &mut client.lz_tx, 0, *seq, true, cmd);
            } else {
                message::write_byte(&mut bs, &mut client.tx_codec, SvcOp::ServerCommand as u8);
                message::write_long(&mut bs, &mut client.tx_codec, *seq);
                message::write_string(&mut bs, &mut client.tx_codec, cmd);
            }
        }
        bs.data().to_vec()
    }

    /// A client's incoming packet carries a reliable-command ack and the
    /// last snapshot (or gamestate) it has seen. The first ack after
    /// `CONNECTED` promotes the slot to `PRIMED`.
    pub fn handle_client_ack(&mut self, client_idx: usize, reliable_ack: i32, delta_message: i32) {
        self.clients[client_idx].reliable.update_acknowledge(reliable_ack);
        if self.clients[client_idx].state == ClientState::Connected {
            self.clients[client_idx].mark_primed();
        }
        self.clients[client_idx].delta_message = delta_message;
        self.clients[client_idx].last_packet_time = self.time;
    }

    pub fn drop_client(&mut self, idx: usize, reason: &str) {
        if self.clients[idx].state < ClientState::Connected {
            return;
        }
        for _ in 0..2 {
            let _ = self.clients[idx].reliable.add_command(format!("disconnect \"{reason}\""));
        }
        self.game.client_disconnect(idx);
        self.clients[idx].begin_zombie();
        self.clients[idx].last_packet_time = self.time;
    }

    pub fn kick(&mut self, arg: &str) {
        let maxclients = self.clients.len();
        if arg.eq_ignore_ascii_case("all") {
            for i in 0..maxclients {
                if self.clients[i].is_connected_or_better() && !self.clients[i].is_bot {
                    self.drop_client(i, "was kicked");
                }
            }
            return;
        }
        if arg.eq_ignore_ascii_case("allbots") {
            for i in 0..maxclients {
                if self.clients[i].is_connected_or_better() && self.clients[i].is_bot {
                    self.drop_client(i, "was kicked");
                }
            }
            return;
        }
        if let Some(i) = resolve_client_ref(&self.clients, arg, maxclients) {
            self.drop_client(i, "was kicked");
        }
    }

    fn check_timeouts(&mut self) {
        for i in 0..self.clients.len() {
            if self.clients[i].state >= ClientState::Connected
                && self.time - self.clients[i].last_packet_time > self.config.sv_timeout_ms
            {
                self.drop_client(i, "timed out");
            }
        }
    }

    fn reap_zombies(&mut self) {
        for c in &mut self.clients {
            c.reap_if_expired(self.time, self.config.sv_zombietime_ms);
        }
    }

    // ---- inbound traffic ----------------------------------------------------

    pub fn handle_client_command(&mut self, client_idx: usize, seq: i32, command: &str) {
        self.clients[client_idx].last_client_command = seq;
        self.clients[client_idx].last_packet_time = self.time;
        self.game.client_command(client_idx, command);
    }

    /// Applies a decoded user command: the first one after `PRIMED`
    /// promotes the slot to `ACTIVE` and flushes its dirty configstrings.
    pub fn handle_usercmd(&mut self, client_idx: usize, cmd: UserCommand) {
        self.clients[client_idx].last_usercmd = cmd;
        self.clients[client_idx].last_packet_time = self.time;
        if self.clients[client_idx].state == ClientState::Primed {
            self.clients[client_idx].mark_active();
            let dirty = self.clients[client_idx].flush_dirty_configstrings();
            for idx in dirty {
                self.send_configstring_update(client_idx, idx);
            }
            self.game.client_begin(client_idx);
        }
        if self.clients[client_idx].state == ClientState::Active {
            self.game.client_think(client_idx, &cmd);
        }
    }

    pub fn decode_incoming_usercmd(&mut self, client_idx: usize, bs: &mut BitStream) -> UserCommand {
        let from = self.clients[client_idx].last_usercmd;
        let server_id = self.server_id;
        let mut codec = std::mem::replace(&mut self.clients[client_idx].rx_codec, HuffmanCodec::new());
        let decoded = decode_user_cmd_delta(bs, &mut codec, server_id, &from);
        self.clients[client_idx].rx_codec = codec;
        decoded
    }

    // ---- tick loop ------------------------------------------------------

    /// The six-step per-tick scheduling model. Network I/O (steps 1-2) is
    /// fed in by the caller via `handle_client_command`/`handle_usercmd`
    /// before this runs; master-server heartbeat scheduling (step 6) has
    /// no counterpart here.
    pub fn tick(&mut self, now_ms: i64) {
        self.time = now_ms;

        if self.restarting && self.time >= self.restart_time {
            self.do_restart();
        }

        if self.state == ServerState::Game {
            self.game.run_frame(self.time as i32);
        }

        self.send_pending_snapshots();
        self.check_timeouts();
        self.reap_zombies();
    }

    fn send_pending_snapshots(&mut self) {
        let interval_ms = (1000 / self.config.sv_fps.max(1)) as i64;
        for i in 0..self.clients.len() {
            if self.clients[i].state != ClientState::Active {
                continue;
            }
            if self.time - self.clients[i].last_snapshot_time < interval_ms {
                continue;
            }
            let _bytes = self.build_snapshot(i);
        }
    }

    /// Builds one snapshot for `client_idx`: diffs the current linked
    /// entities against the client's last-acknowledged frame (or, if that
    /// frame has aged out past `PACKET_BACKUP` or was never acknowledged,
    /// against nothing -- every entity is then force-encoded from its
    /// baseline). Returns the assembled packet bytes.
    pub fn build_snapshot(&mut self, client_idx: usize) -> Vec<u8> {
        self.frame_num += 1;
        let frame_num = self.frame_num;

        // Entity 0 is the world -- static, and never delta-transmitted;
        // `0` doubles as the end-of-entities sentinel in the snapshot body.
        let entities: BTreeMap<i32, EntityState> = self
            .game
            .linked_entities()
            .into_iter()
            .filter(|e| e.in_use && e.state.number != 0)
            .map(|e| (e.state.number, e.state))
            .collect();

        let delta_message = self.clients[client_idx].delta_message;
        let old_frame = if delta_message == NO_DELTA_MESSAGE {
            None
        } else if frame_num - delta_message > PACKET_BACKUP {
            None
        } else {
            self.frame_history.iter().find(|f| f.frame_num == delta_message)
        };

        let empty = BTreeMap::new();
        let old_entities = old_frame.map(|f| &f.entities).unwrap_or(&empty);
        let from_delta_message = if old_frame.is_some() { delta_message } else { NO_DELTA_MESSAGE };

        let mut bs = BitStream::new(MAX_MSGLEN);
        let codec = &mut self.clients[client_idx].tx_codec;
        message::write_byte(&mut bs, codec, SvcOp::Snapshot as u8);
        message::write_long(&mut bs, codec, frame_num);
        message::write_long(&mut bs, codec, from_delta_message);

        let mut old_iter = old_entities.iter().peekable();
        let mut new_iter = entities.iter().peekable();
        loop {
            match (old_iter.peek(), new_iter.peek()) {
                (None, None) => break,
                (Some(&(_old_num, old_state)), None) => {
                    encode_entity_delta(&mut bs, codec, old_state, None, false);
                    old_iter.next();
                }
                (None, Some(&(new_num, new_state))) => {
                    let baseline = self.baselines[*new_num as usize];
                    encode_entity_delta(&mut bs, codec, &baseline, Some((new_state, *new_num)), true);
                    new_iter.next();
                }
                (Some(&(old_num, old_state)), Some(&(new_num, new_state))) => {
                    if old_num == new_num {
                        encode_entity_delta(&mut bs, codec, old_state, Some((new_state, *new_num)), false);
                        old_iter.next();
                        new_iter.next();
                    } else if new_num < old_num {
                        let baseline = self.baselines[*new_num as usize];
                        encode_entity_delta(&mut bs, codec, &baseline, Some((new_state, *new_num)), true);
                        new_iter.next();
                    } else {
                        encode_entity_delta(&mut bs, codec, old_state, None, false);
                        old_iter.next();
                    }
                }
            }
        }
        // entity number 0 never appears as a baseline target; it marks
        // end-of-entities here the same way it's reserved elsewhere.
        message::write_short(&mut bs, codec, 0);

        let player_state = self.game.player_state(client_idx);
        encode_player_delta(&mut bs, codec, &self.clients[client_idx].baseline_player_state, &player_state);
        self.clients[client_idx].baseline_player_state = player_state;

        self.frame_history.push_back(FrameRecord { frame_num, entities });
        while self.frame_history.len() > PACKET_BACKUP as usize {
            self.frame_history.pop_front();
        }

        self.clients[client_idx].last_snapshot_time = self.time;
        bs.data().to_vec()
    }

    /// Decodes a snapshot built by [`Self::build_snapshot`] against the
    /// same client's baseline -- used by tests to verify round-tripping
    /// without a real client process.
    pub fn decode_snapshot(
        &mut self,
        client_idx: usize,
        bytes: &[u8],
    ) -> Result<(i32, i32, Vec<(i32, EntityState)>, PlayerState), ProtocolError> {
        let mut bs = BitStream::from_bytes(bytes.len().max(1), bytes);
        bs.begin_read();
        let mut codec = std::mem::replace(&mut self.clients[client_idx].rx_codec, HuffmanCodec::new());

        let op = message::read_byte(&mut bs, &mut codec);
        debug_assert_eq!(op, SvcOp::Snapshot as u8);
        let frame_num = message::read_long(&mut bs, &mut codec);
        let delta_from = message::read_long(&mut bs, &mut codec);

        let mut entities = Vec::new();
        let null_entity = EntityState::default();
        loop {
            let (number, delta) = decode_entity_delta(&mut bs, &mut codec, &null_entity)?;
            if number == 0 {
                break;
            }
            if let EntityDelta::Updated(state) = delta {
                entities.push((number, state));
            }
        }

        let player_state = decode_player_delta(&mut bs, &mut codec, &PlayerState::default())?;
        self.clients[client_idx].rx_codec = codec;
        Ok((frame_num, delta_from, entities, player_state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gamevm::NullGameVm;
    use crate::maploader::NullMapLoader;
    use netcore::lzss::LzContext;

    fn fresh(maxclients: usize) -> ServerSession<NullGameVm, NullMapLoader> {
        ServerSession::new(
            SessionConfig { maxclients, ..Default::default() },
            NullGameVm::default(),
            NullMapLoader,
        )
    }

    #[test]
    fn spawn_server_creates_baselines_and_enters_game_state() {
        let mut session = fresh(4);
        session.spawn_server("q3dm1").unwrap();
        assert_eq!(session.state, ServerState::Game);
        assert!(session.configstrings[CS_SERVERINFO].contains("q3dm1"));
    }

    #[test]
    fn configstring_chunking_splits_an_oversized_value_into_three_reliable_commands() {
        let mut session = fresh(4);
        session.spawn_server("q3dm1").unwrap();
        session.connect_client(0, "\\name\\Ranger".to_string(), false).unwrap();
        session.clients[0].mark_primed();
        session.clients[0].mark_active();

        let big = "A".repeat(2000);
        session.set_configstring(12, &big);

        let pending: Vec<String> = session.clients[0].reliable.pending().into_iter().map(|(_, c)| c.to_string()).collect();
        assert_eq!(pending.len(), 3);
        assert!(pending[0].starts_with("bcs0 12 \""));
        assert!(pending[1].starts_with("bcs1 12 \""));
        assert!(pending[2].starts_with("bcs2 12 \""));

        let reassembled: String = pending
            .iter()
            .map(|p| {
                let start = p.find('"').unwrap() + 1;
                let end = p.rfind('"').unwrap();
                &p[start..end]
            })
            .collect();
        assert_eq!(reassembled, big);
    }

    #[test]
    fn primed_client_defers_configstring_updates_until_active() {
        let mut session = fresh(4);
        session.spawn_server("q3dm1").unwrap();
        session.connect_client(0, "\\name\\Ranger".to_string(), false).unwrap();
        session.clients[0].mark_primed();

        session.set_configstring(12, "short value");
        assert!(session.clients[0].cs_updated[12]);
        assert!(session.clients[0].reliable.pending().is_empty());

        session.handle_usercmd(0, UserCommand::default());
        assert_eq!(session.clients[0].state, ClientState::Active);
        assert!(!session.clients[0].cs_updated[12]);
        assert!(!session.clients[0].reliable.pending().is_empty());
    }

    #[test]
    fn snapshot_falls_back_to_non_delta_when_acked_frame_is_older_than_packet_backup() {
        let mut session = fresh(4);
        session.spawn_server("q3dm1").unwrap();
        session.connect_client(0, "\\name\\Ranger".to_string(), false).unwrap();
        session.clients[0].mark_primed();
        session.clients[0].mark_active();

        for _ in 0..10 {
            session.build_snapshot(0);
        }
        session.clients[0].delta_message = 10;
        for _ in 0..(PACKET_BACKUP as usize + 50) {
            session.build_snapshot(0);
        }

        let frame_num_before = session.frame_num;
        let bytes = session.build_snapshot(0);
        let (frame_num, delta_from, _entities, _ps) = session.decode_snapshot(0, &bytes).unwrap();
        assert_eq!(frame_num, frame_num_before + 1);
        assert_eq!(delta_from, NO_DELTA_MESSAGE);
    }

    #[test]
    fn map_restart_with_no_delay_restarts_immediately() {
        let mut session = fresh(4);
        session.spawn_server("q3dm1").unwrap();
        let server_id_before = session.server_id;
        session.map_restart(0);
        assert!(!session.restarting);
        assert_ne!(session.server_id, server_id_before);
    }

    #[test]
    fn second_map_restart_before_expiry_is_a_no_op() {
        let mut session = fresh(4);
        session.spawn_server("q3dm1").unwrap();
        session.map_restart(5);
        let restart_time = session.restart_time;
        session.time += 1000;
        session.map_restart(10);
        assert_eq!(session.restart_time, restart_time);
    }

    #[test]
    fn maxclients_change_is_latched_until_next_spawn_or_restart() {
        let mut session = fresh(4);
        session.spawn_server("q3dm1").unwrap();
        session.connect_client(0, "\\name\\Ranger".to_string(), false).unwrap();

        session.set_maxclients(6);
        assert!(session.latched_dirty());
        assert_eq!(session.clients.len(), 4);

        session.map_restart(0);
        assert_eq!(session.clients.len(), 6);
        assert!(!session.latched_dirty());
        assert_eq!(session.clients[0].state, ClientState::Connected);
    }

    #[test]
    fn shrinking_maxclients_drops_clients_in_truncated_slots() {
        let mut session = fresh(4);
        session.spawn_server("q3dm1").unwrap();
        session.connect_client(3, "\\name\\Doomguy".to_string(), false).unwrap();

        session.set_maxclients(2);
        session.map_restart(0);

        assert_eq!(session.clients.len(), 2);
    }

    #[test]
    fn build_reliable_commands_packet_round_trips_short_and_long_commands() {
        let mut session = fresh(2);
        session.spawn_server("q3dm1").unwrap();
        session.connect_client(0, "\\name\\Ranger".to_string(), false).unwrap();

        let long_cmd = format!("cs 12 \"{}\"", "x".repeat(64));
        session.clients[0].reliable.add_command("print \"hi\"".to_string()).unwrap();
        session.clients[0].reliable.add_command(long_cmd.clone()).unwrap();

        let bytes = session.build_reliable_commands_packet(0);

        let mut bs = BitStream::from_bytes(bytes.len().max(1), &bytes);
        bs.begin_read();
        let mut codec = std::mem::replace(&mut session.clients[0].rx_codec, netcore::HuffmanCodec::new());

        let op1 = message::read_byte(&mut bs, &mut codec);
        assert_eq!(op1, SvcOp::ServerCommand as u8);
        let seq1 = message::read_long(&mut bs, &mut codec);
        let cmd1 = message::read_string(&mut bs, &mut codec);
        assert_eq!(seq1, 1);
        assert_eq!(cmd1, "print \"hi\"");

        let op2 = message::read_byte(&mut bs, &mut codec);
        assert_eq!(op2, SvcOp::ZCmd as u8);
        let mut lz = LzContext::new();
        let parsed = packet::read_zcmd(&mut bs, &mut codec, &mut lz);
        assert_eq!(parsed.reliable_sequence, 2);
        assert_eq!(parsed.command, long_cmd);
    }
}
