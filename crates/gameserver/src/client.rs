//! Per-slot connection state: the `ClientState` lifecycle and the fields
//! a slot accumulates while connected. The server owns every slot for
//! its entire process lifetime -- slots are never allocated or freed,
//! only recycled between `Free` and `Connected`.

use netcore::huffman::HuffmanCodec;
use netcore::lzss::LzContext;
use netcore::player_state::PlayerState;
use netcore::reliable::ReliableRing;
use netcore::user_cmd::UserCommand;

/// Total order `Free < Zombie < Connected < Primed < Active`, matching
/// the lifecycle table: reconnects can only ever move a slot forward
/// along this line, never backward except through `drop` into `Zombie`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ClientState {
    Free = 0,
    Zombie = 1,
    Connected = 2,
    Primed = 3,
    Active = 4,
}

pub const NO_DELTA_MESSAGE: i32 = -1;

#[derive(Debug, Clone)]
pub struct Client {
    pub state: ClientState,
    pub userinfo: String,
    pub name: String,
    pub reliable: ReliableRing,
    pub last_client_command: i32,
    pub last_usercmd: UserCommand,
    /// Last snapshot id the client acknowledged, or [`NO_DELTA_MESSAGE`].
    pub delta_message: i32,
    pub cs_updated: Vec<bool>,
    pub last_snapshot_time: i64,
    pub last_packet_time: i64,
    pub last_connect_time: i64,
    pub old_server_time: i32,
    pub challenge: i32,
    pub is_bot: bool,
    pub address: String,
    pub baseline_player_state: PlayerState,
    /// Persistent per-direction Huffman state. One pair per connection,
    /// shared across every packet sent or read for that client -- never
    /// reset mid-connection, since the two sides must stay in lockstep.
    pub tx_codec: HuffmanCodec,
    pub rx_codec: HuffmanCodec,
    /// Sliding-window dictionaries for `svc_zcmd` compression, one per
    /// direction. Persistent across the whole connection for the same
    /// reason as the huffman codecs above: both peers must see the same
    /// plaintext in the same order or the dictionary desyncs.
    pub lz_tx: LzContext,
    pub lz_rx: LzContext,
}

impl Client {
    pub fn new(max_configstrings: usize) -> Self {
        Self {
            state: ClientState::Free,
            userinfo: String::new(),
            name: String::new(),
            reliable: ReliableRing::new(),
            last_client_command: 0,
            last_usercmd: UserCommand::default(),
            delta_message: NO_DELTA_MESSAGE,
            cs_updated: vec![false; max_configstrings],
            last_snapshot_time: 0,
            last_packet_time: 0,
            last_connect_time: 0,
            old_server_time: 0,
            challenge: 0,
            is_bot: false,
            address: String::new(),
            baseline_player_state: PlayerState::default(),
            tx_codec: HuffmanCodec::new(),
            rx_codec: HuffmanCodec::new(),
            lz_tx: LzContext::new(),
            lz_rx: LzContext::new(),
        }
    }

    pub fn is_connected_or_better(&self) -> bool {
        self.state >= ClientState::Connected
    }

    /// Extracts the `name` userinfo key the way `SV_UserinfoChanged`
    /// does: missing or empty falls back to a placeholder instead of an
    /// empty display name.
    pub fn apply_userinfo(&mut self, userinfo: String) {
        self.name = parse_userinfo_key(&userinfo, "name")
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "unnamed".to_string());
        self.userinfo = userinfo;
    }

    pub fn begin_connected(&mut self, max_configstrings: usize) {
        self.state = ClientState::Connected;
        self.delta_message = NO_DELTA_MESSAGE;
        self.cs_updated = vec![false; max_configstrings];
        self.tx_codec = HuffmanCodec::new();
        self.rx_codec = HuffmanCodec::new();
        self.lz_tx = LzContext::new();
        self.lz_rx = LzContext::new();
    }

    pub fn mark_primed(&mut self) {
        if self.state == ClientState::Connected {
            self.state = ClientState::Primed;
            self.cs_updated.iter_mut().for_each(|c| *c = false);
        }
    }

    pub fn mark_active(&mut self) {
        if self.state == ClientState::Primed {
            self.state = ClientState::Active;
        }
    }

    pub fn begin_zombie(&mut self) {
        if self.state >= ClientState::Connected {
            self.state = ClientState::Zombie;
        }
    }

    pub fn reap_if_expired(&mut self, now_ms: i64, zombietime_ms: i64) -> bool {
        if self.state == ClientState::Zombie && now_ms > self.last_packet_time + zombietime_ms {
            self.state = ClientState::Free;
            true
        } else {
            false
        }
    }

    pub fn flush_dirty_configstrings(&mut self) -> Vec<usize> {
        let idxs: Vec<usize> = self
            .cs_updated
            .iter()
            .enumerate()
            .filter(|(_, dirty)| **dirty)
            .map(|(i, _)| i)
            .collect();
        self.cs_updated.iter_mut().for_each(|c| *c = false);
        idxs
    }
}

/// Strips `"`, `;`, and control characters out of a userinfo string --
/// `\key\value\key\value...` -- and returns the value for `key`, if any.
pub fn parse_userinfo_key(userinfo: &str, key: &str) -> Option<String> {
    let cleaned: String = userinfo.chars().filter(|&c| c != '"' && c != ';' && !c.is_control()).collect();
    let parts: Vec<&str> = cleaned.split('\\').filter(|s| !s.is_empty()).collect();
    parts.chunks(2).find(|chunk| chunk[0] == key).and_then(|chunk| chunk.get(1)).map(|s| s.to_string())
}

/// Case-insensitive lookup by name, also tried against a color-stripped
/// form; a pure-numeric argument inside `[0, maxclients)` resolves
/// directly to that slot index.
pub fn resolve_client_ref<'a>(clients: &'a [Client], arg: &str, maxclients: usize) -> Option<usize> {
    if let Ok(num) = arg.parse::<usize>() {
        if num < maxclients {
            return Some(num);
        }
    }
    let needle = strip_color_codes(arg).to_lowercase();
    clients.iter().position(|c| {
        c.is_connected_or_better() && strip_color_codes(&c.name).to_lowercase() == needle
    })
}

fn strip_color_codes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '^' && chars.peek().is_some() {
            chars.next();
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_ordering_matches_lifecycle_table() {
        assert!(ClientState::Free < ClientState::Zombie);
        assert!(ClientState::Zombie < ClientState::Connected);
        assert!(ClientState::Connected < ClientState::Primed);
        assert!(ClientState::Primed < ClientState::Active);
    }

    #[test]
    fn userinfo_name_extraction_falls_back_when_missing() {
        let mut c = Client::new(4);
        c.apply_userinfo("\\rate\\25000".to_string());
        assert_eq!(c.name, "unnamed");
        c.apply_userinfo("\\name\\Ranger\\rate\\25000".to_string());
        assert_eq!(c.name, "Ranger");
    }

    #[test]
    fn zombie_reaps_only_after_zombietime_elapses() {
        let mut c = Client::new(4);
        c.state = ClientState::Zombie;
        c.last_packet_time = 0;
        assert!(!c.reap_if_expired(1999, 2000));
        assert!(c.reap_if_expired(2001, 2000));
        assert_eq!(c.state, ClientState::Free);
    }

    #[test]
    fn resolve_client_ref_matches_color_stripped_name_case_insensitively() {
        let mut clients = vec![Client::new(4), Client::new(4)];
        clients[1].state = ClientState::Active;
        clients[1].name = "^1Ranger".to_string();
        assert_eq!(resolve_client_ref(&clients, "RANGER", 2), Some(1));
        assert_eq!(resolve_client_ref(&clients, "1", 2), Some(1));
    }

    #[test]
    fn no_back_edges_from_active_except_via_zombie() {
        let mut c = Client::new(4);
        c.begin_connected(4);
        c.mark_primed();
        c.mark_active();
        assert_eq!(c.state, ClientState::Active);
        c.begin_zombie();
        assert_eq!(c.state, ClientState::Zombie);
    }
}
