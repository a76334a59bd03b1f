//! Narrow boundary standing in for the external game logic VM. Entity
//! simulation, scoring, and weapon/physics rules live entirely outside
//! this workspace; the session only ever calls through this trait and
//! never inspects what's on the other side of it.

use netcore::entity_state::EntityState;
use netcore::player_state::PlayerState;
use netcore::user_cmd::UserCommand;

/// A linked entity the session needs to know about for baseline/snapshot
/// purposes: its wire state plus whether it's currently in the world.
#[derive(Debug, Clone)]
pub struct LinkedEntity {
    pub state: EntityState,
    pub in_use: bool,
}

/// Why a connect attempt was refused; forwarded to the client verbatim
/// as a `disconnect "<reason>"` / out-of-band `print`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectDenied(pub String);

pub trait GameVm {
    fn init(&mut self, level_time: i32, spawn_count: i32, restart: bool);

    fn run_frame(&mut self, level_time: i32);

    fn client_connect(&mut self, client_num: usize, first_time: bool, is_bot: bool) -> Result<(), ConnectDenied>;

    fn client_begin(&mut self, client_num: usize);

    fn client_command(&mut self, client_num: usize, command: &str);

    fn client_think(&mut self, client_num: usize, cmd: &UserCommand);

    fn client_disconnect(&mut self, client_num: usize);

    fn linked_entities(&self) -> Vec<LinkedEntity>;

    fn player_state(&self, client_num: usize) -> PlayerState;
}

/// Minimal in-memory stand-in used by tests and by `sv` when no real game
/// module is loaded. Never denies a connect, never spawns entities.
#[derive(Default)]
pub struct NullGameVm {
    pub connected: Vec<bool>,
}

impl GameVm for NullGameVm {
    fn init(&mut self, _level_time: i32, _spawn_count: i32, _restart: bool) {}
    fn run_frame(&mut self, _level_time: i32) {}
    fn client_connect(&mut self, client_num: usize, _first_time: bool, _is_bot: bool) -> Result<(), ConnectDenied> {
        if self.connected.len() <= client_num {
            self.connected.resize(client_num + 1, false);
        }
        self.connected[client_num] = true;
        Ok(())
    }
    fn client_begin(&mut self, _client_num: usize) {}
    fn client_command(&mut self, _client_num: usize, _command: &str) {}
    fn client_think(&mut self, _client_num: usize, _cmd: &UserCommand) {}
    fn client_disconnect(&mut self, client_num: usize) {
        if let Some(slot) = self.connected.get_mut(client_num) {
            *slot = false;
        }
    }
    fn linked_entities(&self) -> Vec<LinkedEntity> {
        Vec::new()
    }
    fn player_state(&self, _client_num: usize) -> PlayerState {
        PlayerState::default()
    }
}
