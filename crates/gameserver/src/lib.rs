#![allow(dead_code)]

//! Server-side state built on top of `netcore`'s wire codec: per-client
//! lifecycle, the session that ties configstrings/baselines/snapshots
//! together, the operator command surface, and the narrow boundaries
//! standing in for the game VM, collision module, and diagnostics.

pub mod ccmds;
pub mod client;
pub mod diag;
pub mod gamevm;
pub mod maploader;
pub mod packet;
pub mod session;

pub use client::{Client, ClientState};
pub use gamevm::GameVm;
pub use maploader::MapLoader;
pub use session::{ServerSession, SessionConfig};
