//! Operator command dispatcher: the console/rcon surface an
//! administrator drives the session with. Each command is a small
//! function taking the session and its argument list; `execute` is the
//! single entry point, following the usual console-command registry
//! pattern but without dynamic registration, since this workspace's
//! command set is fixed at compile time.

use crate::client::{resolve_client_ref, ClientState};
use crate::gamevm::GameVm;
use crate::maploader::MapLoader;
use crate::session::ServerSession;

pub fn execute<G: GameVm, M: MapLoader>(session: &mut ServerSession<G, M>, args: &[String]) -> String {
    let Some(cmd) = args.first() else {
        return String::new();
    };
    match cmd.as_str() {
        "heartbeat" => {
            session.diag.printf("heartbeat: forced\n");
            "heartbeat sent\n".to_string()
        }
        "kick" => {
            if let Some(arg) = args.get(1) {
                session.kick(arg);
                format!("kicked {arg}\n")
            } else {
                "usage: kick <name|all|allbots>\n".to_string()
            }
        }
        "clientkick" => match args.get(1).and_then(|a| a.parse::<usize>().ok()) {
            Some(num) if num < session.clients.len() => {
                session.drop_client(num, "was kicked");
                format!("dropped client {num}\n")
            }
            _ => "usage: clientkick <num>\n".to_string(),
        },
        "status" => status(session),
        "dumpuser" => match args.get(1) {
            Some(name) => dumpuser(session, name),
            None => "usage: dumpuser <name>\n".to_string(),
        },
        "map_restart" => {
            let delay = args.get(1).and_then(|a| a.parse::<i32>().ok()).unwrap_or(0);
            session.map_restart(delay);
            "map restart scheduled\n".to_string()
        }
        "map" | "devmap" | "spmap" | "spdevmap" => match args.get(1) {
            Some(name) => match session.spawn_server(name) {
                Ok(()) => format!("map {name} loaded\n"),
                Err(e) => format!("map load failed: {e}\n"),
            },
            None => format!("usage: {cmd} <name>\n"),
        },
        "killserver" => {
            session.state = crate::session::ServerState::Dead;
            for i in 0..session.clients.len() {
                if session.clients[i].is_connected_or_better() {
                    session.drop_client(i, "server was killed");
                }
            }
            "server killed\n".to_string()
        }
        "serverinfo" => format!("{}\n", session.configstrings[crate::session::CS_SERVERINFO]),
        "systeminfo" => format!("{}\n", session.configstrings[crate::session::CS_SYSTEMINFO]),
        "say" => {
            let text = args[1..].join(" ");
            broadcast(session, &format!("chat \"console: {text}\""));
            String::new()
        }
        "tell" => {
            if args.len() < 3 {
                return "usage: tell <client> <text>\n".to_string();
            }
            let maxclients = session.clients.len();
            match resolve_client_ref(&session.clients, &args[1], maxclients) {
                Some(i) => {
                    let text = args[2..].join(" ");
                    let cmd = format!("chat \"console: {text}\"");
                    if session.clients[i].reliable.add_command(cmd).is_err() {
                        session.drop_client(i, "Server command overflow");
                    }
                    String::new()
                }
                None => "no such client\n".to_string(),
            }
        }
        "locations" | "sectorlist" | "filter" | "filtercmd" => {
            // No counterpart in this workspace: location tracking, BSP
            // sector listing, and IP/command filtering all belong to
            // subsystems outside the wire-protocol/session core.
            String::new()
        }
        _ => format!("unknown command: {cmd}\n"),
    }
}

fn broadcast<G: GameVm, M: MapLoader>(session: &mut ServerSession<G, M>, cmd: &str) {
    for i in 0..session.clients.len() {
        if session.clients[i].state >= ClientState::Connected
            && session.clients[i].reliable.add_command(cmd.to_string()).is_err()
        {
            session.drop_client(i, "Server command overflow");
        }
    }
}

fn status<G: GameVm, M: MapLoader>(session: &ServerSession<G, M>) -> String {
    let mut out = String::from("num score ping name            address\n");
    for (i, c) in session.clients.iter().enumerate() {
        if !c.is_connected_or_better() {
            continue;
        }
        out.push_str(&format!("{i:<4}{:<6}{:<6}{:<16}{}\n", 0, 0, c.name, c.address));
    }
    out
}

fn dumpuser<G: GameVm, M: MapLoader>(session: &ServerSession<G, M>, name: &str) -> String {
    let maxclients = session.clients.len();
    match resolve_client_ref(&session.clients, name, maxclients) {
        Some(i) => format!("userinfo for {}:\n{}\n", session.clients[i].name, session.clients[i].userinfo),
        None => format!("no such client: {name}\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gamevm::NullGameVm;
    use crate::maploader::NullMapLoader;
    use crate::session::SessionConfig;

    fn fresh() -> ServerSession<NullGameVm, NullMapLoader> {
        ServerSession::new(SessionConfig { maxclients: 4, ..Default::default() }, NullGameVm::default(), NullMapLoader)
    }

    #[test]
    fn map_restart_with_delay_schedules_without_restarting_immediately() {
        let mut session = fresh();
        session.spawn_server("q3dm1").unwrap();
        let server_id_before = session.server_id;
        execute(&mut session, &["map_restart".to_string(), "5".to_string()]);
        assert!(session.restarting);
        assert_eq!(session.server_id, server_id_before);
    }

    #[test]
    fn kick_all_drops_connected_non_bot_clients() {
        let mut session = fresh();
        session.connect_client(0, "\\name\\Ranger".to_string(), false).unwrap();
        execute(&mut session, &["kick".to_string(), "all".to_string()]);
        assert_eq!(session.clients[0].state, ClientState::Zombie);
    }

    #[test]
    fn unknown_command_reports_itself() {
        let mut session = fresh();
        let out = execute(&mut session, &["bogus".to_string()]);
        assert!(out.contains("bogus"));
    }
}
