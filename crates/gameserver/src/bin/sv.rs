//! Standalone server process: wires a `ServerSession` to the null game
//! VM and collision stand-ins and runs its tick loop against wall time.
//! A real deployment links a genuine `GameVm`/`MapLoader` pair in place
//! of the null ones; everything else here is unchanged.

use std::env;
use std::thread;
use std::time::{Duration, Instant};

use gameserver::session::SessionConfig;
use gameserver::ServerSession;

fn main() {
    let mut args = env::args().skip(1);
    let mapname = args.next().unwrap_or_else(|| "q3dm1".to_string());

    let config = SessionConfig::default();
    let mut session = ServerSession::new(config, gameserver::gamevm::NullGameVm::default(), gameserver::maploader::NullMapLoader);

    if let Err(e) = session.spawn_server(&mapname) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }

    let tick_ms = (1000 / session.config.sv_fps.max(1)) as u64;
    let start = Instant::now();
    loop {
        let now_ms = start.elapsed().as_millis() as i64;
        session.tick(now_ms);
        thread::sleep(Duration::from_millis(tick_ms));

        // A real deployment drains a signal/console-command channel here
        // and calls `ccmds::execute` for operator input; this standalone
        // binary just runs until killed.
        if now_ms > 60_000 {
            break;
        }
    }

    std::process::exit(0);
}
