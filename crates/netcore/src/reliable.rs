//! Per-client reliable command ring: a 64-slot FIFO of server-to-client
//! text commands with a sequence cursor and an acknowledge cursor the
//! client echoes back on every packet. Overflow drops the client instead
//! of growing the ring, since an unacknowledging client has usually gone
//! silent rather than merely fallen behind.

pub const MAX_RELIABLE_COMMANDS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandOverflow;

#[derive(Debug, Clone)]
pub struct ReliableRing {
    sequence: i32,
    acknowledge: i32,
    commands: [String; MAX_RELIABLE_COMMANDS],
}

impl Default for ReliableRing {
    fn default() -> Self {
        Self::new()
    }
}

impl ReliableRing {
    pub fn new() -> Self {
        const EMPTY: String = String::new();
        Self { sequence: 0, acknowledge: 0, commands: [EMPTY; MAX_RELIABLE_COMMANDS] }
    }

    pub fn sequence(&self) -> i32 {
        self.sequence
    }

    pub fn acknowledge(&self) -> i32 {
        self.acknowledge
    }

    /// Updates the acknowledge cursor from a value the client reported.
    /// Acknowledges older than what we already know about, or newer than
    /// what we've sent, are ignored rather than trusted blindly.
    pub fn update_acknowledge(&mut self, client_ack: i32) {
        if client_ack > self.acknowledge && client_ack <= self.sequence {
            self.acknowledge = client_ack;
        }
    }

    pub fn add_command(&mut self, command: String) -> Result<i32, CommandOverflow> {
        if self.sequence - self.acknowledge >= MAX_RELIABLE_COMMANDS as i32 {
            return Err(CommandOverflow);
        }
        self.sequence += 1;
        self.commands[(self.sequence as usize) % MAX_RELIABLE_COMMANDS] = command;
        Ok(self.sequence)
    }

    /// Commands in `(acknowledge, sequence]`, oldest first -- what the
    /// next outgoing packet should carry (either as plain text or fed
    /// through the zcmd compressor).
    pub fn pending(&self) -> Vec<(i32, &str)> {
        let mut out = Vec::new();
        let mut seq = self.acknowledge + 1;
        while seq <= self.sequence {
            out.push((seq, self.commands[(seq as usize) % MAX_RELIABLE_COMMANDS].as_str()));
            seq += 1;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_command_increments_sequence() {
        let mut ring = ReliableRing::new();
        let seq = ring.add_command("print \"hi\"".to_string()).unwrap();
        assert_eq!(seq, 1);
        assert_eq!(ring.sequence(), 1);
    }

    #[test]
    fn overflow_drops_the_client_instead_of_overwriting_in_flight_commands() {
        let mut ring = ReliableRing::new();
        for i in 0..MAX_RELIABLE_COMMANDS {
            ring.add_command(format!("cmd{i}")).unwrap();
        }
        assert_eq!(ring.add_command("one_too_many".to_string()), Err(CommandOverflow));
    }

    #[test]
    fn acknowledging_frees_room_in_the_ring() {
        let mut ring = ReliableRing::new();
        for i in 0..MAX_RELIABLE_COMMANDS {
            ring.add_command(format!("cmd{i}")).unwrap();
        }
        ring.update_acknowledge(32);
        assert!(ring.add_command("room now".to_string()).is_ok());
    }

    #[test]
    fn pending_returns_commands_in_order_after_acknowledge() {
        let mut ring = ReliableRing::new();
        ring.add_command("a".to_string()).unwrap();
        ring.add_command("b".to_string()).unwrap();
        ring.add_command("c".to_string()).unwrap();
        ring.update_acknowledge(1);
        let pending: Vec<_> = ring.pending().into_iter().map(|(_, c)| c.to_string()).collect();
        assert_eq!(pending, vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn stale_or_future_acknowledge_is_ignored() {
        let mut ring = ReliableRing::new();
        ring.add_command("a".to_string()).unwrap();
        ring.update_acknowledge(99);
        assert_eq!(ring.acknowledge(), 0);
    }
}
