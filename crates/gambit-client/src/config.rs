//! Client configuration from the command line and environment.

use clap::Parser;

/// Relay used when neither `--relay-url` nor `RELAY_URL` is given.
pub const DEFAULT_RELAY_URL: &str = "ws://127.0.0.1:8080";

/// Terminal client for Gambit.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "gambit")]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Room to join; asked for interactively when absent
    #[arg(env = "GAMBIT_ROOM")]
    room: Option<String>,

    /// WebSocket address of the relay
    #[arg(long, env = "RELAY_URL", default_value = DEFAULT_RELAY_URL)]
    pub relay_url: String,
}

impl Config {
    /// The requested room, ignoring blank names.
    pub fn room(&self) -> Option<&str> {
        self.room
            .as_deref()
            .map(str::trim)
            .filter(|room| !room.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(["gambit"]).unwrap();
        assert_eq!(config.relay_url, DEFAULT_RELAY_URL);
        assert_eq!(config.room(), None);
    }

    #[test]
    fn test_room_and_relay_flags() {
        let config =
            Config::try_parse_from(["gambit", "arg-room", "--relay-url", "ws://relay:9000"])
                .unwrap();
        assert_eq!(config.relay_url, "ws://relay:9000");
        assert_eq!(config.room(), Some("arg-room"));
    }

    #[test]
    fn test_blank_room_ignored() {
        let config = Config::try_parse_from(["gambit", "  "]).unwrap();
        assert_eq!(config.room(), None);
    }

    #[test]
    fn test_unknown_flag_rejected() {
        assert!(Config::try_parse_from(["gambit", "--colour", "white"]).is_err());
    }
}
