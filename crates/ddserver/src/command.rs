//! Console command parsing
//!
//! A finished console line is one of:
//!
//! ```text
//!   exit            stop the loop
//!   @<ip>#<port>    register a peer
//!   <anything else> broadcast to every peer
//! ```

use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Exit,
    AddPeer { host: String, port: u16 },
    Broadcast(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("peer command needs '@<ip>#<port>'")]
    MissingPort,

    #[error("peer command has no address")]
    MissingHost,

    #[error("invalid peer port '{0}'")]
    InvalidPort(String),
}

/// Text up to the first space
fn first_word(text: &str) -> &str {
    text.split(' ').next().unwrap_or_default()
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        if line == "exit" {
            return Ok(Command::Exit);
        }

        let Some(target) = line.strip_prefix('@') else {
            return Ok(Command::Broadcast(line.to_string()));
        };

        let (host, port) = target.split_once('#').ok_or(CommandError::MissingPort)?;
        let host = first_word(host.trim_start());
        let port = first_word(port.trim_start());

        if host.is_empty() {
            return Err(CommandError::MissingHost);
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| CommandError::InvalidPort(port.to_string()))?;

        Ok(Command::AddPeer {
            host: host.to_string(),
            port,
        })
    }
}
