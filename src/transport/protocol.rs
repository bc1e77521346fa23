//! Console command protocol
//!
//! A message is a whitespace-separated list of commands:
//!
//! | Command             | Meaning                                   |
//! |---------------------|-------------------------------------------|
//! | `N manual note vel` | key down (`vel > 0`) or key up (`vel = 0`) |
//! | `S stop action`     | stop off (0), on (1) or toggle (2)        |
//! | `M mode`            | switch instrument mode                    |
//! | `T semitones`       | transpose                                 |
//! | `V velocity`        | volume for new notes                      |
//!
//! Unknown command letters are skipped. A missing or non-numeric argument
//! rejects the whole message.

use thiserror::Error;
use tracing::warn;

/// One decoded console command, with arguments as sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrganEvent {
    Note { manual: i64, note: i64, velocity: i64 },
    Stop { stop: i64, action: i64 },
    Mode(i64),
    Transpose(i64),
    Volume(i64),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("command '{command}' is missing its {argument} argument")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },

    #[error("command '{command}' has non-integer {argument} '{value}'")]
    InvalidArgument {
        command: &'static str,
        argument: &'static str,
        value: String,
    },
}

fn arg<'a>(
    tokens: &mut impl Iterator<Item = &'a str>,
    command: &'static str,
    argument: &'static str,
) -> Result<i64, ProtocolError> {
    let token = tokens
        .next()
        .ok_or(ProtocolError::MissingArgument { command, argument })?;
    token.parse().map_err(|_| ProtocolError::InvalidArgument {
        command,
        argument,
        value: token.to_string(),
    })
}

/// Decode a full message into events, in order
pub fn parse_message(payload: &str) -> Result<Vec<OrganEvent>, ProtocolError> {
    let mut tokens = payload.split_whitespace();
    let mut events = Vec::new();

    while let Some(command) = tokens.next() {
        let event = match command {
            "N" => OrganEvent::Note {
                manual: arg(&mut tokens, "N", "manual")?,
                note: arg(&mut tokens, "N", "note")?,
                velocity: arg(&mut tokens, "N", "velocity")?,
            },
            "S" => OrganEvent::Stop {
                stop: arg(&mut tokens, "S", "stop")?,
                action: arg(&mut tokens, "S", "action")?,
            },
            "M" => OrganEvent::Mode(arg(&mut tokens, "M", "mode")?),
            "T" => OrganEvent::Transpose(arg(&mut tokens, "T", "semitones")?),
            "V" => OrganEvent::Volume(arg(&mut tokens, "V", "velocity")?),
            other => {
                warn!("Skipping unknown command '{}'", other);
                continue;
            }
        };
        events.push(event);
    }

    Ok(events)
}
