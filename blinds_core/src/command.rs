//! Inbound command decoding.
//!
//! Payloads are matched exactly (after trimming surrounding whitespace).
//! Anything unrecognized decodes to `None` and is dropped by the caller.

use core::fmt;

/// Which subscription a message arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicRole {
    Command,
    SetPosition,
    Feedback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Open,
    Close,
    Stop,
    Reset,
    Led(bool),
    /// Move to a percentage of travel (0 = closed, 100 = open).
    SetPosition(u8),
    /// The covering is known to be at this percentage.
    Feedback(u8),
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Open => f.write_str("OPEN"),
            Command::Close => f.write_str("CLOSE"),
            Command::Stop => f.write_str("STOP"),
            Command::Reset => f.write_str("RESET"),
            Command::Led(true) => f.write_str("ledon"),
            Command::Led(false) => f.write_str("ledoff"),
            Command::SetPosition(p) => write!(f, "set-position {p}"),
            Command::Feedback(p) => write!(f, "feedback {p}"),
        }
    }
}

/// Decode a payload received on a topic of the given role.
pub fn decode(role: TopicRole, payload: &str) -> Option<Command> {
    let payload = payload.trim();
    match role {
        TopicRole::Command => match payload {
            "OPEN" => Some(Command::Open),
            "CLOSE" => Some(Command::Close),
            "STOP" => Some(Command::Stop),
            "RESET" => Some(Command::Reset),
            "ledon" => Some(Command::Led(true)),
            "ledoff" => Some(Command::Led(false)),
            _ => None,
        },
        TopicRole::SetPosition => parse_percent(payload).map(Command::SetPosition),
        TopicRole::Feedback => parse_percent(payload).map(Command::Feedback),
    }
}

/// Integer percentage; out-of-range values are clamped to 0..=100.
fn parse_percent(payload: &str) -> Option<u8> {
    let v: i64 = payload.parse().ok()?;
    // Clamped into 0..=100, always fits.
    Some(v.clamp(0, 100) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_tokens_are_case_sensitive() {
        assert_eq!(decode(TopicRole::Command, "OPEN"), Some(Command::Open));
        assert_eq!(decode(TopicRole::Command, " STOP\n"), Some(Command::Stop));
        assert_eq!(decode(TopicRole::Command, "ledon"), Some(Command::Led(true)));
        assert_eq!(decode(TopicRole::Command, "open"), None);
        assert_eq!(decode(TopicRole::Command, "LEDON"), None);
        assert_eq!(decode(TopicRole::Command, "50"), None);
    }

    #[test]
    fn percentages_clamp_and_reject_garbage() {
        assert_eq!(
            decode(TopicRole::SetPosition, "50"),
            Some(Command::SetPosition(50))
        );
        assert_eq!(
            decode(TopicRole::SetPosition, "250"),
            Some(Command::SetPosition(100))
        );
        assert_eq!(
            decode(TopicRole::Feedback, "-4"),
            Some(Command::Feedback(0))
        );
        assert_eq!(decode(TopicRole::SetPosition, "half"), None);
        assert_eq!(decode(TopicRole::Feedback, ""), None);
        assert_eq!(decode(TopicRole::Feedback, "12.5"), None);
    }
}
