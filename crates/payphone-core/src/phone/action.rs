use crate::call::CallHandle;
use crate::line::LineCommand;
use std::fmt;

/// Side effect requested by the phone state machine
///
/// The state machine never performs I/O itself. The controller executes each
/// action in order and reports failures back through
/// [`super::ControllerState::action_failed`] or
/// [`super::ControllerState::line_command_dropped`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Enqueue a command for the serial link
    Line(LineCommand),
    /// Ask the signaling stack to call `destination`
    PlaceCall { destination: String },
    /// Respond to an incoming call with `code`
    Answer { call: CallHandle, code: u16 },
    Hangup { call: CallHandle },
    /// Relay a digit into the active call
    SendDtmf { call: CallHandle, digit: char },
    /// Connect the call's media to the local audio device
    ConnectAudio { call: CallHandle },
}

impl Action {
    /// Name of the signaling operation, used in logs and errors
    pub fn operation(&self) -> &'static str {
        match self {
            Action::Line(_) => "line-command",
            Action::PlaceCall { .. } => "place-call",
            Action::Answer { .. } => "answer",
            Action::Hangup { .. } => "hangup",
            Action::SendDtmf { .. } => "send-dtmf",
            Action::ConnectAudio { .. } => "connect-audio",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Line(command) => write!(f, "{}", command),
            Action::PlaceCall { destination } => write!(f, "place-call {}", destination),
            Action::Answer { call, code } => write!(f, "answer {} with {}", call, code),
            Action::Hangup { call } => write!(f, "hangup {}", call),
            Action::SendDtmf { call, digit } => write!(f, "dtmf '{}' on {}", digit, call),
            Action::ConnectAudio { call } => write!(f, "connect-audio {}", call),
        }
    }
}
