use crate::registry::ModulePosition;

/// Substring that marks a heartbeat ping from a module.
pub const HEARTBEAT_MARKER: &str = "PING";

/// Acknowledgement byte sequence a heartbeat expects back on the wire.
///
/// Writing it is the caller's side effect; the parser only classifies.
pub const HEARTBEAT_ACK: &[u8] = b"ACK_PI\n";

/// One parsed serial line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerialEvent {
    /// Heartbeat ping; the caller should answer with [`HEARTBEAT_ACK`].
    Heartbeat,
    /// A well-formed position report from a required module.
    PositionReport(ModulePosition),
    /// Anything else. Logged and discarded by the caller, never fatal.
    Unrecognized(String),
}

/// Parse a raw serial line into a typed event.
///
/// A line containing the heartbeat marker is a [`SerialEvent::Heartbeat`].
/// Otherwise enclosing parentheses and quotes are stripped and the line is
/// split on commas; exactly three fields whose first field is a required
/// module id yield a [`SerialEvent::PositionReport`]. Any other shape
/// degrades to [`SerialEvent::Unrecognized`] - malformed input never
/// panics and never errors.
pub fn parse_line(raw: &str, required_ids: &[String]) -> SerialEvent {
    if raw.contains(HEARTBEAT_MARKER) {
        return SerialEvent::Heartbeat;
    }

    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '(' | ')' | '"'))
        .collect();

    let parts: Vec<&str> = cleaned.split(',').map(str::trim).collect();

    if parts.len() == 3 {
        let module_id = parts[0];
        if required_ids.iter().any(|id| id == module_id) {
            return SerialEvent::PositionReport(ModulePosition {
                module_id: module_id.to_string(),
                latitude: parts[1].to_string(),
                longitude: parts[2].to_string(),
            });
        }
    }

    SerialEvent::Unrecognized(raw.to_string())
}
