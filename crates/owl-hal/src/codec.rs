//! Wire command codec.
//!
//! The servo controller expects one text line per tick holding five
//! space-separated integers in the fixed order
//! `<rightPan> <rightTilt> <leftPan> <leftTilt> <neckPan>`, with no
//! terminator.  This order is a compatibility contract with the controller
//! firmware.

use owl_types::{AxisState, OwlError};

/// Serialize the current axis positions into the wire command.
///
/// ```rust
/// use owl_hal::codec::encode;
/// use owl_types::{AxisLimits, AxisState};
///
/// let state = AxisState::new(AxisLimits::default()).unwrap();
/// assert_eq!(encode(&state), "1535 1545 1520 1460 1540");
/// ```
pub fn encode(state: &AxisState) -> String {
    state
        .positions()
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a wire command back into its five positions (wire order).
///
/// Used by the simulated controller and by diagnostics.
///
/// # Errors
///
/// Returns [`OwlError::MalformedResponse`] unless the text is exactly five
/// whitespace-separated integers.
pub fn decode_command(command: &str) -> Result<[i32; 5], OwlError> {
    let mut out = [0i32; 5];
    let mut fields = command.split_whitespace();
    for slot in out.iter_mut() {
        let field = fields
            .next()
            .ok_or_else(|| OwlError::MalformedResponse(format!("too few fields in {command:?}")))?;
        *slot = field
            .parse()
            .map_err(|e| OwlError::MalformedResponse(format!("field {field:?}: {e}")))?;
    }
    if fields.next().is_some() {
        return Err(OwlError::MalformedResponse(format!(
            "too many fields in {command:?}"
        )));
    }
    Ok(out)
}

/// A decoded controller acknowledgement.
///
/// The controller's reply carries no information the loop acts on; it is
/// decoded only so that a garbled reply is observable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack(pub String);

/// Decode the controller's reply to a command.
///
/// # Errors
///
/// Returns [`OwlError::MalformedResponse`] when the reply is empty (after
/// trimming whitespace and NULs) or is not valid UTF-8.
pub fn decode_ack(reply: &[u8]) -> Result<Ack, OwlError> {
    let text = std::str::from_utf8(reply)
        .map_err(|e| OwlError::MalformedResponse(format!("reply is not UTF-8: {e}")))?;
    let text = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
    if text.is_empty() {
        return Err(OwlError::MalformedResponse("empty reply".to_string()));
    }
    Ok(Ack(text.to_string()))
}
