//! Christie serial/TCP ASCII protocol.
//!
//! Outgoing:
//! - `(CODE)` bare verb
//! - `(CODEvalue)` set, e.g. `(PWR1)`, `(SIN+MAIN3)`
//! - `(CODE?)` query
//!
//! Incoming:
//! - `(CODE!value)` or `(CODE!value "data")`, e.g. `(PWR!001)`
//! - `Lamp Hours = hhhh:mm` free text on some models
//!
//! Responses are not correlated with requests. The projector reports state
//! whenever it likes and the driver applies whatever arrives.

use pjctl_core::{PjError, PjResult};
use regex::Regex;
use std::fmt::Display;
use std::sync::LazyLock;

/// Delimiter splitting the incoming stream into frames.
pub const FRAME_DELIMITER: &str = ")";

/// Label preceding the lamp-hours field.
pub const LAMP_HOURS_LABEL: &str = "Lamp Hours = ";

/// Width of the field following [`LAMP_HOURS_LABEL`].
const LAMP_HOURS_FIELD_WIDTH: usize = 5;

static RESPONSE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\((?<command>[^!]+)!(?<value>\d+)(?: "(?<data>.+?)")?"#)
        .expect("Invalid response regex")
});

/// `(CODE)`
pub fn format_verb(code: &str) -> String {
    format!("({})", code)
}

/// `(CODEvalue)`, no separator.
pub fn format_set(code: &str, value: impl Display) -> String {
    format!("({}{})", code, value)
}

/// `(CODE?)`
pub fn format_query(code: &str) -> String {
    format!("({}?)", code)
}

/// A general-shape response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    /// Command code, e.g. `PWR` or `SIN+MAIN`.
    pub command_code: String,
    /// Integer value after `!`.
    pub value: i32,
    /// Quoted payload, if present.
    pub payload: Option<String>,
}

/// A recognised response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// `(CODE!value["data"])`
    General(ParsedResponse),
    /// `Lamp Hours = hhhh:mm`
    LampHours(i32),
}

/// Parse one frame.
///
/// Returns `Ok(None)` for noise (echoes, prompts, anything that is neither
/// shape) and `Err(PjError::Parse)` when a frame has a recognised shape but
/// its number cannot be read. Either way the caller leaves state untouched.
pub fn parse_response(frame: &str) -> PjResult<Option<Response>> {
    if frame.is_empty() {
        return Ok(None);
    }

    if let Some(pos) = frame.find(LAMP_HOURS_LABEL) {
        return parse_lamp_hours(&frame[pos + LAMP_HOURS_LABEL.len()..]);
    }

    if !frame.contains('!') {
        return Ok(None);
    }

    let Some(caps) = RESPONSE_REGEX.captures(frame) else {
        return Ok(None);
    };

    let command_code = caps["command"].to_string();
    let value = caps["value"]
        .parse::<i32>()
        .map_err(|e| PjError::Parse(format!("{} value '{}': {}", command_code, &caps["value"], e)))?;
    let payload = caps.name("data").map(|m| m.as_str().to_string());

    Ok(Some(Response::General(ParsedResponse {
        command_code,
        value,
        payload,
    })))
}

fn parse_lamp_hours(rest: &str) -> PjResult<Option<Response>> {
    let field: String = rest.chars().take(LAMP_HOURS_FIELD_WIDTH).collect();
    if field.chars().count() < LAMP_HOURS_FIELD_WIDTH {
        return Err(PjError::Parse(format!("truncated lamp hours field '{}'", field)));
    }

    let Some((hours, _)) = field.split_once(':') else {
        return Ok(None);
    };

    hours
        .trim()
        .parse::<i32>()
        .map(|h| Some(Response::LampHours(h)))
        .map_err(|e| PjError::Parse(format!("lamp hours '{}': {}", hours, e)))
}
