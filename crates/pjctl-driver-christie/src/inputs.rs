//! Input port tables and lookup.
//!
//! Each projector model exposes a fixed, ordered list of inputs. The list
//! order defines the 1-based ordinal used by control surfaces; the feedback
//! code is what the projector reports back in `(SIN!n)` / `(SIN+MAIN!n)`.

use pjctl_core::{PjError, PjResult};
use serde::Serialize;

/// Physical connector family of an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    /// HDMI.
    Hdmi,
    /// DisplayPort.
    DisplayPort,
    /// DVI.
    Dvi,
    /// SDI.
    Sdi,
    /// Option card or network stream (HDBaseT, Digital Link, slot cards).
    Streaming,
}

impl std::fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionKind::Hdmi => "HDMI",
            ConnectionKind::DisplayPort => "DisplayPort",
            ConnectionKind::Dvi => "DVI",
            ConnectionKind::Sdi => "SDI",
            ConnectionKind::Streaming => "Streaming",
        };
        f.write_str(s)
    }
}

/// Command that routes the projector to one input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SelectAction {
    /// Input command code (`SIN` or `SIN+MAIN`).
    pub code: &'static str,
    /// Value sent with the code.
    pub value: i32,
}

/// One input on a projector model. Immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InputPort {
    /// Stable routing key (`hdmiIn1`, `displayPortIn1`, ...).
    pub key: &'static str,
    /// Connector family.
    pub connection_kind: ConnectionKind,
    /// Value the projector reports when this input is active.
    pub feedback_match_code: i32,
    /// Label shown to operators.
    pub display_name: &'static str,
    /// Command that selects this input.
    pub select: SelectAction,
}

const fn port(
    key: &'static str,
    connection_kind: ConnectionKind,
    feedback_match_code: i32,
    display_name: &'static str,
    code: &'static str,
) -> InputPort {
    InputPort {
        key,
        connection_kind,
        feedback_match_code,
        display_name,
        select: SelectAction {
            code,
            value: feedback_match_code,
        },
    }
}

/// Inputs of the 4K7-HS, in ordinal order.
pub const CHRISTIE_4K7_HS_INPUTS: &[InputPort] = &[
    port("hdmiIn1", ConnectionKind::Hdmi, 3, "HDMI 1", "SIN+MAIN"),
    port("hdmiIn2", ConnectionKind::Hdmi, 4, "HDMI 2", "SIN+MAIN"),
    port("dviIn1", ConnectionKind::Dvi, 5, "DVI 1", "SIN+MAIN"),
    port("displayPortIn1", ConnectionKind::DisplayPort, 6, "Display Port 1", "SIN+MAIN"),
    port("hdmiIn4", ConnectionKind::Streaming, 13, "Slot 1", "SIN+MAIN"),
    port("hdmiIn5", ConnectionKind::Streaming, 14, "Slot 2", "SIN+MAIN"),
];

/// Inputs of the 4K25-RGB, in ordinal order.
pub const CHRISTIE_4K25_RGB_INPUTS: &[InputPort] = &[
    port("hdmiIn1", ConnectionKind::Hdmi, 1, "HDMI 1", "SIN"),
    port("hdmiIn2", ConnectionKind::Hdmi, 2, "HDMI 2", "SIN"),
    port("hdmiIn3", ConnectionKind::Streaming, 3, "HDBaseT", "SIN"),
    port("displayPortIn1", ConnectionKind::DisplayPort, 4, "Display Port 1", "SIN"),
    port("displayPortIn2", ConnectionKind::DisplayPort, 5, "Display Port 2", "SIN"),
    port("rgbIn1", ConnectionKind::Sdi, 6, "SDI 1", "SIN"),
    port("rgbIn2", ConnectionKind::Sdi, 7, "SDI 2", "SIN"),
    port("vgaIn1", ConnectionKind::Sdi, 8, "SDI 3", "SIN"),
    port("hdmiIn4", ConnectionKind::Sdi, 9, "SDI 4", "SIN"),
    port("hdmiIn5", ConnectionKind::Streaming, 10, "Digital Link 1", "SIN"),
    port("hdmiIn6", ConnectionKind::Streaming, 11, "Digital Link 2", "SIN"),
];

/// Ordered, read-only view over a model's inputs.
#[derive(Debug, Clone, Copy)]
pub struct InputPortRegistry {
    ports: &'static [InputPort],
}

impl InputPortRegistry {
    /// Wrap a static port table.
    pub const fn new(ports: &'static [InputPort]) -> Self {
        Self { ports }
    }

    /// Number of inputs.
    pub fn len(&self) -> usize {
        self.ports.len()
    }

    /// Whether the model has no inputs.
    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    /// Ports in ordinal order.
    pub fn iter(&self) -> impl Iterator<Item = &'static InputPort> {
        self.ports.iter()
    }

    /// Port at 1-based `ordinal`.
    pub fn by_ordinal(&self, ordinal: usize) -> PjResult<&'static InputPort> {
        ordinal
            .checked_sub(1)
            .and_then(|i| self.ports.get(i))
            .ok_or(PjError::InvalidInput {
                ordinal,
                count: self.ports.len(),
            })
    }

    /// Port reporting `code`, with its 1-based ordinal.
    pub fn by_feedback_code(&self, code: i32) -> Option<(usize, &'static InputPort)> {
        self.ports
            .iter()
            .enumerate()
            .find(|(_, p)| p.feedback_match_code == code)
            .map(|(i, p)| (i + 1, p))
    }

    /// Display names in ordinal order.
    pub fn names(&self) -> Vec<String> {
        self.ports.iter().map(|p| p.display_name.to_string()).collect()
    }
}
