use serde::Serialize;

/// Model reported for every pairing; the driver only speaks to 8c speakers
pub const MODEL: &str = "8c";

/// Suggested step for volume sliders, on the 0..1 level scale
pub const VOLUME_STEP: f64 = 0.02;

/// Streaming inputs that can be selected by name; anything else selects XLR
pub const VALID_STREAMERS: [&str; 2] = ["Spotify Connect", "Roon Ready"];

/// External label shared by all XLR sub-inputs
pub const XLR: &str = "XLR";

/// Raw input identifiers and the source label they are exposed as
const INPUT_TO_SOURCE: [(&str, &str); 5] = [
    ("analogHighGain", XLR),
    ("analogLowGain", XLR),
    ("aes", XLR),
    ("Spotify Connect", "Spotify Connect"),
    ("Roon Ready", "Roon Ready"),
];

/// Map a raw input identifier to its external source label
pub fn source_label(input: &str) -> Option<&'static str> {
    INPUT_TO_SOURCE
        .iter()
        .find(|(raw, _)| *raw == input)
        .map(|(_, label)| *label)
}

/// Input name to send when the user asks for a source
pub fn input_for_source(source: &str) -> &str {
    if VALID_STREAMERS.contains(&source) {
        source
    } else {
        XLR
    }
}

/// Identity of the pair, discovered from the master speaker
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceIdentity {
    /// Master name, used as the unique key of the pairing
    pub serial: String,
    /// Firmware version
    pub version: String,
}

/// Logical targets of the pair
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Targets {
    pub room: String,
    pub master: String,
    pub slave: Option<String>,
}

/// Transport command under the streaming control endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportAction {
    Play,
    Pause,
    Next,
    Previous,
}

impl TransportAction {
    /// Method name understood by the streaming API
    pub fn method(self) -> &'static str {
        match self {
            Self::Play => "Play",
            Self::Pause => "Pause",
            Self::Next => "Next",
            Self::Previous => "Previous",
        }
    }
}
