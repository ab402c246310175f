use crate::error::{DutchDutchError, Result};
use crate::presets::PresetRegistry;
use crate::types::{source_label, XLR};
use serde::Serialize;
use serde_json::Value;

/// Gain reported for silence, in dB
pub const MIN_GAIN: f64 = -80.0;

/// Highest gain the driver will ever request, in dB
///
/// Volume sliders are easy to push to full scale by accident.
pub const GAIN_CEILING: f64 = -10.0;

/// Index of the display line holding "title\nartist\nalbum"
const DISPLAY_MEDIA_LINE: usize = 3;

/// Convert a gain in dB to a 0..1 volume level
pub fn level_from_gain(gain: f64) -> f64 {
    if gain >= 0.0 {
        return 1.0;
    }
    ((gain - MIN_GAIN) / -MIN_GAIN).clamp(0.0, 1.0)
}

/// Convert a 0..1 volume level to the gain to request, capped at [`GAIN_CEILING`]
pub fn gain_from_level(level: f64) -> f64 {
    let gain = -MIN_GAIN * level.clamp(0.0, 1.0) + MIN_GAIN;
    gain.min(GAIN_CEILING)
}

/// Typed view of the room, rebuilt from every network snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceState {
    pub streaming: bool,

    /// Raw input identifiers offered by the room
    pub input_modes: Vec<String>,

    pub selected_input: String,

    /// Selected XLR sub-input (`aes`, `analogLowGain`, `analogHighGain`)
    pub selected_xlr: String,

    /// Volume is controlled by an external analog source on the selected XLR input
    pub external_gain: bool,

    /// Gain in dB; `0` while external gain is active
    pub gain: f64,

    pub muted: Option<bool>,

    pub sleep: Option<bool>,

    /// Only present while streaming
    pub playing: Option<bool>,

    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub image_url: Option<String>,

    /// Raw id of the last selected preset
    pub last_selected_preset: Option<String>,

    /// Name of the last selected preset, if its id is known
    pub preset: Option<String>,
}

impl DeviceState {
    /// Volume level in 0..1; external gain reports full scale
    pub fn volume_level(&self) -> f64 {
        level_from_gain(self.gain)
    }

    /// Power state: on unless the room sleeps
    pub fn power(&self) -> Option<bool> {
        self.sleep.map(|sleep| !sleep)
    }

    /// Current source label
    pub fn source(&self) -> Option<&'static str> {
        if self.selected_input == XLR {
            source_label(&self.selected_xlr)
        } else {
            source_label(&self.selected_input)
        }
    }

    /// Sorted, distinct source labels for the room's inputs
    pub fn source_list(&self) -> Vec<&'static str> {
        let mut sources: Vec<&'static str> = self
            .input_modes
            .iter()
            .filter_map(|mode| source_label(mode))
            .collect();
        sources.sort_unstable();
        sources.dedup();
        sources
    }

    /// Title of the current stream, or the XLR sub-input when on XLR
    pub fn media_title(&self) -> Option<&str> {
        match &self.title {
            Some(title) => Some(title.as_str()),
            None if self.selected_input == XLR => Some(self.selected_xlr.as_str()),
            None => None,
        }
    }

    /// Transport options usable right now
    pub fn available_options(&self) -> Option<[&'static str; 4]> {
        self.streaming.then_some(["play", "pause", "previous", "next"])
    }
}

/// Rebuild the device state for `room` from a network snapshot
///
/// Returns `Ok(None)` when the snapshot has no entry for the room yet; the
/// caller keeps its previous state. Presets are recorded in `presets` only
/// when the whole room parses.
pub(crate) fn materialize(
    network: &Value,
    room: &str,
    presets: &mut PresetRegistry,
) -> Result<Option<DeviceState>> {
    let Some(data) = network
        .get("state")
        .and_then(|state| state.get(room))
        .and_then(|entry| entry.get("data"))
    else {
        tracing::debug!("No data for room {} in network snapshot", room);
        return Ok(None);
    };

    let mut state = parse_room(data)?;

    let reported = data
        .get("presets")
        .and_then(Value::as_object)
        .into_iter()
        .flatten()
        .filter_map(|(id, preset)| Some((id, preset.get("name")?.as_str()?)));
    for (id, name) in reported {
        presets.observe(id, name);
    }

    state.preset = state
        .last_selected_preset
        .as_deref()
        .and_then(|id| presets.name_for(id))
        .map(str::to_string);

    Ok(Some(state))
}

fn parse_room(data: &Value) -> Result<DeviceState> {
    let streaming = data
        .get("streaming")
        .and_then(Value::as_bool)
        .ok_or_else(|| DutchDutchError::missing("streaming"))?;

    let selected_input = required_str(data, "selectedInput")?;
    let selected_xlr = required_str(data, "selectedXLR")?;

    let input_modes: Vec<String> = data
        .get("inputModes")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();

    let external_gain = selected_input == XLR
        && data
            .get("preferences")
            .and_then(|prefs| prefs.get("gain"))
            .and_then(|gain| gain.get(selected_xlr.as_str()))
            .and_then(|input| input.get("external"))
            .and_then(Value::as_bool)
            .ok_or_else(|| DutchDutchError::missing("preferences.gain external flag"))?;

    let gain = if external_gain {
        0.0
    } else {
        data.pointer("/gain/global")
            .and_then(Value::as_f64)
            .ok_or_else(|| DutchDutchError::missing("gain.global"))?
    };

    let streaming_info = data.get("streamingInfo");
    let playing = streaming_info
        .filter(|_| streaming)
        .and_then(|info| info.get("is_playing"))
        .and_then(Value::as_bool);
    let image_url = streaming_info
        .filter(|_| streaming)
        .and_then(|info| info.pointer("/albumArt/url"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let media_line = streaming_info
        .and_then(|info| info.get("display"))
        .and_then(|display| display.get(DISPLAY_MEDIA_LINE))
        .and_then(Value::as_str);
    let media_field = |index: usize| {
        media_line
            .and_then(|line| line.split('\n').nth(index))
            .map(str::to_string)
    };

    Ok(DeviceState {
        streaming,
        input_modes,
        selected_input,
        selected_xlr,
        external_gain,
        gain,
        muted: data.pointer("/mute/global").and_then(Value::as_bool),
        sleep: data.get("sleep").and_then(Value::as_bool),
        playing,
        title: media_field(0),
        artist: media_field(1),
        album: media_field(2),
        image_url,
        last_selected_preset: data
            .get("lastSelectedPreset")
            .and_then(Value::as_str)
            .map(str::to_string),
        preset: None,
    })
}

fn required_str(data: &Value, key: &str) -> Result<String> {
    data.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| DutchDutchError::missing(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    fn room() -> Value {
        json!({
            "type": "room",
            "streaming": true,
            "inputModes": ["analogHighGain", "aes", "Spotify Connect", "Roon Ready", "AES Streamer"],
            "selectedInput": "Roon Ready",
            "selectedXLR": "aes",
            "preferences": { "gain": {
                "aes": { "external": false },
                "analogHighGain": { "external": true }
            }},
            "gain": { "global": -40.0 },
            "mute": { "global": false },
            "sleep": false,
            "presets": { "p1": { "name": "A" }, "p2": { "name": "B" } },
            "lastSelectedPreset": "p2",
            "streamingInfo": {
                "is_playing": true,
                "display": ["", "", "", "Song\nBand\nRecord"],
                "albumArt": { "url": "http://art/cover.jpg" }
            }
        })
    }

    fn snapshot(room_data: Value) -> Value {
        json!({ "state": { "room-1": { "data": room_data } } })
    }

    fn build(room_data: Value) -> (Result<Option<DeviceState>>, PresetRegistry) {
        let mut presets = PresetRegistry::new();
        let state = materialize(&snapshot(room_data), "room-1", &mut presets);
        (state, presets)
    }

    #[test]
    fn volume_law() {
        assert_eq!(level_from_gain(-80.0), 0.0);
        assert_eq!(level_from_gain(-40.0), 0.5);
        assert_eq!(level_from_gain(0.0), 1.0);
        assert_eq!(level_from_gain(3.0), 1.0);
        assert_eq!(level_from_gain(-90.0), 0.0);

        assert_eq!(gain_from_level(0.0), -80.0);
        assert_eq!(gain_from_level(0.5), -40.0);
        assert_eq!(gain_from_level(1.0), -10.0);
        assert_eq!(gain_from_level(0.9), -10.0);
    }

    #[test]
    fn materializes_streaming_room() {
        let (state, presets) = build(room());
        let state = state.unwrap().unwrap();

        assert!(state.streaming);
        assert!(!state.external_gain);
        assert_eq!(state.gain, -40.0);
        assert_eq!(state.volume_level(), 0.5);
        assert_eq!(state.muted, Some(false));
        assert_eq!(state.power(), Some(true));
        assert_eq!(state.playing, Some(true));
        assert_eq!(state.source(), Some("Roon Ready"));
        assert_eq!(state.source_list(), vec!["Roon Ready", "Spotify Connect", "XLR"]);
        assert_eq!(state.title.as_deref(), Some("Song"));
        assert_eq!(state.artist.as_deref(), Some("Band"));
        assert_eq!(state.album.as_deref(), Some("Record"));
        assert_eq!(state.image_url.as_deref(), Some("http://art/cover.jpg"));
        assert_eq!(state.preset.as_deref(), Some("B"));
        assert_eq!(state.available_options().map(|o| o.len()), Some(4));
        assert_eq!(presets.id_for("A"), Some("p1"));
    }

    #[test]
    fn external_gain_reports_full_scale() {
        let mut data = room();
        data["selectedInput"] = json!("XLR");
        data["selectedXLR"] = json!("analogHighGain");
        data["gain"]["global"] = json!(-70.0);
        let (state, _) = build(data);
        let state = state.unwrap().unwrap();

        assert!(state.external_gain);
        assert_eq!(state.gain, 0.0);
        assert_eq!(state.volume_level(), 1.0);
        assert_eq!(state.source(), Some("XLR"));
    }

    #[test]
    fn xlr_without_external_gain_reads_global_gain() {
        let mut data = room();
        data["selectedInput"] = json!("XLR");
        data["gain"]["global"] = json!(-20.0);
        let (state, _) = build(data);

        assert_eq!(state.unwrap().unwrap().volume_level(), 0.75);
    }

    #[test]
    fn xlr_names_are_looked_up_literally() {
        let mut data = room();
        data["selectedInput"] = json!("XLR");
        data["selectedXLR"] = json!("analog/~1");
        data["preferences"]["gain"]["analog/~1"] = json!({ "external": true });
        let (state, _) = build(data);

        assert!(state.unwrap().unwrap().external_gain);
    }

    #[test]
    fn missing_room_is_a_gap() {
        let mut presets = PresetRegistry::new();
        let state = materialize(&snapshot(room()), "other-room", &mut presets).unwrap();
        assert!(state.is_none());
        assert!(presets.is_empty());
    }

    #[test]
    fn missing_gain_is_a_protocol_error() {
        let mut data = room();
        data.as_object_mut().unwrap().remove("gain");
        let (state, presets) = build(data);

        assert_eq!(state.unwrap_err().kind(), ErrorKind::Protocol);
        assert!(presets.is_empty());
    }

    #[test]
    fn not_streaming_hides_playback() {
        let mut data = room();
        data["streaming"] = json!(false);
        let (state, _) = build(data);
        let state = state.unwrap().unwrap();

        assert_eq!(state.playing, None);
        assert_eq!(state.image_url, None);
        assert_eq!(state.available_options(), None);
    }

    #[test]
    fn unparseable_display_falls_back_to_xlr_title() {
        let mut data = room();
        data["selectedInput"] = json!("XLR");
        data["streamingInfo"]["display"] = json!(["only one line"]);
        let (state, _) = build(data);
        let state = state.unwrap().unwrap();

        assert_eq!(state.title, None);
        assert_eq!(state.artist, None);
        assert_eq!(state.media_title(), Some("aes"));
    }

    #[test]
    fn short_display_line_leaves_later_fields_unknown() {
        let mut data = room();
        data["streamingInfo"]["display"] = json!(["", "", "", "Just a title"]);
        let (state, _) = build(data);
        let state = state.unwrap().unwrap();

        assert_eq!(state.media_title(), Some("Just a title"));
        assert_eq!(state.artist, None);
        assert_eq!(state.album, None);
    }

    #[test]
    fn unknown_preset_id_resolves_to_none() {
        let mut data = room();
        data["lastSelectedPreset"] = json!("p9");
        let (state, _) = build(data);
        let state = state.unwrap().unwrap();

        assert_eq!(state.last_selected_preset.as_deref(), Some("p9"));
        assert_eq!(state.preset, None);
    }

    #[test]
    fn sleeping_room_is_off() {
        let mut data = room();
        data["sleep"] = json!(true);
        let (state, _) = build(data);
        assert_eq!(state.unwrap().unwrap().power(), Some(false));
    }
}
