use crate::protocol::{Endpoint, Method, Request, TargetType};
use crate::types::TransportAction;
use serde_json::json;

/// Builds control requests addressed to one room target
pub(crate) struct RoomCommands<'a> {
    room: &'a str,
}

impl<'a> RoomCommands<'a> {
    pub(crate) fn new(room: &'a str) -> Self {
        Self { room }
    }

    fn request(&self, endpoint: Endpoint, method: Method) -> Request {
        Request::new(endpoint, method).with_target(TargetType::Room, self.room)
    }

    // ========== Volume Control ==========

    /// Set the global room gain in dB
    pub(crate) fn set_gain(&self, gain: f64) -> Request {
        self.request(Endpoint::Gain, Method::Update)
            .with_data(json!({ "gain": gain }))
    }

    /// Set the global room mute state
    pub(crate) fn set_mute(&self, mute: bool) -> Request {
        self.request(Endpoint::Mute, Method::Update)
            .with_data(json!([{
                "mute": mute,
                "positionID": "global"
            }]))
    }

    // ========== Standby/Power Control ==========

    /// Enable or disable sleep
    pub(crate) fn set_sleep(&self, enable: bool) -> Request {
        self.request(Endpoint::Sleep, Method::Update)
            .with_data(json!({ "enable": enable }))
    }

    // ========== Input Selection ==========

    /// Select an input by its raw name
    pub(crate) fn set_input(&self, input: &str) -> Request {
        self.request(Endpoint::SelectedInput, Method::Update)
            .with_data(json!({ "input": input }))
    }

    /// Select a preset by id
    pub(crate) fn select_preset(&self, preset_id: &str) -> Request {
        self.request(Endpoint::Preset, Method::Select)
            .with_data(json!({ "presetID": preset_id }))
    }

    // ========== Streaming Transport ==========

    /// Play, pause or skip on the active streamer
    pub(crate) fn transport(&self, action: TransportAction) -> Request {
        self.request(Endpoint::StreamingApi, Method::Update)
            .with_data(json!({ "method": action.method(), "arguments": [] }))
    }
}
