use serde::{Deserialize, Serialize};

use crate::daemon::storage::entities::{ActivityState, AggregateData, ExportEnvelope};

/// What the browser reports about the user. Anything but `active` means nobody is looking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PresenceState {
    Active,
    Idle,
    Locked,
}

impl PresenceState {
    pub fn is_present(&self) -> bool {
        matches!(self, PresenceState::Active)
    }
}

/// Messages the browser extension sends to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HostMessage {
    #[serde(rename_all = "camelCase")]
    TabActivated {
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        tab_id: Option<u32>,
    },
    #[serde(rename_all = "camelCase")]
    TabNavigated { tab_id: u32, url: String },
    #[serde(rename_all = "camelCase")]
    WindowFocusChanged {
        has_focus: bool,
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        tab_id: Option<u32>,
    },
    PresenceChanged { state: PresenceState },
    GetData,
    GetStatus,
    Export,
    /// The export is parsed once the message is dispatched, so a broken export gets an `error`
    /// reply instead of being skipped as an unknown message.
    Import { export: serde_json::Value },
    ClearAll,
}

impl HostMessage {
    pub fn name(&self) -> &'static str {
        match self {
            HostMessage::TabActivated { .. } => "tabActivated",
            HostMessage::TabNavigated { .. } => "tabNavigated",
            HostMessage::WindowFocusChanged { .. } => "windowFocusChanged",
            HostMessage::PresenceChanged { .. } => "presenceChanged",
            HostMessage::GetData => "getData",
            HostMessage::GetStatus => "getStatus",
            HostMessage::Export => "export",
            HostMessage::Import { .. } => "import",
            HostMessage::ClearAll => "clearAll",
        }
    }
}

/// Messages the host sends back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HostReply {
    #[serde(rename_all = "camelCase")]
    Hello {
        version: String,
        heartbeat_secs: u64,
        idle_detection_secs: u64,
    },
    Data { data: AggregateData },
    Status { state: ActivityState },
    Export { export: ExportEnvelope },
    Ack { operation: String },
    Error { operation: String, message: String },
}
