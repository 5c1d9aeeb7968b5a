use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: u32 = 1;

/// Largest payload a single UDP datagram can carry.
pub const MAX_DATAGRAM_BYTES: usize = 65_507;

pub const SESSION_DIR_NAME: &str = "session";
pub const CREDENTIAL_FILE_NAME: &str = "creds.json";
pub const CREDENTIAL_EXTENSION: &str = "json";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Connect {
        client_version: u32,
        operator_id: u64,
    },
    Heartbeat,
    Event {
        event: ChatEvent,
    },
    Disconnect,

    Connected {
        operator_id: u64,
    },
    Reply {
        reply: Reply,
    },
    Disconnected {
        reason: String,
    },
}

/// A discrete inbound event from the chat transport.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    Text {
        text: String,
    },
    FileUpload {
        file_name: String,
        size_bytes: u64,
        content: UploadContent,
    },
    ButtonPress {
        action: ButtonAction,
    },
}

impl ChatEvent {
    pub fn text(text: impl Into<String>) -> Self {
        ChatEvent::Text { text: text.into() }
    }

    pub fn inline_file(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        ChatEvent::FileUpload {
            file_name: file_name.into(),
            size_bytes: bytes.len() as u64,
            content: UploadContent::Inline(bytes),
        }
    }

    pub fn press(action: ButtonAction) -> Self {
        ChatEvent::ButtonPress { action }
    }
}

/// Uploaded bytes either travel with the event or must be fetched from the transport.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum UploadContent {
    Inline(Vec<u8>),
    Remote(String),
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonAction {
    EnterUploadMode,
    Finalize,
    Cancel,
    RestartYes,
    RestartNo,
    Status,
    ListServers,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub action: ButtonAction,
}

impl Button {
    pub fn new(label: impl Into<String>, action: ButtonAction) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }
}

/// Outbound message: text plus an optional button set.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub buttons: Vec<Button>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            buttons: Vec::new(),
        }
    }

    pub fn with_buttons(text: impl Into<String>, buttons: Vec<Button>) -> Self {
        Self {
            text: text.into(),
            buttons,
        }
    }
}

pub fn encode_packet(packet: &Packet) -> Result<Vec<u8>, bincode::Error> {
    bincode::serialize(packet)
}

pub fn decode_packet(bytes: &[u8]) -> Result<Packet, bincode::Error> {
    bincode::deserialize(bytes)
}
