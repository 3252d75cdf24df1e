//! Event channel message types.
//!
//! Frames on the wire look like `{"user_id": 1, "type": "<tag>", "payload": {...}}`.
//! The server omits payload fields freely, so every field has a default.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FrameError;

/// Observer key: a message tag or a connection lifecycle event.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventTag {
    UploadStart,
    UploadProgress,
    UploadError,
    UploadComplete,
    UploadProcessingStart,
    UploadProcessingError,
    UploadProcessingComplete,
    DeleteSuccess,
    #[strum(to_string = "delete_error", serialize = "delete_exist_error")]
    #[serde(alias = "delete_exist_error")]
    DeleteError,
    DeleteUserSuccess,
    DeleteUserError,
    /// Connection established.
    Open,
    /// Connection closed, by either side or after a failure.
    Close,
    /// Transport-level failure.
    Error,
}

impl EventTag {
    /// All tags that can appear in a frame.
    pub const MESSAGE_TAGS: [EventTag; 11] = [
        Self::UploadStart,
        Self::UploadProgress,
        Self::UploadError,
        Self::UploadComplete,
        Self::UploadProcessingStart,
        Self::UploadProcessingError,
        Self::UploadProcessingComplete,
        Self::DeleteSuccess,
        Self::DeleteError,
        Self::DeleteUserSuccess,
        Self::DeleteUserError,
    ];

    /// Check if this tag is a connection lifecycle event rather than a message.
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, Self::Open | Self::Close | Self::Error)
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// Resolve a wire tag to a message tag.
    pub fn from_wire(tag: &str) -> Option<Self> {
        tag.parse::<Self>().ok().filter(|t| !t.is_lifecycle())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadStart {
    pub upload_id: String,
    pub file_name: String,
    pub file_size: u64,
}

/// Progress for one file, or for the whole batch when `upload_id` is `"total"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadProgress {
    pub upload_id: String,
    pub file_name: String,
    /// Percentage, 0-100.
    pub progress: u32,
    pub read: u64,
    pub total: u64,
}

impl UploadProgress {
    pub fn is_total(&self) -> bool {
        self.upload_id == "total"
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadFailed {
    pub upload_id: String,
    pub file_name: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadComplete {
    pub upload_id: String,
    pub file_name: String,
    pub file_url: String,
    pub thumbnail_url: String,
    pub image_id: i64,
}

/// Progress notice for a batch of files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchNotice {
    pub message: String,
    pub file_count: Option<u64>,
}

/// Failure notice carrying the server error code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FailureNotice {
    pub message: String,
    pub error: String,
    pub code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserDeleted {
    pub message: String,
    pub user_count: Option<u64>,
}

/// A decoded event frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventMessage {
    UploadStart(UploadStart),
    UploadProgress(UploadProgress),
    UploadError(UploadFailed),
    UploadComplete(UploadComplete),
    UploadProcessingStart(BatchNotice),
    UploadProcessingError(FailureNotice),
    UploadProcessingComplete(BatchNotice),
    DeleteSuccess(BatchNotice),
    DeleteError(FailureNotice),
    DeleteUserSuccess(UserDeleted),
    DeleteUserError(FailureNotice),
}

impl EventMessage {
    pub fn tag(&self) -> EventTag {
        match self {
            Self::UploadStart(_) => EventTag::UploadStart,
            Self::UploadProgress(_) => EventTag::UploadProgress,
            Self::UploadError(_) => EventTag::UploadError,
            Self::UploadComplete(_) => EventTag::UploadComplete,
            Self::UploadProcessingStart(_) => EventTag::UploadProcessingStart,
            Self::UploadProcessingError(_) => EventTag::UploadProcessingError,
            Self::UploadProcessingComplete(_) => EventTag::UploadProcessingComplete,
            Self::DeleteSuccess(_) => EventTag::DeleteSuccess,
            Self::DeleteError(_) => EventTag::DeleteError,
            Self::DeleteUserSuccess(_) => EventTag::DeleteUserSuccess,
            Self::DeleteUserError(_) => EventTag::DeleteUserError,
        }
    }
}

/// Everything delivered to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Open,
    Close { code: Option<u16>, reason: String },
    Error { message: String },
    Message(EventMessage),
}

impl ChannelEvent {
    pub fn tag(&self) -> EventTag {
        match self {
            Self::Open => EventTag::Open,
            Self::Close { .. } => EventTag::Close,
            Self::Error { .. } => EventTag::Error,
            Self::Message(message) => message.tag(),
        }
    }

    pub fn as_message(&self) -> Option<&EventMessage> {
        match self {
            Self::Message(message) => Some(message),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    tag: String,
    #[serde(default)]
    payload: Value,
}

fn payload<T: serde::de::DeserializeOwned + Default>(value: Value) -> Result<T, FrameError> {
    if value.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(value).map_err(|e| FrameError::decode(format!("payload: {}", e)))
}

/// Decode one text frame.
pub fn decode_frame(text: &str) -> Result<EventMessage, FrameError> {
    let raw: RawFrame = serde_json::from_str(text).map_err(|e| FrameError::decode(e.to_string()))?;
    let tag = EventTag::from_wire(&raw.tag).ok_or(FrameError::UnknownTag(raw.tag))?;

    let message = match tag {
        EventTag::UploadStart => EventMessage::UploadStart(payload(raw.payload)?),
        EventTag::UploadProgress => EventMessage::UploadProgress(payload(raw.payload)?),
        EventTag::UploadError => EventMessage::UploadError(payload(raw.payload)?),
        EventTag::UploadComplete => EventMessage::UploadComplete(payload(raw.payload)?),
        EventTag::UploadProcessingStart => {
            EventMessage::UploadProcessingStart(payload(raw.payload)?)
        }
        EventTag::UploadProcessingError => {
            EventMessage::UploadProcessingError(payload(raw.payload)?)
        }
        EventTag::UploadProcessingComplete => {
            EventMessage::UploadProcessingComplete(payload(raw.payload)?)
        }
        EventTag::DeleteSuccess => EventMessage::DeleteSuccess(payload(raw.payload)?),
        EventTag::DeleteError => EventMessage::DeleteError(payload(raw.payload)?),
        EventTag::DeleteUserSuccess => EventMessage::DeleteUserSuccess(payload(raw.payload)?),
        EventTag::DeleteUserError => EventMessage::DeleteUserError(payload(raw.payload)?),
        EventTag::Open | EventTag::Close | EventTag::Error => {
            return Err(FrameError::UnknownTag(tag.to_string()));
        }
    };
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_progress() {
        let message = decode_frame(
            r#"{"user_id":7,"type":"upload_progress","payload":{"upload_id":"total","file_name":"Total","progress":42,"read":420,"total":1000}}"#,
        )
        .unwrap();

        match message {
            EventMessage::UploadProgress(p) => {
                assert!(p.is_total());
                assert_eq!(p.progress, 42);
                assert_eq!(p.read, 420);
                assert_eq!(p.total, 1000);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_missing_payload_fields_default() {
        let message =
            decode_frame(r#"{"type":"delete_success","payload":{"message":"Images deleted successfully"}}"#)
                .unwrap();
        assert_eq!(
            message,
            EventMessage::DeleteSuccess(BatchNotice {
                message: "Images deleted successfully".to_string(),
                file_count: None,
            })
        );

        let message = decode_frame(r#"{"type":"delete_user_success"}"#).unwrap();
        assert_eq!(message.tag(), EventTag::DeleteUserSuccess);
    }

    #[test]
    fn test_delete_exist_error_alias() {
        let message = decode_frame(
            r#"{"type":"delete_exist_error","payload":{"message":"m","error":"e","code":"NOT_FOUND"}}"#,
        )
        .unwrap();
        assert_eq!(message.tag(), EventTag::DeleteError);
        assert_eq!(EventTag::DeleteError.as_str(), "delete_error");
    }

    #[test]
    fn test_unknown_and_lifecycle_tags_rejected() {
        assert!(matches!(
            decode_frame(r#"{"type":"album_shared","payload":{}}"#),
            Err(FrameError::UnknownTag(tag)) if tag == "album_shared"
        ));
        assert!(matches!(
            decode_frame(r#"{"type":"open","payload":{}}"#),
            Err(FrameError::UnknownTag(_))
        ));
    }

    #[test]
    fn test_malformed_frames() {
        assert!(matches!(decode_frame("not json"), Err(FrameError::Decode(_))));
        assert!(matches!(decode_frame(r#"{"payload":{}}"#), Err(FrameError::Decode(_))));
        assert!(matches!(
            decode_frame(r#"{"type":"upload_start","payload":{"file_size":"big"}}"#),
            Err(FrameError::Decode(_))
        ));
    }

    #[test]
    fn test_message_tags_round_trip_through_wire_names() {
        for tag in EventTag::MESSAGE_TAGS {
            assert_eq!(EventTag::from_wire(tag.as_str()), Some(tag));
        }
        assert_eq!(EventTag::from_wire("close"), None);
    }
}
