//! Real-time upload and deletion events.

pub mod channel;
pub mod message;
pub mod registry;

pub use channel::{EventChannel, events_url};
pub use message::{
    BatchNotice, ChannelEvent, EventMessage, EventTag, FailureNotice, UploadComplete,
    UploadFailed, UploadProgress, UploadStart, UserDeleted, decode_frame,
};
pub use registry::{Listener, ListenerId, ListenerRegistry};
