//! Backend record types.

mod draft;
mod email;
mod settings;

pub use draft::{ComposeReceipt, ComposeStatus, Draft, DraftAttachment};
pub use email::{
    AttachmentInfo, DecryptionStatus, DeliveryStatus, EmailRecord, EncryptionMode, MessageState,
};
pub use settings::{DEFAULT_KM_ENDPOINT, Health, KmStatus, Settings};
