//! Client-to-Mixer Audio Level Indication (https://tools.ietf.org/html/rfc6464) RTP header
//! extension.
//!
//! [`AudioLevelHeaderExtension`] negotiates the extension's `vad` attribute and converts between
//! [`AudioLevelMeta`] and the extension's one- or two-byte payload.  Carrying the extension block
//! inside an RTP packet is left to the packet layer; [`header_extensions`] only models single
//! extension elements.

pub mod audio_level;
pub mod error;
pub mod header_extensions;

pub use audio_level::{AudioLevelHeaderExtension, AudioLevelMeta};
pub use error::{AudioLevelError, AudioLevelResult};
pub use header_extensions::{HeaderExtensionFlags, SomeHeaderExtension};
