//
// https://tools.ietf.org/html/rfc6464#section-3
// Client-to-Mixer Audio Level Indication.  The payload fits in a single byte, so it can be held in
// either the one-byte or the two-byte header extension form (the latter gets a byte of padding).
//
//  0                   1
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |  ID   | len=0 |V| level       |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |      ID       |     len=2     |V| level       |    0 (pad)    |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+

use std::{fmt::Display, str::FromStr};

use bytes::Bytes;
use tracing::{debug, trace, warn};
use ux::{u4, u7};

use crate::{
    error::{AudioLevelError, AudioLevelResult},
    header_extensions::{
        HeaderExtensionFlags, OneByteHeaderExtension, SomeHeaderExtension, TwoByteHeaderExtension,
    },
};

const AUDIO_LEVEL_MASK: u8 = 0x7F;
const VAD_MASK: u8 = 0x80;

pub const VAD_ON: &str = "vad=on";
pub const VAD_OFF: &str = "vad=off";

/// The audio level of a single frame, as produced by an upstream level computation or as
/// recovered from a received header extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AudioLevelMeta {
    /// The level in -dBov: 0 is the loudest and 127 is digital silence.  Values above 127 are
    /// cropped to 127 when written.
    pub level: u8,
    pub voice_activity: bool,
}

impl AudioLevelMeta {
    pub fn new(level: u8, voice_activity: bool) -> Self {
        Self {
            level,
            voice_activity,
        }
    }

    pub fn is_muted(&self) -> bool {
        self.level >= u8::from(u7::MAX)
    }

    fn wire_level(&self) -> u7 {
        u7::new(self.level.min(u8::from(u7::MAX)))
    }
}

/// Codec for the `urn:ietf:params:rtp-hdrext:ssrc-audio-level` header extension.
///
/// The only state is whether VAD signaling was negotiated for the session.  It only affects the
/// advertised attribute: the V bit is written and read the same way either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioLevelHeaderExtension {
    vad_enabled: bool,
}

impl Default for AudioLevelHeaderExtension {
    fn default() -> Self {
        Self { vad_enabled: true }
    }
}

impl AudioLevelHeaderExtension {
    pub const URI: &'static str = "urn:ietf:params:rtp-hdrext:ssrc-audio-level";
    pub const MAX_SIZE_BYTES: usize = 2;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn supported_flags(&self) -> HeaderExtensionFlags {
        HeaderExtensionFlags::ONE_BYTE | HeaderExtensionFlags::TWO_BYTE
    }

    /// The most bytes [`AudioLevelHeaderExtension::write`] will ever need, regardless of input
    pub fn max_size(&self) -> usize {
        Self::MAX_SIZE_BYTES
    }

    pub fn vad_enabled(&self) -> bool {
        self.vad_enabled
    }

    /// Apply the extension attribute negotiated for this session (e.g. from an `a=extmap` line).
    /// Returns whether the VAD setting changed.
    pub fn set_attributes(&mut self, attributes: &str) -> AudioLevelResult<bool> {
        let vad = match attributes {
            VAD_ON | "" => true,
            VAD_OFF => false,
            _ => {
                warn!("Invalid attribute: {attributes}");
                return Err(AudioLevelError::InvalidAttribute(attributes.to_owned()));
            }
        };
        Ok(self.set_vad(vad))
    }

    fn set_vad(&mut self, vad: bool) -> bool {
        if self.vad_enabled == vad {
            return false;
        }
        debug!("vad: {vad}");
        self.vad_enabled = vad;
        true
    }

    /// The attribute to advertise for the current state
    pub fn attributes(&self) -> &'static str {
        if self.vad_enabled {
            VAD_ON
        } else {
            VAD_OFF
        }
    }

    fn check_flags(&self, flags: HeaderExtensionFlags) -> AudioLevelResult<()> {
        if !flags.intersects(self.supported_flags()) {
            return Err(AudioLevelError::InvalidArgument(format!(
                "unsupported header extension flags {flags:?}"
            )));
        }
        Ok(())
    }

    /// Write the extension payload for `meta` into `data`, returning the number of bytes written.
    /// When there's no meta nothing is written and 0 is returned: the extension should be left off
    /// of this packet.
    pub fn write(
        &self,
        meta: Option<&AudioLevelMeta>,
        flags: HeaderExtensionFlags,
        data: &mut [u8],
    ) -> AudioLevelResult<usize> {
        if data.len() < self.max_size() {
            return Err(AudioLevelError::InvalidArgument(format!(
                "buffer has {} bytes but {} are required",
                data.len(),
                self.max_size()
            )));
        }
        self.check_flags(flags)?;

        let Some(meta) = meta else {
            trace!("no meta");
            return Ok(0);
        };
        if meta.level > u8::from(u7::MAX) {
            trace!(
                "level from meta is higher than 127: {}, cropping",
                meta.level
            );
        }
        trace!(
            "writing ext (level: {} voice: {})",
            meta.level,
            meta.voice_activity
        );

        // Both forms use the same format, the second byte being padding
        data[0] = u8::from(meta.wire_level()) | if meta.voice_activity { VAD_MASK } else { 0 };
        if flags.contains(HeaderExtensionFlags::ONE_BYTE) {
            return Ok(1);
        }
        data[1] = 0;
        Ok(2)
    }

    /// Read the extension payload in `data`.  Only the first byte is looked at; a second byte (in
    /// the two-byte form) is padding.
    pub fn read(
        &self,
        flags: HeaderExtensionFlags,
        data: &[u8],
    ) -> AudioLevelResult<AudioLevelMeta> {
        self.check_flags(flags)?;
        let Some(&value) = data.first() else {
            return Err(AudioLevelError::InvalidArgument(
                "audio level extension data is empty".to_owned(),
            ));
        };

        let level = value & AUDIO_LEVEL_MASK;
        let voice_activity = value & VAD_MASK != 0;
        trace!("reading ext (level: {level} voice: {voice_activity})");

        Ok(AudioLevelMeta::new(level, voice_activity))
    }

    /// Build the header extension element with the given local `id` for `meta`, in the form
    /// described by `flags`.  Returns `None` if there's no meta.
    pub fn write_extension(
        &self,
        id: u8,
        meta: Option<&AudioLevelMeta>,
        flags: HeaderExtensionFlags,
    ) -> AudioLevelResult<Option<SomeHeaderExtension>> {
        let one_byte = flags.contains(HeaderExtensionFlags::ONE_BYTE);
        if id == 0 || (one_byte && id > OneByteHeaderExtension::MAX_ID) {
            return Err(AudioLevelError::InvalidArgument(format!(
                "invalid {} header extension id {id}",
                if one_byte { "one-byte" } else { "two-byte" }
            )));
        }

        let mut data = [0u8; Self::MAX_SIZE_BYTES];
        let length = self.write(meta, flags, &mut data)?;
        if length == 0 {
            return Ok(None);
        }
        let payload = Bytes::copy_from_slice(&data[..length]);

        let ext = if one_byte {
            OneByteHeaderExtension::new(u4::new(id), payload).into()
        } else {
            TwoByteHeaderExtension::new(id, payload).into()
        };
        Ok(Some(ext))
    }

    /// Read the audio level carried by a received header extension element
    pub fn read_extension(&self, ext: &SomeHeaderExtension) -> AudioLevelResult<AudioLevelMeta> {
        self.read(ext.flags(), ext.data())
    }
}

impl Display for AudioLevelHeaderExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.attributes())
    }
}

impl FromStr for AudioLevelHeaderExtension {
    type Err = AudioLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut ext = Self::default();
        ext.set_attributes(s)?;
        Ok(ext)
    }
}
