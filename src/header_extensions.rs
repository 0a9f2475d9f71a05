use anyhow::{bail, Result};
use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes};
use tracing::trace;
use ux::u4;

bitflags! {
    /// The RTP header extension forms (https://datatracker.ietf.org/doc/html/rfc8285#section-4)
    /// an extension can be read from or written with.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct HeaderExtensionFlags: u8 {
        const ONE_BYTE = 0b0000_0001;
        const TWO_BYTE = 0b0000_0010;
    }
}

// https://datatracker.ietf.org/doc/html/rfc8285#section-4.2
// One Byte Header
//
//    Each extension element MUST start with a byte containing an ID and a
//    length:
//
//        0
//        0 1 2 3 4 5 6 7
//       +-+-+-+-+-+-+-+-+
//       |  ID   |  len  |
//       +-+-+-+-+-+-+-+-+
//
//    The 4-bit ID is the local identifier of this element in the range
//    1-14 inclusive.  In the signaling section, this is referred to as the
//    valid range.
//
//    The local identifier value 15 is reserved for a future extension and
//    MUST NOT be used as an identifier.  If the ID value 15 is
//    encountered, its length field MUST be ignored, processing of the
//    entire extension MUST terminate at that point, and only the extension
//    elements present prior to the element with ID 15 SHOULD be
//    considered.
//
//    The 4-bit length is the number, minus one, of data bytes of this
//    header extension element following the one-byte header.  Therefore,
//    the value zero (0) in this field indicates that one byte of data
//    follows, and a value of 15 (the maximum) indicates element data of
//    16 bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneByteHeaderExtension {
    id: u4,
    data: Bytes,
}

impl OneByteHeaderExtension {
    pub const TYPE: u16 = 0xBEDE;
    pub const MAX_ID: u8 = 14;
    pub const MAX_DATA_LENGTH_BYTES: usize = 16;

    pub fn new(id: u4, data: Bytes) -> Self {
        Self { id, data }
    }

    pub fn type_matches(ext_type: u16) -> bool {
        ext_type == Self::TYPE
    }

    pub fn id(&self) -> u8 {
        u8::from(self.id)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Read a single one-byte header extension element.  `buf` should start at the id/len byte.  A
/// padding byte (id 0) is consumed and returned as an extension with id 0 and no data.
pub fn read_one_byte_header_extension(buf: &mut Bytes) -> Result<OneByteHeaderExtension> {
    if buf.is_empty() {
        bail!("Header extension buffer is empty");
    }
    let id = (buf[0] & 0xF0) >> 4;

    // Get the length of the entire extension (including the id/len byte)
    let length_bytes = match id {
        // Padding
        0 => 1,
        15 => bail!("Encountered reserved one-byte header extension id 15"),
        // 1 for the id/len byte, 1 because the length field is the number of data bytes minus 1
        _ => ((buf[0] & 0xF) + 2) as usize,
    };

    if buf.len() < length_bytes {
        bail!(
            "Header extension length was {length_bytes} but buffer only has {} bytes remaining",
            buf.len()
        );
    }
    let mut he_buffer = buf.split_to(length_bytes);
    he_buffer.advance(1);
    trace!(
        "read one-byte header extension id {id}, {} data bytes",
        he_buffer.len()
    );

    Ok(OneByteHeaderExtension::new(u4::new(id), he_buffer))
}

// https://datatracker.ietf.org/doc/html/rfc8285#section-4.3
// Two Byte Header
//
//    Each extension element starts with a byte containing an ID and a byte
//    containing a length:
//
//        0                   1
//        0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5
//       +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//       |       ID      |     length    |
//       +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
//    The 8-bit ID is the local identifier of this element in the range
//    1-255 inclusive.
//
//    The 8-bit length field is the length of extension data in bytes, not
//    including the ID and length fields.  The value zero (0) indicates
//    that there is no subsequent data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwoByteHeaderExtension {
    id: u8,
    data: Bytes,
}

impl TwoByteHeaderExtension {
    const TYPE_MASK: u16 = 0xFFF0;
    pub const TYPE: u16 = 0x1000;
    pub const MAX_DATA_LENGTH_BYTES: usize = 255;

    pub fn new(id: u8, data: Bytes) -> Self {
        Self { id, data }
    }

    pub fn type_matches(ext_type: u16) -> bool {
        (ext_type & Self::TYPE_MASK) == Self::TYPE
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// `buf` should start at the beginning of the header extension (the id)
pub fn read_two_byte_header_extension(buf: &mut Bytes) -> Result<TwoByteHeaderExtension> {
    if buf.is_empty() {
        bail!("Header extension buffer is empty");
    }
    let id = buf[0];
    if id == 0 {
        // Padding bytes have no length field
        buf.advance(1);
        return Ok(TwoByteHeaderExtension::new(0, Bytes::new()));
    }
    if buf.len() < 2 {
        bail!("Header extension buffer has no length field");
    }
    let data_length_bytes = buf[1] as usize;
    // The '2' accounts for the id and length field bytes before the actual data
    if buf.len() < 2 + data_length_bytes {
        bail!(
            "Header extension length was {data_length_bytes} but buffer only has {} bytes remaining",
            buf.len() - 2
        );
    }
    let mut he_buffer = buf.split_to(2 + data_length_bytes);
    he_buffer.advance(2);
    trace!("read two-byte header extension id {id}, {data_length_bytes} data bytes");

    Ok(TwoByteHeaderExtension::new(id, he_buffer))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SomeHeaderExtension {
    OneByteHeaderExtension(OneByteHeaderExtension),
    TwoByteHeaderExtension(TwoByteHeaderExtension),
}

impl SomeHeaderExtension {
    pub fn id(&self) -> u8 {
        match self {
            SomeHeaderExtension::OneByteHeaderExtension(e) => e.id(),
            SomeHeaderExtension::TwoByteHeaderExtension(e) => e.id(),
        }
    }

    pub fn data(&self) -> &[u8] {
        match self {
            SomeHeaderExtension::OneByteHeaderExtension(e) => e.data(),
            SomeHeaderExtension::TwoByteHeaderExtension(e) => e.data(),
        }
    }

    /// The form this extension was read in (or will be written with)
    pub fn flags(&self) -> HeaderExtensionFlags {
        match self {
            SomeHeaderExtension::OneByteHeaderExtension(_) => HeaderExtensionFlags::ONE_BYTE,
            SomeHeaderExtension::TwoByteHeaderExtension(_) => HeaderExtensionFlags::TWO_BYTE,
        }
    }

    /// The size of the whole element (header + data) in bytes
    pub fn size_bytes(&self) -> usize {
        match self {
            SomeHeaderExtension::OneByteHeaderExtension(e) => 1 + e.data.len(),
            SomeHeaderExtension::TwoByteHeaderExtension(e) => 2 + e.data.len(),
        }
    }
}

impl From<OneByteHeaderExtension> for SomeHeaderExtension {
    fn from(value: OneByteHeaderExtension) -> Self {
        SomeHeaderExtension::OneByteHeaderExtension(value)
    }
}

impl From<TwoByteHeaderExtension> for SomeHeaderExtension {
    fn from(value: TwoByteHeaderExtension) -> Self {
        SomeHeaderExtension::TwoByteHeaderExtension(value)
    }
}

/// Write the given extension element (its id/length header followed by its data) into `buf`.
pub fn write_header_extension<B: BufMut>(ext: &SomeHeaderExtension, buf: &mut B) -> Result<()> {
    if buf.remaining_mut() < ext.size_bytes() {
        bail!(
            "Header extension needs {} bytes but buffer only has {} bytes remaining",
            ext.size_bytes(),
            buf.remaining_mut()
        );
    }
    match ext {
        SomeHeaderExtension::OneByteHeaderExtension(e) => {
            // Id 0 is padding and 15 is reserved, neither can carry data
            if e.id() == 0 || e.id() > OneByteHeaderExtension::MAX_ID {
                bail!("Invalid one-byte header extension id {}", e.id());
            }
            let data_length = e.data.len();
            if data_length == 0 || data_length > OneByteHeaderExtension::MAX_DATA_LENGTH_BYTES {
                bail!("One-byte header extension data length {data_length} is out of range");
            }
            buf.put_u8((e.id() << 4) | (data_length - 1) as u8);
            buf.put_slice(&e.data);
        }
        SomeHeaderExtension::TwoByteHeaderExtension(e) => {
            if e.id == 0 {
                bail!("Invalid two-byte header extension id 0");
            }
            let data_length = e.data.len();
            if data_length > TwoByteHeaderExtension::MAX_DATA_LENGTH_BYTES {
                bail!("Two-byte header extension data length {data_length} is out of range");
            }
            buf.put_u8(e.id);
            buf.put_u8(data_length as u8);
            buf.put_slice(&e.data);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_byte_header_extension_parse() {
        #[rustfmt::skip]
        let mut buf = Bytes::from_static(&[
            0x10, 0xFF, 0x00, 0x00
        ]);

        let he = read_one_byte_header_extension(&mut buf).unwrap();
        assert_eq!(he.id(), 1);
        assert_eq!(he.data(), &[0xFF]);
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_one_byte_header_extension_padding() {
        let mut buf = Bytes::from_static(&[0x00, 0x10, 0xFF]);

        let he = read_one_byte_header_extension(&mut buf).unwrap();
        assert_eq!(he.id(), 0);
        assert!(he.data().is_empty());
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_one_byte_header_extension_reserved_id() {
        let mut buf = Bytes::from_static(&[0xF0, 0xFF]);

        assert!(read_one_byte_header_extension(&mut buf).is_err());
    }

    #[test]
    fn test_one_byte_header_extension_too_short() {
        // Length field says 2 data bytes, but only 1 follows
        let mut buf = Bytes::from_static(&[0x21, 0xDE]);

        assert!(read_one_byte_header_extension(&mut buf).is_err());
    }

    #[test]
    fn test_two_byte_header_extension_parse() {
        #[rustfmt::skip]
        let mut buf = Bytes::from_static(&[
            0x01, 0x01, 0xFF, 0x00, 0x00
        ]);
        let he = read_two_byte_header_extension(&mut buf).unwrap();
        assert_eq!(he.id(), 1);
        assert_eq!(he.data(), &[0xFF]);
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_two_byte_header_extension_too_short() {
        let mut buf = Bytes::from_static(&[0x07, 0x04, 0xDE, 0xAD]);

        assert!(read_two_byte_header_extension(&mut buf).is_err());
    }

    #[test]
    fn test_type_matches() {
        assert!(OneByteHeaderExtension::type_matches(0xBEDE));
        assert!(!OneByteHeaderExtension::type_matches(0x1000));
        assert!(TwoByteHeaderExtension::type_matches(0x1000));
        // The low 4 bits are 'appbits'
        assert!(TwoByteHeaderExtension::type_matches(0x100F));
        assert!(!TwoByteHeaderExtension::type_matches(0xBEDE));
    }

    #[test]
    fn test_write_one_byte_header_extension() {
        let ext: SomeHeaderExtension =
            OneByteHeaderExtension::new(u4::new(2), Bytes::from_static(&[0xDE, 0xAD])).into();
        let mut buf = Vec::new();

        write_header_extension(&ext, &mut buf).unwrap();
        assert_eq!(buf, vec![0x21, 0xDE, 0xAD]);
    }

    #[test]
    fn test_write_two_byte_header_extension() {
        let ext: SomeHeaderExtension =
            TwoByteHeaderExtension::new(7, Bytes::from_static(&[0xDE, 0xAD, 0xBE, 0xEF])).into();
        let mut buf = Vec::new();

        write_header_extension(&ext, &mut buf).unwrap();
        assert_eq!(buf, vec![0x07, 0x04, 0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn test_write_one_byte_header_extension_empty_data() {
        let ext: SomeHeaderExtension = OneByteHeaderExtension::new(u4::new(2), Bytes::new()).into();
        let mut buf = Vec::new();

        assert!(write_header_extension(&ext, &mut buf).is_err());
    }

    #[test]
    fn test_write_one_byte_header_extension_invalid_id() {
        for id in [0, 15] {
            let ext: SomeHeaderExtension =
                OneByteHeaderExtension::new(u4::new(id), Bytes::from_static(&[0x01])).into();
            let mut buf = Vec::new();

            assert!(write_header_extension(&ext, &mut buf).is_err(), "id {id}");
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn test_write_two_byte_header_extension_invalid_id() {
        let ext: SomeHeaderExtension =
            TwoByteHeaderExtension::new(0, Bytes::from_static(&[0x01])).into();
        let mut buf = Vec::new();

        assert!(write_header_extension(&ext, &mut buf).is_err());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_write_then_read_one_byte_header_extension() {
        let ext = OneByteHeaderExtension::new(u4::new(14), Bytes::from_static(&[0xDE, 0xAD]));
        let mut buf = Vec::new();
        write_header_extension(&ext.clone().into(), &mut buf).unwrap();

        let mut read_buf = Bytes::from(buf);
        let read_ext = read_one_byte_header_extension(&mut read_buf).unwrap();
        assert_eq!(read_ext, ext);
        assert!(read_buf.is_empty());
    }

    #[test]
    fn test_write_header_extension_buffer_too_small() {
        let ext: SomeHeaderExtension =
            TwoByteHeaderExtension::new(7, Bytes::from_static(&[0xDE, 0xAD])).into();
        let mut data = [0u8; 3];
        let mut buf = &mut data[..];

        assert!(write_header_extension(&ext, &mut buf).is_err());
    }
}
