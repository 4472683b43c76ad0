//! The classic (pre-KIP-98) `MessageSet` / `Message` record format.
//!
//! ```text
//! MessageSet => [Offset MessageSize Message]
//!   Offset      => INT64
//!   MessageSize => INT32
//!
//! Message => Crc MagicByte Attributes [Timestamp] Key Value
//!   Crc        => INT32  (CRC32 over everything below it)
//!   MagicByte  => INT8   (0 or 1)
//!   Attributes => INT8   (low 3 bits: compression codec)
//!   Timestamp  => INT64  (only present when MagicByte == 1)
//!   Key        => NULLABLE_BYTES
//!   Value      => NULLABLE_BYTES
//! ```
//!
//! A compressed message's `Value` holds a nested, uncompressed `MessageSet`: decoding
//! a batch means decompressing the wrapper message's value and recursing.

use std::io::{Cursor, Read, Write};

use crc32fast::Hasher;

use super::traits::{ReadError, ReadType, WriteError, WriteType};

/// Compression codec applied to a batch of records.
///
/// Only the codecs this client actually speaks are represented; the wire format itself
/// has room for more (lz4, zstd) that this client neither produces nor asks a broker to
/// hand back uncompressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Snappy,
}

impl Compression {
    fn codec_bits(self) -> i8 {
        match self {
            Self::None => 0,
            Self::Gzip => 1,
            Self::Snappy => 2,
        }
    }

    fn from_attributes(attributes: i8) -> Result<Self, ReadError> {
        match attributes & 0x07 {
            0 => Ok(Self::None),
            1 => Ok(Self::Gzip),
            2 => Ok(Self::Snappy),
            other => Err(ReadError::Malformed(
                format!("unsupported compression codec in attributes byte: {other}").into(),
            )),
        }
    }
}

/// A single record within a [`MessageSet`], with the broker-assigned (or
/// locally-relative, pre-assignment) offset carried alongside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub offset: i64,
    pub timestamp: Option<i64>,
    pub key: Option<Vec<u8>>,
    pub value: Option<Vec<u8>>,
}

/// A sequence of records, the unit exchanged in produce and fetch requests.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessageSet(pub Vec<Record>);

impl MessageSet {
    /// Encodes this message set uncompressed, magic byte 1 (timestamps present).
    fn write_plain<W: Write>(&self, writer: &mut W) -> Result<(), WriteError> {
        for record in &self.0 {
            let mut body = Vec::new();
            encode_message(&mut body, 1, 0, record.timestamp, &record.key, &record.value)?;

            record.offset.write(writer)?;
            let len = i32::try_from(body.len()).map_err(WriteError::Overflow)?;
            len.write(writer)?;
            writer.write_all(&body)?;
        }
        Ok(())
    }

    /// Encodes this message set with `compression` applied: a single outer message
    /// (offset of the last record, magic 1) whose value is the uncompressed,
    /// concatenated inner message set.
    pub fn write_compressed<W: Write>(
        &self,
        writer: &mut W,
        compression: Compression,
    ) -> Result<(), WriteError> {
        if compression == Compression::None || self.0.is_empty() {
            return self.write_plain(writer);
        }

        let mut inner = Vec::new();
        self.write_plain(&mut inner)?;

        let compressed = compress(&inner, compression)?;
        let last_offset = self.0.last().map(|r| r.offset).unwrap_or(0);
        let timestamp = self.0.last().and_then(|r| r.timestamp);

        let mut body = Vec::new();
        encode_message(
            &mut body,
            1,
            compression.codec_bits(),
            timestamp,
            &None,
            &Some(compressed),
        )?;

        last_offset.write(writer)?;
        let len = i32::try_from(body.len()).map_err(WriteError::Overflow)?;
        len.write(writer)?;
        writer.write_all(&body)?;
        Ok(())
    }

    /// Decodes every record contained in `buf`, transparently expanding compressed
    /// wrapper messages. A truncated trailing message (the broker cut a batch off to
    /// respect a size limit) is treated as a clean end-of-input rather than an error,
    /// mirroring how brokers fill `FetchResponse::records`.
    pub fn decode(buf: &[u8]) -> Result<Self, ReadError> {
        let mut cursor = Cursor::new(buf);
        let mut records = Vec::new();
        read_into(&mut cursor, buf.len() as u64, &mut records)?;
        Ok(Self(records))
    }
}

fn read_into<R: Read>(
    reader: &mut R,
    limit: u64,
    out: &mut Vec<Record>,
) -> Result<(), ReadError>
where
    R: ReadPosition,
{
    loop {
        if reader.pos() >= limit {
            return Ok(());
        }

        let offset = match i64::read(reader) {
            Ok(v) => v,
            Err(ReadError::IO(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let message_size = match i32::read(reader) {
            Ok(v) => v,
            Err(ReadError::IO(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let message_size = usize::try_from(message_size)?;

        let mut body = vec![0u8; message_size];
        if reader.read_exact_checked(&mut body).is_err() {
            // Partial trailing message: the broker truncated the batch.
            return Ok(());
        }

        decode_message(offset, &body, out)?;
    }
}

trait ReadPosition: Read {
    fn pos(&self) -> u64;
    fn read_exact_checked(&mut self, buf: &mut [u8]) -> std::io::Result<()>;
}

impl<T: AsRef<[u8]>> ReadPosition for Cursor<T> {
    fn pos(&self) -> u64 {
        self.position()
    }

    fn read_exact_checked(&mut self, buf: &mut [u8]) -> std::io::Result<()> {
        self.read_exact(buf)
    }
}

fn decode_message(offset: i64, body: &[u8], out: &mut Vec<Record>) -> Result<(), ReadError> {
    let mut cursor = Cursor::new(body);

    let crc = i32::read(&mut cursor)?;
    let rest = &body[4..];
    let computed = crc32(rest);
    if computed != crc as u32 {
        return Err(ReadError::Malformed(
            format!("record CRC mismatch: expected {crc:#x}, computed {computed:#x}").into(),
        ));
    }

    let magic = i8::read(&mut cursor)?;
    let attributes = i8::read(&mut cursor)?;
    let timestamp = if magic >= 1 {
        Some(i64::read(&mut cursor)?)
    } else {
        None
    };
    let key = Option::<Vec<u8>>::read(&mut cursor)?;
    let value = Option::<Vec<u8>>::read(&mut cursor)?;

    let compression = Compression::from_attributes(attributes)?;
    if compression == Compression::None {
        out.push(Record {
            offset,
            timestamp,
            key,
            value,
        });
        return Ok(());
    }

    let payload = value.unwrap_or_default();
    let decompressed = decompress(&payload, compression)?;

    let mut inner = Vec::new();
    read_into(&mut Cursor::new(decompressed.as_slice()), decompressed.len() as u64, &mut inner)?;

    // The wrapper's `offset` is the absolute offset of its last inner message; every
    // other inner message only carries its offset relative to the start of this
    // (possibly nested) set. Rebase each one against the wrapper's absolute offset
    // before flattening into `out`.
    let last_relative = inner.last().map(|r| r.offset).unwrap_or(0);
    for mut record in inner {
        record.offset = offset - (last_relative - record.offset);
        out.push(record);
    }
    Ok(())
}

fn encode_message<W: Write>(
    writer: &mut W,
    magic: i8,
    attributes: i8,
    timestamp: Option<i64>,
    key: &Option<Vec<u8>>,
    value: &Option<Vec<u8>>,
) -> Result<(), WriteError> {
    let mut body = Vec::new();
    magic.write(&mut body)?;
    attributes.write(&mut body)?;
    if magic >= 1 {
        timestamp.unwrap_or(0).write(&mut body)?;
    }
    key.write(&mut body)?;
    value.write(&mut body)?;

    let crc = crc32(&body) as i32;
    crc.write(writer)?;
    writer.write_all(&body)?;
    Ok(())
}

fn crc32(buf: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(buf);
    hasher.finalize()
}

fn compress(buf: &[u8], compression: Compression) -> Result<Vec<u8>, WriteError> {
    match compression {
        Compression::None => Ok(buf.to_vec()),
        #[cfg(feature = "compression-gzip")]
        Compression::Gzip => {
            use std::io::Write as _;
            let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(buf)?;
            encoder.finish().map_err(WriteError::IO)
        }
        #[cfg(not(feature = "compression-gzip"))]
        Compression::Gzip => Err(WriteError::Malformed(
            "gzip compression requested but the `compression-gzip` feature is disabled".into(),
        )),
        #[cfg(feature = "compression-snappy")]
        Compression::Snappy => {
            let mut encoder = snap::raw::Encoder::new();
            encoder
                .compress_vec(buf)
                .map_err(|e| WriteError::Malformed(Box::new(e)))
        }
        #[cfg(not(feature = "compression-snappy"))]
        Compression::Snappy => Err(WriteError::Malformed(
            "snappy compression requested but the `compression-snappy` feature is disabled".into(),
        )),
    }
}

fn decompress(buf: &[u8], compression: Compression) -> Result<Vec<u8>, ReadError> {
    match compression {
        Compression::None => Ok(buf.to_vec()),
        #[cfg(feature = "compression-gzip")]
        Compression::Gzip => {
            let mut decoder = flate2::read::GzDecoder::new(buf);
            let mut out = Vec::new();
            decoder.read_to_end(&mut out)?;
            Ok(out)
        }
        #[cfg(not(feature = "compression-gzip"))]
        Compression::Gzip => Err(ReadError::Malformed(
            "received gzip-compressed batch but the `compression-gzip` feature is disabled".into(),
        )),
        #[cfg(feature = "compression-snappy")]
        Compression::Snappy => {
            let mut decoder = snap::raw::Decoder::new();
            decoder
                .decompress_vec(buf)
                .map_err(|e| ReadError::Malformed(Box::new(e)))
        }
        #[cfg(not(feature = "compression-snappy"))]
        Compression::Snappy => Err(ReadError::Malformed(
            "received snappy-compressed batch but the `compression-snappy` feature is disabled"
                .into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(offset: i64, key: Option<&str>, value: &str) -> Record {
        Record {
            offset,
            timestamp: Some(1_700_000_000_000),
            key: key.map(|k| k.as_bytes().to_vec()),
            value: Some(value.as_bytes().to_vec()),
        }
    }

    #[test]
    fn test_uncompressed_roundtrip() {
        let set = MessageSet(vec![
            record(0, Some("k1"), "v1"),
            record(1, None, "v2"),
        ]);

        let mut buf = Vec::new();
        set.write_compressed(&mut buf, Compression::None).unwrap();

        let decoded = MessageSet::decode(&buf).unwrap();
        assert_eq!(decoded, set);
    }

    #[test]
    fn test_truncated_trailing_message_is_not_an_error() {
        let set = MessageSet(vec![record(0, Some("k"), "v1"), record(1, Some("k"), "v2")]);
        let mut buf = Vec::new();
        set.write_compressed(&mut buf, Compression::None).unwrap();

        buf.truncate(buf.len() - 1);
        let decoded = MessageSet::decode(&buf).unwrap();
        assert_eq!(decoded.0.len(), 1);
    }

    #[test]
    fn test_corrupt_crc_is_rejected() {
        let set = MessageSet(vec![record(0, Some("k"), "v1")]);
        let mut buf = Vec::new();
        set.write_compressed(&mut buf, Compression::None).unwrap();

        let last = buf.len() - 1;
        buf[last] ^= 0xFF;

        let err = MessageSet::decode(&buf).unwrap_err();
        assert!(matches!(err, ReadError::Malformed(_)));
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn test_gzip_roundtrip() {
        let set = MessageSet(vec![record(0, Some("k1"), "v1"), record(1, None, "v2")]);

        let mut buf = Vec::new();
        set.write_compressed(&mut buf, Compression::Gzip).unwrap();

        let decoded = MessageSet::decode(&buf).unwrap();
        assert_eq!(decoded, set);
    }

    #[cfg(feature = "compression-snappy")]
    #[test]
    fn test_snappy_roundtrip() {
        let set = MessageSet(vec![record(0, Some("k1"), "v1"), record(1, None, "v2")]);

        let mut buf = Vec::new();
        set.write_compressed(&mut buf, Compression::Snappy).unwrap();

        let decoded = MessageSet::decode(&buf).unwrap();
        assert_eq!(decoded, set);
    }
}
