//! Primitive wire types.
//!
//! This client speaks the classic (non-flexible) broker wire format: fixed-width
//! integers, `INT16`-length-prefixed strings, `INT32`-length-prefixed byte arrays, and
//! `INT32`-count-prefixed arrays. Negative lengths (`-1`) mark null values. There are no
//! varints, no tagged fields, and no compact encodings -- those only exist in the newer
//! flexible request versions that this client does not speak.
//!
//! # References
//! - <https://kafka.apache.org/protocol#protocol_types>

use std::io::{Read, Write};

use super::traits::{ReadError, ReadType, WriteError, WriteType};

impl<R: Read> ReadType<R> for bool {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let mut buf = [0u8; 1];
        reader.read_exact(&mut buf)?;
        Ok(buf[0] != 0)
    }
}

impl<W: Write> WriteType<W> for bool {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        writer.write_all(&[if *self { 1 } else { 0 }])?;
        Ok(())
    }
}

impl<R: Read> ReadType<R> for i8 {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let mut buf = [0u8; 1];
        reader.read_exact(&mut buf)?;
        Ok(i8::from_be_bytes(buf))
    }
}

impl<W: Write> WriteType<W> for i8 {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        writer.write_all(&self.to_be_bytes())?;
        Ok(())
    }
}

impl<R: Read> ReadType<R> for i16 {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let mut buf = [0u8; 2];
        reader.read_exact(&mut buf)?;
        Ok(i16::from_be_bytes(buf))
    }
}

impl<W: Write> WriteType<W> for i16 {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        writer.write_all(&self.to_be_bytes())?;
        Ok(())
    }
}

impl<R: Read> ReadType<R> for i32 {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf)?;
        Ok(i32::from_be_bytes(buf))
    }
}

impl<W: Write> WriteType<W> for i32 {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        writer.write_all(&self.to_be_bytes())?;
        Ok(())
    }
}

impl<R: Read> ReadType<R> for i64 {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let mut buf = [0u8; 8];
        reader.read_exact(&mut buf)?;
        Ok(i64::from_be_bytes(buf))
    }
}

impl<W: Write> WriteType<W> for i64 {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        writer.write_all(&self.to_be_bytes())?;
        Ok(())
    }
}

/// Represents a sequence of characters.
///
/// First the length N is given as an `INT16`. Then N bytes follow, the UTF-8 encoding of
/// the character sequence.
impl<R: Read> ReadType<R> for String {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let len = i16::read(reader)?;
        let len = usize::try_from(len).map_err(|e| {
            ReadError::Malformed(format!("negative length for string: {e}").into())
        })?;
        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf)?;
        String::from_utf8(buf).map_err(|e| ReadError::Malformed(Box::new(e)))
    }
}

impl<W: Write> WriteType<W> for String {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        let len = i16::try_from(self.len()).map_err(WriteError::Overflow)?;
        len.write(writer)?;
        writer.write_all(self.as_bytes())?;
        Ok(())
    }
}

/// A nullable string: length `-1` means `None`.
impl<R: Read> ReadType<R> for Option<String> {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let len = i16::read(reader)?;
        match len {
            l if l < -1 => Err(ReadError::Malformed(
                format!("invalid negative length for nullable string: {l}").into(),
            )),
            -1 => Ok(None),
            l => {
                let len = usize::try_from(l)?;
                let mut buf = vec![0u8; len];
                reader.read_exact(&mut buf)?;
                let s = String::from_utf8(buf).map_err(|e| ReadError::Malformed(Box::new(e)))?;
                Ok(Some(s))
            }
        }
    }
}

impl<W: Write> WriteType<W> for Option<String> {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        match self {
            Some(s) => s.write(writer),
            None => (-1i16).write(writer),
        }
    }
}

/// Non-nullable byte array: `INT32` length followed by the raw bytes.
impl<R: Read> ReadType<R> for Vec<u8> {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let len = i32::read(reader)?;
        if len < 0 {
            return Err(ReadError::Malformed(
                format!("invalid length for bytes: {len}").into(),
            ));
        }
        let len = usize::try_from(len)?;
        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf)?;
        Ok(buf)
    }
}

impl<W: Write> WriteType<W> for Vec<u8> {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        let len = i32::try_from(self.len()).map_err(WriteError::Overflow)?;
        len.write(writer)?;
        writer.write_all(self)?;
        Ok(())
    }
}

/// Nullable byte array: length `-1` means `None`.
impl<R: Read> ReadType<R> for Option<Vec<u8>> {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let len = i32::read(reader)?;
        match len {
            l if l < -1 => Err(ReadError::Malformed(
                format!("invalid negative length for nullable bytes: {l}").into(),
            )),
            -1 => Ok(None),
            l => {
                let len = usize::try_from(l)?;
                let mut buf = vec![0u8; len];
                reader.read_exact(&mut buf)?;
                Ok(Some(buf))
            }
        }
    }
}

impl<W: Write> WriteType<W> for Option<Vec<u8>> {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        match self {
            Some(buf) => buf.write(writer),
            None => (-1i32).write(writer),
        }
    }
}

impl<R: Read> ReadType<R> for Vec<String> {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        read_array(reader)
    }
}

impl<W: Write> WriteType<W> for Vec<String> {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        write_array(self, writer)
    }
}

impl<R: Read> ReadType<R> for Vec<i32> {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        read_array(reader)
    }
}

impl<W: Write> WriteType<W> for Vec<i32> {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        write_array(self, writer)
    }
}

impl<R: Read> ReadType<R> for Vec<i64> {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        read_array(reader)
    }
}

impl<W: Write> WriteType<W> for Vec<i64> {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        write_array(self, writer)
    }
}

/// Reads a sequence of `T`, prefixed by an `INT32` count. A count of `-1` is treated like
/// an empty array, mirroring how the wire format's "null array" is handled in practice by
/// every request this client issues.
pub fn read_array<R, T>(reader: &mut R) -> Result<Vec<T>, ReadError>
where
    R: Read,
    T: ReadType<R>,
{
    let len = i32::read(reader)?;
    if len <= 0 {
        return Ok(Vec::new());
    }
    let len = usize::try_from(len)?;
    let mut out = Vec::with_capacity(len.min(1 << 16));
    for _ in 0..len {
        out.push(T::read(reader)?);
    }
    Ok(out)
}

/// Writes a sequence of `T`, prefixed by an `INT32` count.
pub fn write_array<W, T>(items: &[T], writer: &mut W) -> Result<(), WriteError>
where
    W: Write,
    T: WriteType<W>,
{
    let len = i32::try_from(items.len()).map_err(WriteError::Overflow)?;
    len.write(writer)?;
    for item in items {
        item.write(writer)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use assert_matches::assert_matches;

    use super::*;

    fn roundtrip<T>(value: T)
    where
        T: for<'a> ReadType<Cursor<Vec<u8>>> + WriteType<Cursor<Vec<u8>>> + PartialEq + std::fmt::Debug,
    {
        let mut buf = Cursor::new(Vec::new());
        value.write(&mut buf).unwrap();
        buf.set_position(0);
        let restored = T::read(&mut buf).unwrap();
        assert_eq!(value, restored);
    }

    #[test]
    fn test_bool_roundtrip() {
        roundtrip(true);
        roundtrip(false);
    }

    #[test]
    fn test_bool_nonzero_is_true() {
        assert!(bool::read(&mut Cursor::new(vec![42])).unwrap());
    }

    #[test]
    fn test_integers_roundtrip() {
        roundtrip(7i8);
        roundtrip(-7i16);
        roundtrip(123_456i32);
        roundtrip(-123_456_789_012i64);
    }

    #[test]
    fn test_string_roundtrip() {
        roundtrip(String::from("a-topic-name"));
        roundtrip(String::new());
    }

    #[test]
    fn test_nullable_string_roundtrip() {
        roundtrip(Some(String::from("rack-id")));
        roundtrip(None::<String>);
    }

    #[test]
    fn test_nullable_string_rejects_bad_length() {
        let mut buf = Cursor::new(Vec::new());
        (-2i16).write(&mut buf).unwrap();
        buf.set_position(0);
        let err = Option::<String>::read(&mut buf).unwrap_err();
        assert_matches!(err, ReadError::Malformed(_));
    }

    #[test]
    fn test_bytes_roundtrip() {
        roundtrip(vec![1u8, 2, 3, 4]);
        roundtrip(Vec::<u8>::new());
    }

    #[test]
    fn test_nullable_bytes_roundtrip() {
        roundtrip(Some(vec![9u8, 8, 7]));
        roundtrip(None::<Vec<u8>>);
    }

    #[test]
    fn test_array_of_strings_roundtrip() {
        roundtrip(vec!["a".to_string(), "b".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_array_of_i32_roundtrip() {
        roundtrip(vec![1i32, 2, 3]);
    }

    #[test]
    fn test_null_array_reads_as_empty() {
        let mut buf = Cursor::new(Vec::new());
        (-1i32).write(&mut buf).unwrap();
        buf.set_position(0);
        let restored: Vec<i32> = ReadType::read(&mut buf).unwrap();
        assert_eq!(restored, Vec::<i32>::new());
    }
}
