use std::io::{Read, Write};

use crate::protocol::api_key::ApiKey;
use crate::protocol::traits::{ReadError, ReadType, WriteError, WriteType};

/// Every request on the wire is prefixed with this header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHeader {
    /// The API key of this request.
    pub request_api_key: ApiKey,

    /// The API version of this request.
    pub request_api_version: i16,

    /// The correlation ID of this request.
    pub correlation_id: i32,

    /// The client ID string.
    pub client_id: Option<String>,
}

impl<R: Read> ReadType<R> for RequestHeader {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Self {
            request_api_key: ApiKey::from(i16::read(reader)?),
            request_api_version: i16::read(reader)?,
            correlation_id: i32::read(reader)?,
            client_id: Option::<String>::read(reader)?,
        })
    }
}

impl<W: Write> WriteType<W> for RequestHeader {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        i16::from(self.request_api_key).write(writer)?;
        self.request_api_version.write(writer)?;
        self.correlation_id.write(writer)?;
        self.client_id.write(writer)?;
        Ok(())
    }
}

/// Every response is prefixed with the correlation ID of the request it answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub correlation_id: i32,
}

impl<R: Read> ReadType<R> for ResponseHeader {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Self {
            correlation_id: i32::read(reader)?,
        })
    }
}

impl<W: Write> WriteType<W> for ResponseHeader {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.correlation_id.write(writer)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_request_header_roundtrip() {
        let header = RequestHeader {
            request_api_key: ApiKey::Metadata,
            request_api_version: 0,
            correlation_id: 42,
            client_id: Some("logbroker-client".to_string()),
        };

        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();

        let restored = RequestHeader::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(header, restored);
    }

    #[test]
    fn test_request_header_null_client_id() {
        let header = RequestHeader {
            request_api_key: ApiKey::Fetch,
            request_api_version: 0,
            correlation_id: 7,
            client_id: None,
        };

        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        assert_eq!(&buf[8..10], &(-1i16).to_be_bytes());

        let restored = RequestHeader::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(header, restored);
    }

    #[test]
    fn test_response_header_roundtrip() {
        let header = ResponseHeader { correlation_id: 99 };
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        let restored = ResponseHeader::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(header, restored);
    }
}
