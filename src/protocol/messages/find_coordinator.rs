//! `FindCoordinator` request/response: resolves the broker that owns a consumer
//! group's `__consumer_offsets` partition (the "group coordinator").

use std::io::{Read, Write};

use crate::protocol::api_key::ApiKey;
use crate::protocol::error::Error as ApiError;
use crate::protocol::traits::{ReadError, ReadType, WriteError, WriteType};

pub const API_KEY_FIND_COORDINATOR: ApiKey = ApiKey::FindCoordinator;
pub const API_VERSION_FIND_COORDINATOR: i16 = 0;

#[derive(Debug, Clone)]
pub struct FindCoordinatorRequest {
    /// The group (or transaction) id to resolve a coordinator for.
    pub key: String,
}

impl<W: Write> WriteType<W> for FindCoordinatorRequest {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.key.write(writer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindCoordinatorResponse {
    pub error: Option<ApiError>,
    pub node_id: i32,
    pub host: String,
    pub port: i32,
}

impl<R: Read> ReadType<R> for FindCoordinatorResponse {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Self {
            error: Option::<ApiError>::read(reader)?,
            node_id: i32::read(reader)?,
            host: String::read(reader)?,
            port: i32::read(reader)?,
        })
    }
}

impl<W: Write> WriteType<W> for FindCoordinatorResponse {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.error.write(writer)?;
        self.node_id.write(writer)?;
        self.host.write(writer)?;
        self.port.write(writer)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_request_shape() {
        let req = FindCoordinatorRequest {
            key: "my-group".to_string(),
        };
        let mut buf = Vec::new();
        req.write(&mut buf).unwrap();
        assert_eq!(&buf[0..2], &8i16.to_be_bytes());
    }

    #[test]
    fn test_response_roundtrip() {
        let resp = FindCoordinatorResponse {
            error: None,
            node_id: 3,
            host: "broker-3".to_string(),
            port: 9092,
        };
        let mut buf = Vec::new();
        resp.write(&mut buf).unwrap();
        let restored = FindCoordinatorResponse::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(restored, resp);
    }

    #[test]
    fn test_response_with_error() {
        use crate::protocol::error::Error;

        let resp = FindCoordinatorResponse {
            error: Some(Error::CoordinatorNotAvailable),
            node_id: -1,
            host: String::new(),
            port: -1,
        };
        let mut buf = Vec::new();
        resp.write(&mut buf).unwrap();
        let restored = FindCoordinatorResponse::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(restored.error, Some(Error::CoordinatorNotAvailable));
    }
}
