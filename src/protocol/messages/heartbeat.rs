//! `Heartbeat` request/response: keeps a joined member alive between rebalances.
//! The coordinator expels any member it doesn't hear from within the group's
//! session timeout.

use std::io::{Read, Write};

use crate::protocol::api_key::ApiKey;
use crate::protocol::error::Error as ApiError;
use crate::protocol::traits::{ReadError, ReadType, WriteError, WriteType};

pub const API_KEY_HEARTBEAT: ApiKey = ApiKey::Heartbeat;
pub const API_VERSION_HEARTBEAT: i16 = 0;

#[derive(Debug, Clone)]
pub struct HeartbeatRequest {
    pub group_id: String,
    pub generation_id: i32,
    pub member_id: String,
}

impl<W: Write> WriteType<W> for HeartbeatRequest {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.group_id.write(writer)?;
        self.generation_id.write(writer)?;
        self.member_id.write(writer)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatResponse {
    pub error: Option<ApiError>,
}

impl<R: Read> ReadType<R> for HeartbeatResponse {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Self {
            error: Option::<ApiError>::read(reader)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_request_roundtrip() {
        let req = HeartbeatRequest {
            group_id: "foo".to_string(),
            generation_id: 1,
            member_id: "mid".to_string(),
        };

        let mut buf = Vec::new();
        req.write(&mut buf).unwrap();
        assert_eq!(
            buf,
            vec![
                0, 3, b'f', b'o', b'o', // group id
                0, 0, 0, 1, // generation id
                0, 3, b'm', b'i', b'd', // member id
            ]
        );
    }

    #[test]
    fn test_response_no_error() {
        let resp = HeartbeatResponse::read(&mut Cursor::new([0x00, 0x00])).unwrap();
        assert_eq!(resp.error, None);
    }

    #[test]
    fn test_response_rebalance_in_progress() {
        let resp = HeartbeatResponse::read(&mut Cursor::new([0, 27])).unwrap();
        assert_eq!(resp.error, Some(ApiError::RebalanceInProgress));
    }
}
