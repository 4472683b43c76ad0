//! `LeaveGroup` request/response: a graceful departure notice so the
//! coordinator can trigger a rebalance immediately instead of waiting out the
//! session timeout.

use std::io::{Read, Write};

use crate::protocol::api_key::ApiKey;
use crate::protocol::error::Error as ApiError;
use crate::protocol::traits::{ReadError, ReadType, WriteError, WriteType};

pub const API_KEY_LEAVE_GROUP: ApiKey = ApiKey::LeaveGroup;
pub const API_VERSION_LEAVE_GROUP: i16 = 0;

#[derive(Debug, Clone)]
pub struct LeaveGroupRequest {
    pub group_id: String,
    pub member_id: String,
}

impl<W: Write> WriteType<W> for LeaveGroupRequest {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.group_id.write(writer)?;
        self.member_id.write(writer)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaveGroupResponse {
    pub error: Option<ApiError>,
}

impl<R: Read> ReadType<R> for LeaveGroupResponse {
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
        let req = LeaveGroupRequest {
            group_id: "foo".to_string(),
            member_id: "bar".to_string(),
        };

        let mut buf = Vec::new();
        req.write(&mut buf).unwrap();
        assert_eq!(
            buf,
            vec![0, 3, b'f', b'o', b'o', 0, 3, b'b', b'a', b'r']
        );
    }

    #[test]
    fn test_response_no_error() {
        let resp = LeaveGroupResponse::read(&mut Cursor::new([0x00, 0x00])).unwrap();
        assert_eq!(resp.error, None);
    }

    #[test]
    fn test_response_unknown_member() {
        let resp = LeaveGroupResponse::read(&mut Cursor::new([0, 25])).unwrap();
        assert_eq!(resp.error, Some(ApiError::UnknownMemberId));
    }
}
