//! `OffsetCommit` request/response: persists a consumer group's per-partition
//! progress to the broker-side `__consumer_offsets` log.

use std::io::{Read, Write};

use crate::protocol::api_key::ApiKey;
use crate::protocol::error::Error as ApiError;
use crate::protocol::primitives::{read_array, write_array};
use crate::protocol::traits::{ReadError, ReadType, WriteError, WriteType};

pub const API_KEY_OFFSET_COMMIT: ApiKey = ApiKey::OffsetCommit;
pub const API_VERSION_OFFSET_COMMIT: i16 = 0;

#[derive(Debug, Clone)]
pub struct PartitionCommit {
    pub partition_index: i32,

    /// The message offset to be committed.
    pub committed_offset: i64,

    /// Any associated metadata the client wants to keep.
    pub committed_metadata: Option<String>,
}

impl<W: Write> WriteType<W> for PartitionCommit {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.partition_index.write(writer)?;
        self.committed_offset.write(writer)?;
        self.committed_metadata.write(writer)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct TopicCommit {
    pub name: String,
    pub partitions: Vec<PartitionCommit>,
}

impl<W: Write> WriteType<W> for TopicCommit {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.name.write(writer)?;
        write_array(&self.partitions, writer)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct OffsetCommitRequest {
    /// The unique group identifier.
    pub group_id: String,

    /// The generation of the group.
    pub generation_id: i32,

    /// The member ID assigned by the group coordinator.
    pub member_id: String,

    /// The topics to commit offsets for.
    pub topics: Vec<TopicCommit>,
}

impl<W: Write> WriteType<W> for OffsetCommitRequest {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.group_id.write(writer)?;
        self.generation_id.write(writer)?;
        self.member_id.write(writer)?;
        write_array(&self.topics, writer)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionCommitResult {
    pub partition_index: i32,
    pub error: Option<ApiError>,
}

impl<R: Read> ReadType<R> for PartitionCommitResult {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Self {
            partition_index: i32::read(reader)?,
            error: Option::<ApiError>::read(reader)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicCommitResult {
    pub name: String,
    pub partitions: Vec<PartitionCommitResult>,
}

impl<R: Read> ReadType<R> for TopicCommitResult {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Self {
            name: String::read(reader)?,
            partitions: read_array(reader)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetCommitResponse {
    pub topics: Vec<TopicCommitResult>,
}

impl<R: Read> ReadType<R> for OffsetCommitResponse {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Self {
            topics: read_array(reader)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_request_shape() {
        let req = OffsetCommitRequest {
            group_id: "foobar".to_string(),
            generation_id: 0x1122,
            member_id: "cons".to_string(),
            topics: vec![TopicCommit {
                name: "topic".to_string(),
                partitions: vec![PartitionCommit {
                    partition_index: 0x5221,
                    committed_offset: 0xDEAD_BEEF,
                    committed_metadata: Some("metadata".into()),
                }],
            }],
        };

        let mut buf = Vec::new();
        req.write(&mut buf).unwrap();
        assert_eq!(
            buf,
            vec![
                0x00, 0x06, b'f', b'o', b'o', b'b', b'a', b'r', // group
                0x00, 0x00, 0x11, 0x22, // generation id
                0x00, 0x04, b'c', b'o', b'n', b's', // member id
                0x00, 0x00, 0x00, 0x01, // topics
                0x00, 0x05, b't', b'o', b'p', b'i', b'c', // topic name
                0x00, 0x00, 0x00, 0x01, // partitions
                0x00, 0x00, 0x52, 0x21, // partition index
                0x00, 0x00, 0x00, 0x00, 0xDE, 0xAD, 0xBE, 0xEF, // committed offset
                0x00, 0x08, b'm', b'e', b't', b'a', b'd', b'a', b't', b'a', // metadata
            ]
        );
    }

    #[test]
    fn test_response_roundtrip() {
        let mut buf = Vec::new();
        write_array(
            &[TopicCommitResult {
                name: "topic".to_string(),
                partitions: vec![PartitionCommitResult {
                    partition_index: 0,
                    error: None,
                }],
            }],
            &mut buf,
        )
        .unwrap();

        let resp = OffsetCommitResponse::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(resp.topics[0].name, "topic");
        assert_eq!(resp.topics[0].partitions[0].error, None);
    }

    #[test]
    fn test_response_with_error() {
        let mut buf = Vec::new();
        write_array(
            &[TopicCommitResult {
                name: "topic".to_string(),
                partitions: vec![PartitionCommitResult {
                    partition_index: 0,
                    error: Some(ApiError::OffsetMetadataTooLarge),
                }],
            }],
            &mut buf,
        )
        .unwrap();

        let resp = OffsetCommitResponse::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(
            resp.topics[0].partitions[0].error,
            Some(ApiError::OffsetMetadataTooLarge)
        );
    }
}
