//! `OffsetFetch` request/response: reads back a consumer group's last
//! committed offsets for a set of partitions.

use std::io::{Read, Write};

use crate::protocol::api_key::ApiKey;
use crate::protocol::error::Error as ApiError;
use crate::protocol::primitives::{read_array, write_array};
use crate::protocol::traits::{ReadError, ReadType, WriteError, WriteType};

pub const API_KEY_OFFSET_FETCH: ApiKey = ApiKey::OffsetFetch;
pub const API_VERSION_OFFSET_FETCH: i16 = 0;

#[derive(Debug, Clone)]
pub struct OffsetFetchRequestTopic {
    pub name: String,
    pub partition_indexes: Vec<i32>,
}

impl<W: Write> WriteType<W> for OffsetFetchRequestTopic {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.name.write(writer)?;
        write_array(&self.partition_indexes, writer)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct OffsetFetchRequest {
    /// The group to fetch offsets for.
    pub group_id: String,

    /// Each topic to fetch offsets for, or `None` to fetch offsets for every
    /// topic the group has committed against.
    pub topics: Option<Vec<OffsetFetchRequestTopic>>,
}

impl<W: Write> WriteType<W> for OffsetFetchRequest {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.group_id.write(writer)?;
        match &self.topics {
            Some(topics) => write_array(topics, writer),
            None => (-1i32).write(writer),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetFetchResponsePartition {
    pub partition_index: i32,
    pub committed_offset: i64,
    pub metadata: Option<String>,
    pub error: Option<ApiError>,
}

impl<R: Read> ReadType<R> for OffsetFetchResponsePartition {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Self {
            partition_index: i32::read(reader)?,
            committed_offset: i64::read(reader)?,
            metadata: Option::<String>::read(reader)?,
            error: Option::<ApiError>::read(reader)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetFetchResponseTopic {
    pub name: String,
    pub partitions: Vec<OffsetFetchResponsePartition>,
}

impl<R: Read> ReadType<R> for OffsetFetchResponseTopic {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Self {
            name: String::read(reader)?,
            partitions: read_array(reader)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetFetchResponse {
    pub topics: Vec<OffsetFetchResponseTopic>,
}

impl<R: Read> ReadType<R> for OffsetFetchResponse {
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
    fn test_request_all_topics() {
        let req = OffsetFetchRequest {
            group_id: "blah".to_string(),
            topics: None,
        };
        let mut buf = Vec::new();
        req.write(&mut buf).unwrap();
        assert_eq!(
            buf,
            vec![0x00, 0x04, b'b', b'l', b'a', b'h', 0xFF, 0xFF, 0xFF, 0xFF]
        );
    }

    #[test]
    fn test_request_one_partition() {
        let req = OffsetFetchRequest {
            group_id: "blah".to_string(),
            topics: Some(vec![OffsetFetchRequestTopic {
                name: "topicTheFirst".to_string(),
                partition_indexes: vec![0x4f4f_4f4f],
            }]),
        };
        let mut buf = Vec::new();
        req.write(&mut buf).unwrap();
        assert_eq!(
            buf,
            vec![
                0x00, 0x04, b'b', b'l', b'a', b'h', // group
                0x00, 0x00, 0x00, 0x01, // topics
                0x00, 0x0D, b't', b'o', b'p', b'i', b'c', b'T', b'h', b'e', b'F', b'i', b'r', b's',
                b't', // topic name
                0x00, 0x00, 0x00, 0x01, // partition indexes
                0x4F, 0x4F, 0x4F, 0x4F,
            ]
        );
    }

    #[test]
    fn test_response_roundtrip() {
        let mut buf = Vec::new();
        write_array(
            &[OffsetFetchResponseTopic {
                name: "topicTheFirst".to_string(),
                partitions: vec![OffsetFetchResponsePartition {
                    partition_index: 0x4f4f_4f4f,
                    committed_offset: 1,
                    metadata: None,
                    error: None,
                }],
            }],
            &mut buf,
        )
        .unwrap();

        let resp = OffsetFetchResponse::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(resp.topics[0].partitions[0].committed_offset, 1);
        assert_eq!(resp.topics[0].partitions[0].error, None);
    }

    #[test]
    fn test_response_with_error() {
        let mut buf = Vec::new();
        write_array(
            &[OffsetFetchResponseTopic {
                name: "topic".to_string(),
                partitions: vec![OffsetFetchResponsePartition {
                    partition_index: 0,
                    committed_offset: -1,
                    metadata: None,
                    error: Some(ApiError::UnknownTopicOrPartition),
                }],
            }],
            &mut buf,
        )
        .unwrap();

        let resp = OffsetFetchResponse::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(
            resp.topics[0].partitions[0].error,
            Some(ApiError::UnknownTopicOrPartition)
        );
    }
}
