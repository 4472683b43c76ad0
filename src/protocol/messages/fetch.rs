use std::io::{Read, Write};

use crate::protocol::api_key::ApiKey;
use crate::protocol::error::Error as ApiError;
use crate::protocol::primitives::{read_array, write_array};
use crate::protocol::record::MessageSet;
use crate::protocol::traits::{ReadError, ReadType, WriteError, WriteType};

pub const API_KEY_FETCH: ApiKey = ApiKey::Fetch;
pub const API_VERSION_FETCH: i16 = 0;

#[derive(Debug, Clone)]
pub struct FetchRequestPartition {
    pub partition: i32,
    pub fetch_offset: i64,
    pub partition_max_bytes: i32,
}

impl<W: Write> WriteType<W> for FetchRequestPartition {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.partition.write(writer)?;
        self.fetch_offset.write(writer)?;
        self.partition_max_bytes.write(writer)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct FetchRequestTopic {
    pub topic: String,
    pub partitions: Vec<FetchRequestPartition>,
}

impl<W: Write> WriteType<W> for FetchRequestTopic {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.topic.write(writer)?;
        write_array(&self.partitions, writer)?;
        Ok(())
    }
}

/// A fetch request spanning the leader's share of one or more topics'
/// partitions, grouped by leader broker before this struct is built.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Always `-1`: this client is never a replica, only a consumer.
    pub replica_id: i32,
    pub max_wait_ms: i32,
    pub min_bytes: i32,
    pub topics: Vec<FetchRequestTopic>,
}

impl<W: Write> WriteType<W> for FetchRequest {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.replica_id.write(writer)?;
        self.max_wait_ms.write(writer)?;
        self.min_bytes.write(writer)?;
        write_array(&self.topics, writer)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponsePartition {
    pub partition_index: i32,
    pub error: Option<ApiError>,
    pub high_watermark: i64,
    pub message_set_bytes: Vec<u8>,
}

impl FetchResponsePartition {
    /// Decodes the raw `message_set_bytes` into individual records, transparently
    /// expanding any compressed wrapper message.
    pub fn decode_records(&self) -> Result<MessageSet, ReadError> {
        MessageSet::decode(&self.message_set_bytes)
    }
}

impl<R: Read> ReadType<R> for FetchResponsePartition {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Self {
            partition_index: i32::read(reader)?,
            error: Option::<ApiError>::read(reader)?,
            high_watermark: i64::read(reader)?,
            message_set_bytes: Option::<Vec<u8>>::read(reader)?.unwrap_or_default(),
        })
    }
}

impl<W: Write> WriteType<W> for FetchResponsePartition {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.partition_index.write(writer)?;
        self.error.write(writer)?;
        self.high_watermark.write(writer)?;
        Some(self.message_set_bytes.clone()).write(writer)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponseTopic {
    pub topic: String,
    pub partitions: Vec<FetchResponsePartition>,
}

impl<R: Read> ReadType<R> for FetchResponseTopic {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Self {
            topic: String::read(reader)?,
            partitions: read_array(reader)?,
        })
    }
}

impl<W: Write> WriteType<W> for FetchResponseTopic {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.topic.write(writer)?;
        write_array(&self.partitions, writer)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub responses: Vec<FetchResponseTopic>,
}

impl<W: Write> WriteType<W> for FetchResponse {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        write_array(&self.responses, writer)
    }
}

impl<R: Read> ReadType<R> for FetchResponse {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Self {
            responses: read_array(reader)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_request_roundtrip_shape() {
        let req = FetchRequest {
            replica_id: -1,
            max_wait_ms: 500,
            min_bytes: 1,
            topics: vec![FetchRequestTopic {
                topic: "orders".to_string(),
                partitions: vec![FetchRequestPartition {
                    partition: 0,
                    fetch_offset: 42,
                    partition_max_bytes: 1_048_576,
                }],
            }],
        };

        let mut buf = Vec::new();
        req.write(&mut buf).unwrap();
        assert_eq!(&buf[0..4], &(-1i32).to_be_bytes());
        assert_eq!(&buf[4..8], &500i32.to_be_bytes());
        assert_eq!(&buf[8..12], &1i32.to_be_bytes());
    }

    #[test]
    fn test_response_roundtrip() {
        let resp = FetchResponse {
            responses: vec![FetchResponseTopic {
                topic: "orders".to_string(),
                partitions: vec![FetchResponsePartition {
                    partition_index: 0,
                    error: None,
                    high_watermark: 100,
                    message_set_bytes: vec![],
                }],
            }],
        };

        let mut buf = Vec::new();
        resp.write(&mut buf).unwrap();

        let restored = FetchResponse::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(restored, resp);
    }
}
