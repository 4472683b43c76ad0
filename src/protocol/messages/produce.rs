//! `Produce` request/response: appends a batch of records to a partition's log.
//!
//! Absent from the retrieval corpus outright (the teacher repo is a
//! consume-and-administer client with no producer path), this is modeled after
//! the shape of [`super::fetch`] and [`super::metadata`] — the same
//! topic/partition nesting, the same per-partition error handling — with the
//! partition payload swapped for an encoded [`MessageSet`](crate::protocol::record::MessageSet).

use std::io::{Read, Write};

use crate::protocol::api_key::ApiKey;
use crate::protocol::error::Error as ApiError;
use crate::protocol::primitives::{read_array, write_array};
use crate::protocol::record::{Compression, MessageSet};
use crate::protocol::traits::{ReadError, ReadType, WriteError, WriteType};

pub const API_KEY_PRODUCE: ApiKey = ApiKey::Produce;
pub const API_VERSION_PRODUCE: i16 = 0;

/// `acks` values accepted by the broker's `Produce` handler.
pub const ACKS_NONE: i16 = 0;
pub const ACKS_LEADER: i16 = 1;
pub const ACKS_ALL: i16 = -1;

#[derive(Debug, Clone)]
pub struct ProduceRequestPartition {
    pub partition_index: i32,

    /// The encoded `MessageSet` to append, produced by
    /// [`MessageSet::write_plain`] or [`MessageSet::write_compressed`].
    pub records: Vec<u8>,
}

impl<W: Write> WriteType<W> for ProduceRequestPartition {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.partition_index.write(writer)?;
        self.records.write(writer)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ProduceRequestTopic {
    pub name: String,
    pub partitions: Vec<ProduceRequestPartition>,
}

impl<W: Write> WriteType<W> for ProduceRequestTopic {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.name.write(writer)?;
        write_array(&self.partitions, writer)?;
        Ok(())
    }
}

/// A produce request spanning one leader broker's share of one or more
/// topics' partitions, grouped by leader before this struct is built.
#[derive(Debug, Clone)]
pub struct ProduceRequest {
    /// `0` = fire and forget, `1` = wait for the leader, `-1` = wait for the
    /// full in-sync replica set.
    pub acks: i16,

    pub timeout_ms: i32,

    pub topics: Vec<ProduceRequestTopic>,
}

impl<W: Write> WriteType<W> for ProduceRequest {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.acks.write(writer)?;
        self.timeout_ms.write(writer)?;
        write_array(&self.topics, writer)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProduceResponsePartition {
    pub partition_index: i32,
    pub error: Option<ApiError>,

    /// The offset assigned to the first record in the batch, or `-1` if
    /// `acks == 0` and the broker never reports one.
    pub base_offset: i64,
}

impl<R: Read> ReadType<R> for ProduceResponsePartition {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Self {
            partition_index: i32::read(reader)?,
            error: Option::<ApiError>::read(reader)?,
            base_offset: i64::read(reader)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProduceResponseTopic {
    pub name: String,
    pub partitions: Vec<ProduceResponsePartition>,
}

impl<R: Read> ReadType<R> for ProduceResponseTopic {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Self {
            name: String::read(reader)?,
            partitions: read_array(reader)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProduceResponse {
    pub topics: Vec<ProduceResponseTopic>,
}

impl<R: Read> ReadType<R> for ProduceResponse {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Self {
            topics: read_array(reader)?,
        })
    }
}

impl ProduceRequestPartition {
    /// Encodes `records` with the given `compression` (the client-side offsets
    /// in the wire encoding are ignored by the broker, which assigns real
    /// offsets on append).
    pub fn from_message_set(
        partition_index: i32,
        records: &MessageSet,
        compression: Compression,
    ) -> Result<Self, WriteError> {
        let mut buf = Vec::new();
        records.write_compressed(&mut buf, compression)?;
        Ok(Self {
            partition_index,
            records: buf,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use crate::protocol::record::Record;

    use super::*;

    #[test]
    fn test_request_shape() {
        let req = ProduceRequest {
            acks: ACKS_ALL,
            timeout_ms: 1500,
            topics: vec![ProduceRequestTopic {
                name: "orders".to_string(),
                partitions: vec![ProduceRequestPartition {
                    partition_index: 0,
                    records: vec![1, 2, 3],
                }],
            }],
        };

        let mut buf = Vec::new();
        req.write(&mut buf).unwrap();
        assert_eq!(&buf[0..2], &(-1i16).to_be_bytes());
        assert_eq!(&buf[2..6], &1500i32.to_be_bytes());
    }

    #[test]
    fn test_partition_from_message_set() {
        let set = MessageSet(vec![Record {
            offset: 0,
            timestamp: None,
            key: None,
            value: Some(b"payload".to_vec()),
        }]);

        let partition =
            ProduceRequestPartition::from_message_set(3, &set, Compression::None).unwrap();
        assert_eq!(partition.partition_index, 3);

        let decoded = MessageSet::decode(&partition.records).unwrap();
        assert_eq!(decoded.0[0].value, Some(b"payload".to_vec()));
    }

    #[test]
    fn test_response_roundtrip() {
        let mut buf = Vec::new();
        write_array(
            &[ProduceResponseTopic {
                name: "orders".to_string(),
                partitions: vec![ProduceResponsePartition {
                    partition_index: 0,
                    error: None,
                    base_offset: 42,
                }],
            }],
            &mut buf,
        )
        .unwrap();

        let resp = ProduceResponse::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(resp.topics[0].partitions[0].base_offset, 42);
    }

    #[test]
    fn test_response_with_error() {
        let mut buf = Vec::new();
        write_array(
            &[ProduceResponseTopic {
                name: "orders".to_string(),
                partitions: vec![ProduceResponsePartition {
                    partition_index: 0,
                    error: Some(ApiError::NotLeaderForPartition),
                    base_offset: -1,
                }],
            }],
            &mut buf,
        )
        .unwrap();

        let resp = ProduceResponse::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(
            resp.topics[0].partitions[0].error,
            Some(ApiError::NotLeaderForPartition)
        );
    }
}
