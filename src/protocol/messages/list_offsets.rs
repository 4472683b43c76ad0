//! `ListOffsets` request/response: resolves a symbolic timestamp (`-1` latest, `-2`
//! earliest) to a concrete offset for a partition.

use std::io::{Read, Write};

use crate::protocol::api_key::ApiKey;
use crate::protocol::error::Error as ApiError;
use crate::protocol::primitives::{read_array, write_array};
use crate::protocol::traits::{ReadError, ReadType, WriteError, WriteType};

pub const API_KEY_LIST_OFFSETS: ApiKey = ApiKey::ListOffsets;
pub const API_VERSION_LIST_OFFSETS: i16 = 0;

/// Well-known special timestamps, per [KIP-79].
///
/// [KIP-79]: https://cwiki.apache.org/confluence/pages/viewpage.action?pageId=65868090
pub const LATEST_TIMESTAMP: i64 = -1;
pub const EARLIEST_TIMESTAMP: i64 = -2;

#[derive(Debug, Clone)]
pub struct ListOffsetsRequestPartition {
    pub partition_index: i32,
    pub timestamp: i64,
    pub max_num_offsets: i32,
}

impl<W: Write> WriteType<W> for ListOffsetsRequestPartition {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.partition_index.write(writer)?;
        self.timestamp.write(writer)?;
        self.max_num_offsets.write(writer)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ListOffsetsRequestTopic {
    pub name: String,
    pub partitions: Vec<ListOffsetsRequestPartition>,
}

impl<W: Write> WriteType<W> for ListOffsetsRequestTopic {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.name.write(writer)?;
        write_array(&self.partitions, writer)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ListOffsetsRequest {
    pub replica_id: i32,
    pub topics: Vec<ListOffsetsRequestTopic>,
}

impl<W: Write> WriteType<W> for ListOffsetsRequest {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.replica_id.write(writer)?;
        write_array(&self.topics, writer)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListOffsetsResponsePartition {
    pub partition_index: i32,
    pub error: Option<ApiError>,
    pub offsets: Vec<i64>,
}

impl<R: Read> ReadType<R> for ListOffsetsResponsePartition {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Self {
            partition_index: i32::read(reader)?,
            error: Option::<ApiError>::read(reader)?,
            offsets: read_array(reader)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListOffsetsResponseTopic {
    pub name: String,
    pub partitions: Vec<ListOffsetsResponsePartition>,
}

impl<R: Read> ReadType<R> for ListOffsetsResponseTopic {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Self {
            name: String::read(reader)?,
            partitions: read_array(reader)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListOffsetsResponse {
    pub topics: Vec<ListOffsetsResponseTopic>,
}

impl<R: Read> ReadType<R> for ListOffsetsResponse {
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
        let req = ListOffsetsRequest {
            replica_id: -1,
            topics: vec![ListOffsetsRequestTopic {
                name: "orders".to_string(),
                partitions: vec![ListOffsetsRequestPartition {
                    partition_index: 0,
                    timestamp: LATEST_TIMESTAMP,
                    max_num_offsets: 1,
                }],
            }],
        };

        let mut buf = Vec::new();
        req.write(&mut buf).unwrap();
        assert_eq!(&buf[0..4], &(-1i32).to_be_bytes());
    }

    #[test]
    fn test_response_roundtrip() {
        let mut buf = Vec::new();
        write_array(
            &[ListOffsetsResponseTopic {
                name: "orders".to_string(),
                partitions: vec![ListOffsetsResponsePartition {
                    partition_index: 0,
                    error: None,
                    offsets: vec![42],
                }],
            }],
            &mut buf,
        )
        .unwrap();

        let resp = ListOffsetsResponse::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(resp.topics[0].partitions[0].offsets, vec![42]);
    }
}
