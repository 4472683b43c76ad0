use std::io::{Read, Write};

use crate::protocol::api_key::ApiKey;
use crate::protocol::error::Error as ApiError;
use crate::protocol::primitives::{read_array, write_array};
use crate::protocol::traits::{ReadError, ReadType, WriteError, WriteType};

#[derive(Debug, Clone)]
pub struct MetadataRequestTopic {
    pub name: String,
}

impl<W: Write> WriteType<W> for MetadataRequestTopic {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.name.write(writer)
    }
}

#[derive(Debug, Clone)]
pub struct MetadataRequest {
    /// The topics to fetch metadata for, or `None` to request every topic the cluster
    /// knows about.
    pub topics: Option<Vec<MetadataRequestTopic>>,
}

pub const API_KEY_METADATA: ApiKey = ApiKey::Metadata;
pub const API_VERSION_METADATA: i16 = 1;

impl<W: Write> WriteType<W> for MetadataRequest {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        match &self.topics {
            Some(topics) => write_array(topics, writer),
            None => (-1i32).write(writer),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataResponseBroker {
    pub node_id: i32,
    pub host: String,
    pub port: i32,
    pub rack: Option<String>,
}

impl<R: Read> ReadType<R> for MetadataResponseBroker {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Self {
            node_id: i32::read(reader)?,
            host: String::read(reader)?,
            port: i32::read(reader)?,
            rack: Option::<String>::read(reader)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataResponsePartition {
    pub error: Option<ApiError>,
    pub partition_index: i32,
    pub leader_id: i32,
    pub replica_nodes: Vec<i32>,
    pub isr_nodes: Vec<i32>,
}

impl<R: Read> ReadType<R> for MetadataResponsePartition {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Self {
            error: Option::<ApiError>::read(reader)?,
            partition_index: i32::read(reader)?,
            leader_id: i32::read(reader)?,
            replica_nodes: read_array(reader)?,
            isr_nodes: read_array(reader)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataResponseTopic {
    pub error: Option<ApiError>,
    pub name: String,
    pub is_internal: bool,
    pub partitions: Vec<MetadataResponsePartition>,
}

impl<R: Read> ReadType<R> for MetadataResponseTopic {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Self {
            error: Option::<ApiError>::read(reader)?,
            name: String::read(reader)?,
            is_internal: bool::read(reader)?,
            partitions: read_array(reader)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataResponse {
    pub brokers: Vec<MetadataResponseBroker>,
    pub controller_id: i32,
    pub topics: Vec<MetadataResponseTopic>,
}

impl<R: Read> ReadType<R> for MetadataResponse {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Self {
            brokers: read_array(reader)?,
            controller_id: i32::read(reader)?,
            topics: read_array(reader)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_request_no_topics_means_all_topics() {
        let req = MetadataRequest { topics: None };
        let mut buf = Vec::new();
        req.write(&mut buf).unwrap();
        assert_eq!(buf, (-1i32).to_be_bytes());
    }

    #[test]
    fn test_request_with_topics() {
        let req = MetadataRequest {
            topics: Some(vec![
                MetadataRequestTopic {
                    name: "foo".to_string(),
                },
                MetadataRequestTopic {
                    name: "bar".to_string(),
                },
            ]),
        };
        let mut buf = Vec::new();
        req.write(&mut buf).unwrap();
        assert_eq!(
            buf,
            [
                0x00, 0x00, 0x00, 0x02, 0x00, 0x03, b'f', b'o', b'o', 0x00, 0x03, b'b', b'a',
                b'r',
            ]
        );
    }

    #[test]
    fn test_response_roundtrip() {
        let resp = MetadataResponse {
            brokers: vec![MetadataResponseBroker {
                node_id: 1,
                host: "broker-1".to_string(),
                port: 9092,
                rack: None,
            }],
            controller_id: 1,
            topics: vec![MetadataResponseTopic {
                error: None,
                name: "orders".to_string(),
                is_internal: false,
                partitions: vec![MetadataResponsePartition {
                    error: None,
                    partition_index: 0,
                    leader_id: 1,
                    replica_nodes: vec![1, 2],
                    isr_nodes: vec![1, 2],
                }],
            }],
        };

        let mut buf = Vec::new();
        write_array(&resp.brokers, &mut buf).unwrap();
        resp.controller_id.write(&mut buf).unwrap();
        write_array(&resp.topics, &mut buf).unwrap();

        let restored = MetadataResponse::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(restored, resp);
    }
}
