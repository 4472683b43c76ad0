//! Consumer-group protocol payloads.
//!
//! These are opaque byte blobs from the broker's point of view: `JoinGroup`
//! carries them as each member's protocol metadata, `SyncGroup` carries the
//! assignment the leader computed back to every member. Their shape follows
//! the `ConsumerProtocolSubscription`/`ConsumerProtocolAssignment` schemas
//! used by the reference client.

use std::io::{Read, Write};

use crate::protocol::primitives::{read_array, write_array};
use crate::protocol::traits::{ReadError, ReadType, WriteError, WriteType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionAssignment {
    pub topic: String,
    pub partitions: Vec<i32>,
}

impl<R: Read> ReadType<R> for PartitionAssignment {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Self {
            topic: String::read(reader)?,
            partitions: read_array(reader)?,
        })
    }
}

impl<W: Write> WriteType<W> for PartitionAssignment {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.topic.write(writer)?;
        write_array(&self.partitions, writer)?;
        Ok(())
    }
}

/// A member's subscription, sent as the protocol metadata of a `JoinGroup` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerGroupMemberMetadata {
    pub version: i16,
    pub topics: Vec<String>,
    pub user_data: Vec<u8>,
}

impl<R: Read> ReadType<R> for ConsumerGroupMemberMetadata {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Self {
            version: i16::read(reader)?,
            topics: read_array(reader)?,
            user_data: Vec::<u8>::read(reader)?,
        })
    }
}

impl<W: Write> WriteType<W> for ConsumerGroupMemberMetadata {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.version.write(writer)?;
        write_array(&self.topics, writer)?;
        self.user_data.write(writer)?;
        Ok(())
    }
}

/// The partitions assigned to a single member, sent back by the leader as
/// the `SyncGroup` request's per-member assignment payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerGroupMemberAssignment {
    pub version: i16,
    pub topics: Vec<PartitionAssignment>,
    pub user_data: Vec<u8>,
}

impl<R: Read> ReadType<R> for ConsumerGroupMemberAssignment {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Self {
            version: i16::read(reader)?,
            topics: read_array(reader)?,
            user_data: Vec::<u8>::read(reader)?,
        })
    }
}

impl<W: Write> WriteType<W> for ConsumerGroupMemberAssignment {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.version.write(writer)?;
        write_array(&self.topics, writer)?;
        self.user_data.write(writer)?;
        Ok(())
    }
}

impl ConsumerGroupMemberAssignment {
    pub fn empty() -> Self {
        Self {
            version: 0,
            topics: vec![],
            user_data: vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_member_metadata_roundtrip() {
        let metadata = ConsumerGroupMemberMetadata {
            version: 0,
            topics: vec!["one".into(), "two".into()],
            user_data: vec![0x01, 0x02, 0x03],
        };

        let mut buf = Vec::new();
        metadata.write(&mut buf).unwrap();
        let restored = ConsumerGroupMemberMetadata::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(restored, metadata);
    }

    #[test]
    fn test_member_assignment_roundtrip() {
        let assignment = ConsumerGroupMemberAssignment {
            version: 0,
            topics: vec![PartitionAssignment {
                topic: "one".to_string(),
                partitions: vec![0, 2, 4],
            }],
            user_data: vec![0x01, 0x02, 0x03],
        };

        let mut buf = Vec::new();
        assignment.write(&mut buf).unwrap();
        let restored = ConsumerGroupMemberAssignment::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(restored, assignment);
    }

    #[test]
    fn test_empty_assignment() {
        let empty = ConsumerGroupMemberAssignment::empty();
        let mut buf = Vec::new();
        empty.write(&mut buf).unwrap();
        let restored = ConsumerGroupMemberAssignment::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(restored, empty);
    }
}
