//! The wire protocol: classic (pre-KIP-482) length-prefixed framing, one fixed
//! shape per API, no tagged fields and no per-request version negotiation.
//!
//! A request frame is `Size RequestHeader RequestBody`; a response frame is
//! `Size ResponseHeader ResponseBody`, where `Size` is the byte length of
//! everything that follows it.

pub mod api_key;
pub mod error;
pub mod messages;
pub mod primitives;
pub mod record;
pub mod traits;

use std::io::{Cursor, Read, Write};

use api_key::ApiKey;
use messages::header::{RequestHeader, ResponseHeader};
use traits::{ReadError, ReadType, WriteError, WriteType};

/// Writes a complete, length-prefixed request frame: header followed by `body`.
pub fn encode_request<W, B>(
    writer: &mut W,
    api_key: ApiKey,
    api_version: i16,
    correlation_id: i32,
    client_id: Option<&str>,
    body: &B,
) -> Result<(), WriteError>
where
    W: Write,
    B: WriteType<Vec<u8>>,
{
    let header = RequestHeader {
        request_api_key: api_key,
        request_api_version: api_version,
        correlation_id,
        client_id: client_id.map(str::to_string),
    };

    let mut buf = Vec::new();
    header.write(&mut buf)?;
    body.write(&mut buf)?;

    let len = i32::try_from(buf.len()).map_err(WriteError::Overflow)?;
    len.write(writer)?;
    writer.write_all(&buf)?;
    Ok(())
}

/// Reads one complete response frame and decodes its body, returning the
/// correlation ID the caller should match against its in-flight request.
pub fn decode_response<R, T>(reader: &mut R) -> Result<(i32, T), ReadError>
where
    R: Read,
    T: ReadType<Cursor<Vec<u8>>>,
{
    let len = usize::try_from(i32::read(reader)?)?;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;

    let mut cursor = Cursor::new(buf);
    let header = ResponseHeader::read(&mut cursor)?;
    let body = T::read(&mut cursor)?;
    Ok((header.correlation_id, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use messages::metadata::{MetadataRequest, MetadataResponse, MetadataResponseBroker};

    #[test]
    fn test_encode_decode_roundtrip() {
        let request = MetadataRequest { topics: None };

        let mut framed = Vec::new();
        encode_request(
            &mut framed,
            ApiKey::Metadata,
            1,
            7,
            Some("logbroker-client"),
            &request,
        )
        .unwrap();

        // A broker would read the header itself; here we just check the
        // length prefix matches what follows it.
        let len = i32::from_be_bytes(framed[0..4].try_into().unwrap()) as usize;
        assert_eq!(framed.len(), 4 + len);

        let mut response_frame = Vec::new();
        let body = MetadataResponse {
            brokers: vec![MetadataResponseBroker {
                node_id: 1,
                host: "broker-1".to_string(),
                port: 9092,
                rack: None,
            }],
            controller_id: 1,
            topics: vec![],
        };
        let mut body_buf = Vec::new();
        ResponseHeader { correlation_id: 7 }
            .write(&mut body_buf)
            .unwrap();
        primitives::write_array(&body.brokers, &mut body_buf).unwrap();
        body.controller_id.write(&mut body_buf).unwrap();
        primitives::write_array(&body.topics, &mut body_buf).unwrap();
        let len = i32::try_from(body_buf.len()).unwrap();
        len.write(&mut response_frame).unwrap();
        response_frame.extend_from_slice(&body_buf);

        let (correlation_id, decoded): (i32, MetadataResponse) =
            decode_response(&mut Cursor::new(response_frame)).unwrap();
        assert_eq!(correlation_id, 7);
        assert_eq!(decoded, body);
    }
}
