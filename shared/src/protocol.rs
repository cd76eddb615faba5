//! Length-prefixed request/response protocol spoken by the direct-connect registry
//!
//! Every frame is a 4-byte big-endian payload length followed by a bincode
//! encoded message. A connection carries any number of requests, each answered
//! by exactly one response.

use crate::identity::ServerIdentity;
use crate::snapshot::{MatchmakingSnapshot, ServerInfo};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest payload either side will accept
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Upper bound on the servers a single list response carries
pub const MAX_LIST_LIMIT: u32 = 200;

pub type FrameError = Box<dyn std::error::Error + Send + Sync>;

/// An identity paired with the latest fact known about it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRecord {
    pub identity: ServerIdentity,
    pub snapshot: MatchmakingSnapshot,
}

impl ServerRecord {
    pub fn new(identity: ServerIdentity, snapshot: MatchmakingSnapshot) -> Self {
        Self { identity, snapshot }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RegistryRequest {
    /// Sent periodically by a dedicated server to stay listed
    Advertise {
        identity: ServerIdentity,
        info: ServerInfo,
    },
    Withdraw {
        identity: ServerIdentity,
    },
    List {
        filter: String,
        limit: u32,
    },
    Query {
        identity: ServerIdentity,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RegistryResponse {
    Advertised { join_code: String },
    Withdrawn { removed: bool },
    ServerList { total: u32, servers: Vec<ServerRecord> },
    Status { snapshot: MatchmakingSnapshot },
    Error { reason: String },
}

/// Serializes a message into a complete frame, prefix included
pub fn encode_frame<T: Serialize>(message: &T) -> Result<Vec<u8>, FrameError> {
    let payload = bincode::serialize(message)?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(format!("frame of {} bytes exceeds limit", payload.len()).into());
    }

    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Decodes one frame from the front of `buffer`
///
/// Returns the message and the number of bytes consumed, or `None` when the
/// buffer does not yet hold a complete frame.
pub fn decode_frame<T: DeserializeOwned>(buffer: &[u8]) -> Result<Option<(T, usize)>, FrameError> {
    if buffer.len() < 4 {
        return Ok(None);
    }

    let len = u32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]) as usize;
    if len > MAX_FRAME_LEN {
        return Err(format!("frame of {} bytes exceeds limit", len).into());
    }
    if buffer.len() < 4 + len {
        return Ok(None);
    }

    let message = bincode::deserialize(&buffer[4..4 + len])?;
    Ok(Some((message, 4 + len)))
}

pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let frame = encode_frame(message)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads the next frame, returning `None` on a clean end of stream
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>, FrameError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(format!("frame of {} bytes exceeds limit", len).into());
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(bincode::deserialize(&payload)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_prefixes_length() {
        let request = RegistryRequest::List {
            filter: "viking".to_string(),
            limit: 50,
        };
        let frame = encode_frame(&request).unwrap();
        let len = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
        assert_eq!(len, frame.len() - 4);
    }

    #[test]
    fn test_decode_partial_frame_waits() {
        let frame = encode_frame(&RegistryResponse::Withdrawn { removed: true }).unwrap();

        let partial: Option<(RegistryResponse, usize)> = decode_frame(&frame[..2]).unwrap();
        assert!(partial.is_none());
        let partial: Option<(RegistryResponse, usize)> =
            decode_frame(&frame[..frame.len() - 1]).unwrap();
        assert!(partial.is_none());

        let (decoded, used) = decode_frame::<RegistryResponse>(&frame).unwrap().unwrap();
        assert_eq!(used, frame.len());
        match decoded {
            RegistryResponse::Withdrawn { removed } => assert!(removed),
            _ => panic!("Wrong response type after decoding"),
        }
    }

    #[test]
    fn test_decode_rejects_oversized_header() {
        let mut frame = ((MAX_FRAME_LEN + 1) as u32).to_be_bytes().to_vec();
        frame.extend_from_slice(&[0u8; 8]);
        let result = decode_frame::<RegistryRequest>(&frame);
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_rejects_corrupted_payload() {
        let mut frame = encode_frame(&RegistryRequest::Query {
            identity: ServerIdentity::direct("127.0.0.1:2456"),
        })
        .unwrap();
        frame[4] = 0xFF;
        assert!(decode_frame::<RegistryRequest>(&frame).is_err());
    }

    #[test]
    fn test_two_frames_back_to_back() {
        let mut buffer = encode_frame(&RegistryResponse::Advertised {
            join_code: "ABC123".to_string(),
        })
        .unwrap();
        buffer.extend(encode_frame(&RegistryResponse::Withdrawn { removed: false }).unwrap());

        let (first, used) = decode_frame::<RegistryResponse>(&buffer).unwrap().unwrap();
        let (second, _) = decode_frame::<RegistryResponse>(&buffer[used..])
            .unwrap()
            .unwrap();

        assert!(matches!(first, RegistryResponse::Advertised { join_code } if join_code == "ABC123"));
        assert!(matches!(second, RegistryResponse::Withdrawn { removed: false }));
    }

    #[test]
    fn test_async_frames_over_duplex() {
        tokio_test::block_on(async {
            let (mut client, mut server) = tokio::io::duplex(4096);

            let request = RegistryRequest::List {
                filter: String::new(),
                limit: MAX_LIST_LIMIT,
            };
            write_frame(&mut client, &request).await.unwrap();
            drop(client);

            let received: Option<RegistryRequest> = read_frame(&mut server).await.unwrap();
            match received {
                Some(RegistryRequest::List { filter, limit }) => {
                    assert!(filter.is_empty());
                    assert_eq!(limit, MAX_LIST_LIMIT);
                }
                other => panic!("Unexpected request: {:?}", other),
            }

            let eof: Option<RegistryRequest> = read_frame(&mut server).await.unwrap();
            assert!(eof.is_none());
        });
    }
}
