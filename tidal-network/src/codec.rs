use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::NetworkError;
use crate::messages::WireMessage;

/// A `u32`-length-prefixed frame around a `serde_json`-encoded
/// [`WireMessage`]. One [`WireCodec`] is built per TCP connection and handed
/// to `tokio_util::codec::Framed`.
#[derive(Default)]
pub struct WireCodec {
    next_len: Option<u32>,
}

const MAX_FRAME_BYTES: u32 = 64 * 1024 * 1024;

impl Decoder for WireCodec {
    type Item = WireMessage;
    type Error = NetworkError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let len = match self.next_len {
            Some(len) => len,
            None => {
                if src.len() < 4 {
                    return Ok(None);
                }
                let len = src.get_u32();
                if len > MAX_FRAME_BYTES {
                    return Err(NetworkError::FrameTooLarge(len));
                }
                self.next_len = Some(len);
                len
            }
        };

        if (src.len() as u32) < len {
            src.reserve((len as usize).saturating_sub(src.len()));
            return Ok(None);
        }

        self.next_len = None;
        let frame = src.split_to(len as usize);
        let message = serde_json::from_slice(&frame)?;
        Ok(Some(message))
    }
}

impl Encoder<WireMessage> for WireCodec {
    type Error = NetworkError;

    fn encode(&mut self, item: WireMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = serde_json::to_vec(&item)?;
        dst.reserve(4 + payload.len());
        dst.put_u32(payload.len() as u32);
        dst.put_slice(&payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tidal_types::{OperatorId, PartitionId, QueryId, SequenceNumber};

    use super::*;

    fn partition() -> PartitionId {
        PartitionId::new(QueryId(1), OperatorId(2), 3, 4)
    }

    #[test]
    fn encode_then_decode_round_trips_a_data_buffer_message() {
        let mut codec = WireCodec::default();
        let mut buf = BytesMut::new();
        let message = WireMessage::DataBuffer {
            partition_id: partition(),
            seq: SequenceNumber(7),
            payload: vec![1, 2, 3, 4],
        };
        codec.encode(message, &mut buf).unwrap();

        let decoded = codec.decode(&mut buf).unwrap().expect("a full frame was buffered");
        match decoded {
            WireMessage::DataBuffer { partition_id, seq, payload } => {
                assert_eq!(partition_id, partition());
                assert_eq!(seq, SequenceNumber(7));
                assert_eq!(payload, vec![1, 2, 3, 4]);
            }
            other => panic!("expected DataBuffer, got {other:?}"),
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_returns_none_until_the_full_frame_has_arrived() {
        let mut codec = WireCodec::default();
        let mut encoded = BytesMut::new();
        codec
            .encode(
                WireMessage::AnnouncePartition { partition_id: partition() },
                &mut encoded,
            )
            .unwrap();

        // Feed the frame one byte at a time; every partial prefix must
        // decode to `None`, never an error or a spurious message.
        let mut buf = BytesMut::new();
        let mut decoder = WireCodec::default();
        for (i, byte) in encoded.iter().enumerate() {
            buf.extend_from_slice(&[*byte]);
            let result = decoder.decode(&mut buf).unwrap();
            if i + 1 < encoded.len() {
                assert!(result.is_none());
            } else {
                assert!(matches!(result, Some(WireMessage::AnnouncePartition { .. })));
            }
        }
    }

    #[test]
    fn a_frame_larger_than_the_limit_is_rejected() {
        let mut codec = WireCodec::default();
        let mut buf = BytesMut::new();
        buf.put_u32(MAX_FRAME_BYTES + 1);
        assert!(matches!(codec.decode(&mut buf), Err(NetworkError::FrameTooLarge(_))));
    }
}
