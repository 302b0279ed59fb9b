use bytes::{Buf, BufMut};

use tidal_buffer::BufferPool;
use tidal_types::{OriginId, PartitionId, SequenceNumber, TupleBuffer};

use crate::error::NetworkError;

/// A `DataBuffer` wire payload is this fixed header followed by the raw
/// tuple bytes, so a buffer's full metadata (everything `stamp` sets, plus
/// its tuple count) survives the trip across a TCP connection rather than
/// only the bytes the engine's own operators see.
const HEADER_LEN: usize = 4 + 8 + 8 + 8 + 8;

pub(crate) fn encode(buffer: &TupleBuffer) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + buffer.capacity());
    out.put_u32(buffer.tuple_count());
    out.put_u64(buffer.origin_id().0);
    out.put_u64(buffer.sequence_number().0);
    out.put_u64(buffer.watermark());
    out.put_u64(buffer.created_at());
    buffer.with_payload(|payload| out.extend_from_slice(payload));
    out
}

/// Checks out a buffer from `pool` and fills it from `bytes`, restoring the
/// metadata `encode` wrote. Blocks the calling task's thread if `pool` is
/// momentarily exhausted, same as any other buffer acquisition.
pub(crate) fn decode(
    bytes: &[u8],
    partition_id: PartitionId,
    pool: &BufferPool,
) -> Result<TupleBuffer, NetworkError> {
    if bytes.len() < HEADER_LEN {
        return Err(NetworkError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "DataBuffer frame too short",
        )));
    }
    let mut header = &bytes[..HEADER_LEN];
    let tuple_count = header.get_u32();
    let origin_id = header.get_u64();
    let sequence_number = header.get_u64();
    let watermark = header.get_u64();
    let created_at = header.get_u64();
    let payload = &bytes[HEADER_LEN..];

    let buffer = pool.get_buffer_blocking().map_err(|_| NetworkError::Transport {
        partition: partition_id,
        source: std::io::Error::new(
            std::io::ErrorKind::Other,
            "buffer pool destroyed while decoding inbound DataBuffer",
        ),
    })?;
    buffer.with_payload_mut(|p| {
        p.clear();
        p.extend_from_slice(payload);
    });
    buffer.stamp(
        OriginId(origin_id),
        SequenceNumber(sequence_number),
        watermark,
        created_at,
    );
    buffer.set_tuple_count(tuple_count);
    Ok(buffer)
}
