// Bridges the byte-oriented `TupleBuffer` (tidal-buffer/tidal-network's unit
// of transport) and the `Record`-oriented windowed/join operators
// (tidal-window/tidal-join). Each buffer's payload holds a bincode-encoded
// `Vec<Record>`; `tuple_count` already carries the record count so decoding
// never needs to scan for an end marker.

use tidal_types::{Record, TupleBuffer};

use crate::error::IoError;

/// Serializes `records` into `buffer`'s payload and stamps its tuple count.
/// Does not touch `buffer`'s origin/sequence/watermark metadata; callers
/// stamp those separately (mirrors `TupleBuffer::stamp` being a distinct
/// step from filling the payload in `SourceDriver::produce_one`).
pub fn encode_into(buffer: &TupleBuffer, records: &[Record]) -> Result<(), IoError> {
    let bytes = bincode::serialize(records).map_err(|source| IoError::Encode {
        count: records.len(),
        source,
    })?;
    buffer.with_payload_mut(|payload| {
        payload.clear();
        payload.extend_from_slice(&bytes);
    });
    buffer.set_tuple_count(records.len() as u32);
    Ok(())
}

/// Decodes `buffer`'s payload back into the records it was encoded from.
pub fn decode_from(buffer: &TupleBuffer) -> Result<Vec<Record>, IoError> {
    buffer.with_payload(|payload| {
        bincode::deserialize(payload).map_err(|source| IoError::Decode { source })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidal_types::Value;

    #[test]
    fn round_trips_records_through_a_buffer_payload() {
        let records = vec![
            Record::new("ts").with_field("ts", Value::U64(1)).with_field("v", Value::U64(10)),
            Record::new("ts").with_field("ts", Value::U64(2)).with_field("v", Value::U64(20)),
        ];
        let buffer = TupleBuffer::for_test(vec![0u8; 0]);

        encode_into(&buffer, &records).unwrap();
        assert_eq!(buffer.tuple_count(), 2);

        let decoded = decode_from(&buffer).unwrap();
        assert_eq!(decoded, records);
    }
}
