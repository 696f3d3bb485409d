//! # Submessages
//!
//! A message is a run of submessages with no outer framing:
//!
//! ```text
//! [header 13B][payload payload_len B][header 13B][payload ...]...
//! ```
//!
//! Payloads are a u32 LE record count followed by the records. Entity records
//! are `remote_id: u32` then the kind's own encoding; Deinstantiate records are
//! bare ids. An empty payload (`payload_len == 0`) holds no records.

use super::header::{Op, SubmessageHeader, HEADER_SIZE};
use super::record::Replicated;
use super::serialization::{WireReader, WireWriter};
use crate::ecs::TypeTag;
use crate::error::{ReplicaError, ReplicaResult};

/// Offset of `payload_len` inside a header.
const PAYLOAD_LEN_OFFSET: usize = 5;

/// Smallest possible encoded record (a bare id).
const MIN_RECORD_SIZE: usize = 4;

/// Starts a submessage and returns the position of its header.
fn begin(writer: &mut WireWriter, tag: TypeTag, op: Op) -> usize {
    let start = writer.len();
    SubmessageHeader::new(tag, op, 0).write(writer);
    writer.write_u32(0);
    start
}

/// Patches the count and payload length of a submessage started at `start`.
fn finish(writer: &mut WireWriter, start: usize, count: u32) {
    let payload_start = start + HEADER_SIZE;
    let payload_len = (writer.len() - payload_start) as u64;
    writer.patch_u32(payload_start, count);
    writer.patch_u64(start + PAYLOAD_LEN_OFFSET, payload_len);
}

/// Appends an Instantiate or Update submessage for `records`.
///
/// Returns the number of records written. The header is written even when
/// `records` is empty.
pub fn encode_entities<'a, T, I>(writer: &mut WireWriter, op: Op, records: I) -> usize
where
    T: Replicated,
    I: IntoIterator<Item = (u32, &'a T)>,
{
    let start = begin(writer, T::TAG, op);
    let mut count = 0u32;
    for (id, value) in records {
        writer.write_u32(id);
        value.encode(writer);
        count += 1;
    }
    finish(writer, start, count);
    count as usize
}

/// Appends a Deinstantiate submessage for `ids` and returns how many were written.
pub fn encode_ids<I>(writer: &mut WireWriter, tag: TypeTag, ids: I) -> usize
where
    I: IntoIterator<Item = u32>,
{
    let start = begin(writer, tag, Op::Deinstantiate);
    let mut count = 0u32;
    for id in ids {
        writer.write_u32(id);
        count += 1;
    }
    finish(writer, start, count);
    count as usize
}

/// Reads the record count, `Ok(None)` meaning an empty payload.
fn read_count(reader: &mut WireReader<'_>, tag: TypeTag, op: Op) -> ReplicaResult<Option<usize>> {
    if reader.remaining() == 0 {
        return Ok(None);
    }
    let count = reader
        .read_u32()
        .ok_or(ReplicaError::RecordDecode { tag, op, index: 0 })?;
    Ok(Some(count as usize))
}

fn expect_end(reader: &WireReader<'_>, tag: TypeTag) -> ReplicaResult<()> {
    match reader.remaining() {
        0 => Ok(()),
        trailing => Err(ReplicaError::TrailingPayload { tag, trailing }),
    }
}

/// Decodes the `(remote_id, value)` records of an Instantiate or Update payload.
///
/// # Errors
///
/// [`ReplicaError::RecordDecode`] if any record is short or invalid,
/// [`ReplicaError::TrailingPayload`] if bytes remain after the last record.
pub fn decode_entities<T: Replicated>(op: Op, payload: &[u8]) -> ReplicaResult<Vec<(u32, T)>> {
    let tag = T::TAG;
    let mut reader = WireReader::new(payload);
    let Some(count) = read_count(&mut reader, tag, op)? else {
        return Ok(Vec::new());
    };

    let mut records = Vec::with_capacity(count.min(reader.remaining() / MIN_RECORD_SIZE));
    for index in 0..count {
        let record = reader
            .read_u32()
            .and_then(|id| T::decode(&mut reader).map(|value| (id, value)))
            .ok_or(ReplicaError::RecordDecode { tag, op, index })?;
        records.push(record);
    }
    expect_end(&reader, tag)?;
    Ok(records)
}

/// Decodes the ids of a Deinstantiate payload.
///
/// # Errors
///
/// Same as [`decode_entities`].
pub fn decode_ids(tag: TypeTag, payload: &[u8]) -> ReplicaResult<Vec<u32>> {
    let op = Op::Deinstantiate;
    let mut reader = WireReader::new(payload);
    let Some(count) = read_count(&mut reader, tag, op)? else {
        return Ok(Vec::new());
    };

    let mut ids = Vec::with_capacity(count.min(reader.remaining() / MIN_RECORD_SIZE));
    for index in 0..count {
        let id = reader
            .read_u32()
            .ok_or(ReplicaError::RecordDecode { tag, op, index })?;
        ids.push(id);
    }
    expect_end(&reader, tag)?;
    Ok(ids)
}

/// One submessage borrowed from a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submessage<'a> {
    /// Offset of the header in the scanned buffer.
    pub offset: usize,
    /// The decoded header.
    pub header: SubmessageHeader,
    /// Exactly `header.payload_len` bytes.
    pub payload: &'a [u8],
}

impl Submessage<'_> {
    /// Interprets the op byte.
    ///
    /// # Errors
    ///
    /// [`ReplicaError::UnknownOp`] for codes outside the known set.
    pub fn op(&self) -> ReplicaResult<Op> {
        self.header.op()
    }
}

/// Front-to-back scanner over concatenated submessages.
///
/// Yields `Err` once when the rest of the buffer cannot be framed, then stops.
/// The unframeable remainder counts as consumed.
#[derive(Debug, Clone)]
pub struct SubmessageIter<'a> {
    reader: WireReader<'a>,
    done: bool,
}

impl<'a> SubmessageIter<'a> {
    /// Starts scanning `buffer`.
    #[must_use]
    pub const fn new(buffer: &'a [u8]) -> Self {
        Self {
            reader: WireReader::new(buffer),
            done: false,
        }
    }

    /// Bytes consumed so far.
    #[must_use]
    pub const fn consumed(&self) -> usize {
        self.reader.position()
    }

    fn abandon(&mut self, err: ReplicaError) -> Option<ReplicaResult<Submessage<'a>>> {
        self.done = true;
        self.reader.skip(usize::MAX);
        Some(Err(err))
    }
}

impl<'a> Iterator for SubmessageIter<'a> {
    type Item = ReplicaResult<Submessage<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.reader.remaining() == 0 {
            return None;
        }

        let offset = self.reader.position();
        let remaining = self.reader.remaining();
        let Some(header) = SubmessageHeader::read(&mut self.reader) else {
            return self.abandon(ReplicaError::MalformedHeader { offset, remaining });
        };

        let available = self.reader.remaining();
        let payload = usize::try_from(header.payload_len)
            .ok()
            .and_then(|len| self.reader.read_slice(len));
        match payload {
            Some(payload) => Some(Ok(Submessage {
                offset,
                header,
                payload,
            })),
            None => self.abandon(ReplicaError::PayloadOutOfBounds {
                tag: header.tag,
                declared: header.payload_len,
                available,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Sample {
        a: u32,
        b: f32,
    }

    impl Replicated for Sample {
        const KIND: &'static str = "test.Sample";

        fn encode(&self, writer: &mut WireWriter) {
            writer.write_u32(self.a);
            writer.write_f32(self.b);
        }

        fn decode(reader: &mut WireReader<'_>) -> Option<Self> {
            Some(Self {
                a: reader.read_u32()?,
                b: reader.read_f32()?,
            })
        }
    }

    #[test]
    fn test_entities_round_trip_in_order() {
        let values = [
            Sample { a: 1, b: 0.5 },
            Sample { a: 2, b: -3.0 },
            Sample { a: 3, b: 9.25 },
        ];
        let mut writer = WireWriter::new();
        let written = encode_entities(
            &mut writer,
            Op::Instantiate,
            [(7, &values[0]), (3, &values[1]), (11, &values[2])],
        );
        assert_eq!(written, 3);
        // header + count + 3 * (id + 8 bytes)
        assert_eq!(writer.len(), HEADER_SIZE + 4 + 3 * 12);

        let mut scan = SubmessageIter::new(writer.as_slice());
        let sub = scan.next().unwrap().unwrap();
        assert_eq!(sub.header.tag, Sample::TAG);
        assert_eq!(sub.op(), Ok(Op::Instantiate));
        assert_eq!(sub.header.payload_len, 40);
        assert!(scan.next().is_none());
        assert_eq!(scan.consumed(), writer.len());

        let decoded: Vec<(u32, Sample)> = decode_entities(Op::Instantiate, sub.payload).unwrap();
        assert_eq!(
            decoded,
            vec![(7, values[0].clone()), (3, values[1].clone()), (11, values[2].clone())]
        );
    }

    #[test]
    fn test_ids_and_empty_batches() {
        let mut writer = WireWriter::new();
        encode_ids(&mut writer, Sample::TAG, [4, 9]);
        encode_entities::<Sample, _>(&mut writer, Op::Update, []);

        let subs: Vec<_> = SubmessageIter::new(writer.as_slice())
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(subs.len(), 2);
        assert_eq!(decode_ids(Sample::TAG, subs[0].payload).unwrap(), vec![4, 9]);
        assert!(decode_entities::<Sample>(Op::Update, subs[1].payload)
            .unwrap()
            .is_empty());
        assert_eq!(subs[1].offset, HEADER_SIZE + 4 + 8);
    }

    #[test]
    fn test_zero_length_payload_is_empty() {
        assert!(decode_ids(Sample::TAG, &[]).unwrap().is_empty());
        assert!(decode_entities::<Sample>(Op::Instantiate, &[])
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_short_record_reports_index() {
        let mut writer = WireWriter::new();
        writer.write_u32(2);
        writer.write_u32(1);
        Sample { a: 1, b: 1.0 }.encode(&mut writer);
        writer.write_u32(2);
        writer.write_u32(5);

        assert_eq!(
            decode_entities::<Sample>(Op::Update, writer.as_slice()),
            Err(ReplicaError::RecordDecode {
                tag: Sample::TAG,
                op: Op::Update,
                index: 1,
            })
        );
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut writer = WireWriter::new();
        writer.write_u32(1);
        writer.write_u32(8);
        writer.write_u8(0);
        assert_eq!(
            decode_ids(Sample::TAG, writer.as_slice()),
            Err(ReplicaError::TrailingPayload {
                tag: Sample::TAG,
                trailing: 1,
            })
        );
    }

    #[test]
    fn test_huge_count_does_not_preallocate() {
        let mut writer = WireWriter::new();
        writer.write_u32(u32::MAX);
        assert!(decode_ids(Sample::TAG, writer.as_slice()).is_err());
    }

    #[test]
    fn test_truncated_header_ends_scan() {
        let mut writer = WireWriter::new();
        encode_ids(&mut writer, Sample::TAG, [1]);
        let whole = writer.len();
        writer.write_bytes(&[0xFF; 6]);

        let mut scan = SubmessageIter::new(writer.as_slice());
        assert!(scan.next().unwrap().is_ok());
        assert_eq!(
            scan.next(),
            Some(Err(ReplicaError::MalformedHeader {
                offset: whole,
                remaining: 6,
            }))
        );
        assert!(scan.next().is_none());
        assert_eq!(scan.consumed(), writer.len());
    }

    #[test]
    fn test_payload_past_end_ends_scan() {
        let mut writer = WireWriter::new();
        SubmessageHeader::new(Sample::TAG, Op::Update, 100).write(&mut writer);
        writer.write_bytes(&[0; 10]);

        let mut scan = SubmessageIter::new(writer.as_slice());
        assert_eq!(
            scan.next(),
            Some(Err(ReplicaError::PayloadOutOfBounds {
                tag: Sample::TAG,
                declared: 100,
                available: 10,
            }))
        );
        assert!(scan.next().is_none());
    }
}
