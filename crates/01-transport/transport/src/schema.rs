//! Control schema exchanged between controller and workers.
//!
//! Four kinds of frame cross the wire. `TAG_DATA` carries an encoded value
//! message whose layout belongs to the codec crate; `TAG_RUN` and `TAG_DONE`
//! carry archived control records; `TAG_STOP` has no payload. Any
//! backward-incompatible change to the archived records must bump the schema
//! version.
// rkyv's generated archived mirrors carry no docs of their own.
#![allow(missing_docs)]

use rkyv::{
    api::high::{access, to_bytes, HighSerializer},
    rancor::Error,
    ser::allocator::ArenaHandle,
    util::AlignedVec,
    Archive, Serialize,
};
use std::string::String;
use std::vec::Vec;

use crate::error::{TransportError, TransportResult};
use crate::frame::{decode_frame, encode_frame, Envelope};

/// Schema version for transport-visible messages.
pub const SCHEMA_VERSION_V1: u8 = 1;

/// Envelope tag for a positional value message (inputs or results).
pub const TAG_DATA: u8 = 0x01;
/// Envelope tag for the controller's "run your algorithm" signal.
pub const TAG_RUN: u8 = 0x02;
/// Envelope tag for a worker's completion signal.
pub const TAG_DONE: u8 = 0x11;
/// Envelope tag for the controller's shutdown signal.
pub const TAG_STOP: u8 = 0x1F;

/// Signal asking a worker to run its registered algorithm on the data it
/// received immediately before.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize)]
#[rkyv(
    attr(allow(missing_docs), doc = "Archived representation of `RunCmdV1`."),
    bytecheck()
)]
pub struct RunCmdV1 {
    /// Controller-assigned sequence number of this dispatch.
    pub dispatch: u64,
    /// Name of the algorithm the controller expects the worker to run.
    pub algorithm: String,
}

/// Completion signal sent by a worker after its results.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize)]
#[rkyv(
    attr(allow(missing_docs), doc = "Archived representation of `DoneRepV1`."),
    bytecheck()
)]
pub struct DoneRepV1 {
    /// Sequence number copied from the matching [`RunCmdV1`].
    pub dispatch: u64,
    /// Name of the algorithm that ran.
    pub algorithm: String,
    /// Reason the dispatch failed, if it did. No data frame precedes a failure.
    pub failure: Option<String>,
}

/// Decoded view of any frame exchanged between ranks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Data(Vec<u8>),
    Run(RunCmdV1),
    Done(DoneRepV1),
    Stop,
}

impl Packet {
    /// Short label used in logs and error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Packet::Data(_) => "data",
            Packet::Run(_) => "run",
            Packet::Done(_) => "done",
            Packet::Stop => "stop",
        }
    }

    /// Serializes the packet into a framed buffer.
    pub fn encode(&self) -> TransportResult<Vec<u8>> {
        match self {
            Packet::Data(payload) => encode_frame(envelope(TAG_DATA), payload),
            Packet::Run(run) => encode_frame(envelope(TAG_RUN), &serialize(run)?),
            Packet::Done(done) => encode_frame(envelope(TAG_DONE), &serialize(done)?),
            Packet::Stop => encode_frame(envelope(TAG_STOP), &[]),
        }
    }

    /// Parses a framed buffer, validating the schema version and archived payloads.
    pub fn decode(bytes: &[u8]) -> TransportResult<Self> {
        let frame = decode_frame(bytes)?;
        ensure_version(frame.envelope)?;
        match frame.envelope.tag {
            TAG_DATA => Ok(Packet::Data(frame.payload.to_vec())),
            TAG_RUN => {
                let aligned = aligned_copy(frame.payload);
                let run = access::<ArchivedRunCmdV1, Error>(&aligned)
                    .map_err(|err| TransportError::schema(format!("run validation failure: {err}")))?;
                Ok(Packet::Run(RunCmdV1 {
                    dispatch: run.dispatch.to_native(),
                    algorithm: run.algorithm.as_str().to_owned(),
                }))
            }
            TAG_DONE => {
                let aligned = aligned_copy(frame.payload);
                let done = access::<ArchivedDoneRepV1, Error>(&aligned).map_err(|err| {
                    TransportError::schema(format!("done validation failure: {err}"))
                })?;
                Ok(Packet::Done(DoneRepV1 {
                    dispatch: done.dispatch.to_native(),
                    algorithm: done.algorithm.as_str().to_owned(),
                    failure: done.failure.as_ref().map(|reason| reason.as_str().to_owned()),
                }))
            }
            TAG_STOP => {
                if !frame.payload.is_empty() {
                    return Err(TransportError::schema("stop frame carries a payload"));
                }
                Ok(Packet::Stop)
            }
            other => Err(TransportError::schema(format!(
                "unknown envelope tag {other:#04x}"
            ))),
        }
    }
}

fn envelope(tag: u8) -> Envelope {
    Envelope::new(tag, SCHEMA_VERSION_V1)
}

fn ensure_version(envelope: Envelope) -> TransportResult<()> {
    if envelope.ver != SCHEMA_VERSION_V1 {
        return Err(TransportError::schema(format!(
            "schema version mismatch: {} vs {}",
            envelope.ver, SCHEMA_VERSION_V1
        )));
    }
    Ok(())
}

fn serialize<T>(value: &T) -> TransportResult<AlignedVec>
where
    T: Archive,
    T: for<'a> Serialize<HighSerializer<AlignedVec, ArenaHandle<'a>, Error>>,
{
    to_bytes::<Error>(value)
        .map_err(|err| TransportError::schema(format!("serialize failure: {err}")))
}

// Frame payloads sit 8 bytes into a plain `Vec<u8>`, which gives no alignment
// guarantee for the archived root.
fn aligned_copy(payload: &[u8]) -> AlignedVec {
    let mut aligned = AlignedVec::with_capacity(payload.len());
    aligned.extend_from_slice(payload);
    aligned
}
