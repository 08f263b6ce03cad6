//! Point-to-point transport contract shared by controller and worker ranks.
//!
//! This crate exposes the foundational pieces every rank speaks:
//! * [`Transport`] – rank discovery plus send/receive of opaque byte buffers.
//! * [`Envelope`] / [`frame`] – the 8-byte header prefixed to every buffer.
//! * [`schema`] – rkyv-archived control messages and the decoded [`Packet`] view.
//! * [`TransportError`] – failure surface for framing, schema and delivery errors.

mod endpoint;
mod error;
pub mod frame;
pub mod schema;

pub use endpoint::{Delivery, Rank, Transport, CONTROLLER_RANK};
pub use error::{TransportError, TransportResult};
pub use frame::{decode_frame, encode_frame, Envelope, Frame, ENVELOPE_LEN};
pub use schema::*;
