//! # iso8583-codec — Schema-driven ISO 8583 message codec
//!
//! A codec for ISO 8583 financial-transaction messages: a schema-driven
//! unpack/pack pipeline, a primary/secondary bitmap manager, a TLV codec
//! for EMV-style substructures, and a compiled validator.
//!
//! ## Wire format
//!
//! ```text
//! [ length-indicator? ][ header? ][ MTI(4) ][ bitmap ][ bitmap2? ][ field{n}... ]
//! ```
//!
//! - **Length indicator**: optional frame prefix (binary big-endian,
//!   ASCII decimal, or ASCII hex)
//! - **Header**: optional opaque bytes (e.g. a TPDU), preserved verbatim
//! - **MTI**: four ASCII digits
//! - **Bitmap**: 64-bit presence index (8 binary bytes or 16 hex chars);
//!   bit 1 announces the secondary block for fields 65..=128
//! - **Fields**: fixed width, or LLVAR/LLLVAR/LLLLVAR with a 2/3/4-digit
//!   ASCII-decimal length prefix
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use iso8583_codec::{CompiledPackager, Message};
//!
//! # fn run(data: &[u8]) -> Result<(), iso8583_codec::Error> {
//! let packager = Arc::new(CompiledPackager::standard()?);
//!
//! // Decode (zero-copy: `msg` borrows `data`)
//! let msg = Message::unpack(Arc::clone(&packager), data)?;
//! let pan = msg.get_str(2)?;
//!
//! // Build and encode a response
//! let response = msg.create_response(iso8583_codec::message::RC_APPROVED)?;
//! let bytes = response.pack_to_vec()?;
//! # let _ = (pan, bytes);
//! # Ok(())
//! # }
//! ```
//!
//! Decoded field values are slices of the input buffer; call
//! [`Message::deep_copy`] to detach a message from its buffer. A
//! [`CompiledPackager`] is immutable and can be shared across threads
//! behind an `Arc`; see [`processor::Processor`] for concurrent batch
//! decoding.

pub mod bitmap;
pub mod builder;
pub mod error;
pub mod extract;
pub mod field;
pub mod length;
pub mod message;
pub mod processor;
pub mod spec;
pub mod tlv;
pub mod validate;

pub use bitmap::BitmapManager;
pub use builder::Builder;
pub use error::{Error, Result, ValidationError};
pub use field::Field;
pub use message::Message;
pub use processor::Processor;
pub use spec::{
    default_config, BitmapEncoding, CompiledPackager, FieldSpec, FieldType, HeaderKind,
    HeaderSpec, LengthIndicatorKind, LengthIndicatorSpec, LengthKind, PackagerConfig, TlvKind,
    TlvSpec,
};
pub use tlv::{Tlv, TlvParser};
pub use validate::{CompiledValidator, ValidationLevel, ValidationRule};
