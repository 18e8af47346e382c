//! Wire protocol for the agent: framed request/response envelopes and the
//! pluggable self-describing codec that carries them over stdio.
//!
//! The editor writes a stream of request envelopes to the agent's stdin and
//! reads a stream of response envelopes from its stdout. One codec is chosen
//! at startup and used for both directions; unsolicited server pushes reuse
//! the response envelope with an empty cookie.

mod codec;
mod envelope;

pub use codec::{Codec, CodecError, Decoder, DEFAULT_CODEC};
pub use envelope::{
    ActionDescriptor, ClientProps, EditorProps, Request, Response, ViewProps,
};
