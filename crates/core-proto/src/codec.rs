//! Codec selection and streaming encode/decode.
//!
//! All three codecs are self-describing, so payloads nested inside an
//! envelope (action data, editor settings) decode into dynamic values
//! without knowing the outer codec. JSON output is pretty-printed and
//! newline-terminated so a human can follow the stream with `tee`.

use std::fmt;
use std::io::{self, Read, Write};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Codec used when none is named on the command line.
pub const DEFAULT_CODEC: Codec = Codec::Json;

/// Envelope serialization format, chosen once at agent startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Codec {
    Cbor,
    #[default]
    Json,
    Msgpack,
}

impl Codec {
    /// All valid codec names, sorted.
    pub const NAMES: [&'static str; 3] = ["cbor", "json", "msgpack"];

    /// Resolve a codec by wire name. The empty string selects the default.
    pub fn from_name(name: &str) -> Result<Codec, CodecError> {
        match name {
            "" => Ok(DEFAULT_CODEC),
            "cbor" => Ok(Codec::Cbor),
            "json" => Ok(Codec::Json),
            "msgpack" => Ok(Codec::Msgpack),
            _ => Err(CodecError::UnknownCodec {
                name: name.to_string(),
            }),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Codec::Cbor => "cbor",
            Codec::Json => "json",
            Codec::Msgpack => "msgpack",
        }
    }

    /// The valid names in the form `a, b or c`, for error messages.
    pub fn names_str() -> String {
        match Self::NAMES.split_last() {
            Some((last, rest)) => format!("{} or {}", rest.join(", "), last),
            None => String::new(),
        }
    }

    /// Encode one value onto the writer. JSON is pretty-printed and
    /// newline-terminated; the binary codecs are framed by their own
    /// self-delimiting structure.
    pub fn encode<W, T>(self, w: &mut W, value: &T) -> Result<(), CodecError>
    where
        W: Write,
        T: Serialize,
    {
        match self {
            Codec::Json => {
                serde_json::to_writer_pretty(&mut *w, value)
                    .map_err(|e| CodecError::Encode(e.to_string()))?;
                w.write_all(b"\n")?;
            }
            Codec::Cbor => {
                serde_cbor::to_writer(&mut *w, value)
                    .map_err(|e| CodecError::Encode(e.to_string()))?;
            }
            Codec::Msgpack => {
                // write_named keeps struct fields as map keys so the stream
                // stays self-describing like the other two codecs.
                rmp_serde::encode::write_named(w, value)
                    .map_err(|e| CodecError::Encode(e.to_string()))?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid codec '{name}'. Expected {}", Codec::names_str())]
    UnknownCodec { name: String },

    #[error("decode: {0}")]
    Decode(String),

    #[error("encode: {0}")]
    Encode(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Streaming decoder over a blocking reader. Each call to [`Decoder::decode`]
/// consumes exactly one envelope; `Ok(None)` signals end of input.
///
/// A stream truncated mid-envelope is reported as clean EOF: the editor side
/// closes the pipe without ceremony on shutdown and a half-written trailing
/// envelope is indistinguishable from a closed one.
pub struct Decoder {
    codec: Codec,
    r: Box<dyn Read + Send>,
}

impl Decoder {
    pub fn new(codec: Codec, r: Box<dyn Read + Send>) -> Decoder {
        Decoder { codec, r }
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn decode<T: DeserializeOwned>(&mut self) -> Result<Option<T>, CodecError> {
        match self.codec {
            Codec::Json => {
                let mut de = serde_json::Deserializer::from_reader(&mut self.r);
                match T::deserialize(&mut de) {
                    Ok(v) => Ok(Some(v)),
                    Err(e) if e.is_eof() => Ok(None),
                    Err(e) => Err(CodecError::Decode(e.to_string())),
                }
            }
            Codec::Cbor => {
                let mut de = serde_cbor::Deserializer::from_reader(&mut self.r);
                match T::deserialize(&mut de) {
                    Ok(v) => Ok(Some(v)),
                    Err(e) if e.is_eof() => Ok(None),
                    Err(e) => Err(CodecError::Decode(e.to_string())),
                }
            }
            Codec::Msgpack => match rmp_serde::decode::from_read(&mut self.r) {
                Ok(v) => Ok(Some(v)),
                Err(rmp_serde::decode::Error::InvalidMarkerRead(ref e))
                    if e.kind() == io::ErrorKind::UnexpectedEof =>
                {
                    Ok(None)
                }
                Err(e) => Err(CodecError::Decode(e.to_string())),
            },
        }
    }
}
