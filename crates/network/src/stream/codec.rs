use core::marker::PhantomData;
use std::io;

use bytes::{Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use super::MAX_MESSAGE_SIZE;

/// Application payload exchanged over a negotiated stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub data: Vec<u8>,
}

impl Message {
    #[must_use]
    pub const fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CodecError {
    #[error("stream i/o failed")]
    StdIo(#[from] io::Error),

    #[error("malformed frame")]
    SerDe(#[source] serde_json::Error),
}

/// Length-prefixed JSON frames, decoding `T` and encoding anything serializable.
#[derive(Debug)]
pub(crate) struct JsonCodec<T> {
    length_codec: LengthDelimitedCodec,
    item: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    pub(crate) fn new() -> Self {
        Self {
            length_codec: LengthDelimitedCodec::builder()
                .max_frame_length(MAX_MESSAGE_SIZE)
                .new_codec(),
            item: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> Decoder for JsonCodec<T> {
    type Item = T;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(frame) = self.length_codec.decode(src)? else {
            return Ok(None);
        };

        serde_json::from_slice(&frame)
            .map(Some)
            .map_err(CodecError::SerDe)
    }
}

impl<T, U: Serialize> Encoder<U> for JsonCodec<T> {
    type Error = CodecError;

    fn encode(&mut self, item: U, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json = serde_json::to_vec(&item).map_err(CodecError::SerDe)?;

        self.length_codec
            .encode(Bytes::from(json), dst)
            .map_err(CodecError::StdIo)
    }
}
