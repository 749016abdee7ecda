use core::fmt;

use serde::{Deserialize, Serialize};

/// A named, versioned application protocol and the streams it serves.
///
/// `H` is the handler value attached to each stream.
#[derive(Clone)]
pub struct ProtocolSpec<H> {
    pub name: String,
    pub version: String,
    pub streams: Vec<StreamSpec<H>>,
}

impl<H> ProtocolSpec<H> {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            streams: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_stream(mut self, name: impl Into<String>, handler: H) -> Self {
        self.streams.push(StreamSpec {
            name: name.into(),
            handler,
        });
        self
    }

    #[must_use]
    pub fn stream(&self, name: &str) -> Option<&StreamSpec<H>> {
        self.streams.iter().find(|stream| stream.name == name)
    }
}

impl<H> fmt::Debug for ProtocolSpec<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolSpec")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("streams", &self.streams)
            .finish()
    }
}

#[derive(Clone)]
pub struct StreamSpec<H> {
    pub name: String,
    pub handler: H,
}

impl<H> fmt::Debug for StreamSpec<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSpec")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Identifies what a stream was negotiated for.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct StreamTag {
    pub protocol: String,
    pub version: String,
    pub stream: String,
}

impl StreamTag {
    pub fn new(
        protocol: impl Into<String>,
        version: impl Into<String>,
        stream: impl Into<String>,
    ) -> Self {
        Self {
            protocol: protocol.into(),
            version: version.into(),
            stream: stream.into(),
        }
    }
}

impl fmt::Display for StreamTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "/apiary/{}/{}/{}",
            self.protocol, self.version, self.stream
        )
    }
}
