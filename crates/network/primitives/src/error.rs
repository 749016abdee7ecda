use std::error::Error as StdError;

use eyre::Report;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a stream request could not be matched to a registered handler.
///
/// Travels back to the opening side so it can be surfaced as the cause of
/// an [`IncompatibleStreamError`].
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[non_exhaustive]
pub enum NotSupported {
    #[error("protocol `{protocol}` not supported")]
    Protocol { protocol: String },

    #[error("protocol `{protocol}` version {requested} not supported, have {registered}")]
    Version {
        protocol: String,
        requested: String,
        registered: String,
    },

    #[error("stream `{stream}` not supported by protocol `{protocol}`")]
    Stream { protocol: String, stream: String },
}

/// A stream request failed negotiation.
///
/// Unknown protocol, incompatible version and unknown stream all surface as
/// this one error, the distinction is only available through [`Self::cause`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("incompatible stream")]
pub struct IncompatibleStreamError {
    #[source]
    cause: NotSupported,
}

impl IncompatibleStreamError {
    #[must_use]
    pub const fn new(cause: NotSupported) -> Self {
        Self { cause }
    }

    #[must_use]
    pub const fn cause(&self) -> &NotSupported {
        &self.cause
    }
}

impl From<NotSupported> for IncompatibleStreamError {
    fn from(cause: NotSupported) -> Self {
        Self::new(cause)
    }
}

/// Returned by a stream handler to have the connection to its peer severed.
#[derive(Debug, Error)]
#[error("disconnect requested")]
pub struct DisconnectError {
    #[source]
    cause: Box<dyn StdError + Send + Sync>,
}

impl DisconnectError {
    pub fn new<E>(cause: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        Self {
            cause: cause.into(),
        }
    }

    #[must_use]
    pub fn cause(&self) -> &(dyn StdError + Send + Sync + 'static) {
        &*self.cause
    }
}

/// Whether a handler error asks for its peer to be disconnected.
#[must_use]
pub fn is_disconnect(err: &Report) -> bool {
    err.chain().any(|err| err.is::<DisconnectError>())
}

#[cfg(test)]
mod tests {
    use eyre::WrapErr;

    use super::*;

    #[test]
    fn test_incompatible_stream_cause() {
        let err = IncompatibleStreamError::new(NotSupported::Stream {
            protocol: "testing".to_owned(),
            stream: "messages-invalid".to_owned(),
        });

        assert_eq!(err.to_string(), "incompatible stream");
        assert_eq!(
            err.source().map(ToString::to_string).as_deref(),
            Some("stream `messages-invalid` not supported by protocol `testing`")
        );
    }

    #[test]
    fn test_not_supported_wire_shape() {
        let cause = NotSupported::Version {
            protocol: "testing".to_owned(),
            requested: "2.4.0".to_owned(),
            registered: "2.3.4".to_owned(),
        };

        let json = serde_json::to_value(&cause).unwrap();
        assert_eq!(json["kind"], "version");
        assert_eq!(json["requested"], "2.4.0");

        let decoded: NotSupported = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, cause);
    }

    #[test]
    fn test_is_disconnect() {
        let plain = Report::msg("handler failed");
        assert!(!is_disconnect(&plain));

        let direct = Report::new(DisconnectError::new("untrusted peer"));
        assert!(is_disconnect(&direct));

        let wrapped: Result<(), Report> = Err(DisconnectError::new("untrusted peer").into());
        let wrapped = wrapped.wrap_err("while handling messages").unwrap_err();
        assert!(is_disconnect(&wrapped));
        assert_eq!(wrapped.to_string(), "while handling messages");
    }

    #[test]
    fn test_disconnect_cause() {
        let err = DisconnectError::new("untrusted peer");

        assert_eq!(err.cause().to_string(), "untrusted peer");
        assert_eq!(
            err.source().map(ToString::to_string).as_deref(),
            Some("untrusted peer")
        );
    }
}
