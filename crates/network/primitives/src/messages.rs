use apiary_primitives::OverlayAddress;
use serde::{Deserialize, Serialize};

use crate::error::NotSupported;

/// First frame of a handshake, sent by the dialing side.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeRequest {
    pub address: OverlayAddress,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HandshakeResponse {
    Accepted { address: OverlayAddress },
    Rejected,
}

/// First frame of every application stream, sent by the opening side.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRequest {
    pub protocol: String,
    pub version: String,
    pub stream: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StreamResponse {
    Accepted,
    Rejected { cause: NotSupported },
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_stream_response_wire_shape() {
        let rejected = StreamResponse::Rejected {
            cause: NotSupported::Protocol {
                protocol: "testing".to_owned(),
            },
        };

        assert_eq!(
            serde_json::to_value(&rejected).unwrap(),
            json!({
                "status": "rejected",
                "cause": { "kind": "protocol", "protocol": "testing" }
            })
        );
        assert_eq!(
            serde_json::to_value(StreamResponse::Accepted).unwrap(),
            json!({ "status": "accepted" })
        );
    }
}
