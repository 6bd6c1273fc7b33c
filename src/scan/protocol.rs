//! Streaming wire protocol.
//!
//! Every message is a JSON object tagged by the field `t`:
//!
//! | tag | message |
//! |-----|---------|
//! | `s` | schema echo |
//! | `r` | resolution event |
//! | `p` | ping event |
//! | `c` | close event |
//! | `u` | unauthenticated notice |

use crate::error::{ProbeError, ResolveError};
use crate::ping::Echo;
use crate::types::HostSchema;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Messages written by the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "t")]
pub enum ServerMessage {
    #[serde(rename = "s")]
    Schema {
        #[serde(rename = "s")]
        schema: HostSchema,
    },

    #[serde(rename = "r")]
    Resolution {
        #[serde(rename = "h")]
        hostname: String,
        #[serde(rename = "i", skip_serializing_if = "Vec::is_empty")]
        addresses: Vec<String>,
        #[serde(rename = "e", skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    #[serde(rename = "p")]
    Ping {
        #[serde(rename = "i")]
        address: String,
        /// Round trip in microseconds, zero without a reply.
        #[serde(rename = "l")]
        latency: i64,
        #[serde(rename = "e", skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    #[serde(rename = "c")]
    Close {
        #[serde(rename = "e")]
        error: String,
    },

    #[serde(rename = "u")]
    Unauthenticated,
}

impl ServerMessage {
    /// Schema echo sent right after authentication.
    pub fn schema(schema: &HostSchema) -> Self {
        Self::Schema {
            schema: schema.clone(),
        }
    }

    /// Resolution event for one hostname.
    pub fn resolution(hostname: &str, lookup: &Result<Vec<IpAddr>, ResolveError>) -> Self {
        let (addresses, error) = match lookup {
            Ok(ips) => (ips.iter().map(ToString::to_string).collect(), None),
            Err(e) => (Vec::new(), Some(e.to_string())),
        };
        Self::Resolution {
            hostname: hostname.to_string(),
            addresses,
            error,
        }
    }

    /// Ping event for one address.
    ///
    /// A plain timeout reads "no response"; any other failure carries its
    /// own text.
    pub fn ping(address: IpAddr, outcome: &Result<Echo, ProbeError>) -> Self {
        let (latency, error) = match outcome {
            Ok(echo) => (echo.rtt_micros(), None),
            Err(e) => (0, Some(e.to_string())),
        };
        Self::Ping {
            address: address.to_string(),
            latency,
            error,
        }
    }

    /// Close event; `None` marks a clean run.
    pub fn close(error: Option<String>) -> Self {
        Self::Close {
            error: error.unwrap_or_default(),
        }
    }

    /// Encode as one JSON text.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// The client's first message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AuthMessage {
    pub token: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Category;
    use serde_json::{json, Value};
    use std::time::Duration;

    fn encoded(message: &ServerMessage) -> Value {
        serde_json::from_str(&message.to_json().unwrap()).unwrap()
    }

    #[test]
    fn test_schema_echo() {
        let schema = HostSchema::new(vec![Category::new("core", ["a.example"])]);
        assert_eq!(
            encoded(&ServerMessage::schema(&schema)),
            json!({"t": "s", "s": [{"category": "core", "hosts": ["a.example"]}]})
        );
    }

    #[test]
    fn test_resolution_success_omits_error() {
        let lookup = Ok(vec!["1.1.1.1".parse().unwrap(), "2606:4700::1111".parse().unwrap()]);
        assert_eq!(
            encoded(&ServerMessage::resolution("one.example", &lookup)),
            json!({"t": "r", "h": "one.example", "i": ["1.1.1.1", "2606:4700::1111"]})
        );
    }

    #[test]
    fn test_resolution_failure_omits_addresses() {
        let lookup = Err(ResolveError::NoAddresses("gone.example".to_string()));
        assert_eq!(
            encoded(&ServerMessage::resolution("gone.example", &lookup)),
            json!({
                "t": "r",
                "h": "gone.example",
                "e": "no IP addresses found for hostname 'gone.example'"
            })
        );
    }

    #[test]
    fn test_ping_success_in_microseconds() {
        let address: IpAddr = "1.1.1.1".parse().unwrap();
        let echo = Echo {
            target: address,
            sequence: 3,
            rtt: Duration::from_micros(12_345),
        };
        assert_eq!(
            encoded(&ServerMessage::ping(address, &Ok(echo))),
            json!({"t": "p", "i": "1.1.1.1", "l": 12345})
        );
    }

    #[test]
    fn test_ping_timeout_reads_no_response() {
        let address: IpAddr = "1.1.1.1".parse().unwrap();
        assert_eq!(
            encoded(&ServerMessage::ping(address, &Err(ProbeError::NoResponse))),
            json!({"t": "p", "i": "1.1.1.1", "l": 0, "e": "no response"})
        );
    }

    #[test]
    fn test_ping_send_failure_keeps_its_text() {
        let address: IpAddr = "1.1.1.1".parse().unwrap();
        let outcome = Err(ProbeError::SendFailed("permission denied".to_string()));
        assert_eq!(
            encoded(&ServerMessage::ping(address, &outcome))["e"],
            "unable to send echo request: permission denied"
        );
    }

    #[test]
    fn test_close_and_unauthenticated() {
        assert_eq!(encoded(&ServerMessage::close(None)), json!({"t": "c", "e": ""}));
        assert_eq!(
            encoded(&ServerMessage::close(Some("boom".to_string()))),
            json!({"t": "c", "e": "boom"})
        );
        assert_eq!(encoded(&ServerMessage::Unauthenticated), json!({"t": "u"}));
    }

    #[test]
    fn test_auth_message() {
        let auth: AuthMessage = serde_json::from_str(r#"{"token": "abc"}"#).unwrap();
        assert_eq!(auth.token, "abc");
    }
}
