//! fbws wire messages.
//!
//! Every frame is a single JSON object. Correlated traffic (REQ / RSP) and
//! indications (IND) are tagged by `__intf`; the two handshake messages are
//! tagged by `type`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Close code sent when a session fails authentication.
pub const AUTH_FAILURE_CLOSE_CODE: u16 = 3001;

/// Close code reported locally when the initiator shuts its own connection.
pub const USER_CLOSE_CODE: u16 = 100;
pub const USER_CLOSE_REASON: &str = "User closed.";

/// Close code sent to every session when the responder stops.
pub const SERVER_STOP_CLOSE_CODE: u16 = 1001;
pub const SERVER_STOP_REASON: &str = "Server stopped.";

/// Response codes carried in `RSP.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum RspCode {
    Success = 0,
    Fail = 1,
    Busy = 2,
    Unavail = 3,
    BadRequest = 4,
    NotFound = 5,
    NotAllowed = 6,
    Unauthorized = 7,
    Timeout = 8,
}

impl From<RspCode> for u8 {
    fn from(c: RspCode) -> u8 {
        c as u8
    }
}

impl TryFrom<u8> for RspCode {
    type Error = String;
    fn try_from(v: u8) -> Result<Self, String> {
        match v {
            0 => Ok(Self::Success),
            1 => Ok(Self::Fail),
            2 => Ok(Self::Busy),
            3 => Ok(Self::Unavail),
            4 => Ok(Self::BadRequest),
            5 => Ok(Self::NotFound),
            6 => Ok(Self::NotAllowed),
            7 => Ok(Self::Unauthorized),
            8 => Ok(Self::Timeout),
            _ => Err(format!("unknown response code: {v}")),
        }
    }
}

/// A remote operation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub subsys: String,
    pub cmd: String,
    pub seq: u8,
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl Request {
    /// Build a request, carrying `args.id` as the target id when it is set.
    pub fn new(subsys: &str, cmd: &str, seq: u8, args: Map<String, Value>) -> Self {
        let id = args.get("id").and_then(non_empty_id);
        Self {
            subsys: subsys.to_string(),
            cmd: cmd.to_string(),
            seq,
            id,
            args,
        }
    }
}

/// The answer to a [`Request`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub subsys: String,
    pub cmd: String,
    pub seq: u8,
    #[serde(default)]
    pub id: Option<Value>,
    pub status: RspCode,
    #[serde(default)]
    pub data: Value,
}

impl Response {
    /// Answer `req`: its args are dropped, everything else is echoed.
    pub fn to_request(req: Request, status: RspCode, data: Value) -> Self {
        Self {
            subsys: req.subsys,
            cmd: req.cmd,
            seq: req.seq,
            id: req.id,
            status,
            data,
        }
    }
}

/// An unsolicited state-change notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indication {
    pub subsys: String,
    #[serde(rename = "type")]
    pub ind_type: String,
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub data: Value,
}

/// Correlated and unsolicited traffic, tagged by `__intf`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "__intf")]
pub enum Envelope {
    #[serde(rename = "REQ")]
    Req(Request),
    #[serde(rename = "RSP")]
    Rsp(Response),
    #[serde(rename = "IND")]
    Ind(Indication),
}

/// Authentication handshake messages, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Handshake {
    /// Initiator → responder, first message on every connection.
    Authenticate {
        #[serde(default)]
        data: Value,
    },
    /// Responder → initiator, the authentication verdict.
    Authenticated { data: bool },
}

/// Any frame on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Envelope(Envelope),
    Handshake(Handshake),
}

impl From<Envelope> for Message {
    fn from(e: Envelope) -> Self {
        Message::Envelope(e)
    }
}

impl From<Handshake> for Message {
    fn from(h: Handshake) -> Self {
        Message::Handshake(h)
    }
}

/// Keep an entity id only when it carries a value: null, `false`, `0` and
/// the empty string all mean "no target".
pub fn non_empty_id(v: &Value) -> Option<Value> {
    let empty = match v {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        _ => false,
    };
    if empty {
        None
    } else {
        Some(v.clone())
    }
}
