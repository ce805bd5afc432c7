//! fbws-core: Shared protocol library for fbws.
//!
//! Provides the wire message types (REQ / RSP / IND and the authentication
//! handshake), the JSON codec, response codes, the indication catalog, and the
//! abstract transport link shared by initiator and responder.

pub mod catalog;
pub mod codec;
pub mod error;
pub mod messages;
pub mod transport;

// Re-export commonly used items at crate root.
pub use catalog::{lookup, CatalogEntry, PayloadShape};
pub use codec::{decode, encode};
pub use error::{FbwsError, FbwsResult};
pub use messages::{Envelope, Handshake, Indication, Message, Request, Response, RspCode};
pub use transport::{memory_pair, Link, Outbound, TransportEvent};
