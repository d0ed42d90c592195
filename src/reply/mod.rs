//! Types implementing the RPC reply half of the message framing specified in
//! RFC 5531.

mod accepted_reply;
mod rejected_reply;
mod reply_body;

pub use accepted_reply::*;
pub use rejected_reply::*;
pub use reply_body::*;
