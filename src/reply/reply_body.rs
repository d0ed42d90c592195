use std::{
    convert::TryFrom,
    io::{Cursor, Write},
};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use super::{AcceptedReply, RejectedReply};
use crate::Error;

const REPLY_ACCEPTED: u32 = 0;
const REPLY_DENIED: u32 = 1;

/// `ReplyBody` defines the response to an RPC invocation.
#[derive(Debug, PartialEq)]
pub enum ReplyBody<'a> {
    /// The server accepted the request credentials.
    Accepted(AcceptedReply<'a>),

    /// The server rejected the request credentials.
    Denied(RejectedReply),
}

impl<'a> ReplyBody<'a> {
    pub(crate) fn from_cursor(r: &mut Cursor<&'a [u8]>) -> Result<Self, Error> {
        match r.read_u32::<BigEndian>()? {
            REPLY_ACCEPTED => Ok(ReplyBody::Accepted(AcceptedReply::from_cursor(r)?)),
            REPLY_DENIED => Ok(ReplyBody::Denied(RejectedReply::from_cursor(r)?)),
            v => Err(Error::InvalidReplyType(v)),
        }
    }

    /// Serialises this `ReplyBody` into `buf`, advancing the cursor position by
    /// [`ReplyBody::serialised_len()`] bytes.
    pub fn serialise_into<W: Write>(&self, mut buf: W) -> Result<(), std::io::Error> {
        match self {
            Self::Accepted(b) => {
                buf.write_u32::<BigEndian>(REPLY_ACCEPTED)?;
                let mut inner = Cursor::new(Vec::with_capacity(b.serialised_len() as usize));
                b.serialise_into(&mut inner)?;
                buf.write_all(inner.get_ref())
            }
            Self::Denied(b) => {
                buf.write_u32::<BigEndian>(REPLY_DENIED)?;
                b.serialise_into(buf)
            }
        }
    }

    /// Returns the on-wire length of this `ReplyBody` once serialised,
    /// including the variant discriminator.
    pub fn serialised_len(&self) -> u32 {
        let mut len = 4;

        len += match self {
            Self::Accepted(b) => b.serialised_len(),
            Self::Denied(b) => b.serialised_len(),
        };

        len
    }
}

impl<'a> TryFrom<&'a [u8]> for ReplyBody<'a> {
    type Error = Error;

    fn try_from(v: &'a [u8]) -> Result<Self, Self::Error> {
        let mut c = Cursor::new(v);
        ReplyBody::from_cursor(&mut c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth::AuthFlavor, AcceptedStatus};

    #[test]
    fn test_accepted_round_trip() {
        let payload = [42u8, 42, 42, 42];
        let reply = ReplyBody::Accepted(AcceptedReply::new(
            AuthFlavor::AuthNone(None),
            AcceptedStatus::Success(&payload),
        ));

        let mut buf = Cursor::new(Vec::new());
        reply.serialise_into(&mut buf).expect("serialise");

        let bytes = buf.into_inner();
        assert_eq!(bytes.len(), reply.serialised_len() as usize);

        let got = ReplyBody::try_from(bytes.as_slice()).expect("deserialise");
        assert_eq!(reply, got);
    }
}
