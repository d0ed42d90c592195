//! Types implementing the Open Network Computing RPC message framing defined
//! in RFC 5531.

use std::{
    convert::TryFrom,
    io::{Cursor, Write},
};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::{reply::ReplyBody, CallBody, Error};

const MSG_HEADER_LEN: usize = 4;
const LAST_FRAGMENT_BIT: u32 = 1 << 31;

const MESSAGE_TYPE_CALL: u32 = 0;
const MESSAGE_TYPE_REPLY: u32 = 1;

/// The type of RPC message.
#[derive(Debug, PartialEq)]
pub enum MessageType<'a> {
    /// This message is invoking an RPC.
    Call(CallBody<'a>),
    /// This message is a response to an RPC request.
    Reply(ReplyBody<'a>),
}

impl<'a> MessageType<'a> {
    /// Constructs a new `MessageType` by parsing the wire format read from `r`.
    ///
    /// `from_cursor` advances the position of `r` to the end of the
    /// `MessageType` structure.
    pub(crate) fn from_cursor(r: &mut Cursor<&'a [u8]>) -> Result<Self, Error> {
        match r.read_u32::<BigEndian>()? {
            MESSAGE_TYPE_CALL => Ok(MessageType::Call(CallBody::from_cursor(r)?)),
            MESSAGE_TYPE_REPLY => Ok(MessageType::Reply(ReplyBody::from_cursor(r)?)),
            v => Err(Error::InvalidMessageType(v)),
        }
    }

    /// Serialises this `MessageType` into `buf`, advancing the cursor position
    /// by [`MessageType::serialised_len()`] bytes.
    pub fn serialise_into<W: Write>(&self, mut buf: W) -> Result<(), std::io::Error> {
        match self {
            Self::Call(b) => {
                buf.write_u32::<BigEndian>(MESSAGE_TYPE_CALL)?;
                b.serialise_into(buf)?;
            }
            Self::Reply(b) => {
                buf.write_u32::<BigEndian>(MESSAGE_TYPE_REPLY)?;
                b.serialise_into(buf)?;
            }
        }

        Ok(())
    }

    /// Returns the on-wire length of this message once serialised, including
    /// the message header.
    pub fn serialised_len(&self) -> u32 {
        match self {
            Self::Call(c) => c.serialised_len() + 4,
            Self::Reply(r) => r.serialised_len() + 4,
        }
    }
}

/// An Open Network Computing RPC message read from or destined for a single
/// TCP record-marked frame.
#[derive(Debug, PartialEq)]
pub struct RpcMessage<'a> {
    xid: u32,
    message_type: MessageType<'a>,
}

impl<'a> RpcMessage<'a> {
    /// Construct a new `RpcMessage` with the specified transaction ID and
    /// message body.
    pub fn new(xid: u32, message_type: MessageType<'a>) -> Self {
        Self { xid, message_type }
    }

    /// Deserialises a new [`RpcMessage`] from `buf`.
    ///
    /// `buf` must contain exactly one fully-buffered record-marked message -
    /// the record mark itself, plus the CALL/REPLY body. If `buf` contains an
    /// incomplete message, or trailing bytes after the message,
    /// [`Error::IncompleteMessage`] is returned.
    pub fn from_bytes(buf: &'a [u8]) -> Result<Self, Error> {
        let data = unwrap_header(buf)?;

        let mut r = Cursor::new(data);

        let xid = r.read_u32::<BigEndian>()?;
        let message_type = MessageType::from_cursor(&mut r)?;

        let msg = RpcMessage { xid, message_type };

        // The header declares the fragment length; detect a message that
        // read fewer (or more) bytes than that declaration promised.
        let want_len = buf.len() as u32;
        if msg.serialised_len() != want_len {
            return Err(Error::IncompleteMessage {
                buffer_len: buf.len(),
                expected: msg.serialised_len() as usize,
            });
        }

        Ok(msg)
    }

    /// Write this `RpcMessage` into `buf`, including the 4 byte record-mark
    /// header with the "last fragment" bit set.
    ///
    /// This crate never emits multi-fragment messages - every message it
    /// sends fits in a single TCP record.
    pub fn serialise_into<W: Write>(&self, mut buf: W) -> Result<(), std::io::Error> {
        use std::io;

        if self.serialised_len() & LAST_FRAGMENT_BIT != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "message length exceeds maximum",
            ));
        }

        // The header length does not include the 4 header bytes themselves.
        let header = (self.serialised_len() - 4) | LAST_FRAGMENT_BIT;
        buf.write_u32::<BigEndian>(header)?;
        buf.write_u32::<BigEndian>(self.xid)?;

        self.message_type.serialise_into(buf)
    }

    /// Serialise this `RpcMessage` into a new [`Vec`].
    pub fn serialise(&self) -> Result<Vec<u8>, std::io::Error> {
        let mut buf = Cursor::new(Vec::with_capacity(self.serialised_len() as usize));
        self.serialise_into(&mut buf)?;
        Ok(buf.into_inner())
    }

    /// Returns the on-wire length of this message once serialised, including
    /// the 4 byte record-mark header.
    pub fn serialised_len(&self) -> u32 {
        // +4 for xid, +4 for the record-mark header.
        self.message_type.serialised_len() + 4 + 4
    }

    /// The transaction ID for this message.
    pub fn xid(&self) -> u32 {
        self.xid
    }

    /// The [`MessageType`] contained in this message.
    pub fn message(&self) -> &MessageType<'a> {
        &self.message_type
    }

    /// Returns the [`CallBody`] in this message, or `None` if this message is
    /// not an RPC call.
    pub fn call_body(&self) -> Option<&CallBody<'a>> {
        match self.message_type {
            MessageType::Call(ref b) => Some(b),
            _ => None,
        }
    }

    /// Returns the [`ReplyBody`] in this message, or `None` if this message is
    /// not an RPC reply.
    pub fn reply_body(&self) -> Option<&ReplyBody<'a>> {
        match self.message_type {
            MessageType::Reply(ref b) => Some(b),
            _ => None,
        }
    }
}

impl<'a> TryFrom<&'a [u8]> for RpcMessage<'a> {
    type Error = Error;

    fn try_from(v: &'a [u8]) -> Result<Self, Self::Error> {
        RpcMessage::from_bytes(v)
    }
}

/// Strip the 4 byte header from data, returning the rest of the message.
///
/// This function validates the message length value in the header matches the
/// length of `data`, and ensures this is not a fragmented message.
fn unwrap_header(data: &[u8]) -> Result<&[u8], Error> {
    let want = expected_message_len(data)?;

    if data.len() != want as usize {
        return Err(Error::IncompleteMessage {
            buffer_len: data.len(),
            expected: want as usize,
        });
    }

    Ok(&data[MSG_HEADER_LEN..])
}

/// Reads the message header from data, and returns the expected wire length of
/// the RPC message (including the 4 header bytes).
///
/// `data` must contain at least 4 bytes. If the message does not have the
/// `last fragment` bit set, [`Error::Fragmented`] is returned - this crate
/// never sends or accepts multi-fragment messages.
pub fn expected_message_len(data: &[u8]) -> Result<u32, Error> {
    if data.len() < MSG_HEADER_LEN {
        return Err(Error::IncompleteHeader);
    }

    // RFC1831: a big endian 4 byte unsigned number. The highest-order bit is
    // a "last fragment" boolean, the low 31 bits are the fragment length.
    let header = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);

    if header & LAST_FRAGMENT_BIT == 0 {
        return Err(Error::Fragmented);
    }

    Ok((header & !LAST_FRAGMENT_BIT) + 4)
}

/// Returns a subslice of `len` bytes from `c` without copying.
pub(crate) fn read_slice_bytes<'a>(c: &mut Cursor<&'a [u8]>, len: u32) -> Result<&'a [u8], Error> {
    let data = *c.get_ref();
    let start = c.position() as usize;
    let end = start + len as usize;

    if end > data.len() {
        return Err(Error::InvalidLength);
    }

    c.set_position(end as u64);
    Ok(&data[start..end])
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_unwrap_header() {
        let x = hex!(
            "80 00 01 1c 265ec0fd0000000000000002000186a30000000400000001000000
			01000000540000000000000000000001f50000001400000010000001f50000000c0
			00000140000003d0000004f000000500000005100000062000002bd000000210000
			0064000000cc000000fa0000018b0000018e0000018f00000000000000000000000
			c736574636c696420202020200000000000000001000000235ed267a20000683900
			00004b00000000f8ffc247f4fb10020801c0a801bd00000000000000003139322e3
			136382e312e3138393a2f686f6d652f646f6d002f55736572732f646f6d2f446573
			6b746f702f6d6f756e7400004e4653430000000374637000000000153139322e313
			6382e312e3138382e3233382e32333500000000000002"
        );

        let want = &x[4..];

        assert_eq!(unwrap_header(&x), Ok(want));
    }

    #[test]
    fn test_unwrap_header_validates_expected() {
        let x = hex!("80");

        assert_eq!(unwrap_header(&x).unwrap_err(), Error::IncompleteHeader);
    }

    #[test]
    fn test_unwrap_header_validates_message_len() {
        let x = hex!("80 00 01 1c 265ec0fd0000000000000002");

        assert_eq!(
            unwrap_header(&x),
            Err(Error::IncompleteMessage {
                buffer_len: 16,
                expected: 288,
            })
        );
    }

    #[test]
    fn test_unwrap_header_validates_fragment_bit() {
        let x = hex!("00 00 01 1c 265ec0fd0000000000000002");

        assert_eq!(unwrap_header(&x), Err(Error::Fragmented));
    }

    #[test]
    fn test_call_round_trip() {
        use crate::auth::AuthFlavor;

        let payload = [1, 2, 3, 4];
        let msg = RpcMessage::new(
            4242,
            MessageType::Call(CallBody::new(
                100003,
                3,
                1,
                AuthFlavor::AuthNone(None),
                AuthFlavor::AuthNone(None),
                &payload,
            )),
        );

        let buf = msg.serialise().expect("serialise");
        let got = RpcMessage::try_from(buf.as_slice()).expect("deserialise");

        assert_eq!(got.xid(), 4242);
        assert_eq!(got.call_body().unwrap().program(), 100003);
        assert_eq!(got.call_body().unwrap().payload(), &payload);
    }

    proptest! {
        /// The record-mark header this crate writes always round-trips back
        /// to the exact frame length it described, for any payload size a
        /// single TCP record can carry.
        #[test]
        fn prop_record_mark_round_trips(xid in any::<u32>(), payload in prop::collection::vec(any::<u8>(), 0..4096)) {
            use crate::auth::AuthFlavor;

            let msg = RpcMessage::new(
                xid,
                MessageType::Call(CallBody::new(100003, 3, 1, AuthFlavor::AuthNone(None), AuthFlavor::AuthNone(None), &payload)),
            );

            let wire = msg.serialise().expect("serialise");

            let want_len = expected_message_len(&wire[..4]).expect("header parses") as usize;
            prop_assert_eq!(want_len, wire.len());

            let header = u32::from_be_bytes([wire[0], wire[1], wire[2], wire[3]]);
            prop_assert_ne!(header & LAST_FRAGMENT_BIT, 0, "last-fragment bit must always be set");

            let got = RpcMessage::from_bytes(&wire).expect("deserialise");
            prop_assert_eq!(got.xid(), xid);
            prop_assert_eq!(got.call_body().unwrap().payload(), payload.as_slice());
        }
    }
}
