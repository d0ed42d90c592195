//! NFS version 3 (RFC 1813) client operations: the subset needed to look up,
//! create, read, write and remove entries under a mounted export's root.

use std::io::Cursor;

use crate::session::Session;
use crate::xdr;
use crate::Error;

pub(crate) const NFS_PROGRAM: u32 = 100003;
const NFS_VERSION: u32 = 3;

const NFSPROC3_LOOKUP: u32 = 3;
const NFSPROC3_READ: u32 = 6;
const NFSPROC3_WRITE: u32 = 7;
const NFSPROC3_CREATE: u32 = 8;
const NFSPROC3_MKDIR: u32 = 9;
const NFSPROC3_REMOVE: u32 = 12;
const NFSPROC3_RMDIR: u32 = 13;

const NFS3_OK: u32 = 0;

const MAX_HANDLE_LEN: usize = 64;
const MAX_READ_LEN: usize = 1024 * 1024;

/// Byte length of a `fattr3` (RFC 1813 §2.6): type, mode, nlink, uid, gid (5
/// `uint32`s), size, used (2 `uint64`s), rdev (2 `uint32`s), fsid, fileid (2
/// `uint64`s), atime, mtime, ctime (3 `nfstime3`s of 2 `uint32`s each).
const FATTR3_LEN: usize = 84;

/// Byte length of a `wcc_attr` (RFC 1813 §3.3.1): size (`uint64`), mtime and
/// ctime (2 `nfstime3`s of 2 `uint32`s each).
const WCC_ATTR_LEN: usize = 24;

/// NFSv3 `nfsstat3` status codes.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NfsStat {
    /// Not owner.
    Perm,
    /// No such file or directory.
    NoEnt,
    /// I/O error.
    Io,
    /// No such device or address.
    NxIo,
    /// Permission denied.
    Access,
    /// File already exists.
    Exist,
    /// Attempt to do a cross-device link.
    XDev,
    /// No such device.
    NoDev,
    /// Not a directory.
    NotDir,
    /// Is a directory.
    IsDir,
    /// Invalid argument.
    Invalid,
    /// File too large.
    FBig,
    /// No space left on device.
    NoSpc,
    /// Read-only filesystem.
    RoFs,
    /// Too many hard links.
    MLink,
    /// Name too long.
    NameTooLong,
    /// Directory not empty.
    NotEmpty,
    /// Disk quota exceeded.
    DQuot,
    /// The file handle is no longer valid.
    Stale,
    /// Too many levels of remote in path.
    Remote,
    /// The file handle given in the arguments was invalid.
    BadHandle,
    /// Update synchronization mismatch was detected.
    NotSync,
    /// READDIR cookie is stale.
    BadCookie,
    /// Operation is not supported.
    NotSupp,
    /// Buffer or request is too small.
    TooSmall,
    /// An error occurred on the server which does not map to any of the
    /// legal NFS version 3 protocol error values.
    ServerFault,
    /// An unsupported object type was used in a `CREATE` request.
    BadType,
    /// The server initiated the request, but was not able to complete it in
    /// a timely fashion.
    JukeBox,
    /// A status code this crate does not recognise.
    Unknown(u32),
}

impl NfsStat {
    fn from_wire(v: u32) -> Self {
        match v {
            1 => NfsStat::Perm,
            2 => NfsStat::NoEnt,
            5 => NfsStat::Io,
            6 => NfsStat::NxIo,
            13 => NfsStat::Access,
            17 => NfsStat::Exist,
            18 => NfsStat::XDev,
            19 => NfsStat::NoDev,
            20 => NfsStat::NotDir,
            21 => NfsStat::IsDir,
            22 => NfsStat::Invalid,
            27 => NfsStat::FBig,
            28 => NfsStat::NoSpc,
            30 => NfsStat::RoFs,
            31 => NfsStat::MLink,
            63 => NfsStat::NameTooLong,
            66 => NfsStat::NotEmpty,
            69 => NfsStat::DQuot,
            70 => NfsStat::Stale,
            71 => NfsStat::Remote,
            10001 => NfsStat::BadHandle,
            10002 => NfsStat::NotSync,
            10003 => NfsStat::BadCookie,
            10004 => NfsStat::NotSupp,
            10005 => NfsStat::TooSmall,
            10006 => NfsStat::ServerFault,
            10007 => NfsStat::BadType,
            10008 => NfsStat::JukeBox,
            v => NfsStat::Unknown(v),
        }
    }
}

/// How durably a `WRITE` must have landed before the server may reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StableHow {
    /// The server is free to commit the data asynchronously.
    Unstable,
    /// The data (but not necessarily file metadata) must be on stable
    /// storage before the reply is sent.
    DataSync,
    /// Both data and metadata must be on stable storage before the reply.
    FileSync,
}

impl StableHow {
    fn to_wire(self) -> u32 {
        match self {
            StableHow::Unstable => 0,
            StableHow::DataSync => 1,
            StableHow::FileSync => 2,
        }
    }

    fn from_wire(v: u32) -> Self {
        match v {
            1 => StableHow::DataSync,
            2 => StableHow::FileSync,
            _ => StableHow::Unstable,
        }
    }
}

/// The result of a successful `read`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResult {
    /// The bytes actually read, which may be fewer than requested.
    pub data: Vec<u8>,
    /// `true` if `data` reaches the end of the file.
    pub eof: bool,
}

/// The result of a successful `write`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteResult {
    /// The number of bytes the server actually wrote, which may be fewer
    /// than requested - this is not an error condition.
    pub count: u32,
    /// The durability the server committed the written bytes to.
    pub stable: StableHow,
    /// An opaque cookie the server changes whenever it reboots, letting a
    /// client detect that unstable writes since the last `COMMIT` were
    /// lost.
    pub write_verifier: u64,
}

/// Scrubs a client-supplied path component before it is sent on the wire.
///
/// Strips leading `./` and any trailing `/`. Any `..` segment anywhere in
/// the name empties it and this function returns
/// [`Error::InvalidName`] instead of transmitting a name that could walk
/// back up the directory tree.
fn sanitise_name(name: &str) -> Result<String, Error> {
    if name.contains("..") {
        return Err(Error::InvalidName(name.to_string()));
    }

    let mut s = name;
    while let Some(rest) = s.strip_prefix("./") {
        s = rest;
    }

    Ok(s.trim_end_matches('/').to_string())
}

fn require_ok(status: u32) -> Result<(), Error> {
    if status != NFS3_OK {
        return Err(Error::NfsStatus(NfsStat::from_wire(status)));
    }
    Ok(())
}

fn decode_handle(c: &mut Cursor<&[u8]>) -> Result<Vec<u8>, Error> {
    // A generous decode-time sanity bound; the real NFSv3 handle length limit
    // is enforced below so that an oversize handle raises `HandleTooLong`
    // rather than the generic `XdrOversize`.
    let handle = xdr::decode_opaque(c, 1024)?;
    if handle.len() > MAX_HANDLE_LEN {
        return Err(Error::HandleTooLong(handle.len()));
    }
    Ok(handle.to_vec())
}

/// Decodes a `post_op_fh3` (RFC 1813 §3.3.8/§3.3.9): a `handle_follows` bool
/// followed by the `nfs_fh3` itself only if that bool is true.
fn decode_post_op_fh3(c: &mut Cursor<&[u8]>) -> Result<Vec<u8>, Error> {
    if xdr::decode_u32(c)? == 0 {
        return Err(Error::RpcProtocol(
            "server did not return a file handle".to_string(),
        ));
    }
    decode_handle(c)
}

/// Skips a `post_op_attr` (RFC 1813 §3.3.3): an `attributes_follow` bool
/// followed by a `fattr3` only if that bool is true. This crate does not
/// expose file attributes, so the bytes are discarded.
fn skip_post_op_attr(c: &mut Cursor<&[u8]>) -> Result<(), Error> {
    if xdr::decode_u32(c)? != 0 {
        xdr::skip(c, FATTR3_LEN)?;
    }
    Ok(())
}

/// Skips a `pre_op_attr` (RFC 1813 §3.3.1): an `attributes_follow` bool
/// followed by a `wcc_attr` only if that bool is true.
fn skip_pre_op_attr(c: &mut Cursor<&[u8]>) -> Result<(), Error> {
    if xdr::decode_u32(c)? != 0 {
        xdr::skip(c, WCC_ATTR_LEN)?;
    }
    Ok(())
}

/// Skips a `wcc_data` (RFC 1813 §3.3.1): weak cache-consistency data bracketing
/// an operation, which this crate does not use to validate its own cache.
fn skip_wcc_data(c: &mut Cursor<&[u8]>) -> Result<(), Error> {
    skip_pre_op_attr(c)?;
    skip_post_op_attr(c)
}

/// Encodes an NFSv3 `sattr3` representing "leave every field unset" - this
/// crate does not yet expose attribute setting beyond the defaults a
/// `CREATE`/`MKDIR` needs.
fn encode_default_sattr3(buf: &mut Vec<u8>) {
    // mode, uid, gid, size, atime, mtime - each preceded by a "set?" flag.
    for _ in 0..6 {
        xdr::encode_u32(buf, 0);
    }
}

/// Looks up `name` within the directory identified by `dir_handle`, returning
/// its file handle.
pub fn lookup(session: &Session, dir_handle: &[u8], name: &str) -> Result<Vec<u8>, Error> {
    let name = sanitise_name(name)?;

    let port = session.ensure_nfs_port()?;
    session.switch_to(port)?;

    let mut args = Vec::with_capacity(dir_handle.len() + name.len() + 16);
    xdr::encode_opaque(&mut args, dir_handle);
    xdr::encode_string(&mut args, &name);

    let reply = session.call(NFS_PROGRAM, NFS_VERSION, NFSPROC3_LOOKUP, &args)?;
    let mut c = Cursor::new(reply.as_slice());

    require_ok(xdr::decode_u32(&mut c)?)?;
    decode_handle(&mut c)
}

/// Creates a directory named `name` under `parent_handle`, returning its new
/// file handle.
pub fn mkdir(session: &Session, parent_handle: &[u8], name: &str) -> Result<Vec<u8>, Error> {
    let name = sanitise_name(name)?;

    let port = session.ensure_nfs_port()?;
    session.switch_to(port)?;

    let mut args = Vec::with_capacity(parent_handle.len() + name.len() + 32);
    xdr::encode_opaque(&mut args, parent_handle);
    xdr::encode_string(&mut args, &name);
    encode_default_sattr3(&mut args);

    let reply = session.call(NFS_PROGRAM, NFS_VERSION, NFSPROC3_MKDIR, &args)?;
    let mut c = Cursor::new(reply.as_slice());

    require_ok(xdr::decode_u32(&mut c)?)?;
    decode_post_op_fh3(&mut c)
}

/// Creates a regular file named `name` under `parent_handle`, returning its
/// new file handle. Always uses `UNCHECKED` creation semantics.
pub fn create(session: &Session, parent_handle: &[u8], name: &str) -> Result<Vec<u8>, Error> {
    const CREATE_UNCHECKED: u32 = 0;

    let name = sanitise_name(name)?;

    let port = session.ensure_nfs_port()?;
    session.switch_to(port)?;

    let mut args = Vec::with_capacity(parent_handle.len() + name.len() + 32);
    xdr::encode_opaque(&mut args, parent_handle);
    xdr::encode_string(&mut args, &name);
    xdr::encode_u32(&mut args, CREATE_UNCHECKED);
    encode_default_sattr3(&mut args);

    let reply = session.call(NFS_PROGRAM, NFS_VERSION, NFSPROC3_CREATE, &args)?;
    let mut c = Cursor::new(reply.as_slice());

    require_ok(xdr::decode_u32(&mut c)?)?;
    decode_post_op_fh3(&mut c)
}

/// Reads up to `count` bytes from `handle` starting at `offset`.
pub fn read(session: &Session, handle: &[u8], offset: u64, count: u32) -> Result<ReadResult, Error> {
    let port = session.ensure_nfs_port()?;
    session.switch_to(port)?;

    let mut args = Vec::with_capacity(handle.len() + 16);
    xdr::encode_opaque(&mut args, handle);
    xdr::encode_u64(&mut args, offset);
    xdr::encode_u32(&mut args, count);

    let reply = session.call(NFS_PROGRAM, NFS_VERSION, NFSPROC3_READ, &args)?;
    let mut c = Cursor::new(reply.as_slice());

    require_ok(xdr::decode_u32(&mut c)?)?;
    skip_post_op_attr(&mut c)?;

    let _count = xdr::decode_u32(&mut c)?;
    let eof = xdr::decode_u32(&mut c)? != 0;
    let data = xdr::decode_opaque(&mut c, MAX_READ_LEN)?;

    Ok(ReadResult {
        data: data.to_vec(),
        eof,
    })
}

/// Writes `data` to `handle` starting at `offset`, with the requested
/// durability.
pub fn write(
    session: &Session,
    handle: &[u8],
    offset: u64,
    data: &[u8],
    stable: StableHow,
) -> Result<WriteResult, Error> {
    let port = session.ensure_nfs_port()?;
    session.switch_to(port)?;

    let mut args = Vec::with_capacity(handle.len() + data.len() + 32);
    xdr::encode_opaque(&mut args, handle);
    xdr::encode_u64(&mut args, offset);
    xdr::encode_u32(&mut args, data.len() as u32);
    xdr::encode_u32(&mut args, stable.to_wire());
    xdr::encode_opaque(&mut args, data);

    let reply = session.call(NFS_PROGRAM, NFS_VERSION, NFSPROC3_WRITE, &args)?;
    let mut c = Cursor::new(reply.as_slice());

    require_ok(xdr::decode_u32(&mut c)?)?;
    skip_wcc_data(&mut c)?;

    let count = xdr::decode_u32(&mut c)?;
    let stable = StableHow::from_wire(xdr::decode_u32(&mut c)?);
    let write_verifier = xdr::decode_u64(&mut c)?;

    Ok(WriteResult {
        count,
        stable,
        write_verifier,
    })
}

/// Removes the file named `name` from `parent_handle`.
pub fn remove(session: &Session, parent_handle: &[u8], name: &str) -> Result<(), Error> {
    let name = sanitise_name(name)?;

    let port = session.ensure_nfs_port()?;
    session.switch_to(port)?;

    let mut args = Vec::with_capacity(parent_handle.len() + name.len() + 8);
    xdr::encode_opaque(&mut args, parent_handle);
    xdr::encode_string(&mut args, &name);

    let reply = session.call(NFS_PROGRAM, NFS_VERSION, NFSPROC3_REMOVE, &args)?;
    let mut c = Cursor::new(reply.as_slice());

    require_ok(xdr::decode_u32(&mut c)?)
}

/// Removes the empty directory named `name` from `parent_handle`.
pub fn rmdir(session: &Session, parent_handle: &[u8], name: &str) -> Result<(), Error> {
    let name = sanitise_name(name)?;

    let port = session.ensure_nfs_port()?;
    session.switch_to(port)?;

    let mut args = Vec::with_capacity(parent_handle.len() + name.len() + 8);
    xdr::encode_opaque(&mut args, parent_handle);
    xdr::encode_string(&mut args, &name);

    let reply = session.call(NFS_PROGRAM, NFS_VERSION, NFSPROC3_RMDIR, &args)?;
    let mut c = Cursor::new(reply.as_slice());

    require_ok(xdr::decode_u32(&mut c)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reply::{AcceptedReply, AcceptedStatus, ReplyBody};
    use crate::{auth::AuthFlavor, MessageType, RpcMessage};
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_sanitise_name_strips_leading_dot_slash_and_trailing_slash() {
        assert_eq!(sanitise_name("./foo/").unwrap(), "foo");
        assert_eq!(sanitise_name("bar").unwrap(), "bar");
    }

    #[test]
    fn test_sanitise_name_rejects_parent_segment() {
        let err = sanitise_name("../etc/passwd").unwrap_err();
        assert!(matches!(err, Error::InvalidName(_)));

        let err = sanitise_name("foo/../bar").unwrap_err();
        assert!(matches!(err, Error::InvalidName(_)));
    }

    #[test]
    fn test_nfs_stat_maps_known_codes() {
        assert_eq!(NfsStat::from_wire(70), NfsStat::Stale);
        assert_eq!(NfsStat::from_wire(10008), NfsStat::JukeBox);
        assert_eq!(NfsStat::from_wire(9999), NfsStat::Unknown(9999));
    }

    #[test]
    fn test_stable_how_round_trip() {
        for s in [StableHow::Unstable, StableHow::DataSync, StableHow::FileSync] {
            assert_eq!(StableHow::from_wire(s.to_wire()), s);
        }
    }

    /// Appends a `post_op_attr` with `attributes_follow = false`.
    fn push_absent_post_op_attr(buf: &mut Vec<u8>) {
        xdr::encode_u32(buf, 0);
    }

    /// Appends a `post_op_attr` with `attributes_follow = true` and an
    /// all-zero `fattr3` body, to exercise the skip-84-bytes path.
    fn push_present_post_op_attr(buf: &mut Vec<u8>) {
        xdr::encode_u32(buf, 1);
        buf.extend(std::iter::repeat(0u8).take(FATTR3_LEN));
    }

    /// Appends a `wcc_data` with both `pre_op_attr` and `post_op_attr`
    /// absent - the common case a server sends when it isn't tracking
    /// weak cache-consistency attributes for this call.
    fn push_absent_wcc_data(buf: &mut Vec<u8>) {
        xdr::encode_u32(buf, 0); // pre_op_attr.attributes_follow
        xdr::encode_u32(buf, 0); // post_op_attr.attributes_follow
    }

    /// Drives one RPC call against a loopback server that replies with
    /// `result` as the procedure-specific payload, then joins the server
    /// thread so any server-side panic (a malformed call) surfaces here.
    fn call_with_scripted_reply<T>(
        seed_port: impl FnOnce(&Session, u16),
        result: Vec<u8>,
        call: impl FnOnce(&Session) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();

            let mut header = [0u8; 4];
            stream.read_exact(&mut header).unwrap();
            let len = crate::expected_message_len(&header).unwrap() as usize - 4;
            let mut body = vec![0u8; len];
            stream.read_exact(&mut body).unwrap();

            let mut c = Cursor::new(body.as_slice());
            use byteorder::{BigEndian, ReadBytesExt};
            let xid = c.read_u32::<BigEndian>().unwrap();

            let reply = RpcMessage::new(
                xid,
                MessageType::Reply(ReplyBody::Accepted(AcceptedReply::new(
                    AuthFlavor::AuthNone(None),
                    AcceptedStatus::Success(&result),
                ))),
            );
            stream.write_all(&reply.serialise().unwrap()).unwrap();
        });

        let session = Session::new("127.0.0.1", 111);
        seed_port(&session, port);

        let got = call(&session);
        server.join().unwrap();
        got
    }

    #[test]
    fn test_mkdir_decodes_post_op_fh3_handle() {
        let mut result = Vec::new();
        xdr::encode_u32(&mut result, NFS3_OK);
        xdr::encode_u32(&mut result, 1); // handle_follows
        xdr::encode_opaque(&mut result, &[7u8; 16]);
        push_absent_post_op_attr(&mut result); // obj_attributes
        push_absent_wcc_data(&mut result); // dir_wcc

        let got = call_with_scripted_reply(
            |s, port| s.seed_nfs_port(port),
            result,
            |s| mkdir(s, &[1, 2, 3], "sub"),
        )
        .expect("mkdir");

        assert_eq!(got, vec![7u8; 16]);
    }

    #[test]
    fn test_create_decodes_post_op_fh3_handle() {
        let mut result = Vec::new();
        xdr::encode_u32(&mut result, NFS3_OK);
        xdr::encode_u32(&mut result, 1); // handle_follows
        xdr::encode_opaque(&mut result, &[9u8; 16]);
        push_present_post_op_attr(&mut result); // obj_attributes
        push_absent_wcc_data(&mut result); // dir_wcc

        let got = call_with_scripted_reply(
            |s, port| s.seed_nfs_port(port),
            result,
            |s| create(s, &[1, 2, 3], "greeting"),
        )
        .expect("create");

        assert_eq!(got, vec![9u8; 16]);
    }

    #[test]
    fn test_read_skips_post_op_attr_before_data() {
        let mut result = Vec::new();
        xdr::encode_u32(&mut result, NFS3_OK);
        push_present_post_op_attr(&mut result); // file_attributes
        xdr::encode_u32(&mut result, 5); // count
        xdr::encode_u32(&mut result, 1); // eof
        xdr::encode_opaque(&mut result, b"hello");

        let got = call_with_scripted_reply(
            |s, port| s.seed_nfs_port(port),
            result,
            |s| read(s, &[1, 2, 3], 0, 5),
        )
        .expect("read");

        assert_eq!(got.data, b"hello");
        assert!(got.eof);
    }

    #[test]
    fn test_write_skips_wcc_data_before_result() {
        let mut result = Vec::new();
        xdr::encode_u32(&mut result, NFS3_OK);
        push_absent_wcc_data(&mut result); // file_wcc
        xdr::encode_u32(&mut result, 5); // count
        xdr::encode_u32(&mut result, StableHow::FileSync.to_wire()); // committed
        xdr::encode_u64(&mut result, 0x1122_3344_5566_7788); // verf

        let got = call_with_scripted_reply(
            |s, port| s.seed_nfs_port(port),
            result,
            |s| write(s, &[1, 2, 3], 0, b"hello", StableHow::Unstable),
        )
        .expect("write");

        assert_eq!(got.count, 5);
        assert_eq!(got.stable, StableHow::FileSync);
        assert_eq!(got.write_verifier, 0x1122_3344_5566_7788);
    }

    #[test]
    fn test_decode_handle_rejects_oversize() {
        let mut buf = Vec::new();
        xdr::encode_opaque(&mut buf, &[0u8; MAX_HANDLE_LEN + 1]);
        let mut c = Cursor::new(buf.as_slice());

        let err = decode_handle(&mut c).unwrap_err();
        assert!(matches!(err, Error::HandleTooLong(n) if n == MAX_HANDLE_LEN + 1));
    }
}
