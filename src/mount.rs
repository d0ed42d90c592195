//! MOUNT protocol (RFC 1813 Appendix I) client: resolves an export path to a
//! root file handle and tears the mount back down.

use std::io::Cursor;

use crate::session::Session;
use crate::xdr;
use crate::Error;

pub(crate) const MOUNT_PROGRAM: u32 = 100005;
const MOUNT_VERSION: u32 = 3;

const MOUNTPROC3_MNT: u32 = 1;
const MOUNTPROC3_UMNT: u32 = 3;

const MNT3_OK: u32 = 0;

/// NFSv3 `mountstat3` values returned by `MOUNTPROC3_MNT`.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountStat {
    /// No permission to mount the requested export.
    Perm,
    /// The export path does not exist.
    NoEnt,
    /// A general I/O error occurred on the server.
    Io,
    /// Permission denied.
    Access,
    /// The export path is not a directory.
    NotDir,
    /// An argument was invalid.
    Invalid,
    /// The export path name was too long.
    NameTooLong,
    /// The operation is not supported.
    NotSupported,
    /// The server experienced an internal failure.
    ServerFault,
    /// A status code this crate does not recognise.
    Unknown(u32),
}

impl MountStat {
    fn from_wire(v: u32) -> Self {
        match v {
            1 => MountStat::Perm,
            2 => MountStat::NoEnt,
            5 => MountStat::Io,
            13 => MountStat::Access,
            20 => MountStat::NotDir,
            22 => MountStat::Invalid,
            63 => MountStat::NameTooLong,
            10004 => MountStat::NotSupported,
            10006 => MountStat::ServerFault,
            v => MountStat::Unknown(v),
        }
    }
}

/// The result of a successful `mount`: the export's root file handle and the
/// auth flavors the server is willing to accept for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountResult {
    handle: Vec<u8>,
    auth_flavors: Vec<u32>,
}

impl MountResult {
    /// The root file handle of the mounted export.
    pub fn handle(&self) -> &[u8] {
        &self.handle
    }

    /// The auth flavors the server advertised as acceptable for this export.
    ///
    /// This crate only ever authenticates with `AUTH_SYS`; this list is
    /// surfaced for diagnostic logging, not enforced.
    pub fn auth_flavors(&self) -> &[u32] {
        &self.auth_flavors
    }
}

/// Mounts `export_path`, returning its root file handle.
///
/// Connects the session to the MOUNT program's port (discovered via the
/// port-mapper, and cached for subsequent calls) before issuing
/// `MOUNTPROC3_MNT`.
pub fn mount(session: &Session, export_path: &str) -> Result<MountResult, Error> {
    let port = session.ensure_mount_port()?;
    session.switch_to(port)?;

    let mut args = Vec::with_capacity(export_path.len() + 8);
    xdr::encode_string(&mut args, export_path);

    let reply = session.call(MOUNT_PROGRAM, MOUNT_VERSION, MOUNTPROC3_MNT, &args)?;
    let mut c = Cursor::new(reply.as_slice());

    let status = xdr::decode_u32(&mut c)?;
    if status != MNT3_OK {
        return Err(Error::MountStatus(MountStat::from_wire(status)));
    }

    // A generous decode-time sanity bound; the real NFSv3 handle length limit
    // is enforced below so an oversize handle raises `HandleTooLong` rather
    // than the generic `XdrOversize`.
    let handle = xdr::decode_opaque(&mut c, 1024)?;
    if handle.len() > 64 {
        return Err(Error::HandleTooLong(handle.len()));
    }
    let handle = handle.to_vec();

    let num_flavors = xdr::decode_u32(&mut c)? as usize;
    let mut auth_flavors = Vec::with_capacity(num_flavors.min(64));
    for _ in 0..num_flavors {
        auth_flavors.push(xdr::decode_u32(&mut c)?);
    }

    tracing::debug!(export_path, handle_len = handle.len(), ?auth_flavors, "mounted");

    Ok(MountResult {
        handle,
        auth_flavors,
    })
}

/// Unmounts `export_path`. The reply carries no payload beyond RPC-level
/// success.
pub fn unmount(session: &Session, export_path: &str) -> Result<(), Error> {
    let port = session.ensure_mount_port()?;
    session.switch_to(port)?;

    let mut args = Vec::with_capacity(export_path.len() + 8);
    xdr::encode_string(&mut args, export_path);

    session.call(MOUNT_PROGRAM, MOUNT_VERSION, MOUNTPROC3_UMNT, &args)?;
    tracing::debug!(export_path, "unmounted");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reply::{AcceptedReply, AcceptedStatus, ReplyBody};
    use crate::{auth::AuthFlavor, MessageType, RpcMessage};
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    fn respond_with(mut stream: std::net::TcpStream, result: Vec<u8>) {
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
    }

    #[test]
    fn test_mount_decodes_handle_and_auth_flavors() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();

            let mut result = Vec::new();
            xdr::encode_u32(&mut result, MNT3_OK);
            xdr::encode_opaque(&mut result, &[7u8; 32]);
            xdr::encode_u32(&mut result, 1);
            xdr::encode_u32(&mut result, 1); // AUTH_SYS

            respond_with(stream, result);
        });

        let session = Session::new("127.0.0.1", 111);
        session.seed_mount_port(port);

        let got = mount(&session, "/default").expect("mount");
        assert_eq!(got.handle(), &[7u8; 32]);
        assert_eq!(got.auth_flavors(), &[1]);

        server.join().unwrap();
    }

    #[test]
    fn test_mount_rejects_oversize_handle() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();

            let mut result = Vec::new();
            xdr::encode_u32(&mut result, MNT3_OK);
            xdr::encode_opaque(&mut result, &[7u8; 65]);
            xdr::encode_u32(&mut result, 0);

            respond_with(stream, result);
        });

        let session = Session::new("127.0.0.1", 111);
        session.seed_mount_port(port);

        let err = mount(&session, "/default").unwrap_err();
        assert!(matches!(err, Error::HandleTooLong(65)));

        server.join().unwrap();
    }

    #[test]
    fn test_mount_surfaces_error_status() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();

            let mut result = Vec::new();
            xdr::encode_u32(&mut result, 13); // MNT3ERR_ACCES

            respond_with(stream, result);
        });

        let session = Session::new("127.0.0.1", 111);
        session.seed_mount_port(port);

        let err = mount(&session, "/private").unwrap_err();
        assert!(matches!(
            err,
            Error::MountStatus(MountStat::Access)
        ));

        server.join().unwrap();
    }
}
