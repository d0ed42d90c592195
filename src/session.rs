//! A TCP transport to a single ONC RPC server, handling connection setup,
//! record-marked framing, and RPC call/reply correlation.
//!
//! One [`Session`] talks to one `(host, port)` at a time - port discovery via
//! the port-mapper, mounting, and NFS operations all reconnect the same
//! session to whichever port they need, mirroring a single-socket client
//! rather than holding three live connections open per server.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use smallvec::smallvec;

use crate::auth::{AuthFlavor, AuthUnixParams};
use crate::reply::{AcceptedStatus, ReplyBody};
use crate::rpc_message::expected_message_len;
use crate::{hostname, xid, CallBody, Error, MessageType, RpcMessage};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Sanity bound applied to port-mapper and MOUNT replies, which never carry
/// file data and so stay well under this.
const DEFAULT_MAX_REPLY_LEN: usize = 1024 * 1024;
/// Sanity bound applied to NFS replies, sized to carry a full
/// [`crate::nfs::read`] result (up to 1 MiB of file data) plus its RPC and
/// `post_op_attr`/`wcc_data` envelope overhead.
const DEFAULT_MAX_NFS_REPLY_LEN: usize = 1024 * 1024 + 4096;

/// A transport to a single NFS/MOUNT/port-mapper server.
///
/// All public operations on a `Session` lock its internal socket for the
/// duration of a single request/reply exchange, so a `Session` can be shared
/// across threads (wrapped in an `Arc`) but serialises all RPC traffic to the
/// server - this crate does not pipeline concurrent calls onto one socket.
#[derive(Debug)]
pub struct Session {
    host: String,
    port_mapper_port: u16,
    timeout: Duration,
    max_reply_len: usize,
    max_nfs_reply_len: usize,
    socket: Mutex<Option<(u16, TcpStream)>>,
    mount_port: Mutex<Option<u16>>,
    nfs_port: Mutex<Option<u16>>,
    sent: AtomicU64,
    received: AtomicU64,
}

impl Session {
    /// Construct a new, disconnected `Session` targeting `host`'s
    /// port-mapper on `port_mapper_port` (typically 111).
    pub fn new(host: impl Into<String>, port_mapper_port: u16) -> Self {
        Self {
            host: host.into(),
            port_mapper_port,
            timeout: DEFAULT_TIMEOUT,
            max_reply_len: DEFAULT_MAX_REPLY_LEN,
            max_nfs_reply_len: DEFAULT_MAX_NFS_REPLY_LEN,
            socket: Mutex::new(None),
            mount_port: Mutex::new(None),
            nfs_port: Mutex::new(None),
            sent: AtomicU64::new(0),
            received: AtomicU64::new(0),
        }
    }

    /// Overrides the send/receive timeout applied to every RPC exchange.
    /// Defaults to 10 seconds.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Overrides the sanity bound on a single port-mapper or MOUNT reply's
    /// on-wire length. Defaults to 1 MiB; replies larger than this are
    /// rejected before their body is read, to bound how much a misbehaving
    /// server can make this crate allocate.
    pub fn with_max_reply_len(mut self, max: usize) -> Self {
        self.max_reply_len = max;
        self
    }

    /// Overrides the sanity bound on a single NFS reply's on-wire length.
    /// Defaults to 1 MiB plus a small envelope allowance, enough for a full
    /// [`crate::nfs::read`] at its default size; raise this if a larger read
    /// size is configured.
    pub fn with_max_nfs_reply_len(mut self, max: usize) -> Self {
        self.max_nfs_reply_len = max;
        self
    }

    /// The server hostname this session connects to.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The port-mapper port configured for this session.
    pub fn port_mapper_port(&self) -> u16 {
        self.port_mapper_port
    }

    /// Total bytes written to the socket over this session's lifetime.
    pub fn bytes_sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Total bytes read from the socket over this session's lifetime.
    pub fn bytes_received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Opens a TCP connection to `self.host()` on `port`.
    ///
    /// Returns [`Error::AlreadyConnected`] if a socket is already open - the
    /// caller must [`disconnect`](Session::disconnect) first. The address is
    /// resolved only after the already-connected check passes, matching how
    /// a single in-flight connection is guaranteed for the lifetime of the
    /// lock.
    pub fn connect(&self, port: u16) -> Result<(), Error> {
        let mut guard = self.socket.lock().expect("session mutex poisoned");
        if guard.is_some() {
            return Err(Error::AlreadyConnected);
        }

        let addr = format!("{}:{}", self.host, port);
        let mut addrs = addr
            .to_socket_addrs()
            .map_err(|e| Error::IoResolutionFailed(addr.clone(), e.to_string()))?;
        let target = addrs
            .next()
            .ok_or_else(|| Error::IoResolutionFailed(addr.clone(), "no addresses".to_string()))?;

        tracing::debug!(host = %self.host, port, "connecting");

        let stream = TcpStream::connect(target)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;
        stream.set_nodelay(true)?;

        *guard = Some((port, stream));
        Ok(())
    }

    /// Closes the session's socket, if any is open.
    pub fn disconnect(&self) {
        let mut guard = self.socket.lock().expect("session mutex poisoned");
        if guard.take().is_some() {
            tracing::debug!(host = %self.host, "disconnected");
        }
    }

    /// Returns `true` if the session currently holds an open socket.
    pub fn is_connected(&self) -> bool {
        self.socket.lock().expect("session mutex poisoned").is_some()
    }

    /// The port the session is currently connected to, if any.
    pub fn current_port(&self) -> Option<u16> {
        self.socket
            .lock()
            .expect("session mutex poisoned")
            .as_ref()
            .map(|(port, _)| *port)
    }

    /// Ensures the session is connected to `port`, disconnecting and
    /// reconnecting first if it is currently connected to a different one.
    /// A no-op if already connected to `port`.
    pub fn switch_to(&self, port: u16) -> Result<(), Error> {
        if self.current_port() == Some(port) {
            return Ok(());
        }

        if self.is_connected() {
            self.disconnect();
        }

        self.connect(port)
    }

    /// Resolves and caches the MOUNT program's port via the port-mapper,
    /// reusing a previously-discovered value.
    pub(crate) fn ensure_mount_port(&self) -> Result<u16, Error> {
        if let Some(p) = *self.mount_port.lock().expect("mount port mutex poisoned") {
            return Ok(p);
        }

        self.switch_to(self.port_mapper_port)?;
        let port = crate::portmap::get_port(self, crate::mount::MOUNT_PROGRAM, 3)?;

        *self.mount_port.lock().expect("mount port mutex poisoned") = Some(port);
        Ok(port)
    }

    /// Seeds the cached MOUNT port directly, skipping port-mapper discovery.
    #[cfg(test)]
    pub(crate) fn seed_mount_port(&self, port: u16) {
        *self.mount_port.lock().expect("mount port mutex poisoned") = Some(port);
    }

    /// Seeds the cached NFS port directly, skipping port-mapper discovery.
    #[cfg(test)]
    pub(crate) fn seed_nfs_port(&self, port: u16) {
        *self.nfs_port.lock().expect("nfs port mutex poisoned") = Some(port);
    }

    /// Resolves and caches the NFS program's port via the port-mapper,
    /// reusing a previously-discovered value.
    pub(crate) fn ensure_nfs_port(&self) -> Result<u16, Error> {
        if let Some(p) = *self.nfs_port.lock().expect("nfs port mutex poisoned") {
            return Ok(p);
        }

        self.switch_to(self.port_mapper_port)?;
        let port = crate::portmap::get_port(self, crate::nfs::NFS_PROGRAM, 3)?;

        *self.nfs_port.lock().expect("nfs port mutex poisoned") = Some(port);
        Ok(port)
    }

    /// Performs one RPC call/reply exchange against the currently-connected
    /// port, authenticating with `AUTH_SYS` (uid 0, gid 0, one auxiliary gid
    /// of 0 - the reference client never runs as anything else).
    ///
    /// Returns the raw bytes of the procedure-specific result, with the RPC
    /// envelope already stripped and validated.
    pub(crate) fn call(
        &self,
        program: u32,
        program_version: u32,
        procedure: u32,
        payload: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let xid = xid::next();
        let credentials = self.auth_sys();

        let msg = RpcMessage::new(
            xid,
            MessageType::Call(CallBody::new(
                program,
                program_version,
                procedure,
                credentials,
                AuthFlavor::AuthNone(None),
                payload,
            )),
        );
        let wire = msg.serialise()?;

        let mut guard = self.socket.lock().expect("session mutex poisoned");
        let (port, stream) = guard.as_mut().ok_or(Error::NotConnected)?;
        let port = *port;

        stream.write_all(&wire)?;
        self.sent.fetch_add(wire.len() as u64, Ordering::Relaxed);

        let reply_bytes = self.receive_one(stream, port)?;
        self.received
            .fetch_add(reply_bytes.len() as u64, Ordering::Relaxed);

        // Drop the lock before decoding - parsing never touches the socket.
        drop(guard);

        let reply = RpcMessage::from_bytes(&reply_bytes)?;

        // XID first, then message type, then accept/reject - the same order
        // the reference client checks a reply in.
        if reply.xid() != xid {
            return Err(Error::RpcXidMismatch {
                sent: xid,
                received: reply.xid(),
            });
        }

        match reply.message() {
            MessageType::Call(_) => Err(Error::RpcProtocol(
                "server sent a CALL message in reply position".to_string(),
            )),
            MessageType::Reply(ReplyBody::Denied(rejected)) => {
                use crate::reply::RejectedReply;
                match rejected {
                    RejectedReply::RpcVersionMismatch { low, high } => {
                        Err(Error::RpcVersionMismatch {
                            low: *low,
                            high: *high,
                        })
                    }
                    RejectedReply::AuthError(e) => Err(Error::RpcAuthError(e.clone())),
                }
            }
            MessageType::Reply(ReplyBody::Accepted(accepted)) => match accepted.status() {
                AcceptedStatus::Success(data) => {
                    if let AuthFlavor::Unknown { id, .. } = accepted.auth_verifier() {
                        return Err(Error::AuthNotSupported(*id));
                    }
                    Ok(data.to_vec())
                }
                AcceptedStatus::ProgramUnavailable => Err(Error::RpcProgramUnavail(program)),
                AcceptedStatus::ProgramMismatch { low, high } => Err(Error::RpcProgramMismatch {
                    low: *low,
                    high: *high,
                }),
                AcceptedStatus::ProcedureUnavailable => Err(Error::RpcProcUnavail(procedure)),
                AcceptedStatus::GarbageArgs => Err(Error::RpcGarbageArgs),
                AcceptedStatus::SystemError => Err(Error::RpcServerFailure),
            },
        }
    }

    /// Reads one complete record-marked RPC message from `stream`, bounding
    /// the total wait across however many partial reads it takes by
    /// `self.timeout` - unlike a bare retry-on-`EAGAIN` loop, this always
    /// terminates. `port` selects which of the two size bounds applies: NFS
    /// replies get the larger, separately configurable one.
    fn receive_one(&self, stream: &mut TcpStream, port: u16) -> Result<Vec<u8>, Error> {
        let deadline = Instant::now() + self.timeout;

        let mut header = [0u8; 4];
        self.read_with_deadline(stream, &mut header, deadline)?;

        let max_reply_len = if Some(port) == *self.nfs_port.lock().expect("nfs port mutex poisoned") {
            self.max_nfs_reply_len
        } else {
            self.max_reply_len
        };

        let total_len = expected_message_len(&header)? as usize;
        if total_len > max_reply_len {
            return Err(Error::RpcOversize {
                got: total_len as u32,
                max: max_reply_len,
            });
        }

        let mut buf = vec![0u8; total_len];
        buf[..4].copy_from_slice(&header);
        self.read_with_deadline(stream, &mut buf[4..], deadline)?;

        Ok(buf)
    }

    fn read_with_deadline(
        &self,
        stream: &mut TcpStream,
        buf: &mut [u8],
        deadline: Instant,
    ) -> Result<(), Error> {
        let mut filled = 0;

        while filled < buf.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::IoTimeout(self.timeout));
            }

            stream.set_read_timeout(Some(remaining))?;

            match stream.read(&mut buf[filled..]) {
                Ok(0) => {
                    return Err(Error::IoBroken(
                        self.host.clone(),
                        "connection closed by peer".to_string(),
                    ))
                }
                Ok(n) => filled += n,
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    // The deadline check above bounds the total time spent
                    // looping here.
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }

    fn auth_sys(&self) -> AuthFlavor<&'static [u8]> {
        let stamp = xid::next();
        let machine_name = hostname::local_machine_name().as_bytes();
        AuthFlavor::AuthUnix(AuthUnixParams::new(
            stamp,
            machine_name,
            0,
            0,
            Some(smallvec![0]),
        ))
    }
}
