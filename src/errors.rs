use thiserror::Error;

/// Error types returned by this crate.
///
/// Variants are grouped by layer: wire transport, XDR decoding, RPC-level
/// rejection/acceptance taxonomy, protocol-level (NFS/MOUNT) status codes,
/// and client-side policy decisions. Nothing in this crate swallows an
/// error - every fallible operation returns one of these verbatim.
#[non_exhaustive]
#[derive(Debug, Error, PartialEq)]
pub enum Error {
    // ---- Io -----------------------------------------------------------
    /// The socket was closed or failed mid-exchange.
    #[error("connection to {0} broken: {1}")]
    IoBroken(String, String),

    /// No complete reply arrived before the configured receive timeout
    /// elapsed.
    #[error("timed out waiting for reply after {0:?}")]
    IoTimeout(std::time::Duration),

    /// The server hostname could not be resolved to an address.
    #[error("failed to resolve {0}: {1}")]
    IoResolutionFailed(String, String),

    /// An attempt was made to connect an already-open session socket.
    #[error("session is already connected")]
    AlreadyConnected,

    /// An operation that requires a connected socket was attempted on a
    /// disconnected session.
    #[error("session is not connected")]
    NotConnected,

    // ---- Xdr ------------------------------------------------------------
    /// A decode read past the end of the supplied buffer.
    #[error("xdr buffer truncated: wanted {wanted} bytes, had {available}")]
    XdrTruncated {
        /// Number of bytes the decode needed.
        wanted: usize,
        /// Number of bytes actually remaining in the buffer.
        available: usize,
    },

    /// A length-prefixed field declared a size larger than the caller's
    /// configured maximum.
    #[error("xdr field of {got} bytes exceeds maximum of {max} bytes")]
    XdrOversize {
        /// The length prefix read from the wire.
        got: u32,
        /// The caller-supplied maximum.
        max: usize,
    },

    /// An encode ran out of space in the destination buffer.
    #[error("xdr destination buffer is full")]
    XdrBufferFull,

    // ---- RpcTransport ---------------------------------------------------
    /// The reply's transaction ID did not match the transaction ID of the
    /// outstanding call.
    #[error("rpc xid mismatch: sent {sent}, received {received}")]
    RpcXidMismatch {
        /// The XID the client sent.
        sent: u32,
        /// The XID the server echoed.
        received: u32,
    },

    /// The record-mark fragment length exceeds the session's configured
    /// sanity bound.
    #[error("rpc message of {got} bytes exceeds the {max} byte sanity bound")]
    RpcOversize {
        /// The fragment length read from the record mark.
        got: u32,
        /// The configured maximum.
        max: usize,
    },

    /// The message did not conform to the ONC RPC message framing (e.g. a
    /// message type other than CALL/REPLY, or a fragmented message).
    #[error("rpc protocol violation: {0}")]
    RpcProtocol(String),

    // ---- RpcRejected ------------------------------------------------------
    /// The server rejected the RPC version used in the request.
    #[error("rpc version mismatch: server supports {low}-{high}")]
    RpcVersionMismatch {
        /// Lowest RPC version the server accepts.
        low: u32,
        /// Highest RPC version the server accepts.
        high: u32,
    },

    /// The server rejected the request's authentication.
    #[error("rpc auth error: {0:?}")]
    RpcAuthError(crate::reply::AuthError),

    // ---- RpcAccepted-but-failed --------------------------------------------
    /// The server has no handler for the requested program number.
    #[error("rpc program {0} unavailable on server")]
    RpcProgramUnavail(u32),

    /// The server has the program, but not the requested version.
    #[error("rpc program version mismatch: server supports {low}-{high}")]
    RpcProgramMismatch {
        /// Lowest program version the server accepts.
        low: u32,
        /// Highest program version the server accepts.
        high: u32,
    },

    /// The server does not recognise the requested procedure number.
    #[error("rpc procedure {0} unavailable on server")]
    RpcProcUnavail(u32),

    /// The server could not decode the procedure arguments.
    #[error("rpc call rejected as garbage arguments")]
    RpcGarbageArgs,

    /// The server encountered an internal error servicing the call.
    #[error("rpc server-side failure")]
    RpcServerFailure,

    // ---- Program ----------------------------------------------------------
    /// An NFS procedure returned a non-OK `nfsstat3` status.
    #[error("nfs procedure failed: {0:?}")]
    NfsStatus(crate::nfs::NfsStat),

    /// A MOUNT procedure returned a non-OK `mountstat3` status.
    #[error("mount procedure failed: {0:?}")]
    MountStatus(crate::mount::MountStat),

    /// The port-mapper has no registration for the requested
    /// (program, version, protocol) tuple.
    #[error("program {program} version {version} is not registered with the port-mapper")]
    PortNotRegistered {
        /// The RPC program number that was looked up.
        program: u32,
        /// The RPC program version that was looked up.
        version: u32,
    },

    // ---- Client policy ------------------------------------------------------
    /// A filename failed client-side name hygiene checks (contained a `..`
    /// path segment).
    #[error("invalid name: {0:?} contains a parent-directory segment")]
    InvalidName(String),

    /// The session was asked to use an auth flavor this crate does not
    /// implement on the wire (`AUTH_SHORT`, `AUTH_DH`, `RPCSEC_GSS`).
    #[error("auth flavor {0} is recognised but not supported")]
    AuthNotSupported(u32),

    /// A file handle returned by the server exceeds the NFSv3 64 byte
    /// limit.
    #[error("file handle of {0} bytes exceeds the 64 byte NFSv3 limit")]
    HandleTooLong(usize),

    /// An I/O error occurred that does not fit one of the more specific
    /// `Io*` variants above.
    #[error("i/o error ({0:?}): {1}")]
    IOError(std::io::ErrorKind, String),

    // ---- Wire framing (C2) -------------------------------------------------
    /// A length-prefixed field or array declared a length that does not fit
    /// in the remaining buffer.
    #[error("invalid length")]
    InvalidLength,

    /// A `CallBody` was parsed with an RPC version other than `2`.
    #[error("invalid rpc version: {0}")]
    InvalidRpcVersion(u32),

    /// An `AuthFlavor`'s opaque payload could not be parsed for its
    /// declared flavor.
    #[error("invalid auth data")]
    InvalidAuthData,

    /// The message type field of an [`RpcMessage`](crate::RpcMessage) was
    /// neither `CALL` (0) nor `REPLY` (1).
    #[error("invalid message type: {0}")]
    InvalidMessageType(u32),

    /// The deserialised message's length does not match the number of
    /// bytes actually present in the buffer.
    #[error("incomplete message: expected {expected} bytes, buffer holds {buffer_len}")]
    IncompleteMessage {
        /// Number of bytes actually present in the buffer.
        buffer_len: usize,
        /// Number of bytes the deserialised message expects.
        expected: usize,
    },

    /// Fewer than the 4 bytes of a record-mark header were available.
    #[error("incomplete record-mark header")]
    IncompleteHeader,

    /// A record-marked message spans more than one fragment; this crate
    /// only handles single-fragment messages.
    #[error("message is fragmented across multiple records")]
    Fragmented,

    /// An unknown `reject_stat` value was encountered in a `RejectedReply`.
    #[error("invalid rejected reply type: {0}")]
    InvalidRejectedReplyType(u32),

    /// An unknown `auth_stat` value was encountered.
    #[error("invalid auth error code: {0}")]
    InvalidAuthError(u32),

    /// An unknown `accept_stat` value was encountered in an `AcceptedReply`.
    #[error("invalid reply status: {0}")]
    InvalidReplyStatus(u32),

    /// An unknown `reply_stat` value was encountered in a `ReplyBody`.
    #[error("invalid reply type: {0}")]
    InvalidReplyType(u32),
}

impl From<std::io::Error> for Error {
    fn from(v: std::io::Error) -> Self {
        Self::IOError(v.kind(), v.to_string())
    }
}
