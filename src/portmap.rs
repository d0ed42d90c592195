//! Port-mapper (`PMAP`, RFC 1833) lookups used to discover the MOUNT and NFS
//! service ports on a server before connecting to them directly.

use crate::session::Session;
use crate::xdr;
use crate::Error;

const PMAP_PROGRAM: u32 = 100000;
const PMAP_VERSION: u32 = 2;
const PMAPPROC_GETPORT: u32 = 3;

const IPPROTO_TCP: u32 = 6;

/// The well-known port-mapper service port.
pub const PORTMAPPER_PORT: u16 = 111;

/// Asks the port-mapper a session is connected to for the TCP port serving
/// `(program, version)`.
///
/// Returns [`Error::PortNotRegistered`] if the port-mapper has no
/// registration for the requested program - a port of `0` on the wire means
/// "not registered", matching `PMAPPROC_GETPORT`'s documented behaviour.
pub(crate) fn get_port(session: &Session, program: u32, version: u32) -> Result<u16, Error> {
    let mut args = Vec::with_capacity(16);
    xdr::encode_u32(&mut args, program);
    xdr::encode_u32(&mut args, version);
    xdr::encode_u32(&mut args, IPPROTO_TCP);
    xdr::encode_u32(&mut args, 0);

    let reply = session.call(PMAP_PROGRAM, PMAP_VERSION, PMAPPROC_GETPORT, &args)?;

    let mut c = std::io::Cursor::new(reply.as_slice());
    let port = xdr::decode_u32(&mut c)?;

    if port == 0 || port > u16::MAX as u32 {
        return Err(Error::PortNotRegistered { program, version });
    }

    Ok(port as u16)
}
