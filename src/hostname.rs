//! Resolution of the local machine name used in the `AUTH_SYS` credential.
//!
//! The reference implementation resolves `gethostname(2)` once and follows it
//! with a `getaddrinfo` canonical-name lookup to produce a fully-qualified
//! name. This crate only takes the `gethostname(2)` half of that - the
//! credential is a courtesy identifier servers never authenticate against, so
//! spending a DNS round trip (and a dependency on a resolver crate) on it
//! isn't worth it. The short hostname is resolved once per process and
//! cached.

use std::ffi::CStr;
use std::sync::OnceLock;

static CACHED: OnceLock<String> = OnceLock::new();

/// Returns the cached local machine name, resolving it via `gethostname(2)`
/// on first use.
///
/// Falls back to an empty string if the name cannot be determined or is not
/// valid UTF-8 - an empty machine name is a legal `AUTH_SYS` credential.
pub(crate) fn local_machine_name() -> &'static str {
    CACHED.get_or_init(resolve)
}

fn resolve() -> String {
    let mut buf = [0u8; 256];

    // SAFETY: `buf` is a valid, correctly-sized, non-null buffer for the
    // duration of the call.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        return String::new();
    }

    // SAFETY: gethostname NUL-terminates on success within the buffer we
    // supplied.
    let cstr = unsafe { CStr::from_ptr(buf.as_ptr().cast()) };
    cstr.to_str().unwrap_or_default().to_owned()
}
