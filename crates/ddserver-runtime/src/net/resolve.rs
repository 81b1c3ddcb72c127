//! Name resolution and sockaddr conversion
//!
//! `getaddrinfo` results are copied out into owned [`AddressCandidate`]s
//! and the C list is freed before [`resolve`] returns, so nothing outside
//! this file ever points into resolver memory.

use ddserver_core::{kerror, NetError, NetResult};
use std::ffi::{CStr, CString};
use std::fmt;
use std::mem;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::ptr;

/// Datagram (UDP) or stream (TCP)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SocketKind {
    #[default]
    Datagram,
    Stream,
}

impl SocketKind {
    pub(crate) fn raw(self) -> libc::c_int {
        match self {
            SocketKind::Datagram => libc::SOCK_DGRAM,
            SocketKind::Stream => libc::SOCK_STREAM,
        }
    }
}

impl fmt::Display for SocketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketKind::Datagram => f.write_str("UDP"),
            SocketKind::Stream => f.write_str("TCP"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrFamily {
    Ipv4,
    Ipv6,
}

impl AddrFamily {
    pub(crate) fn raw(self) -> libc::c_int {
        match self {
            AddrFamily::Ipv4 => libc::AF_INET,
            AddrFamily::Ipv6 => libc::AF_INET6,
        }
    }
}

impl fmt::Display for AddrFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddrFamily::Ipv4 => f.write_str("IPv4"),
            AddrFamily::Ipv6 => f.write_str("IPv6"),
        }
    }
}

/// One resolved address/socket-type combination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressCandidate {
    pub family: AddrFamily,
    pub kind: SocketKind,
    pub protocol: libc::c_int,
    pub addr: SocketAddr,
}

impl AddressCandidate {
    /// Candidate for an address that came from the kernel (recvfrom/accept)
    pub fn from_addr(addr: SocketAddr, kind: SocketKind) -> Self {
        let family = match addr {
            SocketAddr::V4(_) => AddrFamily::Ipv4,
            SocketAddr::V6(_) => AddrFamily::Ipv6,
        };
        Self {
            family,
            kind,
            protocol: 0,
            addr,
        }
    }
}

/// Owns a getaddrinfo list until dropped
struct AddrInfoList(*mut libc::addrinfo);

impl Drop for AddrInfoList {
    fn drop(&mut self) {
        if !self.0.is_null() {
            unsafe { libc::freeaddrinfo(self.0) };
        }
    }
}

/// Resolve `host:port` for `kind`, in resolver order
pub fn resolve(host: &str, port: u16, kind: SocketKind) -> NetResult<Vec<AddressCandidate>> {
    let resolution_error = |reason: String| {
        kerror!("getaddrinfo {}", reason);
        NetError::Resolution {
            host: host.to_string(),
            port,
            reason,
        }
    };

    let c_host = CString::new(host).map_err(|_| resolution_error("host contains NUL".into()))?;
    let c_port =
        CString::new(port.to_string()).map_err(|_| resolution_error("bad service".into()))?;

    let mut hints: libc::addrinfo = unsafe { mem::zeroed() };
    hints.ai_family = libc::AF_UNSPEC;
    hints.ai_socktype = kind.raw();

    let mut head: *mut libc::addrinfo = ptr::null_mut();
    let status = unsafe { libc::getaddrinfo(c_host.as_ptr(), c_port.as_ptr(), &hints, &mut head) };
    if status != 0 {
        let reason = unsafe { CStr::from_ptr(libc::gai_strerror(status)) }
            .to_string_lossy()
            .into_owned();
        return Err(resolution_error(reason));
    }
    let list = AddrInfoList(head);

    let mut candidates = Vec::new();
    let mut cursor = list.0;
    while !cursor.is_null() {
        let info = unsafe { &*cursor };
        let addr = unsafe { sockaddr_to_std(info.ai_addr, info.ai_addrlen) };
        if let Some(addr) = addr {
            let mut candidate = AddressCandidate::from_addr(addr, kind);
            candidate.protocol = info.ai_protocol;
            candidates.push(candidate);
        }
        cursor = info.ai_next;
    }

    Ok(candidates)
}

/// Copy a C sockaddr into a `SocketAddr`; other families give `None`
///
/// # Safety
/// `addr` must be null or point to at least `len` readable bytes.
pub(crate) unsafe fn sockaddr_to_std(
    addr: *const libc::sockaddr,
    len: libc::socklen_t,
) -> Option<SocketAddr> {
    if addr.is_null() {
        return None;
    }
    let len = len as usize;

    match (*addr).sa_family as libc::c_int {
        libc::AF_INET if len >= mem::size_of::<libc::sockaddr_in>() => {
            let sin = ptr::read_unaligned(addr as *const libc::sockaddr_in);
            let ip = Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr));
            Some(SocketAddr::V4(SocketAddrV4::new(ip, u16::from_be(sin.sin_port))))
        }
        libc::AF_INET6 if len >= mem::size_of::<libc::sockaddr_in6>() => {
            let sin6 = ptr::read_unaligned(addr as *const libc::sockaddr_in6);
            Some(SocketAddr::V6(SocketAddrV6::new(
                Ipv6Addr::from(sin6.sin6_addr.s6_addr),
                u16::from_be(sin6.sin6_port),
                sin6.sin6_flowinfo,
                sin6.sin6_scope_id,
            )))
        }
        _ => None,
    }
}

/// `SocketAddr` to a C sockaddr plus its length
pub(crate) fn std_to_sockaddr(addr: &SocketAddr) -> (libc::sockaddr_storage, libc::socklen_t) {
    let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };

    let len = match addr {
        SocketAddr::V4(v4) => {
            let mut sin: libc::sockaddr_in = unsafe { mem::zeroed() };
            sin.sin_family = libc::AF_INET as libc::sa_family_t;
            sin.sin_port = v4.port().to_be();
            sin.sin_addr = libc::in_addr {
                s_addr: u32::from(*v4.ip()).to_be(),
            };
            unsafe { ptr::write(&mut storage as *mut _ as *mut libc::sockaddr_in, sin) };
            mem::size_of::<libc::sockaddr_in>()
        }
        SocketAddr::V6(v6) => {
            let mut sin6: libc::sockaddr_in6 = unsafe { mem::zeroed() };
            sin6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
            sin6.sin6_port = v6.port().to_be();
            sin6.sin6_flowinfo = v6.flowinfo();
            sin6.sin6_scope_id = v6.scope_id();
            sin6.sin6_addr = libc::in6_addr {
                s6_addr: v6.ip().octets(),
            };
            unsafe { ptr::write(&mut storage as *mut _ as *mut libc::sockaddr_in6, sin6) };
            mem::size_of::<libc::sockaddr_in6>()
        }
    };

    (storage, len as libc::socklen_t)
}
