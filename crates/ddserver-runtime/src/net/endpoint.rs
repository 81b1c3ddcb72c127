//! Socket endpoint: one descriptor plus the address it was selected for
//!
//! Lifecycle:
//!
//! ```text
//!   resolve_and_select ──► client (address kept as per-packet destination)
//!          │
//!          └──► bind_as_server ──► listening/receiving
//!
//!   close() or drop closes the descriptor exactly once
//! ```

use ddserver_core::constants::{BACKLOG, CHANNEL_CAPACITY};
use ddserver_core::message::decode;
use ddserver_core::{kdebug, kerror, kplain, kstatus, kwarn};
use ddserver_core::{Message, MsgTag, NetError, NetResult, WireFormat};
use std::io;
use std::mem;
use std::net::SocketAddr;
use std::os::unix::io::RawFd;

use super::resolve::{resolve, sockaddr_to_std, std_to_sockaddr, AddressCandidate, SocketKind};
use crate::platform::set_nonblocking;

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android"))] {
        const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;
    } else {
        const SEND_FLAGS: libc::c_int = 0;
    }
}

/// How `bind_with` prepares the socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindOptions {
    /// Set SO_REUSEADDR before binding
    pub reuse_address: bool,
    /// listen() backlog for stream sockets
    pub backlog: i32,
}

impl Default for BindOptions {
    fn default() -> Self {
        Self {
            reuse_address: true,
            backlog: BACKLOG as i32,
        }
    }
}

/// One received payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecvMsg {
    /// Bytes on the wire, tag prefix included
    pub bytes_read: usize,
    /// Payload text, cut at the first NUL
    pub msg: String,
    pub tag: MsgTag,
    /// Reply address; `None` on connected stream sockets
    pub sender: Option<SocketAddr>,
}

/// Socket handle bundling a descriptor with its selected address
#[derive(Debug)]
pub struct Endpoint {
    fd: Option<RawFd>,
    selected: Option<AddressCandidate>,
    host: String,
    port: u16,
    kind: SocketKind,
    connected: bool,
    wire_format: WireFormat,
}

/// Resolve `host:port` and open a non-blocking socket on the first
/// candidate that accepts one
pub fn resolve_and_select(host: &str, port: u16, kind: SocketKind) -> NetResult<Endpoint> {
    kdebug!("Creating {} socket on port {}", kind, port);
    kdebug!("IP addresses for {}:", host);

    for candidate in resolve(host, port, kind)? {
        kdebug!("\t{}: {}", candidate.family, candidate.addr.ip());

        match open_socket(&candidate) {
            Ok(fd) => {
                return Ok(Endpoint {
                    fd: Some(fd),
                    selected: Some(candidate),
                    host: host.to_string(),
                    port,
                    kind,
                    connected: false,
                    wire_format: WireFormat::default(),
                })
            }
            Err(e) => kwarn!("Socket file descriptor creation error: {}", e),
        }
    }

    kerror!("No usable socket for {}:{}", host, port);
    Err(NetError::NoUsableCandidate {
        host: host.to_string(),
        port,
    })
}

/// Client endpoint for a peer first seen as a datagram sender
///
/// The sender's IP is turned back into text and resolved again with
/// `port`, which is normally the local listening port.
pub fn create_endpoint_from_peer_address(sender: SocketAddr, port: u16) -> NetResult<Endpoint> {
    let host = sender.ip().to_string();
    kdebug!("Registering peer {} on port {}", host, port);
    resolve_and_select(&host, port, SocketKind::Datagram)
}

fn open_socket(candidate: &AddressCandidate) -> io::Result<RawFd> {
    let fd = unsafe {
        libc::socket(
            candidate.family.raw(),
            candidate.kind.raw(),
            candidate.protocol,
        )
    };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    if let Err(e) = set_nonblocking(fd) {
        unsafe { libc::close(fd) };
        return Err(e);
    }
    Ok(fd)
}

impl Endpoint {
    fn raw_fd(&self, op: &str) -> NetResult<RawFd> {
        match self.fd {
            Some(fd) => Ok(fd),
            None => {
                kerror!("{} on {}:{}: socket is closed", op, self.host, self.port);
                Err(NetError::Closed)
            }
        }
    }

    /// Close the descriptor and hand back a bind-stage error
    fn fail_bind(&mut self, err: NetError) -> NetResult<()> {
        self.close();
        Err(err)
    }

    /// Bind with address reuse and the default backlog
    pub fn bind_as_server(&mut self) -> NetResult<()> {
        self.bind_with(BindOptions::default())
    }

    /// Bind to the selected candidate; stream sockets also listen
    ///
    /// The descriptor is closed when setting SO_REUSEADDR, bind or listen
    /// fails.
    pub fn bind_with(&mut self, options: BindOptions) -> NetResult<()> {
        let candidate = match self.selected {
            Some(candidate) => candidate,
            None => {
                kerror!("Server failed to bind: no selected address");
                return Err(NetError::NoCandidate);
            }
        };
        let fd = self.raw_fd("bind")?;

        if options.reuse_address {
            let yes: libc::c_int = 1;
            let rc = unsafe {
                libc::setsockopt(
                    fd,
                    libc::SOL_SOCKET,
                    libc::SO_REUSEADDR,
                    &yes as *const _ as *const libc::c_void,
                    mem::size_of::<libc::c_int>() as libc::socklen_t,
                )
            };
            if rc != 0 {
                let source = io::Error::last_os_error();
                kerror!("Socket port reuse: {}", source);
                return self.fail_bind(NetError::SocketOption {
                    option: "SO_REUSEADDR",
                    source,
                });
            }
        }

        let (storage, len) = std_to_sockaddr(&candidate.addr);
        let rc = unsafe { libc::bind(fd, &storage as *const _ as *const libc::sockaddr, len) };
        if rc != 0 {
            let e = io::Error::last_os_error();
            kerror!("Socket bind {}: {}", candidate.addr, e);
            return self.fail_bind(NetError::Bind(e));
        }

        if self.kind == SocketKind::Stream {
            if unsafe { libc::listen(fd, options.backlog) } != 0 {
                let e = io::Error::last_os_error();
                kerror!("Socket listen: {}", e);
                return self.fail_bind(NetError::Listen(e));
            }
        }

        // Port 0 asks the kernel to pick one
        if self.port == 0 {
            if let Ok(local) = self.local_addr() {
                self.port = local.port();
            }
        }

        kstatus!("Server waiting on data...");
        Ok(())
    }

    /// Start a stream connection to the selected address
    ///
    /// The socket is non-blocking, so an in-progress connect counts as
    /// success; the first send reports a refused peer.
    pub fn connect(&mut self) -> NetResult<()> {
        let Some(candidate) = self.selected else {
            kerror!(
                "Connection un-established-> {}:{}: no selected address",
                self.host,
                self.port
            );
            return Err(NetError::NoCandidate);
        };
        let fd = self.raw_fd("connect")?;

        let (storage, len) = std_to_sockaddr(&candidate.addr);
        let rc = unsafe { libc::connect(fd, &storage as *const _ as *const libc::sockaddr, len) };
        if rc != 0 {
            let e = io::Error::last_os_error();
            if e.raw_os_error() != Some(libc::EINPROGRESS) {
                kerror!("Connection un-established-> {}: {}", candidate.addr, e);
                return Err(NetError::Connect(e));
            }
        }

        self.connected = true;
        kstatus!("Connecting to {}", candidate.addr);
        Ok(())
    }

    /// Accept one pending stream connection; `None` when nothing is queued
    pub fn accept(&self) -> NetResult<Option<Endpoint>> {
        let fd = self.raw_fd("accept")?;

        let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
        let mut len = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
        let client = unsafe {
            libc::accept(fd, &mut storage as *mut _ as *mut libc::sockaddr, &mut len)
        };
        if client < 0 {
            let e = io::Error::last_os_error();
            if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) {
                return Ok(None);
            }
            kerror!("accept: {}", e);
            return Err(NetError::Accept(e));
        }

        if let Err(e) = set_nonblocking(client) {
            unsafe { libc::close(client) };
            kerror!("accept: {}", e);
            return Err(NetError::Accept(e));
        }

        let peer = unsafe { sockaddr_to_std(&storage as *const _ as *const libc::sockaddr, len) };
        kstatus!(
            "Accepted connection from {}",
            peer.map(|p| p.to_string()).unwrap_or_else(|| "unknown".into())
        );

        Ok(Some(Endpoint {
            fd: Some(client),
            selected: peer.map(|p| AddressCandidate::from_addr(p, SocketKind::Stream)),
            host: peer.map(|p| p.ip().to_string()).unwrap_or_default(),
            port: peer.map(|p| p.port()).unwrap_or(0),
            kind: SocketKind::Stream,
            connected: true,
            wire_format: self.wire_format,
        }))
    }

    /// Encode and send one message to this endpoint's address
    ///
    /// Never retries. A short send is logged as a warning and reported.
    pub fn send(&self, message: &Message) -> NetResult<usize> {
        let fd = self.raw_fd("send")?;
        let payload = message.encode(self.wire_format);

        let rc = if self.connected {
            unsafe { libc::send(fd, payload.as_ptr().cast(), payload.len(), SEND_FLAGS) }
        } else {
            let Some(candidate) = self.selected else {
                kerror!("send to {}:{}: no selected address", self.host, self.port);
                return Err(NetError::NoCandidate);
            };
            let (storage, len) = std_to_sockaddr(&candidate.addr);
            unsafe {
                libc::sendto(
                    fd,
                    payload.as_ptr().cast(),
                    payload.len(),
                    SEND_FLAGS,
                    &storage as *const _ as *const libc::sockaddr,
                    len,
                )
            }
        };

        if rc < 0 {
            let e = io::Error::last_os_error();
            kwarn!("sendto Failure: {}", e);
            return Err(NetError::Send(e));
        }

        let sent = rc as usize;
        if sent < payload.len() {
            kwarn!("Sent {}B out of {}B", sent, payload.len());
            return Err(NetError::ShortSend {
                sent,
                expected: payload.len(),
            });
        }

        kplain!("Sent {}B out of {}B", sent, payload.len());
        Ok(sent)
    }

    /// One non-blocking receive
    ///
    /// `Ok(None)` means nothing was waiting. Any other OS error is a
    /// `NetError::Receive`, which callers treat as fatal for the loop.
    pub fn receive(&self) -> NetResult<Option<RecvMsg>> {
        let fd = self.raw_fd("receive")?;

        let mut buf = [0u8; CHANNEL_CAPACITY];
        let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
        let mut len = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;

        let rc = unsafe {
            libc::recvfrom(
                fd,
                buf.as_mut_ptr().cast(),
                CHANNEL_CAPACITY - 1,
                0,
                &mut storage as *mut _ as *mut libc::sockaddr,
                &mut len,
            )
        };

        if rc < 0 {
            let e = io::Error::last_os_error();
            if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) {
                return Ok(None);
            }
            kerror!("recvfrom Error: {}", e);
            return Err(NetError::Receive(e));
        }

        let bytes_read = rc as usize;
        if bytes_read == 0 && self.kind == SocketKind::Stream {
            kstatus!("Peer closed the connection");
            return Err(NetError::Closed);
        }

        let sender = unsafe { sockaddr_to_std(&storage as *const _ as *const libc::sockaddr, len) };
        let decoded = decode(&buf[..bytes_read], self.wire_format);

        kdebug!(
            "Received {}B packet from: {}",
            bytes_read,
            sender.map(|s| s.ip().to_string()).unwrap_or_else(|| self.host.clone())
        );

        Ok(Some(RecvMsg {
            bytes_read,
            msg: decoded.text,
            tag: decoded.tag,
            sender,
        }))
    }

    /// Address the socket is bound to
    pub fn local_addr(&self) -> NetResult<SocketAddr> {
        let fd = self.raw_fd("getsockname")?;
        let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
        let mut len = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;

        let rc = unsafe {
            libc::getsockname(fd, &mut storage as *mut _ as *mut libc::sockaddr, &mut len)
        };
        if rc != 0 {
            let source = io::Error::last_os_error();
            kerror!("getsockname: {}", source);
            return Err(NetError::SocketOption {
                option: "getsockname",
                source,
            });
        }
        match unsafe { sockaddr_to_std(&storage as *const _ as *const libc::sockaddr, len) } {
            Some(addr) => Ok(addr),
            None => {
                kerror!("getsockname: unsupported address family");
                Err(NetError::NoCandidate)
            }
        }
    }

    /// Close the descriptor; later calls do nothing
    pub fn close(&mut self) {
        if let Some(fd) = self.fd.take() {
            unsafe { libc::close(fd) };
        }
    }

    pub fn is_open(&self) -> bool {
        self.fd.is_some()
    }

    pub fn fd(&self) -> Option<RawFd> {
        self.fd
    }

    /// Address packets are sent to (client) or bound on (server)
    pub fn selected(&self) -> Option<&AddressCandidate> {
        self.selected.as_ref()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn kind(&self) -> SocketKind {
        self.kind
    }

    pub fn wire_format(&self) -> WireFormat {
        self.wire_format
    }

    pub fn set_wire_format(&mut self, format: WireFormat) {
        self.wire_format = format;
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::wait_readable;
    use ddserver_core::kprint::{self, LogCategory};
    use ddserver_core::message::MAX_TEXT_LEN;
    use std::os::unix::io::IntoRawFd;
    use std::time::Duration;

    fn server_on_any_port(kind: SocketKind) -> Endpoint {
        let mut server = resolve_and_select("127.0.0.1", 0, kind).unwrap();
        server.bind_as_server().unwrap();
        server
    }

    /// Datagram endpoint for 127.0.0.1:4321 whose descriptor is not a socket
    fn endpoint_on_dev_null() -> Endpoint {
        let fd = std::fs::File::open("/dev/null").unwrap().into_raw_fd();
        let addr: SocketAddr = "127.0.0.1:4321".parse().unwrap();
        Endpoint {
            fd: Some(fd),
            selected: Some(AddressCandidate::from_addr(addr, SocketKind::Datagram)),
            host: "127.0.0.1".to_string(),
            port: 4321,
            kind: SocketKind::Datagram,
            connected: false,
            wire_format: WireFormat::default(),
        }
    }

    fn recv_within(endpoint: &Endpoint, wait: Duration) -> Option<RecvMsg> {
        let fd = endpoint.fd().unwrap();
        if wait_readable(fd, wait).unwrap() {
            endpoint.receive().unwrap()
        } else {
            None
        }
    }

    #[test]
    fn test_selected_socket_is_nonblocking() {
        let endpoint = resolve_and_select("127.0.0.1", 4321, SocketKind::Datagram).unwrap();
        let fd = endpoint.fd().unwrap();
        let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
        assert!(flags & libc::O_NONBLOCK != 0);
        assert_eq!(endpoint.selected().unwrap().addr, "127.0.0.1:4321".parse().unwrap());
    }

    #[test]
    fn test_unresolvable_host() {
        let err = resolve_and_select("no-such-host.invalid", 4321, SocketKind::Datagram)
            .unwrap_err();
        assert!(matches!(err, NetError::Resolution { .. }));
    }

    #[test]
    fn test_bind_picks_ephemeral_port() {
        let server = server_on_any_port(SocketKind::Datagram);
        assert_ne!(server.port(), 0);
        assert_eq!(server.local_addr().unwrap().port(), server.port());
    }

    #[test]
    fn test_send_and_receive_datagram() {
        let server = server_on_any_port(SocketKind::Datagram);
        let client = resolve_and_select("127.0.0.1", server.port(), SocketKind::Datagram).unwrap();

        assert_eq!(client.send(&Message::new("hello")).unwrap(), 5);

        let got = recv_within(&server, Duration::from_millis(500)).unwrap();
        assert_eq!(got.bytes_read, 5);
        assert_eq!(got.msg, "hello");
        assert_eq!(got.tag, MsgTag::Untagged);
        assert_eq!(got.sender.unwrap().ip().to_string(), "127.0.0.1");
    }

    #[test]
    fn test_receive_nothing_waiting() {
        let server = server_on_any_port(SocketKind::Datagram);
        assert_eq!(server.receive().unwrap(), None);
    }

    #[test]
    fn test_tagged_round_trip() {
        let mut server = server_on_any_port(SocketKind::Datagram);
        server.set_wire_format(WireFormat::Tagged);
        let mut client =
            resolve_and_select("127.0.0.1", server.port(), SocketKind::Datagram).unwrap();
        client.set_wire_format(WireFormat::Tagged);

        client.send(&Message::tagged(MsgTag::Error, "disk full")).unwrap();

        let got = recv_within(&server, Duration::from_millis(500)).unwrap();
        assert_eq!(got.tag, MsgTag::Error);
        assert_eq!(got.msg, "disk full");
        assert_eq!(got.bytes_read, 8 + 9);
    }

    #[test]
    fn test_long_message_truncated() {
        let server = server_on_any_port(SocketKind::Datagram);
        let client = resolve_and_select("127.0.0.1", server.port(), SocketKind::Datagram).unwrap();

        let sent = client.send(&Message::new("z".repeat(5000))).unwrap();
        assert_eq!(sent, MAX_TEXT_LEN);

        let got = recv_within(&server, Duration::from_millis(500)).unwrap();
        assert_eq!(got.bytes_read, MAX_TEXT_LEN);
    }

    #[test]
    fn test_peer_endpoint_replies_to_sender() {
        let server = server_on_any_port(SocketKind::Datagram);
        let other = server_on_any_port(SocketKind::Datagram);

        // Reply goes to the sender's IP on the port `other` listens on
        let to_server =
            resolve_and_select("127.0.0.1", server.port(), SocketKind::Datagram).unwrap();
        to_server.send(&Message::new("hi")).unwrap();
        let got = recv_within(&server, Duration::from_millis(500)).unwrap();

        let peer = create_endpoint_from_peer_address(got.sender.unwrap(), other.port()).unwrap();
        peer.send(&Message::new("back")).unwrap();

        let reply = recv_within(&other, Duration::from_millis(500)).unwrap();
        assert_eq!(reply.msg, "back");
    }

    #[test]
    fn test_double_bind_without_reuse_fails() {
        let first = server_on_any_port(SocketKind::Datagram);

        let mut second =
            resolve_and_select("127.0.0.1", first.port(), SocketKind::Datagram).unwrap();
        let err = second
            .bind_with(BindOptions {
                reuse_address: false,
                ..BindOptions::default()
            })
            .unwrap_err();

        assert!(matches!(err, NetError::Bind(_)));
        assert!(err.is_fatal());
        assert!(!second.is_open());
    }

    #[test]
    fn test_bind_after_close() {
        let mut endpoint = resolve_and_select("127.0.0.1", 0, SocketKind::Datagram).unwrap();
        endpoint.close();
        endpoint.close();
        assert!(matches!(endpoint.bind_as_server(), Err(NetError::Closed)));
        assert!(matches!(endpoint.send(&Message::new("x")), Err(NetError::Closed)));
    }

    #[test]
    fn test_closed_endpoint_logs_each_failure() {
        let log = kprint::capture();

        let mut endpoint = resolve_and_select("127.0.0.1", 4321, SocketKind::Datagram).unwrap();
        endpoint.close();

        assert!(endpoint.bind_as_server().is_err());
        assert!(endpoint.send(&Message::new("x")).is_err());
        assert!(endpoint.receive().is_err());

        for op in ["bind", "send", "receive"] {
            let needle = format!("{} on 127.0.0.1:4321: socket is closed", op);
            assert!(log.contains(LogCategory::Error, &needle), "no log line for {}", op);
        }
    }

    #[test]
    fn test_connect_without_address_is_logged() {
        let log = kprint::capture();

        let mut endpoint = endpoint_on_dev_null();
        endpoint.selected = None;
        assert!(matches!(endpoint.connect(), Err(NetError::NoCandidate)));
        assert!(matches!(endpoint.send(&Message::new("x")), Err(NetError::NoCandidate)));

        let target = "127.0.0.1:4321: no selected address";
        assert!(log.contains(LogCategory::Error, &format!("un-established-> {}", target)));
        assert!(log.contains(LogCategory::Error, &format!("send to {}", target)));
    }

    #[test]
    fn test_reuse_failure_closes_descriptor() {
        let mut endpoint = endpoint_on_dev_null();

        let err = endpoint.bind_as_server().unwrap_err();
        assert!(matches!(err, NetError::SocketOption { option: "SO_REUSEADDR", .. }));
        assert!(err.is_fatal());
        assert!(!endpoint.is_open());
    }

    #[test]
    fn test_send_failure_is_a_warning() {
        let log = kprint::capture();

        let endpoint = endpoint_on_dev_null();
        assert!(matches!(endpoint.send(&Message::new("x")), Err(NetError::Send(_))));

        assert!(log.contains(LogCategory::Warning, "sendto Failure"));
        assert!(!log.contains(LogCategory::Error, "sendto Failure"));
    }

    #[test]
    fn test_stream_connect_accept() {
        let listener = server_on_any_port(SocketKind::Stream);
        let mut client =
            resolve_and_select("127.0.0.1", listener.port(), SocketKind::Stream).unwrap();
        client.connect().unwrap();

        let fd = listener.fd().unwrap();
        assert!(wait_readable(fd, Duration::from_millis(500)).unwrap());
        let accepted = listener.accept().unwrap().unwrap();
        assert_eq!(accepted.kind(), SocketKind::Stream);

        // Wait for the connect to finish before writing
        let mut sent = None;
        for _ in 0..50 {
            match client.send(&Message::new("ping")) {
                Ok(n) => {
                    sent = Some(n);
                    break;
                }
                Err(_) => std::thread::sleep(Duration::from_millis(10)),
            }
        }
        assert_eq!(sent, Some(4));

        let got = recv_within(&accepted, Duration::from_millis(500)).unwrap();
        assert_eq!(got.msg, "ping");
        assert_eq!(got.sender, None);
    }
}
