//! ddchat - console chat on top of ddserver
//!
//! Listens on one UDP (or TCP) port, polls the console every 100ms and
//! broadcasts each finished line to the known peers. The first datagram
//! sender becomes a peer automatically.
//!
//! Usage:
//!     cargo build --release -p ddchat
//!     ./target/release/ddchat --ip localhost --port 4321
//!
//! Console commands:
//!     exit               stop the loop
//!     @<ip>#<port>       add a peer
//!     <text>             send to every peer
//!
//! Test with two terminals:
//!     ddchat --port 4321
//!     ddchat --port 4322 --peer 127.0.0.1#4321

use clap::Parser;
use ddserver::{
    create_endpoint_from_peer_address, kerror, klog, kplain, kprint, kstatus, kwarn,
    resolve_and_select, BindOptions, Command, ConsoleSession, Endpoint, LoopHandle, Message,
    NetResult, PeerTable, Reactor, RuntimeConfig, SocketKind, Terminal, WireFormat,
};
use std::cell::RefCell;
use std::io::Write;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "ddchat", about = "Console chat over UDP or TCP")]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = "localhost")]
    ip: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 4321)]
    port: u16,

    /// Use TCP instead of UDP
    #[arg(long)]
    tcp: bool,

    /// Console poll interval in seconds
    #[arg(long, default_value_t = 0.1)]
    interval: f64,

    /// Peer to add at start, as <ip>#<port>
    #[arg(long)]
    peer: Option<String>,

    /// Prefix payloads with the 8-byte category tag
    #[arg(long)]
    tagged: bool,

    /// Print the effective configuration and continue
    #[arg(long)]
    print_config: bool,
}

fn main() -> ExitCode {
    kprint::init();
    let args = Args::parse();

    let mut config = RuntimeConfig::from_env();
    if args.tagged {
        config = config.wire_format(WireFormat::Tagged);
    }
    if let Err(e) = config.validate() {
        kerror!("{}", e);
        return ExitCode::FAILURE;
    }
    if args.print_config {
        config.print();
    }

    let kind = if args.tcp {
        SocketKind::Stream
    } else {
        SocketKind::Datagram
    };

    let mut server = match open_listener(&args.ip, args.port, kind, &config) {
        Ok(server) => server,
        Err(e) => {
            kerror!("Socket not created: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let peers = RefCell::new(PeerTable::new());
    if let Some(peer) = &args.peer {
        add_peer_from_line(&format!("@{}", peer), kind, &config, &peers);
    }

    let mut console = ConsoleSession::stdio(&config);
    let result = {
        let mut reactor =
            Reactor::new(&server, |h| on_readable(h, &peers)).with_poll_wait(config.poll_wait);

        let added = reactor.add_timer(args.interval, true, |h| {
            on_console_tick(h, &mut console, &peers, &config)
        });
        match added {
            Ok(_) => reactor.run(),
            Err(e) => {
                kerror!("{}", e);
                return ExitCode::FAILURE;
            }
        }
    };

    console.restore();
    peers.borrow_mut().close_all();
    server.close();

    kstatus!("Closing server/client program");
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            kerror!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn open_listener(
    ip: &str,
    port: u16,
    kind: SocketKind,
    config: &RuntimeConfig,
) -> NetResult<Endpoint> {
    let mut server = resolve_and_select(ip, port, kind)?;
    server.set_wire_format(config.wire_format);
    server.bind_with(BindOptions {
        reuse_address: true,
        backlog: config.listen_backlog,
    })?;
    Ok(server)
}

/// Listener became readable
fn on_readable(h: &mut LoopHandle<'_>, peers: &RefCell<PeerTable>) -> NetResult<()> {
    let listener = h.listener();

    if listener.kind() == SocketKind::Stream {
        if let Some(conn) = listener.accept()? {
            let _ = peers.borrow_mut().add(conn);
        }
        return Ok(());
    }

    let Some(data) = listener.receive()? else {
        return Ok(());
    };

    // First sender becomes the reply target
    if peers.borrow().is_empty() {
        if let Some(sender) = data.sender {
            match create_endpoint_from_peer_address(sender, listener.port()) {
                Ok(mut peer) => {
                    peer.set_wire_format(listener.wire_format());
                    let _ = peers.borrow_mut().add(peer);
                }
                Err(e) => kwarn!("Could not register {}: {}", sender, e),
            }
        }
    }

    klog!(data.tag.category(), "Data received: {}", data.msg);
    Ok(())
}

/// Repeating timer: service the console and act on a finished line
fn on_console_tick<T: Terminal, W: Write>(
    h: &mut LoopHandle<'_>,
    console: &mut ConsoleSession<T, W>,
    peers: &RefCell<PeerTable>,
    config: &RuntimeConfig,
) {
    poll_stream_peers(peers);
    console.collect_input();

    let Some(line) = console.query_completed_line() else {
        return;
    };

    match line.parse::<Command>() {
        Ok(Command::Exit) => h.break_loop(),
        Ok(Command::AddPeer { .. }) => {
            add_peer_from_line(&line, h.listener().kind(), config, peers);
        }
        Ok(Command::Broadcast(text)) => {
            let sent = peers.borrow().broadcast(&Message::new(text));
            if sent == 0 {
                kwarn!("No peer received the message");
            }
        }
        Err(e) => kwarn!("{}", e),
    }
}

fn add_peer_from_line(
    line: &str,
    kind: SocketKind,
    config: &RuntimeConfig,
    peers: &RefCell<PeerTable>,
) {
    let (host, port) = match line.parse::<Command>() {
        Ok(Command::AddPeer { host, port }) => (host, port),
        Ok(_) => return,
        Err(e) => {
            kwarn!("{}", e);
            return;
        }
    };

    let mut peer = match resolve_and_select(&host, port, kind) {
        Ok(peer) => peer,
        Err(_) => {
            kerror!("Connection un-established-> IP: {} PORT: {}", host, port);
            return;
        }
    };
    peer.set_wire_format(config.wire_format);

    if kind == SocketKind::Stream {
        if let Err(e) = peer.connect() {
            kerror!("Connection un-established-> IP: {} PORT: {} ({})", host, port, e);
            return;
        }
    }

    if peers.borrow_mut().add(peer).is_ok() {
        kstatus!("Added peer {}:{}", host, port);
    }
}

/// Drain connected TCP peers; the reactor only watches the listener
fn poll_stream_peers(peers: &RefCell<PeerTable>) {
    let mut peers = peers.borrow_mut();
    for peer in peers.iter_mut().filter(|p| p.kind() == SocketKind::Stream) {
        loop {
            match peer.receive() {
                Ok(Some(data)) => klog!(data.tag.category(), "Data received: {}", data.msg),
                Ok(None) => break,
                Err(e) => {
                    kplain!("Peer {}:{} dropped: {}", peer.host(), peer.port(), e);
                    peer.close();
                    break;
                }
            }
        }
    }
    peers.prune();
}
