//! Connection racing.
//!
//! Every resolved address gets its own non-blocking connect. The first
//! candidate whose handshake completes without error wins; every other
//! candidate is dropped (and therefore closed) at that moment.

use std::fmt;
use std::io;
use std::net::SocketAddr;

use crate::socket::{ConnectStart, Interest, Socket};

/// How a candidate socket starts its connect.
pub trait Connector: fmt::Debug + Send {
    fn connect(&self, socket: &Socket, addr: &SocketAddr) -> io::Result<ConnectStart>;
}

/// A plain non-blocking `connect(2)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonBlockingConnect;

impl Connector for NonBlockingConnect {
    fn connect(&self, socket: &Socket, addr: &SocketAddr) -> io::Result<ConnectStart> {
        socket.connect(addr)
    }
}

#[derive(Debug)]
pub struct ConnectionRacer {
    pending: Vec<Socket>,
    connector: Box<dyn Connector>,
}

impl Default for ConnectionRacer {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRacer {
    pub fn new() -> Self {
        Self::with_connector(NonBlockingConnect)
    }

    pub fn with_connector(connector: impl Connector + 'static) -> Self {
        Self {
            pending: Vec::new(),
            connector: Box::new(connector),
        }
    }

    /// Open a candidate for each address in order.
    ///
    /// Returns the socket if one connected immediately; any candidates
    /// already pending are closed and the remaining addresses are not
    /// tried. Otherwise every in-progress candidate stays pending and
    /// candidates that failed outright are closed.
    pub fn start(&mut self, addrs: &[SocketAddr]) -> Option<Socket> {
        for addr in addrs {
            let socket = match Socket::open(addr) {
                Ok(socket) => socket,
                Err(e) => {
                    log::trace!("socket for {addr} failed to open: {e}");
                    continue;
                }
            };

            match self.connector.connect(&socket, addr) {
                Ok(ConnectStart::Connected) => {
                    log::debug!("connected to {addr} immediately");
                    self.clear();
                    return Some(socket);
                }
                Ok(ConnectStart::InProgress) => {
                    log::trace!("connect to {addr} in progress");
                    self.pending.push(socket);
                }
                Err(e) => {
                    log::trace!("connect to {addr} failed: {e}");
                }
            }
        }
        None
    }

    /// Check every pending candidate once without blocking.
    ///
    /// Candidates that are not yet writable stay pending. A writable
    /// candidate with a clean `SO_ERROR` wins and every other candidate is
    /// closed; a writable candidate with an error is closed.
    pub fn poll(&mut self) -> Option<Socket> {
        let mut i = 0;
        while i < self.pending.len() {
            let socket = &self.pending[i];

            let ready = match socket.poll_ready(Interest::Writable) {
                Ok(ready) => ready,
                Err(e) => {
                    log::trace!("readiness check on fd {} failed: {e}", socket.raw_fd());
                    self.pending.remove(i);
                    continue;
                }
            };
            if !ready {
                i += 1;
                continue;
            }

            match socket.take_error() {
                Ok(None) => {
                    let winner = self.pending.remove(i);
                    log::debug!("fd {} won the connection race", winner.raw_fd());
                    self.clear();
                    return Some(winner);
                }
                Ok(Some(e)) => {
                    log::trace!("candidate fd {} failed: {e}", socket.raw_fd());
                }
                Err(e) => {
                    log::trace!("SO_ERROR on fd {} unreadable: {e}", socket.raw_fd());
                }
            }
            self.pending.remove(i);
        }
        None
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Close and forget every pending candidate.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::time::{Duration, Instant};

    fn closed_port() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    }

    fn race_to_end(racer: &mut ConnectionRacer) -> Option<Socket> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !racer.is_empty() && Instant::now() < deadline {
            if let Some(socket) = racer.poll() {
                return Some(socket);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        None
    }

    #[test]
    fn single_live_address_wins() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let mut racer = ConnectionRacer::new();
        let winner = racer.start(&[addr]).or_else(|| race_to_end(&mut racer));
        assert!(winner.is_some());
        assert!(racer.is_empty());
    }

    #[test]
    fn dead_addresses_are_dropped() {
        let mut racer = ConnectionRacer::new();
        let winner = racer
            .start(&[closed_port(), closed_port()])
            .or_else(|| race_to_end(&mut racer));
        assert!(winner.is_none());
        assert!(racer.is_empty());
    }

    #[test]
    fn live_address_wins_among_dead_ones() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let live = listener.local_addr().unwrap();

        let mut racer = ConnectionRacer::new();
        let winner = racer
            .start(&[closed_port(), closed_port(), live])
            .or_else(|| race_to_end(&mut racer));
        assert!(winner.is_some());
        assert_eq!(racer.len(), 0);
    }

    /// Finishes the handshake to `0` inside `connect`, as a fast local
    /// peer can.
    #[derive(Debug)]
    struct SettleFor(SocketAddr);

    impl Connector for SettleFor {
        fn connect(&self, socket: &Socket, addr: &SocketAddr) -> io::Result<ConnectStart> {
            let start = socket.connect(addr)?;
            if *addr != self.0 || start == ConnectStart::Connected {
                return Ok(start);
            }
            while !socket.poll_ready(Interest::Writable)? {
                std::thread::sleep(Duration::from_millis(1));
            }
            match socket.take_error()? {
                Some(e) => Err(e),
                None => Ok(ConnectStart::Connected),
            }
        }
    }

    #[test]
    fn unroutable_addresses_fail_during_start() {
        let unroutable: Vec<SocketAddr> = vec![
            "255.255.255.255:80".parse().unwrap(),
            "[fe80::1]:80".parse().unwrap(),
        ];
        let mut racer = ConnectionRacer::new();
        assert!(racer.start(&unroutable).is_none());
        assert!(racer.is_empty());
    }

    #[test]
    fn immediate_connect_closes_pending_candidates() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let live = listener.local_addr().unwrap();
        let late = TcpListener::bind("127.0.0.1:0").unwrap();

        let mut racer = ConnectionRacer::with_connector(SettleFor(live));
        let winner = racer.start(&[late.local_addr().unwrap(), live, closed_port()]);

        assert!(winner.is_some());
        assert!(racer.is_empty());
    }

    #[test]
    fn empty_address_list_starts_nothing() {
        let mut racer = ConnectionRacer::new();
        assert!(racer.start(&[]).is_none());
        assert!(racer.is_empty());
        assert!(racer.poll().is_none());
    }
}
