//! Non-blocking TCP socket handle.
//!
//! # Design
//! The descriptor lives in an `OwnedFd`, so it is closed exactly once on
//! every path: early returns while opening, a candidate dropped from the
//! race, or the established connection reaching EOF. There is no explicit
//! `close`; dropping the `Socket` is the close.
//!
//! Readiness checks are a single `poll(2)` with a zero timeout. Nothing in
//! this module ever waits.
//!
//! The crate targets Unix only. POSIX sockets need no process-wide setup
//! or teardown, so `init_subsystem` is a one-time marker and there is no
//! matching shutdown call.

use std::io;
use std::mem;
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::Once;

static SUBSYSTEM_INIT: Once = Once::new();

/// One-time, process-wide setup of the platform socket layer.
///
/// POSIX sockets need no global setup, so this only records that the
/// subsystem is in use. It is called lazily on the first engine use.
pub fn init_subsystem() {
    SUBSYSTEM_INIT.call_once(|| {
        log::debug!("socket subsystem initialized");
    });
}

/// Which readiness to test for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Readable,
    Writable,
}

/// Result of starting a non-blocking connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStart {
    /// The handshake finished inside the `connect` call.
    Connected,
    /// The handshake continues in the background; test write-readiness.
    InProgress,
}

#[derive(Debug)]
pub struct Socket {
    fd: OwnedFd,
}

impl Socket {
    /// Open a non-blocking stream socket of the address family of `addr`.
    pub fn open(addr: &SocketAddr) -> io::Result<Self> {
        let domain = if addr.is_ipv4() {
            libc::AF_INET
        } else {
            libc::AF_INET6
        };

        let raw = unsafe { libc::socket(domain, libc::SOCK_STREAM, 0) };
        if raw < 0 {
            return Err(io::Error::last_os_error());
        }
        let socket = Self {
            fd: unsafe { OwnedFd::from_raw_fd(raw) },
        };

        socket.set_nonblocking()?;
        socket.set_nosigpipe()?;
        Ok(socket)
    }

    pub fn raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    fn set_nonblocking(&self) -> io::Result<()> {
        let fd = self.raw_fd();
        let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
    fn set_nosigpipe(&self) -> io::Result<()> {
        let optval: libc::c_int = 1;
        let ret = unsafe {
            libc::setsockopt(
                self.raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_NOSIGPIPE,
                &optval as *const _ as *const libc::c_void,
                mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    // Linux suppresses SIGPIPE per call with MSG_NOSIGNAL instead.
    #[cfg(not(any(target_os = "macos", target_os = "ios", target_os = "freebsd")))]
    fn set_nosigpipe(&self) -> io::Result<()> {
        Ok(())
    }

    /// Start connecting to `addr` without blocking.
    ///
    /// Any error other than the platform's "in progress" signal is a hard
    /// failure of this candidate.
    pub fn connect(&self, addr: &SocketAddr) -> io::Result<ConnectStart> {
        let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
        let len = socket_addr_to_sockaddr(addr, &mut storage);

        let ret = unsafe {
            libc::connect(
                self.raw_fd(),
                &storage as *const _ as *const libc::sockaddr,
                len,
            )
        };
        if ret == 0 {
            return Ok(ConnectStart::Connected);
        }

        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            // EINTR leaves the connect running asynchronously, same as EINPROGRESS.
            Some(libc::EINPROGRESS) | Some(libc::EINTR) => Ok(ConnectStart::InProgress),
            _ => Err(err),
        }
    }

    /// Zero-timeout readiness check.
    ///
    /// Error and hang-up conditions count as ready so the following
    /// `take_error` or `recv` observes them.
    pub fn poll_ready(&self, interest: Interest) -> io::Result<bool> {
        let events = match interest {
            Interest::Readable => libc::POLLIN,
            Interest::Writable => libc::POLLOUT,
        };
        let mut pfd = libc::pollfd {
            fd: self.raw_fd(),
            events,
            revents: 0,
        };

        let ret = unsafe { libc::poll(&mut pfd, 1, 0) };
        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(err);
        }
        Ok(ret > 0 && pfd.revents != 0)
    }

    /// Read and clear the pending socket error (`SO_ERROR`).
    pub fn take_error(&self) -> io::Result<Option<io::Error>> {
        let mut optval: libc::c_int = 0;
        let mut optlen = mem::size_of::<libc::c_int>() as libc::socklen_t;

        let ret = unsafe {
            libc::getsockopt(
                self.raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_ERROR,
                &mut optval as *mut _ as *mut libc::c_void,
                &mut optlen,
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        if optval == 0 {
            Ok(None)
        } else {
            Ok(Some(io::Error::from_raw_os_error(optval)))
        }
    }

    /// Receive into `buf`. `Ok(0)` is an orderly shutdown by the peer.
    pub fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let n = unsafe {
            libc::recv(
                self.raw_fd(),
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
                0,
            )
        };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(n as usize)
    }

    /// A single `send` call; returns how many bytes the kernel accepted.
    pub fn send(&self, buf: &[u8]) -> io::Result<usize> {
        let n = unsafe {
            libc::send(
                self.raw_fd(),
                buf.as_ptr() as *const libc::c_void,
                buf.len(),
                SEND_FLAGS,
            )
        };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(n as usize)
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;

#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SEND_FLAGS: libc::c_int = 0;

/// Fill `storage` with the C representation of `addr`, returning its length.
fn socket_addr_to_sockaddr(
    addr: &SocketAddr,
    storage: &mut libc::sockaddr_storage,
) -> libc::socklen_t {
    match addr {
        SocketAddr::V4(v4) => {
            let sa = storage as *mut _ as *mut libc::sockaddr_in;
            unsafe {
                (*sa).sin_family = libc::AF_INET as libc::sa_family_t;
                (*sa).sin_port = v4.port().to_be();
                (*sa).sin_addr.s_addr = u32::from_ne_bytes(v4.ip().octets());
            }
            mem::size_of::<libc::sockaddr_in>() as libc::socklen_t
        }
        SocketAddr::V6(v6) => {
            let sa = storage as *mut _ as *mut libc::sockaddr_in6;
            unsafe {
                (*sa).sin6_family = libc::AF_INET6 as libc::sa_family_t;
                (*sa).sin6_port = v6.port().to_be();
                (*sa).sin6_flowinfo = v6.flowinfo();
                (*sa).sin6_addr.s6_addr = v6.ip().octets();
                (*sa).sin6_scope_id = v6.scope_id();
            }
            mem::size_of::<libc::sockaddr_in6>() as libc::socklen_t
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener;
    use std::time::{Duration, Instant};

    fn wait_ready(socket: &Socket, interest: Interest) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if socket.poll_ready(interest).unwrap() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        false
    }

    #[test]
    fn connects_to_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let socket = Socket::open(&addr).unwrap();
        let start = socket.connect(&addr).unwrap();
        if start == ConnectStart::InProgress {
            assert!(wait_ready(&socket, Interest::Writable));
        }
        assert!(socket.take_error().unwrap().is_none());

        let (mut peer, _) = listener.accept().unwrap();
        peer.write_all(b"hi").unwrap();
        drop(peer);

        assert!(wait_ready(&socket, Interest::Readable));
        let mut buf = [0u8; 16];
        assert_eq!(socket.recv(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"hi");

        assert!(wait_ready(&socket, Interest::Readable));
        assert_eq!(socket.recv(&mut buf).unwrap(), 0);
    }

    #[test]
    fn refused_connect_surfaces_an_error() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };

        let socket = Socket::open(&addr).unwrap();
        match socket.connect(&addr) {
            Err(_) => {}
            Ok(ConnectStart::InProgress) => {
                assert!(wait_ready(&socket, Interest::Writable));
                assert!(socket.take_error().unwrap().is_some());
            }
            Ok(ConnectStart::Connected) => panic!("connect to a closed port succeeded"),
        }
    }

    #[test]
    fn idle_socket_is_not_readable() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let socket = Socket::open(&addr).unwrap();
        if socket.connect(&addr).unwrap() == ConnectStart::InProgress {
            assert!(wait_ready(&socket, Interest::Writable));
        }
        let _peer = listener.accept().unwrap();
        assert!(!socket.poll_ready(Interest::Readable).unwrap());
    }
}
