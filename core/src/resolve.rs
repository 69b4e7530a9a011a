//! Host name resolution.
//!
//! `Resolver` is the seam between the connection racer and the system name
//! service. The default goes through the platform resolver; tests and
//! hosts with their own discovery can substitute a fixed address list.

use std::fmt;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};

pub trait Resolver: fmt::Debug + Send {
    /// Resolve `host` to every IPv4 and IPv6 address for `port`.
    fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>>;
}

/// Resolves through the operating system (`getaddrinfo`).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl Resolver for SystemResolver {
    fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
        if host.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty host"));
        }
        Ok((host, port).to_socket_addrs()?.collect())
    }
}

/// Returns the same addresses for every host, with their ports rewritten
/// to the requested one unless `keep_ports` is set.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    addrs: Vec<SocketAddr>,
    keep_ports: bool,
}

impl StaticResolver {
    pub fn new(addrs: Vec<SocketAddr>) -> Self {
        Self {
            addrs,
            keep_ports: false,
        }
    }

    /// Use each address's own port instead of the requested one.
    pub fn keep_ports(mut self) -> Self {
        self.keep_ports = true;
        self
    }
}

impl Resolver for StaticResolver {
    fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
        if self.addrs.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no addresses for {host}"),
            ));
        }
        Ok(self
            .addrs
            .iter()
            .map(|addr| {
                let mut addr = *addr;
                if !self.keep_ports {
                    addr.set_port(port);
                }
                addr
            })
            .collect())
    }
}
