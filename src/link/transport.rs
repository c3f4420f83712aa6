//! Transport layer for sensor sockets

use super::NetworkTarget;
use crate::error::{Error, Result};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Socket read timeout; bounds how long a worker cycle can block
pub const READ_TIMEOUT: Duration = Duration::from_millis(20);

/// A write blocked this long fails and drops the connection
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Byte transport owned by a link worker
pub trait Transport: Send {
    /// Read available bytes
    ///
    /// Returns `Ok(0)` when nothing arrived within the read timeout and
    /// [`Error::ConnectionClosed`] when the peer hung up.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Write the whole buffer
    fn write_all(&mut self, data: &[u8]) -> Result<()>;
}

/// TCP client transport
pub struct TcpTransport {
    stream: TcpStream,
    peer: SocketAddr,
}

impl TcpTransport {
    /// Resolve `target` and connect with a timeout
    pub fn connect(target: &NetworkTarget, timeout: Duration) -> Result<Self> {
        if !target.is_set() {
            return Err(Error::InvalidAddress(target.address.clone()));
        }
        let addrs: Vec<SocketAddr> = (target.address.as_str(), target.port)
            .to_socket_addrs()
            .map_err(|e| Error::InvalidAddress(format!("{}: {}", target.address, e)))?
            .collect();
        let Some(&peer) = addrs.first() else {
            return Err(Error::InvalidAddress(target.address.clone()));
        };

        if !target.interface.is_empty() || !target.local_ip.is_empty() {
            log::debug!(
                "Link: interface '{}' / local IP '{}' recorded, routing left to the OS",
                target.interface,
                target.local_ip
            );
        }

        let stream = TcpStream::connect_timeout(&peer, timeout)?;
        stream.set_read_timeout(Some(READ_TIMEOUT))?;
        stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
        stream.set_nodelay(true)?;
        Ok(Self { stream, peer })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

impl Transport for TcpTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        match self.stream.read(buffer) {
            Ok(0) => Err(Error::ConnectionClosed),
            Ok(n) => Ok(n),
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock
                        | std::io::ErrorKind::TimedOut
                        | std::io::ErrorKind::Interrupted
                ) =>
            {
                Ok(0)
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data)?;
        self.stream.flush()?;
        Ok(())
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}
