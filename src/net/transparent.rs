//! Transparent-proxy dialing (Linux).
//!
//! Reconnects to the destination the client originally tried to reach.
//! `IP_TRANSPARENT` lets the kernel route packets whose source is the
//! client's address through this proxy; together with binding to the
//! client's IP, the backend sees the client rather than the proxy.
//! `SO_REUSEADDR` and `SO_REUSEPORT` avoid TIME_WAIT collisions when
//! many outbound sockets share a local tuple.
//!
//! Requires `CAP_NET_ADMIN`; other platforms get a stub.

#[cfg(target_os = "linux")]
pub use linux::dial_original_destination;

#[cfg(not(target_os = "linux"))]
pub use fallback::dial_original_destination;

#[cfg(target_os = "linux")]
mod linux {
    use crate::net::DialError;
    use socket2::{Domain, Protocol, Socket, Type};
    use std::io;
    use std::mem;
    use std::net::SocketAddr;
    use std::os::unix::io::AsRawFd;
    use tokio::net::TcpStream;
    use tracing::debug;

    /// Dial the destination the inbound connection was addressed to.
    ///
    /// The inbound connection's local endpoint is what the client tried
    /// to reach (the listener sits in front of a TPROXY redirect); its
    /// remote endpoint is the client. With `spoof_client` the outbound
    /// socket binds to the client's IP on an ephemeral port, so the
    /// backend sees the original source address.
    pub async fn dial_original_destination(
        inbound: &TcpStream,
        spoof_client: bool,
    ) -> Result<TcpStream, DialError> {
        let destination = inbound.local_addr().map_err(DialError::Socket)?;
        let client = inbound.peer_addr().map_err(DialError::Socket)?;

        let domain = if destination.is_ipv4() && client.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let socket =
            Socket::new(domain, Type::STREAM, Some(Protocol::TCP)).map_err(DialError::Socket)?;

        // Option order follows the kernel's requirements: reuse flags
        // before bind, transparency before connecting through a
        // non-local source. Any failure drops the socket.
        socket
            .set_reuse_address(true)
            .map_err(|e| sockopt_error("SO_REUSEADDR", e))?;
        socket
            .set_reuse_port(true)
            .map_err(|e| sockopt_error("SO_REUSEPORT", e))?;
        set_transparent(&socket, domain)?;
        socket
            .set_nonblocking(true)
            .map_err(|e| sockopt_error("O_NONBLOCK", e))?;

        if spoof_client {
            let bind_addr = SocketAddr::new(client.ip(), 0);
            socket
                .bind(&bind_addr.into())
                .map_err(|e| DialError::Bind {
                    addr: bind_addr.to_string(),
                    source: e,
                })?;
        }

        // A non-blocking connect that is still in progress is fine; the
        // readiness wait below completes it.
        match socket.connect(&destination.into()) {
            Ok(()) => {}
            Err(e) if e.raw_os_error() == Some(libc::EINPROGRESS) => {}
            Err(e) => {
                return Err(DialError::Connect {
                    addr: destination.to_string(),
                    source: e,
                })
            }
        }

        let stream =
            TcpStream::from_std(socket.into()).map_err(DialError::Socket)?;

        stream.writable().await.map_err(|e| DialError::Connect {
            addr: destination.to_string(),
            source: e,
        })?;

        if let Some(e) = stream.take_error().map_err(DialError::Socket)? {
            return Err(DialError::Connect {
                addr: destination.to_string(),
                source: e,
            });
        }

        debug!(
            destination = %destination,
            client = %client,
            spoof_client,
            "transparent dial established"
        );

        Ok(stream)
    }

    /// Enable `IP_TRANSPARENT` (or `IPV6_TRANSPARENT`) on the socket.
    fn set_transparent(socket: &Socket, domain: Domain) -> Result<(), DialError> {
        let (level, option, name) = if domain == Domain::IPV4 {
            (libc::SOL_IP, libc::IP_TRANSPARENT, "IP_TRANSPARENT")
        } else {
            (libc::SOL_IPV6, libc::IPV6_TRANSPARENT, "IPV6_TRANSPARENT")
        };

        let one: libc::c_int = 1;
        let ret = unsafe {
            libc::setsockopt(
                socket.as_raw_fd(),
                level,
                option,
                std::ptr::addr_of!(one).cast::<libc::c_void>(),
                mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };

        if ret != 0 {
            return Err(sockopt_error(name, io::Error::last_os_error()));
        }

        Ok(())
    }

    fn sockopt_error(option: &'static str, source: io::Error) -> DialError {
        DialError::SocketOption { option, source }
    }

}

#[cfg(not(target_os = "linux"))]
mod fallback {
    use crate::net::DialError;
    use tokio::net::TcpStream;

    /// Transparent dialing needs Linux socket options; report it as
    /// unsupported everywhere else.
    pub async fn dial_original_destination(
        _inbound: &TcpStream,
        _spoof_client: bool,
    ) -> Result<TcpStream, DialError> {
        Err(DialError::Unsupported)
    }
}
