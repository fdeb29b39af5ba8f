//! Thin layer over non-blocking stream sockets: listener setup and
//! source-bound outbound connects.

use std::net::SocketAddr;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpListener, TcpSocket, TcpStream};

use crate::addr::{Endpoint, Family, HostAddr};
use crate::error::{Error, Result};

/// Listen backlog; every platform we target clamps this to SOMAXCONN.
const BACKLOG: i32 = 1024;

/// Binds a listening socket to `local` with SO_REUSEADDR and registers it
/// with the runtime.
pub fn listen(local: &Endpoint) -> Result<TcpListener> {
    let addr: SocketAddr = local.to_socket_addr();

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(|e| Error::from_io(&e, "socket() failed"))?;
    socket
        .set_reuse_address(true)
        .map_err(|e| Error::from_io(&e, "setsockopt(SO_REUSEADDR) failed"))?;
    socket
        .set_nonblocking(true)
        .map_err(|e| Error::from_io(&e, "nonblocking mode failed"))?;
    socket
        .bind(&addr.into())
        .map_err(|e| Error::from_io(&e, format!("bind to {local} failed")))?;
    socket
        .listen(BACKLOG)
        .map_err(|e| Error::from_io(&e, format!("listen on {local} failed")))?;

    TcpListener::from_std(socket.into())
        .map_err(|e| Error::from_io(&e, "listener registration failed"))
}

/// Opens an outbound stream bound to `source` (kernel-chosen port) and
/// connects it to `dest`. Connect completion is awaited; any pending
/// socket-level error surfaces through the closed error set.
pub async fn connect_from(source: HostAddr, dest: SocketAddr) -> Result<TcpStream> {
    let socket = match source.family() {
        Family::V4 => TcpSocket::new_v4(),
        Family::V6 => TcpSocket::new_v6(),
    }
    .map_err(|e| Error::from_io(&e, "socket() failed"))?;

    socket
        .set_reuseaddr(true)
        .map_err(|e| Error::from_io(&e, "setsockopt(SO_REUSEADDR) failed"))?;
    socket
        .bind(SocketAddr::new(source.to_ip(), 0))
        .map_err(|e| Error::from_io(&e, format!("bind to source {source} failed")))?;

    let stream = socket
        .connect(dest)
        .await
        .map_err(|e| Error::from_io(&e, format!("connect to {dest} failed")))?;
    stream.set_nodelay(true).ok();
    Ok(stream)
}

/// Local address of a connected stream, as reported by the kernel.
pub fn local_endpoint(stream: &TcpStream) -> Result<Endpoint> {
    stream
        .local_addr()
        .map(Endpoint::from)
        .map_err(|e| Error::from_io(&e, "getsockname failed"))
}
