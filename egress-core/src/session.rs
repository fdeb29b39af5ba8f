//! Per-connection SOCKS5 dialogue and relay.
//!
//! One session is one cooperative task: greeting, request, interface
//! acquisition, source-bound connect, then full-duplex relay until both
//! directions close. Every exit path drops both streams and the lease, so
//! sockets close exactly once and the balancer count returns.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream};
use tracing::debug;

use crate::addr::HostAddr;
use crate::balancer::Balancer;
use crate::error::{Error, Result, SocketKind};
use crate::socket;
use crate::socks::{self, Request, TargetAddr};

/// Relay buffer size per direction.
const RELAY_BUF: usize = 16 * 1024;

/// Drives one accepted client from greeting to teardown.
pub async fn run(mut client: TcpStream, peer: SocketAddr, balancer: Arc<Balancer>) -> Result<()> {
    let methods = socks::read_greeting(&mut client).await?;
    if !methods.contains(&socks::METHOD_NO_AUTH) {
        // Lenient: answer 0x00 anyway instead of the strict 0xFF refusal.
        debug!(%peer, "client offered no open method, proceeding anyway");
    }
    socks::write_method_choice(&mut client).await?;

    let request = socks::read_request(&mut client).await?;
    if request.command != socks::CMD_CONNECT {
        debug!(%peer, command = request.command, "unsupported command");
        socks::write_reply(&mut client, socks::REPLY_COMMAND_NOT_SUPPORTED, None).await?;
        return Ok(());
    }

    let dest = match resolve_target(&request, &balancer).await {
        Ok(addr) => addr,
        Err(err) => {
            debug!(%peer, error = %err, "target resolution failed");
            socks::write_reply(&mut client, socks::REPLY_HOST_UNREACHABLE, None).await?;
            return Ok(());
        }
    };

    let family = HostAddr::from(dest.ip()).family();
    let lease = match balancer.acquire(family.bit()) {
        Some(lease) => lease,
        None => {
            debug!(%peer, %dest, %family, "no interface for address family");
            socks::write_reply(&mut client, socks::REPLY_NET_UNREACHABLE, None).await?;
            return Ok(());
        }
    };

    let remote = match socket::connect_from(lease.addr(), dest).await {
        Ok(stream) => stream,
        Err(err) => {
            let code = socks::reply_code(err.socket_kind().unwrap_or(SocketKind::Generic));
            debug!(%peer, %dest, error = %err, "outbound connect failed");
            socks::write_reply(&mut client, code, None).await?;
            return Ok(());
        }
    };

    let bound = socket::local_endpoint(&remote)?;
    debug!(%peer, %dest, source = %bound, "connected");
    socks::write_reply(&mut client, socks::REPLY_SUCCESS, Some(bound.to_socket_addr())).await?;

    relay(client, remote).await;
    debug!(%peer, %dest, "session finished");
    drop(lease);
    Ok(())
}

/// Turns the request target into a socket address. Names resolve through
/// the system resolver; the first result whose family the balancer can
/// serve wins, falling back to the first result overall.
async fn resolve_target(request: &Request, balancer: &Balancer) -> Result<SocketAddr> {
    match &request.target {
        TargetAddr::V4(ip) => Ok(SocketAddr::new(IpAddr::V4(*ip), request.port)),
        TargetAddr::V6(ip) => Ok(SocketAddr::new(IpAddr::V6(*ip), request.port)),
        TargetAddr::Name(name) => {
            let addrs: Vec<SocketAddr> = lookup_host((name.as_str(), request.port))
                .await
                .map_err(|e| Error::from_io(&e, format!("resolving {name} failed")))?
                .collect();
            addrs
                .iter()
                .find(|addr| balancer.has_family(HostAddr::from(addr.ip()).family()))
                .or_else(|| addrs.first())
                .copied()
                .ok_or_else(|| Error::protocol(format!("no addresses for {name}")))
        }
    }
}

/// Full-duplex copy until both directions are done. EOF on one side
/// propagates as a write shutdown on the other once buffered bytes flush;
/// the session ends when both directions have closed or errored.
async fn relay(client: TcpStream, remote: TcpStream) {
    let (mut client_rd, mut client_wr) = client.into_split();
    let (mut remote_rd, mut remote_wr) = remote.into_split();

    let upstream = copy_half(&mut client_rd, &mut remote_wr);
    let downstream = copy_half(&mut remote_rd, &mut client_wr);
    let (up, down) = tokio::join!(upstream, downstream);

    for result in [up, down] {
        if let Err(err) = result {
            match err.kind() {
                // Ordinary abrupt teardown; the peer is gone either way.
                std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::BrokenPipe => {}
                _ => debug!(error = %err, "relay direction failed"),
            }
        }
    }
}

async fn copy_half<R, W>(reader: &mut R, writer: &mut W) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; RELAY_BUF];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
    }
    writer.shutdown().await
}
