//! SOCKS5 wire layer: greeting, request and reply (RFC 1928, CONNECT only).

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result, SocketKind};

pub const VERSION: u8 = 0x05;
pub const METHOD_NO_AUTH: u8 = 0x00;
pub const CMD_CONNECT: u8 = 0x01;

pub const ATYP_V4: u8 = 0x01;
pub const ATYP_NAME: u8 = 0x03;
pub const ATYP_V6: u8 = 0x04;

pub const REPLY_SUCCESS: u8 = 0x00;
pub const REPLY_GENERAL_FAILURE: u8 = 0x01;
pub const REPLY_NET_UNREACHABLE: u8 = 0x03;
pub const REPLY_HOST_UNREACHABLE: u8 = 0x04;
pub const REPLY_CONNECTION_REFUSED: u8 = 0x05;
pub const REPLY_TTL_EXPIRED: u8 = 0x06;
pub const REPLY_COMMAND_NOT_SUPPORTED: u8 = 0x07;

/// Requested CONNECT target, before any name resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetAddr {
    V4(Ipv4Addr),
    V6(Ipv6Addr),
    Name(String),
}

/// A parsed SOCKS5 request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub command: u8,
    pub target: TargetAddr,
    pub port: u16,
}

/// Reads the client greeting (`VER NMETHODS METHODS…`) and returns the
/// offered method list. A version byte other than 0x05 fails the session.
pub async fn read_greeting<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Vec<u8>> {
    let mut head = [0u8; 2];
    stream
        .read_exact(&mut head)
        .await
        .map_err(|e| Error::from_io(&e, "greeting read failed"))?;
    if head[0] != VERSION {
        return Err(Error::protocol(format!(
            "unexpected version byte 0x{:02x} in greeting",
            head[0]
        )));
    }

    let mut methods = vec![0u8; head[1] as usize];
    stream
        .read_exact(&mut methods)
        .await
        .map_err(|e| Error::from_io(&e, "method list read failed"))?;
    Ok(methods)
}

/// Answers the greeting, always selecting "no authentication".
pub async fn write_method_choice<W: AsyncWrite + Unpin>(stream: &mut W) -> Result<()> {
    stream
        .write_all(&[VERSION, METHOD_NO_AUTH])
        .await
        .map_err(|e| Error::from_io(&e, "greeting reply failed"))
}

/// Reads a request (`VER CMD RSV ATYP DST.ADDR DST.PORT`). Field lengths
/// bound every read, so a client cannot grow the pre-relay buffers past
/// one maximal header.
pub async fn read_request<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Request> {
    let mut head = [0u8; 4];
    stream
        .read_exact(&mut head)
        .await
        .map_err(|e| Error::from_io(&e, "request read failed"))?;
    if head[0] != VERSION {
        return Err(Error::protocol(format!(
            "unexpected version byte 0x{:02x} in request",
            head[0]
        )));
    }
    let command = head[1];

    let target = match head[3] {
        ATYP_V4 => {
            let mut octets = [0u8; 4];
            stream
                .read_exact(&mut octets)
                .await
                .map_err(|e| Error::from_io(&e, "target read failed"))?;
            TargetAddr::V4(Ipv4Addr::from(octets))
        }
        ATYP_V6 => {
            let mut octets = [0u8; 16];
            stream
                .read_exact(&mut octets)
                .await
                .map_err(|e| Error::from_io(&e, "target read failed"))?;
            TargetAddr::V6(Ipv6Addr::from(octets))
        }
        ATYP_NAME => {
            let mut len = [0u8; 1];
            stream
                .read_exact(&mut len)
                .await
                .map_err(|e| Error::from_io(&e, "target read failed"))?;
            let mut name = vec![0u8; len[0] as usize];
            stream
                .read_exact(&mut name)
                .await
                .map_err(|e| Error::from_io(&e, "target read failed"))?;
            let name = String::from_utf8(name)
                .map_err(|_| Error::protocol("target name is not valid UTF-8"))?;
            TargetAddr::Name(name)
        }
        other => {
            return Err(Error::protocol(format!(
                "unsupported address type 0x{other:02x}"
            )));
        }
    };

    let mut port = [0u8; 2];
    stream
        .read_exact(&mut port)
        .await
        .map_err(|e| Error::from_io(&e, "target port read failed"))?;

    Ok(Request {
        command,
        target,
        port: u16::from_be_bytes(port),
    })
}

/// Writes a reply. `bnd` carries the outbound socket's local address on
/// success; without one the all-zero IPv4 form goes out.
pub async fn write_reply<W: AsyncWrite + Unpin>(
    stream: &mut W,
    code: u8,
    bnd: Option<SocketAddr>,
) -> Result<()> {
    let mut reply = Vec::with_capacity(22);
    reply.extend_from_slice(&[VERSION, code, 0x00]);
    match bnd {
        Some(addr) => {
            match addr.ip() {
                IpAddr::V4(ip) => {
                    reply.push(ATYP_V4);
                    reply.extend_from_slice(&ip.octets());
                }
                IpAddr::V6(ip) => {
                    reply.push(ATYP_V6);
                    reply.extend_from_slice(&ip.octets());
                }
            }
            reply.extend_from_slice(&addr.port().to_be_bytes());
        }
        None => {
            reply.push(ATYP_V4);
            reply.extend_from_slice(&[0, 0, 0, 0, 0, 0]);
        }
    }

    stream
        .write_all(&reply)
        .await
        .map_err(|e| Error::from_io(&e, "reply write failed"))
}

/// SOCKS5 reply code for a failed outbound connect.
pub fn reply_code(kind: SocketKind) -> u8 {
    match kind {
        SocketKind::ConnectionRefused => REPLY_CONNECTION_REFUSED,
        SocketKind::NetUnreachable => REPLY_NET_UNREACHABLE,
        SocketKind::HostUnreachable => REPLY_HOST_UNREACHABLE,
        SocketKind::Timeout => REPLY_TTL_EXPIRED,
        _ => REPLY_GENERAL_FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn greeting_returns_offered_methods() {
        let (mut client, mut server) = duplex(64);
        client.write_all(&[0x05, 0x02, 0x00, 0x02]).await.unwrap();

        let methods = read_greeting(&mut server).await.unwrap();
        assert_eq!(methods, vec![0x00, 0x02]);
    }

    #[tokio::test]
    async fn greeting_rejects_wrong_version() {
        let (mut client, mut server) = duplex(64);
        client.write_all(&[0x04, 0x01, 0x00]).await.unwrap();

        assert!(read_greeting(&mut server).await.is_err());
    }

    #[tokio::test]
    async fn request_parses_ipv4_connect() {
        let (mut client, mut server) = duplex(64);
        client
            .write_all(&[0x05, 0x01, 0x00, 0x01, 127, 0, 0, 1, 0x00, 0x50])
            .await
            .unwrap();

        let request = read_request(&mut server).await.unwrap();
        assert_eq!(request.command, CMD_CONNECT);
        assert_eq!(request.target, TargetAddr::V4(Ipv4Addr::new(127, 0, 0, 1)));
        assert_eq!(request.port, 80);
    }

    #[tokio::test]
    async fn request_parses_ipv6_connect() {
        let (mut client, mut server) = duplex(64);
        let mut bytes = vec![0x05, 0x01, 0x00, 0x04];
        bytes.extend_from_slice(&Ipv6Addr::LOCALHOST.octets());
        bytes.extend_from_slice(&443u16.to_be_bytes());
        client.write_all(&bytes).await.unwrap();

        let request = read_request(&mut server).await.unwrap();
        assert_eq!(request.target, TargetAddr::V6(Ipv6Addr::LOCALHOST));
        assert_eq!(request.port, 443);
    }

    #[tokio::test]
    async fn request_parses_name_connect() {
        let (mut client, mut server) = duplex(64);
        let mut bytes = vec![0x05, 0x01, 0x00, 0x03, 11];
        bytes.extend_from_slice(b"example.com");
        bytes.extend_from_slice(&8080u16.to_be_bytes());
        client.write_all(&bytes).await.unwrap();

        let request = read_request(&mut server).await.unwrap();
        assert_eq!(request.target, TargetAddr::Name("example.com".into()));
        assert_eq!(request.port, 8080);
    }

    #[tokio::test]
    async fn request_rejects_unknown_address_type() {
        let (mut client, mut server) = duplex(64);
        client
            .write_all(&[0x05, 0x01, 0x00, 0x02, 0, 0])
            .await
            .unwrap();

        assert!(read_request(&mut server).await.is_err());
    }

    #[tokio::test]
    async fn failure_reply_uses_zero_bnd() {
        let (mut client, mut server) = duplex(64);
        write_reply(&mut server, REPLY_COMMAND_NOT_SUPPORTED, None)
            .await
            .unwrap();

        let mut got = [0u8; 10];
        client.read_exact(&mut got).await.unwrap();
        assert_eq!(got, [0x05, 0x07, 0x00, 0x01, 0, 0, 0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn success_reply_carries_bound_address() {
        let (mut client, mut server) = duplex(64);
        let bnd: SocketAddr = "192.0.2.9:4096".parse().unwrap();
        write_reply(&mut server, REPLY_SUCCESS, Some(bnd)).await.unwrap();

        let mut got = [0u8; 10];
        client.read_exact(&mut got).await.unwrap();
        assert_eq!(got, [0x05, 0x00, 0x00, 0x01, 192, 0, 2, 9, 0x10, 0x00]);
    }

    #[test]
    fn connect_failures_map_to_reply_codes() {
        assert_eq!(reply_code(SocketKind::ConnectionRefused), 0x05);
        assert_eq!(reply_code(SocketKind::NetUnreachable), 0x03);
        assert_eq!(reply_code(SocketKind::HostUnreachable), 0x04);
        assert_eq!(reply_code(SocketKind::Timeout), 0x06);
        assert_eq!(reply_code(SocketKind::Generic), 0x01);
        assert_eq!(reply_code(SocketKind::InvalidAddress), 0x01);
    }
}
