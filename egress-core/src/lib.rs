//! Egress: a SOCKS5 proxy that dispatches each CONNECT through one of
//! several local source addresses, balancing live sessions by weight.
//!
//! The pieces: an [`addr`] value-type layer, a [`socket`] layer for
//! listener setup and source-bound connects, the weighted [`balancer`],
//! the per-connection [`session`] engine, and the [`server`] accept loops
//! tying them together on a single cooperative runtime.

pub mod addr;
pub mod balancer;
pub mod config;
pub mod error;
pub mod logging;
pub mod server;
pub mod session;
pub mod socket;
pub mod socks;

#[cfg(test)]
mod tests;

pub use addr::{Endpoint, Family, HostAddr};
pub use balancer::{Balancer, IfaceSpec, Lease};
pub use config::Config;
pub use error::{Error, Result, SocketKind};
pub use server::Server;
