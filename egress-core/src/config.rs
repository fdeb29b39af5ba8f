//! Runtime configuration.

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::addr::{Endpoint, HostAddr};
use crate::balancer::IfaceSpec;
use crate::error::{Error, Result};

/// Everything the dispatcher needs: where to listen and which source
/// addresses to spread outbound sessions across.
#[derive(Debug, Clone)]
pub struct Config {
    pub binds: Vec<Endpoint>,
    pub ifaces: Vec<IfaceSpec>,
}

impl Config {
    /// Builds a config, falling back to the default loopback listeners
    /// when no bind endpoint was given.
    pub fn new(binds: Vec<Endpoint>, ifaces: Vec<IfaceSpec>) -> Self {
        let binds = if binds.is_empty() { default_binds() } else { binds };
        Config { binds, ifaces }
    }

    pub fn validate(&self) -> Result<()> {
        if self.ifaces.is_empty() {
            return Err(Error::config("No addresses to dispatch."));
        }
        if self.binds.is_empty() {
            return Err(Error::config("no listening endpoints"));
        }
        Ok(())
    }
}

/// `127.0.0.1:1080` and `[::1]:1080`.
pub fn default_binds() -> Vec<Endpoint> {
    vec![
        Endpoint::new(HostAddr::V4(Ipv4Addr::LOCALHOST), 1080),
        Endpoint::new(HostAddr::V6(Ipv6Addr::LOCALHOST), 1080),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_binds_get_the_defaults() {
        let config = Config::new(vec![], vec!["127.0.0.1@1".parse().unwrap()]);
        assert_eq!(config.binds, default_binds());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn explicit_binds_are_kept() {
        let bind: Endpoint = "127.0.0.1:11080".parse().unwrap();
        let config = Config::new(vec![bind], vec!["127.0.0.1@1".parse().unwrap()]);
        assert_eq!(config.binds, vec![bind]);
    }

    #[test]
    fn no_interfaces_is_fatal() {
        let config = Config::new(vec![], vec![]);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("No addresses to dispatch."));
    }
}
