//! Source address to approximate location
//!
//! The evaluator only needs a stable string per address. `None` or an empty string
//! means "no location signal" and never matches a prior location.
use std::{collections::HashMap, net::IpAddr};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::Error;

/// Label used for loopback, private and link-local addresses
pub const LOCAL_NETWORK: &str = "Local Network";

/// Resolves a source address to an approximate location
///
/// Implementations must return the same answer for the same input at least for the
/// lifetime of the resolver.
#[async_trait]
pub trait LocationResolver: Send + Sync + 'static {
    async fn resolve(&self, ip_address: &str) -> Result<Option<String>, Error>;
}

/// A fixed address table, for tests and deployments with a known set of sites
#[derive(Debug, Clone, Default)]
pub struct StaticLocationResolver {
    table: HashMap<String, String>,
}

impl StaticLocationResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, ip_address: impl Into<String>, location: impl Into<String>) -> Self {
        self.table.insert(ip_address.into(), location.into());
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for StaticLocationResolver {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            table: iter
                .into_iter()
                .map(|(ip, location)| (ip.into(), location.into()))
                .collect(),
        }
    }
}

#[async_trait]
impl LocationResolver for StaticLocationResolver {
    async fn resolve(&self, ip_address: &str) -> Result<Option<String>, Error> {
        Ok(self.table.get(ip_address).cloned())
    }
}

/// Maps every address onto a fixed list of locations by hashing it
///
/// Stands in for a geolocation service: deterministic, offline, and useless for
/// anything but exercising location novelty.
#[derive(Debug, Clone)]
pub struct HashedLocationResolver {
    locations: Vec<String>,
}

impl Default for HashedLocationResolver {
    fn default() -> Self {
        Self::new([
            "New York, US",
            "London, GB",
            "Tokyo, JP",
            "Sydney, AU",
            "Frankfurt, DE",
            "Sao Paulo, BR",
            "Toronto, CA",
            "Singapore, SG",
        ])
    }
}

impl HashedLocationResolver {
    pub fn new<I, S>(locations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            locations: locations.into_iter().map(Into::into).collect(),
        }
    }

    fn is_local(ip_address: &str) -> bool {
        match ip_address.parse::<IpAddr>() {
            Ok(IpAddr::V4(ip)) => ip.is_loopback() || ip.is_private() || ip.is_link_local(),
            Ok(IpAddr::V6(ip)) => {
                ip.is_loopback() || ip.is_unique_local() || ip.is_unicast_link_local()
            }
            Err(_) => false,
        }
    }
}

#[async_trait]
impl LocationResolver for HashedLocationResolver {
    async fn resolve(&self, ip_address: &str) -> Result<Option<String>, Error> {
        if ip_address.is_empty() || self.locations.is_empty() {
            return Ok(None);
        }

        if Self::is_local(ip_address) {
            return Ok(Some(LOCAL_NETWORK.to_string()));
        }

        let digest = Sha256::digest(ip_address.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        let index = (u64::from_be_bytes(prefix) % self.locations.len() as u64) as usize;

        Ok(Some(self.locations[index].clone()))
    }
}
