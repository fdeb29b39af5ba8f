//! Weighted selection of outgoing source addresses.
//!
//! Each configured interface carries a metric (capacity weight) and a live
//! in-use count. [`Balancer::acquire`] hands out the interface with the
//! smallest `in_use / metric` ratio for the requested family; the returned
//! [`Lease`] gives the count back when dropped.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::addr::{Family, HostAddr};
use crate::error::{Error, Result};

/// One configured source address: `addr@metric` on the command line, with
/// `@metric` defaulting to 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IfaceSpec {
    pub addr: HostAddr,
    pub metric: u32,
}

impl FromStr for IfaceSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let (addr_str, metric) = match trimmed.rsplit_once('@') {
            Some((addr, metric)) => {
                let metric: u32 = metric.parse().map_err(|_| Error::parse(s))?;
                if metric == 0 {
                    return Err(Error::parse(s));
                }
                (addr, metric)
            }
            None => (trimmed, 1),
        };
        let addr: HostAddr = addr_str.parse().map_err(|_| Error::parse(s))?;
        Ok(IfaceSpec { addr, metric })
    }
}

impl fmt::Display for IfaceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.addr, self.metric)
    }
}

struct Iface {
    addr: HostAddr,
    metric: u32,
    in_use: u32,
}

impl Iface {
    /// Strictly lighter loaded than `other`, comparing `in_use / metric`
    /// by cross-multiplication. Strict `<` keeps earlier-inserted winners
    /// on ties.
    fn lighter_than(&self, other: &Iface) -> bool {
        (self.in_use as u64) * (other.metric as u64) < (other.in_use as u64) * (self.metric as u64)
    }
}

#[derive(Default)]
struct Buckets {
    v4: Vec<Iface>,
    v6: Vec<Iface>,
}

impl Buckets {
    fn bucket(&self, family: Family) -> &[Iface] {
        match family {
            Family::V4 => &self.v4,
            Family::V6 => &self.v6,
        }
    }

    fn bucket_mut(&mut self, family: Family) -> &mut Vec<Iface> {
        match family {
            Family::V4 => &mut self.v4,
            Family::V6 => &mut self.v6,
        }
    }
}

/// Catalogue of outgoing source addresses, partitioned by family. Sessions
/// borrow one interface at a time through [`Lease`]; the balancer owns the
/// interfaces for the process lifetime, so lease indices stay stable.
pub struct Balancer {
    buckets: Mutex<Buckets>,
}

impl Balancer {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(Buckets::default()),
        }
    }

    pub fn from_specs<I: IntoIterator<Item = IfaceSpec>>(specs: I) -> Self {
        let balancer = Self::new();
        for spec in specs {
            balancer.add(spec.addr, spec.metric);
        }
        balancer
    }

    /// Appends a source address with the given capacity weight.
    pub fn add(&self, addr: HostAddr, metric: u32) {
        let mut buckets = self.buckets.lock();
        buckets.bucket_mut(addr.family()).push(Iface {
            addr,
            metric,
            in_use: 0,
        });
    }

    /// Whether any interface of `family` is configured.
    pub fn has_family(&self, family: Family) -> bool {
        !self.buckets.lock().bucket(family).is_empty()
    }

    /// Picks the lightest-loaded interface among the families selected by
    /// `mask` (see [`Family::bit`]) and marks it in use. `None` when no
    /// configured interface matches the mask.
    pub fn acquire(self: &Arc<Self>, mask: u8) -> Option<Lease> {
        let mut buckets = self.buckets.lock();

        let mut selected: Option<(Family, usize)> = None;
        for family in [Family::V4, Family::V6] {
            if mask & family.bit() == 0 {
                continue;
            }
            for index in 0..buckets.bucket(family).len() {
                let better = match selected {
                    None => true,
                    Some((sel_family, sel_index)) => buckets.bucket(family)[index]
                        .lighter_than(&buckets.bucket(sel_family)[sel_index]),
                };
                if better {
                    selected = Some((family, index));
                }
            }
        }

        let (family, index) = selected?;
        let iface = &mut buckets.bucket_mut(family)[index];
        iface.in_use += 1;
        Some(Lease {
            balancer: Arc::clone(self),
            family,
            index,
            addr: iface.addr,
        })
    }

    fn release(&self, family: Family, index: usize) {
        let mut buckets = self.buckets.lock();
        let iface = &mut buckets.bucket_mut(family)[index];
        debug_assert!(iface.in_use > 0, "release without matching acquire");
        iface.in_use = iface.in_use.saturating_sub(1);
    }

    /// Current `(addr, metric, in_use)` rows, insertion-ordered per family.
    pub fn snapshot(&self) -> Vec<(HostAddr, u32, u32)> {
        let buckets = self.buckets.lock();
        buckets
            .v4
            .iter()
            .chain(buckets.v6.iter())
            .map(|iface| (iface.addr, iface.metric, iface.in_use))
            .collect()
    }

    /// Total live borrows across all interfaces.
    pub fn total_in_use(&self) -> u32 {
        let buckets = self.buckets.lock();
        buckets
            .v4
            .iter()
            .chain(buckets.v6.iter())
            .map(|iface| iface.in_use)
            .sum()
    }
}

impl Default for Balancer {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared borrow of one interface. Dropping the lease returns the borrow,
/// decrementing the interface's live count exactly once.
pub struct Lease {
    balancer: Arc<Balancer>,
    family: Family,
    index: usize,
    addr: HostAddr,
}

impl Lease {
    /// Source address to bind the outbound socket to.
    pub fn addr(&self) -> HostAddr {
        self.addr
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.balancer.release(self.family, self.index);
    }
}

impl fmt::Debug for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Lease").field(&self.addr).finish()
    }
}
