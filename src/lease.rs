//! Lease records as parsed from a `dhcpd.leases` file.
//!
//! A [`LeaseRecord`] is the structured form of one `lease <ip> { ... }`
//! block. Every clause is optional; absent clauses are `None` rather than
//! errors, and the resolver decides what to do with incomplete records.

use std::fmt;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::lexer::Span;

/// Link-layer binding from a `hardware <type> <mac>;` clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hardware {
    /// Link-layer type token, e.g. `ethernet`.
    pub hardware_type: String,
    /// Six lowercase, colon-separated hex octets.
    pub mac: String,
}

/// A timestamp clause value.
///
/// dhcpd writes `<weekday> <date> <time>` in UTC, or `epoch <seconds>` when
/// configured with `db-time-format local`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRef {
    /// Day-of-week digit (0 = Sunday) as written in the file.
    ///
    /// Not checked against `datetime`. `None` for the `epoch` form.
    pub weekday: Option<u8>,
    pub datetime: DateTime<Utc>,
}

/// Value of an `ends` clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndsAt {
    At(DateRef),
    /// `ends never;` (infinite lease).
    Never,
}

/// The two tokens of a `binding <name> <value>;` clause, e.g. `state active`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub name: String,
    pub value: String,
}

/// One lease block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseRecord {
    /// Dotted-quad from the block header. Only the shape is checked, so
    /// values like `999.999.999.999` are kept verbatim.
    pub ip_address: String,
    pub hardware: Option<Hardware>,
    pub starts: Option<DateRef>,
    pub ends: Option<EndsAt>,
    /// Time the peer has been told the lease expires (failover).
    pub tstp: Option<DateRef>,
    /// Time the peer acknowledged the lease expiry (failover).
    pub tsfp: Option<DateRef>,
    /// Client identifier, quoted text with escapes left as written.
    pub uid: Option<String>,
    pub binding: Option<Binding>,
}

impl LeaseRecord {
    /// Creates a record with only the header address set.
    pub fn new(ip_address: impl Into<String>) -> Self {
        Self {
            ip_address: ip_address.into(),
            hardware: None,
            starts: None,
            ends: None,
            tstp: None,
            tsfp: None,
            uid: None,
            binding: None,
        }
    }

    /// Returns the header address if it is a valid IPv4 address.
    pub fn ipv4(&self) -> Option<Ipv4Addr> {
        self.ip_address.parse().ok()
    }

    /// Returns the normalized MAC address, if a hardware clause was present.
    pub fn mac(&self) -> Option<&str> {
        self.hardware.as_ref().map(|hardware| hardware.mac.as_str())
    }

    /// Returns the start time used for recency comparisons.
    pub fn starts_at(&self) -> Option<DateTime<Utc>> {
        self.starts.map(|starts| starts.datetime)
    }
}

/// A lease record together with the byte range its block occupied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseMatch {
    pub record: LeaseRecord,
    pub span: Span,
}

/// Normalizes a MAC address for table lookups.
///
/// Accepts `:` or `-` separators and either hex case. Returns `None` unless
/// the input is exactly six groups of two hex digits.
pub fn normalize_mac(mac: &str) -> Option<String> {
    let normalized = mac.trim().to_ascii_lowercase().replace('-', ":");
    let groups: Vec<&str> = normalized.split(':').collect();
    let well_formed = groups.len() == 6
        && groups
            .iter()
            .all(|group| group.len() == 2 && group.bytes().all(|byte| byte.is_ascii_hexdigit()));
    well_formed.then_some(normalized)
}

impl fmt::Display for LeaseRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lease {}", self.ip_address)?;
        if let Some(hardware) = &self.hardware {
            write!(f, " ({} {})", hardware.hardware_type, hardware.mac)?;
        }
        if let Some(starts) = &self.starts {
            write!(f, " starts {}", starts.datetime.format("%Y/%m/%d %H:%M:%S"))?;
        }
        Ok(())
    }
}
