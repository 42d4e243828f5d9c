//! Reduction of parsed lease records to the current MAC-to-IP table.
//!
//! A lease file is an append-only log: dhcpd writes a new block every time a
//! lease changes, so one MAC usually appears many times. The resolver keeps,
//! for each MAC, the block with the latest `starts` time and publishes only
//! its address.
//!
//! # Snapshots
//!
//! [`DhcpdLeases`] publishes the table as an `Arc<LeaseTable>`. A load builds
//! a complete new table before swapping it in, so a failed load leaves the
//! old table in place and readers holding a [`snapshot`](DhcpdLeases::snapshot)
//! never observe a partial update.

use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::grammar;
use crate::lease::{LeaseMatch, LeaseRecord, normalize_mac};
use crate::lexer::Span;

/// Immutable mapping from normalized MAC address to IP address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeaseTable {
    entries: BTreeMap<String, String>,
}

impl LeaseTable {
    /// Number of distinct MAC addresses.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true if `mac` has a binding. The query is normalized first.
    pub fn contains(&self, mac: &str) -> bool {
        self.get(mac).is_some()
    }

    /// Returns the IP address bound to `mac`, if any.
    ///
    /// Either hex case and `-` separators are accepted.
    pub fn get(&self, mac: &str) -> Option<&str> {
        let key = normalize_mac(mac)?;
        self.entries.get(&key).map(String::as_str)
    }

    /// MAC addresses in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// `(mac, ip)` pairs in ascending MAC order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            inner: self.entries.iter(),
        }
    }
}

pub struct Iter<'a> {
    inner: btree_map::Iter<'a, String, String>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a str, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|(mac, ip)| (mac.as_str(), ip.as_str()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<'a> IntoIterator for &'a LeaseTable {
    type Item = (&'a str, &'a str);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Display for LeaseTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// The clause whose absence made a record unusable for resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingClause {
    Hardware,
    Starts,
}

impl fmt::Display for MissingClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingClause::Hardware => f.write_str("hardware"),
            MissingClause::Starts => f.write_str("starts"),
        }
    }
}

/// A syntactically valid lease block that could not take part in
/// resolution. Kept for diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncompleteRecord {
    pub ip_address: String,
    pub span: Span,
    pub missing: MissingClause,
}

/// Result of folding a record sequence.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub table: LeaseTable,
    pub skipped: Vec<IncompleteRecord>,
}

/// Reduces lease blocks, in file order, to one address per MAC.
///
/// Blocks without a `hardware` or `starts` clause are skipped. For each MAC
/// the block with the greatest `starts` wins; on a tie the earlier block is
/// kept.
pub fn resolve<I>(leases: I) -> Resolution
where
    I: IntoIterator<Item = LeaseMatch>,
{
    let mut latest: BTreeMap<String, LeaseRecord> = BTreeMap::new();
    let mut skipped = Vec::new();

    for LeaseMatch { record, span } in leases {
        let mac = match (record.mac(), record.starts_at()) {
            (Some(mac), Some(_)) => mac.to_string(),
            (mac, _) => {
                let missing = if mac.is_none() {
                    MissingClause::Hardware
                } else {
                    MissingClause::Starts
                };
                debug!(
                    "Skipping lease {} at bytes {}..{}: no {} clause",
                    record.ip_address, span.start, span.end, missing
                );
                skipped.push(IncompleteRecord {
                    ip_address: record.ip_address,
                    span,
                    missing,
                });
                continue;
            }
        };

        let is_newer = latest
            .get(&mac)
            .is_none_or(|current| record.starts_at() > current.starts_at());
        if is_newer {
            latest.insert(mac, record);
        }
    }

    let entries = latest
        .into_iter()
        .map(|(mac, record)| (mac, record.ip_address))
        .collect();

    Resolution {
        table: LeaseTable { entries },
        skipped,
    }
}

/// MAC-to-IP bindings loaded from a `dhcpd.leases` file.
///
/// # Example
///
/// ```no_run
/// use dhcpd_leases::DhcpdLeases;
///
/// # fn example() -> dhcpd_leases::Result<()> {
/// let mut leases = DhcpdLeases::new("/var/db/vmware/vmnet-dhcpd-vmnet8.leases")?;
/// leases.load()?;
///
/// if let Some(ip) = leases.get("00:0c:29:aa:bb:cc") {
///     println!("guest is at {}", ip);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct DhcpdLeases {
    path: PathBuf,
    table: Arc<LeaseTable>,
    skipped: Vec<IncompleteRecord>,
}

impl DhcpdLeases {
    /// Binds to a lease file without reading it. Call [`load`](Self::load)
    /// to populate the table.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `path` is not an existing regular
    /// file.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::Configuration(format!(
                "dhcpd.leases '{}' not found",
                path.display()
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            table: Arc::new(LeaseTable::default()),
            skipped: Vec::new(),
        })
    }

    /// Binds to the lease file selected by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.leases_path())
    }

    /// Reads and parses the lease file, then replaces the published table.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read and [`Error::Parse`]
    /// if a lease block is malformed. On error the previous table and
    /// diagnostics are kept.
    pub fn load(&mut self) -> Result<()> {
        match self.read_and_resolve() {
            Ok(resolution) => {
                info!(
                    "Loaded {} binding(s) from {} ({} incomplete record(s) skipped)",
                    resolution.table.len(),
                    self.path.display(),
                    resolution.skipped.len()
                );
                self.table = Arc::new(resolution.table);
                self.skipped = resolution.skipped;
                Ok(())
            }
            Err(error) => {
                warn!(
                    "Failed to load {}, keeping previous table: {}",
                    self.path.display(),
                    error
                );
                Err(error)
            }
        }
    }

    /// Same as [`load`](Self::load).
    pub fn reload(&mut self) -> Result<()> {
        self.load()
    }

    fn read_and_resolve(&self) -> Result<Resolution> {
        let content = std::fs::read_to_string(&self.path)?;
        let leases = grammar::parse(&content)?;
        Ok(resolve(leases))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns a shared handle to the current table.
    ///
    /// The handle stays valid and unchanged across later loads.
    pub fn snapshot(&self) -> Arc<LeaseTable> {
        Arc::clone(&self.table)
    }

    /// Records skipped by the last successful load.
    pub fn skipped(&self) -> &[IncompleteRecord] {
        &self.skipped
    }

    /// Number of distinct MAC addresses currently known.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn contains(&self, mac: &str) -> bool {
        self.table.contains(mac)
    }

    pub fn get(&self, mac: &str) -> Option<&str> {
        self.table.get(mac)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.table.keys()
    }

    pub fn iter(&self) -> Iter<'_> {
        self.table.iter()
    }
}

impl fmt::Display for DhcpdLeases {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestGuard(PathBuf);
    impl Drop for TestGuard {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
        }
    }

    fn test_file(name: &str, content: &str) -> (PathBuf, TestGuard) {
        let path = std::env::temp_dir().join(format!(
            "test_dhcpd_{}_{}.leases",
            name,
            std::process::id()
        ));
        std::fs::write(&path, content).unwrap();
        (path.clone(), TestGuard(path))
    }

    fn lease_block(ip: &str, mac: &str, starts: &str) -> String {
        format!(
            "lease {} {{\n  starts {};\n  ends never;\n  hardware ethernet {};\n}}\n",
            ip, starts, mac
        )
    }

    fn resolve_text(text: &str) -> Resolution {
        resolve(grammar::parse(text).unwrap())
    }

    #[test]
    fn test_latest_start_wins() {
        let text = [
            lease_block("192.168.1.10", "00:0c:29:aa:bb:cc", "1 2024/01/01 00:00:00"),
            lease_block("192.168.1.20", "00:0c:29:aa:bb:cc", "4 2024/02/01 00:00:00"),
        ]
        .concat();
        let resolution = resolve_text(&text);
        assert_eq!(resolution.table.len(), 1);
        assert_eq!(resolution.table.get("00:0c:29:aa:bb:cc"), Some("192.168.1.20"));
    }

    #[test]
    fn test_older_block_later_in_file_loses() {
        let text = [
            lease_block("192.168.1.20", "00:0c:29:aa:bb:cc", "4 2024/02/01 00:00:00"),
            lease_block("192.168.1.10", "00:0c:29:aa:bb:cc", "1 2024/01/01 00:00:00"),
        ]
        .concat();
        let table = resolve_text(&text).table;
        assert_eq!(table.get("00:0c:29:aa:bb:cc"), Some("192.168.1.20"));
    }

    #[test]
    fn test_equal_start_keeps_first() {
        let text = [
            lease_block("192.168.1.10", "00:0c:29:aa:bb:cc", "1 2024/01/01 00:00:00"),
            lease_block("192.168.1.11", "00:0c:29:aa:bb:cc", "1 2024/01/01 00:00:00"),
        ]
        .concat();
        let table = resolve_text(&text).table;
        assert_eq!(table.get("00:0c:29:aa:bb:cc"), Some("192.168.1.10"));
    }

    #[test]
    fn test_incomplete_records_are_skipped() {
        let text = "lease 192.168.1.30 {\n  hardware ethernet 00:0c:29:00:00:01;\n}\n\
                    lease 192.168.1.31 {\n  starts 1 2024/01/01 00:00:00;\n}\n";
        let resolution = resolve_text(text);
        assert!(resolution.table.is_empty());
        assert!(!resolution.table.contains("00:0c:29:00:00:01"));
        assert_eq!(resolution.skipped.len(), 2);
        assert_eq!(resolution.skipped[0].ip_address, "192.168.1.30");
        assert_eq!(resolution.skipped[0].missing, MissingClause::Starts);
        assert_eq!(resolution.skipped[1].ip_address, "192.168.1.31");
        assert_eq!(resolution.skipped[1].missing, MissingClause::Hardware);
    }

    #[test]
    fn test_incomplete_record_does_not_shadow_complete_one() {
        let text = [
            lease_block("192.168.1.10", "00:0c:29:aa:bb:cc", "1 2024/01/01 00:00:00"),
            "lease 192.168.1.99 {\n  hardware ethernet 00:0c:29:aa:bb:cc;\n}\n".to_string(),
        ]
        .concat();
        let table = resolve_text(&text).table;
        assert_eq!(table.get("00:0c:29:aa:bb:cc"), Some("192.168.1.10"));
    }

    #[test]
    fn test_table_lookup_normalizes_query() {
        let text = lease_block("10.0.0.5", "AA:BB:CC:DD:EE:FF", "1 2024/01/01 00:00:00");
        let table = resolve_text(&text).table;
        assert_eq!(table.keys().collect::<Vec<_>>(), vec!["aa:bb:cc:dd:ee:ff"]);
        assert_eq!(table.get("AA:BB:CC:DD:EE:FF"), Some("10.0.0.5"));
        assert_eq!(table.get("aa-bb-cc-dd-ee-ff"), Some("10.0.0.5"));
        assert_eq!(table.get("not a mac"), None);
    }

    #[test]
    fn test_table_display() {
        let text = [
            lease_block("10.0.0.2", "00:00:00:00:00:02", "1 2024/01/01 00:00:00"),
            lease_block("10.0.0.1", "00:00:00:00:00:01", "1 2024/01/01 00:00:00"),
        ]
        .concat();
        let table = resolve_text(&text).table;
        assert_eq!(
            table.to_string(),
            r#"{"00:00:00:00:00:01": "10.0.0.1", "00:00:00:00:00:02": "10.0.0.2"}"#
        );
        assert_eq!(
            serde_json::to_string(&table).unwrap(),
            r#"{"00:00:00:00:00:01":"10.0.0.1","00:00:00:00:00:02":"10.0.0.2"}"#
        );
    }

    #[test]
    fn test_load_scenario() {
        let text = [
            lease_block("192.168.1.10", "00:0c:29:aa:bb:cc", "1 2024/01/01 00:00:00"),
            lease_block("192.168.1.20", "00:0c:29:aa:bb:cc", "4 2024/02/01 00:00:00"),
            lease_block("192.168.1.40", "00:0c:29:11:22:33", "4 2024/02/01 08:00:00"),
        ]
        .concat();
        let (path, _guard) = test_file("scenario", &text);

        let mut leases = DhcpdLeases::new(&path).unwrap();
        assert!(leases.is_empty());

        leases.load().unwrap();
        assert_eq!(leases.len(), 2);
        assert!(leases.contains("00:0c:29:aa:bb:cc"));
        assert_eq!(leases.get("00:0c:29:aa:bb:cc"), Some("192.168.1.20"));
        assert_eq!(leases.get("00:0c:29:11:22:33"), Some("192.168.1.40"));
        assert_eq!(
            leases.keys().collect::<Vec<_>>(),
            vec!["00:0c:29:11:22:33", "00:0c:29:aa:bb:cc"]
        );
        assert_eq!(leases.path(), path.as_path());
    }

    #[test]
    fn test_reload_is_idempotent() {
        let text = lease_block("10.0.0.1", "00:00:00:00:00:01", "1 2024/01/01 00:00:00");
        let (path, _guard) = test_file("idempotent", &text);

        let mut leases = DhcpdLeases::new(&path).unwrap();
        leases.load().unwrap();
        let first = leases.snapshot();
        leases.reload().unwrap();
        assert_eq!(*first, *leases.snapshot());
    }

    #[test]
    fn test_failed_reload_keeps_previous_table() {
        let text = lease_block("10.0.0.1", "00:00:00:00:00:01", "1 2024/01/01 00:00:00");
        let (path, _guard) = test_file("bad_reload", &text);

        let mut leases = DhcpdLeases::new(&path).unwrap();
        leases.load().unwrap();
        assert_eq!(leases.len(), 1);

        std::fs::write(
            &path,
            lease_block("10.0.0.2", "00:00:00:00:00:02", "1 2024/13/40 00:00:00"),
        )
        .unwrap();
        let error = leases.reload().unwrap_err();
        assert!(error.is_parse());
        assert_eq!(leases.len(), 1);
        assert_eq!(leases.get("00:00:00:00:00:01"), Some("10.0.0.1"));
    }

    #[test]
    fn test_snapshot_survives_reload() {
        let (path, _guard) = test_file(
            "snapshot",
            &lease_block("10.0.0.1", "00:00:00:00:00:01", "1 2024/01/01 00:00:00"),
        );
        let mut leases = DhcpdLeases::new(&path).unwrap();
        leases.load().unwrap();
        let before = leases.snapshot();

        std::fs::write(
            &path,
            lease_block("10.0.0.9", "00:00:00:00:00:01", "2 2024/01/02 00:00:00"),
        )
        .unwrap();
        leases.reload().unwrap();

        assert_eq!(before.get("00:00:00:00:00:01"), Some("10.0.0.1"));
        assert_eq!(leases.get("00:00:00:00:00:01"), Some("10.0.0.9"));
    }

    #[test]
    fn test_empty_file() {
        let (path, _guard) = test_file("empty", "");
        let mut leases = DhcpdLeases::new(&path).unwrap();
        leases.load().unwrap();
        assert_eq!(leases.len(), 0);
        assert!(leases.skipped().is_empty());
        assert_eq!(leases.to_string(), "{}");
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let path = std::env::temp_dir().join("test_dhcpd_does_not_exist.leases");
        let error = DhcpdLeases::new(&path).unwrap_err();
        assert!(error.is_configuration());
    }

    #[test]
    fn test_directory_is_configuration_error() {
        let error = DhcpdLeases::new(std::env::temp_dir()).unwrap_err();
        assert!(error.is_configuration());
    }

    #[test]
    fn test_skipped_records_reported_after_load() {
        let (path, _guard) = test_file(
            "skipped",
            "lease 10.0.0.1 {\n  hardware ethernet 00:00:00:00:00:01;\n}\n",
        );
        let mut leases = DhcpdLeases::new(&path).unwrap();
        leases.load().unwrap();
        assert!(leases.is_empty());
        assert_eq!(leases.skipped().len(), 1);
        assert_eq!(leases.skipped()[0].missing, MissingClause::Starts);
    }
}
