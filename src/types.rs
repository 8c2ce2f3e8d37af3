// src/types.rs
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Kind of leaf carried by a log entry (RFC 6962 LogEntryType).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Certificate,
    Precertificate,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::Certificate => write!(f, "certificate"),
            EntryKind::Precertificate => write!(f, "precertificate"),
        }
    }
}

/// A decoded entry from the log, position plus extracted X.509 fields.
///
/// `raw_der` keeps the certificate bytes so sinks can render PEM without
/// re-fetching; everything else is pre-extracted so the matcher and the
/// sinks never touch the DER again.
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Zero-based position in the log.
    pub index: i64,
    pub kind: EntryKind,
    /// Subject common name, absent on CN-less certificates.
    pub subject_cn: Option<String>,
    /// Issuer common name.
    pub issuer_cn: Option<String>,
    /// DNS subject alternative names.
    pub dns_names: Vec<String>,
    /// Serial number, hex.
    pub serial: String,
    /// Validity start (Unix timestamp).
    pub not_before: Option<i64>,
    /// Validity end (Unix timestamp).
    pub not_after: Option<i64>,
    /// SHA-256 of the DER, hex.
    pub sha256: String,
    pub raw_der: Vec<u8>,
}

impl LogEntry {
    pub fn is_precert(&self) -> bool {
        self.kind == EntryKind::Precertificate
    }

    /// Public detail page for this certificate.
    pub fn crtsh_url(&self) -> String {
        format!("https://crt.sh/?sha256={}", self.sha256)
    }
}

/// Event delivered to every registered sink.
///
/// The payload lives inside the match variants, so an event can never
/// claim a match without carrying the entry it matched.
#[derive(Debug, Clone)]
pub enum MonEvent {
    CertificateMatch(Arc<LogEntry>),
    PrecertificateMatch(Arc<LogEntry>),
    /// Terminal marker: flush and stop. Sent exactly once per sink.
    Quit,
}

impl MonEvent {
    /// Wrap a matched entry in the variant its kind dictates.
    pub fn matched(entry: Arc<LogEntry>) -> Self {
        match entry.kind {
            EntryKind::Certificate => MonEvent::CertificateMatch(entry),
            EntryKind::Precertificate => MonEvent::PrecertificateMatch(entry),
        }
    }

    /// The matched entry, if this is a match event.
    pub fn entry(&self) -> Option<&Arc<LogEntry>> {
        match self {
            MonEvent::CertificateMatch(e) | MonEvent::PrecertificateMatch(e) => Some(e),
            MonEvent::Quit => None,
        }
    }

    pub fn is_quit(&self) -> bool {
        matches!(self, MonEvent::Quit)
    }
}

/// Serializable projection of a matched entry, shared by the database,
/// webhook, Redis and JSONL sinks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Position of the entry in the log.
    pub log_index: i64,
    pub kind: EntryKind,
    pub subject_cn: Option<String>,
    pub issuer_cn: Option<String>,
    pub dns_names: Vec<String>,
    pub serial: String,
    pub not_before: Option<i64>,
    pub not_after: Option<i64>,
    pub sha256: String,
    /// PEM-encoded certificate.
    pub pem: String,
    pub crtsh_url: String,
    /// Unix timestamp when the match was observed.
    pub seen_at: i64,
}

impl MatchRecord {
    pub fn from_entry(entry: &LogEntry) -> Self {
        Self {
            log_index: entry.index,
            kind: entry.kind,
            subject_cn: entry.subject_cn.clone(),
            issuer_cn: entry.issuer_cn.clone(),
            dns_names: entry.dns_names.clone(),
            serial: entry.serial.clone(),
            not_before: entry.not_before,
            not_after: entry.not_after,
            sha256: entry.sha256.clone(),
            pem: crate::cert_parser::der_to_pem(&entry.raw_der),
            crtsh_url: entry.crtsh_url(),
            seen_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Best display name: CN, else first SAN, else the serial.
    pub fn display_name(&self) -> &str {
        self.subject_cn
            .as_deref()
            .or_else(|| self.dns_names.first().map(|s| s.as_str()))
            .unwrap_or(&self.serial)
    }
}

impl fmt::Display for MatchRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[+] Match at index {}: {}", self.log_index, self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry(kind: EntryKind) -> LogEntry {
        LogEntry {
            index: 1234,
            kind,
            subject_cn: Some("login.example.com".to_string()),
            issuer_cn: Some("Example CA".to_string()),
            dns_names: vec!["login.example.com".to_string(), "www.example.com".to_string()],
            serial: "0abc".to_string(),
            not_before: Some(1_700_000_000),
            not_after: Some(1_710_000_000),
            sha256: "deadbeef".to_string(),
            raw_der: vec![0x30, 0x82],
        }
    }

    #[test]
    fn test_event_variant_follows_entry_kind() {
        let cert = Arc::new(sample_entry(EntryKind::Certificate));
        assert!(matches!(MonEvent::matched(cert), MonEvent::CertificateMatch(_)));

        let precert = Arc::new(sample_entry(EntryKind::Precertificate));
        assert!(matches!(
            MonEvent::matched(precert),
            MonEvent::PrecertificateMatch(_)
        ));
    }

    #[test]
    fn test_event_entry_accessor() {
        let entry = Arc::new(sample_entry(EntryKind::Certificate));
        let event = MonEvent::matched(entry.clone());
        assert_eq!(event.entry().map(|e| e.index), Some(1234));
        assert!(MonEvent::Quit.entry().is_none());
        assert!(MonEvent::Quit.is_quit());
    }

    #[test]
    fn test_crtsh_url() {
        let entry = sample_entry(EntryKind::Certificate);
        assert_eq!(entry.crtsh_url(), "https://crt.sh/?sha256=deadbeef");
    }

    #[test]
    fn test_match_record_from_entry() {
        let entry = sample_entry(EntryKind::Precertificate);
        let record = MatchRecord::from_entry(&entry);

        assert_eq!(record.log_index, 1234);
        assert_eq!(record.kind, EntryKind::Precertificate);
        assert_eq!(record.display_name(), "login.example.com");
        assert!(record.pem.starts_with("-----BEGIN CERTIFICATE-----"));
        assert!(record.crtsh_url.contains("deadbeef"));
    }

    #[test]
    fn test_display_name_fallbacks() {
        let mut entry = sample_entry(EntryKind::Certificate);
        entry.subject_cn = None;
        let record = MatchRecord::from_entry(&entry);
        assert_eq!(record.display_name(), "login.example.com");

        entry.dns_names.clear();
        let record = MatchRecord::from_entry(&entry);
        assert_eq!(record.display_name(), "0abc");
    }

    #[test]
    fn test_record_serializes_kind_snake_case() {
        let entry = sample_entry(EntryKind::Precertificate);
        let record = MatchRecord::from_entry(&entry);
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"precertificate\""));
        assert!(json.contains("\"log_index\":1234"));
    }
}
