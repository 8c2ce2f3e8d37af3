// src/matcher.rs
//! Interest predicate applied to every decoded log entry
//!
//! A policy is compiled once at startup and shared read-only with the
//! scan workers. The decision is pure: rule against subject CN or any
//! DNS SAN, vetoed when the issuer CN sits on the CA whitelist.

use regex::Regex;
use std::collections::HashSet;

use crate::error::MonitorError;
use crate::types::LogEntry;

/// Compiled match policy: subject rule plus issuer whitelist.
pub struct MatchPolicy {
    subject_rule: Regex,
    ca_whitelist: HashSet<String>,
}

impl MatchPolicy {
    /// Compile a policy. An empty or blank subject rule is rejected so a
    /// missing config value can never turn into match-everything.
    pub fn new<I, S>(subject_regex: &str, ca_whitelist: I) -> Result<Self, MonitorError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if subject_regex.trim().is_empty() {
            return Err(MonitorError::Config(
                "subject_regex must not be empty".to_string(),
            ));
        }

        let subject_rule = Regex::new(subject_regex).map_err(|e| {
            MonitorError::Config(format!("invalid subject_regex '{}': {}", subject_regex, e))
        })?;

        Ok(Self {
            subject_rule,
            ca_whitelist: ca_whitelist.into_iter().map(Into::into).collect(),
        })
    }

    /// True iff the subject rule hits the CN or any SAN and the issuing
    /// CA is not whitelisted. Applies identically to certificates and
    /// precertificates; for precerts the fields are the pre-issuance
    /// subject data carried on the entry.
    pub fn matches(&self, entry: &LogEntry) -> bool {
        if self.is_whitelisted_issuer(entry.issuer_cn.as_deref()) {
            return false;
        }

        if let Some(cn) = &entry.subject_cn {
            if self.subject_rule.is_match(cn) {
                return true;
            }
        }

        entry.dns_names.iter().any(|san| self.subject_rule.is_match(san))
    }

    fn is_whitelisted_issuer(&self, issuer_cn: Option<&str>) -> bool {
        match issuer_cn {
            Some(cn) => self.ca_whitelist.contains(cn),
            None => false,
        }
    }

    pub fn subject_rule(&self) -> &str {
        self.subject_rule.as_str()
    }

    pub fn whitelist_len(&self) -> usize {
        self.ca_whitelist.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntryKind;

    fn entry(cn: Option<&str>, issuer: Option<&str>, sans: &[&str]) -> LogEntry {
        LogEntry {
            index: 0,
            kind: EntryKind::Certificate,
            subject_cn: cn.map(String::from),
            issuer_cn: issuer.map(String::from),
            dns_names: sans.iter().map(|s| s.to_string()).collect(),
            serial: "01".to_string(),
            not_before: None,
            not_after: None,
            sha256: "00".to_string(),
            raw_der: Vec::new(),
        }
    }

    fn policy() -> MatchPolicy {
        MatchPolicy::new(r".*\.example\.com$", vec!["Trusted CA"]).unwrap()
    }

    #[test]
    fn test_whitelisted_issuer_suppresses_match() {
        let p = policy();
        let e = entry(Some("login.example.com"), Some("Trusted CA"), &[]);
        assert!(!p.matches(&e));
    }

    #[test]
    fn test_non_whitelisted_issuer_matches() {
        let p = policy();
        let e = entry(Some("login.example.com"), Some("Other CA"), &[]);
        assert!(p.matches(&e));
    }

    #[test]
    fn test_san_only_match() {
        let p = policy();
        let e = entry(
            Some("unrelated.org"),
            Some("Other CA"),
            &["api.example.com", "cdn.example.net"],
        );
        assert!(p.matches(&e));
    }

    #[test]
    fn test_no_san_no_cn_match_is_negative() {
        let p = policy();
        let e = entry(Some("unrelated.org"), Some("Other CA"), &[]);
        assert!(!p.matches(&e));

        // Issuer is irrelevant when nothing matches the rule
        let e = entry(Some("unrelated.org"), Some("Trusted CA"), &[]);
        assert!(!p.matches(&e));
    }

    #[test]
    fn test_missing_cn_falls_through_to_sans() {
        let p = policy();
        let e = entry(None, Some("Other CA"), &["www.example.com"]);
        assert!(p.matches(&e));

        let e = entry(None, Some("Other CA"), &[]);
        assert!(!p.matches(&e));
    }

    #[test]
    fn test_missing_issuer_is_not_whitelisted() {
        let p = policy();
        let e = entry(Some("login.example.com"), None, &[]);
        assert!(p.matches(&e));
    }

    #[test]
    fn test_empty_rule_rejected() {
        assert!(MatchPolicy::new("", Vec::<String>::new()).is_err());
        assert!(MatchPolicy::new("   ", Vec::<String>::new()).is_err());
    }

    #[test]
    fn test_invalid_rule_rejected() {
        let err = MatchPolicy::new(r"(\unclosed", Vec::<String>::new());
        assert!(matches!(err, Err(MonitorError::Config(_))));
    }

    #[test]
    fn test_decision_is_idempotent() {
        let p = policy();
        let e = entry(Some("login.example.com"), Some("Other CA"), &[]);
        let first = p.matches(&e);
        for _ in 0..10 {
            assert_eq!(p.matches(&e), first);
        }
    }

    #[test]
    fn test_precert_same_rule_as_cert() {
        let p = policy();
        let mut e = entry(Some("login.example.com"), Some("Other CA"), &[]);
        e.kind = EntryKind::Precertificate;
        assert!(p.matches(&e));

        e.issuer_cn = Some("Trusted CA".to_string());
        assert!(!p.matches(&e));
    }
}
