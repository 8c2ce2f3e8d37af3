// src/cert_parser.rs
use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use x509_parser::extensions::ParsedExtension;
use x509_parser::prelude::*;

use crate::types::{EntryKind, LogEntry};

/// Decoder for RFC 6962 log entries.
///
/// `leaf_input` carries the MerkleTreeLeaf; the entry type sits at bytes
/// 10-11. Final certificates embed their DER in the leaf itself, while
/// precertificates only carry the TBS there, so for those the full
/// precert is taken from the front of `extra_data` instead.
pub struct CertificateParser;

impl CertificateParser {
    /// Decode one wire entry into a `LogEntry`.
    pub fn parse_log_entry(index: i64, base64_leaf_input: &str, base64_extra_data: &str) -> Result<LogEntry> {
        use base64::Engine;

        let leaf_bytes = base64::engine::general_purpose::STANDARD
            .decode(base64_leaf_input)
            .context("Failed to decode base64 leaf_input")?;

        if leaf_bytes.len() < 12 {
            anyhow::bail!("Leaf input too short: {} bytes", leaf_bytes.len());
        }

        // Entry type at bytes 10-11 (big-endian u16)
        let entry_type = ((leaf_bytes[10] as u16) << 8) | (leaf_bytes[11] as u16);

        match entry_type {
            0 => {
                // x509_entry: certificate DER is in leaf_input behind a
                // 3-byte length
                if leaf_bytes.len() < 15 {
                    anyhow::bail!("x509_entry too short");
                }

                let cert_len = ((leaf_bytes[12] as usize) << 16)
                    | ((leaf_bytes[13] as usize) << 8)
                    | (leaf_bytes[14] as usize);

                let end_pos = std::cmp::min(15 + cert_len, leaf_bytes.len());
                let cert_der = &leaf_bytes[15..end_pos];

                Self::decode_der(index, cert_der, EntryKind::Certificate)
            }
            1 => {
                // precert_entry: extra_data starts with 3-byte length +
                // full precertificate, then the chain
                let extra_bytes = base64::engine::general_purpose::STANDARD
                    .decode(base64_extra_data)
                    .context("Failed to decode base64 extra_data")?;

                if extra_bytes.len() < 3 {
                    anyhow::bail!("extra_data too short for precert_entry");
                }

                let precert_len = ((extra_bytes[0] as usize) << 16)
                    | ((extra_bytes[1] as usize) << 8)
                    | (extra_bytes[2] as usize);

                if extra_bytes.len() < 3 + precert_len {
                    anyhow::bail!("extra_data truncated: expected {} bytes", 3 + precert_len);
                }

                let precert_der = &extra_bytes[3..3 + precert_len];

                Self::decode_der(index, precert_der, EntryKind::Precertificate)
            }
            _ => {
                anyhow::bail!("Unknown entry type: {}", entry_type);
            }
        }
    }

    /// Extract the fields the pipeline cares about from certificate DER.
    fn decode_der(index: i64, der_bytes: &[u8], kind: EntryKind) -> Result<LogEntry> {
        let sha256 = {
            let mut hasher = Sha256::new();
            hasher.update(der_bytes);
            hex::encode(hasher.finalize())
        };

        let (_, cert) = X509Certificate::from_der(der_bytes)
            .map_err(|e| anyhow::anyhow!("Failed to parse certificate from DER: {:?}", e))?;

        let mut dns_names = Vec::new();
        for ext in cert.extensions() {
            if let ParsedExtension::SubjectAlternativeName(san) = ext.parsed_extension() {
                for general_name in &san.general_names {
                    if let GeneralName::DNSName(dns_name) = general_name {
                        dns_names.push(dns_name.to_string());
                    }
                }
            }
        }

        let subject_cn = Self::first_cn(cert.subject());
        let issuer_cn = Self::first_cn(cert.issuer());
        let serial = hex::encode(cert.raw_serial());

        let not_before = Some(cert.validity().not_before.timestamp());
        let not_after = Some(cert.validity().not_after.timestamp());

        Ok(LogEntry {
            index,
            kind,
            subject_cn,
            issuer_cn,
            dns_names,
            serial,
            not_before,
            not_after,
            sha256,
            raw_der: der_bytes.to_vec(),
        })
    }

    /// First common name attribute of an X.509 name, if any.
    fn first_cn(name: &X509Name) -> Option<String> {
        name.iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .map(|cn| cn.to_string())
    }
}

/// Render certificate DER as PEM.
pub fn der_to_pem(der: &[u8]) -> String {
    use base64::Engine;

    let encoded = base64::engine::general_purpose::STANDARD.encode(der);
    let mut pem = String::with_capacity(encoded.len() + encoded.len() / 64 + 64);

    pem.push_str("-----BEGIN CERTIFICATE-----\n");
    // base64 output is ASCII, chunking cannot split a character
    for chunk in encoded.as_bytes().chunks(64) {
        pem.push_str(std::str::from_utf8(chunk).unwrap_or(""));
        pem.push('\n');
    }
    pem.push_str("-----END CERTIFICATE-----\n");

    pem
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    fn b64(bytes: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    #[test]
    fn test_invalid_base64_rejected() {
        assert!(CertificateParser::parse_log_entry(0, "not-base64!!!", "").is_err());
    }

    #[test]
    fn test_leaf_too_short_rejected() {
        let short = b64(b"short");
        assert!(CertificateParser::parse_log_entry(0, &short, "").is_err());
    }

    #[test]
    fn test_unknown_entry_type_rejected() {
        // 12-byte leaf header with entry type 2
        let mut leaf = vec![0u8; 12];
        leaf[10] = 0;
        leaf[11] = 2;
        let err = CertificateParser::parse_log_entry(7, &b64(&leaf), "").unwrap_err();
        assert!(err.to_string().contains("Unknown entry type"));
    }

    #[test]
    fn test_x509_entry_with_garbage_der_rejected() {
        // Valid framing, invalid certificate bytes
        let mut leaf = vec![0u8; 12];
        leaf[11] = 0;
        leaf.extend_from_slice(&[0, 0, 3]); // 3-byte length
        leaf.extend_from_slice(&[0xde, 0xad, 0xbe]);
        assert!(CertificateParser::parse_log_entry(0, &b64(&leaf), "").is_err());
    }

    #[test]
    fn test_precert_truncated_extra_data_rejected() {
        let mut leaf = vec![0u8; 12];
        leaf[11] = 1;
        // claims 100 bytes of precert, provides 2
        let extra = vec![0u8, 0, 100, 1, 2];
        let err =
            CertificateParser::parse_log_entry(0, &b64(&leaf), &b64(&extra)).unwrap_err();
        assert!(err.to_string().contains("truncated"));
    }

    #[test]
    fn test_der_to_pem_wraps_lines() {
        let pem = der_to_pem(&[0xab; 100]);
        assert!(pem.starts_with("-----BEGIN CERTIFICATE-----\n"));
        assert!(pem.ends_with("-----END CERTIFICATE-----\n"));
        for line in pem.lines() {
            assert!(line.len() <= 64);
        }
    }
}
