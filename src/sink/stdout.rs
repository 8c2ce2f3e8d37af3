// src/sink/stdout.rs
//! Terminal sink: colored human-readable blocks or JSONL

use anyhow::Result;
use async_trait::async_trait;
use chrono::DateTime;
use colored::Colorize;
use serde::Deserialize;
use std::io::{self, Write};

use super::EventSink;
use crate::types::{LogEntry, MatchRecord};

/// How matches are rendered.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StdoutFormat {
    /// Readable multi-line block, colored when stdout is a TTY.
    #[default]
    Human,
    /// One JSON object per line, for piping into other tools.
    Jsonl,
}

pub struct StdoutSink {
    writer: Box<dyn Write + Send>,
    format: StdoutFormat,
    use_colors: bool,
}

impl StdoutSink {
    pub fn new(format: StdoutFormat) -> Self {
        let use_colors =
            format == StdoutFormat::Human && is_terminal::is_terminal(std::io::stdout());

        Self {
            writer: Box::new(io::stdout()),
            format,
            use_colors,
        }
    }

    /// Render into an arbitrary writer with colors off.
    pub fn to_writer(writer: Box<dyn Write + Send>, format: StdoutFormat) -> Self {
        Self {
            writer,
            format,
            use_colors: false,
        }
    }

    fn format_timestamp(timestamp: i64) -> String {
        match DateTime::from_timestamp(timestamp, 0) {
            Some(datetime) => datetime.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => timestamp.to_string(),
        }
    }

    fn write_human(&mut self, record: &MatchRecord) -> io::Result<()> {
        let timestamp = Self::format_timestamp(record.seen_at);
        let issuer = record.issuer_cn.as_deref().unwrap_or("unknown issuer");

        if self.use_colors {
            writeln!(
                self.writer,
                "{} {} {} ({} at index {})",
                format!("[{}]", timestamp).dimmed(),
                "[+]".green().bold(),
                record.display_name().cyan().bold(),
                record.kind,
                record.log_index
            )?;
            writeln!(self.writer, "    {} {}", "Issuer:".dimmed(), issuer.yellow())?;
            if !record.dns_names.is_empty() {
                writeln!(
                    self.writer,
                    "    {} {}",
                    "SANs:".dimmed(),
                    record.dns_names.join(", ")
                )?;
            }
            writeln!(self.writer, "    {} {}", "Details:".dimmed(), record.crtsh_url)?;
        } else {
            writeln!(
                self.writer,
                "[{}] [+] {} ({} at index {})",
                timestamp,
                record.display_name(),
                record.kind,
                record.log_index
            )?;
            writeln!(self.writer, "    Issuer: {}", issuer)?;
            if !record.dns_names.is_empty() {
                writeln!(self.writer, "    SANs: {}", record.dns_names.join(", "))?;
            }
            writeln!(self.writer, "    Details: {}", record.crtsh_url)?;
        }

        Ok(())
    }
}

#[async_trait]
impl EventSink for StdoutSink {
    fn name(&self) -> &'static str {
        "stdout"
    }

    async fn deliver(&mut self, entry: &LogEntry) -> Result<()> {
        let record = MatchRecord::from_entry(entry);

        match self.format {
            StdoutFormat::Human => self.write_human(&record)?,
            StdoutFormat::Jsonl => {
                let json = serde_json::to_string(&record)?;
                writeln!(self.writer, "{}", json)?;
            }
        }

        self.writer.flush()?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
