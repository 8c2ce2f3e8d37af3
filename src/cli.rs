// src/cli.rs
use clap::Parser;

/// ct-sentinel: Certificate Transparency log monitor
///
/// Scans a CT log for certificates whose subject matches a configured
/// rule and delivers every match to the enabled sinks (database,
/// webhook, Redis, stdout).
#[derive(Parser, Debug, Clone)]
#[command(name = "ct-sentinel")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to TOML config file
    #[arg(short = 'c', long = "config", default_value = "config.toml")]
    pub config: String,

    /// Start scanning from this index, unless the saved checkpoint is
    /// further along
    #[arg(long = "start-index", allow_negative_numbers = true)]
    pub start_index: Option<i64>,

    /// Run a single scan pass and exit, ignoring the rescan interval
    #[arg(long = "once")]
    pub once: bool,

    /// Verbose logging (set log level to debug)
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Quiet logging (set log level to warn)
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,
}

impl Cli {
    /// Validate flag combinations and return errors for invalid usage
    pub fn validate(&self) -> anyhow::Result<()> {
        // Verbose and quiet are mutually exclusive
        if self.verbose && self.quiet {
            anyhow::bail!("Cannot specify both --verbose and --quiet");
        }

        if let Some(index) = self.start_index {
            if index < 0 {
                anyhow::bail!("--start-index must not be negative");
            }
        }

        Ok(())
    }

    /// Log level forced by the verbosity flags, `None` to use the
    /// config value.
    pub fn log_level_override(&self) -> Option<&'static str> {
        if self.verbose {
            Some("debug")
        } else if self.quiet {
            Some("warn")
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_path() {
        let cli = Cli::parse_from(["ct-sentinel"]);
        assert_eq!(cli.config, "config.toml");
        assert!(cli.start_index.is_none());
        assert!(!cli.once);
    }

    #[test]
    fn test_custom_config_path() {
        let cli = Cli::parse_from(["ct-sentinel", "--config", "custom.toml"]);
        assert_eq!(cli.config, "custom.toml");
    }

    #[test]
    fn test_start_index_override() {
        let cli = Cli::parse_from(["ct-sentinel", "--start-index", "4096"]);
        assert_eq!(cli.start_index, Some(4096));
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_negative_start_index_invalid() {
        let cli = Cli::parse_from(["ct-sentinel", "--start-index", "-1"]);
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_once_flag() {
        let cli = Cli::parse_from(["ct-sentinel", "--once"]);
        assert!(cli.once);
    }

    #[test]
    fn test_verbose_and_quiet_invalid() {
        let cli = Cli::parse_from(["ct-sentinel", "--verbose", "--quiet"]);
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_log_level_override() {
        let cli = Cli::parse_from(["ct-sentinel", "--verbose"]);
        assert_eq!(cli.log_level_override(), Some("debug"));

        let cli = Cli::parse_from(["ct-sentinel", "--quiet"]);
        assert_eq!(cli.log_level_override(), Some("warn"));

        let cli = Cli::parse_from(["ct-sentinel"]);
        assert_eq!(cli.log_level_override(), None);
    }

    #[test]
    fn test_short_flags() {
        let cli = Cli::parse_from(["ct-sentinel", "-c", "test.toml", "-v"]);
        assert_eq!(cli.config, "test.toml");
        assert!(cli.verbose);
    }
}
