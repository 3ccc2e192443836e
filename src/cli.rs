//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use harvester_core::Settings;

/// Mirror the PDF documents published on broker websites.
///
/// Reads a seed list of `link <url>` and `crawl <url>` lines, collects the PDF
/// links, downloads new or changed documents and records them in a JSON
/// manifest.
///
/// Flags override the config file, which overrides the built-in defaults.
#[derive(Parser, Debug)]
#[command(name = "harvester")]
#[command(author, version, about)]
pub struct Args {
    /// Seed list file [default: sources.txt]
    #[arg(long, value_name = "FILE")]
    pub sources: Option<PathBuf>,

    /// Directory for downloaded documents [default: data/raw]
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Manifest JSON file [default: data/manifest.json]
    #[arg(long, value_name = "FILE")]
    pub manifest: Option<PathBuf>,

    /// Also export the manifest as CSV
    #[arg(long, value_name = "FILE")]
    pub csv: Option<PathBuf>,

    /// Keep only documents from this year (repeatable; turns on the year filter)
    #[arg(long = "year", value_name = "YYYY", value_parser = parse_year)]
    pub years: Vec<String>,

    /// Keep only documents from the filter years (default: this year and last)
    #[arg(long)]
    pub only_years: bool,

    /// Host documents may come from, subdomains included (repeatable)
    #[arg(long = "allow-domain", value_name = "DOMAIN")]
    pub allowed_domains: Vec<String>,

    /// Maximum concurrent downloads (1-16) [default: 4]
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=16))]
    pub concurrency: Option<u8>,

    /// Retries after the first attempt for transient failures (0-10) [default: 2]
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub max_retries: Option<u8>,

    /// Minimum delay between requests to the same host in milliseconds (0 to disable, max 60000) [default: 1000]
    #[arg(short = 'l', long, value_name = "MS", value_parser = clap::value_parser!(u64).range(0..=60000))]
    pub rate_limit: Option<u64>,

    /// Whole-request timeout in seconds (1-3600) [default: 60]
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub timeout: Option<u64>,

    /// Only print the accepted document URLs; download nothing
    #[arg(long)]
    pub list_only: bool,

    /// Config file (TOML) [default: $XDG_CONFIG_HOME/harvester/config.toml]
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Log level used when `RUST_LOG` is not set.
    pub fn default_log_level(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }

    /// Overlays the flags that were given onto `settings`.
    pub fn apply_to(&self, settings: &mut Settings) {
        if let Some(sources) = &self.sources {
            settings.sources.clone_from(sources);
        }
        if let Some(output_dir) = &self.output_dir {
            settings.output_dir.clone_from(output_dir);
        }
        if let Some(manifest) = &self.manifest {
            settings.manifest.clone_from(manifest);
        }
        if self.csv.is_some() {
            settings.csv.clone_from(&self.csv);
        }
        if !self.years.is_empty() {
            settings.years.clone_from(&self.years);
            settings.only_years = true;
        }
        if self.only_years {
            settings.only_years = true;
        }
        if !self.allowed_domains.is_empty() {
            settings.allowed_domains.clone_from(&self.allowed_domains);
        }
        if let Some(concurrency) = self.concurrency {
            settings.concurrency = usize::from(concurrency);
        }
        if let Some(max_retries) = self.max_retries {
            settings.max_retries = u32::from(max_retries);
        }
        if let Some(rate_limit) = self.rate_limit {
            settings.rate_limit_ms = rate_limit;
        }
        if let Some(timeout) = self.timeout {
            settings.timeout_secs = timeout;
        }
        if self.list_only {
            settings.list_only = true;
        }
    }
}

fn parse_year(value: &str) -> Result<String, String> {
    if value.len() == 4 && value.bytes().all(|b| b.is_ascii_digit()) {
        Ok(value.to_string())
    } else {
        Err(format!("`{value}` is not a four-digit year"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_args_parses_successfully() {
        let args = Args::try_parse_from(["harvester"]).unwrap();
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert!(!args.list_only);
        assert_eq!(args.concurrency, None);
        assert!(args.years.is_empty());
        assert_eq!(args.default_log_level(), "info");
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["harvester", "-v"]).unwrap();
        assert_eq!(args.default_log_level(), "debug");

        let args = Args::try_parse_from(["harvester", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);
        assert_eq!(args.default_log_level(), "trace");
    }

    #[test]
    fn test_cli_quiet_wins_over_verbose() {
        let args = Args::try_parse_from(["harvester", "-q", "-vv"]).unwrap();
        assert_eq!(args.default_log_level(), "error");
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Args::try_parse_from(["harvester", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_cli_invalid_flag_returns_error() {
        let err = Args::try_parse_from(["harvester", "--invalid-flag"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
    }

    #[test]
    fn test_cli_concurrency_range() {
        let args = Args::try_parse_from(["harvester", "-c", "16"]).unwrap();
        assert_eq!(args.concurrency, Some(16));

        for value in ["0", "17"] {
            let err = Args::try_parse_from(["harvester", "-c", value]).unwrap_err();
            assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation, "{value}");
        }
    }

    #[test]
    fn test_cli_retry_and_rate_limit_ranges() {
        let args = Args::try_parse_from(["harvester", "-r", "0", "-l", "0"]).unwrap();
        assert_eq!(args.max_retries, Some(0));
        assert_eq!(args.rate_limit, Some(0));

        assert!(Args::try_parse_from(["harvester", "-r", "11"]).is_err());
        assert!(Args::try_parse_from(["harvester", "-l", "60001"]).is_err());
        assert!(Args::try_parse_from(["harvester", "--timeout", "0"]).is_err());
    }

    #[test]
    fn test_cli_repeatable_year_and_domain() {
        let args = Args::try_parse_from([
            "harvester",
            "--only-years",
            "--year",
            "2025",
            "--year",
            "2024",
            "--allow-domain",
            "affix.com.br",
        ])
        .unwrap();
        assert!(args.only_years);
        assert_eq!(args.years, vec!["2025", "2024"]);
        assert_eq!(args.allowed_domains, vec!["affix.com.br"]);
    }

    #[test]
    fn test_year_flag_turns_on_year_filter() {
        let args = Args::try_parse_from(["harvester", "--year", "2023"]).unwrap();
        let mut settings = Settings::default();
        args.apply_to(&mut settings);
        assert!(settings.only_years);
        assert_eq!(settings.effective_years(2025), Some(vec!["2023".to_string()]));
    }

    #[test]
    fn test_cli_rejects_short_year() {
        let err = Args::try_parse_from(["harvester", "--year", "25"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_apply_to_overrides_only_given_flags() {
        let args = Args::try_parse_from([
            "harvester",
            "--sources",
            "seeds.txt",
            "-c",
            "2",
            "--list-only",
        ])
        .unwrap();
        let mut settings = Settings {
            rate_limit_ms: 250,
            ..Settings::default()
        };
        args.apply_to(&mut settings);

        assert_eq!(settings.sources, PathBuf::from("seeds.txt"));
        assert_eq!(settings.concurrency, 2);
        assert!(settings.list_only);
        assert_eq!(settings.rate_limit_ms, 250);
        assert_eq!(settings.output_dir, PathBuf::from("data/raw"));
    }
}
