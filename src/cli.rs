//! Command-line surface.

use clap::{ArgAction, Parser};
use rotate_core::config::RotateConfig;

/// Grandfather-father-son rotation for backup files in local directories
/// and object storage buckets.
#[derive(Parser, Debug)]
#[command(name = "rotate", version, disable_help_flag = true)]
pub struct Cli {
    /// Local directory, `s3://bucket/prefix`, `gs://bucket/prefix` or
    /// `azure://account/container/prefix`.
    pub path: String,

    /// Hourly backups to keep.
    #[arg(short = 'h', long, allow_negative_numbers = true)]
    pub hourly: Option<i64>,

    /// Daily backups to keep.
    #[arg(short = 'd', long, allow_negative_numbers = true)]
    pub daily: Option<i64>,

    /// Weekly backups to keep.
    #[arg(short = 'w', long, allow_negative_numbers = true)]
    pub weekly: Option<i64>,

    /// Monthly backups to keep.
    #[arg(short = 'm', long, allow_negative_numbers = true)]
    pub monthly: Option<i64>,

    /// Yearly backups to keep. Negative keeps every yearly backup.
    #[arg(short = 'y', long, allow_negative_numbers = true)]
    pub yearly: Option<i64>,

    /// Report what would be deleted without deleting anything.
    #[arg(short = 'D', long)]
    pub dry_run: bool,

    /// Maximum deletes in flight.
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub log_json: bool,

    /// Print help.
    #[arg(long, action = ArgAction::Help)]
    pub help: Option<bool>,
}

impl Cli {
    /// Flags override whatever the file and environment layers set.
    pub fn apply(&self, config: &mut RotateConfig) {
        let retention = &mut config.retention;
        if let Some(v) = self.hourly {
            retention.hourly = v;
        }
        if let Some(v) = self.daily {
            retention.daily = v;
        }
        if let Some(v) = self.weekly {
            retention.weekly = v;
        }
        if let Some(v) = self.monthly {
            retention.monthly = v;
        }
        if let Some(v) = self.yearly {
            retention.yearly = v;
        }
        if self.dry_run {
            retention.dry_run = true;
        }
        if let Some(n) = self.concurrency {
            config.deletion.concurrency = n;
        }
        if self.log_json {
            config.logging.json = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_short_h_is_hourly() {
        let cli = Cli::try_parse_from(["rotate", "/backups", "-h", "3", "-y", "-1", "-D"]).unwrap();
        assert_eq!(cli.hourly, Some(3));
        assert_eq!(cli.yearly, Some(-1));
        assert!(cli.dry_run);
        assert_eq!(cli.path, "/backups");
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "rotate",
            "s3://bucket/db",
            "--daily",
            "2",
            "--concurrency",
            "8",
        ])
        .unwrap();

        let mut config = RotateConfig::default();
        cli.apply(&mut config);

        let scheme = config.retention_scheme().unwrap();
        assert_eq!(scheme.daily, 2);
        assert_eq!(scheme.hourly, 24);
        assert!(!scheme.dry_run);
        assert_eq!(config.deletion.concurrency, 8);
    }
}
