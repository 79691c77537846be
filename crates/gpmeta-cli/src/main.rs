mod logging;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info, warn};

use gpmeta_core::config::{NamingRules, OnCollision};
use gpmeta_core::exiftool::EXIFTOOL_ENV;
use gpmeta_core::{CancellationToken, ProcessControl, ProcessOptions};

#[derive(Parser)]
#[command(
    name = "gpmeta",
    version,
    about = "Pair Google Photos Takeout media with their JSON sidecars, apply the metadata and copy both out"
)]
struct Cli {
    /// Extracted Takeout directory
    input: PathBuf,

    /// Output directory
    output: PathBuf,

    /// What to do when a destination name is taken by a different file
    #[arg(long, value_enum, default_value_t)]
    on_collision: OnCollision,

    /// Copy media without usable metadata into <output>/unmatched
    #[arg(long)]
    quarantine_unmatched: bool,

    /// TOML file overriding the sidecar naming rules
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write a JSON report of the run to this path
    #[arg(long)]
    report: Option<PathBuf>,

    /// exiftool executable (default: exiftool on PATH)
    #[arg(long, env = EXIFTOOL_ENV)]
    exiftool: Option<PathBuf>,

    /// Seconds before a hanging exiftool call is killed
    #[arg(long, default_value_t = 120)]
    tool_timeout: u64,

    /// Directory for log files
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = logging::init_logger(&cli.log_dir)?;
    let t_total = std::time::Instant::now();

    let naming = match &cli.config {
        Some(path) => NamingRules::load(path)?,
        None => NamingRules::default(),
    };

    let options = ProcessOptions {
        input: cli.input,
        output: cli.output,
        on_collision: cli.on_collision,
        quarantine_unmatched: cli.quarantine_unmatched,
        naming,
        exiftool: cli.exiftool,
        tool_timeout_secs: cli.tool_timeout,
    };

    let token = CancellationToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        warn!("Interrupted, stopping after the current file");
        handler_token.cancel();
    })
    .context("cannot install Ctrl-C handler")?;
    let control = ProcessControl::new().with_cancel_token(token);

    let result = gpmeta_core::process_with_control(&options, &control, &|stage, current, total, message| {
        debug!("[{}] {}/{} {}", stage, current + 1, total, message);
    })?;

    for failure in &result.failures {
        debug!("{:?}: {}", failure.kind, failure.message);
    }

    if let Some(report) = &cli.report {
        gpmeta_core::report::write_report(&result, &options.input, &options.output, report)?;
        info!("Report written to {}", report.display());
    }

    info!(
        "Done! {} media files, {} matched, {} written, {} skipped, {} duplicates, {} orphaned sidecars, {} failed ({:.2}s)",
        result.total_media,
        result.matched,
        result.files_written,
        result.files_skipped,
        result.duplicates.len(),
        result.orphaned_sidecars.len(),
        result.failures.len(),
        t_total.elapsed().as_secs_f64()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_arguments_required() {
        assert!(Cli::try_parse_from(["gpmeta"]).is_err());
        assert!(Cli::try_parse_from(["gpmeta", "in"]).is_err());
        assert!(Cli::try_parse_from(["gpmeta", "in", "out", "extra"]).is_err());
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["gpmeta", "in", "out"]).unwrap();
        assert_eq!(cli.on_collision, OnCollision::Disambiguate);
        assert_eq!(cli.tool_timeout, 120);
        assert!(!cli.quarantine_unmatched);
        assert_eq!(cli.log_dir, PathBuf::from("logs"));
    }

    #[test]
    fn test_collision_policy_flag() {
        let cli = Cli::try_parse_from(["gpmeta", "in", "out", "--on-collision", "fail"]).unwrap();
        assert_eq!(cli.on_collision, OnCollision::Fail);
        assert!(Cli::try_parse_from(["gpmeta", "in", "out", "--on-collision", "overwrite"]).is_err());
    }
}
