use bucketsweep::sink::OutputFormat;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "bucketsweep")]
#[command(about = "Enumerate public cloud storage buckets", long_about = None)]
pub struct Cli {
    /// Configuration file (default: config/bucketsweep.toml or $BUCKETSWEEP_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging unless RUST_LOG is set
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List every key in one or more buckets
    Index(IndexArgs),
    /// Print how URLs are fingerprinted
    Resolve(ResolveArgs),
}

#[derive(clap::Args, Debug)]
#[command(group(
    clap::ArgGroup::new("target")
        .required(true)
        .args(["url", "input", "resume"]),
))]
pub struct IndexArgs {
    /// Single bucket URL
    #[arg(short, long)]
    pub url: Option<String>,

    /// File with one bucket URL per line
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Resume file written by an interrupted run
    #[arg(long)]
    pub resume: Option<PathBuf>,

    /// Continuation token to start from (single bucket only)
    #[arg(long, requires = "url")]
    pub start_key: Option<String>,

    /// Output file (single bucket only)
    #[arg(short, long, requires = "url")]
    pub outfile: Option<PathBuf>,

    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Append to existing output files
    #[arg(short, long)]
    pub append: bool,

    /// Buckets swept at once
    #[arg(short, long)]
    pub concurrency: Option<usize>,

    /// Where to write resume hints on interruption or failure
    #[arg(long, default_value = "bucketsweep-resume.json")]
    pub resume_out: PathBuf,

    /// Directory for output files
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Disable the progress line
    #[arg(long)]
    pub no_progress: bool,
}

#[derive(clap::Args, Debug)]
pub struct ResolveArgs {
    #[arg(required = true)]
    pub urls: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_single_target() {
        let cli = Cli::try_parse_from([
            "bucketsweep",
            "index",
            "--url",
            "https://b.storage.googleapis.com/",
            "--format",
            "csv",
            "--start-key",
            "k/9",
        ])
        .unwrap();

        let Commands::Index(args) = cli.command else {
            panic!("expected index");
        };
        assert_eq!(args.format, Some(OutputFormat::Csv));
        assert_eq!(args.start_key.as_deref(), Some("k/9"));
    }

    #[test]
    fn test_target_is_required() {
        assert!(Cli::try_parse_from(["bucketsweep", "index"]).is_err());
        assert!(
            Cli::try_parse_from(["bucketsweep", "index", "--url", "x", "--input", "y"]).is_err()
        );
    }
}
