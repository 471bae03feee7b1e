//! ghinstall CLI - install the latest GitHub release of your tools
//!
//! # Examples
//!
//! ```bash
//! # Install everything listed in a config file
//! ghinstall tools.yaml
//!
//! # Only pick assets built for this machine, retry flaky downloads
//! ghinstall -c tools.yaml --platform --retries 2
//!
//! # Extract a local archive with the same safety checks
//! ghinstall --extract tool.tar.gz -d /opt/tool
//!
//! # Generate shell completions
//! ghinstall --completions bash > ~/.bash_completion.d/ghinstall
//! ghinstall --completions zsh > ~/.zfunc/_ghinstall
//! ```

use std::error::Error as StdError;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{CommandFactory, Parser};
use clap_complete::{generate, Shell};
use ghinstall::{
    AssetFilter, CancelToken, Config, ExtractionRequest, Extractor, Installer, Report,
};
use log::info;

type CliResult = Result<(), Box<dyn StdError>>;

#[derive(Parser)]
#[command(
    name = "ghinstall",
    about = "Install the latest stable GitHub release of each configured repository",
    version,
    after_help = "EXAMPLES:
    ghinstall tools.yaml
    ghinstall -c tools.yaml --os linux --arch amd64
    ghinstall tools.yaml --glob 'tool-*-musl.tar.gz'
    ghinstall --extract tool.zip -d /opt/tool"
)]
struct Cli {
    /// Configuration file (YAML)
    #[arg(value_name = "CONFIG", conflicts_with = "config")]
    config_file: Option<PathBuf>,

    /// Configuration file (YAML), same as the positional argument
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Give up after this many seconds
    #[arg(long, value_name = "SECS", default_value_t = 300)]
    timeout: u64,

    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long)]
    verbose: bool,

    /// Keep assets whose name contains PATTERN (can be repeated)
    #[arg(long = "pattern", value_name = "PATTERN")]
    patterns: Vec<String>,

    /// Keep assets whose full name matches a glob
    #[arg(long, value_name = "GLOB")]
    glob: Option<String>,

    /// Keep assets built for this operating system
    #[arg(long)]
    os: Option<String>,

    /// Keep assets built for this CPU architecture
    #[arg(long)]
    arch: Option<String>,

    /// Keep assets built for the running OS and architecture
    #[arg(long, conflicts_with_all = ["os", "arch"])]
    platform: bool,

    /// Extra download attempts after a transient failure
    #[arg(long, value_name = "N", default_value_t = 0)]
    retries: u32,

    /// Extract a local archive instead of installing
    #[arg(long, value_name = "ARCHIVE", conflicts_with_all = ["config_file", "config"])]
    extract: Option<PathBuf>,

    /// Destination directory for --extract (created if missing)
    #[arg(short, long, default_value = ".")]
    dest: PathBuf,

    /// Generate shell completions for the specified shell
    #[arg(long, value_enum)]
    completions: Option<Shell>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Some(shell) = cli.completions {
        generate(shell, &mut Cli::command(), "ghinstall", &mut io::stdout());
        return ExitCode::SUCCESS;
    }

    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        let mut source = e.source();
        while let Some(cause) = source {
            eprintln!("  caused by: {}", cause);
            source = cause.source();
        }
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn run(cli: Cli) -> CliResult {
    let cancel = CancelToken::with_timeout(Duration::from_secs(cli.timeout));

    if let Some(archive) = &cli.extract {
        return extract(archive, &cli.dest, cancel);
    }

    let path = cli
        .config
        .as_ref()
        .or(cli.config_file.as_ref())
        .ok_or("no configuration file given (see --help)")?;

    info!("loading configuration from {}", path.display());
    let config = Config::load(path)?;
    info!("found {} repositories to install", config.github.len());
    if let Some(mirror) = &config.mirror_url {
        info!("using GitHub mirror: {}", mirror);
    }

    let filter = build_filter(&cli);
    info!("asset filter: {}", filter);

    let installer = Installer::github()?.max_attempts(cli.retries.saturating_add(1));

    let start = Instant::now();
    let installed = installer.install(&config, &filter, &cancel)?;
    for item in &installed {
        println!(
            "{} {} -> {} ({})",
            item.repository,
            item.tag,
            item.destination.display(),
            summary(&item.report)
        );
    }
    info!(
        "installation completed in {:.1}s",
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

fn extract(archive: &Path, dest: &Path, cancel: CancelToken) -> CliResult {
    let file = File::open(archive)?;
    let request = ExtractionRequest::new(BufReader::new(file), dest).cancel(cancel);
    let report = Extractor::new().run_seekable(request)?;
    println!("Extracted {} to {}", summary(&report), dest.display());
    Ok(())
}

/// Filters in the order they narrow: name first, then platform.
fn build_filter(cli: &Cli) -> AssetFilter {
    let mut filters = vec![if cli.patterns.is_empty() {
        AssetFilter::archives()
    } else {
        AssetFilter::by_name_pattern(&cli.patterns)
    }];

    if let Some(glob) = &cli.glob {
        filters.push(AssetFilter::by_glob(glob.as_str()));
    }
    if cli.platform {
        filters.push(AssetFilter::current_platform());
    }
    if let Some(os) = &cli.os {
        filters.push(AssetFilter::by_os(Some(os.as_str())));
    }
    if let Some(arch) = &cli.arch {
        filters.push(AssetFilter::by_arch(Some(arch.as_str())));
    }

    if filters.len() == 1 {
        filters.remove(0)
    } else {
        AssetFilter::combined(filters)
    }
}

fn summary(report: &Report) -> String {
    let mut text = format!(
        "{} files, {}",
        report.files_extracted,
        format_bytes(report.bytes_written)
    );
    if report.symlinks_created > 0 {
        text.push_str(&format!(", {} symlinks", report.symlinks_created));
    }
    if report.entries_skipped > 0 {
        text.push_str(&format!(", {} skipped", report.entries_skipped));
    }
    text
}

fn format_bytes(bytes: u64) -> String {
    if bytes >= 1024 * 1024 * 1024 {
        format!("{:.1}G", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    } else if bytes >= 1024 * 1024 {
        format!("{:.1}M", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.1}K", bytes as f64 / 1024.0)
    } else {
        format!("{}B", bytes)
    }
}
