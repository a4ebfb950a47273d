use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use rmsync::cli::ReportFormat;
use rmsync::commands::{self, RunOptions};
use rmsync::logging;
use rmsync::session::SessionOptions;

/// Synchronize issue-tracker attachments and page snapshots into a local directory.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Single URL to download (optional, if provided, tasks-file is ignored)
    #[arg(index = 1)]
    url: Option<String>,

    /// File with one task per line: URL[|FILENAME[|SHA256]]
    #[arg(short = 't', long = "tasks-file", default_value = "download.txt")]
    tasks_file: PathBuf,

    /// Directory to save downloaded files
    #[arg(short = 'd', long = "download-dir", default_value = "downloads")]
    download_dir: PathBuf,

    /// Maximum number of concurrent downloads (defaults to number of logical CPUs)
    #[arg(short = 'c', long)]
    concurrency: Option<usize>,

    /// Global rate limit in bytes per second (e.g., 1048576 for 1MB/s)
    #[arg(short = 'r', long)]
    rate_limit: Option<u32>,

    /// Per-request timeout in seconds (0 disables)
    #[arg(long, default_value_t = 300)]
    timeout: u64,

    /// Cookie header of an authenticated session, sent with every request
    #[arg(long, env = "RMSYNC_COOKIE", hide_env_values = true)]
    cookie: Option<String>,

    /// User-Agent sent with every request
    #[arg(long, default_value = concat!("rmsync/", env!("CARGO_PKG_VERSION")))]
    user_agent: String,

    /// List tasks and whether their files are present, then exit
    #[arg(short = 'l', long)]
    list: bool,

    /// Report format for the final outcome list
    #[arg(long, value_enum, default_value = "text")]
    report: ReportFormat,

    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short = 'v', long)]
    verbose: bool,
}

impl Args {
    fn run_options(&self) -> RunOptions {
        RunOptions {
            concurrency: self.concurrency,
            rate_limit: self.rate_limit,
            timeout: (self.timeout > 0).then(|| Duration::from_secs(self.timeout)),
            session: SessionOptions {
                user_agent: self.user_agent.clone(),
                cookie: self.cookie.clone(),
                ..SessionOptions::default()
            },
            report: self.report,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init_logging(args.verbose);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        if args.list {
            return commands::list_downloads(args.tasks_file.clone(), args.download_dir.clone()).await;
        }

        let options = args.run_options();
        match args.url.clone() {
            Some(url) => commands::run_single_download(url, args.download_dir.clone(), options).await,
            None => commands::run_downloads(args.tasks_file.clone(), args.download_dir.clone(), options).await,
        }
    })
}
