use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::generate;
use std::path::PathBuf;
use std::time::Duration;

use quick_merge::commands::{
    self,
    config::ConfigAction,
    merge::{MergeOptions, SummaryFormat},
};
use quick_merge::config::FileSettings;
use quick_merge::ui::CommitMessageSource;

#[derive(Parser)]
#[command(
    name = "quick-merge",
    version,
    about = "Merge the current branch into a target branch on the remote and switch back",
    long_about = "quick-merge commits pending changes, pushes the current branch, merges it into\n\
                  the target branch (default: dev), pushes the target and returns to where you\n\
                  started. Every git step is shown live and the run stops at the first failure."
)]
struct Cli {
    /// Run as if started in this directory
    #[arg(short = 'C', global = true, value_name = "PATH", default_value = ".")]
    repo: PathBuf,

    /// Show debug logging for every git invocation
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    merge: MergeArgs,
}

#[derive(Args, Clone)]
struct MergeArgs {
    /// Target branch for this run (default: configured branch)
    #[arg(short, long)]
    target: Option<String>,

    /// Commit message for uncommitted changes (skips the prompt)
    #[arg(short, long, conflicts_with = "yes")]
    message: Option<String>,

    /// Use the default commit message without prompting
    #[arg(short, long)]
    yes: bool,

    /// Print a summary of the run when it finishes
    #[arg(long, value_enum)]
    summary: Option<SummaryFormat>,

    /// Write an HTML summary to this file
    #[arg(long, value_name = "FILE")]
    html_out: Option<PathBuf>,

    /// Seconds before a single git command is killed
    #[arg(long, value_name = "SECS", default_value_t = 300)]
    timeout: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge the current branch into the target branch (default command)
    Merge(MergeArgs),

    /// Show which steps a merge would run, without running them
    Plan {
        /// Target branch (default: configured branch)
        #[arg(short, long)]
        target: Option<String>,
    },

    /// Read or change the configured target branch
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

impl MergeArgs {
    fn into_options(self) -> MergeOptions {
        let commit_message = match (self.message, self.yes) {
            (Some(message), _) => CommitMessageSource::Given(message),
            (None, true) => CommitMessageSource::AcceptDefault,
            (None, false) => CommitMessageSource::Ask,
        };
        MergeOptions {
            target: self.target,
            commit_message,
            summary: self.summary,
            html_out: self.html_out,
            timeout: Duration::from_secs(self.timeout),
        }
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        None => {
            let settings = FileSettings::load_default()?;
            if !commands::merge::run(&cli.repo, &settings, cli.merge.into_options())? {
                std::process::exit(1);
            }
        }
        Some(Commands::Merge(args)) => {
            let settings = FileSettings::load_default()?;
            if !commands::merge::run(&cli.repo, &settings, args.into_options())? {
                std::process::exit(1);
            }
        }
        Some(Commands::Plan { target }) => {
            let settings = FileSettings::load_default()?;
            commands::plan::run(&cli.repo, &settings, target)?
        }
        Some(Commands::Config { action }) => commands::config::run(action)?,
        Some(Commands::Completions { shell }) => {
            generate(shell, &mut Cli::command(), "quick-merge", &mut std::io::stdout());
        }
    }

    Ok(())
}
