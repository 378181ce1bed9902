use anyhow::Result;
use colored::Colorize;

use crate::config::{FileSettings, Settings};

#[derive(Debug, Clone, clap::Subcommand)]
pub enum ConfigAction {
    /// Print the configured target branch
    Get,
    /// Set the target branch merges go into
    Set {
        /// Branch name (must not be empty)
        branch: String,
    },
    /// Restore the default target branch ("dev")
    Reset,
    /// Print the settings file location
    Path,
}

pub fn run(action: ConfigAction) -> Result<()> {
    let mut settings = FileSettings::load_default()?;

    match action {
        ConfigAction::Get => println!("{}", settings.target_branch()),
        ConfigAction::Set { branch } => {
            settings.set_target_branch(&branch)?;
            println!(
                "{} Target branch set to {}",
                "✓".green().bold(),
                settings.target_branch().cyan()
            );
        }
        ConfigAction::Reset => {
            settings.reset()?;
            println!(
                "{} Target branch reset to {}",
                "✓".green().bold(),
                settings.target_branch().cyan()
            );
        }
        ConfigAction::Path => println!("{}", settings.path().display()),
    }

    Ok(())
}
