//! Config command - manage the configuration file

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tasksnap_core::config::{sample_config, ConfigFile};

/// Arguments for the config command
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the path to the config file
    Path,

    /// Show the effective configuration, environment overrides included
    Show,

    /// Write the sample config file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the sample config to stdout
    Sample,
}

/// Run config subcommand
pub async fn config(args: ConfigArgs) -> Result<()> {
    let path = ConfigFile::default_path();

    match args.command {
        ConfigCommand::Path => {
            let note = if path.exists() { "exists" } else { "not created yet" };
            println!("{} ({})", path.display(), note);
        }
        ConfigCommand::Show => {
            let file = ConfigFile::load_from(path.clone())?.apply_env();
            let config = file.to_capture_config()?;

            println!("Configuration file: {}", path.display());
            if !path.exists() {
                println!("(not found, showing defaults; run `tasksnap config init`)");
            }
            println!();
            println!("  interval:    {}s", config.interval.as_secs());
            println!("  source:      {:?}", config.source);
            println!("  cursor:      {:?}", config.cursor_mode);
            println!(
                "  server_url:  {}",
                config.upload.server_url.as_deref().unwrap_or("-")
            );
            println!(
                "  api_key:     {}",
                if config.upload.api_key.is_some() { "(set)" } else { "-" }
            );
            println!("  upload_path: {}", config.upload.upload_path);
            println!(
                "  output_dir:  {}",
                config
                    .upload
                    .output_dir
                    .as_ref()
                    .map(|d| d.display().to_string())
                    .unwrap_or_else(|| "-".into())
            );

            if let Err(e) = config.validate_strict() {
                println!();
                println!("Not usable yet: {}", e);
            }
            for warning in config.validate() {
                println!("Warning: {}", warning);
            }
        }
        ConfigCommand::Init { force } => {
            if path.exists() && !force {
                println!("Configuration file already exists: {}", path.display());
                println!("Use --force to overwrite it.");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).context("Failed to create config directory")?;
            }
            std::fs::write(&path, sample_config()).context("Failed to write config file")?;

            println!("Created configuration file: {}", path.display());
            println!("Set server_url (or output_dir) before running `tasksnap watch`.");
        }
        ConfigCommand::Sample => {
            print!("{}", sample_config());
        }
    }

    Ok(())
}
