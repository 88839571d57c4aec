//! Configuration management CLI commands.

use clap::{Args, Subcommand};

use avatarforge_core::AppResult;

use crate::output;

/// Arguments for config commands
#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Config subcommand
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration as JSON
    Show,
    /// Validate the configuration
    Validate,
}

/// Execute config commands
pub async fn execute(args: &ConfigArgs, config_path: Option<&str>) -> AppResult<()> {
    match &args.command {
        ConfigCommand::Show => {
            let config = super::load_config(config_path)?;
            output::print_item(&config);
        }
        ConfigCommand::Validate => match super::load_config(config_path) {
            Ok(config) => {
                output::print_success("Configuration is valid");
                output::print_kv("Server", &config.server.bind_address());
                output::print_kv(
                    "Engine timeout",
                    &format!("{} s", config.engine.timeout_seconds),
                );
                output::print_kv(
                    "Workspace root",
                    &config.workspace.effective_temp_root().display().to_string(),
                );
            }
            Err(e) => {
                output::print_error(&format!("Configuration invalid: {}", e));
                return Err(e);
            }
        },
    }

    Ok(())
}
