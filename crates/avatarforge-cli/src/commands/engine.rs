//! Engine discovery and capability enablement.

use clap::Args;

use avatarforge_converter::{BlenderEngine, CapabilityStatus, EngineCapability};
use avatarforge_core::AppResult;

use crate::output;

/// Arguments for the engine command
#[derive(Debug, Args)]
pub struct EngineArgs {
    /// Only print the discovery result
    #[arg(long)]
    pub skip_enable: bool,
}

/// Execute the engine command
pub async fn execute(args: &EngineArgs, config_path: Option<&str>) -> AppResult<()> {
    let config = super::load_config(config_path)?;
    let engine = BlenderEngine::from_config(&config.engine);
    let installation = engine.installation();

    println!("Conversion engine:");
    output::print_kv("Executable", &installation.executable.display().to_string());
    output::print_kv("Discovered via", &format!("{:?}", installation.discovery_method));
    output::print_kv("Timeout", &format!("{} s", engine.timeout().as_secs()));
    for (label, script) in [
        ("Convert script", &engine.scripts().convert),
        ("Merge script", &engine.scripts().merge),
        ("Enable script", &engine.scripts().enable_addon),
    ] {
        let marker = if script.is_file() { "" } else { " (missing)" };
        output::print_kv(label, &format!("{}{}", script.display(), marker));
    }

    if args.skip_enable {
        return Ok(());
    }

    let capability = EngineCapability::new(config.engine.enable_addon);
    match capability.ensure(&engine).await {
        CapabilityStatus::Enabled => output::print_success("VRM add-on enabled"),
        CapabilityStatus::Disabled => output::print_warning("VRM add-on enablement is disabled"),
        CapabilityStatus::Failed(reason) => {
            output::print_warning(&format!("VRM add-on could not be enabled: {reason}"))
        }
        CapabilityStatus::Pending => {}
    }
    Ok(())
}
