use clap::Subcommand;
use migr_core::config::MigrConfig;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Initialize ~/.migr/ with a default config and log directory
    Init,
    /// Show current configuration, environment overrides applied
    Show,
}

pub fn run(action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let home = MigrConfig::init()?;
            let config = MigrConfig::load()?;

            println!("Initialized migr at {}", home.display());
            println!("  config: {}", MigrConfig::config_path()?.display());
            println!("  logs: {}", config.resolved_log_dir()?.display());
            Ok(())
        }
        ConfigAction::Show => {
            let config = MigrConfig::load()?;
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{toml_str}");
            Ok(())
        }
    }
}
