//! CLI subcommand handlers.

use crate::ConfigAction;
use std::path::Path;

/// Handle the `config` subcommand (init / show).
pub async fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_dir = workspace.join(".rustant");
            std::fs::create_dir_all(&config_dir)?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            let default_config = rustant_core::AgentConfig::default();
            let toml_str = toml::to_string_pretty(&default_config)?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = rustant_core::config::load_config(Some(workspace), None)
                .map_err(|e| anyhow::anyhow!("Failed to load config: {e}"))?;
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{toml_str}");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_config_init_creates_file() {
        let dir = TempDir::new().unwrap();
        handle_config(ConfigAction::Init, dir.path()).await.unwrap();
        assert!(dir.path().join(".rustant").join("config.toml").exists());
    }

    #[tokio::test]
    async fn test_config_init_is_idempotent() {
        let dir = TempDir::new().unwrap();
        handle_config(ConfigAction::Init, dir.path()).await.unwrap();
        // Second call should not error, just note the file exists.
        handle_config(ConfigAction::Init, dir.path()).await.unwrap();
    }

    #[tokio::test]
    async fn test_config_show_loads_defaults() {
        let dir = TempDir::new().unwrap();
        handle_config(ConfigAction::Show, dir.path()).await.unwrap();
    }
}
