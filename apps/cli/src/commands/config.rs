//! 配置管理命令

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use rover_driver::RoverConfig;
use std::fs;
use std::path::Path;

use crate::connection::{default_config_path, load_config, resolve_config_path};

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 打印生效的配置（TOML）
    Show,

    /// 校验配置文件
    Check,

    /// 写出一份默认配置
    Init {
        /// 覆盖已有文件
        #[arg(short, long)]
        force: bool,
    },
}

impl ConfigCommand {
    pub fn execute(self, config_path: Option<&Path>) -> Result<()> {
        match self {
            ConfigCommand::Show => Self::show_(config_path),
            ConfigCommand::Check => Self::check_(config_path),
            ConfigCommand::Init { force } => {
                let path = match config_path {
                    Some(path) => path.to_path_buf(),
                    None => default_config_path()?,
                };
                Self::init_(&path, force)
            },
        }
    }

    fn show_(config_path: Option<&Path>) -> Result<()> {
        let config = load_config(config_path)?;
        print!("{}", config.to_toml_string()?);
        Ok(())
    }

    fn check_(config_path: Option<&Path>) -> Result<()> {
        match resolve_config_path(config_path)? {
            Some(path) => {
                let config = load_config(Some(path.as_path()))?;
                println!("Config file: {}", path.display());
                println!("  base:   {} @ {}", config.base.device, config.base.baud_rate);
                print_aux("lidar", config.lidar.enabled, &config.lidar.device);
                print_aux("sensor", config.sensor.enabled, &config.sensor.device);
                println!("OK");
            },
            None => println!("No config file found, using built-in defaults"),
        }
        Ok(())
    }

    fn init_(path: &Path, force: bool) -> Result<()> {
        if path.exists() && !force {
            bail!("{} already exists (use --force to overwrite)", path.display());
        }
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        RoverConfig::default()
            .save_to_file(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Wrote default config to {}", path.display());
        Ok(())
    }
}

fn print_aux(name: &str, enabled: bool, device: &str) {
    if enabled {
        println!("  {name:<7} {device}");
    } else {
        println!("  {name:<7} (disabled)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_then_check() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        ConfigCommand::Init { force: false }.execute(Some(path.as_path())).unwrap();
        assert!(path.exists());
        assert_eq!(RoverConfig::load_from_file(&path).unwrap(), RoverConfig::default());

        ConfigCommand::Check.execute(Some(path.as_path())).unwrap();
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[base]\n").unwrap();

        assert!(ConfigCommand::Init { force: false }.execute(Some(path.as_path())).is_err());
        ConfigCommand::Init { force: true }.execute(Some(path.as_path())).unwrap();
    }

    #[test]
    fn test_check_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[sensor]\nmax_line_len = 0\n").unwrap();

        assert!(ConfigCommand::Check.execute(Some(path.as_path())).is_err());
    }
}
