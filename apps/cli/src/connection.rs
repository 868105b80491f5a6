//! 配置加载与连接
//!
//! 配置文件查找顺序：`--config` 指定的路径，其次是用户配置目录下的 `rover/config.toml`，
//! 都没有时使用内置默认值。

use anyhow::{Context, Result};
use clap::Args;
use rover_driver::{Rover, RoverBuilder, RoverConfig};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// 用户配置文件的缺省位置
pub fn default_config_path() -> Result<PathBuf> {
    let mut path = dirs::config_dir().context("Cannot determine user config directory")?;
    path.push("rover");
    path.push("config.toml");
    Ok(path)
}

/// 解析实际使用的配置文件路径；`None` 表示使用内置默认值
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        return Ok(Some(path.to_path_buf()));
    }
    let path = default_config_path()?;
    Ok(path.exists().then_some(path))
}

/// 加载配置
///
/// 显式给出的路径必须存在；缺省路径不存在时退回默认配置。
pub fn load_config(explicit: Option<&Path>) -> Result<RoverConfig> {
    match resolve_config_path(explicit)? {
        Some(path) => {
            debug!("Loading config from {}", path.display());
            RoverConfig::load_from_file(&path)
                .with_context(|| format!("Failed to load config {}", path.display()))
        },
        None => Ok(RoverConfig::default()),
    }
}

/// 覆盖配置文件中串口设置的命令行参数
#[derive(Args, Debug, Default, Clone)]
pub struct ConnectionArgs {
    /// 底盘主串口（覆盖配置）
    #[arg(long)]
    pub base: Option<String>,

    /// 激光雷达串口，可以以 `*` 结尾（覆盖配置）
    #[arg(long)]
    pub lidar: Option<String>,

    /// 辅助传感器串口，可以以 `*` 结尾（覆盖配置）
    #[arg(long)]
    pub sensor: Option<String>,

    /// 不打开激光雷达
    #[arg(long)]
    pub no_lidar: bool,

    /// 不打开辅助传感器
    #[arg(long)]
    pub no_sensor: bool,
}

impl ConnectionArgs {
    /// 把命令行覆盖项应用到 builder 上
    pub fn apply(&self, mut builder: RoverBuilder) -> RoverBuilder {
        if let Some(device) = &self.base {
            builder = builder.base_device(device.as_str());
        }
        if let Some(device) = &self.lidar {
            builder = builder.lidar_device(device.as_str());
        }
        if let Some(device) = &self.sensor {
            builder = builder.sensor_device(device.as_str());
        }
        if self.no_lidar {
            builder = builder.without_lidar();
        }
        if self.no_sensor {
            builder = builder.without_sensor();
        }
        builder
    }

    /// 加载配置并连接
    pub fn connect(&self, config_path: Option<&Path>) -> Result<Rover> {
        let builder = self.apply(RoverBuilder::new(load_config(config_path)?));
        info!("Connecting to chassis on {}", builder.config().base.device);
        builder.build().context("Failed to connect to rover")
    }
}
