//! # Rover CLI
//!
//! 串口底盘的命令行工具。每个子命令独立执行：读取配置、打开串口、执行操作、关闭。
//!
//! ```bash
//! # 生成默认配置
//! rover-cli config init
//!
//! # 持续打印遥测、雷达和辅助传感器数据，Ctrl+C 退出
//! rover-cli monitor --frequency 5
//!
//! # 发送一条原始 JSON 命令
//! rover-cli send '{"T":1,"L":0.2,"R":0.2}'
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod connection;

use commands::{ConfigCommand, LidarCommand, MonitorCommand, SendCommand, StopCommand};

/// Rover CLI - 底盘串口命令行工具
#[derive(Parser, Debug)]
#[command(name = "rover-cli")]
#[command(about = "Command-line interface for the rover serial link", long_about = None)]
#[command(version)]
struct Cli {
    /// 配置文件路径（缺省为用户配置目录下的 rover/config.toml）
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),

    /// 监控遥测、雷达和辅助传感器
    Monitor {
        #[command(flatten)]
        args: MonitorCommand,
    },

    /// 发送一条 JSON 命令
    Send {
        #[command(flatten)]
        args: SendCommand,
    },

    /// 急停并把两轮速度置零
    Stop {
        #[command(flatten)]
        args: StopCommand,
    },

    /// 等待并打印激光雷达整圈数据
    Lidar {
        #[command(flatten)]
        args: LidarCommand,
    },
}

fn main() -> Result<()> {
    // 初始化日志（RUST_LOG 优先）
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("rover_cli=info,rover_driver=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Config(cmd) => cmd.execute(config_path),
        Commands::Monitor { args } => args.execute(config_path),
        Commands::Send { args } => args.execute(config_path),
        Commands::Stop { args } => args.execute(config_path),
        Commands::Lidar { args } => args.execute(config_path),
    }
}
