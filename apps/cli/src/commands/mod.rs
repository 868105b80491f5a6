//! 命令定义和实现

pub mod config;
pub mod lidar;
pub mod monitor;
pub mod send;
pub mod stop;

pub use config::ConfigCommand;
pub use lidar::LidarCommand;
pub use monitor::MonitorCommand;
pub use send::SendCommand;
pub use stop::StopCommand;
