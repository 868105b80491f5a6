//! 急停命令

use anyhow::Result;
use clap::Args;
use std::path::Path;
use std::time::Duration;

use super::send::flush;
use crate::connection::ConnectionArgs;

/// 急停命令参数
#[derive(Args, Debug)]
pub struct StopCommand {
    #[command(flatten)]
    pub connection: ConnectionArgs,
}

impl StopCommand {
    /// 发送急停，随后两轮速度置零
    pub fn execute(&self, config_path: Option<&Path>) -> Result<()> {
        let rover = self.connection.connect(config_path)?;
        println!("Sending emergency stop...");
        rover.stop();
        flush(&rover, Duration::from_secs(1))?;
        println!("Stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_without_chassis_fails() {
        let cmd = StopCommand {
            connection: ConnectionArgs {
                base: Some("/nonexistent/rover-base-port".into()),
                no_lidar: true,
                no_sensor: true,
                ..Default::default()
            },
        };
        assert!(cmd.execute(None).is_err());
    }
}
