//! 原始命令发送
//!
//! 参数是一个 JSON 对象，必须带整数 `T` 字段。命令经由单写者队列写出，
//! 等队列清空（或超时）后断开。

use anyhow::{Context, Result, bail};
use clap::Args;
use rover_driver::Rover;
use rover_protocol::Command;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::connection::ConnectionArgs;

/// 发送命令参数
#[derive(Args, Debug)]
pub struct SendCommand {
    /// 命令 JSON，例如 '{"T":1,"L":0.2,"R":0.2}'
    pub json: String,

    /// 等待写出的最长时间（毫秒）
    #[arg(long, default_value_t = 1000)]
    pub timeout_ms: u64,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

impl SendCommand {
    pub fn execute(&self, config_path: Option<&Path>) -> Result<()> {
        let command = Command::from_json(&self.json).context("Invalid command JSON")?;
        let rover = self.connection.connect(config_path)?;

        info!("Sending command T={}", command.tag());
        rover.submit(command);
        flush(&rover, Duration::from_millis(self.timeout_ms))
    }
}

/// 等待队列中的命令全部写出
pub fn flush(rover: &Rover, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        let metrics = rover.metrics();
        if metrics.commands_in_flight() == 0 {
            if metrics.command_write_errors > 0 || metrics.commands_dropped > 0 {
                bail!(
                    "{} command(s) failed to write, {} dropped",
                    metrics.command_write_errors,
                    metrics.commands_dropped
                );
            }
            println!("Sent {} command(s)", metrics.commands_written);
            return Ok(());
        }
        if Instant::now() >= deadline {
            warn!("{} command(s) still queued", metrics.commands_in_flight());
            bail!("Timed out waiting for commands to be written");
        }
        thread::sleep(Duration::from_millis(5));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_json_without_tag() {
        let cmd = SendCommand {
            json: "{\"L\":0.2}".into(),
            timeout_ms: 10,
            connection: ConnectionArgs {
                base: Some("/nonexistent/rover-base-port".into()),
                ..Default::default()
            },
        };
        let err = cmd.execute(None).unwrap_err();
        assert!(err.to_string().contains("Invalid command JSON"));
    }
}
