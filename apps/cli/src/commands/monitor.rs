//! 监控命令
//!
//! 启动后先发送上电配置序列，然后按固定频率打印底盘反馈、最近一圈雷达数据和辅助传感器批次，
//! 直到 Ctrl+C。

use anyhow::{Context, Result};
use clap::Args;
use rover_driver::Rover;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::connection::ConnectionArgs;

/// 监控命令参数
#[derive(Args, Debug)]
pub struct MonitorCommand {
    /// 刷新频率（Hz）
    #[arg(short, long, default_value_t = 10)]
    pub frequency: u32,

    /// 不发送上电配置序列
    #[arg(long)]
    pub no_boot: bool,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

impl MonitorCommand {
    pub fn execute(&self, config_path: Option<&Path>) -> Result<()> {
        let period = frame_period(self.frequency);
        let rover = self.connection.connect(config_path)?;
        if !self.no_boot {
            rover.send_boot_sequence();
        }

        let running = Arc::new(AtomicBool::new(true));
        let r = running.clone();
        ctrlc::set_handler(move || {
            r.store(false, Ordering::SeqCst);
        })
        .context("Failed to install Ctrl+C handler")?;

        println!("Monitoring at {} Hz, press Ctrl+C to stop", self.frequency.max(1));
        while running.load(Ordering::SeqCst) {
            print_status(&rover);
            thread::sleep(period);
        }

        println!("\nShutting down...");
        let metrics = rover.metrics();
        println!(
            "commands: {} written, {} failed, {} dropped | telemetry: {} lines, {} errors",
            metrics.commands_written,
            metrics.command_write_errors,
            metrics.commands_dropped,
            metrics.telemetry_lines,
            metrics.telemetry_decode_errors,
        );
        Ok(())
    }
}

/// 刷新周期；0 Hz 按 1 Hz 处理
fn frame_period(frequency: u32) -> Duration {
    Duration::from_secs_f64(1.0 / f64::from(frequency.max(1)))
}

fn print_status(rover: &Rover) {
    let link = if rover.is_connected() { "up" } else { "down" };
    match rover.base_feedback() {
        Some(fb) => println!(
            "[{link}] L={:>6.3} R={:>6.3} roll={:>6.1} pitch={:>6.1} yaw={:>6.1} v={:>5.2}",
            fb.left_speed.unwrap_or_default(),
            fb.right_speed.unwrap_or_default(),
            fb.roll.unwrap_or_default(),
            fb.pitch.unwrap_or_default(),
            fb.yaw.unwrap_or_default(),
            fb.voltage.unwrap_or_default(),
        ),
        None => println!("[{link}] no chassis feedback yet"),
    }

    if let Some(event) = rover.last_event() {
        println!("  event: {}", serde_json::Value::Object(event.fields().clone()));
    }

    let rotation = rover.latest_rotation();
    if !rotation.is_empty() {
        println!("  lidar: {} samples", rotation.len());
    }

    for line in rover.drain_sensor_batch() {
        println!("  sensor: {line}");
    }
}
