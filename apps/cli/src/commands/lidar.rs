//! 激光雷达命令
//!
//! 等待若干个整圈，打印每圈的采样数、角度范围和最近/最远距离。

use anyhow::{Result, bail};
use clap::Args;
use rover_driver::Rotation;
use std::path::Path;
use std::time::Duration;

use crate::connection::ConnectionArgs;

/// 激光雷达命令参数
#[derive(Args, Debug)]
pub struct LidarCommand {
    /// 打印的整圈数
    #[arg(short = 'n', long, default_value_t = 1)]
    pub count: u32,

    /// 每圈的最长等待时间（毫秒）
    #[arg(long, default_value_t = 2000)]
    pub timeout_ms: u64,

    /// 打印每个采样点
    #[arg(short, long)]
    pub verbose: bool,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

impl LidarCommand {
    pub fn execute(&self, config_path: Option<&Path>) -> Result<()> {
        let rover = self.connection.connect(config_path)?;
        let timeout = Duration::from_millis(self.timeout_ms);

        for i in 0..self.count {
            let Some(rotation) = rover.wait_rotation(timeout) else {
                bail!("No lidar rotation within {} ms", self.timeout_ms);
            };
            println!("rotation {}: {}", i + 1, summarize(&rotation));
            if self.verbose {
                for sample in rotation.samples() {
                    println!(
                        "  {:>7.2}° {:>6} mm  conf={}",
                        sample.angle.to_degrees(),
                        sample.distance,
                        sample.confidence
                    );
                }
            }
        }
        Ok(())
    }
}

/// 单圈摘要
fn summarize(rotation: &Rotation) -> String {
    let samples = rotation.samples();
    let (Some(first), Some(last)) = (samples.first(), samples.last()) else {
        return "empty".to_string();
    };
    let valid = samples.iter().map(|s| s.distance).filter(|&d| d > 0);
    let nearest = valid.clone().min().unwrap_or(0);
    let farthest = valid.max().unwrap_or(0);
    format!(
        "{} samples, {:.1}°..{:.1}°, nearest {} mm, farthest {} mm",
        samples.len(),
        first.angle.to_degrees(),
        last.angle.to_degrees(),
        nearest,
        farthest
    )
}
