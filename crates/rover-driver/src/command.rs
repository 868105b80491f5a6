//! 命令队列
//!
//! 单一无界 FIFO：任意多个生产者非阻塞入队，唯一的写线程按入队顺序逐条写出。
//! 没有优先级、合并或去重；写线程卡住时队列无界增长（不做背压）。

use crate::config::CommandConfig;
use crate::metrics::RoverMetrics;
use crossbeam_channel::{Receiver, Sender, unbounded};
use rover_protocol::{Command, ModuleKind, control};
use std::sync::Arc;
use tracing::warn;

/// 命令队列的生产者端
///
/// 可以任意克隆并分发到多个线程。
#[derive(Clone)]
pub struct CommandQueue {
    tx: Sender<Command>,
    metrics: Arc<RoverMetrics>,
}

impl CommandQueue {
    /// 创建队列，返回生产者端与写线程使用的消费端
    pub fn new(metrics: Arc<RoverMetrics>) -> (Self, Receiver<Command>) {
        let (tx, rx) = unbounded();
        (Self { tx, metrics }, rx)
    }

    /// 入队（从不阻塞）
    ///
    /// 写线程已经退出时命令被丢弃，只记录日志和计数。
    pub fn submit(&self, command: Command) {
        RoverMetrics::incr(&self.metrics.commands_submitted);
        if let Err(rejected) = self.tx.send(command) {
            warn!(
                "Command T={} dropped: writer thread has exited",
                rejected.0.tag()
            );
            RoverMetrics::incr(&self.metrics.commands_dropped);
        }
    }

    /// 批量入队（保持顺序）
    pub fn submit_all(&self, commands: impl IntoIterator<Item = Command>) {
        for command in commands {
            self.submit(command);
        }
    }

    /// 尚未被写线程取走的命令数
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

/// 启动命令序列
///
/// 顺序：反馈间隔、开启反馈流、关闭串口回显、选择外挂模块、上报产品版本。
pub fn boot_sequence(config: &CommandConfig) -> Vec<Command> {
    vec![
        control::feedback_interval(config.feedback_interval),
        control::feedback_flow(true),
        control::uart_echo(false),
        control::module_select(ModuleKind::from_config(config.module_type)),
        control::product_version(config.main_type, config.module_type),
    ]
}
