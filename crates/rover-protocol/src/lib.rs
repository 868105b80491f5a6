//! # Rover Protocol
//!
//! 底盘串口协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `tags`: 类型标签（`"T"` 字段）常量与枚举
//! - `command`: 出站命令（JSON 对象，一行一条）
//! - `control`: 常用控制命令构建函数
//! - `feedback`: 入站遥测记录解析
//! - `lidar`: 激光雷达 47 字节二进制帧解析
//!
//! ## 线路格式
//!
//! - 底盘（出站/入站）：UTF-8 JSON 对象文本，`\n` 结尾，必须包含整数 `"T"` 字段
//! - 激光雷达：固定 47 字节帧，帧头 `0x54`，无转义

pub mod command;
pub mod control;
pub mod feedback;
pub mod lidar;
pub mod tags;

// 重新导出常用类型
pub use command::Command;
pub use control::*;
pub use feedback::{BaseFeedback, TelemetryRecord};
pub use lidar::{LidarFrame, RangeSample};
pub use tags::*;

use thiserror::Error;

/// 类型标签字段名
pub const TYPE_TAG_KEY: &str = "T";

/// 协议解析错误类型
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// 行内容不是合法 UTF-8
    #[error("Invalid UTF-8 in record: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// 行内容不是合法 JSON
    #[error("Invalid JSON record: {0}")]
    InvalidJson(#[source] serde_json::Error),

    /// JSON 顶层不是对象
    #[error("Record is not a JSON object")]
    NotAnObject,

    /// 缺少 `"T"` 类型标签
    #[error("Record has no type tag \"T\"")]
    MissingTypeTag,

    /// `"T"` 字段不是整数
    #[error("Type tag is not an integer: {value}")]
    InvalidTypeTag { value: String },

    /// 命令序列化失败
    #[error("Failed to serialize command: {0}")]
    Serialize(#[source] serde_json::Error),

    /// 二进制帧长度错误
    #[error("Invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// 二进制帧头错误
    #[error("Invalid frame header: 0x{byte:02X}")]
    InvalidHeader { byte: u8 },
}

/// 从 JSON 值中提取整数类型标签
///
/// 固件侧使用整数标签；`1003.0` 这类浮点写法也被接受（只要没有小数部分）。
pub(crate) fn tag_from_value(value: &serde_json::Value) -> Result<i64, ProtocolError> {
    if let Some(tag) = value.as_i64() {
        return Ok(tag);
    }
    if let Some(f) = value.as_f64()
        && f.fract() == 0.0
        && f.abs() < i64::MAX as f64
    {
        return Ok(f as i64);
    }
    Err(ProtocolError::InvalidTypeTag {
        value: value.to_string(),
    })
}
