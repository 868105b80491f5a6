//! 激光雷达帧解析
//!
//! 帧格式（47 字节，小端）：
//!
//! ```text
//! Byte 0      帧头 0x54
//! Byte 1      VerLen（固定 0x2C）
//! Byte 2-3    转速（度/秒）
//! Byte 4-5    起始角（0.01 度）
//! Byte 6-41   12 组测量点：距离低字节、距离高字节、置信度
//! Byte 42-43  结束角（0.01 度）
//! Byte 44-45  时间戳（毫秒）
//! Byte 46     CRC8（不校验）
//! ```
//!
//! 帧头字节没有转义：帧体中恰好等于 `0x54` 的数据字节无法与真正的帧头区分。

use crate::ProtocolError;

/// 帧头
pub const FRAME_HEADER: u8 = 0x54;

/// 完整帧长度（含帧头）
pub const FRAME_LEN: usize = 47;

/// 每帧测量点数
pub const POINTS_PER_FRAME: usize = 12;

/// 相邻测量点的角度步长（度）
pub const ANGLE_STEP_DEG: f64 = 0.83333;

/// 安装偏置（度）：雷达零位朝后
pub const MOUNT_OFFSET_DEG: f64 = 180.0;

const POINTS_OFFSET: usize = 6;

/// 单个测距样本
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeSample {
    /// 角度（弧度），`radians(start + i * step + 180)`
    pub angle: f64,
    /// 距离（毫米）
    pub distance: u16,
    /// 置信度
    pub confidence: u8,
}

/// 已解析的一帧
#[derive(Debug, Clone, PartialEq)]
pub struct LidarFrame {
    /// 转速（度/秒）
    pub speed: u16,
    /// 起始角（度）
    pub start_angle: f64,
    /// 结束角（度）
    pub end_angle: f64,
    /// 设备时间戳（毫秒）
    pub timestamp_ms: u16,
    /// 校验字节（原样保留）
    pub checksum: u8,
    /// 12 个测量点
    pub samples: [RangeSample; POINTS_PER_FRAME],
}

impl LidarFrame {
    /// 解析完整的 47 字节帧
    ///
    /// 只校验长度与帧头，不校验 CRC。
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < FRAME_LEN {
            return Err(ProtocolError::InvalidLength {
                expected: FRAME_LEN,
                actual: data.len(),
            });
        }
        if data[0] != FRAME_HEADER {
            return Err(ProtocolError::InvalidHeader { byte: data[0] });
        }

        let start_angle = f64::from(u16::from_le_bytes([data[4], data[5]])) * 0.01;

        let mut samples = [RangeSample {
            angle: 0.0,
            distance: 0,
            confidence: 0,
        }; POINTS_PER_FRAME];
        for (i, sample) in samples.iter_mut().enumerate() {
            let offset = POINTS_OFFSET + i * 3;
            *sample = RangeSample {
                angle: sample_angle(start_angle, i),
                distance: u16::from_le_bytes([data[offset], data[offset + 1]]),
                confidence: data[offset + 2],
            };
        }

        Ok(Self {
            speed: u16::from_le_bytes([data[2], data[3]]),
            start_angle,
            end_angle: f64::from(u16::from_le_bytes([data[42], data[43]])) * 0.01,
            timestamp_ms: u16::from_le_bytes([data[44], data[45]]),
            checksum: data[46],
            samples,
        })
    }
}

/// 第 `index` 个测量点的角度（弧度，归一化到 `[0, 2π)`）
pub fn sample_angle(start_angle_deg: f64, index: usize) -> f64 {
    (start_angle_deg + index as f64 * ANGLE_STEP_DEG + MOUNT_OFFSET_DEG)
        .to_radians()
        .rem_euclid(std::f64::consts::TAU)
}

/// 构造一帧原始字节（测试与仿真用）
///
/// `points` 不足 12 个时其余测量点填 0。
pub fn encode_frame(start_angle_deg: f64, points: &[(u16, u8)]) -> [u8; FRAME_LEN] {
    let mut data = [0u8; FRAME_LEN];
    data[0] = FRAME_HEADER;
    data[1] = 0x2C;
    let raw_start = (start_angle_deg * 100.0).round() as u16;
    data[4..6].copy_from_slice(&raw_start.to_le_bytes());
    for (i, (distance, confidence)) in points.iter().take(POINTS_PER_FRAME).enumerate() {
        let offset = POINTS_OFFSET + i * 3;
        data[offset..offset + 2].copy_from_slice(&distance.to_le_bytes());
        data[offset + 2] = *confidence;
    }
    data
}
