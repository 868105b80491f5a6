//! 激光雷达帧解码与整圈拼接
//!
//! 状态机：`SeekingHeader → HaveFrame → SeekingHeader`。
//!
//! - `SeekingHeader`：逐字节读取，直到读到帧头 `0x54`；其他字节视为噪声，清空设备接收缓冲区
//! - `HaveFrame`：读满剩余 46 字节后解析，样本追加到当前圈
//!
//! 新帧的起始角小于上一帧时视为扫过一圈：当前圈封存返回，新帧成为下一圈的第一帧。

use crate::error::DriverError;
use crate::metrics::RoverMetrics;
use rover_protocol::lidar::{FRAME_HEADER, FRAME_LEN};
use rover_protocol::{LidarFrame, RangeSample};
use rover_serial::{SerialError, SerialReader};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};

/// 重新打开雷达串口的回调
pub type SourceOpener<S> = Box<dyn FnMut() -> Result<S, SerialError> + Send>;

/// 一整圈扫描
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rotation {
    samples: Vec<RangeSample>,
}

impl Rotation {
    pub fn new(samples: Vec<RangeSample>) -> Self {
        Self { samples }
    }

    /// 按解析顺序排列的样本
    pub fn samples(&self) -> &[RangeSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// 角度序列（弧度）
    pub fn angles(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.angle).collect()
    }

    /// 距离序列
    pub fn distances(&self) -> Vec<u16> {
        self.samples.iter().map(|s| s.distance).collect()
    }

    /// 拆成 `(angles, distances)`
    pub fn into_parts(self) -> (Vec<f64>, Vec<u16>) {
        self.samples.into_iter().map(|s| (s.angle, s.distance)).unzip()
    }
}

/// 整圈拼接器
///
/// 只负责"起始角回绕即封存"这一条规则，不涉及 IO。
#[derive(Debug, Default)]
pub struct RotationAssembler {
    in_progress: Vec<RangeSample>,
    last_start_angle: Option<f64>,
}

impl RotationAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一帧；若这一帧触发回绕，返回封存的上一圈（不含这一帧）
    pub fn push_frame(&mut self, frame: &LidarFrame) -> Option<Rotation> {
        let sealed = match self.last_start_angle {
            Some(prev) if frame.start_angle < prev => {
                Some(Rotation::new(std::mem::take(&mut self.in_progress)))
            },
            _ => None,
        };
        self.in_progress.extend_from_slice(&frame.samples);
        self.last_start_angle = Some(frame.start_angle);
        sealed
    }

    /// 当前圈已累积的样本
    pub fn in_progress(&self) -> &[RangeSample] {
        &self.in_progress
    }

    pub fn reset(&mut self) {
        self.in_progress.clear();
        self.last_start_angle = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    SeekingHeader,
    HaveFrame,
}

/// 激光雷达解码器
///
/// 启动时没有设备且没有重开回调的解码器永久惰性：每次调用都直接返回 `None`。
pub struct LidarDecoder<S> {
    source: Option<S>,
    opener: Option<SourceOpener<S>>,
    assembler: RotationAssembler,
    state: DecoderState,
    frame: [u8; FRAME_LEN],
    metrics: Arc<RoverMetrics>,
    running: Option<Arc<AtomicBool>>,
    last_cycle_failed: bool,
}

impl<S: SerialReader> LidarDecoder<S> {
    pub fn new(source: Option<S>, metrics: Arc<RoverMetrics>) -> Self {
        Self {
            source,
            opener: None,
            assembler: RotationAssembler::new(),
            state: DecoderState::SeekingHeader,
            frame: [0u8; FRAME_LEN],
            metrics,
            running: None,
            last_cycle_failed: false,
        }
    }

    /// 读写出错后用于重新打开设备的回调
    pub fn with_opener(mut self, opener: SourceOpener<S>) -> Self {
        self.opener = Some(opener);
        self
    }

    /// 运行标志：变为 `false` 后，等待帧头的循环在下一次读超时时返回
    pub fn with_running_flag(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = Some(running);
        self
    }

    /// 当前是否持有打开的设备
    pub fn is_connected(&self) -> bool {
        self.source.is_some()
    }

    /// 永久惰性（没有设备，也无法重新打开）
    pub fn is_inert(&self) -> bool {
        self.source.is_none() && self.opener.is_none()
    }

    /// 最近一次 [`read_rotation`](Self::read_rotation) 是否因读取/解析错误中止
    ///
    /// 重开成功时 `is_connected()` 仍为 `true`，调用方据此决定是否退避。
    pub fn last_cycle_failed(&self) -> bool {
        self.last_cycle_failed
    }

    /// 当前圈已累积的样本数
    pub fn pending_samples(&self) -> usize {
        self.assembler.in_progress().len()
    }

    /// 阻塞读取直到完成一整圈
    ///
    /// 读取或解析出错时记录日志、丢弃当前圈并尝试重新打开设备，本次返回 `None`；
    /// 调用方按自己的节奏重试。
    pub fn read_rotation(&mut self) -> Option<Rotation> {
        self.last_cycle_failed = false;
        if self.source.is_none() {
            self.try_reopen();
            self.source.as_ref()?;
        }

        match self.run_cycle() {
            Ok(rotation) => rotation,
            Err(e) => {
                warn!("Lidar read cycle aborted: {}", e);
                RoverMetrics::incr(&self.metrics.lidar_read_errors);
                self.last_cycle_failed = true;
                self.assembler.reset();
                self.state = DecoderState::SeekingHeader;
                self.source = None;
                self.try_reopen();
                None
            },
        }
    }

    /// [`read_rotation`](Self::read_rotation) 的 `(angles, distances)` 形式
    pub fn read_rotation_parts(&mut self) -> Option<(Vec<f64>, Vec<u16>)> {
        self.read_rotation().map(Rotation::into_parts)
    }

    fn run_cycle(&mut self) -> Result<Option<Rotation>, DriverError> {
        let Some(source) = self.source.as_mut() else {
            return Ok(None);
        };

        loop {
            match self.state {
                DecoderState::SeekingHeader => {
                    if !still_running(&self.running) {
                        return Ok(None);
                    }
                    let mut byte = [0u8; 1];
                    match source.read(&mut byte) {
                        Ok(_) if byte[0] == FRAME_HEADER => {
                            self.frame[0] = FRAME_HEADER;
                            source.read_exact(&mut self.frame[1..])?;
                            self.state = DecoderState::HaveFrame;
                        },
                        Ok(_) => {
                            RoverMetrics::incr(&self.metrics.lidar_noise_bytes);
                            source.clear_input()?;
                        },
                        Err(SerialError::Timeout) => {},
                        Err(e) => return Err(e.into()),
                    }
                },
                DecoderState::HaveFrame => {
                    self.state = DecoderState::SeekingHeader;
                    let frame = LidarFrame::parse(&self.frame)?;
                    RoverMetrics::incr(&self.metrics.lidar_frames);
                    if let Some(rotation) = self.assembler.push_frame(&frame) {
                        RoverMetrics::incr(&self.metrics.lidar_rotations);
                        debug!("Lidar rotation sealed: {} samples", rotation.len());
                        return Ok(Some(rotation));
                    }
                },
            }
        }
    }

    fn try_reopen(&mut self) {
        let Some(opener) = self.opener.as_mut() else {
            return;
        };
        RoverMetrics::incr(&self.metrics.lidar_reopen_attempts);
        match opener() {
            Ok(source) => {
                info!("Lidar serial source reopened");
                self.source = Some(source);
            },
            Err(e) => {
                error!("Failed to reopen lidar serial source: {}", e);
                RoverMetrics::incr(&self.metrics.lidar_reopen_failures);
            },
        }
    }
}

fn still_running(flag: &Option<Arc<AtomicBool>>) -> bool {
    flag.as_ref().is_none_or(|r| r.load(Ordering::Acquire))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rover_protocol::lidar::encode_frame;
    use rover_serial::MockSerial;

    fn frame(start: f64) -> LidarFrame {
        LidarFrame::parse(&encode_frame(start, &[(start as u16, 1)])).unwrap()
    }

    #[test]
    fn test_assembler_seals_on_wrap() {
        let mut assembler = RotationAssembler::new();
        assert!(assembler.push_frame(&frame(10.0)).is_none());
        assert!(assembler.push_frame(&frame(50.0)).is_none());
        assert!(assembler.push_frame(&frame(90.0)).is_none());

        let rotation = assembler.push_frame(&frame(5.0)).unwrap();
        assert_eq!(rotation.len(), 36);
        assert_eq!(rotation.distances()[0], 10);
        assert_eq!(rotation.distances()[24], 90);

        assert_eq!(assembler.in_progress().len(), 12);
        assert_eq!(assembler.in_progress()[0].distance, 5);
    }

    #[test]
    fn test_assembler_equal_start_does_not_seal() {
        let mut assembler = RotationAssembler::new();
        assert!(assembler.push_frame(&frame(0.0)).is_none());
        assert!(assembler.push_frame(&frame(0.0)).is_none());
        assert_eq!(assembler.in_progress().len(), 24);
    }

    #[test]
    fn test_rotation_into_parts() {
        let mut assembler = RotationAssembler::new();
        assembler.push_frame(&frame(10.0));
        let (angles, distances) = assembler.push_frame(&frame(1.0)).unwrap().into_parts();
        assert_eq!(angles.len(), 12);
        assert_eq!(distances.len(), 12);
        assert!((angles[0] - 190.0f64.to_radians()).abs() < 1e-9);
    }

    #[test]
    fn test_decoder_skips_noise_and_seals() {
        let mock = MockSerial::new();
        mock.push([0x00]);
        mock.push_pause();
        for start in [10.0, 50.0, 90.0, 5.0] {
            mock.push(encode_frame(start, &[(start as u16, 7)]));
        }

        let metrics = Arc::new(RoverMetrics::new());
        let mut decoder = LidarDecoder::new(Some(mock.clone()), metrics.clone());
        let rotation = decoder.read_rotation().unwrap();

        assert_eq!(rotation.len(), 36);
        assert_eq!(decoder.pending_samples(), 12);
        assert_eq!(mock.clear_count(), 1);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.lidar_noise_bytes, 1);
        assert_eq!(snapshot.lidar_frames, 4);
        assert_eq!(snapshot.lidar_rotations, 1);
    }

    #[test]
    fn test_decoder_without_source_is_inert() {
        let metrics = Arc::new(RoverMetrics::new());
        let mut decoder: LidarDecoder<MockSerial> = LidarDecoder::new(None, metrics.clone());
        assert!(decoder.is_inert());
        assert!(decoder.read_rotation().is_none());
        assert_eq!(metrics.snapshot().lidar_reopen_attempts, 0);
    }

    #[test]
    fn test_decoder_reopens_after_error() {
        let broken = MockSerial::new();
        broken.push(&encode_frame(10.0, &[])[..20]);
        broken.close();

        let replacement = MockSerial::new();
        for start in [20.0, 200.0, 3.0] {
            replacement.push(encode_frame(start, &[]));
        }

        let metrics = Arc::new(RoverMetrics::new());
        let spare = replacement.clone();
        let mut decoder = LidarDecoder::new(Some(broken), metrics.clone())
            .with_opener(Box::new(move || Ok(spare.clone())));

        assert!(decoder.read_rotation().is_none());
        assert!(decoder.is_connected());
        assert!(decoder.last_cycle_failed());
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.lidar_read_errors, 1);
        assert_eq!(snapshot.lidar_reopen_attempts, 1);

        let rotation = decoder.read_rotation().unwrap();
        assert_eq!(rotation.len(), 24);
        assert!(!decoder.last_cycle_failed());
    }

    #[test]
    fn test_decoder_failed_reopen_is_not_fatal() {
        let broken = MockSerial::new();
        broken.close();

        let metrics = Arc::new(RoverMetrics::new());
        let mut decoder = LidarDecoder::new(Some(broken), metrics.clone()).with_opener(Box::new(
            || {
                Err(SerialError::DeviceNotFound {
                    pattern: "/dev/ttyACM*".into(),
                })
            },
        ));

        assert!(decoder.read_rotation().is_none());
        assert!(!decoder.is_connected());
        assert!(decoder.read_rotation().is_none());

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.lidar_reopen_attempts, 2);
        assert_eq!(snapshot.lidar_reopen_failures, 2);
    }

    #[test]
    fn test_decoder_stops_when_not_running() {
        let running = Arc::new(AtomicBool::new(false));
        let mut decoder = LidarDecoder::new(Some(MockSerial::new()), Arc::new(RoverMetrics::new()))
            .with_running_flag(running);
        assert!(decoder.read_rotation().is_none());
    }
}
