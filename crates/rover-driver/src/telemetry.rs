//! 底盘遥测解码
//!
//! [`TelemetryDecoder::poll_feedback`] 先读完已缓冲/已到达的行：
//!
//! - 事件记录（`T == 1003`）立即返回，后面的行留到下一次调用
//! - 状态记录覆盖单槽缓存，继续读
//! - 缺少 `"T"` 的记录计数后丢弃，继续读
//! - 格式错误的行计数、清空设备接收缓冲区后本次返回 `None`
//!
//! 读完仍没有事件时，清空设备接收缓冲区，再阻塞读一行作为本次结果。
//!
//! 请求/应答（[`TelemetryRequest`]）也在遥测线程上执行，保证同一时刻只有一个读者。

use crate::command::CommandQueue;
use crate::error::DriverError;
use crate::line_reader::FramedReader;
use crate::metrics::RoverMetrics;
use crate::state::RoverContext;
use crossbeam_channel::Sender;
use rover_protocol::{Command, ProtocolError, RecordKind, TelemetryRecord};
use rover_serial::{SerialError, SerialReader};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, trace, warn};

/// 发送一条命令并等待下一条记录作为应答
pub struct TelemetryRequest {
    pub command: Command,
    /// 过了这个时间点还没开始执行的请求直接以超时应答，命令不会发出
    pub deadline: Instant,
    pub reply: Sender<Result<TelemetryRecord, DriverError>>,
}

/// 一行的解码结果
enum LineOutcome {
    Record(Arc<TelemetryRecord>),
    /// 丢弃但不影响后续读取
    Skipped,
    /// 需要中止本次读取
    Malformed,
}

/// 遥测解码器
///
/// 状态缓存的唯一写者。
pub struct TelemetryDecoder<R> {
    reader: FramedReader<R>,
    ctx: Arc<RoverContext>,
    metrics: Arc<RoverMetrics>,
    closed: bool,
}

impl<R: SerialReader> TelemetryDecoder<R> {
    pub fn new(
        reader: FramedReader<R>,
        ctx: Arc<RoverContext>,
        metrics: Arc<RoverMetrics>,
    ) -> Self {
        Self {
            reader,
            ctx,
            metrics,
            closed: false,
        }
    }

    /// 底层链路已断开（之后的调用都直接返回 `None`）
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// 最近缓存的状态记录
    pub fn cached(&self) -> Option<Arc<TelemetryRecord>> {
        self.ctx.feedback.load_full()
    }

    /// 拉取遥测
    ///
    /// 返回事件记录、阻塞读到的那一条记录，或 `None`（出错/超时/链路断开）。
    pub fn poll_feedback(&mut self) -> Option<Arc<TelemetryRecord>> {
        if self.closed {
            return None;
        }

        while self.has_pending() {
            let line = self.read_line()?;
            match self.decode(&line) {
                LineOutcome::Record(record) if record.kind() == RecordKind::Event => {
                    return Some(record);
                },
                LineOutcome::Record(_) | LineOutcome::Skipped => {},
                LineOutcome::Malformed => {
                    self.resync();
                    return None;
                },
            }
        }
        if self.closed {
            return None;
        }

        if let Err(e) = self.reader.clear_buffer() {
            self.on_read_error(e);
            return None;
        }

        let line = self.read_line()?;
        match self.decode(&line) {
            LineOutcome::Record(record) => Some(record),
            LineOutcome::Skipped | LineOutcome::Malformed => None,
        }
    }

    /// 请求/应答式读取：清空输入后阻塞读下一行
    ///
    /// 不经过状态缓存，也不触发钩子。
    pub fn read_next_record(&mut self) -> Result<TelemetryRecord, DriverError> {
        self.reader.clear_buffer()?;
        self.reader.discard_pending();
        let line = self.reader.read_line()?;
        self.parse_reply(&line)
    }

    /// 执行一次请求：清空输入，经由命令队列发出命令，在截止时间前读下一条记录
    ///
    /// 应答同样不进入状态缓存。调用方已放弃等待时结果被丢弃。
    pub fn serve_request(&mut self, request: TelemetryRequest, queue: &CommandQueue) {
        let TelemetryRequest {
            command,
            deadline,
            reply,
        } = request;
        let tag = command.tag();
        let result = self.request_record(command, deadline, queue);
        if let Err(e) = &result {
            debug!("Request T={} failed: {}", tag, e);
        }
        if reply.send(result).is_err() {
            debug!("Request T={} reply dropped, caller stopped waiting", tag);
        }
    }

    fn request_record(
        &mut self,
        command: Command,
        deadline: Instant,
        queue: &CommandQueue,
    ) -> Result<TelemetryRecord, DriverError> {
        if self.closed {
            return Err(SerialError::Disconnected.into());
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(DriverError::Timeout);
        }

        self.reader.clear_buffer().map_err(|e| self.request_error(e))?;
        self.reader.discard_pending();
        queue.submit(command);
        let line = self
            .reader
            .read_line_within(remaining)
            .map_err(|e| self.request_error(e))?;
        self.parse_reply(&line)
    }

    fn parse_reply(&self, line: &[u8]) -> Result<TelemetryRecord, DriverError> {
        RoverMetrics::incr(&self.metrics.telemetry_lines);
        Ok(TelemetryRecord::from_line(line)?)
    }

    fn request_error(&mut self, e: SerialError) -> DriverError {
        match e {
            SerialError::Timeout => DriverError::Timeout,
            SerialError::Disconnected => {
                self.on_read_error(SerialError::Disconnected);
                SerialError::Disconnected.into()
            },
            e => {
                RoverMetrics::incr(&self.metrics.telemetry_read_errors);
                e.into()
            },
        }
    }

    pub fn reader_mut(&mut self) -> &mut FramedReader<R> {
        &mut self.reader
    }

    fn has_pending(&mut self) -> bool {
        if self.reader.has_buffered_line() {
            return true;
        }
        match self.reader.bytes_available() {
            Ok(n) => n > 0,
            Err(e) => {
                self.on_read_error(e);
                false
            },
        }
    }

    fn read_line(&mut self) -> Option<Vec<u8>> {
        match self.reader.read_line() {
            Ok(line) => {
                RoverMetrics::incr(&self.metrics.telemetry_lines);
                Some(line)
            },
            Err(e) => {
                self.on_read_error(e);
                None
            },
        }
    }

    fn decode(&mut self, line: &[u8]) -> LineOutcome {
        let record = match TelemetryRecord::from_line(line) {
            Ok(record) => Arc::new(record),
            Err(ProtocolError::MissingTypeTag) => {
                debug!("Telemetry record without type tag discarded");
                RoverMetrics::incr(&self.metrics.telemetry_missing_tag);
                return LineOutcome::Skipped;
            },
            Err(e) => {
                warn!("Malformed telemetry line ({} bytes): {}", line.len(), e);
                RoverMetrics::incr(&self.metrics.telemetry_decode_errors);
                return LineOutcome::Malformed;
            },
        };

        match record.kind() {
            RecordKind::Event => {
                RoverMetrics::incr(&self.metrics.telemetry_events);
                self.ctx.store_event(record.clone());
            },
            RecordKind::State => {
                RoverMetrics::incr(&self.metrics.telemetry_states);
                self.ctx.store_feedback(record.clone());
            },
        }
        if let Ok(hooks) = self.ctx.hooks.try_read() {
            hooks.trigger_record(&record);
        }
        LineOutcome::Record(record)
    }

    fn resync(&mut self) {
        RoverMetrics::incr(&self.metrics.telemetry_resyncs);
        if let Err(e) = self.reader.clear_buffer() {
            self.on_read_error(e);
        }
    }

    fn on_read_error(&mut self, e: SerialError) {
        match e {
            SerialError::Timeout => trace!("Telemetry read timed out"),
            SerialError::Disconnected => {
                error!("Chassis serial link disconnected");
                RoverMetrics::incr(&self.metrics.telemetry_read_errors);
                self.closed = true;
            },
            e => {
                warn!("Telemetry read failed: {}", e);
                RoverMetrics::incr(&self.metrics.telemetry_read_errors);
            },
        }
    }
}
