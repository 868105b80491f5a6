//! 辅助传感器多路读取
//!
//! 一次轮询读完设备上当前可用的所有行，整批替换上一批记录，然后清空设备接收缓冲区。
//! 每行去掉结尾 2 字节；超过上限的行拆成两条（前 `max_line_len` 字节 + 余下部分）。

use crate::line_reader::FramedReader;
use crate::metrics::RoverMetrics;
use parking_lot::Mutex;
use rover_serial::{SerialError, SerialReader};
use std::sync::Arc;
use std::time::Duration;
use tracing::{trace, warn};

/// 默认单条记录上限
pub const DEFAULT_MAX_LINE_LEN: usize = 51;

/// 最近一批传感器记录（整批替换，整批取走）
#[derive(Debug, Default)]
pub struct SensorBatch {
    records: Mutex<Vec<String>>,
}

impl SensorBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// 用新的一批替换旧的一批
    pub fn replace(&self, records: Vec<String>) {
        *self.records.lock() = records;
    }

    /// 取走当前这一批并留下空列表
    pub fn drain(&self) -> Vec<String> {
        std::mem::take(&mut *self.records.lock())
    }

    /// 不取走，只复制当前这一批
    pub fn snapshot(&self) -> Vec<String> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

/// 辅助传感器读取器
///
/// 启动时没有设备则永久惰性，[`poll`](Self::poll) 直接返回。
pub struct SensorMultiplexer<S> {
    reader: Option<FramedReader<S>>,
    max_line_len: usize,
    batch: Arc<SensorBatch>,
    metrics: Arc<RoverMetrics>,
}

impl<S: SerialReader> SensorMultiplexer<S> {
    pub fn new(
        source: Option<S>,
        max_line_len: usize,
        batch: Arc<SensorBatch>,
        metrics: Arc<RoverMetrics>,
    ) -> Self {
        Self {
            reader: source.map(FramedReader::new),
            max_line_len: max_line_len.max(1),
            batch,
            metrics,
        }
    }

    /// 单行读取超时（行只到了一半时，避免一直阻塞轮询线程）
    pub fn with_line_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.reader = self.reader.map(|r| r.with_line_timeout(timeout));
        self
    }

    pub fn is_inert(&self) -> bool {
        self.reader.is_none()
    }

    /// 读完当前可用的行
    ///
    /// 至少读到一行时替换共享批次并返回新批次的记录数；否则返回 `None`，旧批次保持不变。
    pub fn poll(&mut self) -> Option<usize> {
        let reader = self.reader.as_mut()?;

        let mut records = Vec::new();
        let mut drained_any = false;
        loop {
            let pending = if reader.has_buffered_line() {
                true
            } else {
                match reader.bytes_available() {
                    Ok(n) => n > 0,
                    Err(e) => {
                        warn!("Sensor source unavailable: {}", e);
                        RoverMetrics::incr(&self.metrics.sensor_read_errors);
                        false
                    },
                }
            };
            if !pending {
                break;
            }

            match reader.read_line() {
                Ok(line) => {
                    drained_any = true;
                    RoverMetrics::incr(&self.metrics.sensor_lines);
                    if split_record(&line, self.max_line_len, &mut records) {
                        RoverMetrics::incr(&self.metrics.sensor_split_lines);
                    }
                },
                // 半行超时不是链路错误，剩余部分在批次结束时丢弃
                Err(SerialError::Timeout) => {
                    trace!("Sensor line incomplete, read timed out");
                    break;
                },
                Err(e) => {
                    warn!("Sensor read failed: {}", e);
                    RoverMetrics::incr(&self.metrics.sensor_read_errors);
                    break;
                },
            }
        }

        if !drained_any {
            return None;
        }

        let count = records.len();
        trace!("Sensor batch: {} records", count);
        self.batch.replace(records);
        RoverMetrics::incr(&self.metrics.sensor_batches);

        if let Err(e) = reader.clear_buffer() {
            warn!("Failed to reset sensor input buffer: {}", e);
            RoverMetrics::incr(&self.metrics.sensor_read_errors);
        }
        reader.discard_pending();
        Some(count)
    }
}

/// 去掉结尾 2 字节，按上限拆分；返回是否拆分
fn split_record(line: &[u8], max_len: usize, out: &mut Vec<String>) -> bool {
    let content = &line[..line.len().saturating_sub(2)];
    if content.len() <= max_len {
        out.push(String::from_utf8_lossy(content).into_owned());
        return false;
    }
    let (head, tail) = content.split_at(max_len);
    out.push(String::from_utf8_lossy(head).into_owned());
    out.push(String::from_utf8_lossy(tail).into_owned());
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use rover_serial::MockSerial;

    fn line_of(len: usize) -> Vec<u8> {
        let mut line = vec![b'x'; len];
        line.extend_from_slice(b"\r\n");
        line
    }

    fn multiplexer(mock: &MockSerial) -> (SensorMultiplexer<MockSerial>, Arc<SensorBatch>) {
        let batch = Arc::new(SensorBatch::new());
        let mux = SensorMultiplexer::new(
            Some(mock.clone()),
            DEFAULT_MAX_LINE_LEN,
            batch.clone(),
            Arc::new(RoverMetrics::new()),
        );
        (mux, batch)
    }

    #[test]
    fn test_split_record_boundaries() {
        let mut out = Vec::new();
        assert!(!split_record(&line_of(51), 51, &mut out));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].len(), 51);

        out.clear();
        assert!(split_record(&line_of(52), 51, &mut out));
        assert_eq!(out[0].len(), 51);
        assert_eq!(out[1], "x");
    }

    #[test]
    fn test_poll_replaces_batch_and_resets_device() {
        let mock = MockSerial::new();
        mock.push(b"t=21.5\r\nh=40\r\n");
        let (mut mux, batch) = multiplexer(&mock);

        assert_eq!(mux.poll(), Some(2));
        assert_eq!(batch.snapshot(), vec!["t=21.5", "h=40"]);
        assert_eq!(mock.clear_count(), 1);

        mock.push(b"t=22.0\r\n");
        assert_eq!(mux.poll(), Some(1));
        assert_eq!(batch.drain(), vec!["t=22.0"]);
        assert!(batch.drain().is_empty());
    }

    #[test]
    fn test_poll_without_input_keeps_previous_batch() {
        let mock = MockSerial::new();
        mock.push(b"a\r\n");
        let (mut mux, batch) = multiplexer(&mock);
        mux.poll();

        assert_eq!(mux.poll(), None);
        assert_eq!(batch.len(), 1);
        assert_eq!(mock.clear_count(), 1);
    }

    #[test]
    fn test_absent_source_is_noop() {
        let batch = Arc::new(SensorBatch::new());
        let mut mux: SensorMultiplexer<MockSerial> =
            SensorMultiplexer::new(None, 51, batch.clone(), Arc::new(RoverMetrics::new()));
        assert!(mux.is_inert());
        assert_eq!(mux.poll(), None);
        assert!(batch.is_empty());
    }

    #[test]
    fn test_partial_line_is_discarded_after_batch() {
        let mock = MockSerial::new();
        mock.push(b"ok\r\npart");
        let (mux, batch) = multiplexer(&mock);
        let mut mux = mux.with_line_timeout(Some(Duration::from_millis(5)));

        assert_eq!(mux.poll(), Some(1));
        assert_eq!(batch.snapshot(), vec!["ok"]);

        mock.push(b"next\r\n");
        mux.poll();
        assert_eq!(batch.snapshot(), vec!["next"]);
    }

    #[test]
    fn test_partial_line_timeout_is_not_a_read_error() {
        let mock = MockSerial::new();
        mock.push(b"t=21.5\r\nh=4");
        let metrics = Arc::new(RoverMetrics::new());
        let batch = Arc::new(SensorBatch::new());
        let mut mux = SensorMultiplexer::new(
            Some(mock.clone()),
            DEFAULT_MAX_LINE_LEN,
            batch.clone(),
            metrics.clone(),
        )
        .with_line_timeout(Some(Duration::from_millis(5)));

        assert_eq!(mux.poll(), Some(1));
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.sensor_read_errors, 0);
        assert_eq!(snapshot.sensor_lines, 1);

        // 链路断开仍然计为读取错误
        mock.close();
        assert_eq!(mux.poll(), None);
        assert_eq!(batch.snapshot(), vec!["t=21.5"]);
    }
}
