//! 按行读取的缓冲读取器
//!
//! 在串口读端之上累积字节，按 `\n` 切出完整的行。未终止的尾部保留到下一次调用，
//! 跨调用不会丢失任何前缀。

use rover_serial::{SerialError, SerialReader};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// 默认单次读取上限（字节）
pub const DEFAULT_CHUNK_SIZE: usize = 512;

/// 行读取器
///
/// 每次底层读取请求 `min(chunk_size, 可用字节数)` 个字节（至少 1 个），
/// 避免无界阻塞读取。
pub struct FramedReader<S> {
    source: S,
    buf: Vec<u8>,
    scratch: Vec<u8>,
    line_timeout: Option<Duration>,
    running: Option<Arc<AtomicBool>>,
    interrupt: Option<Arc<AtomicBool>>,
}

impl<S: SerialReader> FramedReader<S> {
    pub fn new(source: S) -> Self {
        Self::with_chunk_size(source, DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(source: S, chunk_size: usize) -> Self {
        Self {
            source,
            buf: Vec::new(),
            scratch: vec![0u8; chunk_size.max(1)],
            line_timeout: None,
            running: None,
            interrupt: None,
        }
    }

    /// 单行读取的总超时（`None` 表示一直等到换行符出现）
    pub fn with_line_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.line_timeout = timeout;
        self
    }

    /// 运行标志：变为 `false` 后，正在等待的 [`read_line`](Self::read_line) 在下一次读超时时返回
    pub fn with_running_flag(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = Some(running);
        self
    }

    /// 中断标志：置位后 [`read_line`](Self::read_line) 在下一次读超时时返回，标志本身不被清除
    pub fn with_interrupt(mut self, interrupt: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    /// 读取一行（包含结尾的 `\n`）
    ///
    /// 底层读超时会被重试，直到读到换行符或超过 `line_timeout`。
    /// 超时返回 [`SerialError::Timeout`] 时，已累积的部分行仍保留在缓冲区中。
    pub fn read_line(&mut self) -> Result<Vec<u8>, SerialError> {
        let deadline = self.line_timeout.map(|t| Instant::now() + t);
        self.read_line_until(deadline, true)
    }

    /// 在给定时间内读取一行，忽略 `line_timeout` 和中断标志
    pub fn read_line_within(&mut self, timeout: Duration) -> Result<Vec<u8>, SerialError> {
        self.read_line_until(Some(Instant::now() + timeout), false)
    }

    fn read_line_until(
        &mut self,
        deadline: Option<Instant>,
        interruptible: bool,
    ) -> Result<Vec<u8>, SerialError> {
        if let Some(line) = self.take_line(0) {
            return Ok(line);
        }

        loop {
            let available = self.source.bytes_available()?;
            let want = available.clamp(1, self.scratch.len());

            match self.source.read(&mut self.scratch[..want]) {
                Ok(n) => {
                    let scan_from = self.buf.len();
                    self.buf.extend_from_slice(&self.scratch[..n]);
                    if let Some(line) = self.take_line(scan_from) {
                        return Ok(line);
                    }
                },
                Err(SerialError::Timeout) => {
                    let expired = deadline.is_some_and(|d| Instant::now() >= d);
                    let stopped = self
                        .running
                        .as_ref()
                        .is_some_and(|r| !r.load(Ordering::Acquire));
                    let interrupted = interruptible
                        && self
                            .interrupt
                            .as_ref()
                            .is_some_and(|i| i.load(Ordering::Acquire));
                    if expired || stopped || interrupted {
                        return Err(SerialError::Timeout);
                    }
                },
                Err(e) => return Err(e),
            }
        }
    }

    fn take_line(&mut self, scan_from: usize) -> Option<Vec<u8>> {
        let pos = self.buf[scan_from..].iter().position(|&b| b == b'\n')? + scan_from;
        let rest = self.buf.split_off(pos + 1);
        Some(std::mem::replace(&mut self.buf, rest))
    }

    /// 内部缓冲区中是否已有完整的一行
    pub fn has_buffered_line(&self) -> bool {
        self.buf.contains(&b'\n')
    }

    /// 内部缓冲区中尚未返回的字节数
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// 设备侧已到达、尚未读取的字节数
    pub fn bytes_available(&mut self) -> Result<usize, SerialError> {
        self.source.bytes_available()
    }

    /// 清空设备接收缓冲区
    ///
    /// 只清设备侧；本读取器内部已累积但未终止的字节不受影响，
    /// 需要完全重新同步时再调用 [`discard_pending`](Self::discard_pending)。
    pub fn clear_buffer(&mut self) -> Result<(), SerialError> {
        self.source.clear_input()
    }

    /// 丢弃内部缓冲区中的全部字节
    pub fn discard_pending(&mut self) {
        self.buf.clear();
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn into_inner(self) -> S {
        self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rover_serial::MockSerial;

    #[test]
    fn test_partial_prefix_is_kept() {
        let mock = MockSerial::new();
        mock.push(b"abc");
        mock.push(b"def\n");
        let mut reader = FramedReader::new(mock);
        assert_eq!(reader.read_line().unwrap(), b"abcdef\n");
    }

    #[test]
    fn test_remainder_served_from_buffer() {
        let mock = MockSerial::new();
        mock.push(b"one\ntwo\nthr");
        let mut reader = FramedReader::new(mock.clone());

        assert_eq!(reader.read_line().unwrap(), b"one\n");
        assert!(reader.has_buffered_line());
        assert_eq!(reader.read_line().unwrap(), b"two\n");
        assert!(!reader.has_buffered_line());
        assert_eq!(reader.buffered_len(), 3);

        mock.push(b"ee\n");
        assert_eq!(reader.read_line().unwrap(), b"three\n");
    }

    #[test]
    fn test_reads_are_chunked() {
        let mock = MockSerial::new();
        mock.push(b"0123456789\n");
        let mut reader = FramedReader::with_chunk_size(mock.clone(), 4);
        assert_eq!(reader.read_line().unwrap(), b"0123456789\n");
        assert_eq!(mock.pending_input(), 0);
    }

    #[test]
    fn test_line_timeout_keeps_partial_line() {
        let mock = MockSerial::new();
        mock.push(b"{\"T\":");
        let mut reader =
            FramedReader::new(mock.clone()).with_line_timeout(Some(Duration::from_millis(20)));

        assert!(reader.read_line().unwrap_err().is_timeout());
        assert_eq!(reader.buffered_len(), 5);

        mock.push(b"1}\n");
        assert_eq!(reader.read_line().unwrap(), b"{\"T\":1}\n");
    }

    #[test]
    fn test_clear_buffer_only_touches_device() {
        let mock = MockSerial::new();
        mock.push(b"partial");
        let mut reader =
            FramedReader::new(mock.clone()).with_line_timeout(Some(Duration::from_millis(5)));
        assert!(reader.read_line().is_err());

        mock.push(b"stale\n");
        reader.clear_buffer().unwrap();
        assert_eq!(mock.clear_count(), 1);
        assert_eq!(reader.buffered_len(), 7);

        mock.push(b"new\n");
        assert_eq!(reader.read_line().unwrap(), b"partialnew\n");

        mock.push(b"junk");
        let _ = reader.read_line();
        reader.discard_pending();
        assert_eq!(reader.buffered_len(), 0);
    }

    #[test]
    fn test_running_flag_stops_blocking_read() {
        let mock = MockSerial::new();
        let running = Arc::new(AtomicBool::new(false));
        let mut reader = FramedReader::new(mock).with_running_flag(running);
        assert!(reader.read_line().unwrap_err().is_timeout());
    }

    #[test]
    fn test_interrupt_only_stops_unbounded_read() {
        let mock = MockSerial::new();
        let interrupt = Arc::new(AtomicBool::new(true));
        let mut reader = FramedReader::new(mock.clone()).with_interrupt(interrupt.clone());
        assert!(reader.read_line().unwrap_err().is_timeout());
        assert!(interrupt.load(Ordering::Acquire));

        // 显式时限的读取不受中断标志影响
        let feeder = mock.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            feeder.push(b"{\"T\":1001}\n");
        });
        let line = reader.read_line_within(Duration::from_secs(2)).unwrap();
        assert_eq!(line, b"{\"T\":1001}\n");
        handle.join().unwrap();
    }

    #[test]
    fn test_read_line_within_expires() {
        let mut reader = FramedReader::new(MockSerial::new());
        assert!(reader
            .read_line_within(Duration::from_millis(20))
            .unwrap_err()
            .is_timeout());
    }

    #[test]
    fn test_disconnect_propagates() {
        let mock = MockSerial::new();
        mock.close();
        let mut reader = FramedReader::new(mock);
        assert!(matches!(reader.read_line(), Err(SerialError::Disconnected)));
    }
}
