use std::fs::File;
use std::io::{self, BufWriter, Write as _};
use std::path::{Path, PathBuf};

use super::{StreamKind, Writer};

/// ### English
/// Grows a [`MemoryWriter`] buffer to at least the requested size. Returning `false`
/// refuses the growth and the pending write is dropped.
///
/// ### 中文
/// 将 [`MemoryWriter`] 的缓冲区扩容至不小于请求的大小。返回 `false` 表示拒绝扩容，
/// 待写入的数据将被丢弃。
pub type Reallocator = fn(&mut Vec<u8>, usize) -> bool;

/// ### English
/// Reallocator that always grows the buffer.
///
/// ### 中文
/// 总是扩容缓冲区的 reallocator。
pub fn grow_reallocator(buffer: &mut Vec<u8>, size: usize) -> bool {
    if buffer.try_reserve(size.saturating_sub(buffer.len())).is_err() {
        return false;
    }
    buffer.resize(size, 0);
    true
}

/// ### English
/// Buffered writer over a file on disk.
///
/// ### 中文
/// 基于磁盘文件的带缓冲写出器。
pub struct FileWriter {
    file: BufWriter<File>,
    path: PathBuf,
    written: usize,
}

impl FileWriter {
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        Ok(Self {
            file: BufWriter::new(file),
            path,
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Writer for FileWriter {
    fn write(&mut self, buf: &[u8], _is_binary: bool) -> usize {
        match self.file.write_all(buf) {
            Ok(()) => {
                self.written += buf.len();
                buf.len()
            }
            Err(err) => {
                tracing::warn!(path = %self.path.display(), %err, "file write failed");
                0
            }
        }
    }

    fn bytes_in_buffer(&self) -> usize {
        self.written
    }

    fn kind(&self) -> StreamKind {
        StreamKind::File
    }

    fn flush(&mut self) -> bool {
        self.file.flush().is_ok()
    }
}

impl Drop for FileWriter {
    fn drop(&mut self) {
        if let Err(err) = self.file.flush() {
            tracing::warn!(path = %self.path.display(), %err, "flush on close failed");
        }
    }
}

/// ### English
/// Writer into a caller-sized memory buffer.
///
/// A write that does not fit asks the reallocator for `max(needed, 2 * capacity)` bytes.
/// Without a reallocator, or when it refuses, the write is rejected as a whole and `0` is
/// returned; the buffer keeps everything written before.
///
/// ### 中文
/// 写入调用方指定大小的内存缓冲区。
///
/// 放不下的写入会向 reallocator 请求 `max(所需, 2 * 容量)` 字节。
/// 若没有 reallocator 或其拒绝扩容，整个写入被拒绝并返回 `0`；之前写入的内容保持不变。
pub struct MemoryWriter {
    buffer: Vec<u8>,
    offset: usize,
    reallocator: Option<Reallocator>,
}

impl MemoryWriter {
    pub fn new(initial_size: usize, reallocator: Option<Reallocator>) -> Self {
        Self {
            buffer: vec![0; initial_size],
            offset: 0,
            reallocator,
        }
    }

    /// ### English
    /// Unbounded writer: starts empty and always grows.
    ///
    /// ### 中文
    /// 无上限的写出器：初始为空，总是可以扩容。
    pub fn growable() -> Self {
        Self::new(0, Some(grow_reallocator))
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer[..self.offset]
    }

    pub fn into_bytes(mut self) -> Vec<u8> {
        self.buffer.truncate(self.offset);
        self.buffer
    }
}

impl Writer for MemoryWriter {
    fn write(&mut self, buf: &[u8], _is_binary: bool) -> usize {
        let Some(needed) = self.offset.checked_add(buf.len()) else {
            return 0;
        };
        if needed > self.buffer.len() {
            let Some(reallocator) = self.reallocator else {
                return 0;
            };
            let wanted = needed.max(self.buffer.len().saturating_mul(2));
            if !reallocator(&mut self.buffer, wanted) || self.buffer.len() < needed {
                tracing::debug!(
                    needed,
                    capacity = self.buffer.len(),
                    "memory writer growth refused"
                );
                return 0;
            }
        }
        self.buffer[self.offset..needed].copy_from_slice(buf);
        self.offset = needed;
        buf.len()
    }

    fn bytes_in_buffer(&self) -> usize {
        self.offset
    }

    fn kind(&self) -> StreamKind {
        StreamKind::Memory
    }
}

/// ### English
/// Adapter over any [`std::io::Write`] the caller already owns.
///
/// ### 中文
/// 包装调用方已持有的任意 [`std::io::Write`]。
pub struct StreamWriter<W: io::Write> {
    inner: W,
    written: usize,
}

impl<W: io::Write> StreamWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: io::Write> Writer for StreamWriter<W> {
    fn write(&mut self, buf: &[u8], _is_binary: bool) -> usize {
        if self.inner.write_all(buf).is_err() {
            return 0;
        }
        self.written += buf.len();
        buf.len()
    }

    fn bytes_in_buffer(&self) -> usize {
        self.written
    }

    fn kind(&self) -> StreamKind {
        StreamKind::Stream
    }

    fn flush(&mut self) -> bool {
        self.inner.flush().is_ok()
    }
}
