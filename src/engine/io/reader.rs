use std::fs::File;
use std::io::{self, BufReader, Read as _};
use std::path::Path;

use super::{Reader, StreamKind};

/// ### English
/// Buffered reader over a file on disk; remembers the name it was opened with.
///
/// ### 中文
/// 基于磁盘文件的带缓冲读取器；记录打开时使用的文件名。
pub struct FileReader {
    file: BufReader<File>,
    filename: String,
}

impl FileReader {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        Ok(Self {
            file: BufReader::new(file),
            filename: path.to_string_lossy().into_owned(),
        })
    }
}

impl Reader for FileReader {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        loop {
            match self.file.read(buf) {
                Ok(n) => return n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    tracing::warn!(filename = %self.filename, %err, "file read failed");
                    return 0;
                }
            }
        }
    }

    fn filename(&self) -> &str {
        &self.filename
    }

    fn kind(&self) -> StreamKind {
        StreamKind::File
    }
}

/// ### English
/// Reader over a borrowed byte slice.
///
/// ### 中文
/// 基于借用字节切片的读取器。
pub struct MemoryReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> MemoryReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }
}

impl Reader for MemoryReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.remaining());
        buf[..n].copy_from_slice(&self.data[self.position..self.position + n]);
        self.position += n;
        n
    }

    fn kind(&self) -> StreamKind {
        StreamKind::Memory
    }
}

/// ### English
/// Adapter over any [`std::io::Read`].
///
/// ### 中文
/// 包装任意 [`std::io::Read`]。
pub struct StreamReader<R: io::Read> {
    inner: R,
}

impl<R: io::Read> StreamReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: io::Read> Reader for StreamReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        loop {
            match self.inner.read(buf) {
                Ok(n) => return n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => return 0,
            }
        }
    }

    fn kind(&self) -> StreamKind {
        StreamKind::Stream
    }
}
