//! Output byte sinks.

use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

trait WriteSeek: Write + Seek + Send {}

impl<T: Write + Seek + Send> WriteSeek for T {}

enum Inner {
    File(BufWriter<File>),
    Seekable(Box<dyn WriteSeek>),
    Stream(Box<dyn Write + Send>),
}

/// Where a muxer writes its bytes.
///
/// Tracks the current byte offset so a muxer can go back and patch header
/// fields at trailer time, when the sink is seekable.
pub struct Sink {
    inner: Inner,
    position: u64,
}

impl std::fmt::Debug for Sink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.inner {
            Inner::File(_) => "file",
            Inner::Seekable(_) => "seekable",
            Inner::Stream(_) => "stream",
        };
        f.debug_struct("Sink")
            .field("kind", &kind)
            .field("position", &self.position)
            .finish()
    }
}

impl Sink {
    /// Create (truncate) a buffered file.
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            inner: Inner::File(BufWriter::new(file)),
            position: 0,
        })
    }

    /// Wrap any seekable writer.
    pub fn seekable<W: Write + Seek + Send + 'static>(writer: W) -> Self {
        Self {
            inner: Inner::Seekable(Box::new(writer)),
            position: 0,
        }
    }

    /// Wrap a forward-only writer (pipe, socket, live sink).
    pub fn stream<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            inner: Inner::Stream(Box::new(writer)),
            position: 0,
        }
    }

    /// Whether previously written bytes can be rewritten.
    #[must_use]
    pub fn is_seekable(&self) -> bool {
        !matches!(self.inner, Inner::Stream(_))
    }

    /// Current byte offset.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match &mut self.inner {
            Inner::File(w) => w.write_all(buf)?,
            Inner::Seekable(w) => w.write_all(buf)?,
            Inner::Stream(w) => w.write_all(buf)?,
        }
        self.position += buf.len() as u64;
        Ok(())
    }

    /// Move the write position to `offset` from the start.
    pub fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        match &mut self.inner {
            Inner::File(w) => w.seek(SeekFrom::Start(offset))?,
            Inner::Seekable(w) => w.seek(SeekFrom::Start(offset))?,
            Inner::Stream(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "sink is not seekable",
                ))
            }
        };
        self.position = offset;
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        match &mut self.inner {
            Inner::File(w) => w.flush(),
            Inner::Seekable(w) => w.flush(),
            Inner::Stream(w) => w.flush(),
        }
    }
}

/// The output handed to [`StreamSession::init`](crate::StreamSession::init).
#[derive(Debug)]
pub enum OutputTarget {
    /// A file created (or truncated) at open time.
    Path(PathBuf),
    /// An already opened sink.
    Sink(Sink),
}

impl OutputTarget {
    /// The path, if this target is a file.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Path(path) => Some(path),
            Self::Sink(_) => None,
        }
    }
}

impl From<&str> for OutputTarget {
    fn from(path: &str) -> Self {
        Self::Path(PathBuf::from(path))
    }
}

impl From<PathBuf> for OutputTarget {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for OutputTarget {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl From<Sink> for OutputTarget {
    fn from(sink: Sink) -> Self {
        Self::Sink(sink)
    }
}
