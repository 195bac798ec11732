//! Compression wrappers at the file edge.
//!
//! The codec itself reads and writes plain byte streams; these helpers wrap
//! the outermost file handle. gzip and bzip2 run in-process; xz is piped
//! through an external `xz` process, which also receives any pass-through
//! arguments.

use std::ffi::OsStr;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::process::{Child, Command, Stdio};

use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    None,
    #[default]
    Gzip,
    Bzip2,
    Xz,
}

impl Compression {
    /// Picks the wrapper from a file extension (`.gz`, `.bz2`, `.xz`).
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(OsStr::to_str) {
            Some(ext) if ext.eq_ignore_ascii_case("gz") => Self::Gzip,
            Some(ext) if ext.eq_ignore_ascii_case("bz2") => Self::Bzip2,
            Some(ext) if ext.eq_ignore_ascii_case("xz") => Self::Xz,
            _ => Self::None,
        }
    }

    /// Extension appended to `.zdw` output names.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Gzip => ".gz",
            Self::Bzip2 => ".bz2",
            Self::Xz => ".xz",
        }
    }
}

/// Opens `path` for reading, unwrapping any recognized compression layer.
///
/// # Errors
///
/// Returns [`Error::FileOpen`] when the file (or the `xz` process) cannot
/// be opened.
pub fn open_reader(path: &Path) -> Result<Box<dyn Read>> {
    let file = File::open(path).map_err(|_| Error::FileOpen {
        path: path.to_path_buf(),
    })?;
    match Compression::from_path(path) {
        Compression::None => Ok(Box::new(BufReader::new(file))),
        Compression::Gzip => Ok(Box::new(GzDecoder::new(BufReader::new(file)))),
        Compression::Bzip2 => Ok(Box::new(BzDecoder::new(BufReader::new(file)))),
        Compression::Xz => {
            let child = Command::new("xz")
                .args(["-d", "-c", "-q"])
                .stdin(Stdio::from(file))
                .stdout(Stdio::piped())
                .stderr(Stdio::null())
                .spawn()
                .map_err(|_| Error::FileOpen {
                    path: path.to_path_buf(),
                })?;
            Ok(Box::new(XzReader { child }))
        }
    }
}

/// Creates `path` for writing with the requested compression layer.
///
/// # Errors
///
/// Returns [`Error::FileCreate`] when the file (or the `xz` process) cannot
/// be created.
pub fn create_writer(
    path: &Path,
    compression: Compression,
    zargs: &[String],
) -> Result<CompressWriter> {
    let file = File::create(path).map_err(|_| Error::FileCreate {
        path: path.to_path_buf(),
    })?;
    Ok(match compression {
        Compression::None => CompressWriter::Plain(BufWriter::new(file)),
        Compression::Gzip => CompressWriter::Gzip(GzEncoder::new(
            BufWriter::new(file),
            flate2::Compression::default(),
        )),
        Compression::Bzip2 => CompressWriter::Bzip2(BzEncoder::new(
            BufWriter::new(file),
            bzip2::Compression::default(),
        )),
        Compression::Xz => {
            let child = Command::new("xz")
                .args(zargs)
                .args(["-c", "-q"])
                .stdin(Stdio::piped())
                .stdout(Stdio::from(file))
                .stderr(Stdio::null())
                .spawn()
                .map_err(|_| Error::FileCreate {
                    path: path.to_path_buf(),
                })?;
            CompressWriter::Xz(XzWriter { child: Some(child) })
        }
    })
}

/// A compressing file writer; call [`CompressWriter::finish`] to flush the
/// trailing compressor frame.
pub enum CompressWriter {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
    Bzip2(BzEncoder<BufWriter<File>>),
    Xz(XzWriter),
}

impl CompressWriter {
    /// Completes the stream.
    ///
    /// # Errors
    ///
    /// Returns an error when the final flush (or the `xz` process) fails.
    pub fn finish(self) -> Result<()> {
        match self {
            Self::Plain(mut w) => {
                w.flush()?;
                Ok(())
            }
            Self::Gzip(w) => {
                let mut inner = w.finish()?;
                inner.flush()?;
                Ok(())
            }
            Self::Bzip2(w) => {
                let mut inner = w.finish()?;
                inner.flush()?;
                Ok(())
            }
            Self::Xz(w) => w.finish(),
        }
    }
}

impl Write for CompressWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Self::Plain(w) => w.write(buf),
            Self::Gzip(w) => w.write(buf),
            Self::Bzip2(w) => w.write(buf),
            Self::Xz(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Self::Plain(w) => w.flush(),
            Self::Gzip(w) => w.flush(),
            Self::Bzip2(w) => w.flush(),
            Self::Xz(w) => w.flush(),
        }
    }
}

pub struct XzWriter {
    child: Option<Child>,
}

impl XzWriter {
    fn finish(mut self) -> Result<()> {
        let mut child = self.child.take().expect("xz writer finished once");
        drop(child.stdin.take());
        let status = child.wait()?;
        if status.success() {
            Ok(())
        } else {
            Err(Error::Processing {
                details: format!("xz exited with {status}").into(),
            })
        }
    }

    fn stdin(&mut self) -> &mut std::process::ChildStdin {
        self.child
            .as_mut()
            .and_then(|child| child.stdin.as_mut())
            .expect("xz stdin is piped")
    }
}

impl Write for XzWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.stdin().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.stdin().flush()
    }
}

impl Drop for XzWriter {
    fn drop(&mut self) {
        // Error paths drop the writer without `finish`; reap the child.
        if let Some(mut child) = self.child.take() {
            drop(child.stdin.take());
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

struct XzReader {
    child: Child,
}

impl Read for XzReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.child
            .stdout
            .as_mut()
            .expect("xz stdout is piped")
            .read(buf)
    }
}

impl Drop for XzReader {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
