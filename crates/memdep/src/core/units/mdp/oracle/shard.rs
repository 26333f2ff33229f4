//! Compressed trace shard I/O.
//!
//! Shards are LZ4 frame streams holding the line formats in [`super::record`]. A run
//! directory holds numbered `mini_trace_<n>.csv.lz4` shards and, for recording runs,
//! one `full_trace.csv.lz4`.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use lz4_flex::frame::{FrameDecoder, FrameEncoder};

/// Path of mini-trace shard `index` in `dir`.
pub fn mini_trace_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("mini_trace_{index}.csv.lz4"))
}

/// Path of the full trace in `dir`.
pub fn full_trace_path(dir: &Path) -> PathBuf {
    dir.join("full_trace.csv.lz4")
}

/// Reads and decompresses a whole shard.
///
/// Returns `Ok(None)` if the shard does not exist.
pub fn read_shard(path: &Path) -> io::Result<Option<String>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    let mut text = String::new();
    let _ = FrameDecoder::new(file).read_to_string(&mut text)?;
    Ok(Some(text))
}

/// Deletes `mini_trace_<first>`, `mini_trace_<first + 1>`, ... up to the first
/// missing shard, and returns how many were removed.
pub fn remove_shards_from(dir: &Path, first: usize) -> io::Result<usize> {
    let mut removed = 0;
    loop {
        match std::fs::remove_file(mini_trace_path(dir, first + removed)) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(removed),
            Err(e) => return Err(e),
        }
    }
}

/// Append-only compressed text sink.
pub struct ShardWriter {
    path: PathBuf,
    encoder: FrameEncoder<BufWriter<File>>,
}

impl ShardWriter {
    /// Creates (truncating) the shard at `path`.
    pub fn create(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = File::create(&path)?;
        Ok(Self {
            path,
            encoder: FrameEncoder::new(BufWriter::new(file)),
        })
    }

    /// Shard location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes one line followed by `\n`.
    pub fn write_line(&mut self, line: impl std::fmt::Display) -> io::Result<()> {
        writeln!(self.encoder, "{line}")
    }

    /// Writes an already formatted block of lines.
    pub fn write_block(&mut self, block: &str) -> io::Result<()> {
        self.encoder.write_all(block.as_bytes())
    }

    /// Writes the frame end marker and flushes the file.
    pub fn finish(self) -> io::Result<()> {
        let mut inner = self.encoder.finish().map_err(io::Error::other)?;
        inner.flush()
    }
}

impl std::fmt::Debug for ShardWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardWriter").field("path", &self.path).finish()
    }
}
