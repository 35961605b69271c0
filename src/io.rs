//! Streaming wordlist line readers.
//!
//! Lines are yielded one at a time so wordlists never have to fit in memory.
//! Invalid UTF-8 bytes are skipped rather than rejected and a trailing `\r` is
//! dropped so CRLF files behave like LF files.
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use memmap2::Mmap;

/// Threshold in bytes above which we attempt to use mmap for reading.
/// Callers can override via API; this is a reasonable default.
pub const DEFAULT_MMAP_THRESHOLD_BYTES: u64 = 16 * 1024 * 1024; // 16 MiB

pub type LineIter = Box<dyn Iterator<Item = io::Result<String>> + Send + 'static>;

/// Decide whether to use mmap based on file size and threshold.
pub fn should_use_mmap(file_size_bytes: u64, threshold_bytes: u64) -> bool {
    file_size_bytes >= threshold_bytes
}

/// Iterate lines from a file path using a buffered reader (non-mmap).
pub fn iter_lines_bufread<P: AsRef<Path>>(path: P) -> Result<LineIter> {
    let file = File::open(&path).with_context(|| format!("open {}", path.as_ref().display()))?;
    Ok(Box::new(BufLines {
        reader: BufReader::new(file),
        buf: Vec::with_capacity(256),
    }))
}

struct BufLines {
    reader: BufReader<File>,
    buf: Vec<u8>,
}

impl Iterator for BufLines {
    type Item = io::Result<String>;
    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                let bytes = self.buf.strip_suffix(b"\n").unwrap_or(&self.buf);
                Some(Ok(line_from_bytes(bytes)))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

/// Iterate lines from a file path using mmap. This avoids copying but still
/// allocates per-returned String; it scans for '\n' boundaries.
pub fn iter_lines_mmap<P: AsRef<Path>>(path: P) -> Result<LineIter> {
    let file = File::open(&path).with_context(|| format!("open {}", path.as_ref().display()))?;
    let mmap =
        unsafe { Mmap::map(&file) }.with_context(|| format!("mmap {}", path.as_ref().display()))?;
    Ok(Box::new(MmapLines { mmap, pos: 0 }))
}

struct MmapLines {
    mmap: Mmap,
    pos: usize,
}

impl Iterator for MmapLines {
    type Item = io::Result<String>;
    fn next(&mut self) -> Option<Self::Item> {
        let data: &[u8] = &self.mmap;
        if self.pos >= data.len() {
            return None;
        }
        let start = self.pos;
        if let Some(off) = memchr::memchr(b'\n', &data[self.pos..]) {
            let end = self.pos + off;
            self.pos = end + 1;
            Some(Ok(line_from_bytes(&data[start..end])))
        } else {
            // Last line without trailing newline
            self.pos = data.len();
            Some(Ok(line_from_bytes(&data[start..])))
        }
    }
}

/// Invalid byte sequences are dropped, not replaced.
fn line_from_bytes(bytes: &[u8]) -> String {
    let slice = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    let mut line = String::with_capacity(slice.len());
    for chunk in slice.utf8_chunks() {
        line.push_str(chunk.valid());
    }
    line
}

/// Choose mmap or bufread and return an iterator over lines.
pub fn iter_lines_auto<P: AsRef<Path>>(path: P, threshold_bytes: u64) -> Result<LineIter> {
    let meta =
        std::fs::metadata(&path).with_context(|| format!("stat {}", path.as_ref().display()))?;
    if meta.is_file() && should_use_mmap(meta.len(), threshold_bytes) {
        iter_lines_mmap(path)
    } else {
        iter_lines_bufread(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn fixture(bytes: &[u8]) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(bytes).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn bufread_and_mmap_agree() {
        let f = fixture(b"alpha\r\nbeta\n\ngamma");
        let a: Vec<String> = iter_lines_bufread(f.path())
            .unwrap()
            .map(|l| l.unwrap())
            .collect();
        let b: Vec<String> = iter_lines_mmap(f.path())
            .unwrap()
            .map(|l| l.unwrap())
            .collect();
        assert_eq!(a, vec!["alpha", "beta", "", "gamma"]);
        assert_eq!(a, b);
    }

    #[test]
    fn invalid_utf8_bytes_are_dropped() {
        let f = fixture(b"ok\n\xffpass\xfeword\nfine\xc3\n\xe2\x82\xac\n");
        for threshold in [0, DEFAULT_MMAP_THRESHOLD_BYTES] {
            let lines: Vec<String> = iter_lines_auto(f.path(), threshold)
                .unwrap()
                .map(|l| l.unwrap())
                .collect();
            assert_eq!(lines, vec!["ok", "password", "fine", "\u{20ac}"]);
        }
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(iter_lines_auto("/definitely/not/here.txt", DEFAULT_MMAP_THRESHOLD_BYTES).is_err());
    }
}
