//! Sequential read benchmark: timed direct reads at evenly spaced offsets
//! across the device, one throughput sample per read.

use crate::models::sample::SampleSequence;
use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom};
use std::os::unix::fs::{FileExt, OpenOptionsExt};
use std::path::Path;
use std::time::Instant;

/// Direct I/O needs buffer, offset and length aligned to the logical block.
const ALIGN: usize = 4096;

#[derive(Debug, Clone, PartialEq)]
pub struct BenchOptions {
    pub samples:   usize,
    pub block_kib: usize,
    /// Open with O_DIRECT so the page cache does not inflate the numbers.
    pub direct:    bool,
}

impl Default for BenchOptions {
    fn default() -> Self {
        Self { samples: 100, block_kib: 1024, direct: true }
    }
}

#[derive(Debug, Clone)]
pub struct BenchRun {
    pub samples:     SampleSequence,
    /// Reads that failed; each one was recorded as a 0 B/s sample.
    pub read_errors: usize,
}

/// Byte offsets for `count` reads of `block` bytes spread over `size`,
/// aligned down to [`ALIGN`].
pub fn sample_offsets(size: u64, block: u64, count: usize) -> Vec<u64> {
    if count == 0 || size < block {
        return Vec::new();
    }
    let span = size - block;
    (0..count as u64)
        .map(|i| {
            let off = if count == 1 { 0 } else { span / (count as u64 - 1) * i };
            off - off % ALIGN as u64
        })
        .collect()
}

fn open(path: &Path, direct: bool) -> io::Result<File> {
    let mut opts = OpenOptions::new();
    opts.read(true);
    if direct {
        opts.custom_flags(libc::O_DIRECT);
    }
    opts.open(path)
}

/// Read `opts.samples` blocks from `path` and time each one.
pub fn run_benchmark(path: &Path, opts: &BenchOptions) -> io::Result<BenchRun> {
    let mut file = open(path, opts.direct)?;
    let size = file.seek(SeekFrom::End(0))?;
    let block = (opts.block_kib * 1024).max(ALIGN);
    let block = block - block % ALIGN;

    // Over-allocate and slice at the first aligned address.
    let mut backing = vec![0u8; block + ALIGN];
    let skip = backing.as_ptr().align_offset(ALIGN);
    let buf = &mut backing[skip..skip + block];

    let offsets = sample_offsets(size, block as u64, opts.samples);
    if offsets.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is smaller than one {} KiB block", path.display(), block / 1024),
        ));
    }
    tracing::info!(device = %path.display(), samples = offsets.len(), block, "benchmark starting");

    let mut samples = SampleSequence::new();
    let mut read_errors = 0;
    for off in offsets {
        let t0 = Instant::now();
        match file.read_exact_at(buf, off) {
            Ok(()) => {
                let secs = t0.elapsed().as_secs_f64().max(1e-9);
                samples.push(block as f64 / secs);
            }
            Err(e) => {
                tracing::warn!(device = %path.display(), offset = off, "read failed: {}", e);
                read_errors += 1;
                samples.push(0.0);
            }
        }
    }
    samples.finish();
    Ok(BenchRun { samples, read_errors })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn offsets_are_aligned_and_in_range() {
        let size = 10 * 1024 * 1024 + 123;
        let offs = sample_offsets(size, 1024 * 1024, 7);
        assert_eq!(offs.len(), 7);
        assert_eq!(offs[0], 0);
        assert!(offs.iter().all(|o| o % ALIGN as u64 == 0 && o + 1024 * 1024 <= size));
        assert!(offs.windows(2).all(|w| w[0] < w[1]));
        assert!(sample_offsets(100, 4096, 3).is_empty());
        assert_eq!(sample_offsets(8192, 4096, 1), vec![0]);
    }

    #[test]
    fn benchmarks_a_regular_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&vec![7u8; 2 * 1024 * 1024]).unwrap();
        f.flush().unwrap();
        let opts = BenchOptions { samples: 5, block_kib: 64, direct: false };
        let run = run_benchmark(f.path(), &opts).unwrap();
        assert_eq!(run.read_errors, 0);
        assert_eq!(run.samples.len(), 5);
        assert!(run.samples.is_finished());
        assert!(run.samples.as_slice().iter().all(|&s| s > 0.0));
    }

    #[test]
    fn tiny_file_is_rejected() {
        let f = tempfile::NamedTempFile::new().unwrap();
        let opts = BenchOptions { samples: 5, block_kib: 64, direct: false };
        assert!(run_benchmark(f.path(), &opts).is_err());
    }
}
