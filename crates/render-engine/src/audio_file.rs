//! Raw PCM side file captured during a video export.
//!
//! Samples arrive one video frame at a time and are appended as interleaved
//! little-endian `f32`, which the mux pass reads with `-f f32le`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use frameport_common::{FrameportError, FrameportResult};
use tempfile::TempPath;

/// Writer for the scratch PCM file. The file is deleted when the finished
/// [`PcmFile`] (or this writer, if never finished) is dropped.
pub struct PcmSideFile {
    writer: BufWriter<File>,
    path: TempPath,
    samples_written: u64,
}

/// A flushed and closed PCM side file.
#[derive(Debug)]
pub struct PcmFile {
    path: TempPath,
    bytes: u64,
}

impl PcmSideFile {
    /// Create a side file with a fresh random name in the system temp dir.
    pub fn create() -> FrameportResult<Self> {
        let file = tempfile::Builder::new()
            .prefix("frameport-audio-")
            .suffix(".pcm")
            .tempfile()
            .map_err(|e| FrameportError::render(format!("Failed to create audio side file: {e}")))?;
        let (file, path) = file.into_parts();
        tracing::debug!(path = %path.display(), "Created audio side file");
        Ok(Self {
            writer: BufWriter::new(file),
            path,
            samples_written: 0,
        })
    }

    /// Append one chunk of interleaved samples.
    pub fn write_chunk(&mut self, samples: &[f32]) -> FrameportResult<()> {
        for sample in samples {
            self.writer.write_all(&sample.to_le_bytes())?;
        }
        self.samples_written += samples.len() as u64;
        Ok(())
    }

    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and close the file.
    pub fn finish(self) -> FrameportResult<PcmFile> {
        let file = self
            .writer
            .into_inner()
            .map_err(|e| FrameportError::Io(e.into_error()))?;
        file.sync_all()?;
        drop(file);
        Ok(PcmFile {
            path: self.path,
            bytes: self.samples_written * 4,
        })
    }
}

impl PcmFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len_bytes(&self) -> u64 {
        self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunks_are_little_endian_f32() {
        let mut side = PcmSideFile::create().unwrap();
        side.write_chunk(&[0.5, -1.0]).unwrap();
        side.write_chunk(&[0.25]).unwrap();
        assert_eq!(side.samples_written(), 3);

        let finished = side.finish().unwrap();
        assert_eq!(finished.len_bytes(), 12);
        let bytes = std::fs::read(finished.path()).unwrap();
        let samples: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        assert_eq!(samples, vec![0.5, -1.0, 0.25]);
    }

    #[test]
    fn test_file_removed_on_drop() {
        let side = PcmSideFile::create().unwrap();
        let path = side.path().to_path_buf();
        let finished = side.finish().unwrap();
        assert!(finished.is_empty());
        assert!(path.exists());
        drop(finished);
        assert!(!path.exists());
    }

    #[test]
    fn test_fresh_names_per_file() {
        let a = PcmSideFile::create().unwrap();
        let b = PcmSideFile::create().unwrap();
        assert_ne!(a.path(), b.path());
    }
}
