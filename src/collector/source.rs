//! Frame sources.
//!
//! Camera drivers are outside this crate; anything that can hand out JPEG
//! frames in time order implements [`FrameSource`].

use crate::collector::types::{Frame, MonotonicClock};
use std::path::{Path, PathBuf};

/// Produces frames in capture order.
pub trait FrameSource: Send {
    /// Next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>, CollectorError>;
}

/// Errors that can occur during frame collection.
#[derive(Debug)]
pub enum CollectorError {
    AlreadyRunning,
    /// The source directory holds no JPEG files
    NoFrames(PathBuf),
    Io(String),
}

impl std::fmt::Display for CollectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectorError::AlreadyRunning => write!(f, "Collector is already running"),
            CollectorError::NoFrames(dir) => write!(f, "No JPEG frames found in {dir:?}"),
            CollectorError::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for CollectorError {}

/// Replays the JPEG files of a directory, in file name order.
///
/// Each frame is stamped with the instant it is read, so a replay looks
/// like a live camera to the rest of the pipeline.
pub struct DirectorySource {
    files: Vec<PathBuf>,
    index: usize,
    looping: bool,
    sequence: u64,
    clock: MonotonicClock,
}

impl DirectorySource {
    /// Scan `dir` for `.jpg`/`.jpeg` files.
    pub fn open(dir: impl AsRef<Path>, looping: bool) -> Result<Self, CollectorError> {
        let dir = dir.as_ref();
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(|e| CollectorError::Io(format!("{dir:?}: {e}")))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| is_jpeg_path(p))
            .collect();

        if files.is_empty() {
            return Err(CollectorError::NoFrames(dir.to_path_buf()));
        }
        files.sort();

        Ok(Self {
            files,
            index: 0,
            looping,
            sequence: 0,
            clock: MonotonicClock::new(),
        })
    }

    /// Number of distinct files being replayed.
    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

impl FrameSource for DirectorySource {
    fn next_frame(&mut self) -> Result<Option<Frame>, CollectorError> {
        if self.index >= self.files.len() {
            if !self.looping {
                return Ok(None);
            }
            self.index = 0;
        }

        let path = &self.files[self.index];
        let jpeg = std::fs::read(path).map_err(|e| CollectorError::Io(format!("{path:?}: {e}")))?;
        self.index += 1;

        let frame = Frame::new(self.sequence, self.clock.now(), jpeg);
        self.sequence += 1;
        Ok(Some(frame))
    }
}

fn is_jpeg_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"))
        .unwrap_or(false)
}

/// A source that never produces frames.
#[derive(Debug, Default)]
pub struct NoopSource;

impl FrameSource for NoopSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, CollectorError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_dir(names: &[&str]) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("wildwatch-frames-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        for (i, name) in names.iter().enumerate() {
            std::fs::write(dir.join(name), [0xFF, 0xD8, i as u8]).unwrap();
        }
        dir
    }

    #[test]
    fn test_directory_source_order_and_end() {
        let dir = frame_dir(&["b.jpg", "a.JPEG", "notes.txt"]);
        let mut source = DirectorySource::open(&dir, false).unwrap();
        assert_eq!(source.file_count(), 2);

        let first = source.next_frame().unwrap().unwrap();
        let second = source.next_frame().unwrap().unwrap();
        assert_eq!(first.sequence, 0);
        assert_eq!(second.sequence, 1);
        // a.JPEG sorts before b.jpg
        assert_eq!(first.jpeg[2], 1);
        assert!(first.timestamp < second.timestamp);
        assert!(source.next_frame().unwrap().is_none());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_directory_source_loops() {
        let dir = frame_dir(&["only.jpg"]);
        let mut source = DirectorySource::open(&dir, true).unwrap();
        for expected in 0..3 {
            let frame = source.next_frame().unwrap().unwrap();
            assert_eq!(frame.sequence, expected);
        }

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_empty_directory_rejected() {
        let dir = frame_dir(&[]);
        assert!(matches!(
            DirectorySource::open(&dir, false),
            Err(CollectorError::NoFrames(_))
        ));

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_noop_source() {
        assert!(NoopSource.next_frame().unwrap().is_none());
    }
}
