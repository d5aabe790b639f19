//! Footage recording for open detection intervals.
//!
//! A [`VideoSink`] receives every frame captured while an interval is open.
//! The bundled [`MjpegFileSink`] appends the raw JPEG frames to one motion
//! JPEG file per interval.

use crate::collector::Frame;
use crate::core::tracker::DetectionInterval;
use chrono_tz::Tz;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Receives the frames of one interval at a time.
pub trait VideoSink: Send {
    /// Start a clip for a newly opened interval; returns its reference.
    fn begin(&mut self, interval: &DetectionInterval) -> Result<String, SinkError>;

    /// Append a frame to the current clip.
    fn write_frame(&mut self, frame: &Frame) -> Result<(), SinkError>;

    /// Close the current clip, returning its reference if one was open.
    fn finish(&mut self) -> Result<Option<String>, SinkError>;
}

/// Video sink errors.
#[derive(Debug)]
pub enum SinkError {
    Io(String),
    /// `write_frame` without a preceding `begin`
    NotRecording,
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::Io(e) => write!(f, "Footage IO error: {e}"),
            SinkError::NotRecording => write!(f, "No clip is being recorded"),
        }
    }
}

impl std::error::Error for SinkError {}

struct OpenClip {
    path: PathBuf,
    writer: BufWriter<File>,
}

/// Writes `footage_<date>_<HH-MM-SS>.mjpeg` files into a directory.
pub struct MjpegFileSink {
    dir: PathBuf,
    tz: Tz,
    current: Option<OpenClip>,
}

impl MjpegFileSink {
    pub fn new(dir: impl Into<PathBuf>, tz: Tz) -> Self {
        Self {
            dir: dir.into(),
            tz,
            current: None,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_recording(&self) -> bool {
        self.current.is_some()
    }

    /// File name for an interval's clip.
    pub fn file_name(&self, interval: &DetectionInterval) -> String {
        let local = interval.open_time.with_timezone(&self.tz);
        format!(
            "footage_{}_{}.mjpeg",
            local.format("%Y-%m-%d"),
            local.format("%H-%M-%S")
        )
    }
}

impl VideoSink for MjpegFileSink {
    fn begin(&mut self, interval: &DetectionInterval) -> Result<String, SinkError> {
        if let Some(previous) = self.finish()? {
            tracing::warn!("Clip {previous} was still open when a new interval started");
        }

        std::fs::create_dir_all(&self.dir).map_err(|e| SinkError::Io(e.to_string()))?;

        let mut path = self.dir.join(self.file_name(interval));
        if path.exists() {
            // Two intervals opened within the same second.
            let short_id: String = interval.id.simple().to_string().chars().take(8).collect();
            path.set_file_name(format!(
                "{}_{short_id}.mjpeg",
                self.file_name(interval).trim_end_matches(".mjpeg")
            ));
        }

        let file = File::create(&path).map_err(|e| SinkError::Io(format!("{path:?}: {e}")))?;
        let reference = path.to_string_lossy().to_string();
        tracing::info!("Started saving footage to {reference}");

        self.current = Some(OpenClip {
            path,
            writer: BufWriter::new(file),
        });
        Ok(reference)
    }

    fn write_frame(&mut self, frame: &Frame) -> Result<(), SinkError> {
        let clip = self.current.as_mut().ok_or(SinkError::NotRecording)?;
        clip.writer
            .write_all(&frame.jpeg)
            .map_err(|e| SinkError::Io(e.to_string()))
    }

    fn finish(&mut self) -> Result<Option<String>, SinkError> {
        match self.current.take() {
            Some(mut clip) => {
                clip.writer
                    .flush()
                    .map_err(|e| SinkError::Io(e.to_string()))?;
                let reference = clip.path.to_string_lossy().to_string();
                tracing::info!("Finished saving footage: {reference}");
                Ok(Some(reference))
            }
            None => Ok(None),
        }
    }
}

impl Drop for MjpegFileSink {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            tracing::warn!("Could not finalize footage on drop: {e}");
        }
    }
}
