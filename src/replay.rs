//! Replay recording of observed messages.
//!
//! A [`Recorder`] sees every message the
//! [`PartitionTransport`](crate::PartitionTransport) observes, before any
//! fault is applied. [`FlowFileRecorder`] writes them as JSON lines to a
//! `.flow` file for post-mortem analysis.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use parking_lot::Mutex;
use serde::Serialize;

use crate::{
    error::{Error, Result},
    transport::Envelope,
};

/// Sink for observed messages.
#[auto_impl::auto_impl(Box, Arc)]
pub trait Recorder<M>: Send + Sync + 'static {
    /// Record one observed message.
    fn record(&self, envelope: &Envelope<M>);

    /// Flush and release the underlying storage.
    ///
    /// Closing twice is a no-op.
    fn close(&self) -> Result<()>;
}

/// Recorder that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRecorder;

impl<M> Recorder<M> for NoopRecorder {
    fn record(&self, _envelope: &Envelope<M>) {}

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Appends one JSON object per message to a file.
#[derive(Debug)]
pub struct FlowFileRecorder {
    path: PathBuf,
    writer: Mutex<Option<BufWriter<File>>>,
}

impl FlowFileRecorder {
    /// Create (or truncate) the flow file at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        tracing::debug!(path = %path.display(), "flow file opened");
        Ok(Self {
            path,
            writer: Mutex::new(Some(BufWriter::new(file))),
        })
    }

    /// Location of the flow file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<M: Serialize> Recorder<M> for FlowFileRecorder {
    fn record(&self, envelope: &Envelope<M>) {
        let mut writer = self.writer.lock();
        let Some(writer) = writer.as_mut() else {
            return;
        };
        let written = serde_json::to_writer(&mut *writer, envelope)
            .map_err(std::io::Error::from)
            .and_then(|_| writer.write_all(b"\n"));
        if let Err(e) = written {
            tracing::warn!(path = %self.path.display(), "failed to record message: {}", e);
        }
    }

    fn close(&self) -> Result<()> {
        let Some(mut writer) = self.writer.lock().take() else {
            return Ok(());
        };
        writer.flush().map_err(Error::RecorderClose)?;
        writer
            .into_inner()
            .map_err(|e| Error::RecorderClose(e.into_error()))?
            .sync_all()
            .map_err(Error::RecorderClose)?;
        tracing::debug!(path = %self.path.display(), "flow file closed");
        Ok(())
    }
}
