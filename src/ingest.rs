//! Consumer side of the record stream.
//!
//! The loop never polls: it sleeps until the input is readable, the repaint
//! tick fires while there is something new to paint, or a quit request
//! arrives. Reading zero bytes means the panel went away and ends the loop.

use std::future::Future;
use std::io;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::{self, MissedTickBehavior};

use crate::codec::{Command, Decoder, Frame};
use crate::history::HistoryBuffer;

const READ_CHUNK: usize = 8 * 1024;

/// Where the graph window is in its lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Initializing,
    Streaming,
    Terminated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    EndOfStream,
    QuitRequested,
}

/// Counts for one fed chunk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Fed {
    pub samples: usize,
    pub commands: usize,
    pub malformed: usize,
}

/// Something the ingestion loop can paint the history onto.
pub trait Surface {
    fn paint(&mut self, history: &HistoryBuffer) -> io::Result<()>;

    /// Repaints everything, not only what changed.
    fn present(&mut self, history: &HistoryBuffer) -> io::Result<()>;
}

pub struct Ingestor {
    phase: Phase,
    decoder: Decoder,
    history: HistoryBuffer,
    dirty: bool,
    present: bool,
}

impl Ingestor {
    pub fn new(capacity: usize) -> Self {
        Self {
            phase: Phase::Initializing,
            decoder: Decoder::new(),
            history: HistoryBuffer::new(capacity),
            dirty: false,
            present: false,
        }
    }

    /// Moves to streaming once the render surface exists.
    pub fn start(&mut self) {
        if self.phase == Phase::Initializing {
            self.phase = Phase::Streaming;
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Decodes a chunk, appending every complete sample to the history.
    pub fn feed(&mut self, chunk: &[u8]) -> Fed {
        let mut fed = Fed::default();
        if self.phase == Phase::Terminated {
            return fed;
        }

        for frame in self.decoder.feed(chunk) {
            match frame {
                Ok(Frame::Sample(sample)) => {
                    self.history.append(sample);
                    self.dirty = true;
                    fed.samples += 1;
                }
                Ok(Frame::Command(Command::Present)) => {
                    self.present = true;
                    self.dirty = true;
                    fed.commands += 1;
                }
                Err(e) => {
                    warn!("dropping record: {e}");
                    fed.malformed += 1;
                }
            }
        }
        fed
    }

    pub fn end_of_stream(&mut self) {
        if let Some(e) = self.decoder.finish() {
            warn!("dropping record: {e}");
        }
        self.phase = Phase::Terminated;
    }

    pub fn quit(&mut self) {
        self.phase = Phase::Terminated;
    }

    /// Paints pending changes, coalescing everything fed since the last call.
    pub fn repaint<S: Surface>(&mut self, surface: &mut S) -> io::Result<()> {
        if !self.dirty {
            return Ok(());
        }
        if std::mem::take(&mut self.present) {
            surface.present(&self.history)?;
        } else {
            surface.paint(&self.history)?;
        }
        self.dirty = false;
        Ok(())
    }
}

/// Runs the streaming phase until end-of-stream or `quit` resolves.
///
/// Paint errors end the loop with an error; record errors never do.
pub async fn stream<R, S, Q>(
    input: &mut R,
    ingestor: &mut Ingestor,
    surface: &mut S,
    quit: Q,
    frame: Duration,
) -> io::Result<StopReason>
where
    R: AsyncRead + Unpin,
    S: Surface,
    Q: Future<Output = ()>,
{
    ingestor.start();
    tokio::pin!(quit);

    let mut frames = time::interval(frame);
    frames.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut buf = vec![0u8; READ_CHUNK];

    let reason = loop {
        tokio::select! {
            biased;

            _ = &mut quit => {
                info!("quit requested");
                ingestor.quit();
                break StopReason::QuitRequested;
            }
            read = input.read(&mut buf) => match read {
                Ok(0) => {
                    info!("panel closed the stream");
                    ingestor.end_of_stream();
                    break StopReason::EndOfStream;
                }
                Ok(n) => {
                    let fed = ingestor.feed(&buf[..n]);
                    debug!("read {n} bytes: {fed:?}");
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!("stream read failed, treating as closed: {e}");
                    ingestor.end_of_stream();
                    break StopReason::EndOfStream;
                }
            },
            _ = frames.tick(), if ingestor.is_dirty() => {
                ingestor.repaint(surface)?;
            }
        }
    };

    // Whatever arrived with the final read still gets drawn.
    ingestor.repaint(surface)?;
    Ok(reason)
}
