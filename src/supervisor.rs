//! Producer side of the graph connection.
//!
//! The supervisor owns at most one graph process and the write end of its
//! stdin. Records are handed to a writer task without waiting, so the
//! sampling timer never stalls on a slow or dead consumer. The writer task
//! and the exit watcher report back through [`LinkEvent`]s, which the owning
//! loop feeds into [`Supervisor::handle_event`].
//!
//! A closed graph is remembered until it exits, so [`Supervisor::kill`] can
//! still reach one that stopped reading.

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;

use log::{debug, error, info, warn};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::codec::{encode_command, encode_sample, Command};
use crate::config::StartupParams;
use crate::history::HistoryBuffer;
use crate::models::Sample;

/// Live records that may queue up behind the backfill before new ones are dropped.
pub const LIVE_QUEUE: usize = 256;

pub type RecordWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Resolves with the consumer's exit code once it terminates (`None` when
/// it was killed by a signal).
pub type ExitFuture = Pin<Box<dyn Future<Output = io::Result<Option<i32>>> + Send>>;

pub struct Launched {
    pub input: RecordWriter,
    pub exit: ExitFuture,
}

/// Starts a consumer and hands back its input stream and exit notification.
pub trait Launcher {
    fn launch(&mut self, params: &StartupParams) -> io::Result<Launched>;
}

/// Runs `<program> graph <startup params>` with a piped stdin.
pub struct ProcessLauncher {
    program: PathBuf,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Launches graphs from the running executable.
    pub fn current_exe() -> io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }
}

impl Launcher for ProcessLauncher {
    fn launch(&mut self, params: &StartupParams) -> io::Result<Launched> {
        let mut child = tokio::process::Command::new(&self.program)
            .arg("graph")
            .args(params.to_args())
            .stdin(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let input = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "graph stdin is not piped"))?;
        debug!("graph started with pid {:?}", child.id());

        let exit = Box::pin(async move { child.wait().await.map(|status| status.code()) });
        Ok(Launched {
            input: Box::new(input),
            exit,
        })
    }
}

#[derive(Debug, Error)]
#[error("cannot launch graph window: {0}")]
pub struct SpawnError(#[from] io::Error);

#[derive(Debug)]
pub enum LinkEvent {
    WriteFailed { id: u64, error: io::Error },
    Exited {
        id: u64,
        status: io::Result<Option<i32>>,
    },
}

#[derive(Debug, PartialEq, Eq)]
pub enum Opened {
    Spawned { replayed: usize },
    AlreadyOpen,
}

struct Link {
    id: u64,
    records: mpsc::Sender<String>,
    writer: JoinHandle<()>,
    kill: oneshot::Sender<()>,
}

/// A graph whose input was closed but which has not exited yet.
struct Closing {
    id: u64,
    writer: JoinHandle<()>,
    kill: oneshot::Sender<()>,
}

impl Closing {
    fn kill(self) {
        self.writer.abort();
        if self.kill.send(()).is_ok() {
            warn!("killing graph {}", self.id);
        }
    }
}

pub struct Supervisor<L> {
    launcher: L,
    link: Option<Link>,
    closing: Vec<Closing>,
    next_id: u64,
    events: mpsc::UnboundedSender<LinkEvent>,
}

impl<L: Launcher> Supervisor<L> {
    pub fn new(launcher: L) -> (Self, mpsc::UnboundedReceiver<LinkEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let supervisor = Self {
            launcher,
            link: None,
            closing: Vec::new(),
            next_id: 1,
            events,
        };
        (supervisor, rx)
    }

    pub fn is_live(&self) -> bool {
        self.link.is_some()
    }

    /// Launches the graph and replays recent history to it.
    ///
    /// With a graph already open no second process is started; the open
    /// one is asked to present itself instead.
    pub fn open(&mut self, params: &StartupParams, history: &HistoryBuffer) -> Result<Opened, SpawnError> {
        if let Some(link) = &self.link {
            if !link.records.is_closed() {
                self.send_command(Command::Present);
                return Ok(Opened::AlreadyOpen);
            }
            self.teardown();
        }

        let launched = self.launcher.launch(params).inspect_err(|e| {
            error!("cannot launch graph window: {e}");
        })?;

        let id = self.next_id;
        self.next_id += 1;

        let backlog = params.backlog();
        let (records, rx) = mpsc::channel(backlog.saturating_add(LIVE_QUEUE));
        let (kill, kill_rx) = oneshot::channel();
        let writer = tokio::spawn(write_records(id, launched.input, rx, self.events.clone()));
        tokio::spawn(watch_exit(id, launched.exit, kill_rx, self.events.clone()));

        let mut replayed = 0;
        for sample in history.snapshot(backlog) {
            let line = match encode_sample(sample) {
                Ok(line) => line,
                Err(e) => {
                    warn!("skipping sample {} in backfill: {e}", sample.ts);
                    continue;
                }
            };
            if records.try_send(line).is_err() {
                break;
            }
            replayed += 1;
        }

        info!("graph {id} opened, replayed {replayed} samples");
        self.link = Some(Link {
            id,
            records,
            writer,
            kill,
        });
        Ok(Opened::Spawned { replayed })
    }

    /// Streams one sample to the graph, if one is open.
    pub fn publish(&mut self, sample: &Sample) {
        if self.link.is_none() {
            return;
        }
        match encode_sample(sample) {
            Ok(line) => self.send(line),
            Err(e) => warn!("not streaming sample {}: {e}", sample.ts),
        }
    }

    /// Closes the graph's stdin; the graph exits once it has drained it.
    ///
    /// Closing again while a closed graph is still running kills it.
    pub fn close(&mut self) {
        match self.link.take() {
            Some(link) => {
                info!("closing graph {}", link.id);
                self.closing.push(Closing {
                    id: link.id,
                    writer: link.writer,
                    kill: link.kill,
                });
            }
            None => self.kill(),
        }
    }

    /// Kills every graph that was closed but has not exited.
    pub fn kill(&mut self) {
        for closing in self.closing.drain(..) {
            closing.kill();
        }
    }

    pub fn handle_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::WriteFailed { id, error } => {
                if self.is_current(id) {
                    debug!("graph {id} pipe failed: {error}");
                    self.teardown();
                }
            }
            LinkEvent::Exited { id, status } => {
                match status {
                    Ok(Some(0)) => info!("graph {id} exited"),
                    Ok(Some(code)) => warn!("graph {id} exited abnormally with status {code}"),
                    Ok(None) => warn!("graph {id} was terminated by a signal"),
                    Err(e) => warn!("lost track of graph {id}: {e}"),
                }
                if self.is_current(id) {
                    self.teardown();
                }
                self.closing.retain(|closing| closing.id != id);
            }
        }
    }

    fn is_current(&self, id: u64) -> bool {
        self.link.as_ref().is_some_and(|link| link.id == id)
    }

    fn send_command(&mut self, command: Command) {
        match encode_command(command) {
            Ok(line) => self.send(line),
            Err(e) => warn!("cannot encode {command:?}: {e}"),
        }
    }

    fn send(&mut self, line: String) {
        let Some(link) = &self.link else {
            return;
        };
        match link.records.try_send(line) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!("graph {} is not keeping up, dropping record", link.id),
            Err(TrySendError::Closed(_)) => {
                debug!("graph {} pipe is closed", link.id);
                self.teardown();
            }
        }
    }

    fn teardown(&mut self) {
        if let Some(link) = self.link.take() {
            link.writer.abort();
            debug!("graph {} disconnected", link.id);
        }
    }
}

async fn write_records(
    id: u64,
    mut input: RecordWriter,
    mut records: mpsc::Receiver<String>,
    events: mpsc::UnboundedSender<LinkEvent>,
) {
    while let Some(line) = records.recv().await {
        if let Err(error) = write_record(&mut input, &line).await {
            let _ = events.send(LinkEvent::WriteFailed { id, error });
            return;
        }
    }
    if let Err(e) = input.shutdown().await {
        debug!("graph {id} stdin shutdown: {e}");
    }
}

async fn write_record(input: &mut RecordWriter, line: &str) -> io::Result<()> {
    input.write_all(line.as_bytes()).await?;
    input.flush().await
}

async fn watch_exit(
    id: u64,
    exit: ExitFuture,
    kill: oneshot::Receiver<()>,
    events: mpsc::UnboundedSender<LinkEvent>,
) {
    // Dropping the exit future drops the child, which kills it.
    let status = tokio::select! {
        status = exit => status,
        Ok(()) = kill => Ok(None),
    };
    let _ = events.send(LinkEvent::Exited { id, status });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Decoder, Frame};
    use crate::config::PanelConfig;
    use crate::placement::{Anchor, Side};
    use tokio::io::{AsyncReadExt, DuplexStream};

    struct Consumer {
        reader: DuplexStream,
        exit: oneshot::Sender<io::Result<Option<i32>>>,
    }

    struct FakeLauncher {
        consumers: mpsc::UnboundedSender<Consumer>,
        pipe_size: usize,
        failures: usize,
        launches: usize,
    }

    impl FakeLauncher {
        fn new(pipe_size: usize) -> (Self, mpsc::UnboundedReceiver<Consumer>) {
            let (consumers, rx) = mpsc::unbounded_channel();
            let launcher = Self {
                consumers,
                pipe_size,
                failures: 0,
                launches: 0,
            };
            (launcher, rx)
        }
    }

    impl Launcher for FakeLauncher {
        fn launch(&mut self, _params: &StartupParams) -> io::Result<Launched> {
            if self.failures > 0 {
                self.failures -= 1;
                return Err(io::Error::new(io::ErrorKind::NotFound, "no such graph"));
            }
            self.launches += 1;
            let (writer, reader) = tokio::io::duplex(self.pipe_size);
            let (exit, exit_rx) = oneshot::channel();
            let _ = self.consumers.send(Consumer { reader, exit });
            Ok(Launched {
                input: Box::new(writer),
                exit: Box::pin(async move { exit_rx.await.unwrap_or(Ok(None)) }),
            })
        }
    }

    fn sample(n: usize) -> Sample {
        Sample {
            ts: format!("2026/10/18_12:00:{n:02}.000"),
            utilization: n as f64,
            memory_used: 1024.0,
            memory_total: 4096.0,
            temperature: 40.0 + n as f64,
            fan: 30.0,
        }
    }

    fn params(backlog: usize) -> StartupParams {
        let mut params = PanelConfig::default().startup_params(Anchor::default(), Side::Bottom, None);
        params.history = Some(backlog);
        params
    }

    async fn read_frames(mut reader: DuplexStream) -> Vec<Frame> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).await.unwrap();
        Decoder::new()
            .feed(&bytes)
            .into_iter()
            .map(|f| f.unwrap())
            .collect()
    }

    #[tokio::test]
    async fn backfill_then_live_records_arrive_without_gaps() {
        let (launcher, mut consumers) = FakeLauncher::new(64 * 1024);
        let (mut supervisor, _events) = Supervisor::new(launcher);
        let mut history = HistoryBuffer::new(100);
        for n in 0..10 {
            history.append(sample(n));
        }

        let opened = supervisor.open(&params(4), &history).unwrap();
        assert_eq!(opened, Opened::Spawned { replayed: 4 });

        for n in 10..13 {
            let s = sample(n);
            history.append(s.clone());
            supervisor.publish(&s);
        }
        supervisor.close();
        assert!(!supervisor.is_live());

        let consumer = consumers.recv().await.unwrap();
        let frames = read_frames(consumer.reader).await;
        let expected: Vec<Frame> = (6..13).map(|n| Frame::Sample(sample(n))).collect();
        assert_eq!(frames, expected);
    }

    #[tokio::test]
    async fn second_open_presents_instead_of_spawning() {
        let (launcher, mut consumers) = FakeLauncher::new(64 * 1024);
        let (mut supervisor, _events) = Supervisor::new(launcher);
        let history = HistoryBuffer::new(10);

        assert_eq!(
            supervisor.open(&params(10), &history).unwrap(),
            Opened::Spawned { replayed: 0 }
        );
        assert_eq!(supervisor.open(&params(10), &history).unwrap(), Opened::AlreadyOpen);
        assert_eq!(supervisor.launcher.launches, 1);

        supervisor.close();
        let consumer = consumers.recv().await.unwrap();
        assert_eq!(
            read_frames(consumer.reader).await,
            vec![Frame::Command(Command::Present)]
        );
        assert!(consumers.try_recv().is_err());
    }

    #[tokio::test]
    async fn broken_pipe_tears_the_connection_down() {
        let (launcher, mut consumers) = FakeLauncher::new(64 * 1024);
        let (mut supervisor, mut events) = Supervisor::new(launcher);
        let history = HistoryBuffer::new(10);
        supervisor.open(&params(10), &history).unwrap();

        let consumer = consumers.recv().await.unwrap();
        drop(consumer.reader);
        supervisor.publish(&sample(1));

        let event = events.recv().await.unwrap();
        assert!(matches!(event, LinkEvent::WriteFailed { id: 1, .. }));
        supervisor.handle_event(event);
        assert!(!supervisor.is_live());

        // Nobody listening is not an error.
        supervisor.publish(&sample(2));
        supervisor.close();

        // A later open starts a fresh consumer.
        assert!(matches!(
            supervisor.open(&params(10), &history),
            Ok(Opened::Spawned { .. })
        ));
        assert_eq!(supervisor.launcher.launches, 2);
    }

    #[tokio::test]
    async fn exit_watcher_marks_connection_dead() {
        let (launcher, mut consumers) = FakeLauncher::new(64 * 1024);
        let (mut supervisor, mut events) = Supervisor::new(launcher);
        supervisor.open(&params(10), &HistoryBuffer::new(1)).unwrap();

        let consumer = consumers.recv().await.unwrap();
        consumer.exit.send(Ok(Some(3))).unwrap();

        let event = events.recv().await.unwrap();
        assert!(matches!(
            event,
            LinkEvent::Exited {
                id: 1,
                status: Ok(Some(3))
            }
        ));
        supervisor.handle_event(event);
        assert!(!supervisor.is_live());

        // A duplicate or stale notification is harmless.
        supervisor.handle_event(LinkEvent::Exited {
            id: 1,
            status: Ok(Some(0)),
        });
        supervisor.close();
        supervisor.close();
        assert!(!supervisor.is_live());
    }

    #[tokio::test]
    async fn stale_exit_does_not_touch_newer_connection() {
        let (launcher, mut consumers) = FakeLauncher::new(64 * 1024);
        let (mut supervisor, _events) = Supervisor::new(launcher);
        let history = HistoryBuffer::new(1);

        supervisor.open(&params(10), &history).unwrap();
        supervisor.close();
        supervisor.open(&params(10), &history).unwrap();

        supervisor.handle_event(LinkEvent::Exited {
            id: 1,
            status: Ok(Some(0)),
        });
        assert!(supervisor.is_live());
        assert!(consumers.try_recv().is_ok());
    }

    #[tokio::test]
    async fn spawn_failure_leaves_no_connection_and_allows_retry() {
        let (mut launcher, _consumers) = FakeLauncher::new(1024);
        launcher.failures = 1;
        let (mut supervisor, _events) = Supervisor::new(launcher);
        let history = HistoryBuffer::new(1);

        assert!(supervisor.open(&params(10), &history).is_err());
        assert!(!supervisor.is_live());
        supervisor.publish(&sample(0));

        assert!(supervisor.open(&params(10), &history).is_ok());
        assert!(supervisor.is_live());
    }

    #[tokio::test]
    async fn reopen_after_writer_failed_spawns_before_event_is_handled() {
        let (launcher, mut consumers) = FakeLauncher::new(64 * 1024);
        let (mut supervisor, mut events) = Supervisor::new(launcher);
        let history = HistoryBuffer::new(10);
        supervisor.open(&params(10), &history).unwrap();

        drop(consumers.recv().await.unwrap().reader);
        supervisor.publish(&sample(1));
        let failed = events.recv().await.unwrap();
        assert!(matches!(failed, LinkEvent::WriteFailed { id: 1, .. }));

        // The queue is closed but the failure has not been handled yet.
        assert!(supervisor.is_live());
        assert_eq!(
            supervisor.open(&params(10), &history).unwrap(),
            Opened::Spawned { replayed: 0 }
        );
        assert_eq!(supervisor.launcher.launches, 2);

        supervisor.handle_event(failed);
        assert!(supervisor.is_live());
    }

    #[tokio::test]
    async fn closing_twice_kills_a_graph_that_stopped_reading() {
        let (launcher, mut consumers) = FakeLauncher::new(64);
        let (mut supervisor, mut events) = Supervisor::new(launcher);
        supervisor.open(&params(2), &HistoryBuffer::new(1)).unwrap();
        let consumer = consumers.recv().await.unwrap();

        for n in 0..20 {
            supervisor.publish(&sample(n));
        }
        tokio::task::yield_now().await;
        supervisor.close();
        assert!(!supervisor.is_live());
        assert!(!consumer.exit.is_closed());

        supervisor.close();
        let event = events.recv().await.unwrap();
        assert!(matches!(
            event,
            LinkEvent::Exited {
                id: 1,
                status: Ok(None)
            }
        ));
        assert!(consumer.exit.is_closed());
        supervisor.handle_event(event);
    }

    #[tokio::test]
    async fn open_survives_an_unbounded_backlog() {
        let (launcher, _consumers) = FakeLauncher::new(1024);
        let (mut supervisor, _events) = Supervisor::new(launcher);
        let mut history = HistoryBuffer::new(10);
        history.append(sample(0));

        let mut huge = params(10);
        huge.history = None;
        huge.xlength = 1e30;
        assert_eq!(
            supervisor.open(&huge, &history).unwrap(),
            Opened::Spawned { replayed: 1 }
        );
    }

    #[tokio::test]
    async fn stalled_consumer_never_blocks_publish() {
        let (launcher, _consumers) = FakeLauncher::new(64);
        let (mut supervisor, _events) = Supervisor::new(launcher);
        supervisor.open(&params(2), &HistoryBuffer::new(1)).unwrap();

        for n in 0..(LIVE_QUEUE * 4) {
            supervisor.publish(&sample(n % 60));
        }
        assert!(supervisor.is_live());
    }
}
