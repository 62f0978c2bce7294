use std::io;

use chrono::{Local, TimeZone};
use gpu_graph::chart::{self, Margins, PlotArea, Series};
use gpu_graph::config::{PanelConfig, StartupParams};
use gpu_graph::history::HistoryBuffer;
use gpu_graph::ingest::{self, Ingestor, StopReason, Surface};
use gpu_graph::nvidia::parse_reading;
use gpu_graph::placement::{Anchor, Side};
use gpu_graph::supervisor::{Launched, Launcher, Opened, Supervisor};
use tokio::io::{AsyncReadExt, DuplexStream};
use tokio::sync::mpsc;

/// Launches "graph windows" that are just the read end of an in-memory pipe.
struct InMemory {
    pipes: mpsc::UnboundedSender<DuplexStream>,
}

impl Launcher for InMemory {
    fn launch(&mut self, _params: &StartupParams) -> io::Result<Launched> {
        let (writer, reader) = tokio::io::duplex(64 * 1024);
        self.pipes
            .send(reader)
            .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))?;
        Ok(Launched {
            input: Box::new(writer),
            exit: Box::pin(std::future::pending::<io::Result<Option<i32>>>()),
        })
    }
}

#[derive(Default)]
struct Snapshot {
    history: Vec<gpu_graph::models::Sample>,
}

impl Surface for Snapshot {
    fn paint(&mut self, history: &HistoryBuffer) -> io::Result<()> {
        self.history = history.iter().cloned().collect();
        Ok(())
    }

    fn present(&mut self, history: &HistoryBuffer) -> io::Result<()> {
        self.paint(history)
    }
}

fn params(backlog: usize) -> StartupParams {
    let mut params = PanelConfig::default().startup_params(Anchor::default(), Side::Bottom, None);
    params.history = Some(backlog);
    params
}

#[tokio::test]
async fn one_reading_travels_from_source_to_plot() {
    let reading = parse_reading("45, 2048, 8192, 30, 55").unwrap();
    assert_eq!(
        (
            reading.temperature,
            reading.memory_used,
            reading.memory_total,
            reading.utilization,
            reading.fan
        ),
        (45.0, 2048.0, 8192.0, 30.0, 55.0)
    );

    let now = Local.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap();
    let sample = reading.into_sample(now);
    assert_eq!(sample.memory_percent(), 25.0);
    assert_eq!(sample.ts, "2026/10/18_12:00:00.000");

    let (pipes, mut readers) = mpsc::unbounded_channel();
    let (mut supervisor, _events) = Supervisor::new(InMemory { pipes });
    let opened = supervisor.open(&params(10), &HistoryBuffer::new(10)).unwrap();
    assert_eq!(opened, Opened::Spawned { replayed: 0 });

    supervisor.publish(&sample);
    supervisor.close();

    let mut reader = readers.recv().await.unwrap();
    let mut wire = String::new();
    reader.read_to_string(&mut wire).await.unwrap();
    assert_eq!(wire.matches('\n').count(), 1);
    for field in [r#""gpu":30.0"#, r#""mem":25.0"#, r#""temp":45.0"#, r#""fan":55.0"#] {
        assert!(wire.contains(field), "{field} missing from {wire}");
    }

    let mut ingestor = Ingestor::new(10);
    ingestor.start();
    let fed = ingestor.feed(wire.as_bytes());
    assert_eq!(fed.samples, 1);
    assert_eq!(ingestor.history().latest(), Some(&sample));

    let area = PlotArea {
        width: 600.0,
        height: 350.0,
        margins: Margins {
            left: 40.0,
            right: 30.0,
            top: 10.0,
            bottom: 20.0,
        },
    };
    let points = chart::map_series(ingestor.history().iter(), Series::Gpu, &area, 120);
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].x, area.width - area.margins.right);
}

#[tokio::test]
async fn graph_receives_backfill_then_live_samples() {
    let mut history = HistoryBuffer::new(1000);
    let base = Local.with_ymd_and_hms(2026, 10, 18, 8, 0, 0).unwrap();
    for n in 0..300 {
        let line = format!("{}, 1000, 4000, {}, 20", 40 + n % 30, n % 100);
        let at = base + chrono::Duration::seconds(n);
        history.append(parse_reading(&line).unwrap().into_sample(at));
    }

    let (pipes, mut readers) = mpsc::unbounded_channel();
    let (mut supervisor, _events) = Supervisor::new(InMemory { pipes });
    let backlog = 120;
    assert_eq!(
        supervisor.open(&params(backlog), &history).unwrap(),
        Opened::Spawned { replayed: backlog }
    );

    let live: Vec<_> = (300..305)
        .map(|n| {
            let at = base + chrono::Duration::seconds(n);
            parse_reading("50, 1000, 4000, 10, 20").unwrap().into_sample(at)
        })
        .collect();
    for sample in &live {
        history.append(sample.clone());
        supervisor.publish(sample);
    }
    supervisor.close();

    let mut reader = readers.recv().await.unwrap();
    let mut ingestor = Ingestor::new(params(backlog).backlog());
    let mut surface = Snapshot::default();
    let stopped = ingest::stream(
        &mut reader,
        &mut ingestor,
        &mut surface,
        std::future::pending(),
        std::time::Duration::from_millis(5),
    )
    .await
    .unwrap();
    assert_eq!(stopped, StopReason::EndOfStream);

    // The graph keeps exactly the producer's most recent window.
    let expected: Vec<_> = history.snapshot(backlog).cloned().collect();
    assert_eq!(surface.history, expected);
    assert_eq!(surface.history.last(), live.last());
}
