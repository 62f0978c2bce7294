//! The graph process: a rolling chart next to the panel, fed through stdin.

use std::error::Error;
use std::io::{self, BufWriter};
use std::time::Duration;

use log::{debug, info};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::Rect,
    widgets::Clear,
    Terminal, TerminalOptions, Viewport,
};
use tokio::io::AsyncRead;

use crate::config::StartupParams;
use crate::history::HistoryBuffer;
use crate::ingest::{self, Ingestor, StopReason, Surface};
use crate::placement::{self, Size};
use crate::ui::{self, GraphView};

/// Shortest time between two repaints.
const FRAME: Duration = Duration::from_millis(50);

/// Graph rectangle on a screen of the given size, in cells.
pub fn place(params: &StartupParams, screen: Rect) -> Rect {
    let window = params.window();
    let width = window.width.clamp(0.0, f64::from(screen.width));
    let height = window.height.clamp(0.0, f64::from(screen.height));
    let (x, y) = placement::resolve(
        params.anchor(),
        params.side,
        Size::new(f64::from(screen.width), f64::from(screen.height)),
        Size::new(width, height),
        params.gap,
    );
    Rect::new(
        screen.x + x.floor() as u16,
        screen.y + y.floor() as u16,
        width.floor() as u16,
        height.floor() as u16,
    )
}

pub struct GraphSurface<B: Backend> {
    terminal: Terminal<B>,
    view: GraphView,
}

impl<B: Backend> GraphSurface<B> {
    pub fn new(backend: B, area: Rect, view: GraphView) -> io::Result<Self> {
        let terminal = Terminal::with_options(
            backend,
            TerminalOptions {
                viewport: Viewport::Fixed(area),
            },
        )?;
        Ok(Self { terminal, view })
    }

    /// Blanks the window's rectangle and nothing else.
    pub fn clear(&mut self) -> io::Result<()> {
        self.terminal
            .draw(|frame| frame.render_widget(Clear, frame.area()))?;
        Ok(())
    }

    pub fn backend(&self) -> &B {
        self.terminal.backend()
    }
}

impl<B: Backend> Surface for GraphSurface<B> {
    fn paint(&mut self, history: &HistoryBuffer) -> io::Result<()> {
        let view = &self.view;
        self.terminal
            .draw(|frame| ui::render_graph(frame, frame.area(), history, view))?;
        Ok(())
    }

    fn present(&mut self, history: &HistoryBuffer) -> io::Result<()> {
        // A blank frame first, so the next draw rewrites every cell.
        self.clear()?;
        self.paint(history)
    }
}

#[cfg(unix)]
fn open_input() -> Box<dyn AsyncRead + Unpin> {
    use std::os::fd::AsFd;
    use tokio::net::unix::pipe;

    let receiver = io::stdin()
        .as_fd()
        .try_clone_to_owned()
        .and_then(pipe::Receiver::from_owned_fd);
    match receiver {
        Ok(receiver) => Box::new(receiver),
        Err(e) => {
            debug!("stdin is not a pipe ({e}), reading it on a blocking thread");
            Box::new(tokio::io::stdin())
        }
    }
}

#[cfg(not(unix))]
fn open_input() -> Box<dyn AsyncRead + Unpin> {
    Box::new(tokio::io::stdin())
}

/// Resolves on SIGINT or SIGTERM.
async fn quit_requested() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        if let Ok(mut term) = signal(SignalKind::terminate()) {
            tokio::select! {
                _ = interrupted() => {}
                _ = term.recv() => {}
            }
            return;
        }
    }
    interrupted().await
}

async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

pub async fn run(params: StartupParams) -> Result<(), Box<dyn Error>> {
    let (cols, rows) = crossterm::terminal::size()?;
    let area = place(&params, Rect::new(0, 0, cols, rows));
    info!(
        "graph window at {area:?} on a {cols}x{rows} terminal, keeping {} samples",
        params.backlog()
    );

    let mut ingestor = Ingestor::new(params.backlog());
    let backend = CrosstermBackend::new(BufWriter::new(io::stdout()));
    let mut surface = GraphSurface::new(backend, area, GraphView::new(&params))?;
    surface.paint(ingestor.history())?;

    let mut input = open_input();
    let stopped = ingest::stream(&mut input, &mut ingestor, &mut surface, quit_requested(), FRAME).await;
    surface.clear()?;

    match stopped? {
        StopReason::EndOfStream => info!("graph closed by the panel"),
        StopReason::QuitRequested => info!("graph closed by signal"),
    }
    Ok(())
}
