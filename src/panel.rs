//! The panel process: samples the GPU, shows the docked widget and owns
//! the graph window.

use std::error::Error;
use std::io::{self, BufWriter, Stdout};
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use log::{info, warn};
use ratatui::{backend::CrosstermBackend, layout::Rect, Terminal, TerminalOptions, Viewport};
use tokio::sync::mpsc;
use tokio::time::{self, Interval, MissedTickBehavior};

use crate::app::{App, Status};
use crate::config::{ConfigError, PanelConfig, StartupParams};
use crate::nvidia::NvidiaSmi;
use crate::placement::{Anchor, Side};
use crate::supervisor::{LinkEvent, ProcessLauncher, Supervisor};
use crate::ui;

const UI_TICK: Duration = Duration::from_millis(100);
/// How long quitting waits for an open graph to drain its input and clear itself.
const CLOSE_GRACE: Duration = Duration::from_millis(500);

type PanelTerminal = Terminal<CrosstermBackend<BufWriter<Stdout>>>;

#[derive(Args, Clone, Debug)]
pub struct PanelArgs {
    /// JSON settings file, re-read with `r`
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Seconds between samples, overrides the settings file
    #[arg(long)]
    pub interval: Option<f64>,
    /// Metric command, overrides the settings file
    #[arg(long)]
    pub command: Option<String>,
    /// Terminal edge the panel is docked to
    #[arg(long, value_enum, default_value_t = Side::Bottom)]
    pub dock: Side,
    #[arg(long)]
    pub panel_width: Option<u16>,
    /// Append logs of both processes to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl PanelArgs {
    fn load_config(&self) -> Result<PanelConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => PanelConfig::load(path)?,
            None => PanelConfig::default(),
        };
        if let Some(interval) = self.interval {
            config.interval = interval;
        }
        if let Some(command) = &self.command {
            config.command = command.clone();
        }
        Ok(config)
    }

    fn panel_size(&self) -> (u16, u16) {
        match self.dock {
            Side::Top | Side::Bottom => (self.panel_width.unwrap_or(48), 4),
            Side::Left | Side::Right => (self.panel_width.unwrap_or(26), 7),
        }
    }
}

/// Where the panel widget sits on a screen of the given size.
///
/// The widget hugs the dock edge and the end of that edge, like a tray.
pub fn dock_rect(screen: Rect, side: Side, width: u16, height: u16) -> Rect {
    let width = width.min(screen.width);
    let height = height.min(screen.height);
    let right = screen.right() - width;
    let bottom = screen.bottom() - height;

    let (x, y) = match side {
        Side::Top => (right, screen.y),
        Side::Bottom => (right, bottom),
        Side::Left => (screen.x, bottom),
        Side::Right => (right, bottom),
    };
    Rect::new(x, y, width, height)
}

fn anchor_of(rect: Rect) -> Anchor {
    Anchor {
        x: f64::from(rect.x),
        y: f64::from(rect.y),
        width: f64::from(rect.width),
        height: f64::from(rect.height),
    }
}

fn sampler(period: Duration) -> Interval {
    let mut ticks = time::interval(period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticks
}

fn setup_terminal(area: Rect) -> io::Result<PanelTerminal> {
    crossterm::terminal::enable_raw_mode()?;
    crossterm::execute!(io::stdout(), crossterm::terminal::EnterAlternateScreen)?;
    Terminal::with_options(
        CrosstermBackend::new(BufWriter::new(io::stdout())),
        TerminalOptions {
            viewport: Viewport::Fixed(area),
        },
    )
}

fn restore_terminal(terminal: &mut PanelTerminal) -> io::Result<()> {
    crossterm::execute!(
        terminal.backend_mut(),
        crossterm::terminal::LeaveAlternateScreen,
        crossterm::cursor::Show
    )?;
    crossterm::terminal::disable_raw_mode()
}

enum Action {
    None,
    OpenGraph,
    CloseGraph,
    Reload,
    Quit,
}

fn action_for(key: KeyEvent) -> Action {
    if key.kind != KeyEventKind::Press {
        return Action::None;
    }
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => Action::Quit,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Action::Quit,
        KeyCode::Char('g') => Action::OpenGraph,
        KeyCode::Char('c') => Action::CloseGraph,
        KeyCode::Char('r') => Action::Reload,
        _ => Action::None,
    }
}

struct Panel {
    args: PanelArgs,
    app: App,
    source: NvidiaSmi,
    supervisor: Supervisor<ProcessLauncher>,
    events: mpsc::UnboundedReceiver<LinkEvent>,
    terminal: PanelTerminal,
    area: Rect,
}

impl Panel {
    fn startup_params(&self) -> StartupParams {
        self.app
            .config
            .startup_params(anchor_of(self.area), self.args.dock, self.args.log_file.clone())
    }

    fn open_graph(&mut self) {
        let params = self.startup_params();
        self.app.open_graph(&mut self.supervisor, &params);
    }

    fn reload(&mut self, ticks: &mut Interval) {
        let config = match self.args.load_config() {
            Ok(config) => config,
            Err(e) => {
                warn!("keeping current settings: {e}");
                self.app.status = Status::ConfigInvalid(e.to_string());
                return;
            }
        };
        if matches!(self.app.status, Status::ConfigInvalid(_)) {
            self.app.status = Status::Ok;
        }

        let change = self.app.reconfigure(config);
        info!("settings reloaded: {change:?}");
        if change.restart_sampler {
            self.source = NvidiaSmi::new(self.app.config.command.clone());
            *ticks = sampler(self.app.config.interval());
        }
    }

    fn resize(&mut self) -> io::Result<()> {
        let (width, height) = self.args.panel_size();
        let (cols, rows) = crossterm::terminal::size()?;
        let area = dock_rect(Rect::new(0, 0, cols, rows), self.args.dock, width, height);
        if area != self.area {
            self.area = area;
            self.terminal.resize(area)?;
        }
        // Resizing wipes part of the screen; an open graph has to repaint.
        if self.supervisor.is_live() {
            self.open_graph();
        }
        Ok(())
    }

    fn draw(&mut self) -> io::Result<()> {
        self.app.tick();
        let app = &self.app;
        self.terminal
            .draw(|frame| ui::render_panel(frame, frame.area(), app))?;
        Ok(())
    }

    async fn run(&mut self) -> io::Result<()> {
        let mut ticks = sampler(self.app.config.interval());
        let mut ui_ticks = time::interval(UI_TICK);
        ui_ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticks.tick() => {
                    self.app.sample_step(&mut self.source, &mut self.supervisor);
                }
                Some(event) = self.events.recv() => {
                    self.supervisor.handle_event(event);
                }
                _ = ui_ticks.tick() => {
                    while event::poll(Duration::ZERO)? {
                        match event::read()? {
                            Event::Key(key) => match action_for(key) {
                                Action::Quit => return Ok(()),
                                Action::OpenGraph => self.open_graph(),
                                Action::CloseGraph => self.supervisor.close(),
                                Action::Reload => self.reload(&mut ticks),
                                Action::None => {}
                            },
                            Event::Resize(_, _) => self.resize()?,
                            _ => {}
                        }
                    }
                    self.draw()?;
                }
            }
        }
    }

    /// Closes the graph and gives it a moment to exit on its own before
    /// killing it.
    async fn shutdown(&mut self) {
        if !self.supervisor.is_live() {
            return;
        }
        self.supervisor.close();
        let events = &mut self.events;
        let exited = time::timeout(CLOSE_GRACE, async {
            while let Some(event) = events.recv().await {
                if matches!(event, LinkEvent::Exited { .. }) {
                    break;
                }
            }
        })
        .await;
        if exited.is_err() {
            warn!("graph did not exit in time");
            self.supervisor.kill();
        }
    }
}

pub async fn run(args: PanelArgs) -> Result<(), Box<dyn Error>> {
    let config = args.load_config()?;
    info!("panel starting, sampling every {:?}", config.interval());

    let source = NvidiaSmi::new(config.command.clone());
    let (supervisor, events) = Supervisor::new(ProcessLauncher::current_exe()?);

    let (width, height) = args.panel_size();
    let (cols, rows) = crossterm::terminal::size()?;
    let area = dock_rect(Rect::new(0, 0, cols, rows), args.dock, width, height);
    let terminal = setup_terminal(area)?;

    let mut panel = Panel {
        args,
        app: App::new(config),
        source,
        supervisor,
        events,
        terminal,
        area,
    };

    let result = panel.run().await;
    panel.shutdown().await;
    restore_terminal(&mut panel.terminal)?;
    result?;
    Ok(())
}
