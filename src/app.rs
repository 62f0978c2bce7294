use chrono::Local;
use log::{debug, warn};

use crate::config::{apply_config, ConfigChange, DisplayConfig, PanelConfig, StartupParams};
use crate::history::HistoryBuffer;
use crate::models::Sample;
use crate::nvidia::SampleSource;
use crate::supervisor::{Launcher, Opened, Supervisor};

/// What the panel tells the user besides the numbers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Status {
    Ok,
    SourceFailed(String),
    GraphUnavailable(String),
    ConfigInvalid(String),
}

/// One label segment of the panel, e.g. `GPU 30%`.
#[derive(Clone, Debug, PartialEq)]
pub struct LabelPart {
    pub name: &'static str,
    pub text: String,
    /// Fill level for the part's indicator, 0-100.
    pub percent: f64,
}

/// Main application state of the panel.
pub struct App {
    pub config: PanelConfig,
    pub history: HistoryBuffer,
    /// Last successfully decoded sample, kept until the next one.
    pub last: Option<Sample>,
    pub label: Vec<LabelPart>,
    pub status: Status,
    pub frame_count: u64,
}

impl App {
    pub fn new(config: PanelConfig) -> Self {
        App {
            history: HistoryBuffer::new(config.history_capacity),
            config,
            last: None,
            label: Vec::new(),
            status: Status::Ok,
            frame_count: 0,
        }
    }

    /// One sampling tick: read, record, stream.
    ///
    /// A failing source only changes the status; the next tick tries again.
    pub fn sample_step<S, L>(&mut self, source: &mut S, supervisor: &mut Supervisor<L>)
    where
        S: SampleSource,
        L: Launcher,
    {
        let reading = match source.sample() {
            Ok(reading) => reading,
            Err(e) => {
                debug!("sample failed: {e}");
                self.status = Status::SourceFailed(e.to_string());
                return;
            }
        };

        let sample = reading.into_sample(Local::now());
        self.label = render_label(&sample, &self.config.display);
        self.history.append(sample.clone());
        supervisor.publish(&sample);
        self.last = Some(sample);
        if matches!(self.status, Status::SourceFailed(_)) {
            self.status = Status::Ok;
        }
    }

    /// Opens the graph window, or raises the open one.
    pub fn open_graph<L: Launcher>(&mut self, supervisor: &mut Supervisor<L>, params: &StartupParams) {
        match supervisor.open(params, &self.history) {
            Ok(Opened::Spawned { replayed }) => {
                debug!("graph opened with {replayed} samples of backfill");
                if matches!(self.status, Status::GraphUnavailable(_)) {
                    self.status = Status::Ok;
                }
            }
            Ok(Opened::AlreadyOpen) => {}
            Err(e) => self.status = Status::GraphUnavailable(e.to_string()),
        }
    }

    /// Swaps in new settings and re-renders from the cached sample if needed.
    pub fn reconfigure(&mut self, config: PanelConfig) -> ConfigChange {
        let change = apply_config(&self.config, &config);
        if config.history_capacity != self.config.history_capacity {
            warn!("history capacity changes apply after a restart");
        }
        self.config = config;
        if change.refresh_display {
            self.refresh_label();
        }
        change
    }

    pub fn refresh_label(&mut self) {
        self.label = match &self.last {
            Some(sample) => render_label(sample, &self.config.display),
            None => Vec::new(),
        };
    }

    /// Increment frame counter
    pub fn tick(&mut self) {
        self.frame_count += 1;
    }
}

/// Panel labels for one sample under the given display settings.
pub fn render_label(sample: &Sample, display: &DisplayConfig) -> Vec<LabelPart> {
    let mut parts = Vec::with_capacity(4);
    let d = display.decimals;

    if display.show_gpu {
        parts.push(LabelPart {
            name: "GPU",
            text: format!("{:.*}%", d, sample.utilization),
            percent: sample.utilization,
        });
    }
    if display.show_mem {
        let mem = sample.memory_percent();
        parts.push(LabelPart {
            name: "MEM",
            text: format!("{:.*}%", d, mem),
            percent: mem,
        });
    }
    if display.show_temp {
        parts.push(LabelPart {
            name: "TMP",
            text: display.temp_unit.format(sample.temperature, d),
            percent: (sample.temperature / crate::chart::TEMP_MAX * 100.0).clamp(0.0, 100.0),
        });
    }
    if display.show_fan {
        parts.push(LabelPart {
            name: "FAN",
            text: format!("{:.*}%", d, sample.fan),
            percent: sample.fan,
        });
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TempUnit;
    use crate::models::Reading;
    use crate::nvidia::{parse_reading, SourceError};
    use crate::supervisor::{Launched, ProcessLauncher};

    struct Scripted(Vec<Result<&'static str, &'static str>>);

    impl SampleSource for Scripted {
        fn sample(&mut self) -> Result<Reading, SourceError> {
            match self.0.remove(0) {
                Ok(line) => parse_reading(line),
                Err(msg) => Err(SourceError::Exit {
                    command: "nvidia-smi".into(),
                    code: "9".into(),
                    stderr: msg.into(),
                }),
            }
        }
    }

    struct NoGraph;

    impl Launcher for NoGraph {
        fn launch(&mut self, _params: &StartupParams) -> std::io::Result<Launched> {
            Err(std::io::ErrorKind::NotFound.into())
        }
    }

    fn sample() -> Sample {
        Sample {
            ts: "x".into(),
            utilization: 30.0,
            memory_used: 2048.0,
            memory_total: 8192.0,
            temperature: 45.0,
            fan: 55.0,
        }
    }

    #[tokio::test]
    async fn source_failure_is_visible_and_recovers_next_tick() {
        let mut app = App::new(PanelConfig::default());
        let (mut supervisor, _events) = Supervisor::new(NoGraph);
        let mut source = Scripted(vec![Err("GPU is lost"), Ok("45, 2048, 8192, 30, 55")]);

        app.sample_step(&mut source, &mut supervisor);
        assert!(matches!(&app.status, Status::SourceFailed(msg) if msg.contains("GPU is lost")));
        assert!(app.history.is_empty());

        app.sample_step(&mut source, &mut supervisor);
        assert_eq!(app.status, Status::Ok);
        assert_eq!(app.history.len(), 1);
        assert_eq!(app.last.as_ref().map(Sample::memory_percent), Some(25.0));
        assert_eq!(app.label[0].text, "30%");
    }

    #[tokio::test]
    async fn spawn_failure_shows_graph_unavailable() {
        let mut app = App::new(PanelConfig::default());
        let (mut supervisor, _events) = Supervisor::new(NoGraph);
        let params = app
            .config
            .startup_params(Default::default(), Default::default(), None);

        app.open_graph(&mut supervisor, &params);
        assert!(matches!(app.status, Status::GraphUnavailable(_)));
        assert!(!supervisor.is_live());

        let (mut real, _events) = Supervisor::new(ProcessLauncher::new("/nonexistent/gpu-graph"));
        app.open_graph(&mut real, &params);
        assert!(matches!(app.status, Status::GraphUnavailable(_)));
    }

    #[test]
    fn render_label_follows_display_settings() {
        let display = DisplayConfig {
            show_mem: false,
            temp_unit: TempUnit::F,
            decimals: 1,
            ..DisplayConfig::default()
        };
        let parts = render_label(&sample(), &display);
        let texts: Vec<_> = parts.iter().map(|p| (p.name, p.text.as_str())).collect();
        assert_eq!(texts, [("GPU", "30.0%"), ("TMP", "113.0°F"), ("FAN", "55.0%")]);
    }

    #[test]
    fn display_change_rerenders_from_cache_without_sampling() {
        let mut app = App::new(PanelConfig::default());
        app.last = Some(sample());
        app.refresh_label();
        assert_eq!(app.label.len(), 4);

        let mut config = app.config.clone();
        config.display.show_gpu = false;
        config.display.show_fan = false;
        let change = app.reconfigure(config);

        assert!(change.refresh_display);
        assert!(!change.restart_sampler);
        let names: Vec<_> = app.label.iter().map(|p| p.name).collect();
        assert_eq!(names, ["MEM", "TMP"]);
        assert!(app.history.is_empty());
    }
}
