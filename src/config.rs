use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chart::Series;
use crate::history;
use crate::placement::{Anchor, Side, Size};

/// Shortest sampling interval the panel accepts, in seconds.
pub const MIN_INTERVAL: f64 = 0.5;
/// Longest sampling interval, in seconds.
pub const MAX_INTERVAL: f64 = 3600.0;
pub const DEFAULT_INTERVAL: f64 = 1.5;
pub const DEFAULT_COMMAND: &str = "nvidia-smi";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum TempUnit {
    #[default]
    C,
    F,
}

impl TempUnit {
    pub fn convert(self, celsius: f64) -> f64 {
        match self {
            TempUnit::C => celsius,
            TempUnit::F => celsius * 9.0 / 5.0 + 32.0,
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            TempUnit::C => "°C",
            TempUnit::F => "°F",
        }
    }

    pub fn format(self, celsius: f64, decimals: usize) -> String {
        format!("{:.*}{}", decimals, self.convert(celsius), self.suffix())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum XUnit {
    #[default]
    Seconds,
    Minutes,
    Hours,
}

impl XUnit {
    pub fn seconds(self, length: f64) -> f64 {
        match self {
            XUnit::Seconds => length,
            XUnit::Minutes => length * 60.0,
            XUnit::Hours => length * 3600.0,
        }
    }
}

/// Graph colours; any `#hex`, `rgb()` or `rgba()` string.
#[derive(Args, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Palette {
    #[arg(long = "color-gpu", default_value = "#0ed815")]
    pub gpu: String,
    #[arg(long = "color-mem", default_value = "#fbff07")]
    pub mem: String,
    #[arg(long = "color-temp", default_value = "#f51717")]
    pub temp: String,
    #[arg(long = "color-fan", default_value = "#7805e4")]
    pub fan: String,
    #[arg(long = "color-bg", default_value = "#000000")]
    pub bg: String,
    #[arg(long = "color-grid", default_value = "rgba(255,255,255,0.3)")]
    pub grid: String,
    #[arg(long = "color-axis", default_value = "#ffffff")]
    pub axis: String,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            gpu: "#0ed815".into(),
            mem: "#fbff07".into(),
            temp: "#f51717".into(),
            fan: "#7805e4".into(),
            bg: "#000000".into(),
            grid: "rgba(255,255,255,0.3)".into(),
            axis: "#ffffff".into(),
        }
    }
}

/// Parameters the graph process receives on its command line.
///
/// They are fixed for the lifetime of the graph window.
#[derive(Args, Clone, Debug, PartialEq)]
pub struct StartupParams {
    /// Left edge of the anchor (panel widget)
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub anchor_x: f64,
    /// Top edge of the anchor
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub anchor_y: f64,
    #[arg(long, default_value_t = 0.0)]
    pub anchor_width: f64,
    #[arg(long, default_value_t = 0.0)]
    pub anchor_height: f64,
    /// Screen edge the panel is docked to (top, bottom, left, right or 0-3)
    #[arg(long, value_enum, default_value_t = Side::Bottom)]
    pub side: Side,
    #[arg(long, default_value_t = 72.0)]
    pub window_width: f64,
    #[arg(long, default_value_t = 18.0)]
    pub window_height: f64,
    /// Distance between anchor and window
    #[arg(long, default_value_t = 0.0)]
    pub gap: f64,
    /// Producer sampling interval in seconds
    #[arg(long, default_value_t = DEFAULT_INTERVAL)]
    pub interval: f64,
    /// Samples kept locally, defaults to the visible window
    #[arg(long)]
    pub history: Option<usize>,
    #[command(flatten)]
    pub palette: Palette,
    #[arg(long, default_value_t = 3)]
    pub ysteps: usize,
    #[arg(long, default_value_t = 3)]
    pub xsteps: usize,
    #[arg(long, value_enum, ignore_case = true, default_value_t = TempUnit::C)]
    pub temp_unit: TempUnit,
    /// Visible time span, in `xunit`
    #[arg(long, default_value_t = 60.0)]
    pub xlength: f64,
    #[arg(long, value_enum, default_value_t = XUnit::Seconds)]
    pub xunit: XUnit,
    /// Series left out of the plot and the legend, comma separated
    #[arg(long, value_enum, value_delimiter = ',')]
    pub hide: Vec<Series>,
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl StartupParams {
    pub fn anchor(&self) -> Anchor {
        Anchor {
            x: self.anchor_x,
            y: self.anchor_y,
            width: self.anchor_width,
            height: self.anchor_height,
        }
    }

    pub fn window(&self) -> Size {
        Size::new(self.window_width, self.window_height)
    }

    pub fn interval(&self) -> f64 {
        clamp_interval(self.interval)
    }

    pub fn shows(&self, series: Series) -> bool {
        !self.hide.contains(&series)
    }

    /// Number of samples that fit in the visible time span.
    pub fn window_points(&self) -> usize {
        let points = self.xunit.seconds(self.xlength) / self.interval();
        if points.is_finite() {
            (points as usize).clamp(2, history::DEFAULT_CAPACITY)
        } else {
            2
        }
    }

    /// How many samples the graph accepts as backfill and keeps locally.
    pub fn backlog(&self) -> usize {
        self.history
            .unwrap_or_else(|| self.window_points())
            .clamp(1, history::DEFAULT_CAPACITY)
    }

    /// Renders the parameters back into command-line arguments.
    pub fn to_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        let mut push = |flag: &str, value: String| {
            args.push(format!("--{flag}").into());
            args.push(value.into());
        };

        push("anchor-x", self.anchor_x.to_string());
        push("anchor-y", self.anchor_y.to_string());
        push("anchor-width", self.anchor_width.to_string());
        push("anchor-height", self.anchor_height.to_string());
        push("side", self.side.as_str().into());
        push("window-width", self.window_width.to_string());
        push("window-height", self.window_height.to_string());
        push("gap", self.gap.to_string());
        push("interval", self.interval.to_string());
        if let Some(history) = self.history {
            push("history", history.to_string());
        }
        push("color-gpu", self.palette.gpu.clone());
        push("color-mem", self.palette.mem.clone());
        push("color-temp", self.palette.temp.clone());
        push("color-fan", self.palette.fan.clone());
        push("color-bg", self.palette.bg.clone());
        push("color-grid", self.palette.grid.clone());
        push("color-axis", self.palette.axis.clone());
        push("ysteps", self.ysteps.to_string());
        push("xsteps", self.xsteps.to_string());
        push("temp-unit", value_name(self.temp_unit));
        push("xlength", self.xlength.to_string());
        push("xunit", value_name(self.xunit));
        if !self.hide.is_empty() {
            let names: Vec<String> = self.hide.iter().map(|&series| value_name(series)).collect();
            push("hide", names.join(","));
        }

        if let Some(path) = &self.log_file {
            args.push("--log-file".into());
            args.push(path.clone().into_os_string());
        }
        args
    }
}

/// Brings a configured interval into `[MIN_INTERVAL, MAX_INTERVAL]`.
///
/// NaN falls to the minimum.
pub fn clamp_interval(seconds: f64) -> f64 {
    seconds.max(MIN_INTERVAL).min(MAX_INTERVAL)
}

fn value_name<T: ValueEnum>(value: T) -> String {
    value
        .to_possible_value()
        .map(|v| v.get_name().to_string())
        .unwrap_or_default()
}

/// What the panel shows in its labels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub show_gpu: bool,
    pub show_mem: bool,
    pub show_temp: bool,
    pub show_fan: bool,
    pub temp_unit: TempUnit,
    pub decimals: usize,
}

impl DisplayConfig {
    pub fn shows(&self, series: Series) -> bool {
        match series {
            Series::Gpu => self.show_gpu,
            Series::Mem => self.show_mem,
            Series::Temp => self.show_temp,
            Series::Fan => self.show_fan,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            show_gpu: true,
            show_mem: true,
            show_temp: true,
            show_fan: true,
            temp_unit: TempUnit::C,
            decimals: 0,
        }
    }
}

/// Settings handed to the graph window when it is opened.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub palette: Palette,
    pub ysteps: usize,
    pub xsteps: usize,
    pub xlength: f64,
    pub xunit: XUnit,
    pub window_width: u16,
    pub window_height: u16,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            palette: Palette::default(),
            ysteps: 3,
            xsteps: 3,
            xlength: 60.0,
            xunit: XUnit::Seconds,
            window_width: 72,
            window_height: 18,
        }
    }
}

/// Panel settings, loaded from an optional JSON file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    /// Seconds between samples.
    pub interval: f64,
    pub command: String,
    pub history_capacity: usize,
    pub display: DisplayConfig,
    pub graph: GraphConfig,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            command: DEFAULT_COMMAND.into(),
            history_capacity: history::DEFAULT_CAPACITY,
            display: DisplayConfig::default(),
            graph: GraphConfig::default(),
        }
    }
}

impl PanelConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(clamp_interval(self.interval))
    }

    /// Startup parameters for a graph anchored to `anchor`.
    pub fn startup_params(&self, anchor: Anchor, side: Side, log_file: Option<PathBuf>) -> StartupParams {
        let graph = &self.graph;
        let hide = Series::ALL
            .into_iter()
            .filter(|&series| !self.display.shows(series))
            .collect();
        StartupParams {
            anchor_x: anchor.x,
            anchor_y: anchor.y,
            anchor_width: anchor.width,
            anchor_height: anchor.height,
            side,
            window_width: f64::from(graph.window_width),
            window_height: f64::from(graph.window_height),
            gap: 0.0,
            interval: clamp_interval(self.interval),
            history: None,
            palette: graph.palette.clone(),
            ysteps: graph.ysteps,
            xsteps: graph.xsteps,
            temp_unit: self.display.temp_unit,
            xlength: graph.xlength,
            xunit: graph.xunit,
            hide,
            log_file,
        }
    }
}

/// Effects a settings change requires from the panel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConfigChange {
    pub restart_sampler: bool,
    pub refresh_display: bool,
}

pub fn apply_config(old: &PanelConfig, new: &PanelConfig) -> ConfigChange {
    ConfigChange {
        restart_sampler: old.interval() != new.interval() || old.command != new.command,
        refresh_display: old.display != new.display,
    }
}
