use chrono::{DateTime, Local};

/// Timestamp layout used by nvidia-smi and on the wire.
pub const TIMESTAMP_FORMAT: &str = "%Y/%m/%d_%H:%M:%S%.3f";

/// One telemetry observation as it travels from the panel to the graph.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub ts: String,
    pub utilization: f64,
    pub memory_used: f64,
    pub memory_total: f64,
    pub temperature: f64,
    pub fan: f64,
}

impl Sample {
    /// Memory used as a percentage of the total, 0 when the total is unknown.
    pub fn memory_percent(&self) -> f64 {
        if self.memory_total <= 0.0 {
            return 0.0;
        }
        clamp_percent(self.memory_used / self.memory_total * 100.0)
    }

    /// `HH:MM:SS` part of the timestamp, or the raw string when it has another shape.
    pub fn clock(&self) -> &str {
        match self.ts.split_once(|c: char| c == '_' || c == ' ') {
            Some((_, time)) => time.split('.').next().unwrap_or(time),
            None if self.ts.is_empty() => "N/A",
            None => &self.ts,
        }
    }
}

/// Raw metric tuple decoded from one Sample Source line.
#[derive(Clone, Debug, PartialEq)]
pub struct Reading {
    pub temperature: f64,
    pub memory_used: f64,
    pub memory_total: f64,
    pub utilization: f64,
    pub fan: f64,
    pub timestamp: Option<String>,
}

impl Reading {
    /// Builds the immutable sample, clamping percentages and stamping the time
    /// when the source did not report one.
    pub fn into_sample(self, now: DateTime<Local>) -> Sample {
        let ts = match self.timestamp {
            Some(ts) if !ts.trim().is_empty() => ts.trim().to_string(),
            _ => format_timestamp(now),
        };

        Sample {
            ts,
            utilization: clamp_percent(self.utilization),
            memory_used: non_negative(self.memory_used),
            memory_total: non_negative(self.memory_total),
            temperature: non_negative(self.temperature),
            fan: clamp_percent(self.fan),
        }
    }
}

pub fn format_timestamp(now: DateTime<Local>) -> String {
    now.format(TIMESTAMP_FORMAT).to_string()
}

pub fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 100.0)
}

fn non_negative(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.max(0.0)
}
