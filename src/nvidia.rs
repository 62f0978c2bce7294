use std::io;
use std::process::Command;

use thiserror::Error;

use crate::models::Reading;

pub const QUERY: &str =
    "--query-gpu=temperature.gpu,memory.used,memory.total,utilization.gpu,fan.speed,timestamp";
pub const FORMAT: &str = "--format=csv,noheader,nounits";

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("cannot run {command}: {source}")]
    Spawn { command: String, source: io::Error },
    #[error("{command} exited with {code}: {stderr}")]
    Exit {
        command: String,
        code: String,
        stderr: String,
    },
    #[error("unexpected output {line:?}: {reason}")]
    Parse { line: String, reason: String },
}

/// Something that produces one metric reading per call.
pub trait SampleSource {
    fn sample(&mut self) -> Result<Reading, SourceError>;
}

/// Queries the first GPU through `nvidia-smi`.
///
/// The call is synchronous; it is short and runs once per sampling tick.
pub struct NvidiaSmi {
    command: String,
}

impl NvidiaSmi {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl SampleSource for NvidiaSmi {
    fn sample(&mut self) -> Result<Reading, SourceError> {
        let output = Command::new(&self.command)
            .arg(QUERY)
            .arg(FORMAT)
            .output()
            .map_err(|source| SourceError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(SourceError::Exit {
                command: self.command.clone(),
                code: output
                    .status
                    .code()
                    .map_or_else(|| "signal".to_string(), |c| c.to_string()),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let output_str = String::from_utf8_lossy(&output.stdout);
        let line = output_str
            .lines()
            .find(|l| !l.trim().is_empty())
            .unwrap_or_default();
        parse_reading(line)
    }
}

/// Parses `temperature, memory used, memory total, utilization, fan[, timestamp]`.
///
/// Fields may carry surrounding whitespace and unit suffixes such as `MiB`
/// or `%`. A fan reported as `[N/A]` reads as 0.
pub fn parse_reading(line: &str) -> Result<Reading, SourceError> {
    let parts: Vec<&str> = line.split(',').map(|s| s.trim()).collect();
    if parts.len() < 5 {
        return Err(SourceError::Parse {
            line: line.to_string(),
            reason: format!("expected at least 5 fields, got {}", parts.len()),
        });
    }

    let field = |idx: usize, name: &str| {
        leading_number(parts[idx]).ok_or_else(|| SourceError::Parse {
            line: line.to_string(),
            reason: format!("{name} is not numeric: {:?}", parts[idx]),
        })
    };

    let temperature = field(0, "temperature")?;
    let memory_used = field(1, "memory used")?;
    let memory_total = field(2, "memory total")?;
    let utilization = field(3, "utilization")?;
    let fan = if is_not_available(parts[4]) {
        0.0
    } else {
        field(4, "fan speed")?
    };
    let timestamp = parts
        .get(5)
        .filter(|ts| !ts.is_empty())
        .map(|ts| ts.to_string());

    Ok(Reading {
        temperature,
        memory_used,
        memory_total,
        utilization,
        fan,
        timestamp,
    })
}

fn leading_number(field: &str) -> Option<f64> {
    let end = field
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || c == '.' || (i == 0 && (c == '-' || c == '+'))))
        .map_or(field.len(), |(i, _)| i);
    field[..end].parse().ok()
}

fn is_not_available(field: &str) -> bool {
    let f = field.trim_matches(|c: char| c == '[' || c == ']');
    f.eq_ignore_ascii_case("n/a") || f.eq_ignore_ascii_case("not supported")
}
