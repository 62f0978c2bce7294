//! Newline-delimited JSON records between the panel and the graph.
//!
//! Every record is one JSON object on one line. Sample records carry
//! `ts`, `gpu`, `mem`, `temp` and `fan`, plus the raw memory amounts so a
//! sample survives the trip unchanged. Control records carry a `command`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Sample;

pub const DELIMITER: u8 = b'\n';

/// Longest partial record the decoder buffers before giving up on it.
pub const MAX_RECORD_LEN: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("field `{0}` is not a finite number")]
    NonFinite(&'static str),
    #[error("encoded record contains the record delimiter")]
    EmbeddedDelimiter,
    #[error("serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed record: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("record exceeds {MAX_RECORD_LEN} bytes without a delimiter")]
    Oversized,
    #[error("stream ended inside a record ({0} bytes pending)")]
    Truncated(usize),
}

/// Out-of-band instructions for the graph window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    /// Bring the existing window back into view.
    Present,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Sample(Sample),
    Command(Command),
}

#[derive(Serialize, Deserialize)]
struct Record {
    ts: String,
    gpu: f64,
    mem: f64,
    temp: f64,
    fan: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mem_used: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mem_total: Option<f64>,
}

#[derive(Serialize, Deserialize)]
struct Control {
    command: Command,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Incoming {
    Control(Control),
    Record(Record),
}

impl From<Record> for Sample {
    fn from(r: Record) -> Self {
        Sample {
            ts: r.ts,
            utilization: r.gpu,
            memory_used: r.mem_used.unwrap_or(r.mem),
            memory_total: r.mem_total.unwrap_or(100.0),
            temperature: r.temp,
            fan: r.fan,
        }
    }
}

/// Encodes one sample as a complete, delimiter-terminated record.
pub fn encode_sample(sample: &Sample) -> Result<String, EncodeError> {
    let fields = [
        ("gpu", sample.utilization),
        ("mem_used", sample.memory_used),
        ("mem_total", sample.memory_total),
        ("temp", sample.temperature),
        ("fan", sample.fan),
    ];
    if let Some((name, _)) = fields.iter().find(|(_, v)| !v.is_finite()) {
        return Err(EncodeError::NonFinite(*name));
    }

    let record = Record {
        ts: sample.ts.clone(),
        gpu: sample.utilization,
        mem: sample.memory_percent(),
        temp: sample.temperature,
        fan: sample.fan,
        mem_used: Some(sample.memory_used),
        mem_total: Some(sample.memory_total),
    };
    terminate(serde_json::to_string(&record)?)
}

pub fn encode_command(command: Command) -> Result<String, EncodeError> {
    terminate(serde_json::to_string(&Control { command })?)
}

fn terminate(mut body: String) -> Result<String, EncodeError> {
    if body.as_bytes().contains(&DELIMITER) {
        return Err(EncodeError::EmbeddedDelimiter);
    }
    body.push(DELIMITER as char);
    Ok(body)
}

/// Decodes one record body (without its delimiter).
pub fn decode_record(line: &[u8]) -> Result<Frame, DecodeError> {
    Ok(match serde_json::from_slice::<Incoming>(line)? {
        Incoming::Control(c) => Frame::Command(c.command),
        Incoming::Record(r) => Frame::Sample(r.into()),
    })
}

/// Reassembles records from arbitrarily split chunks.
#[derive(Debug, Default)]
pub struct Decoder {
    pending: Vec<u8>,
    /// Set after an oversized record until its delimiter goes by.
    skipping: bool,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns every record it completed, in arrival order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Result<Frame, DecodeError>> {
        let mut out = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|&b| b == DELIMITER) {
            let (head, tail) = rest.split_at(pos);
            rest = &tail[1..];

            if self.skipping {
                self.skipping = false;
                self.pending.clear();
                continue;
            }

            let line = if self.pending.is_empty() {
                head
            } else {
                self.pending.extend_from_slice(head);
                self.pending.as_slice()
            };
            if let Some(result) = decode_line(line) {
                out.push(result);
            }
            self.pending.clear();
        }

        if !self.skipping {
            self.pending.extend_from_slice(rest);
            if self.pending.len() > MAX_RECORD_LEN {
                self.pending.clear();
                self.skipping = true;
                out.push(Err(DecodeError::Oversized));
            }
        }
        out
    }

    /// Reports a record left unterminated when the stream ended.
    pub fn finish(&mut self) -> Option<DecodeError> {
        let pending = std::mem::take(&mut self.pending);
        self.skipping = false;
        let trimmed = trim_line(&pending);
        (!trimmed.is_empty()).then(|| DecodeError::Truncated(pending.len()))
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

fn decode_line(line: &[u8]) -> Option<Result<Frame, DecodeError>> {
    let line = trim_line(line);
    if line.is_empty() {
        return None;
    }
    Some(decode_record(line))
}

fn trim_line(line: &[u8]) -> &[u8] {
    let end = line
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |i| i + 1);
    &line[..end]
}
