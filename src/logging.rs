use std::fs::OpenOptions;
use std::io;
use std::path::Path;

use env_logger::{Env, Target};
use log::LevelFilter;

/// Sets up `log` output for either process.
///
/// Both processes draw on the terminal, so nothing is logged to stderr
/// unless `RUST_LOG` asks for it. With a log file the default level is
/// `info` and output is appended, so panel and graph can share one file.
pub fn init(log_file: Option<&Path>) -> io::Result<()> {
    let default_level = if log_file.is_some() {
        LevelFilter::Info
    } else {
        LevelFilter::Off
    };
    let mut builder =
        env_logger::Builder::from_env(Env::default().default_filter_or(default_level.as_str()));
    builder.format_timestamp_millis();

    if let Some(path) = log_file {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(Target::Pipe(Box::new(file)));
    }

    let _ = builder.try_init();
    Ok(())
}
