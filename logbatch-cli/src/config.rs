//! Configuration from the command line and an optional TOML file.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use eyre::WrapErr;
use logbatch::format::{DEFAULT_TIMESTAMP_FORMAT, Timestamp};
use logbatch::{Config, ConfigError};
use serde::Deserialize;

use crate::output::LineFormat;

/// Batches lines read from stdin and writes them to stdout or a file.
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Arguments {
    /// TOML configuration file, flags take precedence over its values.
    #[arg(long, env = "LOGBATCH_CONFIG")]
    config: Option<Utf8PathBuf>,

    /// Interval between flushes in milliseconds.
    #[arg(long)]
    buffer_time_ms: Option<u64>,

    /// Also flush as soon as this many bytes are buffered.
    #[arg(long)]
    max_size: Option<usize>,

    /// Text written between the lines of a batch.
    #[arg(long)]
    separator: Option<String>,

    /// Append batches to this file instead of writing them to stdout.
    #[arg(long)]
    output: Option<Utf8PathBuf>,

    /// Prefix every line with the time it was read.
    #[arg(long)]
    timestamp: bool,

    /// `strftime` pattern of the timestamp, implies `--timestamp`.
    #[arg(long)]
    timestamp_format: Option<String>,
}

/// Contents of the configuration file.
#[derive(Deserialize, Debug, Default, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub output: Option<Utf8PathBuf>,
    pub timestamp: bool,
    pub timestamp_format: Option<String>,
    pub buffer: Config,
}

impl FileConfig {
    pub fn load(path: &Utf8Path) -> eyre::Result<Self> {
        let source = fs_err::read_to_string(path)?;
        toml::from_str(&source).wrap_err_with(|| format!("invalid configuration file {path}"))
    }
}

/// Everything needed to set up the buffer.
#[derive(Debug)]
pub struct Settings {
    pub buffer: Config,
    pub output: Option<Utf8PathBuf>,
    pub format: LineFormat,
}

impl Arguments {
    /// Loads the configuration file, if any, and applies the flags on top.
    pub fn settings(&self) -> eyre::Result<Settings> {
        let file = match &self.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };

        Ok(self.merge(file)?)
    }

    fn merge(&self, file: FileConfig) -> Result<Settings, ConfigError> {
        let mut buffer = file.buffer;
        if let Some(buffer_time_ms) = self.buffer_time_ms {
            buffer.buffer_time = Duration::from_millis(buffer_time_ms);
        }
        if let Some(max_size) = self.max_size {
            buffer.max_size = Some(max_size);
        }
        if let Some(separator) = &self.separator {
            buffer.separator.clone_from(separator);
        }

        let timestamp_format = self.timestamp_format.clone().or(file.timestamp_format);
        let format = if self.timestamp || file.timestamp || timestamp_format.is_some() {
            let pattern = timestamp_format.as_deref().unwrap_or(DEFAULT_TIMESTAMP_FORMAT);
            LineFormat::Timestamp(Timestamp::new(pattern)?)
        } else {
            LineFormat::Plain
        };

        Ok(Settings {
            buffer,
            output: self.output.clone().or(file.output),
            format,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::Duration;

    use camino::Utf8Path;
    use clap::Parser;
    use indoc::indoc;
    use logbatch::{Config, ConfigError};
    use test_case::test_case;

    use super::{Arguments, FileConfig};
    use crate::output::LineFormat;

    const FILE: &str = indoc! {r#"
        output = "batched.log"
        timestamp_format = "%H:%M:%S"

        [buffer]
        buffer_time_ms = 200
        max_size = 120
    "#};

    fn arguments(flags: &[&str]) -> Arguments {
        Arguments::try_parse_from(std::iter::once("logbatch").chain(flags.iter().copied()))
            .unwrap()
    }

    #[test]
    fn parses_file() {
        let file: FileConfig = toml::from_str(FILE).unwrap();

        pretty_assertions::assert_eq!(
            file,
            FileConfig {
                output: Some("batched.log".into()),
                timestamp: false,
                timestamp_format: Some("%H:%M:%S".to_owned()),
                buffer: Config {
                    buffer_time: Duration::from_millis(200),
                    max_size: Some(120),
                    separator: "\n".to_owned(),
                },
            }
        );
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(toml::from_str::<FileConfig>("colour = true").is_err());
    }

    #[test]
    fn defaults_without_file_or_flags() {
        let settings = arguments(&[]).merge(FileConfig::default()).unwrap();

        pretty_assertions::assert_eq!(settings.buffer, Config::default());
        pretty_assertions::assert_eq!(settings.output, None);
        assert!(matches!(settings.format, LineFormat::Plain));
    }

    #[test]
    fn flags_override_file() {
        let file: FileConfig = toml::from_str(FILE).unwrap();
        let settings = arguments(&[
            "--buffer-time-ms",
            "50",
            "--separator",
            " | ",
            "--output",
            "other.log",
            "--timestamp-format",
            "%s",
        ])
        .merge(file)
        .unwrap();

        pretty_assertions::assert_eq!(
            settings.buffer,
            Config {
                buffer_time: Duration::from_millis(50),
                max_size: Some(120),
                separator: " | ".to_owned(),
            }
        );
        pretty_assertions::assert_eq!(settings.output.as_deref(), Some(Utf8Path::new("other.log")));
        let LineFormat::Timestamp(timestamp) = settings.format else {
            panic!("expected timestamps");
        };
        pretty_assertions::assert_eq!(timestamp.pattern(), "%s");
    }

    #[test_case(&["--timestamp"] => "%Y-%m-%d %H:%M:%S"; "flag selects default pattern")]
    #[test_case(&["--timestamp-format", "%T"] => "%T"; "pattern implies timestamp")]
    fn timestamp_flags(flags: &[&str]) -> String {
        match arguments(flags).merge(FileConfig::default()).unwrap().format {
            LineFormat::Timestamp(timestamp) => timestamp.pattern().to_owned(),
            LineFormat::Plain => panic!("expected timestamps"),
        }
    }

    #[test]
    fn invalid_timestamp_format_is_rejected() {
        let error = arguments(&["--timestamp-format", "%"])
            .merge(FileConfig::default())
            .unwrap_err();
        pretty_assertions::assert_eq!(error, ConfigError::InvalidTimestampFormat("%".to_owned()));
    }

    #[test]
    fn loads_file_from_disk() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(FILE.as_bytes()).unwrap();
        let path = Utf8Path::from_path(file.path()).unwrap();

        let settings = arguments(&["--config", path.as_str(), "--max-size", "4096"])
            .settings()
            .unwrap();

        pretty_assertions::assert_eq!(settings.buffer.max_size, Some(4096));
        pretty_assertions::assert_eq!(settings.output.as_deref(), Some(Utf8Path::new("batched.log")));
    }

    #[test]
    fn missing_file_names_the_path() {
        let error = arguments(&["--config", "/nonexistent/logbatch.toml"])
            .settings()
            .unwrap_err();

        assert!(format!("{error:?}").contains("/nonexistent/logbatch.toml"));
    }
}
