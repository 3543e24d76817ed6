//! Where batches go and how lines are formatted on the way.

use camino::Utf8Path;
use eyre::WrapErr;
use logbatch::SinkError;
use logbatch::format::{Format, Timestamp};
use logbatch::sink::{Sink, WriterSink};

/// The destination selected on the command line.
#[derive(Debug)]
pub enum Output {
    Stdout(WriterSink<tokio::io::Stdout>),
    File(WriterSink<tokio::fs::File>),
}

impl Output {
    /// Opens `path` for appending, creating it if needed, or selects stdout.
    pub async fn open(path: Option<&Utf8Path>) -> eyre::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::Stdout(WriterSink::stdout()));
        };

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .wrap_err_with(|| format!("failed to open output file {path}"))?;
        tracing::debug!(%path, "appending batches to file");

        Ok(Self::File(WriterSink::new(file)))
    }
}

impl Sink for Output {
    async fn write(&self, block: &str) -> Result<(), SinkError> {
        match self {
            Self::Stdout(sink) => sink.write(block).await,
            Self::File(sink) => sink.write(block).await,
        }
    }
}

/// Formatting applied to every line read from stdin.
#[derive(Debug)]
pub enum LineFormat {
    Plain,
    Timestamp(Timestamp),
}

impl Format for LineFormat {
    fn format(&self, message: &str) -> String {
        match self {
            Self::Plain => message.to_owned(),
            Self::Timestamp(timestamp) => timestamp.format(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use camino::Utf8Path;
    use logbatch::format::Format;
    use logbatch::sink::Sink;
    use pretty_assertions::assert_eq;

    use super::{LineFormat, Output};

    #[tokio::test]
    async fn file_output_appends() {
        let directory = tempfile::tempdir().unwrap();
        let path = Utf8Path::from_path(directory.path())
            .unwrap()
            .join("out.log");
        std::fs::write(&path, "existing\n").unwrap();

        let output = Output::open(Some(&path)).await.unwrap();
        assert!(matches!(output, Output::File(_)));
        output.write("one\ntwo").await.unwrap();
        output.write("three").await.unwrap();
        drop(output);

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "existing\none\ntwo\nthree\n"
        );
    }

    #[tokio::test]
    async fn missing_directory_is_an_error() {
        let directory = tempfile::tempdir().unwrap();
        let path = Utf8Path::from_path(directory.path())
            .unwrap()
            .join("missing/out.log");

        let error = Output::open(Some(&path)).await.unwrap_err();
        assert!(error.to_string().contains("missing/out.log"));
    }

    #[test]
    fn plain_lines_are_unchanged() {
        assert_eq!(LineFormat::Plain.format("as read"), "as read");
    }
}
