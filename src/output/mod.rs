pub mod coordinator;
pub mod writers;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use thiserror::Error;

use crate::config::OutputConfig;
use crate::scanner::ScanResult;

pub use coordinator::{Event, OutputCoordinator, OutputReport, WriteErrors};
pub use writers::{BufferedCsvWriter, BufferedJsonWriter, ConsoleWriter, CsvWriter, JsonWriter};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Console,
    Json,
    Csv,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "console" | "text" | "txt" | "plain" => Some(Self::Console),
            "json" => Some(Self::Json),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Console => "console",
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }

    pub fn needs_file(&self) -> bool {
        matches!(self, Self::Json | Self::Csv)
    }
}

pub fn infer_format_from_path(path: &str) -> Option<OutputFormat> {
    let lower = path.trim().to_lowercase();
    if lower.ends_with(".json") {
        return Some(OutputFormat::Json);
    }
    if lower.ends_with(".csv") {
        return Some(OutputFormat::Csv);
    }
    if lower.ends_with(".txt") || lower.ends_with(".log") {
        return Some(OutputFormat::Console);
    }
    None
}

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("failed to create output file: {path}: {source}")]
    Create {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {kind} output: {source}")]
    Io {
        kind: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode JSON result: {source}")]
    Json {
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode CSV record: {source}")]
    Csv {
        #[source]
        source: csv::Error,
    },

    #[error("{kind} writer is already closed")]
    Closed { kind: &'static str },

    #[error("{count} output writers failed, first: {first}")]
    Several {
        count: usize,
        first: Box<OutputError>,
    },
}

// a sink for scan results. `flush` commits whatever a buffered writer is
// holding, `close` releases the sink and must leave a complete document.
pub trait ResultWriter {
    fn write(&mut self, result: &ScanResult) -> Result<(), OutputError>;

    fn flush(&mut self) -> Result<(), OutputError> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), OutputError>;
}

pub enum OutputWriter {
    Console(ConsoleWriter),
    Json(JsonWriter),
    Csv(CsvWriter),
    BufferedJson(BufferedJsonWriter),
    BufferedCsv(BufferedCsvWriter),
    Multi(MultiWriter),
}

impl ResultWriter for OutputWriter {
    fn write(&mut self, result: &ScanResult) -> Result<(), OutputError> {
        match self {
            Self::Console(w) => w.write(result),
            Self::Json(w) => w.write(result),
            Self::Csv(w) => w.write(result),
            Self::BufferedJson(w) => w.write(result),
            Self::BufferedCsv(w) => w.write(result),
            Self::Multi(w) => w.write(result),
        }
    }

    fn flush(&mut self) -> Result<(), OutputError> {
        match self {
            Self::Console(w) => w.flush(),
            Self::Json(w) => w.flush(),
            Self::Csv(w) => w.flush(),
            Self::BufferedJson(w) => w.flush(),
            Self::BufferedCsv(w) => w.flush(),
            Self::Multi(w) => w.flush(),
        }
    }

    fn close(&mut self) -> Result<(), OutputError> {
        match self {
            Self::Console(w) => w.close(),
            Self::Json(w) => w.close(),
            Self::Csv(w) => w.close(),
            Self::BufferedJson(w) => w.close(),
            Self::BufferedCsv(w) => w.close(),
            Self::Multi(w) => w.close(),
        }
    }
}

// fans every call out to all writers. one failing writer never keeps the
// others from seeing the result.
#[derive(Default)]
pub struct MultiWriter {
    writers: Vec<OutputWriter>,
}

impl MultiWriter {
    pub fn new(writers: Vec<OutputWriter>) -> Self {
        Self { writers }
    }

    pub fn len(&self) -> usize {
        self.writers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writers.is_empty()
    }

    fn each(
        &mut self,
        mut op: impl FnMut(&mut OutputWriter) -> Result<(), OutputError>,
    ) -> Result<(), OutputError> {
        let mut errors: Vec<OutputError> = self
            .writers
            .iter_mut()
            .filter_map(|w| op(w).err())
            .collect();
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            count => Err(OutputError::Several {
                count,
                first: Box::new(errors.remove(0)),
            }),
        }
    }
}

impl ResultWriter for MultiWriter {
    fn write(&mut self, result: &ScanResult) -> Result<(), OutputError> {
        self.each(|w| w.write(result))
    }

    fn flush(&mut self) -> Result<(), OutputError> {
        self.each(|w| w.flush())
    }

    fn close(&mut self) -> Result<(), OutputError> {
        self.each(|w| w.close())
    }
}

fn create_file(path: &Path) -> Result<Box<dyn Write + Send>, OutputError> {
    let handle = File::create(path).map_err(|e| OutputError::Create {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(Box::new(BufWriter::new(handle)))
}

// console output always goes to stdout. an output file adds a second writer
// in the configured format behind a `MultiWriter`.
pub fn build_writer(config: &OutputConfig) -> Result<OutputWriter, OutputError> {
    let console = OutputWriter::Console(ConsoleWriter::new(
        Box::new(std::io::stdout()),
        config.color,
        config.verbose,
        config.show_errors,
    ));
    let Some(path) = config.file.as_deref() else {
        return Ok(console);
    };

    let out = create_file(path)?;
    let file_writer = match (config.format, config.buffered) {
        (OutputFormat::Console, _) => OutputWriter::Console(ConsoleWriter::new(
            out,
            false,
            config.verbose,
            config.show_errors,
        )),
        (OutputFormat::Json, true) => OutputWriter::BufferedJson(BufferedJsonWriter::new(out)),
        (OutputFormat::Json, false) => OutputWriter::Json(JsonWriter::new(out)?),
        (OutputFormat::Csv, true) => OutputWriter::BufferedCsv(BufferedCsvWriter::new(out)),
        (OutputFormat::Csv, false) => OutputWriter::Csv(CsvWriter::new(out)?),
    };
    Ok(OutputWriter::Multi(MultiWriter::new(vec![console, file_writer])))
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use std::path::PathBuf;

    fn found(path: &str) -> ScanResult {
        ScanResult::response(format!("http://t/{path}"), "GET", 200, 3, 0)
    }

    #[test]
    fn parses_and_infers_formats() {
        assert_eq!(OutputFormat::parse(" JSON "), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::parse("text"), Some(OutputFormat::Console));
        assert_eq!(OutputFormat::parse("xml"), None);
        assert_eq!(infer_format_from_path("out.CSV"), Some(OutputFormat::Csv));
        assert_eq!(infer_format_from_path("out"), None);
        assert!(OutputFormat::Csv.needs_file());
        assert!(!OutputFormat::Console.needs_file());
    }

    #[test]
    fn multi_writer_reaches_every_writer_despite_failures() {
        let good = SharedBuf::default();
        let mut multi = MultiWriter::new(vec![
            OutputWriter::Console(ConsoleWriter::new(Box::new(BrokenPipe), false, false, false)),
            OutputWriter::Console(ConsoleWriter::new(Box::new(good.clone()), false, false, false)),
        ]);
        let err = multi.write(&found("a")).unwrap_err();
        assert!(matches!(err, OutputError::Io { .. }));
        assert_eq!(good.contents(), "[200] http://t/a\n");
    }

    #[test]
    fn multi_writer_aggregates_several_failures() {
        let mut multi = MultiWriter::new(vec![
            OutputWriter::Console(ConsoleWriter::new(Box::new(BrokenPipe), false, false, false)),
            OutputWriter::Console(ConsoleWriter::new(Box::new(BrokenPipe), false, false, false)),
        ]);
        assert!(matches!(
            multi.write(&found("a")),
            Err(OutputError::Several { count: 2, .. })
        ));
    }

    #[test]
    fn output_file_gets_its_own_writer() {
        let dir = tempfile::tempdir().unwrap();
        let path: PathBuf = dir.path().join("results.csv");
        let config = OutputConfig {
            format: OutputFormat::Csv,
            file: Some(path.clone()),
            verbose: false,
            show_errors: false,
            buffered: true,
            progress: false,
            color: false,
        };
        let mut writer = build_writer(&config).unwrap();
        assert!(matches!(&writer, OutputWriter::Multi(m) if m.len() == 2));
        writer.write(&found("x")).unwrap();
        writer.flush().unwrap();
        writer.close().unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        let mut lines = written.lines();
        assert_eq!(
            lines.next(),
            Some("URL,StatusCode,Size,Method,Depth,Timestamp,Error")
        );
        assert!(lines.next().unwrap().starts_with("http://t/x,200,3,GET,0,"));
    }

    #[test]
    fn unwritable_output_path_fails_up_front() {
        let config = OutputConfig {
            format: OutputFormat::Json,
            file: Some(PathBuf::from("/nonexistent/dir/out.json")),
            verbose: false,
            show_errors: false,
            buffered: true,
            progress: false,
            color: false,
        };
        assert!(matches!(
            build_writer(&config),
            Err(OutputError::Create { .. })
        ));
    }
}
