use std::io::Write;

use colored::Colorize;

use super::{OutputError, ResultWriter};
use crate::scanner::ScanResult;

const CSV_HEADER: [&str; 7] = [
    "URL",
    "StatusCode",
    "Size",
    "Method",
    "Depth",
    "Timestamp",
    "Error",
];

type Sink = Box<dyn Write + Send>;

pub struct ConsoleWriter {
    out: Sink,
    color: bool,
    verbose: bool,
    show_errors: bool,
}

impl ConsoleWriter {
    pub fn new(out: Sink, color: bool, verbose: bool, show_errors: bool) -> Self {
        Self {
            out,
            color,
            verbose,
            show_errors,
        }
    }

    // `None` when the result is not shown at all (failures without
    // verbose or show_errors)
    pub fn format_line(&self, result: &ScanResult) -> Option<String> {
        if let Some(error) = result.error() {
            if !(self.verbose || self.show_errors) {
                return None;
            }
            let tag = if self.color {
                "[ERROR]".red().bold().to_string()
            } else {
                "[ERROR]".to_string()
            };
            return Some(format!("{tag} {}: {error}", result.url()));
        }

        let status = format!("[{}]", result.status_code());
        let status = if self.color {
            match result.status_code() {
                200..=299 => status.green().to_string(),
                300..=399 => status.yellow().to_string(),
                400..=499 => status.red().to_string(),
                500..=599 => status.magenta().to_string(),
                _ => status,
            }
        } else {
            status
        };

        let mut line = format!("{status} {}", result.url());
        if self.verbose {
            line.push_str(&format!(
                " [{}] [{} bytes] [{}]",
                result.method(),
                result.size(),
                result.timestamp().format("%H:%M:%S")
            ));
        }
        Some(line)
    }
}

impl ResultWriter for ConsoleWriter {
    fn write(&mut self, result: &ScanResult) -> Result<(), OutputError> {
        let Some(line) = self.format_line(result) else {
            return Ok(());
        };
        writeln!(self.out, "{line}")
            .and_then(|_| self.out.flush())
            .map_err(|e| OutputError::Io {
                kind: "console",
                source: e,
            })
    }

    fn close(&mut self) -> Result<(), OutputError> {
        self.out.flush().map_err(|e| OutputError::Io {
            kind: "console",
            source: e,
        })
    }
}

fn json_io(e: std::io::Error) -> OutputError {
    OutputError::Io {
        kind: "json",
        source: e,
    }
}

// writes `[` up front and one element per result, so a crash mid-scan leaves
// at most the closing bracket missing.
pub struct JsonWriter {
    out: Sink,
    first: bool,
    closed: bool,
}

impl JsonWriter {
    pub fn new(mut out: Sink) -> Result<Self, OutputError> {
        out.write_all(b"[").map_err(json_io)?;
        Ok(Self {
            out,
            first: true,
            closed: false,
        })
    }
}

impl ResultWriter for JsonWriter {
    fn write(&mut self, result: &ScanResult) -> Result<(), OutputError> {
        if self.closed {
            return Err(OutputError::Closed { kind: "json" });
        }
        let encoded =
            serde_json::to_string(result).map_err(|e| OutputError::Json { source: e })?;
        let sep: &[u8] = if self.first { b"\n  " } else { b",\n  " };
        self.out.write_all(sep).map_err(json_io)?;
        self.out.write_all(encoded.as_bytes()).map_err(json_io)?;
        self.first = false;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), OutputError> {
        self.out.flush().map_err(json_io)
    }

    fn close(&mut self) -> Result<(), OutputError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let tail: &[u8] = if self.first { b"]\n" } else { b"\n]\n" };
        self.out.write_all(tail).map_err(json_io)?;
        self.out.flush().map_err(json_io)
    }
}

pub struct BufferedJsonWriter {
    out: Sink,
    results: Vec<ScanResult>,
    flushed: bool,
}

impl BufferedJsonWriter {
    pub fn new(out: Sink) -> Self {
        Self {
            out,
            results: Vec::new(),
            flushed: false,
        }
    }
}

impl ResultWriter for BufferedJsonWriter {
    fn write(&mut self, result: &ScanResult) -> Result<(), OutputError> {
        if self.flushed {
            return Err(OutputError::Closed { kind: "json" });
        }
        self.results.push(result.clone());
        Ok(())
    }

    // the whole array goes out in one go, empty or not
    fn flush(&mut self) -> Result<(), OutputError> {
        if self.flushed {
            return Ok(());
        }
        self.flushed = true;
        serde_json::to_writer_pretty(&mut self.out, &self.results)
            .map_err(|e| OutputError::Json { source: e })?;
        self.out.write_all(b"\n").map_err(json_io)?;
        self.out.flush().map_err(json_io)
    }

    fn close(&mut self) -> Result<(), OutputError> {
        self.flush()
    }
}

fn csv_record(result: &ScanResult) -> [String; 7] {
    [
        result.url().to_string(),
        result.status_code().to_string(),
        result.size().to_string(),
        result.method().to_string(),
        result.depth().to_string(),
        result.timestamp().to_rfc3339(),
        result.error().unwrap_or_default().to_string(),
    ]
}

fn csv_err(e: csv::Error) -> OutputError {
    OutputError::Csv { source: e }
}

fn csv_io(e: std::io::Error) -> OutputError {
    OutputError::Io {
        kind: "csv",
        source: e,
    }
}

pub struct CsvWriter {
    out: csv::Writer<Sink>,
    closed: bool,
}

impl CsvWriter {
    pub fn new(out: Sink) -> Result<Self, OutputError> {
        let mut out = csv::Writer::from_writer(out);
        out.write_record(CSV_HEADER).map_err(csv_err)?;
        Ok(Self { out, closed: false })
    }
}

impl ResultWriter for CsvWriter {
    fn write(&mut self, result: &ScanResult) -> Result<(), OutputError> {
        if self.closed {
            return Err(OutputError::Closed { kind: "csv" });
        }
        self.out.write_record(csv_record(result)).map_err(csv_err)
    }

    fn flush(&mut self) -> Result<(), OutputError> {
        self.out.flush().map_err(csv_io)
    }

    fn close(&mut self) -> Result<(), OutputError> {
        self.closed = true;
        self.out.flush().map_err(csv_io)
    }
}

pub struct BufferedCsvWriter {
    out: csv::Writer<Sink>,
    results: Vec<ScanResult>,
    flushed: bool,
}

impl BufferedCsvWriter {
    pub fn new(out: Sink) -> Self {
        Self {
            out: csv::Writer::from_writer(out),
            results: Vec::new(),
            flushed: false,
        }
    }
}

impl ResultWriter for BufferedCsvWriter {
    fn write(&mut self, result: &ScanResult) -> Result<(), OutputError> {
        if self.flushed {
            return Err(OutputError::Closed { kind: "csv" });
        }
        self.results.push(result.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), OutputError> {
        if self.flushed {
            return Ok(());
        }
        self.flushed = true;
        self.out.write_record(CSV_HEADER).map_err(csv_err)?;
        for result in self.results.iter() {
            self.out.write_record(csv_record(result)).map_err(csv_err)?;
        }
        self.out.flush().map_err(csv_io)
    }

    fn close(&mut self) -> Result<(), OutputError> {
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::SharedBuf;
    use super::*;

    fn found(path: &str, status: u16) -> ScanResult {
        ScanResult::response(format!("http://t/{path}"), "GET", status, 42, 1)
    }

    fn failed(path: &str) -> ScanResult {
        ScanResult::failure(format!("http://t/{path}"), "GET", "connection refused", 0)
    }

    #[test]
    fn console_plain_and_verbose_lines() {
        let plain = ConsoleWriter::new(Box::new(std::io::sink()), false, false, false);
        assert_eq!(
            plain.format_line(&found("admin", 301)).as_deref(),
            Some("[301] http://t/admin")
        );
        assert!(plain.format_line(&failed("x")).is_none());

        let verbose = ConsoleWriter::new(Box::new(std::io::sink()), false, true, false);
        let line = verbose.format_line(&found("admin", 200)).unwrap();
        assert!(line.starts_with("[200] http://t/admin [GET] [42 bytes] ["));
        assert_eq!(
            verbose.format_line(&failed("x")).as_deref(),
            Some("[ERROR] http://t/x: connection refused")
        );
    }

    #[test]
    fn console_shows_errors_on_request() {
        let w = ConsoleWriter::new(Box::new(std::io::sink()), false, false, true);
        assert!(w.format_line(&failed("x")).is_some());
    }

    #[test]
    fn streaming_json_is_a_valid_array() {
        let buf = SharedBuf::default();
        let mut w = JsonWriter::new(Box::new(buf.clone())).unwrap();
        w.write(&found("a", 200)).unwrap();
        w.write(&failed("b")).unwrap();
        w.close().unwrap();
        w.close().unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&buf.contents()).unwrap();
        let items = parsed.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["url"], "http://t/a");
        assert_eq!(items[1]["error"], "connection refused");
        assert!(matches!(
            w.write(&found("c", 200)),
            Err(OutputError::Closed { .. })
        ));
    }

    #[test]
    fn empty_streaming_json_closes_to_empty_array() {
        let buf = SharedBuf::default();
        let mut w = JsonWriter::new(Box::new(buf.clone())).unwrap();
        w.close().unwrap();
        assert_eq!(buf.contents(), "[]\n");
    }

    #[test]
    fn buffered_json_writes_once_even_when_empty() {
        let buf = SharedBuf::default();
        let mut w = BufferedJsonWriter::new(Box::new(buf.clone()));
        w.flush().unwrap();
        w.flush().unwrap();
        w.close().unwrap();
        assert_eq!(buf.contents(), "[]\n");
    }

    #[test]
    fn buffered_json_holds_results_until_flush() {
        let buf = SharedBuf::default();
        let mut w = BufferedJsonWriter::new(Box::new(buf.clone()));
        w.write(&found("a", 200)).unwrap();
        assert!(buf.contents().is_empty());
        w.close().unwrap();
        let parsed: Vec<serde_json::Value> = serde_json::from_str(&buf.contents()).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0]["status_code"], 200);
    }

    #[test]
    fn csv_writers_share_the_layout() {
        let streaming = SharedBuf::default();
        let mut s = CsvWriter::new(Box::new(streaming.clone())).unwrap();
        s.write(&failed("down")).unwrap();
        s.close().unwrap();

        let buffered = SharedBuf::default();
        let mut b = BufferedCsvWriter::new(Box::new(buffered.clone()));
        b.write(&failed("down")).unwrap();
        b.close().unwrap();

        for out in [streaming.contents(), buffered.contents()] {
            let mut reader = csv::Reader::from_reader(out.as_bytes());
            let headers = reader.headers().unwrap().clone();
            assert_eq!(headers.iter().collect::<Vec<_>>(), CSV_HEADER.to_vec());
            let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
            assert_eq!(rows.len(), 1);
            assert_eq!(&rows[0][0], "http://t/down");
            assert_eq!(&rows[0][1], "0");
            assert_eq!(&rows[0][6], "connection refused");
        }
    }

    #[test]
    fn empty_buffered_csv_is_header_only() {
        let buf = SharedBuf::default();
        let mut w = BufferedCsvWriter::new(Box::new(buf.clone()));
        w.close().unwrap();
        assert_eq!(
            buf.contents(),
            "URL,StatusCode,Size,Method,Depth,Timestamp,Error\n"
        );
    }
}
