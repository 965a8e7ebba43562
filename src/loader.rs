use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use polars::prelude::*;
use rayon::prelude::*;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, error, info};

use crate::dataset::Dataset;
use crate::domain::AVError;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, PartialEq)]
enum FileType {
    CSV,
    PARQUET,
    ARROW,
}

/// Where a dataset comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    File(PathBuf),
    Remote(String),
}

impl Source {
    /// URLs starting with http(s):// are fetched, everything else is a path.
    /// Paths are shell expanded (`~`, `$VAR`).
    pub fn parse(input: &str) -> Result<Self, AVError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(AVError::LoadingFailed("no source given".into()));
        }
        let lower = input.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Ok(Source::Remote(input.to_string()));
        }
        let expanded =
            shellexpand::full(input).map_err(|e| AVError::LoadingFailed(e.to_string()))?;
        Ok(Source::File(PathBuf::from(expanded.into_owned())))
    }

    fn name(&self) -> String {
        match self {
            Source::File(path) => path
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("???")
                .to_string(),
            Source::Remote(url) => url.rsplit('/').next().unwrap_or(url).to_string(),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::File(path) => write!(f, "{}", path.display()),
            Source::Remote(url) => write!(f, "{url}"),
        }
    }
}

/// Read a whole dataset from `source`. Blocks until done.
pub fn load(source: &Source) -> Result<Dataset, AVError> {
    let start_time = Instant::now();
    let dataset = match source {
        Source::File(path) => load_file(path)?,
        Source::Remote(url) => Dataset::parse(&fetch(url)?)?,
    };
    info!(
        "Loading {} took {}ms ...",
        source,
        start_time.elapsed().as_millis()
    );
    Ok(dataset.with_name(source.name()))
}

fn load_file(path: &Path) -> Result<Dataset, AVError> {
    let metadata = fs::metadata(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => AVError::FileNotFound,
        ErrorKind::PermissionDenied => AVError::PermissionDenied,
        _ => AVError::IoError(e),
    })?;
    if !metadata.is_file() {
        return Err(AVError::LoadingFailed("Not a file!".into()));
    }
    debug!("Reading {} ({} bytes)", path.display(), metadata.len());

    match detect_file_type(path)? {
        FileType::CSV => Dataset::parse(&fs::read_to_string(path)?),
        FileType::PARQUET => load_frame(LazyFrame::scan_parquet(
            PlPath::Local(path.into()),
            ScanArgsParquet::default(),
        )?),
        FileType::ARROW => load_frame(LazyFrame::scan_ipc(
            PlPath::Local(path.into()),
            polars::io::ipc::IpcScanOptions,
            UnifiedScanArgs::default(),
        )?),
    }
}

fn detect_file_type(path: &Path) -> Result<FileType, AVError> {
    match path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_uppercase())
        .as_deref()
    {
        Some("CSV") => Ok(FileType::CSV),
        Some("PARQUET") | Some("PQ") => Ok(FileType::PARQUET),
        Some("ARROW") | Some("IPC") | Some("FEATHER") => Ok(FileType::ARROW),
        _ => Err(AVError::UnknownFileType),
    }
}

// Columnar formats are turned into the same string records as CSV input.
// Each column is converted in its own rayon task; nulls become empty cells.
fn load_frame(frame: LazyFrame) -> Result<Dataset, AVError> {
    let df = frame.collect()?;
    let header: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();
    let columns = header
        .par_iter()
        .map(|name| column_as_strings(&df, name))
        .collect::<Result<Vec<Vec<String>>, PolarsError>>()?;
    Dataset::from_columns(header, columns)
}

fn column_as_strings(df: &DataFrame, name: &str) -> Result<Vec<String>, PolarsError> {
    let col = df.column(name)?.cast(&DataType::String)?;
    let series = col.str()?;
    Ok(series
        .into_iter()
        .map(|value| value.map(|s| s.trim().to_string()).unwrap_or_default())
        .collect())
}

fn fetch(url: &str) -> Result<String, AVError> {
    let client = reqwest::blocking::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .build()?;
    let response = client.get(url).send()?.error_for_status()?;
    let is_html = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("html"));
    if is_html {
        return Err(AVError::LoadingFailed(format!("{url} did not return CSV")));
    }
    Ok(response.text()?)
}

/// Runs at most one load at a time on a background thread.
#[derive(Debug, Default)]
pub struct Loader {
    pending: Option<(Source, Receiver<Result<Dataset, AVError>>)>,
}

impl Loader {
    /// Start loading `source`. Fails with `LoadInProgress` while an earlier
    /// load has not been collected through `poll`.
    pub fn start(&mut self, source: Source) -> Result<(), AVError> {
        if self.is_busy() {
            return Err(AVError::LoadInProgress);
        }
        let (tx, rx) = mpsc::channel();
        let thread_source = source.clone();
        thread::spawn(move || {
            let result = load(&thread_source);
            if let Err(e) = &result {
                error!("Loading {} failed: {}", thread_source, e);
            }
            // The receiver is gone if the app quit in the meantime.
            let _ = tx.send(result);
        });
        self.pending = Some((source, rx));
        Ok(())
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    /// Collect the finished load, if any.
    pub fn poll(&mut self) -> Option<(Source, Result<Dataset, AVError>)> {
        let (_, rx) = self.pending.as_ref()?;
        let result = match rx.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => {
                Err(AVError::LoadingFailed("loader thread stopped".into()))
            }
        };
        self.pending.take().map(|(source, _)| (source, result))
    }
}
