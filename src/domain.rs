use std::fmt;
use std::io::Error;

use derive_setters::Setters;
use polars::error::PolarsError;
use ratatui::crossterm::event::KeyEvent;

pub const HELP_TEXT: &str = "\
assetview - asset inventory viewer

Navigation
  arrows / h j k l   move selection
  PgUp / PgDn        page up / down
  g / G              first / last row
  Enter              show record / pick menu entry
  Esc                go back

Filtering
  f                  filter menu for current column
  x                  clear filter of current column
  X                  clear all filters
  /                  search all cells (empty clears)

Data
  o                  open file or URL
  r                  reload current source
  w                  export visible rows as CSV
  c / C              copy cell / row
  v / V              hide column / show all columns
  i                  toggle row numbers
  ?                  this help
  q                  quit";

#[derive(Debug, Clone, Setters)]
#[setters(prefix = "with_")]
pub struct AVConfig {
    pub max_column_width: usize,
    pub event_poll_time: u64,
}

impl Default for AVConfig {
    fn default() -> Self {
        Self {
            max_column_width: 40,
            event_poll_time: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CMDMode {
    Search,
    Open,
    Export,
}

impl CMDMode {
    pub fn prompt(&self) -> &'static str {
        match self {
            CMDMode::Search => "/",
            CMDMode::Open => "open: ",
            CMDMode::Export => "export to: ",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Quit,
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
    MovePageUp,
    MovePageDown,
    MoveBeginning,
    MoveEnd,
    Enter,
    Exit,
    Help,
    FilterMenu,
    ClearColumnFilter,
    ClearAllFilters,
    Search,
    Open,
    Reload,
    Export,
    CopyCell,
    CopyRow,
    HideColumn,
    ShowAllColumns,
    ToggleIndex,
    Resize(usize, usize),
    RawKey(KeyEvent),
}

#[derive(Debug)]
pub enum AVError {
    IoError(Error),
    PolarsError(PolarsError),
    HttpError(reqwest::Error),
    JsonError(serde_json::Error),
    EmptyInput,
    LoadingFailed(String),
    FileNotFound,
    PermissionDenied,
    UnknownFileType,
    LoadInProgress,
    Prediction(String),
}

impl fmt::Display for AVError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AVError::IoError(e) => write!(f, "io error: {e}"),
            AVError::PolarsError(e) => write!(f, "could not read table: {e}"),
            AVError::HttpError(e) => write!(f, "fetch failed: {e}"),
            AVError::JsonError(e) => write!(f, "invalid json: {e}"),
            AVError::EmptyInput => write!(f, "input contains no data"),
            AVError::LoadingFailed(reason) => write!(f, "loading failed: {reason}"),
            AVError::FileNotFound => write!(f, "file not found"),
            AVError::PermissionDenied => write!(f, "permission denied"),
            AVError::UnknownFileType => write!(f, "unknown file type"),
            AVError::LoadInProgress => write!(f, "a load is already in progress"),
            AVError::Prediction(reason) => write!(f, "request failed, please retry: {reason}"),
        }
    }
}

impl std::error::Error for AVError {}

impl From<Error> for AVError {
    fn from(err: Error) -> Self {
        AVError::IoError(err)
    }
}

impl From<PolarsError> for AVError {
    fn from(err: PolarsError) -> Self {
        AVError::PolarsError(err)
    }
}

impl From<reqwest::Error> for AVError {
    fn from(err: reqwest::Error) -> Self {
        AVError::HttpError(err)
    }
}

impl From<serde_json::Error> for AVError {
    fn from(err: serde_json::Error) -> Self {
        AVError::JsonError(err)
    }
}
