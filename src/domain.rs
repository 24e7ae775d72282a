use std::path::PathBuf;
use std::time::Duration;

use ratatui::crossterm::event::KeyEvent;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::api::ApiError;
use crate::locale::{self, FieldSource, Language};

pub const DEFAULT_API_URL: &str = "http://localhost:8000";

#[derive(Debug, Error)]
pub enum PharmError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("logging setup failed: {0}")]
    Logging(String),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_url: String,
    pub language: Language,
    pub event_poll_time: u64,
    pub max_column_width: usize,
    pub page_size: usize,
    pub autoplay_interval: Duration,
    pub token_file: Option<String>,
    pub download_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            language: Language::default(),
            event_poll_time: 100,
            max_column_width: 40,
            page_size: crate::table::DEFAULT_PAGE_SIZE,
            autoplay_interval: crate::carousel::AUTOPLAY_INTERVAL,
            token_file: None,
            download_dir: PathBuf::from("."),
        }
    }
}

/// A JSON object as returned by the REST API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(pub Map<String, Value>);

impl Record {
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Record(map)),
            _ => None,
        }
    }

    pub fn identifier(&self) -> Option<i64> {
        self.0.get("id").and_then(Value::as_i64)
    }

    /// Textual form of an attribute. Nested values come back as compact JSON.
    pub fn text(&self, key: &str) -> Option<String> {
        self.0.field(key)
    }

    pub fn flag(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    pub fn number(&self, key: &str) -> Option<i64> {
        self.0.get(key).and_then(Value::as_i64)
    }

    pub fn localized(&self, base: &str, lang: Language) -> String {
        locale::resolve(&self.0, base, lang)
    }

    /// Attribute names, sorted alphabetically.
    pub fn keys(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }
}

impl FieldSource for Record {
    fn field(&self, key: &str) -> Option<String> {
        self.text(key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CMDMode {
    Search,
    ConfirmDelete,
    LoginUser,
    LoginPassword,
    EditField,
    Create,
    UploadImage,
    UploadPdf,
}

impl CMDMode {
    pub fn prompt(&self) -> &'static str {
        match self {
            CMDMode::Search => "/",
            CMDMode::ConfirmDelete => "Delete? (y/N) ",
            CMDMode::LoginUser => "Username: ",
            CMDMode::LoginPassword => "Password: ",
            CMDMode::EditField => "Value: ",
            CMDMode::Create => "JSON: ",
            CMDMode::UploadImage => "Image file: ",
            CMDMode::UploadPdf => "PDF file: ",
        }
    }

    pub fn masked(&self) -> bool {
        matches!(self, CMDMode::LoginPassword)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Quit,
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
    NextPage,
    PrevPage,
    FirstPage,
    LastPage,
    Jump(usize),
    NextTab,
    PrevTab,
    Enter,
    Exit,
    Search,
    Delete,
    EditField,
    Create,
    UploadImage,
    UploadPdf,
    CreateBackup,
    DownloadBackup,
    Login,
    Logout,
    ToggleLanguage,
    Refresh,
    CopyCell,
    Help,
    Resize(usize, usize),
    RawKey(KeyEvent),
}

pub const HELP_TEXT: &str = "\
Navigation
  Tab / S-Tab   next / previous view
  1-9           open resource (home: show slide)
  j k ↑ ↓       move selection
  h l ← →       previous / next page (home: slide)
  g G           first / last page
  Enter         open record
  Esc           back / close

Content
  /             search in all fields
  e             edit selected field (record view)
  c             create record from JSON
  d             delete selected record
  i f           upload image / pdf
  y             copy value or media url
  r             reload

Admin
  L O           login / logout
  b B           create / download backup
  t             switch language (uz, ru, en)
  ?             this help
  q             quit";
