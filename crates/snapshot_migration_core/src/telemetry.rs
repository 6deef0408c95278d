use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct Sinks {
    stderr: bool,
    file: Option<Mutex<File>>,
    capture: Option<Arc<Mutex<Vec<Value>>>>,
}

/// Structured JSON-lines event log. Cheap to clone; clones share sinks.
#[derive(Debug, Clone)]
pub struct EventLog {
    component: &'static str,
    min_level: LogLevel,
    sinks: Arc<Sinks>,
}

/// Test-side view of events written through [`EventLog::capturing`].
#[derive(Debug, Clone)]
pub struct EventCapture {
    entries: Arc<Mutex<Vec<Value>>>,
}

impl EventCapture {
    pub fn entries(&self) -> Vec<Value> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn events_named(&self, event: &str) -> Vec<Value> {
        self.entries()
            .into_iter()
            .filter(|entry| entry.get("event").and_then(Value::as_str) == Some(event))
            .collect()
    }
}

impl EventLog {
    pub fn stderr(component: &'static str) -> Self {
        Self {
            component,
            min_level: LogLevel::Info,
            sinks: Arc::new(Sinks {
                stderr: true,
                ..Sinks::default()
            }),
        }
    }

    /// Writes to stderr and appends the same lines to `path`.
    pub fn stderr_and_file(component: &'static str, path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            component,
            min_level: LogLevel::Info,
            sinks: Arc::new(Sinks {
                stderr: true,
                file: Some(Mutex::new(file)),
                capture: None,
            }),
        })
    }

    pub fn capturing(component: &'static str) -> (Self, EventCapture) {
        let entries = Arc::new(Mutex::new(Vec::new()));
        let log = Self {
            component,
            min_level: LogLevel::Debug,
            sinks: Arc::new(Sinks {
                stderr: false,
                file: None,
                capture: Some(Arc::clone(&entries)),
            }),
        };
        (log, EventCapture { entries })
    }

    pub fn with_min_level(mut self, min_level: LogLevel) -> Self {
        self.min_level = min_level;
        self
    }

    pub fn for_component(&self, component: &'static str) -> Self {
        Self {
            component,
            min_level: self.min_level,
            sinks: Arc::clone(&self.sinks),
        }
    }

    pub fn debug(&self, event: &str, details: Value) {
        self.emit(LogLevel::Debug, event, details);
    }

    pub fn info(&self, event: &str, details: Value) {
        self.emit(LogLevel::Info, event, details);
    }

    pub fn warn(&self, event: &str, details: Value) {
        self.emit(LogLevel::Warn, event, details);
    }

    pub fn error(&self, event: &str, details: Value) {
        self.emit(LogLevel::Error, event, details);
    }

    fn emit(&self, level: LogLevel, event: &str, details: Value) {
        if level < self.min_level {
            return;
        }
        let entry = json!({
            "component": self.component,
            "level": level.as_str(),
            "event": event,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "details": details,
        });

        if self.sinks.stderr {
            eprintln!("{entry}");
        }
        if let Some(file) = &self.sinks.file {
            if let Ok(mut file) = file.lock() {
                let _ = writeln!(file, "{entry}");
            }
        }
        if let Some(capture) = &self.sinks.capture {
            if let Ok(mut entries) = capture.lock() {
                entries.push(entry);
            }
        }
    }
}
