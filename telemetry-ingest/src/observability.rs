use std::{
    env,
    ffi::OsString,
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;

pub const LOG_FILE_NAME: &str = "app.log";

/// Effective level and log directory after environment overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: String,
    pub dir: Option<PathBuf>,
}

impl LogSettings {
    /// `level` (from `LOG_LEVEL`) and `dir` (from `LOG_DIR`) win over the
    /// config when set; a blank level is ignored.
    pub fn resolve(cfg: &LoggingConfig, level: Option<String>, dir: Option<OsString>) -> Self {
        let level = level
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| cfg.level.clone())
            .trim()
            .to_lowercase();
        let dir = dir.map(PathBuf::from).or_else(|| cfg.dir.clone());
        Self { level, dir }
    }

    pub fn from_env(cfg: &LoggingConfig) -> Self {
        Self::resolve(cfg, env::var("LOG_LEVEL").ok(), env::var_os("LOG_DIR"))
    }
}

/// Install the global subscriber: a stderr console layer, plus a JSON file
/// layer under the log directory when one is configured.
///
/// `LOG_LEVEL` and `LOG_DIR` override the config values; `RUST_LOG`
/// directives still apply on top.
pub fn init_tracing(cfg: &LoggingConfig) -> anyhow::Result<()> {
    let LogSettings { level, dir } = LogSettings::from_env(cfg);

    let console = fmt::layer()
        .with_target(false)
        .with_writer(io::stderr)
        .with_filter(env_filter(&level)?);

    let file = match dir {
        Some(dir) => {
            let path = dir.join(LOG_FILE_NAME);
            let writer = RotatingFile::open(path, cfg.max_file_bytes, cfg.retention)?;
            Some(
                fmt::layer()
                    .json()
                    .with_writer(Mutex::new(writer))
                    .with_filter(env_filter(&level)?),
            )
        }
        None => None,
    };

    tracing_subscriber::registry().with(console).with(file).try_init()?;
    Ok(())
}

fn env_filter(level: &str) -> anyhow::Result<EnvFilter> {
    Ok(EnvFilter::from_default_env()
        .add_directive(format!("telemetry_ingest={level}").parse()?)
        .add_directive(format!("meter_model={level}").parse()?))
}

/// Size-capped log file. When a write would push the active file past
/// `max_bytes` it becomes `<path>.1`, older backups shift up by one and
/// anything past `retention` is deleted.
pub struct RotatingFile {
    path: PathBuf,
    file: File,
    written: u64,
    max_bytes: u64,
    retention: usize,
}

impl RotatingFile {
    pub fn open(path: impl Into<PathBuf>, max_bytes: u64, retention: usize) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = open_append(&path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            path,
            file,
            written,
            max_bytes,
            retention,
        })
    }

    fn backup_path(&self, n: usize) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(format!(".{n}"));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;

        if self.retention == 0 {
            fs::remove_file(&self.path)?;
        } else {
            let oldest = self.backup_path(self.retention);
            if oldest.exists() {
                fs::remove_file(&oldest)?;
            }
            for n in (1..self.retention).rev() {
                let from = self.backup_path(n);
                if from.exists() {
                    fs::rename(&from, self.backup_path(n + 1))?;
                }
            }
            fs::rename(&self.path, self.backup_path(1))?;
        }

        self.file = open_append(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.max_bytes {
            self.rotate()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}
