//! Logger setup: stdout, optionally teed into a size-rotated log file.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use mqttvold_lib::config::{Config, parse_log_level};

/// Rotate the log file once it would grow past this size.
pub const MAX_LOG_BYTES: u64 = 10_000_000;

/// Initialize the global logger from config. `RUST_LOG` overrides the
/// configured level.
pub fn init(config: &Config) {
    let level = parse_log_level(&config.log_level).unwrap_or(log::LevelFilter::Error);

    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(level.to_string()),
    );
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} {:>7}: {}",
            buf.timestamp_millis(),
            record.level(),
            record.args()
        )
    });
    builder.target(env_logger::Target::Stdout);

    if config.log_file {
        match Config::log_path() {
            Some(path) => match RotatingFile::open(&path, MAX_LOG_BYTES) {
                Ok(file) => {
                    println!("Logging to {}", path.display());
                    let tee = Tee {
                        first: io::stdout(),
                        second: file,
                    };
                    builder.target(env_logger::Target::Pipe(Box::new(tee)));
                }
                Err(e) => eprintln!("cannot open log file {}: {e}", path.display()),
            },
            None => eprintln!("no state directory, logging to stdout only"),
        }
    }

    builder.init();
}

/// Append-only log file that keeps one backup (`<name>.1`) once it exceeds
/// `max_bytes`.
pub struct RotatingFile {
    path: PathBuf,
    file: File,
    written: u64,
    max_bytes: u64,
}

impl RotatingFile {
    pub fn open(path: &Path, max_bytes: u64) -> io::Result<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            file,
            written,
            max_bytes,
        })
    }

    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".1");
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        std::fs::rename(&self.path, self.backup_path())?;
        self.file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        self.written = 0;
        Ok(())
    }
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

/// Writes every buffer to both sinks.
struct Tee<A, B> {
    first: A,
    second: B,
}

impl<A: Write, B: Write> Write for Tee<A, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.first.write_all(buf)?;
        self.second.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.first.flush()?;
        self.second.flush()
    }
}
