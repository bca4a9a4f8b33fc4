//! Size-rotated log files
//!
//! Two naming schemes are supported. Per-severity streams get a fresh
//! `<program>.log.<SEVERITY>.<YYYYmmdd-HHMMSS>.<pid>` file on every rotation
//! and a `<program>.<SEVERITY>` symlink pointing at the newest one. A single
//! fixed log file is renamed to numbered backups (`.1` newest) instead,
//! optionally gzip-compressed.

use crate::core::error::{LoggerError, Result};
use crate::core::severity::Severity;
use chrono::Local;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Default size threshold: 1800 MiB
pub const DEFAULT_MAX_SIZE: u64 = 1800 * 1024 * 1024;

const BUFFER_SIZE: usize = 256 * 1024;

/// How the backing file of a stream is named
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileNaming {
    /// New timestamped file in `dir` on every rotation
    Timestamped {
        dir: PathBuf,
        program: String,
        severity: Severity,
    },
    /// One path; rotation shifts older content into numbered backups
    Fixed { path: PathBuf },
}

/// When and how a file rotates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Rotate when a write would grow the file past this many bytes
    pub max_bytes: u64,
    /// Numbered backups kept for [`FileNaming::Fixed`]
    pub max_backups: usize,
    /// Gzip backups of [`FileNaming::Fixed`] files
    pub compress: bool,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_SIZE,
            max_backups: 3,
            compress: false,
        }
    }
}

impl RotationPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_max_size(mut self, size: u64) -> Self {
        self.max_bytes = size;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_max_backups(mut self, count: usize) -> Self {
        self.max_backups = count;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compress = enabled;
        self
    }
}

/// What happened to the file during one [`RotatingFile::write`]
#[derive(Debug)]
pub enum WriteOutcome {
    Appended,
    /// A new file was started before the data went in
    Rotated,
    /// Rotation was due but failed; the data went to the current file
    RotationFailed(LoggerError),
}

impl WriteOutcome {
    #[must_use]
    pub fn rotated(&self) -> bool {
        matches!(self, WriteOutcome::Rotated)
    }
}

/// A buffered log file that rotates by size
pub struct RotatingFile {
    naming: FileNaming,
    policy: RotationPolicy,
    write_headers: bool,
    writer: Option<BufWriter<File>>,
    path: PathBuf,
    nbytes: u64,
}

impl RotatingFile {
    /// Open the first backing file.
    ///
    /// # Errors
    ///
    /// Returns error if the directory or file cannot be created
    pub fn create(naming: FileNaming, policy: RotationPolicy, write_headers: bool) -> Result<Self> {
        let mut file = Self {
            naming,
            policy,
            write_headers,
            writer: None,
            path: PathBuf::new(),
            nbytes: 0,
        };
        file.open_initial()?;
        Ok(file)
    }

    /// Append `data`, rotating first when it would exceed the size limit.
    ///
    /// A failed rotation is handed back in the outcome and the current file
    /// keeps receiving data. Only the write itself fails the call.
    pub fn write(&mut self, data: &[u8]) -> Result<WriteOutcome> {
        let mut outcome = WriteOutcome::Appended;
        if self.nbytes > 0 && self.nbytes + data.len() as u64 > self.policy.max_bytes {
            match self.rotate() {
                Ok(()) => outcome = WriteOutcome::Rotated,
                Err(e) => {
                    if self.writer.is_none() {
                        self.reopen_current()?;
                    }
                    // Let the file grow past the limit instead of retrying on every write
                    self.nbytes = 0;
                    outcome = WriteOutcome::RotationFailed(e);
                }
            }
        }

        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| LoggerError::Closed(self.path.display().to_string()))?;
        writer.write_all(data).map_err(|e| {
            LoggerError::io_operation("writing log file", self.path.display().to_string(), e)
        })?;
        self.nbytes += data.len() as u64;
        Ok(outcome)
    }

    pub fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush().map_err(|e| {
                LoggerError::io_operation(
                    "flushing log file",
                    self.path.display().to_string(),
                    e,
                )
            })?;
        }
        Ok(())
    }

    /// Path of the file currently written
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Log bytes in the current file. The file header is not counted.
    #[must_use]
    pub fn current_size(&self) -> u64 {
        self.nbytes
    }

    #[must_use]
    pub fn policy(&self) -> &RotationPolicy {
        &self.policy
    }

    fn open_initial(&mut self) -> Result<()> {
        match self.naming.clone() {
            FileNaming::Timestamped { .. } => self.open_timestamped(),
            FileNaming::Fixed { path } => {
                ensure_parent(&path)?;
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .map_err(|e| {
                        LoggerError::file_open(path.display().to_string(), e.to_string())
                    })?;
                let existing = file.metadata().map(|m| m.len()).unwrap_or(0);
                self.install(file, path, existing)
            }
        }
    }

    fn rotate(&mut self) -> Result<()> {
        // Buffered lines stay with the old file; on failure it is kept as is
        self.flush_for_rotation()?;
        match self.naming.clone() {
            FileNaming::Timestamped { .. } => {
                let old = self.writer.take();
                if let Err(e) = self.open_timestamped() {
                    self.writer = old;
                    return Err(e);
                }
                Ok(())
            }
            FileNaming::Fixed { path } => self.rotate_fixed(&path),
        }
    }

    fn flush_for_rotation(&mut self) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };
        writer.flush().map_err(|e| {
            LoggerError::rotation(
                self.path.display().to_string(),
                format!("flush before rotation failed: {}", e),
            )
        })
    }

    fn open_timestamped(&mut self) -> Result<()> {
        let FileNaming::Timestamped {
            dir,
            program,
            severity,
        } = &self.naming
        else {
            return Err(LoggerError::other("not a timestamped log file"));
        };

        fs::create_dir_all(dir).map_err(|e| {
            LoggerError::io_operation(
                "creating log directory",
                dir.display().to_string(),
                e,
            )
        })?;

        let base = format!(
            "{}.log.{}.{}.{}",
            program,
            severity,
            Local::now().format("%Y%m%d-%H%M%S"),
            std::process::id()
        );
        let (file, path) = create_unique(dir, &base)?;
        update_symlink(dir, &format!("{}.{}", program, severity), &path);
        self.writer = None;
        self.install(file, path, 0)
    }

    fn rotate_fixed(&mut self, path: &Path) -> Result<()> {
        self.writer = None;
        if self.policy.max_backups > 0 {
            self.shift_backups(path)?;
            let first = backup_path(path, 1);
            fs::rename(path, &first).map_err(|e| {
                LoggerError::rotation(
                    path.display().to_string(),
                    format!("cannot move current file aside: {}", e),
                )
            })?;
            if self.policy.compress {
                compress_file(&first)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|e| {
                LoggerError::rotation(
                    path.display().to_string(),
                    format!("cannot create new file: {}", e),
                )
            })?;
        self.install(file, path.to_path_buf(), 0)
    }

    fn shift_backups(&self, path: &Path) -> Result<()> {
        let max = self.policy.max_backups;
        for oldest in [backup_path(path, max), gz_path(&backup_path(path, max))] {
            if oldest.exists() {
                fs::remove_file(&oldest).map_err(|e| {
                    LoggerError::rotation(
                        oldest.display().to_string(),
                        format!("cannot remove oldest backup: {}", e),
                    )
                })?;
            }
        }

        for i in (1..max).rev() {
            let from = backup_path(path, i);
            let to = backup_path(path, i + 1);
            for (from, to) in [(gz_path(&from), gz_path(&to)), (from, to)] {
                if from.exists() {
                    fs::rename(&from, &to).map_err(|e| {
                        LoggerError::rotation(
                            from.display().to_string(),
                            format!("cannot shift backup: {}", e),
                        )
                    })?;
                }
            }
        }
        Ok(())
    }

    fn reopen_current(&mut self) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                LoggerError::file_open(
                    self.path.display().to_string(),
                    format!("reopen after failed rotation: {}", e),
                )
            })?;
        self.writer = Some(BufWriter::with_capacity(BUFFER_SIZE, file));
        Ok(())
    }

    fn install(&mut self, file: File, path: PathBuf, existing: u64) -> Result<()> {
        let mut writer = BufWriter::with_capacity(BUFFER_SIZE, file);
        if self.write_headers {
            writer.write_all(file_header().as_bytes()).map_err(|e| {
                LoggerError::io_operation("writing log file header", path.display().to_string(), e)
            })?;
        }
        self.writer = Some(writer);
        self.path = path;
        self.nbytes = existing;
        Ok(())
    }
}

impl Drop for RotatingFile {
    fn drop(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.flush();
        }
    }
}

impl std::fmt::Debug for RotatingFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RotatingFile")
            .field("path", &self.path)
            .field("nbytes", &self.nbytes)
            .field("policy", &self.policy)
            .finish()
    }
}

/// Lines written at the top of every new log file
fn file_header() -> String {
    let binary = std::env::current_exe()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "unknown".to_string());
    format!(
        "Log file created at: {}\n\
         Binary: {} (plog {}) for {}/{}\n\
         Log line format: [IWEF]mmdd hh:mm:ss.uuuuuu pid file:line] msg\n",
        Local::now().format("%Y/%m/%d %H:%M:%S"),
        binary,
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH,
    )
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            LoggerError::io_operation(
                "creating log directory",
                parent.display().to_string(),
                e,
            )
        })?;
    }
    Ok(())
}

/// Create `dir/base`, or `dir/base.N` when that name is taken
fn create_unique(dir: &Path, base: &str) -> Result<(File, PathBuf)> {
    for seq in 0..1000u32 {
        let name = if seq == 0 {
            base.to_string()
        } else {
            format!("{}.{}", base, seq)
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((file, path)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(LoggerError::file_open(
                    path.display().to_string(),
                    e.to_string(),
                ))
            }
        }
    }
    Err(LoggerError::file_open(
        dir.join(base).display().to_string(),
        "no free file name",
    ))
}

#[cfg(unix)]
fn update_symlink(dir: &Path, link_name: &str, target: &Path) {
    let link = dir.join(link_name);
    let Some(target_name) = target.file_name() else {
        return;
    };
    let _ = fs::remove_file(&link);
    let _ = std::os::unix::fs::symlink(target_name, &link);
}

#[cfg(not(unix))]
fn update_symlink(_dir: &Path, _link_name: &str, _target: &Path) {}

fn backup_path(path: &Path, index: usize) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{}", index));
    PathBuf::from(name)
}

fn gz_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".gz");
    PathBuf::from(name)
}

/// Gzip `path` into `path.gz` through a temporary file; the original is
/// removed only after the archive is complete.
#[cfg(feature = "compression")]
fn compress_file(path: &Path) -> Result<()> {
    use std::io::BufReader;

    let gz = gz_path(path);
    let mut tmp_name = gz.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    let result = (|| -> io::Result<()> {
        let mut reader = BufReader::with_capacity(64 * 1024, File::open(path)?);
        let output = BufWriter::with_capacity(64 * 1024, File::create(&tmp)?);
        let mut encoder = flate2::write::GzEncoder::new(output, flate2::Compression::default());
        io::copy(&mut reader, &mut encoder)?;
        encoder.finish()?.flush()?;
        fs::rename(&tmp, &gz)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(LoggerError::io_operation(
            "compressing log backup",
            path.display().to_string(),
            e,
        ));
    }

    if let Err(e) = fs::remove_file(path) {
        eprintln!(
            "[plog WARN] compressed {} but could not remove it: {}",
            path.display(),
            e
        );
    }
    Ok(())
}

#[cfg(not(feature = "compression"))]
fn compress_file(path: &Path) -> Result<()> {
    Err(LoggerError::rotation(
        path.display().to_string(),
        "compression support is not compiled in",
    ))
}
