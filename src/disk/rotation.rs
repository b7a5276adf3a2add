//! Rotating file sink
//!
//! Lines are appended to `<path>`. Before each append the active file size
//! is checked; once it exceeds the configured maximum the generations shift
//! (`<path>.N-1` → `<path>.N`, ..., `<path>` → `<path>.1`) and a fresh active
//! file is started. Anything beyond `<path>.N` is dropped.
//!
//! Appending is best effort. Storage errors are swallowed and reported once
//! per failure streak, so a full or missing filesystem never destabilises
//! the drain loop.

use crate::config::FileLogConfig;
use crate::disk::Storage;
use std::io;
use tracing::{debug, warn};

/// Appends lines to a generationally rotated log file
pub struct RotationSink {
    storage: Box<dyn Storage>,
    degraded: bool,
    rotations: u64,
}

impl RotationSink {
    /// Create a sink writing through `storage`
    pub fn new(storage: Box<dyn Storage>) -> Self {
        Self { storage, degraded: false, rotations: 0 }
    }

    /// Path of generation `n` (0 is the active file)
    pub fn generation_path(path: &str, n: u8) -> String {
        if n == 0 {
            path.to_string()
        } else {
            format!("{}.{}", path, n)
        }
    }

    /// Append a line if file logging is enabled, rotating first when needed
    pub fn append(&mut self, cfg: &FileLogConfig, line: &[u8]) {
        if !cfg.enabled || line.is_empty() {
            return;
        }

        // A failed rotation still appends to the active file
        let rotated = self.rotate_if_needed(cfg);
        let appended = self.storage.append(&cfg.path, line);
        let result = rotated.and(appended);

        match result {
            Ok(()) => {
                if self.degraded {
                    debug!(path = %cfg.path, "file log writable again");
                    self.degraded = false;
                }
            }
            Err(e) => {
                if !self.degraded {
                    warn!(path = %cfg.path, error = %e, "file log write failed, continuing without it");
                    self.degraded = true;
                }
            }
        }
    }

    /// Rotate when the active file exceeds `cfg.max_file_size`
    ///
    /// # Returns
    ///
    /// Whether a rotation happened
    pub fn rotate_if_needed(&mut self, cfg: &FileLogConfig) -> io::Result<bool> {
        let size = self.current_size(cfg);
        if size <= cfg.max_file_size {
            return Ok(false);
        }
        self.rotate(cfg)?;
        Ok(true)
    }

    /// Shift every generation up by one and retire the active file
    pub fn rotate(&mut self, cfg: &FileLogConfig) -> io::Result<()> {
        let path = cfg.path.as_str();
        if cfg.max_files == 0 {
            if self.storage.exists(path) {
                self.storage.remove(path)?;
            }
            self.rotations += 1;
            return Ok(());
        }

        for i in (1..cfg.max_files).rev() {
            let from = Self::generation_path(path, i);
            let to = Self::generation_path(path, i + 1);
            if self.storage.exists(&from) {
                if self.storage.exists(&to) {
                    self.storage.remove(&to)?;
                }
                self.storage.rename(&from, &to)?;
            }
        }

        let first = Self::generation_path(path, 1);
        if self.storage.exists(&first) {
            self.storage.remove(&first)?;
        }
        if self.storage.exists(path) {
            self.storage.rename(path, &first)?;
        }
        self.rotations += 1;
        debug!(path, generations = cfg.max_files, "rotated file log");
        Ok(())
    }

    /// Size of the active file; a missing file counts as empty
    pub fn current_size(&self, cfg: &FileLogConfig) -> u64 {
        self.storage.size(&cfg.path).unwrap_or(0)
    }

    /// Number of historical generations present on storage
    pub fn generations(&self, cfg: &FileLogConfig) -> usize {
        (1..=cfg.max_files)
            .filter(|&n| self.storage.exists(&Self::generation_path(&cfg.path, n)))
            .count()
    }

    /// Rotations performed since creation
    pub fn rotations(&self) -> u64 {
        self.rotations
    }

    /// Whether the last append failed
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::FsStorage;
    use std::fs;
    use tempfile::tempdir;

    fn file_cfg(max_file_size: u64, max_files: u8) -> FileLogConfig {
        FileLogConfig {
            enabled: true,
            path: "/console.log".to_string(),
            max_file_size,
            max_files,
        }
    }

    #[test]
    fn test_generation_paths() {
        assert_eq!(RotationSink::generation_path("/log", 0), "/log");
        assert_eq!(RotationSink::generation_path("/log", 3), "/log.3");
    }

    #[test]
    fn test_append_without_rotation() {
        let dir = tempdir().unwrap();
        let mut sink = RotationSink::new(Box::new(FsStorage::new(dir.path())));
        let cfg = file_cfg(1024, 3);

        sink.append(&cfg, b"one\n");
        sink.append(&cfg, b"two\n");

        assert_eq!(fs::read(dir.path().join("console.log")).unwrap(), b"one\ntwo\n");
        assert_eq!(sink.generations(&cfg), 0);
        assert_eq!(sink.rotations(), 0);
    }

    #[test]
    fn test_rotation_keeps_max_generations() {
        let dir = tempdir().unwrap();
        let mut sink = RotationSink::new(Box::new(FsStorage::new(dir.path())));
        let cfg = file_cfg(10, 3);

        // Each line is 11 bytes, so every append after the first crosses the threshold
        for i in 1..=5 {
            sink.append(&cfg, format!("gen-{}-line\n", i).as_bytes());
        }

        assert_eq!(sink.rotations(), 4);
        assert_eq!(sink.generations(&cfg), 3);
        let read = |name: &str| fs::read_to_string(dir.path().join(name)).unwrap();
        assert_eq!(read("console.log"), "gen-5-line\n");
        assert_eq!(read("console.log.1"), "gen-4-line\n");
        assert_eq!(read("console.log.2"), "gen-3-line\n");
        assert_eq!(read("console.log.3"), "gen-2-line\n");
        assert!(!dir.path().join("console.log.4").exists());
    }

    #[test]
    fn test_disabled_sink_writes_nothing() {
        let dir = tempdir().unwrap();
        let mut sink = RotationSink::new(Box::new(FsStorage::new(dir.path())));
        let mut cfg = file_cfg(10, 3);
        cfg.enabled = false;

        sink.append(&cfg, b"ignored\n");
        assert!(!dir.path().join("console.log").exists());
    }

    #[test]
    fn test_zero_generations_truncates() {
        let dir = tempdir().unwrap();
        let mut sink = RotationSink::new(Box::new(FsStorage::new(dir.path())));
        let cfg = file_cfg(4, 0);

        sink.append(&cfg, b"first\n");
        sink.append(&cfg, b"second\n");
        assert_eq!(fs::read(dir.path().join("console.log")).unwrap(), b"second\n");
        assert!(!dir.path().join("console.log.1").exists());
    }

    #[test]
    fn test_storage_failure_is_swallowed() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("not-mounted");
        let mut sink = RotationSink::new(Box::new(FsStorage::new(&missing)));
        let cfg = file_cfg(1024, 3);

        sink.append(&cfg, b"lost\n");
        assert!(sink.is_degraded());

        fs::create_dir(&missing).unwrap();
        sink.append(&cfg, b"kept\n");
        assert!(!sink.is_degraded());
        assert_eq!(fs::read(missing.join("console.log")).unwrap(), b"kept\n");
    }

    /// Filesystem storage whose renames always fail
    struct NoRename(FsStorage);

    impl Storage for NoRename {
        fn exists(&self, path: &str) -> bool {
            self.0.exists(path)
        }

        fn size(&self, path: &str) -> io::Result<u64> {
            self.0.size(path)
        }

        fn append(&mut self, path: &str, data: &[u8]) -> io::Result<()> {
            self.0.append(path, data)
        }

        fn rename(&mut self, _from: &str, _to: &str) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only directory"))
        }

        fn remove(&mut self, path: &str) -> io::Result<()> {
            self.0.remove(path)
        }
    }

    #[test]
    fn test_failed_rotation_still_appends() {
        let dir = tempdir().unwrap();
        let mut sink = RotationSink::new(Box::new(NoRename(FsStorage::new(dir.path()))));
        let cfg = file_cfg(4, 3);

        sink.append(&cfg, b"first\n");
        assert!(!sink.is_degraded());
        sink.append(&cfg, b"second\n");

        assert!(sink.is_degraded());
        assert_eq!(sink.rotations(), 0);
        assert_eq!(fs::read(dir.path().join("console.log")).unwrap(), b"first\nsecond\n");
    }
}
