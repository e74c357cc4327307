//! Serial-port indicators (fit-statUSB and compatibles).
//!
//! The port is discovered by listing a device directory (`/dev` by default)
//! for names starting with the configured pattern, and keeping the first one
//! that opens read-write. Colors are written as `#RRGGBB\n`.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::{AdapterKind, DeviceAdapter, DeviceError, Result, RetryPolicy};
use crate::led::{RenderOptions, Rgb};

#[cfg(target_os = "macos")]
pub const DEFAULT_PORT_PATTERN: &str = "cu.usbmodem";
#[cfg(not(target_os = "macos"))]
pub const DEFAULT_PORT_PATTERN: &str = "ttyACM";

pub const DEFAULT_DEV_DIR: &str = "/dev";

/// Port discovery cache, kept for the life of the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PortCache {
    Unprobed,
    /// Probed, nothing usable.
    Missing,
    Found(PathBuf),
}

pub struct SerialAdapter {
    name: String,
    dev_dir: PathBuf,
    /// Name prefix; `*` wildcards are stripped.
    prefix: String,
    retry: RetryPolicy,
    port: PortCache,
}

impl SerialAdapter {
    pub fn new(
        name: &str,
        port_pattern: Option<&str>,
        dev_dir: Option<&Path>,
        retry: RetryPolicy,
    ) -> Self {
        SerialAdapter {
            name: name.to_string(),
            dev_dir: dev_dir.map_or_else(|| PathBuf::from(DEFAULT_DEV_DIR), Path::to_path_buf),
            prefix: port_pattern.unwrap_or(DEFAULT_PORT_PATTERN).replace('*', ""),
            retry,
            port: PortCache::Unprobed,
        }
    }

    /// Resolved port path, probing on first use.
    pub fn port(&mut self) -> Option<&Path> {
        if self.port == PortCache::Unprobed {
            self.port = match find_port(&self.dev_dir, &self.prefix) {
                Some(path) => {
                    log::debug!("{}: using {}", self.name, path.display());
                    PortCache::Found(path)
                }
                None => PortCache::Missing,
            };
        }
        match &self.port {
            PortCache::Found(path) => Some(path),
            _ => None,
        }
    }

    fn write_color(&mut self, color: Rgb) -> Result<()> {
        let path = self.port().ok_or(DeviceError::NotFound)?.to_path_buf();
        let result = OpenOptions::new()
            .write(true)
            .open(&path)
            .and_then(|mut f| f.write_all(format!("{color}\n").as_bytes()));
        result.map_err(|e| {
            self.port = PortCache::Unprobed;
            DeviceError::WriteFailed(format!("{}: {e}", path.display()))
        })
    }
}

/// First entry of `dir` whose name starts with `prefix` and opens read-write.
pub fn find_port(dir: &Path, prefix: &str) -> Option<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::debug!("cannot list {}: {e}", dir.display());
            return None;
        }
    };
    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(prefix))
        .map(|e| e.path())
        .collect();
    candidates.sort();
    candidates
        .into_iter()
        .find(|path| OpenOptions::new().read(true).write(true).open(path).is_ok())
}

impl DeviceAdapter for SerialAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::Serial
    }

    fn probe(&mut self) -> bool {
        self.port().is_some()
    }

    fn apply(&mut self, color: Rgb, _render: &RenderOptions) -> bool {
        let label = format!("{}: set {color}", self.name);
        let retry = self.retry;
        retry.run(&label, |_| self.write_color(color)).is_ok()
    }

    fn release(&mut self) {
        self.port = PortCache::Unprobed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(dir: &Path, pattern: &str) -> SerialAdapter {
        SerialAdapter::new("stat", Some(pattern), Some(dir), RetryPolicy::once())
    }

    #[test]
    fn finds_first_matching_port_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ttyACM1"), "").unwrap();
        std::fs::write(dir.path().join("ttyACM0"), "").unwrap();
        std::fs::write(dir.path().join("ttyS0"), "").unwrap();
        assert_eq!(
            find_port(dir.path(), "ttyACM"),
            Some(dir.path().join("ttyACM0"))
        );
    }

    #[test]
    fn wildcard_is_stripped_from_pattern() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cu.usbmodem1101"), "").unwrap();
        let mut a = adapter(dir.path(), "cu.usbmodem*");
        assert!(a.probe());
    }

    #[test]
    fn missing_dir_is_not_present() {
        let mut a = adapter(Path::new("/nonexistent/sessionlight-test"), "ttyACM");
        assert!(!a.probe());
        assert!(!a.apply(Rgb::new(1, 2, 3), &RenderOptions::default()));
    }

    #[test]
    fn no_match_is_cached_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = adapter(dir.path(), "ttyACM");
        assert!(!a.probe());
        // Appears later, but the negative result is cached for this process
        std::fs::write(dir.path().join("ttyACM0"), "").unwrap();
        assert!(!a.probe());
        a.release();
        assert!(a.probe());
    }

    #[test]
    fn apply_writes_hex_line() {
        let dir = tempfile::tempdir().unwrap();
        let port = dir.path().join("ttyACM0");
        std::fs::write(&port, "").unwrap();
        let mut a = adapter(dir.path(), "ttyACM");
        assert!(a.apply(Rgb::new(0x00, 0xFF, 0x00), &RenderOptions::default()));
        assert_eq!(std::fs::read_to_string(&port).unwrap(), "#00FF00\n");
    }

    #[test]
    fn clear_writes_black() {
        let dir = tempfile::tempdir().unwrap();
        let port = dir.path().join("ttyACM0");
        std::fs::write(&port, "").unwrap();
        let mut a = adapter(dir.path(), "ttyACM");
        assert!(a.clear());
        assert_eq!(std::fs::read_to_string(&port).unwrap(), "#000000\n");
    }

    #[test]
    fn write_failure_invalidates_cache() {
        let dir = tempfile::tempdir().unwrap();
        let port = dir.path().join("ttyACM0");
        std::fs::write(&port, "").unwrap();
        let mut a = adapter(dir.path(), "ttyACM");
        assert!(a.probe());

        std::fs::remove_file(&port).unwrap();
        assert!(!a.apply(Rgb::new(0xFF, 0, 0), &RenderOptions::default()));
        assert_eq!(a.port, PortCache::Unprobed);

        // Port comes back under a new name: the next call re-probes
        let replugged = dir.path().join("ttyACM1");
        std::fs::write(&replugged, "").unwrap();
        assert!(a.apply(Rgb::new(0xFF, 0, 0), &RenderOptions::default()));
        assert_eq!(std::fs::read_to_string(&replugged).unwrap(), "#FF0000\n");
    }

    #[test]
    fn retry_reprobes_within_one_apply() {
        let dir = tempfile::tempdir().unwrap();
        let port = dir.path().join("ttyACM0");
        std::fs::write(&port, "").unwrap();
        let mut a = SerialAdapter::new(
            "stat",
            Some("ttyACM"),
            Some(dir.path()),
            RetryPolicy::new(2, std::time::Duration::ZERO),
        );
        assert!(a.probe());
        // Stale cached path; a second port exists
        std::fs::remove_file(&port).unwrap();
        std::fs::write(dir.path().join("ttyACM2"), "").unwrap();
        assert!(a.apply(Rgb::new(0, 0, 0xFF), &RenderOptions::default()));
    }
}
