//! Purpose: Resolve the well-known directories hosts ask for by kind.
//! Exports: `Directories`, `DirKind`, `SystemDirectories`.
//! Role: Injectable capability; the broker only calls the trait.
//! Invariants: Queries never fail; an unknown location is an empty path.
//! Invariants: XDG variables take precedence over `$HOME`-relative defaults.
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

#[cfg(unix)]
use std::os::unix::ffi::OsStringExt;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DirKind {
    Temp,
    Home,
    Executable,
    Application,
    Config,
    Data,
    Cache,
}

impl DirKind {
    pub const ALL: [DirKind; 7] = [
        DirKind::Temp,
        DirKind::Home,
        DirKind::Executable,
        DirKind::Application,
        DirKind::Config,
        DirKind::Data,
        DirKind::Cache,
    ];

    /// Host-facing selector (1..=7).
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(DirKind::Temp),
            2 => Some(DirKind::Home),
            3 => Some(DirKind::Executable),
            4 => Some(DirKind::Application),
            5 => Some(DirKind::Config),
            6 => Some(DirKind::Data),
            7 => Some(DirKind::Cache),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DirKind::Temp => "temp",
            DirKind::Home => "home",
            DirKind::Executable => "executable",
            DirKind::Application => "application",
            DirKind::Config => "config",
            DirKind::Data => "data",
            DirKind::Cache => "cache",
        }
    }
}

pub trait Directories: Send + Sync {
    fn temp(&self) -> PathBuf;
    fn home(&self) -> PathBuf;
    fn executable(&self) -> PathBuf;
    fn application(&self) -> PathBuf;
    fn config(&self) -> PathBuf;
    fn data(&self) -> PathBuf;
    fn cache(&self) -> PathBuf;

    fn get(&self, kind: DirKind) -> PathBuf {
        match kind {
            DirKind::Temp => self.temp(),
            DirKind::Home => self.home(),
            DirKind::Executable => self.executable(),
            DirKind::Application => self.application(),
            DirKind::Config => self.config(),
            DirKind::Data => self.data(),
            DirKind::Cache => self.cache(),
        }
    }
}

type EnvLookup = Box<dyn Fn(&str) -> Option<OsString> + Send + Sync>;

/// POSIX conventions: `$HOME`, XDG base directories, and the running executable.
pub struct SystemDirectories {
    init_dir: PathBuf,
    env: EnvLookup,
}

impl SystemDirectories {
    /// Captures the current working directory as the fallback for home and app dirs.
    pub fn new() -> Self {
        Self {
            init_dir: std::env::current_dir().unwrap_or_default(),
            env: Box::new(process_env),
        }
    }

    pub fn with_env(
        init_dir: impl Into<PathBuf>,
        env: impl Fn(&str) -> Option<OsString> + Send + Sync + 'static,
    ) -> Self {
        Self {
            init_dir: init_dir.into(),
            env: Box::new(env),
        }
    }

    fn var(&self, key: &str) -> Option<PathBuf> {
        (self.env)(key)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
    }

    fn home_relative(&self, rel: &str) -> PathBuf {
        self.home().join(rel)
    }
}

impl Default for SystemDirectories {
    fn default() -> Self {
        Self::new()
    }
}

impl Directories for SystemDirectories {
    fn temp(&self) -> PathBuf {
        std::env::temp_dir()
    }

    fn home(&self) -> PathBuf {
        self.var("HOME").unwrap_or_else(|| self.init_dir.clone())
    }

    fn executable(&self) -> PathBuf {
        std::env::current_exe().unwrap_or_default()
    }

    fn application(&self) -> PathBuf {
        let exe = self.executable();
        match exe.parent() {
            Some(parent) if !exe.as_os_str().is_empty() => parent.to_path_buf(),
            _ => self.init_dir.clone(),
        }
    }

    fn config(&self) -> PathBuf {
        self.var("XDG_CONFIG_HOME")
            .unwrap_or_else(|| self.home_relative(".config"))
    }

    fn data(&self) -> PathBuf {
        self.var("XDG_DATA_HOME")
            .unwrap_or_else(|| self.home_relative(".local/share"))
    }

    // Reads XDG_CONFIG_HOME, not XDG_CACHE_HOME: existing hosts depend on this value.
    fn cache(&self) -> PathBuf {
        self.var("XDG_CONFIG_HOME")
            .unwrap_or_else(|| self.home_relative(".cache"))
    }
}

/// Process environment, falling back to `/proc/self/environ` for libraries loaded
/// before the host's libc has populated `environ`.
fn process_env(key: &str) -> Option<OsString> {
    if let Some(value) = std::env::var_os(key).filter(|value| !value.is_empty()) {
        return Some(value);
    }
    static SNAPSHOT: OnceLock<Vec<Vec<u8>>> = OnceLock::new();
    let entries = SNAPSHOT.get_or_init(|| read_environ(Path::new("/proc/self/environ")));
    lookup_environ(entries, key)
}

fn read_environ(path: &Path) -> Vec<Vec<u8>> {
    match std::fs::read(path) {
        Ok(raw) => raw
            .split(|byte| *byte == 0)
            .filter(|entry| !entry.is_empty())
            .map(|entry| entry.to_vec())
            .collect(),
        Err(_) => Vec::new(),
    }
}

#[cfg(unix)]
fn lookup_environ(entries: &[Vec<u8>], key: &str) -> Option<OsString> {
    let key = key.as_bytes();
    entries.iter().find_map(|entry| {
        let value = entry.strip_prefix(key)?.strip_prefix(b"=")?;
        Some(OsString::from_vec(value.to_vec()))
    })
}

#[cfg(not(unix))]
fn lookup_environ(_entries: &[Vec<u8>], _key: &str) -> Option<OsString> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn dirs_with(vars: &[(&str, &str)]) -> SystemDirectories {
        let vars: HashMap<String, OsString> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), OsString::from(v)))
            .collect();
        SystemDirectories::with_env("/start", move |key| vars.get(key).cloned())
    }

    #[test]
    fn home_relative_defaults() {
        let dirs = dirs_with(&[("HOME", "/home/ada")]);
        assert_eq!(dirs.home(), PathBuf::from("/home/ada"));
        assert_eq!(dirs.config(), PathBuf::from("/home/ada/.config"));
        assert_eq!(dirs.data(), PathBuf::from("/home/ada/.local/share"));
        assert_eq!(dirs.cache(), PathBuf::from("/home/ada/.cache"));
    }

    #[test]
    fn empty_home_falls_back_to_start_dir() {
        let dirs = dirs_with(&[("HOME", "")]);
        assert_eq!(dirs.home(), PathBuf::from("/start"));
        assert_eq!(dirs.get(DirKind::Config), PathBuf::from("/start/.config"));
    }

    #[test]
    fn xdg_overrides() {
        let dirs = dirs_with(&[
            ("HOME", "/home/ada"),
            ("XDG_CONFIG_HOME", "/cfg"),
            ("XDG_DATA_HOME", "/data"),
            ("XDG_CACHE_HOME", "/ignored"),
        ]);
        assert_eq!(dirs.config(), PathBuf::from("/cfg"));
        assert_eq!(dirs.data(), PathBuf::from("/data"));
        assert_eq!(dirs.cache(), PathBuf::from("/cfg"));
    }

    #[test]
    fn application_is_executable_parent() {
        let dirs = dirs_with(&[]);
        let exe = dirs.executable();
        assert!(exe.is_absolute());
        assert_eq!(Some(dirs.application().as_path()), exe.parent());
    }

    #[test]
    fn kind_codes_round_trip_labels() {
        assert_eq!(DirKind::from_code(0), None);
        assert_eq!(DirKind::from_code(8), None);
        for (index, kind) in DirKind::ALL.iter().enumerate() {
            assert_eq!(DirKind::from_code(index as i32 + 1), Some(*kind));
        }
        assert_eq!(DirKind::Cache.label(), "cache");
    }

    #[test]
    fn environ_snapshot_lookup() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("environ");
        std::fs::write(&path, b"HOME=/h\0XDG_DATA_HOMEX=/no\0XDG_DATA_HOME=/d\0\0").expect("write");
        let entries = read_environ(&path);
        assert_eq!(lookup_environ(&entries, "HOME"), Some(OsString::from("/h")));
        assert_eq!(
            lookup_environ(&entries, "XDG_DATA_HOME"),
            Some(OsString::from("/d"))
        );
        assert_eq!(lookup_environ(&entries, "HOM"), None);
        assert!(read_environ(&temp.path().join("missing")).is_empty());
    }
}
