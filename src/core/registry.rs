//! Purpose: Parse, validate, and publish the manifest of known service modules.
//! Exports: `Registry`, `ServiceDescriptor`, `LaunchDescriptor`, `select_interfaces_dir`.
//! Role: Write-once table consulted by the service resolver and the module cache.
//! Invariants: A manifest with any invalid entry registers nothing.
//! Invariants: Descriptors are immutable once the registry is built.
use std::collections::{BTreeMap, HashMap};
use std::ffi::OsStr;
use std::fs::File;
use std::io::{BufReader, Read};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::core::dirs::Directories;
use crate::core::error::{Error, ErrorKind};
use crate::core::flags::{InitFlags, ManifestShape, ManifestSource};

const MANIFEST_SECTION: &str = "libcordis";
const DEFAULT_MANIFEST_SUFFIX: &str = ".manifest.json";

#[derive(Debug, Default, Deserialize)]
struct ManifestInterface {
    #[serde(default)]
    library: String,
    #[serde(default)]
    interface: String,
    #[serde(default)]
    no_unload: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ManifestLaunch {
    #[serde(default)]
    run: String,
}

#[derive(Debug, Default, Deserialize)]
struct ManifestSection {
    #[serde(default)]
    interfaces: BTreeMap<String, ManifestInterface>,
    #[serde(default)]
    launch: BTreeMap<String, ManifestLaunch>,
}

#[derive(Debug, Deserialize)]
struct ManifestDocument {
    libcordis: Option<ManifestSection>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServiceDescriptor {
    pub name: String,
    pub library: PathBuf,
    pub interface: String,
    pub pinned: bool,
}

impl ServiceDescriptor {
    pub fn serve_symbol(&self) -> String {
        format!("{}_interface", self.interface)
    }

    pub fn count_symbol(&self) -> String {
        format!("{}_count", self.interface)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LaunchDescriptor {
    pub name: String,
    pub run: String,
}

#[derive(Debug)]
pub struct Registry {
    services: HashMap<String, Arc<ServiceDescriptor>>,
    launches: BTreeMap<String, LaunchDescriptor>,
    interfaces_dir: PathBuf,
}

impl Registry {
    /// Reads and validates a manifest according to `flags`. A file source takes `arg` as
    /// raw path bytes, and an empty `arg` means `<executable>.manifest.json`.
    pub fn load(flags: InitFlags, arg: &OsStr, dirs: &dyn Directories) -> Result<Self, Error> {
        let interfaces_dir = select_interfaces_dir(&dirs.application());
        let section = match flags.source {
            ManifestSource::File => {
                let path = if arg.is_empty() {
                    let mut exe = dirs.executable().into_os_string();
                    exe.push(DEFAULT_MANIFEST_SUFFIX);
                    PathBuf::from(exe)
                } else {
                    PathBuf::from(arg)
                };
                let file = File::open(&path).map_err(|err| {
                    Error::new(ErrorKind::LoadFailed)
                        .with_message("unable to open manifest")
                        .with_path(&path)
                        .with_source(err)
                })?;
                parse_section(BufReader::new(file), flags.shape)
                    .map_err(|err| err.with_path(&path))?
            }
            ManifestSource::Inline => parse_section(arg.as_bytes(), flags.shape)?,
        };
        Self::from_section(section, interfaces_dir)
    }

    /// Validates an inline manifest without a directory provider; relative libraries
    /// resolve against `interfaces_dir`.
    pub fn parse(
        text: &str,
        shape: ManifestShape,
        interfaces_dir: impl Into<PathBuf>,
    ) -> Result<Self, Error> {
        Self::from_section(parse_section(text.as_bytes(), shape)?, interfaces_dir.into())
    }

    fn from_section(section: ManifestSection, interfaces_dir: PathBuf) -> Result<Self, Error> {
        let mut launches = BTreeMap::new();
        for (name, entry) in section.launch {
            if name.is_empty() || entry.run.is_empty() {
                return Err(Error::new(ErrorKind::InvalidData)
                    .with_message(format!("launch entry '{name}' needs a name and run command")));
            }
            launches.insert(
                name.clone(),
                LaunchDescriptor {
                    name,
                    run: entry.run,
                },
            );
        }

        let mut services = HashMap::with_capacity(section.interfaces.len());
        for (name, entry) in section.interfaces {
            if name.is_empty() || entry.library.is_empty() || entry.interface.is_empty() {
                return Err(Error::new(ErrorKind::InvalidData).with_message(format!(
                    "interface entry '{name}' needs a name, library and interface"
                )));
            }
            let descriptor = ServiceDescriptor {
                name: name.clone(),
                library: PathBuf::from(entry.library),
                interface: entry.interface,
                pinned: entry.no_unload,
            };
            services.insert(name, Arc::new(descriptor));
        }

        Ok(Self {
            services,
            launches,
            interfaces_dir,
        })
    }

    pub fn service(&self, name: &str) -> Option<&Arc<ServiceDescriptor>> {
        self.services.get(name)
    }

    pub fn services(&self) -> impl Iterator<Item = &ServiceDescriptor> {
        self.services.values().map(|descriptor| descriptor.as_ref())
    }

    pub fn launch(&self, name: &str) -> Option<&LaunchDescriptor> {
        self.launches.get(name)
    }

    pub fn launches(&self) -> impl Iterator<Item = &LaunchDescriptor> {
        self.launches.values()
    }

    pub fn interfaces_dir(&self) -> &Path {
        &self.interfaces_dir
    }

    /// Absolute libraries are used as-is; relative ones live under the interfaces dir.
    pub fn library_path(&self, descriptor: &ServiceDescriptor) -> PathBuf {
        if descriptor.library.is_absolute() {
            descriptor.library.clone()
        } else {
            self.interfaces_dir.join(&descriptor.library)
        }
    }
}

/// Picks `<app>/../interfaces`, then `<app>/../lib`, then the application dir itself.
pub fn select_interfaces_dir(app_dir: &Path) -> PathBuf {
    let parent = app_dir.parent().unwrap_or(app_dir);
    for candidate in ["interfaces", "lib"] {
        let dir = parent.join(candidate);
        if std::fs::metadata(&dir).is_ok() {
            return dir;
        }
    }
    app_dir.to_path_buf()
}

fn parse_section(reader: impl Read, shape: ManifestShape) -> Result<ManifestSection, Error> {
    match shape {
        ManifestShape::Namespaced => {
            let document: ManifestDocument = decode_first(reader)?;
            document.libcordis.ok_or_else(|| {
                Error::new(ErrorKind::InvalidData)
                    .with_message(format!("manifest has no '{MANIFEST_SECTION}' section"))
            })
        }
        ManifestShape::Bare => decode_first(reader),
    }
}

/// Decodes the first JSON value; anything after it is ignored.
fn decode_first<T: DeserializeOwned>(reader: impl Read) -> Result<T, Error> {
    let load_failed = |err: serde_json::Error| {
        Error::new(ErrorKind::LoadFailed)
            .with_message("malformed manifest")
            .with_source(err)
    };
    match serde_json::Deserializer::from_reader(reader)
        .into_iter::<T>()
        .next()
    {
        Some(value) => value.map_err(load_failed),
        None => Err(Error::new(ErrorKind::LoadFailed).with_message("empty manifest")),
    }
}
