// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Host platform detection and architecture registration. */

use {
    crate::error::{ArchivesError, Result},
    log::debug,
    std::{
        collections::BTreeMap,
        fmt::{Display, Formatter},
        path::{Path, PathBuf},
    },
};

/// Default location of the os-release file.
pub const OS_RELEASE_PATH: &str = "/etc/os-release";

/// Describes the host a repository is installed on.
pub trait HostPlatform {
    /// Codename of the installed distribution release, e.g. `jammy`.
    fn codename(&self) -> Result<String>;

    /// Debian architecture of the host, e.g. `amd64`.
    fn architecture(&self) -> String;
}

/// Enables installing packages of a foreign architecture.
pub trait ArchitectureRegistrar {
    fn register(&self, arch: &str) -> Result<()>;
}

/// Translate a machine architecture name to its Debian name.
///
/// Accepts both Rust target architecture names and `uname -m` names. Unknown
/// names are returned unchanged.
pub fn debian_architecture(machine: &str) -> &str {
    match machine {
        "x86_64" | "AMD64" => "amd64",
        "aarch64" => "arm64",
        "arm" | "armv7l" => "armhf",
        "x86" | "i686" => "i386",
        "powerpc" | "ppc" => "powerpc",
        "ppc64le" => "ppc64el",
        "s390x" => "s390x",
        "riscv64" => "riscv64",
        v => v,
    }
}

/// The Debian architecture of the running process.
pub fn host_architecture() -> String {
    if cfg!(all(target_arch = "powerpc64", target_endian = "little")) {
        "ppc64el".to_string()
    } else {
        debian_architecture(std::env::consts::ARCH).to_string()
    }
}

/// Parsed content of an os-release file.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct OsRelease {
    fields: BTreeMap<String, String>,
}

impl OsRelease {
    /// Parse os-release content.
    ///
    /// Blank lines, comments and lines without `=` are ignored. Values may be
    /// quoted with `"` or `'`.
    pub fn parse_str(s: &str) -> Self {
        let fields = s
            .lines()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| line.split_once('='))
            .map(|(key, value)| {
                let value = ['"', '\'']
                    .iter()
                    .find_map(|q| {
                        value
                            .strip_prefix(*q)
                            .and_then(|v| v.strip_suffix(*q))
                    })
                    .unwrap_or(value);

                (key.to_string(), value.to_string())
            })
            .collect();

        Self { fields }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| ArchivesError::io_path(path, e))?;

        Ok(Self::parse_str(&data))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(|s| s.as_str())
    }

    /// The `ID` field, e.g. `ubuntu`.
    pub fn id(&self) -> Option<&str> {
        self.get("ID")
    }

    /// The `VERSION_ID` field, e.g. `22.04`.
    pub fn version_id(&self) -> Option<&str> {
        self.get("VERSION_ID")
    }

    /// The `VERSION_CODENAME` field, e.g. `jammy`.
    pub fn version_codename(&self) -> Result<&str> {
        self.get("VERSION_CODENAME")
            .ok_or_else(|| ArchivesError::OsRelease("VERSION_CODENAME is not defined".into()))
    }
}

/// A system/release/machine triple describing the host.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OsPlatform {
    pub system: String,
    pub release: String,
    pub machine: String,
}

impl Display for OsPlatform {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{} ({})", self.system, self.release, self.machine)
    }
}

impl OsPlatform {
    /// Describe the host, preferring os-release values when available.
    pub fn detect(os_release_path: impl AsRef<Path>) -> Self {
        let mut platform = Self {
            system: std::env::consts::OS.to_string(),
            release: "unknown".to_string(),
            machine: std::env::consts::ARCH.to_string(),
        };

        if platform.system == "linux" {
            match OsRelease::from_path(os_release_path) {
                Ok(release) => {
                    if let Some(id) = release.id() {
                        platform.system = id.to_string();
                    }
                    if let Some(version) = release.version_id() {
                        platform.release = version.to_string();
                    }
                }
                Err(e) => {
                    debug!("unable to read os-release, using default values: {}", e);
                }
            }
        }

        platform
    }
}

/// [HostPlatform] reading distribution details from os-release.
#[derive(Clone, Debug)]
pub struct LinuxHost {
    os_release_path: PathBuf,
}

impl Default for LinuxHost {
    fn default() -> Self {
        Self::new(OS_RELEASE_PATH)
    }
}

impl LinuxHost {
    pub fn new(os_release_path: impl AsRef<Path>) -> Self {
        Self {
            os_release_path: os_release_path.as_ref().to_path_buf(),
        }
    }

    pub fn platform(&self) -> OsPlatform {
        OsPlatform::detect(&self.os_release_path)
    }
}

impl HostPlatform for LinuxHost {
    fn codename(&self) -> Result<String> {
        Ok(OsRelease::from_path(&self.os_release_path)?
            .version_codename()?
            .to_string())
    }

    fn architecture(&self) -> String {
        host_architecture()
    }
}

/// [ArchitectureRegistrar] invoking `dpkg --add-architecture`.
#[derive(Clone, Debug, Default)]
pub struct DpkgArchitectureRegistrar;

impl ArchitectureRegistrar for DpkgArchitectureRegistrar {
    fn register(&self, arch: &str) -> Result<()> {
        debug!("executing command: dpkg --add-architecture {}", arch);

        let output = duct::cmd("dpkg", ["--add-architecture", arch])
            .stderr_to_stdout()
            .stdout_capture()
            .unchecked()
            .run()
            .map_err(|e| ArchivesError::ArchitectureRegistration {
                arch: arch.to_string(),
                output: e.to_string(),
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(ArchivesError::ArchitectureRegistration {
                arch: arch.to_string(),
                output: String::from_utf8_lossy(&output.stdout).to_string(),
            })
        }
    }
}
