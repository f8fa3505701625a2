// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Configuration of on-disk locations and naming. */

use {
    crate::error::{ArchivesError, Result},
    serde::{Deserialize, Serialize},
    std::path::{Path, PathBuf},
};

/// Directory holding keyrings of third-party repositories, as recommended by Debian.
pub const DEFAULT_KEYRINGS_DIR: &str = "/etc/apt/keyrings";

/// Directory holding deb822 sources files.
pub const DEFAULT_SOURCES_DIR: &str = "/etc/apt/sources.list.d";

/// Path of the managed pin preferences file.
pub const DEFAULT_PREFERENCES_PATH: &str = "/etc/apt/preferences.d/craft-archives";

/// Key server used when a repository doesn't define one.
pub const DEFAULT_KEY_SERVER: &str = "keyserver.ubuntu.com";

/// Prefix of generated sources file names.
pub const DEFAULT_SOURCES_PREFIX: &str = "craft";

/// Prefix of installed keyring file names.
pub const DEFAULT_KEYRING_PREFIX: &str = "craft-";

/// Comment line heading the managed preferences file.
pub const DEFAULT_PREFERENCES_HEADER: &str = "# This file is managed by craft-archives";

/// Locations and names used when installing repositories.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct ArchivesConfig {
    pub keyrings_dir: PathBuf,
    pub sources_dir: PathBuf,
    pub preferences_path: PathBuf,
    /// Directory of pre-provisioned ASCII-armored keys, named `<last 8 of key id>.asc`.
    pub key_assets_dir: Option<PathBuf>,
    pub default_key_server: String,
    pub sources_prefix: String,
    pub keyring_prefix: String,
    pub preferences_header: String,
}

impl Default for ArchivesConfig {
    fn default() -> Self {
        Self {
            keyrings_dir: PathBuf::from(DEFAULT_KEYRINGS_DIR),
            sources_dir: PathBuf::from(DEFAULT_SOURCES_DIR),
            preferences_path: PathBuf::from(DEFAULT_PREFERENCES_PATH),
            key_assets_dir: None,
            default_key_server: DEFAULT_KEY_SERVER.to_string(),
            sources_prefix: DEFAULT_SOURCES_PREFIX.to_string(),
            keyring_prefix: DEFAULT_KEYRING_PREFIX.to_string(),
            preferences_header: DEFAULT_PREFERENCES_HEADER.to_string(),
        }
    }
}

impl ArchivesConfig {
    /// Load from a YAML file.
    pub fn from_yaml_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| ArchivesError::io_path(path, e))?;

        Ok(serde_yaml::from_slice(&data)?)
    }

    /// Rebase the default APT locations under an alternate root directory.
    ///
    /// Useful for configuring a chroot or an image being assembled.
    #[must_use]
    pub fn with_root(mut self, root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let rebase = |p: &str| root.join(p.trim_start_matches('/'));

        self.keyrings_dir = rebase(DEFAULT_KEYRINGS_DIR);
        self.sources_dir = rebase(DEFAULT_SOURCES_DIR);
        self.preferences_path = rebase(DEFAULT_PREFERENCES_PATH);
        self
    }

    #[must_use]
    pub fn with_key_assets_dir(mut self, path: impl AsRef<Path>) -> Self {
        self.key_assets_dir = Some(path.as_ref().to_path_buf());
        self
    }
}
