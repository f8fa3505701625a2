// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Error handling. */

use {std::path::PathBuf, thiserror::Error};

/// A package repository definition failed validation.
///
/// `url` holds the value identifying the offending repository. This is the
/// URL for generic APT repositories and the PPA name for PPAs. `brief` is a
/// one line summary. `details` and `resolution` are optional prose aimed at
/// the person maintaining the configuration.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[error("Invalid package repository for '{url}': {brief}")]
pub struct RepositoryValidationError {
    pub url: String,
    pub brief: String,
    pub details: Option<String>,
    pub resolution: Option<String>,
}

impl RepositoryValidationError {
    pub fn new(url: impl ToString, brief: impl ToString) -> Self {
        Self {
            url: url.to_string(),
            brief: brief.to_string(),
            details: None,
            resolution: None,
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: impl ToString) -> Self {
        self.details = Some(details.to_string());
        self
    }

    #[must_use]
    pub fn with_resolution(mut self, resolution: impl ToString) -> Self {
        self.resolution = Some(resolution.to_string());
        self
    }
}

/// An apt pin preference is invalid.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub struct PreferencesError {
    /// The preference component (`pin` or `priority`) at fault.
    pub component: &'static str,
    pub value: Option<String>,
    pub details: Option<String>,
    pub resolution: String,
}

impl std::fmt::Display for PreferencesError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Invalid apt preference {}", self.component)?;

        if let Some(value) = &self.value {
            write!(f, " '{}'", value)?;
        }
        if let Some(details) = &self.details {
            write!(f, ": {}", details)?;
        }

        Ok(())
    }
}

/// An external tool exited unsuccessfully.
///
/// `output` holds whatever the tool wrote to stdout and stderr.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[error("{command} failed: {output}")]
pub struct ToolError {
    pub command: String,
    pub output: String,
}

/// Primary crate error type.
#[derive(Debug, Error)]
pub enum ArchivesError {
    #[error(transparent)]
    RepositoryValidation(#[from] RepositoryValidationError),

    #[error(transparent)]
    Preferences(#[from] PreferencesError),

    #[error("not a preferences paragraph: {0}")]
    PreferencesParse(String),

    #[error("Failed to install GPG key: {message}")]
    KeyInstall {
        message: String,
        key: Option<String>,
    },

    #[error("Failed to install GPG key: {message}")]
    KeyInstallFromServer {
        message: String,
        key_id: String,
        key_server: String,
    },

    #[error("Unable to find keyring file {}", .0.display())]
    KeyringMissing(PathBuf),

    #[error("Failed to install PPA '{ppa}': {reason}")]
    PpaInstall { ppa: String, reason: String },

    #[error("invalid configuration for repository '{name}': {reason}")]
    ConfigurationFault { name: String, reason: String },

    #[error("unable to resolve signing key of PPA '{ppa}': {message}")]
    PpaKeyResolve { ppa: String, message: String },

    #[error("unable to determine host OS release: {0}")]
    OsRelease(String),

    #[error("failed to register architecture {arch}: {output}")]
    ArchitectureRegistration { arch: String, output: String },

    #[error("control file parse error: {0}")]
    ControlParse(String),

    #[error("schema error: {0}")]
    Schema(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[cfg(feature = "launchpad")]
    #[error("HTTP error: {0:?}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error on path {0}: {1:?}")]
    IoPath(String, std::io::Error),

    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),
}

impl ArchivesError {
    /// Whether this error stems from a repository definition that bypassed validation.
    ///
    /// These are integration errors rather than user input errors.
    pub fn is_configuration_fault(&self) -> bool {
        matches!(self, Self::PpaInstall { .. } | Self::ConfigurationFault { .. })
    }

    /// Construct an [Self::IoPath] from a path and the error operating on it.
    pub fn io_path(path: impl AsRef<std::path::Path>, err: std::io::Error) -> Self {
        Self::IoPath(format!("{}", path.as_ref().display()), err)
    }
}

/// Result wrapper for this crate.
pub type Result<T> = std::result::Result<T, ArchivesError>;
