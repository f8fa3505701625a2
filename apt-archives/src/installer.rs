// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Installation of a set of package repositories.

[Installer] drives the complete flow for a list of repository definitions:
definitions are validated, keys and sources files installed for each
repository and pins for prioritized repositories are written to the
preferences file.
*/

use {
    crate::{
        config::ArchivesConfig,
        error::Result,
        gpg::KeyTool,
        keys::KeyManager,
        platform::{ArchitectureRegistrar, HostPlatform},
        ppa::PpaKeyResolver,
        preferences::PreferencesManager,
        project::validate_repository,
        repository::PackageRepository,
        sources::SourcesManager,
    },
    log::info,
    serde_json::Value,
};

/// Validate a list of repository definitions.
///
/// Each entry must satisfy the project schema and the repository model.
pub fn validate_repositories(data: &Value) -> Result<Vec<PackageRepository>> {
    if let Value::Array(entries) = data {
        for entry in entries {
            validate_repository(entry)?;
        }
    }

    Ok(PackageRepository::unmarshal_package_repositories(data)?)
}

/// Installs package repositories onto a host.
pub struct Installer {
    sources: SourcesManager,
    preferences: PreferencesManager,
}

impl Installer {
    /// Construct an instance from configuration and external capabilities.
    pub fn new(
        config: &ArchivesConfig,
        key_tool: Box<dyn KeyTool>,
        resolver: Box<dyn PpaKeyResolver>,
        host: Box<dyn HostPlatform>,
        registrar: Box<dyn ArchitectureRegistrar>,
    ) -> Self {
        let keys = KeyManager::new(config, key_tool, resolver);

        Self {
            sources: SourcesManager::new(config, keys, host, registrar),
            preferences: PreferencesManager::from_config(config),
        }
    }

    /// Construct an instance operating on the running host.
    ///
    /// Keys are managed with `gpg`, architectures registered with `dpkg` and
    /// PPA keys resolved through Launchpad.
    #[cfg(feature = "launchpad")]
    pub fn for_host(config: &ArchivesConfig) -> Result<Self> {
        Ok(Self::new(
            config,
            Box::new(crate::gpg::GpgKeyTool::default()),
            Box::new(crate::ppa::LaunchpadPpaKeyResolver::new()?),
            Box::new(crate::platform::LinuxHost::default()),
            Box::new(crate::platform::DpkgArchitectureRegistrar),
        ))
    }

    pub fn sources_manager(&self) -> &SourcesManager {
        &self.sources
    }

    pub fn preferences_manager(&self) -> &PreferencesManager {
        &self.preferences
    }

    /// Validate and install repositories from generic data.
    ///
    /// Returns whether anything on disk changed. Nothing is installed if any
    /// definition is invalid.
    pub fn install(&mut self, data: &Value) -> Result<bool> {
        let repos = validate_repositories(data)?;

        self.install_repositories(&repos)
    }

    /// Install already validated repositories.
    ///
    /// The preferences file ends up holding pins of exactly the prioritized
    /// repositories given here.
    pub fn install_repositories(&mut self, repos: &[PackageRepository]) -> Result<bool> {
        let mut changed = false;

        for repo in repos {
            changed |= self.sources.install_package_repository_sources(repo)?;

            if let Some(priority) = repo.priority() {
                self.preferences.add(repo.pin(), priority.value())?;
            }
        }

        changed |= self.preferences.write()?;

        if changed {
            info!("package repository configuration changed");
        }

        Ok(changed)
    }
}
