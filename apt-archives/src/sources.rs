// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! APT sources file generation.

Each repository is written to its own deb822 style `.sources` file (see
`sources.list(5)`), for example:

```text
Types: deb
URIs: http://archive.ubuntu.com/ubuntu
Suites: jammy
Components: main
Architectures: amd64
Signed-By: /etc/apt/keyrings/craft-AAAAAAAA.gpg
```

Files are only rewritten when their content changes.
*/

use {
    crate::{
        config::ArchivesConfig,
        control::{ControlField, ControlParagraph},
        error::{ArchivesError, Result},
        keys::KeyManager,
        platform::{ArchitectureRegistrar, HostPlatform},
        ppa::{PpaName, PPA_COMPONENT},
        repository::{AptRepository, PackageRepository, PpaRepository},
    },
    log::{debug, info},
    std::path::{Path, PathBuf},
};

/// A single deb822 sources entry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SourcesEntry {
    pub types: Vec<String>,
    pub uris: Vec<String>,
    pub suites: Vec<String>,
    /// Absent when suites are paths.
    pub components: Option<Vec<String>>,
    pub architectures: Vec<String>,
    pub signed_by: PathBuf,
}

impl SourcesEntry {
    pub fn to_paragraph(&self) -> ControlParagraph<'_> {
        let mut paragraph = ControlParagraph::default();

        paragraph.set_field(ControlField::from_words("Types", &self.types));
        paragraph.set_field(ControlField::from_words("URIs", &self.uris));
        paragraph.set_field(ControlField::from_words("Suites", &self.suites));
        if let Some(components) = &self.components {
            paragraph.set_field(ControlField::from_words("Components", components));
        }
        paragraph.set_field(ControlField::from_words(
            "Architectures",
            &self.architectures,
        ));
        paragraph.set_field(ControlField::new(
            "Signed-By",
            self.signed_by.display().to_string(),
        ));

        paragraph
    }

    /// File content of this entry.
    pub fn render(&self) -> String {
        self.to_paragraph().to_string()
    }
}

/// Writes sources files for package repositories.
pub struct SourcesManager {
    sources_dir: PathBuf,
    sources_prefix: String,
    keys: KeyManager,
    host: Box<dyn HostPlatform>,
    registrar: Box<dyn ArchitectureRegistrar>,
}

impl SourcesManager {
    pub fn new(
        config: &ArchivesConfig,
        keys: KeyManager,
        host: Box<dyn HostPlatform>,
        registrar: Box<dyn ArchitectureRegistrar>,
    ) -> Self {
        Self {
            sources_dir: config.sources_dir.clone(),
            sources_prefix: config.sources_prefix.clone(),
            keys,
            host,
            registrar,
        }
    }

    pub fn key_manager(&self) -> &KeyManager {
        &self.keys
    }

    /// Path of the sources file for a repository with the given name.
    pub fn sources_path(&self, name: &str) -> PathBuf {
        self.sources_dir.join(format!(
            "{}-{}.sources",
            self.sources_prefix,
            name.replace('/', "_")
        ))
    }

    /// Install the signing key and sources file of a repository.
    ///
    /// Returns whether either changed.
    pub fn install_package_repository_sources(&self, repo: &PackageRepository) -> Result<bool> {
        match repo {
            PackageRepository::Ppa(ppa) => self.install_sources_ppa(repo, ppa),
            PackageRepository::Apt(apt) => self.install_sources_apt(repo, apt),
        }
    }

    fn install_sources_ppa(&self, repo: &PackageRepository, ppa: &PpaRepository) -> Result<bool> {
        let name = PpaName::parse(ppa.ppa())?;

        let (key_changed, signed_by) = self.install_key(repo)?;

        let entry = SourcesEntry {
            types: vec!["deb".to_string()],
            uris: vec![name.archive_url()],
            suites: vec![self.host.codename()?],
            components: Some(vec![PPA_COMPONENT.to_string()]),
            architectures: vec![self.host.architecture()],
            signed_by,
        };

        let file_changed = self.write_sources(&self.sources_path(&name.file_stem()), &entry)?;

        Ok(key_changed || file_changed)
    }

    fn install_sources_apt(&self, repo: &PackageRepository, apt: &AptRepository) -> Result<bool> {
        let fault = |reason: &str| ArchivesError::ConfigurationFault {
            name: apt.name().to_string(),
            reason: reason.to_string(),
        };

        let (suites, components) = match (apt.path(), apt.suites(), apt.components()) {
            (Some(path), _, _) => (vec![format!("{}/", path)], None),
            (None, Some(suites), Some(components)) => (suites.to_vec(), Some(components.to_vec())),
            (None, Some(_), None) => return Err(fault("no components with suite")),
            (None, None, Some(_)) => return Err(fault("no suites or path")),
            (None, None, None) => (vec!["/".to_string()], None),
        };

        let (key_changed, signed_by) = self.install_key(repo)?;

        let architectures = match apt.architectures() {
            Some(architectures) => {
                for arch in architectures {
                    self.registrar.register(arch)?;
                }
                architectures.to_vec()
            }
            None => vec![self.host.architecture()],
        };

        let entry = SourcesEntry {
            types: apt
                .formats()
                .map(|f| f.to_vec())
                .unwrap_or_else(|| vec!["deb".to_string()]),
            uris: vec![apt.url().to_string()],
            suites,
            components,
            architectures,
            signed_by,
        };

        let file_changed = self.write_sources(&self.sources_path(apt.name()), &entry)?;

        Ok(key_changed || file_changed)
    }

    /// Ensure the key is installed and its keyring present.
    fn install_key(&self, repo: &PackageRepository) -> Result<(bool, PathBuf)> {
        let installation = self.keys.ensure_key_installed(repo)?;

        if !installation.keyring_path.exists() {
            return Err(ArchivesError::KeyringMissing(installation.keyring_path));
        }

        Ok((installation.changed, installation.keyring_path))
    }

    fn write_sources(&self, path: &Path, entry: &SourcesEntry) -> Result<bool> {
        let content = entry.render();

        match std::fs::read_to_string(path) {
            Ok(existing) if existing == content => {
                debug!("ignoring unchanged sources: {}", path.display());
                return Ok(false);
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(ArchivesError::io_path(path, e)),
        }

        if !self.sources_dir.exists() {
            std::fs::create_dir_all(&self.sources_dir)
                .map_err(|e| ArchivesError::io_path(&self.sources_dir, e))?;
        }

        std::fs::write(path, content).map_err(|e| ArchivesError::io_path(path, e))?;
        info!("wrote sources file {}", path.display());

        Ok(true)
    }
}
