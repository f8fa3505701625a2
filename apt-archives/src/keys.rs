// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Repository signing key management.

Every repository is verified against a dedicated keyring file named after
its signing key, e.g. `/etc/apt/keyrings/craft-AAAAAAAA.gpg`. [KeyManager]
installs these keyrings.

Keys are obtained from, in order of preference:

1. An already installed keyring holding the key.
2. An ASCII-armored key file in a local assets directory.
3. A key server.
*/

use {
    crate::{
        config::ArchivesConfig,
        error::{ArchivesError, Result},
        gpg::{temporary_home_dir, KeyTool},
        ppa::PpaKeyResolver,
        repository::PackageRepository,
    },
    log::{debug, info, warn},
    std::path::{Path, PathBuf},
};

/// Compute the path of a keyring file for a key.
///
/// The file name is `prefix` followed by the last 8 characters of `key_id`
/// upper-cased. The extension is `asc` for ASCII-armored files and `gpg`
/// otherwise.
pub fn keyring_path(key_id: &str, is_ascii: bool, base: &Path, prefix: &str) -> PathBuf {
    let chars = key_id.chars().collect::<Vec<_>>();
    let short = chars[chars.len().saturating_sub(8)..]
        .iter()
        .collect::<String>()
        .to_uppercase();

    base.join(format!(
        "{}{}.{}",
        prefix,
        short,
        if is_ascii { "asc" } else { "gpg" }
    ))
}

/// Result of ensuring the signing key of a repository is installed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeyInstallation {
    /// Resolved fingerprint of the signing key.
    pub key_id: String,
    /// Keyring holding the key.
    pub keyring_path: PathBuf,
    /// Whether the keyring was (re)installed.
    pub changed: bool,
}

/// Installs repository signing keys.
pub struct KeyManager {
    keyrings_dir: PathBuf,
    keyring_prefix: String,
    key_assets_dir: Option<PathBuf>,
    default_key_server: String,
    tool: Box<dyn KeyTool>,
    resolver: Box<dyn PpaKeyResolver>,
}

impl KeyManager {
    /// Construct an instance from configuration and external capabilities.
    pub fn new(
        config: &ArchivesConfig,
        tool: Box<dyn KeyTool>,
        resolver: Box<dyn PpaKeyResolver>,
    ) -> Self {
        Self {
            keyrings_dir: config.keyrings_dir.clone(),
            keyring_prefix: config.keyring_prefix.clone(),
            key_assets_dir: config.key_assets_dir.clone(),
            default_key_server: config.default_key_server.clone(),
            tool,
            resolver,
        }
    }

    /// Directory holding installed keyrings.
    pub fn keyrings_dir(&self) -> &Path {
        &self.keyrings_dir
    }

    /// Path of the installed keyring for a key.
    pub fn keyring_path(&self, key_id: &str) -> PathBuf {
        keyring_path(key_id, false, &self.keyrings_dir, &self.keyring_prefix)
    }

    /// Find a local key asset for a key.
    ///
    /// Assets are named by the last 8 characters of the key identifier, upper-cased,
    /// with an `.asc` extension.
    pub fn find_asset_with_key_id(&self, key_id: &str) -> Option<PathBuf> {
        let path = keyring_path(key_id, true, self.key_assets_dir.as_deref()?, "");

        if path.exists() {
            Some(path)
        } else {
            None
        }
    }

    /// Obtain the fingerprints of all keys in key material.
    pub fn key_fingerprints(&self, key: &str) -> Result<Vec<String>> {
        self.tool
            .show_keys(key)
            .map_err(|e| ArchivesError::KeyInstall {
                message: e.output,
                key: Some(key.to_string()),
            })
    }

    /// Whether the keyring for `key_id` exists and holds that key.
    ///
    /// Key tool failures are logged and treated as the key being absent.
    pub fn is_key_installed(&self, key_id: &str) -> bool {
        let keyring = self.keyring_path(key_id);

        // Listing keys creates the keyring as a side effect.
        if !keyring.is_file() {
            debug!("keyring file not found: {}", keyring.display());
            return false;
        }

        debug!("listing keys in keyring {}", keyring.display());
        match self.tool.list_keys(&keyring, key_id) {
            Ok(()) => true,
            Err(e) => {
                warn!("gpg error: {}", e.output);
                false
            }
        }
    }

    /// Install key material into the keyring named by its fingerprint.
    ///
    /// The material must hold exactly one key.
    pub fn install_key(&self, key: &str) -> Result<()> {
        debug!("importing key {}", key);

        let fingerprints = self.key_fingerprints(key)?;

        let fingerprint = match fingerprints.as_slice() {
            [] => {
                return Err(ArchivesError::KeyInstall {
                    message: "Invalid GPG key".to_string(),
                    key: Some(key.to_string()),
                })
            }
            [fingerprint] => fingerprint,
            _ => {
                return Err(ArchivesError::KeyInstall {
                    message: "Key must be a single key, not multiple.".to_string(),
                    key: Some(key.to_string()),
                })
            }
        };

        self.create_keyrings_dir()?;

        let keyring = self.keyring_path(fingerprint);
        self.tool
            .import(&keyring, key)
            .map_err(|e| ArchivesError::KeyInstall {
                message: e.output,
                key: Some(key.to_string()),
            })?;

        set_world_readable(&keyring)?;
        info!("installed keyring {}", keyring.display());

        Ok(())
    }

    /// Install a key by fetching it from a key server.
    pub fn install_key_from_keyserver(&self, key_id: &str, key_server: &str) -> Result<()> {
        self.create_keyrings_dir()?;

        let keyring = self.keyring_path(key_id);
        let homedir = temporary_home_dir()?;

        self.tool
            .fetch_and_import(&keyring, homedir.path(), key_server, key_id)
            .map_err(|e| ArchivesError::KeyInstallFromServer {
                message: e.output,
                key_id: key_id.to_string(),
                key_server: key_server.to_string(),
            })?;

        set_world_readable(&keyring)?;
        info!(
            "installed keyring {} from {}",
            keyring.display(),
            key_server
        );

        Ok(())
    }

    /// Resolve the signing key identifier and key server of a repository.
    pub fn resolve_key(&self, repo: &PackageRepository) -> Result<(String, String)> {
        match repo {
            PackageRepository::Ppa(ppa) => Ok((
                self.resolver.resolve_key_id(ppa.ppa())?,
                self.default_key_server.clone(),
            )),
            PackageRepository::Apt(apt) => Ok((
                apt.key_id().to_string(),
                apt.key_server()
                    .unwrap_or(self.default_key_server.as_str())
                    .to_string(),
            )),
        }
    }

    /// Ensure the signing key of a repository is installed.
    pub fn ensure_key_installed(&self, repo: &PackageRepository) -> Result<KeyInstallation> {
        let (key_id, key_server) = self.resolve_key(repo)?;
        let keyring_path = self.keyring_path(&key_id);

        if self.is_key_installed(&key_id) {
            return Ok(KeyInstallation {
                key_id,
                keyring_path,
                changed: false,
            });
        }

        // A keyring lacking the key is replaced rather than merged into.
        match std::fs::remove_file(&keyring_path) {
            Ok(()) => {
                debug!("removed stale keyring {}", keyring_path.display());
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(ArchivesError::io_path(&keyring_path, e)),
        }

        if let Some(asset) = self.find_asset_with_key_id(&key_id) {
            let key = std::fs::read_to_string(&asset)
                .map_err(|e| ArchivesError::io_path(&asset, e))?;
            self.install_key(&key)?;
        } else {
            self.install_key_from_keyserver(&key_id, &key_server)?;
        }

        Ok(KeyInstallation {
            key_id,
            keyring_path,
            changed: true,
        })
    }

    /// Install the signing key of a repository.
    ///
    /// Returns whether the key configuration changed.
    pub fn install_package_repository_key(&self, repo: &PackageRepository) -> Result<bool> {
        Ok(self.ensure_key_installed(repo)?.changed)
    }

    fn create_keyrings_dir(&self) -> Result<()> {
        if self.keyrings_dir.exists() {
            return Ok(());
        }

        debug!(
            "keyrings location {} doesn't exist; creating it",
            self.keyrings_dir.display()
        );

        let mut builder = std::fs::DirBuilder::new();
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o755);
        }

        builder
            .create(&self.keyrings_dir)
            .map_err(|e| ArchivesError::io_path(&self.keyrings_dir, e))
    }
}

/// Make a keyring readable by APT.
///
/// A keyring the tool didn't create is left for callers to detect.
fn set_world_readable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("keyring {} not created by key tool", path.display());
            }
            Err(e) => return Err(ArchivesError::io_path(path, e)),
        }
    }
    #[cfg(not(unix))]
    let _ = path;

    Ok(())
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            repository::{AptRepository, PpaRepository},
            testutil::*,
        },
    };

    const KEY_ID: &str = "FAKEKEYID-BBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB";

    struct Fixture {
        _td: tempfile::TempDir,
        config: ArchivesConfig,
        tool: FakeKeyTool,
        resolver: FakePpaKeyResolver,
    }

    impl Fixture {
        fn new() -> Result<Self> {
            let td = tempfile::tempdir()?;
            let assets = td.path().join("keys");
            std::fs::create_dir(&assets)?;
            std::fs::create_dir_all(td.path().join("etc/apt"))?;

            let config = ArchivesConfig::default()
                .with_root(td.path())
                .with_key_assets_dir(&assets);

            Ok(Self {
                _td: td,
                config,
                tool: FakeKeyTool::default(),
                resolver: FakePpaKeyResolver::with_key("test/ppa", "FAKE-PPA-SIGNING-KEY"),
            })
        }

        fn manager(&self) -> KeyManager {
            KeyManager::new(
                &self.config,
                Box::new(self.tool.clone()),
                Box::new(self.resolver.clone()),
            )
        }

        fn assets(&self) -> &Path {
            self.config.key_assets_dir.as_deref().unwrap()
        }
    }

    #[test]
    fn keyring_path_naming() {
        let base = Path::new("/base");

        assert_eq!(
            keyring_path("FAKEKEY-aaaabbbb", false, base, "craft-"),
            Path::new("/base/craft-AAAABBBB.gpg")
        );
        assert_eq!(
            keyring_path("FAKEKEY-aaaabbbb", true, base, ""),
            Path::new("/base/AAAABBBB.asc")
        );
        assert_eq!(keyring_path("abc", false, base, "p-"), Path::new("/base/p-ABC.gpg"));
    }

    #[test]
    fn find_asset() -> Result<()> {
        let f = Fixture::new()?;
        let manager = f.manager();

        assert_eq!(manager.find_asset_with_key_id(KEY_ID), None);

        let asset = f.assets().join("BBBBBBBB.asc");
        std::fs::write(&asset, "key")?;
        assert_eq!(manager.find_asset_with_key_id(KEY_ID), Some(asset));

        let without_assets = KeyManager::new(
            &ArchivesConfig::default(),
            Box::new(FakeKeyTool::default()),
            Box::new(FakePpaKeyResolver::default()),
        );
        assert_eq!(without_assets.find_asset_with_key_id(KEY_ID), None);

        Ok(())
    }

    #[test]
    fn is_key_installed_missing_keyring_skips_tool() -> Result<()> {
        let f = Fixture::new()?;

        assert!(!f.manager().is_key_installed(KEY_ID));
        assert!(f.tool.calls().is_empty());

        Ok(())
    }

    #[test]
    fn is_key_installed_consults_tool() -> Result<()> {
        let f = Fixture::new()?;
        let manager = f.manager();
        std::fs::create_dir(manager.keyrings_dir())?;
        let keyring = manager.keyring_path(KEY_ID);

        std::fs::write(&keyring, KEY_ID)?;
        assert!(manager.is_key_installed(KEY_ID));
        assert_eq!(
            f.tool.calls(),
            vec![format!("list-keys {} {}", keyring.display(), KEY_ID)]
        );

        std::fs::write(&keyring, "some other key")?;
        assert!(!manager.is_key_installed(KEY_ID));

        Ok(())
    }

    #[test]
    fn install_key() -> Result<()> {
        let f = Fixture::new()?;
        let manager = f.manager();
        f.tool.add_key("KEY MATERIAL", &[KEY_ID]);

        assert!(!manager.keyrings_dir().exists());
        manager.install_key("KEY MATERIAL")?;

        let keyring = manager.keyring_path(KEY_ID);
        assert_eq!(std::fs::read_to_string(&keyring)?, KEY_ID);
        assert_eq!(
            f.tool.calls(),
            vec![
                "show-keys".to_string(),
                format!("import {}", keyring.display())
            ]
        );

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            assert_eq!(
                std::fs::metadata(&keyring)?.permissions().mode() & 0o777,
                0o644
            );
            assert_eq!(
                std::fs::metadata(manager.keyrings_dir())?.permissions().mode() & !0o755 & 0o777,
                0
            );
        }

        Ok(())
    }

    #[test]
    fn install_key_rejects_bad_material() -> Result<()> {
        let f = Fixture::new()?;
        let manager = f.manager();
        f.tool.add_key("TWO KEYS", &[KEY_ID, "CCCCCCCCCCCC"]);

        match manager.install_key("TWO KEYS") {
            Err(ArchivesError::KeyInstall { message, key }) => {
                assert_eq!(message, "Key must be a single key, not multiple.");
                assert_eq!(key.as_deref(), Some("TWO KEYS"));
            }
            res => panic!("unexpected result: {:?}", res),
        }

        let err = manager.install_key("NOT A KEY").unwrap_err();
        assert_eq!(err.to_string(), "Failed to install GPG key: Invalid GPG key");

        assert!(!manager.keyrings_dir().exists());

        Ok(())
    }

    #[test]
    fn install_key_import_failure() -> Result<()> {
        let f = Fixture::new()?;
        let manager = f.manager();
        f.tool.add_key("KEY MATERIAL", &[KEY_ID]);
        f.tool.state.borrow_mut().fail_import = Some("gpg: no valid OpenPGP data found.".into());

        let err = manager.install_key("KEY MATERIAL").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to install GPG key: gpg: no valid OpenPGP data found."
        );

        Ok(())
    }

    #[test]
    fn install_key_from_keyserver() -> Result<()> {
        let f = Fixture::new()?;
        let manager = f.manager();

        manager.install_key_from_keyserver(KEY_ID, "key.server")?;

        let keyring = manager.keyring_path(KEY_ID);
        assert_eq!(
            f.tool.calls(),
            vec![format!("fetch {} key.server {}", keyring.display(), KEY_ID)]
        );

        // The scratch directory was private while in use and removed afterwards.
        let state = f.tool.state.borrow();
        assert_eq!(state.homedirs.len(), 1);
        #[cfg(unix)]
        assert_eq!(state.homedirs[0].1, 0o700);
        assert!(!state.homedirs[0].0.exists());

        Ok(())
    }

    #[test]
    fn install_key_from_keyserver_failure() -> Result<()> {
        let f = Fixture::new()?;
        let manager = f.manager();
        f.tool.state.borrow_mut().fail_fetch = Some("gpg: keyserver receive failed".into());

        match manager.install_key_from_keyserver(KEY_ID, "key.server") {
            Err(ArchivesError::KeyInstallFromServer {
                message,
                key_id,
                key_server,
            }) => {
                assert_eq!(message, "gpg: keyserver receive failed");
                assert_eq!(key_id, KEY_ID);
                assert_eq!(key_server, "key.server");
            }
            res => panic!("unexpected result: {:?}", res),
        }

        assert!(f.tool.state.borrow().homedirs.iter().all(|(p, _)| !p.exists()));

        Ok(())
    }

    #[test]
    fn repository_key_already_installed() -> Result<()> {
        let f = Fixture::new()?;
        let manager = f.manager();
        std::fs::create_dir(manager.keyrings_dir())?;
        std::fs::write(manager.keyring_path(&"A".repeat(40)), "A".repeat(40))?;

        let repo = AptRepository::builder("http://some-url", "A".repeat(40)).build()?;

        assert!(!manager.install_package_repository_key(&repo.into())?);
        assert_eq!(f.tool.calls().len(), 1);

        Ok(())
    }

    #[test]
    fn repository_key_prefers_local_asset() -> Result<()> {
        let f = Fixture::new()?;
        let manager = f.manager();
        let key_id = "A".repeat(40);
        std::fs::write(f.assets().join("AAAAAAAA.asc"), "ASSET KEY")?;
        f.tool.add_key("ASSET KEY", &[key_id.as_str()]);

        let repo = AptRepository::builder("http://some-url", &key_id)
            .key_server("key.server")
            .build()?;

        assert!(manager.install_package_repository_key(&repo.into())?);

        let calls = f.tool.calls();
        assert!(calls.iter().any(|c| c.starts_with("import ")));
        assert!(!calls.iter().any(|c| c.starts_with("fetch ")));

        Ok(())
    }

    #[test]
    fn repository_key_falls_back_to_key_server() -> Result<()> {
        let f = Fixture::new()?;
        let manager = f.manager();
        let key_id = "A".repeat(40);

        let repo = AptRepository::builder("http://some-url", &key_id)
            .key_server("key.server")
            .build()?;

        assert!(manager.install_package_repository_key(&repo.into())?);
        assert_eq!(
            f.tool.calls(),
            vec![format!(
                "fetch {} key.server {}",
                manager.keyring_path(&key_id).display(),
                key_id
            )]
        );

        Ok(())
    }

    #[test]
    fn repository_key_replaces_stale_keyring() -> Result<()> {
        let f = Fixture::new()?;
        let manager = f.manager();
        let key_id = "A".repeat(40);
        std::fs::create_dir(manager.keyrings_dir())?;
        let keyring = manager.keyring_path(&key_id);
        std::fs::write(&keyring, "stale contents")?;

        let repo = AptRepository::builder("http://some-url", &key_id).build()?;

        assert!(manager.install_package_repository_key(&repo.into())?);
        assert_eq!(std::fs::read_to_string(&keyring)?, key_id);
        assert_eq!(
            f.tool.calls().last().cloned(),
            Some(format!(
                "fetch {} keyserver.ubuntu.com {}",
                keyring.display(),
                key_id
            ))
        );

        Ok(())
    }

    #[test]
    fn ppa_key_uses_resolver_and_default_server() -> Result<()> {
        let f = Fixture::new()?;
        let manager = f.manager();

        let repo = PackageRepository::from(PpaRepository::new("test/ppa", None)?);

        let installation = manager.ensure_key_installed(&repo)?;
        assert!(installation.changed);
        assert_eq!(installation.key_id, "FAKE-PPA-SIGNING-KEY");
        assert_eq!(
            installation.keyring_path,
            manager.keyrings_dir().join("craft-NING-KEY.gpg")
        );
        assert_eq!(
            f.tool.calls(),
            vec![format!(
                "fetch {} keyserver.ubuntu.com FAKE-PPA-SIGNING-KEY",
                installation.keyring_path.display()
            )]
        );
        assert_eq!(f.resolver.calls(), vec!["test/ppa".to_string()]);

        let unknown = PackageRepository::from(PpaRepository::new("other/ppa", None)?);
        assert!(matches!(
            manager.ensure_key_installed(&unknown),
            Err(ArchivesError::PpaKeyResolve { .. })
        ));

        Ok(())
    }
}
