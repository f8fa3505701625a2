// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Recording stand-ins for external tools.

use {
    crate::{
        error::{ArchivesError, Result, ToolError},
        gpg::KeyTool,
        platform::{ArchitectureRegistrar, HostPlatform},
        ppa::PpaKeyResolver,
    },
    std::{
        cell::RefCell,
        collections::HashMap,
        path::{Path, PathBuf},
        rc::Rc,
    },
};

fn tool_error(command: &str, output: impl ToString) -> ToolError {
    ToolError {
        command: command.to_string(),
        output: output.to_string(),
    }
}

#[derive(Debug, Default)]
pub struct FakeKeyState {
    /// Every invocation, in order.
    pub calls: Vec<String>,
    /// Fingerprints reported for key material.
    pub fingerprints: HashMap<String, Vec<String>>,
    pub fail_import: Option<String>,
    pub fail_fetch: Option<String>,
    /// Report success for fetches without writing the keyring.
    pub discard_fetches: bool,
    /// Home directories passed to fetches, with their permission bits at the time.
    pub homedirs: Vec<(PathBuf, u32)>,
}

/// A key tool whose keyrings are plain files listing key ids.
#[derive(Clone, Debug, Default)]
pub struct FakeKeyTool {
    pub state: Rc<RefCell<FakeKeyState>>,
}

impl FakeKeyTool {
    pub fn add_key(&self, material: &str, fingerprints: &[&str]) {
        self.state.borrow_mut().fingerprints.insert(
            material.to_string(),
            fingerprints.iter().map(|s| s.to_string()).collect(),
        );
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.borrow().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }
}

impl KeyTool for FakeKeyTool {
    fn list_keys(&self, keyring: &Path, key_id: &str) -> std::result::Result<(), ToolError> {
        self.state
            .borrow_mut()
            .calls
            .push(format!("list-keys {} {}", keyring.display(), key_id));

        let content = std::fs::read_to_string(keyring).map_err(|e| tool_error("list-keys", e))?;

        if content.lines().any(|l| l == key_id) {
            Ok(())
        } else {
            Err(tool_error("list-keys", format!("gpg: error reading key: No public key {}", key_id)))
        }
    }

    fn show_keys(&self, key: &str) -> std::result::Result<Vec<String>, ToolError> {
        let mut state = self.state.borrow_mut();
        state.calls.push("show-keys".to_string());

        Ok(state.fingerprints.get(key).cloned().unwrap_or_default())
    }

    fn import(&self, keyring: &Path, key: &str) -> std::result::Result<(), ToolError> {
        let mut state = self.state.borrow_mut();
        state.calls.push(format!("import {}", keyring.display()));

        if let Some(output) = &state.fail_import {
            return Err(tool_error("import", output));
        }

        let fingerprints = state.fingerprints.get(key).cloned().unwrap_or_default();
        std::fs::write(keyring, fingerprints.join("\n")).map_err(|e| tool_error("import", e))
    }

    fn fetch_and_import(
        &self,
        keyring: &Path,
        homedir: &Path,
        key_server: &str,
        key_id: &str,
    ) -> std::result::Result<(), ToolError> {
        let mut state = self.state.borrow_mut();
        state.calls.push(format!(
            "fetch {} {} {}",
            keyring.display(),
            key_server,
            key_id
        ));

        #[cfg(unix)]
        let mode = {
            use std::os::unix::fs::PermissionsExt;
            std::fs::metadata(homedir)
                .map_err(|e| tool_error("fetch", e))?
                .permissions()
                .mode()
                & 0o777
        };
        #[cfg(not(unix))]
        let mode = 0;
        state.homedirs.push((homedir.to_path_buf(), mode));

        if let Some(output) = &state.fail_fetch {
            return Err(tool_error("fetch", output));
        }
        if state.discard_fetches {
            return Ok(());
        }

        std::fs::write(keyring, key_id).map_err(|e| tool_error("fetch", e))
    }
}

/// A PPA key resolver backed by a fixed table.
#[derive(Clone, Debug, Default)]
pub struct FakePpaKeyResolver {
    keys: HashMap<String, String>,
    calls: Rc<RefCell<Vec<String>>>,
}

impl FakePpaKeyResolver {
    pub fn with_key(ppa: &str, key_id: &str) -> Self {
        let mut resolver = Self::default();
        resolver.keys.insert(ppa.to_string(), key_id.to_string());
        resolver
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl PpaKeyResolver for FakePpaKeyResolver {
    fn resolve_key_id(&self, ppa: &str) -> Result<String> {
        self.calls.borrow_mut().push(ppa.to_string());

        self.keys
            .get(ppa)
            .cloned()
            .ok_or_else(|| ArchivesError::PpaKeyResolve {
                ppa: ppa.to_string(),
                message: "not found".to_string(),
            })
    }
}

/// A host with fixed properties.
#[derive(Clone, Debug)]
pub struct FakeHost {
    pub codename: String,
    pub architecture: String,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self {
            codename: "FAKE-CODENAME".to_string(),
            architecture: "FAKE-HOST-ARCH".to_string(),
        }
    }
}

impl HostPlatform for FakeHost {
    fn codename(&self) -> Result<String> {
        Ok(self.codename.clone())
    }

    fn architecture(&self) -> String {
        self.architecture.clone()
    }
}

/// Records registered architectures.
#[derive(Clone, Debug, Default)]
pub struct FakeRegistrar {
    pub registered: Rc<RefCell<Vec<String>>>,
}

impl FakeRegistrar {
    pub fn registered(&self) -> Vec<String> {
        self.registered.borrow().clone()
    }
}

impl ArchitectureRegistrar for FakeRegistrar {
    fn register(&self, arch: &str) -> Result<()> {
        self.registered.borrow_mut().push(arch.to_string());

        Ok(())
    }
}
