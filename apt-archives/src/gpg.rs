// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Interface to an OpenPGP key tool.

[KeyTool] describes the operations the key manager needs. [GpgKeyTool]
implements them by invoking GnuPG.
*/

use {
    crate::error::ToolError,
    log::debug,
    std::path::{Path, PathBuf},
};

/// Options passed to every `gpg` invocation.
const GPG_BASE_ARGS: &[&str] = &["--batch", "--no-default-keyring", "--with-colons"];

/// Operations on keys and keyrings.
///
/// Failures carry the raw output of the tool.
pub trait KeyTool {
    /// Succeeds if `keyring` holds `key_id`.
    fn list_keys(&self, keyring: &Path, key_id: &str) -> Result<(), ToolError>;

    /// Obtain the fingerprints of every key in `key`, which is key material.
    fn show_keys(&self, key: &str) -> Result<Vec<String>, ToolError>;

    /// Import key material into `keyring`.
    fn import(&self, keyring: &Path, key: &str) -> Result<(), ToolError>;

    /// Fetch `key_id` from `key_server` and import it into `keyring`.
    ///
    /// `homedir` is a private scratch directory for the tool.
    fn fetch_and_import(
        &self,
        keyring: &Path,
        homedir: &Path,
        key_server: &str,
        key_id: &str,
    ) -> Result<(), ToolError>;
}

/// Create a temporary directory only accessible by its owner.
///
/// The directory is deleted when the returned value is dropped.
pub fn temporary_home_dir() -> std::io::Result<tempfile::TempDir> {
    let td = tempfile::Builder::new().prefix("apt-archives-gpg-").tempdir()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(td.path(), std::fs::Permissions::from_mode(0o700))?;
    }

    Ok(td)
}

/// Extract fingerprints from `--with-colons` output.
pub fn parse_fingerprints(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.strip_prefix("fpr:"))
        .map(|v| v.trim_matches(':').to_string())
        .collect()
}

/// A [KeyTool] backed by the `gpg` executable.
#[derive(Clone, Debug)]
pub struct GpgKeyTool {
    program: PathBuf,
}

impl Default for GpgKeyTool {
    fn default() -> Self {
        Self {
            program: PathBuf::from("gpg"),
        }
    }
}

impl GpgKeyTool {
    /// Construct an instance invoking a specific `gpg` executable.
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
        }
    }

    /// Arguments of an invocation, optionally addressing a keyring.
    pub fn command_args(&self, keyring: Option<&Path>, params: &[&str]) -> Vec<String> {
        let mut args = GPG_BASE_ARGS
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>();

        if let Some(keyring) = keyring {
            args.push("--keyring".to_string());
            args.push(format!("gnupg-ring:{}", keyring.display()));
        }

        args.extend(params.iter().map(|s| s.to_string()));

        args
    }

    fn run(
        &self,
        keyring: Option<&Path>,
        params: &[&str],
        stdin: Option<&str>,
    ) -> Result<Vec<u8>, ToolError> {
        let args = self.command_args(keyring, params);
        let command = format!("{} {}", self.program.display(), args.join(" "));

        debug!("executing command: {}", command);

        let mut expression = duct::cmd(self.program.as_path(), &args)
            .env("LANG", "C.UTF-8")
            .stdout_capture()
            .stderr_capture()
            .unchecked();
        if let Some(input) = stdin {
            expression = expression.stdin_bytes(input.as_bytes().to_vec());
        }

        let output = expression.run().map_err(|e| ToolError {
            command: command.clone(),
            output: e.to_string(),
        })?;

        if output.status.success() {
            Ok(output.stdout)
        } else {
            Err(ToolError {
                command,
                output: format!(
                    "{}{}",
                    String::from_utf8_lossy(&output.stdout),
                    String::from_utf8_lossy(&output.stderr)
                ),
            })
        }
    }
}

impl KeyTool for GpgKeyTool {
    fn list_keys(&self, keyring: &Path, key_id: &str) -> Result<(), ToolError> {
        self.run(Some(keyring), &["--list-keys", key_id], None)?;

        Ok(())
    }

    fn show_keys(&self, key: &str) -> Result<Vec<String>, ToolError> {
        let homedir = temporary_home_dir().map_err(|e| ToolError {
            command: "creating gpg home directory".to_string(),
            output: e.to_string(),
        })?;
        let homedir = homedir.path().display().to_string();

        let stdout = self.run(
            None,
            &[
                "--homedir",
                &homedir,
                "--import-options",
                "show-only",
                "--import",
            ],
            Some(key),
        )?;

        Ok(parse_fingerprints(&String::from_utf8_lossy(&stdout)))
    }

    fn import(&self, keyring: &Path, key: &str) -> Result<(), ToolError> {
        self.run(Some(keyring), &["--import", "-"], Some(key))?;

        Ok(())
    }

    fn fetch_and_import(
        &self,
        keyring: &Path,
        homedir: &Path,
        key_server: &str,
        key_id: &str,
    ) -> Result<(), ToolError> {
        let homedir = homedir.display().to_string();

        self.run(
            Some(keyring),
            &[
                "--homedir",
                &homedir,
                "--keyserver",
                key_server,
                "--recv-keys",
                key_id,
            ],
            None,
        )?;

        Ok(())
    }
}
