// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! APT pin preferences.

See `apt_preferences(5)` for the file format. Each [Preference] is
rendered as a paragraph applying to all packages:

```text
Package: *
Pin: origin "example.com"
Pin-Priority: 990
```

[PreferencesManager] owns a single preferences file. Reading is lenient:
paragraphs which aren't valid preferences are skipped. Writing is strict
and only touches the file when its content would change.
*/

use {
    crate::{
        config::ArchivesConfig,
        control::{ControlField, ControlParagraph},
        error::{ArchivesError, PreferencesError, Result},
    },
    log::{debug, info, warn},
    std::{
        fmt::{Display, Formatter},
        path::{Path, PathBuf},
        str::FromStr,
    },
};

/// A single pin preference.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Preference {
    pin: String,
    priority: i32,
}

impl Preference {
    /// Construct a new instance.
    ///
    /// Errors if `priority` is zero.
    pub fn new(pin: impl ToString, priority: i32) -> Result<Self> {
        if priority == 0 {
            return Err(PreferencesError {
                component: "pin",
                value: None,
                details: Some("Pin-Priority cannot be zero.".to_string()),
                resolution: "Check pin values for repositories.".to_string(),
            }
            .into());
        }

        Ok(Self {
            pin: pin.to_string(),
            priority,
        })
    }

    pub fn pin(&self) -> &str {
        &self.pin
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Convert to a control paragraph.
    pub fn to_paragraph(&self) -> ControlParagraph<'_> {
        [
            ControlField::new("Package", "*"),
            ControlField::new("Pin", self.pin.as_str()),
            ControlField::new("Pin-Priority", self.priority.to_string()),
        ]
        .into_iter()
        .collect()
    }
}

impl FromStr for Preference {
    type Err = ArchivesError;

    /// Parse a preferences paragraph.
    ///
    /// Blank and comment lines are ignored. [ArchivesError::PreferencesParse]
    /// indicates the text isn't a preferences paragraph at all.
    /// [ArchivesError::Preferences] indicates an incomplete or invalid one.
    fn from_str(s: &str) -> Result<Self> {
        let paragraph = ControlParagraph::parse_str(s)
            .map_err(|e| ArchivesError::PreferencesParse(e.to_string()))?;

        let mut pin = None;
        let mut priority = None;

        for field in paragraph.iter_fields() {
            match field.name().to_ascii_lowercase().as_str() {
                "pin" => {
                    pin = Some(field.value_str().to_string());
                }
                "pin-priority" => {
                    priority = Some(field.value_str().parse::<i32>().map_err(|e| {
                        ArchivesError::PreferencesParse(format!(
                            "invalid Pin-Priority '{}': {}",
                            field.value_str(),
                            e
                        ))
                    })?);
                }
                "package" => {}
                _ => {
                    warn!("unknown preference line: {:?}", field.to_string().trim_end());
                }
            }
        }

        if pin.is_none() && priority.is_none() {
            return Err(ArchivesError::PreferencesParse(
                "string is not a preferences paragraph".to_string(),
            ));
        }

        let pin = match pin {
            Some(pin) if !pin.is_empty() => pin,
            pin => {
                return Err(PreferencesError {
                    component: "pin",
                    value: pin,
                    details: None,
                    resolution: "Remove or update preferences file.".to_string(),
                }
                .into());
            }
        };

        let priority = match priority {
            Some(priority) if priority != 0 => priority,
            priority => {
                return Err(PreferencesError {
                    component: "priority",
                    value: priority.map(|p| p.to_string()),
                    details: None,
                    resolution: "Remove or update preferences file.".to_string(),
                }
                .into());
            }
        };

        Self::new(pin, priority)
    }
}

impl Display for Preference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // Trailing empty line starts the next paragraph.
        writeln!(f, "{}", self.to_paragraph())
    }
}

/// Manages an APT preferences file.
#[derive(Clone, Debug)]
pub struct PreferencesManager {
    path: PathBuf,
    header: String,
    preferences: Vec<Preference>,
}

impl PreferencesManager {
    /// Construct an instance managing the file at `path`.
    ///
    /// `header` is a comment line written at the top of the file.
    pub fn new(path: impl AsRef<Path>, header: impl ToString) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            header: header.to_string(),
            preferences: vec![],
        }
    }

    pub fn from_config(config: &ArchivesConfig) -> Self {
        Self::new(&config.preferences_path, &config.preferences_header)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Preferences currently held, in insertion order.
    pub fn preferences(&self) -> &[Preference] {
        &self.preferences
    }

    /// Read preferences from the managed file.
    ///
    /// A missing file is not an error. Paragraphs that aren't valid
    /// preferences are skipped.
    pub fn read(&mut self) -> Result<()> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no preferences read");
                return Ok(());
            }
            Err(e) => return Err(ArchivesError::io_path(&self.path, e)),
        };

        for paragraph in data.split("\n\n") {
            if paragraph.trim().is_empty() {
                continue;
            }

            match paragraph.parse::<Preference>() {
                Ok(preference) => {
                    if !self.preferences.contains(&preference) {
                        self.preferences.push(preference);
                    }
                }
                Err(e) => {
                    debug!("skipping preferences paragraph: {}", e);
                }
            }
        }

        debug!("{} pin preferences read", self.preferences.len());

        Ok(())
    }

    /// Add a preference.
    ///
    /// Returns whether it was added. Preferences already present are not
    /// added again.
    pub fn add(&mut self, pin: impl ToString, priority: i32) -> Result<bool> {
        let preference = Preference::new(pin, priority)?;

        if self.preferences.contains(&preference) {
            Ok(false)
        } else {
            self.preferences.push(preference);
            Ok(true)
        }
    }

    /// Render the file content for the current preferences.
    pub fn render(&self) -> String {
        let mut s = format!("{}\n", self.header);
        for preference in &self.preferences {
            s.push_str(&preference.to_string());
        }

        s
    }

    /// Write the managed file.
    ///
    /// With no preferences the file is deleted. Otherwise it is written only
    /// if its content changes. Returns whether the filesystem was modified.
    pub fn write(&self) -> Result<bool> {
        if self.preferences.is_empty() {
            return match std::fs::remove_file(&self.path) {
                Ok(()) => {
                    info!("removed preferences file {}", self.path.display());
                    Ok(true)
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
                Err(e) => Err(ArchivesError::io_path(&self.path, e)),
            };
        }

        let content = self.render();

        match std::fs::read_to_string(&self.path) {
            Ok(existing) if existing == content => {
                debug!("ignoring unchanged preferences: {}", self.path.display());
                return Ok(false);
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(ArchivesError::io_path(&self.path, e)),
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                debug!("creating directory {}", parent.display());
                std::fs::create_dir_all(parent).map_err(|e| ArchivesError::io_path(parent, e))?;
            }
        }

        std::fs::write(&self.path, content).map_err(|e| ArchivesError::io_path(&self.path, e))?;
        info!("wrote preferences file {}", self.path.display());

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use {super::*, indoc::indoc};

    const HEADER: &str = "# This file is managed by craft-archives";

    fn manager(dir: &tempfile::TempDir) -> PreferencesManager {
        PreferencesManager::new(dir.path().join("preferences"), HEADER)
    }

    #[test]
    fn preference_rendering() -> Result<()> {
        let preference = Preference::new("origin \"example.com\"", 990)?;

        assert_eq!(
            preference.to_string(),
            "Package: *\nPin: origin \"example.com\"\nPin-Priority: 990\n\n"
        );

        Ok(())
    }

    #[test]
    fn preference_zero_priority() {
        let err = Preference::new("release o=LP-PPA-ppa-ppa", 0).unwrap_err();

        match err {
            ArchivesError::Preferences(e) => {
                assert_eq!(e.component, "pin");
                assert_eq!(e.details.as_deref(), Some("Pin-Priority cannot be zero."));
                assert_eq!(e.resolution, "Check pin values for repositories.");
            }
            e => panic!("unexpected error: {:?}", e),
        }
    }

    #[test]
    fn preference_from_str() -> Result<()> {
        for (s, pin, priority) in [
            (
                "Package: *\nPin: origin \"example.com\"\nPin-Priority: 100\n",
                "origin \"example.com\"",
                100,
            ),
            (
                "# Comment\n\nPackage: *\nPin: release o=LP-PPA-ppa-ppa\nPin-Priority: -1",
                "release o=LP-PPA-ppa-ppa",
                -1,
            ),
            ("PIN: release a=stable\npin-priority: 1000\n", "release a=stable", 1000),
        ] {
            let preference = s.parse::<Preference>()?;
            assert_eq!(preference.pin(), pin);
            assert_eq!(preference.priority(), priority);
        }

        Ok(())
    }

    #[test]
    fn preference_from_str_unknown_field_ignored() -> Result<()> {
        let preference = "Explanation: testing\nPin: origin \"x\"\nPin-Priority: 5\n"
            .parse::<Preference>()?;

        assert_eq!(preference, Preference::new("origin \"x\"", 5)?);

        Ok(())
    }

    #[test]
    fn preference_from_str_not_preferences() {
        for s in ["# Just a comment", "Package: *\n", "not a field"] {
            assert!(
                matches!(s.parse::<Preference>(), Err(ArchivesError::PreferencesParse(_))),
                "{}",
                s
            );
        }

        assert!(matches!(
            "Pin: x\nPin-Priority: high".parse::<Preference>(),
            Err(ArchivesError::PreferencesParse(_))
        ));
    }

    #[test]
    fn preference_from_str_incomplete() {
        for (s, component) in [
            ("Pin-Priority: 100\n", "pin"),
            ("Pin:\nPin-Priority: 100\n", "pin"),
            ("Pin: origin \"x\"\n", "priority"),
            ("Pin: origin \"x\"\nPin-Priority: 0\n", "priority"),
        ] {
            match s.parse::<Preference>() {
                Err(ArchivesError::Preferences(e)) => {
                    assert_eq!(e.component, component, "{}", s);
                    assert_eq!(e.resolution, "Remove or update preferences file.");
                }
                res => panic!("unexpected result for {:?}: {:?}", s, res),
            }
        }

        let err = "Pin: origin \"x\"\nPin-Priority: 0\n"
            .parse::<Preference>()
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid apt preference priority '0'");
    }

    #[test]
    fn read_missing_file() -> Result<()> {
        let td = tempfile::tempdir()?;
        let mut manager = manager(&td);

        manager.read()?;
        assert!(manager.preferences().is_empty());

        Ok(())
    }

    #[test]
    fn read_skips_invalid_and_duplicates() -> Result<()> {
        let td = tempfile::tempdir()?;
        let mut manager = manager(&td);

        std::fs::write(
            manager.path(),
            indoc! {r#"
                # This file is managed by craft-archives
                Package: *
                Pin: origin "example.com"
                Pin-Priority: 100

                # A stray comment paragraph

                Package: *
                Pin: release o=LP-PPA-test-ppa
                Pin-Priority: 990

                Package: *
                Pin: origin "example.com"
                Pin-Priority: 100

                Package: *
                Pin: origin "broken.com"
                Pin-Priority: lots

                Package: *
                Pin-Priority: 10
            "#},
        )?;

        manager.read()?;

        assert_eq!(
            manager.preferences(),
            &[
                Preference::new("origin \"example.com\"", 100)?,
                Preference::new("release o=LP-PPA-test-ppa", 990)?,
            ]
        );

        Ok(())
    }

    #[test]
    fn add_deduplicates() -> Result<()> {
        let td = tempfile::tempdir()?;
        let mut manager = manager(&td);

        assert!(manager.add("origin \"example.com\"", 100)?);
        assert!(!manager.add("origin \"example.com\"", 100)?);
        assert!(manager.add("origin \"example.com\"", 990)?);
        assert_eq!(manager.preferences().len(), 2);

        assert!(manager.add("origin \"example.com\"", 0).is_err());

        Ok(())
    }

    #[test]
    fn write_is_idempotent() -> Result<()> {
        let td = tempfile::tempdir()?;
        let mut manager = manager(&td);

        manager.add("release o=LP-PPA-test-ppa", 1000)?;
        manager.add("origin \"example.com\"", -1)?;

        assert!(manager.write()?);
        assert_eq!(
            std::fs::read_to_string(manager.path())?,
            indoc! {r#"
                # This file is managed by craft-archives
                Package: *
                Pin: release o=LP-PPA-test-ppa
                Pin-Priority: 1000

                Package: *
                Pin: origin "example.com"
                Pin-Priority: -1

            "#}
        );

        assert!(!manager.write()?);

        // A fresh manager reading the file converges on the same content.
        let mut reread = PreferencesManager::new(manager.path(), HEADER);
        reread.read()?;
        assert_eq!(reread.preferences(), manager.preferences());
        assert!(!reread.write()?);

        Ok(())
    }

    #[test]
    fn write_replaces_changed_content() -> Result<()> {
        let td = tempfile::tempdir()?;
        let mut manager = manager(&td);
        std::fs::write(manager.path(), "stale")?;

        manager.add("origin \"example.com\"", 5)?;
        assert!(manager.write()?);
        assert!(std::fs::read_to_string(manager.path())?.starts_with(HEADER));

        Ok(())
    }

    #[test]
    fn write_empty_deletes_file() -> Result<()> {
        let td = tempfile::tempdir()?;
        let manager = manager(&td);

        assert!(!manager.write()?);

        std::fs::write(manager.path(), "content")?;
        assert!(manager.write()?);
        assert!(!manager.path().exists());
        assert!(!manager.write()?);

        Ok(())
    }

    #[test]
    fn write_creates_parent_directory() -> Result<()> {
        let td = tempfile::tempdir()?;
        let mut manager = PreferencesManager::new(
            td.path().join("etc/apt/preferences.d/craft-archives"),
            HEADER,
        );

        manager.add("origin \"example.com\"", 5)?;
        assert!(manager.write()?);
        assert!(manager.path().exists());

        Ok(())
    }
}
