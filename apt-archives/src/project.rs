// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Schema-based package repository definitions.

These types describe the `package-repositories` entries of a project file
using strict serde deserialization: field types are enforced by the type
system and unknown keys are rejected. They complement the looser
[crate::repository] model and differ from it in one respect. [AptDeb]
retains `path`, whereas [crate::repository::AptRepository::unmarshal()]
discards it.
*/

use {
    crate::{
        error::{ArchivesError, RepositoryValidationError, Result},
        repository::{AptRepository, PackageRepository, PpaRepository, Priority},
    },
    once_cell::sync::Lazy,
    regex::Regex,
    serde::{de::Error as _, Deserialize, Deserializer, Serialize},
    serde_json::Value,
};

static KEY_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9A-F]{40}$").expect("static regex should compile"));

/// The `type` of a repository. Only `apt` exists.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryType {
    Apt,
}

/// A symbolic pin priority.
///
/// Symbols are matched case-insensitively and serialized in lowercase.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PrioritySymbol {
    Always,
    Prefer,
    Defer,
}

impl<'de> Deserialize<'de> for PrioritySymbol {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;

        match s.to_ascii_lowercase().as_str() {
            "always" => Ok(Self::Always),
            "prefer" => Ok(Self::Prefer),
            "defer" => Ok(Self::Defer),
            _ => Err(D::Error::unknown_variant(&s, &["always", "prefer", "defer"])),
        }
    }
}

/// A pin priority as written in a project file.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PriorityValue {
    Symbol(PrioritySymbol),
    Value(i32),
}

impl From<PriorityValue> for Priority {
    fn from(v: PriorityValue) -> Self {
        match v {
            PriorityValue::Symbol(PrioritySymbol::Always) => Priority::Always,
            PriorityValue::Symbol(PrioritySymbol::Prefer) => Priority::Prefer,
            PriorityValue::Symbol(PrioritySymbol::Defer) => Priority::Defer,
            PriorityValue::Value(v) => Priority::Value(v),
        }
    }
}

/// A package format.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Format {
    #[serde(rename = "deb")]
    Deb,
    #[serde(rename = "deb-src")]
    DebSrc,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deb => "deb",
            Self::DebSrc => "deb-src",
        }
    }
}

fn deserialize_key_id<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<String, D::Error> {
    let key_id = String::deserialize(deserializer)?;

    if KEY_ID_RE.is_match(&key_id) {
        Ok(key_id)
    } else {
        Err(D::Error::custom(format!(
            "key-id '{}' does not match {}",
            key_id,
            KEY_ID_RE.as_str()
        )))
    }
}

/// A PPA repository entry.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct AptPpa {
    #[serde(rename = "type")]
    pub repository_type: RepositoryType,
    pub ppa: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<PriorityValue>,
}

/// A deb-style repository entry.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct AptDeb {
    #[serde(rename = "type")]
    pub repository_type: RepositoryType,
    pub url: String,
    #[serde(deserialize_with = "deserialize_key_id")]
    pub key_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architectures: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formats: Option<Vec<Format>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suites: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<PriorityValue>,
}

/// A project file repository entry.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ProjectRepository {
    Ppa(AptPpa),
    Deb(AptDeb),
}

impl ProjectRepository {
    /// Deserialize from a generic object.
    ///
    /// Objects having a `ppa` key are PPAs.
    pub fn unmarshal(data: &Value) -> Result<Self> {
        let repo = if data.get("ppa").is_some() {
            Self::Ppa(serde_json::from_value(data.clone())?)
        } else {
            Self::Deb(serde_json::from_value(data.clone())?)
        };

        repo.check_priority()?;

        Ok(repo)
    }

    /// The URL or PPA identifying this entry.
    pub fn identifier(&self) -> &str {
        match self {
            Self::Ppa(repo) => &repo.ppa,
            Self::Deb(repo) => &repo.url,
        }
    }

    pub fn priority(&self) -> Option<PriorityValue> {
        match self {
            Self::Ppa(repo) => repo.priority,
            Self::Deb(repo) => repo.priority,
        }
    }

    fn check_priority(&self) -> std::result::Result<(), RepositoryValidationError> {
        match self.priority() {
            Some(PriorityValue::Value(0)) => Err(RepositoryValidationError::new(
                self.identifier(),
                "invalid priority 0.",
            )
            .with_details("Priority cannot be zero.")
            .with_resolution("Verify priority value.")),
            _ => Ok(()),
        }
    }

    /// Convert into the validated repository model.
    ///
    /// `path` is carried over.
    pub fn into_package_repository(
        self,
    ) -> std::result::Result<PackageRepository, RepositoryValidationError> {
        match self {
            Self::Ppa(repo) => {
                Ok(PpaRepository::new(repo.ppa, repo.priority.map(Priority::from))?.into())
            }
            Self::Deb(repo) => {
                let mut builder = AptRepository::builder(repo.url, repo.key_id);

                if let Some(v) = repo.architectures {
                    builder = builder.architectures(v);
                }
                if let Some(v) = repo.formats {
                    builder = builder.formats(v.iter().map(|f| f.as_str()));
                }
                if let Some(v) = repo.components {
                    builder = builder.components(v);
                }
                if let Some(v) = repo.key_server {
                    builder = builder.key_server(v);
                }
                if let Some(v) = repo.name {
                    builder = builder.name(v);
                }
                if let Some(v) = repo.path {
                    builder = builder.path(v);
                }
                if let Some(v) = repo.suites {
                    builder = builder.suites(v);
                }
                if let Some(v) = repo.priority {
                    builder = builder.priority(Priority::from(v));
                }

                Ok(builder.build()?.into())
            }
        }
    }
}

/// Validate a repository entry against the project schema.
///
/// Entries with a `ppa` key are checked against the PPA schema and report its
/// error. All other entries are checked against the deb schema.
pub fn validate_repository(data: &Value) -> Result<()> {
    if !data.is_object() {
        return Err(ArchivesError::Schema(serde_json::Error::custom(
            "value must be a dictionary",
        )));
    }

    if data.get("ppa").is_some() {
        let repo = serde_json::from_value::<AptPpa>(data.clone())?;
        return Ok(ProjectRepository::Ppa(repo).check_priority()?);
    }

    let repo = serde_json::from_value::<AptDeb>(data.clone())?;

    Ok(ProjectRepository::Deb(repo).check_priority()?)
}
