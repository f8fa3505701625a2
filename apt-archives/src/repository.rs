// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Package repository definitions.

A package repository is declared as a generic key-value object, typically
parsed from a YAML project file. [PackageRepository::unmarshal()] turns such an
object into a validated, immutable [PackageRepository] and
[PackageRepository::marshal()] performs the inverse conversion.

There are two flavors of repository:

* [PpaRepository] is a Personal Package Archive hosted on Launchpad and
  identified by an `owner/name` pair. Its URL and signing key are derived from
  the name.
* [AptRepository] is a generic APT archive identified by its URL and the
  fingerprint of its signing key.

The presence of a `ppa` key selects the PPA flavor.

Validation is fail fast: the first violated rule is reported as a
[RepositoryValidationError] and invalid values are never repaired.
*/

use {
    crate::error::RepositoryValidationError,
    once_cell::sync::Lazy,
    regex::Regex,
    serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer},
    serde_json::{Map, Value},
    std::hash::{Hash, Hasher},
};

/// Pin priority of the `always` convenience value.
pub const PRIORITY_ALWAYS: i32 = 1000;

/// Pin priority of the `prefer` convenience value.
pub const PRIORITY_PREFER: i32 = 990;

/// Pin priority of the `defer` convenience value.
pub const PRIORITY_DEFER: i32 = 100;

/// Key identifiers are full fingerprints.
static KEY_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9A-F]{40}$").expect("static regex should compile"));

/// Runs of characters not permitted in a default repository name.
static NAME_SANITIZE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\W+").expect("static regex should compile"));

const PPA_FIELDS: &[&str] = &["ppa", "priority", "type"];

const APT_FIELDS: &[&str] = &[
    "architectures",
    "components",
    "formats",
    "key-id",
    "key-server",
    "name",
    "path",
    "priority",
    "suites",
    "type",
    "url",
];

const VALID_FORMATS: &[&str] = &["deb", "deb-src"];

/// The pin priority of a repository.
///
/// Higher values are preferred by the APT resolver. The symbolic variants are
/// convenience names for common values. Equality, hashing and [Self::value()]
/// all operate on the numeric value, so `Always == Value(1000)`.
#[derive(Clone, Copy, Debug)]
pub enum Priority {
    Always,
    Prefer,
    Defer,
    Value(i32),
}

impl Priority {
    /// Resolve a symbolic priority name.
    ///
    /// Names are case insensitive.
    pub fn from_symbol(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "always" => Some(Self::Always),
            "prefer" => Some(Self::Prefer),
            "defer" => Some(Self::Defer),
            _ => None,
        }
    }

    /// The numeric pin priority.
    pub fn value(&self) -> i32 {
        match self {
            Self::Always => PRIORITY_ALWAYS,
            Self::Prefer => PRIORITY_PREFER,
            Self::Defer => PRIORITY_DEFER,
            Self::Value(v) => *v,
        }
    }

    /// The lowercase symbolic name, if this is a symbolic priority.
    pub fn symbol(&self) -> Option<&'static str> {
        match self {
            Self::Always => Some("always"),
            Self::Prefer => Some("prefer"),
            Self::Defer => Some("defer"),
            Self::Value(_) => None,
        }
    }

    fn to_value(self) -> Value {
        match self.symbol() {
            Some(symbol) => Value::String(symbol.to_string()),
            None => Value::from(self.value()),
        }
    }

    fn from_value(url: &str, value: &Value) -> Result<Self, RepositoryValidationError> {
        let invalid = || {
            RepositoryValidationError::new(url, format!("invalid priority {}.", describe(value)))
                .with_details("Priority must be 'always', 'prefer', 'defer' or a nonzero integer.")
                .with_resolution("Verify priority value.")
        };

        match value {
            Value::String(s) => Self::from_symbol(s).ok_or_else(invalid),
            Value::Number(n) => n
                .as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .map(Self::Value)
                .ok_or_else(invalid),
            _ => Err(invalid()),
        }
    }
}

impl PartialEq for Priority {
    fn eq(&self, other: &Self) -> bool {
        self.value() == other.value()
    }
}

impl Eq for Priority {}

impl PartialEq<i32> for Priority {
    fn eq(&self, other: &i32) -> bool {
        self.value() == *other
    }
}

impl Hash for Priority {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value().hash(state);
    }
}

impl From<i32> for Priority {
    fn from(v: i32) -> Self {
        Self::Value(v)
    }
}

/// A Personal Package Archive hosted on Launchpad.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct PpaRepository {
    ppa: String,
    priority: Option<Priority>,
}

impl PpaRepository {
    /// Construct a validated instance.
    pub fn new(
        ppa: impl ToString,
        priority: Option<Priority>,
    ) -> Result<Self, RepositoryValidationError> {
        let repo = Self::new_unchecked(ppa, priority);
        repo.validate()?;

        Ok(repo)
    }

    /// Construct an instance without validating it.
    ///
    /// Consumers of unvalidated instances must expect configuration faults.
    pub fn new_unchecked(ppa: impl ToString, priority: Option<Priority>) -> Self {
        Self {
            ppa: ppa.to_string(),
            priority,
        }
    }

    /// The `owner/name` PPA identifier.
    pub fn ppa(&self) -> &str {
        &self.ppa
    }

    pub fn priority(&self) -> Option<Priority> {
        self.priority
    }

    /// Ensure the repository definition is valid.
    pub fn validate(&self) -> Result<(), RepositoryValidationError> {
        if self.ppa.is_empty() {
            return Err(RepositoryValidationError::new(&self.ppa, "invalid PPA.")
                .with_details("PPAs must be non-empty strings.")
                .with_resolution(
                    "Verify repository configuration and ensure that 'ppa' is correctly specified.",
                ));
        }

        validate_priority(&self.ppa, self.priority)
    }

    /// The pin expression matching packages published by this PPA.
    pub fn pin(&self) -> String {
        format!("release o=LP-PPA-{}", self.ppa.replace('/', "-"))
    }

    /// Convert to a generic object.
    pub fn marshal(&self) -> Value {
        let mut data = Map::new();
        data.insert("type".into(), "apt".into());
        data.insert("ppa".into(), self.ppa.clone().into());
        if let Some(priority) = self.priority {
            data.insert("priority".into(), priority.to_value());
        }

        Value::Object(data)
    }

    /// Construct a validated instance from a generic object.
    pub fn unmarshal(data: &Value) -> Result<Self, RepositoryValidationError> {
        let data = as_object(data)?;

        let ppa = data.get("ppa").cloned().unwrap_or_else(|| "".into());
        let ppa_id = value_str(&ppa);

        check_type(&ppa_id, data)?;

        let ppa = match ppa {
            Value::String(s) => s,
            _ => {
                return Err(RepositoryValidationError::new(
                    &ppa_id,
                    format!("Invalid PPA {}.", describe(&ppa)),
                )
                .with_details("PPA must be a valid string.")
                .with_resolution(
                    "Verify repository configuration and ensure that 'ppa' is correctly specified.",
                ))
            }
        };

        let priority = data
            .get("priority")
            .map(|v| Priority::from_value(&ppa, v))
            .transpose()?;

        if let Some(err) = unsupported_properties(&ppa, data, PPA_FIELDS) {
            return Err(err
                .with_resolution("Verify repository configuration and ensure that it is correct."));
        }

        Self::new(ppa, priority)
    }
}

/// A generic APT repository.
///
/// Instances are constructed through [AptRepositoryBuilder] or
/// [AptRepository::unmarshal()].
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct AptRepository {
    architectures: Option<Vec<String>>,
    components: Option<Vec<String>>,
    formats: Option<Vec<String>>,
    key_id: String,
    key_server: Option<String>,
    name: String,
    path: Option<String>,
    suites: Option<Vec<String>>,
    url: String,
    priority: Option<Priority>,
}

impl AptRepository {
    /// Obtain a builder for a repository at `url` signed by `key_id`.
    pub fn builder(url: impl ToString, key_id: impl ToString) -> AptRepositoryBuilder {
        AptRepositoryBuilder {
            url: url.to_string(),
            key_id: key_id.to_string(),
            ..Default::default()
        }
    }

    pub fn architectures(&self) -> Option<&[String]> {
        self.architectures.as_deref()
    }

    pub fn components(&self) -> Option<&[String]> {
        self.components.as_deref()
    }

    pub fn formats(&self) -> Option<&[String]> {
        self.formats.as_deref()
    }

    /// Fingerprint of the repository signing key.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn key_server(&self) -> Option<&str> {
        self.key_server.as_deref()
    }

    /// Name of this repository.
    ///
    /// Defaults to the URL with runs of non-alphanumeric characters replaced by `_`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn suites(&self) -> Option<&[String]> {
        self.suites.as_deref()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn priority(&self) -> Option<Priority> {
        self.priority
    }

    /// Ensure the repository definition is valid.
    pub fn validate(&self) -> Result<(), RepositoryValidationError> {
        let url = self.url.as_str();
        let error = |brief: String| RepositoryValidationError::new(url, brief);

        if !KEY_ID_RE.is_match(&self.key_id) {
            return Err(error(format!("invalid key identifier '{}'.", self.key_id))
                .with_details("Key IDs must be 40 upper-case hex characters.")
                .with_resolution(
                    "Verify the repository configuration and ensure that 'key-id' is correctly specified.",
                ));
        }

        if self.url.is_empty() {
            return Err(error("invalid URL.".into())
                .with_details("URLs must be non-empty strings.")
                .with_resolution(
                    "Verify the repository configuration and ensure that 'url' is correctly specified.",
                ));
        }

        if let Some(path) = &self.path {
            if path.is_empty() {
                return Err(error(format!("invalid path '{}'.", path))
                    .with_details("Paths must be non-empty strings.")
                    .with_resolution(
                        "Verify the repository configuration and ensure that 'path' is a non-empty string such as '/'.",
                    ));
            }

            if let Some(suites) = &self.suites {
                return Err(error(format!(
                    "suites {} cannot be combined with path '{}'.",
                    quote_list(suites),
                    path
                ))
                .with_details("Path and suites are incompatible options.")
                .with_resolution(
                    "Verify the repository configuration and remove 'path' or 'suites'.",
                ));
            }

            if let Some(components) = &self.components {
                return Err(error(format!(
                    "components {} cannot be combined with path '{}'.",
                    quote_list(components),
                    path
                ))
                .with_details("Path and components are incompatible options.")
                .with_resolution(
                    "Verify the repository configuration and remove 'path' or 'components'.",
                ));
            }
        }

        match (&self.suites, &self.components) {
            (Some(_), None) => {
                return Err(error("no components specified.".into())
                    .with_details("Components are required when using suites.")
                    .with_resolution(
                        "Verify the repository configuration and ensure that 'components' is correctly specified.",
                    ));
            }
            (None, Some(_)) => {
                return Err(error("no suites specified.".into())
                    .with_details("Suites are required when using components.")
                    .with_resolution(
                        "Verify the repository configuration and ensure that 'suites' is correctly specified.",
                    ));
            }
            _ => {}
        }

        if let Some(suite) = self.suites.iter().flatten().find(|s| s.ends_with('/')) {
            return Err(error(format!("invalid suite '{}'.", suite))
                .with_details("Suites must not end with a '/'.")
                .with_resolution(
                    "Verify the repository configuration and remove the trailing '/' from suites or use the 'path' property to define a path.",
                ));
        }

        validate_priority(url, self.priority)?;

        if let Some(format) = self
            .formats
            .iter()
            .flatten()
            .find(|f| !VALID_FORMATS.contains(&f.as_str()))
        {
            return Err(error(format!("invalid format '{}'.", format))
                .with_details("Valid formats include: deb and deb-src.")
                .with_resolution(
                    "Verify the repository configuration and ensure that 'formats' is correctly specified.",
                ));
        }

        Ok(())
    }

    /// The pin expression matching packages served from this repository's host.
    pub fn pin(&self) -> String {
        let host = url::Url::parse(&self.url)
            .ok()
            .and_then(|u| {
                u.host_str().map(|h| match u.port() {
                    Some(port) => format!("{}:{}", h, port),
                    None => h.to_string(),
                })
            })
            .unwrap_or_default();

        format!("origin \"{}\"", host)
    }

    /// Convert to a generic object.
    pub fn marshal(&self) -> Value {
        let list = |v: &[String]| Value::from(v.to_vec());

        let mut data = Map::new();
        data.insert("type".into(), "apt".into());
        if let Some(v) = &self.architectures {
            data.insert("architectures".into(), list(v));
        }
        if let Some(v) = &self.components {
            data.insert("components".into(), list(v));
        }
        if let Some(v) = &self.formats {
            data.insert("formats".into(), list(v));
        }
        data.insert("key-id".into(), self.key_id.clone().into());
        if let Some(v) = &self.key_server {
            data.insert("key-server".into(), v.clone().into());
        }
        data.insert("name".into(), self.name.clone().into());
        if let Some(v) = &self.path {
            data.insert("path".into(), v.clone().into());
        }
        if let Some(v) = &self.suites {
            data.insert("suites".into(), list(v));
        }
        data.insert("url".into(), self.url.clone().into());
        if let Some(priority) = self.priority {
            data.insert("priority".into(), priority.to_value());
        }

        Value::Object(data)
    }

    /// Construct a validated instance from a generic object.
    ///
    /// A `path` key is accepted but not carried into the returned instance, so
    /// definitions using `path` do not survive an unmarshal/marshal round trip
    /// through this type. [crate::project::AptDeb] retains it.
    pub fn unmarshal(data: &Value) -> Result<Self, RepositoryValidationError> {
        let data = as_object(data)?;

        let url_value = data.get("url").cloned().unwrap_or_else(|| "".into());
        let url = value_str(&url_value);

        check_type(&url, data)?;

        let architectures = string_list(
            &url,
            data,
            "architectures",
            false,
            "Architectures must be a list of valid architecture strings.",
        )?;
        let components = string_list(
            &url,
            data,
            "components",
            true,
            "Components must be a list of strings.",
        )?;
        let formats = string_list(&url, data, "formats", false, "Formats must be a list of strings.")?;

        let key_id = match data.get("key-id") {
            Some(Value::String(s)) => s.clone(),
            v => {
                return Err(RepositoryValidationError::new(
                    &url,
                    format!(
                        "invalid key identifier {}.",
                        v.map(describe).unwrap_or_else(|| "None".into())
                    ),
                )
                .with_details("Key identifiers must be a valid string.")
                .with_resolution(
                    "Verify repository configuration and ensure that 'key-id' is correctly specified.",
                ));
            }
        };

        let key_server = optional_string(&url, data, "key-server", "key server", "Key servers")?;
        let name = optional_string(&url, data, "name", "name", "Names")?;
        // Type checked for parity with the schema, then dropped.
        let _path = optional_string(&url, data, "path", "path", "Paths")?;

        let suites = string_list(&url, data, "suites", true, "Suites must be a list of strings.")?;

        let url = match url_value {
            Value::String(s) => s,
            _ => {
                return Err(RepositoryValidationError::new(&url, "invalid URL.")
                    .with_details("URLs must be a valid string.")
                    .with_resolution(
                        "Verify repository configuration and ensure that 'url' is correctly specified.",
                    ));
            }
        };

        let priority = data
            .get("priority")
            .map(|v| Priority::from_value(&url, v))
            .transpose()?;

        if let Some(err) = unsupported_properties(&url, data, APT_FIELDS) {
            return Err(
                err.with_resolution("Verify repository configuration and ensure it is correct.")
            );
        }

        let mut builder = Self::builder(url, key_id);
        builder.architectures = architectures;
        builder.components = components;
        builder.formats = formats;
        builder.key_server = key_server;
        builder.name = name;
        builder.suites = suites;
        builder.priority = priority;

        builder.build()
    }
}

/// Builder of [AptRepository] instances.
#[derive(Clone, Debug, Default)]
pub struct AptRepositoryBuilder {
    architectures: Option<Vec<String>>,
    components: Option<Vec<String>>,
    formats: Option<Vec<String>>,
    key_id: String,
    key_server: Option<String>,
    name: Option<String>,
    path: Option<String>,
    suites: Option<Vec<String>>,
    url: String,
    priority: Option<Priority>,
}

fn to_strings(values: impl IntoIterator<Item = impl ToString>) -> Vec<String> {
    values.into_iter().map(|v| v.to_string()).collect()
}

impl AptRepositoryBuilder {
    #[must_use]
    pub fn architectures(mut self, values: impl IntoIterator<Item = impl ToString>) -> Self {
        self.architectures = Some(to_strings(values));
        self
    }

    #[must_use]
    pub fn components(mut self, values: impl IntoIterator<Item = impl ToString>) -> Self {
        self.components = Some(to_strings(values));
        self
    }

    #[must_use]
    pub fn formats(mut self, values: impl IntoIterator<Item = impl ToString>) -> Self {
        self.formats = Some(to_strings(values));
        self
    }

    #[must_use]
    pub fn key_server(mut self, value: impl ToString) -> Self {
        self.key_server = Some(value.to_string());
        self
    }

    #[must_use]
    pub fn name(mut self, value: impl ToString) -> Self {
        self.name = Some(value.to_string());
        self
    }

    #[must_use]
    pub fn path(mut self, value: impl ToString) -> Self {
        self.path = Some(value.to_string());
        self
    }

    #[must_use]
    pub fn suites(mut self, values: impl IntoIterator<Item = impl ToString>) -> Self {
        self.suites = Some(to_strings(values));
        self
    }

    #[must_use]
    pub fn priority(mut self, value: impl Into<Priority>) -> Self {
        self.priority = Some(value.into());
        self
    }

    /// Construct the repository, validating it.
    pub fn build(self) -> Result<AptRepository, RepositoryValidationError> {
        let repo = self.build_unchecked();
        repo.validate()?;

        Ok(repo)
    }

    /// Construct the repository without validating it.
    ///
    /// Empty lists are treated as unset. Consumers of unvalidated instances must
    /// expect configuration faults.
    pub fn build_unchecked(self) -> AptRepository {
        let non_empty = |v: Option<Vec<String>>| v.filter(|v| !v.is_empty());

        let name = self
            .name
            .unwrap_or_else(|| NAME_SANITIZE_RE.replace_all(&self.url, "_").into_owned());

        AptRepository {
            architectures: non_empty(self.architectures),
            components: non_empty(self.components),
            formats: non_empty(self.formats),
            key_id: self.key_id,
            key_server: self.key_server,
            name,
            path: self.path,
            suites: non_empty(self.suites),
            url: self.url,
            priority: self.priority,
        }
    }
}

/// A package repository of any flavor.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum PackageRepository {
    Ppa(PpaRepository),
    Apt(AptRepository),
}

impl PackageRepository {
    /// Construct a validated repository from a generic object.
    ///
    /// Objects having a `ppa` key are PPAs. Everything else is a generic APT
    /// repository.
    pub fn unmarshal(data: &Value) -> Result<Self, RepositoryValidationError> {
        let object = as_object(data)?;

        if object.contains_key("ppa") {
            Ok(Self::Ppa(PpaRepository::unmarshal(data)?))
        } else {
            Ok(Self::Apt(AptRepository::unmarshal(data)?))
        }
    }

    /// Construct repositories from a generic list of objects.
    ///
    /// `null` yields an empty list.
    pub fn unmarshal_package_repositories(
        data: &Value,
    ) -> Result<Vec<Self>, RepositoryValidationError> {
        match data {
            Value::Null => Ok(vec![]),
            Value::Array(values) => values.iter().map(Self::unmarshal).collect(),
            _ => Err(
                RepositoryValidationError::new(value_str(data), "invalid list object.")
                    .with_details("Package repositories must be a list of objects.")
                    .with_resolution(
                        "Verify 'package-repositories' configuration and ensure that the correct syntax is used.",
                    ),
            ),
        }
    }

    /// Convert to a generic object.
    pub fn marshal(&self) -> Value {
        match self {
            Self::Ppa(repo) => repo.marshal(),
            Self::Apt(repo) => repo.marshal(),
        }
    }

    /// The value identifying this repository in messages: the PPA or the URL.
    pub fn identifier(&self) -> &str {
        match self {
            Self::Ppa(repo) => repo.ppa(),
            Self::Apt(repo) => repo.url(),
        }
    }

    pub fn priority(&self) -> Option<Priority> {
        match self {
            Self::Ppa(repo) => repo.priority(),
            Self::Apt(repo) => repo.priority(),
        }
    }

    /// The apt preferences pin expression for this repository.
    pub fn pin(&self) -> String {
        match self {
            Self::Ppa(repo) => repo.pin(),
            Self::Apt(repo) => repo.pin(),
        }
    }

    pub fn validate(&self) -> Result<(), RepositoryValidationError> {
        match self {
            Self::Ppa(repo) => repo.validate(),
            Self::Apt(repo) => repo.validate(),
        }
    }
}

impl From<PpaRepository> for PackageRepository {
    fn from(repo: PpaRepository) -> Self {
        Self::Ppa(repo)
    }
}

impl From<AptRepository> for PackageRepository {
    fn from(repo: AptRepository) -> Self {
        Self::Apt(repo)
    }
}

impl TryFrom<&Value> for PackageRepository {
    type Error = RepositoryValidationError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        Self::unmarshal(value)
    }
}

impl Serialize for PackageRepository {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.marshal().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PackageRepository {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::unmarshal(&value).map_err(D::Error::custom)
    }
}

fn validate_priority(url: &str, priority: Option<Priority>) -> Result<(), RepositoryValidationError> {
    match priority {
        Some(priority) if priority.value() == 0 => Err(RepositoryValidationError::new(
            url,
            format!("invalid priority {}.", priority.value()),
        )
        .with_details("Priority cannot be zero.")
        .with_resolution("Verify priority value.")),
        _ => Ok(()),
    }
}

fn as_object(data: &Value) -> Result<&Map<String, Value>, RepositoryValidationError> {
    data.as_object().ok_or_else(|| {
        RepositoryValidationError::new(value_str(data), "invalid object.")
            .with_details("Package repository must be a valid dictionary object.")
            .with_resolution(
                "Verify repository configuration and ensure that the correct syntax is used.",
            )
    })
}

fn check_type(url: &str, data: &Map<String, Value>) -> Result<(), RepositoryValidationError> {
    match data.get("type") {
        Some(Value::String(s)) if s == "apt" => Ok(()),
        v => Err(RepositoryValidationError::new(
            url,
            format!(
                "unsupported type {}.",
                v.map(describe).unwrap_or_else(|| "None".into())
            ),
        )
        .with_details("The only currently supported type is 'apt'.")
        .with_resolution(
            "Verify repository configuration and ensure that 'type' is correctly specified.",
        )),
    }
}

/// Produce an error naming every key outside of `allowed`, if there are any.
///
/// The caller attaches the resolution text.
fn unsupported_properties(
    url: &str,
    data: &Map<String, Value>,
    allowed: &[&str],
) -> Option<RepositoryValidationError> {
    let unsupported = data
        .keys()
        .filter(|k| !allowed.contains(&k.as_str()))
        .map(|k| format!("'{}'", k))
        .collect::<Vec<_>>();

    if unsupported.is_empty() {
        None
    } else {
        Some(RepositoryValidationError::new(
            url,
            format!("unsupported properties {}.", unsupported.join(", ")),
        ))
    }
}

fn string_list(
    url: &str,
    data: &Map<String, Value>,
    key: &str,
    require_non_empty: bool,
    details: &str,
) -> Result<Option<Vec<String>>, RepositoryValidationError> {
    let value = match data.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(v) => v,
    };

    let values = value.as_array().and_then(|values| {
        values
            .iter()
            .map(|v| v.as_str().map(|s| s.to_string()))
            .collect::<Option<Vec<_>>>()
    });

    match values {
        Some(values) if !(require_non_empty && values.is_empty()) => Ok(Some(values)),
        _ => Err(
            RepositoryValidationError::new(url, format!("invalid {} {}.", key, describe(value)))
                .with_details(details)
                .with_resolution(format!(
                    "Verify repository configuration and ensure that '{}' is correctly specified.",
                    key
                )),
        ),
    }
}

fn optional_string(
    url: &str,
    data: &Map<String, Value>,
    key: &str,
    noun: &str,
    plural: &str,
) -> Result<Option<String>, RepositoryValidationError> {
    match data.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(v) => Err(
            RepositoryValidationError::new(url, format!("invalid {} {}.", noun, describe(v)))
                .with_details(format!("{} must be a valid string.", plural))
                .with_resolution(format!(
                    "Verify repository configuration and ensure that '{}' is correctly specified.",
                    key
                )),
        ),
    }
}

/// Render a value for an error message. Strings are single quoted.
fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s),
        Value::Array(values) => format!(
            "[{}]",
            values.iter().map(describe).collect::<Vec<_>>().join(", ")
        ),
        Value::Null => "None".to_string(),
        v => v.to_string(),
    }
}

/// Render a value as an identifier. Strings are unquoted.
fn value_str(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        v => describe(v),
    }
}

fn quote_list(values: &[String]) -> String {
    format!(
        "[{}]",
        values
            .iter()
            .map(|v| format!("'{}'", v))
            .collect::<Vec<_>>()
            .join(", ")
    )
}
