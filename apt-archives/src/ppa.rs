// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Personal Package Archive (PPA) support.

PPAs are hosted on Launchpad and named `<owner>/<name>`. Their archive URL
is derived from the name and their signing key is published through the
Launchpad API.
*/

use crate::error::{ArchivesError, Result};

/// Base URL of PPA archives.
pub const PPA_ARCHIVE_BASE_URL: &str = "http://ppa.launchpad.net";

/// Base URL of the Launchpad REST API.
pub const LAUNCHPAD_API_URL: &str = "https://api.launchpad.net/devel";

/// The only component PPAs publish.
pub const PPA_COMPONENT: &str = "main";

/// A PPA name split into its parts.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PpaName<'a> {
    pub owner: &'a str,
    pub name: &'a str,
}

impl<'a> PpaName<'a> {
    /// Parse an `<owner>/<name>` string.
    pub fn parse(ppa: &'a str) -> Result<Self> {
        match ppa.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(Self { owner, name })
            }
            _ => Err(ArchivesError::PpaInstall {
                ppa: ppa.to_string(),
                reason: "invalid PPA format".to_string(),
            }),
        }
    }

    /// URL of the archive.
    pub fn archive_url(&self) -> String {
        format!("{}/{}/{}/ubuntu", PPA_ARCHIVE_BASE_URL, self.owner, self.name)
    }

    /// Launchpad API URL describing the archive.
    pub fn api_url(&self) -> String {
        format!(
            "{}/~{}/+archive/ubuntu/{}",
            LAUNCHPAD_API_URL, self.owner, self.name
        )
    }

    /// Name fragment used for files derived from this PPA.
    pub fn file_stem(&self) -> String {
        format!("ppa-{}_{}", self.owner, self.name)
    }
}

/// Resolves the signing key fingerprint of a PPA.
pub trait PpaKeyResolver {
    fn resolve_key_id(&self, ppa: &str) -> Result<String>;
}

#[cfg(feature = "launchpad")]
pub use launchpad::LaunchpadPpaKeyResolver;

#[cfg(feature = "launchpad")]
mod launchpad {
    use {
        super::{PpaKeyResolver, PpaName},
        crate::error::{ArchivesError, Result},
        log::debug,
        reqwest::blocking::{Client, ClientBuilder},
        serde::Deserialize,
    };

    #[derive(Clone, Debug, Deserialize)]
    struct ArchiveRecord {
        signing_key_fingerprint: Option<String>,
    }

    /// Resolves PPA signing keys through the Launchpad API.
    pub struct LaunchpadPpaKeyResolver {
        client: Client,
    }

    impl LaunchpadPpaKeyResolver {
        pub fn new() -> Result<Self> {
            Ok(Self::with_client(
                ClientBuilder::default()
                    .user_agent(concat!("apt-archives/", env!("CARGO_PKG_VERSION")))
                    .build()?,
            ))
        }

        pub fn with_client(client: Client) -> Self {
            Self { client }
        }
    }

    impl PpaKeyResolver for LaunchpadPpaKeyResolver {
        fn resolve_key_id(&self, ppa: &str) -> Result<String> {
            let parts = PpaName::parse(ppa)?;
            let url = parts.api_url();

            debug!("resolving signing key of {} via {}", ppa, url);
            let response = self
                .client
                .get(url.as_str())
                .header("Accept", "application/json")
                .send()?
                .error_for_status()?;

            let record = serde_json::from_slice::<ArchiveRecord>(&response.bytes()?)?;

            record
                .signing_key_fingerprint
                .filter(|s| !s.is_empty())
                .ok_or_else(|| ArchivesError::PpaKeyResolve {
                    ppa: ppa.to_string(),
                    message: "archive has no signing key fingerprint".to_string(),
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse() -> Result<()> {
        let ppa = PpaName::parse("deadsnakes/nightly")?;

        assert_eq!(ppa.owner, "deadsnakes");
        assert_eq!(ppa.name, "nightly");
        assert_eq!(
            ppa.archive_url(),
            "http://ppa.launchpad.net/deadsnakes/nightly/ubuntu"
        );
        assert_eq!(
            ppa.api_url(),
            "https://api.launchpad.net/devel/~deadsnakes/+archive/ubuntu/nightly"
        );
        assert_eq!(ppa.file_stem(), "ppa-deadsnakes_nightly");

        Ok(())
    }

    #[test]
    fn parse_invalid() {
        for value in ["ppa-missing-slash", "/name", "owner/", "a/b/c", ""] {
            let err = PpaName::parse(value).unwrap_err();

            assert!(err.is_configuration_fault());
            assert_eq!(
                err.to_string(),
                format!("Failed to install PPA '{}': invalid PPA format", value)
            );
        }
    }
}
