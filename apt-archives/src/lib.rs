// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Declarative management of APT package repositories.

This crate configures the external package repositories APT uses on a
Debian or Ubuntu host. Given a list of repository definitions, it installs
each repository's signing key into a dedicated keyring, writes a deb822
`.sources` file referencing that keyring and pins prioritized repositories
in an APT preferences file.

Every operation converges: running it again with the same definitions leaves
the filesystem untouched and reports that nothing changed.

# A Tour of Functionality

Repository definitions are modeled in the [repository] module.
[repository::PackageRepository] is either a [repository::PpaRepository]
(a Launchpad hosted archive named `owner/name`) or a generic
[repository::AptRepository]. Definitions are converted from and to generic
key-value data with `unmarshal()` and `marshal()`, which validate them.
The [project] module offers a stricter, serde-derived view of the same
definitions as they appear in project files.

The [keys] module installs signing keys. [keys::KeyManager] prefers an
already installed keyring, then a local key asset, then a key server.
Interaction with GnuPG is abstracted by [gpg::KeyTool]. The [ppa] module
derives archive URLs for PPAs and resolves their signing keys through
[ppa::PpaKeyResolver].

[sources::SourcesManager] renders `.sources` files and
[preferences::PreferencesManager] maintains the pin preferences file. Both
use the deb822 primitives in [control].

[installer::Installer] ties everything together for a list of definitions.
All on-disk locations come from [config::ArchivesConfig]. Host specific
details (release codename, architecture, foreign architecture registration)
are provided by the [platform] module.

# Crate Features

The enabled-by-default `launchpad` feature provides
[ppa::LaunchpadPpaKeyResolver], which queries the Launchpad API over HTTP.
*/

pub mod config;
pub mod control;
pub mod error;
pub mod gpg;
pub mod installer;
pub mod keys;
pub mod platform;
pub mod ppa;
pub mod preferences;
pub mod project;
pub mod repository;
pub mod sources;

#[cfg(test)]
mod testutil;
