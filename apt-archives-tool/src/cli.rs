// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    apt_archives::{
        config::ArchivesConfig,
        error::ArchivesError,
        installer::{validate_repositories, Installer},
        repository::PackageRepository,
    },
    clap::{Arg, ArgMatches, Command},
    log::{info, warn, LevelFilter},
    serde_json::Value,
    std::path::Path,
    thiserror::Error,
};

const REPOSITORIES_ABOUT: &str = "\
Repository Definitions

Commands read repository definitions from a YAML file. The file holds either
a list of definitions or a project document whose `package-repositories` key
holds that list.

Every definition is a mapping with `type: apt`. Two kinds are recognized.

PPA repositories

   ppa (required) (string)
      Launchpad PPA in the form `<owner>/<name>`.

   priority (optional) (string or integer)
      One of `always` (1000), `prefer` (990), `defer` (100) or a non-zero
      integer. Prioritized repositories are pinned in the preferences file.

Generic APT repositories

   url (required) (string)
      Base URL of the repository.

   key-id (required) (string)
      Full 40 character fingerprint of the signing key.

   key-server (optional) (string)
      Key server to fetch the key from if no key asset provides it.

   suites, components (optional) (list[string])
      Must be given together. Suites may not end with `/`.

   path (optional) (string)
      Exact path of a flat repository. Cannot be combined with suites or
      components.

   architectures (optional) (list[string])
      Architectures to enable. Foreign architectures are registered with dpkg.

   formats (optional) (list[string])
      Any of `deb` and `deb-src`.

   priority (optional) (string or integer)
      As for PPA repositories.
";

const INSTALL_ABOUT: &str = "\
Install package repositories.

For every repository definition, the signing key is installed into a
dedicated keyring, a deb822 `.sources` file referencing that keyring is
written and, for prioritized repositories, a pin is added to the managed
preferences file.

Keys are looked up in an existing keyring first, then in the key assets
directory (files named after the last 8 characters of the key id with an
`.asc` extension) and finally fetched from a key server.

Files are only written when their content would change. Running the command
again with the same definitions leaves the host untouched.

# YAML Configuration

An optional YAML configuration file overrides locations and naming. All keys
are optional:

keyrings-dir, sources-dir, preferences-path, key-assets-dir,
default-key-server, sources-prefix, keyring-prefix, preferences-header
";

#[derive(Debug, Error)]
pub enum CliError {
    #[error("argument parsing error: {0}")]
    Clap(#[from] clap::Error),

    #[error("{0}")]
    Archives(#[from] ArchivesError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error reading {0}: {1}")]
    IoPath(String, std::io::Error),

    #[error("YAML error: {0}")]
    SerdeYaml(#[from] serde_yaml::Error),

    #[error("invalid sub-command: {0}")]
    InvalidSubCommand(String),
}

pub type Result<T> = std::result::Result<T, CliError>;

/// Load repository definitions from a YAML file.
fn load_repositories(path: &Path) -> Result<Value> {
    let data =
        std::fs::read_to_string(path).map_err(|e| CliError::IoPath(path.display().to_string(), e))?;

    if data.trim().is_empty() {
        return Ok(Value::Null);
    }

    let value: Value = serde_yaml::from_str(&data)?;

    Ok(match value {
        Value::Object(mut map) if map.contains_key("package-repositories") => map
            .remove("package-repositories")
            .unwrap_or(Value::Null),
        value => value,
    })
}

fn describe(repo: &PackageRepository) -> String {
    match repo.priority() {
        Some(priority) => format!("{} (priority {})", repo.identifier(), priority.value()),
        None => repo.identifier().to_string(),
    }
}

pub fn run_cli() -> Result<()> {
    let app = Command::new("APT Archives Tool")
        .version("0.1")
        .about("Install and validate APT package repositories")
        .arg_required_else_help(true);

    let app = app.arg(
        Arg::new("verbose")
            .long("verbose")
            .short('v')
            .global(true)
            .multiple_occurrences(true)
            .help("Increase logging verbosity. Can be specified multiple times."),
    );

    let repositories_arg = Arg::new("repositories")
        .long("repositories")
        .takes_value(true)
        .required(true)
        .allow_invalid_utf8(true)
        .help("Path to a YAML file defining package repositories");

    let app = app.subcommand(
        Command::new("validate")
            .about("Validate repository definitions without installing them")
            .arg(repositories_arg.clone()),
    );

    let app = app.subcommand(
        Command::new("install")
            .about("Install package repositories on this host")
            .long_about(INSTALL_ABOUT)
            .arg(repositories_arg)
            .arg(
                Arg::new("config")
                    .long("config")
                    .takes_value(true)
                    .allow_invalid_utf8(true)
                    .help("Path to a YAML file overriding locations and naming"),
            )
            .arg(
                Arg::new("root")
                    .long("root")
                    .takes_value(true)
                    .allow_invalid_utf8(true)
                    .help("Directory to rebase the default APT locations under"),
            )
            .arg(
                Arg::new("key_assets")
                    .long("key-assets")
                    .takes_value(true)
                    .allow_invalid_utf8(true)
                    .help("Directory holding ASCII-armored signing keys"),
            ),
    );

    let mut app = app.subcommand(
        Command::new("repositories").about("Print documentation about repository definitions"),
    );

    let matches = app.clone().get_matches();

    let log_level = match matches.occurrences_of("verbose") {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_level.as_str()),
    );

    if log_level <= LevelFilter::Info {
        builder
            .format_timestamp(None)
            .format_level(false)
            .format_target(false);
    }

    if log_level == LevelFilter::Info {
        builder.filter_module("rustls", LevelFilter::Error);
        builder.filter_module("reqwest", LevelFilter::Warn);
    }

    builder.init();

    match matches.subcommand() {
        Some(("validate", args)) => command_validate(args),
        Some(("install", args)) => command_install(args),
        Some(("repositories", _)) => {
            println!("{}", REPOSITORIES_ABOUT);
            Ok(())
        }
        Some((command, _)) => Err(CliError::InvalidSubCommand(command.to_string())),
        None => {
            app.print_help()?;
            Ok(())
        }
    }
}

fn command_validate(args: &ArgMatches) -> Result<()> {
    let path = args
        .value_of_os("repositories")
        .expect("repositories argument is required");

    let repos = validate_repositories(&load_repositories(Path::new(path))?)?;

    for repo in &repos {
        println!("{}", describe(repo));
    }

    Ok(())
}

fn command_install(args: &ArgMatches) -> Result<()> {
    let path = args
        .value_of_os("repositories")
        .expect("repositories argument is required");

    let mut config = match args.value_of_os("config") {
        Some(config_path) => ArchivesConfig::from_yaml_path(config_path)?,
        None => ArchivesConfig::default(),
    };

    if let Some(root) = args.value_of_os("root") {
        if args.is_present("config") {
            warn!("--root replaces the locations defined in the configuration file");
        }
        config = config.with_root(root);
    }

    if let Some(key_assets) = args.value_of_os("key_assets") {
        config = config.with_key_assets_dir(key_assets);
    }

    let data = load_repositories(Path::new(path))?;

    let mut installer = Installer::for_host(&config)?;

    if installer.install(&data)? {
        info!("package repositories installed");
    } else {
        info!("package repositories already up to date");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    fn write_yaml(content: &str) -> Result<(tempfile::TempDir, std::path::PathBuf)> {
        let td = tempfile::tempdir()?;
        let path = td.path().join("repositories.yaml");
        std::fs::write(&path, content)?;

        Ok((td, path))
    }

    #[test]
    fn load_list() -> Result<()> {
        let (_td, path) = write_yaml("- type: apt\n  ppa: test/ppa\n  priority: always\n")?;

        assert_eq!(
            load_repositories(&path)?,
            json!([{"type": "apt", "ppa": "test/ppa", "priority": "always"}])
        );

        Ok(())
    }

    #[test]
    fn load_project_document() -> Result<()> {
        let (_td, path) = write_yaml(
            "name: foo\npackage-repositories:\n  - type: apt\n    ppa: test/ppa\n",
        )?;

        let repos = validate_repositories(&load_repositories(&path)?)?;
        assert_eq!(repos.len(), 1);
        assert_eq!(describe(&repos[0]), "test/ppa");

        Ok(())
    }

    #[test]
    fn load_empty() -> Result<()> {
        let (_td, path) = write_yaml("\n")?;

        assert_eq!(load_repositories(&path)?, Value::Null);
        assert!(validate_repositories(&Value::Null)?.is_empty());

        Ok(())
    }

    #[test]
    fn load_missing() {
        assert!(matches!(
            load_repositories(Path::new("/nonexistent/repositories.yaml")),
            Err(CliError::IoPath(_, _))
        ));
    }
}
