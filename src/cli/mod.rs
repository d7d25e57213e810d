//! CLI mode for shorecache - drive the gateway lifecycle from a terminal.

mod report;

use std::path::PathBuf;
use std::sync::Arc;

use crate::{AppConfig, CacheStorage, DiskStorage, Gateway, HttpNetwork, Request};

use report::{StatusRow, print_activate, print_fetch, print_install, print_status};
#[cfg(feature = "server")]
use report::print_traffic;

/// A CLI subcommand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Populate the configured version's namespace from the manifest.
    Install,
    /// Evict every namespace except the configured version's.
    Activate,
    /// Install, then activate.
    Deploy,
    /// Run one request through the gateway.
    Fetch {
        /// Absolute URL, or a path resolved against the origin.
        target: String,
        /// Write the response body to stdout.
        show_body: bool,
    },
    /// List namespaces in durable storage.
    Status,
    /// Deploy, then run the local proxy.
    Serve {
        /// Keep entries in memory instead of on disk.
        memory: bool,
    },
}

/// Parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    /// Subcommand to run.
    pub command: Command,
    /// Explicit config file.
    pub config_path: Option<PathBuf>,
    /// Overrides `gateway.version`.
    pub cache_version: Option<String>,
    /// Overrides `gateway.origin`.
    pub origin: Option<String>,
    /// Overrides `server.port`.
    pub port: Option<u16>,
}

fn take_value(args: &[String], i: &mut usize, flag: &str) -> Result<String, String> {
    *i += 1;
    args.get(*i)
        .cloned()
        .ok_or_else(|| format!("{flag} requires a value"))
}

/// Parses arguments (without the program name).
///
/// # Errors
///
/// Returns a message describing the first problem found.
pub fn parse_args(args: &[String]) -> Result<CliArgs, String> {
    let mut config_path = None;
    let mut cache_version = None;
    let mut origin = None;
    let mut port = None;
    let mut show_body = false;
    let mut memory = false;
    let mut positional = Vec::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-c" | "--config" => config_path = Some(PathBuf::from(take_value(args, &mut i, "--config")?)),
            "--cache-version" => cache_version = Some(take_value(args, &mut i, "--cache-version")?),
            "--origin" => origin = Some(take_value(args, &mut i, "--origin")?),
            "-p" | "--port" => {
                let raw = take_value(args, &mut i, "--port")?;
                port = Some(raw.parse().map_err(|_| format!("invalid port: {raw}"))?);
            }
            "--body" => show_body = true,
            "--memory" => memory = true,
            flag if flag.starts_with('-') => return Err(format!("unknown option: {flag}")),
            other => positional.push(other.to_string()),
        }
        i += 1;
    }

    let mut positional = positional.into_iter();
    let command = match positional.next().as_deref() {
        Some("install") => Command::Install,
        Some("activate") => Command::Activate,
        Some("deploy") => Command::Deploy,
        Some("status") => Command::Status,
        Some("serve") => Command::Serve { memory },
        Some("fetch") => Command::Fetch {
            target: positional.next().ok_or("fetch requires a URL or path")?,
            show_body,
        },
        Some(other) => return Err(format!("unknown command: {other}")),
        None => return Err("no command given".to_string()),
    };
    if let Some(extra) = positional.next() {
        return Err(format!("unexpected argument: {extra}"));
    }

    Ok(CliArgs {
        command,
        config_path,
        cache_version,
        origin,
        port,
    })
}

/// Loads configuration and applies command-line overrides.
///
/// # Errors
///
/// Returns an error if the config file cannot be read or parsed.
pub fn load_config(args: &CliArgs) -> crate::Result<AppConfig> {
    let mut config = match &args.config_path {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    if let Some(version) = &args.cache_version {
        config.gateway.version.clone_from(version);
    }
    if let Some(origin) = &args.origin {
        config.gateway.origin.clone_from(origin);
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    Ok(config)
}

fn disk_gateway(config: &AppConfig) -> crate::Result<Gateway<DiskStorage, HttpNetwork>> {
    let storage = Arc::new(DiskStorage::new(&config.storage.dir));
    let network = Arc::new(HttpNetwork::new()?);
    Gateway::new(storage, network, config.gateway.clone())
}

/// Runs a parsed command.
///
/// # Errors
///
/// Returns an error if the chosen lifecycle phase fails.
pub async fn run(args: CliArgs) -> crate::Result<()> {
    let config = load_config(&args)?;
    log::debug!("Cache root: {}", config.storage.dir.display());

    match args.command {
        Command::Install => {
            let report = disk_gateway(&config)?.install().await?;
            print_install(&report);
        }
        Command::Activate => {
            let report = disk_gateway(&config)?.activate().await?;
            print_activate(&report);
        }
        Command::Deploy => {
            let gateway = disk_gateway(&config)?;
            print_install(&gateway.install().await?);
            print_activate(&gateway.activate().await?);
        }
        Command::Fetch { target, show_body } => {
            let gateway = disk_gateway(&config)?;
            let request = Request::get(config.gateway.resolve(&target)?);
            let intercepted = gateway.intercept(&request).await?;
            // The process is about to exit, so commit in the foreground.
            let stored = match intercepted.pending {
                Some(write) => write.commit().await,
                None => false,
            };
            print_fetch(&request, &intercepted.response, intercepted.source, stored);
            if show_body {
                use std::io::Write;
                std::io::stdout().write_all(&intercepted.response.body)?;
            }
        }
        Command::Status => {
            let storage = DiskStorage::new(&config.storage.dir);
            let current = config.gateway.namespace()?;
            let mut rows = Vec::new();
            for ns in storage.namespaces().await? {
                rows.push(StatusRow {
                    entries: storage.entry_count(&ns).await?,
                    current: ns == current,
                    namespace: ns,
                });
            }
            print_status(storage.root(), &current, &rows);
        }
        Command::Serve { memory } => {
            #[cfg(feature = "server")]
            {
                if memory {
                    serve(Arc::new(crate::MemoryStorage::new()), &config).await?;
                } else {
                    serve(Arc::new(DiskStorage::new(&config.storage.dir)), &config).await?;
                }
            }
            #[cfg(not(feature = "server"))]
            {
                let _ = memory;
                eprintln!("Proxy support requires the 'server' feature");
                std::process::exit(1);
            }
        }
    }
    Ok(())
}

#[cfg(feature = "server")]
async fn serve<S: CacheStorage + 'static>(storage: Arc<S>, config: &AppConfig) -> crate::Result<()> {
    let host = Arc::new(crate::Host::new(storage, Arc::new(HttpNetwork::new()?)));
    let deployment = host.deploy(config.gateway.clone()).await?;
    print_install(&deployment.install);
    if let Some(report) = &deployment.activate {
        print_activate(report);
    }
    crate::server::run(
        Arc::clone(&host),
        config.gateway.origin_url()?,
        &config.server.host,
        config.server.port,
    )
    .await?;
    if let Some(gateway) = host.active().await {
        print_traffic(gateway.namespace(), &gateway.stats().snapshot());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn parse_simple_commands() {
        assert_eq!(parse_args(&args(&["install"])).unwrap().command, Command::Install);
        assert_eq!(parse_args(&args(&["activate"])).unwrap().command, Command::Activate);
        assert_eq!(parse_args(&args(&["deploy"])).unwrap().command, Command::Deploy);
        assert_eq!(parse_args(&args(&["status"])).unwrap().command, Command::Status);
    }

    #[test]
    fn parse_fetch_with_body() {
        let parsed = parse_args(&args(&["fetch", "/css/styles.css", "--body"])).unwrap();
        assert_eq!(
            parsed.command,
            Command::Fetch {
                target: "/css/styles.css".to_string(),
                show_body: true
            }
        );
    }

    #[test]
    fn parse_global_options() {
        let parsed = parse_args(&args(&[
            "--config",
            "/etc/shorecache.toml",
            "serve",
            "--memory",
            "--cache-version",
            "v9",
            "--origin",
            "https://shoresquad.test/",
            "-p",
            "9000",
        ]))
        .unwrap();
        assert_eq!(parsed.command, Command::Serve { memory: true });
        assert_eq!(parsed.config_path, Some(PathBuf::from("/etc/shorecache.toml")));
        assert_eq!(parsed.cache_version.as_deref(), Some("v9"));
        assert_eq!(parsed.origin.as_deref(), Some("https://shoresquad.test/"));
        assert_eq!(parsed.port, Some(9000));
    }

    #[test]
    fn parse_errors() {
        assert!(parse_args(&args(&[])).is_err());
        assert!(parse_args(&args(&["explode"])).is_err());
        assert!(parse_args(&args(&["fetch"])).is_err());
        assert!(parse_args(&args(&["status", "extra"])).is_err());
        assert!(parse_args(&args(&["install", "--config"])).is_err());
        assert!(parse_args(&args(&["serve", "--port", "http"])).is_err());
        assert!(parse_args(&args(&["install", "--verbose"])).is_err());
    }

    #[test]
    fn overrides_apply_on_top_of_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[gateway]\nversion = \"v3\"\n[server]\nport = 7000\n").unwrap();

        let parsed = parse_args(&args(&[
            "status",
            "--config",
            path.to_str().unwrap(),
            "--cache-version",
            "v4",
        ]))
        .unwrap();
        let config = load_config(&parsed).unwrap();
        assert_eq!(config.gateway.version, "v4");
        assert_eq!(config.server.port, 7000);
    }
}
