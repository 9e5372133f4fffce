use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use devproxy::config::{LocalMount, ProxyConfig, RemoteOrigin, Settings};
use devproxy::utils::validation::is_empty_or_whitespace;

pub const LOCAL_URL_HELP: &str = r#"Example: devproxy "https://example.com" "/"

The remote URL must be a full URL.

The local URL can be:

- A URL path starting with a slash, e.g. "/" or "/test/" (defaults to https://localhost)
- A URL with implied HTTPS, e.g. "domain.test/path/" (defaults to HTTPS)
- A full URL using HTTP or HTTPS, e.g. "http://domain.test:8000/path/"
"#;

#[derive(Parser, Debug, Clone)]
#[command(name = "devproxy", about, version, long_about = None, after_help = LOCAL_URL_HELP)]
pub struct DevproxyArguments {
    #[arg(value_name = "REMOTE_URL", help = "Remote URL to proxy, e.g. https://example.com")]
    pub(crate) remote_url: String,
    #[arg(value_name = "LOCAL_URL", help = "Local URL or path to serve the remote from")]
    pub(crate) local_url: String,
    #[arg(short = 'c', long = "config", help = "Path to a JSON settings file")]
    pub(crate) config_path: Option<String>,
    #[arg(short = 'v', long = "verbose", help = "Enable verbose logging")]
    pub(crate) verbose: bool,
    #[clap(flatten)]
    pub(crate) overrides: SettingsOverrides,
}

// Optional fields layered over the settings file. Only provided flags will be applied.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct SettingsOverrides {
    /// Directory holding CA material and issued certificates
    #[arg(long = "cache-dir")]
    pub cache_dir: Option<String>,
    /// Program used to issue locally-trusted certificates
    #[arg(long = "ca-program")]
    pub ca_program: Option<String>,
    /// Seconds to wait for certificate provisioning
    #[arg(long = "provision-timeout")]
    pub provision_timeout_secs: Option<u64>,
    /// Seconds to wait for the remote to respond
    #[arg(long = "upstream-timeout")]
    pub upstream_timeout_secs: Option<u64>,
    /// Address to listen on (the port comes from the local URL)
    #[arg(short = 'b', long = "bind")]
    pub bind_address: Option<String>,
}

impl SettingsOverrides {
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(cache_dir) = &self.cache_dir {
            settings.cache_dir = cache_dir.clone();
        }
        if let Some(ca_program) = &self.ca_program {
            settings.ca_program = ca_program.clone();
        }
        if let Some(secs) = self.provision_timeout_secs {
            settings.provision_timeout_secs = secs;
        }
        if let Some(secs) = self.upstream_timeout_secs {
            settings.upstream_timeout_secs = secs;
        }
        if let Some(bind_address) = &self.bind_address {
            settings.bind_address = bind_address.clone();
        }
    }
}

impl DevproxyArguments {
    /// Parse the process arguments. `--help` and `--version` exit 0; anything
    /// else clap rejects exits 1 with usage text.
    pub fn parse_or_exit() -> Self {
        match Self::try_parse() {
            Ok(args) => args,
            Err(e) => match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => e.exit(),
                _ => {
                    let _ = e.print();
                    eprintln!("\n{}", LOCAL_URL_HELP);
                    std::process::exit(1);
                }
            },
        }
    }

    /// Print a configuration problem with usage text and exit 1.
    pub fn exit_with_usage(message: impl std::fmt::Display) -> ! {
        eprintln!("\x1b[1;31merror:\x1b[0m {}\n", message);
        eprintln!("{}", Self::command().render_usage());
        eprintln!("\n{}", LOCAL_URL_HELP);
        std::process::exit(1);
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Settings from the file named by `--config` (or defaults), with flags applied on top.
    pub async fn resolve_settings(&self) -> devproxy::Result<Settings> {
        let mut settings = match &self.config_path {
            Some(path) if !is_empty_or_whitespace(path) => Settings::try_load(path).await?,
            _ => Settings::default(),
        };
        self.overrides.apply(&mut settings);
        Ok(settings)
    }

    pub async fn resolve_config(&self) -> devproxy::Result<ProxyConfig> {
        let remote = RemoteOrigin::parse(&self.remote_url)?;
        let local = LocalMount::parse(&self.local_url)?;
        let settings = self.resolve_settings().await?;
        Ok(ProxyConfig::new(remote, local, settings))
    }
}
