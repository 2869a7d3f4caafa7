//! Resolved boot settings
//!
//! Built once from the command line (every flag doubles as an environment
//! variable) and passed by reference to everything that needs a path, a
//! toggle or a credential.

use crate::cli::BootArgs;
use anyhow::{Context, Result, bail};
use std::path::PathBuf;
use std::time::Duration;
use transfer::{DaemonOptions, RetryConfig};
use url::Url;

/// Node names the boot never installs or removes
pub const EXCLUDED_NODES: &[&str] = &["comfyui-manager"];

/// Package index used by child processes on mainland China networks
pub const PIP_MIRROR: &str = "https://mirrors.ustc.edu.cn/pypi/web/simple";

const HF_OFFICIAL: &str = "https://huggingface.co";
const HF_MIRROR: &str = "https://hf-mirror.com";
const CIVITAI_OFFICIAL: &str = "https://civitai.com";
const CIVITAI_MIRROR: &str = "https://civitai.work";

const HF_HOSTS: &[&str] = &["hf.co", "huggingface.co", "huggingface.com", "hf-mirror.com"];
const CIVITAI_HOSTS: &[&str] = &["civitai.com", "civitai.work"];

/// Which parts of the boot run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Toggles {
    pub update_node: bool,
    pub init_node: bool,
    pub init_model: bool,
}

impl Default for Toggles {
    fn default() -> Self {
        Self {
            update_node: false,
            init_node: true,
            init_model: true,
        }
    }
}

/// Download endpoints and mirror selection
#[derive(Debug, Clone)]
pub struct Network {
    pub cn_network: bool,
    pub hf_endpoint: Url,
    pub civitai_endpoint: Url,
}

impl Network {
    pub fn new(
        cn_network: bool,
        hf_endpoint: Option<&str>,
        civitai_endpoint: Option<&str>,
    ) -> Result<Self> {
        let (hf_default, civitai_default) = if cn_network {
            (HF_MIRROR, CIVITAI_MIRROR)
        } else {
            (HF_OFFICIAL, CIVITAI_OFFICIAL)
        };

        Ok(Self {
            cn_network,
            hf_endpoint: parse_endpoint("HF_ENDPOINT", hf_endpoint.unwrap_or(hf_default))?,
            civitai_endpoint: parse_endpoint(
                "CIVITAI_ENDPOINT",
                civitai_endpoint.unwrap_or(civitai_default),
            )?,
        })
    }

    /// Point huggingface.co and civitai.com at the configured endpoints.
    ///
    /// Only active on mainland China networks. URLs without a host are
    /// returned untouched.
    pub fn rewrite(&self, url: &str) -> String {
        if !self.cn_network {
            return url.to_string();
        }
        let Ok(mut parsed) = Url::parse(url) else {
            return url.to_string();
        };
        let target = match parsed.host_str() {
            Some("huggingface.co") => &self.hf_endpoint,
            Some("civitai.com") => &self.civitai_endpoint,
            _ => return url.to_string(),
        };
        let Some(host) = target.host_str() else {
            return url.to_string();
        };
        if parsed.set_host(Some(host)).is_err() || parsed.set_port(target.port()).is_err() {
            return url.to_string();
        }
        parsed.to_string()
    }

    fn is_huggingface(&self, url: &Url) -> bool {
        url.host_str()
            .is_some_and(|h| HF_HOSTS.contains(&h) || Some(h) == self.hf_endpoint.host_str())
    }

    fn is_civitai(&self, url: &Url) -> bool {
        url.host_str().is_some_and(|h| {
            CIVITAI_HOSTS.contains(&h) || Some(h) == self.civitai_endpoint.host_str()
        })
    }
}

fn parse_endpoint(name: &str, value: &str) -> Result<Url> {
    let url = Url::parse(value).with_context(|| format!("Invalid {name}: {value}"))?;
    if url.host_str().is_none() {
        bail!("Invalid {name}: {value} has no host");
    }
    Ok(url)
}

/// Tokens for model hosting providers
#[derive(Clone, Default)]
pub struct Credentials {
    pub hf_token: Option<String>,
    pub civitai_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("hf_token", &self.hf_token.as_ref().map(|_| "***"))
            .field("civitai_token", &self.civitai_token.as_ref().map(|_| "***"))
            .finish()
    }
}

/// A model URL ready to hand to the transfer daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferUrl {
    pub url: String,
    pub header: Option<String>,
}

impl Credentials {
    /// Attach credentials for the provider hosting `url`.
    ///
    /// Hugging Face takes a bearer header, Civitai a `token` query parameter.
    pub fn augment(&self, url: &str, network: &Network) -> TransferUrl {
        let plain = TransferUrl {
            url: url.to_string(),
            header: None,
        };
        let Ok(mut parsed) = Url::parse(url) else {
            return plain;
        };

        if let Some(token) = &self.hf_token
            && network.is_huggingface(&parsed)
        {
            return TransferUrl {
                url: url.to_string(),
                header: Some(format!("Authorization: Bearer {token}")),
            };
        }

        if let Some(token) = &self.civitai_token
            && network.is_civitai(&parsed)
        {
            let query: Vec<(String, String)> = parsed
                .query_pairs()
                .filter(|(k, _)| k != "token")
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            parsed
                .query_pairs_mut()
                .clear()
                .extend_pairs(query)
                .append_pair("token", token);
            return TransferUrl {
                url: parsed.to_string(),
                header: None,
            };
        }

        plain
    }
}

/// Everything the boot needs to know, resolved once at startup
#[derive(Debug, Clone)]
pub struct Settings {
    pub workdir: PathBuf,
    pub app_root: PathBuf,
    pub manager_dir: PathBuf,
    pub python: String,
    pub listen: String,
    pub port: u16,
    pub extra_args: Vec<String>,
    pub config_dir: PathBuf,
    pub config_include: Option<String>,
    pub config_exclude: Option<String>,
    pub state_path: PathBuf,
    pub scripts_dir: PathBuf,
    pub toggles: Toggles,
    pub network: Network,
    pub credentials: Credentials,
    pub daemon: DaemonOptions,
    pub download_retry: RetryConfig,
}

impl Settings {
    pub fn from_args(args: &BootArgs) -> Result<Self> {
        let workdir = expand_path(&args.workdir);
        let app_root = args
            .comfyui_path
            .as_deref()
            .map_or_else(|| workdir.join("comfyui"), expand_path);
        let manager_dir = args.manager_path.as_deref().map_or_else(
            || app_root.join("custom_nodes").join("comfyui-manager"),
            expand_path,
        );
        let defaults = Toggles::default();
        let cn_network = parse_bool(args.cn_network.as_deref(), false);

        Ok(Self {
            config_dir: args
                .config_dir
                .as_deref()
                .map_or_else(|| workdir.join("boot_config"), expand_path),
            state_path: args
                .state_path
                .as_deref()
                .map_or_else(|| workdir.join(".cache").join("prev-state.json"), expand_path),
            scripts_dir: args
                .scripts_dir
                .as_deref()
                .map_or_else(|| workdir.join("scripts"), expand_path),
            python: args.python.clone(),
            listen: args.listen.clone(),
            port: args.port,
            extra_args: args
                .extra_args
                .as_deref()
                .map(|s| s.split_whitespace().map(String::from).collect())
                .unwrap_or_default(),
            config_include: non_empty(args.config_include.as_deref()),
            config_exclude: non_empty(args.config_exclude.as_deref()),
            toggles: Toggles {
                update_node: parse_bool(args.update_node.as_deref(), defaults.update_node),
                init_node: parse_bool(args.init_node.as_deref(), defaults.init_node),
                init_model: parse_bool(args.init_model.as_deref(), defaults.init_model),
            },
            network: Network::new(
                cn_network,
                non_empty(args.hf_endpoint.as_deref()).as_deref(),
                non_empty(args.civitai_endpoint.as_deref()).as_deref(),
            )?,
            credentials: Credentials {
                hf_token: non_empty(args.hf_token.as_deref()),
                civitai_token: non_empty(args.civitai_token.as_deref()),
            },
            daemon: DaemonOptions {
                port: args.rpc_port,
                secret: non_empty(args.rpc_secret.as_deref()),
                ..DaemonOptions::default()
            },
            download_retry: RetryConfig::fixed(
                args.download_retries,
                Duration::from_secs(args.download_retry_interval),
            ),
            workdir,
            app_root,
            manager_dir,
        })
    }

    /// Fatal checks plus warnings about where credentials are sent
    pub fn validate(&self) -> Result<()> {
        if !self.app_root.is_dir() {
            bail!("Invalid ComfyUI path: {}", self.app_root.display());
        }

        if self.network.cn_network {
            log::info!("Applying CN network optimization");
        }
        if self.credentials.hf_token.is_some()
            && self.network.hf_endpoint.host_str() != Some("huggingface.co")
        {
            log::warn!(
                "HF_API_TOKEN will be sent to a third party endpoint: {}",
                self.network.hf_endpoint
            );
        }
        if self.credentials.civitai_token.is_some()
            && self.network.civitai_endpoint.host_str() != Some("civitai.com")
        {
            log::warn!(
                "CIVITAI_API_TOKEN will be sent to a third party endpoint: {}",
                self.network.civitai_endpoint
            );
        }
        Ok(())
    }

    pub fn custom_nodes_dir(&self) -> PathBuf {
        self.app_root.join("custom_nodes")
    }

    pub fn pre_init_dir(&self) -> PathBuf {
        self.scripts_dir.join("pre-init")
    }

    pub fn post_init_dir(&self) -> PathBuf {
        self.scripts_dir.join("post-init")
    }

    pub fn node_scripts_dir(&self) -> PathBuf {
        self.scripts_dir.join("post-install-node")
    }

    /// Extra environment for every child process
    pub fn child_envs(&self) -> Vec<(String, String)> {
        let mut envs = Vec::new();
        if self.network.cn_network {
            envs.push(("PIP_INDEX_URL".to_string(), PIP_MIRROR.to_string()));
            envs.push((
                "HF_ENDPOINT".to_string(),
                self.network.hf_endpoint.as_str().trim_end_matches('/').to_string(),
            ));
        }
        envs
    }

    /// The URL and header to fetch a model with
    pub fn transfer_url(&self, url: &str) -> TransferUrl {
        let rewritten = self.network.rewrite(url);
        self.credentials.augment(&rewritten, &self.network)
    }

    pub fn is_excluded(name: &str) -> bool {
        EXCLUDED_NODES.contains(&name)
    }
}

/// Parse a boolean toggle, falling back to `default` on anything unrecognized
pub fn parse_bool(value: Option<&str>, default: bool) -> bool {
    let Some(value) = value else {
        return default;
    };
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "t" | "yes" | "y" => true,
        "false" | "0" | "f" | "no" | "n" => false,
        _ => default,
    }
}

fn expand_path(value: &str) -> PathBuf {
    PathBuf::from(shellexpand::full(value).map_or_else(|_| value.to_string(), |s| s.into_owned()))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

#[cfg(test)]
impl Settings {
    /// Settings rooted in a scratch directory, with the app root created
    pub fn for_root(root: &std::path::Path) -> Self {
        let app_root = root.join("comfyui");
        std::fs::create_dir_all(app_root.join("custom_nodes")).unwrap();
        Self {
            workdir: root.to_path_buf(),
            manager_dir: app_root.join("custom_nodes").join("comfyui-manager"),
            app_root,
            python: "python3".to_string(),
            listen: "0.0.0.0,::".to_string(),
            port: 8188,
            extra_args: Vec::new(),
            config_dir: root.join("boot_config"),
            config_include: None,
            config_exclude: None,
            state_path: root.join(".cache").join("prev-state.json"),
            scripts_dir: root.join("scripts"),
            toggles: Toggles::default(),
            network: Network::new(false, None, None).unwrap(),
            credentials: Credentials::default(),
            daemon: DaemonOptions::default(),
            download_retry: RetryConfig::no_retry(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args(extra: &[&str]) -> BootArgs {
        let mut argv = vec!["comfyboot", "--workdir", "/data"];
        argv.extend_from_slice(extra);
        crate::cli::Cli::parse_from(argv).boot
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool(Some("Yes"), false));
        assert!(parse_bool(Some("1"), false));
        assert!(!parse_bool(Some("n"), true));
        assert!(!parse_bool(Some("FALSE"), true));
        assert!(parse_bool(Some("maybe"), true));
        assert!(!parse_bool(None, false));
    }

    #[test]
    fn test_paths_derive_from_workdir() {
        let settings = Settings::from_args(&args(&[])).unwrap();
        assert_eq!(settings.app_root, PathBuf::from("/data/comfyui"));
        assert_eq!(
            settings.manager_dir,
            PathBuf::from("/data/comfyui/custom_nodes/comfyui-manager")
        );
        assert_eq!(
            settings.state_path,
            PathBuf::from("/data/.cache/prev-state.json")
        );
        assert_eq!(
            settings.node_scripts_dir(),
            PathBuf::from("/data/scripts/post-install-node")
        );
    }

    #[test]
    fn test_extra_args_split_on_whitespace() {
        let settings =
            Settings::from_args(&args(&["--extra-args", "--lowvram  --preview-method auto"]))
                .unwrap();
        assert_eq!(
            settings.extra_args,
            vec!["--lowvram", "--preview-method", "auto"]
        );
    }

    #[test]
    fn test_toggles() {
        let settings =
            Settings::from_args(&args(&["--update-node", "y", "--init-model", "off"])).unwrap();
        assert!(settings.toggles.update_node);
        assert!(settings.toggles.init_node);
        // "off" is not recognized and falls back to the default
        assert!(settings.toggles.init_model);
    }

    #[test]
    fn test_cn_network_defaults_to_mirrors() {
        let settings = Settings::from_args(&args(&["--cn-network", "true"])).unwrap();
        assert_eq!(settings.network.hf_endpoint.host_str(), Some("hf-mirror.com"));
        assert_eq!(
            settings.network.civitai_endpoint.host_str(),
            Some("civitai.work")
        );
        assert!(
            settings
                .child_envs()
                .contains(&("PIP_INDEX_URL".to_string(), PIP_MIRROR.to_string()))
        );
    }

    #[test]
    fn test_rewrite_only_on_cn_network() {
        let official = Network::new(false, None, None).unwrap();
        let url = "https://huggingface.co/org/repo/resolve/main/a.safetensors";
        assert_eq!(official.rewrite(url), url);

        let cn = Network::new(true, None, None).unwrap();
        assert_eq!(
            cn.rewrite(url),
            "https://hf-mirror.com/org/repo/resolve/main/a.safetensors"
        );
        assert_eq!(
            cn.rewrite("https://civitai.com/api/download/models/1"),
            "https://civitai.work/api/download/models/1"
        );
        assert_eq!(
            cn.rewrite("https://github.com/org/repo"),
            "https://github.com/org/repo"
        );
    }

    #[test]
    fn test_rewrite_keeps_endpoint_port() {
        let cn = Network::new(true, Some("http://mirror.local:8080"), None).unwrap();
        assert_eq!(
            cn.rewrite("https://huggingface.co/a/b"),
            "https://mirror.local:8080/a/b"
        );
    }

    #[test]
    fn test_invalid_endpoint_is_rejected() {
        assert!(Network::new(false, Some("not a url"), None).is_err());
    }

    #[test]
    fn test_augment_huggingface_header() {
        let network = Network::new(false, None, None).unwrap();
        let creds = Credentials {
            hf_token: Some("hf_abc".to_string()),
            civitai_token: None,
        };
        let out = creds.augment("https://hf.co/a/b", &network);
        assert_eq!(out.url, "https://hf.co/a/b");
        assert_eq!(out.header.as_deref(), Some("Authorization: Bearer hf_abc"));

        let other = creds.augment("https://example.com/a", &network);
        assert_eq!(other.header, None);
    }

    #[test]
    fn test_augment_civitai_query_replaces_token() {
        let network = Network::new(false, None, None).unwrap();
        let creds = Credentials {
            hf_token: None,
            civitai_token: Some("secret".to_string()),
        };
        let out = creds.augment(
            "https://civitai.com/api/download/models/1?type=Model&token=old",
            &network,
        );
        assert_eq!(
            out.url,
            "https://civitai.com/api/download/models/1?type=Model&token=secret"
        );
        assert_eq!(out.header, None);
    }

    #[test]
    fn test_augment_without_tokens_is_identity() {
        let network = Network::new(false, None, None).unwrap();
        let out = Credentials::default().augment("https://huggingface.co/a", &network);
        assert_eq!(
            out,
            TransferUrl {
                url: "https://huggingface.co/a".to_string(),
                header: None
            }
        );
    }

    #[test]
    fn test_validate_requires_app_root() {
        let temp = tempfile::tempdir().unwrap();
        let mut settings = Settings::for_root(temp.path());
        assert!(settings.validate().is_ok());

        settings.app_root = temp.path().join("missing");
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_credentials_debug_hides_tokens() {
        let creds = Credentials {
            hf_token: Some("hf_abc".to_string()),
            civitai_token: None,
        };
        assert!(!format!("{creds:?}").contains("hf_abc"));
    }
}
