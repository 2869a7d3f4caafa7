use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "comfyboot")]
#[command(version)]
#[command(about = "Reconcile ComfyUI custom nodes and models, then launch ComfyUI", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Base log level, raised by each -v
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: log::LevelFilter,

    #[command(flatten)]
    pub boot: BootArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Reconcile, write the snapshot, run hooks and launch ComfyUI (default)
    Run,

    /// Show the actions the next run would take, without executing them
    Plan(PlanArgs),

    /// Reconcile and write the snapshot without launching ComfyUI
    Reconcile,
}

#[derive(Args)]
pub struct PlanArgs {
    /// Print the plan as JSON
    #[arg(long)]
    pub json: bool,
}

/// Everything that shapes a boot. Each flag can also come from the
/// environment, which is how containers usually configure it.
#[derive(Args, Debug, Clone)]
pub struct BootArgs {
    /// Working directory holding boot config, scripts and state
    #[arg(long, env = "WORKDIR", default_value = "/workspace", global = true)]
    pub workdir: String,

    /// ComfyUI checkout [default: $WORKDIR/comfyui]
    #[arg(long, env = "COMFYUI_PATH", global = true)]
    pub comfyui_path: Option<String>,

    /// ComfyUI-Manager checkout [default: $COMFYUI_PATH/custom_nodes/comfyui-manager]
    #[arg(long, env = "COMFYUI_MN_PATH", global = true)]
    pub manager_path: Option<String>,

    /// Python interpreter for ComfyUI, the manager CLI and .py hooks
    #[arg(long, env = "PYTHON", default_value = "python3", global = true)]
    pub python: String,

    /// Addresses ComfyUI listens on
    #[arg(long, env = "COMFYUI_LISTEN", default_value = "0.0.0.0,::", global = true)]
    pub listen: String,

    /// Port ComfyUI listens on
    #[arg(long, env = "COMFYUI_PORT", default_value_t = 8188, global = true)]
    pub port: u16,

    /// Extra arguments appended to the ComfyUI command line
    #[arg(long, env = "COMFYUI_EXTRA_ARGS", allow_hyphen_values = true, global = true)]
    pub extra_args: Option<String>,

    /// Directory of *.toml boot config fragments [default: $WORKDIR/boot_config]
    #[arg(long, env = "BOOT_CONFIG_DIR", global = true)]
    pub config_dir: Option<String>,

    /// Only load config files whose path matches this regex
    #[arg(long, env = "BOOT_CONFIG_INCLUDE", global = true)]
    pub config_include: Option<String>,

    /// Skip config files whose path matches this regex
    #[arg(long, env = "BOOT_CONFIG_EXCLUDE", global = true)]
    pub config_exclude: Option<String>,

    /// Snapshot of the last achieved state [default: $WORKDIR/.cache/prev-state.json]
    #[arg(long, env = "BOOT_STATE_PATH", global = true)]
    pub state_path: Option<String>,

    /// Hook script root [default: $WORKDIR/scripts]
    #[arg(long, env = "BOOT_SCRIPTS_DIR", global = true)]
    pub scripts_dir: Option<String>,

    /// Update already-installed nodes before reconciling
    #[arg(long, env = "UPDATE_NODE", value_name = "BOOL", global = true)]
    pub update_node: Option<String>,

    /// Reconcile custom nodes
    #[arg(long, env = "INIT_NODE", value_name = "BOOL", global = true)]
    pub init_node: Option<String>,

    /// Reconcile models
    #[arg(long, env = "INIT_MODEL", value_name = "BOOL", global = true)]
    pub init_model: Option<String>,

    /// Use mainland China mirrors for PyPI, Hugging Face and Civitai
    #[arg(long, env = "CN_NETWORK", value_name = "BOOL", global = true)]
    pub cn_network: Option<String>,

    /// Hugging Face access token
    #[arg(long, env = "HF_API_TOKEN", hide_env_values = true, global = true)]
    pub hf_token: Option<String>,

    /// Civitai API token
    #[arg(long, env = "CIVITAI_API_TOKEN", hide_env_values = true, global = true)]
    pub civitai_token: Option<String>,

    /// Hugging Face endpoint
    #[arg(long, env = "HF_ENDPOINT", global = true)]
    pub hf_endpoint: Option<String>,

    /// Civitai endpoint
    #[arg(long, env = "CIVITAI_ENDPOINT", global = true)]
    pub civitai_endpoint: Option<String>,

    /// aria2 RPC port
    #[arg(long, env = "ARIA2_RPC_PORT", default_value_t = transfer::backend::aria2::DEFAULT_RPC_PORT, global = true)]
    pub rpc_port: u16,

    /// aria2 RPC secret
    #[arg(long, env = "ARIA2_RPC_SECRET", hide_env_values = true, global = true)]
    pub rpc_secret: Option<String>,

    /// Attempts per download
    #[arg(long, env = "DOWNLOAD_RETRIES", default_value_t = 3, global = true)]
    pub download_retries: u32,

    /// Seconds between download attempts
    #[arg(long, env = "DOWNLOAD_RETRY_INTERVAL", default_value_t = 2, global = true)]
    pub download_retry_interval: u64,
}
