//! Configuration types for parcel-mesh
//!
//! Defines CLI arguments, node identity construction, and the validated
//! runtime configuration handed to the coordinator, monitor and agent.

use crate::agent::AgentConfig;
use crate::error::ConfigError;
use crate::identity::Identifier;
use crate::monitor::DeadlineConfig;
use crate::node::{CoordinatorConfig, ForwardPolicy};
use crate::store::{RedisStoreConfig, DEFAULT_KEY_PREFIX};
use crate::task::{Parcel, ParcelStatus};
use clap::{ArgAction, Args, Parser, Subcommand};
use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

/// Value of the trailing component of every node identity
pub const NODE_COMPONENT_VALUE: &str = "parcel-node";

/// Peer endpoints are Redis URLs of the peer site
static PEER_URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:rediss?|unix)://\S+$").expect("Invalid peer URL regex"));

/// Control plane for a distributed workflow mesh
#[derive(Parser, Debug, Clone)]
#[command(
    name = "parcel-mesh",
    version,
    about = "Control plane for a distributed workflow mesh",
    long_about = "Coordinates work unit processors (WUPs) across a cluster.\n\n\
                  Each node:\n\
                  1. Publishes a heartbeat into the replicated watchdog directory\n\
                  2. Watches parcel registrations and flags overrun parcels\n\
                  3. Fans registrations and status changes out to peer sites",
    after_help = "EXAMPLES:\n    \
        # Run a node forwarding to one peer site\n    \
        parcel-mesh node --site site-a --peer redis://site-b:6379\n\n    \
        # Show watchdog entries\n    \
        parcel-mesh status --redis redis://localhost:6379\n\n    \
        # List parcels not yet finalised for one function\n    \
        parcel-mesh parcels --function function=ingest"
)]
pub struct CliArgs {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,

    /// Redis URL of the local site's replicated store
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379", global = true)]
    pub redis: String,

    /// Key prefix for every directory in Redis
    #[arg(long, default_value = DEFAULT_KEY_PREFIX, global = true)]
    pub prefix: String,

    /// Quiet mode - only warnings and errors
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run a cluster node (heartbeat, deadline monitor, peer fan-out)
    Node(NodeArgs),

    /// Show watchdog entries and node liveness
    Status {
        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Show one parcel by its store key
    Parcel {
        /// Qualified parcel identifier
        #[arg(value_name = "KEY")]
        key: String,

        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// List stored parcels that are not yet finalised
    Parcels {
        /// Only parcels supporting this function
        #[arg(long, value_name = "FUNCTION")]
        function: Option<String>,

        /// Include FINALISED parcels awaiting removal
        #[arg(long)]
        all: bool,

        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}

/// Arguments of the `node` subcommand
#[derive(Args, Debug, Clone)]
pub struct NodeArgs {
    /// Deployment name
    #[arg(long, default_value = "aether")]
    pub deployment: String,

    /// Site name
    #[arg(long, default_value = "site-a")]
    pub site: String,

    /// Pod name (generated from hostname if not set)
    #[arg(long, env = "POD_NAME")]
    pub pod: Option<String>,

    /// Peer-site endpoint (repeatable)
    #[arg(long = "peer", value_name = "URL", action = ArgAction::Append)]
    pub peers: Vec<String>,

    /// Heartbeat period in seconds
    #[arg(long, default_value_t = 10, value_name = "SECS")]
    pub heartbeat: u64,

    /// Grace period added to each parcel's deadline
    #[arg(long, default_value_t = 200, value_name = "MS")]
    pub deadline_buffer: u64,

    /// Minimum delay for parcels already overdue when seen
    #[arg(long, default_value_t = 1, value_name = "MS")]
    pub min_delay: u64,

    /// Delivery attempts per peer
    #[arg(long, default_value_t = 3, value_name = "NUM")]
    pub forward_attempts: u32,

    /// Pause between delivery attempts
    #[arg(long, default_value_t = 250, value_name = "MS")]
    pub forward_backoff: u64,

    /// Upper bound on one delivery attempt
    #[arg(long, default_value_t = 2000, value_name = "MS")]
    pub forward_timeout: u64,

    /// Expected parcel duration used for new registrations
    #[arg(long, default_value_t = 60, value_name = "SECS")]
    pub expected_duration: u64,

    /// Archive parcels synchronously before finalising them
    #[arg(long)]
    pub critical_write: bool,

    /// SQLite archive used for critical writes
    #[arg(long, default_value = "parcels.db", value_name = "PATH")]
    pub archive: PathBuf,
}

/// Build `deployment=<d>.site=<s>.pod=<p>.node=parcel-node`
///
/// Without a pod name one is generated from the hostname and a short uuid.
pub fn node_identity(deployment: &str, site: &str, pod: Option<&str>) -> Result<Identifier, ConfigError> {
    let pod = match pod {
        Some(pod) if !pod.is_empty() => pod.to_string(),
        _ => generated_pod_name(),
    };

    let id = Identifier::new("deployment", deployment)?
        .child("site", site)?
        .child("pod", &pod)?
        .child("node", NODE_COMPONENT_VALUE)?;
    Ok(id)
}

fn generated_pod_name() -> String {
    let hostname = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    let uuid = uuid::Uuid::new_v4().to_string();
    format!("{}-{}", hostname, &uuid[..8])
}

/// Reject peers that are not Redis endpoints, and duplicates
pub fn validate_peers(peers: &[String]) -> Result<(), ConfigError> {
    for (idx, peer) in peers.iter().enumerate() {
        if !PEER_URL_REGEX.is_match(peer) {
            return Err(ConfigError::InvalidPeer {
                endpoint: peer.clone(),
                reason: "expected redis://, rediss:// or unix:// URL".to_string(),
            });
        }
        if peers[..idx].contains(peer) {
            return Err(ConfigError::InvalidPeer {
                endpoint: peer.clone(),
                reason: "listed more than once".to_string(),
            });
        }
    }
    Ok(())
}

/// Runtime configuration of a node process
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// This node's identity
    pub node_id: Identifier,

    /// Local replicated store
    pub store: RedisStoreConfig,

    /// Heartbeat and fan-out settings
    pub coordinator: CoordinatorConfig,

    /// Overrun timer settings
    pub deadline: DeadlineConfig,

    /// Lifecycle engine settings
    pub agent: AgentConfig,

    /// SQLite archive path (opened only for critical writes)
    pub archive_path: PathBuf,

    /// Show startup banner
    pub show_progress: bool,

    /// Verbose output
    pub verbose: bool,
}

impl NodeConfig {
    /// Create from `node` subcommand arguments
    pub fn from_node_args(cli: &CliArgs, args: &NodeArgs) -> Result<Self, ConfigError> {
        if args.heartbeat == 0 {
            return Err(ConfigError::InvalidInterval { name: "heartbeat" });
        }
        validate_peers(&args.peers)?;

        let node_id = node_identity(&args.deployment, &args.site, args.pod.as_deref())?;

        let forward = ForwardPolicy {
            attempts: args.forward_attempts,
            backoff: Duration::from_millis(args.forward_backoff),
            attempt_timeout: Duration::from_millis(args.forward_timeout),
        };
        forward.validate()?;

        let deadline = DeadlineConfig {
            buffer: Duration::from_millis(args.deadline_buffer),
            min_delay: Duration::from_millis(args.min_delay),
        };
        deadline.validate()?;

        let agent = AgentConfig {
            expected_duration: Duration::from_secs(args.expected_duration),
            critical_write: args.critical_write,
        };
        agent.validate()?;

        let coordinator = CoordinatorConfig {
            node_id: node_id.clone(),
            peers: args.peers.clone(),
            forward,
            heartbeat_interval: Duration::from_secs(args.heartbeat),
        };

        Ok(Self {
            node_id,
            store: store_config(cli),
            coordinator,
            deadline,
            agent,
            archive_path: args.archive.clone(),
            show_progress: !cli.quiet,
            verbose: cli.verbose,
        })
    }
}

/// Selection applied by the `parcels` subcommand
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParcelFilter {
    pub function: Option<Identifier>,
    /// Also list FINALISED parcels
    pub include_finalised: bool,
}

impl ParcelFilter {
    pub fn admits(&self, parcel: &Parcel) -> bool {
        if parcel.status == ParcelStatus::Finalised && !self.include_finalised {
            return false;
        }
        self.function
            .as_ref()
            .map_or(true, |f| &parcel.registration.supporting_function == f)
    }
}

/// Redis settings shared by every subcommand
pub fn store_config(cli: &CliArgs) -> RedisStoreConfig {
    RedisStoreConfig {
        url: cli.redis.clone(),
        key_prefix: cli.prefix.clone(),
    }
}
