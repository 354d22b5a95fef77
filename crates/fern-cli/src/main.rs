//! `fern`: local Route53 hosted zones and SSM parameters on an embedded store.
//!
//! Every command opens the store it needs, runs one engine operation, and
//! prints the result as JSON on stdout. Logs go to stderr.

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod config;

use std::io::Read as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use fern_core::error::{Route53Error, SsmError};
use fern_core::ids;
use fern_core::route53::{
    self, ChangeBatch, CreateHostedZoneRequest, HostedZoneConfig, HostedZoneEngine,
    ListHostedZonesByNameRequest, ListHostedZonesRequest, ListResourceRecordSetsRequest, RrType,
};
use fern_core::ssm::{
    self, DescribeParametersRequest, GetParametersByPathRequest, ParameterEngine, ParameterFilter,
    ParameterTier, ParameterType, PutParameterRequest,
};
use fern_core::tags::Tag;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::config::{FernConfig, Namespace, StorageKind, open_store};

// ── CLI structure ────────────────────────────────────────────────────

/// Local Route53 hosted zones and SSM parameters.
#[derive(Parser)]
#[command(
    name = "fern",
    version,
    about = "fern: local Route53 hosted zones and SSM parameters",
    long_about = None,
    after_help = "Environment variables:\n  \
         FERN_CONFIG      YAML config file (default: ./.fern.yaml)\n  \
         FERN_DATA_PATH   Data directory (default: .fern-data)\n  \
         FERN_STORAGE     rocksdb, redb, or memory\n  \
         FERN_LOG_LEVEL   Log level when RUST_LOG is unset\n\n\
         Examples:\n  \
         fern zone create example.com\n  \
         fern zone change Z0123 --batch changes.json\n  \
         fern param put /app/db/password s3cret --type secure-string\n  \
         fern param list-path /app --recursive --decrypt"
)]
struct Cli {
    /// YAML config file.
    #[arg(long, env = "FERN_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the stores.
    #[arg(long, env = "FERN_DATA_PATH", default_value = ".fern-data")]
    data_path: PathBuf,

    /// Storage engine.
    #[arg(long, env = "FERN_STORAGE", value_enum, default_value = "rocksdb")]
    storage: StorageKind,

    /// Log level used when `RUST_LOG` is not set.
    #[arg(long, env = "FERN_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, default_value = "false")]
    log_json: bool,

    /// Identity recorded as the last modifier of parameters.
    #[arg(long, env = "FERN_USER", default_value = "fern")]
    user: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Hosted zone and record set operations.
    Zone {
        #[command(subcommand)]
        action: ZoneCommands,
    },
    /// Change status lookups.
    Change {
        #[command(subcommand)]
        action: ChangeCommands,
    },
    /// Parameter store operations.
    Param {
        #[command(subcommand)]
        action: ParamCommands,
    },
    /// Print every live storage key of one engine, in key order.
    DumpKeys {
        #[arg(value_enum)]
        namespace: Namespace,
    },
}

#[derive(Subcommand)]
enum ZoneCommands {
    /// Create a hosted zone.
    Create {
        /// Domain name of the zone.
        name: String,
        /// Idempotency reference. Generated when omitted.
        #[arg(long)]
        caller_ref: Option<String>,
        #[arg(long)]
        comment: Option<String>,
        #[arg(long, default_value = "false")]
        private: bool,
    },
    /// List zones ordered by id.
    List {
        #[arg(long)]
        marker: Option<String>,
        #[arg(long)]
        max_items: Option<usize>,
    },
    /// List zones ordered by name.
    ListByName {
        #[arg(long)]
        dns_name: Option<String>,
        #[arg(long)]
        zone_id: Option<String>,
        #[arg(long)]
        max_items: Option<usize>,
    },
    /// Show one zone.
    Get { id: String },
    /// Count zones.
    Count,
    /// Replace a zone's comment. Omit the comment to clear it.
    Comment { id: String, comment: Option<String> },
    /// Delete an empty zone.
    Delete { id: String },
    /// List record sets.
    Records {
        id: String,
        #[arg(long)]
        start_name: Option<String>,
        #[arg(long)]
        start_type: Option<String>,
        #[arg(long)]
        max_items: Option<usize>,
    },
    /// Apply a change batch (JSON, `-` for stdin).
    Change {
        id: String,
        #[arg(long)]
        batch: String,
    },
    /// Add or remove zone tags.
    Tag {
        id: String,
        /// Tag to add or replace, `key=value`.
        #[arg(long = "add")]
        add: Vec<String>,
        /// Tag key to remove.
        #[arg(long = "remove")]
        remove: Vec<String>,
    },
    /// List zone tags.
    Tags { id: String },
}

#[derive(Subcommand)]
enum ChangeCommands {
    /// Show a change record.
    Get { id: String },
}

#[derive(Subcommand)]
enum ParamCommands {
    /// Create or overwrite a parameter.
    Put {
        name: String,
        value: String,
        /// string, string-list, or secure-string.
        #[arg(long = "type", default_value = "string")]
        param_type: String,
        /// Key for `SecureString` values: id, alias/name, or ARN.
        #[arg(long)]
        key_id: Option<String>,
        #[arg(long, default_value = "false")]
        overwrite: bool,
        #[arg(long)]
        description: Option<String>,
        /// Standard, Advanced, or Intelligent-Tiering.
        #[arg(long)]
        tier: Option<String>,
        /// Tag to attach, `key=value`.
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Read one or more parameters.
    Get {
        #[arg(required = true)]
        names: Vec<String>,
        #[arg(long, default_value = "false")]
        decrypt: bool,
    },
    /// Read parameters below a path.
    ListPath {
        path: String,
        #[arg(long, default_value = "false")]
        recursive: bool,
        #[arg(long, default_value = "false")]
        decrypt: bool,
        /// Narrowing filter, `Key[:Option]=v1,v2`.
        #[arg(long = "filter")]
        filters: Vec<String>,
        #[arg(long)]
        max_results: Option<usize>,
        #[arg(long)]
        next_token: Option<String>,
    },
    /// Describe parameter metadata.
    Describe {
        /// Filter, `Key[:Option]=v1,v2`. Filters are ORed.
        #[arg(long = "filter")]
        filters: Vec<String>,
        #[arg(long)]
        max_results: Option<usize>,
        #[arg(long)]
        next_token: Option<String>,
    },
    /// Delete one or more parameters.
    Delete {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Add or remove parameter tags.
    Tag {
        name: String,
        #[arg(long = "add")]
        add: Vec<String>,
        #[arg(long = "remove")]
        remove: Vec<String>,
    },
    /// List parameter tags.
    Tags { name: String },
}

// ── Entry point ──────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_json);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = FernConfig::load(cli.config.as_deref())?;
    let app = App {
        config,
        storage: cli.storage,
        data_path: cli.data_path,
        user: cli.user,
    };

    match cli.command {
        Commands::Zone { action } => cmd_zone(&app, action).await,
        Commands::Change { action } => cmd_change(&app, action).await,
        Commands::Param { action } => cmd_param(&app, action).await,
        Commands::DumpKeys { namespace } => {
            let store = open_store(app.storage, &app.data_path, namespace)?;
            let mut out = std::io::stdout();
            fern_core::dump::dump_keys(store.as_ref(), &mut out).await?;
            Ok(())
        }
    }
}

/// Everything a command needs to open its engine.
struct App {
    config: FernConfig,
    storage: StorageKind,
    data_path: PathBuf,
    user: String,
}

impl App {
    fn zones(&self) -> Result<HostedZoneEngine> {
        let store = open_store(self.storage, &self.data_path, Namespace::Route53)?;
        Ok(HostedZoneEngine::new(store, self.config.dns.clone()))
    }

    fn parameters(&self) -> Result<ParameterEngine> {
        let store = open_store(self.storage, &self.data_path, Namespace::Ssm)?;
        Ok(ParameterEngine::new(
            store,
            self.config.key_ring()?,
            self.config.account(),
        ))
    }
}

// ── Output and argument helpers ──────────────────────────────────────

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("failed to render output")?;
    println!("{text}");
    Ok(())
}

#[allow(clippy::needless_pass_by_value)]
fn r53_err(e: Route53Error) -> anyhow::Error {
    anyhow!("{}: {e}", e.code())
}

#[allow(clippy::needless_pass_by_value)]
fn ssm_err(e: SsmError) -> anyhow::Error {
    anyhow!("{}: {e}", e.code())
}

/// Parse `key=value` arguments into tags.
fn parse_tags(pairs: &[String]) -> Result<Vec<Tag>> {
    pairs
        .iter()
        .map(|pair| {
            let (key, value) = pair
                .split_once('=')
                .with_context(|| format!("invalid tag '{pair}': expected key=value"))?;
            if key.is_empty() {
                bail!("invalid tag '{pair}': key must not be empty");
            }
            Ok(Tag::new(key, value))
        })
        .collect()
}

/// Parse `Key[:Option]=v1,v2` arguments into parameter filters.
fn parse_filters(raw: &[String]) -> Result<Vec<ParameterFilter>> {
    raw.iter()
        .map(|arg| {
            let (head, values) = arg
                .split_once('=')
                .with_context(|| format!("invalid filter '{arg}': expected Key[:Option]=values"))?;
            let (key, option) = match head.split_once(':') {
                Some((key, option)) => (key, Some(option.to_owned())),
                None => (head, None),
            };
            Ok(ParameterFilter {
                key: key.to_owned(),
                option,
                values: values.split(',').map(str::to_owned).collect(),
            })
        })
        .collect()
}

fn parse_param_type(raw: &str) -> Result<ParameterType> {
    match raw.to_ascii_lowercase().as_str() {
        "string" => Ok(ParameterType::String),
        "string-list" | "stringlist" => Ok(ParameterType::StringList),
        "secure-string" | "securestring" => Ok(ParameterType::SecureString),
        _ => raw.parse().map_err(ssm_err),
    }
}

fn read_batch(source: &str) -> Result<ChangeBatch> {
    let raw = if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read change batch from stdin")?;
        buf
    } else {
        std::fs::read_to_string(Path::new(source))
            .with_context(|| format!("failed to read change batch file: {source}"))?
    };
    serde_json::from_str(&raw).context("change batch is not valid JSON")
}

// ── Zone commands ────────────────────────────────────────────────────

#[allow(clippy::too_many_lines)]
async fn cmd_zone(app: &App, action: ZoneCommands) -> Result<()> {
    let zones = app.zones()?;
    match action {
        ZoneCommands::Create {
            name,
            caller_ref,
            comment,
            private,
        } => {
            let caller_reference = caller_ref
                .unwrap_or_else(|| format!("fern-{}", ids::random_id(ids::ID_LEN)));
            let out = zones
                .create_hosted_zone(CreateHostedZoneRequest {
                    name,
                    caller_reference,
                    config: Some(HostedZoneConfig {
                        comment,
                        private_zone: private,
                    }),
                    delegation_set_id: None,
                })
                .await
                .map_err(r53_err)?;
            print_json(&out)
        }
        ZoneCommands::List { marker, max_items } => {
            let out = zones
                .list_hosted_zones(ListHostedZonesRequest { marker, max_items })
                .await
                .map_err(r53_err)?;
            print_json(&out)
        }
        ZoneCommands::ListByName {
            dns_name,
            zone_id,
            max_items,
        } => {
            let out = zones
                .list_hosted_zones_by_name(ListHostedZonesByNameRequest {
                    dns_name,
                    hosted_zone_id: zone_id,
                    max_items,
                })
                .await
                .map_err(r53_err)?;
            print_json(&out)
        }
        ZoneCommands::Get { id } => {
            print_json(&zones.get_hosted_zone(&id).await.map_err(r53_err)?)
        }
        ZoneCommands::Count => {
            let count = zones.get_hosted_zone_count().await.map_err(r53_err)?;
            print_json(&serde_json::json!({ "HostedZoneCount": count }))
        }
        ZoneCommands::Comment { id, comment } => {
            let zone = zones
                .update_hosted_zone_comment(&id, comment)
                .await
                .map_err(r53_err)?;
            print_json(&serde_json::json!({ "HostedZone": zone }))
        }
        ZoneCommands::Delete { id } => {
            let info = zones.delete_hosted_zone(&id).await.map_err(r53_err)?;
            print_json(&serde_json::json!({ "ChangeInfo": info }))
        }
        ZoneCommands::Records {
            id,
            start_name,
            start_type,
            max_items,
        } => {
            let start_record_type = start_type
                .map(|t| t.parse::<RrType>())
                .transpose()
                .map_err(r53_err)?;
            let out = zones
                .list_resource_record_sets(ListResourceRecordSetsRequest {
                    hosted_zone_id: id,
                    start_record_name: start_name,
                    start_record_type,
                    max_items,
                })
                .await
                .map_err(r53_err)?;
            print_json(&out)
        }
        ZoneCommands::Change { id, batch } => {
            let batch = read_batch(&batch)?;
            let info = zones
                .change_resource_record_sets(&id, batch)
                .await
                .map_err(r53_err)?;
            print_json(&serde_json::json!({ "ChangeInfo": info }))
        }
        ZoneCommands::Tag { id, add, remove } => {
            let add = parse_tags(&add)?;
            zones
                .change_tags_for_resource(route53::TAG_RESOURCE_TYPE, &id, add, remove)
                .await
                .map_err(r53_err)?;
            Ok(())
        }
        ZoneCommands::Tags { id } => {
            let set = zones
                .list_tags_for_resource(route53::TAG_RESOURCE_TYPE, &id)
                .await
                .map_err(r53_err)?;
            print_json(&serde_json::json!({ "ResourceTagSet": set }))
        }
    }
}

async fn cmd_change(app: &App, action: ChangeCommands) -> Result<()> {
    let zones = app.zones()?;
    match action {
        ChangeCommands::Get { id } => {
            let info = zones.get_change(&id).await.map_err(r53_err)?;
            print_json(&serde_json::json!({ "ChangeInfo": info }))
        }
    }
}

// ── Parameter commands ───────────────────────────────────────────────

#[allow(clippy::too_many_lines)]
async fn cmd_param(app: &App, action: ParamCommands) -> Result<()> {
    let params = app.parameters()?;
    match action {
        ParamCommands::Put {
            name,
            value,
            param_type,
            key_id,
            overwrite,
            description,
            tier,
            tags,
        } => {
            let tier = tier
                .map(|t| t.parse::<ParameterTier>())
                .transpose()
                .map_err(ssm_err)?;
            let out = params
                .put_parameter(
                    &app.user,
                    PutParameterRequest {
                        name,
                        value,
                        parameter_type: parse_param_type(&param_type)?,
                        key_id,
                        overwrite,
                        tags: parse_tags(&tags)?,
                        description,
                        tier,
                        data_type: None,
                    },
                )
                .await
                .map_err(ssm_err)?;
            print_json(&out)
        }
        ParamCommands::Get { names, decrypt } => {
            if let [name] = names.as_slice() {
                let parameter = params.get_parameter(name, decrypt).await.map_err(ssm_err)?;
                print_json(&serde_json::json!({ "Parameter": parameter }))
            } else {
                let out = params.get_parameters(&names, decrypt).await.map_err(ssm_err)?;
                print_json(&out)
            }
        }
        ParamCommands::ListPath {
            path,
            recursive,
            decrypt,
            filters,
            max_results,
            next_token,
        } => {
            let out = params
                .get_parameters_by_path(GetParametersByPathRequest {
                    path,
                    recursive,
                    with_decryption: decrypt,
                    parameter_filters: parse_filters(&filters)?,
                    max_results,
                    next_token,
                })
                .await
                .map_err(ssm_err)?;
            print_json(&out)
        }
        ParamCommands::Describe {
            filters,
            max_results,
            next_token,
        } => {
            let out = params
                .describe_parameters(DescribeParametersRequest {
                    parameter_filters: parse_filters(&filters)?,
                    max_results,
                    next_token,
                })
                .await
                .map_err(ssm_err)?;
            print_json(&out)
        }
        ParamCommands::Delete { names } => {
            if let [name] = names.as_slice() {
                params.delete_parameter(name).await.map_err(ssm_err)?;
                Ok(())
            } else {
                print_json(&params.delete_parameters(&names).await)
            }
        }
        ParamCommands::Tag { name, add, remove } => {
            let add = parse_tags(&add)?;
            if !add.is_empty() {
                params
                    .add_tags_to_resource(ssm::TAG_RESOURCE_TYPE, &name, add)
                    .await
                    .map_err(ssm_err)?;
            }
            if !remove.is_empty() {
                params
                    .remove_tags_from_resource(ssm::TAG_RESOURCE_TYPE, &name, remove)
                    .await
                    .map_err(ssm_err)?;
            }
            Ok(())
        }
        ParamCommands::Tags { name } => {
            let tags = params
                .list_tags_for_resource(ssm::TAG_RESOURCE_TYPE, &name)
                .await
                .map_err(ssm_err)?;
            print_json(&serde_json::json!({ "TagList": tags }))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn tags_parse_and_reject() {
        let tags = parse_tags(&["env=dev".to_owned(), "empty=".to_owned()]).unwrap();
        assert_eq!(tags, vec![Tag::new("env", "dev"), Tag::new("empty", "")]);
        assert!(parse_tags(&["novalue".to_owned()]).is_err());
        assert!(parse_tags(&["=v".to_owned()]).is_err());
    }

    #[test]
    fn filters_parse_with_and_without_option() {
        let filters =
            parse_filters(&["Name:BeginsWith=/app".to_owned(), "Path=/a,/b".to_owned()]).unwrap();
        assert_eq!(filters[0], ParameterFilter::new("Name", Some("BeginsWith"), &["/app"]));
        assert_eq!(filters[1], ParameterFilter::new("Path", None, &["/a", "/b"]));
    }

    #[test]
    fn param_types_accept_cli_spellings() {
        assert_eq!(parse_param_type("secure-string").unwrap(), ParameterType::SecureString);
        assert_eq!(parse_param_type("StringList").unwrap(), ParameterType::StringList);
        assert!(parse_param_type("blob").is_err());
    }
}
