use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::debug;
use zeroize::Zeroizing;

use vaultgate::allowlist::{self, OwnerKind, DEFAULT_ALLOWLIST_DURATION};
use vaultgate::gateway::HttpGateway;
use vaultgate::inputs;
use vaultgate::jsonrpc::Method;
use vaultgate::keys::{self, CiphertextEncoding};
use vaultgate::logging;
use vaultgate::registry::{RpcRegistry, TxSigner};
use vaultgate::settings::{self, Settings};
use vaultgate::{Handler, Outcome};

#[derive(Parser, Debug)]
#[command(
    name = "vaultgate",
    version,
    about = "Manage workflow secrets in the vault behind the allowlist gateway"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Allowlist validity, e.g. 30m, 48h, 2d (at most 7d)
    #[arg(long, global = true, value_parser = settings::parse_allowlist_duration)]
    timeout: Option<Duration>,
    /// Reuse a request id from a previous MSIG run
    #[arg(long, global = true)]
    request_id: Option<String>,
    /// Namespace for list
    #[arg(long, global = true)]
    namespace: Option<String>,
    /// Treat the owner as a multisig: prepare transactions instead of sending them
    #[arg(long, global = true)]
    unsigned: bool,
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
    /// JSON log lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    /// Vault gateway URL
    #[arg(long, global = true, env = "VAULT_GATEWAY_URL")]
    gateway_url: Option<String>,
    /// Workflow owner address
    #[arg(long, global = true, env = "WORKFLOW_OWNER_ADDRESS")]
    owner: Option<String>,
    /// Owner type: eoa or msig
    #[arg(long, global = true, env = "WORKFLOW_OWNER_TYPE")]
    owner_type: Option<String>,
    /// Registry chain JSON-RPC URL
    #[arg(long, global = true, env = "REGISTRY_RPC_URL")]
    rpc_url: Option<String>,
    /// Workflow registry contract address
    #[arg(long, global = true, env = "WORKFLOW_REGISTRY_ADDRESS")]
    registry: Option<String>,
    /// Registry chain name, shown in MSIG instructions
    #[arg(long, global = true, env = "WORKFLOW_REGISTRY_CHAIN", default_value = "")]
    chain_name: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Secrets management
    #[command(subcommand)]
    Secrets(SecretsCommand),
}

#[derive(Subcommand, Debug)]
enum SecretsCommand {
    /// Create secrets listed in a YAML file
    Create { path: PathBuf },
    /// Update secrets listed in a YAML file
    Update { path: PathBuf },
    /// Delete secrets listed in a YAML file
    Delete { path: PathBuf },
    /// List secret identifiers
    List,
    /// Submit an MSIG bundle once its digest is allowlisted
    Execute { bundle: PathBuf },
    /// Derive the response encryption key and store it in the vault
    StoreEncryptionKey {
        #[arg(long, env = "VAULT_ENCRYPTION_PASSPHRASE", hide_env_values = true)]
        passphrase: String,
    },
    /// Decrypt an encrypted response body locally
    DecryptOutput {
        #[arg(long)]
        passphrase: String,
        /// File with the ciphertext, or - for stdin
        #[arg(short, long)]
        input: String,
        /// base64, hex or raw
        #[arg(long, default_value = "base64")]
        encoding: CiphertextEncoding,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.global.verbose, cli.global.log_json);

    let Command::Secrets(command) = &cli.command;
    match command {
        SecretsCommand::DecryptOutput { passphrase, input, encoding } => {
            let raw = read_input(input)?;
            let plaintext = Zeroizing::new(keys::decrypt_output(passphrase, &raw, *encoding)?);
            std::io::stdout().write_all(&plaintext)?;
            Ok(())
        }
        other => run_vault_command(&cli.global, other),
    }
}

fn run_vault_command(global: &GlobalArgs, command: &SecretsCommand) -> Result<()> {
    let request_id = global
        .request_id
        .as_deref()
        .map(settings::parse_request_id)
        .transpose()?;

    let bundle_dir = match command {
        SecretsCommand::Create { path } | SecretsCommand::Update { path } | SecretsCommand::Delete { path } => {
            parent_dir(path)
        }
        _ => PathBuf::from("."),
    };
    let handler = build_handler(global, bundle_dir)?;
    let request_id = request_id.as_deref();

    let outcome = match command {
        SecretsCommand::Create { path } | SecretsCommand::Update { path } => {
            let method = if matches!(command, SecretsCommand::Create { .. }) {
                Method::SecretsCreate
            } else {
                Method::SecretsUpdate
            };
            let items = match request_id {
                Some(_) => Vec::new(),
                None => inputs::resolve_upsert_inputs(path)?,
            };
            handler.execute_upsert(method, &items, request_id)
        }
        SecretsCommand::Delete { path } => {
            let items = inputs::resolve_delete_inputs(path)?;
            handler.execute_delete(&items, request_id)
        }
        SecretsCommand::List => handler.execute_list(global.namespace.as_deref(), request_id),
        SecretsCommand::Execute { bundle } => handler.execute_bundle(bundle),
        SecretsCommand::StoreEncryptionKey { passphrase } => handler.store_encryption_key(passphrase, request_id),
        SecretsCommand::DecryptOutput { .. } => bail!("decrypt-output does not contact the vault"),
    }?;

    match outcome {
        Outcome::Submitted { reports, .. } => {
            for report in reports {
                println!("{report}");
            }
        }
        Outcome::Parked(instructions) => println!("{instructions}"),
    }
    Ok(())
}

fn build_handler(global: &GlobalArgs, bundle_dir: PathBuf) -> Result<Handler> {
    let gateway_url = global
        .gateway_url
        .clone()
        .context("gateway URL is required (--gateway-url or VAULT_GATEWAY_URL)")?;
    let owner = allowlist::parse_address(
        global
            .owner
            .as_deref()
            .context("owner address is required (--owner or WORKFLOW_OWNER_ADDRESS)")?,
    )?;
    let owner_kind = if global.unsigned {
        OwnerKind::Msig
    } else {
        match global.owner_type.as_deref() {
            Some(kind) => kind.parse()?,
            None => OwnerKind::Eoa,
        }
    };
    let registry_address = allowlist::parse_address(
        global
            .registry
            .as_deref()
            .context("registry address is required (--registry or WORKFLOW_REGISTRY_ADDRESS)")?,
    )?;
    let rpc_url = global
        .rpc_url
        .clone()
        .context("registry RPC URL is required (--rpc-url or REGISTRY_RPC_URL)")?;

    let signer = match std::env::var("ETH_PRIVATE_KEY").ok().map(Zeroizing::new) {
        Some(key) if !key.trim().is_empty() => Some(TxSigner::from_hex(&key)?),
        _ => None,
    };
    if owner_kind == OwnerKind::Eoa {
        let signer = signer
            .as_ref()
            .context("ETH_PRIVATE_KEY is required for EOA owners; pass --unsigned for multisig owners")?;
        allowlist::ensure_signer_matches(signer.address(), &owner)?;
    }

    let mut settings = Settings::new(gateway_url, owner, owner_kind);
    settings.registry_address = registry_address;
    settings.chain_name = global.chain_name.clone();
    settings.allowlist_duration = global.timeout.unwrap_or(DEFAULT_ALLOWLIST_DURATION);
    settings.bundle_dir = bundle_dir;
    debug!(owner = %settings.owner_hex(), kind = %owner_kind, "settings loaded");

    let gateway = HttpGateway::new(settings.gateway_url.clone());
    let registry = RpcRegistry::new(rpc_url, registry_address, signer);
    Ok(Handler::new(Box::new(gateway), Box::new(registry), settings))
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn read_input(input: &str) -> Result<Vec<u8>> {
    if input == "-" {
        let mut buf = Vec::new();
        std::io::stdin().read_to_end(&mut buf).context("failed to read stdin")?;
        return Ok(buf);
    }
    std::fs::read(input).with_context(|| format!("failed to read file {input:?}"))
}
