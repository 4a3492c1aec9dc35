//! Overlay CLI
//!
//! Entry point for the `overlay` command-line tool: validate, sign, verify
//! and preview overlays against a renderable.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use overlay_engine::config::{EngineConfig, DEFAULT_CONFIG_PATH};
use overlay_engine::engine::AuditError;
use overlay_engine::signer::key_fingerprint;
use overlay_engine::{
    load_bundle, load_into_registry, sign, validate_json, verify, ApplyRequest, OverlayAuditEvent,
    OverlayEngine, OverlayError, OverlayLookup, OverlayRegistry, OverlayRenderable, SignOptions,
    SignatureAlgorithm, SignedOverlaySpec, SigningKeyMaterial,
};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "overlay")]
#[command(about = "Signed overlays for renderable field descriptors", version)]
struct Cli {
    /// Path to engine config file (default: .overlay/engine.toml)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check overlay files for structural problems
    Validate {
        /// Overlay JSON file (single object or array)
        file: PathBuf,
    },

    /// Sign an overlay spec
    Sign {
        /// Overlay spec JSON file (any existing signature is replaced)
        file: PathBuf,

        /// Private key: PEM, or a raw 32-byte Ed25519 seed
        #[arg(long, short = 'k')]
        key: PathBuf,

        /// ed25519 or rsa-pss-sha256 (default: the key's algorithm)
        #[arg(long)]
        algorithm: Option<String>,

        #[arg(long)]
        key_id: Option<String>,

        /// RFC 3339 expiry timestamp
        #[arg(long)]
        expires_at: Option<String>,

        /// Publish this PEM public key instead of the derived one
        #[arg(long)]
        public_key: Option<PathBuf>,

        /// Output file (default: stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Verify signatures of overlays in a file or directory
    Verify {
        path: PathBuf,
    },

    /// Print the SHA-256 fingerprint of a PEM key
    Fingerprint {
        /// Public key PEM, or a private key PEM to derive it from
        key: PathBuf,
    },

    /// Apply overlays to a renderable and print the result
    Apply {
        /// Renderable JSON file
        #[arg(long, short = 't')]
        target: PathBuf,

        /// Overlay bundle (file or directory)
        #[arg(long, short = 'O')]
        overlays: PathBuf,

        #[command(flatten)]
        lookup: LookupArgs,

        /// Fail on references to unknown fields
        #[arg(long)]
        strict: bool,

        /// Register overlays that carry no signature
        #[arg(long)]
        allow_unsigned: bool,

        /// Write audit events to stderr as JSON lines
        #[arg(long)]
        audit: bool,
    },

    /// Show the effective configuration and where it came from
    Config,
}

#[derive(Args)]
struct LookupArgs {
    #[arg(long)]
    capability: Option<String>,
    #[arg(long)]
    workflow: Option<String>,
    #[arg(long)]
    data_view: Option<String>,
    #[arg(long)]
    presentation: Option<String>,
    #[arg(long)]
    operation: Option<String>,
    #[arg(long)]
    tenant: Option<String>,
    #[arg(long)]
    role: Option<String>,
    #[arg(long)]
    user: Option<String>,
    #[arg(long)]
    device: Option<String>,
    /// Caller tags (comma-separated)
    #[arg(long, value_delimiter = ',')]
    tag: Option<Vec<String>>,
}

impl LookupArgs {
    fn into_lookup(self) -> OverlayLookup {
        let mut lookup = OverlayLookup::default();
        lookup.target.capability = self.capability;
        lookup.target.workflow = self.workflow;
        lookup.target.data_view = self.data_view;
        lookup.target.presentation = self.presentation;
        lookup.target.operation = self.operation;
        lookup.scope.tenant_id = self.tenant;
        lookup.scope.role = self.role;
        lookup.scope.user_id = self.user;
        lookup.scope.device = self.device;
        lookup.scope.tags = self.tag;
        lookup
    }
}

fn main() {
    let cli = Cli::parse();

    let cli_overrides = match &cli.command {
        Commands::Apply {
            strict,
            allow_unsigned,
            ..
        } => cli_overrides(*strict, *allow_unsigned),
        _ => None,
    };
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    let (config, sources) = match EngineConfig::build(Some(&config_path), cli_overrides) {
        Ok(built) => built,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(1);
        }
    };
    init_tracing(&config.log_level);

    let result = match cli.command {
        Commands::Validate { file } => run_validate(&file),
        Commands::Sign {
            file,
            key,
            algorithm,
            key_id,
            expires_at,
            public_key,
            output,
        } => run_sign(&file, &key, algorithm, key_id, expires_at, public_key, output),
        Commands::Verify { path } => run_verify(&path),
        Commands::Fingerprint { key } => run_fingerprint(&key),
        Commands::Apply {
            target,
            overlays,
            lookup,
            audit,
            ..
        } => run_apply(&config, &target, &overlays, lookup.into_lookup(), audit),
        Commands::Config => print_json(&json!({ "config": config, "sources": sources })).map(|_| 0),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(2);
        }
    }
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Only flags the user actually set override the file
fn cli_overrides(strict: bool, allow_unsigned: bool) -> Option<Value> {
    let mut overrides = serde_json::Map::new();
    if strict {
        overrides.insert("strict".to_string(), Value::Bool(true));
    }
    if allow_unsigned {
        overrides.insert("allow_unsigned".to_string(), Value::Bool(true));
    }
    (!overrides.is_empty()).then_some(Value::Object(overrides))
}

fn run_validate(file: &Path) -> Result<i32, OverlayError> {
    let value: Value = serde_json::from_str(&fs::read_to_string(file)?)?;
    let documents = match value {
        Value::Array(items) => items,
        single => vec![single],
    };

    let mut all_valid = true;
    let mut reports = Vec::with_capacity(documents.len());
    for document in &documents {
        let result = validate_json(document)?;
        all_valid &= result.valid;
        reports.push(json!({
            "overlayId": document.get("overlayId"),
            "version": document.get("version"),
            "valid": result.valid,
            "issues": result.issues,
        }));
    }

    print_json(&Value::Array(reports))?;
    Ok(if all_valid { 0 } else { 1 })
}

fn run_sign(
    file: &Path,
    key_path: &Path,
    algorithm: Option<String>,
    key_id: Option<String>,
    expires_at: Option<String>,
    public_key: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Result<i32, OverlayError> {
    let existing: SignedOverlaySpec = serde_json::from_str(&fs::read_to_string(file)?)?;
    let key = read_signing_key(key_path)?;

    let algorithm = algorithm
        .map(|a| a.parse::<SignatureAlgorithm>())
        .transpose()?;
    let expires_at = match expires_at {
        Some(raw) => Some(
            DateTime::parse_from_rfc3339(&raw)
                .map_err(|e| {
                    std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("--expires-at: {}", e))
                })?
                .with_timezone(&Utc),
        ),
        None => None,
    };
    let public_key_override = public_key.map(fs::read_to_string).transpose()?;

    let options = SignOptions {
        algorithm,
        key_id,
        issued_at: None,
        expires_at,
        public_key_override,
        metadata: None,
    };
    let signed = sign(&existing.spec, &key, &options)?;
    let rendered = serde_json::to_string_pretty(&signed)?;

    match output {
        Some(path) => {
            fs::write(&path, rendered)?;
            eprintln!("Wrote: {}", path.display());
        }
        None => println!("{}", rendered),
    }
    Ok(0)
}

fn run_verify(path: &Path) -> Result<i32, OverlayError> {
    let now = Utc::now();
    let mut all_valid = true;
    let mut reports = Vec::new();

    for overlay in load_bundle(path)? {
        let (valid, error) = match verify(&overlay) {
            Ok(valid) => (valid, None),
            Err(e) => (false, Some(e.to_string())),
        };
        all_valid &= valid;
        reports.push(json!({
            "overlay": overlay.key(),
            "valid": valid,
            "expired": overlay.is_expired_at(now),
            "error": error,
        }));
    }

    print_json(&Value::Array(reports))?;
    Ok(if all_valid { 0 } else { 1 })
}

fn run_fingerprint(key_path: &Path) -> Result<i32, OverlayError> {
    let pem = fs::read_to_string(key_path)?;
    let public_pem = if pem.contains("PRIVATE KEY") {
        SigningKeyMaterial::from_pem(&pem)?.public_key_pem()?
    } else {
        pem
    };
    println!("{}", key_fingerprint(&public_pem)?);
    Ok(0)
}

fn run_apply(
    config: &EngineConfig,
    target_path: &Path,
    overlays_path: &Path,
    lookup: OverlayLookup,
    audit: bool,
) -> Result<i32, OverlayError> {
    let target: OverlayRenderable = serde_json::from_str(&fs::read_to_string(target_path)?)?;

    let registry = Arc::new(OverlayRegistry::new());
    let report = load_into_registry(&registry, overlays_path, &config.load_options())?;
    for rejected in &report.rejected {
        eprintln!("Rejected {}: {}", rejected.source, rejected.reason);
    }

    let mut engine = OverlayEngine::new(Arc::clone(&registry)).with_default_strict(config.strict);
    if audit {
        engine = engine.with_audit_sink(|event: &OverlayAuditEvent| -> Result<(), AuditError> {
            let line = serde_json::to_string(event).map_err(|e| AuditError(e.to_string()))?;
            eprintln!("{}", line);
            Ok(())
        });
    }

    let outcome = engine.apply(&target, &ApplyRequest::for_lookup(lookup))?;
    engine.flush_audit();

    print_json(&json!({
        "target": outcome.target,
        "overlaysApplied": outcome.applied_refs(),
    }))?;
    Ok(0)
}

fn read_signing_key(path: &Path) -> Result<SigningKeyMaterial, OverlayError> {
    let bytes = fs::read(path)?;
    let key = match std::str::from_utf8(&bytes) {
        Ok(text) if text.contains("-----BEGIN") => SigningKeyMaterial::from_pem(text)?,
        _ => SigningKeyMaterial::ed25519_from_bytes(&bytes)?,
    };
    Ok(key)
}

fn print_json(value: &Value) -> Result<(), OverlayError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
