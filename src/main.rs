//! qrlock CLI entry point

mod cli;

use crate::cli::{Cli, Commands, MemberCommands};
use anyhow::{Context, Result};
use clap::Parser;
use qrlock::audit::ScanContext;
use qrlock::config::ServiceConfig;
use qrlock::limiter::RateLimiter;
use qrlock::service::{IssueOptions, TokenIssuer, TokenValidator, Validation};
use qrlock::storage::{MetadataStore, PostgresConfig, PostgresStore};
use qrlock::token::{self, ResourceType, TenantCipher, TokenCodec};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Helper to get database config lazily (only when needed)
    let get_db_config = || -> Result<PostgresConfig> {
        if let Some(url) = &cli.database_url {
            PostgresConfig::from_url(url).context("Invalid DATABASE_URL")
        } else {
            PostgresConfig::from_env().context("DATABASE_URL not set")
        }
    };

    match cli.command {
        Commands::Issue {
            resource_type,
            resource_id,
            tenant,
            permissions,
            expires_in,
            scan_limit,
            metadata,
            issued_by,
        } => {
            let options = IssueOptions {
                expires_in,
                scan_limit,
                metadata: parse_metadata(metadata)?,
                issued_by,
            };
            issue(get_db_config()?, resource_type, resource_id, tenant, permissions, options).await
        }
        Commands::Validate {
            token,
            bearer,
            source,
            user_agent,
        } => validate(get_db_config()?, token, bearer, source, user_agent).await,
        Commands::Inspect { token } => inspect(token),
        Commands::Revoke { token, by } => revoke(get_db_config()?, token, by).await,
        Commands::Member { command } => member(get_db_config()?, command).await,
        Commands::Init => init(get_db_config()?).await,
        Commands::Status => status(get_db_config()?).await,
    }
}

fn parse_metadata(raw: Option<String>) -> Result<Option<serde_json::Map<String, serde_json::Value>>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let value: serde_json::Value =
        serde_json::from_str(&raw).context("--metadata must be valid JSON")?;
    match value {
        serde_json::Value::Object(map) => Ok(Some(map)),
        _ => anyhow::bail!("--metadata must be a JSON object"),
    }
}

async fn issue(
    db_config: PostgresConfig,
    resource_type: ResourceType,
    resource_id: String,
    tenant: i64,
    permissions: Vec<String>,
    options: IssueOptions,
) -> Result<()> {
    let config = ServiceConfig::from_env()?;
    let store = Arc::new(PostgresStore::new(db_config).await?);
    let issuer = TokenIssuer::new(&config, store.clone(), store.clone());

    let issued = issuer
        .issue(resource_type, &resource_id, tenant, permissions, options)
        .await?;

    println!("{}", issued.token);
    println!();
    println!("Reference:  {}", issued.token_ref);
    println!("Expires at: {}", issued.expires_at);

    Ok(())
}

async fn validate(
    db_config: PostgresConfig,
    token: String,
    bearer: String,
    source: String,
    user_agent: String,
) -> Result<()> {
    let config = ServiceConfig::from_env()?;
    let store = Arc::new(PostgresStore::new(db_config).await?);
    let limiter = Arc::new(RateLimiter::new(config.rate_limit));
    let validator = TokenValidator::new(&config, limiter, store.clone(), store.clone(), store.clone());

    let ctx = ScanContext::new(source, user_agent);
    match validator.validate(&token, &bearer, &ctx).await? {
        Validation::Granted(granted) => {
            println!("VALID");
            println!("Tenant:     {}", granted.tenant_id);
            println!("Role:       {}", granted.role);
            println!(
                "Resource:   {} {}",
                granted.claims.resource_type, granted.claims.resource_id
            );
            println!("Scan count: {}", granted.scan_count);
            if let Some(limit) = granted.claims.scan_limit {
                println!("Scan limit: {}", limit);
            }
            if let Some(metadata) = &granted.metadata {
                println!("Metadata:   {}", metadata);
            }
        }
        rejected => {
            println!("REJECTED ({})", rejected.outcome());
            println!("Reason: {}", rejected.describe());
        }
    }

    Ok(())
}

fn inspect(token: String) -> Result<()> {
    let config = ServiceConfig::from_env()?;
    let codec = TokenCodec::new(config.signing_key.as_bytes(), &config.issuer, &config.audience);
    let cipher = TenantCipher::new(config.encryption_key.as_bytes());

    let claims = codec.verify(&token).context("Token failed verification")?;

    println!("Reference:   {}", token::token_ref(&token));
    println!("Resource:    {} {}", claims.resource_type, claims.resource_id);
    match cipher.decrypt_tenant(&claims.tenant_ciphertext) {
        Ok(tenant_id) => println!("Tenant:      {}", tenant_id),
        Err(_) => println!("Tenant:      (undecryptable)"),
    }
    println!("Permissions: {}", claims.permissions.join(", "));
    match claims.issued_at() {
        Some(at) => println!("Issued at:   {}", at),
        None => println!("Issued at:   {} (raw)", claims.iat),
    }
    match claims.expires_at() {
        Some(at) => println!("Expires at:  {}", at),
        None => println!("Expires at:  {} (raw)", claims.exp),
    }
    if let Some(limit) = claims.scan_limit {
        println!("Scan limit:  {}", limit);
    }
    if claims.metadata_ciphertext.is_some() {
        println!("Metadata:    (encrypted)");
    }

    Ok(())
}

async fn revoke(db_config: PostgresConfig, token: String, by: String) -> Result<()> {
    let store = PostgresStore::new(db_config).await?;
    let token_ref = token::token_ref(&token);
    store.revoke(&token_ref, &by).await?;

    println!("Revoked {}", token_ref);
    Ok(())
}

async fn member(db_config: PostgresConfig, command: MemberCommands) -> Result<()> {
    let store = PostgresStore::new(db_config).await?;

    match command {
        MemberCommands::Add { tenant, bearer, role } => {
            store.add_member(tenant, &bearer, role).await?;
            println!("Registered {} in tenant {} as {}", bearer, tenant, role);
        }
    }

    Ok(())
}

async fn init(db_config: PostgresConfig) -> Result<()> {
    let _store = PostgresStore::new(db_config).await?;
    println!("Database schema initialized successfully");
    Ok(())
}

async fn status(db_config: PostgresConfig) -> Result<()> {
    let store = PostgresStore::new(db_config).await?;
    let tokens = store.token_count().await?;

    println!("qrlock Status");
    println!("=============");
    println!("Database: Connected");
    println!("Tracked tokens: {}", tokens);

    match ServiceConfig::from_env() {
        Ok(config) => {
            println!("Issuer: {}", config.issuer);
            println!("Audience: {}", config.audience);
            println!(
                "Rate limit: {} attempts per {}ms",
                config.rate_limit.max_attempts,
                config.rate_limit.window.as_millis()
            );
        }
        Err(err) => println!("Config: {}", err),
    }

    Ok(())
}
