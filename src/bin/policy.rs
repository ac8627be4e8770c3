use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::Context;
use axum::http::Method;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;

use gateway_authz::authz::PolicyStore;
use gateway_authz::plugins;
use gateway_authz::GatewayConfig;

#[derive(Parser, Debug)]
#[command(author, version, about = "inspect the merged gateway policy", long_about = None)]
struct Cli {
    /// Plugin directory to load instead of PLUGIN_BASE_PATH
    #[arg(long, global = true)]
    plugins: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List rules in evaluation order
    Rules,
    /// List roles and the scopes they grant
    Roles,
    /// Show which rule a request hits and whether the given roles satisfy it
    Check {
        #[arg(long, default_value = "GET")]
        method: String,
        #[arg(long)]
        path: String,
        #[arg(long = "role")]
        roles: Vec<String>,
    },
}

fn main() -> anyhow::Result<()> {
    if dotenv().is_err() {
        let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    let cli = Cli::parse();
    let config = GatewayConfig::from_env()?;

    let store = PolicyStore::with_catalog();
    let plugin_dir = cli.plugins.unwrap_or(config.plugin_base_path.clone());
    if plugin_dir.is_dir() {
        plugins::load_plugins(&plugin_dir, &store, &config.client_ids)?;
    }
    let policy = store.snapshot();

    match cli.command {
        Commands::Rules => {
            for (index, rule) in policy.rules().iter().enumerate() {
                let methods = rule
                    .http_methods()
                    .map(|m| m.iter().map(Method::as_str).collect::<Vec<_>>().join(","))
                    .unwrap_or_else(|| "*".to_string());
                println!("{index:>4}  {methods:<12} {}  [{}]", rule.pattern(), rule.required_scopes().join(", "));
            }
        }
        Commands::Roles => {
            for (role, scopes) in policy.roles() {
                println!("{role}");
                for scope in scopes {
                    println!("    {scope}");
                }
            }
        }
        Commands::Check { method, path, roles } => {
            let method = Method::from_bytes(method.to_uppercase().as_bytes())
                .with_context(|| format!("invalid method `{method}`"))?;

            let Some((index, rule)) = policy.first_match(&method, &path) else {
                println!("no rule matches {method} {path}: denied (403)");
                return Ok(());
            };
            println!("rule #{index} {} matches", rule.pattern());

            let held: HashSet<&str> = roles
                .iter()
                .flat_map(|role| policy.scopes_for(role).iter().map(String::as_str))
                .collect();
            let missing: Vec<&str> = rule
                .required_scopes()
                .iter()
                .map(String::as_str)
                .filter(|scope| !held.contains(scope))
                .collect();

            if missing.is_empty() {
                println!("roles satisfy the rule: allowed");
            } else {
                println!("missing scopes: {}", missing.join(", "));
            }
        }
    }

    Ok(())
}
