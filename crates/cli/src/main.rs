use std::io::Write as _;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tracing::{error, info};

use klaro_ai::{AiConfig, CompletionClient, DEFAULT_MODEL, STREAM_ERROR_PREFIX};
use klaro_core::ObjectCoordinate;
use klaro_index::MemoryIndex;
use klaro_livehub::KubeLiveSource;
use klaro_resolve::ResourceResolver;

#[derive(Parser, Debug)]
#[command(name = "klaroctl", version, about = "Klaro CLI")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Yaml)]
    output: Output,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output {
    Yaml,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve an object from the live cluster, falling back to the index
    Get {
        /// GVK key, e.g. "v1/ConfigMap" or "apps/v1/Deployment"
        gvk: String,
        /// Object name
        name: String,
        /// Kubernetes namespace (omit for cluster-scoped kinds)
        #[arg(long = "ns")]
        namespace: Option<String>,
        /// JSON array of captured documents served as the indexed fallback
        #[arg(long = "index-file")]
        index_file: Option<PathBuf>,
    },
    /// Send a prompt to the configured completion backend
    Ask {
        prompt: String,
        /// Relay the answer incrementally instead of waiting for the full text
        #[arg(long, action = ArgAction::SetTrue)]
        stream: bool,
        #[arg(long, env = "KLARO_AI_TOKEN", hide_env_values = true)]
        token: String,
        #[arg(long = "base-url", env = "KLARO_AI_BASE_URL")]
        base_url: Option<String>,
        #[arg(long, env = "KLARO_AI_MODEL", default_value = DEFAULT_MODEL)]
        model: String,
        #[arg(long, default_value_t = 0.5)]
        temperature: f32,
        #[arg(long = "top-p", default_value_t = 1.0)]
        top_p: f32,
    },
}

fn init_tracing() {
    let env = std::env::var("KLARO_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

fn parse_coordinate(gvk: &str, namespace: Option<String>, name: &str) -> Result<ObjectCoordinate> {
    let parts: Vec<&str> = gvk.split('/').collect();
    let (api_version, kind) = match parts.as_slice() {
        [version, kind] => ((*version).to_string(), (*kind).to_string()),
        [group, version, kind] => (format!("{group}/{version}"), (*kind).to_string()),
        _ => return Err(anyhow!("invalid gvk key: {gvk} (expect v1/Kind or group/v1/Kind)")),
    };
    Ok(ObjectCoordinate { api_version, kind, namespace, name: name.to_string() })
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Get { gvk, name, namespace, index_file } => {
            let coordinate = parse_coordinate(&gvk, namespace, &name)?;
            let live = KubeLiveSource::try_default().await?;
            let indexed = match index_file {
                Some(path) => MemoryIndex::load_snapshot(&path)?,
                None => MemoryIndex::new(),
            };
            let resolver = ResourceResolver::new(Arc::new(live), Arc::new(indexed));
            match cli.output {
                Output::Yaml => {
                    let bytes = resolver.resolve_as_yaml(&coordinate).await?;
                    std::io::stdout().write_all(&bytes)?;
                }
                Output::Json => {
                    let doc = resolver.resolve(&coordinate).await?;
                    println!("{}", serde_json::to_string_pretty(&doc)?);
                }
            }
        }
        Commands::Ask { prompt, stream, token, base_url, model, temperature, top_p } => {
            let client = CompletionClient::configure(AiConfig {
                auth_token: token,
                base_url,
                model,
                temperature,
                top_p,
                ..AiConfig::default()
            })?;
            if stream {
                let mut rx = client.generate_stream(&prompt).await?;
                while let Some(chunk) = rx.recv().await {
                    if let Some(desc) = chunk.strip_prefix(STREAM_ERROR_PREFIX) {
                        error!(error = %desc, "completion stream failed");
                        println!();
                        bail!("completion stream failed: {desc}");
                    }
                    print!("{chunk}");
                    std::io::stdout().flush()?;
                }
                println!();
            } else {
                let text = client.generate(&prompt).await?;
                println!("{text}");
            }
            info!("ask done");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_coordinate_core_group() {
        let c = parse_coordinate("v1/ConfigMap", Some("default".into()), "cm").expect("ok");
        assert_eq!(c.api_version, "v1");
        assert_eq!(c.kind, "ConfigMap");
    }

    #[test]
    fn parse_coordinate_named_group() {
        let c = parse_coordinate("apps/v1/Deployment", None, "web").expect("ok");
        assert_eq!(c.api_version, "apps/v1");
        assert_eq!(c.kind, "Deployment");
    }

    #[test]
    fn parse_coordinate_rejects_malformed_keys() {
        assert!(parse_coordinate("justkind", None, "x").is_err());
        assert!(parse_coordinate("a/b/c/d", None, "x").is_err());
    }
}
