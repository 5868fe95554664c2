use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "config-cli")]
#[command(about = "Management CLI for the staged configuration service", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Editing session (sent as x-session-id). Omit for the default session.
    #[arg(short, long)]
    session: Option<String>,

    /// Admin API key, for `status` and `sessions`.
    #[arg(short, long)]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the configuration the session sees
    Show {
        /// Subtree path, e.g. "interfaces eth0"
        #[arg(short, long)]
        node: Option<String>,
        #[arg(short, long)]
        depth: Option<usize>,
        #[arg(long)]
        section: Option<String>,
    },
    /// Stage a value (omit VALUE for a valueless node)
    Set {
        path: String,
        value: Option<String>,
        #[arg(short, long)]
        comment: Option<String>,
    },
    /// Stage a deletion
    Delete {
        path: String,
        #[arg(short, long)]
        comment: Option<String>,
    },
    /// Validate the session candidate
    Validate,
    /// Preview the candidate as it would be committed
    Generate {
        #[arg(short, long, default_value = "json")]
        format: String,
    },
    /// Validate, activate and record the session candidate
    Commit {
        #[arg(short, long)]
        comment: Option<String>,
        /// Also write the result to the startup file
        #[arg(long)]
        save: bool,
    },
    /// Drop the session's pending changes
    Discard,
    /// List committed versions, newest first
    History {
        #[arg(short, long)]
        limit: Option<usize>,
        #[arg(short, long, default_value_t = 0)]
        offset: usize,
        #[arg(short, long)]
        node: Option<String>,
    },
    /// Show one committed version
    Version { version: u64 },
    /// Compare two versions (TO defaults to the latest)
    Diff {
        from: u64,
        to: Option<u64>,
        /// Print `+ / - / ~` lines instead of JSON
        #[arg(long)]
        text: bool,
    },
    /// Re-apply a recorded version as a new version
    Rollback {
        version: u64,
        #[arg(short, long)]
        node: Option<String>,
        #[arg(short, long)]
        comment: Option<String>,
    },
    /// Export the configuration as json, yaml or cli commands
    Export {
        #[arg(short, long, default_value = "json")]
        format: String,
        #[arg(short, long)]
        node: Option<String>,
    },
    /// Import a file and apply it
    Import {
        file: PathBuf,
        #[arg(short, long, default_value = "json")]
        format: String,
        #[arg(long)]
        merge: bool,
        #[arg(long)]
        dry_run: bool,
    },
    /// Print a fresh session id
    NewSession,
    /// Engine status (admin)
    Status,
    /// Open sessions (admin)
    Sessions,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if let Some(session) = &cli.session {
        headers.insert("x-session-id", HeaderValue::from_str(session)?);
    }
    if let Some(key) = &cli.key {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", key))?);
    }
    let url = |path: &str| format!("{}{}", cli.url.trim_end_matches('/'), path);

    let request = match cli.command {
        Commands::Show { node, depth, section } => {
            let mut query: Vec<(&str, String)> = Vec::new();
            if let Some(node) = node {
                query.push(("node", node));
            }
            if let Some(depth) = depth {
                query.push(("depth", depth.to_string()));
            }
            if let Some(section) = section {
                query.push(("section", section));
            }
            client.get(url("/config")).query(&query)
        }
        Commands::Set { path, value, comment } => client
            .post(url("/config"))
            .json(&json!({ "path": path, "value": value, "comment": comment })),
        Commands::Delete { path, comment } => client
            .delete(url("/config"))
            .json(&json!({ "path": path, "comment": comment })),
        Commands::Validate => client.post(url("/config/validate")).json(&json!({})),
        Commands::Generate { format } => {
            let res = client
                .post(url("/config/generate"))
                .headers(headers)
                .json(&json!({ "dryRun": true, "format": format }))
                .send()
                .await?;
            return finish(print_field(res, "config").await?);
        }
        Commands::Commit { comment, save } => client
            .post(url("/config/commit"))
            .json(&json!({ "comment": comment, "saveFile": save })),
        Commands::Discard => client.post(url("/config/discard")),
        Commands::History { limit, offset, node } => {
            let mut query: Vec<(&str, String)> = vec![("offset", offset.to_string())];
            if let Some(limit) = limit {
                query.push(("limit", limit.to_string()));
            }
            if let Some(node) = node {
                query.push(("node", node));
            }
            client.get(url("/config/history")).query(&query)
        }
        Commands::Version { version } => client.get(url(&format!("/config/history/{}", version))),
        Commands::Diff { from, to, text } => {
            let body = json!({
                "versionFrom": from,
                "versionTo": to,
                "format": if text { "text" } else { "json" },
            });
            let request = client.post(url("/config/diff")).headers(headers).json(&body);
            let res = request.send().await?;
            return finish(if text {
                print_field(res, "formattedDiff").await?
            } else {
                print_response(res).await?
            });
        }
        Commands::Rollback { version, node, comment } => client
            .post(url("/config/rollback"))
            .json(&json!({ "version": version, "node": node, "comment": comment })),
        Commands::Export { format, node } => {
            let mut query: Vec<(&str, String)> = vec![("format", format)];
            if let Some(node) = node {
                query.push(("node", node));
            }
            let res = client
                .get(url("/config/export"))
                .headers(headers)
                .query(&query)
                .send()
                .await?;
            return finish(print_text(res).await?);
        }
        Commands::Import {
            file,
            format,
            merge,
            dry_run,
        } => {
            let body = std::fs::read_to_string(&file)?;
            client
                .post(url("/config/import"))
                .query(&[
                    ("format", format),
                    ("merge", merge.to_string()),
                    ("dryRun", dry_run.to_string()),
                ])
                .body(body)
        }
        Commands::NewSession => {
            println!("{}", uuid::Uuid::new_v4());
            return Ok(());
        }
        Commands::Status => client.get(url("/admin/status")),
        Commands::Sessions => client.get(url("/admin/sessions")),
    };

    let res = request.headers(headers).send().await?;
    finish(print_response(res).await?)
}

fn finish(ok: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<bool, Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    let rendered = match serde_json::from_str::<Value>(&text) {
        Ok(json) => serde_json::to_string_pretty(&json)?,
        Err(_) => text,
    };

    if status.is_success() {
        println!("{}", rendered);
    } else {
        eprintln!("Error: API returned status {}", status);
        eprintln!("{}", rendered);
    }
    Ok(status.is_success())
}

/// Print one string field of a JSON response, or the whole error body.
async fn print_field(res: reqwest::Response, field: &str) -> Result<bool, Box<dyn std::error::Error>> {
    if !res.status().is_success() {
        return print_response(res).await;
    }
    let json: Value = res.json().await?;
    match json.get(field).and_then(Value::as_str) {
        Some(text) => println!("{}", text),
        None => println!("{}", serde_json::to_string_pretty(&json)?),
    }
    Ok(true)
}

async fn print_text(res: reqwest::Response) -> Result<bool, Box<dyn std::error::Error>> {
    if !res.status().is_success() {
        return print_response(res).await;
    }
    print!("{}", res.text().await?);
    Ok(true)
}
