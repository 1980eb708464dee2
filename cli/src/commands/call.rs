//! Generic endpoint invocation: `habitica call get tasks user --query type=todos`.

use anyhow::{Context, Result};
use clap::Args;
use habit_core::HttpMethod;
use serde_json::Value;

use super::Session;

#[derive(Args, Debug)]
pub struct CallArgs {
    /// HTTP method (get, post, put, delete)
    pub method: HttpMethod,

    /// Path segments below /api/v3
    #[arg(required = true)]
    pub segments: Vec<String>,

    /// Query parameter, repeatable
    #[arg(long = "query", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub query: Vec<(String, String)>,

    /// JSON request body
    #[arg(short, long, value_name = "JSON")]
    pub data: Option<String>,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got `{s}`"))
}

pub fn invoke(session: &Session, args: &CallArgs) -> Result<Value> {
    let body: Option<Value> = args
        .data
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .context("--data is not valid JSON")?;
    let query: Vec<(&str, &str)> = args.query.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();

    let target = session.api.descend_path(&args.segments)?;
    tracing::debug!(method = %args.method, path = %target.path(), "calling endpoint");
    Ok(target.invoke(args.method, &query, body.as_ref())?)
}

pub fn run(session: &Session, args: &CallArgs) -> Result<()> {
    let value = invoke(session, args)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
