//! Inspect and refresh the cached api documentation.

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use habit_core::{ApiDocCache, EndpointNode, UreqTransport, API_PREFIX};

use crate::config::Config;

#[derive(Subcommand, Debug)]
pub enum ApidocCommand {
    /// List every documented endpoint
    List,
    /// Show the documentation of the endpoints at a path below /api/v3
    Show {
        #[arg(required = true)]
        segments: Vec<String>,
    },
    /// Download the documentation again and overwrite the cache
    Refresh,
}

/// One `METHOD /path  title` line per endpoint, methods padded to align.
pub fn endpoint_lines(tree: &EndpointNode) -> Vec<String> {
    tree.endpoints()
        .into_iter()
        .map(|record| {
            let method = record.method.as_str().to_uppercase();
            format!("{method:<6} {}  {}", record.uri, record.title)
        })
        .collect()
}

/// Documentation of every method at `segments` below the API prefix.
pub fn describe(tree: &EndpointNode, segments: &[String]) -> Result<Vec<String>> {
    let path = API_PREFIX.iter().copied().chain(segments.iter().map(String::as_str));
    let mut node = tree;
    for segment in path {
        match node.child(segment) {
            Some(child) => node = child,
            None => bail!("no documented path continues with `{segment}`"),
        }
    }
    if !node.is_terminal() {
        bail!("not an endpoint, continue with one of: {}", node.keys().join(", "));
    }
    Ok(node.methods().filter_map(|m| node.method(m)).map(|r| r.render()).collect())
}

pub fn run(config: &Config, cmd: ApidocCommand) -> Result<()> {
    let cache = ApiDocCache::new(config.cache_path());
    let transport = UreqTransport::new(config.timeout());
    let text = match &cmd {
        ApidocCommand::Refresh => cache
            .refresh(&transport, &config.apidoc_url)
            .with_context(|| format!("refreshing {}", cache.path().display()))?,
        _ => cache.load(&transport, &config.apidoc_url)?.0,
    };
    let (tree, skipped) = EndpointNode::from_apidoc(&text).context("parsing api documentation")?;
    if !skipped.is_empty() {
        tracing::warn!(count = skipped.len(), "some documentation lines were not understood");
    }

    match cmd {
        ApidocCommand::List => {
            for line in endpoint_lines(&tree) {
                println!("{line}");
            }
        }
        ApidocCommand::Show { segments } => {
            for block in describe(&tree, &segments)? {
                print!("{block}");
            }
        }
        ApidocCommand::Refresh => {
            println!(
                "Cached {} endpoints in {}",
                tree.endpoints().len(),
                cache.path().display()
            );
        }
    }
    Ok(())
}
