//! Account status and server availability.

use anyhow::{bail, Context, Result};
use habit_core::{ApiError, ApiProxy, HttpMethod};
use serde::Deserialize;

use super::Session;
use crate::config::Config;

const TASKS_PAGE: &str = "/#/tasks";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub hp: f64,
    pub max_health: f64,
    pub exp: f64,
    pub to_next_level: f64,
    pub mp: f64,
    #[serde(rename = "maxMP")]
    pub max_mp: f64,
    pub gp: f64,
    pub lvl: u32,
    #[serde(default)]
    pub class: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Profile {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct User {
    #[serde(default)]
    profile: Option<Profile>,
    stats: Stats,
}

fn render_status(user: &User) -> Vec<String> {
    let stats = &user.stats;
    let name = user
        .profile
        .as_ref()
        .and_then(|p| p.name.as_deref())
        .unwrap_or("Adventurer");
    let class = stats.class.as_deref().unwrap_or("none");
    vec![
        format!("{name}, level {} {class}", stats.lvl),
        format!("Health:     {:.0}/{:.0}", stats.hp, stats.max_health),
        format!("Experience: {:.0}/{:.0}", stats.exp, stats.to_next_level),
        format!("Mana:       {:.0}/{:.0}", stats.mp, stats.max_mp),
        format!("Gold:       {:.2}", stats.gp),
    ]
}

pub fn status(session: &Session) -> Result<()> {
    let data = session
        .api
        .descend("user")?
        .invoke(HttpMethod::Get, &[], None)
        .context("fetching user")?;
    let user: User = serde_json::from_value(data).context("unexpected user format")?;
    for line in render_status(&user) {
        println!("{line}");
    }
    Ok(())
}

/// `Ok(true)` when the service reports itself up. Network failures count as
/// down; other errors propagate.
pub fn server_up(api: &ApiProxy) -> Result<bool> {
    match api.descend("status")?.invoke(HttpMethod::Get, &[], None) {
        Ok(data) => Ok(data.get("status").and_then(|s| s.as_str()) == Some("up")),
        Err(ApiError::Transport(e)) => {
            tracing::debug!(error = %e, "status request failed");
            Ok(false)
        }
        Err(ApiError::Api { status, message }) => {
            tracing::debug!(status, %message, "status request rejected");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

pub fn server(session: &Session) -> Result<()> {
    let url = &session.config.url;
    if server_up(&session.api)? {
        println!("Habitica server {url} online");
        Ok(())
    } else {
        bail!("Habitica server {url} offline or there is some issue with it")
    }
}

pub fn home_url(config: &Config) -> String {
    format!("{}{TASKS_PAGE}", config.url.trim_end_matches('/'))
}
