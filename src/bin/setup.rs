//! tgrelay setup wizard.
//!
//! Asks for the Telegram and Discord credentials in the terminal and writes
//! `config.toml` to the project root (`TGRELAY_ROOT`, default `.`).
//! An existing config is only replaced after confirmation.

use anyhow::{Context, Result};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

// ── Config formatting ──────────────────────────────────────────────────────────

struct ConfigParams<'a> {
    tg_token: &'a str,
    webhook_url: &'a str,
    port: u16,
    discord_token: &'a str,
    channel_id: &'a str,
    allowed_domains: &'a str,
    bold_sender: bool,
}

/// Produces a valid config.toml string. Extracted so it can be unit-tested.
fn format_config(p: &ConfigParams<'_>) -> String {
    let domains: Vec<String> = p
        .allowed_domains
        .split([',', ' '])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("\"{s}\""))
        .collect();
    let domains_str = domains.join(", ");

    let tg_token = p.tg_token;
    let webhook_url = p.webhook_url;
    let port = p.port;
    let discord_token = p.discord_token;
    let channel_id = p.channel_id.trim();
    let bold_sender = p.bold_sender;

    format!(
        r#"[telegram]
bot_token = "{tg_token}"
webhook_url = "{webhook_url}"
listen_address = "0.0.0.0"
port = {port}
# secret_token = "random-string"

[discord]
bot_token = "{discord_token}"
channel_id = {channel_id}

[relay]
link_prefix = "http"
allowed_link_domains = [{domains_str}]
animation_fps = 25
photo_filename = "image.png"
bold_sender = {bold_sender}
ffmpeg_path = "ffmpeg"
"#
    )
}

// ── Input validation ───────────────────────────────────────────────────────────

fn parse_port(input: &str) -> Result<u16> {
    if input.is_empty() {
        return Ok(5001);
    }
    input
        .parse()
        .with_context(|| format!("Not a valid port: {input}"))
}

fn check_channel_id(input: &str) -> Result<()> {
    match input.trim().parse::<u64>() {
        Ok(0) | Err(_) => anyhow::bail!("Channel ID must be a positive number, got: {input}"),
        Ok(_) => Ok(()),
    }
}

fn parse_yes(input: &str) -> bool {
    matches!(input.to_ascii_lowercase().as_str(), "y" | "yes")
}

// ── CLI wizard ─────────────────────────────────────────────────────────────────

fn read_line(prompt: &str) -> Result<String> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut buf = String::new();
    io::stdin().read_line(&mut buf)?;
    Ok(buf.trim().to_owned())
}

fn run_cli(project_root: &Path) -> Result<()> {
    println!("=== tgrelay setup ===\n");

    let config_path = project_root.join("config.toml");
    if config_path.exists()
        && !parse_yes(&read_line(&format!(
            "{} exists. Overwrite? [y/N]: ",
            config_path.display()
        ))?)
    {
        println!("Leaving existing config untouched.");
        return Ok(());
    }

    let tg_token = read_line("Telegram bot token: ")?;
    let webhook_url = read_line("Public webhook URL (https://...): ")?;
    let port = parse_port(&read_line("Webhook port [5001]: ")?)?;
    let discord_token = read_line("Discord bot token: ")?;
    let channel_id = read_line("Discord channel ID: ")?;
    check_channel_id(&channel_id)?;
    let mut allowed_domains = read_line("Allowed link domains [x.com]: ")?;
    if allowed_domains.is_empty() {
        allowed_domains = "x.com".to_owned();
    }
    let bold_sender = parse_yes(&read_line("Bold sender names? [y/N]: ")?);

    let config = format_config(&ConfigParams {
        tg_token: &tg_token,
        webhook_url: &webhook_url,
        port,
        discord_token: &discord_token,
        channel_id: &channel_id,
        allowed_domains: &allowed_domains,
        bold_sender,
    });

    std::fs::write(&config_path, &config)
        .with_context(|| format!("Could not write {}", config_path.display()))?;

    println!("\n✓  config.toml saved to {}", config_path.display());
    println!("   Run the relay with:  cargo run");
    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    // Resolve project root: prefer TGRELAY_ROOT env, fall back to cwd.
    let project_root =
        PathBuf::from(std::env::var("TGRELAY_ROOT").unwrap_or_else(|_| ".".to_string()));
    run_cli(&project_root)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
