//! Check command - validate configuration and show what it routes.

use anyhow::Result;
use clap::Args;

use super::Context;

/// Arguments for the check command.
#[derive(Args, Debug)]
pub struct CheckArgs {}

/// Run the check command.
pub async fn run(_args: CheckArgs, ctx: &Context) -> Result<()> {
    let config = &ctx.config;
    config.validate()?;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(config)?);
        return Ok(());
    }

    println!("Configuration OK");
    println!(
        "  Origin: {}",
        config.origin.as_deref().unwrap_or("(none, all requests cross-origin)")
    );
    match config.index_path() {
        Some(path) => println!("  Index:  {}", path.display()),
        None => println!("  Index:  in-memory"),
    }
    println!("  Routes: {}", config.routes.len());

    for (position, route) in config.routes.iter().enumerate() {
        println!();
        println!(
            "  {}. {} {} -> {}",
            position + 1,
            route.method,
            route.pattern,
            route.strategy
        );
        if let Some(cache) = &route.cache_name {
            println!("     cache: {cache}");
        }
        if let Some(timeout) = route.network_timeout_seconds {
            println!("     network timeout: {timeout}s");
        }
        if let Some(expiration) = &route.expiration {
            if let Some(max_entries) = expiration.max_entries {
                println!("     max entries: {max_entries}");
            }
            if let Some(max_age) = expiration.max_age_seconds {
                println!("     max age: {max_age}s");
            }
        }
        if ctx.verbose
            && let Some(cacheable) = &route.cacheable
        {
            println!(
                "     cacheable: statuses {:?}, headers {:?}",
                cacheable.statuses, cacheable.headers
            );
        }
    }

    Ok(())
}
