//! Index command - inspect and clear the expiration index.

use std::sync::Arc;

use anyhow::{Result, bail};
use cachet_expiration::{IndexDb, TimestampIndex};
use chrono::DateTime;
use clap::{Args, Subcommand};

use super::Context;

/// Arguments for the index command.
#[derive(Args, Debug)]
pub struct IndexArgs {
    #[command(subcommand)]
    pub command: IndexCommand,
}

#[derive(Subcommand, Debug)]
pub enum IndexCommand {
    /// List indexed URLs with their last write time
    List {
        /// Only this cache
        #[arg(short, long)]
        cache: Option<String>,
    },

    /// Remove index entries
    Clear {
        /// Only this cache
        #[arg(short, long)]
        cache: Option<String>,
    },
}

/// Run the index command.
pub async fn run(args: IndexArgs, ctx: &Context) -> Result<()> {
    let Some(path) = ctx.config.index_path() else {
        bail!("no [index] path configured; an in-memory index has nothing to inspect");
    };
    let db = Arc::new(IndexDb::open(path));

    match args.command {
        IndexCommand::List { cache } => cmd_list(&db, cache, ctx).await,
        IndexCommand::Clear { cache } => cmd_clear(&db, cache, ctx).await,
    }
}

fn selected_caches(db: &IndexDb, cache: Option<String>) -> Result<Vec<String>> {
    Ok(match cache {
        Some(name) => vec![name],
        None => db.cache_names()?,
    })
}

async fn cmd_list(db: &Arc<IndexDb>, cache: Option<String>, ctx: &Context) -> Result<()> {
    let mut rows = Vec::new();
    for name in selected_caches(db, cache)? {
        let index = TimestampIndex::new(Arc::clone(db), name);
        rows.extend(index.get_all_timestamps().await?);
    }

    if ctx.json_output {
        let entries: Vec<_> = rows
            .iter()
            .map(|r| {
                serde_json::json!({
                    "cache": r.cache_name,
                    "url": r.url,
                    "timestamp": r.timestamp,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No indexed entries");
        return Ok(());
    }

    for record in &rows {
        let written = DateTime::from_timestamp_millis(record.timestamp)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| record.timestamp.to_string());
        println!("{:<16} {}  {}", record.cache_name, written, record.url);
    }
    Ok(())
}

async fn cmd_clear(db: &Arc<IndexDb>, cache: Option<String>, ctx: &Context) -> Result<()> {
    let mut removed = 0;
    for name in selected_caches(db, cache)? {
        removed += TimestampIndex::new(Arc::clone(db), name).delete_all().await?;
    }

    if ctx.json_output {
        println!("{}", serde_json::json!({ "removed": removed }));
    } else {
        println!("Removed {removed} index entries");
    }
    Ok(())
}
