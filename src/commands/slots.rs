/// `actorcache slots` command implementation
///
/// Lists the cache directories allocated to one actor type.
use anyhow::{Context, Result};
use serde_json::json;

use crate::cli_utils::{actorcache_prefix, short_fingerprint};
use actorcache::storage::CacheRepository;

pub fn run(repo: &CacheRepository, classpath: &str, as_json: bool) -> Result<()> {
    let slots = repo
        .list_slots(classpath)
        .with_context(|| format!("Failed to list cache slots of {}", classpath))?;

    if as_json {
        let listing: Vec<_> = slots
            .iter()
            .map(|slot| {
                json!({
                    "version": slot.version,
                    "name": slot.name,
                    "path": slot.path,
                    "fingerprint": slot.fingerprint(),
                    "key": slot.key,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    if slots.is_empty() {
        println!("{} No cache slots for {}", actorcache_prefix(), classpath);
        return Ok(());
    }

    println!("{} {} slot(s) for {}", actorcache_prefix(), slots.len(), classpath);
    for slot in &slots {
        let fingerprint = match slot.fingerprint() {
            Some(fingerprint) => short_fingerprint(&fingerprint).to_string(),
            None => "<no key>".to_string(),
        };
        println!(
            "  {}/{}  {}  {}",
            slot.version,
            slot.name,
            fingerprint,
            slot.path.display()
        );
    }

    Ok(())
}
