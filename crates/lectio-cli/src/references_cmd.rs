//! `lectio references` commands: reference cache maintenance.

use anyhow::Result;
use chrono::Utc;
use sqlx::PgPool;

use lectio_core::store::{PgReferenceCache, ReferenceCache};

/// Delete expired reference validations.
pub async fn run_purge(pool: &PgPool) -> Result<()> {
    let cache = PgReferenceCache::new(pool.clone());
    let removed = cache.purge_expired(Utc::now()).await?;
    tracing::info!(removed, "reference cache purged");
    println!("Removed {removed} expired reference(s).");
    Ok(())
}
