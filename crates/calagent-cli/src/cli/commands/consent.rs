//! Cookie consent command handlers.

use anyhow::Result;
use calagent_core::consent::{Consent, ConsentStore, DEFAULT_EXPIRATION_MONTHS};
use calagent_core::storage::FileStorage;
use chrono::Utc;

pub fn show() -> Result<()> {
    let storage = FileStorage::open_default();
    let store = ConsentStore::new(&storage);
    let now = Utc::now();

    let Some(consent) = store.get()? else {
        println!("Cookie consent: undecided");
        return Ok(());
    };

    match store.decided_at()? {
        Some(at) => println!("Cookie consent: {consent} (recorded {})", at.to_rfc3339()),
        None => println!("Cookie consent: {consent}"),
    }
    if store.is_expired(DEFAULT_EXPIRATION_MONTHS, now)? {
        println!("  Decision is older than {DEFAULT_EXPIRATION_MONTHS} months and must be renewed.");
    }
    let analytics = if store.analytics_enabled(now)? {
        "enabled"
    } else {
        "disabled"
    };
    println!("  Analytics: {analytics}");
    Ok(())
}

pub fn record(consent: Consent) -> Result<()> {
    let storage = FileStorage::open_default();
    ConsentStore::new(&storage).record(consent, Utc::now())?;
    println!("✓ Cookie consent {consent}");
    Ok(())
}

pub fn clear() -> Result<()> {
    let storage = FileStorage::open_default();
    ConsentStore::new(&storage).clear()?;
    println!("Cookie consent cleared.");
    Ok(())
}
