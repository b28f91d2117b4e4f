//! Cookie consent record.
//!
//! Only the stored decision and its timestamp are modelled here; deciding what
//! analytics to load is up to the caller via [`ConsentStore::analytics_enabled`].

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use chrono::{DateTime, Months, SecondsFormat, Utc};

use crate::storage::LocalStorage;

/// Storage key for the decision.
pub const CONSENT_KEY: &str = "cookieConsent";
/// Storage key for the decision timestamp (RFC 3339, UTC, milliseconds).
pub const CONSENT_DATE_KEY: &str = "cookieConsentDate";
/// Decisions older than this must be asked again.
pub const DEFAULT_EXPIRATION_MONTHS: u32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consent {
    Accepted,
    Rejected,
}

impl Consent {
    pub fn as_str(self) -> &'static str {
        match self {
            Consent::Accepted => "accepted",
            Consent::Rejected => "rejected",
        }
    }
}

impl fmt::Display for Consent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Consent {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("Unknown consent value: {other}")),
        }
    }
}

/// Consent decision backed by [`LocalStorage`].
pub struct ConsentStore<'a> {
    storage: &'a dyn LocalStorage,
}

impl<'a> ConsentStore<'a> {
    pub fn new(storage: &'a dyn LocalStorage) -> Self {
        Self { storage }
    }

    /// Returns the stored decision. Unrecognized values read as undecided.
    pub fn get(&self) -> Result<Option<Consent>> {
        let Some(raw) = self.storage.get(CONSENT_KEY)? else {
            return Ok(None);
        };
        match raw.parse() {
            Ok(consent) => Ok(Some(consent)),
            Err(err) => {
                tracing::warn!(error = %err, "ignoring stored consent value");
                Ok(None)
            }
        }
    }

    /// Returns when the decision was recorded.
    pub fn decided_at(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .storage
            .get(CONSENT_DATE_KEY)?
            .and_then(|raw| DateTime::parse_from_rfc3339(raw.trim()).ok())
            .map(|dt| dt.with_timezone(&Utc)))
    }

    pub fn has_decided(&self) -> Result<bool> {
        Ok(self.get()?.is_some())
    }

    pub fn has_accepted(&self) -> Result<bool> {
        Ok(self.get()? == Some(Consent::Accepted))
    }

    pub fn has_rejected(&self) -> Result<bool> {
        Ok(self.get()? == Some(Consent::Rejected))
    }

    /// Stores a decision taken at `now`.
    pub fn record(&self, consent: Consent, now: DateTime<Utc>) -> Result<()> {
        self.storage.set(CONSENT_KEY, consent.as_str())?;
        self.storage.set(
            CONSENT_DATE_KEY,
            &now.to_rfc3339_opts(SecondsFormat::Millis, true),
        )?;
        tracing::debug!(%consent, "recorded cookie consent");
        Ok(())
    }

    /// Forgets the decision.
    pub fn clear(&self) -> Result<()> {
        self.storage.remove(CONSENT_KEY)?;
        self.storage.remove(CONSENT_DATE_KEY)?;
        Ok(())
    }

    /// Returns true if the decision is older than `months` at `now`.
    ///
    /// A missing or unreadable timestamp counts as expired.
    pub fn is_expired(&self, months: u32, now: DateTime<Utc>) -> Result<bool> {
        let Some(decided_at) = self.decided_at()? else {
            return Ok(true);
        };
        Ok(decided_at
            .checked_add_months(Months::new(months))
            .is_none_or(|expires_at| now > expires_at))
    }

    /// Analytics may run only with a current, accepted decision.
    pub fn analytics_enabled(&self, now: DateTime<Utc>) -> Result<bool> {
        Ok(self.has_accepted()? && !self.is_expired(DEFAULT_EXPIRATION_MONTHS, now)?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::storage::MemoryStorage;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    /// Test: nothing stored means undecided and expired.
    #[test]
    fn test_undecided() {
        let storage = MemoryStorage::new();
        let store = ConsentStore::new(&storage);

        assert!(!store.has_decided().unwrap());
        assert!(store.is_expired(12, at(2025, 1, 1)).unwrap());
        assert!(!store.analytics_enabled(at(2025, 1, 1)).unwrap());
    }

    /// Test: accepting enables analytics until the decision ages out.
    #[test]
    fn test_accept_then_expire() {
        let storage = MemoryStorage::new();
        let store = ConsentStore::new(&storage);
        store.record(Consent::Accepted, at(2025, 1, 15)).unwrap();

        assert!(store.has_accepted().unwrap());
        assert!(!store.has_rejected().unwrap());
        assert!(store.analytics_enabled(at(2025, 6, 1)).unwrap());
        assert!(!store.is_expired(12, at(2026, 1, 15)).unwrap());
        assert!(store.is_expired(12, at(2026, 1, 16)).unwrap());
        assert!(!store.analytics_enabled(at(2026, 2, 1)).unwrap());
    }

    /// Test: rejection never enables analytics.
    #[test]
    fn test_reject() {
        let storage = MemoryStorage::new();
        let store = ConsentStore::new(&storage);
        store.record(Consent::Rejected, at(2025, 1, 15)).unwrap();

        assert!(store.has_decided().unwrap());
        assert!(store.has_rejected().unwrap());
        assert!(!store.analytics_enabled(at(2025, 2, 1)).unwrap());
    }

    /// Test: clear removes both keys.
    #[test]
    fn test_clear() {
        let storage = MemoryStorage::new();
        let store = ConsentStore::new(&storage);
        store.record(Consent::Accepted, at(2025, 1, 15)).unwrap();
        store.clear().unwrap();

        assert_eq!(store.get().unwrap(), None);
        assert_eq!(store.decided_at().unwrap(), None);
    }

    /// Test: the decision lands under the shared storage keys.
    #[test]
    fn test_storage_layout() {
        let storage = MemoryStorage::new();
        ConsentStore::new(&storage)
            .record(Consent::Rejected, at(2025, 1, 15))
            .unwrap();

        assert_eq!(
            storage.get("cookieConsent").unwrap().as_deref(),
            Some("rejected")
        );
        assert_eq!(
            storage.get("cookieConsentDate").unwrap().as_deref(),
            Some("2025-01-15T12:00:00.000Z")
        );
    }

    /// Test: garbage values read as undecided, garbage dates as expired.
    #[test]
    fn test_unrecognized_values() {
        let storage = MemoryStorage::new();
        storage.set(CONSENT_KEY, "maybe").unwrap();
        storage.set(CONSENT_DATE_KEY, "yesterday").unwrap();
        let store = ConsentStore::new(&storage);

        assert_eq!(store.get().unwrap(), None);
        assert!(store.is_expired(12, at(2025, 1, 1)).unwrap());
    }
}
