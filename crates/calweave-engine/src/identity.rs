//! Identity derivation.
//!
//! Every stored record gets a durable identity. Sources with stable native
//! event IDs get `source-kind:native-id`; everything else falls back to a
//! composite digest over the fields that make an event "the same event"
//! across feeds: domain, subject, canonical start, and organizer.
//!
//! The composite digest is also the secondary dedup key used to recognize
//! one logical event arriving from two different sources.

use sha2::{Digest, Sha256};

use calweave_core::{Domain, EventTime, SourceKind};

/// Derives the identity for a record with a stable native ID.
pub fn native_identity(source: SourceKind, native_id: &str) -> String {
    format!("{}:{}", source.as_str(), native_id)
}

/// Derives the composite identity digest.
///
/// Domain is part of the digest, so identical subject/time/organizer across
/// work and personal can never collide into one identity.
pub fn composite_identity(
    domain: Domain,
    subject: &str,
    start: &EventTime,
    organizer_email: Option<&str>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(domain.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(normalize_subject(subject).as_bytes());
    hasher.update([0u8]);
    hasher.update(start.to_utc().to_rfc3339().as_bytes());
    hasher.update([0u8]);
    hasher.update(
        organizer_email
            .unwrap_or("")
            .to_ascii_lowercase()
            .as_bytes(),
    );
    format!("composite:{}", hex::encode(hasher.finalize()))
}

/// Collapses whitespace and case so cosmetic subject differences between
/// feeds do not defeat deduplication.
fn normalize_subject(subject: &str) -> String {
    subject
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn start() -> EventTime {
        let dt: DateTime<Utc> = Utc.with_ymd_and_hms(2025, 6, 2, 16, 0, 0).unwrap();
        EventTime::from_utc(dt)
    }

    #[test]
    fn native_identity_format() {
        assert_eq!(
            native_identity(SourceKind::GraphApi, "AAMk123"),
            "graph-api:AAMk123"
        );
        assert_eq!(native_identity(SourceKind::Ics, "uid@host"), "ics:uid@host");
    }

    #[test]
    fn composite_is_deterministic() {
        let a = composite_identity(Domain::Work, "Sprint Review", &start(), Some("pm@example.com"));
        let b = composite_identity(Domain::Work, "Sprint Review", &start(), Some("pm@example.com"));
        assert_eq!(a, b);
        assert!(a.starts_with("composite:"));
    }

    #[test]
    fn domain_separates_composites() {
        let work = composite_identity(Domain::Work, "Lunch", &start(), None);
        let personal = composite_identity(Domain::Personal, "Lunch", &start(), None);
        assert_ne!(work, personal);
    }

    #[test]
    fn organizer_email_case_is_insignificant() {
        let a = composite_identity(Domain::Work, "Review", &start(), Some("PM@Example.com"));
        let b = composite_identity(Domain::Work, "Review", &start(), Some("pm@example.com"));
        assert_eq!(a, b);
    }

    #[test]
    fn subject_whitespace_is_insignificant() {
        let a = composite_identity(Domain::Work, "Sprint  Review ", &start(), None);
        let b = composite_identity(Domain::Work, "sprint review", &start(), None);
        assert_eq!(a, b);
    }

    #[test]
    fn start_time_is_significant() {
        let later = EventTime::from_utc(Utc.with_ymd_and_hms(2025, 6, 2, 17, 0, 0).unwrap());
        let a = composite_identity(Domain::Work, "Review", &start(), None);
        let b = composite_identity(Domain::Work, "Review", &later, None);
        assert_ne!(a, b);
    }
}
