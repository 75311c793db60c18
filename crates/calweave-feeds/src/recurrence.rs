//! Recurrence expansion.
//!
//! Expands a series-master record (RRULE + EXDATEs) into concrete occurrence
//! records up to a bounded horizon and occurrence count, whichever comes
//! first. Overrides (RECURRENCE-ID instances) replace the generated
//! occurrence with the same original start; cancelled overrides remove it.
//!
//! Unsupported rule grammar degrades: the directly-stated occurrences (the
//! master's own start plus any overrides) are emitted, the series is flagged
//! partially expanded, and the feed continues.

use chrono::{DateTime, Duration, Utc};
use rrule::RRuleSet;
use tracing::{debug, warn};

use calweave_core::RawTime;

use crate::error::FeedIssue;
use crate::raw_record::RawEventRecord;

/// Default cap on generated occurrences per series.
pub const DEFAULT_MAX_OCCURRENCES: u16 = 500;

/// Bounds for series expansion.
#[derive(Debug, Clone)]
pub struct ExpansionLimits {
    /// Stop after this many generated occurrences.
    pub max_occurrences: u16,
    /// Stop at this instant, even if the rule continues.
    pub horizon: DateTime<Utc>,
}

impl ExpansionLimits {
    /// Creates expansion limits.
    pub fn new(max_occurrences: u16, horizon: DateTime<Utc>) -> Self {
        Self {
            max_occurrences,
            horizon,
        }
    }
}

/// The product of expanding one series.
#[derive(Debug)]
pub struct Expansion {
    /// One record per concrete occurrence.
    pub records: Vec<RawEventRecord>,
    /// True when the rule grammar could only be partially honored.
    pub partial: bool,
    /// Problems encountered during expansion.
    pub issues: Vec<FeedIssue>,
}

/// Expands a series master into occurrence records.
///
/// `overrides` are this series' RECURRENCE-ID records (matched to generated
/// occurrences by original start, not by position).
pub fn expand_series(
    master: &RawEventRecord,
    overrides: &[&RawEventRecord],
    limits: &ExpansionLimits,
) -> Expansion {
    let uid = master.native_id.clone().unwrap_or_default();

    let Some(rule) = master.rrule.as_deref() else {
        // Not a series master; nothing to expand.
        return Expansion {
            records: vec![master.clone()],
            partial: false,
            issues: Vec::new(),
        };
    };

    let rrule_input = build_rrule_input(master, rule);
    let rrule_set: RRuleSet = match rrule_input.parse() {
        Ok(set) => set,
        Err(e) => {
            warn!(uid = %uid, error = %e, "Unsupported recurrence rule; partial expansion");
            return degraded_expansion(master, overrides, &uid, e.to_string());
        }
    };

    let tz: rrule::Tz = Utc.into();
    let result = rrule_set
        .before(limits.horizon.with_timezone(&tz))
        .all(limits.max_occurrences);

    debug!(
        uid = %uid,
        occurrences = result.dates.len(),
        capped = result.limited,
        "Expanded series"
    );

    let mut records = Vec::with_capacity(result.dates.len());
    let mut consumed: Vec<&RawEventRecord> = Vec::new();

    for occ in &result.dates {
        let start = occurrence_time(occ, &master.start);
        let key = raw_time_key(&start);

        let matched = overrides
            .iter()
            .copied()
            .find(|o| o.original_start.as_ref().is_some_and(|os| raw_time_key(os) == key));

        match matched {
            Some(over) if over.cancelled => {
                consumed.push(over);
            }
            Some(over) => {
                consumed.push(over);
                records.push(override_record(over, &uid, &key));
            }
            None => records.push(occurrence_record(master, start, &uid)),
        }
    }

    // Overrides the rule did not generate (e.g. EXDATE'd then re-added by
    // the provider) are still directly stated by the feed.
    for over in overrides.iter().copied() {
        if over.cancelled || consumed.iter().any(|c| std::ptr::eq(*c, over)) {
            continue;
        }
        if let Some(ref original) = over.original_start {
            records.push(override_record(over, &uid, &raw_time_key(original)));
        }
    }

    Expansion {
        records,
        partial: false,
        issues: Vec::new(),
    }
}

/// Fallback when the rule grammar is unsupported: the master's own start and
/// the overrides are the only occurrences that are directly stated.
fn degraded_expansion(
    master: &RawEventRecord,
    overrides: &[&RawEventRecord],
    uid: &str,
    detail: String,
) -> Expansion {
    let master_key = raw_time_key(&master.start);
    let mut records = Vec::new();

    let master_overridden = overrides
        .iter()
        .any(|o| o.original_start.as_ref().is_some_and(|os| raw_time_key(os) == master_key));
    if !master_overridden {
        records.push(occurrence_record(master, master.start.clone(), uid));
    }

    for over in overrides.iter().copied() {
        if over.cancelled {
            continue;
        }
        if let Some(ref original) = over.original_start {
            records.push(override_record(over, uid, &raw_time_key(original)));
        }
    }

    Expansion {
        records,
        partial: true,
        issues: vec![FeedIssue::recurrence(Some(uid.to_string()), detail)],
    }
}

/// Builds the iCalendar-format input the rrule parser expects.
fn build_rrule_input(master: &RawEventRecord, rule: &str) -> String {
    let mut lines = vec![dt_line("DTSTART", &master.start, master.zone_hint.as_deref())];
    lines.push(format!("RRULE:{rule}"));
    for exdate in &master.exdates {
        lines.push(dt_line("EXDATE", exdate, master.zone_hint.as_deref()));
    }
    lines.join("\n")
}

fn dt_line(name: &str, time: &RawTime, zone_hint: Option<&str>) -> String {
    match time {
        // The rrule parser needs a datetime; all-day dates become midnight UTC.
        RawTime::Date(d) => format!("{name}:{}T000000Z", d.format("%Y%m%d")),
        RawTime::Utc(dt) => format!("{name}:{}", dt.format("%Y%m%dT%H%M%SZ")),
        RawTime::Offset(dt) => format!(
            "{name}:{}",
            dt.with_timezone(&Utc).format("%Y%m%dT%H%M%SZ")
        ),
        RawTime::Floating(naive) => match zone_hint {
            Some(tzid) => format!("{name};TZID={tzid}:{}", naive.format("%Y%m%dT%H%M%S")),
            None => format!("{name}:{}Z", naive.format("%Y%m%dT%H%M%S")),
        },
    }
}

/// Converts an rrule occurrence instant back to a raw time matching the
/// master's time shape.
fn occurrence_time(occ: &DateTime<rrule::Tz>, master_start: &RawTime) -> RawTime {
    match master_start {
        RawTime::Date(_) => RawTime::Date(occ.date_naive()),
        RawTime::Utc(_) | RawTime::Offset(_) => RawTime::Utc(occ.with_timezone(&Utc)),
        RawTime::Floating(_) => RawTime::Floating(occ.naive_local()),
    }
}

/// A stable wall-time key for matching overrides to generated occurrences
/// and for deriving per-occurrence native IDs.
fn raw_time_key(time: &RawTime) -> String {
    match time {
        RawTime::Date(d) => d.format("%Y%m%d").to_string(),
        RawTime::Utc(dt) => dt.format("%Y%m%dT%H%M%SZ").to_string(),
        RawTime::Offset(dt) => dt.with_timezone(&Utc).format("%Y%m%dT%H%M%SZ").to_string(),
        RawTime::Floating(naive) => naive.format("%Y%m%dT%H%M%S").to_string(),
    }
}

/// Builds one generated occurrence from the master.
fn occurrence_record(master: &RawEventRecord, start: RawTime, uid: &str) -> RawEventRecord {
    let end = occurrence_end(master, &start);
    let key = raw_time_key(&start);
    let mut record = master.clone();
    record.native_id = Some(format!("{uid}#{key}"));
    record.start = start;
    record.end = end;
    record.rrule = None;
    record.exdates = Vec::new();
    record.original_start = None;
    record.series_seed = Some(uid.to_string());
    record
}

/// Re-keys an override so it carries the identity of the occurrence it
/// replaces; a moved occurrence then updates instead of inserting.
fn override_record(over: &RawEventRecord, uid: &str, original_key: &str) -> RawEventRecord {
    let mut record = (*over).clone();
    record.native_id = Some(format!("{uid}#{original_key}"));
    record.original_start = None;
    record.series_seed = Some(uid.to_string());
    record
}

fn occurrence_end(master: &RawEventRecord, start: &RawTime) -> RawTime {
    match (&master.start, &master.end, start) {
        (RawTime::Date(d_start), RawTime::Date(d_end), RawTime::Date(occ)) => {
            RawTime::Date(*occ + Duration::days((*d_end - *d_start).num_days()))
        }
        (RawTime::Floating(n_start), RawTime::Floating(n_end), RawTime::Floating(occ)) => {
            RawTime::Floating(*occ + (*n_end - *n_start))
        }
        (m_start, m_end, occ) => {
            let duration = raw_time_utc(m_end) - raw_time_utc(m_start);
            match occ {
                RawTime::Utc(dt) => RawTime::Utc(*dt + duration),
                RawTime::Offset(dt) => RawTime::Utc(dt.with_timezone(&Utc) + duration),
                RawTime::Floating(naive) => RawTime::Floating(*naive + duration),
                RawTime::Date(d) => RawTime::Date(*d + Duration::days(duration.num_days().max(1))),
            }
        }
    }
}

fn raw_time_utc(time: &RawTime) -> DateTime<Utc> {
    match time {
        RawTime::Utc(dt) => *dt,
        RawTime::Offset(dt) => dt.with_timezone(&Utc),
        RawTime::Floating(naive) => naive.and_utc(),
        RawTime::Date(d) => d.and_hms_opt(0, 0, 0).expect("valid time").and_utc(),
    }
}
