//! Overlap detection between work and personal records.
//!
//! Computes strict half-open interval intersections between the two
//! domains: records `w` and `p` conflict when `w.start < p.end` and
//! `p.start < w.end`. All-day records and zero-duration records never
//! participate.
//!
//! Both sides are sorted by start and swept with a merge-style pass. The
//! shared cursor only skips intervals that end before the current record
//! starts, so the pass stays near O(n + m + output) on realistic calendars
//! without ever enumerating the full cross product.

use chrono::{DateTime, Utc};

use calweave_core::{ConflictAnnotation, Domain, EventRecord};

/// Detects all work/personal overlaps between the two record sets.
///
/// Symmetric: swapping the arguments yields the same annotations, because
/// sides are labeled by each record's domain, not by argument position.
pub fn detect_overlaps(a: &[EventRecord], b: &[EventRecord]) -> Vec<ConflictAnnotation> {
    let left = timed_sorted(a);
    let right = timed_sorted(b);

    let mut out = Vec::new();
    let mut cursor = 0usize;

    for l in &left {
        let (l_start, l_end) = bounds(l);

        // Right-side records that ended before this (and every later) left
        // record starts can never conflict again.
        while cursor < right.len() && bounds(right[cursor]).1 <= l_start {
            cursor += 1;
        }

        let mut k = cursor;
        while k < right.len() {
            let r = right[k];
            let (r_start, r_end) = bounds(r);
            if r_start >= l_end {
                break;
            }
            if r_end > l_start && l.domain != r.domain {
                out.push(annotate(l, r, l_start.max(r_start), l_end.min(r_end)));
            }
            k += 1;
        }
    }

    out.sort_by(|x, y| {
        (x.start, &x.work_identity, &x.personal_identity)
            .cmp(&(y.start, &y.work_identity, &y.personal_identity))
    });
    out
}

fn timed_sorted(records: &[EventRecord]) -> Vec<&EventRecord> {
    let mut timed: Vec<&EventRecord> = records
        .iter()
        .filter(|r| !r.is_all_day && !r.is_zero_duration())
        .collect();
    timed.sort_by_key(|r| r.start.to_utc());
    timed
}

fn bounds(record: &EventRecord) -> (DateTime<Utc>, DateTime<Utc>) {
    (record.start.to_utc(), record.end.to_utc())
}

fn annotate(
    l: &EventRecord,
    r: &EventRecord,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> ConflictAnnotation {
    let (work, personal) = if l.domain == Domain::Work { (l, r) } else { (r, l) };
    ConflictAnnotation {
        work_identity: work.identity.clone(),
        personal_identity: personal.identity.clone(),
        start,
        end,
    }
}
