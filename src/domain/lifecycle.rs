//! Lifecycle classification of memory records
//!
//! A pure, idempotent function of the record's timestamps, access count, and
//! a caller-supplied clock. Session-state records never pass through
//! RECENT/ARCHIVED/STALE; they stay ACTIVE for 48 hours from last access and
//! then become eligible for deletion.

use chrono::{DateTime, Duration, Utc};
use regex::RegexSet;
use std::sync::LazyLock;

use super::types::{ContextLevel, LifecycleState, MemoryCategory, MemoryRecord};

/// Inactivity window after which session-state records may be deleted
pub const SESSION_EXPIRY_HOURS: i64 = 48;

const ACTIVE_DAYS: i64 = 7;
const RECENT_DAYS: i64 = 30;
const ARCHIVED_DAYS: i64 = 180;

/// Minimum access count that exempts an old record from demotion to STALE
const LOW_TRAFFIC_THRESHOLD: u64 = 2;

/// Classify a record's lifecycle state at the given instant.
///
/// Idempotent: classifying the same record with the same clock always yields
/// the same state, and classifying an already-classified record changes
/// nothing else about it.
pub fn classify(record: &MemoryRecord, now: DateTime<Utc>) -> LifecycleState {
    if record.context_level == ContextLevel::SessionState {
        // Session records are ACTIVE until they expire outright; the sweep
        // in the facade deletes them, there is no archived tier.
        return LifecycleState::Active;
    }

    let idle = now - record.last_accessed_at;
    let age = now - record.created_at;

    if idle <= Duration::days(ACTIVE_DAYS) {
        LifecycleState::Active
    } else if idle <= Duration::days(RECENT_DAYS) {
        LifecycleState::Recent
    } else if idle <= Duration::days(ARCHIVED_DAYS) {
        // A record that never saw real traffic demotes straight to STALE
        // once it is old enough.
        if age > Duration::days(ARCHIVED_DAYS) && record.access_count < LOW_TRAFFIC_THRESHOLD {
            LifecycleState::Stale
        } else {
            LifecycleState::Archived
        }
    } else {
        LifecycleState::Stale
    }
}

/// Whether a session-state record is eligible for expiry at `now`
pub fn session_expired(record: &MemoryRecord, now: DateTime<Utc>) -> bool {
    record.context_level == ContextLevel::SessionState
        && now - record.last_accessed_at > Duration::hours(SESSION_EXPIRY_HOURS)
}

static PREFERENCE_HINTS: LazyLock<RegexSet> = LazyLock::new(|| {
    regex::RegexSetBuilder::new([
        r"\bi\s+(always\s+|usually\s+)?prefer\b",
        r"\bmy\s+(favorite|preferred)\b",
        r"\balways\s+use\b",
        r"\bnever\s+use\b",
        r"\bi\s+(like|love|hate|dislike)\b",
        r"\bplease\s+(always|never)\b",
        r"\bby\s+default\s+i\b",
    ])
    .case_insensitive(true)
    .build()
    .expect("preference hints compile")
});

static SESSION_HINTS: LazyLock<RegexSet> = LazyLock::new(|| {
    regex::RegexSetBuilder::new([
        r"\b(currently|right\s+now|at\s+the\s+moment)\b",
        r"\bthis\s+session\b",
        r"\btoday\s+(i|we)('m|'re|\s+am|\s+are)?\b",
        r"\bworking\s+on\s+(a\s+)?(fix|bug|branch|pr)\b",
        r"\bin\s+progress\b",
        r"\btemporar(y|ily)\b",
    ])
    .case_insensitive(true)
    .build()
    .expect("session hints compile")
});

/// Infer a context level from content and category.
///
/// A pure heuristic used when the caller passes `context_level = auto`.
/// Category carries more signal than phrasing, so it is consulted first;
/// anything unrecognized lands in project context.
pub fn infer_context_level(content: &str, category: MemoryCategory) -> ContextLevel {
    match category {
        MemoryCategory::Preference => ContextLevel::UserPreference,
        MemoryCategory::Code | MemoryCategory::Doc | MemoryCategory::Commit => {
            ContextLevel::ProjectContext
        }
        _ => {
            if PREFERENCE_HINTS.is_match(content) {
                ContextLevel::UserPreference
            } else if SESSION_HINTS.is_match(content) {
                ContextLevel::SessionState
            } else {
                ContextLevel::ProjectContext
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::MemoryCategory;

    fn record_accessed_days_ago(days: i64, now: DateTime<Utc>) -> MemoryRecord {
        let mut r = MemoryRecord::new("x", MemoryCategory::Fact);
        r.created_at = now - Duration::days(days + 1);
        r.updated_at = r.created_at;
        r.last_accessed_at = now - Duration::days(days);
        r.access_count = 5;
        r
    }

    #[test]
    fn age_tiers() {
        let now = Utc::now();
        assert_eq!(
            classify(&record_accessed_days_ago(1, now), now),
            LifecycleState::Active
        );
        assert_eq!(
            classify(&record_accessed_days_ago(10, now), now),
            LifecycleState::Recent
        );
        assert_eq!(
            classify(&record_accessed_days_ago(60, now), now),
            LifecycleState::Archived
        );
        assert_eq!(
            classify(&record_accessed_days_ago(365, now), now),
            LifecycleState::Stale
        );
    }

    #[test]
    fn low_traffic_demotes_early() {
        let now = Utc::now();
        let mut r = record_accessed_days_ago(60, now);
        r.created_at = now - Duration::days(200);
        r.access_count = 1;
        assert_eq!(classify(&r, now), LifecycleState::Stale);

        r.access_count = 2;
        assert_eq!(classify(&r, now), LifecycleState::Archived);
    }

    #[test]
    fn session_state_never_archives() {
        let now = Utc::now();
        let mut r = record_accessed_days_ago(90, now);
        r.context_level = ContextLevel::SessionState;
        assert_eq!(classify(&r, now), LifecycleState::Active);
        assert!(session_expired(&r, now));
    }

    #[test]
    fn session_expiry_boundary() {
        let now = Utc::now();
        let mut r = MemoryRecord::new("x", MemoryCategory::Context);
        r.context_level = ContextLevel::SessionState;
        r.last_accessed_at = now - Duration::hours(47);
        assert!(!session_expired(&r, now));

        r.last_accessed_at = now - Duration::hours(49);
        assert!(session_expired(&r, now));
    }

    #[test]
    fn classification_is_idempotent() {
        let now = Utc::now();
        let r = record_accessed_days_ago(45, now);
        let first = classify(&r, now);
        let second = classify(&r, now);
        assert_eq!(first, second);
    }

    #[test]
    fn context_level_inference() {
        assert_eq!(
            infer_context_level("anything", MemoryCategory::Preference),
            ContextLevel::UserPreference
        );
        assert_eq!(
            infer_context_level("I prefer Python for backend development", MemoryCategory::Fact),
            ContextLevel::UserPreference
        );
        assert_eq!(
            infer_context_level("currently working on a fix for the pool", MemoryCategory::Context),
            ContextLevel::SessionState
        );
        assert_eq!(
            infer_context_level("the API gateway talks to the billing service", MemoryCategory::Fact),
            ContextLevel::ProjectContext
        );
        assert_eq!(
            infer_context_level("anything", MemoryCategory::Code),
            ContextLevel::ProjectContext
        );
    }
}
