//! Inactivity classifier
//!
//! Decides, from the last time a computer was seen, whether its status should
//! move. Pure: the reference instant is always passed in.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::models::{Device, TransitionProposal};
use crate::status::{DeviceStatus, TargetStatus};

const MS_PER_MINUTE: i64 = 60 * 1000;
const MS_PER_HOUR: i64 = 60 * MS_PER_MINUTE;
const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;

pub const DEACTIVATE_AFTER_DAYS: i64 = 30;
pub const LEAVE_AFTER_DAYS: i64 = 7;
pub const TRANSITION_AFTER_HOURS: i64 = 24;

// GLPI renvoie date_mod sans fuseau ("2025-03-01 08:00:00")
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Elapsed time since last activity, floored to whole units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inactivity {
    pub minutes: i64,
    pub hours: i64,
    pub days: i64,
}

impl Inactivity {
    pub fn between(last_seen: DateTime<Utc>, reference: DateTime<Utc>) -> Self {
        let elapsed_ms = (reference - last_seen).num_milliseconds();
        Self {
            minutes: elapsed_ms.div_euclid(MS_PER_MINUTE),
            hours: elapsed_ms.div_euclid(MS_PER_HOUR),
            days: elapsed_ms.div_euclid(MS_PER_DAY),
        }
    }

    /// Libellé court affiché dans les logs : `42min`, `5h`, `12j`.
    pub fn label(&self) -> String {
        if self.minutes < 60 {
            format!("{}min", self.minutes)
        } else if self.hours < 24 {
            format!("{}h", self.hours)
        } else {
            format!("{}j", self.days)
        }
    }
}

/// Parses a last-seen value. Returns `None` for absent or unreadable input,
/// never guesses.
pub fn parse_last_seen(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("n/a") {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Transition rules, first match wins. Boundaries belong to the larger bucket.
pub fn decide(current: DeviceStatus, inactivity: Inactivity) -> Option<(TargetStatus, String)> {
    if current.is_protected() {
        return None;
    }

    if inactivity.days >= DEACTIVATE_AFTER_DAYS {
        Some((
            TargetStatus::Deactivated,
            format!("inactive for {} days", inactivity.days),
        ))
    } else if inactivity.days >= LEAVE_AFTER_DAYS {
        Some((
            TargetStatus::OnLeave,
            format!("inactive for {} days", inactivity.days),
        ))
    } else if inactivity.hours >= TRANSITION_AFTER_HOURS {
        Some((
            TargetStatus::InTransition,
            format!("inactive for {} hours", inactivity.hours),
        ))
    } else if current != DeviceStatus::Assigned {
        // activité récente : retour à l'état normal
        Some((
            TargetStatus::Assigned,
            format!("inactive for {} hours", inactivity.hours),
        ))
    } else {
        None
    }
}

/// Classifies one device against `reference`.
///
/// Only computers with an assigned user are subject to inactivity demotion;
/// a missing or unparseable last-seen yields no proposal.
pub fn classify(device: &Device, reference: DateTime<Utc>) -> Option<TransitionProposal> {
    if !device.has_assigned_user() {
        return None;
    }

    let raw_last_seen = device.last_seen.as_deref()?;
    let last_seen = parse_last_seen(raw_last_seen)?;
    let current = device.current_status();
    let (target, reason) = decide(current, Inactivity::between(last_seen, reference))?;

    Some(TransitionProposal {
        device_id: device.id,
        device_name: device.name.clone(),
        last_seen: raw_last_seen.to_string(),
        current_status: current.label().to_string(),
        proposed_status: target.label().to_string(),
        reason,
        assigned_user: device.assigned_user.clone(),
    })
}
