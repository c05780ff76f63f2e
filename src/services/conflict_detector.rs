use std::cmp::Ordering;
use std::collections::HashMap;

use crate::models::event::{ExistingEvent, TimeRange};
use crate::models::intent::PriorityTier;
use crate::models::suggestion::{CandidateSlot, ConflictInfo, ConflictSeverity};

/// Severity of the overlap between `slot` and `event`, or `None` when they do not intersect.
///
/// A slot swallowed by the event is always hard. An event swallowed by the
/// slot is hard when it cannot yield: it is immovable or ranks at least as high
/// as the new event. Every other overlap is partial and therefore soft.
pub fn classify(
    slot: &TimeRange,
    event: &ExistingEvent,
    intent_priority: PriorityTier,
) -> Option<ConflictSeverity> {
    let interval = event.interval();
    if !slot.overlaps(&interval) {
        return None;
    }

    if interval.contains(slot) {
        return Some(ConflictSeverity::Hard);
    }

    if slot.contains(&interval) && (!event.movable || event.priority >= intent_priority) {
        return Some(ConflictSeverity::Hard);
    }

    Some(ConflictSeverity::Soft)
}

pub fn detect_conflicts(
    slot: &CandidateSlot,
    events: &[ExistingEvent],
    intent_priority: PriorityTier,
) -> Vec<ConflictInfo> {
    let interval = slot.interval();
    let mut conflicts: Vec<ConflictInfo> = events
        .iter()
        .filter_map(|event| {
            classify(&interval, event, intent_priority).map(|severity| ConflictInfo {
                event_id: event.id.clone(),
                event_title: event.title.clone(),
                event_start_at: event.start_at,
                event_end_at: event.end_at,
                severity,
                movable: event.movable,
                priority: event.priority,
                attendee_id: None,
            })
        })
        .collect();

    sort_conflicts(&mut conflicts);
    conflicts
}

/// Overlaps with the calendars of `attendees`.
///
/// The owner cannot relocate another person's events, so these are always
/// reported as immovable; containment either way makes them hard.
pub fn detect_attendee_conflicts(
    slot: &CandidateSlot,
    attendees: &[String],
    calendars: &HashMap<String, Vec<ExistingEvent>>,
) -> Vec<ConflictInfo> {
    let interval = slot.interval();
    let mut conflicts = Vec::new();
    for attendee in attendees {
        let Some(events) = calendars.get(attendee) else {
            continue;
        };
        for event in events {
            let other = event.interval();
            if !interval.overlaps(&other) {
                continue;
            }
            let severity = if other.contains(&interval) || interval.contains(&other) {
                ConflictSeverity::Hard
            } else {
                ConflictSeverity::Soft
            };
            conflicts.push(ConflictInfo {
                event_id: event.id.clone(),
                event_title: event.title.clone(),
                event_start_at: event.start_at,
                event_end_at: event.end_at,
                severity,
                movable: false,
                priority: event.priority,
                attendee_id: Some(attendee.clone()),
            });
        }
    }

    sort_conflicts(&mut conflicts);
    conflicts
}

/// Hard before soft, then by start time, then owner before attendees, then by id.
pub fn sort_conflicts(conflicts: &mut [ConflictInfo]) {
    conflicts.sort_by(compare_conflicts);
}

fn compare_conflicts(a: &ConflictInfo, b: &ConflictInfo) -> Ordering {
    a.severity
        .cmp(&b.severity)
        .then_with(|| a.event_start_at.cmp(&b.event_start_at))
        .then_with(|| a.attendee_id.cmp(&b.attendee_id))
        .then_with(|| a.event_id.cmp(&b.event_id))
}

/// True when no event in `events` intersects `range`, ignoring the ids in `skip`.
pub fn is_free(range: &TimeRange, events: &[ExistingEvent], skip: &[&str]) -> bool {
    events
        .iter()
        .filter(|event| !skip.contains(&event.id.as_str()))
        .all(|event| !range.overlaps(&event.interval()))
}
