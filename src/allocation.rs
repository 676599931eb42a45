//! Pure room-allocation core: equipment matching, buffered availability,
//! candidate ranking, slot generation and alternative search. Everything in
//! this module is synchronous and side-effect-free over a room/booking
//! snapshot loaded once per allocation call; the I/O around it lives in
//! `actions`.

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;

use crate::models::{AlternativeOption, Booking, BookingStatus, Equipment, Room};

/// Tunables of the search, injected everywhere instead of hard-coded
/// literals so the buffer can be tuned without recompilation.
#[derive(Debug, Clone)]
pub struct AllocationConfig {
    /// Cleanup margin applied before and after a candidate interval when
    /// testing for conflicts.
    pub buffer_minutes: i64,
    /// Distance between probed start times.
    pub slot_step_minutes: i64,
    /// Floor on the search window even when the caller asks for less
    /// flexibility.
    pub min_search_window_minutes: i64,
    /// Extra reach past the window so buffer-adjacent slots stay probeable.
    pub window_padding_minutes: i64,
    /// Cap on the ranked alternative list.
    pub max_alternatives: usize,
    /// Minutes after start before an unclaimed confirmed booking is released.
    pub release_grace_minutes: i64,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            buffer_minutes: 15,
            slot_step_minutes: 15,
            min_search_window_minutes: 60,
            window_padding_minutes: 60,
            max_alternatives: 10,
            release_grace_minutes: 10,
        }
    }
}

impl AllocationConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            buffer_minutes: env_i64("CLEANUP_BUFFER_MINUTES", defaults.buffer_minutes),
            slot_step_minutes: env_i64("SLOT_STEP_MINUTES", defaults.slot_step_minutes),
            min_search_window_minutes: env_i64(
                "MIN_SEARCH_WINDOW_MINUTES",
                defaults.min_search_window_minutes,
            ),
            window_padding_minutes: env_i64(
                "WINDOW_PADDING_MINUTES",
                defaults.window_padding_minutes,
            ),
            max_alternatives: env_i64("MAX_ALTERNATIVES", defaults.max_alternatives as i64)
                as usize,
            release_grace_minutes: env_i64(
                "RELEASE_GRACE_MINUTES",
                defaults.release_grace_minutes,
            ),
        }
    }
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// One equipment installation in a room. The joined `equipment` row may be
/// gone; matching goes by `equipment_id` and never dereferences it.
#[derive(Debug, Clone, Serialize)]
pub struct InstalledEquipment {
    pub link_id: String,
    pub equipment_id: String,
    pub equipment: Option<Equipment>,
}

/// A room together with its equipment links, as loaded in the per-call
/// snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct RoomProfile {
    #[serde(flatten)]
    pub room: Room,
    pub equipment: Vec<InstalledEquipment>,
}

/// The parts of a meeting request the search needs.
#[derive(Debug, Clone)]
pub struct MeetingDemand {
    pub duration_minutes: i32,
    pub required_equipment: Vec<String>,
    pub preferred_start: NaiveDateTime,
    pub flexibility_minutes: i32,
    pub attendee_count: i32,
}

/// Set-containment check: every required equipment id must appear among the
/// room's links. An empty requirement always passes.
pub fn has_required_equipment(room: &RoomProfile, required_equipment_ids: &[String]) -> bool {
    if required_equipment_ids.is_empty() {
        return true;
    }

    required_equipment_ids.iter().all(|required| {
        room.equipment
            .iter()
            .any(|link| link.equipment_id == *required)
    })
}

/// Buffered non-overlap check against every confirmed booking of the same
/// room, using half-open intervals: a booking conflicts iff
/// `booking.start < buffered_end && booking.end > buffered_start`.
pub fn is_room_available(
    config: &AllocationConfig,
    room: &RoomProfile,
    start_at: NaiveDateTime,
    duration_minutes: i32,
    existing_bookings: &[Booking],
) -> bool {
    let end_at = start_at + Duration::minutes(i64::from(duration_minutes));
    let buffered_start = start_at - Duration::minutes(config.buffer_minutes);
    let buffered_end = end_at + Duration::minutes(config.buffer_minutes);

    let has_conflict = existing_bookings.iter().any(|booking| {
        match &booking.room_id {
            Some(room_id) if *room_id == room.room.room_id => {}
            // Bookings without a room never conflict.
            _ => return false,
        }
        if booking.status != BookingStatus::Confirmed {
            return false;
        }
        booking.start_at < buffered_end && booking.end_at > buffered_start
    });

    !has_conflict
}

/// Rooms usable at one instant, ordered tightest capacity fit first and
/// cheapest hourly rate on ties. The head of this list is "the best room".
pub fn find_available_rooms<'a>(
    config: &AllocationConfig,
    start_at: NaiveDateTime,
    demand: &MeetingDemand,
    all_rooms: &'a [RoomProfile],
    existing_bookings: &[Booking],
) -> Vec<&'a RoomProfile> {
    let mut available: Vec<&RoomProfile> = all_rooms
        .iter()
        .filter(|room| {
            let has_capacity = room.room.capacity >= demand.attendee_count;
            let has_equipment = has_required_equipment(room, &demand.required_equipment);
            let is_free = is_room_available(
                config,
                room,
                start_at,
                demand.duration_minutes,
                existing_bookings,
            );

            if !has_capacity {
                log::debug!(
                    "room {}: insufficient capacity ({} < {})",
                    room.room.display_name(),
                    room.room.capacity,
                    demand.attendee_count
                );
            }
            if !has_equipment {
                log::debug!("room {}: missing required equipment", room.room.display_name());
            }
            if !is_free {
                log::debug!("room {}: not available at {}", room.room.display_name(), start_at);
            }

            has_capacity && has_equipment && is_free
        })
        .collect();

    available.sort_by(|a, b| {
        let fit_a = a.room.capacity - demand.attendee_count;
        let fit_b = b.room.capacity - demand.attendee_count;
        fit_a
            .cmp(&fit_b)
            .then_with(|| a.room.hourly_rate.total_cmp(&b.room.hourly_rate))
    });

    available
}

/// Candidate start times around the preferred instant: the preferred instant
/// itself, then earlier slots nearest-first, then later slots nearest-first,
/// stepping by `slot_step_minutes` out to the extended window. The window is
/// widened past the raw flexibility so buffer-adjacent slots stay reachable.
pub fn generate_time_slots(
    config: &AllocationConfig,
    preferred_start: NaiveDateTime,
    flexibility_minutes: i32,
) -> Vec<NaiveDateTime> {
    let step = config.slot_step_minutes;
    let search_window = i64::from(flexibility_minutes).max(config.min_search_window_minutes);
    let extended_window = search_window + config.buffer_minutes + config.window_padding_minutes;

    let mut slots = Vec::new();

    let mut offset = step;
    while offset <= extended_window {
        slots.push(preferred_start - Duration::minutes(offset));
        offset += step;
    }

    // Preferred time goes first, always.
    slots.insert(0, preferred_start);

    let mut offset = step;
    while offset <= extended_window {
        slots.push(preferred_start + Duration::minutes(offset));
        offset += step;
    }

    log::debug!(
        "generated {} time slots ({}min extended window)",
        slots.len(),
        extended_window
    );

    slots
}

/// Brute-force search over every generated slot and every qualifying room.
/// Results are ranked ascending by (time shift, hourly rate, capacity slack)
/// and truncated to `max_alternatives`. An empty result is a valid outcome.
pub fn find_alternatives(
    config: &AllocationConfig,
    demand: &MeetingDemand,
    all_rooms: &[RoomProfile],
    existing_bookings: &[Booking],
) -> Vec<AlternativeOption> {
    let time_slots = generate_time_slots(config, demand.preferred_start, demand.flexibility_minutes);

    log::debug!(
        "searching alternatives across {} rooms avoiding {} bookings",
        all_rooms.len(),
        existing_bookings.len()
    );

    // Baseline for the cost-saved estimate: the priciest room in the
    // catalogue. Not clamped if a rate ever exceeds it.
    let max_room_rate = all_rooms
        .iter()
        .map(|r| r.room.hourly_rate)
        .max_by(f64::total_cmp)
        .unwrap_or(0.0);

    let mut alternatives = Vec::new();

    for time_slot in &time_slots {
        let available = find_available_rooms(config, *time_slot, demand, all_rooms, existing_bookings);

        for room in available {
            let shift = time_slot
                .signed_duration_since(demand.preferred_start)
                .num_minutes();
            let cost_saved =
                (max_room_rate - room.room.hourly_rate) * f64::from(demand.duration_minutes) / 60.0;

            alternatives.push(AlternativeOption {
                room_id: room.room.room_id.clone(),
                room_name: room.room.display_name(),
                capacity: room.room.capacity,
                hourly_rate: room.room.hourly_rate,
                location: room.room.location.clone(),
                suggested_start: *time_slot,
                suggested_end: *time_slot + Duration::minutes(i64::from(demand.duration_minutes)),
                cost_saved: (cost_saved * 100.0).round() / 100.0,
                time_shift: shift.abs(),
            });
        }
    }

    log::debug!(
        "checked {} time slots, collected {} room-time combinations",
        time_slots.len(),
        alternatives.len()
    );

    alternatives.sort_by(|a, b| {
        a.time_shift
            .cmp(&b.time_shift)
            .then_with(|| a.hourly_rate.total_cmp(&b.hourly_rate))
            .then_with(|| {
                (a.capacity - demand.attendee_count).cmp(&(b.capacity - demand.attendee_count))
            })
    });
    alternatives.truncate(config.max_alternatives);

    alternatives
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn cfg() -> AllocationConfig {
        AllocationConfig::default()
    }

    fn at(hour: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(hour, min, 0)
            .unwrap()
    }

    fn room(id: &str, capacity: i32, hourly_rate: f64, equipment_ids: &[&str]) -> RoomProfile {
        RoomProfile {
            room: Room {
                room_id: id.to_string(),
                name: Some(format!("room-{id}")),
                capacity,
                hourly_rate,
                location: None,
                created_at: None,
            },
            equipment: equipment_ids
                .iter()
                .enumerate()
                .map(|(i, eq)| InstalledEquipment {
                    link_id: format!("{id}-link-{i}"),
                    equipment_id: (*eq).to_string(),
                    equipment: None,
                })
                .collect(),
        }
    }

    fn confirmed(room_id: &str, start: NaiveDateTime, end: NaiveDateTime) -> Booking {
        Booking {
            booking_id: format!("b-{room_id}-{start}"),
            meeting_request_id: "req".to_string(),
            room_id: Some(room_id.to_string()),
            start_at: start,
            end_at: end,
            status: BookingStatus::Confirmed,
            checked_in_at: None,
            created_at: None,
        }
    }

    fn demand(attendees: i32, duration: i32, preferred: NaiveDateTime, flex: i32) -> MeetingDemand {
        MeetingDemand {
            duration_minutes: duration,
            required_equipment: vec![],
            preferred_start: preferred,
            flexibility_minutes: flex,
            attendee_count: attendees,
        }
    }

    #[test]
    fn empty_requirement_always_matches() {
        let r = room("a", 4, 10.0, &[]);
        assert!(has_required_equipment(&r, &[]));
    }

    #[test]
    fn requirement_is_set_containment() {
        let r = room("a", 4, 10.0, &["projector", "whiteboard"]);
        assert!(has_required_equipment(&r, &["projector".to_string()]));
        assert!(has_required_equipment(
            &r,
            &["whiteboard".to_string(), "projector".to_string()]
        ));
        assert!(!has_required_equipment(
            &r,
            &["projector".to_string(), "video".to_string()]
        ));
    }

    #[test]
    fn dangling_equipment_link_still_counts_by_id() {
        // The joined equipment row is gone but the link carries the id.
        let r = room("a", 4, 10.0, &["projector"]);
        assert!(r.equipment[0].equipment.is_none());
        assert!(has_required_equipment(&r, &["projector".to_string()]));
    }

    #[test]
    fn availability_honours_buffer_on_both_sides() {
        let r = room("a", 4, 10.0, &[]);
        // Booking 10:00-11:00; buffered candidate must clear it by 15 min.
        let bookings = vec![confirmed("a", at(10, 0), at(11, 0))];

        // 11:15 start: buffered start is 11:00, booking end is 11:00; strict
        // half-open comparison means no overlap.
        assert!(is_room_available(&cfg(), &r, at(11, 15), 30, &bookings));
        // One minute earlier and the buffer reaches into the booking.
        assert!(!is_room_available(&cfg(), &r, at(11, 14), 30, &bookings));

        // Mirror case before the booking: 30-minute meeting must end by 9:45
        // so its buffered end 10:00 just touches the booking start.
        assert!(is_room_available(&cfg(), &r, at(9, 15), 30, &bookings));
        assert!(!is_room_available(&cfg(), &r, at(9, 16), 30, &bookings));
    }

    #[test]
    fn bookings_on_other_rooms_or_roomless_never_conflict() {
        let r = room("a", 4, 10.0, &[]);
        let mut other = confirmed("b", at(10, 0), at(11, 0));
        let mut roomless = confirmed("a", at(10, 0), at(11, 0));
        roomless.room_id = None;
        let mut cancelled = confirmed("a", at(10, 0), at(11, 0));
        cancelled.status = BookingStatus::Cancelled;
        other.booking_id = "other".to_string();

        assert!(is_room_available(
            &cfg(),
            &r,
            at(10, 0),
            60,
            &[other, roomless, cancelled]
        ));
    }

    #[test]
    fn filter_never_returns_undersized_rooms() {
        let rooms = vec![room("small", 2, 5.0, &[]), room("big", 10, 20.0, &[])];
        let d = demand(5, 30, at(9, 0), 0);

        let found = find_available_rooms(&cfg(), at(9, 0), &d, &rooms, &[]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].room.room_id, "big");
    }

    #[test]
    fn filter_prefers_tightest_fit_then_cheapest() {
        let rooms = vec![
            room("oversized", 20, 10.0, &[]),
            room("tight-pricey", 6, 50.0, &[]),
            room("tight-cheap", 6, 30.0, &[]),
        ];
        let d = demand(5, 30, at(9, 0), 0);

        let found = find_available_rooms(&cfg(), at(9, 0), &d, &rooms, &[]);
        let order: Vec<&str> = found.iter().map(|r| r.room.room_id.as_str()).collect();
        assert_eq!(order, vec!["tight-cheap", "tight-pricey", "oversized"]);
    }

    #[test]
    fn filter_applies_equipment_constraint() {
        let rooms = vec![room("bare", 10, 5.0, &[]), room("kitted", 10, 25.0, &["tv"])];
        let mut d = demand(4, 30, at(9, 0), 0);
        d.required_equipment = vec!["tv".to_string()];

        let found = find_available_rooms(&cfg(), at(9, 0), &d, &rooms, &[]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].room.room_id, "kitted");
    }

    #[test]
    fn slots_start_with_preferred_and_cover_extended_window() {
        let preferred = at(12, 0);
        let slots = generate_time_slots(&cfg(), preferred, 0);

        // extended window = max(0, 60) + 15 + 60 = 135 -> 9 slots per side.
        assert_eq!(slots.len(), 19);
        assert_eq!(slots[0], preferred);
        assert_eq!(slots[1], at(11, 45));
        assert_eq!(slots[9], at(9, 45));
        assert_eq!(slots[10], at(12, 15));
        assert_eq!(slots[18], at(14, 15));
    }

    #[test]
    fn slot_window_grows_with_flexibility() {
        let slots = generate_time_slots(&cfg(), at(12, 0), 120);
        // extended window = 120 + 15 + 60 = 195 -> 13 per side.
        assert_eq!(slots.len(), 27);
        assert_eq!(*slots.last().unwrap(), at(15, 15));
    }

    #[test]
    fn alternatives_are_ranked_and_capped() {
        // Two rooms, both fully free: every slot yields two options, so the
        // cap and the ordering are both exercised.
        let rooms = vec![room("cheap", 6, 10.0, &[]), room("pricey", 6, 40.0, &[])];
        let d = demand(4, 30, at(12, 0), 0);

        let alts = find_alternatives(&cfg(), &d, &rooms, &[]);
        assert_eq!(alts.len(), 10);

        // Lexicographic (time_shift, hourly_rate, slack) never decreases.
        for pair in alts.windows(2) {
            let a = &pair[0];
            let b = &pair[1];
            assert!(
                (a.time_shift, a.hourly_rate, a.capacity)
                    <= (b.time_shift, b.hourly_rate, b.capacity)
            );
        }

        // Preferred slot first, cheaper room first within the slot.
        assert_eq!(alts[0].time_shift, 0);
        assert_eq!(alts[0].room_id, "cheap");
        assert_eq!(alts[1].time_shift, 0);
        assert_eq!(alts[1].room_id, "pricey");
        assert_eq!(alts[2].time_shift, 15);
    }

    #[test]
    fn cost_saved_is_relative_to_priciest_room() {
        let rooms = vec![room("cheap", 6, 10.0, &[]), room("pricey", 6, 40.0, &[])];
        let d = demand(4, 30, at(12, 0), 0);

        let alts = find_alternatives(&cfg(), &d, &rooms, &[]);
        let cheap = alts.iter().find(|a| a.room_id == "cheap").unwrap();
        let pricey = alts.iter().find(|a| a.room_id == "pricey").unwrap();

        // (40 - 10) * 30 / 60 = 15.00 against the pricier baseline.
        assert_eq!(cheap.cost_saved, 15.0);
        assert_eq!(pricey.cost_saved, 0.0);
        assert_eq!(cheap.suggested_end - cheap.suggested_start, Duration::minutes(30));
    }

    #[test]
    fn no_viable_slot_yields_empty_list() {
        let rooms = vec![room("a", 2, 10.0, &[])];
        let d = demand(5, 30, at(12, 0), 0);

        assert!(find_alternatives(&cfg(), &d, &rooms, &[]).is_empty());
    }

    #[test]
    fn nearest_slot_clearing_the_buffer_wins() {
        // Booking [11:50, 12:20) around a 12:00 request for 30 minutes.
        // Later side: earliest start with buffered start >= 12:20 + 15 is
        // 12:45 on the 15-minute grid. Earlier side: meeting must end by
        // 11:35, so start 11:05 -> grid slot 11:00, shift 60. The +45 shift
        // wins.
        let rooms = vec![room("a", 6, 10.0, &[])];
        let bookings = vec![confirmed("a", at(11, 50), at(12, 20))];
        let d = demand(4, 30, at(12, 0), 0);

        let alts = find_alternatives(&cfg(), &d, &rooms, &bookings);
        assert!(!alts.is_empty());
        assert_eq!(alts[0].suggested_start, at(12, 45));
        assert_eq!(alts[0].time_shift, 45);
    }
}
