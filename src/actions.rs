use std::collections::HashMap;

use chrono::{Duration, NaiveDateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::allocation::{
    self, AllocationConfig, InstalledEquipment, MeetingDemand, RoomProfile,
};
use crate::models::{self, BookingStatus, RequestStatus};

type DbError = Box<dyn std::error::Error + Send + Sync>;

pub fn insert_new_user(conn: &mut PgConnection, uid: &str) -> Result<models::User, DbError> {
    use crate::schema::users::dsl::users;

    let new_user = models::User {
        user_id: uid.to_owned(),
    };

    diesel::insert_into(users).values(&new_user).execute(conn)?;

    Ok(new_user)
}

pub fn count_existing_users(conn: &mut PgConnection, ids: &[String]) -> Result<i64, DbError> {
    use crate::schema::users::dsl::{user_id, users};

    let count = users
        .filter(user_id.eq_any(ids))
        .count()
        .get_result(conn)?;

    Ok(count)
}

pub fn create_room(conn: &mut PgConnection, form: &models::NewRoom) -> Result<models::Room, DbError> {
    use crate::schema::rooms::dsl::rooms;

    let record = models::NewRoomRecord {
        room_id: Uuid::new_v4().to_string(),
        name: form.name.clone(),
        capacity: form.capacity,
        hourly_rate: form.hourly_rate,
        location: form.location.clone(),
    };

    // Room names are unique; a duplicate surfaces as a UniqueViolation the
    // handler maps to a conflict response.
    diesel::insert_into(rooms).values(&record).execute(conn)?;

    get_room_record(conn, &record.room_id)
}

fn get_room_record(conn: &mut PgConnection, id: &str) -> Result<models::Room, DbError> {
    use crate::schema::rooms::dsl::rooms;

    let room = rooms.find(id).first::<models::Room>(conn)?;

    Ok(room)
}

pub fn create_equipment(
    conn: &mut PgConnection,
    form: &models::NewEquipment,
) -> Result<models::Equipment, DbError> {
    use crate::schema::equipment::dsl::equipment;

    let record = models::NewEquipmentRecord {
        equipment_id: Uuid::new_v4().to_string(),
        name: form.name.clone(),
    };

    diesel::insert_into(equipment).values(&record).execute(conn)?;

    let created = equipment
        .find(&record.equipment_id)
        .first::<models::Equipment>(conn)?;

    Ok(created)
}

pub fn list_equipment(conn: &mut PgConnection) -> Result<Vec<models::Equipment>, DbError> {
    use crate::schema::equipment::dsl::equipment;

    let all = equipment.load::<models::Equipment>(conn)?;

    Ok(all)
}

pub fn create_room_equipment(
    conn: &mut PgConnection,
    form: &models::NewRoomEquipment,
) -> Result<models::RoomEquipmentLink, DbError> {
    use crate::schema::equipment::dsl::equipment;
    use crate::schema::room_equipment::dsl::room_equipment;
    use crate::schema::rooms::dsl::rooms;

    let room_exists = rooms
        .find(&form.room_id)
        .first::<models::Room>(conn)
        .optional()?;
    if room_exists.is_none() {
        return Err(format!("Room with id {} does not exist", form.room_id).into());
    }

    let equipment_exists = equipment
        .find(&form.equipment_id)
        .first::<models::Equipment>(conn)
        .optional()?;
    if equipment_exists.is_none() {
        return Err(format!("Equipment with id {} does not exist", form.equipment_id).into());
    }

    let link = models::RoomEquipmentLink {
        link_id: Uuid::new_v4().to_string(),
        room_id: form.room_id.clone(),
        equipment_id: form.equipment_id.clone(),
    };

    diesel::insert_into(room_equipment).values(&link).execute(conn)?;

    Ok(link)
}

/// Loads the full room catalogue with equipment links, one consistent
/// snapshot per allocation call. Links whose equipment row has been deleted
/// still carry their id.
pub fn load_room_catalogue(conn: &mut PgConnection) -> Result<Vec<RoomProfile>, DbError> {
    use crate::schema::equipment;
    use crate::schema::room_equipment;
    use crate::schema::rooms::dsl::rooms;

    let all_rooms = rooms.load::<models::Room>(conn)?;

    let links: Vec<(models::RoomEquipmentLink, Option<models::Equipment>)> = room_equipment::table
        .left_join(equipment::table)
        .load(conn)?;

    let mut by_room: HashMap<String, Vec<InstalledEquipment>> = HashMap::new();
    for (link, eq) in links {
        by_room.entry(link.room_id.clone()).or_default().push(InstalledEquipment {
            link_id: link.link_id,
            equipment_id: link.equipment_id,
            equipment: eq,
        });
    }

    Ok(all_rooms
        .into_iter()
        .map(|room| {
            let equipment = by_room.remove(&room.room_id).unwrap_or_default();
            RoomProfile { room, equipment }
        })
        .collect())
}

pub fn get_room(conn: &mut PgConnection, id: &str) -> Result<RoomProfile, DbError> {
    use crate::schema::equipment;
    use crate::schema::room_equipment;

    let room = get_room_record(conn, id)?;

    let links: Vec<(models::RoomEquipmentLink, Option<models::Equipment>)> = room_equipment::table
        .filter(room_equipment::room_id.eq(id))
        .left_join(equipment::table)
        .load(conn)?;

    Ok(RoomProfile {
        room,
        equipment: links
            .into_iter()
            .map(|(link, eq)| InstalledEquipment {
                link_id: link.link_id,
                equipment_id: link.equipment_id,
                equipment: eq,
            })
            .collect(),
    })
}

pub fn get_meeting_request(
    conn: &mut PgConnection,
    id: &str,
) -> Result<models::MeetingRequest, DbError> {
    use crate::schema::meeting_requests::dsl::meeting_requests;

    let request = meeting_requests.find(id).first::<models::MeetingRequest>(conn)?;

    Ok(request)
}

pub fn load_confirmed_bookings(conn: &mut PgConnection) -> Result<Vec<models::Booking>, DbError> {
    use crate::schema::bookings::dsl::{bookings, status};

    let confirmed = bookings
        .filter(status.eq(BookingStatus::Confirmed))
        .load::<models::Booking>(conn)?;

    Ok(confirmed)
}

pub fn get_booking(conn: &mut PgConnection, id: &str) -> Result<models::Booking, DbError> {
    use crate::schema::bookings::dsl::bookings;

    let booking = bookings.find(id).first::<models::Booking>(conn)?;

    Ok(booking)
}

pub fn list_bookings(
    conn: &mut PgConnection,
    room: Option<&str>,
    wanted_status: Option<BookingStatus>,
    range: Option<(NaiveDateTime, NaiveDateTime)>,
) -> Result<Vec<models::Booking>, DbError> {
    use crate::schema::bookings::dsl::{bookings, room_id, start_at, status};

    let mut query = bookings.into_boxed();

    if let Some(room) = room {
        query = query.filter(room_id.eq(room.to_owned()));
    }
    if let Some(wanted) = wanted_status {
        query = query.filter(status.eq(wanted));
    }
    if let Some((from, to)) = range {
        query = query.filter(start_at.ge(from)).filter(start_at.le(to));
    }

    let found = query.order(start_at.desc()).load::<models::Booking>(conn)?;

    Ok(found)
}

/// The allocation orchestrator. Validates attendees, persists the pending
/// request, then tries the preferred time against a single room/booking
/// snapshot and falls back to the alternative search. The pending request is
/// deliberately not rolled back when a later step fails; a request without a
/// booking is a valid pending state.
pub fn create_meeting_request(
    conn: &mut PgConnection,
    config: &AllocationConfig,
    data: &models::MeetingRequestData,
) -> Result<models::AllocationOutcome, DbError> {
    use crate::schema::meeting_requests::dsl::{meeting_requests, status as request_status};

    // Step 1: every attendee must exist before anything is written.
    let existing = count_existing_users(conn, &data.attendees)?;
    if existing != data.attendees.len() as i64 {
        return Ok(models::AllocationOutcome::InvalidAttendees {
            success: false,
            message: "Some attendees do not exist".to_string(),
            invalid_attendees: data.attendees.len() - existing as usize,
        });
    }

    // Step 2: persist the request as pending.
    let request = models::NewMeetingRequest {
        request_id: Uuid::new_v4().to_string(),
        organizer_id: data.organizer_id.clone(),
        duration_minutes: data.duration,
        required_equipment: data.required_equipment.clone(),
        preferred_start: data.preferred_start,
        flexibility_minutes: data.flexibility,
        priority: data.priority.clone(),
        attendees: data.attendees.clone(),
        status: RequestStatus::Pending,
    };
    diesel::insert_into(meeting_requests).values(&request).execute(conn)?;
    log::info!("meeting request {} created", request.request_id);

    // Steps 3 and 4: one snapshot of rooms and confirmed bookings for the
    // whole search.
    let all_rooms = load_room_catalogue(conn)?;
    let existing_bookings = load_confirmed_bookings(conn)?;
    log::info!(
        "snapshot loaded: {} rooms, {} confirmed bookings",
        all_rooms.len(),
        existing_bookings.len()
    );

    let demand = MeetingDemand {
        duration_minutes: data.duration,
        required_equipment: data.required_equipment.clone(),
        preferred_start: data.preferred_start,
        flexibility_minutes: data.flexibility,
        attendee_count: data.attendees.len() as i32,
    };

    // Step 5: preferred-time path.
    let available = allocation::find_available_rooms(
        config,
        data.preferred_start,
        &demand,
        &all_rooms,
        &existing_bookings,
    );

    if let Some(best) = available.first() {
        let start_at = data.preferred_start;
        let end_at = start_at + Duration::minutes(i64::from(data.duration));
        log::info!("booking room {} at preferred time {}", best.room.display_name(), start_at);

        let booking = confirm_booking(conn, &request.request_id, best, start_at, end_at, &data.attendees)?;

        return Ok(models::AllocationOutcome::Booked {
            success: true,
            message: "Meeting room booked successfully".to_string(),
            booking: models::BookedMeeting {
                id: booking.booking_id,
                room: models::RoomSummary {
                    id: best.room.room_id.clone(),
                    name: best.room.display_name(),
                    capacity: best.room.capacity,
                    location: best.room.location.clone(),
                },
                start_at,
                end_at,
                attendees: data.attendees.len(),
            },
        });
    }

    // No room at the preferred instant: search the window instead. The
    // request stays pending for manual review, never auto-rejected.
    log::info!("no room available at preferred time, searching alternatives");
    let alternatives = allocation::find_alternatives(config, &demand, &all_rooms, &existing_bookings);
    log::info!("found {} alternative options", alternatives.len());

    diesel::update(meeting_requests.find(&request.request_id))
        .set(request_status.eq(RequestStatus::Pending))
        .execute(conn)?;

    Ok(models::AllocationOutcome::Alternatives {
        success: false,
        message: "No room available at preferred time. Please review alternatives.".to_string(),
        alternatives,
        meeting_request: models::PendingRequestRef {
            id: request.request_id,
            preferred_start: data.preferred_start,
            duration: data.duration,
            attendees: data.attendees.len(),
        },
    })
}

fn confirm_booking(
    conn: &mut PgConnection,
    request_id: &str,
    room: &RoomProfile,
    start_at: NaiveDateTime,
    end_at: NaiveDateTime,
    attendees: &[String],
) -> Result<models::Booking, DbError> {
    use crate::schema::booking_attendees::dsl::booking_attendees;
    use crate::schema::bookings::dsl::bookings;
    use crate::schema::meeting_requests::dsl::{meeting_requests, status as request_status};

    conn.transaction(|conn| {
        let new_booking = models::NewBooking {
            booking_id: Uuid::new_v4().to_string(),
            meeting_request_id: request_id.to_owned(),
            room_id: Some(room.room.room_id.clone()),
            start_at,
            end_at,
            status: BookingStatus::Confirmed,
        };
        diesel::insert_into(bookings).values(&new_booking).execute(conn)?;

        let attendee_rows: Vec<models::BookingAttendee> = attendees
            .iter()
            .map(|uid| models::BookingAttendee {
                attendee_id: Uuid::new_v4().to_string(),
                booking_id: new_booking.booking_id.clone(),
                user_id: uid.clone(),
            })
            .collect();
        diesel::insert_into(booking_attendees).values(&attendee_rows).execute(conn)?;

        diesel::update(meeting_requests.find(request_id))
            .set(request_status.eq(RequestStatus::Approved))
            .execute(conn)?;

        let booking = bookings.find(&new_booking.booking_id).first::<models::Booking>(conn)?;

        Ok(booking)
    })
}

/// Why a booking cannot be checked in, if it cannot.
fn check_in_refusal(booking: &models::Booking) -> Option<&'static str> {
    if booking.status == BookingStatus::Cancelled {
        return Some("Booking is already cancelled");
    }
    if booking.checked_in_at.is_some() {
        return Some("Already checked in");
    }
    None
}

pub fn check_in_booking(
    conn: &mut PgConnection,
    id: &str,
) -> Result<models::CheckInResponse, DbError> {
    use crate::schema::bookings::dsl::{bookings, checked_in_at};

    let booking = bookings.find(id).first::<models::Booking>(conn).optional()?;

    let Some(booking) = booking else {
        return Ok(models::CheckInResponse {
            success: false,
            message: "Booking not found".to_string(),
            checked_in_at: None,
        });
    };

    if let Some(reason) = check_in_refusal(&booking) {
        return Ok(models::CheckInResponse {
            success: false,
            message: reason.to_string(),
            checked_in_at: None,
        });
    }

    let now = Utc::now().naive_utc();
    diesel::update(bookings.find(id))
        .set(checked_in_at.eq(Some(now)))
        .execute(conn)?;

    Ok(models::CheckInResponse {
        success: true,
        message: "Checked in successfully".to_string(),
        checked_in_at: Some(now),
    })
}

/// Whether a confirmed booking has gone unclaimed past the release cutoff.
/// Releasing flips it to cancelled, so a second sweep never picks it again.
fn release_eligible(booking: &models::Booking, cutoff: NaiveDateTime) -> bool {
    booking.status == BookingStatus::Confirmed
        && booking.checked_in_at.is_none()
        && booking.start_at <= cutoff
}

/// Cancels every confirmed booking whose start is at least the grace period
/// in the past and which was never checked in. Safe to re-run; a second pass
/// finds nothing.
pub fn auto_release_unused_bookings(
    conn: &mut PgConnection,
    config: &AllocationConfig,
) -> Result<models::ReleaseReport, DbError> {
    use crate::schema::bookings::dsl::{booking_id, bookings, status};

    let now = Utc::now().naive_utc();
    let cutoff = now - Duration::minutes(config.release_grace_minutes);

    let released = conn.transaction(|conn| {
        let candidates = bookings
            .filter(status.eq(BookingStatus::Confirmed))
            .load::<models::Booking>(conn)?;

        let expired: Vec<String> = candidates
            .iter()
            .filter(|b| release_eligible(b, cutoff))
            .map(|b| b.booking_id.clone())
            .collect();

        if expired.is_empty() {
            return Ok::<usize, DbError>(0);
        }

        let updated = diesel::update(bookings.filter(booking_id.eq_any(expired)))
            .set(status.eq(BookingStatus::Cancelled))
            .execute(conn)?;

        Ok(updated)
    })?;

    log::info!("auto-released {} unused bookings", released);

    Ok(models::ReleaseReport {
        released,
        timestamp: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn booking(status: BookingStatus, checked_in: bool) -> models::Booking {
        let start = NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        models::Booking {
            booking_id: "b1".to_string(),
            meeting_request_id: "r1".to_string(),
            room_id: Some("room1".to_string()),
            start_at: start,
            end_at: start + Duration::minutes(30),
            status,
            checked_in_at: checked_in.then(|| start + Duration::minutes(2)),
            created_at: None,
        }
    }

    #[test]
    fn cancelled_booking_cannot_check_in() {
        let refusal = check_in_refusal(&booking(BookingStatus::Cancelled, false));
        assert_eq!(refusal, Some("Booking is already cancelled"));
    }

    #[test]
    fn second_check_in_is_refused() {
        let refusal = check_in_refusal(&booking(BookingStatus::Confirmed, true));
        assert_eq!(refusal, Some("Already checked in"));
    }

    #[test]
    fn fresh_confirmed_booking_checks_in() {
        assert_eq!(check_in_refusal(&booking(BookingStatus::Confirmed, false)), None);
    }

    #[test]
    fn checked_in_booking_is_never_released() {
        let b = booking(BookingStatus::Confirmed, true);
        let cutoff = b.start_at + Duration::minutes(60);
        assert!(!release_eligible(&b, cutoff));
    }

    #[test]
    fn cancelled_booking_is_not_released_again() {
        // A released booking is cancelled, so a second sweep skips it.
        let b = booking(BookingStatus::Cancelled, false);
        let cutoff = b.start_at + Duration::minutes(60);
        assert!(!release_eligible(&b, cutoff));
    }

    #[test]
    fn booking_started_exactly_at_cutoff_is_released() {
        let b = booking(BookingStatus::Confirmed, false);
        assert!(release_eligible(&b, b.start_at));
    }

    #[test]
    fn booking_inside_grace_window_is_kept() {
        // Cutoff one minute before the start: the grace period has not
        // elapsed yet.
        let b = booking(BookingStatus::Confirmed, false);
        assert!(!release_eligible(&b, b.start_at - Duration::minutes(1)));
    }
}
