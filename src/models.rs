use serde::{Deserialize, Serialize};
use crate::schema::{booking_attendees, bookings, equipment, meeting_requests, room_equipment, rooms, users};
use chrono::NaiveDateTime;
use diesel::{deserialize::{self, FromSql}, pg::{Pg, PgValue}, serialize::{self, Output, ToSql}, sql_types::Text, Insertable, Selectable};

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize, Selectable)]
#[diesel(table_name = users)]
pub struct User {
    pub user_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = crate::schema::sql_types::BookingStatus)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
}

impl ToSql<crate::schema::sql_types::BookingStatus, Pg> for BookingStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        let s = match *self {
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
        };
        <str as ToSql<Text, Pg>>::to_sql(s, out)
    }
}

impl FromSql<crate::schema::sql_types::BookingStatus, Pg> for BookingStatus {
    fn from_sql(bytes: PgValue) -> deserialize::Result<Self> {
        match <String as FromSql<Text, Pg>>::from_sql(bytes)?.as_str() {
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            s => Err(format!("Unrecognized booking status: {}", s).into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = crate::schema::sql_types::RequestStatus)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl ToSql<crate::schema::sql_types::RequestStatus, Pg> for RequestStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        let s = match *self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        };
        <str as ToSql<Text, Pg>>::to_sql(s, out)
    }
}

impl FromSql<crate::schema::sql_types::RequestStatus, Pg> for RequestStatus {
    fn from_sql(bytes: PgValue) -> deserialize::Result<Self> {
        match <String as FromSql<Text, Pg>>::from_sql(bytes)?.as_str() {
            "pending" => Ok(RequestStatus::Pending),
            "approved" => Ok(RequestStatus::Approved),
            "rejected" => Ok(RequestStatus::Rejected),
            s => Err(format!("Unrecognized request status: {}", s).into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = crate::schema::sql_types::MeetingPriority)]
#[serde(rename_all = "lowercase")]
pub enum MeetingPriority {
    Low,
    Normal,
    High,
    Urgent,
}

impl ToSql<crate::schema::sql_types::MeetingPriority, Pg> for MeetingPriority {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        let s = match *self {
            MeetingPriority::Low => "low",
            MeetingPriority::Normal => "normal",
            MeetingPriority::High => "high",
            MeetingPriority::Urgent => "urgent",
        };
        <str as ToSql<Text, Pg>>::to_sql(s, out)
    }
}

impl FromSql<crate::schema::sql_types::MeetingPriority, Pg> for MeetingPriority {
    fn from_sql(bytes: PgValue) -> deserialize::Result<Self> {
        match <String as FromSql<Text, Pg>>::from_sql(bytes)?.as_str() {
            "low" => Ok(MeetingPriority::Low),
            "normal" => Ok(MeetingPriority::Normal),
            "high" => Ok(MeetingPriority::High),
            "urgent" => Ok(MeetingPriority::Urgent),
            s => Err(format!("Unrecognized meeting priority: {}", s).into()),
        }
    }
}

#[derive(Debug, Clone, Queryable, Serialize, Deserialize)]
#[diesel(table_name = rooms)]
pub struct Room {
    pub room_id: String,
    pub name: Option<String>,
    pub capacity: i32,
    pub hourly_rate: f64,
    pub location: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}

impl Room {
    /// Display name with the same fallback the booking responses use.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => {
                let tail_start = self.room_id.len().saturating_sub(4);
                format!("Room {}", &self.room_id[tail_start..])
            }
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = rooms)]
pub struct NewRoomRecord {
    pub room_id: String,
    pub name: Option<String>,
    pub capacity: i32,
    pub hourly_rate: f64,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewRoom {
    pub name: Option<String>,
    pub capacity: i32,
    pub hourly_rate: f64,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Queryable, Serialize, Deserialize)]
#[diesel(table_name = equipment)]
pub struct Equipment {
    pub equipment_id: String,
    pub name: String,
    pub created_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = equipment)]
pub struct NewEquipmentRecord {
    pub equipment_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewEquipment {
    pub name: String,
}

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = room_equipment)]
pub struct RoomEquipmentLink {
    pub link_id: String,
    pub room_id: String,
    pub equipment_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewRoomEquipment {
    pub room_id: String,
    pub equipment_id: String,
}

#[derive(Debug, Clone, Queryable, Serialize, Deserialize)]
#[diesel(table_name = meeting_requests)]
pub struct MeetingRequest {
    pub request_id: String,
    pub organizer_id: String,
    pub duration_minutes: i32,
    pub required_equipment: Vec<String>,
    pub preferred_start: NaiveDateTime,
    pub flexibility_minutes: i32,
    pub priority: MeetingPriority,
    pub attendees: Vec<String>,
    pub status: RequestStatus,
    pub created_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = meeting_requests)]
pub struct NewMeetingRequest {
    pub request_id: String,
    pub organizer_id: String,
    pub duration_minutes: i32,
    pub required_equipment: Vec<String>,
    pub preferred_start: NaiveDateTime,
    pub flexibility_minutes: i32,
    pub priority: MeetingPriority,
    pub attendees: Vec<String>,
    pub status: RequestStatus,
}

#[derive(Debug, Clone, Queryable, Serialize, Deserialize)]
#[diesel(table_name = bookings)]
pub struct Booking {
    pub booking_id: String,
    pub meeting_request_id: String,
    pub room_id: Option<String>,
    pub start_at: NaiveDateTime,
    pub end_at: NaiveDateTime,
    pub status: BookingStatus,
    pub checked_in_at: Option<NaiveDateTime>,
    pub created_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = bookings)]
pub struct NewBooking {
    pub booking_id: String,
    pub meeting_request_id: String,
    pub room_id: Option<String>,
    pub start_at: NaiveDateTime,
    pub end_at: NaiveDateTime,
    pub status: BookingStatus,
}

#[derive(Debug, Clone, Queryable, Insertable, Serialize)]
#[diesel(table_name = booking_attendees)]
pub struct BookingAttendee {
    pub attendee_id: String,
    pub booking_id: String,
    pub user_id: String,
}

// Request/Response models for API

#[derive(Debug, Clone, Deserialize)]
pub struct MeetingRequestPayload {
    pub organizer_id: String,
    pub duration: i32,
    #[serde(default)]
    pub required_equipment: Vec<String>,
    pub preferred_start: String,
    #[serde(default)]
    pub flexibility: i32,
    pub priority: MeetingPriority,
    pub attendees: Vec<String>,
}

/// Validated request data handed to the orchestrator after the transport
/// layer has parsed timestamps and checked basic shape.
#[derive(Debug, Clone)]
pub struct MeetingRequestData {
    pub organizer_id: String,
    pub duration: i32,
    pub required_equipment: Vec<String>,
    pub preferred_start: NaiveDateTime,
    pub flexibility: i32,
    pub priority: MeetingPriority,
    pub attendees: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlternativeOption {
    pub room_id: String,
    pub room_name: String,
    pub capacity: i32,
    pub hourly_rate: f64,
    pub location: Option<String>,
    pub suggested_start: NaiveDateTime,
    pub suggested_end: NaiveDateTime,
    pub cost_saved: f64,
    pub time_shift: i64,
}

#[derive(Debug, Serialize)]
pub struct RoomSummary {
    pub id: String,
    pub name: String,
    pub capacity: i32,
    pub location: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BookedMeeting {
    pub id: String,
    pub room: RoomSummary,
    pub start_at: NaiveDateTime,
    pub end_at: NaiveDateTime,
    pub attendees: usize,
}

#[derive(Debug, Serialize)]
pub struct PendingRequestRef {
    pub id: String,
    pub preferred_start: NaiveDateTime,
    pub duration: i32,
    pub attendees: usize,
}

/// Tagged outcome of one allocation call. A missing room at the preferred
/// time is a normal response carrying alternatives, not an error.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum AllocationOutcome {
    Booked {
        success: bool,
        message: String,
        booking: BookedMeeting,
    },
    Alternatives {
        success: bool,
        message: String,
        alternatives: Vec<AlternativeOption>,
        meeting_request: PendingRequestRef,
    },
    InvalidAttendees {
        success: bool,
        message: String,
        invalid_attendees: usize,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckInRequest {
    pub booking_id: String,
}

#[derive(Debug, Serialize)]
pub struct CheckInResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checked_in_at: Option<NaiveDateTime>,
}

#[derive(Debug, Serialize)]
pub struct ReleaseReport {
    pub released: usize,
    pub timestamp: NaiveDateTime,
}

#[derive(Debug, Deserialize)]
pub struct BookingFilters {
    pub room_id: Option<String>,
    pub status: Option<BookingStatus>,
    pub from: Option<String>,
    pub to: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn at(hour: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(hour, min, 0)
            .unwrap()
    }

    #[test]
    fn booked_outcome_serializes_without_a_tag() {
        let outcome = AllocationOutcome::Booked {
            success: true,
            message: "Meeting room booked successfully".to_string(),
            booking: BookedMeeting {
                id: "b1".to_string(),
                room: RoomSummary {
                    id: "r1".to_string(),
                    name: "Board Room".to_string(),
                    capacity: 8,
                    location: None,
                },
                start_at: at(10, 0),
                end_at: at(10, 30),
                attendees: 2,
            },
        };

        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["success"], serde_json::json!(true));
        assert_eq!(value["booking"]["room"]["name"], "Board Room");
        assert!(value.get("alternatives").is_none());
    }

    #[test]
    fn alternatives_outcome_carries_the_pending_request() {
        let outcome = AllocationOutcome::Alternatives {
            success: false,
            message: "No room available at preferred time. Please review alternatives.".to_string(),
            alternatives: vec![AlternativeOption {
                room_id: "r1".to_string(),
                room_name: "Board Room".to_string(),
                capacity: 8,
                hourly_rate: 25.0,
                location: None,
                suggested_start: at(10, 45),
                suggested_end: at(10, 45) + Duration::minutes(30),
                cost_saved: 7.5,
                time_shift: 45,
            }],
            meeting_request: PendingRequestRef {
                id: "req1".to_string(),
                preferred_start: at(10, 0),
                duration: 30,
                attendees: 2,
            },
        };

        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["success"], serde_json::json!(false));
        assert_eq!(value["alternatives"][0]["time_shift"], serde_json::json!(45));
        assert_eq!(value["meeting_request"]["id"], "req1");
        assert!(value.get("booking").is_none());
    }

    #[test]
    fn invalid_attendees_outcome_reports_the_count() {
        let outcome = AllocationOutcome::InvalidAttendees {
            success: false,
            message: "Some attendees do not exist".to_string(),
            invalid_attendees: 1,
        };

        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["invalid_attendees"], serde_json::json!(1));
        assert!(value.get("alternatives").is_none());
    }

    #[test]
    fn display_name_falls_back_to_id_tail() {
        let room = Room {
            room_id: "room-9f3a".to_string(),
            name: None,
            capacity: 4,
            hourly_rate: 10.0,
            location: None,
            created_at: None,
        };
        assert_eq!(room.display_name(), "Room 9f3a");

        let named = Room {
            name: Some("Board Room".to_string()),
            ..room
        };
        assert_eq!(named.display_name(), "Board Room");
    }
}
