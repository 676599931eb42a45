#[macro_use]
extern crate diesel;

use actix_web::{error, get, middleware, post, web, App, HttpResponse, HttpServer, Responder};
use chrono::NaiveDateTime;
use diesel::{prelude::*, r2d2};
use regex::Regex;

mod actions;
mod allocation;
mod models;
mod schema;

use allocation::AllocationConfig;

type DbPool = r2d2::Pool<r2d2::ConnectionManager<PgConnection>>;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, serde::Serialize)]
struct Res {
    message: String,
}

fn bad_request(message: &str) -> HttpResponse {
    HttpResponse::BadRequest().json(Res {
        message: message.to_string(),
    })
}

/// Maps store failures the way the error taxonomy asks: unique violations
/// become conflicts (only where the endpoint can actually collide), missing
/// rows become 404s, everything else is a 400 with the underlying reason.
fn map_db_error(
    e: Box<dyn std::error::Error + Send + Sync>,
    conflict_message: Option<&str>,
    not_found_message: &str,
) -> error::InternalError<String> {
    let detail = e.to_string();
    log::error!("store operation failed: {:?}", e);

    let response = match (e.downcast_ref::<diesel::result::Error>(), conflict_message) {
        (
            Some(diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                _,
            )),
            Some(conflict),
        ) => HttpResponse::Conflict().json(Res {
            message: conflict.to_owned(),
        }),
        (Some(diesel::result::Error::NotFound), _) => HttpResponse::NotFound().json(Res {
            message: not_found_message.to_owned(),
        }),
        _ => HttpResponse::BadRequest().json(Res { message: detail.clone() }),
    };

    error::InternalError::from_response(detail, response)
}

#[post("/user")]
async fn add_user(pool: web::Data<DbPool>, form: web::Json<models::NewUser>) -> actix_web::Result<impl Responder> {
    let re = Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap();

    if re.captures(&form.user_id).is_none() {
        return Ok(bad_request("user_id should be alphanumeric (dashes and underscores allowed)"));
    }

    let user = web::block(move || {
        let mut conn = pool.get()?;
        actions::insert_new_user(&mut conn, &form.user_id)
    })
    .await?
    .map_err(|e| map_db_error(e, Some("User already exists"), "User not found"))?;

    Ok(HttpResponse::Created().json(user))
}

#[post("/room")]
async fn add_room(pool: web::Data<DbPool>, form: web::Json<models::NewRoom>) -> actix_web::Result<impl Responder> {
    let re = Regex::new(r"^[a-zA-Z0-9 ]+$").unwrap();

    if let Some(name) = &form.name {
        if re.captures(name).is_none() {
            return Ok(bad_request("name should be an alphanumeric string, spaces allowed"));
        }
    }
    if form.capacity < 0 {
        return Ok(bad_request("capacity must not be negative"));
    }
    if form.hourly_rate < 0.0 {
        return Ok(bad_request("hourly_rate must not be negative"));
    }

    let room = web::block(move || {
        let mut conn = pool.get()?;
        actions::create_room(&mut conn, &form)
    })
    .await?
    .map_err(|e| map_db_error(e, Some("Room already exists"), "Room not found"))?;

    Ok(HttpResponse::Created().json(room))
}

#[get("/room")]
async fn list_rooms(pool: web::Data<DbPool>) -> actix_web::Result<impl Responder> {
    let rooms = web::block(move || {
        let mut conn = pool.get()?;
        actions::load_room_catalogue(&mut conn)
    })
    .await?
    .map_err(|e| map_db_error(e, None, "Room not found"))?;

    Ok(HttpResponse::Ok().json(rooms))
}

#[get("/room/{room_id}")]
async fn get_room(pool: web::Data<DbPool>, path: web::Path<String>) -> actix_web::Result<impl Responder> {
    let room_id = path.into_inner();

    let room = web::block(move || {
        let mut conn = pool.get()?;
        actions::get_room(&mut conn, &room_id)
    })
    .await?
    .map_err(|e| map_db_error(e, None, "Room not found"))?;

    Ok(HttpResponse::Ok().json(room))
}

#[post("/equipment")]
async fn add_equipment(
    pool: web::Data<DbPool>,
    form: web::Json<models::NewEquipment>,
) -> actix_web::Result<impl Responder> {
    let re = Regex::new(r"^[a-zA-Z0-9 ]+$").unwrap();

    if re.captures(&form.name).is_none() {
        return Ok(bad_request("name should be an alphanumeric string, spaces allowed"));
    }

    let created = web::block(move || {
        let mut conn = pool.get()?;
        actions::create_equipment(&mut conn, &form)
    })
    .await?
    .map_err(|e| map_db_error(e, Some("Equipment already exists"), "Equipment not found"))?;

    Ok(HttpResponse::Created().json(created))
}

#[get("/equipment")]
async fn list_equipment(pool: web::Data<DbPool>) -> actix_web::Result<impl Responder> {
    let all = web::block(move || {
        let mut conn = pool.get()?;
        actions::list_equipment(&mut conn)
    })
    .await?
    .map_err(|e| map_db_error(e, None, "Equipment not found"))?;

    Ok(HttpResponse::Ok().json(all))
}

#[post("/room-equipment")]
async fn add_room_equipment(
    pool: web::Data<DbPool>,
    form: web::Json<models::NewRoomEquipment>,
) -> actix_web::Result<impl Responder> {
    let link = web::block(move || {
        let mut conn = pool.get()?;
        actions::create_room_equipment(&mut conn, &form)
    })
    .await?
    .map_err(|e| map_db_error(e, Some("Room equipment link already exists"), "Room or equipment not found"))?;

    Ok(HttpResponse::Created().json(link))
}

#[post("/meeting-request")]
async fn create_meeting_request(
    pool: web::Data<DbPool>,
    config: web::Data<AllocationConfig>,
    form: web::Json<models::MeetingRequestPayload>,
) -> actix_web::Result<impl Responder> {
    if form.duration <= 0 {
        return Ok(bad_request("duration must be greater than 0 minutes"));
    }
    if form.flexibility < 0 {
        return Ok(bad_request("flexibility must not be negative"));
    }
    if form.attendees.is_empty() {
        return Ok(bad_request("at least one attendee is required"));
    }

    let preferred_start = match NaiveDateTime::parse_from_str(&form.preferred_start, TIMESTAMP_FORMAT) {
        Ok(dt) => dt,
        Err(_) => return Ok(bad_request("preferred_start not in correct format")),
    };

    let data = models::MeetingRequestData {
        organizer_id: form.organizer_id.clone(),
        duration: form.duration,
        required_equipment: form.required_equipment.clone(),
        preferred_start,
        flexibility: form.flexibility,
        priority: form.priority.clone(),
        attendees: form.attendees.clone(),
    };

    let outcome = web::block(move || {
        let mut conn = pool.get()?;
        actions::create_meeting_request(&mut conn, &config, &data)
    })
    .await?
    .map_err(|e| map_db_error(e, None, "Meeting request not found"))?;

    Ok(HttpResponse::Created().json(outcome))
}

#[get("/meeting-request/{request_id}")]
async fn get_meeting_request(pool: web::Data<DbPool>, path: web::Path<String>) -> actix_web::Result<impl Responder> {
    let request_id = path.into_inner();

    let request = web::block(move || {
        let mut conn = pool.get()?;
        actions::get_meeting_request(&mut conn, &request_id)
    })
    .await?
    .map_err(|e| map_db_error(e, None, "Meeting request not found"))?;

    Ok(HttpResponse::Ok().json(request))
}

#[get("/booking/{booking_id}")]
async fn get_booking(pool: web::Data<DbPool>, path: web::Path<String>) -> actix_web::Result<impl Responder> {
    let booking_id = path.into_inner();

    let booking = web::block(move || {
        let mut conn = pool.get()?;
        actions::get_booking(&mut conn, &booking_id)
    })
    .await?
    .map_err(|e| map_db_error(e, None, "Booking not found"))?;

    Ok(HttpResponse::Ok().json(booking))
}

#[get("/bookings")]
async fn list_bookings(
    pool: web::Data<DbPool>,
    query: web::Query<models::BookingFilters>,
) -> actix_web::Result<impl Responder> {
    let filters = query.into_inner();

    let range = match (&filters.from, &filters.to) {
        (Some(from), Some(to)) => {
            let from = match NaiveDateTime::parse_from_str(from, TIMESTAMP_FORMAT) {
                Ok(dt) => dt,
                Err(_) => return Ok(bad_request("from timestamp not in correct format")),
            };
            let to = match NaiveDateTime::parse_from_str(to, TIMESTAMP_FORMAT) {
                Ok(dt) => dt,
                Err(_) => return Ok(bad_request("to timestamp not in correct format")),
            };
            Some((from, to))
        }
        (None, None) => None,
        _ => return Ok(bad_request("from and to must be provided together")),
    };

    let found = web::block(move || {
        let mut conn = pool.get()?;
        actions::list_bookings(
            &mut conn,
            filters.room_id.as_deref(),
            filters.status.clone(),
            range,
        )
    })
    .await?
    .map_err(|e| map_db_error(e, None, "Booking not found"))?;

    Ok(HttpResponse::Ok().json(found))
}

#[post("/check-in")]
async fn check_in_booking(
    pool: web::Data<DbPool>,
    form: web::Json<models::CheckInRequest>,
) -> actix_web::Result<impl Responder> {
    let result = web::block(move || {
        let mut conn = pool.get()?;
        actions::check_in_booking(&mut conn, &form.booking_id)
    })
    .await?
    .map_err(|e| map_db_error(e, None, "Booking not found"))?;

    let response = if result.success {
        HttpResponse::Ok().json(result)
    } else if result.message == "Booking not found" {
        HttpResponse::NotFound().json(result)
    } else {
        HttpResponse::Conflict().json(result)
    };

    Ok(response)
}

#[post("/auto-release")]
async fn auto_release(
    pool: web::Data<DbPool>,
    config: web::Data<AllocationConfig>,
) -> actix_web::Result<impl Responder> {
    let report = web::block(move || {
        let mut conn = pool.get()?;
        actions::auto_release_unused_bookings(&mut conn, &config)
    })
    .await?
    .map_err(|e| map_db_error(e, None, "Booking not found"))?;

    Ok(HttpResponse::Ok().json(report))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    // initialize DB pool outside of `HttpServer::new` so that it is shared across all workers
    let pool = initialize_db_pool();
    let config = AllocationConfig::from_env();

    // Periodic auto-release sweep, reference cadence once per minute.
    let sweep_pool = pool.clone();
    let sweep_config = config.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(tokio::time::Duration::from_secs(60));
        loop {
            ticker.tick().await;
            let pool = sweep_pool.clone();
            let config = sweep_config.clone();
            let swept = tokio::task::spawn_blocking(move || {
                let mut conn = pool.get()?;
                actions::auto_release_unused_bookings(&mut conn, &config)
            })
            .await;
            match swept {
                Ok(Ok(report)) => {
                    if report.released > 0 {
                        log::info!("auto-release sweep released {} bookings", report.released);
                    }
                }
                Ok(Err(e)) => log::error!("auto-release sweep failed: {:?}", e),
                Err(e) => log::error!("auto-release task panicked: {:?}", e),
            }
        }
    });

    let config = web::Data::new(config);

    log::info!("starting HTTP server at http://localhost:8080");

    let http = HttpServer::new(move || {
        App::new()
            // add DB pool handle to app data; enables use of `web::Data<DbPool>` extractor
            .app_data(web::Data::new(pool.clone()))
            .app_data(config.clone())
            .wrap(middleware::Logger::default())
            .app_data(web::JsonConfig::default().error_handler(|err, _req| {
                let detail = err.to_string();
                let response = match err {
                    error::JsonPayloadError::ContentType => {
                        HttpResponse::UnsupportedMediaType().body("Unsupported Media Type")
                    }
                    error::JsonPayloadError::Deserialize(ref err) => {
                        HttpResponse::BadRequest().json(Res { message: err.to_string() })
                    }

                    _ => HttpResponse::BadRequest().json(Res { message: detail }),
                };
                error::InternalError::from_response(err, response).into()
            }))
            .service(add_user)
            .service(add_room)
            .service(list_rooms)
            .service(get_room)
            .service(add_equipment)
            .service(list_equipment)
            .service(add_room_equipment)
            .service(create_meeting_request)
            .service(get_meeting_request)
            .service(get_booking)
            .service(list_bookings)
            .service(check_in_booking)
            .service(auto_release)
    })
    .bind(("127.0.0.1", 8080)).unwrap()
    .run();

    http.await
}

fn initialize_db_pool() -> DbPool {
    let conn_spec = std::env::var("DATABASE_URL").expect("DATABASE_URL should be set");
    let manager = r2d2::ConnectionManager::<PgConnection>::new(conn_spec);
    r2d2::Pool::builder()
        .build(manager)
        .expect("DATABASE_URL should be a valid Postgres connection string")
}
