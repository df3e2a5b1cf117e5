use actix_web::HttpResponse;
use diesel::{pg::PgConnection, r2d2::ConnectionManager};
use serde_json::json;

pub mod note;

pub type Pool = r2d2::Pool<ConnectionManager<PgConnection>>;

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}
