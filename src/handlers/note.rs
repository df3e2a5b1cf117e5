use actix_web::{web, HttpRequest, HttpResponse};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::ConnectionManager;
use serde_derive::Deserialize;
use serde_json::json;

use super::Pool;
use crate::captcha::TurnstileGate;
use crate::errors::ServerError;
use crate::models::note::{self, QueryNote};
use crate::schema::notes::dsl::{content, notes, password};

type PgPooled = r2d2::PooledConnection<ConnectionManager<PgConnection>>;

#[derive(Deserialize)]
pub struct CaptchaQuery {
    #[serde(rename = "cf-turnstile-response")]
    pub captcha_token: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateNote {
    pub content: Option<String>,
    pub password: Option<String>,
    #[serde(rename = "cf-turnstile-response")]
    pub captcha_token: Option<String>,
}

#[derive(Deserialize)]
pub struct PasswordField {
    pub password: Option<String>,
    #[serde(rename = "cf-turnstile-response")]
    pub captcha_token: Option<String>,
}

#[derive(Deserialize)]
pub struct RenameNote {
    #[serde(rename = "newId")]
    pub new_id: Option<String>,
    #[serde(rename = "cf-turnstile-response")]
    pub captcha_token: Option<String>,
}

#[derive(Deserialize)]
pub struct AvailabilityCheck {
    #[serde(rename = "noteId")]
    pub note_id: String,
}

fn client_ip(req: &HttpRequest) -> Option<String> {
    req.connection_info()
        .realip_remote_addr()
        .map(str::to_string)
}

fn note_view(stored: &QueryNote) -> serde_json::Value {
    if stored.requires_password() {
        json!({ "requiresPassword": true })
    } else {
        json!({
            "requiresPassword": false,
            "content": stored.content,
        })
    }
}

/// Reading is the only operation that creates: an unknown id comes into
/// existence as an empty, unprotected note.
fn get_or_create(connection: &mut PgPooled, nid: &str) -> Result<QueryNote, ServerError> {
    match notes.find(nid).get_result::<QueryNote>(connection) {
        Ok(stored) => Ok(stored),
        Err(diesel::result::Error::NotFound) => {
            let fresh = QueryNote::empty(nid.to_string());
            match diesel::insert_into(notes).values(&fresh).execute(connection) {
                Ok(_) => Ok(fresh),
                // a concurrent request created it first; its row is just as empty
                Err(diesel::result::Error::DatabaseError(
                    diesel::result::DatabaseErrorKind::UniqueViolation,
                    _,
                )) => notes
                    .find(nid)
                    .get_result::<QueryNote>(connection)
                    .map_err(|_| ServerError::DieselError),
                Err(_) => Err(ServerError::DieselError),
            }
        }
        Err(_) => Err(ServerError::DieselError),
    }
}

fn rename_target(old_id: &str, raw_new: Option<&str>) -> Result<String, ServerError> {
    let new_id = match raw_new {
        Some(raw) => note::normalize_id(raw),
        None => return Err(ServerError::BadRequest("Invalid new ID")),
    };
    if new_id.is_empty() || new_id == old_id {
        return Err(ServerError::BadRequest("Invalid new ID"));
    }
    Ok(new_id)
}

pub async fn get(
    req: HttpRequest,
    note_id: web::Path<String>,
    query: web::Query<CaptchaQuery>,
    gate: web::Data<TurnstileGate>,
    pool: web::Data<Pool>,
) -> Result<HttpResponse, ServerError> {
    gate.require(query.captcha_token.as_deref(), client_ip(&req).as_deref())
        .await?;

    let nid = note::normalize_id(&note_id);
    let mut connection = pool.get()?;
    let stored = get_or_create(&mut connection, &nid)?;

    Ok(HttpResponse::Ok().json(note_view(&stored)))
}

pub async fn verify(
    note_id: web::Path<String>,
    input: web::Json<PasswordField>,
    pool: web::Data<Pool>,
) -> Result<HttpResponse, ServerError> {
    let nid = note::normalize_id(&note_id);
    let mut connection = pool.get()?;

    match notes.find(nid.as_str()).get_result::<QueryNote>(&mut connection) {
        Ok(stored) => {
            let unlocked = stored.unlock(input.password.as_deref())?;
            Ok(HttpResponse::Ok().json(json!({ "content": unlocked })))
        }
        Err(diesel::result::Error::NotFound) => Err(ServerError::NotFound(nid)),
        Err(_) => Err(ServerError::DieselError),
    }
}

pub async fn update(
    req: HttpRequest,
    note_id: web::Path<String>,
    input: web::Json<UpdateNote>,
    gate: web::Data<TurnstileGate>,
    pool: web::Data<Pool>,
) -> Result<HttpResponse, ServerError> {
    gate.require(input.captcha_token.as_deref(), client_ip(&req).as_deref())
        .await?;

    let nid = note::normalize_id(&note_id);
    let mut connection = pool.get()?;

    let stored = match notes.find(nid.as_str()).get_result::<QueryNote>(&mut connection) {
        Ok(stored) => stored,
        Err(diesel::result::Error::NotFound) => return Err(ServerError::NotFound(nid)),
        Err(_) => return Err(ServerError::DieselError),
    };

    stored.unlock(input.password.as_deref())?;

    // blank saves allowed
    diesel::update(notes.find(nid.as_str()))
        .set(content.eq(input.content.clone().unwrap_or_default()))
        .execute(&mut connection)?;

    Ok(HttpResponse::Ok().json(json!({ "message": "Note updated" })))
}

pub async fn set_password(
    req: HttpRequest,
    note_id: web::Path<String>,
    input: web::Json<PasswordField>,
    gate: web::Data<TurnstileGate>,
    pool: web::Data<Pool>,
) -> Result<HttpResponse, ServerError> {
    gate.require(input.captcha_token.as_deref(), client_ip(&req).as_deref())
        .await?;

    let supplied = match input.password.as_deref() {
        Some(p) if !p.is_empty() => p,
        _ => return Err(ServerError::BadRequest("Password required")),
    };

    let nid = note::normalize_id(&note_id);
    let mut connection = pool.get()?;

    let mut stored = match notes.find(nid.as_str()).get_result::<QueryNote>(&mut connection) {
        Ok(stored) => stored,
        Err(diesel::result::Error::NotFound) => return Err(ServerError::NotFound(nid)),
        Err(_) => return Err(ServerError::DieselError),
    };

    stored.protect(supplied)?;

    diesel::update(notes.find(nid.as_str()))
        .set(password.eq(stored.password))
        .execute(&mut connection)?;

    Ok(HttpResponse::Ok().json(json!({ "message": "Password set" })))
}

pub async fn rename(
    req: HttpRequest,
    note_id: web::Path<String>,
    input: web::Json<RenameNote>,
    gate: web::Data<TurnstileGate>,
    pool: web::Data<Pool>,
) -> Result<HttpResponse, ServerError> {
    gate.require(input.captcha_token.as_deref(), client_ip(&req).as_deref())
        .await?;

    let old_id = note::normalize_id(&note_id);
    let new_id = rename_target(&old_id, input.new_id.as_deref())?;

    let mut connection = pool.get()?;

    // copy and delete commit together; a crash mid-rename never leaves
    // both ids or neither populated
    connection.transaction::<_, ServerError, _>(|connection| {
        match notes.find(new_id.as_str()).get_result::<QueryNote>(connection) {
            Ok(_) => return Err(ServerError::Conflict("ID already taken")),
            Err(diesel::result::Error::NotFound) => {}
            Err(_) => return Err(ServerError::DieselError),
        }

        let stored = match notes.find(old_id.as_str()).get_result::<QueryNote>(connection) {
            Ok(stored) => stored,
            Err(diesel::result::Error::NotFound) => {
                return Err(ServerError::NotFound(old_id.clone()))
            }
            Err(_) => return Err(ServerError::DieselError),
        };

        diesel::insert_into(notes)
            .values(QueryNote {
                id: new_id.clone(),
                ..stored
            })
            .execute(connection)?;
        diesel::delete(notes.find(old_id.as_str())).execute(connection)?;
        Ok(())
    })?;

    Ok(HttpResponse::Ok().json(json!({ "message": "Note renamed", "newId": new_id })))
}

pub async fn check_availability(
    input: web::Json<AvailabilityCheck>,
    pool: web::Data<Pool>,
) -> Result<HttpResponse, ServerError> {
    let nid = note::normalize_id(&input.note_id);
    let mut connection = pool.get()?;

    let taken = match notes.find(nid.as_str()).get_result::<QueryNote>(&mut connection) {
        Ok(_) => true,
        Err(diesel::result::Error::NotFound) => false,
        Err(_) => return Err(ServerError::DieselError),
    };

    Ok(HttpResponse::Ok().json(json!({ "available": !taken })))
}
