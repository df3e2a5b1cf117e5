use actix_web::HttpResponse;
use derive_more::Display;
use serde_json::json;

#[derive(Debug, Display)]
pub enum ServerError {
    DieselError,
    R2D2Error,
    HashError,
    #[display(fmt = "note '{}' was not found", _0)]
    NotFound(String),
    #[display(fmt = "bad request: {}", _0)]
    BadRequest(&'static str),
    #[display(fmt = "unauthorized: {}", _0)]
    Unauthorized(&'static str),
    #[display(fmt = "conflict: {}", _0)]
    Conflict(&'static str),
    #[display(fmt = "captcha failed: {}", _0)]
    CaptchaFailed(&'static str),
}

impl From<r2d2::Error> for ServerError {
    fn from(_: r2d2::Error) -> ServerError {
        ServerError::R2D2Error
    }
}

impl From<diesel::result::Error> for ServerError {
    fn from(_: diesel::result::Error) -> ServerError {
        ServerError::DieselError
    }
}

impl From<argon2::password_hash::Error> for ServerError {
    fn from(_: argon2::password_hash::Error) -> ServerError {
        ServerError::HashError
    }
}

impl actix_web::error::ResponseError for ServerError {
    fn error_response(&self) -> HttpResponse {
        match self {
            ServerError::DieselError => HttpResponse::InternalServerError()
                .json(json!({ "error": "Server error: database failure" })),
            ServerError::R2D2Error => HttpResponse::InternalServerError()
                .json(json!({ "error": "Server error: connection pool failure" })),
            ServerError::HashError => HttpResponse::InternalServerError()
                .json(json!({ "error": "Server error: password hashing failure" })),
            ServerError::NotFound(id) => HttpResponse::NotFound()
                .json(json!({ "error": format!("Note '{}' was not found", id) })),
            ServerError::BadRequest(msg) => {
                HttpResponse::BadRequest().json(json!({ "error": msg }))
            }
            ServerError::Unauthorized(msg) => {
                HttpResponse::Unauthorized().json(json!({ "error": msg }))
            }
            ServerError::Conflict(msg) => HttpResponse::Conflict().json(json!({ "error": msg })),
            ServerError::CaptchaFailed(msg) => {
                HttpResponse::Forbidden().json(json!({ "error": msg }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use actix_web::error::ResponseError;
    use actix_web::http::StatusCode;

    use super::ServerError;

    #[test]
    fn variants_map_to_expected_status_codes() {
        let cases = [
            (ServerError::DieselError, StatusCode::INTERNAL_SERVER_ERROR),
            (ServerError::R2D2Error, StatusCode::INTERNAL_SERVER_ERROR),
            (ServerError::HashError, StatusCode::INTERNAL_SERVER_ERROR),
            (
                ServerError::NotFound("foo".to_string()),
                StatusCode::NOT_FOUND,
            ),
            (
                ServerError::BadRequest("Password required"),
                StatusCode::BAD_REQUEST,
            ),
            (
                ServerError::Unauthorized("Incorrect password"),
                StatusCode::UNAUTHORIZED,
            ),
            (
                ServerError::Conflict("ID already taken"),
                StatusCode::CONFLICT,
            ),
            (
                ServerError::CaptchaFailed("captcha token missing"),
                StatusCode::FORBIDDEN,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(err.error_response().status(), status, "{:?}", err);
        }
    }

    #[test]
    fn error_bodies_are_json_objects() {
        let response = ServerError::NotFound("foo".to_string()).error_response();
        let content_type = response
            .headers()
            .get(actix_web::http::header::CONTENT_TYPE)
            .unwrap();
        assert_eq!(content_type, "application/json");
    }
}
