use std::time::Duration;

use actix_cors::Cors;
use actix_governor::{Governor, GovernorConfigBuilder};
use actix_web::{middleware::Logger, web, App, HttpResponse, HttpServer};
use diesel::pg::PgConnection;
use diesel::r2d2::ConnectionManager;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use serde_json::json;

use crate::captcha::TurnstileGate;
use crate::handlers::Pool;

mod captcha;
mod errors;
mod handlers;
mod models;
mod schema;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

fn connect_with_retries(database_url: &str) -> Pool {
    let mut attempt = 0;
    loop {
        let manager = ConnectionManager::<PgConnection>::new(database_url);
        match r2d2::Pool::builder()
            .connection_timeout(Duration::from_secs(5))
            .build(manager)
        {
            Ok(pool) => break pool,
            Err(err) if attempt < 4 => {
                attempt += 1;
                log::warn!("database unreachable (attempt {}): {}", attempt, err);
                std::thread::sleep(Duration::from_secs(2));
            }
            Err(err) => {
                log::error!("giving up on database connection: {}", err);
                std::process::exit(1);
            }
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let port = std::env::var("PORT").unwrap_or_else(|_| "5000".to_string());
    let database_url = std::env::var("DATABASE_URL").expect("env DATABASE_URL");
    let allowed_origins = std::env::var("ALLOWED_ORIGINS").ok();

    let pool = connect_with_retries(&database_url);
    {
        let mut connection = pool.get().expect("failed to get a connection from the pool");
        connection
            .run_pending_migrations(MIGRATIONS)
            .expect("failed to run database migrations");
    }

    let gate = web::Data::new(TurnstileGate::from_env());
    if gate.enabled() {
        log::info!("turnstile captcha gate enabled");
    } else {
        log::info!("turnstile captcha gate disabled, set TURNSTILE_SECRET_KEY to enable");
    }

    let general_limit = GovernorConfigBuilder::default()
        .per_second(1)
        .burst_size(60)
        .finish()
        .expect("invalid general rate limit");
    let password_limit = GovernorConfigBuilder::default()
        .per_second(3)
        .burst_size(10)
        .finish()
        .expect("invalid password rate limit");

    log::info!("listening on 0.0.0.0:{}", port);

    HttpServer::new(move || {
        let cors = match &allowed_origins {
            Some(origins) => origins
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin)),
            None => Cors::default().allow_any_origin(),
        }
        .allow_any_method()
        .allow_any_header()
        .max_age(3600);

        App::new()
            .app_data(web::Data::new(pool.clone()))
            .app_data(gate.clone())
            .app_data(web::JsonConfig::default().error_handler(|err, _req| {
                actix_web::error::InternalError::from_response(
                    err,
                    HttpResponse::BadRequest().json(json!({ "error": "invalid request body" })),
                )
                .into()
            }))
            .wrap(cors)
            .wrap(Logger::default())
            .route("/health", web::get().to(handlers::health))
            .service(
                web::scope("/api/notes")
                    .wrap(Governor::new(&general_limit))
                    .route(
                        "/check-availability",
                        web::post().to(handlers::note::check_availability),
                    )
                    .service(
                        web::resource("/{note_id}/verify")
                            .wrap(Governor::new(&password_limit))
                            .route(web::post().to(handlers::note::verify)),
                    )
                    .service(
                        web::resource("/{note_id}/set-password")
                            .wrap(Governor::new(&password_limit))
                            .route(web::post().to(handlers::note::set_password)),
                    )
                    .route("/{note_id}/rename", web::post().to(handlers::note::rename))
                    .service(
                        web::resource("/{note_id}")
                            .route(web::get().to(handlers::note::get))
                            .route(web::post().to(handlers::note::update)),
                    ),
            )
    })
    .bind(format!("0.0.0.0:{}", port))?
    .run()
    .await
}
