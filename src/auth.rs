use actix_web::{
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    error::ErrorUnauthorized,
    http::header,
    middleware::Next,
    web, Error, HttpMessage, HttpRequest, HttpResponse,
};
use actix_web::cookie::{Cookie, SameSite, time::Duration};
use actix_web_httpauth::extractors::basic::BasicAuth;
use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand_core::OsRng;
use uuid::Uuid;

use crate::{
    models::{ProfileRow, Role, UserProfile},
    state::{AppState, SessionEvent},
    store::{Collection, Predicate, Query, Store, Value},
};

pub const AUTH_REALM: &str = "Gestionale";
const LOGOUT_COOKIE: &str = "crm_logged_out";

/// The signed-in caller. Inserted into request extensions by the validator
/// and passed explicitly to everything that scopes data by role.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub display_name: String,
    pub role: Role,
}

pub fn hash_password(password: &str) -> Result<String, password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, password_hash: &str) -> bool {
    let parsed_hash = PasswordHash::new(password_hash);
    match parsed_hash {
        Ok(hash) => Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok(),
        Err(_) => false,
    }
}

async fn authenticate(req: &ServiceRequest, credentials: &BasicAuth) -> Result<Session, Error> {
    let state = req
        .app_data::<web::Data<AppState>>()
        .ok_or_else(|| ErrorUnauthorized("Unauthorized"))?;
    let username = credentials.user_id();
    let password = credentials.password().unwrap_or_default();
    authenticate_credentials(&state.store, username, password)
        .await
        .ok_or_else(|| ErrorUnauthorized("Unauthorized"))
}

/// Resolves credentials to a session. Profiles whose stored role is outside
/// the known set never get one.
pub async fn authenticate_credentials(
    store: &Store,
    username: &str,
    password: &str,
) -> Option<Session> {
    let query = Query::new(Collection::Profiles)
        .filter(Predicate::Eq("username", username.into()))
        .filter(Predicate::Eq("active", Value::Int(1)))
        .limit(1);
    let user = match store.query::<ProfileRow>(&query).await {
        Ok(rows) => rows.into_iter().next()?,
        Err(err) => {
            log::warn!("Profile lookup failed: {err}");
            return None;
        }
    };

    if !verify_password(password, &user.password_hash) {
        return None;
    }

    let username = user.username.clone();
    match UserProfile::try_from(user) {
        Ok(profile) => Some(Session {
            user_id: profile.id,
            display_name: profile.name,
            role: profile.role,
        }),
        Err(err) => {
            log::warn!("Rejecting login for '{username}': {err}");
            None
        }
    }
}

pub async fn basic_validator(
    req: ServiceRequest,
    credentials: BasicAuth,
) -> Result<ServiceRequest, (Error, ServiceRequest)> {
    match authenticate(&req, &credentials).await {
        Ok(session) => {
            req.extensions_mut().insert(session);
            Ok(req)
        }
        Err(err) => Err((err, req)),
    }
}

/// Ends the caller's session: the logged-out cookie makes every guarded
/// route refuse until the next `/login`, and subscribers hear about it.
pub fn sign_out(state: &AppState, req: &HttpRequest, session: Option<&Session>) -> Cookie<'static> {
    if let Some(session) = session {
        state
            .boards
            .forget_where(|key| key.user_id == session.user_id);
        state.publish_session(SessionEvent::SignedOut {
            user_id: session.user_id.clone(),
        });
        log::info!("{} signed out", session.display_name);
    }
    logout_cookie(req)
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn logout_cookie(req: &HttpRequest) -> Cookie<'static> {
    let mut builder = Cookie::build(LOGOUT_COOKIE, "1")
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(Duration::days(365));
    if req.connection_info().scheme() == "https" {
        builder = builder.secure(true);
    }
    builder.finish()
}

pub fn clear_logout_cookie(req: &HttpRequest) -> Cookie<'static> {
    let mut builder = Cookie::build(LOGOUT_COOKIE, "")
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(Duration::seconds(0));
    if req.connection_info().scheme() == "https" {
        builder = builder.secure(true);
    }
    builder.finish()
}

pub fn is_logged_out(req: &HttpRequest) -> bool {
    req.cookie(LOGOUT_COOKIE).is_some()
}

pub async fn logout_guard<B>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<BoxBody>, Error>
where
    B: actix_web::body::MessageBody + 'static,
{
    if is_logged_out(req.request()) {
        let login_url = format!("/login?next={}", req.path());
        let body = format!(
            r#"<!doctype html>
<html lang="it">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>Sessione chiusa</title>
    <link rel="stylesheet" href="/static/app.css" />
  </head>
  <body>
    <div class="card narrow">
      <h1>Sei uscito</h1>
      <p>La sessione è stata chiusa.</p>
      <p><a href="{login_url}">Accedi di nuovo</a>.</p>
    </div>
  </body>
</html>"#
        );
        let response = HttpResponse::Unauthorized()
            .insert_header((header::CACHE_CONTROL, "no-store"))
            .content_type("text/html; charset=utf-8")
            .body(body);
        return Ok(req.into_response(response));
    }

    let res = next.call(req).await?;
    Ok(res.map_into_boxed_body())
}
