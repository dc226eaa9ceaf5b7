use actix_web::{http::header, web, HttpMessage, HttpRequest, HttpResponse};
use actix_web::http::header::Header;
use actix_web_httpauth::headers::authorization::{Authorization, Basic};
use serde::Deserialize;

use crate::{
    auth::{authenticate_credentials, clear_logout_cookie, sign_out, Session, AUTH_REALM},
    state::{AppState, SessionEvent},
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/").route(web::get().to(index)))
        .service(web::resource("/login").route(web::get().to(login)))
        .service(web::resource("/logout").route(web::get().to(logout)))
        .service(web::resource("/health").route(web::get().to(health)));
}

async fn index() -> HttpResponse {
    HttpResponse::Found()
        .append_header((header::LOCATION, "/login"))
        .finish()
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("ok")
}

async fn logout(state: web::Data<AppState>, req: HttpRequest) -> HttpResponse {
    let session = current_session(&state, &req).await;
    HttpResponse::SeeOther()
        .append_header((header::LOCATION, "/"))
        .cookie(sign_out(&state, &req, session.as_ref()))
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .finish()
}

#[derive(Deserialize)]
struct LoginQuery {
    next: Option<String>,
}

async fn login(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<LoginQuery>,
) -> HttpResponse {
    let session = match current_session(&state, &req).await {
        Some(session) => session,
        None => return auth_challenge(),
    };

    state.publish_session(SessionEvent::SignedIn {
        user_id: session.user_id.clone(),
        role: session.role,
    });
    log::info!("{} signed in as {}", session.display_name, session.role);

    let requested = query.next.as_deref().unwrap_or("");
    let redirect = if requested.starts_with("/app/") {
        requested
    } else {
        session.role.home_route()
    };

    HttpResponse::SeeOther()
        .append_header((header::LOCATION, redirect))
        .cookie(clear_logout_cookie(&req))
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .finish()
}

/// Session for a public route: the one a validator already attached, or
/// whatever the request's basic credentials resolve to.
async fn current_session(state: &AppState, req: &HttpRequest) -> Option<Session> {
    if let Some(session) = req.extensions().get::<Session>().cloned() {
        return Some(session);
    }
    let auth = Authorization::<Basic>::parse(req).ok()?;
    let credentials = auth.into_scheme();
    let username = credentials.user_id();
    let password = credentials.password().unwrap_or_default();
    authenticate_credentials(&state.store, username, password).await
}

fn auth_challenge() -> HttpResponse {
    HttpResponse::Unauthorized()
        .insert_header((header::WWW_AUTHENTICATE, format!("Basic realm=\"{}\"", AUTH_REALM)))
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .finish()
}

#[cfg(test)]
mod tests {
    use actix_web::{cookie::Cookie, http::StatusCode, test, App};

    use super::*;
    use crate::{
        auth::testing::create_profile, config::AppConfig, db::testing::memory_pool,
        models::Role, store::Store,
    };

    // "luca:pw-luca"
    const LUCA: &str = "Basic bHVjYTpwdy1sdWNh";

    async fn state() -> AppState {
        AppState::new(Store::new(memory_pool().await), AppConfig::from_lookup(|_| None))
    }

    #[actix_web::test]
    async fn login_redirects_to_role_home_and_announces_it() {
        let state = state().await;
        create_profile(&state.store, "luca", "pw-luca", "venditore").await;
        let mut sessions = state.on_session_change();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/login?next=https://evil.example")
            .insert_header((header::AUTHORIZATION, LUCA))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            res.headers().get(header::LOCATION).unwrap(),
            "/app/appointments"
        );
        assert!(matches!(
            sessions.try_recv().unwrap(),
            SessionEvent::SignedIn { role: Role::Vendor, .. }
        ));
    }

    #[actix_web::test]
    async fn login_without_credentials_challenges() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state().await))
                .configure(configure),
        )
        .await;
        let req = test::TestRequest::get().uri("/login").to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert!(res.headers().contains_key(header::WWW_AUTHENTICATE));
    }

    #[actix_web::test]
    async fn logout_sets_cookie_and_publishes_sign_out() {
        let state = state().await;
        create_profile(&state.store, "luca", "pw-luca", "venditore").await;
        let mut sessions = state.on_session_change();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/logout")
            .insert_header((header::AUTHORIZATION, LUCA))
            .cookie(Cookie::new("unrelated", "1"))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert!(res
            .response()
            .cookies()
            .any(|cookie| cookie.name() == "crm_logged_out"));
        assert!(matches!(
            sessions.try_recv().unwrap(),
            SessionEvent::SignedOut { .. }
        ));
    }
}
