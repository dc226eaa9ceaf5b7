use actix_web::{web, HttpResponse, Result};
use askama::Template;
use serde::Deserialize;

use crate::{
    auth::{hash_password, new_id, Session},
    db::{log_activity, now_timestamp},
    error::{AppError, StoreError},
    models::{looks_like_email, ProfileRow, Role, Vendor},
    notice::Notice,
    scope::{redirect_unless, Area},
    state::AppState,
    store::{Collection, Direction, Predicate, Query, Store, Value},
    templates::{render, Layout},
};

#[derive(Clone, Debug)]
struct VendorView {
    name: String,
    email: String,
    phone: String,
}

#[derive(Clone, Debug, Default)]
struct VendorFormView {
    username: String,
    first_name: String,
    last_name: String,
    email: String,
    phone: String,
}

#[derive(Template)]
#[template(path = "vendors.html")]
struct VendorsTemplate {
    layout: Layout,
    vendors: Vec<VendorView>,
    can_create: bool,
    form: VendorFormView,
    errors: Vec<String>,
}

#[derive(Deserialize)]
struct VendorCreateForm {
    username: String,
    first_name: String,
    last_name: String,
    email: String,
    phone: Option<String>,
    password: String,
}

impl VendorCreateForm {
    fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.username.trim().is_empty() {
            errors.push("Lo username è obbligatorio.".to_string());
        }
        if self.first_name.trim().is_empty() {
            errors.push("Il nome è obbligatorio.".to_string());
        }
        if self.last_name.trim().is_empty() {
            errors.push("Il cognome è obbligatorio.".to_string());
        }
        if !looks_like_email(&self.email) {
            errors.push("Indirizzo email non valido.".to_string());
        }
        if self.password.trim().len() < 6 {
            errors.push("La password deve avere almeno 6 caratteri.".to_string());
        }
        errors
    }

    fn view(&self) -> VendorFormView {
        VendorFormView {
            username: self.username.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone().unwrap_or_default(),
        }
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/vendors")
            .route(web::get().to(list_vendors))
            .route(web::post().to(create_vendor)),
    );
}

/// Active profiles with the vendor role, sorted by surname.
pub async fn fetch_vendors(store: &Store) -> Result<Vec<Vendor>, StoreError> {
    let query = Query::new(Collection::Profiles)
        .filter(Predicate::Eq("role", Role::Vendor.as_str().into()))
        .filter(Predicate::Eq("active", Value::Int(1)))
        .order_by("last_name", Direction::Asc);
    let rows = store.query::<ProfileRow>(&query).await?;
    Ok(rows
        .into_iter()
        .filter_map(|row| match Vendor::try_from(row) {
            Ok(vendor) => Some(vendor),
            Err(err) => {
                log::warn!("Skipping vendor: {err}");
                None
            }
        })
        .collect())
}

async fn list_vendors(
    state: web::Data<AppState>,
    session: web::ReqData<Session>,
) -> Result<HttpResponse> {
    let session = session.into_inner();
    if let Some(redirect) = redirect_unless(&session, Area::Vendors) {
        return Ok(redirect);
    }
    Ok(render_vendors(&state, &session, Vec::new(), VendorFormView::default(), Vec::new()).await)
}

async fn create_vendor(
    state: web::Data<AppState>,
    session: web::ReqData<Session>,
    form: web::Form<VendorCreateForm>,
) -> Result<HttpResponse> {
    let session = session.into_inner();
    if let Some(redirect) = redirect_unless(&session, Area::ManageVendors) {
        return Ok(redirect);
    }
    let form = form.into_inner();
    let errors = form.validate();
    if !errors.is_empty() {
        let notices = vec![Notice::error("Venditore non creato: controlla i campi.")];
        return Ok(render_vendors(&state, &session, notices, form.view(), errors).await);
    }

    let password_hash = hash_password(&form.password).map_err(|_| AppError::PasswordHash)?;
    let result = state
        .store
        .insert(
            Collection::Profiles,
            &[
                ("id", new_id().into()),
                ("username", form.username.trim().into()),
                ("first_name", form.first_name.trim().into()),
                ("last_name", form.last_name.trim().into()),
                ("email", form.email.trim().into()),
                ("phone", form.phone.as_deref().unwrap_or_default().trim().into()),
                ("role", Role::Vendor.as_str().into()),
                ("password_hash", password_hash.into()),
                ("active", Value::Int(1)),
                ("created_at", now_timestamp().into()),
            ],
        )
        .await;

    if let Err(err) = result {
        log::warn!("Vendor insert failed: {err}");
        let errors = vec![format!("Impossibile creare il venditore: {err}")];
        return Ok(render_vendors(&state, &session, Vec::new(), form.view(), errors).await);
    }

    log_activity(
        &state.store,
        "vendor_created",
        &format!(
            "{} ha aggiunto il venditore {} {}.",
            session.display_name,
            form.first_name.trim(),
            form.last_name.trim()
        ),
        Some(&session.user_id),
    )
    .await;

    let notices = vec![Notice::success("Venditore creato.")];
    Ok(render_vendors(&state, &session, notices, VendorFormView::default(), Vec::new()).await)
}

async fn render_vendors(
    state: &AppState,
    session: &Session,
    mut notices: Vec<Notice>,
    form: VendorFormView,
    errors: Vec<String>,
) -> HttpResponse {
    let vendors = fetch_vendors(&state.store).await.unwrap_or_else(|err| {
        log::warn!("Vendor list unavailable: {err}");
        notices.push(Notice::error("Impossibile caricare i venditori."));
        Vec::new()
    });
    let vendors = vendors
        .into_iter()
        .map(|vendor| VendorView {
            name: vendor.full_name(),
            email: vendor.email,
            phone: vendor.phone,
        })
        .collect();

    render(VendorsTemplate {
        layout: Layout::new(session, Area::Vendors, "Venditori").with_notices(notices),
        vendors,
        can_create: Area::ManageVendors.permits(session.role),
        form,
        errors,
    })
}

#[cfg(test)]
mod tests {
    use actix_web::{
        http::{header, StatusCode},
        test, App,
    };

    use super::*;
    use crate::routes::testing::{fixture, ADMIN_AUTH, OPERATOR_AUTH, VENDOR_AUTH};

    #[actix_web::test]
    async fn vendor_list_only_contains_vendors() {
        let fx = fixture().await;
        let vendors = fetch_vendors(&fx.state.store).await.unwrap();
        let ids: Vec<_> = vendors.iter().map(|vendor| vendor.id.as_str()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&fx.vendor_id.as_str()));
        assert!(ids.contains(&fx.other_vendor_id.as_str()));
    }

    #[actix_web::test]
    async fn vendors_are_sent_away_and_operators_cannot_create() {
        let fx = fixture().await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(fx.state.clone()))
                .configure(crate::routes::configure),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/app/vendors")
            .insert_header((header::AUTHORIZATION, VENDOR_AUTH))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(res.headers().get(header::LOCATION).unwrap(), "/app/appointments");

        let req = test::TestRequest::get()
            .uri("/app/vendors")
            .insert_header((header::AUTHORIZATION, OPERATOR_AUTH))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::post()
            .uri("/app/vendors")
            .insert_header((header::AUTHORIZATION, OPERATOR_AUTH))
            .set_form([
                ("username", "nuovo"),
                ("first_name", "Nuovo"),
                ("last_name", "Venditore"),
                ("email", "nuovo@example.com"),
                ("password", "lunga-abbastanza"),
            ])
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(res.headers().get(header::LOCATION).unwrap(), "/app/dashboard");
        assert_eq!(fetch_vendors(&fx.state.store).await.unwrap().len(), 2);
    }

    #[actix_web::test]
    async fn admins_create_vendors_who_can_then_sign_in() {
        let fx = fixture().await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(fx.state.clone()))
                .configure(crate::routes::configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/app/vendors")
            .insert_header((header::AUTHORIZATION, ADMIN_AUTH))
            .set_form([
                ("username", "nuovo"),
                ("first_name", "Nuovo"),
                ("last_name", "Venditore"),
                ("email", "nuovo@example.com"),
                ("phone", "333 000"),
                ("password", "lunga-abbastanza"),
            ])
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::OK);
        let html = String::from_utf8(test::read_body(res).await.to_vec()).unwrap();
        assert!(html.contains("Venditore creato."));
        assert!(html.contains("Nuovo Venditore"));

        let session =
            crate::auth::authenticate_credentials(&fx.state.store, "nuovo", "lunga-abbastanza")
                .await
                .unwrap();
        assert_eq!(session.role, Role::Vendor);
    }

    #[actix_web::test]
    async fn short_passwords_are_rejected_inline() {
        let fx = fixture().await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(fx.state.clone()))
                .configure(crate::routes::configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/app/vendors")
            .insert_header((header::AUTHORIZATION, ADMIN_AUTH))
            .set_form([
                ("username", "corto"),
                ("first_name", "Corto"),
                ("last_name", "Maltese"),
                ("email", "corto@example.com"),
                ("password", "123"),
            ])
            .to_request();
        let html = String::from_utf8(
            test::read_body(test::call_service(&app, req).await).await.to_vec(),
        )
        .unwrap();
        assert!(html.contains("almeno 6 caratteri"));
        assert_eq!(fetch_vendors(&fx.state.store).await.unwrap().len(), 2);
    }
}
