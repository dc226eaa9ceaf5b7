use std::collections::HashMap;

use actix_web::{web, HttpResponse, Result};
use askama::Template;
use chrono::{Local, NaiveDate};
use serde::Deserialize;

use crate::{
    auth::{new_id, Session},
    db::{log_activity, now_timestamp},
    error::AppError,
    models::{
        format_timestamp, parse_date, parse_timestamp, Appointment, AppointmentKind,
        AppointmentRow, Vendor, DATE_FORMAT,
    },
    notice::Notice,
    routes::vendors::fetch_vendors,
    schedule::{fetch_appointments, AppointmentQuery, Board, BoardKey, KindFilter},
    scope::{can_mutate_appointment, redirect_unless, Area, VendorScope},
    state::{AppState, ServerEvent},
    store::{Collection, Predicate, Query, Value},
    templates::{render, see_other, Layout, SelectOption},
};

#[derive(Clone, Debug)]
struct AppointmentView {
    id: String,
    title: String,
    client_name: String,
    kind_label: String,
    time_range: String,
    location: String,
    technician: String,
    notes: String,
    has_notes: bool,
    vendor_name: String,
    completed: bool,
    can_complete: bool,
}

#[derive(Clone, Debug, Default)]
struct AppointmentFormView {
    title: String,
    client_name: String,
    kind: String,
    starts_at: String,
    ends_at: String,
    location: String,
    notes: String,
}

#[derive(Template)]
#[template(path = "appointments.html")]
struct AppointmentsTemplate {
    layout: Layout,
    date: String,
    prev_date: String,
    next_date: String,
    kind: String,
    vendor: String,
    kinds: Vec<SelectOption>,
    show_vendor_filter: bool,
    vendors: Vec<SelectOption>,
    appointments: Vec<AppointmentView>,
    form: AppointmentFormView,
    form_kinds: Vec<SelectOption>,
    form_vendors: Vec<SelectOption>,
    errors: Vec<String>,
}

#[derive(Deserialize)]
struct BoardParams {
    date: Option<String>,
    kind: Option<String>,
    vendor: Option<String>,
}

#[derive(Deserialize)]
struct AppointmentForm {
    title: String,
    client_name: String,
    kind: String,
    starts_at: String,
    ends_at: String,
    location: Option<String>,
    notes: Option<String>,
    vendor_id: Option<String>,
}

struct NewAppointment {
    title: String,
    client_name: String,
    kind: AppointmentKind,
    starts_at: chrono::NaiveDateTime,
    ends_at: chrono::NaiveDateTime,
    location: String,
    notes: Option<String>,
    vendor_id: Option<String>,
}

impl AppointmentForm {
    fn validate(
        &self,
        session: &Session,
        vendors: &[Vendor],
    ) -> Result<NewAppointment, Vec<String>> {
        let mut errors = Vec::new();
        if self.title.trim().is_empty() {
            errors.push("Il titolo è obbligatorio.".to_string());
        }
        if self.client_name.trim().is_empty() {
            errors.push("Il cliente è obbligatorio.".to_string());
        }
        let kind = self.kind.parse::<AppointmentKind>().ok();
        if kind.is_none() {
            errors.push("Seleziona un tipo di appuntamento.".to_string());
        }
        let starts_at = parse_timestamp(&self.starts_at);
        if starts_at.is_none() {
            errors.push("Indica data e ora di inizio.".to_string());
        }
        let ends_at = parse_timestamp(&self.ends_at);
        if ends_at.is_none() {
            errors.push("Indica data e ora di fine.".to_string());
        }
        if let (Some(start), Some(end)) = (starts_at, ends_at) {
            if end <= start {
                errors.push("La fine deve essere successiva all'inizio.".to_string());
            }
        }

        let requested = VendorScope::from_param(self.vendor_id.as_deref());
        let vendor_id = session.scope(requested).vendor_id().map(str::to_string);
        if let Some(id) = vendor_id.as_deref() {
            let known = session.user_id == id || vendors.iter().any(|vendor| vendor.id == id);
            if !known {
                errors.push("Venditore non valido.".to_string());
            }
        }

        match (kind, starts_at, ends_at) {
            (Some(kind), Some(starts_at), Some(ends_at)) if errors.is_empty() => Ok(NewAppointment {
                title: self.title.trim().to_string(),
                client_name: self.client_name.trim().to_string(),
                kind,
                starts_at,
                ends_at,
                location: self.location.clone().unwrap_or_default().trim().to_string(),
                notes: self
                    .notes
                    .as_deref()
                    .map(str::trim)
                    .filter(|notes| !notes.is_empty())
                    .map(str::to_string),
                vendor_id,
            }),
            _ => Err(errors),
        }
    }

    fn view(&self) -> AppointmentFormView {
        AppointmentFormView {
            title: self.title.clone(),
            client_name: self.client_name.clone(),
            kind: self.kind.clone(),
            starts_at: self.starts_at.clone(),
            ends_at: self.ends_at.clone(),
            location: self.location.clone().unwrap_or_default(),
            notes: self.notes.clone().unwrap_or_default(),
        }
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/appointments")
            .route(web::get().to(list_appointments))
            .route(web::post().to(create_appointment)),
    )
    .service(
        web::resource("/appointments/{id}/complete").route(web::post().to(complete_appointment)),
    );
}

async fn list_appointments(
    state: web::Data<AppState>,
    session: web::ReqData<Session>,
    params: web::Query<BoardParams>,
) -> Result<HttpResponse> {
    let session = session.into_inner();
    if let Some(redirect) = redirect_unless(&session, Area::Appointments) {
        return Ok(redirect);
    }

    let (query, notices) = board_query(&params.into_inner());
    let board = load_board(&state, &session, query).await;
    let form = AppointmentFormView::default();
    Ok(render_board(&state, &session, board, notices, form, Vec::new()).await)
}

async fn create_appointment(
    state: web::Data<AppState>,
    session: web::ReqData<Session>,
    form: web::Form<AppointmentForm>,
) -> Result<HttpResponse> {
    let session = session.into_inner();
    if let Some(redirect) = redirect_unless(&session, Area::Appointments) {
        return Ok(redirect);
    }
    let form = form.into_inner();
    let vendors = fetch_vendors(&state.store).await.unwrap_or_else(|err| {
        log::warn!("Vendor list unavailable: {err}");
        Vec::new()
    });

    let new = match form.validate(&session, &vendors) {
        Ok(new) => new,
        Err(errors) => {
            let date = parse_timestamp(&form.starts_at)
                .map(|at| at.date())
                .unwrap_or_else(today);
            let board = load_board(&state, &session, AppointmentQuery::for_date(date)).await;
            let notices = vec![Notice::error("Appuntamento non salvato: controlla i campi.")];
            return Ok(render_board(&state, &session, board, notices, form.view(), errors).await);
        }
    };

    let appointment = Appointment {
        id: new_id(),
        title: new.title,
        client_name: new.client_name,
        kind: new.kind,
        starts_at: new.starts_at,
        ends_at: new.ends_at,
        location: new.location,
        technician: String::new(),
        notes: new.notes.clone().unwrap_or_default(),
        vendor_id: new.vendor_id,
        completed_at: None,
    };

    state
        .store
        .insert(
            Collection::Appointments,
            &[
                ("id", appointment.id.clone().into()),
                ("title", appointment.title.clone().into()),
                ("client_name", appointment.client_name.clone().into()),
                ("kind", appointment.kind.as_str().into()),
                ("starts_at", format_timestamp(appointment.starts_at).into()),
                ("ends_at", format_timestamp(appointment.ends_at).into()),
                ("location", appointment.location.clone().into()),
                ("notes", new.notes.into()),
                ("vendor_id", appointment.vendor_id.clone().into()),
                ("created_at", now_timestamp().into()),
            ],
        )
        .await
        .map_err(AppError::from)?;

    log_activity(
        &state.store,
        "appointment_created",
        &format!(
            "{} ha creato l'appuntamento \"{}\" per {}.",
            session.display_name, appointment.title, appointment.client_name
        ),
        Some(&session.user_id),
    )
    .await;
    state.publish(ServerEvent::from_appointment("appointment_created", &appointment));

    Ok(see_other(&board_url(appointment.starts_at.date())))
}

async fn complete_appointment(
    state: web::Data<AppState>,
    session: web::ReqData<Session>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let session = session.into_inner();
    let appointment_id = path.into_inner();

    let query = Query::new(Collection::Appointments)
        .filter(Predicate::Eq("id", appointment_id.as_str().into()))
        .limit(1);
    let row = state
        .store
        .query::<AppointmentRow>(&query)
        .await
        .map_err(AppError::from)?
        .into_iter()
        .next()
        .ok_or(AppError::NotFound)?;
    let mut appointment = Appointment::try_from(row).map_err(AppError::from)?;

    if !can_mutate_appointment(&session, appointment.vendor_id.as_deref()) {
        log::info!(
            "{} may not complete appointment {}",
            session.display_name,
            appointment.id
        );
        return Ok(see_other(session.role.home_route()));
    }

    if appointment.completed_at.is_none() {
        let completed_at = now_timestamp();
        state
            .store
            .update(
                Collection::Appointments,
                &appointment.id,
                &[("completed_at", Value::from(completed_at.as_str()))],
            )
            .await
            .map_err(AppError::from)?;
        appointment.completed_at = Some(completed_at);

        log_activity(
            &state.store,
            "appointment_completed",
            &format!(
                "{} ha completato l'appuntamento \"{}\".",
                session.display_name, appointment.title
            ),
            Some(&session.user_id),
        )
        .await;
        state.publish(ServerEvent::from_appointment("appointment_completed", &appointment));
    }

    Ok(see_other(&board_url(appointment.starts_at.date())))
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn board_url(date: NaiveDate) -> String {
    format!("/app/appointments?date={}", date.format(DATE_FORMAT))
}

/// Board parameters from the query string. Bad values fall back to today /
/// all kinds and say so.
fn board_query(params: &BoardParams) -> (AppointmentQuery, Vec<Notice>) {
    let mut notices = Vec::new();
    let date = match params.date.as_deref().map(str::trim) {
        None | Some("") => today(),
        Some(raw) => parse_date(raw).unwrap_or_else(|| {
            notices.push(Notice::info(format!("Data \"{raw}\" non valida: mostro oggi.")));
            today()
        }),
    };
    let kind = params
        .kind
        .as_deref()
        .unwrap_or_default()
        .parse::<KindFilter>()
        .unwrap_or_else(|err| {
            log::debug!("Ignoring kind filter: {err}");
            notices.push(Notice::info("Tipo non riconosciuto: mostro tutti i tipi."));
            KindFilter::All
        });
    let vendor = VendorScope::from_param(params.vendor.as_deref());

    (
        AppointmentQuery::for_date(date).kind(kind).vendor(vendor),
        notices,
    )
}

/// Runs the board query under a fresh ticket. If a newer request for the
/// same user and the same board already landed, that newer board is shown.
async fn load_board(state: &AppState, session: &Session, query: AppointmentQuery) -> Board {
    let key = BoardKey::new(session, &query);
    let ticket = state.boards.begin();
    let fetched = fetch_appointments(&state.store, session, &query).await;
    let board = Board {
        query,
        appointments: fetched.items,
        notice: fetched.notice,
    };
    let commit = state.boards.commit(key, ticket, board);
    if commit.is_stale() {
        log::debug!("Discarded stale board for {}", session.user_id);
    }
    commit.into_inner()
}

async fn render_board(
    state: &AppState,
    session: &Session,
    board: Board,
    notices: Vec<Notice>,
    form: AppointmentFormView,
    errors: Vec<String>,
) -> HttpResponse {
    let show_vendor_filter = Area::Vendors.permits(session.role);
    let mut layout_notices = notices;
    let vendors = if show_vendor_filter {
        fetch_vendors(&state.store).await.unwrap_or_else(|err| {
            log::warn!("Vendor list unavailable: {err}");
            layout_notices.push(Notice::error("Elenco venditori non disponibile."));
            Vec::new()
        })
    } else {
        Vec::new()
    };
    let names: HashMap<&str, String> = vendors
        .iter()
        .map(|vendor| (vendor.id.as_str(), vendor.full_name()))
        .collect();

    let query = &board.query;
    let scope = session.scope(query.vendor.clone());
    let selected_vendor = scope.vendor_id().unwrap_or("all").to_string();

    let mut filter_vendors = vec![SelectOption::new(
        "all",
        "Tutti i venditori",
        scope == VendorScope::All,
    )];
    filter_vendors.extend(vendors.iter().map(|vendor| {
        let selected = scope.vendor_id() == Some(vendor.id.as_str());
        SelectOption::new(&vendor.id, &vendor.full_name(), selected)
    }));
    let mut form_vendors = vec![SelectOption::new("", "Nessuno", true)];
    form_vendors.extend(
        vendors
            .iter()
            .map(|vendor| SelectOption::new(&vendor.id, &vendor.full_name(), false)),
    );

    let mut kinds = vec![SelectOption::new("all", "Tutti i tipi", query.kind == KindFilter::All)];
    kinds.extend(AppointmentKind::ALL.into_iter().map(|kind| {
        SelectOption::new(kind.as_str(), kind.label(), query.kind == KindFilter::Only(kind))
    }));
    let form_kinds = AppointmentKind::ALL
        .into_iter()
        .enumerate()
        .map(|(index, kind)| {
            let selected = if form.kind.is_empty() {
                index == 0
            } else {
                form.kind == kind.as_str()
            };
            SelectOption::new(kind.as_str(), kind.label(), selected)
        })
        .collect();

    let appointments = board
        .appointments
        .iter()
        .map(|appointment| to_view(session, appointment, &names))
        .collect();

    let date = query.date;
    render(AppointmentsTemplate {
        layout: Layout::new(session, Area::Appointments, "Appuntamenti")
            .with_notices(layout_notices)
            .with_notices(board.notice.clone()),
        date: date.format(DATE_FORMAT).to_string(),
        prev_date: date.pred_opt().unwrap_or(date).format(DATE_FORMAT).to_string(),
        next_date: date.succ_opt().unwrap_or(date).format(DATE_FORMAT).to_string(),
        kind: query.kind.as_str().to_string(),
        vendor: selected_vendor,
        kinds,
        show_vendor_filter,
        vendors: filter_vendors,
        appointments,
        form,
        form_kinds,
        form_vendors,
        errors,
    })
}

fn to_view(
    session: &Session,
    appointment: &Appointment,
    names: &HashMap<&str, String>,
) -> AppointmentView {
    let vendor_name = match appointment.vendor_id.as_deref() {
        None => "Non assegnato".to_string(),
        Some(id) if id == session.user_id => session.display_name.clone(),
        Some(id) => names.get(id).cloned().unwrap_or_else(|| id.to_string()),
    };
    AppointmentView {
        id: appointment.id.clone(),
        title: appointment.title.clone(),
        client_name: appointment.client_name.clone(),
        kind_label: appointment.kind.label().to_string(),
        time_range: format!(
            "{} – {}",
            appointment.starts_at.format("%H:%M"),
            appointment.ends_at.format("%H:%M")
        ),
        location: appointment.location.clone(),
        technician: appointment.technician.clone(),
        notes: appointment.notes.clone(),
        has_notes: !appointment.notes.trim().is_empty(),
        vendor_name,
        completed: appointment.completed_at.is_some(),
        can_complete: appointment.completed_at.is_none()
            && can_mutate_appointment(session, appointment.vendor_id.as_deref()),
    }
}
