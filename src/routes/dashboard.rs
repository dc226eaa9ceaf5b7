use actix_web::{web, HttpResponse, Result};
use askama::Template;
use chrono::Local;

use crate::{
    auth::Session,
    db::recent_activities,
    models::{parse_timestamp, StageKind, DATE_FORMAT},
    notice::Notice,
    schedule::{fetch_appointments, AppointmentQuery},
    scope::{redirect_unless, Area, VendorScope},
    state::AppState,
    store::{Collection, Predicate, Query, Store},
    templates::{render, Layout},
};

const ACTIVITY_LIMIT: i64 = 8;

#[derive(Clone, Debug)]
struct StatView {
    label: String,
    value: i64,
}

#[derive(Clone, Debug)]
struct AgendaView {
    time: String,
    title: String,
    client_name: String,
    completed: bool,
}

#[derive(Clone, Debug)]
struct ActivityView {
    when: String,
    message: String,
}

#[derive(Template)]
#[template(path = "dashboard.html")]
struct DashboardTemplate {
    layout: Layout,
    today: String,
    agenda: Vec<AgendaView>,
    stats: Vec<StatView>,
    activities: Vec<ActivityView>,
    show_activity: bool,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/dashboard").route(web::get().to(dashboard)));
}

async fn count(store: &Store, query: Query, notices: &mut Vec<Notice>) -> i64 {
    match store.count(&query).await {
        Ok(count) => count,
        Err(err) => {
            log::warn!("Dashboard count failed: {err}");
            if notices.is_empty() {
                notices.push(Notice::error("Alcuni dati non sono disponibili."));
            }
            0
        }
    }
}

async fn dashboard(
    state: web::Data<AppState>,
    session: web::ReqData<Session>,
) -> Result<HttpResponse> {
    let session = session.into_inner();
    if let Some(redirect) = redirect_unless(&session, Area::Dashboard) {
        return Ok(redirect);
    }

    let today = Local::now().date_naive();
    let query = AppointmentQuery::for_date(today).vendor(VendorScope::All);
    let fetched = fetch_appointments(&state.store, &session, &query).await;
    let mut notices: Vec<Notice> = fetched.notice.into_iter().collect();

    let mut stats = vec![StatView {
        label: "Appuntamenti oggi".to_string(),
        value: fetched.items.len() as i64,
    }];

    let staff = Area::Contacts.permits(session.role);
    if staff {
        let contacts = count(&state.store, Query::new(Collection::Contacts), &mut notices).await;
        stats.push(StatView {
            label: "Contatti".to_string(),
            value: contacts,
        });
        for kind in StageKind::ALL {
            let query = Query::new(Collection::Projects)
                .filter(Predicate::Eq("stage", kind.as_str().into()));
            let value = count(&state.store, query, &mut notices).await;
            stats.push(StatView {
                label: kind.label().to_string(),
                value,
            });
        }
    }

    let activities = if staff {
        recent_activities(&state.store, ACTIVITY_LIMIT)
            .await
            .into_iter()
            .map(|row| ActivityView {
                when: parse_timestamp(&row.created_at)
                    .map(|at| at.format("%d/%m %H:%M").to_string())
                    .unwrap_or(row.created_at),
                message: row.message,
            })
            .collect()
    } else {
        Vec::new()
    };

    let agenda = fetched
        .items
        .iter()
        .map(|appointment| AgendaView {
            time: appointment.starts_at.format("%H:%M").to_string(),
            title: appointment.title.clone(),
            client_name: appointment.client_name.clone(),
            completed: appointment.completed_at.is_some(),
        })
        .collect();

    Ok(render(DashboardTemplate {
        layout: Layout::new(&session, Area::Dashboard, "Dashboard").with_notices(notices),
        today: today.format(DATE_FORMAT).to_string(),
        agenda,
        stats,
        activities,
        show_activity: staff,
    }))
}
