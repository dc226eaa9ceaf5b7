use actix_web::{web, HttpResponse, Result};
use askama::Template;
use chrono::{Local, NaiveDate};
use serde::Deserialize;

use crate::{
    auth::{new_id, Session},
    db::{log_activity, now_timestamp},
    error::AppError,
    models::{parse_date, PipelineItem, ProjectRow, Stage, StageKind, DATE_FORMAT},
    notice::Notice,
    paginate::{filter, paginate, ListState},
    schedule::Fetched,
    scope::{redirect_unless, Area},
    state::AppState,
    store::{Collection, Direction, Predicate, Query, Store, Value},
    templates::{render, see_other, Layout},
};

#[derive(Clone, Debug)]
struct ProjectView {
    id: String,
    title: String,
    client_name: String,
    amount: String,
    detail: String,
    progress: Option<u8>,
    can_advance: bool,
    advance_label: String,
}

#[derive(Clone, Debug)]
struct ColumnView {
    label: String,
    items: Vec<ProjectView>,
}

#[derive(Clone, Debug, Default)]
struct ProjectFormView {
    title: String,
    client_name: String,
    amount: String,
    deadline: String,
}

#[derive(Template)]
#[template(path = "projects.html")]
struct ProjectsTemplate {
    layout: Layout,
    term: String,
    columns: Vec<ColumnView>,
    page_number: usize,
    total_pages: usize,
    total_items: usize,
    has_prev: bool,
    has_next: bool,
    prev_page: usize,
    next_page: usize,
    form: ProjectFormView,
    errors: Vec<String>,
}

#[derive(Deserialize)]
struct ListParams {
    q: Option<String>,
    page: Option<usize>,
    prev_q: Option<String>,
}

#[derive(Deserialize)]
struct ProjectForm {
    title: String,
    client_name: String,
    amount: String,
    deadline: Option<String>,
}

struct NewProject {
    title: String,
    client_name: String,
    amount: f64,
    deadline: Option<NaiveDate>,
}

impl ProjectForm {
    fn validate(&self) -> Result<NewProject, Vec<String>> {
        let mut errors = Vec::new();
        if self.title.trim().is_empty() {
            errors.push("Il titolo è obbligatorio.".to_string());
        }
        if self.client_name.trim().is_empty() {
            errors.push("Il cliente è obbligatorio.".to_string());
        }
        let amount = parse_amount(&self.amount);
        if amount.is_none() {
            errors.push("Importo non valido.".to_string());
        }
        let deadline = match self.deadline.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => {
                let parsed = parse_date(raw);
                if parsed.is_none() {
                    errors.push("Scadenza non valida.".to_string());
                }
                parsed
            }
        };

        match amount {
            Some(amount) if errors.is_empty() => Ok(NewProject {
                title: self.title.trim().to_string(),
                client_name: self.client_name.trim().to_string(),
                amount,
                deadline,
            }),
            _ => Err(errors),
        }
    }

    fn view(&self) -> ProjectFormView {
        ProjectFormView {
            title: self.title.clone(),
            client_name: self.client_name.clone(),
            amount: self.amount.clone(),
            deadline: self.deadline.clone().unwrap_or_default(),
        }
    }
}

/// Non-negative amount; accepts a decimal comma.
fn parse_amount(raw: &str) -> Option<f64> {
    let amount = raw.trim().replace(',', ".").parse::<f64>().ok()?;
    (amount.is_finite() && amount >= 0.0).then_some(amount)
}

#[derive(Deserialize)]
struct ProgressForm {
    progress: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/projects")
            .route(web::get().to(list_projects))
            .route(web::post().to(create_project)),
    )
    .service(web::resource("/projects/{id}/advance").route(web::post().to(advance_project)))
    .service(web::resource("/projects/{id}/progress").route(web::post().to(update_progress)));
}

async fn fetch_projects(store: &Store) -> Fetched<PipelineItem> {
    let query = Query::new(Collection::Projects).order_by("created_at", Direction::Desc);
    match store.query::<ProjectRow>(&query).await {
        Ok(rows) => Fetched {
            items: rows
                .into_iter()
                .filter_map(|row| match PipelineItem::try_from(row) {
                    Ok(item) => Some(item),
                    Err(err) => {
                        log::warn!("Skipping project: {err}");
                        None
                    }
                })
                .collect(),
            notice: None,
        },
        Err(err) => {
            log::warn!("Projects query failed: {err}");
            Fetched {
                items: Vec::new(),
                notice: Some(Notice::error("Impossibile caricare i progetti.")),
            }
        }
    }
}

async fn find_project(store: &Store, id: &str) -> Result<PipelineItem, AppError> {
    let query = Query::new(Collection::Projects)
        .filter(Predicate::Eq("id", id.into()))
        .limit(1);
    let row = store
        .query::<ProjectRow>(&query)
        .await?
        .into_iter()
        .next()
        .ok_or(AppError::NotFound)?;
    Ok(PipelineItem::try_from(row)?)
}

async fn list_projects(
    state: web::Data<AppState>,
    session: web::ReqData<Session>,
    params: web::Query<ListParams>,
) -> Result<HttpResponse> {
    let session = session.into_inner();
    if let Some(redirect) = redirect_unless(&session, Area::Projects) {
        return Ok(redirect);
    }
    let previous = ListState::restore(params.prev_q.as_deref(), None, params.page);
    let term = params.q.clone().unwrap_or_else(|| previous.term.clone());
    let list = previous.with_term(&term);
    let form = ProjectFormView::default();
    Ok(render_projects(&state, &session, list, Vec::new(), form, Vec::new()).await)
}

async fn create_project(
    state: web::Data<AppState>,
    session: web::ReqData<Session>,
    form: web::Form<ProjectForm>,
) -> Result<HttpResponse> {
    let session = session.into_inner();
    if let Some(redirect) = redirect_unless(&session, Area::Projects) {
        return Ok(redirect);
    }
    let form = form.into_inner();
    let new = match form.validate() {
        Ok(new) => new,
        Err(errors) => {
            let notices = vec![Notice::error("Progetto non salvato: controlla i campi.")];
            return Ok(render_projects(
                &state,
                &session,
                ListState::restore(None, None, None),
                notices,
                form.view(),
                errors,
            )
            .await);
        }
    };

    state
        .store
        .insert(
            Collection::Projects,
            &[
                ("id", new_id().into()),
                ("title", new.title.as_str().into()),
                ("client_name", new.client_name.as_str().into()),
                ("amount", Value::Real(new.amount)),
                ("stage", StageKind::Quote.as_str().into()),
                (
                    "deadline",
                    new.deadline
                        .map(|date| date.format(DATE_FORMAT).to_string())
                        .into(),
                ),
                ("invoiced", Value::Int(0)),
                ("created_at", now_timestamp().into()),
            ],
        )
        .await
        .map_err(AppError::from)?;

    log_activity(
        &state.store,
        "project_created",
        &format!(
            "{} ha creato il preventivo \"{}\" per {}.",
            session.display_name, new.title, new.client_name
        ),
        Some(&session.user_id),
    )
    .await;

    Ok(see_other("/app/projects"))
}

/// Columns written when an item enters `stage`.
fn stage_patch(stage: &Stage) -> Vec<(&'static str, Value)> {
    let date = |date: &NaiveDate| Value::from(date.format(DATE_FORMAT).to_string());
    let mut patch = vec![("stage", Value::from(stage.kind().as_str()))];
    match stage {
        Stage::Quote { deadline } => {
            patch.push(("deadline", deadline.as_ref().map(date).unwrap_or(Value::Null)))
        }
        Stage::Approved { start_date } => {
            patch.push(("start_date", start_date.as_ref().map(date).unwrap_or(Value::Null)))
        }
        Stage::InProgress { progress } => {
            patch.push(("progress", Value::Int(i64::from(*progress))))
        }
        Stage::Completed {
            completed_on,
            invoiced,
        } => {
            patch.push(("completed_on", date(completed_on)));
            patch.push(("invoiced", Value::Bool(*invoiced)));
        }
    }
    patch
}

async fn advance_project(
    state: web::Data<AppState>,
    session: web::ReqData<Session>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let session = session.into_inner();
    if let Some(redirect) = redirect_unless(&session, Area::Projects) {
        return Ok(redirect);
    }
    let item = find_project(&state.store, &path.into_inner()).await?;

    let Some(next) = item.stage.advance(Local::now().date_naive()) else {
        let notices = vec![Notice::info(format!("\"{}\" è già completato.", item.title))];
        return Ok(render_projects(
            &state,
            &session,
            ListState::restore(None, None, None),
            notices,
            ProjectFormView::default(),
            Vec::new(),
        )
        .await);
    };

    state
        .store
        .update(Collection::Projects, &item.id, &stage_patch(&next))
        .await
        .map_err(AppError::from)?;

    log_activity(
        &state.store,
        "project_advanced",
        &format!(
            "{} ha spostato \"{}\" in {}.",
            session.display_name,
            item.title,
            next.kind().label()
        ),
        Some(&session.user_id),
    )
    .await;

    Ok(see_other("/app/projects"))
}

async fn update_progress(
    state: web::Data<AppState>,
    session: web::ReqData<Session>,
    path: web::Path<String>,
    form: web::Form<ProgressForm>,
) -> Result<HttpResponse> {
    let session = session.into_inner();
    if let Some(redirect) = redirect_unless(&session, Area::Projects) {
        return Ok(redirect);
    }
    let item = find_project(&state.store, &path.into_inner()).await?;

    let progress = form.progress.trim().parse::<i64>().ok().map(|value| value.clamp(0, 100));
    let notice = match (&item.stage, progress) {
        (Stage::InProgress { .. }, Some(progress)) => {
            state
                .store
                .update(
                    Collection::Projects,
                    &item.id,
                    &stage_patch(&Stage::InProgress {
                        progress: progress as u8,
                    }),
                )
                .await
                .map_err(AppError::from)?;
            log::debug!("Progress of {} set to {progress}%", item.id);
            return Ok(see_other("/app/projects"));
        }
        (Stage::InProgress { .. }, None) => Notice::error("Avanzamento non valido."),
        _ => Notice::info(format!("\"{}\" non è in lavorazione.", item.title)),
    };

    Ok(render_projects(
        &state,
        &session,
        ListState::restore(None, None, None),
        vec![notice],
        ProjectFormView::default(),
        Vec::new(),
    )
    .await)
}

async fn render_projects(
    state: &AppState,
    session: &Session,
    list: ListState,
    mut notices: Vec<Notice>,
    form: ProjectFormView,
    errors: Vec<String>,
) -> HttpResponse {
    let fetched = fetch_projects(&state.store).await;
    notices.extend(fetched.notice);

    let matches = filter(&fetched.items, &list.term);
    let page = paginate(&matches, list.page, state.config.projects_page_size);

    let columns = StageKind::ALL
        .into_iter()
        .map(|kind| ColumnView {
            label: kind.label().to_string(),
            items: page
                .items
                .iter()
                .filter(|item| item.stage.kind() == kind)
                .map(to_view)
                .collect(),
        })
        .collect();

    render(ProjectsTemplate {
        layout: Layout::new(session, Area::Projects, "Progetti").with_notices(notices),
        term: list.term,
        columns,
        page_number: page.number,
        total_pages: page.total_pages,
        total_items: page.total_items,
        has_prev: page.has_prev(),
        has_next: page.has_next(),
        prev_page: page.prev_number(),
        next_page: page.next_number(),
        form,
        errors,
    })
}

fn to_view(item: &PipelineItem) -> ProjectView {
    let format_date = |date: &NaiveDate| date.format("%d/%m/%Y").to_string();
    let (detail, progress) = match &item.stage {
        Stage::Quote { deadline } => (
            deadline
                .as_ref()
                .map(|date| format!("Scadenza {}", format_date(date)))
                .unwrap_or_default(),
            None,
        ),
        Stage::Approved { start_date } => (
            start_date
                .as_ref()
                .map(|date| format!("Avvio {}", format_date(date)))
                .unwrap_or_default(),
            None,
        ),
        Stage::InProgress { progress } => (format!("{progress}%"), Some(*progress)),
        Stage::Completed {
            completed_on,
            invoiced,
        } => (
            format!(
                "Chiuso il {}{}",
                format_date(completed_on),
                if *invoiced { ", fatturato" } else { "" }
            ),
            None,
        ),
    };
    let next = match item.stage.kind() {
        StageKind::Quote => "Approva",
        StageKind::Approved => "Avvia",
        StageKind::InProgress => "Completa",
        StageKind::Completed => "",
    };

    ProjectView {
        id: item.id.clone(),
        title: item.title.clone(),
        client_name: item.client_name.clone(),
        amount: format!("€ {:.2}", item.amount),
        detail,
        progress,
        can_advance: !next.is_empty(),
        advance_label: next.to_string(),
    }
}
