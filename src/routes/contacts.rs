use actix_web::{web, HttpResponse, Result};
use askama::Template;
use serde::Deserialize;

use crate::{
    auth::{new_id, Session},
    db::{log_activity, now_timestamp},
    error::AppError,
    models::{looks_like_email, Contact, ContactCategory, ContactRow, ContactStatus},
    notice::Notice,
    paginate::{filter, paginate, ListState, ALL_TAB},
    schedule::Fetched,
    scope::{redirect_unless, Area},
    state::AppState,
    store::{Collection, Direction, Query, Store},
    templates::{render, see_other, Layout, SelectOption},
};

#[derive(Clone, Debug)]
struct ContactView {
    id: String,
    name: String,
    category_label: String,
    email: String,
    phone: String,
    city: String,
    status: String,
}

#[derive(Clone, Debug, Default)]
struct ContactFormView {
    name: String,
    email: String,
    phone: String,
    city: String,
}

#[derive(Template)]
#[template(path = "contacts.html")]
struct ContactsTemplate {
    layout: Layout,
    term: String,
    tab: String,
    tabs: Vec<SelectOption>,
    contacts: Vec<ContactView>,
    page_number: usize,
    total_pages: usize,
    total_items: usize,
    has_prev: bool,
    has_next: bool,
    prev_page: usize,
    next_page: usize,
    form: ContactFormView,
    form_categories: Vec<SelectOption>,
    errors: Vec<String>,
}

/// `prev_q` / `prev_tab` echo what the page was rendered with, so a changed
/// term or tab can be told apart from plain paging.
#[derive(Deserialize, Default)]
struct ListParams {
    q: Option<String>,
    tab: Option<String>,
    page: Option<usize>,
    prev_q: Option<String>,
    prev_tab: Option<String>,
}

#[derive(Deserialize)]
struct ContactForm {
    name: String,
    category: String,
    email: Option<String>,
    phone: Option<String>,
    city: Option<String>,
}

impl ContactForm {
    fn validate(&self) -> Result<ContactCategory, Vec<String>> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() {
            errors.push("Il nome è obbligatorio.".to_string());
        }
        let email = self.email.as_deref().unwrap_or_default().trim();
        if !email.is_empty() && !looks_like_email(email) {
            errors.push("Indirizzo email non valido.".to_string());
        }
        let category = self.category.parse::<ContactCategory>().ok();
        if category.is_none() {
            errors.push("Seleziona una categoria.".to_string());
        }
        match category {
            Some(category) if errors.is_empty() => Ok(category),
            _ => Err(errors),
        }
    }

    fn view(&self) -> ContactFormView {
        ContactFormView {
            name: self.name.clone(),
            email: self.email.clone().unwrap_or_default(),
            phone: self.phone.clone().unwrap_or_default(),
            city: self.city.clone().unwrap_or_default(),
        }
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/contacts")
            .route(web::get().to(list_contacts))
            .route(web::post().to(create_contact)),
    )
    .service(web::resource("/contacts/{id}/delete").route(web::post().to(delete_contact)));
}

async fn fetch_contacts(store: &Store) -> Fetched<Contact> {
    let query = Query::new(Collection::Contacts).order_by("name", Direction::Asc);
    match store.query::<ContactRow>(&query).await {
        Ok(rows) => Fetched {
            items: rows
                .into_iter()
                .filter_map(|row| match Contact::try_from(row) {
                    Ok(contact) => Some(contact),
                    Err(err) => {
                        log::warn!("Skipping contact: {err}");
                        None
                    }
                })
                .collect(),
            notice: None,
        },
        Err(err) => {
            log::warn!("Contacts query failed: {err}");
            Fetched {
                items: Vec::new(),
                notice: Some(Notice::error("Impossibile caricare i contatti.")),
            }
        }
    }
}

fn list_state(params: &ListParams) -> ListState {
    let previous = ListState::restore(
        params.prev_q.as_deref(),
        params.prev_tab.as_deref(),
        params.page,
    );
    let term = params.q.clone().unwrap_or_else(|| previous.term.clone());
    let tab = params.tab.clone().unwrap_or_else(|| previous.tab.clone());
    previous.with_term(&term).with_tab(&tab)
}

async fn list_contacts(
    state: web::Data<AppState>,
    session: web::ReqData<Session>,
    params: web::Query<ListParams>,
) -> Result<HttpResponse> {
    let session = session.into_inner();
    if let Some(redirect) = redirect_unless(&session, Area::Contacts) {
        return Ok(redirect);
    }
    let list = list_state(&params);
    let form = ContactFormView::default();
    Ok(render_contacts(&state, &session, list, Vec::new(), form, None, Vec::new()).await)
}

async fn create_contact(
    state: web::Data<AppState>,
    session: web::ReqData<Session>,
    form: web::Form<ContactForm>,
) -> Result<HttpResponse> {
    let session = session.into_inner();
    if let Some(redirect) = redirect_unless(&session, Area::Contacts) {
        return Ok(redirect);
    }
    let form = form.into_inner();
    let category = match form.validate() {
        Ok(category) => category,
        Err(errors) => {
            let notices = vec![Notice::error("Contatto non salvato: controlla i campi.")];
            let selected = form.category.clone();
            return Ok(render_contacts(
                &state,
                &session,
                ListState::restore(None, None, None),
                notices,
                form.view(),
                Some(selected),
                errors,
            )
            .await);
        }
    };

    let name = form.name.trim();
    state
        .store
        .insert(
            Collection::Contacts,
            &[
                ("id", new_id().into()),
                ("name", name.into()),
                ("category", category.as_str().into()),
                ("email", form.email.as_deref().unwrap_or_default().trim().into()),
                ("phone", form.phone.as_deref().unwrap_or_default().trim().into()),
                ("city", form.city.as_deref().unwrap_or_default().trim().into()),
                ("status", ContactStatus::Active.as_str().into()),
                ("created_at", now_timestamp().into()),
            ],
        )
        .await
        .map_err(AppError::from)?;

    log_activity(
        &state.store,
        "contact_created",
        &format!("{} ha aggiunto il contatto {}.", session.display_name, name),
        Some(&session.user_id),
    )
    .await;

    Ok(see_other(&format!("/app/contacts?tab={}", category.as_str())))
}

async fn delete_contact(
    state: web::Data<AppState>,
    session: web::ReqData<Session>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let session = session.into_inner();
    if let Some(redirect) = redirect_unless(&session, Area::Contacts) {
        return Ok(redirect);
    }
    let id = path.into_inner();
    let removed = state
        .store
        .delete(Collection::Contacts, &id)
        .await
        .map_err(AppError::from)?;
    if removed == 0 {
        return Err(AppError::NotFound.into());
    }

    log_activity(
        &state.store,
        "contact_deleted",
        &format!("{} ha eliminato un contatto.", session.display_name),
        Some(&session.user_id),
    )
    .await;

    Ok(see_other("/app/contacts"))
}

async fn render_contacts(
    state: &AppState,
    session: &Session,
    list: ListState,
    mut notices: Vec<Notice>,
    form: ContactFormView,
    form_category: Option<String>,
    errors: Vec<String>,
) -> HttpResponse {
    let fetched = fetch_contacts(&state.store).await;
    notices.extend(fetched.notice);

    let category = if list.tab == ALL_TAB {
        None
    } else {
        match list.tab.parse::<ContactCategory>() {
            Ok(category) => Some(category),
            Err(err) => {
                log::debug!("Ignoring contacts tab: {err}");
                notices.push(Notice::info("Categoria non riconosciuta: mostro tutti i contatti."));
                None
            }
        }
    };
    let list = match category {
        Some(_) => list,
        None => list.with_tab(ALL_TAB),
    };

    let in_tab: Vec<Contact> = fetched
        .items
        .into_iter()
        .filter(|contact| category.map_or(true, |category| contact.category == category))
        .collect();
    let matches = filter(&in_tab, &list.term);
    let page = paginate(&matches, list.page, state.config.contacts_page_size);

    let mut tabs = vec![SelectOption::new(ALL_TAB, "Tutti", category.is_none())];
    tabs.extend(ContactCategory::ALL.into_iter().map(|option| {
        SelectOption::new(option.as_str(), option.label(), category == Some(option))
    }));
    let form_categories = ContactCategory::ALL
        .into_iter()
        .enumerate()
        .map(|(index, option)| {
            let selected = match form_category.as_deref() {
                Some(value) => value == option.as_str(),
                None => category.map_or(index == 0, |category| category == option),
            };
            SelectOption::new(option.as_str(), option.label(), selected)
        })
        .collect();

    render(ContactsTemplate {
        layout: Layout::new(session, Area::Contacts, "Contatti").with_notices(notices),
        has_prev: page.has_prev(),
        has_next: page.has_next(),
        prev_page: page.prev_number(),
        next_page: page.next_number(),
        page_number: page.number,
        total_pages: page.total_pages,
        total_items: page.total_items,
        contacts: page.items.iter().map(to_view).collect(),
        term: list.term,
        tab: list.tab,
        tabs,
        form,
        form_categories,
        errors,
    })
}

fn to_view(contact: &Contact) -> ContactView {
    ContactView {
        id: contact.id.clone(),
        name: contact.name.clone(),
        category_label: contact.category.label().to_string(),
        email: contact.email.clone(),
        phone: contact.phone.clone(),
        city: contact.city.clone(),
        status: contact.status.as_str().to_string(),
    }
}
