use actix_web::{http::header, HttpResponse};
use askama::Template;

use crate::{
    auth::Session,
    notice::Notice,
    scope::{nav_links, Area, NavLink},
};

pub fn render<T: Template>(template: T) -> HttpResponse {
    match template.render() {
        Ok(body) => HttpResponse::Ok()
            .content_type("text/html; charset=utf-8")
            .body(body),
        Err(err) => {
            log::error!("Template render error: {err}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

pub fn see_other(location: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .append_header((header::LOCATION, location))
        .finish()
}

/// Page chrome shared by every signed-in page.
#[derive(Clone, Debug)]
pub struct Layout {
    pub title: String,
    pub display_name: String,
    pub role_label: String,
    pub nav: Vec<NavLink>,
    pub notices: Vec<Notice>,
}

impl Layout {
    pub fn new(session: &Session, area: Area, title: &str) -> Self {
        Self {
            title: title.to_string(),
            display_name: session.display_name.clone(),
            role_label: session.role.label().to_string(),
            nav: nav_links(session.role, area),
            notices: Vec::new(),
        }
    }

    pub fn with_notices(mut self, notices: impl IntoIterator<Item = Notice>) -> Self {
        self.notices.extend(notices);
        self
    }
}

#[derive(Clone, Debug)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

impl SelectOption {
    pub fn new(value: &str, label: &str, selected: bool) -> Self {
        Self {
            value: value.to_string(),
            label: label.to_string(),
            selected,
        }
    }
}
