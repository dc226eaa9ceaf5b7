//! In-memory search and paging for list pages (contacts, projects).

use crate::models::{Contact, PipelineItem};

/// Text fields that the free-text search looks into.
pub trait Searchable {
    fn search_fields(&self) -> Vec<&str>;
}

impl Searchable for Contact {
    fn search_fields(&self) -> Vec<&str> {
        vec![
            self.name.as_str(),
            self.email.as_str(),
            self.phone.as_str(),
            self.city.as_str(),
        ]
    }
}

impl Searchable for PipelineItem {
    fn search_fields(&self) -> Vec<&str> {
        vec![self.title.as_str(), self.client_name.as_str()]
    }
}

/// Case-insensitive substring match over every search field. A blank term
/// keeps everything.
pub fn filter<T: Searchable + Clone>(items: &[T], term: &str) -> Vec<T> {
    let needle = term.trim().to_lowercase();
    if needle.is_empty() {
        return items.to_vec();
    }
    items
        .iter()
        .filter(|item| {
            item.search_fields()
                .iter()
                .any(|field| field.to_lowercase().contains(&needle))
        })
        .cloned()
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// 1-based, always within `1..=total_pages`.
    pub number: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

impl<T> Page<T> {
    pub fn has_prev(&self) -> bool {
        self.number > 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.total_pages
    }

    pub fn prev_number(&self) -> usize {
        self.number.saturating_sub(1).max(1)
    }

    pub fn next_number(&self) -> usize {
        (self.number + 1).min(self.total_pages)
    }
}

pub fn paginate<T: Clone>(items: &[T], page: usize, page_size: usize) -> Page<T> {
    let page_size = page_size.max(1);
    let total_pages = items.len().div_ceil(page_size).max(1);
    let number = page.clamp(1, total_pages);
    let start = (number - 1) * page_size;
    Page {
        items: items.iter().skip(start).take(page_size).cloned().collect(),
        number,
        total_pages,
        total_items: items.len(),
    }
}

/// Search term, active tab and page index of a list page. Changing the term
/// or the tab sends the list back to page 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListState {
    pub term: String,
    pub tab: String,
    pub page: usize,
}

pub const ALL_TAB: &str = "all";

impl ListState {
    /// State as it was when the page was last rendered.
    pub fn restore(term: Option<&str>, tab: Option<&str>, page: Option<usize>) -> Self {
        Self {
            term: normalize_term(term.unwrap_or_default()),
            tab: normalize_tab(tab.unwrap_or_default()),
            page: page.unwrap_or(1).max(1),
        }
    }

    pub fn with_term(mut self, term: &str) -> Self {
        let term = normalize_term(term);
        if term != self.term {
            self.term = term;
            self.page = 1;
        }
        self
    }

    pub fn with_tab(mut self, tab: &str) -> Self {
        let tab = normalize_tab(tab);
        if tab != self.tab {
            self.tab = tab;
            self.page = 1;
        }
        self
    }
}

fn normalize_term(term: &str) -> String {
    term.trim().to_string()
}

fn normalize_tab(tab: &str) -> String {
    let tab = tab.trim();
    if tab.is_empty() {
        ALL_TAB.to_string()
    } else {
        tab.to_string()
    }
}
