//! Day-bounded appointment queries.
//!
//! A board shows one calendar day. The day becomes the half-open range
//! `[D 00:00:00, D+1 00:00:00)` on `starts_at`, compared as naive local
//! timestamps exactly as they are stored.

use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::{
    auth::Session,
    error::UnknownCode,
    models::{format_timestamp, Appointment, AppointmentKind, AppointmentRow},
    notice::Notice,
    scope::VendorScope,
    store::{Collection, Direction, Predicate, Query, Store},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KindFilter {
    All,
    Only(AppointmentKind),
}

impl KindFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            KindFilter::All => "all",
            KindFilter::Only(kind) => kind.as_str(),
        }
    }
}

impl FromStr for KindFilter {
    type Err = UnknownCode;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "" | "all" => Ok(KindFilter::All),
            other => other.parse().map(KindFilter::Only),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl DayRange {
    pub fn for_date(date: NaiveDate) -> Self {
        let start = date.and_time(NaiveTime::MIN);
        let end = date
            .succ_opt()
            .map(|next| next.and_time(NaiveTime::MIN))
            .unwrap_or(NaiveDateTime::MAX);
        Self { start, end }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AppointmentQuery {
    pub date: NaiveDate,
    pub kind: KindFilter,
    pub vendor: VendorScope,
}

impl AppointmentQuery {
    pub fn for_date(date: NaiveDate) -> Self {
        Self {
            date,
            kind: KindFilter::All,
            vendor: VendorScope::All,
        }
    }

    pub fn kind(mut self, kind: KindFilter) -> Self {
        self.kind = kind;
        self
    }

    pub fn vendor(mut self, vendor: VendorScope) -> Self {
        self.vendor = vendor;
        self
    }

    /// Store query for this board as seen by `session`. Vendors are pinned
    /// to their own id whatever vendor filter was requested.
    pub fn build(&self, session: &Session) -> Query {
        let range = DayRange::for_date(self.date);
        let mut query = Query::new(Collection::Appointments)
            .filter(Predicate::Gte("starts_at", format_timestamp(range.start).into()))
            .filter(Predicate::Lt("starts_at", format_timestamp(range.end).into()))
            .order_by("starts_at", Direction::Asc);

        if let KindFilter::Only(kind) = self.kind {
            query = query.filter(Predicate::Eq("kind", kind.as_str().into()));
        }
        if let Some(vendor_id) = session.scope(self.vendor.clone()).vendor_id() {
            query = query.filter(Predicate::Eq("vendor_id", vendor_id.into()));
        }
        query
    }
}

/// Result of a read that never fails outright: on error the items are empty
/// and `notice` says why.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub items: Vec<T>,
    pub notice: Option<Notice>,
}

pub async fn fetch_appointments(
    store: &Store,
    session: &Session,
    query: &AppointmentQuery,
) -> Fetched<Appointment> {
    match store.query::<AppointmentRow>(&query.build(session)).await {
        Ok(rows) => Fetched {
            items: rows
                .into_iter()
                .filter_map(|row| match Appointment::try_from(row) {
                    Ok(appointment) => Some(appointment),
                    Err(err) => {
                        log::warn!("Skipping appointment: {err}");
                        None
                    }
                })
                .collect(),
            notice: None,
        },
        Err(err) => {
            log::warn!("Appointments query for {} failed: {err}", query.date);
            Fetched {
                items: Vec::new(),
                notice: Some(Notice::error("Impossibile caricare gli appuntamenti.")),
            }
        }
    }
}

/// What the appointments page currently shows for a user.
#[derive(Debug, Clone, PartialEq)]
pub struct Board {
    pub query: AppointmentQuery,
    pub appointments: Vec<Appointment>,
    pub notice: Option<Notice>,
}

/// One board as one user sees it. The vendor filter is already narrowed by
/// role, so two requests share a key only when they would run the same query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BoardKey {
    pub user_id: String,
    pub query: AppointmentQuery,
}

impl BoardKey {
    pub fn new(session: &Session, query: &AppointmentQuery) -> Self {
        let mut query = query.clone();
        query.vendor = session.scope(query.vendor);
        Self {
            user_id: session.user_id.clone(),
            query,
        }
    }
}
