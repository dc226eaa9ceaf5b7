use std::{fmt, str::FromStr};

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::error::{StoreError, UnknownCode};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Closed set of profile roles. Anything else stored in `profiles.role` is
/// rejected at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Role {
    Admin,
    Operator,
    Vendor,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Operator, Role::Vendor];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Operator => "operatore",
            Role::Vendor => "venditore",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Role::Admin => "Amministratore",
            Role::Operator => "Operatore",
            Role::Vendor => "Venditore",
        }
    }

    /// Where a caller lands after login or after being turned away from an
    /// area their role cannot open.
    pub fn home_route(self) -> &'static str {
        match self {
            Role::Admin | Role::Operator => "/app/dashboard",
            Role::Vendor => "/app/appointments",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownCode;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == value)
            .ok_or_else(|| UnknownCode::new("role", value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AppointmentKind {
    SiteVisit,
    Installation,
    Meeting,
    Delivery,
}

impl AppointmentKind {
    pub const ALL: [AppointmentKind; 4] = [
        AppointmentKind::SiteVisit,
        AppointmentKind::Installation,
        AppointmentKind::Meeting,
        AppointmentKind::Delivery,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentKind::SiteVisit => "sopralluogo",
            AppointmentKind::Installation => "installazione",
            AppointmentKind::Meeting => "riunione",
            AppointmentKind::Delivery => "consegna",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AppointmentKind::SiteVisit => "Sopralluogo",
            AppointmentKind::Installation => "Installazione",
            AppointmentKind::Meeting => "Riunione",
            AppointmentKind::Delivery => "Consegna",
        }
    }
}

impl FromStr for AppointmentKind {
    type Err = UnknownCode;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        AppointmentKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| UnknownCode::new("appointment kind", value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContactCategory {
    Private,
    Company,
    Supplier,
    Partner,
}

impl ContactCategory {
    pub const ALL: [ContactCategory; 4] = [
        ContactCategory::Private,
        ContactCategory::Company,
        ContactCategory::Supplier,
        ContactCategory::Partner,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ContactCategory::Private => "privato",
            ContactCategory::Company => "azienda",
            ContactCategory::Supplier => "fornitore",
            ContactCategory::Partner => "partner",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ContactCategory::Private => "Privati",
            ContactCategory::Company => "Aziende",
            ContactCategory::Supplier => "Fornitori",
            ContactCategory::Partner => "Partner",
        }
    }
}

impl FromStr for ContactCategory {
    type Err = UnknownCode;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ContactCategory::ALL
            .into_iter()
            .find(|category| category.as_str() == value)
            .ok_or_else(|| UnknownCode::new("contact category", value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactStatus {
    Active,
    Inactive,
}

impl ContactStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ContactStatus::Active => "attivo",
            ContactStatus::Inactive => "inattivo",
        }
    }
}

impl FromStr for ContactStatus {
    type Err = UnknownCode;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "attivo" => Ok(ContactStatus::Active),
            "inattivo" => Ok(ContactStatus::Inactive),
            other => Err(UnknownCode::new("contact status", other)),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProfileRow {
    pub id: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub role: String,
    pub password_hash: String,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AppointmentRow {
    pub id: String,
    pub title: String,
    pub client_name: String,
    pub kind: String,
    pub starts_at: String,
    pub ends_at: String,
    pub location: String,
    pub notes: Option<String>,
    pub vendor_id: Option<String>,
    pub completed_at: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ContactRow {
    pub id: String,
    pub name: String,
    pub category: String,
    pub email: String,
    pub phone: String,
    pub city: String,
    pub status: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProjectRow {
    pub id: String,
    pub title: String,
    pub client_name: String,
    pub amount: f64,
    pub stage: String,
    pub deadline: Option<String>,
    pub start_date: Option<String>,
    pub progress: Option<i64>,
    pub completed_on: Option<String>,
    pub invoiced: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ActivityRow {
    pub message: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Appointment {
    pub id: String,
    pub title: String,
    pub client_name: String,
    pub kind: AppointmentKind,
    pub starts_at: NaiveDateTime,
    pub ends_at: NaiveDateTime,
    pub location: String,
    /// Never persisted; always empty on fetched appointments.
    pub technician: String,
    pub notes: String,
    pub vendor_id: Option<String>,
    pub completed_at: Option<String>,
}

impl TryFrom<AppointmentRow> for Appointment {
    type Error = StoreError;

    fn try_from(row: AppointmentRow) -> Result<Self, Self::Error> {
        let malformed = |reason: String| StoreError::Malformed {
            collection: "appointments",
            id: row.id.clone(),
            reason,
        };
        let kind = row
            .kind
            .parse::<AppointmentKind>()
            .map_err(|err| malformed(err.to_string()))?;
        let starts_at = parse_timestamp(&row.starts_at)
            .ok_or_else(|| malformed(format!("bad start `{}`", row.starts_at)))?;
        let ends_at = parse_timestamp(&row.ends_at)
            .ok_or_else(|| malformed(format!("bad end `{}`", row.ends_at)))?;

        Ok(Appointment {
            id: row.id,
            title: row.title,
            client_name: row.client_name,
            kind,
            starts_at,
            ends_at,
            location: row.location,
            technician: String::new(),
            notes: row.notes.unwrap_or_default(),
            vendor_id: row.vendor_id.filter(|id| !id.is_empty()),
            completed_at: row.completed_at,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Contact {
    pub id: String,
    pub name: String,
    pub category: ContactCategory,
    pub email: String,
    pub phone: String,
    pub city: String,
    pub status: ContactStatus,
}

impl TryFrom<ContactRow> for Contact {
    type Error = StoreError;

    fn try_from(row: ContactRow) -> Result<Self, Self::Error> {
        let category = row.category.parse().map_err(|err: UnknownCode| StoreError::Malformed {
            collection: "contacts",
            id: row.id.clone(),
            reason: err.to_string(),
        })?;
        let status = row.status.parse().map_err(|err: UnknownCode| StoreError::Malformed {
            collection: "contacts",
            id: row.id.clone(),
            reason: err.to_string(),
        })?;
        Ok(Contact {
            id: row.id,
            name: row.name,
            category,
            email: row.email,
            phone: row.phone,
            city: row.city,
            status,
        })
    }
}

/// Kanban column of a pipeline item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Quote,
    Approved,
    InProgress,
    Completed,
}

impl StageKind {
    pub const ALL: [StageKind; 4] = [
        StageKind::Quote,
        StageKind::Approved,
        StageKind::InProgress,
        StageKind::Completed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StageKind::Quote => "preventivo",
            StageKind::Approved => "approvato",
            StageKind::InProgress => "in_corso",
            StageKind::Completed => "completato",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            StageKind::Quote => "Preventivi",
            StageKind::Approved => "Approvati",
            StageKind::InProgress => "In corso",
            StageKind::Completed => "Completati",
        }
    }
}

impl FromStr for StageKind {
    type Err = UnknownCode;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        StageKind::ALL
            .into_iter()
            .find(|stage| stage.as_str() == value)
            .ok_or_else(|| UnknownCode::new("pipeline stage", value))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Quote { deadline: Option<NaiveDate> },
    Approved { start_date: Option<NaiveDate> },
    InProgress { progress: u8 },
    Completed { completed_on: NaiveDate, invoiced: bool },
}

impl Stage {
    pub fn kind(&self) -> StageKind {
        match self {
            Stage::Quote { .. } => StageKind::Quote,
            Stage::Approved { .. } => StageKind::Approved,
            Stage::InProgress { .. } => StageKind::InProgress,
            Stage::Completed { .. } => StageKind::Completed,
        }
    }

    /// Next column in the pipeline. `Completed` is terminal.
    pub fn advance(&self, today: NaiveDate) -> Option<Stage> {
        match self {
            Stage::Quote { .. } => Some(Stage::Approved {
                start_date: Some(today),
            }),
            Stage::Approved { .. } => Some(Stage::InProgress { progress: 0 }),
            Stage::InProgress { .. } => Some(Stage::Completed {
                completed_on: today,
                invoiced: false,
            }),
            Stage::Completed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineItem {
    pub id: String,
    pub title: String,
    pub client_name: String,
    pub amount: f64,
    pub stage: Stage,
}

impl TryFrom<ProjectRow> for PipelineItem {
    type Error = StoreError;

    fn try_from(row: ProjectRow) -> Result<Self, Self::Error> {
        let malformed = |reason: String| StoreError::Malformed {
            collection: "projects",
            id: row.id.clone(),
            reason,
        };
        let kind = row
            .stage
            .parse::<StageKind>()
            .map_err(|err| malformed(err.to_string()))?;
        let stage = match kind {
            StageKind::Quote => Stage::Quote {
                deadline: row.deadline.as_deref().and_then(parse_date),
            },
            StageKind::Approved => Stage::Approved {
                start_date: row.start_date.as_deref().and_then(parse_date),
            },
            StageKind::InProgress => Stage::InProgress {
                progress: row.progress.unwrap_or(0).clamp(0, 100) as u8,
            },
            StageKind::Completed => Stage::Completed {
                completed_on: row
                    .completed_on
                    .as_deref()
                    .and_then(parse_date)
                    .ok_or_else(|| malformed("completed item without date".to_string()))?,
                invoiced: row.invoiced == 1,
            },
        };

        Ok(PipelineItem {
            id: row.id,
            title: row.title,
            client_name: row.client_name,
            amount: row.amount,
            stage,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Vendor {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
}

impl Vendor {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub created_at: NaiveDateTime,
}

impl TryFrom<ProfileRow> for UserProfile {
    type Error = StoreError;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        let malformed = |reason: String| StoreError::Malformed {
            collection: "profiles",
            id: row.id.clone(),
            reason,
        };
        let role = row
            .role
            .parse::<Role>()
            .map_err(|err| malformed(err.to_string()))?;
        let created_at = parse_timestamp(&row.created_at)
            .ok_or_else(|| malformed(format!("bad created_at `{}`", row.created_at)))?;
        Ok(UserProfile {
            name: format!("{} {}", row.first_name, row.last_name)
                .trim()
                .to_string(),
            id: row.id,
            email: row.email,
            role,
            created_at,
        })
    }
}

/// Only profiles with the vendor role convert.
impl TryFrom<ProfileRow> for Vendor {
    type Error = StoreError;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        if !matches!(row.role.parse::<Role>(), Ok(Role::Vendor)) {
            return Err(StoreError::Malformed {
                collection: "profiles",
                id: row.id,
                reason: format!("role `{}` is not a vendor", row.role),
            });
        }
        Ok(Vendor {
            id: row.id,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            phone: row.phone,
        })
    }
}

pub fn format_timestamp(value: NaiveDateTime) -> String {
    value.format(TIMESTAMP_FORMAT).to_string()
}

/// Accepts stored timestamps and `datetime-local` form values (no seconds).
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M"))
        .ok()
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).ok()
}

/// Loose shape check: something before the `@`, a dotted domain after it.
pub fn looks_like_email(value: &str) -> bool {
    match value.trim().split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(value: &str) -> NaiveDate {
        parse_date(value).expect("valid date")
    }

    #[test]
    fn role_parsing_rejects_anything_outside_the_closed_set() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        for bad in ["", "Admin", "vendor", "superuser", "admin "] {
            let err = bad.parse::<Role>().unwrap_err();
            assert_eq!(err.field, "role");
        }
    }

    #[test]
    fn vendors_land_on_appointments() {
        assert_eq!(Role::Vendor.home_route(), "/app/appointments");
        assert_eq!(Role::Operator.home_route(), "/app/dashboard");
    }

    #[test]
    fn appointment_rows_drop_technician_and_keep_vendor() {
        let row = AppointmentRow {
            id: "a1".into(),
            title: "Posa infissi".into(),
            client_name: "Rossi".into(),
            kind: "installazione".into(),
            starts_at: "2025-04-10T09:00:00".into(),
            ends_at: "2025-04-10T11:30:00".into(),
            location: "Bologna".into(),
            notes: None,
            vendor_id: Some("v1".into()),
            completed_at: None,
        };
        let appointment = Appointment::try_from(row).unwrap();
        assert_eq!(appointment.kind, AppointmentKind::Installation);
        assert_eq!(appointment.technician, "");
        assert_eq!(appointment.vendor_id.as_deref(), Some("v1"));
        assert_eq!(format_timestamp(appointment.starts_at), "2025-04-10T09:00:00");
    }

    #[test]
    fn appointment_rows_with_unknown_kind_are_malformed() {
        let row = AppointmentRow {
            id: "a2".into(),
            title: "?".into(),
            client_name: "?".into(),
            kind: "picnic".into(),
            starts_at: "2025-04-10T09:00:00".into(),
            ends_at: "2025-04-10T10:00:00".into(),
            location: String::new(),
            notes: None,
            vendor_id: None,
            completed_at: None,
        };
        assert!(matches!(
            Appointment::try_from(row),
            Err(StoreError::Malformed { .. })
        ));
    }

    #[test]
    fn timestamps_accept_form_values_without_seconds() {
        let parsed = parse_timestamp("2025-04-10T14:30").unwrap();
        assert_eq!(format_timestamp(parsed), "2025-04-10T14:30:00");
        assert!(parse_timestamp("10/04/2025 14:30").is_none());
    }

    #[test]
    fn email_shape_check() {
        assert!(looks_like_email("anna@example.com"));
        assert!(looks_like_email(" anna@mail.example.it "));
        assert!(!looks_like_email("anna"));
        assert!(!looks_like_email("@example.com"));
        assert!(!looks_like_email("anna@localhost"));
        assert!(!looks_like_email("anna@example."));
    }

    #[test]
    fn pipeline_advances_until_completed() {
        let today = date("2025-05-02");
        let quote = Stage::Quote { deadline: None };
        let approved = quote.advance(today).unwrap();
        assert_eq!(approved, Stage::Approved { start_date: Some(today) });
        let running = approved.advance(today).unwrap();
        assert_eq!(running, Stage::InProgress { progress: 0 });
        let done = running.advance(today).unwrap();
        assert_eq!(
            done,
            Stage::Completed {
                completed_on: today,
                invoiced: false
            }
        );
        assert!(done.advance(today).is_none());
    }

    #[test]
    fn project_rows_map_stage_specific_fields() {
        let row = ProjectRow {
            id: "p1".into(),
            title: "Cucina".into(),
            client_name: "Bianchi".into(),
            amount: 1200.0,
            stage: "in_corso".into(),
            deadline: None,
            start_date: None,
            progress: Some(140),
            completed_on: None,
            invoiced: 0,
        };
        let item = PipelineItem::try_from(row).unwrap();
        assert_eq!(item.stage, Stage::InProgress { progress: 100 });
    }

    fn profile_row(role: &str) -> ProfileRow {
        ProfileRow {
            id: "u1".into(),
            username: "mario".into(),
            first_name: "Mario".into(),
            last_name: "Verdi".into(),
            email: "mario@example.com".into(),
            phone: "059 123".into(),
            role: role.into(),
            password_hash: String::new(),
            created_at: "2025-03-01T08:30:00".into(),
        }
    }

    #[test]
    fn profiles_keep_their_creation_time() {
        let profile = UserProfile::try_from(profile_row("operatore")).unwrap();
        assert_eq!(profile.name, "Mario Verdi");
        assert_eq!(profile.role, Role::Operator);
        assert_eq!(format_timestamp(profile.created_at), "2025-03-01T08:30:00");

        let broken = ProfileRow {
            created_at: "ieri".into(),
            ..profile_row("operatore")
        };
        assert!(matches!(
            UserProfile::try_from(broken),
            Err(StoreError::Malformed { collection: "profiles", .. })
        ));
    }

    #[test]
    fn profiles_with_unknown_roles_do_not_become_users() {
        assert!(UserProfile::try_from(profile_row("root")).is_err());
        assert!(Vendor::try_from(profile_row("root")).is_err());
    }

    #[test]
    fn only_vendor_profiles_become_vendors() {
        assert!(Vendor::try_from(profile_row("admin")).is_err());
        let vendor = Vendor::try_from(profile_row("venditore")).unwrap();
        assert_eq!(vendor.full_name(), "Mario Verdi");
        assert_eq!(vendor.phone, "059 123");
    }
}
