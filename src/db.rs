use std::{fs, path::Path};

use chrono::{Duration, Local, NaiveTime};
use sqlx::SqlitePool;

use crate::{
    auth::{hash_password, new_id},
    config::{AppConfig, SeedAccount},
    error::AppError,
    models::{
        format_timestamp, ActivityRow, AppointmentKind, ContactCategory, ContactStatus, Role,
        StageKind, DATE_FORMAT,
    },
    store::{Collection, Direction, Predicate, Query, Store, Value},
};

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

pub fn ensure_sqlite_dir(db_url: &str) -> std::io::Result<()> {
    let path = if let Some(path) = db_url.strip_prefix("sqlite://") {
        Some(path)
    } else if let Some(path) = db_url.strip_prefix("sqlite:") {
        Some(path)
    } else {
        None
    };

    let Some(path) = path else {
        return Ok(());
    };

    let path = path.split('?').next().unwrap_or(path);
    if path == ":memory:" || path.is_empty() {
        return Ok(());
    }

    let path = path.strip_prefix("file:").unwrap_or(path);
    let db_path = Path::new(path);
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub async fn seed_defaults(store: &Store, config: &AppConfig) -> Result<(), AppError> {
    seed_account(store, &config.admin, Role::Admin).await?;
    if config.seed_demo {
        seed_demo(store).await?;
    }
    Ok(())
}

/// Informational activity feed. Failures are logged and otherwise ignored.
pub async fn log_activity(store: &Store, kind: &str, message: &str, user_id: Option<&str>) {
    let result = store
        .insert(
            Collection::Activities,
            &[
                ("id", new_id().into()),
                ("kind", kind.into()),
                ("message", message.into()),
                ("created_at", now_timestamp().into()),
                ("user_id", user_id.into()),
            ],
        )
        .await;
    if let Err(err) = result {
        log::warn!("Activity log write failed: {err}");
    }
}

pub async fn recent_activities(store: &Store, limit: i64) -> Vec<ActivityRow> {
    let query = Query::new(Collection::Activities)
        .order_by("created_at", Direction::Desc)
        .limit(limit);
    store.query(&query).await.unwrap_or_else(|err| {
        log::warn!("Activity feed unavailable: {err}");
        Vec::new()
    })
}

pub fn now_timestamp() -> String {
    format_timestamp(Local::now().naive_local())
}

async fn seed_account(store: &Store, account: &SeedAccount, role: Role) -> Result<(), AppError> {
    let query = Query::new(Collection::Profiles)
        .filter(Predicate::Eq("role", role.as_str().into()));
    if store.count(&query).await? > 0 {
        return Ok(());
    }

    if account.uses_default_password() {
        log::warn!(
            "Password for seeded {} '{}' not set. Using the default; change it in production.",
            role,
            account.username
        );
    }

    let password_hash = hash_password(&account.password).map_err(|err| {
        log::error!("Hashing the seeded {role} password failed: {err}");
        AppError::PasswordHash
    })?;

    store
        .insert(
            Collection::Profiles,
            &[
                ("id", new_id().into()),
                ("username", account.username.clone().into()),
                ("first_name", account.first_name.clone().into()),
                ("last_name", account.last_name.clone().into()),
                ("email", account.email.clone().into()),
                ("phone", "".into()),
                ("role", role.as_str().into()),
                ("password_hash", password_hash.into()),
                ("active", Value::Int(1)),
                ("created_at", now_timestamp().into()),
            ],
        )
        .await?;
    log::info!("Seeded {} account '{}'", role, account.username);
    Ok(())
}

async fn seed_demo(store: &Store) -> Result<(), AppError> {
    seed_account(store, &SeedAccount::demo_operator(), Role::Operator).await?;
    seed_account(store, &SeedAccount::demo_vendor(), Role::Vendor).await?;

    let contacts = store.count(&Query::new(Collection::Contacts)).await?;
    if contacts > 0 {
        return Ok(());
    }

    let vendor_id = store
        .query::<crate::models::ProfileRow>(
            &Query::new(Collection::Profiles)
                .filter(Predicate::Eq("role", Role::Vendor.as_str().into()))
                .limit(1),
        )
        .await?
        .into_iter()
        .next()
        .map(|row| row.id);

    let demo_contacts = [
        (
            "Mario Rossi",
            ContactCategory::Private,
            "mario.rossi@example.com",
            "333 1234567",
            "Bologna",
        ),
        (
            "Edilnord Srl",
            ContactCategory::Company,
            "info@edilnord.example",
            "051 998877",
            "Modena",
        ),
        (
            "Ferramenta Bianchi",
            ContactCategory::Supplier,
            "ordini@bianchi.example",
            "059 223344",
            "Carpi",
        ),
        (
            "Studio Tecnico Verdi",
            ContactCategory::Partner,
            "studio@verdi.example",
            "051 445566",
            "Bologna",
        ),
    ];
    for (name, category, email, phone, city) in demo_contacts {
        store
            .insert(
                Collection::Contacts,
                &[
                    ("id", new_id().into()),
                    ("name", name.into()),
                    ("category", category.as_str().into()),
                    ("email", email.into()),
                    ("phone", phone.into()),
                    ("city", city.into()),
                    ("status", ContactStatus::Active.as_str().into()),
                    ("created_at", now_timestamp().into()),
                ],
            )
            .await?;
    }

    let today = Local::now().date_naive();
    let demo_appointments = [
        (
            "Sopralluogo cucina",
            "Mario Rossi",
            AppointmentKind::SiteVisit,
            9,
            "Via Emilia 12, Bologna",
        ),
        (
            "Posa serramenti",
            "Edilnord Srl",
            AppointmentKind::Installation,
            14,
            "Cantiere Modena Est",
        ),
    ];
    for (title, client, kind, hour, location) in demo_appointments {
        let time = NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN);
        let starts_at = today.and_time(time);
        let ends_at = starts_at + Duration::hours(2);
        store
            .insert(
                Collection::Appointments,
                &[
                    ("id", new_id().into()),
                    ("title", title.into()),
                    ("client_name", client.into()),
                    ("kind", kind.as_str().into()),
                    ("starts_at", format_timestamp(starts_at).into()),
                    ("ends_at", format_timestamp(ends_at).into()),
                    ("location", location.into()),
                    ("notes", Value::Null),
                    ("vendor_id", vendor_id.clone().into()),
                    ("created_at", now_timestamp().into()),
                ],
            )
            .await?;
    }

    store
        .insert(
            Collection::Projects,
            &[
                ("id", new_id().into()),
                ("title", "Ristrutturazione bagno".into()),
                ("client_name", "Mario Rossi".into()),
                ("amount", Value::Real(8500.0)),
                ("stage", StageKind::Quote.as_str().into()),
                ("deadline", (today + Duration::days(14)).format(DATE_FORMAT).to_string().into()),
                ("invoiced", Value::Int(0)),
                ("created_at", now_timestamp().into()),
            ],
        )
        .await?;

    log::info!("Seeded demo data");
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::AppConfig, error::StoreError, models::ProfileRow};

    #[test]
    fn ensure_sqlite_dir_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("crm.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        ensure_sqlite_dir(&url).unwrap();
        assert!(dir.path().join("nested").is_dir());

        ensure_sqlite_dir("sqlite::memory:").unwrap();
        ensure_sqlite_dir("postgres://localhost/crm").unwrap();
    }

    #[actix_web::test]
    async fn seeding_is_idempotent() {
        let store = Store::new(testing::memory_pool().await);
        let config = AppConfig::from_lookup(|key| match key {
            "SEED_DEMO" => Some("true".to_string()),
            _ => None,
        });

        seed_defaults(&store, &config).await.unwrap();
        seed_defaults(&store, &config).await.unwrap();

        let profiles: Vec<ProfileRow> = store
            .query(&Query::new(Collection::Profiles))
            .await
            .unwrap();
        let mut roles: Vec<_> = profiles.iter().map(|row| row.role.as_str()).collect();
        roles.sort_unstable();
        assert_eq!(roles, ["admin", "operatore", "venditore"]);
        assert_eq!(store.count(&Query::new(Collection::Contacts)).await.unwrap(), 4);
        assert_eq!(store.count(&Query::new(Collection::Appointments)).await.unwrap(), 2);
    }

    #[actix_web::test]
    async fn seeding_failures_keep_the_store_error() {
        let pool = testing::memory_pool().await;
        sqlx::query("DROP TABLE profiles").execute(&pool).await.unwrap();
        let store = Store::new(pool);

        let err = seed_defaults(&store, &AppConfig::from_lookup(|_| None))
            .await
            .unwrap_err();
        assert!(
            matches!(err, AppError::Store(StoreError::Database(_))),
            "unexpected error: {err}"
        );
    }

    #[actix_web::test]
    async fn activity_feed_is_newest_first() {
        let store = Store::new(testing::memory_pool().await);
        for (id, at) in [("a1", "2025-01-01T08:00:00"), ("a2", "2025-01-02T08:00:00")] {
            store
                .insert(
                    Collection::Activities,
                    &[
                        ("id", id.into()),
                        ("kind", "test".into()),
                        ("message", id.into()),
                        ("created_at", at.into()),
                        ("user_id", Value::Null),
                    ],
                )
                .await
                .unwrap();
        }
        let feed = recent_activities(&store, 1).await;
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].message, "a2");
    }
}
