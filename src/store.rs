//! Record store over SQLite.
//!
//! Every statement is assembled from a [`Collection`] and whitelisted column
//! names, with values always sent as bound parameters. Callers describe what
//! they want with [`Query`] (equality/range predicates plus ordering) and get
//! back typed rows.

use sqlx::{sqlite::SqliteRow, FromRow, QueryBuilder, Sqlite, SqlitePool};

use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Appointments,
    Contacts,
    Projects,
    Profiles,
    Activities,
}

impl Collection {
    pub fn table(self) -> &'static str {
        match self {
            Collection::Appointments => "appointments",
            Collection::Contacts => "contacts",
            Collection::Projects => "projects",
            Collection::Profiles => "profiles",
            Collection::Activities => "activities",
        }
    }

    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Collection::Appointments => &[
                "id",
                "title",
                "client_name",
                "kind",
                "starts_at",
                "ends_at",
                "location",
                "notes",
                "vendor_id",
                "completed_at",
                "created_at",
            ],
            Collection::Contacts => &[
                "id",
                "name",
                "category",
                "email",
                "phone",
                "city",
                "status",
                "created_at",
            ],
            Collection::Projects => &[
                "id",
                "title",
                "client_name",
                "amount",
                "stage",
                "deadline",
                "start_date",
                "progress",
                "completed_on",
                "invoiced",
                "created_at",
            ],
            Collection::Profiles => &[
                "id",
                "username",
                "first_name",
                "last_name",
                "email",
                "phone",
                "role",
                "password_hash",
                "active",
                "created_at",
            ],
            Collection::Activities => &["id", "kind", "message", "created_at", "user_id"],
        }
    }

    fn ensure_column(self, column: &'static str) -> Result<(), StoreError> {
        if self.columns().contains(&column) {
            Ok(())
        } else {
            Err(StoreError::UnknownColumn {
                collection: self.table(),
                column,
            })
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Int(i64),
    Real(f64),
    Bool(bool),
    Null,
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Real(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(&'static str, Value),
    Gte(&'static str, Value),
    Lt(&'static str, Value),
}

impl Predicate {
    pub fn column(&self) -> &'static str {
        match self {
            Predicate::Eq(column, _) | Predicate::Gte(column, _) | Predicate::Lt(column, _) => {
                column
            }
        }
    }

    pub fn value(&self) -> &Value {
        match self {
            Predicate::Eq(_, value) | Predicate::Gte(_, value) | Predicate::Lt(_, value) => value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ordering {
    pub column: &'static str,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: Collection,
    pub predicates: Vec<Predicate>,
    pub ordering: Option<Ordering>,
    pub limit: Option<i64>,
}

impl Query {
    pub fn new(collection: Collection) -> Self {
        Self {
            collection,
            predicates: Vec::new(),
            ordering: None,
            limit: None,
        }
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn order_by(mut self, column: &'static str, direction: Direction) -> Self {
        self.ordering = Some(Ordering { column, direction });
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    fn validate(&self) -> Result<(), StoreError> {
        for predicate in &self.predicates {
            self.collection.ensure_column(predicate.column())?;
        }
        if let Some(ordering) = &self.ordering {
            self.collection.ensure_column(ordering.column)?;
        }
        Ok(())
    }

    fn push_where<'a>(&self, builder: &mut QueryBuilder<'a, Sqlite>) {
        for (index, predicate) in self.predicates.iter().enumerate() {
            builder.push(if index == 0 { " WHERE " } else { " AND " });
            builder.push(predicate.column());
            match (predicate, predicate.value()) {
                (Predicate::Eq(..), Value::Null) => {
                    builder.push(" IS NULL");
                    continue;
                }
                (Predicate::Eq(..), _) => builder.push(" = "),
                (Predicate::Gte(..), _) => builder.push(" >= "),
                (Predicate::Lt(..), _) => builder.push(" < "),
            };
            push_value(builder, predicate.value());
        }
    }
}

fn push_value(builder: &mut QueryBuilder<'_, Sqlite>, value: &Value) {
    match value.clone() {
        Value::Text(value) => {
            builder.push_bind(value);
        }
        Value::Int(value) => {
            builder.push_bind(value);
        }
        Value::Real(value) => {
            builder.push_bind(value);
        }
        Value::Bool(value) => {
            builder.push_bind(value);
        }
        Value::Null => {
            builder.push_bind(None::<String>);
        }
    }
}

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn query<T>(&self, query: &Query) -> Result<Vec<T>, StoreError>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        query.validate()?;
        let collection = query.collection;
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT ");
        builder.push(collection.columns().join(", "));
        builder.push(" FROM ");
        builder.push(collection.table());
        query.push_where(&mut builder);
        if let Some(ordering) = &query.ordering {
            builder.push(" ORDER BY ");
            builder.push(ordering.column);
            builder.push(match ordering.direction {
                Direction::Asc => " ASC",
                Direction::Desc => " DESC",
            });
        }
        if let Some(limit) = query.limit {
            builder.push(" LIMIT ");
            builder.push_bind(limit);
        }

        let rows = builder
            .build_query_as::<T>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn count(&self, query: &Query) -> Result<i64, StoreError> {
        query.validate()?;
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM ");
        builder.push(query.collection.table());
        query.push_where(&mut builder);
        let count = builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn insert(
        &self,
        collection: Collection,
        record: &[(&'static str, Value)],
    ) -> Result<(), StoreError> {
        if record.is_empty() {
            return Err(StoreError::EmptyRecord(collection.table()));
        }
        for (column, _) in record {
            collection.ensure_column(column)?;
        }

        let mut builder = QueryBuilder::<Sqlite>::new("INSERT INTO ");
        builder.push(collection.table());
        builder.push(" (");
        builder.push(
            record
                .iter()
                .map(|(column, _)| *column)
                .collect::<Vec<_>>()
                .join(", "),
        );
        builder.push(") VALUES (");
        for (index, (_, value)) in record.iter().enumerate() {
            if index > 0 {
                builder.push(", ");
            }
            push_value(&mut builder, value);
        }
        builder.push(")");

        builder.build().execute(&self.pool).await?;
        Ok(())
    }

    /// Applies `patch` to the record with `id`; returns the number of rows
    /// touched (0 when the id does not exist).
    pub async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: &[(&'static str, Value)],
    ) -> Result<u64, StoreError> {
        if patch.is_empty() {
            return Err(StoreError::EmptyRecord(collection.table()));
        }
        for (column, _) in patch {
            collection.ensure_column(column)?;
        }

        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE ");
        builder.push(collection.table());
        builder.push(" SET ");
        for (index, (column, value)) in patch.iter().enumerate() {
            if index > 0 {
                builder.push(", ");
            }
            builder.push(*column);
            builder.push(" = ");
            push_value(&mut builder, value);
        }
        builder.push(" WHERE id = ");
        builder.push_bind(id.to_string());

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    pub async fn delete(&self, collection: Collection, id: &str) -> Result<u64, StoreError> {
        let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM ");
        builder.push(collection.table());
        builder.push(" WHERE id = ");
        builder.push_bind(id.to_string());
        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::testing::memory_pool, models::ContactRow};

    fn contact(id: &str, name: &str, city: &str) -> Vec<(&'static str, Value)> {
        vec![
            ("id", id.into()),
            ("name", name.into()),
            ("category", "azienda".into()),
            ("email", format!("{id}@example.com").into()),
            ("phone", "".into()),
            ("city", city.into()),
            ("status", "attivo".into()),
            ("created_at", "2025-01-01T00:00:00".into()),
        ]
    }

    #[actix_web::test]
    async fn query_applies_predicates_and_ordering() {
        let store = Store::new(memory_pool().await);
        store.insert(Collection::Contacts, &contact("c1", "Zeta Srl", "Milano")).await.unwrap();
        store.insert(Collection::Contacts, &contact("c2", "Alfa Spa", "Milano")).await.unwrap();
        store.insert(Collection::Contacts, &contact("c3", "Beta Snc", "Roma")).await.unwrap();

        let query = Query::new(Collection::Contacts)
            .filter(Predicate::Eq("city", "Milano".into()))
            .order_by("name", Direction::Asc);
        let rows: Vec<ContactRow> = store.query(&query).await.unwrap();
        let names: Vec<_> = rows.iter().map(|row| row.name.as_str()).collect();
        assert_eq!(names, ["Alfa Spa", "Zeta Srl"]);
        assert_eq!(store.count(&query).await.unwrap(), 2);
    }

    #[actix_web::test]
    async fn range_predicates_are_half_open() {
        let store = Store::new(memory_pool().await);
        for (id, name) in [("c1", "a"), ("c2", "b"), ("c3", "c")] {
            store.insert(Collection::Contacts, &contact(id, name, "X")).await.unwrap();
        }
        let query = Query::new(Collection::Contacts)
            .filter(Predicate::Gte("name", "a".into()))
            .filter(Predicate::Lt("name", "c".into()));
        assert_eq!(store.count(&query).await.unwrap(), 2);
    }

    #[actix_web::test]
    async fn unknown_columns_are_rejected_before_sql() {
        let store = Store::new(memory_pool().await);
        let query = Query::new(Collection::Contacts)
            .filter(Predicate::Eq("name; DROP TABLE contacts", "x".into()));
        let err = store.query::<ContactRow>(&query).await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownColumn { .. }));

        let err = store
            .insert(Collection::Profiles, &[("kind", "x".into())])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownColumn { .. }));
    }

    #[actix_web::test]
    async fn update_and_delete_report_rows_touched() {
        let store = Store::new(memory_pool().await);
        store.insert(Collection::Contacts, &contact("c1", "Alfa", "Roma")).await.unwrap();

        let touched = store
            .update(Collection::Contacts, "c1", &[("city", "Napoli".into())])
            .await
            .unwrap();
        assert_eq!(touched, 1);
        let missing = store
            .update(Collection::Contacts, "nope", &[("city", "Napoli".into())])
            .await
            .unwrap();
        assert_eq!(missing, 0);
        assert!(matches!(
            store.update(Collection::Contacts, "c1", &[]).await,
            Err(StoreError::EmptyRecord("contacts"))
        ));

        let rows: Vec<ContactRow> = store
            .query(&Query::new(Collection::Contacts))
            .await
            .unwrap();
        assert_eq!(rows[0].city, "Napoli");

        assert_eq!(store.delete(Collection::Contacts, "c1").await.unwrap(), 1);
        assert_eq!(store.count(&Query::new(Collection::Contacts)).await.unwrap(), 0);
    }

    #[actix_web::test]
    async fn eq_null_matches_missing_values() {
        let store = Store::new(memory_pool().await);
        store
            .insert(
                Collection::Activities,
                &[
                    ("id", "a1".into()),
                    ("kind", "test".into()),
                    ("message", "system".into()),
                    ("created_at", "2025-01-01T00:00:00".into()),
                    ("user_id", Value::Null),
                ],
            )
            .await
            .unwrap();
        let query =
            Query::new(Collection::Activities).filter(Predicate::Eq("user_id", Value::Null));
        assert_eq!(store.count(&query).await.unwrap(), 1);
    }
}
