use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

/// A stored or submitted code that is not one of the values its enum knows.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {field} `{value}`")]
pub struct UnknownCode {
    pub field: &'static str,
    pub value: String,
}

impl UnknownCode {
    pub fn new(field: &'static str, value: &str) -> Self {
        Self {
            field,
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("unknown column `{column}` on {collection}")]
    UnknownColumn {
        collection: &'static str,
        column: &'static str,
    },
    #[error("empty record for {0}")]
    EmptyRecord(&'static str),
    #[error("malformed {collection} record {id}: {reason}")]
    Malformed {
        collection: &'static str,
        id: String,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("password hashing failed")]
    PasswordHash,
    #[error("not found")]
    NotFound,
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Store(_) | AppError::PasswordHash => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.status_code().is_server_error() {
            log::error!("Request failed: {self}");
        }
        HttpResponse::build(self.status_code())
            .content_type("text/plain; charset=utf-8")
            .body(match self {
                AppError::NotFound => "Risorsa non trovata",
                AppError::Store(_) | AppError::PasswordHash => "Errore interno",
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_failures_are_server_errors() {
        let err = AppError::from(StoreError::EmptyRecord("contacts"));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(AppError::NotFound.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn unknown_codes_name_the_field() {
        let err = UnknownCode::new("role", "root");
        assert_eq!(err.to_string(), "unknown role `root`");
    }
}
