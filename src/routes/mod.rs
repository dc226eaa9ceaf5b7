use actix_web::{middleware::from_fn, web};
use actix_web_httpauth::middleware::HttpAuthentication;

use crate::auth::{basic_validator, logout_guard};

pub mod appointments;
pub mod contacts;
pub mod dashboard;
pub mod events;
pub mod projects;
pub mod public;
pub mod vendors;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.configure(public::configure).service(
        web::scope("/app")
            .wrap(HttpAuthentication::basic(basic_validator))
            .wrap(from_fn(logout_guard))
            .configure(dashboard::configure)
            .configure(appointments::configure)
            .configure(contacts::configure)
            .configure(projects::configure)
            .configure(vendors::configure)
            .configure(events::configure),
    );
}

#[cfg(test)]
pub mod testing {
    use crate::{
        auth::testing::create_profile, config::AppConfig, db::testing::memory_pool,
        state::AppState, store::Store,
    };

    pub const ADMIN_AUTH: &str = "Basic YWRtaW46cHctYWRtaW4=";
    pub const OPERATOR_AUTH: &str = "Basic b3BzOnB3LW9wcw==";
    pub const VENDOR_AUTH: &str = "Basic bHVjYTpwdy1sdWNh";
    pub const OTHER_VENDOR_AUTH: &str = "Basic dmFsZTpwdy12YWxl";

    pub struct Fixture {
        pub state: AppState,
        pub admin_id: String,
        pub operator_id: String,
        pub vendor_id: String,
        pub other_vendor_id: String,
    }

    /// Fresh in-memory state with one profile per role plus a second vendor.
    pub async fn fixture() -> Fixture {
        let state = AppState::new(
            Store::new(memory_pool().await),
            AppConfig::from_lookup(|_| None),
        );
        let admin_id = create_profile(&state.store, "admin", "pw-admin", "admin").await;
        let operator_id = create_profile(&state.store, "ops", "pw-ops", "operatore").await;
        let vendor_id = create_profile(&state.store, "luca", "pw-luca", "venditore").await;
        let other_vendor_id = create_profile(&state.store, "vale", "pw-vale", "venditore").await;
        Fixture {
            state,
            admin_id,
            operator_id,
            vendor_id,
            other_vendor_id,
        }
    }
}
