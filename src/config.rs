use std::env;

const DEFAULT_DATABASE_URL: &str = "sqlite://./data/gestionale.db";
const DEFAULT_ADMIN_PASSWORD: &str = "admin";
const DEFAULT_DEMO_PASSWORD: &str = "change-me";

#[derive(Clone, Debug)]
pub struct SeedAccount {
    pub username: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl SeedAccount {
    pub fn uses_default_password(&self) -> bool {
        self.password == DEFAULT_ADMIN_PASSWORD || self.password == DEFAULT_DEMO_PASSWORD
    }

    pub fn demo_operator() -> Self {
        Self {
            username: "operatore".to_string(),
            password: DEFAULT_DEMO_PASSWORD.to_string(),
            first_name: "Giulia".to_string(),
            last_name: "Neri".to_string(),
            email: "operatore@example.com".to_string(),
        }
    }

    pub fn demo_vendor() -> Self {
        Self {
            username: "venditore".to_string(),
            password: DEFAULT_DEMO_PASSWORD.to_string(),
            first_name: "Luca".to_string(),
            last_name: "Ferri".to_string(),
            email: "venditore@example.com".to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub admin: SeedAccount,
    /// Contacts per page. Defaults to 2, which matches the product as it
    /// shipped; override with `CONTACTS_PAGE_SIZE`.
    pub contacts_page_size: usize,
    pub projects_page_size: usize,
    pub seed_demo: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let page_size = |key: &str, default: usize| {
            lookup(key)
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(default)
                .max(1)
        };

        Self {
            database_url: text("DATABASE_URL", DEFAULT_DATABASE_URL),
            port: lookup("PORT")
                .and_then(|value| value.parse().ok())
                .unwrap_or(8080),
            admin: SeedAccount {
                username: text("ADMIN_USER", "admin"),
                password: text("ADMIN_PASSWORD", DEFAULT_ADMIN_PASSWORD),
                first_name: text("ADMIN_DISPLAY_NAME", "Amministratore"),
                last_name: String::new(),
                email: text("ADMIN_EMAIL", "admin@example.com"),
            },
            contacts_page_size: page_size("CONTACTS_PAGE_SIZE", 2),
            projects_page_size: page_size("PROJECTS_PAGE_SIZE", 6),
            seed_demo: lookup("SEED_DEMO").as_deref() == Some("true"),
        }
    }
}
