//! Role-based narrowing of what a caller can see and change.

use actix_web::{http::header, HttpResponse};

use crate::{auth::Session, models::Role};

/// Which vendor's records a listing covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VendorScope {
    All,
    Vendor(String),
}

impl VendorScope {
    /// Reads a `vendor` query parameter; blank or `all` means unscoped.
    pub fn from_param(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") | Some("all") => VendorScope::All,
            Some(id) => VendorScope::Vendor(id.to_string()),
        }
    }

    pub fn vendor_id(&self) -> Option<&str> {
        match self {
            VendorScope::All => None,
            VendorScope::Vendor(id) => Some(id),
        }
    }

    pub fn admits(&self, vendor_id: Option<&str>) -> bool {
        match self {
            VendorScope::All => true,
            VendorScope::Vendor(id) => vendor_id == Some(id.as_str()),
        }
    }
}

/// Vendors only ever see their own records; everyone else gets what they
/// asked for.
pub fn effective_scope(role: Role, own_id: &str, requested: VendorScope) -> VendorScope {
    match role {
        Role::Vendor => VendorScope::Vendor(own_id.to_string()),
        Role::Admin | Role::Operator => requested,
    }
}

impl Session {
    pub fn scope(&self, requested: VendorScope) -> VendorScope {
        effective_scope(self.role, &self.user_id, requested)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Area {
    Dashboard,
    Contacts,
    Appointments,
    Projects,
    Vendors,
    ManageVendors,
}

impl Area {
    pub fn permits(self, role: Role) -> bool {
        match (self, role) {
            (Area::Dashboard | Area::Appointments, _) => true,
            (Area::Contacts | Area::Projects | Area::Vendors, Role::Admin | Role::Operator) => true,
            (Area::Contacts | Area::Projects | Area::Vendors, Role::Vendor) => false,
            (Area::ManageVendors, Role::Admin) => true,
            (Area::ManageVendors, Role::Operator | Role::Vendor) => false,
        }
    }
}

/// Route guard: `Some(redirect)` to the caller's home when `area` is off
/// limits for their role.
pub fn redirect_unless(session: &Session, area: Area) -> Option<HttpResponse> {
    if area.permits(session.role) {
        return None;
    }
    log::info!(
        "{} ({}) redirected away from {:?}",
        session.display_name,
        session.role,
        area
    );
    Some(
        HttpResponse::SeeOther()
            .append_header((header::LOCATION, session.role.home_route()))
            .finish(),
    )
}

pub fn can_mutate_appointment(session: &Session, vendor_id: Option<&str>) -> bool {
    session.scope(VendorScope::All).admits(vendor_id)
}

#[derive(Debug, Clone)]
pub struct NavLink {
    pub href: &'static str,
    pub label: &'static str,
    pub active: bool,
}

/// Navigation entries the caller's role can open.
pub fn nav_links(role: Role, current: Area) -> Vec<NavLink> {
    [
        (Area::Dashboard, "/app/dashboard", "Dashboard"),
        (Area::Contacts, "/app/contacts", "Contatti"),
        (Area::Appointments, "/app/appointments", "Appuntamenti"),
        (Area::Projects, "/app/projects", "Progetti"),
        (Area::Vendors, "/app/vendors", "Venditori"),
    ]
    .into_iter()
    .filter(|(area, _, _)| area.permits(role))
    .map(|(area, href, label)| NavLink {
        href,
        label,
        active: area == current,
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(role: Role, id: &str) -> Session {
        Session {
            user_id: id.to_string(),
            display_name: id.to_string(),
            role,
        }
    }

    #[test]
    fn vendor_scope_always_collapses_to_own_id() {
        for requested in [
            VendorScope::All,
            VendorScope::Vendor("v2".into()),
            VendorScope::Vendor("v1".into()),
        ] {
            assert_eq!(
                effective_scope(Role::Vendor, "v1", requested),
                VendorScope::Vendor("v1".into())
            );
        }
    }

    #[test]
    fn staff_scope_passes_through_unchanged() {
        for role in [Role::Admin, Role::Operator] {
            assert_eq!(effective_scope(role, "u1", VendorScope::All), VendorScope::All);
            assert_eq!(
                effective_scope(role, "u1", VendorScope::Vendor("v2".into())),
                VendorScope::Vendor("v2".into())
            );
        }
    }

    #[test]
    fn scope_params_treat_blank_and_all_as_unscoped() {
        assert_eq!(VendorScope::from_param(None), VendorScope::All);
        assert_eq!(VendorScope::from_param(Some(" ")), VendorScope::All);
        assert_eq!(VendorScope::from_param(Some("all")), VendorScope::All);
        assert_eq!(
            VendorScope::from_param(Some("v9")),
            VendorScope::Vendor("v9".into())
        );
    }

    #[test]
    fn vendors_only_touch_their_own_appointments() {
        let vendor = session(Role::Vendor, "v1");
        assert!(can_mutate_appointment(&vendor, Some("v1")));
        assert!(!can_mutate_appointment(&vendor, Some("v2")));
        assert!(!can_mutate_appointment(&vendor, None));

        let operator = session(Role::Operator, "o1");
        assert!(can_mutate_appointment(&operator, Some("v2")));
        assert!(can_mutate_appointment(&operator, None));
    }

    #[test]
    fn forbidden_areas_redirect_home() {
        let vendor = session(Role::Vendor, "v1");
        let redirect = redirect_unless(&vendor, Area::Contacts).unwrap();
        assert_eq!(redirect.status(), actix_web::http::StatusCode::SEE_OTHER);
        assert_eq!(
            redirect.headers().get(header::LOCATION).unwrap(),
            "/app/appointments"
        );
        assert!(redirect_unless(&vendor, Area::Appointments).is_none());

        let operator = session(Role::Operator, "o1");
        assert!(redirect_unless(&operator, Area::Vendors).is_none());
        assert!(redirect_unless(&operator, Area::ManageVendors).is_some());
    }

    #[test]
    fn navigation_hides_what_the_role_cannot_open() {
        let labels: Vec<_> = nav_links(Role::Vendor, Area::Appointments)
            .into_iter()
            .map(|link| (link.label, link.active))
            .collect();
        assert_eq!(labels, [("Dashboard", false), ("Appuntamenti", true)]);
        assert_eq!(nav_links(Role::Admin, Area::Dashboard).len(), 5);
    }
}
