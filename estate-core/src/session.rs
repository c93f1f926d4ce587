//! Signed-in user and role.
//!
//! A session is an explicit value: created by [`Session::login`], dropped on
//! logout. The repository never looks at it; callers check
//! [`Session::require_admin`] before any mutation.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Viewer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => f.write_str("Admin"),
            Role::Viewer => f.write_str("Viewer"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub email: String,
    pub role: Role,
}

impl Session {
    /// Email-only sign-in: the address must look like one, and it is an admin
    /// iff it appears in `admin_emails` (case-insensitive).
    pub fn login(email: &str, admin_emails: &[String]) -> Result<Session, SessionError> {
        let email = email.trim();
        if !email.contains('@') || !email.contains('.') {
            return Err(SessionError::InvalidEmail(email.to_string()));
        }
        let role = if admin_emails.iter().any(|a| a.trim().eq_ignore_ascii_case(email)) {
            Role::Admin
        } else {
            Role::Viewer
        };
        Ok(Session {
            email: email.to_string(),
            role,
        })
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> Result<(), SessionError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(SessionError::Forbidden {
                email: self.email.clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admins() -> Vec<String> {
        vec!["estates@college.example".to_string()]
    }

    #[test]
    fn admin_list_decides_role() {
        let s = Session::login("Estates@College.example", &admins()).unwrap();
        assert_eq!(s.role, Role::Admin);
        assert!(s.require_admin().is_ok());

        let v = Session::login("porter@college.example", &admins()).unwrap();
        assert_eq!(v.role, Role::Viewer);
        assert!(matches!(v.require_admin(), Err(SessionError::Forbidden { .. })));
    }

    #[test]
    fn rejects_malformed_email() {
        assert!(Session::login("porter", &admins()).is_err());
        assert!(Session::login("porter@college", &admins()).is_err());
    }

    #[test]
    fn persisted_form_names_the_role() {
        let s = Session::login("estates@college.example", &admins()).unwrap();
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["role"], "Admin");
        assert_eq!(json["email"], "estates@college.example");
    }
}
