//! Role policy: pure capability predicates over the requesting user.
//!
//! A missing role is treated as the least privileged one (Volunteer).
//! Superusers act as Admin.

use crate::domain::models::{User, UserId, UserRole};

/// Capability marker for records with a single owning user.
pub trait Owned {
    fn owner_id(&self) -> Option<UserId>;
}

pub fn effective_role(user: &User) -> UserRole {
    if user.is_superuser {
        return UserRole::Admin;
    }
    user.role.unwrap_or(UserRole::Volunteer)
}

pub fn is_admin(user: &User) -> bool {
    effective_role(user) == UserRole::Admin
}

pub fn is_manager(user: &User) -> bool {
    effective_role(user) == UserRole::Manager
}

pub fn is_staff(user: &User) -> bool {
    effective_role(user) == UserRole::Staff
}

pub fn is_volunteer(user: &User) -> bool {
    effective_role(user) == UserRole::Volunteer
}

pub fn can_view_all(user: &User) -> bool {
    is_admin(user) || is_manager(user)
}

pub fn can_add_records(user: &User) -> bool {
    is_admin(user) || is_manager(user)
}

pub fn can_manage_record<R: Owned + ?Sized>(user: &User, record: &R) -> bool {
    if can_view_all(user) {
        return true;
    }
    record.owner_id() == Some(user.id)
}

pub fn can_manage_forms(user: &User) -> bool {
    user.is_active && !is_volunteer(user)
}

pub fn can_fill_forms(user: &User) -> bool {
    user.is_active
}

pub fn can_access_tables(user: &User) -> bool {
    user.is_active && !is_volunteer(user)
}

/// Owner to filter by when the user may not see everything.
pub fn visibility_scope(user: &User) -> Option<UserId> {
    if can_view_all(user) {
        None
    } else {
        Some(user.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(id: UserId, role: Option<UserRole>) -> User {
        User {
            id,
            email: format!("user{id}@example.org"),
            display_name: format!("User {id}"),
            role,
            is_superuser: false,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    struct Record(Option<UserId>);

    impl Owned for Record {
        fn owner_id(&self) -> Option<UserId> {
            self.0
        }
    }

    #[test]
    fn test_staff_manages_only_own_records() {
        let staff = user(7, Some(UserRole::Staff));
        assert!(can_manage_record(&staff, &Record(Some(7))));
        assert!(!can_manage_record(&staff, &Record(Some(8))));
        assert!(!can_manage_record(&staff, &Record(None)));
    }

    #[test]
    fn test_admin_and_manager_manage_everything() {
        for role in [UserRole::Admin, UserRole::Manager] {
            let u = user(1, Some(role));
            assert!(can_view_all(&u));
            assert!(can_add_records(&u));
            assert!(can_manage_record(&u, &Record(Some(99))));
        }
    }

    #[test]
    fn test_superuser_without_role_is_admin() {
        let mut u = user(1, None);
        u.is_superuser = true;
        assert!(is_admin(&u));
        assert!(can_view_all(&u));
        assert!(!is_volunteer(&u));
    }

    #[test]
    fn test_missing_role_is_least_privileged() {
        let u = user(3, None);
        assert!(is_volunteer(&u));
        assert!(!can_manage_forms(&u));
        assert!(!can_access_tables(&u));
        assert!(can_fill_forms(&u));
    }

    #[test]
    fn test_volunteer_capabilities() {
        let v = user(4, Some(UserRole::Volunteer));
        assert!(can_fill_forms(&v));
        assert!(!can_manage_forms(&v));
        assert!(!can_access_tables(&v));
        assert!(!can_add_records(&v));
        assert_eq!(visibility_scope(&v), Some(4));
    }

    #[test]
    fn test_staff_capabilities() {
        let s = user(5, Some(UserRole::Staff));
        assert!(is_staff(&s));
        assert!(can_manage_forms(&s));
        assert!(can_access_tables(&s));
        assert!(!can_add_records(&s));
        assert!(!can_view_all(&s));
    }

    #[test]
    fn test_inactive_user_loses_capabilities() {
        let mut s = user(5, Some(UserRole::Staff));
        s.is_active = false;
        assert!(!can_fill_forms(&s));
        assert!(!can_manage_forms(&s));
    }
}
