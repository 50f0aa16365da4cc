use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use crate::core::error::{Error, Result};
use crate::core::types::ObjectRecord;

/// Roles allowed to break somebody else's page lock.
pub const PRIVILEGED_ROLES: &[&str] = &["Manager", "Owner"];

/// Cooperative lock on one editable page of one object, held by the user who
/// opened the edit form. Unrelated to transactional isolation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLock {
    pub user: String,
    pub page: String,
    pub acquired: DateTime<Utc>,
}

impl PageLock {
    /// Lock `page` for `user`. Re-acquiring one's own lock refreshes it.
    pub fn acquire(object: &mut ObjectRecord, user: &str, page: &str) -> Result<()> {
        if let Some(held) = object.locks.get(page) {
            if held.user != user {
                return Err(Error::conflict(format!(
                    "page '{}' of object {} is locked by '{}'",
                    page, object.iid, held.user
                )));
            }
        }
        debug!("page lock: {} takes '{}' on {}", user, page, object.iid);
        object.locks.insert(
            page.to_string(),
            PageLock {
                user: user.to_string(),
                page: page.to_string(),
                acquired: Utc::now(),
            },
        );
        Ok(())
    }

    /// Validate a save by `user`. An unlocked page can be saved by anyone.
    pub fn check(object: &ObjectRecord, user: &str, page: &str) -> Result<()> {
        match object.locks.get(page) {
            Some(held) if held.user != user => Err(Error::conflict(format!(
                "page '{}' of object {} is locked by '{}'",
                page, object.iid, held.user
            ))),
            _ => Ok(()),
        }
    }

    /// Release after a save or cancel. Returns whether a lock was held.
    pub fn release(object: &mut ObjectRecord, user: &str, page: &str) -> Result<bool> {
        Self::check(object, user, page)?;
        Ok(object.locks.remove(page).is_some())
    }

    /// Break the lock whoever holds it; `roles` are the caller's roles.
    pub fn force_release(object: &mut ObjectRecord, page: &str, roles: &[&str]) -> Result<bool> {
        if !roles.iter().any(|r| PRIVILEGED_ROLES.contains(r)) {
            return Err(Error::conflict(format!(
                "roles {:?} may not remove the lock on page '{}'",
                roles, page
            )));
        }
        Ok(object.locks.remove(page).is_some())
    }
}
