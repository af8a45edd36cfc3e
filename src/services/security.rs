use std::collections::HashSet;
use std::fmt;
use std::sync::RwLock;

use crate::core::Result;

/// Permission names checked by lifecycle operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    Read,
    Create,
    Modify,
    Delete,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "Read"),
            Self::Create => write!(f, "Create"),
            Self::Modify => write!(f, "Modify"),
            Self::Delete => write!(f, "Delete"),
        }
    }
}

pub trait PermissionService: Send + Sync {
    fn check_permission(
        &self,
        object_type: &str,
        permission: Permission,
        site_id: Option<i64>,
        user: Option<&str>,
    ) -> Result<bool>;
}

pub trait LicenseService: Send + Sync {
    /// `Ok(false)` or an error when the feature is not licensed for the domain.
    fn check_license(&self, feature: &str, domain: &str) -> Result<bool>;
}

/// Grants everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl PermissionService for AllowAll {
    fn check_permission(&self, _: &str, _: Permission, _: Option<i64>, _: Option<&str>) -> Result<bool> {
        Ok(true)
    }
}

impl LicenseService for AllowAll {
    fn check_license(&self, _: &str, _: &str) -> Result<bool> {
        Ok(true)
    }
}

/// License service with an explicit deny list of features.
#[derive(Debug, Default)]
pub struct FeatureLicense {
    denied: RwLock<HashSet<String>>,
}

impl FeatureLicense {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deny(&self, feature: &str) -> Result<()> {
        self.denied.write()?.insert(feature.to_ascii_lowercase());
        Ok(())
    }

    pub fn allow(&self, feature: &str) -> Result<()> {
        self.denied.write()?.remove(&feature.to_ascii_lowercase());
        Ok(())
    }
}

impl LicenseService for FeatureLicense {
    fn check_license(&self, feature: &str, _domain: &str) -> Result<bool> {
        Ok(!self.denied.read()?.contains(&feature.to_ascii_lowercase()))
    }
}

/// Permission service denying selected (type, permission) pairs.
#[derive(Debug, Default)]
pub struct PermissionTable {
    denied: RwLock<HashSet<(String, Permission)>>,
}

impl PermissionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deny(&self, object_type: &str, permission: Permission) -> Result<()> {
        self.denied
            .write()?
            .insert((object_type.to_ascii_lowercase(), permission));
        Ok(())
    }
}

impl PermissionService for PermissionTable {
    fn check_permission(
        &self,
        object_type: &str,
        permission: Permission,
        _site_id: Option<i64>,
        _user: Option<&str>,
    ) -> Result<bool> {
        Ok(!self
            .denied
            .read()?
            .contains(&(object_type.to_ascii_lowercase(), permission)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_license_deny_and_allow() {
        let license = FeatureLicense::new();
        assert!(license.check_license("Forums", "localhost").unwrap());
        license.deny("forums").unwrap();
        assert!(!license.check_license("Forums", "localhost").unwrap());
        license.allow("FORUMS").unwrap();
        assert!(license.check_license("Forums", "localhost").unwrap());
    }

    #[test]
    fn test_permission_table() {
        let permissions = PermissionTable::new();
        permissions.deny("cms.page", Permission::Delete).unwrap();
        assert!(!permissions
            .check_permission("CMS.Page", Permission::Delete, None, None)
            .unwrap());
        assert!(permissions
            .check_permission("cms.page", Permission::Modify, None, None)
            .unwrap());
    }
}
