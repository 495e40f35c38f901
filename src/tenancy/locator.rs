use std::path::{Path, PathBuf};

/// Maps an account email to its tenant store file under a fixed root.
#[derive(Debug, Clone)]
pub struct TenantLocator {
    root: PathBuf,
}

impl TenantLocator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<sanitized email>.db`. Pure: no I/O and no validation.
    pub fn locate(&self, email: &str) -> PathBuf {
        self.root.join(format!("{}.db", sanitize_tenant_name(email)))
    }
}

/// Replace `@` with `_at_` and `.` with `_dot_`.
///
/// Not injective: an email that already contains `_at_` can collide with
/// one that contains `@` in the same place.
pub fn sanitize_tenant_name(email: &str) -> String {
    let mut out = String::with_capacity(email.len() + 8);
    for c in email.chars() {
        match c {
            '@' => out.push_str("_at_"),
            '.' => out.push_str("_dot_"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locate_is_deterministic() {
        let locator = TenantLocator::new("db/tenants");
        assert_eq!(
            locator.locate("a@x.com"),
            PathBuf::from("db/tenants/a_at_x_dot_com.db")
        );
        assert_eq!(locator.locate("a@x.com"), locator.locate("a@x.com"));
    }

    #[test]
    fn distinct_emails_get_distinct_paths() {
        let locator = TenantLocator::new("root");
        let emails = ["a@x.com", "b@x.com", "a@y.com", "a.b@x.com", "ab@x.com"];
        let mut paths: Vec<PathBuf> = emails.iter().map(|e| locator.locate(e)).collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), emails.len());
    }

    #[test]
    fn substitution_collision_is_preserved() {
        assert_eq!(
            sanitize_tenant_name("a_at_x.com"),
            sanitize_tenant_name("a@x.com")
        );
    }

    #[test]
    fn sanitized_names_have_no_separators_for_valid_emails() {
        let name = sanitize_tenant_name("first.last+tag@mail.example.org");
        assert_eq!(name, "first_dot_last+tag_at_mail_dot_example_dot_org");
        assert!(!name.contains('/'));
    }
}
