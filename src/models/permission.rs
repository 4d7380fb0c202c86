use std::collections::HashSet;

use serde::Serialize;

pub const MOVIES_READ: &str = "movies:read";
pub const MOVIES_WRITE: &str = "movies:write";

/// Permission codes held by a user, e.g. `movies:read`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Permissions(HashSet<String>);

impl Permissions {
    pub fn includes(&self, code: &str) -> bool {
        self.0.contains(code)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn extend<I: IntoIterator<Item = String>>(&mut self, codes: I) {
        self.0.extend(codes);
    }
}

impl<S: Into<String>> FromIterator<S> for Permissions {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_includes() {
        let perms: Permissions = [MOVIES_READ].into_iter().collect();
        assert!(perms.includes(MOVIES_READ));
        assert!(!perms.includes(MOVIES_WRITE));
        assert!(!Permissions::default().includes(MOVIES_READ));
    }
}
