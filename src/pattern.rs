//! Route pattern compilation.
//!
//! A route path like `/users/:id/posts/:post_id` compiles to the anchored
//! regex `^/users/(?P<id>[^/]+)/posts/(?P<post_id>[^/]+)$`. Everything that is
//! not a placeholder is matched literally, so `.` or `+` in a route mean
//! themselves.
//!
//! A placeholder is `:` followed by a letter or underscore and then any run of
//! letters, digits and underscores. A `:` that does not start a valid name
//! (`/a/:`, `/a/:9`) is plain text.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r":([A-Za-z_][A-Za-z0-9_]*)").expect("placeholder regex is valid")
});

/// A compiled route path.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    regex: Regex,
    names: Vec<String>,
}

impl PathMatcher {
    /// Compiles `template` into an anchored matcher.
    ///
    /// Fails only when a placeholder name repeats within one template.
    pub fn compile(template: &str) -> Result<Self, regex::Error> {
        let mut pattern = String::with_capacity(template.len() + 16);
        let mut names = Vec::new();
        let mut last = 0;

        pattern.push('^');
        for caps in PLACEHOLDER.captures_iter(template) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else { continue };
            pattern.push_str(&regex::escape(&template[last..whole.start()]));
            pattern.push_str(&format!("(?P<{}>[^/]+)", name.as_str()));
            names.push(name.as_str().to_owned());
            last = whole.end();
        }
        pattern.push_str(&regex::escape(&template[last..]));
        pattern.push('$');

        Ok(Self { regex: Regex::new(&pattern)?, names })
    }

    /// Placeholder names, in template order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Matches the full `path`, returning the captured placeholders.
    pub fn captures(&self, path: &str) -> Option<HashMap<String, String>> {
        let caps = self.regex.captures(path)?;
        let params = self.names.iter()
            .filter_map(|name| caps.name(name).map(|m| (name.clone(), m.as_str().to_owned())))
            .collect();
        Some(params)
    }
}
