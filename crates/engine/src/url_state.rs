//! URL-state directives: query mutation, path replacement, history mode.

use url::Url;

/// Parsed `push` / `pull` / `path` / `history` attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlDirectives {
    /// Query parameters to set.
    pub push: Vec<(String, String)>,
    /// Query parameter names to delete.
    pub pull: Vec<String>,
    /// Replacement path.
    pub path: Option<String>,
    /// `history="push"` pushes a history entry; anything else replaces.
    pub history_push: bool,
}

impl UrlDirectives {
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.push.is_empty() && self.pull.is_empty() && self.path.is_none()
    }
}

/// The engine's view of the address bar: a current URL plus a history stack.
pub struct UrlState {
    current: Url,
    history: Vec<Url>,
}

impl UrlState {
    #[inline]
    #[must_use]
    pub const fn new(initial: Url) -> Self {
        Self {
            current: initial,
            history: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub const fn current(&self) -> &Url {
        &self.current
    }

    #[inline]
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Apply directives to the current URL. A no-op when all three mutation
    /// fields are absent; otherwise the history mode decides between pushing
    /// a new entry and replacing the current one.
    #[inline]
    pub fn apply(&mut self, directives: &UrlDirectives) {
        if directives.is_empty() {
            return;
        }
        let mut next = self.current.clone();

        let mut pairs: Vec<(String, String)> = next
            .query_pairs()
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        for (key, value) in &directives.push {
            if let Some(pair) = pairs.iter_mut().find(|(existing, _)| existing == key) {
                pair.1.clone_from(value);
            } else {
                pairs.push((key.clone(), value.clone()));
            }
        }
        pairs.retain(|(key, _)| !directives.pull.iter().any(|gone| gone == key));
        if pairs.is_empty() {
            next.set_query(None);
        } else {
            let mut serializer = next.query_pairs_mut();
            serializer.clear();
            for (key, value) in &pairs {
                serializer.append_pair(key, value);
            }
            drop(serializer);
        }

        if let Some(path) = &directives.path {
            next.set_path(path);
        }

        if directives.history_push {
            self.history.push(self.current.clone());
        }
        self.current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::{UrlDirectives, UrlState};
    use url::Url;

    fn state() -> UrlState {
        UrlState::new(Url::parse("http://localhost/app?keep=1&old=2").unwrap())
    }

    #[test]
    fn push_sets_and_overrides_parameters() {
        let mut urls = state();
        urls.apply(&UrlDirectives {
            push: vec![
                (String::from("old"), String::from("9")),
                (String::from("new"), String::from("x")),
            ],
            ..UrlDirectives::default()
        });
        assert_eq!(urls.current().query(), Some("keep=1&old=9&new=x"));
        assert_eq!(urls.history_len(), 0);
    }

    #[test]
    fn pull_deletes_parameters() {
        let mut urls = state();
        urls.apply(&UrlDirectives {
            pull: vec![String::from("keep"), String::from("old")],
            ..UrlDirectives::default()
        });
        assert_eq!(urls.current().query(), None);
    }

    #[test]
    fn path_replaces_and_history_pushes() {
        let mut urls = state();
        urls.apply(&UrlDirectives {
            path: Some(String::from("/todos")),
            history_push: true,
            ..UrlDirectives::default()
        });
        assert_eq!(urls.current().path(), "/todos");
        assert_eq!(urls.history_len(), 1);
    }

    #[test]
    fn empty_directives_do_nothing() {
        let mut urls = state();
        let before = urls.current().clone();
        urls.apply(&UrlDirectives {
            history_push: true,
            ..UrlDirectives::default()
        });
        assert_eq!(urls.current(), &before);
        assert_eq!(urls.history_len(), 0);
    }
}
