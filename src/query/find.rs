//! Name search over class-like entities

use crate::entity::{Entity, LanguageString};
use regex_lite::{Regex, RegexBuilder};

/// Case-insensitive search over display names.
///
/// The query is used as a regular expression; when it does not compile it
/// is matched as a literal substring instead.
#[derive(Debug, Clone)]
pub struct NameQuery {
    matcher: Matcher,
    /// Maximum number of results
    pub limit: Option<usize>,
}

#[derive(Debug, Clone)]
enum Matcher {
    Pattern(Regex),
    Substring(String),
}

impl Matcher {
    fn is_match(&self, text: &str) -> bool {
        match self {
            Matcher::Pattern(regex) => regex.is_match(text),
            Matcher::Substring(needle) => text.to_lowercase().contains(needle.as_str()),
        }
    }
}

impl NameQuery {
    pub fn new(query: &str) -> Self {
        let matcher = match RegexBuilder::new(query).case_insensitive(true).build() {
            Ok(regex) => Matcher::Pattern(regex),
            Err(_) => Matcher::Substring(query.to_lowercase()),
        };
        Self {
            matcher,
            limit: None,
        }
    }

    /// Limit results
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Length of the shortest name (in any language) matching the query.
    pub fn score_name(&self, name: &LanguageString) -> Option<usize> {
        name.values()
            .filter(|text| self.matcher.is_match(text))
            .map(|text| text.chars().count())
            .min()
    }

    /// Score a class or class profile; other kinds never match.
    pub fn score(&self, entity: &Entity) -> Option<usize> {
        if !entity.is_class_like() {
            return None;
        }
        entity.display_name().and_then(|name| self.score_name(name))
    }

    /// Keep matching items, shortest matching name first (ties by id).
    pub fn execute<T, F>(&self, items: impl IntoIterator<Item = T>, entity_of: F) -> Vec<T>
    where
        F: Fn(&T) -> &Entity,
    {
        let mut scored: Vec<(usize, T)> = items
            .into_iter()
            .filter_map(|item| self.score(entity_of(&item)).map(|score| (score, item)))
            .collect();
        scored.sort_by(|(sa, a), (sb, b)| {
            sa.cmp(sb)
                .then_with(|| entity_of(a).id().cmp(entity_of(b).id()))
        });

        let mut results: Vec<T> = scored.into_iter().map(|(_, item)| item).collect();
        if let Some(limit) = self.limit {
            results.truncate(limit);
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Class, ClassProfile, Generalization};

    fn classes() -> Vec<Entity> {
        vec![
            Class::new("a").with_name("en", "Personal Document").into(),
            Class::new("b").with_name("en", "Person").into(),
            Class::new("c").with_name("cs", "Osoba").into(),
            Generalization::new("g", "b", "a").into(),
        ]
    }

    #[test]
    fn shortest_match_first() {
        let results = NameQuery::new("person").execute(classes(), |e| e);
        let ids: Vec<&str> = results.iter().map(|e| e.id()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn regex_queries_are_supported() {
        let results = NameQuery::new("^os").execute(classes(), |e| e);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id(), "c");
    }

    #[test]
    fn invalid_regex_falls_back_to_substring() {
        let items: Vec<Entity> = vec![Class::new("x").with_name("en", "Size (cm").into()];
        let results = NameQuery::new("(cm").execute(items, |e| e);
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn profiles_match_by_aggregated_name() {
        let profile: Entity = ClassProfile::new("p", ["b"]).with_name("en", "Citizen").into();
        assert_eq!(NameQuery::new("citi").score(&profile), Some(7));
    }

    #[test]
    fn limit_truncates() {
        let results = NameQuery::new("").limit(2).execute(classes(), |e| e);
        assert_eq!(results.len(), 2);
    }
}
