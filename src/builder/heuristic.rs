//! Default composition for `merge` nodes without an explicit model list
//!
//! Model ids are grouped by their `/`-separated prefix and groups fold
//! bottom-up: single-member groups collapse and everything else is merged.
//! A model whose id ends in `/profile` profiles its base id (the id without
//! the suffix), so it is layered over the whole group that base id belongs to.

use super::config::CompositionConfiguration;
use std::collections::BTreeMap;

const PROFILE_SUFFIX: &str = "/profile";

#[derive(Debug, Default)]
struct PrefixNode {
    model: Option<String>,
    /// Profile models layered over this group, innermost first
    profiles: Vec<String>,
    children: BTreeMap<String, PrefixNode>,
}

impl PrefixNode {
    fn node_at<'a, I>(&mut self, segments: I) -> &mut PrefixNode
    where
        I: IntoIterator<Item = &'a str>,
    {
        segments
            .into_iter()
            .fold(self, |node, segment| node.children.entry(segment.to_string()).or_default())
    }

    fn insert(&mut self, id: &str) {
        let base = id.strip_suffix(PROFILE_SUFFIX).filter(|base| !base.is_empty());
        match base {
            Some(base) => {
                let mut group: Vec<&str> = base.split('/').collect();
                group.pop();
                self.node_at(group).profiles.push(id.to_string());
            }
            None => self.node_at(id.split('/')).model = Some(id.to_string()),
        }
    }

    fn fold(self) -> Option<CompositionConfiguration> {
        let PrefixNode {
            model,
            mut profiles,
            children,
        } = self;

        let mut parts: Vec<CompositionConfiguration> = model.into_iter().map(CompositionConfiguration::Model).collect();
        parts.extend(children.into_values().filter_map(PrefixNode::fold));

        let mut group = match parts.len() {
            0 => None,
            1 => parts.pop(),
            _ => Some(CompositionConfiguration::merge(parts)),
        };

        profiles.sort();
        for profile in profiles {
            group = Some(match group {
                Some(source) => CompositionConfiguration::application_profile(profile, source),
                None => CompositionConfiguration::Model(profile),
            });
        }
        group
    }
}

/// Compose `model_ids` by prefix. `None` when there is nothing to compose.
pub fn default_composition<I, S>(model_ids: I) -> Option<CompositionConfiguration>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut root = PrefixNode::default();
    for id in model_ids {
        root.insert(id.as_ref());
    }
    root.fold()
}

#[cfg(test)]
mod tests {
    use super::*;
    use CompositionConfiguration as C;

    #[test]
    fn single_model_is_used_directly() {
        assert_eq!(default_composition(["ns/a"]), Some(C::model("ns/a")));
        assert_eq!(default_composition(Vec::<String>::new()), None);
    }

    #[test]
    fn profile_wraps_the_group_of_its_base() {
        let config = default_composition(["ns/a", "ns/b/profile", "ns/b"]).unwrap();
        assert_eq!(
            config,
            C::application_profile("ns/b/profile", C::merge(vec![C::model("ns/a"), C::model("ns/b")]))
        );
    }

    #[test]
    fn profile_stays_inside_its_prefix() {
        let config = default_composition([
            "https://a.example/ns/v",
            "https://a.example/ns/v/profile",
            "https://b.example/w",
        ])
        .unwrap();
        assert_eq!(
            config,
            C::merge(vec![
                C::application_profile("https://a.example/ns/v/profile", C::model("https://a.example/ns/v")),
                C::model("https://b.example/w"),
            ])
        );
    }

    #[test]
    fn profile_over_a_group_wraps_the_merge() {
        let config = default_composition(["ns/x", "ns/y", "ns/profile"]).unwrap();
        assert_eq!(
            config,
            C::application_profile("ns/profile", C::merge(vec![C::model("ns/x"), C::model("ns/y")]))
        );
    }

    #[test]
    fn lone_profile_stays_a_plain_model() {
        assert_eq!(default_composition(["ns/profile"]), Some(C::model("ns/profile")));
    }

    #[test]
    fn top_level_prefixes_are_merged() {
        let config = default_composition(["https://a.example/v", "https://b.example/v"]).unwrap();
        assert_eq!(
            config,
            C::merge(vec![C::model("https://a.example/v"), C::model("https://b.example/v")])
        );
    }
}
