// src/query.rs
//! # Query Compiler
//! Turns the declarative search document into flat boolean query strings,
//! one per location/sort variant. Pure functions, no I/O — the crawl engine
//! consumes the output.

use anyhow::{bail, Result};
use tracing::{debug, info};

use crate::config::{BoolGroup, GroupTerm, SearchDocument, SearchParameters, SearchSpec};

/// One compiled search variant, immutable, consumed by the crawl engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub text: String,
    pub max_results: usize,
    pub sort_by_latest: bool,
}

/// Compile every enabled search into its full list of query variants.
/// Output order is deterministic: document order, then locations, then sort
/// flags. Disabled searches contribute nothing.
///
/// A malformed document (missing `name` or `parameters`) is a configuration
/// error, raised here before any query executes.
pub fn compile(doc: &SearchDocument) -> Result<Vec<SearchQuery>> {
    doc.validate()?;
    let mut out = Vec::new();
    for search in &doc.searches {
        let name = search.name.as_deref().unwrap_or("[unnamed]");
        if !search.enabled {
            info!(search = name, "skipping disabled search");
            continue;
        }
        let Some(params) = search.parameters.as_ref() else {
            bail!("search '{name}' is missing its 'parameters' section");
        };
        let base = base_query(search, params);
        debug!(search = name, base = %base, "compiled base query");
        let flags = sort_flags(search.sort_by_latest_option);

        match search.locations.as_deref() {
            Some(locations) if !locations.is_empty() => {
                for location in locations {
                    for &flag in flags {
                        out.push(SearchQuery {
                            text: format!("{base} AND \"{location}\""),
                            max_results: search.max_results,
                            sort_by_latest: flag,
                        });
                    }
                }
            }
            _ => {
                for &flag in flags {
                    out.push(SearchQuery {
                        text: base.clone(),
                        max_results: search.max_results,
                        sort_by_latest: flag,
                    });
                }
            }
        }
    }
    info!(count = out.len(), "query compilation finished");
    Ok(out)
}

/// Sort-option resolution: 0 → latest off, 1 → latest on, 2 → both variants.
/// Unknown options fall back to `[false]`.
fn sort_flags(option: u8) -> &'static [bool] {
    match option {
        0 => &[false],
        1 => &[true],
        2 => &[false, true],
        _ => &[false],
    }
}

/// `<includes AND industry-group> NOT <exclude> NOT <exclude> ...`
fn base_query(search: &SearchSpec, params: &SearchParameters) -> String {
    let mut components = Vec::new();

    let mut include_components: Vec<String> = Vec::new();
    include_components.extend(params.includes.keywords.iter().cloned());
    include_components.extend(
        params
            .includes
            .exact_phrases
            .iter()
            .map(|p| format!("\"{p}\"")),
    );
    for group in &params.includes.groups {
        include_components.push(render_group(group, 0));
    }
    if !search.industries.is_empty() {
        let industries: Vec<String> = search
            .industries
            .iter()
            .map(|i| format!("\"{i}\""))
            .collect();
        include_components.push(format!("({})", industries.join(" OR ")));
    }
    if !include_components.is_empty() {
        components.push(include_components.join(" AND "));
    }

    let mut exclude_components: Vec<String> = Vec::new();
    exclude_components.extend(params.excludes.keywords.iter().cloned());
    exclude_components.extend(
        params
            .excludes
            .exact_phrases
            .iter()
            .map(|p| format!("\"{p}\"")),
    );
    for group in &params.excludes.groups {
        exclude_components.push(render_group(group, 0));
    }
    if !exclude_components.is_empty() {
        components.push(format!("NOT {}", exclude_components.join(" NOT ")));
    }

    components.join(" ")
}

/// Render a boolean group as an operator-joined expression. Parenthesized
/// unless it is a single-term group at the top level.
fn render_group(group: &BoolGroup, level: usize) -> String {
    let terms: Vec<String> = group
        .terms
        .iter()
        .map(|t| match t {
            GroupTerm::Word(w) => w.clone(),
            GroupTerm::Nested { group } => render_group(group, level + 1),
        })
        .collect();
    let joined = terms.join(&format!(" {} ", group.operator));
    if terms.len() > 1 || level > 0 {
        format!("({joined})")
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SearchParameters, TermSet};

    fn spec(name: &str) -> SearchSpec {
        SearchSpec {
            name: Some(name.to_string()),
            enabled: true,
            parameters: Some(SearchParameters::default()),
            locations: None,
            industries: Vec::new(),
            sort_by_latest_option: 0,
            max_results: 10,
        }
    }

    fn with_keywords(mut s: SearchSpec, kws: &[&str]) -> SearchSpec {
        s.parameters = Some(SearchParameters {
            includes: TermSet {
                keywords: kws.iter().map(|k| k.to_string()).collect(),
                ..Default::default()
            },
            excludes: TermSet::default(),
        });
        s
    }

    #[test]
    fn disabled_search_contributes_zero_queries() {
        let mut s = with_keywords(spec("off"), &["rust"]);
        s.enabled = false;
        let doc = SearchDocument { searches: vec![s] };
        assert!(compile(&doc).unwrap().is_empty());
    }

    #[test]
    fn missing_parameters_is_a_config_error_not_a_panic() {
        let mut s = spec("broken");
        s.parameters = None;
        let doc = SearchDocument { searches: vec![s] };
        let err = compile(&doc).unwrap_err();
        assert!(err.to_string().contains("parameters"));
    }

    #[test]
    fn missing_name_is_a_config_error() {
        let mut s = with_keywords(spec("x"), &["rust"]);
        s.name = None;
        let doc = SearchDocument { searches: vec![s] };
        assert!(compile(&doc).is_err());
    }

    #[test]
    fn no_locations_one_query_per_sort_flag() {
        let mut s = with_keywords(spec("s"), &["rust"]);
        s.sort_by_latest_option = 2;
        let doc = SearchDocument { searches: vec![s] };
        let queries = compile(&doc).unwrap();
        assert_eq!(queries.len(), 2);
        assert!(!queries[0].sort_by_latest);
        assert!(queries[1].sort_by_latest);
    }

    #[test]
    fn sort_option_zero_yields_single_unsorted_query() {
        let s = with_keywords(spec("s"), &["golang"]);
        let doc = SearchDocument { searches: vec![s] };
        let queries = compile(&doc).unwrap();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].text, "golang");
        assert!(!queries[0].sort_by_latest);
    }

    #[test]
    fn count_is_locations_times_sort_flags() {
        let mut s = with_keywords(spec("s"), &["python"]);
        s.locations = Some(vec!["Berlin".into(), "Remote".into(), "Prague".into()]);
        s.sort_by_latest_option = 2;
        let doc = SearchDocument { searches: vec![s] };
        let queries = compile(&doc).unwrap();
        assert_eq!(queries.len(), 3 * 2);
        assert!(queries[0].text.ends_with("AND \"Berlin\""));
    }

    #[test]
    fn unknown_sort_option_falls_back_to_unsorted() {
        let mut s = with_keywords(spec("s"), &["java"]);
        s.sort_by_latest_option = 7;
        let doc = SearchDocument { searches: vec![s] };
        let queries = compile(&doc).unwrap();
        assert_eq!(queries.len(), 1);
        assert!(!queries[0].sort_by_latest);
    }

    #[test]
    fn base_query_joins_includes_industries_and_excludes() {
        let mut s = spec("full");
        s.parameters = Some(SearchParameters {
            includes: TermSet {
                keywords: vec!["hiring".into()],
                exact_phrases: vec!["remote ok".into()],
                groups: vec![BoolGroup {
                    operator: "OR".into(),
                    terms: vec![
                        GroupTerm::Word("rust".into()),
                        GroupTerm::Word("golang".into()),
                    ],
                }],
            },
            excludes: TermSet {
                keywords: vec!["intern".into()],
                exact_phrases: vec!["no agencies".into()],
                groups: Vec::new(),
            },
        });
        s.industries = vec!["fintech".into(), "devtools".into()];
        let doc = SearchDocument { searches: vec![s] };
        let queries = compile(&doc).unwrap();
        assert_eq!(
            queries[0].text,
            "hiring AND \"remote ok\" AND (rust OR golang) AND (\"fintech\" OR \"devtools\") \
             NOT intern NOT \"no agencies\""
        );
    }

    #[test]
    fn nested_groups_are_always_parenthesized() {
        let g = BoolGroup {
            operator: "AND".into(),
            terms: vec![
                GroupTerm::Word("senior".into()),
                GroupTerm::Nested {
                    group: BoolGroup {
                        operator: "OR".into(),
                        terms: vec![GroupTerm::Word("remote".into())],
                    },
                },
            ],
        };
        assert_eq!(render_group(&g, 0), "(senior AND (remote))");
    }

    #[test]
    fn single_term_top_level_group_is_bare() {
        let g = BoolGroup {
            operator: "OR".into(),
            terms: vec![GroupTerm::Word("rust".into())],
        };
        assert_eq!(render_group(&g, 0), "rust");
    }
}
