use std::any::TypeId;

use crate::errors::ContainerError;

/// A resolution request: required type plus optional qualifier hint and
/// required-ness.
#[derive(Debug, Clone)]
pub struct DependencyDescriptor {
    required_type: TypeId,
    type_name: &'static str,
    qualifier: Option<String>,
    required: bool,
}

impl DependencyDescriptor {
    /// Create a required descriptor for a type
    pub fn of<T: 'static>() -> Self {
        Self {
            required_type: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            qualifier: None,
            required: true,
        }
    }

    /// Narrow candidates to those matching a qualifier or bean name
    pub fn with_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }

    /// Mark the dependency optional: absence resolves to `None` instead of
    /// an error
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn required_type(&self) -> TypeId {
        self.required_type
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }

    pub fn is_required(&self) -> bool {
        self.required
    }
}

/// One type-compatible registration considered during resolution
#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    pub name: String,
    pub primary: bool,
    pub priority: Option<i32>,
    pub qualifier: Option<String>,
}

/// Select one candidate name, applying the tie-break chain:
/// qualifier match, then primary flag, then lowest priority value.
///
/// Local and parent-container candidates must already be merged into the
/// one `candidates` sequence before calling this.
pub(crate) fn select_candidate(
    descriptor: &DependencyDescriptor,
    candidates: Vec<Candidate>,
) -> Result<Option<String>, ContainerError> {
    match candidates.len() {
        0 => {
            if descriptor.is_required() {
                Err(ContainerError::NoMatchingService {
                    required_type: descriptor.type_name().to_string(),
                })
            } else {
                Ok(None)
            }
        }
        1 => Ok(Some(candidates[0].name.clone())),
        _ => tie_break(descriptor, candidates).map(Some),
    }
}

fn tie_break(
    descriptor: &DependencyDescriptor,
    mut candidates: Vec<Candidate>,
) -> Result<String, ContainerError> {
    if let Some(hint) = descriptor.qualifier() {
        let matched: Vec<Candidate> = candidates
            .iter()
            .filter(|c| c.qualifier.as_deref() == Some(hint) || c.name == hint)
            .cloned()
            .collect();
        if matched.len() == 1 {
            return Ok(matched[0].name.clone());
        }
        // an empty subset falls through to the unfiltered candidate set
        if !matched.is_empty() {
            candidates = matched;
        }
    }

    let primaries: Vec<&Candidate> = candidates.iter().filter(|c| c.primary).collect();
    match primaries.len() {
        1 => return Ok(primaries[0].name.clone()),
        // more than one primary is terminal ambiguity, never falls
        // through to priority comparison
        n if n > 1 => {
            return Err(ContainerError::MultiplePrimary {
                required_type: descriptor.type_name().to_string(),
                candidates: primaries.iter().map(|c| c.name.clone()).collect(),
            })
        }
        _ => {}
    }

    if let Some(lowest) = candidates.iter().filter_map(|c| c.priority).min() {
        let at_lowest: Vec<&Candidate> = candidates
            .iter()
            .filter(|c| c.priority == Some(lowest))
            .collect();
        if at_lowest.len() == 1 {
            return Ok(at_lowest[0].name.clone());
        }
        return Err(ContainerError::MultipleSamePriority {
            required_type: descriptor.type_name().to_string(),
            priority: lowest,
            candidates: at_lowest.iter().map(|c| c.name.clone()).collect(),
        });
    }

    Err(ContainerError::NoUniqueService {
        required_type: descriptor.type_name().to_string(),
        candidates: candidates.iter().map(|c| c.name.clone()).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Repo;

    fn candidate(name: &str) -> Candidate {
        Candidate {
            name: name.to_string(),
            primary: false,
            priority: None,
            qualifier: None,
        }
    }

    #[test]
    fn test_zero_candidates_required_fails_naming_type() {
        let descriptor = DependencyDescriptor::of::<Repo>();
        let err = select_candidate(&descriptor, vec![]).unwrap_err();
        match err {
            ContainerError::NoMatchingService { required_type } => {
                assert!(required_type.contains("Repo"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_zero_candidates_optional_resolves_none() {
        let descriptor = DependencyDescriptor::of::<Repo>().optional();
        assert!(select_candidate(&descriptor, vec![]).unwrap().is_none());
    }

    #[test]
    fn test_single_candidate_selected() {
        let descriptor = DependencyDescriptor::of::<Repo>();
        let selected = select_candidate(&descriptor, vec![candidate("only")]).unwrap();
        assert_eq!(selected.as_deref(), Some("only"));
    }

    #[test]
    fn test_qualifier_match_wins() {
        let descriptor = DependencyDescriptor::of::<Repo>().with_qualifier("backup");
        let mut second = candidate("b");
        second.qualifier = Some("backup".to_string());
        let selected = select_candidate(&descriptor, vec![candidate("a"), second]).unwrap();
        assert_eq!(selected.as_deref(), Some("b"));
    }

    #[test]
    fn test_qualifier_matches_bean_name() {
        let descriptor = DependencyDescriptor::of::<Repo>().with_qualifier("a");
        let selected = select_candidate(&descriptor, vec![candidate("a"), candidate("b")]).unwrap();
        assert_eq!(selected.as_deref(), Some("a"));
    }

    #[test]
    fn test_empty_qualifier_subset_falls_through_to_primary() {
        let descriptor = DependencyDescriptor::of::<Repo>().with_qualifier("missing");
        let mut first = candidate("a");
        first.primary = true;
        let selected = select_candidate(&descriptor, vec![first, candidate("b")]).unwrap();
        assert_eq!(selected.as_deref(), Some("a"));
    }

    #[test]
    fn test_single_primary_wins() {
        let mut second = candidate("b");
        second.primary = true;
        let descriptor = DependencyDescriptor::of::<Repo>();
        let selected = select_candidate(&descriptor, vec![candidate("a"), second]).unwrap();
        assert_eq!(selected.as_deref(), Some("b"));
    }

    #[test]
    fn test_two_primaries_fail_without_priority_fallback() {
        let mut a = candidate("a");
        a.primary = true;
        // would win on priority if primary ambiguity fell through
        a.priority = Some(0);
        let mut b = candidate("b");
        b.primary = true;
        b.priority = Some(5);
        let descriptor = DependencyDescriptor::of::<Repo>();
        let err = select_candidate(&descriptor, vec![a, b]).unwrap_err();
        assert!(matches!(err, ContainerError::MultiplePrimary { .. }));
    }

    #[test]
    fn test_lowest_priority_wins() {
        let mut a = candidate("a");
        a.priority = Some(10);
        let mut b = candidate("b");
        b.priority = Some(2);
        let descriptor = DependencyDescriptor::of::<Repo>();
        let selected = select_candidate(&descriptor, vec![a, b]).unwrap();
        assert_eq!(selected.as_deref(), Some("b"));
    }

    #[test]
    fn test_shared_lowest_priority_fails_with_value() {
        let mut a = candidate("a");
        a.priority = Some(3);
        let mut b = candidate("b");
        b.priority = Some(3);
        let descriptor = DependencyDescriptor::of::<Repo>();
        let err = select_candidate(&descriptor, vec![a, b, candidate("c")]).unwrap_err();
        match err {
            ContainerError::MultipleSamePriority {
                priority,
                candidates,
                ..
            } => {
                assert_eq!(priority, 3);
                assert_eq!(candidates, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unresolvable_ambiguity_lists_all_candidates() {
        let descriptor = DependencyDescriptor::of::<Repo>();
        let err = select_candidate(&descriptor, vec![candidate("a"), candidate("b")]).unwrap_err();
        match err {
            ContainerError::NoUniqueService { candidates, .. } => {
                assert_eq!(candidates, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
