// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Module filtering and module-name matching (spec §4.5 "Module filtering",
//! "Module-name matching").

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use regex::Regex;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlannerError {
    MultipleModulesFound(String),
    InvalidPattern(String, String),
    Io(String),
    ConfigParseError(String),
}

impl fmt::Display for PlannerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlannerError::MultipleModulesFound(pattern) => {
                write!(f, "multiple modules match pattern {pattern}")
            }
            PlannerError::InvalidPattern(pattern, reason) => {
                write!(f, "invalid module pattern {pattern}: {reason}")
            }
            PlannerError::Io(reason) => write!(f, "failed to list xts modules: {reason}"),
            PlannerError::ConfigParseError(reason) => {
                write!(f, "invalid device-configuration file: {reason}")
            }
        }
    }
}

impl std::error::Error for PlannerError {}

/// A single device-selection-like filter clause contributed by the run command (spec §4.5).
/// `module` may be an exact module name or a regex pattern; `test_name`, when present, makes this
/// a test-level filter instead of a module-level one.
#[derive(Clone, Debug)]
pub struct ModuleFilterClause {
    pub module: String,
    pub test_name: Option<String>,
    pub exclude: bool,
}

/// Resolves a module name/regex `pattern` against the full `available` module set: exact match
/// first, else a regex match; zero matches means no module; more than one raises
/// `MultipleModulesFound` (spec §4.5 "Module-name matching").
pub fn match_module_name(pattern: &str, available: &[String]) -> Result<Option<String>, PlannerError> {
    if available.iter().any(|m| m == pattern) {
        return Ok(Some(pattern.to_owned()));
    }
    let re = Regex::new(&format!("^(?:{pattern})$"))
        .map_err(|e| PlannerError::InvalidPattern(pattern.to_owned(), e.to_string()))?;
    let matched: Vec<&String> = available.iter().filter(|m| re.is_match(m)).collect();
    match matched.len() {
        0 => Ok(None),
        1 => Ok(Some(matched[0].clone())),
        _ => Err(PlannerError::MultipleModulesFound(pattern.to_owned())),
    }
}

/// A resolved module and the subset of its tests to run; `None` means "run every test in the
/// module" (spec §4.5 "all tests in module").
pub type ResolvedModules = BTreeMap<String, Option<BTreeSet<String>>>;

/// Applies `clauses` against `available` modules (the union of local TF modules and the static
/// MCTS list, per spec §4.5), consulting `all_tests_in_module` only when a test-level exclude
/// filter needs to subtract from the module's full test set.
pub fn apply_module_filters(
    available: &[String],
    clauses: &[ModuleFilterClause],
    all_tests_in_module: impl Fn(&str) -> Vec<String>,
) -> Result<ResolvedModules, PlannerError> {
    let module_includes: Vec<&ModuleFilterClause> = clauses
        .iter()
        .filter(|c| !c.exclude && c.test_name.is_none())
        .collect();
    let module_excludes: Vec<&ModuleFilterClause> = clauses
        .iter()
        .filter(|c| c.exclude && c.test_name.is_none())
        .collect();

    let mut vetoed = BTreeSet::new();
    for clause in &module_excludes {
        if let Some(module) = match_module_name(&clause.module, available)? {
            vetoed.insert(module);
        }
    }

    let mut admitted_names = BTreeSet::new();
    if module_includes.is_empty() {
        admitted_names.extend(available.iter().cloned());
    } else {
        for clause in &module_includes {
            if let Some(module) = match_module_name(&clause.module, available)? {
                admitted_names.insert(module);
            }
        }
    }
    admitted_names.retain(|m| !vetoed.contains(m));

    let mut resolved: ResolvedModules = BTreeMap::new();
    for module in admitted_names {
        let mut include_tests: BTreeSet<String> = BTreeSet::new();
        let mut exclude_tests: BTreeSet<String> = BTreeSet::new();
        for clause in clauses {
            if clause.test_name.is_none() {
                continue;
            }
            let Some(matched_module) = match_module_name(&clause.module, available)? else {
                continue;
            };
            if matched_module != module {
                continue;
            }
            let test_name = clause.test_name.clone().expect("checked above");
            if clause.exclude {
                exclude_tests.insert(test_name);
            } else {
                include_tests.insert(test_name);
            }
        }

        let final_tests = if !include_tests.is_empty() {
            Some(&include_tests - &exclude_tests)
        } else if !exclude_tests.is_empty() {
            let all: BTreeSet<String> = all_tests_in_module(&module).into_iter().collect();
            Some(&all - &exclude_tests)
        } else {
            None
        };
        resolved.insert(module, final_tests);
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn modules() -> Vec<String> {
        vec!["CtsFooTest".to_owned(), "CtsBarTest".to_owned(), "CtsBazTest".to_owned()]
    }

    #[test]
    fn exact_match_wins_over_regex() {
        assert_eq!(
            match_module_name("CtsFooTest", &modules()).unwrap(),
            Some("CtsFooTest".to_owned())
        );
    }

    #[test]
    fn ambiguous_regex_raises_multiple_modules_found() {
        let err = match_module_name("Cts.*Test", &modules()).unwrap_err();
        assert_eq!(err, PlannerError::MultipleModulesFound("Cts.*Test".to_owned()));
    }

    #[test]
    fn unmatched_pattern_is_none() {
        assert_eq!(match_module_name("NoSuchModule", &modules()).unwrap(), None);
    }

    #[test]
    fn no_include_filters_admits_every_module() {
        let resolved = apply_module_filters(&modules(), &[], |_| Vec::new()).unwrap();
        assert_eq!(resolved.len(), 3);
        assert!(resolved.values().all(|tests| tests.is_none()));
    }

    #[test]
    fn module_exclude_vetoes_the_whole_module() {
        let clauses = vec![ModuleFilterClause {
            module: "CtsFooTest".to_owned(),
            test_name: None,
            exclude: true,
        }];
        let resolved = apply_module_filters(&modules(), &clauses, |_| Vec::new()).unwrap();
        assert!(!resolved.contains_key("CtsFooTest"));
        assert_eq!(resolved.len(), 2);
    }

    #[test]
    fn test_level_include_narrows_to_an_include_set_minus_excludes() {
        let clauses = vec![
            ModuleFilterClause {
                module: "CtsFooTest".to_owned(),
                test_name: Some("testA".to_owned()),
                exclude: false,
            },
            ModuleFilterClause {
                module: "CtsFooTest".to_owned(),
                test_name: Some("testB".to_owned()),
                exclude: false,
            },
            ModuleFilterClause {
                module: "CtsFooTest".to_owned(),
                test_name: Some("testB".to_owned()),
                exclude: true,
            },
        ];
        let resolved = apply_module_filters(&modules(), &clauses, |_| Vec::new()).unwrap();
        let tests = resolved.get("CtsFooTest").unwrap().clone().unwrap();
        assert_eq!(tests, BTreeSet::from(["testA".to_owned()]));
    }

    #[test]
    fn test_level_exclude_alone_subtracts_from_the_full_module_test_set() {
        let clauses = vec![ModuleFilterClause {
            module: "CtsFooTest".to_owned(),
            test_name: Some("testB".to_owned()),
            exclude: true,
        }];
        let resolved = apply_module_filters(&modules(), &clauses, |module| {
            assert_eq!(module, "CtsFooTest");
            vec!["testA".to_owned(), "testB".to_owned()]
        })
        .unwrap();
        let tests = resolved.get("CtsFooTest").unwrap().clone().unwrap();
        assert_eq!(tests, BTreeSet::from(["testA".to_owned()]));
    }
}
