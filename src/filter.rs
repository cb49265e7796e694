//! Narrowing a discovered package list to the set that should actually run.

/// The target name that bypasses all filtering, including exclusions.
pub const TARGET_ALL: &str = "all";

/// Filters `packages` by target name and the exclusion list.
///
/// Three modes, decided by `target`:
///
/// * `"all"` — return the input unchanged; this is the escape hatch for
///   running excluded packages on demand.
/// * a non-empty name — return the first package whose path contains the name
///   as a substring. Only the first match is kept: a targeted run selects a
///   single package even when several paths contain the name.
/// * `""` — return every package whose path contains no exclusion entry as a
///   substring.
///
/// Relative order of the input is preserved in all modes.
pub fn filter_packages(packages: Vec<String>, target: &str, exclusions: &[String]) -> Vec<String> {
    if target == TARGET_ALL {
        return packages;
    }

    if !target.is_empty() {
        return packages
            .into_iter()
            .find(|pkg| pkg.contains(target))
            .into_iter()
            .collect();
    }

    packages
        .into_iter()
        .filter(|pkg| !exclusions.iter().any(|excluded| pkg.contains(excluded.as_str())))
        .collect()
}
