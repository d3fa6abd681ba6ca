//! Implementation combinations for collocated placement
//!
//! A collocation group succeeds only if one device satisfies every member
//! at once, so placement considers tuples drawn from the cross-product of
//! each component's implementations. Tuples whose processor or OS
//! requirements cannot coexist are filtered out before any allocation is
//! attempted.

use waveforge_types::{ComponentSpec, ImplSpec, OsDep, Property};

/// Cross-product of implementation choices, one index per component, in
/// declaration order. Built iteratively: each component multiplies the
/// accumulated tuples.
pub fn enumerate_combinations(components: &[&ComponentSpec]) -> Vec<Vec<usize>> {
    let mut tuples: Vec<Vec<usize>> = vec![Vec::new()];
    for component in components {
        if component.implementations.is_empty() {
            return Vec::new();
        }
        let mut expanded = Vec::with_capacity(tuples.len() * component.implementations.len());
        for tuple in &tuples {
            for impl_idx in 0..component.implementations.len() {
                let mut next = tuple.clone();
                next.push(impl_idx);
                expanded.push(next);
            }
        }
        tuples = expanded;
    }
    tuples
}

/// Drop tuples whose implementations cannot share a device.
///
/// Starting from the first implementation's sets, each subsequent
/// implementation must intersect the running reference set on any axis
/// where both sides are constrained; the reference then narrows to the
/// intersection. An axis left unconstrained so far is re-seeded by the
/// first implementation that constrains it. The filter builds a new list;
/// tuple order is preserved.
pub fn filter_compatible(
    components: &[&ComponentSpec],
    tuples: Vec<Vec<usize>>,
) -> Vec<Vec<usize>> {
    tuples
        .into_iter()
        .filter(|tuple| tuple_is_compatible(components, tuple))
        .collect()
}

fn tuple_is_compatible(components: &[&ComponentSpec], tuple: &[usize]) -> bool {
    let mut reference_procs: Vec<String> = Vec::new();
    let mut reference_os: Vec<OsDep> = Vec::new();

    for (component, &impl_idx) in components.iter().zip(tuple) {
        let implementation = &component.implementations[impl_idx];
        let procs = &implementation.processor_deps;
        let os = &implementation.os_deps;

        if !reference_procs.is_empty() && !procs.is_empty() {
            reference_procs.retain(|p| procs.contains(p));
            if reference_procs.is_empty() {
                return false;
            }
        } else if reference_procs.is_empty() {
            reference_procs = procs.clone();
        }

        if !reference_os.is_empty() && !os.is_empty() {
            reference_os.retain(|o| os.contains(o));
            if reference_os.is_empty() {
                return false;
            }
        } else if reference_os.is_empty() {
            reference_os = os.clone();
        }
    }
    true
}

/// Intersection of the non-empty processor sets across a tuple; empty when
/// no implementation declares processors
pub fn merge_processor_deps(implementations: &[&ImplSpec]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();
    for implementation in implementations {
        let deps = &implementation.processor_deps;
        if deps.is_empty() {
            continue;
        }
        if merged.is_empty() {
            merged = deps.clone();
        } else {
            merged.retain(|p| deps.contains(p));
        }
    }
    merged
}

/// Same merge over (name, version) operating system pairs
pub fn merge_os_deps(implementations: &[&ImplSpec]) -> Vec<OsDep> {
    let mut merged: Vec<OsDep> = Vec::new();
    for implementation in implementations {
        let deps = &implementation.os_deps;
        if deps.is_empty() {
            continue;
        }
        if merged.is_empty() {
            merged = deps.clone();
        } else {
            merged.retain(|o| deps.contains(o));
        }
    }
    merged
}

/// Concatenate the typed allocation properties of every implementation in
/// a tuple into one consolidated request
pub fn consolidate_allocation_properties(implementations: &[&ImplSpec]) -> Vec<Property> {
    implementations
        .iter()
        .flat_map(|implementation| {
            implementation
                .dependency_properties
                .iter()
                .map(|dep| dep.to_property())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(id: &str, impls: Vec<ImplSpec>) -> ComponentSpec {
        let mut spec = ComponentSpec::with_id(id, format!("/components/{}/{}.spd.xml", id, id));
        spec.implementations = impls;
        spec
    }

    fn impl_with_procs(id: &str, procs: &[&str]) -> ImplSpec {
        let mut imp = ImplSpec::new(id, format!("{}.out", id));
        imp.processor_deps = procs.iter().map(|p| p.to_string()).collect();
        imp
    }

    #[test]
    fn cross_product_varies_last_component_fastest() {
        let a = component("a", vec![impl_with_procs("a1", &[]), impl_with_procs("a2", &[])]);
        let b = component("b", vec![impl_with_procs("b1", &[]), impl_with_procs("b2", &[])]);

        let tuples = enumerate_combinations(&[&a, &b]);
        assert_eq!(
            tuples,
            vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1]]
        );
    }

    #[test]
    fn component_without_implementations_yields_nothing() {
        let a = component("a", vec![impl_with_procs("a1", &[])]);
        let b = component("b", vec![]);
        assert!(enumerate_combinations(&[&a, &b]).is_empty());
    }

    #[test]
    fn filter_drops_disjoint_processor_tuples() {
        let a = component(
            "a",
            vec![
                impl_with_procs("a1", &["x86_64"]),
                impl_with_procs("a2", &["armv8"]),
            ],
        );
        let b = component(
            "b",
            vec![
                impl_with_procs("b1", &["armv8"]),
                impl_with_procs("b2", &["x86_64"]),
            ],
        );

        let components = [&a, &b];
        let survivors = filter_compatible(&components, enumerate_combinations(&components));
        // Only (a1,b2) and (a2,b1) share a processor
        assert_eq!(survivors, vec![vec![0, 1], vec![1, 0]]);
    }

    #[test]
    fn unconstrained_axis_is_reseeded_by_later_implementations() {
        // First implementation declares nothing; the second seeds the
        // reference set; the third must intersect it.
        let a = component("a", vec![impl_with_procs("a1", &[])]);
        let b = component("b", vec![impl_with_procs("b1", &["x86_64", "armv8"])]);
        let c = component("c", vec![impl_with_procs("c1", &["armv8"])]);

        let components = [&a, &b, &c];
        let survivors = filter_compatible(&components, enumerate_combinations(&components));
        assert_eq!(survivors.len(), 1);

        let d = component("d", vec![impl_with_procs("d1", &["ppc64"])]);
        let components = [&a, &b, &d];
        let survivors = filter_compatible(&components, enumerate_combinations(&components));
        assert!(survivors.is_empty());
    }

    #[test]
    fn narrowing_is_cumulative_across_the_tuple() {
        let a = component("a", vec![impl_with_procs("a1", &["x86_64", "armv8"])]);
        let b = component("b", vec![impl_with_procs("b1", &["armv8", "ppc64"])]);
        let c = component("c", vec![impl_with_procs("c1", &["x86_64"])]);

        // a∩b narrows the reference to {armv8}; c no longer intersects even
        // though it intersects a alone.
        let components = [&a, &b, &c];
        let survivors = filter_compatible(&components, enumerate_combinations(&components));
        assert!(survivors.is_empty());
    }

    #[test]
    fn merges_skip_empty_sets() {
        let a = impl_with_procs("a", &["x86_64", "armv8"]);
        let b = impl_with_procs("b", &[]);
        let c = impl_with_procs("c", &["x86_64"]);

        assert_eq!(merge_processor_deps(&[&a, &b, &c]), vec!["x86_64"]);
        assert!(merge_processor_deps(&[&b]).is_empty());

        let mut os_a = ImplSpec::new("osa", "a.out");
        os_a.os_deps = vec![OsDep::new("Linux", "3"), OsDep::new("Linux", "4")];
        let mut os_b = ImplSpec::new("osb", "b.out");
        os_b.os_deps = vec![OsDep::new("Linux", "3")];
        assert_eq!(merge_os_deps(&[&os_a, &os_b]), vec![OsDep::new("Linux", "3")]);
    }
}
