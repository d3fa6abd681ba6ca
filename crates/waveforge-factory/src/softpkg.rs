//! Soft-package dependency resolution
//!
//! A component implementation may depend on soft packages whose code must
//! be loaded on the same device before the component runs. Each dependency
//! offers its own implementations; resolution picks the first one that can
//! run on the candidate device and whose nested dependencies resolve in
//! turn.

use tracing::debug;
use waveforge_platform::DeviceProfile;
use waveforge_types::{ImplSpec, SoftPkgDep};

/// Resolve every soft-package dependency of `implementation` against the
/// device, recording selections on the dependencies.
///
/// On any failure, all selections made on this implementation are cleared
/// and `false` is returned.
pub fn resolve_softpkg_dependencies(
    implementation: &mut ImplSpec,
    device: &DeviceProfile,
) -> bool {
    for index in 0..implementation.softpkg_deps.len() {
        match resolve_dependency_implementation(&mut implementation.softpkg_deps[index], device) {
            Some(selected) => implementation.softpkg_deps[index].selected = Some(selected),
            None => {
                debug!(
                    dependency = %implementation.softpkg_deps[index].name,
                    implementation = %implementation.id,
                    "no soft package implementation matches the device"
                );
                implementation.clear_dependency_selections();
                return false;
            }
        }
    }
    true
}

/// First implementation of the dependency that matches the device and
/// whose own dependencies resolve recursively
fn resolve_dependency_implementation(
    dependency: &mut SoftPkgDep,
    device: &DeviceProfile,
) -> Option<usize> {
    for index in 0..dependency.implementations.len() {
        if !check_processor_and_os(&dependency.implementations[index], device) {
            continue;
        }
        if resolve_softpkg_dependencies(&mut dependency.implementations[index], device) {
            return Some(index);
        }
    }
    None
}

/// Matching policy: a non-empty constraint must intersect the device's
/// corresponding list; an empty constraint always matches.
pub fn check_processor_and_os(implementation: &ImplSpec, device: &DeviceProfile) -> bool {
    if !implementation.processor_deps.is_empty()
        && !implementation
            .processor_deps
            .iter()
            .any(|p| device.processors.contains(p))
    {
        return false;
    }
    if !implementation.os_deps.is_empty()
        && !implementation.os_deps.iter().any(|o| device.os.contains(o))
    {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use waveforge_types::OsDep;

    fn x86_linux() -> DeviceProfile {
        DeviceProfile::new(
            vec!["x86_64".to_string()],
            vec![OsDep::new("Linux", "3")],
        )
    }

    fn dep_with_impls(name: &str, impls: Vec<ImplSpec>) -> SoftPkgDep {
        let mut dep = SoftPkgDep::new(name, format!("/deps/{}/{}.spd.xml", name, name));
        dep.implementations = impls;
        dep
    }

    fn impl_for(id: &str, procs: &[&str]) -> ImplSpec {
        let mut imp = ImplSpec::new(id, format!("{}.so", id));
        imp.processor_deps = procs.iter().map(|p| p.to_string()).collect();
        imp
    }

    #[test]
    fn selects_first_matching_implementation() {
        let mut component_impl = ImplSpec::new("comp-1", "comp.out");
        component_impl.softpkg_deps.push(dep_with_impls(
            "fftlib",
            vec![impl_for("fft-arm", &["armv8"]), impl_for("fft-x86", &["x86_64"])],
        ));

        assert!(resolve_softpkg_dependencies(&mut component_impl, &x86_linux()));
        assert_eq!(component_impl.softpkg_deps[0].selected, Some(1));
    }

    #[test]
    fn nested_dependencies_resolve_recursively() {
        let mut inner_ok = impl_for("codec-x86", &["x86_64"]);
        inner_ok.softpkg_deps = Vec::new();

        let mut outer_impl = impl_for("dsp-x86", &["x86_64"]);
        outer_impl
            .softpkg_deps
            .push(dep_with_impls("codec", vec![inner_ok]));

        let mut component_impl = ImplSpec::new("comp-1", "comp.out");
        component_impl
            .softpkg_deps
            .push(dep_with_impls("dsp", vec![outer_impl]));

        assert!(resolve_softpkg_dependencies(&mut component_impl, &x86_linux()));
        let dsp = &component_impl.softpkg_deps[0];
        assert_eq!(dsp.selected, Some(0));
        assert_eq!(dsp.implementations[0].softpkg_deps[0].selected, Some(0));
    }

    #[test]
    fn failure_clears_earlier_selections() {
        let mut component_impl = ImplSpec::new("comp-1", "comp.out");
        component_impl.softpkg_deps.push(dep_with_impls(
            "fftlib",
            vec![impl_for("fft-x86", &["x86_64"])],
        ));
        component_impl.softpkg_deps.push(dep_with_impls(
            "gpu-only",
            vec![impl_for("gpu", &["gpu-sm80"])],
        ));

        assert!(!resolve_softpkg_dependencies(&mut component_impl, &x86_linux()));
        assert!(component_impl.softpkg_deps[0].selected.is_none());
        assert!(component_impl.softpkg_deps[1].selected.is_none());
    }

    #[test]
    fn nested_failure_rejects_the_outer_implementation() {
        let mut inner_bad = impl_for("codec-arm", &["armv8"]);
        inner_bad.softpkg_deps = Vec::new();

        let mut outer_impl = impl_for("dsp-x86", &["x86_64"]);
        outer_impl
            .softpkg_deps
            .push(dep_with_impls("codec", vec![inner_bad]));

        let mut component_impl = ImplSpec::new("comp-1", "comp.out");
        component_impl
            .softpkg_deps
            .push(dep_with_impls("dsp", vec![outer_impl]));

        assert!(!resolve_softpkg_dependencies(&mut component_impl, &x86_linux()));
        assert!(component_impl.softpkg_deps[0].selected.is_none());
    }

    #[test]
    fn os_constraint_is_matched_exactly() {
        let mut imp = ImplSpec::new("i", "i.so");
        imp.os_deps = vec![OsDep::new("Linux", "4")];
        assert!(!check_processor_and_os(&imp, &x86_linux()));

        imp.os_deps = vec![OsDep::new("Linux", "3")];
        assert!(check_processor_and_os(&imp, &x86_linux()));
    }
}
