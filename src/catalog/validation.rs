//! Catalog consistency checks
//!
//! Pure functions run once when a catalog is loaded: entity names are
//! well-formed, every reference resolves, and the service dependency graph
//! has no cycles. A cycle here would otherwise surface much later as a
//! planner stall, so it is reported up front with the offending path.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use regex::Regex;

use super::{Catalog, CatalogError, Service};

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("static name pattern is valid")
    })
}

/// Check that an entity name can be used as an identifier
pub fn validate_name(kind: &'static str, name: &str) -> Result<(), CatalogError> {
    if name_pattern().is_match(name) {
        Ok(())
    } else {
        Err(CatalogError::InvalidName(kind, name.to_string()))
    }
}

/// Validate a complete catalog
pub fn validate_catalog(catalog: &Catalog) -> Result<(), CatalogError> {
    for name in catalog.services.keys() {
        validate_name("service", name)?;
    }
    for name in catalog.hardware_types.keys() {
        validate_name("hardware type", name)?;
    }
    for name in catalog.image_types.keys() {
        validate_name("image type", name)?;
    }
    for name in catalog.templates.keys() {
        validate_name("template", name)?;
    }

    validate_service_references(catalog)?;
    validate_template_references(catalog)?;
    check_dependency_cycles(&catalog.services)?;

    Ok(())
}

fn validate_service_references(catalog: &Catalog) -> Result<(), CatalogError> {
    for service in catalog.services.values() {
        for dep in service.depends_on.iter().chain(service.install.all()) {
            if !catalog.services.contains_key(dep) {
                return Err(CatalogError::UndefinedService(
                    dep.clone(),
                    service.name.clone(),
                ));
            }
        }
    }
    Ok(())
}

fn validate_template_references(catalog: &Catalog) -> Result<(), CatalogError> {
    for template in catalog.templates.values() {
        let compat = &template.compatibility;
        let defaults = &template.defaults;

        for service in compat
            .services
            .iter()
            .chain(defaults.services.iter())
            .chain(template.constraints.services.keys())
        {
            if !catalog.services.contains_key(service) {
                return Err(CatalogError::UndefinedService(
                    service.clone(),
                    template.name.clone(),
                ));
            }
        }

        for hw in compat.hardware_types.iter().chain(defaults.hardware_type.iter()) {
            if !catalog.hardware_types.contains_key(hw) {
                return Err(CatalogError::UndefinedHardwareType(
                    hw.clone(),
                    template.name.clone(),
                ));
            }
        }

        for image in compat.image_types.iter().chain(defaults.image_type.iter()) {
            if !catalog.image_types.contains_key(image) {
                return Err(CatalogError::UndefinedImageType(
                    image.clone(),
                    template.name.clone(),
                ));
            }
        }

        for service in &defaults.services {
            if !compat.allows_service(service) {
                return Err(CatalogError::IncompatibleDefault(
                    service.clone(),
                    template.name.clone(),
                ));
            }
        }
    }
    Ok(())
}

/// Reject dependency cycles using Kahn's algorithm
///
/// Runtime (`depends_on`) and install-stage (`requires`/`uses`) edges are
/// checked together since both feed the task graph.
pub fn check_dependency_cycles(services: &BTreeMap<String, Service>) -> Result<(), CatalogError> {
    let edges: BTreeMap<&str, BTreeSet<&str>> = services
        .values()
        .map(|s| {
            let deps = s
                .depends_on
                .iter()
                .chain(s.install.all())
                .filter(|d| services.contains_key(*d))
                .map(String::as_str)
                .collect();
            (s.name.as_str(), deps)
        })
        .collect();

    let mut remaining: BTreeMap<&str, usize> =
        edges.iter().map(|(name, deps)| (*name, deps.len())).collect();

    let mut ready: Vec<&str> = remaining
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(name, _)| *name)
        .collect();

    while let Some(done) = ready.pop() {
        remaining.remove(done);
        for (name, deps) in &edges {
            if deps.contains(done) {
                if let Some(count) = remaining.get_mut(name) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push(*name);
                    }
                }
            }
        }
    }

    if remaining.is_empty() {
        return Ok(());
    }

    Err(CatalogError::CyclicDependency(find_cycle(
        &edges,
        remaining.keys().copied().collect(),
    )))
}

/// Walk dependencies inside the unsorted remainder until a name repeats
fn find_cycle(edges: &BTreeMap<&str, BTreeSet<&str>>, stuck: BTreeSet<&str>) -> Vec<String> {
    let Some(start) = stuck.iter().next().copied() else {
        return Vec::new();
    };

    let mut path: Vec<&str> = vec![start];
    let mut current = start;
    loop {
        // Every stuck service has at least one stuck dependency
        let next = edges
            .get(current)
            .and_then(|deps| deps.iter().find(|d| stuck.contains(*d)))
            .copied();
        let Some(next) = next else {
            return path.into_iter().map(String::from).collect();
        };
        if let Some(pos) = path.iter().position(|p| *p == next) {
            let mut cycle: Vec<String> = path[pos..].iter().map(|s| s.to_string()).collect();
            cycle.push(next.to_string());
            return cycle;
        }
        path.push(next);
        current = next;
    }
}
