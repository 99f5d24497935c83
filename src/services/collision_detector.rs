//! Pre-flight name collision check between a candidate pack and registered packs.

use std::collections::BTreeSet;

use crate::domain::models::{Collision, InstallAction, Namespace, Pack};

/// Names a pack exposes, per namespace.
fn exposed_names(pack: &Pack) -> BTreeSet<(Namespace, String)> {
    let mut names = BTreeSet::new();

    for component in pack.components() {
        names.insert((Namespace::ComponentId, component.id.clone()));
        match &component.install {
            InstallAction::McpServer { name, .. } => {
                names.insert((Namespace::ServerName, name.clone()));
            }
            InstallAction::File { destination, .. } => {
                names.insert((Namespace::FileDestination, normalize_destination(destination)));
            }
            _ => {}
        }
    }
    for section in pack.sections() {
        names.insert((Namespace::TemplateSection, section.id.clone()));
    }

    names
}

fn normalize_destination(destination: &str) -> String {
    destination
        .split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// One entry per name the candidate shares with an existing pack. Advisory only.
pub fn detect_collisions(candidate: &Pack, existing: &[&Pack]) -> Vec<Collision> {
    let candidate_names = exposed_names(candidate);
    let mut collisions = Vec::new();

    for other in existing.iter().filter(|p| p.id() != candidate.id()) {
        let other_names = exposed_names(other);
        for (namespace, name) in candidate_names.intersection(&other_names) {
            collisions.push(Collision {
                namespace: *namespace,
                name: name.clone(),
                candidate_pack: candidate.id().to_string(),
                existing_pack: other.id().to_string(),
            });
        }
    }

    collisions
}
