//! Pack manifests and loaded packs.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::{Component as PathComponent, Path, PathBuf};

use super::component::{Component, InstallAction};
use super::settings::SettingsDocument;
use crate::domain::errors::{DomainError, DomainResult};

/// Section id reserved for the implicit core section of the instruction document.
pub const CORE_SECTION: &str = "core";

/// A pack manifest as declared in `pack.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackManifest {
    /// Pack identifier (lowercase, digits and dashes)
    pub id: String,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// One-line summary
    #[serde(default)]
    pub description: String,

    /// Release version; a change marks installed copies as drifted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Packs this pack expects to be active too (advisory)
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Contribution units, in declaration order
    #[serde(default)]
    pub components: Vec<Component>,

    /// Instruction document sections
    #[serde(default)]
    pub templates: Vec<TemplateContribution>,
}

/// An instruction document section declared by a pack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateContribution {
    /// Section id, unique across the document
    pub section: String,

    /// Inline content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Content file, relative to the pack directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,

    /// Placeholders the content expects to be resolved
    #[serde(default)]
    pub placeholders: Vec<String>,
}

/// A section ready for composition: identifier plus raw (unsubstituted) content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSection {
    /// Section id
    pub id: String,
    /// Body between the markers
    pub content: String,
    /// `{{NAME}}` tokens that get substituted
    pub placeholders: Vec<String>,
}

impl TemplateSection {
    /// Section without placeholders.
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            placeholders: Vec::new(),
        }
    }
}

fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

/// A destination must stay inside the scope: relative, no `..`.
fn is_contained(path: &Path) -> bool {
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, PathComponent::Normal(_) | PathComponent::CurDir))
}

impl PackManifest {
    /// Structural validation. Runs before a pack is admitted to the registry.
    pub fn validate(&self) -> DomainResult<()> {
        let fail = |reason: String| Err(DomainError::validation(&self.id, reason));

        if !is_valid_id(&self.id) {
            return fail(format!(
                "id '{}' must be non-empty and contain only a-z, 0-9, '-' or '_'",
                self.id
            ));
        }

        let mut component_ids = HashSet::new();
        for component in &self.components {
            if !is_valid_id(&component.id) {
                return fail(format!("component id '{}' is not a valid identifier", component.id));
            }
            if !component_ids.insert(component.id.as_str()) {
                return fail(format!("duplicate component id '{}'", component.id));
            }
            self.validate_action(component)?;
        }

        let mut sections = HashSet::new();
        for template in &self.templates {
            if !is_valid_id(&template.section) {
                return fail(format!("section id '{}' is not a valid identifier", template.section));
            }
            if template.section == CORE_SECTION {
                return fail(format!("section id '{CORE_SECTION}' is reserved"));
            }
            if !sections.insert(template.section.as_str()) {
                return fail(format!("duplicate section id '{}'", template.section));
            }
            match (&template.content, &template.file) {
                (Some(_), None) => {}
                (None, Some(file)) if is_contained(file) => {}
                (None, Some(file)) => {
                    return fail(format!(
                        "section '{}' file '{}' must be relative to the pack",
                        template.section,
                        file.display()
                    ));
                }
                _ => {
                    return fail(format!(
                        "section '{}' needs exactly one of 'content' or 'file'",
                        template.section
                    ));
                }
            }
        }

        if self.depends_on.iter().any(|dep| dep == &self.id) {
            return fail("pack depends on itself".to_string());
        }

        Ok(())
    }

    fn validate_action(&self, component: &Component) -> DomainResult<()> {
        let reason = match &component.install {
            InstallAction::McpServer { name, command, url, .. } => {
                if name.trim().is_empty() {
                    Some("MCP server name cannot be empty".to_string())
                } else if command.is_none() == url.is_none() {
                    Some(format!("MCP server '{name}' needs exactly one of 'command' or 'url'"))
                } else {
                    None
                }
            }
            InstallAction::Plugin { name } if name.trim().is_empty() => {
                Some("plugin name cannot be empty".to_string())
            }
            InstallAction::Dependency { command, .. } if command.trim().is_empty() => {
                Some("dependency command cannot be empty".to_string())
            }
            InstallAction::File { source, destination } => {
                if !is_contained(source) {
                    Some(format!("file source '{}' must be relative to the pack", source.display()))
                } else if !is_contained(Path::new(destination)) {
                    Some(format!(
                        "file destination '{destination}' must be a relative path inside the scope"
                    ))
                } else {
                    None
                }
            }
            InstallAction::Shell { script, .. } if !is_contained(script) => Some(format!(
                "script '{}' must be relative to the pack",
                script.display()
            )),
            InstallAction::Settings { settings } if !settings.is_object() => {
                Some("settings fragment must be a mapping".to_string())
            }
            InstallAction::Settings { settings } => SettingsDocument::from_value(settings.clone())
                .err()
                .map(|e| format!("settings fragment is not a valid settings document: {e}")),
            InstallAction::IgnoreEntries { entries }
                if entries.is_empty()
                    || entries
                        .iter()
                        .any(|e| e.trim().is_empty() || e.contains('\n')) =>
            {
                Some("ignore entries must be non-empty single lines".to_string())
            }
            _ => None,
        };

        match reason {
            Some(reason) => Err(DomainError::validation(
                &self.id,
                format!("component '{}': {reason}", component.id),
            )),
            None => Ok(()),
        }
    }
}

/// A validated pack together with the directory it was loaded from.
#[derive(Debug, Clone, PartialEq)]
pub struct Pack {
    /// The validated manifest
    pub manifest: PackManifest,
    /// Directory holding `pack.yaml`
    pub root: PathBuf,
    sections: Vec<TemplateSection>,
}

impl Pack {
    /// Validate a manifest and resolve file-based template content relative to `root`.
    pub fn from_manifest(manifest: PackManifest, root: impl Into<PathBuf>) -> DomainResult<Self> {
        manifest.validate()?;
        let root = root.into();

        let mut sections = Vec::with_capacity(manifest.templates.len());
        for template in &manifest.templates {
            let content = match (&template.content, &template.file) {
                (Some(content), _) => content.clone(),
                (None, Some(file)) => {
                    let path = root.join(file);
                    std::fs::read_to_string(&path).map_err(|e| {
                        DomainError::validation(
                            &manifest.id,
                            format!("cannot read section file {}: {e}", path.display()),
                        )
                    })?
                }
                (None, None) => String::new(),
            };
            sections.push(TemplateSection {
                id: template.section.clone(),
                content,
                placeholders: template.placeholders.clone(),
            });
        }

        Ok(Self {
            manifest,
            root,
            sections,
        })
    }

    /// Pack id.
    pub fn id(&self) -> &str {
        &self.manifest.id
    }

    /// Declared version, if any.
    pub fn version(&self) -> Option<&str> {
        self.manifest.version.as_deref()
    }

    /// Components in declaration order.
    pub fn components(&self) -> &[Component] {
        &self.manifest.components
    }

    /// Component with the given id.
    pub fn component(&self, id: &str) -> Option<&Component> {
        self.manifest.components.iter().find(|c| c.id == id)
    }

    /// Sections with file-based content already read.
    pub fn sections(&self) -> &[TemplateSection] {
        &self.sections
    }

    /// Check a requested exclusion set against the manifest.
    ///
    /// Returns the unknown ids (ignored by callers, since manifests change
    /// between versions) or a validation error when a required component
    /// would be excluded.
    pub fn check_exclusions(&self, excluded: &BTreeSet<String>) -> DomainResult<Vec<String>> {
        let mut unknown = Vec::new();
        for id in excluded {
            match self.component(id) {
                Some(component) if component.required => {
                    return Err(DomainError::validation(
                        self.id(),
                        format!("component '{id}' is required and cannot be excluded"),
                    ));
                }
                Some(_) => {}
                None => unknown.push(id.clone()),
            }
        }
        Ok(unknown)
    }
}
