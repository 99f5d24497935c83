//! Placeholder values drawn from configuration and the target scope.

use std::collections::BTreeMap;

use crate::domain::models::Pack;
use crate::domain::ports::{TemplateContext, TemplateValueResolver};

/// Resolves placeholders from configured static values plus a few values
/// derived from the scope (`PROJECT_NAME`, `PROJECT_DIR`, `SCOPE`) and the
/// pack (`PACK_ID`, `PACK_NAME`, `PACK_VERSION`).
///
/// Configured values win over derived ones.
#[derive(Debug, Clone, Default)]
pub struct StaticValueResolver {
    values: BTreeMap<String, String>,
}

impl StaticValueResolver {
    /// Resolver with `values` taking priority.
    pub const fn new(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }

    fn scope_values(context: &TemplateContext<'_>) -> BTreeMap<String, String> {
        let target = context.target;
        BTreeMap::from([
            ("PROJECT_NAME".to_string(), target.display_name()),
            ("PROJECT_DIR".to_string(), target.root.display().to_string()),
            ("SCOPE".to_string(), target.scope.as_str().to_string()),
        ])
    }

    fn finish(
        &self,
        mut derived: BTreeMap<String, String>,
        context: &TemplateContext<'_>,
    ) -> BTreeMap<String, String> {
        derived.extend(self.values.clone());
        for name in context.placeholders {
            if !derived.contains_key(name) {
                tracing::debug!(placeholder = %name, "no value for placeholder, leaving it as-is");
            }
        }
        derived
    }
}

impl TemplateValueResolver for StaticValueResolver {
    fn resolve(&self, pack: &Pack, context: &TemplateContext<'_>) -> BTreeMap<String, String> {
        let mut derived = Self::scope_values(context);
        derived.insert("PACK_ID".to_string(), pack.id().to_string());
        let name = if pack.manifest.name.is_empty() {
            pack.id()
        } else {
            &pack.manifest.name
        };
        derived.insert("PACK_NAME".to_string(), name.to_string());
        if let Some(version) = pack.version() {
            derived.insert("PACK_VERSION".to_string(), version.to_string());
        }
        self.finish(derived, context)
    }

    fn core_values(&self, context: &TemplateContext<'_>) -> BTreeMap<String, String> {
        self.finish(Self::scope_values(context), context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Config, PackManifest, Scope, ScopePaths};
    use std::path::Path;

    #[test]
    fn test_scope_and_pack_values() {
        let scope = Scope::project("/work/shop");
        let target = ScopePaths::resolve(&scope, &Config::default(), Path::new("/home/u"));
        let manifest: PackManifest = serde_yaml::from_str("id: web\nversion: 2.0.0\n").unwrap();
        let pack = Pack::from_manifest(manifest, "/packs/web").unwrap();
        let context = TemplateContext { target: &target, placeholders: &[] };

        let resolver =
            StaticValueResolver::new(BTreeMap::from([("TEAM".to_string(), "core".to_string())]));
        let values = resolver.resolve(&pack, &context);
        assert_eq!(values["PROJECT_NAME"], "shop");
        assert_eq!(values["PROJECT_DIR"], "/work/shop");
        assert_eq!(values["PACK_ID"], "web");
        assert_eq!(values["PACK_NAME"], "web");
        assert_eq!(values["PACK_VERSION"], "2.0.0");
        assert_eq!(values["TEAM"], "core");

        let core = resolver.core_values(&context);
        assert!(!core.contains_key("PACK_ID"));
        assert_eq!(core["SCOPE"], "project");
    }

    #[test]
    fn test_configured_values_override_derived() {
        let target = ScopePaths::resolve(&Scope::Global, &Config::default(), Path::new("/home/u"));
        let context = TemplateContext { target: &target, placeholders: &[] };
        let resolver = StaticValueResolver::new(BTreeMap::from([(
            "PROJECT_NAME".to_string(),
            "Everything".to_string(),
        )]));
        assert_eq!(resolver.core_values(&context)["PROJECT_NAME"], "Everything");
    }
}
