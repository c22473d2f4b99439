// ─── Rule Evaluation ───
// Decides which libraries apply to an environment and which native
// classifier each one needs.

use tracing::debug;

use crate::core::platform::Environment;

use super::coordinate::LibraryCoordinate;
use super::descriptor::{LibraryArtifact, LibrarySpec, Rule, RuleAction, VersionDescriptor};

pub const DEFAULT_LIBRARIES_BASE: &str = "https://libraries.minecraft.net";

/// Where one file of a library comes from and where it goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocation {
    /// `/`-separated path relative to the libraries root.
    pub path: String,
    pub url: String,
    pub sha1: Option<String>,
    pub size: Option<u64>,
}

/// A library that applies to the environment, with its files resolved.
#[derive(Debug, Clone)]
pub struct ResolvedLibrary {
    pub spec: LibrarySpec,
    pub artifact: Option<ArtifactLocation>,
    pub native: Option<ArtifactLocation>,
}

impl Rule {
    /// A rule matches when every filter it specifies is satisfied.
    pub fn matches(&self, env: &Environment) -> bool {
        let Some(os) = &self.os else {
            return true;
        };
        let name_ok = os.name.as_deref().map_or(true, |name| {
            name == env.os.mojang_name() || name == env.os.classifier_name()
        });
        let arch_ok = os
            .arch
            .as_deref()
            .map_or(true, |arch| env.arch.matches_rule_name(arch));
        name_ok && arch_ok
    }
}

/// Fold the rules in declaration order, starting from "exclude".
///
/// - matching rule: its action becomes the verdict
/// - non-matching `allow`: verdict resets to exclude
/// - non-matching `disallow`: no effect
pub fn rules_allow(rules: &[Rule], env: &Environment) -> bool {
    rules.iter().fold(false, |allowed, rule| {
        match (rule.matches(env), rule.action) {
            (true, action) => action == RuleAction::Allow,
            (false, RuleAction::Allow) => false,
            (false, RuleAction::Disallow) => allowed,
        }
    })
}

impl LibrarySpec {
    pub fn is_applicable(&self, env: &Environment) -> bool {
        match &self.rules {
            None => true,
            Some(rules) if rules.is_empty() => true,
            Some(rules) => rules_allow(rules, env),
        }
    }

    /// Classifier named by the legacy `natives` map, `${arch}` expanded.
    pub fn legacy_native_classifier(&self, env: &Environment) -> Option<String> {
        let natives = self.natives.as_ref()?;
        let classifier = natives
            .get(env.os.mojang_name())
            .or_else(|| natives.get(env.os.classifier_name()))?;
        Some(classifier.replace("${arch}", env.natives_arch_token()))
    }

    fn classified_artifact(&self, env: &Environment) -> Option<(String, &LibraryArtifact)> {
        let classifiers = &self.downloads.as_ref()?.classifiers;
        let keys = match self.legacy_native_classifier(env) {
            Some(key) => vec![key],
            None => env.classifier_keys(),
        };
        keys.into_iter()
            .find_map(|key| classifiers.get(&key).map(|artifact| (key, artifact)))
    }

    fn coordinate(&self) -> Option<LibraryCoordinate> {
        match LibraryCoordinate::parse(&self.name) {
            Ok(c) => Some(c),
            Err(e) => {
                debug!("Cannot derive path for library: {}", e);
                None
            }
        }
    }

    /// Resolve the primary and native files of this library.
    pub fn resolve(&self, env: &Environment, libraries_base: &str) -> ResolvedLibrary {
        let repository = self.url.as_deref().unwrap_or(libraries_base);

        let artifact = match self.downloads.as_ref().and_then(|d| d.artifact.as_ref()) {
            Some(declared) => self.locate(declared, None),
            // Pure natives holders carry no primary jar.
            None if self.natives.is_some() => None,
            None if self.downloads.is_none() => self.coordinate().map(|c| ArtifactLocation {
                path: c.relative_path(),
                url: c.url_under(repository),
                sha1: None,
                size: None,
            }),
            None => None,
        };

        let native = match self.classified_artifact(env) {
            Some((classifier, declared)) => self.locate(declared, Some(&classifier)),
            None if self.downloads.is_none() => self
                .legacy_native_classifier(env)
                .and_then(|classifier| Some(self.coordinate()?.with_classifier(&classifier)))
                .map(|c| ArtifactLocation {
                    path: c.relative_path(),
                    url: c.url_under(repository),
                    sha1: None,
                    size: None,
                }),
            None => None,
        };

        ResolvedLibrary {
            spec: self.clone(),
            artifact,
            native,
        }
    }

    /// Declared artifacts sometimes omit `path`; fall back to the
    /// coordinate-derived one.
    fn locate(&self, declared: &LibraryArtifact, classifier: Option<&str>) -> Option<ArtifactLocation> {
        let path = match &declared.path {
            Some(path) => path.clone(),
            None => {
                let coordinate = self.coordinate()?;
                match classifier {
                    Some(c) => coordinate.with_classifier(c).relative_path(),
                    None => coordinate.relative_path(),
                }
            }
        };
        if declared.url.is_empty() {
            debug!("Library {} declares no download URL for {}", self.name, path);
            return None;
        }
        Some(ArtifactLocation {
            path,
            url: declared.url.clone(),
            sha1: declared.sha1.clone(),
            size: declared.size,
        })
    }
}

/// Libraries of `descriptor` that apply to `env`, in declaration order.
pub fn applicable_libraries(descriptor: &VersionDescriptor, env: &Environment) -> Vec<ResolvedLibrary> {
    applicable_libraries_from(descriptor, env, DEFAULT_LIBRARIES_BASE)
}

/// As [`applicable_libraries`], deriving undeclared URLs under `libraries_base`.
pub fn applicable_libraries_from(
    descriptor: &VersionDescriptor,
    env: &Environment,
    libraries_base: &str,
) -> Vec<ResolvedLibrary> {
    let resolved: Vec<ResolvedLibrary> = descriptor
        .libraries
        .iter()
        .filter(|lib| {
            let keep = lib.is_applicable(env);
            if !keep {
                debug!("Skipping library (rules): {}", lib.name);
            }
            keep
        })
        .map(|lib| lib.resolve(env, libraries_base))
        .collect();

    debug!(
        "{} of {} libraries apply to {}",
        resolved.len(),
        descriptor.libraries.len(),
        env
    );
    resolved
}
