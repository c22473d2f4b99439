use std::fmt;

use crate::core::error::{LauncherError, LauncherResult};

/// A library's Maven-style coordinate.
///
/// Accepted forms:
///   `group:artifact:version`
///   `group:artifact:version:classifier`
///   any of the above with an `@extension` suffix
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LibraryCoordinate {
    pub group: String,
    pub artifact: String,
    pub version: String,
    pub classifier: Option<String>,
    pub extension: String,
}

impl LibraryCoordinate {
    pub fn parse(name: &str) -> LauncherResult<Self> {
        let (body, extension) = match name.rsplit_once('@') {
            Some((body, ext)) if !ext.is_empty() => (body, ext),
            _ => (name, "jar"),
        };

        let mut parts = body.split(':');
        let (Some(group), Some(artifact), Some(version)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(LauncherError::InvalidMavenCoordinate(name.to_string()));
        };
        let classifier = parts.next().map(str::to_string);
        if parts.next().is_some() || [group, artifact, version].iter().any(|p| p.is_empty()) {
            return Err(LauncherError::InvalidMavenCoordinate(name.to_string()));
        }

        Ok(Self {
            group: group.to_string(),
            artifact: artifact.to_string(),
            version: version.to_string(),
            classifier,
            extension: extension.to_string(),
        })
    }

    /// Same coordinate with a different classifier (legacy natives).
    pub fn with_classifier(&self, classifier: &str) -> Self {
        Self {
            classifier: Some(classifier.to_string()),
            ..self.clone()
        }
    }

    pub fn file_name(&self) -> String {
        match &self.classifier {
            Some(c) => format!("{}-{}-{}.{}", self.artifact, self.version, c, self.extension),
            None => format!("{}-{}.{}", self.artifact, self.version, self.extension),
        }
    }

    /// Repository-relative path, `/`-separated. Doubles as the path under
    /// the local libraries tree.
    pub fn relative_path(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.group.replace('.', "/"),
            self.artifact,
            self.version,
            self.file_name()
        )
    }

    pub fn url_under(&self, repository: &str) -> String {
        format!("{}/{}", repository.trim_end_matches('/'), self.relative_path())
    }
}

impl fmt::Display for LibraryCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.artifact, self.version)?;
        if let Some(c) = &self.classifier {
            write!(f, ":{c}")?;
        }
        if self.extension != "jar" {
            write!(f, "@{}", self.extension)?;
        }
        Ok(())
    }
}
