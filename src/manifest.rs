//! Static description of the side effects of a handler.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::registry::RegistryError;

/// Where a handler may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateLocation {
    #[serde(rename = "header")]
    Header,
    #[serde(rename = "url.param")]
    UrlParam,
    #[serde(rename = "body.urlencoded")]
    BodyUrlEncoded,
    #[serde(rename = "auth")]
    Auth,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestInfo {
    pub name: Cow<'static, str>,
    pub version: Cow<'static, str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestUpdate {
    pub property: Cow<'static, str>,
    #[serde(rename = "type")]
    pub location: UpdateLocation,
}

/// Manifest of a handler: its name and version, and the properties it may update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandlerManifest {
    pub info: ManifestInfo,
    #[serde(default)]
    pub updates: Vec<ManifestUpdate>,
}

impl HandlerManifest {
    pub fn new(name: impl Into<Cow<'static, str>>, version: impl Into<Cow<'static, str>>) -> Self {
        Self {
            info: ManifestInfo {
                name: name.into(),
                version: version.into(),
            },
            updates: Vec::new(),
        }
    }

    #[must_use]
    pub fn update(mut self, property: impl Into<Cow<'static, str>>, location: UpdateLocation) -> Self {
        self.updates.push(ManifestUpdate {
            property: property.into(),
            location,
        });
        self
    }

    /// Parse and validate a manifest supplied as JSON.
    pub fn from_json(json: &str) -> Result<Self, RegistryError> {
        let manifest: HandlerManifest = serde_json::from_str(json)
            .map_err(|error| RegistryError::InvalidManifest(error.to_string()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Check the fields serde cannot: non-empty names and a dotted numeric version.
    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.info.name.trim().is_empty() {
            return Err(RegistryError::InvalidManifest("info.name is empty".into()));
        }
        let version_ok = !self.info.version.is_empty()
            && self
                .info
                .version
                .split('.')
                .all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()));
        if !version_ok {
            return Err(RegistryError::InvalidManifest(format!(
                "info.version {:?} is not a dotted version",
                self.info.version
            )));
        }
        if let Some(update) = self.updates.iter().find(|update| update.property.is_empty()) {
            return Err(RegistryError::InvalidManifest(format!(
                "update of type {:?} has an empty property",
                update.location
            )));
        }
        Ok(())
    }

    /// Whether the handler declares that it writes `property` at `location`.
    pub fn writes(&self, property: &str, location: UpdateLocation) -> bool {
        self.updates.iter().any(|update| {
            update.location == location && update.property.eq_ignore_ascii_case(property)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_manifest() {
        let manifest = HandlerManifest::from_json(
            r#"{
                "info": {"name": "basic", "version": "1.0.0"},
                "updates": [{"property": "Authorization", "type": "header"}]
            }"#,
        )
        .unwrap();
        assert_eq!(manifest.info.name, "basic");
        assert!(manifest.writes("authorization", UpdateLocation::Header));
        assert!(!manifest.writes("authorization", UpdateLocation::UrlParam));
    }

    #[test]
    fn test_reject_unknown_update_type() {
        let result = HandlerManifest::from_json(
            r#"{"info": {"name": "x", "version": "1.0.0"},
                "updates": [{"property": "a", "type": "cookie"}]}"#,
        );
        assert!(matches!(result, Err(RegistryError::InvalidManifest(_))));
    }

    #[test]
    fn test_reject_bad_version() {
        let manifest = HandlerManifest::new("x", "one");
        assert!(manifest.validate().is_err());
        let manifest = HandlerManifest::new("", "1.0.0");
        assert!(manifest.validate().is_err());
    }
}
