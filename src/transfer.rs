//! Export and import of mocks and settings as a versioned JSON file.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::{MockDefinition, Settings, StoreState};
use crate::Error;

/// Version written into exported files. Files with a different major version are rejected.
pub const EXPORT_VERSION: &str = "1.0";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExportFile {
    pub version: String,
    #[serde(with = "time::serde::rfc3339")]
    pub exported_at: OffsetDateTime,
    #[serde(default)]
    pub custom_responses: Vec<MockDefinition>,
    #[serde(default)]
    pub settings: Settings,
}

impl ExportFile {
    /// Captures the mocks and settings of a tab's state.
    pub fn new(state: &StoreState) -> ExportFile {
        ExportFile {
            version: EXPORT_VERSION.to_string(),
            exported_at: OffsetDateTime::now_utc(),
            custom_responses: state.mock_list(),
            settings: state.settings,
        }
    }

    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<ExportFile, Error> {
        let file: ExportFile = serde_json::from_str(text)?;

        if major_version(&file.version) != major_version(EXPORT_VERSION) {
            return Err(Error::UnsupportedExportVersion(file.version));
        }

        Ok(file)
    }
}

fn major_version(version: &str) -> &str {
    version.split('.').next().unwrap_or(version)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use time::macros::datetime;

    use super::*;
    use crate::domain::Theme;

    #[test]
    fn test_export_wire_format() {
        let mut state = StoreState::default();
        state
            .custom_responses
            .insert("GetUser".into(), MockDefinition::new("GetUser", json!({"data": {"user": null}})).delay(500));
        state.settings.theme = Theme::Dark;

        let mut file = ExportFile::new(&state);
        file.exported_at = datetime!(2024-03-01 12:30:00 UTC);

        let encoded: Value = serde_json::from_str(&file.to_json().unwrap()).unwrap();
        assert_eq!(
            encoded,
            json!({
                "version": "1.0",
                "exportedAt": "2024-03-01T12:30:00Z",
                "customResponses": [{
                    "operationName": "GetUser",
                    "customResponse": {"data": {"user": null}},
                    "activated": true,
                    "delay": 500
                }],
                "settings": {"globalMockEnabled": true, "theme": "dark"}
            })
        );
    }

    #[test]
    fn test_import_accepts_minor_versions() {
        let file = ExportFile::from_json(
            r#"{"version":"1.3","exportedAt":"2024-03-01T12:30:00.000Z","customResponses":[],"settings":{"globalMockEnabled":false}}"#,
        )
        .unwrap();

        assert_eq!(file.exported_at, datetime!(2024-03-01 12:30:00 UTC));
        assert!(!file.settings.global_mock_enabled);
        assert_eq!(file.settings.theme, Theme::Light);
    }

    #[test]
    fn test_import_rejects_other_major_versions_and_garbage() {
        let result = ExportFile::from_json(r#"{"version":"2.0","exportedAt":"2024-03-01T12:30:00Z"}"#);
        assert!(matches!(result, Err(Error::UnsupportedExportVersion(version)) if version == "2.0"));

        assert!(matches!(ExportFile::from_json("{"), Err(Error::Json(_))));
        assert!(matches!(
            ExportFile::from_json(r#"{"version":"1.0","exportedAt":"yesterday"}"#),
            Err(Error::Json(_))
        ));
    }
}
