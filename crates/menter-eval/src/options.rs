//! Runtime options a host can set in code or load from JSON.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::module::Import;

#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("invalid runtime options: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid auto import '{0}', expected 'name', 'name inline' or 'name as alias'")]
    InvalidAutoImport(String),
}

/// Import policy applied to every loaded unit and evaluated snippet.
///
/// ```json
/// { "forbidden_imports": ["io"], "auto_imports": ["math inline", "common"] }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeOptions {
    /// Module names no unit may import.
    pub forbidden_imports: Vec<String>,
    /// `"name"`, `"name inline"` or `"name as alias"`.
    pub auto_imports: Vec<String>,
}

impl RuntimeOptions {
    pub fn from_json(text: &str) -> Result<Self, OptionsError> {
        let options: Self = serde_json::from_str(text)?;
        options.auto_import_list()?;
        Ok(options)
    }

    pub fn forbid_import(&mut self, module: impl Into<String>) {
        self.forbidden_imports.push(module.into());
    }

    pub fn add_auto_import(&mut self, entry: impl Into<String>) -> Result<(), OptionsError> {
        let entry = entry.into();
        parse_auto_import(&entry)?;
        self.auto_imports.push(entry);
        Ok(())
    }

    pub fn is_forbidden(&self, module: &str) -> bool {
        self.forbidden_imports.iter().any(|m| m == module)
    }

    pub(crate) fn auto_import_list(&self) -> Result<Vec<Import>, OptionsError> {
        self.auto_imports.iter().map(|e| parse_auto_import(e)).collect()
    }
}

fn parse_auto_import(entry: &str) -> Result<Import, OptionsError> {
    let words: Vec<&str> = entry.split_whitespace().collect();
    match words.as_slice() {
        [name] => Ok(Import::new(*name, None, false)),
        [name, "inline"] => Ok(Import::new(*name, None, true)),
        [name, "as", alias] => Ok(Import::new(*name, Some(alias.to_string()), false)),
        _ => Err(OptionsError::InvalidAutoImport(entry.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json() {
        let options = RuntimeOptions::from_json(
            r#"{ "forbidden_imports": ["io"], "auto_imports": ["math inline", "common as c"] }"#,
        )
        .unwrap();
        assert!(options.is_forbidden("io"));
        let imports = options.auto_import_list().unwrap();
        assert!(imports[0].inline);
        assert_eq!(imports[1].binding(), "c");
    }

    #[test]
    fn test_defaults_are_empty() {
        let options = RuntimeOptions::from_json("{}").unwrap();
        assert_eq!(options, RuntimeOptions::default());
    }

    #[test]
    fn test_invalid_auto_import() {
        let err = RuntimeOptions::from_json(r#"{ "auto_imports": ["math as"] }"#).unwrap_err();
        assert!(matches!(err, OptionsError::InvalidAutoImport(_)));

        let mut options = RuntimeOptions::default();
        assert!(options.add_auto_import("a b c d").is_err());
        assert!(options.auto_imports.is_empty());
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            RuntimeOptions::from_json("{ forbidden"),
            Err(OptionsError::Json(_))
        ));
    }
}
