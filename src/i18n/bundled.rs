//! Compiled-in translations: the ultimate fallback with no network or
//! storage dependency. Assets live under `assets/i18n/{language}/{namespace}.json`
//! and are embedded at build time.

use super::tree::TranslationTree;
use crate::error::I18nError;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Language used when the requested one has no bundled data.
pub const CANONICAL_LANGUAGE: &str = "en";

const BUNDLED_SOURCES: [(&str, &str, &str); 2] = [
    ("en", "common", include_str!("../../assets/i18n/en/common.json")),
    ("es", "common", include_str!("../../assets/i18n/es/common.json")),
];

static TABLE: OnceLock<HashMap<(&'static str, &'static str), TranslationTree>> = OnceLock::new();

fn table() -> &'static HashMap<(&'static str, &'static str), TranslationTree> {
    TABLE.get_or_init(|| {
        BUNDLED_SOURCES
            .iter()
            .map(|(language, namespace, raw)| {
                let value =
                    serde_json::from_str(raw).expect("bundled translation assets are valid JSON");
                let tree = TranslationTree::from_value(value)
                    .expect("bundled translation assets pass validation");
                ((*language, *namespace), tree)
            })
            .collect()
    })
}

/// Bundled data for a `(language, namespace)` pair, falling back to the
/// canonical language for languages that ship no bundle.
pub fn bundled(language: &str, namespace: &str) -> Result<TranslationTree, I18nError> {
    let table = table();
    if let Some(tree) = table.get(&(language, namespace)) {
        return Ok(tree.clone());
    }
    if let Some(tree) = table.get(&(CANONICAL_LANGUAGE, namespace)) {
        return Ok(tree.clone());
    }
    Err(I18nError::MissingBundle {
        language: language.to_string(),
        namespace: namespace.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_languages_present() {
        let en = bundled("en", "common").expect("en bundle");
        let es = bundled("es", "common").expect("es bundle");
        assert_eq!(en.lookup("workout.start"), Some("Start workout"));
        assert_eq!(es.lookup("workout.start"), Some("Iniciar entrenamiento"));
    }

    #[test]
    fn test_unknown_language_falls_back_to_canonical() {
        let fr = bundled("fr", "common").expect("fallback bundle");
        assert_eq!(fr.lookup("workout.start"), Some("Start workout"));
    }

    #[test]
    fn test_unknown_namespace_is_missing_bundle() {
        let err = bundled("en", "nutrition").unwrap_err();
        assert!(matches!(err, I18nError::MissingBundle { .. }));
    }

    #[test]
    fn test_bundles_share_key_structure() {
        let en = bundled("en", "common").expect("en bundle");
        let es = bundled("es", "common").expect("es bundle");
        let en_keys: Vec<String> = en.flatten().into_iter().map(|(k, _)| k).collect();
        let es_keys: Vec<String> = es.flatten().into_iter().map(|(k, _)| k).collect();
        assert_eq!(en_keys, es_keys);
    }
}
