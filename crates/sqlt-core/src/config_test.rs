use super::*;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_defaults_from_empty_yaml() {
    let config = TemplateConfig::from_yaml("{}").unwrap();
    assert_eq!(config, TemplateConfig::default());
    assert!(config.enable_template_processing);
    assert_eq!(config.babel_default_locale, "en");
}

#[test]
fn test_parse_all_keys() {
    let yaml = r#"
ENABLE_TEMPLATE_PROCESSING: false
BABEL_DEFAULT_LOCALE: de
LANGUAGES: [en, de, pt_BR]
JINJA_CONTEXT_ADDONS:
  company: acme
  fiscal_start_month: 4
TEMPLATE_FUEL: 50000
"#;
    let config = TemplateConfig::from_yaml(yaml).unwrap();
    assert!(!config.enable_template_processing);
    assert_eq!(config.babel_default_locale, "de");
    assert_eq!(config.languages, vec!["en", "de", "pt_BR"]);
    assert_eq!(
        config.jinja_context_addons.get("fiscal_start_month"),
        Some(&serde_json::json!(4))
    );
    assert_eq!(config.template_fuel, Some(50000));
}

#[test]
fn test_unknown_key_rejected() {
    let err = TemplateConfig::from_yaml("ENABLE_TEMPLATING: true").unwrap_err();
    assert!(matches!(err, CoreError::ConfigParseError { .. }));
}

#[test]
fn test_addon_name_must_be_identifier() {
    let err = TemplateConfig::from_yaml("JINJA_CONTEXT_ADDONS:\n  __class__: 1\n").unwrap_err();
    assert!(err.to_string().contains("C003"));
}

#[test]
fn test_zero_fuel_rejected() {
    assert!(TemplateConfig::from_yaml("TEMPLATE_FUEL: 0").is_err());
}

#[test]
fn test_load_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "BABEL_DEFAULT_LOCALE: fr").unwrap();
    let config = TemplateConfig::load(file.path()).unwrap();
    assert_eq!(config.babel_default_locale, "fr");
}

#[test]
fn test_load_missing_file() {
    let err = TemplateConfig::load(Path::new("/nonexistent/sqlt.yml")).unwrap_err();
    assert!(matches!(err, CoreError::ConfigNotFound { .. }));
}

#[test]
fn test_is_identifier() {
    assert!(is_identifier("company"));
    assert!(is_identifier("fy_2024"));
    assert!(!is_identifier("_private"));
    assert!(!is_identifier("1abc"));
    assert!(!is_identifier("a-b"));
}
