//! Validates settings fixtures against the frozen JSON schema.

use std::path::Path;

use jsonschema::JSONSchema;
use openid_login_contract_tests::contract_path;
use openid_login_core::HandlerSettings;
use serde_json::Value;

fn load_json(path: &Path) -> Value {
    let raw = std::fs::read_to_string(path).expect("json file should be readable");
    serde_json::from_str(&raw).expect("json file should be valid")
}

fn compile_validator() -> JSONSchema {
    let schema = load_json(&contract_path("handler-settings.schema.json"));
    JSONSchema::compile(&schema).expect("schema should compile")
}

#[test]
fn settings_fixture_matches_schema_and_loads() {
    let validator = compile_validator();
    let path = contract_path("fixtures/handler-settings.valid.json");
    let fixture = load_json(&path);
    assert!(
        validator.is_valid(&fixture),
        "settings fixture should validate against schema"
    );

    let raw = std::fs::read_to_string(&path).expect("fixture should be readable");
    let settings = HandlerSettings::from_json_str(&raw).expect("fixture should deserialize");
    assert_eq!(settings.user_model, "User");
}

#[test]
fn invalid_settings_fixture_is_rejected_by_schema_and_loader() {
    let validator = compile_validator();
    let path = contract_path("fixtures/handler-settings.invalid.json");
    let fixture = load_json(&path);
    assert!(
        !validator.is_valid(&fixture),
        "invalid fixture should fail schema validation"
    );

    let raw = std::fs::read_to_string(&path).expect("fixture should be readable");
    assert!(HandlerSettings::from_json_str(&raw).is_err());
}

#[test]
fn default_settings_serialize_to_schema_valid_json() {
    let validator = compile_validator();
    let encoded = serde_json::to_value(HandlerSettings::default()).expect("defaults should encode");
    assert!(validator.is_valid(&encoded));
}
