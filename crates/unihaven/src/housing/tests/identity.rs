use super::common::*;

use crate::housing::domain::NewUniversity;
use crate::housing::identity::{token_from_header, AuthError, RegistrationError, UniversityToken};
use crate::housing::ValidationError;

#[test]
fn registered_tokens_are_unique_uuid_strings() {
    let (service, _) = build_service();
    let hku = register_university(&service, "HKU");
    let hkust = register_university(&service, "HKUST");

    assert_ne!(hku.token, hkust.token);
    assert_eq!(hku.token.as_str().len(), 36);
    assert!(UniversityToken::parse(hku.token.as_str()).is_ok());
}

#[test]
fn authenticate_resolves_the_owning_university() {
    let (service, _) = build_service();
    let _hku = register_university(&service, "HKU");
    let cuhk = register_university(&service, "CUHK");

    let university = service
        .registry()
        .authenticate(Some(&cuhk.header()))
        .expect("token is valid");
    assert_eq!(university.id, cuhk.id());
    assert_eq!(university.name, "CUHK");
}

#[test]
fn authenticate_accepts_uppercase_tokens_and_scheme() {
    let (service, _) = build_service();
    let hku = register_university(&service, "HKU");

    let header = format!("token {}", hku.token.as_str().to_uppercase());
    let university = service
        .registry()
        .authenticate(Some(&header))
        .expect("canonical form matches");
    assert_eq!(university.id, hku.id());
}

#[test]
fn missing_header_is_rejected() {
    assert!(matches!(token_from_header(None), Err(AuthError::Missing)));
}

#[test]
fn malformed_headers_are_rejected() {
    for header in [
        "",
        "Token",
        "Bearer 1b4e28ba-2fa1-11d2-883f-0016d3cca427",
        "Token not-a-uuid",
    ] {
        assert!(
            matches!(token_from_header(Some(header)), Err(AuthError::Malformed)),
            "header {header:?} should be malformed"
        );
    }
}

#[test]
fn unknown_token_is_invalid() {
    let (service, _) = build_service();
    register_university(&service, "HKU");

    let stranger = UniversityToken::generate();
    let header = format!("Token {}", stranger.as_str());
    assert!(matches!(
        service.registry().authenticate(Some(&header)),
        Err(AuthError::InvalidToken)
    ));
}

#[test]
fn token_debug_output_is_redacted() {
    let token = UniversityToken::generate();
    let rendered = format!("{token:?}");
    assert!(!rendered.contains(token.as_str()));
}

#[test]
fn token_is_never_serialized_with_the_university() {
    let (service, _) = build_service();
    let hku = register_university(&service, "HKU");

    let university = service
        .registry()
        .validate_token(&hku.token)
        .expect("token is valid");
    let payload = serde_json::to_value(&university).expect("serializes");
    assert!(payload.get("token").is_none());
    assert_eq!(payload["name"], "HKU");
}

#[test]
fn registration_requires_a_name() {
    let (service, _) = build_service();
    let result = service.registry().register(NewUniversity {
        name: "  ".to_string(),
        country: "Hong Kong".to_string(),
        address: String::new(),
    });
    assert!(matches!(
        result,
        Err(RegistrationError::Validation(ValidationError::BlankField { field: "name" }))
    ));
}
