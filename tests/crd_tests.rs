//! Integration tests for the WebhookRelayForward resource schema

use serde_json::json;
use webhookrelay_operator::crd::{
    generate_crds, InputSpec, Tristate, WebhookRelayForwardSpec,
};

// ============================================================================
// Custom domain tristate
// ============================================================================

#[test]
fn missing_custom_domain_is_unset() {
    let input: InputSpec = serde_json::from_value(json!({"name": "hooks"})).unwrap();
    assert_eq!(input.custom_domain, Tristate::Unset);

    let input: InputSpec =
        serde_json::from_value(json!({"name": "hooks", "customDomain": null})).unwrap();
    assert_eq!(input.custom_domain, Tristate::Unset);
}

#[test]
fn empty_custom_domain_is_distinct_from_unset() {
    let input: InputSpec =
        serde_json::from_value(json!({"name": "hooks", "customDomain": ""})).unwrap();
    assert_eq!(input.custom_domain, Tristate::Empty);

    let input: InputSpec =
        serde_json::from_value(json!({"name": "hooks", "customDomain": "hooks.example.com"}))
            .unwrap();
    assert_eq!(input.custom_domain, Tristate::Value("hooks.example.com".to_string()));
}

#[test]
fn custom_domain_serializes_back_to_same_shape() {
    let unset = serde_json::to_value(InputSpec {
        name: "a".to_string(),
        ..Default::default()
    })
    .unwrap();
    assert!(unset.get("customDomain").is_none());

    let empty = serde_json::to_value(InputSpec {
        name: "a".to_string(),
        custom_domain: Tristate::Empty,
        ..Default::default()
    })
    .unwrap();
    assert_eq!(empty["customDomain"], json!(""));
}

#[test]
fn tristate_resolves_against_current_value() {
    assert_eq!(Tristate::Unset.resolve(Some("x.example.com")), "x.example.com");
    assert_eq!(Tristate::Unset.resolve(None), "");
    assert_eq!(Tristate::Empty.resolve(Some("x.example.com")), "");
    assert_eq!(
        Tristate::from("y.example.com").resolve(Some("x.example.com")),
        "y.example.com"
    );
    assert_eq!(Tristate::from(None), Tristate::Unset);
    assert_eq!(Tristate::from(Some("")), Tristate::Empty);
}

// ============================================================================
// Resource shape
// ============================================================================

#[test]
fn spec_parses_manifest_fields() {
    let spec: WebhookRelayForwardSpec = serde_json::from_value(json!({
        "secretRefName": "relay-token",
        "image": "webhookrelay/webhookrelayd:1.0",
        "buckets": [{
            "ref": "github",
            "inputs": [{
                "name": "hooks",
                "responseStatusCode": 200,
                "responseHeaders": {"content-type": ["application/json"]},
                "responseFromOutput": "anyOutput"
            }],
            "outputs": [{"name": "backend", "destination": "http://jenkins:8080"}]
        }],
        "resources": {"limits": {"memory": "64Mi"}}
    }))
    .unwrap();

    assert_eq!(spec.secret_ref_name.as_deref(), Some("relay-token"));
    assert_eq!(spec.buckets[0].reference, "github");
    assert_eq!(spec.buckets[0].inputs[0].response_status_code, 200);
    assert_eq!(
        spec.buckets[0].inputs[0].response_headers["content-type"],
        vec!["application/json".to_string()]
    );
    assert_eq!(spec.buckets[0].outputs[0].destination, "http://jenkins:8080");
    assert_eq!(spec.resources.unwrap().limits["memory"], "64Mi");
}

#[test]
fn generated_crd_describes_resource() {
    let crds = generate_crds().unwrap();
    assert_eq!(crds.len(), 1);

    let crd = &crds[0];
    assert!(crd.contains("forward.webhookrelay.com"));
    assert!(crd.contains("WebhookRelayForward"));
    assert!(crd.contains("whrf"));
    assert!(crd.contains("customDomain"));
}
