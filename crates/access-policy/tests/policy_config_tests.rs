//! Policies and credentials loaded from the YAML the service reads.

use access_policy::{
    AccessPolicy, Action, AuthConfig, Authenticator, Credential, Decision, PolicyRule,
    RedactionRule,
};
use tree_common::NodePath;

const AUTH_YAML: &str = r#"
allow_anonymous: true
anonymous_scopes: [public]
api_keys:
  - secret: alice-key
    principal: alice
    scopes: [staff]
tokens:
  - secret: carol-token
    principal: carol
    scopes: [staff, secret]
    expires_at: "2999-01-01T00:00:00Z"
  - secret: old-token
    principal: dave
    scopes: [staff]
    expires_at: "2001-01-01T00:00:00Z"
"#;

const POLICY_YAML: &str = r#"
- pattern: "/"
  scopes: [public, staff]
  actions: [read_metadata, search]
- pattern: "samples"
  scopes: [staff]
  actions: [read_data]
- pattern: "weather"
  scopes: [staff]
  actions: [read_data, read_metadata]
  redact:
    - column: pressure
    - metadata_field: owner.email
- pattern: "restricted"
  actions: [read_metadata, search, read_data]
  effect: deny
- pattern: "restricted"
  scopes: [secret]
  actions: [read_metadata, read_data]
"#;

fn setup() -> (Authenticator, AccessPolicy) {
    let auth: AuthConfig = serde_yaml::from_str(AUTH_YAML).unwrap();
    let rules: Vec<PolicyRule> = serde_yaml::from_str(POLICY_YAML).unwrap();
    (Authenticator::new(&auth), AccessPolicy::new(rules))
}

fn path(s: &str) -> NodePath {
    NodePath::parse(s)
}

#[test]
fn test_anonymous_reads_metadata_only() {
    let (auth, policy) = setup();
    let anon = auth.authenticate(None).unwrap();
    assert!(policy.permits(&anon, &path("samples/run42"), Action::ReadMetadata));
    assert!(policy.permits(&anon, &path(""), Action::Search));
    assert!(!policy.permits(&anon, &path("samples/run42"), Action::ReadData));
}

#[test]
fn test_staff_reads_data_with_redaction() {
    let (auth, policy) = setup();
    let alice = auth
        .authenticate(Some(&Credential::ApiKey("alice-key".into())))
        .unwrap();
    assert_eq!(
        policy.authorize(&alice, &path("samples/run42"), Action::ReadData),
        Decision::Allow
    );
    assert_eq!(
        policy.authorize(&alice, &path("weather"), Action::ReadData).redactions(),
        &[
            RedactionRule::MetadataField("owner.email".into()),
            RedactionRule::Column("pressure".into()),
        ]
    );
}

#[test]
fn test_restricted_deny_wins_within_tier() {
    let (auth, policy) = setup();
    let alice = auth
        .authenticate(Some(&Credential::ApiKey("alice-key".into())))
        .unwrap();
    let carol = auth
        .authenticate(Some(&Credential::Bearer("carol-token".into())))
        .unwrap();

    // Same tier: the deny rule applies to everyone and wins.
    assert!(!policy.permits(&alice, &path("restricted/notes"), Action::ReadData));
    assert!(!policy.permits(&carol, &path("restricted/notes"), Action::ReadData));
    // The broader rule still lets staff see the root.
    assert!(policy.permits(&alice, &path(""), Action::ReadMetadata));
}

#[test]
fn test_expired_token_is_unauthorized() {
    let (auth, _) = setup();
    let err = auth
        .authenticate(Some(&Credential::Bearer("old-token".into())))
        .unwrap_err();
    let err: tree_common::DataError = err.into();
    assert_eq!(err.status_code(), 401);
}

#[test]
fn test_bad_pattern_rejected_at_load() {
    let yaml = "- pattern: \"a/**/b\"\n  actions: [search]\n";
    assert!(serde_yaml::from_str::<Vec<PolicyRule>>(yaml).is_err());
}
