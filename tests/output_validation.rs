//! Output Validation Tests
//!
//! Checks that everything kvlookup prints conforms to the envelope contract:
//! - Success envelopes carry exactly `ok`, `command`, `data` and `meta`
//! - Error envelopes carry exactly `ok`, `command` and `error`
//! - Lookup results serialize in the shape hosts render
//!
//! Uses `insta` inline snapshots to detect unintended output changes.

use kvlookup::store::memory::MemoryConnector;
use kvlookup::{
    BatchOutcome, ConnectionConfig, Entity, ErrorEnvelope, Lookup, LookupData, LookupOptions,
    LookupResult, Metadata, ParsedValue, SuccessEnvelope, ViewPreference,
};
use serde_json::{json, Value};

fn sample_batch() -> BatchOutcome {
    BatchOutcome {
        results: vec![
            LookupResult {
                entity: Entity { value: "8.8.8.8".to_string(), entity_type: Some("IPv4".to_string()) },
                data: Some(LookupData {
                    summary: vec!["Org: Google".to_string()],
                    details: ParsedValue::Structured(json!({"org": "Google", "asn": 15169})),
                    view: ViewPreference::Json,
                }),
            },
            LookupResult::no_data(Entity::new("1.2.3.4")),
        ],
        failures: Vec::new(),
    }
}

fn top_level_keys(value: &Value) -> Vec<&str> {
    let mut keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
    keys.sort_unstable();
    keys
}

// ============================================================================
// Envelope Structure
// ============================================================================

#[test]
fn test_success_envelope_structure() {
    let envelope = SuccessEnvelope::new("lookup", sample_batch(), Metadata::for_batch(3, 2, 1, 0));
    let value = serde_json::to_value(&envelope).unwrap();

    assert_eq!(value["ok"], true);
    assert_eq!(value["command"], "lookup");
    assert_eq!(top_level_keys(&value), vec!["command", "data", "meta", "ok"]);
    assert!(value["data"].get("failures").is_none(), "failures omitted when empty");
}

#[test]
fn test_error_envelope_structure() {
    let err = kvlookup::LookupError::invalid_input("host: You must provide a host value");
    let value = serde_json::to_value(ErrorEnvelope::from_error("lookup", &err)).unwrap();

    assert_eq!(value["ok"], false);
    assert_eq!(top_level_keys(&value), vec!["command", "error", "ok"]);
    assert_eq!(value["error"]["code"], "INVALID_INPUT");
}

#[test]
fn test_parse_error_details_are_a_string() {
    let result = LookupResult {
        entity: Entity::new("x"),
        data: Some(LookupData {
            summary: vec!["The retrieved value ...".to_string()],
            details: kvlookup::parse("{broken", true),
            view: ViewPreference::Json,
        }),
    };
    let value = serde_json::to_value(result).unwrap();
    assert!(value["data"]["details"].as_str().unwrap().starts_with("The retrieved value was not"));
}

// ============================================================================
// Snapshot Tests (using insta)
// ============================================================================

#[test]
fn test_lookup_envelope_snapshot() {
    let envelope = SuccessEnvelope::new("lookup", sample_batch(), Metadata::for_batch(0, 2, 1, 0));
    let json = serde_json::to_string_pretty(&envelope).unwrap();

    insta::assert_snapshot!(json, @r###"
    {
      "ok": true,
      "command": "lookup",
      "data": {
        "results": [
          {
            "entity": {
              "value": "8.8.8.8",
              "type": "IPv4"
            },
            "data": {
              "summary": [
                "Org: Google"
              ],
              "details": {
                "asn": 15169,
                "org": "Google"
              },
              "view": "json"
            }
          },
          {
            "entity": {
              "value": "1.2.3.4"
            },
            "data": null
          }
        ]
      },
      "meta": {
        "execution_ms": 0,
        "entities": 2,
        "hits": 1
      }
    }
    "###);
}

#[tokio::test]
async fn test_connection_failure_snapshot() {
    let connector = MemoryConnector::new();
    connector.set_fail_connect(true);
    let mut lookup = Lookup::new(connector);

    let err = lookup
        .lookup_all(&[Entity::new("8.8.8.8")], &LookupOptions::new(ConnectionConfig::new("memory", 6379)))
        .await
        .unwrap_err();
    let json = serde_json::to_string(&ErrorEnvelope::from_error("lookup", &err)).unwrap();

    insta::assert_snapshot!(json, @r###"{"ok":false,"command":"lookup","error":{"code":"CONNECTION_FAILED","message":"Connection failed: Failed to connect to memory:6379: connection refused"}}"###);
}

#[tokio::test]
async fn test_partial_failure_snapshot() {
    let connector = MemoryConnector::new();
    connector.insert(0, "good", "plain value");
    connector.fail_key("bad");
    let mut lookup = Lookup::new(connector);
    let options = LookupOptions::new(ConnectionConfig::new("memory", 6379)).with_structured(false);

    let batch = lookup.lookup_all(&[Entity::new("good"), Entity::new("bad")], &options).await.unwrap();
    let meta = Metadata::for_batch(0, 2, batch.hits(), batch.failures.len());
    let json = serde_json::to_string(&SuccessEnvelope::new("lookup", batch, meta)).unwrap();

    insta::assert_snapshot!(json, @r###"{"ok":true,"command":"lookup","data":{"results":[{"entity":{"value":"good"},"data":{"summary":["plain value"],"details":"plain value","view":"json"}}],"failures":[{"entity":{"value":"bad"},"code":"LOOKUP_FAILED","message":"Lookup failed for key 'bad': connection reset by peer"}]},"meta":{"execution_ms":0,"entities":2,"hits":1,"failed":1}}"###);
}
