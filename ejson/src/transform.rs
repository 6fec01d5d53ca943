//! Structure-preserving encryption and decryption of JSON trees.
//!
//! Only string leaves change. Object keys, numbers, booleans, nulls, array
//! order and member order all come out exactly as they went in. A
//! `_public_key` member is never run through the codec, at any depth; only the
//! root object's one is set on encryption.

use serde_json::{Map, Value};

use crate::crypto::{self, CodecError};

pub const PUBLIC_KEY_FIELD: &str = "_public_key";

/// Encrypts every plaintext string leaf for `public_hex`. A root object gains
/// (or has overwritten) a `_public_key` member holding `public_hex` verbatim.
///
/// Strings that already start with `EJ[` are left alone, which makes the
/// operation idempotent on partially encrypted documents.
pub fn encrypt_tree(value: &Value, public_hex: &str) -> Result<Value, CodecError> {
    // Reject a bad key even when every leaf is already sealed.
    crypto::decode_key(public_hex)?;
    match value {
        Value::Object(members) => {
            let mut out = walk_members(members, &|leaf: &str| encrypt_leaf(leaf, public_hex))?;
            out.insert(PUBLIC_KEY_FIELD.to_string(), Value::String(public_hex.to_string()));
            Ok(Value::Object(out))
        }
        other => walk(other, &|leaf: &str| encrypt_leaf(leaf, public_hex)),
    }
}

/// Decrypts every `EJ[`-prefixed string leaf with `private_hex`. Plain strings
/// pass through, so already decrypted or partially encrypted documents work.
pub fn decrypt_tree(value: &Value, private_hex: &str) -> Result<Value, CodecError> {
    crypto::decode_key(private_hex)?;
    walk(value, &|leaf: &str| decrypt_leaf(leaf, private_hex))
}

fn encrypt_leaf(leaf: &str, public_hex: &str) -> Result<String, CodecError> {
    if crypto::is_encrypted(leaf) {
        return Ok(leaf.to_string());
    }
    crypto::encrypt(leaf, public_hex)
}

fn decrypt_leaf(leaf: &str, private_hex: &str) -> Result<String, CodecError> {
    if !crypto::is_encrypted(leaf) {
        return Ok(leaf.to_string());
    }
    crypto::decrypt(leaf, private_hex)
}

fn walk<F>(value: &Value, leaf_fn: &F) -> Result<Value, CodecError>
where
    F: Fn(&str) -> Result<String, CodecError>,
{
    Ok(match value {
        Value::String(leaf) => Value::String(leaf_fn(leaf)?),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| walk(item, leaf_fn))
                .collect::<Result<_, _>>()?,
        ),
        Value::Object(members) => Value::Object(walk_members(members, leaf_fn)?),
        Value::Number(_) | Value::Bool(_) | Value::Null => value.clone(),
    })
}

/// `_public_key` members are copied untouched at any depth; the rest recurse.
fn walk_members<F>(
    members: &Map<String, Value>,
    leaf_fn: &F,
) -> Result<Map<String, Value>, CodecError>
where
    F: Fn(&str) -> Result<String, CodecError>,
{
    let mut out = Map::with_capacity(members.len());
    for (key, child) in members {
        let transformed = if key == PUBLIC_KEY_FIELD {
            child.clone()
        } else {
            walk(child, leaf_fn)?
        };
        out.insert(key.clone(), transformed);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::{decrypt_tree, encrypt_tree, PUBLIC_KEY_FIELD};
    use crate::crypto::{self, generate_keypair, CodecError};
    use proptest::prelude::*;
    use serde_json::{json, Value};

    fn assert_encrypted(value: &Value) {
        let text = value.as_str().expect("string leaf");
        assert!(text.starts_with("EJ[1:"), "{text} is not encrypted");
        assert_eq!(text.matches(':').count(), 3);
    }

    #[test]
    fn password_scenario_round_trips() {
        let pair = generate_keypair().expect("keygen");
        let doc = json!({"_public_key": pair.public_hex(), "password": "secret123"});

        let encrypted = encrypt_tree(&doc, &pair.public_hex()).expect("encrypt");
        assert_encrypted(&encrypted["password"]);
        assert_eq!(encrypted[PUBLIC_KEY_FIELD], json!(pair.public_hex()));

        let decrypted = decrypt_tree(&encrypted, &pair.private_hex()).expect("decrypt");
        assert_eq!(decrypted, doc);
    }

    #[test]
    fn nested_array_scenario() {
        let pair = generate_keypair().expect("keygen");
        let doc = json!({"a": {"b": ["x", "y"]}});

        let encrypted = encrypt_tree(&doc, &pair.public_hex()).expect("encrypt");
        let items = encrypted["a"]["b"].as_array().expect("array");
        assert_eq!(items.len(), 2);
        items.iter().for_each(assert_encrypted);

        let decrypted = decrypt_tree(&encrypted, &pair.private_hex()).expect("decrypt");
        assert_eq!(decrypted, json!({"a": {"b": ["x", "y"]}, "_public_key": pair.public_hex()}));
    }

    #[test]
    fn non_string_scalars_are_untouched() {
        let pair = generate_keypair().expect("keygen");
        let doc = json!({
            "int": 42,
            "float": 3.25,
            "neg": -7,
            "yes": true,
            "no": false,
            "nothing": null,
            "list": [1, null, false, {"deep": 0.5}],
            "empty_obj": {},
            "empty_list": []
        });
        let encrypted = encrypt_tree(&doc, &pair.public_hex()).expect("encrypt");
        let keys = [
            "int", "float", "neg", "yes", "no", "nothing", "list", "empty_obj", "empty_list",
        ];
        for key in keys {
            assert_eq!(encrypted[key], doc[key], "{key} changed");
        }
    }

    #[test]
    fn public_key_is_set_and_never_encrypted() {
        let pair = generate_keypair().expect("keygen");
        let stale = generate_keypair().expect("keygen");
        let doc = json!({"_public_key": stale.public_hex(), "token": "abc"});

        let encrypted = encrypt_tree(&doc, &pair.public_hex()).expect("encrypt");
        let field = encrypted[PUBLIC_KEY_FIELD].as_str().expect("string");
        assert_eq!(field, pair.public_hex());
        assert!(!field.starts_with("EJ["));

        let decrypted = decrypt_tree(&encrypted, &pair.private_hex()).expect("decrypt");
        assert_eq!(decrypted[PUBLIC_KEY_FIELD], json!(pair.public_hex()));
    }

    #[test]
    fn nested_public_key_is_passed_through() {
        let pair = generate_keypair().expect("keygen");
        let doc = json!({
            "svc": {"_public_key": "deadbeef", "pw": "p"},
            "list": [{"_public_key": "x"}]
        });

        let encrypted = encrypt_tree(&doc, &pair.public_hex()).expect("encrypt");
        assert_eq!(encrypted["svc"][PUBLIC_KEY_FIELD], json!("deadbeef"));
        assert_eq!(encrypted["list"][0][PUBLIC_KEY_FIELD], json!("x"));
        assert_encrypted(&encrypted["svc"]["pw"]);
        assert_eq!(encrypted[PUBLIC_KEY_FIELD], json!(pair.public_hex()));

        let decrypted = decrypt_tree(&encrypted, &pair.private_hex()).expect("decrypt");
        assert_eq!(decrypted["svc"], json!({"_public_key": "deadbeef", "pw": "p"}));
        assert_eq!(decrypted["list"], doc["list"]);
    }

    #[test]
    fn bad_private_key_is_rejected_before_walking() {
        let doc = json!({"plain": "nothing sealed"});
        assert!(matches!(
            decrypt_tree(&doc, "xyz").unwrap_err(),
            CodecError::InvalidHexString(_)
        ));
        assert_eq!(
            decrypt_tree(&doc, &"ab".repeat(8)).unwrap_err(),
            CodecError::InvalidKeyFormat(8)
        );
    }

    #[test]
    fn encryption_is_idempotent() {
        let pair = generate_keypair().expect("keygen");
        let doc = json!({"a": "1", "b": ["2", {"c": "3"}], "n": 5});
        let once = encrypt_tree(&doc, &pair.public_hex()).expect("encrypt");
        let twice = encrypt_tree(&once, &pair.public_hex()).expect("encrypt");
        assert_eq!(once, twice);
    }

    #[test]
    fn key_order_is_preserved() {
        let pair = generate_keypair().expect("keygen");
        let doc: Value =
            serde_json::from_str(r#"{"zeta": "1", "alpha": "2", "mid": {"y": "3", "b": "4"}}"#)
                .expect("json");
        let encrypted = encrypt_tree(&doc, &pair.public_hex()).expect("encrypt");
        let keys: Vec<&String> = encrypted.as_object().expect("object").keys().collect();
        assert_eq!(keys, ["zeta", "alpha", "mid", "_public_key"]);
        let nested: Vec<&String> = encrypted["mid"].as_object().expect("object").keys().collect();
        assert_eq!(nested, ["y", "b"]);
    }

    #[test]
    fn existing_public_key_keeps_its_position() {
        let pair = generate_keypair().expect("keygen");
        let doc: Value = serde_json::from_str(&format!(
            r#"{{"_public_key": "{}", "secret": "s"}}"#,
            pair.public_hex()
        ))
        .expect("json");
        let encrypted = encrypt_tree(&doc, &pair.public_hex()).expect("encrypt");
        let keys: Vec<&String> = encrypted.as_object().expect("object").keys().collect();
        assert_eq!(keys, ["_public_key", "secret"]);
    }

    #[test]
    fn number_text_is_preserved() {
        let pair = generate_keypair().expect("keygen");
        let doc: Value = serde_json::from_str(
            r#"{"big": 12345678901234567890123, "precise": 0.10000000000000000001}"#,
        )
        .expect("json");
        let encrypted = encrypt_tree(&doc, &pair.public_hex()).expect("encrypt");
        let decrypted = decrypt_tree(&encrypted, &pair.private_hex()).expect("decrypt");
        let text = serde_json::to_string(&decrypted).expect("serialize");
        assert!(text.contains("12345678901234567890123"));
        assert!(text.contains("0.10000000000000000001"));
    }

    #[test]
    fn plain_strings_pass_through_decryption() {
        let pair = generate_keypair().expect("keygen");
        let doc = json!({"plain": "visible", "list": ["also visible"]});
        let decrypted = decrypt_tree(&doc, &pair.private_hex()).expect("decrypt");
        assert_eq!(decrypted, doc);
    }

    #[test]
    fn partially_encrypted_document_decrypts() {
        let pair = generate_keypair().expect("keygen");
        let sealed = crypto::encrypt("hidden", &pair.public_hex()).expect("encrypt");
        let doc = json!({"sealed": sealed, "open": "shown"});
        let decrypted = decrypt_tree(&doc, &pair.private_hex()).expect("decrypt");
        assert_eq!(decrypted, json!({"sealed": "hidden", "open": "shown"}));
    }

    #[test]
    fn wrong_key_aborts_whole_walk() {
        let owner = generate_keypair().expect("keygen");
        let stranger = generate_keypair().expect("keygen");
        let doc = json!({"a": "1", "b": {"c": "2"}});
        let encrypted = encrypt_tree(&doc, &owner.public_hex()).expect("encrypt");
        assert_eq!(
            decrypt_tree(&encrypted, &stranger.private_hex()).unwrap_err(),
            CodecError::DecryptionFailed
        );
    }

    #[test]
    fn malformed_ciphertext_surfaces_codec_error() {
        let pair = generate_keypair().expect("keygen");
        let doc = json!({"broken": "EJ[2:a:b:c]"});
        assert!(matches!(
            decrypt_tree(&doc, &pair.private_hex()).unwrap_err(),
            CodecError::InvalidEncryptedFormat(_)
        ));
    }

    #[test]
    fn bad_public_key_is_rejected() {
        let doc = json!({"a": "1"});
        assert!(matches!(
            encrypt_tree(&doc, "xyz").unwrap_err(),
            CodecError::InvalidHexString(_)
        ));
        assert_eq!(
            encrypt_tree(&doc, &"ab".repeat(8)).unwrap_err(),
            CodecError::InvalidKeyFormat(8)
        );
    }

    #[test]
    fn non_object_roots_are_walked() {
        let pair = generate_keypair().expect("keygen");
        let doc = json!(["x", 1, {"y": "z"}]);
        let encrypted = encrypt_tree(&doc, &pair.public_hex()).expect("encrypt");
        assert_encrypted(&encrypted[0]);
        assert_eq!(encrypted[1], json!(1));
        assert!(encrypted[2].get(PUBLIC_KEY_FIELD).is_none());
        let decrypted = decrypt_tree(&encrypted, &pair.private_hex()).expect("decrypt");
        assert_eq!(decrypted, doc);
    }

    #[test]
    fn plaintext_with_marker_prefix_is_passed_through() {
        let pair = generate_keypair().expect("keygen");
        let doc = json!({"looks_sealed": "EJ[not really"});
        let encrypted = encrypt_tree(&doc, &pair.public_hex()).expect("encrypt");
        assert_eq!(encrypted["looks_sealed"], json!("EJ[not really"));
    }

    fn json_leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            "[a-zA-Z0-9 :\\]\\[]{0,12}"
                .prop_filter("marker prefix", |s| !s.starts_with("EJ["))
                .prop_map(Value::String),
        ]
    }

    fn json_tree() -> impl Strategy<Value = Value> {
        json_leaf().prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::vec(("[a-z]{1,6}", inner), 0..4)
                    .prop_map(|members| Value::Object(members.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn trees_round_trip(members in prop::collection::vec(("[a-z]{1,6}", json_tree()), 0..4)) {
            let pair = generate_keypair().expect("keygen");
            let doc = Value::Object(
                members.into_iter().filter(|(k, _)| k != "_public_key").collect(),
            );
            let encrypted = encrypt_tree(&doc, &pair.public_hex()).expect("encrypt");
            let decrypted = decrypt_tree(&encrypted, &pair.private_hex()).expect("decrypt");

            let mut expected = doc.clone();
            if let Value::Object(map) = &mut expected {
                map.insert("_public_key".to_string(), json!(pair.public_hex()));
            }
            prop_assert_eq!(decrypted, expected);
        }
    }
}
