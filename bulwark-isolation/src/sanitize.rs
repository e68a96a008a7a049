//! Response sanitization.

use bulwark_core::document::{Document, Fields};
use bulwark_core::principal::Uid;
use serde_json::Value;

/// Fields removed from records that belong to another principal.
pub const SENSITIVE_FIELDS: [&str; 5] = ["email", "phone", "address", "taxId", "bankDetails"];

const SUBJECT_FIELD: &str = "userId";

/// Strips other principals' sensitive fields from `data`.
///
/// Arrays are sanitized element by element. An object whose `userId` names
/// someone other than `uid` loses every field in [`SENSITIVE_FIELDS`]; an
/// object without a `userId` is returned untouched.
///
/// ```
/// use bulwark_core::principal::Uid;
/// use bulwark_isolation::sanitize::sanitize_data_for_user;
/// use serde_json::json;
///
/// let alice = Uid::parse(Some("alice")).unwrap();
/// let bob = json!({ "userId": "bob", "email": "b@x", "name": "Bob" });
/// let cleaned = sanitize_data_for_user(bob, &alice);
/// assert_eq!(cleaned, json!({ "userId": "bob", "name": "Bob" }));
/// ```
#[must_use]
pub fn sanitize_data_for_user(data: Value, uid: &Uid) -> Value {
    match data {
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| sanitize_data_for_user(item, uid))
                .collect(),
        ),
        Value::Object(mut fields) => {
            sanitize_fields(&mut fields, uid);
            Value::Object(fields)
        }
        other => other,
    }
}

/// Sanitizes a fetched document.
#[must_use]
pub fn sanitize_document(document: Document, uid: &Uid) -> Document {
    let path = document.path().clone();
    let mut fields = document.into_fields();
    sanitize_fields(&mut fields, uid);
    Document::new(path, fields)
}

fn sanitize_fields(fields: &mut Fields, uid: &Uid) {
    let foreign = match fields.get(SUBJECT_FIELD) {
        None | Some(Value::Null) => false,
        Some(Value::String(subject)) => !subject.is_empty() && !uid.matches(subject),
        Some(_) => true,
    };
    if foreign {
        for field in SENSITIVE_FIELDS {
            fields.remove(field);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulwark_core::document::DocumentPath;
    use serde_json::json;

    fn alice() -> Uid {
        Uid::parse(Some("alice")).unwrap()
    }

    #[test]
    fn test_own_record_untouched() {
        let record = json!({ "userId": "alice", "email": "a@x", "phone": "1" });
        assert_eq!(sanitize_data_for_user(record.clone(), &alice()), record);
    }

    #[test]
    fn test_foreign_record_stripped() {
        let record = json!({
            "userId": "bob",
            "email": "b@x",
            "phone": "2",
            "address": "street",
            "taxId": "t",
            "bankDetails": { "iban": "x" },
            "displayName": "Bob",
        });
        assert_eq!(
            sanitize_data_for_user(record, &alice()),
            json!({ "userId": "bob", "displayName": "Bob" })
        );
    }

    #[test]
    fn test_arrays_and_scalars() {
        let list = json!([
            { "userId": "alice", "email": "a@x" },
            { "userId": "bob", "email": "b@x" },
            { "email": "nobody@x" },
            3,
        ]);
        assert_eq!(
            sanitize_data_for_user(list, &alice()),
            json!([
                { "userId": "alice", "email": "a@x" },
                { "userId": "bob" },
                { "email": "nobody@x" },
                3,
            ])
        );
        assert_eq!(sanitize_data_for_user(Value::Null, &alice()), Value::Null);
    }

    #[test]
    fn test_sanitize_document() {
        let path = DocumentPath::parse("profiles/bob").unwrap();
        let fields = match json!({ "userId": "bob", "taxId": "t", "name": "Bob" }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let doc = sanitize_document(Document::new(path, fields), &alice());
        assert!(doc.get("taxId").is_none());
        assert_eq!(doc.get("name"), Some(&json!("Bob")));
        assert_eq!(doc.id(), "bob");
    }
}
