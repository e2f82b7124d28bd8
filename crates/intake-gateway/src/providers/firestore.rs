use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Number, Value};
use tracing::debug;

use super::{error_detail, http_client};
use crate::gateway::{
    DocumentFields, DocumentId, DocumentStore, StoreError, StoredDocument, CREATED_AT_FIELD,
};

const PAGE_SIZE: u32 = 300;

/// Document store backed by the Firestore REST API.
pub struct FirestoreStore {
    client: reqwest::Client,
    base_url: String,
    project_id: String,
    access_token: String,
}

impl FirestoreStore {
    pub fn new(
        base_url: impl Into<String>,
        project_id: impl Into<String>,
        access_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.into(),
            project_id: project_id.into(),
            access_token: access_token.into(),
        })
    }

    fn collection_url(&self, collection: &str) -> String {
        format!(
            "{}/projects/{}/databases/(default)/documents/{}",
            self.base_url.trim_end_matches('/'),
            self.project_id,
            collection
        )
    }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn append(
        &self,
        collection: &str,
        mut fields: DocumentFields,
    ) -> Result<StoredDocument, StoreError> {
        fields.remove(CREATED_AT_FIELD);
        let created_at = Utc::now();
        let mut encoded = encode_fields(&fields);
        encoded.insert(
            CREATED_AT_FIELD.to_string(),
            json!({ "timestampValue": created_at.to_rfc3339_opts(SecondsFormat::Micros, true) }),
        );

        let response = self
            .client
            .post(self.collection_url(collection))
            .bearer_auth(&self.access_token)
            .json(&json!({ "fields": encoded }))
            .send()
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        let body = read_body(response).await?;

        let id = document_id(&body)?;
        debug!(collection, document_id = %id, "firestore document created");
        fields.insert(
            CREATED_AT_FIELD.to_string(),
            Value::String(created_at.to_rfc3339_opts(SecondsFormat::Micros, true)),
        );
        Ok(StoredDocument {
            id,
            created_at,
            fields,
        })
    }

    async fn list(&self, collection: &str) -> Result<Vec<StoredDocument>, StoreError> {
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = reqwest::Url::parse(&self.collection_url(collection))
                .map_err(|err| StoreError::Unavailable(format!("invalid firestore url: {err}")))?;
            url.query_pairs_mut()
                .append_pair("pageSize", &PAGE_SIZE.to_string());
            if let Some(token) = &page_token {
                url.query_pairs_mut().append_pair("pageToken", token);
            }

            let response = self
                .client
                .get(url)
                .bearer_auth(&self.access_token)
                .send()
                .await
                .map_err(|err| StoreError::Unavailable(err.to_string()))?;
            let body = read_body(response).await?;

            if let Some(page) = body.get("documents").and_then(Value::as_array) {
                for raw in page {
                    documents.push(decode_document(raw)?);
                }
            }

            page_token = body
                .get("nextPageToken")
                .and_then(Value::as_str)
                .filter(|token| !token.is_empty())
                .map(str::to_string);
            if page_token.is_none() {
                break;
            }
        }

        Ok(documents)
    }

    fn backend(&self) -> &'static str {
        "firestore"
    }
}

async fn read_body(response: reqwest::Response) -> Result<Value, StoreError> {
    let status = response.status();
    if !status.is_success() {
        let detail = error_detail(response).await;
        // Quota exhaustion and outages are transient; anything else is a bad request.
        return Err(match status.as_u16() {
            429 | 500..=599 => StoreError::Unavailable(format!("{status}: {detail}")),
            code => StoreError::Rejected {
                status: code,
                detail,
            },
        });
    }
    response
        .json()
        .await
        .map_err(|err| StoreError::Malformed(err.to_string()))
}

fn document_id(document: &Value) -> Result<DocumentId, StoreError> {
    document
        .get("name")
        .and_then(Value::as_str)
        .and_then(|name| name.rsplit('/').next())
        .filter(|id| !id.is_empty())
        .map(|id| DocumentId(id.to_string()))
        .ok_or_else(|| StoreError::Malformed("document without a name".to_string()))
}

/// Convert plain JSON fields into Firestore's typed value encoding.
pub fn encode_fields(fields: &DocumentFields) -> Map<String, Value> {
    fields
        .iter()
        .map(|(key, value)| (key.clone(), encode_value(value)))
        .collect()
}

fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(flag) => json!({ "booleanValue": flag }),
        Value::Number(number) => match number.as_i64() {
            Some(integer) => json!({ "integerValue": integer.to_string() }),
            None => json!({ "doubleValue": number.as_f64() }),
        },
        Value::String(text) => json!({ "stringValue": text }),
        Value::Array(items) => {
            json!({ "arrayValue": { "values": items.iter().map(encode_value).collect::<Vec<_>>() } })
        }
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

/// Convert a Firestore document resource back into plain JSON fields.
pub fn decode_document(document: &Value) -> Result<StoredDocument, StoreError> {
    let id = document_id(document)?;
    let fields = match document.get("fields").and_then(Value::as_object) {
        Some(raw) => decode_fields(raw),
        None => DocumentFields::new(),
    };

    let created_at = fields
        .get(CREATED_AT_FIELD)
        .and_then(Value::as_str)
        .or_else(|| document.get("createTime").and_then(Value::as_str))
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .ok_or_else(|| StoreError::Malformed(format!("document {id} has no creation time")))?;

    Ok(StoredDocument {
        id,
        created_at,
        fields,
    })
}

fn decode_fields(raw: &Map<String, Value>) -> DocumentFields {
    raw.iter()
        .map(|(key, value)| (key.clone(), decode_value(value)))
        .collect()
}

fn decode_value(value: &Value) -> Value {
    let Some((kind, inner)) = value.as_object().and_then(|typed| typed.iter().next()) else {
        return Value::Null;
    };

    match kind.as_str() {
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" | "booleanValue" => {
            inner.clone()
        }
        "integerValue" => inner
            .as_str()
            .and_then(|raw| raw.parse::<i64>().ok())
            .map(|integer| Value::Number(integer.into()))
            .unwrap_or_else(|| inner.clone()),
        "doubleValue" => inner
            .as_f64()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        "arrayValue" => Value::Array(
            inner
                .get("values")
                .and_then(Value::as_array)
                .map(|items| items.iter().map(decode_value).collect())
                .unwrap_or_default(),
        ),
        "mapValue" => Value::Object(
            inner
                .get("fields")
                .and_then(Value::as_object)
                .map(decode_fields)
                .unwrap_or_default(),
        ),
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_scalar_and_nested_values() {
        let fields = json!({
            "month": "January",
            "fundraising": 1200,
            "programs": 310.5,
            "tags": ["food"],
            "flag": true,
        });
        let encoded = encode_fields(fields.as_object().expect("object"));

        assert_eq!(encoded["month"], json!({ "stringValue": "January" }));
        assert_eq!(encoded["fundraising"], json!({ "integerValue": "1200" }));
        assert_eq!(encoded["programs"], json!({ "doubleValue": 310.5 }));
        assert_eq!(
            encoded["tags"],
            json!({ "arrayValue": { "values": [{ "stringValue": "food" }] } })
        );
        assert_eq!(encoded["flag"], json!({ "booleanValue": true }));
    }

    #[test]
    fn decodes_rest_document() {
        let raw = json!({
            "name": "projects/charity/databases/(default)/documents/spending/abc123",
            "fields": {
                "month": { "stringValue": "March" },
                "fundraising": { "integerValue": "900" },
                "education": { "doubleValue": 12.25 },
                "createdAt": { "timestampValue": "2024-03-01T10:00:00.000000Z" }
            },
            "createTime": "2024-03-01T10:00:01.000000Z"
        });

        let document = decode_document(&raw).expect("decodes");
        assert_eq!(document.id, DocumentId("abc123".to_string()));
        assert_eq!(document.fields["month"], json!("March"));
        assert_eq!(document.fields["fundraising"], json!(900));
        assert_eq!(document.fields["education"], json!(12.25));
        assert_eq!(
            document.created_at,
            DateTime::parse_from_rfc3339("2024-03-01T10:00:00Z")
                .expect("valid")
                .with_timezone(&Utc)
        );
    }

    #[test]
    fn falls_back_to_create_time() {
        let raw = json!({
            "name": "projects/charity/databases/(default)/documents/spending/seeded",
            "fields": { "month": { "stringValue": "April" } },
            "createTime": "2024-04-01T00:00:00Z"
        });
        let document = decode_document(&raw).expect("decodes");
        assert_eq!(document.id.0, "seeded");
        assert!(!document.fields.contains_key(CREATED_AT_FIELD));
    }

    #[test]
    fn rejects_document_without_name() {
        let raw = json!({ "fields": {} });
        assert!(matches!(
            decode_document(&raw),
            Err(StoreError::Malformed(_))
        ));
    }

    #[test]
    fn collection_url_targets_default_database() {
        let store = FirestoreStore::new(
            "https://firestore.googleapis.com/v1/",
            "charity",
            "token",
            Duration::from_secs(1),
        )
        .expect("client builds");
        assert_eq!(
            store.collection_url("contacts"),
            "https://firestore.googleapis.com/v1/projects/charity/databases/(default)/documents/contacts"
        );
    }
}
