//! Wire codec: frame classification, canonical encoding, `_meta` injection.
//!
//! The codec accepts a raw frame (one JSON value) and classifies it by
//! shape:
//!
//! - an array is a batch; each element is classified recursively
//! - an object with `method` and `id` is a request
//! - an object with `method` and no `id` is a notification
//! - an object with `id` and `result` or `error` is a response
//! - anything else is a malformed frame
//!
//! Outbound frames serialize with sorted keys (serde_json's default map
//! ordering) and no slash escaping, which keeps encoded frames diffable in
//! tests.

use crate::protocol::{
    Frame, Message, Notification, ProgressToken, Request, RequestId, Response, JSONRPC_VERSION,
};
use serde_json::{Map, Value};
use std::borrow::Cow;

/// Errors surfaced by the wire codec.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CodecError {
    /// The frame does not match any JSON-RPC 2.0 shape.
    #[error("malformed frame: {reason}")]
    MalformedFrame {
        /// Why classification failed.
        reason: String,
    },

    /// The `jsonrpc` field is present but not "2.0".
    #[error("unsupported JSON-RPC version: {version}")]
    UnsupportedJsonRpcVersion {
        /// The version string the frame carried.
        version: String,
    },

    /// The `id` field is neither an integer nor a string.
    #[error("invalid request id")]
    InvalidId,

    /// A batch frame contained no elements.
    #[error("empty batch")]
    EmptyBatch,
}

impl CodecError {
    fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedFrame {
            reason: reason.into(),
        }
    }
}

/// Decode a raw byte frame into a classified [`Frame`].
pub fn decode(bytes: &[u8]) -> Result<Frame, CodecError> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| CodecError::malformed(format!("invalid JSON: {e}")))?;
    classify(value)
}

/// Classify a parsed JSON value as a [`Frame`].
pub fn classify(value: Value) -> Result<Frame, CodecError> {
    match value {
        Value::Array(elements) => {
            if elements.is_empty() {
                return Err(CodecError::EmptyBatch);
            }
            let messages = elements
                .into_iter()
                .map(classify_message)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Frame::Batch(messages))
        }
        other => classify_message(other).map(Frame::Single),
    }
}

/// Classify a single (non-batch) JSON value as a [`Message`].
pub fn classify_message(value: Value) -> Result<Message, CodecError> {
    let Value::Object(mut object) = value else {
        return Err(CodecError::malformed("frame is not an object or array"));
    };

    match object.get("jsonrpc") {
        Some(Value::String(v)) if v == JSONRPC_VERSION => {}
        Some(Value::String(v)) => {
            return Err(CodecError::UnsupportedJsonRpcVersion { version: v.clone() });
        }
        Some(_) => return Err(CodecError::malformed("jsonrpc field is not a string")),
        None => return Err(CodecError::malformed("missing jsonrpc field")),
    }

    let id = match object.remove("id") {
        Some(v) => Some(parse_id(v)?),
        None => None,
    };
    let method = match object.remove("method") {
        Some(Value::String(m)) => Some(m),
        Some(_) => return Err(CodecError::malformed("method field is not a string")),
        None => None,
    };
    let params = object.remove("params");
    let result = object.remove("result");
    let error = object.remove("error");

    match (method, id) {
        (Some(method), Some(id)) => Ok(Message::Request(Request {
            jsonrpc: Cow::Borrowed(JSONRPC_VERSION),
            id,
            method: Cow::Owned(method),
            params,
        })),
        (Some(method), None) => Ok(Message::Notification(Notification {
            jsonrpc: Cow::Borrowed(JSONRPC_VERSION),
            method: Cow::Owned(method),
            params,
        })),
        (None, Some(id)) => match (result, error) {
            (Some(_), Some(_)) => Err(CodecError::malformed(
                "response carries both result and error",
            )),
            (Some(result), None) => Ok(Message::Response(Response {
                jsonrpc: Cow::Borrowed(JSONRPC_VERSION),
                id,
                result: Some(result),
                error: None,
            })),
            (None, Some(error)) => {
                let error = serde_json::from_value(error)
                    .map_err(|e| CodecError::malformed(format!("invalid error object: {e}")))?;
                Ok(Message::Response(Response {
                    jsonrpc: Cow::Borrowed(JSONRPC_VERSION),
                    id,
                    result: None,
                    error: Some(error),
                }))
            }
            (None, None) => Err(CodecError::malformed(
                "frame carries an id but neither method, result, nor error",
            )),
        },
        (None, None) => Err(CodecError::malformed("frame carries neither method nor id")),
    }
}

fn parse_id(value: Value) -> Result<RequestId, CodecError> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(RequestId::Number)
            .ok_or(CodecError::InvalidId),
        Value::String(s) => Ok(RequestId::String(s)),
        _ => Err(CodecError::InvalidId),
    }
}

/// Encode a frame to its canonical wire form.
///
/// serde_json's default `Map` is ordered, so object keys serialize sorted;
/// forward slashes are never escaped.
#[must_use]
pub fn encode(frame: &Frame) -> String {
    serde_json::to_string(frame).expect("frames always serialize")
}

/// Build the raw error response frame for a frame that failed
/// classification.
///
/// Byte-level transports answer undecodable input with this value; the id
/// is `null` because no request id could be recovered. Returns `None` for
/// errors that must not produce a response (an unparseable id would
/// otherwise mint a response for a request that cannot be correlated).
#[must_use]
pub fn error_frame(error: &CodecError) -> Option<Value> {
    let (code, message) = match error {
        CodecError::MalformedFrame { reason } => (-32700, format!("Parse error: {reason}")),
        CodecError::UnsupportedJsonRpcVersion { version } => (
            -32600,
            format!("Invalid request: unsupported JSON-RPC version {version}"),
        ),
        CodecError::EmptyBatch => (-32600, "Invalid request: empty batch".to_string()),
        CodecError::InvalidId => return None,
    };
    Some(serde_json::json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": Value::Null,
        "error": {"code": code, "message": message},
    }))
}

/// Merge a progress token and extra metadata entries into `params._meta`.
///
/// Creates `params` as an empty object when absent; creates `_meta` when
/// absent; supplied keys overwrite collisions. No other field of `params`
/// is touched.
pub fn inject_meta(
    params: &mut Option<Value>,
    progress_token: Option<&ProgressToken>,
    extra: Option<&Map<String, Value>>,
) {
    if progress_token.is_none() && extra.is_none_or(Map::is_empty) {
        return;
    }

    let params = params.get_or_insert_with(|| Value::Object(Map::new()));
    if !params.is_object() {
        // Array or scalar params cannot carry _meta; leave them untouched.
        return;
    }
    let object = params.as_object_mut().expect("checked above");
    let meta = object
        .entry("_meta")
        .or_insert_with(|| Value::Object(Map::new()));
    let Some(meta) = meta.as_object_mut() else {
        return;
    };

    if let Some(token) = progress_token {
        meta.insert(
            "progressToken".to_string(),
            serde_json::to_value(token).expect("tokens always serialize"),
        );
    }
    if let Some(extra) = extra {
        for (key, value) in extra {
            meta.insert(key.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_classify_request() {
        let frame = classify(json!({"jsonrpc": "2.0", "id": 1, "method": "ping"})).unwrap();
        let Frame::Single(Message::Request(req)) = frame else {
            panic!("expected request");
        };
        assert_eq!(req.method(), "ping");
        assert_eq!(req.id, RequestId::Number(1));
    }

    #[test]
    fn test_classify_notification() {
        let frame = classify(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
            .unwrap();
        assert!(matches!(
            frame,
            Frame::Single(Message::Notification(_))
        ));
    }

    #[test]
    fn test_classify_response() {
        let frame = classify(json!({"jsonrpc": "2.0", "id": "a", "result": {}})).unwrap();
        let Frame::Single(Message::Response(resp)) = frame else {
            panic!("expected response");
        };
        assert!(resp.is_success());

        let frame = classify(json!({
            "jsonrpc": "2.0",
            "id": 2,
            "error": {"code": -32601, "message": "nope"}
        }))
        .unwrap();
        let Frame::Single(Message::Response(resp)) = frame else {
            panic!("expected response");
        };
        assert_eq!(resp.error.unwrap().code, -32601);
    }

    #[test]
    fn test_classify_batch() {
        let frame = classify(json!([
            {"jsonrpc": "2.0", "id": 1, "method": "a"},
            {"jsonrpc": "2.0", "method": "b"}
        ]))
        .unwrap();
        let Frame::Batch(messages) = frame else {
            panic!("expected batch");
        };
        assert_eq!(messages.len(), 2);
        assert!(messages[0].is_request());
        assert!(messages[1].is_notification());
    }

    #[test]
    fn test_empty_batch_rejected() {
        assert!(matches!(classify(json!([])), Err(CodecError::EmptyBatch)));
    }

    #[test]
    fn test_wrong_version_rejected() {
        let err = classify(json!({"jsonrpc": "1.0", "id": 1, "method": "a"})).unwrap_err();
        assert!(matches!(
            err,
            CodecError::UnsupportedJsonRpcVersion { version } if version == "1.0"
        ));
    }

    #[test]
    fn test_missing_version_rejected() {
        assert!(matches!(
            classify(json!({"id": 1, "method": "a"})),
            Err(CodecError::MalformedFrame { .. })
        ));
    }

    #[test]
    fn test_bad_id_rejected() {
        assert!(matches!(
            classify(json!({"jsonrpc": "2.0", "id": 1.5, "method": "a"})),
            Err(CodecError::InvalidId)
        ));
        assert!(matches!(
            classify(json!({"jsonrpc": "2.0", "id": null, "method": "a"})),
            Err(CodecError::InvalidId)
        ));
    }

    #[test]
    fn test_result_and_error_rejected() {
        assert!(matches!(
            classify(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": {},
                "error": {"code": 0, "message": ""}
            })),
            Err(CodecError::MalformedFrame { .. })
        ));
    }

    #[test]
    fn test_canonical_encoding_sorted_keys() {
        let request = Request::with_params("b/a", 1, json!({"zulu": 1, "alpha": 2}));
        let encoded = encode(&Frame::from(request));
        // Keys of params come out sorted; slashes unescaped.
        assert!(encoded.contains(r#"{"alpha":2,"zulu":1}"#));
        assert!(encoded.contains("b/a"));
        assert!(!encoded.contains("b\\/a"));
    }

    #[test]
    fn test_inject_meta_creates_params() {
        let mut params = None;
        inject_meta(&mut params, Some(&ProgressToken::Number(7)), None);
        assert_eq!(
            params.unwrap(),
            json!({"_meta": {"progressToken": 7}})
        );
    }

    #[test]
    fn test_inject_meta_preserves_siblings() {
        let mut params = Some(json!({"name": "search", "_meta": {"keep": true}}));
        let mut extra = Map::new();
        extra.insert("custom".to_string(), json!("x"));
        inject_meta(&mut params, Some(&ProgressToken::String("p".into())), Some(&extra));
        assert_eq!(
            params.unwrap(),
            json!({
                "name": "search",
                "_meta": {"keep": true, "progressToken": "p", "custom": "x"}
            })
        );
    }

    #[test]
    fn test_inject_meta_overwrites_collisions() {
        let mut params = Some(json!({"_meta": {"progressToken": "old"}}));
        inject_meta(&mut params, Some(&ProgressToken::String("new".into())), None);
        assert_eq!(
            params.unwrap(),
            json!({"_meta": {"progressToken": "new"}})
        );
    }

    #[test]
    fn test_inject_meta_noop_without_entries() {
        let mut params = None;
        inject_meta(&mut params, None, None);
        assert!(params.is_none());
    }

    #[test]
    fn test_error_frame_for_empty_batch() {
        let frame = error_frame(&CodecError::EmptyBatch).unwrap();
        assert_eq!(frame["id"], Value::Null);
        assert_eq!(frame["error"]["code"], json!(-32600));
    }

    #[test]
    fn test_error_frame_shapes() {
        let frame = error_frame(&CodecError::malformed("not json")).unwrap();
        assert_eq!(frame["error"]["code"], json!(-32700));

        // An unparseable id cannot be answered.
        assert!(error_frame(&CodecError::InvalidId).is_none());
    }

    #[test]
    fn test_decode_roundtrip() {
        let frame = decode(br#"{"jsonrpc":"2.0","id":3,"method":"tasks/get","params":{}}"#).unwrap();
        let encoded = encode(&frame);
        assert_eq!(
            encoded,
            r#"{"jsonrpc":"2.0","id":3,"method":"tasks/get","params":{}}"#
        );
    }
}
