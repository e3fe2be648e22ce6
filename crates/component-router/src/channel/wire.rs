//! Wire frames exchanged with components.
//!
//! Request: `{reqid, rpc, hasSalt, data}` where `data` is the encrypted JSON
//! parameter object. Response: `{reqid, response}` where `response` is the
//! encrypted JSON body.

use crate::domain::{PendingRequest, RequestId};
use crate::ports::{CipherError, PayloadCipher};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field of a response frame holding the encrypted body.
pub const RESPONSE_FIELD: &str = "response";

/// Field holding the request id in both directions.
pub const REQUEST_ID_FIELD: &str = "reqid";

/// Outbound request frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRequest {
    pub reqid: RequestId,
    pub rpc: String,
    #[serde(rename = "hasSalt")]
    pub has_salt: bool,
    pub data: String,
}

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("cannot encode parameters: {0}")]
    Encode(#[source] serde_json::Error),

    #[error(transparent)]
    Cipher(#[from] CipherError),

    #[error("response body is not valid JSON: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("response field is not a string")]
    NotText,
}

/// Encode `request` as a request frame.
pub fn encode_request(
    request: &PendingRequest,
    has_salt: bool,
    cipher: &dyn PayloadCipher,
) -> Result<Value, WireError> {
    let plaintext = match &request.params {
        Some(params) => serde_json::to_string(params).map_err(WireError::Encode)?,
        None => "{}".to_owned(),
    };
    let frame = WireRequest {
        reqid: request.request_id,
        rpc: request.rpc.clone(),
        has_salt,
        data: cipher.encrypt(&plaintext)?,
    };
    serde_json::to_value(frame).map_err(WireError::Encode)
}

/// Request id of an inbound frame, if present and valid.
pub fn response_id(frame: &Value) -> Option<RequestId> {
    frame
        .get(REQUEST_ID_FIELD)
        .and_then(Value::as_i64)
        .and_then(|id| RequestId::try_from(id).ok())
}

/// Decrypt and parse the body of a response frame. Frames without a
/// `response` field are returned unchanged.
pub fn decode_body(frame: Value, cipher: &dyn PayloadCipher) -> Result<Value, WireError> {
    let Some(encrypted) = frame.get(RESPONSE_FIELD) else {
        return Ok(frame);
    };
    let ciphertext = encrypted.as_str().ok_or(WireError::NotText)?;
    let plaintext = cipher.decrypt(ciphertext)?;
    serde_json::from_str(&plaintext).map_err(WireError::Decode)
}
