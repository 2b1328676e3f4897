//! AWS Signature Version 4 browser-based POST policies.
//!
//! The SDK presigns single requests only, so form-upload descriptors are
//! assembled here: a JSON policy listing the upload conditions is base64
//! encoded and signed with the SigV4 signing key derived for the `s3` service.

use super::{PostPolicyRequest, StorageError};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use std::collections::BTreeMap;

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "s3";

/// Credentials used to sign a policy
#[derive(Debug, Clone)]
pub struct SigningCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

/// Build the form fields of a presigned POST for `bucket` in `region`, signed at `now`.
pub fn sign_post_policy(
    request: &PostPolicyRequest,
    bucket: &str,
    region: &str,
    credentials: &SigningCredentials,
    now: DateTime<Utc>,
) -> Result<BTreeMap<String, String>, StorageError> {
    let ttl = chrono::Duration::from_std(request.expires_in).map_err(|e| {
        StorageError::Presign {
            operation: "POST",
            key: request.key.clone(),
            message: e.to_string(),
        }
    })?;
    let expiration = now + ttl;

    let date_stamp = now.format("%Y%m%d").to_string();
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let credential = format!(
        "{}/{}/{}/{}/aws4_request",
        credentials.access_key_id, date_stamp, region, SERVICE
    );

    let mut conditions = vec![
        json!({ "bucket": bucket }),
        json!({ "key": request.key }),
        json!({ "Content-Type": request.content_type }),
        json!(["content-length-range", 0, request.max_content_length]),
        json!(["eq", "$Content-Type", request.content_type]),
        json!({ "x-amz-algorithm": ALGORITHM }),
        json!({ "x-amz-credential": credential }),
        json!({ "x-amz-date": amz_date }),
    ];
    if let Some(ref token) = credentials.session_token {
        conditions.push(json!({ "x-amz-security-token": token }));
    }

    let policy: Value = json!({
        "expiration": expiration.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
        "conditions": conditions,
    });
    let encoded_policy = STANDARD.encode(policy.to_string());

    let signing_key = derive_signing_key(&credentials.secret_access_key, &date_stamp, region, SERVICE);
    let signature = hex::encode(hmac_sha256(&signing_key, encoded_policy.as_bytes()));

    let mut fields = BTreeMap::new();
    fields.insert("bucket".to_string(), bucket.to_string());
    fields.insert("key".to_string(), request.key.clone());
    fields.insert("Content-Type".to_string(), request.content_type.clone());
    fields.insert("Policy".to_string(), encoded_policy);
    fields.insert("X-Amz-Algorithm".to_string(), ALGORITHM.to_string());
    fields.insert("X-Amz-Credential".to_string(), credential);
    fields.insert("X-Amz-Date".to_string(), amz_date);
    fields.insert("X-Amz-Signature".to_string(), signature);
    if let Some(ref token) = credentials.session_token {
        fields.insert("X-Amz-Security-Token".to_string(), token.clone());
    }

    Ok(fields)
}

/// SigV4 signing key: HMAC chain over date, region, service and terminator
pub fn derive_signing_key(secret: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{secret}").as_bytes(), date_stamp.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}
