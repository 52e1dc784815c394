//! Presigned POST policies (AWS Signature Version 4)
//!
//! A browser-style upload submits a multipart form whose fields carry a
//! base64 policy document and its signature. S3 accepts the upload only when
//! every field and the file length satisfy the policy's conditions.
//!
//! ```text
//! kDate    = HMAC("AWS4" + secret, yyyymmdd)
//! kRegion  = HMAC(kDate, region)
//! kService = HMAC(kRegion, "s3")
//! kSigning = HMAC(kService, "aws4_request")
//! signature = hex(HMAC(kSigning, base64(policy)))
//! ```

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use std::collections::HashMap;

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Everything needed to sign one POST policy
#[derive(Debug, Clone)]
pub struct PostPolicyRequest<'a> {
    pub bucket: &'a str,
    pub key: &'a str,
    pub region: &'a str,
    pub access_key: &'a str,
    pub secret_key: &'a str,
    /// Exact-match form fields (Content-Type, x-amz-meta-*)
    pub fields: &'a [(&'a str, &'a str)],
    pub min_length: u64,
    pub max_length: u64,
    pub expires_in: u32,
    pub now: DateTime<Utc>,
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Derive the SigV4 signing key for a date stamp (`yyyymmdd`), region and service
pub fn signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{}", secret_key).as_bytes(), date_stamp.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// Build the policy document and return the complete form field set
pub fn sign_post_policy(request: &PostPolicyRequest<'_>) -> HashMap<String, String> {
    let date_stamp = request.now.format("%Y%m%d").to_string();
    let amz_date = request.now.format("%Y%m%dT%H%M%SZ").to_string();
    let credential = format!(
        "{}/{}/{}/s3/aws4_request",
        request.access_key, date_stamp, request.region
    );
    let expiration = (request.now + Duration::seconds(i64::from(request.expires_in)))
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string();

    let mut conditions: Vec<Value> = vec![
        json!({ "bucket": request.bucket }),
        json!({ "key": request.key }),
    ];
    for (name, value) in request.fields {
        let mut condition = serde_json::Map::new();
        condition.insert(name.to_string(), Value::String(value.to_string()));
        conditions.push(Value::Object(condition));
    }
    conditions.push(json!(["content-length-range", request.min_length, request.max_length]));
    conditions.push(json!({ "x-amz-algorithm": ALGORITHM }));
    conditions.push(json!({ "x-amz-credential": credential }));
    conditions.push(json!({ "x-amz-date": amz_date }));

    let policy = json!({
        "expiration": expiration,
        "conditions": conditions,
    });
    let encoded_policy = BASE64.encode(policy.to_string());

    let key = signing_key(request.secret_key, &date_stamp, request.region, "s3");
    let signature = hex::encode(hmac_sha256(&key, encoded_policy.as_bytes()));

    let mut form: HashMap<String, String> = request
        .fields
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    form.insert("key".to_string(), request.key.to_string());
    form.insert("x-amz-algorithm".to_string(), ALGORITHM.to_string());
    form.insert("x-amz-credential".to_string(), credential);
    form.insert("x-amz-date".to_string(), amz_date);
    form.insert("policy".to_string(), encoded_policy);
    form.insert("x-amz-signature".to_string(), signature);
    form
}
