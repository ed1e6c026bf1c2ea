use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha512;
use std::collections::{BTreeMap, HashMap};

use crate::config::Config;
use crate::error::AppError;

type HmacSha512 = Hmac<Sha512>;

/// Response code the payment gateway uses for an approved transaction.
pub const APPROVED: &str = "00";

const SIGNATURE_PARAM: &str = "signature";
const PAYMENT_WINDOW_MINUTES: i64 = 15;

/// Everything the callback needs to finish (or abandon) a purchase started
/// on the gateway path, carried through the external payer as one opaque
/// token. The ids are ours; the payer never interprets them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDescriptor {
    pub user_id: i64,
    pub event_id: i64,
    pub seat_ids: Vec<i64>,
    pub category_ids: Vec<i64>,
    pub hold_ticket_ids: Vec<i64>,
}

impl OrderDescriptor {
    pub fn encode(&self) -> String {
        let raw = format!(
            "user_id={}&event_id={}&seat_ids={}&category_ids={}&ticket_ids={}",
            self.user_id,
            self.event_id,
            join_ids(&self.seat_ids),
            join_ids(&self.category_ids),
            join_ids(&self.hold_ticket_ids),
        );
        URL_SAFE_NO_PAD.encode(raw)
    }

    pub fn decode(token: &str) -> Result<Self, AppError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| AppError::BadRequest("malformed order reference".to_string()))?;
        let raw = String::from_utf8(bytes)
            .map_err(|_| AppError::BadRequest("malformed order reference".to_string()))?;

        let mut fields: HashMap<&str, &str> = HashMap::new();
        for pair in raw.split('&') {
            if let Some((k, v)) = pair.split_once('=') {
                fields.insert(k, v);
            }
        }

        let descriptor = OrderDescriptor {
            user_id: parse_field(&fields, "user_id")?,
            event_id: parse_field(&fields, "event_id")?,
            seat_ids: parse_id_list(&fields, "seat_ids")?,
            category_ids: parse_id_list(&fields, "category_ids")?,
            hold_ticket_ids: parse_id_list(&fields, "ticket_ids")?,
        };

        if descriptor.hold_ticket_ids.is_empty() || descriptor.seat_ids.is_empty() {
            return Err(AppError::BadRequest(
                "order reference carries no seats/tickets".to_string(),
            ));
        }

        Ok(descriptor)
    }
}

fn join_ids(ids: &[i64]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_field(fields: &HashMap<&str, &str>, key: &str) -> Result<i64, AppError> {
    fields
        .get(key)
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| AppError::BadRequest(format!("order reference missing {}", key)))
}

fn parse_id_list(fields: &HashMap<&str, &str>, key: &str) -> Result<Vec<i64>, AppError> {
    let raw = fields
        .get(key)
        .ok_or_else(|| AppError::BadRequest(format!("order reference missing {}", key)))?;

    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse()
                .map_err(|_| AppError::BadRequest(format!("bad id in {}", key)))
        })
        .collect()
}

/// Client for the external payment redirect gateway: builds the signed
/// payer URL for phase one and verifies the signed return in phase two.
#[derive(Clone)]
pub struct GatewayClient {
    pay_url: String,
    merchant_code: String,
    hash_secret: String,
    return_url: String,
}

impl GatewayClient {
    pub fn new(config: &Config) -> Self {
        Self {
            pay_url: config.gateway_pay_url.clone(),
            merchant_code: config.gateway_merchant_code.clone(),
            hash_secret: config.gateway_hash_secret.clone(),
            return_url: config.gateway_return_url.clone(),
        }
    }

    /// The full redirect URL for the payer. `amount` is in major units and
    /// goes on the wire in minor units (x100), which is what the gateway
    /// protocol expects for a zero-decimal display currency.
    pub fn payment_url(
        &self,
        txn_ref: &str,
        amount_major: i64,
        order_token: &str,
        client_ip: &str,
        now: DateTime<Utc>,
    ) -> String {
        let create_date = now.format("%Y%m%d%H%M%S").to_string();
        let expire_date = (now + Duration::minutes(PAYMENT_WINDOW_MINUTES))
            .format("%Y%m%d%H%M%S")
            .to_string();

        let mut params = BTreeMap::new();
        params.insert("version", "2.1.0".to_string());
        params.insert("command", "pay".to_string());
        params.insert("merchant", self.merchant_code.clone());
        params.insert("amount", (amount_major * 100).to_string());
        params.insert("currency", "VND".to_string());
        params.insert("txn_ref", txn_ref.to_string());
        params.insert("order_info", order_token.to_string());
        params.insert("return_url", self.return_url.clone());
        params.insert("create_date", create_date);
        params.insert("expire_date", expire_date);
        params.insert("ip_addr", client_ip.to_string());

        let canonical = canonical_query(params.iter().map(|(k, v)| (*k, v.as_str())));
        let signature = self.sign(&canonical);

        format!(
            "{}?{}&{}={}",
            self.pay_url, canonical, SIGNATURE_PARAM, signature
        )
    }

    /// Verifies the gateway's return parameters: strips the signature,
    /// re-canonicalizes the rest and compares HMACs. The params are only
    /// trustworthy after this passes.
    pub fn verify_return(&self, params: &HashMap<String, String>) -> Result<(), AppError> {
        let presented = params
            .get(SIGNATURE_PARAM)
            .ok_or_else(|| AppError::BadRequest("missing gateway signature".to_string()))?;

        let signable: BTreeMap<&str, &str> = params
            .iter()
            .filter(|(k, _)| k.as_str() != SIGNATURE_PARAM && k.as_str() != "signature_type")
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        let canonical = canonical_query(signable.into_iter());

        let mut mac = HmacSha512::new_from_slice(self.hash_secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(canonical.as_bytes());

        let presented_bytes = hex::decode(presented)
            .map_err(|_| AppError::BadRequest("malformed gateway signature".to_string()))?;

        mac.verify_slice(&presented_bytes)
            .map_err(|_| AppError::BadRequest("invalid gateway signature".to_string()))
    }

    fn sign(&self, canonical: &str) -> String {
        let mut mac = HmacSha512::new_from_slice(self.hash_secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(canonical.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

/// Sorted `key=url-encoded-value` pairs joined with `&`. Both sides of the
/// integration must produce this byte-for-byte for signatures to match.
fn canonical_query<'a>(sorted_pairs: impl Iterator<Item = (&'a str, &'a str)>) -> String {
    sorted_pairs
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| {
            let encoded: String = url::form_urlencoded::byte_serialize(v.as_bytes()).collect();
            format!("{}={}", k, encoded)
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Client IP for the gateway's fraud checks: first X-Forwarded-For hop,
/// then X-Real-IP, else the placeholder the gateway accepts for unknown.
pub fn client_ip(headers: &axum::http::HeaderMap) -> String {
    if let Some(fwd) = headers.get("x-forwarded-for").and_then(|h| h.to_str().ok()) {
        if let Some(first) = fwd.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| "0.0.0.0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> GatewayClient {
        GatewayClient {
            pay_url: "https://pay.example.test/checkout".to_string(),
            merchant_code: "UNI_EVENTS".to_string(),
            hash_secret: "super-secret".to_string(),
            return_url: "http://localhost:3000/api/payment/return".to_string(),
        }
    }

    fn signed_return_params(client: &GatewayClient) -> HashMap<String, String> {
        let mut params: HashMap<String, String> = HashMap::new();
        params.insert("amount".to_string(), "70000000".to_string());
        params.insert("response_code".to_string(), "00".to_string());
        params.insert("txn_ref".to_string(), "abc123".to_string());
        params.insert("order_info".to_string(), "dG9rZW4".to_string());

        let signable: BTreeMap<&str, &str> =
            params.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        let canonical = canonical_query(signable.into_iter());
        let signature = client.sign(&canonical);
        params.insert(SIGNATURE_PARAM.to_string(), signature);
        params
    }

    #[test]
    fn verify_accepts_own_signature() {
        let client = test_client();
        let params = signed_return_params(&client);
        assert!(client.verify_return(&params).is_ok());
    }

    #[test]
    fn verify_rejects_tampered_amount() {
        let client = test_client();
        let mut params = signed_return_params(&client);
        params.insert("amount".to_string(), "100".to_string());
        assert!(client.verify_return(&params).is_err());
    }

    #[test]
    fn verify_rejects_missing_signature() {
        let client = test_client();
        let mut params = signed_return_params(&client);
        params.remove(SIGNATURE_PARAM);
        assert!(client.verify_return(&params).is_err());
    }

    #[test]
    fn descriptor_decode_recovers_fields() {
        let descriptor = OrderDescriptor {
            user_id: 7,
            event_id: 1,
            seat_ids: vec![1, 2],
            category_ids: vec![3, 4],
            hold_ticket_ids: vec![10, 11],
        };

        let decoded = OrderDescriptor::decode(&descriptor.encode()).unwrap();
        assert_eq!(decoded, descriptor);
    }

    #[test]
    fn descriptor_rejects_garbage() {
        assert!(OrderDescriptor::decode("not base64 at all!!!").is_err());

        let empty = URL_SAFE_NO_PAD.encode("user_id=1&event_id=2&seat_ids=&category_ids=&ticket_ids=");
        assert!(OrderDescriptor::decode(&empty).is_err());
    }

    #[test]
    fn payment_url_is_signed_and_carries_minor_units() {
        let client = test_client();
        let now = DateTime::parse_from_rfc3339("2025-06-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let url = client.payment_url("ref-1", 700_000, "token", "10.0.0.1", now);
        assert!(url.starts_with("https://pay.example.test/checkout?"));
        assert!(url.contains("amount=70000000"));
        assert!(url.contains(&format!("{}=", SIGNATURE_PARAM)));
    }
}
