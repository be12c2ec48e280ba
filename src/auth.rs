//! Tokens de acceso firmados (HMAC-SHA256 sobre claims JSON) y verificación
//! de claves de administración. Los endpoints de escritura (upsert de FAQs,
//! alta de documentos, ingesta) exigen clave de administración; el chat
//! exige un token de portador vigente.

use axum::http::HeaderMap;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

use crate::config::AppConfig;
use crate::models::TokenClaims;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Faltan credenciales")]
    MissingCredentials,
    #[error("Token inválido")]
    InvalidToken,
    #[error("Token expirado")]
    ExpiredToken,
    #[error("Clave de administración inválida o ausente")]
    InvalidAdminKey,
}

/// Emite un token `payload.firma` con ambos segmentos en base64url sin
/// padding. El payload son los claims serializados en JSON.
pub fn create_token(secret: &str, sub: &str, role: &str, ttl_seconds: i64) -> String {
    let now = Utc::now().timestamp();
    let claims = TokenClaims {
        sub: sub.to_string(),
        role: role.to_string(),
        iat: now,
        exp: now + ttl_seconds,
    };
    sign_claims(secret, &claims)
}

fn sign_claims(secret: &str, claims: &TokenClaims) -> String {
    // La serialización de claims propios no puede fallar.
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap_or_default());
    let signature = URL_SAFE_NO_PAD.encode(hmac_bytes(secret, payload.as_bytes()));
    format!("{payload}.{signature}")
}

fn hmac_bytes(secret: &str, data: &[u8]) -> Vec<u8> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC acepta claves de cualquier longitud");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Verifica firma y expiración de un token y devuelve sus claims.
pub fn verify_token(secret: &str, token: &str) -> Result<TokenClaims, AuthError> {
    let (payload, signature) = token.split_once('.').ok_or(AuthError::InvalidToken)?;

    let provided = URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|_| AuthError::InvalidToken)?;
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::InvalidToken)?;
    mac.update(payload.as_bytes());
    // Comparación en tiempo constante.
    mac.verify_slice(&provided).map_err(|_| AuthError::InvalidToken)?;

    let claims_bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| AuthError::InvalidToken)?;
    let claims: TokenClaims =
        serde_json::from_slice(&claims_bytes).map_err(|_| AuthError::InvalidToken)?;

    if claims.exp <= Utc::now().timestamp() {
        return Err(AuthError::ExpiredToken);
    }
    Ok(claims)
}

/// Extrae y verifica el token de portador de la cabecera `Authorization`.
pub fn bearer_claims(cfg: &AppConfig, headers: &HeaderMap) -> Result<TokenClaims, AuthError> {
    let header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingCredentials)?;

    let token = header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .ok_or(AuthError::MissingCredentials)?;

    verify_token(&cfg.token_secret, token.trim())
}

/// Comprueba la cabecera `X-Api-Key` contra las claves de administración
/// configuradas. Sin claves configuradas todo acceso administrativo se
/// rechaza.
pub fn require_admin_key(cfg: &AppConfig, headers: &HeaderMap) -> Result<(), AuthError> {
    let provided = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::InvalidAdminKey)?;

    if cfg.admin_api_keys.iter().any(|k| k == provided) {
        Ok(())
    } else {
        Err(AuthError::InvalidAdminKey)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn token_roundtrip_preserves_claims() {
        let token = create_token("secreto", "alice", "admin", 60);
        let claims = verify_token("secreto", &token).unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.role, "admin");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn tampered_token_is_rejected() {
        let token = create_token("secreto", "alice", "user", 60);
        let mut tampered = token.clone();
        tampered.push('x');
        assert_eq!(verify_token("secreto", &tampered), Err(AuthError::InvalidToken));

        // Firmado con otro secreto.
        assert_eq!(verify_token("otro", &token), Err(AuthError::InvalidToken));
        assert_eq!(verify_token("secreto", "no-un-token"), Err(AuthError::InvalidToken));
    }

    #[test]
    fn expired_token_is_rejected() {
        let claims = TokenClaims {
            sub: "alice".into(),
            role: "user".into(),
            iat: Utc::now().timestamp() - 120,
            exp: Utc::now().timestamp() - 60,
        };
        let token = sign_claims("secreto", &claims);
        assert_eq!(verify_token("secreto", &token), Err(AuthError::ExpiredToken));
    }

    #[test]
    fn admin_key_checked_against_configured_list() {
        let mut cfg = crate::config::AppConfig::from_env().unwrap();
        cfg.admin_api_keys = vec!["clave-1".into()];

        let mut headers = HeaderMap::new();
        assert_eq!(
            require_admin_key(&cfg, &headers),
            Err(AuthError::InvalidAdminKey)
        );

        headers.insert("x-api-key", HeaderValue::from_static("clave-1"));
        assert!(require_admin_key(&cfg, &headers).is_ok());

        headers.insert("x-api-key", HeaderValue::from_static("clave-mala"));
        assert_eq!(
            require_admin_key(&cfg, &headers),
            Err(AuthError::InvalidAdminKey)
        );
    }

    #[test]
    fn bearer_header_is_required_for_claims() {
        let cfg = crate::config::AppConfig::from_env().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(
            bearer_claims(&cfg, &headers),
            Err(AuthError::MissingCredentials)
        );

        let token = create_token(&cfg.token_secret, "bob", "user", 60);
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        assert_eq!(bearer_claims(&cfg, &headers).unwrap().sub, "bob");
    }
}
