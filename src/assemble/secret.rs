use k8s_openapi::api::core::v1::Secret;

use crate::model::SecretMaterial;

/// Classifies a secret as TLS cert+key material or a JWK, or `None` if it
/// validates as neither (design note §9: secret kind is a tagged union
/// produced by the assembler, not detected ad hoc downstream).
pub fn classify(secret: &Secret) -> Option<SecretMaterial> {
    let data = secret.data.as_ref()?;
    if let (Some(cert), Some(key)) = (data.get("tls.crt"), data.get("tls.key")) {
        if !cert.0.is_empty() && !key.0.is_empty() {
            return Some(SecretMaterial::Tls {
                cert: cert.0.clone(),
                key: key.0.clone(),
            });
        }
    }
    if let Some(key) = data.get("jwk") {
        if !key.0.is_empty() {
            return Some(SecretMaterial::Jwk { key: key.0.clone() });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::ByteString;
    use std::collections::BTreeMap;

    fn secret_with(data: BTreeMap<String, ByteString>) -> Secret {
        Secret {
            data: Some(data),
            ..Default::default()
        }
    }

    #[test]
    fn classifies_tls_secret() {
        let mut data = BTreeMap::new();
        data.insert("tls.crt".to_string(), ByteString(b"cert".to_vec()));
        data.insert("tls.key".to_string(), ByteString(b"key".to_vec()));
        assert!(matches!(
            classify(&secret_with(data)),
            Some(SecretMaterial::Tls { .. })
        ));
    }

    #[test]
    fn classifies_jwk_secret() {
        let mut data = BTreeMap::new();
        data.insert("jwk".to_string(), ByteString(b"{}".to_vec()));
        assert!(matches!(
            classify(&secret_with(data)),
            Some(SecretMaterial::Jwk { .. })
        ));
    }

    #[test]
    fn rejects_incomplete_tls_secret() {
        let mut data = BTreeMap::new();
        data.insert("tls.crt".to_string(), ByteString(b"cert".to_vec()));
        assert_eq!(classify(&secret_with(data)), None);
    }
}
