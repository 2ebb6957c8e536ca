//! A secret change resolves to the ingresses naming it in a TLS section or
//! a JWT-key annotation, and re-enqueues those (design doc §4.1, §4.3).
//! The default-server secret was already special-cased by the dispatcher,
//! which also enqueues a ConfigMap task. Writing or removing the secret's
//! material file (§4.8) happens here, keyed the same way `FileWriter`
//! keys ingress config files.

use log::warn;

use crate::assemble::secret::classify;
use crate::context::Context;
use crate::error::Error;
use crate::model::SecretMaterial;
use crate::queue::{Kind, Task};

pub async fn sync(ctx: &Context, namespace: &str, name: &str) -> Result<(), Error> {
    let is_default_server_secret = ctx
        .config
        .default_server_secret
        .as_ref()
        .is_some_and(|(ns, n)| ns == namespace && n == name);
    let path = if is_default_server_secret {
        ctx.writer.default_secret_path()
    } else {
        ctx.writer.secret_path(namespace, name)
    };

    match ctx.cache.get_secret(namespace, name).and_then(|s| classify(&s)) {
        Some(SecretMaterial::Tls { cert, key }) => {
            let mut combined = cert;
            combined.extend_from_slice(&key);
            ctx.writer.write_secret(&path, &combined, 0o600).await?;
        }
        Some(SecretMaterial::Jwk { key }) => {
            ctx.writer.write_secret(&path, &key, 0o644).await?;
        }
        None => {
            warn!("secret {namespace}/{name} missing or not a recognized TLS/JWK secret, removing {}", path.display());
            ctx.writer.remove_secret(&path).await?;
        }
    }

    for (ns, ing_name) in ctx.cache.ingresses_referencing_secret(namespace, name) {
        ctx.queue.add(Task::new(Kind::Ingress, &ns, &ing_name)).await;
    }
    Ok(())
}
