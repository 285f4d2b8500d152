use crate::error::{Error, Result};
use crate::types::ClientDraft;

const SECRET_BYTES: usize = 32;

/// Client configuration derived from a domain, without a secret.
pub fn template(domain: &str) -> ClientDraft {
    let client_url = format!("https://{domain}");
    ClientDraft {
        client_id: domain.to_string(),
        client_secret: String::new(),
        root_url: client_url.clone(),
        admin_url: client_url.clone(),
        redirect_uris: vec![format!("{client_url}/*")],
        web_origins: vec![client_url],
        name: domain.to_string(),
        id: None,
        description: String::new(),
    }
}

/// Build the full client configuration for a domain with a new random secret.
///
/// The secret comes from the operating system CSPRNG. There is no fallback source: if it
/// fails, the draft is not produced.
pub fn generate(domain: &str) -> Result<ClientDraft> {
    let mut key = [0u8; SECRET_BYTES];
    getrandom::fill(&mut key).map_err(|e| Error::Entropy(e.to_string()))?;
    Ok(ClientDraft {
        client_secret: hex::encode(key),
        ..template(domain)
    })
}
