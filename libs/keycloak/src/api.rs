use crate::error::Result;
use crate::types::{Client, ClientDetails, ClientDraft};

/// Client management operations of a realm.
///
/// Every operation reports a missing resource as [`Error::NotFound`](crate::Error::NotFound).
#[allow(async_fn_in_trait)]
pub trait ClientApi {
    async fn get(&self, realm: &str, id: &str) -> Result<ClientDetails>;

    async fn clients(&self, realm: &str) -> Result<Clients>;

    /// Create a client and return its Keycloak ID.
    async fn create(&self, realm: &str, draft: &ClientDraft) -> Result<String>;

    async fn update(&self, realm: &str, id: &str, draft: &ClientDraft) -> Result<()>;

    async fn delete(&self, realm: &str, id: &str) -> Result<()>;
}

/// Clients of a realm in the order Keycloak returned them.
#[derive(Clone, Debug, Default)]
pub struct Clients(Vec<Client>);

impl Clients {
    pub fn new(list: Vec<Client>) -> Self {
        Clients(list)
    }

    pub fn all(&self) -> &[Client] {
        &self.0
    }

    /// First client with the given OAuth client ID.
    pub fn by_client_id(&self, client_id: &str) -> Option<&Client> {
        self.0.iter().find(|c| c.client_id == client_id)
    }

    /// First client with the given display name.
    pub fn by_name(&self, name: &str) -> Option<&Client> {
        self.0.iter().find(|c| c.name == name)
    }
}
