//! In-memory [`ClientApi`] used to test code driving Keycloak without a server.

use crate::api::{ClientApi, Clients};
use crate::error::{Error, Result};
use crate::types::{Client, ClientDetails, ClientDraft};

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct State {
    clients: Vec<(String, ClientDetails)>,
    hidden: BTreeSet<String>,
    failure: Option<Error>,
    next_id: usize,
    gets: usize,
    lists: usize,
    creates: usize,
    updates: usize,
    deletes: usize,
    last_update: Option<ClientDraft>,
}

/// Realm clients kept in insertion order, with call counters.
#[derive(Default)]
pub struct FakeKeycloak {
    state: Mutex<State>,
}

impl FakeKeycloak {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a client whose client ID and name are both `name`.
    pub fn insert(&self, realm: &str, id: &str, name: &str, secret: &str) {
        let url = format!("https://{name}");
        self.insert_details(
            realm,
            ClientDetails {
                client: Client {
                    id: id.to_string(),
                    client_id: name.to_string(),
                    name: name.to_string(),
                    root_url: url.clone(),
                    admin_url: url.clone(),
                    redirect_uris: vec![format!("{url}/*")],
                    web_origins: vec![url],
                    enabled: true,
                    ..Client::default()
                },
                secret: secret.to_string(),
            },
        );
    }

    pub fn insert_details(&self, realm: &str, details: ClientDetails) {
        self.state().clients.push((realm.to_string(), details));
    }

    pub fn client(&self, realm: &str, id: &str) -> Option<ClientDetails> {
        self.state()
            .clients
            .iter()
            .find(|(r, c)| r == realm && c.client.id == id)
            .map(|(_, c)| c.clone())
    }

    pub fn len(&self) -> usize {
        self.state().clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make `get` report the client as missing while it is still listed.
    pub fn hide_from_get(&self, id: &str) {
        self.state().hidden.insert(id.to_string());
    }

    /// Make every following call fail with `error`.
    pub fn fail_with(&self, error: Error) {
        self.state().failure = Some(error);
    }

    pub fn get_calls(&self) -> usize {
        self.state().gets
    }

    pub fn list_calls(&self) -> usize {
        self.state().lists
    }

    pub fn create_calls(&self) -> usize {
        self.state().creates
    }

    pub fn update_calls(&self) -> usize {
        self.state().updates
    }

    pub fn delete_calls(&self) -> usize {
        self.state().deletes
    }

    pub fn last_update(&self) -> Option<ClientDraft> {
        self.state().last_update.clone()
    }
}

impl State {
    fn check(&self) -> Result<()> {
        match &self.failure {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn position(&self, realm: &str, id: &str) -> Option<usize> {
        self.clients
            .iter()
            .position(|(r, c)| r == realm && c.client.id == id)
    }
}

fn overlay(client: &mut ClientDetails, draft: &ClientDraft) {
    let set = |target: &mut String, value: &String| {
        if !value.is_empty() {
            target.clone_from(value);
        }
    };
    set(&mut client.client.client_id, &draft.client_id);
    set(&mut client.client.name, &draft.name);
    set(&mut client.client.root_url, &draft.root_url);
    set(&mut client.client.admin_url, &draft.admin_url);
    set(&mut client.client.description, &draft.description);
    set(&mut client.secret, &draft.client_secret);
    if !draft.redirect_uris.is_empty() {
        client.client.redirect_uris.clone_from(&draft.redirect_uris);
    }
    if !draft.web_origins.is_empty() {
        client.client.web_origins.clone_from(&draft.web_origins);
    }
}

impl ClientApi for FakeKeycloak {
    async fn get(&self, realm: &str, id: &str) -> Result<ClientDetails> {
        let mut state = self.state();
        state.gets += 1;
        state.check()?;
        if state.hidden.contains(id) {
            return Err(Error::NotFound);
        }
        state
            .position(realm, id)
            .map(|i| state.clients[i].1.clone())
            .ok_or(Error::NotFound)
    }

    async fn clients(&self, realm: &str) -> Result<Clients> {
        let mut state = self.state();
        state.lists += 1;
        state.check()?;
        Ok(Clients::new(
            state
                .clients
                .iter()
                .filter(|(r, _)| r == realm)
                .map(|(_, c)| c.client.clone())
                .collect(),
        ))
    }

    async fn create(&self, realm: &str, draft: &ClientDraft) -> Result<String> {
        let mut state = self.state();
        state.creates += 1;
        state.check()?;
        let id = match &draft.id {
            Some(id) => id.clone(),
            None => {
                state.next_id += 1;
                format!("generated-{}", state.next_id)
            }
        };
        if state.position(realm, &id).is_some() {
            return Err(Error::UnexpectedStatus(
                format!("client {id} already exists"),
                reqwest::StatusCode::CONFLICT,
            ));
        }
        let mut details = ClientDetails {
            client: Client {
                id: id.clone(),
                enabled: true,
                ..Client::default()
            },
            secret: String::new(),
        };
        overlay(&mut details, draft);
        state.clients.push((realm.to_string(), details));
        Ok(id)
    }

    async fn update(&self, realm: &str, id: &str, draft: &ClientDraft) -> Result<()> {
        let mut state = self.state();
        state.updates += 1;
        state.check()?;
        state.last_update = Some(draft.clone());
        let i = state.position(realm, id).ok_or(Error::NotFound)?;
        overlay(&mut state.clients[i].1, draft);
        Ok(())
    }

    async fn delete(&self, realm: &str, id: &str) -> Result<()> {
        let mut state = self.state();
        state.deletes += 1;
        state.check()?;
        let i = state.position(realm, id).ok_or(Error::NotFound)?;
        state.clients.remove(i);
        Ok(())
    }
}
