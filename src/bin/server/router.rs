//! Request routing: the single consumer of connection events.
//!
//! All registry and group mutation happens here, on one task, so the live
//! state never needs a lock. Persistence calls are synchronous; a storage
//! failure aborts only the request that triggered it.

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use gab_rs::auth;
use gab_rs::constants::{GROUP_MARKER, StatusCode};
use gab_rs::db::Database;
use gab_rs::protocol::{Credentials, Request, Response};

use crate::registry::{ConnHandle, ConnectionRegistry};

/// Connection lifecycle and traffic events, produced by the accept loop and
/// the per-connection reader tasks.
#[derive(Debug)]
pub enum Event {
    Connected(ConnHandle),
    Request { id: u32, request: Request },
    Disconnected { id: u32 },
}

pub struct Router {
    registry: ConnectionRegistry,
    db: Database,
    welcome: String,
}

impl Router {
    pub fn new(db: Database, welcome: String) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            db,
            welcome,
        }
    }

    /// Drive the router until every event sender is gone.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<Event>) {
        while let Some(event) = events.recv().await {
            match event {
                Event::Connected(handle) => {
                    debug!(id = handle.id, addr = %handle.addr, "connection admitted");
                    self.registry.insert(handle);
                }
                Event::Request { id, request } => self.handle_request(id, request),
                Event::Disconnected { id } => {
                    if let Some(handle) = self.registry.remove(id) {
                        info!(
                            id,
                            addr = %handle.addr,
                            account = handle.account.as_deref().unwrap_or("-"),
                            remaining = self.registry.len(),
                            "client disconnected"
                        );
                    }
                }
            }
        }
    }

    fn handle_request(&mut self, id: u32, request: Request) {
        match request {
            Request::Presence { user, .. } => self.handle_presence(id, &user),
            Request::GetContacts { user_login, .. } => self.handle_get_contacts(id, &user_login),
            msg @ Request::Msg { .. } => self.handle_msg(id, msg),
            Request::Join { room, from, .. } => self.handle_join(id, &room, &from),
            Request::Quit { from, to } => {
                info!(
                    from = from.as_deref().unwrap_or("-"),
                    to = to.as_deref().unwrap_or("-"),
                    "client leaving conversation"
                );
            }
        }
    }

    fn handle_presence(&mut self, id: u32, user: &Credentials) {
        let Some(conn) = self.registry.get(id) else {
            return;
        };
        let source_ip = conn.addr.ip().to_string();

        match self.authenticate(user) {
            Ok(Some(client_id)) => {
                self.registry.bind_account(id, &user.account_name);
                if let Err(e) = self.db.record_connection(client_id, &source_ip) {
                    warn!(error = %e, "history append failed");
                }
                info!(account = %user.account_name, %source_ip, "presence confirmed");
                let welcome = self.welcome.clone();
                self.send_response(id, &Response::text(StatusCode::Confirmed, welcome));
            }
            Ok(None) => {
                info!(account = %user.account_name, "presence rejected");
                self.send_response(
                    id,
                    &Response::text(StatusCode::AuthFailed, "wrong login / password!"),
                );
            }
            Err(e) => warn!(account = %user.account_name, error = %e, "presence aborted"),
        }
    }

    /// Verify a known login's password, or register an unknown login with
    /// the submitted password's hash. `Ok(None)` means a wrong password.
    fn authenticate(&self, user: &Credentials) -> gab_rs::Result<Option<i64>> {
        match self.db.fetch_account(&user.account_name)? {
            Some(account) => {
                if !auth::verify_password(&user.password, &account.password_hash) {
                    return Ok(None);
                }
                if let Some(status) = &user.status {
                    if let Err(e) = self.db.set_info(account.id, status) {
                        warn!(error = %e, "info update failed");
                    }
                }
                Ok(Some(account.id))
            }
            None => {
                let hash = auth::password_hash(&user.password);
                let client_id =
                    self.db
                        .create_account(&user.account_name, &hash, user.status.as_deref())?;
                Ok(Some(client_id))
            }
        }
    }

    fn handle_get_contacts(&mut self, id: u32, login: &str) {
        let account = match self.db.fetch_account(login) {
            Ok(Some(account)) => account,
            Ok(None) => {
                debug!(login, "contacts requested for unknown login");
                return;
            }
            Err(e) => {
                warn!(login, error = %e, "contact lookup failed");
                return;
            }
        };
        match self.db.contacts_of(account.id) {
            Ok(logins) => self.send_response(id, &Response::contacts(logins)),
            Err(e) => warn!(login, error = %e, "contact lookup failed"),
        }
    }

    fn handle_msg(&mut self, id: u32, msg: Request) {
        let (from, to) = match &msg {
            Request::Msg { from, to, .. } => (from.clone(), to.clone()),
            _ => return,
        };
        let frame = match msg.encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "message re-encode failed");
                return;
            }
        };

        if to.starts_with(GROUP_MARKER) {
            // Everyone currently in the group except the sender.
            let targets: Vec<u32> = self
                .registry
                .group_members(&to)
                .filter(|member| *member != id)
                .collect();
            debug!(%from, group = %to, recipients = targets.len(), "group relay");
            for member in targets {
                self.deliver(member, frame.clone());
            }
        } else {
            let Some(target) = self.registry.resolve(&to) else {
                debug!(%from, %to, "recipient not bound, message dropped");
                return;
            };
            let target_id = target.id;
            if self.deliver(target_id, frame) {
                if let Err(e) = self.record_contact(&from, &to) {
                    warn!(%from, %to, error = %e, "contact edge append failed");
                }
            }
        }
    }

    /// Append the sender→recipient contact edge for a relayed message.
    fn record_contact(&self, from: &str, to: &str) -> gab_rs::Result<()> {
        let (Some(sender), Some(recipient)) =
            (self.db.fetch_account(from)?, self.db.fetch_account(to)?)
        else {
            debug!(%from, %to, "unregistered participant, contact edge skipped");
            return Ok(());
        };
        self.db.record_contact(sender.id, recipient.id)
    }

    fn handle_join(&mut self, id: u32, room: &str, from: &str) {
        let created = self.registry.join_group(room, id);
        info!(%from, %room, created, "join");
        if created {
            self.send_response(
                id,
                &Response::text(StatusCode::GroupCreated, format!("group {room} created")),
            );
        }
    }

    fn send_response(&mut self, id: u32, response: &Response) {
        match response.encode() {
            Ok(frame) => {
                self.deliver(id, frame);
            }
            Err(e) => warn!(error = %e, "response encode failed"),
        }
    }

    /// Send a frame to one connection; a failed send tears down only that
    /// connection.
    fn deliver(&mut self, id: u32, frame: Bytes) -> bool {
        let Some(conn) = self.registry.get(id) else {
            return false;
        };
        if conn.send(frame) {
            return true;
        }
        if let Some(handle) = self.registry.remove(id) {
            info!(id, addr = %handle.addr, "send failed, connection removed");
        }
        false
    }
}
