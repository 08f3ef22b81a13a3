//! POP3 session lifecycle, delta retrieval, and deletion.

use std::collections::{BTreeMap, BTreeSet};
use std::mem;

use errors::*;
use message::{parse_message, ParsedMessage};
use net::NetTransport;
use observe::LoggedTransport;
use tracker::{parse_listing, UidTracker};
use transport::{Stat, Transport};
use AccountConfig;
use AuthMethod;

/// Session ownership. Authorization is transient inside `connect`; a
/// session is either down or fully authenticated.
enum Session<T> {
    Disconnected,
    Transaction(LoggedTransport<T>),
}

/// A POP3 mailbox client.
///
/// Owns at most one transport handle, exclusively. Operations are
/// strictly sequential; for parallel mailbox access use independent
/// clients. The client remembers which unique ids it has retrieved so
/// that [`get_new_messages`](POP3Client::get_new_messages) only fetches
/// the delta; seed that memory with
/// [`with_seen`](POP3Client::with_seen) to carry it across process runs.
pub struct POP3Client<T: Transport = NetTransport> {
    config: AccountConfig,
    session: Session<T>,
    tracker: UidTracker,
    target: String,
}

impl<T: Transport> POP3Client<T> {
    /// A disconnected client with no retrieval history.
    pub fn new(config: AccountConfig) -> POP3Client<T> {
        POP3Client::with_seen(config, Vec::new())
    }

    /// A disconnected client pre-seeded with previously retrieved ids.
    pub fn with_seen<I>(config: AccountConfig, old_uid: I) -> POP3Client<T>
    where
        I: IntoIterator<Item = String>,
    {
        let target = config.log_target();
        POP3Client {
            config: config,
            session: Session::Disconnected,
            tracker: UidTracker::with_seen(old_uid),
            target: target,
        }
    }

    pub fn is_connected(&self) -> bool {
        match self.session {
            Session::Transaction(_) => true,
            Session::Disconnected => false,
        }
    }

    /// Authenticate over an already-connected transport and take ownership
    /// of it. Any previous session is closed first, best-effort.
    ///
    /// On an authentication failure the transport is terminated (errors
    /// from that termination are swallowed) before the failure is
    /// re-raised; no half-open session survives.
    pub fn connect_with(&mut self, transport: T) -> Result<()> {
        if self.is_connected() {
            let _ = self.quit();
        }
        let mut transport = LoggedTransport::new(transport, self.target.clone());
        match self.authenticate(&mut transport) {
            Ok(()) => {
                debug!(target: self.target.as_str(), "session authenticated");
                self.session = Session::Transaction(transport);
                Ok(())
            }
            Err(err) => {
                let _ = transport.quit();
                Err(Error::with_chain(
                    err,
                    ErrorKind::Authentication(format!(
                        "{:?} authentication rejected for {}",
                        self.config.auth, self.config.user
                    )),
                ))
            }
        }
    }

    fn authenticate(&self, transport: &mut LoggedTransport<T>) -> Result<()> {
        match self.config.auth {
            AuthMethod::Apop => {
                transport.apop(&self.config.user, &self.config.password)?;
            }
            AuthMethod::Rpop => {
                transport.rpop(&self.config.user)?;
                transport.pass(&self.config.password)?;
            }
            AuthMethod::Plain => {
                transport.user(&self.config.user)?;
                transport.pass(&self.config.password)?;
            }
        }
        Ok(())
    }

    fn transport_mut(&mut self) -> Result<&mut LoggedTransport<T>> {
        match self.session {
            Session::Transaction(ref mut transport) => Ok(transport),
            Session::Disconnected => Err(ErrorKind::NotConnected.into()),
        }
    }

    /// Close the session and release the inbox lock.
    ///
    /// An error from the server's QUIT handling propagates, but the
    /// session is left disconnected either way. Calling this while
    /// already disconnected is a no-op; implicit teardown (`Drop`) calls
    /// it and swallows the error.
    pub fn quit(&mut self) -> Result<()> {
        match mem::replace(&mut self.session, Session::Disconnected) {
            Session::Disconnected => Ok(()),
            Session::Transaction(mut transport) => {
                let outcome = transport.quit();
                debug!(target: self.target.as_str(), "session closed");
                outcome.map(|_| ())
            }
        }
    }

    /// uid → message number for every message in the mailbox.
    ///
    /// Message numbers are only valid within this session and until the
    /// next state-changing operation; they are re-resolved on every call.
    pub fn get_all_unique_id(&mut self) -> Result<BTreeMap<String, u32>> {
        let lines = self.transport_mut()?.uidl()?;
        parse_listing(&lines)
    }

    /// uid → message number restricted to messages not yet retrieved.
    pub fn get_new_unique_id(&mut self) -> Result<BTreeMap<String, u32>> {
        let all = self.get_all_unique_id()?;
        Ok(self.tracker.filter_new(all))
    }

    /// Retrieve and parse the messages in `ids`, keyed by unique id.
    ///
    /// The retrieved ids are recorded as seen only once the whole batch
    /// has succeeded; a mid-batch failure surfaces as `PartialBatch` and
    /// records nothing.
    pub fn get_messages(
        &mut self,
        ids: &BTreeMap<String, u32>,
    ) -> Result<BTreeMap<String, ParsedMessage>> {
        let mut fetched = BTreeMap::new();
        for (uid, &msg_no) in ids {
            let retrieved = match self.transport_mut()?.retr(msg_no) {
                Ok(retrieved) => retrieved,
                Err(err) => {
                    return Err(Error::with_chain(
                        err,
                        ErrorKind::PartialBatch(uid.clone(), fetched.len()),
                    ))
                }
            };
            let raw = retrieved.into_message_bytes();
            fetched.insert(uid.clone(), parse_message(&raw));
        }
        self.tracker.record(fetched.keys().cloned());
        Ok(fetched)
    }

    /// Every message in the mailbox.
    pub fn get_all_messages(&mut self) -> Result<BTreeMap<String, ParsedMessage>> {
        let ids = self.get_all_unique_id()?;
        self.get_messages(&ids)
    }

    /// Only the messages not retrieved before.
    pub fn get_new_messages(&mut self) -> Result<BTreeMap<String, ParsedMessage>> {
        let ids = self.get_new_unique_id()?;
        self.get_messages(&ids)
    }

    /// Mark the given messages for deletion at session end.
    ///
    /// Message numbers are re-resolved from a fresh listing, since any
    /// previously returned mapping may be stale. A uid that is not in the
    /// mailbox fails the call before any deletion is issued.
    pub fn delete_messages(&mut self, uids: &[String]) -> Result<()> {
        let current = self.get_all_unique_id()?;
        let mut numbers = Vec::with_capacity(uids.len());
        for uid in uids {
            match current.get(uid) {
                Some(&msg_no) => numbers.push(msg_no),
                None => return Err(ErrorKind::UnknownUid(uid.clone()).into()),
            }
        }
        for msg_no in numbers {
            self.transport_mut()?.dele(msg_no)?;
        }
        Ok(())
    }

    /// Unmark every message marked for deletion in this session.
    pub fn undo_delete(&mut self) -> Result<()> {
        self.transport_mut()?.rset()?;
        Ok(())
    }

    /// Message count and total mailbox size.
    pub fn stat(&mut self) -> Result<Stat> {
        self.transport_mut()?.stat()
    }

    /// Capability lines advertised by the server.
    pub fn capa(&mut self) -> Result<Vec<String>> {
        self.transport_mut()?.capa()
    }

    /// Keep the session alive.
    pub fn noop(&mut self) -> Result<()> {
        self.transport_mut()?.noop()?;
        Ok(())
    }

    /// Unique ids recorded as retrieved, for the caller to persist.
    pub fn seen_unique_id(&self) -> &BTreeSet<String> {
        self.tracker.seen()
    }
}

impl POP3Client<NetTransport> {
    /// Dial the configured server and authenticate.
    pub fn connect(&mut self) -> Result<()> {
        let transport = NetTransport::connect(
            &self.config.host,
            self.config.effective_port(),
            self.config.use_ssl,
            &self.config.options,
        )?;
        self.connect_with(transport)
    }

    /// Run `body` within a connected session, guaranteeing the transport
    /// is terminated on every exit path. A QUIT failure after a
    /// successful body propagates; after a failed body it is swallowed in
    /// favor of the body's error.
    pub fn session<R, F>(config: AccountConfig, body: F) -> Result<R>
    where
        F: FnOnce(&mut POP3Client<NetTransport>) -> Result<R>,
    {
        let mut client = POP3Client::new(config);
        client.connect()?;
        match body(&mut client) {
            Ok(value) => {
                client.quit()?;
                Ok(value)
            }
            Err(err) => {
                let _ = client.quit();
                Err(err)
            }
        }
    }
}

impl<T: Transport> Drop for POP3Client<T> {
    fn drop(&mut self) {
        if let Err(err) = self.quit() {
            debug!(target: self.target.as_str(), "QUIT during teardown failed: {}", err);
        }
    }
}
