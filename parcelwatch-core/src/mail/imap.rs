//! Real IMAP transport over TLS.
//!
//! All `async-imap` usage is confined to this module; the rest of the
//! pipeline talks to the [`MailSession`] trait.

use std::sync::Arc;
use std::time::Duration;

use async_imap::Session;
use async_imap::extensions::idle::IdleResponse;
use async_trait::async_trait;
use chrono::NaiveDate;
use futures::TryStreamExt;
use parcelwatch_model::MailboxSecurity;
use rustls_pki_types::ServerName;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{CoreError, Result};
use crate::mail::transport::{
    FolderInfo, MailConnector, MailSession, MailboxEndpoint, PushOutcome,
};

/// Combined stream bound so plaintext and TLS sessions share one type.
pub trait ImapStream:
    tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + std::fmt::Debug
{
}

impl<T> ImapStream for T where
    T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + std::fmt::Debug
{
}

type BoxedSession = Session<Box<dyn ImapStream>>;

/// Connects and authenticates real IMAP sessions.
#[derive(Debug, Clone)]
pub struct ImapConnector {
    connect_timeout: Duration,
    command_timeout: Duration,
}

impl Default for ImapConnector {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(30),
        }
    }
}

impl ImapConnector {
    pub fn new(connect_timeout: Duration, command_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            command_timeout,
        }
    }

    async fn open_stream(&self, endpoint: &MailboxEndpoint) -> Result<Box<dyn ImapStream>> {
        let addr = (endpoint.host.as_str(), endpoint.port);
        let tcp = timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| CoreError::Mail(format!("connect to {} timed out", endpoint.host)))?
            .map_err(|e| CoreError::Mail(format!("connect to {} failed: {e}", endpoint.host)))?;

        match endpoint.security {
            MailboxSecurity::Ssl => {
                let stream = self.tls_handshake(&endpoint.host, tcp).await?;
                Ok(Box::new(stream))
            }
            MailboxSecurity::Starttls => {
                let tcp = timeout(self.connect_timeout, starttls_exchange(tcp))
                    .await
                    .map_err(|_| CoreError::Mail("STARTTLS negotiation timed out".into()))??;
                let stream = self.tls_handshake(&endpoint.host, tcp).await?;
                Ok(Box::new(stream))
            }
            MailboxSecurity::None => Ok(Box::new(tcp)),
        }
    }

    async fn tls_handshake(
        &self,
        host: &str,
        tcp: TcpStream,
    ) -> Result<tokio_rustls::client::TlsStream<TcpStream>> {
        let tls = self.tls_connector()?;
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| CoreError::Mail(format!("invalid TLS host name: {e}")))?;
        timeout(self.connect_timeout, tls.connect(server_name, tcp))
            .await
            .map_err(|_| CoreError::Mail("TLS handshake timed out".into()))?
            .map_err(|e| CoreError::Mail(format!("TLS handshake failed: {e}")))
    }

    fn tls_connector(&self) -> Result<TlsConnector> {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let config = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        Ok(TlsConnector::from(Arc::new(config)))
    }
}

const STARTTLS_TAG: &str = "a1";

/// Run the plaintext STARTTLS round-trip: consume the server greeting,
/// issue STARTTLS, and wait for the tagged OK. The caller performs the
/// TLS handshake on the returned socket; the server sends nothing
/// between its OK and the client hello, so line-wise reads cannot eat
/// TLS bytes.
async fn starttls_exchange(mut tcp: TcpStream) -> Result<TcpStream> {
    let mut pending = Vec::new();

    let greeting = read_response_line(&mut tcp, &mut pending).await?;
    if !greeting.starts_with('*') {
        return Err(CoreError::Mail(format!(
            "unexpected IMAP greeting: {greeting}"
        )));
    }

    tcp.write_all(format!("{STARTTLS_TAG} STARTTLS\r\n").as_bytes())
        .await
        .map_err(|e| CoreError::Mail(format!("STARTTLS write failed: {e}")))?;

    let tag_prefix = format!("{STARTTLS_TAG} ");
    loop {
        let line = read_response_line(&mut tcp, &mut pending).await?;
        if let Some(completion) = line.strip_prefix(&tag_prefix) {
            if completion.starts_with("OK") {
                return Ok(tcp);
            }
            return Err(CoreError::Mail(format!(
                "server refused STARTTLS: {line}"
            )));
        }
        // Untagged chatter before the completion is ignored.
    }
}

/// Read one CRLF-terminated line, carrying any over-read bytes in
/// `pending` for the next call.
async fn read_response_line(tcp: &mut TcpStream, pending: &mut Vec<u8>) -> Result<String> {
    let mut chunk = [0u8; 512];
    loop {
        if let Some(pos) = pending.windows(2).position(|window| window == b"\r\n") {
            let line: Vec<u8> = pending.drain(..pos + 2).collect();
            return Ok(String::from_utf8_lossy(&line[..pos]).into_owned());
        }

        let read = tcp
            .read(&mut chunk)
            .await
            .map_err(|e| CoreError::Mail(format!("STARTTLS read failed: {e}")))?;
        if read == 0 {
            return Err(CoreError::Mail(
                "connection closed during STARTTLS negotiation".into(),
            ));
        }
        pending.extend_from_slice(&chunk[..read]);
    }
}

#[async_trait]
impl MailConnector for ImapConnector {
    async fn connect(&self, endpoint: &MailboxEndpoint) -> Result<Box<dyn MailSession>> {
        let stream = self.open_stream(endpoint).await?;
        let client = async_imap::Client::new(stream);

        let mut session = timeout(
            self.connect_timeout,
            client.login(&endpoint.username, &endpoint.password),
        )
        .await
        .map_err(|_| CoreError::Mail("login timed out".into()))?
        .map_err(|(e, _client)| CoreError::Mail(format!("login failed: {e}")))?;

        // Probe push support post-auth; some servers only advertise it then.
        let idle_supported = match timeout(self.command_timeout, session.capabilities()).await {
            Ok(Ok(caps)) => caps.has_str("IDLE"),
            Ok(Err(e)) => {
                warn!("capability probe failed, assuming no push support: {e}");
                false
            }
            Err(_) => {
                warn!("capability probe timed out, assuming no push support");
                false
            }
        };
        debug!(
            host = %endpoint.host,
            idle_supported,
            "IMAP session established"
        );

        Ok(Box::new(ImapSession {
            session: Some(session),
            idle_supported,
            command_timeout: self.command_timeout,
        }))
    }
}

struct ImapSession {
    /// `None` only transiently during IDLE (the handle owns the session)
    /// or after logout / a broken wait.
    session: Option<BoxedSession>,
    idle_supported: bool,
    command_timeout: Duration,
}

impl ImapSession {
    fn session_mut(&mut self) -> Result<&mut BoxedSession> {
        self.session
            .as_mut()
            .ok_or_else(|| CoreError::Mail("IMAP session is closed".into()))
    }
}

#[async_trait]
impl MailSession for ImapSession {
    fn supports_idle(&self) -> bool {
        self.idle_supported
    }

    async fn select(&mut self, folder: &str) -> Result<FolderInfo> {
        let command_timeout = self.command_timeout;
        let session = self.session_mut()?;
        let mailbox = timeout(command_timeout, session.select(folder))
            .await
            .map_err(|_| CoreError::Mail(format!("SELECT {folder} timed out")))?
            .map_err(|e| CoreError::Mail(format!("SELECT {folder} failed: {e}")))?;
        Ok(FolderInfo {
            uid_validity: mailbox.uid_validity,
        })
    }

    async fn list_folders(&mut self) -> Result<Vec<String>> {
        let command_timeout = self.command_timeout;
        let session = self.session_mut()?;

        let list_all = async {
            let mut stream = session
                .list(Some(""), Some("*"))
                .await
                .map_err(|e| CoreError::Mail(format!("LIST failed: {e}")))?;
            let mut folders = Vec::new();
            while let Some(name) = stream
                .try_next()
                .await
                .map_err(|e| CoreError::Mail(format!("LIST stream failed: {e}")))?
            {
                folders.push(name.name().to_string());
            }
            Ok::<_, CoreError>(folders)
        };

        timeout(command_timeout, list_all)
            .await
            .map_err(|_| CoreError::Mail("LIST timed out".into()))?
    }

    async fn uid_search_since(&mut self, first_uid: u32, since: NaiveDate) -> Result<Vec<u32>> {
        let command_timeout = self.command_timeout;
        let session = self.session_mut()?;
        let query = format!("UID {}:* SINCE {}", first_uid, since.format("%d-%b-%Y"));
        let uids = timeout(command_timeout, session.uid_search(&query))
            .await
            .map_err(|_| CoreError::Mail("UID SEARCH timed out".into()))?
            .map_err(|e| CoreError::Mail(format!("UID SEARCH failed: {e}")))?;

        let mut uids: Vec<u32> = uids.into_iter().collect();
        uids.sort_unstable();
        Ok(uids)
    }

    async fn uid_fetch(&mut self, uid: u32) -> Result<Option<Vec<u8>>> {
        let command_timeout = self.command_timeout;
        let session = self.session_mut()?;

        let fetch_all = async {
            let mut stream = session
                .uid_fetch(uid.to_string(), "(RFC822)")
                .await
                .map_err(|e| CoreError::Mail(format!("UID FETCH {uid} failed: {e}")))?;
            let mut body = None;
            while let Some(fetch) = stream
                .try_next()
                .await
                .map_err(|e| CoreError::Mail(format!("UID FETCH {uid} stream failed: {e}")))?
            {
                if let Some(bytes) = fetch.body() {
                    body = Some(bytes.to_vec());
                }
            }
            Ok::<_, CoreError>(body)
        };

        timeout(command_timeout, fetch_all)
            .await
            .map_err(|_| CoreError::Mail(format!("UID FETCH {uid} timed out")))?
    }

    async fn idle_wait(
        &mut self,
        wait_timeout: Duration,
        token: &CancellationToken,
    ) -> Result<PushOutcome> {
        let session = self
            .session
            .take()
            .ok_or_else(|| CoreError::Mail("IMAP session is closed".into()))?;

        let mut handle = session.idle();
        if let Err(e) = handle.init().await {
            return Err(CoreError::Mail(format!("IDLE init failed: {e}")));
        }

        let (wait_fut, interrupt) = handle.wait_with_timeout(wait_timeout);
        let outcome = tokio::select! {
            _ = token.cancelled() => {
                drop(interrupt);
                PushOutcome::Cancelled
            }
            res = wait_fut => match res {
                Ok(IdleResponse::NewData(_)) => PushOutcome::NewMail,
                Ok(IdleResponse::Timeout) => PushOutcome::Timeout,
                Ok(IdleResponse::ManualInterrupt) => PushOutcome::Cancelled,
                Err(e) => {
                    // Connection is unusable; let the watch loop reconnect.
                    return Err(CoreError::Mail(format!("IDLE wait failed: {e}")));
                }
            },
        };

        let session = handle
            .done()
            .await
            .map_err(|e| CoreError::Mail(format!("IDLE DONE failed: {e}")))?;
        self.session = Some(session);
        Ok(outcome)
    }

    async fn logout(&mut self) -> Result<()> {
        if let Some(mut session) = self.session.take() {
            timeout(self.command_timeout, session.logout())
                .await
                .map_err(|_| CoreError::Mail("LOGOUT timed out".into()))?
                .map_err(|e| CoreError::Mail(format!("LOGOUT failed: {e}")))?;
        }
        Ok(())
    }
}
