//! In-memory and loopback stand-ins for a QS processor.
//!
//! - [`MockTransport`]: scripted [`Transport`] with failure injection
//! - [`MockConnector`]: [`Connector`] over mock transports that counts dials
//! - [`FakeProcessor`]: a telnet server on `127.0.0.1` that performs the
//!   login handshake and answers configured commands

use crate::{Connector, Credentials, Session, Transport, login};
use bytes::Bytes;
use qslink_core::{Error, Result, constants::*};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

#[derive(Default)]
struct MockState {
    /// Replies keyed by the exact bytes written.
    responses: HashMap<Vec<u8>, Vec<u8>>,
    /// Reply for any write without an entry in `responses`.
    fallback: Option<Vec<u8>>,
    /// Data waiting to be read.
    output: Vec<u8>,
    sent: Vec<Bytes>,
    send_error: Option<Error>,
    read_delay: Duration,
    io_count: usize,
    closed: bool,
}

/// Scripted transport.
///
/// Clones share state, so a test can keep a handle to a transport after
/// moving it into a session.
///
/// A read returns the output up to the earliest terminator. If no terminator
/// is buffered the read fails as a timeout, the same way a silent peer would.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport that greets with `login: ` and accepts only
    /// `user`/`password`.
    pub fn processor(user: &str, password: &str) -> Self {
        let transport = Self::new();
        transport.push_output(LOGIN_PROMPT);
        transport.on(&format!("{user}{LINE_TERMINATOR}"), PASSWORD_PROMPT);
        transport.on(&format!("{password}{LINE_TERMINATOR}"), &format!("{LINE_TERMINATOR}{PROMPT}"));
        transport.otherwise("\r\nbad login\r\nlogin: ");
        transport
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reply with `response` whenever exactly `input` is written.
    pub fn on(&self, input: &str, response: &str) {
        self.state()
            .responses
            .insert(input.as_bytes().to_vec(), response.as_bytes().to_vec());
    }

    /// Reply with `response` to writes that have no scripted reply.
    pub fn otherwise(&self, response: &str) {
        self.state().fallback = Some(response.as_bytes().to_vec());
    }

    /// Queue unsolicited output.
    pub fn push_output(&self, data: &str) {
        self.state().output.extend_from_slice(data.as_bytes());
    }

    /// Make every send fail with `err` until cleared with `None`.
    pub fn fail_sends(&self, err: Option<Error>) {
        self.state().send_error = err;
    }

    /// Delay every read by `delay`.
    pub fn set_read_delay(&self, delay: Duration) {
        self.state().read_delay = delay;
    }

    /// Everything written so far.
    pub fn sent(&self) -> Vec<Bytes> {
        self.state().sent.clone()
    }

    /// Number of send and read calls that reached the transport.
    pub fn io_count(&self) -> usize {
        self.state().io_count
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }
}

impl Transport for MockTransport {
    async fn send(&mut self, buf: Bytes) -> Result<()> {
        let mut state = self.state();
        state.io_count += 1;
        if state.closed {
            return Err(Error::NotConnected);
        }
        if let Some(err) = &state.send_error {
            return Err(err.clone());
        }
        let reply = state
            .responses
            .get(&buf[..])
            .or(state.fallback.as_ref())
            .cloned();
        if let Some(reply) = reply {
            state.output.extend_from_slice(&reply);
        }
        state.sent.push(buf);
        Ok(())
    }

    async fn read_until(&mut self, terminators: &[&str]) -> Result<Bytes> {
        let delay = {
            let mut state = self.state();
            state.io_count += 1;
            if state.closed {
                return Err(Error::NotConnected);
            }
            state.read_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        let end = terminators
            .iter()
            .filter(|t| !t.is_empty())
            .filter_map(|t| {
                state
                    .output
                    .windows(t.len())
                    .position(|w| w == t.as_bytes())
                    .map(|pos| pos + t.len())
            })
            .min();
        match end {
            Some(end) => Ok(Bytes::from(state.output.drain(..end).collect::<Vec<_>>())),
            None => Err(Error::timeout("read", Duration::ZERO)),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.state().closed = true;
        Ok(())
    }
}

/// Connector that produces mock transports and logs in with fixed
/// credentials.
pub struct MockConnector {
    name: String,
    keep_alive: Duration,
    credentials: Credentials,
    factory: Box<dyn Fn() -> MockTransport + Send + Sync>,
    dial_delay: Duration,
    fail_dials: Mutex<bool>,
    dials: AtomicUsize,
    transports: Mutex<Vec<MockTransport>>,
}

impl MockConnector {
    pub fn new(
        name: &str,
        keep_alive: Duration,
        user: &str,
        password: &str,
        factory: impl Fn() -> MockTransport + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.to_string(),
            keep_alive,
            credentials: Credentials::new(user, password),
            factory: Box::new(factory),
            dial_delay: Duration::ZERO,
            fail_dials: Mutex::new(false),
            dials: AtomicUsize::new(0),
            transports: Mutex::new(Vec::new()),
        }
    }

    /// Make each dial take `delay`.
    pub fn with_dial_delay(mut self, delay: Duration) -> Self {
        self.dial_delay = delay;
        self
    }

    pub fn fail_dials(&self, fail: bool) {
        *self.fail_dials.lock().unwrap_or_else(PoisonError::into_inner) = fail;
    }

    /// Number of dial attempts.
    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    /// Transports created so far, oldest first.
    pub fn transports(&self) -> Vec<MockTransport> {
        self.transports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Connector for MockConnector {
    type Transport = MockTransport;

    fn name(&self) -> &str {
        &self.name
    }

    fn keep_alive(&self) -> Duration {
        self.keep_alive
    }

    async fn dial(&self, cancel: &CancellationToken) -> Result<MockTransport> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        if !self.dial_delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(self.dial_delay) => {}
            }
        }
        if *self.fail_dials.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(Error::ConnectionFailed {
                addr: self.name.clone(),
                message: "connection refused".to_string(),
            });
        }
        let transport = (self.factory)();
        self.transports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(transport.clone());
        Ok(transport)
    }

    async fn login(&self, session: &Session<MockTransport>, cancel: &CancellationToken) -> Result<()> {
        login(session, &self.credentials, cancel).await
    }
}

struct FakeState {
    user: String,
    password: String,
    responses: Mutex<HashMap<String, String>>,
    received: Mutex<Vec<String>>,
    connections: AtomicUsize,
}

/// Loopback telnet server that behaves like a QS processor.
///
/// It offers a telnet option before the login prompt, rejects wrong
/// passwords with `bad login`, and answers each command line with a
/// monitoring line followed by the configured response and the prompt.
/// Unconfigured queries get `~ERROR,2`; unconfigured set commands get only
/// the prompt.
///
/// # Example
///
/// ```no_run
/// use qslink_network::mock::FakeProcessor;
///
/// # async fn example() -> std::io::Result<()> {
/// let processor = FakeProcessor::start("lutron", "integration").await?;
/// processor.respond("?SYSTEM,8", "~SYSTEM,8,8.102");
/// println!("listening on {}", processor.addr());
/// # Ok(())
/// # }
/// ```
pub struct FakeProcessor {
    addr: SocketAddr,
    state: Arc<FakeState>,
    task: JoinHandle<()>,
}

impl FakeProcessor {
    pub async fn start(user: &str, password: &str) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = Arc::new(FakeState {
            user: user.to_string(),
            password: password.to_string(),
            responses: Mutex::new(HashMap::new()),
            received: Mutex::new(Vec::new()),
            connections: AtomicUsize::new(0),
        });

        let server_state = state.clone();
        let task = tokio::spawn(async move {
            while let Ok((stream, peer)) = listener.accept().await {
                server_state.connections.fetch_add(1, Ordering::SeqCst);
                debug!(%peer, "Fake processor accepted connection");
                let state = server_state.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve(stream, state).await {
                        trace!(error = %e, "Fake processor connection ended");
                    }
                });
            }
        });

        Ok(Self { addr, state, task })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Answer the command line `request` (without CR/LF) with `response`.
    pub fn respond(&self, request: &str, response: &str) {
        self.state
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(request.to_string(), response.to_string());
    }

    /// Command lines received after login, in order.
    pub fn received(&self) -> Vec<String> {
        self.state
            .received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of connections accepted.
    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }
}

impl Drop for FakeProcessor {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Read one line, dropping telnet negotiation and CR/LF.
async fn read_line(reader: &mut BufReader<TcpStream>) -> std::io::Result<Option<String>> {
    let mut raw = Vec::new();
    if reader.read_until(b'\n', &mut raw).await? == 0 {
        return Ok(None);
    }
    let mut line = Vec::with_capacity(raw.len());
    let mut bytes = raw.into_iter();
    while let Some(b) = bytes.next() {
        if b == 0xff {
            // IAC <verb> <option>
            bytes.next();
            bytes.next();
            continue;
        }
        line.push(b);
    }
    Ok(Some(
        String::from_utf8_lossy(&line)
            .trim_end_matches(['\r', '\n'])
            .to_string(),
    ))
}

async fn serve(stream: TcpStream, state: Arc<FakeState>) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream);

    // IAC DO ECHO before the first prompt
    reader.get_mut().write_all(b"\xff\xfd\x01").await?;
    loop {
        reader.get_mut().write_all(LOGIN_PROMPT.as_bytes()).await?;
        let Some(user) = read_line(&mut reader).await? else {
            return Ok(());
        };
        reader.get_mut().write_all(PASSWORD_PROMPT.as_bytes()).await?;
        let Some(password) = read_line(&mut reader).await? else {
            return Ok(());
        };
        if user == state.user && password == state.password {
            reader
                .get_mut()
                .write_all(format!("\r\n{PROMPT}").as_bytes())
                .await?;
            break;
        }
        reader.get_mut().write_all(b"\r\nbad login\r\n").await?;
    }

    while let Some(line) = read_line(&mut reader).await? {
        state
            .received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.clone());
        let response = state
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&line)
            .cloned();

        let mut reply = String::from("~OUTPUT,450,29,6\r\n");
        match response {
            Some(response) => {
                reply.push_str(&response);
                reply.push_str("\r\n");
            }
            None if line.starts_with(char::from(QUERY_PREFIX)) => reply.push_str("~ERROR,2\r\n"),
            None => {}
        }
        reply.push_str(PROMPT);
        reader.get_mut().write_all(reply.as_bytes()).await?;
    }
    Ok(())
}
