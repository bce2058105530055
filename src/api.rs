//! Public client façade composing the session manager, signer, and transport.
//!
//! [`LeetClient`] is cheap to clone and every clone shares one session. Each operation is
//! async and never blocks the calling thread. Engine code that prefers polling over awaiting
//! can hand calls to [`LeetClient::submit`] and drain [`LeetClient::completions`] from its frame
//! loop.

pub mod completion;
pub mod endpoint;
pub mod response;
pub mod server;

pub use completion::*;
pub use endpoint::*;
pub use response::{ApiResponse, Envelope};
pub use server::*;

// crates.io
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::runtime::Handle;
// self
use crate::{
	_prelude::*,
	auth::{Credential, NonceProvider, Password, Username},
	clock::Clock,
	config::ClientConfig,
	error::ConfigError,
	http::Transport,
	session::{SessionManager, SessionMetrics, SessionState},
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;

/// Signed-call client for the Leet backend.
pub struct LeetClient<T>
where
	T: Transport,
{
	session: SessionManager<T>,
	completions: Arc<CompletionQueue>,
}
impl<T> LeetClient<T>
where
	T: Transport,
{
	/// Creates a client that sends every request through `transport`.
	///
	/// Captures the current Tokio runtime, if any, for background work. Clients built outside a
	/// runtime need [`LeetClient::with_runtime`] before they are used from plain threads.
	pub fn with_transport(config: ClientConfig, transport: impl Into<Arc<T>>) -> Self {
		let session = SessionManager::new(
			config,
			transport.into(),
			Arc::new(crate::clock::SystemClock),
			Arc::new(crate::auth::IncreasingNonce::default()),
			Handle::try_current().ok(),
		);

		Self { session, completions: Arc::new(CompletionQueue::default()) }
	}

	/// Replaces the clock used for stamping and expiry checks.
	///
	/// Resets the session, so call it while building the client.
	pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
		let nonces = self.session.nonces().clone();
		let runtime = self.session.configured_runtime().cloned();

		self.rebuild(clock, nonces, runtime)
	}

	/// Replaces the nonce source.
	///
	/// Resets the session, so call it while building the client.
	pub fn with_nonce_provider(self, nonces: Arc<dyn NonceProvider>) -> Self {
		let clock = self.session.clock().clone();
		let runtime = self.session.configured_runtime().cloned();

		self.rebuild(clock, nonces, runtime)
	}

	/// Runs session work and [`LeetClient::submit`] tasks on `runtime`.
	///
	/// Resets the session, so call it while building the client.
	pub fn with_runtime(self, runtime: Handle) -> Self {
		let clock = self.session.clock().clone();
		let nonces = self.session.nonces().clone();

		self.rebuild(clock, nonces, Some(runtime))
	}

	fn rebuild(
		self,
		clock: Arc<dyn Clock>,
		nonces: Arc<dyn NonceProvider>,
		runtime: Option<Handle>,
	) -> Self {
		let session = self.session.rebuild(clock, nonces, runtime);

		Self { session, completions: self.completions }
	}

	/// Logs a player in and remembers the credentials for later re-authentication.
	pub async fn login(
		&self,
		username: impl AsRef<str>,
		password: impl Into<String>,
	) -> Result<()> {
		let username = Username::new(username).map_err(ConfigError::from)?;

		self.session.login(Some(username), Some(Password::new(password))).await
	}

	/// Authenticates with the title identity alone.
	pub async fn login_title(&self) -> Result<()> {
		self.session.login(None, None).await
	}

	/// Performs a signed call, authenticating or refreshing first when needed.
	pub async fn call(&self, endpoint: Endpoint, payload: Option<Value>) -> Result<ApiResponse> {
		self.session.call(endpoint, encode(payload)?).await
	}

	/// Performs a signed call and deserializes the envelope payload into `R`.
	pub async fn call_as<R>(&self, endpoint: Endpoint, payload: Option<Value>) -> Result<R>
	where
		R: DeserializeOwned,
	{
		self.call(endpoint, payload).await?.parse_data()
	}

	/// Queues a call and returns immediately; the outcome lands in [`LeetClient::completions`].
	///
	/// Calls are submitted in the order of `submit` invocations. Safe to call from threads
	/// without a runtime context once the client holds a runtime; without one, the completion
	/// carries [`ConfigError::NoRuntime`].
	pub fn submit(&self, endpoint: Endpoint, payload: Option<Value>) -> Ticket {
		let ticket = self.completions.issue();
		let Some(runtime) = self.session.runtime() else {
			self.completions.complete(ticket, Err(ConfigError::NoRuntime.into()));

			return ticket;
		};
		let body = match encode(payload) {
			Ok(body) => body,
			Err(e) => {
				self.completions.complete(ticket, Err(e));

				return ticket;
			},
		};
		let reply = self.session.enqueue(endpoint, body);
		let session = self.session.clone();
		let completions = self.completions.clone();

		runtime.spawn(async move {
			let result = session.wait(reply).await;

			completions.complete(ticket, result);
		});

		ticket
	}

	/// Outcomes of calls handed to [`LeetClient::submit`].
	pub fn completions(&self) -> &Arc<CompletionQueue> {
		&self.completions
	}

	/// Registers the hosted game session (when given) and fetches the server's reward terms.
	pub async fn server_info(&self, registration: &SessionRegistration) -> Result<ServerInfo> {
		let payload = serde_json::to_value(registration)
			.map_err(|e| ConfigError::Payload { message: e.to_string() })?;
		let endpoint = Endpoint::post(self.session.config().endpoints.server_info.clone());

		self.call_as(endpoint, Some(payload)).await
	}

	/// Ends the session; see [`SessionManager::logout`].
	pub async fn logout(&self) -> Result<()> {
		self.session.logout().await
	}

	/// Current session state.
	pub fn state(&self) -> SessionState {
		self.session.state()
	}

	/// Snapshot of the stored credential.
	pub fn credential(&self) -> Credential {
		self.session.store().get()
	}

	/// Session activity counters.
	pub fn metrics(&self) -> &SessionMetrics {
		self.session.metrics()
	}

	/// Underlying session manager.
	pub fn session(&self) -> &SessionManager<T> {
		&self.session
	}
}
#[cfg(feature = "reqwest")]
impl LeetClient<ReqwestTransport> {
	/// Creates a client backed by reqwest.
	pub fn new(config: ClientConfig) -> Result<Self> {
		let transport = ReqwestTransport::new()?;

		Ok(Self::with_transport(config, transport))
	}
}
impl<T> Clone for LeetClient<T>
where
	T: Transport,
{
	fn clone(&self) -> Self {
		Self { session: self.session.clone(), completions: self.completions.clone() }
	}
}
impl<T> Debug for LeetClient<T>
where
	T: Transport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LeetClient")
			.field("session", &self.session)
			.field("completions", &self.completions.len())
			.finish()
	}
}

fn encode(payload: Option<Value>) -> Result<Vec<u8>> {
	match payload {
		Some(payload) => serde_json::to_vec(&payload)
			.map_err(|e| ConfigError::Payload { message: e.to_string() }.into()),
		None => Ok(Vec::new()),
	}
}
