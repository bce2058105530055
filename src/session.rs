//! Session manager: the state machine that keeps a signed session alive.
//!
//! One [`SessionManager`] exists per client and every clone shares it. The lifecycle state, the
//! queue of calls waiting on a transition, and the remembered login live behind a single
//! `parking_lot::Mutex` that is never held across `.await`.
//!
//! Login and refresh exchanges run on spawned tasks. The in-flight state is the singleflight
//! guard, so at most one exchange is outstanding, and a caller dropping its future never aborts
//! a credential update. When an exchange settles, the outcome is applied under the lock. Stale
//! outcomes (a logout happened meanwhile) are discarded by epoch. An exchange task that unwinds
//! still settles, as [`SessionError::Aborted`].
//!
//! Calls are signed and handed to the transport under the lock, so the transport sees them in
//! submission order. Calls released by a transition are dispatched one at a time; calls
//! submitted while that release is draining join the back of it.
//!
//! Tasks are spawned through the runtime captured when the manager was built, so calls may be
//! submitted from threads that have no runtime context.

pub mod metrics;
pub mod state;

pub use metrics::*;
pub use state::*;

// std
use std::{collections::VecDeque, mem};
// crates.io
use tokio::{runtime::Handle, sync::oneshot};
// self
use crate::{
	_prelude::*,
	api::{ApiResponse, Endpoint, Envelope, response},
	auth::{NonceProvider, Password, SessionCredential, SessionStatus, TokenSecret, Username},
	clock::Clock,
	config::ClientConfig,
	error::{AuthError, ConfigError, SessionError, TransportError},
	http::{HttpRequest, HttpResponse, RequestId, Transport, TransportFuture},
	obs::{self, OpKind, OpOutcome, OpSpan},
	sign::{self, AUTH_HEADER, RequestSigner, SignedRequest},
	store::CredentialStore,
};

type CallSender = oneshot::Sender<Result<ApiResponse>>;
pub(crate) type CallReceiver = oneshot::Receiver<Result<ApiResponse>>;

/// Orchestrates login, refresh, retry, and dispatch of signed calls.
pub struct SessionManager<T>
where
	T: Transport,
{
	inner: Arc<Shared<T>>,
}
impl<T> SessionManager<T>
where
	T: Transport,
{
	/// Creates a manager in the [`SessionState::Unauthenticated`] state.
	///
	/// Background work runs on `runtime`, or on the caller's ambient runtime when `None`.
	pub fn new(
		config: ClientConfig,
		transport: Arc<T>,
		clock: Arc<dyn Clock>,
		nonces: Arc<dyn NonceProvider>,
		runtime: Option<Handle>,
	) -> Self {
		let store = Arc::new(CredentialStore::new(
			config.client_id.clone(),
			config.shared_secret.clone(),
		));
		let signer = RequestSigner::new(nonces.clone(), clock.clone());
		let machine = Mutex::new(Machine {
			state: SessionState::Unauthenticated,
			pending: VecDeque::new(),
			released: VecDeque::new(),
			draining: false,
			login: LoginRequest::default(),
			login_waiter: None,
			failure: None,
			epoch: 0,
			due: false,
		});

		Self {
			inner: Arc::new(Shared {
				config,
				transport,
				store,
				signer,
				clock,
				nonces,
				runtime,
				metrics: Arc::new(SessionMetrics::default()),
				machine,
			}),
		}
	}

	/// Builds a fresh manager sharing this one's configuration and transport.
	pub(crate) fn rebuild(
		&self,
		clock: Arc<dyn Clock>,
		nonces: Arc<dyn NonceProvider>,
		runtime: Option<Handle>,
	) -> Self {
		Self::new(self.inner.config.clone(), self.inner.transport.clone(), clock, nonces, runtime)
	}

	/// Configuration the manager was built with.
	pub fn config(&self) -> &ClientConfig {
		&self.inner.config
	}

	/// Clock used for stamping and expiry checks.
	pub fn clock(&self) -> &Arc<dyn Clock> {
		&self.inner.clock
	}

	/// Nonce source used for stamping.
	pub fn nonces(&self) -> &Arc<dyn NonceProvider> {
		&self.inner.nonces
	}

	/// Credential store written on every transition into [`SessionState::Active`].
	pub fn store(&self) -> &Arc<CredentialStore> {
		&self.inner.store
	}

	/// Session activity counters.
	pub fn metrics(&self) -> &Arc<SessionMetrics> {
		&self.inner.metrics
	}

	/// Runtime background work is spawned on, if one is reachable from here.
	pub fn runtime(&self) -> Option<Handle> {
		self.inner.runtime()
	}

	pub(crate) fn configured_runtime(&self) -> Option<&Handle> {
		self.inner.runtime.as_ref()
	}

	/// Current lifecycle state.
	pub fn state(&self) -> SessionState {
		self.inner.machine.lock().state
	}

	/// Authenticates, optionally as a player, and resolves once the session settles.
	///
	/// The login is remembered and reused whenever the session has to be re-established.
	/// Fails with [`SessionError::LoginInProgress`] while another login or refresh is in
	/// flight.
	pub async fn login(
		&self,
		username: Option<Username>,
		password: Option<Password>,
	) -> Result<()> {
		let (tx, rx) = oneshot::channel();

		{
			let mut machine = self.inner.machine.lock();

			if machine.state.is_transitioning() {
				return Err(SessionError::LoginInProgress.into());
			}

			let login = LoginRequest { username, password };

			machine.login = login.clone();
			machine.login_waiter = Some(tx);

			self.inner.begin(&mut machine, Transition::Login(login));
		}

		rx.await.unwrap_or_else(|_| Err(SessionError::Cancelled.into()))
	}

	/// Signs and dispatches a call, establishing or refreshing the session first when needed.
	///
	/// The wait is bounded by [`ClientConfig::call_timeout`]. Dropping the future before the
	/// call is dispatched skips the dispatch; dropping it afterwards only discards the outcome.
	pub async fn call(&self, endpoint: Endpoint, body: Vec<u8>) -> Result<ApiResponse> {
		let reply = self.enqueue(endpoint, body);

		self.wait(reply).await
	}

	/// Submits a call synchronously; submission order is the order of these calls.
	pub(crate) fn enqueue(&self, endpoint: Endpoint, body: Vec<u8>) -> CallReceiver {
		let (tx, rx) = oneshot::channel();

		self.inner.submit(endpoint, body, tx);

		rx
	}

	/// Waits for an enqueued call, bounded by [`ClientConfig::call_timeout`].
	pub(crate) async fn wait(&self, reply: CallReceiver) -> Result<ApiResponse> {
		match tokio::time::timeout(self.inner.config.call_timeout.unsigned_abs(), reply).await {
			Ok(Ok(result)) => result,
			Ok(Err(_)) => Err(SessionError::Cancelled.into()),
			Err(_) => Err(TransportError::Timeout.into()),
		}
	}

	/// Drops the session locally, then tells the backend.
	///
	/// Local invalidation always happens: queued calls fail with [`SessionError::LoggedOut`],
	/// in-flight exchanges are discarded, and the remembered login is forgotten. The remote
	/// notification is best effort and its failure is returned to the caller.
	pub async fn logout(&self) -> Result<()> {
		let (request, epoch) = {
			let mut machine = self.inner.machine.lock();
			let session = self.inner.store.get().session;

			machine.epoch += 1;
			machine.due = false;
			machine.failure = None;
			machine.login = LoginRequest::default();

			self.inner.store.invalidate();

			for call in machine.take_pending() {
				let _ = call.tx.send(Err(SessionError::LoggedOut.into()));
			}
			for call in mem::take(&mut machine.released) {
				let _ = call.tx.send(Err(SessionError::LoggedOut.into()));
			}
			if let Some(waiter) = machine.login_waiter.take() {
				let _ = waiter.send(Err(SessionError::LoggedOut.into()));
			}

			self.inner.set_state(&mut machine, SessionState::Unauthenticated);

			let endpoint = Endpoint::post(self.inner.config.endpoints.logout.clone());
			let request = session
				.map(|session| self.inner.prepare_call(&session.token, &endpoint, Vec::new()));

			(request, machine.epoch)
		};
		let Some(request) = request else {
			return Ok(());
		};
		let flight = self.inner.launch_call(OpKind::Logout, request?);

		self.inner.land(flight, epoch).await.map(|_| ())
	}
}
impl<T> Clone for SessionManager<T>
where
	T: Transport,
{
	fn clone(&self) -> Self {
		Self { inner: self.inner.clone() }
	}
}
impl<T> Debug for SessionManager<T>
where
	T: Transport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionManager")
			.field("client_id", &self.inner.config.client_id)
			.field("state", &self.state())
			.finish()
	}
}

#[derive(Clone, Debug, Default)]
struct LoginRequest {
	username: Option<Username>,
	password: Option<Password>,
}

#[derive(Debug)]
struct PendingCall {
	endpoint: Endpoint,
	body: Vec<u8>,
	tx: CallSender,
}

// Signed under the session lock, awaiting sequential dispatch.
#[derive(Debug)]
struct ReleasedCall {
	request: Result<HttpRequest>,
	epoch: u64,
	tx: CallSender,
}

// A request already handed to the transport.
struct Flight {
	kind: OpKind,
	id: RequestId,
	deadline: std::time::Duration,
	started: tokio::time::Instant,
	response: TransportFuture,
}

#[derive(Debug)]
enum Transition {
	Login(LoginRequest),
	Refresh(SessionCredential),
}
impl Transition {
	fn kind(&self) -> OpKind {
		match self {
			Transition::Login(_) => OpKind::Login,
			Transition::Refresh(_) => OpKind::Refresh,
		}
	}
}

struct Machine {
	state: SessionState,
	pending: VecDeque<PendingCall>,
	released: VecDeque<ReleasedCall>,
	// Set while a task is dispatching `released`.
	draining: bool,
	login: LoginRequest,
	login_waiter: Option<oneshot::Sender<Result<()>>>,
	failure: Option<Error>,
	epoch: u64,
	// Set when the backend reports the session token as expired.
	due: bool,
}
impl Machine {
	fn park(&mut self, call: PendingCall) {
		self.pending.push_back(call);

		obs::record_pending_calls(self.pending.len());
	}

	fn take_pending(&mut self) -> VecDeque<PendingCall> {
		obs::record_pending_calls(0);

		mem::take(&mut self.pending)
	}
}

#[derive(Serialize)]
struct LoginBody<'a> {
	client_id: &'a str,
	#[serde(skip_serializing_if = "Option::is_none")]
	username: Option<&'a str>,
	#[serde(skip_serializing_if = "Option::is_none")]
	password: Option<&'a str>,
}

#[derive(Serialize)]
struct RefreshBody<'a> {
	session_token: &'a str,
}

#[derive(Deserialize)]
struct SessionGrant {
	session_token: String,
	expires_in: i64,
}

struct Shared<T> {
	config: ClientConfig,
	transport: Arc<T>,
	store: Arc<CredentialStore>,
	signer: RequestSigner,
	clock: Arc<dyn Clock>,
	nonces: Arc<dyn NonceProvider>,
	runtime: Option<Handle>,
	metrics: Arc<SessionMetrics>,
	machine: Mutex<Machine>,
}
impl<T> Shared<T>
where
	T: Transport,
{
	fn submit(self: &Arc<Self>, endpoint: Endpoint, body: Vec<u8>, tx: CallSender) {
		let mut machine = self.machine.lock();
		let state = machine.state;

		match state {
			SessionState::Authenticating | SessionState::Refreshing =>
				machine.park(PendingCall { endpoint, body, tx }),
			SessionState::Failed(reason) if reason.is_terminal() => {
				let message = machine.failure.as_ref().map(ToString::to_string);
				let _ = tx.send(Err(SessionError::Failed { reason, message }.into()));
			},
			SessionState::Active => {
				let now = self.clock.now_utc();
				let session = self.store.get().session;
				let margin = self.config.refresh_margin;
				let status = session.as_ref().map(|session| session.status_at(now, margin));

				match (session, status) {
					(Some(session), Some(SessionStatus::Active)) if !machine.due => {
						let epoch = machine.epoch;
						let request = self.prepare_call(&session.token, &endpoint, body);

						if machine.draining {
							machine.released.push_back(ReleasedCall { request, epoch, tx });

							return;
						}

						let Some(runtime) = self.runtime() else {
							let _ = tx.send(Err(ConfigError::NoRuntime.into()));

							return;
						};
						let flight = request.map(|request| self.launch_call(OpKind::Call, request));

						drop(machine);

						let shared = self.clone();

						runtime.spawn(async move {
							let result = match flight {
								Ok(flight) => shared.land(flight, epoch).await,
								Err(e) => Err(e),
							};
							let _ = tx.send(result);
						});
					},
					(Some(session), Some(SessionStatus::Active | SessionStatus::Due)) => {
						machine.park(PendingCall { endpoint, body, tx });

						self.begin(&mut machine, Transition::Refresh(session));
					},
					_ => {
						let login = machine.login.clone();

						machine.park(PendingCall { endpoint, body, tx });

						self.begin(&mut machine, Transition::Login(login));
					},
				}
			},
			SessionState::Unauthenticated | SessionState::Failed(_) => {
				let login = machine.login.clone();

				machine.park(PendingCall { endpoint, body, tx });

				self.begin(&mut machine, Transition::Login(login));
			},
		}
	}

	fn begin(self: &Arc<Self>, machine: &mut Machine, transition: Transition) {
		let next = match transition {
			Transition::Login(_) => SessionState::Authenticating,
			Transition::Refresh(_) => SessionState::Refreshing,
		};

		machine.epoch += 1;

		self.set_state(machine, next);

		let epoch = machine.epoch;
		let kind = transition.kind();
		let Some(runtime) = self.runtime() else {
			self.fail(machine, kind, ConfigError::NoRuntime.into());

			return;
		};
		let guard = SettleGuard { shared: self.clone(), epoch, kind, settled: false };

		runtime.spawn(async move {
			let outcome = guard.shared.run_transition(&transition, epoch).await;

			guard.settle(outcome);
		});
	}

	async fn run_transition(
		&self,
		transition: &Transition,
		epoch: u64,
	) -> Result<SessionCredential> {
		let kind = transition.kind();

		self.note(kind, OpOutcome::Attempt);

		let result = OpSpan::transition(kind, epoch).instrument(self.exchange(transition)).await;

		self.note(kind, if result.is_ok() { OpOutcome::Success } else { OpOutcome::Failure });

		result
	}

	async fn exchange(&self, transition: &Transition) -> Result<SessionCredential> {
		let kind = transition.kind();
		let (path, payload, username) = match transition {
			Transition::Login(login) => {
				let body = LoginBody {
					client_id: &self.config.client_id,
					username: login.username.as_deref(),
					password: login.password.as_ref().map(Password::expose),
				};

				(&self.config.endpoints.login, serde_json::to_vec(&body), login.username.clone())
			},
			Transition::Refresh(session) => {
				let body = RefreshBody { session_token: session.token.expose() };
				let username = session.username.clone();

				(&self.config.endpoints.refresh, serde_json::to_vec(&body), username)
			},
		};
		let payload = payload.map_err(|e| ConfigError::Payload { message: e.to_string() })?;
		let endpoint = Endpoint::post(path.clone());
		let mut attempt = 0;

		loop {
			attempt += 1;

			let request = self.build_request(
				self.config.shared_secret.expose(),
				None,
				&endpoint,
				payload.clone(),
			)?;
			let outcome = match self.fly(self.launch(kind, request)).await {
				Ok(response) =>
					Envelope::from_response(&response).map(|data| (response.status, data)),
				Err(e) => Err(e.into()),
			};

			match outcome {
				Ok((status, data)) => return self.issue(&data, status, username),
				Err(Error::Transport(last))
					if last.is_transient() && attempt <= self.config.max_retries =>
				{
					let delay = self.config.backoff_for(attempt).unsigned_abs();

					self.note(kind, OpOutcome::Retry);
					obs::trace_retry(kind, attempt, delay, &last);
					tokio::time::sleep(delay).await;
				},
				Err(Error::Transport(last)) =>
					return Err(SessionError::TransportExhausted { attempts: attempt, last }.into()),
				Err(e) => return Err(e),
			}
		}
	}

	fn issue(
		&self,
		data: &serde_json::Value,
		status: u16,
		username: Option<Username>,
	) -> Result<SessionCredential> {
		let grant: SessionGrant = response::decode(data, status)?;

		if grant.session_token.is_empty() {
			return Err(AuthError::MalformedResponse {
				reason: "session_token is empty".into(),
				status: Some(status),
			}
			.into());
		}
		if grant.expires_in <= 0 {
			return Err(AuthError::MalformedResponse {
				reason: format!("expires_in must be positive, got {}", grant.expires_in),
				status: Some(status),
			}
			.into());
		}

		SessionCredential::issued(
			TokenSecret::new(grant.session_token),
			self.clock.now_utc(),
			Duration::seconds(grant.expires_in),
			username,
		)
		.ok_or_else(|| {
			AuthError::MalformedResponse {
				reason: format!("expires_in of {} seconds is out of range", grant.expires_in),
				status: Some(status),
			}
			.into()
		})
	}

	fn settle(self: &Arc<Self>, epoch: u64, kind: OpKind, outcome: Result<SessionCredential>) {
		let mut machine = self.machine.lock();

		if machine.epoch != epoch {
			self.metrics.record_discarded();
			obs::trace_discarded(kind, epoch, machine.epoch);

			return;
		}

		let outcome = outcome.and_then(|session| {
			let credential = self.store.get().with_session(session.clone());

			self.store.set(credential).map_err(|e| {
				Error::from(SessionError::Failed {
					reason: FailureReason::Misconfigured,
					message: Some(e.to_string()),
				})
			})?;

			Ok(session)
		});

		match outcome {
			Ok(session) => {
				machine.due = false;
				machine.failure = None;

				self.set_state(&mut machine, SessionState::Active);

				if let Some(waiter) = machine.login_waiter.take() {
					let _ = waiter.send(Ok(()));
				}

				// Signed now, under the lock, so nonces follow submission order.
				let released = machine
					.take_pending()
					.into_iter()
					.map(|call| ReleasedCall {
						request: self.prepare_call(&session.token, &call.endpoint, call.body),
						epoch,
						tx: call.tx,
					})
					.collect::<Vec<_>>();

				machine.released.extend(released);

				if machine.draining || machine.released.is_empty() {
					return;
				}

				let Some(runtime) = self.runtime() else {
					for call in mem::take(&mut machine.released) {
						let _ = call.tx.send(Err(ConfigError::NoRuntime.into()));
					}

					return;
				};

				machine.draining = true;

				runtime.spawn(self.clone().drain());
			},
			Err(err) => self.fail(&mut machine, kind, err),
		}
	}

	fn fail(&self, machine: &mut Machine, kind: OpKind, err: Error) {
		let reason = FailureReason::of(&err);

		self.set_state(machine, SessionState::Failed(reason));

		machine.failure = Some(err.clone());

		if let Some(waiter) = machine.login_waiter.take() {
			let _ = waiter.send(Err(err.clone()));
		}

		let queued = match kind {
			OpKind::Refresh => Error::from(SessionError::SessionExpired),
			_ => err,
		};

		for call in machine.take_pending() {
			let _ = call.tx.send(Err(queued.clone()));
		}
	}

	async fn drain(self: Arc<Self>) {
		while let Some(ReleasedCall { request, epoch, tx }) = self.next_released() {
			let result = match request {
				Ok(request) => self.land(self.launch_call(OpKind::Call, request), epoch).await,
				Err(e) => Err(e),
			};
			let _ = tx.send(result);
		}
	}

	fn next_released(&self) -> Option<ReleasedCall> {
		let mut machine = self.machine.lock();

		while let Some(call) = machine.released.pop_front() {
			if !call.tx.is_closed() {
				return Some(call);
			}
		}

		machine.draining = false;

		None
	}

	fn launch_call(&self, kind: OpKind, request: HttpRequest) -> Flight {
		self.note(kind, OpOutcome::Attempt);

		self.launch(kind, request)
	}

	fn launch(&self, kind: OpKind, request: HttpRequest) -> Flight {
		self.metrics.record_transport_attempt();

		Flight {
			kind,
			id: request.id,
			deadline: request.timeout,
			started: tokio::time::Instant::now(),
			response: self.transport.execute(request),
		}
	}

	async fn land(&self, flight: Flight, epoch: u64) -> Result<ApiResponse> {
		let (kind, request_id) = (flight.kind, flight.id);
		let result = self
			.fly(flight)
			.await
			.map_err(Error::from)
			.and_then(|response| interpret(request_id, &response));

		match &result {
			Ok(_) => self.note(kind, OpOutcome::Success),
			Err(e) => {
				if matches!(e, Error::Auth(AuthError::Expired { .. })) {
					self.mark_due(epoch);
				}

				self.note(kind, OpOutcome::Failure);
			},
		}

		result
	}

	async fn fly(&self, flight: Flight) -> Result<HttpResponse, TransportError> {
		let Flight { kind, id, deadline, started, response } = flight;
		let outcome =
			OpSpan::request(kind, id).instrument(tokio::time::timeout(deadline, response)).await;

		obs::record_transport_latency(kind, started.elapsed());

		match outcome {
			Ok(result) => result,
			Err(_) => Err(TransportError::Timeout),
		}
	}

	fn prepare_call(
		&self,
		token: &TokenSecret,
		endpoint: &Endpoint,
		body: Vec<u8>,
	) -> Result<HttpRequest> {
		self.build_request(token.expose().as_bytes(), Some(token), endpoint, body)
	}

	fn build_request(
		&self,
		key: &[u8],
		bearer: Option<&TokenSecret>,
		endpoint: &Endpoint,
		body: Vec<u8>,
	) -> Result<HttpRequest> {
		let mut url = self.config.url_for(&endpoint.path)?;
		let unsigned = SignedRequest::new(endpoint.method, url.path())
			.with_query(endpoint.query.clone())
			.with_body(body);
		let query = unsigned.canonical_query();

		if !query.is_empty() {
			url.set_query(Some(&query));
		}

		let (signed, envelope) = self.signer.stamp_and_sign(key, unsigned)?;
		let mut headers = vec![
			(
				AUTH_HEADER.to_owned(),
				sign::auth_header_value(&self.config.client_id, &signed, &envelope),
			),
			("accept".to_owned(), "application/json".to_owned()),
			("user-agent".to_owned(), self.config.user_agent.clone()),
		];

		if !signed.body.is_empty() {
			headers.push(("content-type".to_owned(), "application/json".to_owned()));
		}
		if let Some(token) = bearer {
			headers.push(("authorization".to_owned(), format!("Bearer {}", token.expose())));
		}

		Ok(HttpRequest {
			id: RequestId::next(),
			method: signed.method,
			url,
			headers,
			body: signed.body,
			timeout: self.config.attempt_timeout.unsigned_abs(),
		})
	}

	fn mark_due(&self, epoch: u64) {
		let mut machine = self.machine.lock();

		if machine.epoch == epoch && machine.state == SessionState::Active {
			machine.due = true;
		}
	}

	fn runtime(&self) -> Option<Handle> {
		self.runtime.clone().or_else(|| Handle::try_current().ok())
	}

	fn set_state(&self, machine: &mut Machine, next: SessionState) {
		obs::record_transition(machine.state, next);

		machine.state = next;
	}

	fn note(&self, kind: OpKind, outcome: OpOutcome) {
		let counters = match kind {
			OpKind::Login => &self.metrics.logins,
			OpKind::Refresh => &self.metrics.refreshes,
			OpKind::Call | OpKind::Logout => &self.metrics.calls,
		};

		counters.record(outcome);
		obs::record_op_outcome(kind, outcome);
	}
}

// Settles its exchange as aborted if the task unwinds or is dropped before settling.
struct SettleGuard<T>
where
	T: Transport,
{
	shared: Arc<Shared<T>>,
	epoch: u64,
	kind: OpKind,
	settled: bool,
}
impl<T> SettleGuard<T>
where
	T: Transport,
{
	fn settle(mut self, outcome: Result<SessionCredential>) {
		self.settled = true;

		self.shared.settle(self.epoch, self.kind, outcome);
	}
}
impl<T> Drop for SettleGuard<T>
where
	T: Transport,
{
	fn drop(&mut self) {
		if !self.settled {
			self.shared.settle(self.epoch, self.kind, Err(SessionError::Aborted.into()));
		}
	}
}

fn interpret(request_id: RequestId, response: &HttpResponse) -> Result<ApiResponse> {
	let data = Envelope::from_response(response)?;

	Ok(ApiResponse { request_id, status: response.status, data })
}
