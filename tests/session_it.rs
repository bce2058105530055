// std
use std::sync::Arc;
// crates.io
use serde_json::json;
use tokio::sync::Notify;
// self
use leet_client::{
	_preludet::*,
	api::{Endpoint, SessionRegistration},
	clock::ManualClock,
	config::ClientConfig,
	error::{AuthError, ConfigError, SessionError, TransportError},
	http::HttpRequest,
	session::{FailureReason, SessionState},
};

const LOGIN: &str = "/v1/session/login";
const REFRESH: &str = "/v1/session/refresh";
const LOGOUT: &str = "/v1/session/logout";
const PING: &str = "/v1/ping";

async fn logged_in() -> (ScriptedClient, Arc<ScriptedTransport>, Arc<ManualClock>) {
	let (client, transport, clock) = build_scripted_client(scripted_config());

	transport.push(LOGIN, Reply::session("tok-1", 3600));
	client.login("ada", "pw").await.expect("Login should succeed.");

	(client, transport, clock)
}

fn nonce_of(request: &HttpRequest) -> u64 {
	request
		.header("x-leet-auth")
		.and_then(|header| header.split(',').find_map(|part| part.strip_prefix("nonce=")))
		.expect("Request should carry a nonce.")
		.parse()
		.expect("Default nonces should be numeric.")
}

async fn settle() {
	tokio::time::sleep(std::time::Duration::from_millis(50)).await;
}

#[tokio::test]
async fn active_session_issues_exactly_one_transport_call() {
	let (client, transport, _) = logged_in().await;

	transport.push(PING, Reply::ok(json!({ "pong": true })));

	let attempts_before = client.metrics().transport_attempts();

	client.call(Endpoint::get(PING), None).await.expect("Ping should succeed.");

	assert_eq!(client.metrics().transport_attempts() - attempts_before, 1);
	assert_eq!(transport.paths(), [LOGIN, PING]);
	assert_eq!(client.metrics().refreshes.attempts(), 0);
}

#[tokio::test]
async fn near_expiry_refreshes_once_before_the_call() {
	let (client, transport, clock) = logged_in().await;

	clock.advance(Duration::seconds(3300));
	transport.push(REFRESH, Reply::session("tok-2", 3600));
	transport.push(PING, Reply::ok(json!({ "pong": 1 })));
	transport.push(PING, Reply::ok(json!({ "pong": 2 })));

	let ping = || client.call(Endpoint::get(PING), None);
	let (first, second) = tokio::join!(ping(), ping());

	assert_eq!(first.expect("First call should succeed.").data, json!({ "pong": 1 }));
	assert_eq!(second.expect("Second call should succeed.").data, json!({ "pong": 2 }));
	assert_eq!(transport.paths(), [LOGIN, REFRESH, PING, PING]);

	let refresh = &transport.requests()[1];
	let body: serde_json::Value =
		serde_json::from_slice(&refresh.body).expect("Refresh body should be JSON.");

	assert_eq!(body, json!({ "session_token": "tok-1" }));
	assert_eq!(transport.requests()[2].header("authorization"), Some("Bearer tok-2"));
	assert_eq!(client.metrics().refreshes.successes(), 1);
	assert_eq!(
		client.credential().session.map(|session| session.username.map(String::from)),
		Some(Some("ada".to_owned()))
	);
}

#[tokio::test]
async fn calls_queued_during_refresh_complete_in_submission_order() {
	let (client, transport, clock) = logged_in().await;
	let gate = Arc::new(Notify::new());

	clock.advance(Duration::seconds(3500));
	transport.push(REFRESH, Reply::Gated(gate.clone(), Box::new(Reply::session("tok-2", 3600))));

	for n in 0..4 {
		transport.push(PING, Reply::ok(json!({ "n": n })));
	}

	let tickets = (0..4).map(|_| client.submit(Endpoint::get(PING), None)).collect::<Vec<_>>();

	assert_eq!(client.state(), SessionState::Refreshing);

	gate.notify_one();

	let mut completions = Vec::new();

	for _ in 0..4 {
		completions.push(client.completions().next().await);
	}

	completions.sort_by_key(|completion| completion.ticket);

	assert_eq!(completions.iter().map(|c| c.ticket).collect::<Vec<_>>(), tickets);

	for (n, completion) in completions.into_iter().enumerate() {
		let response = completion.result.expect("Queued call should succeed.");

		assert_eq!(response.data, json!({ "n": n }));
	}

	let requests = transport.requests();
	let nonces = requests[2..].iter().map(nonce_of).collect::<Vec<_>>();

	assert_eq!(transport.hits(REFRESH), 1);
	assert!(nonces.windows(2).all(|pair| pair[0] < pair[1]), "Nonces follow submission order.");
}

#[tokio::test]
async fn failed_refresh_fails_queued_calls_with_session_expired() {
	let (client, transport, clock) = logged_in().await;

	clock.advance(Duration::seconds(3500));
	transport.push(REFRESH, Reply::error(401, "invalid_token", "Token revoked."));

	let ping = || client.call(Endpoint::get(PING), None);
	let (first, second) = tokio::join!(ping(), ping());

	for result in [first, second] {
		assert_eq!(
			result.expect_err("Queued call should fail."),
			Error::Session(SessionError::SessionExpired)
		);
	}

	assert_eq!(client.state(), SessionState::Failed(FailureReason::Rejected));
	assert_eq!(transport.hits(PING), 0);
	assert_eq!(
		client.credential().session_token().map(|token| token.expose().to_owned()),
		Some("tok-1".to_owned()),
		"A failed refresh must leave the stored credential untouched."
	);
}

#[tokio::test]
async fn login_gives_up_after_three_retries() {
	let (client, transport, _) = build_scripted_client(scripted_config());

	for _ in 0..5 {
		transport.push(LOGIN, Reply::Fail(TransportError::Timeout));
	}

	let err = client.login("ada", "pw").await.expect_err("Login should exhaust its retries.");

	assert_eq!(
		err,
		Error::Session(SessionError::TransportExhausted {
			attempts: 4,
			last: TransportError::Timeout
		})
	);
	assert_eq!(transport.hits(LOGIN), 4);
	assert_eq!(client.state(), SessionState::Failed(FailureReason::TransportExhausted));
	assert!(client.credential().session.is_none());
}

#[tokio::test]
async fn hung_attempts_time_out_and_are_retried() {
	let config = ClientConfig::builder(scripted_base_url(), "title-7", "shared-secret")
		.attempt_timeout(Duration::milliseconds(20))
		.initial_backoff(Duration::milliseconds(1))
		.max_backoff(Duration::milliseconds(2))
		.build()
		.expect("Configuration should be valid.");
	let (client, transport, _) = build_scripted_client(config);

	transport.push(LOGIN, Reply::Hang);
	transport.push(LOGIN, Reply::Fail(TransportError::ConnectionRefused { message: "rst".into() }));
	transport.push(LOGIN, Reply::session("tok-1", 3600));

	client.login_title().await.expect("Login should recover within its retry budget.");

	assert_eq!(transport.hits(LOGIN), 3);
	assert_eq!(client.state(), SessionState::Active);
	assert_eq!(client.metrics().logins.successes(), 1);
}

#[tokio::test]
async fn non_transient_transport_failures_are_not_retried() {
	let (client, transport, _) = build_scripted_client(scripted_config());

	transport.push(LOGIN, Reply::Fail(TransportError::DnsFailure { message: "nxdomain".into() }));

	let err = client.login_title().await.expect_err("DNS failure should fail the login.");

	assert!(matches!(
		err,
		Error::Session(SessionError::TransportExhausted {
			attempts: 1,
			last: TransportError::DnsFailure { .. }
		})
	));
	assert_eq!(transport.hits(LOGIN), 1);
}

#[tokio::test]
async fn exhausted_sessions_reauthenticate_on_the_next_call() {
	let (client, transport, _) = build_scripted_client(scripted_config());

	for _ in 0..4 {
		transport.push(LOGIN, Reply::Fail(TransportError::Timeout));
	}

	client.login("ada", "pw").await.expect_err("Login should exhaust its retries.");
	transport.push(LOGIN, Reply::session("tok-1", 3600));
	transport.push(PING, Reply::ok(json!(null)));
	client.call(Endpoint::get(PING), None).await.expect("Call should re-authenticate.");

	let relogin = &transport.requests()[4];
	let body: serde_json::Value =
		serde_json::from_slice(&relogin.body).expect("Login body should be JSON.");

	assert_eq!(body, json!({ "client_id": "title-7", "username": "ada", "password": "pw" }));
	assert_eq!(client.state(), SessionState::Active);
}

#[tokio::test]
async fn malformed_grants_fail_the_session() {
	let (client, transport, _) = build_scripted_client(scripted_config());

	transport.push(LOGIN, Reply::ok(json!({ "session_token": "tok-1" })));

	let err = client.login_title().await.expect_err("Grant without lifetime should fail.");

	assert!(matches!(err, Error::Auth(AuthError::MalformedResponse { .. })));
	assert_eq!(client.state(), SessionState::Failed(FailureReason::MalformedResponse));

	transport.push(LOGIN, Reply::session("tok-1", 0));

	let err = client.login_title().await.expect_err("Zero lifetime should fail.");

	assert!(matches!(err, Error::Auth(AuthError::MalformedResponse { .. })));
	assert!(client.credential().session.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn out_of_range_lifetimes_fail_the_session() {
	let (client, transport, _) = build_scripted_client(scripted_config());

	transport.push(LOGIN, Reply::session("tok-1", 1_000_000_000_000));

	let err = client.login("ada", "pw").await.expect_err("Unrepresentable expiry should fail.");

	assert!(matches!(err, Error::Auth(AuthError::MalformedResponse { .. })));
	assert_eq!(client.state(), SessionState::Failed(FailureReason::MalformedResponse));

	transport.push(LOGIN, Reply::session("tok-2", 3600));

	client.login("ada", "pw").await.expect("A later login should succeed.");

	assert_eq!(client.state(), SessionState::Active);
}

#[tokio::test]
async fn exchanges_that_unwind_still_settle() {
	let (client, transport, _) = build_scripted_client(scripted_config());

	transport.push(LOGIN, Reply::Panic);

	let err = client.login("ada", "pw").await.expect_err("Faulted login should fail.");

	assert_eq!(err, Error::Session(SessionError::Aborted));
	assert_eq!(client.state(), SessionState::Failed(FailureReason::Misconfigured));

	transport.push(LOGIN, Reply::session("tok-1", 3600));

	client.login("ada", "pw").await.expect("Login after a fault should succeed.");

	assert_eq!(client.state(), SessionState::Active);
}

#[tokio::test]
async fn backend_expiry_refreshes_before_the_next_call() {
	let (client, transport, _) = logged_in().await;

	transport.push(PING, Reply::error(401, "session_expired", "Session timed out."));
	transport.push(REFRESH, Reply::session("tok-2", 3600));
	transport.push(PING, Reply::ok(json!({ "pong": true })));

	let err = client.call(Endpoint::get(PING), None).await.expect_err("Expired call should fail.");

	assert!(matches!(err, Error::Auth(AuthError::Expired { .. })));
	assert_eq!(err.backend_message(), Some("Session timed out."));

	client.call(Endpoint::get(PING), None).await.expect("Next call should refresh first.");

	assert_eq!(transport.paths(), [LOGIN, PING, REFRESH, PING]);
}

#[tokio::test]
async fn login_is_rejected_while_a_transition_is_in_flight() {
	let (client, transport, _) = build_scripted_client(scripted_config());
	let gate = Arc::new(Notify::new());

	transport.push(LOGIN, Reply::Gated(gate.clone(), Box::new(Reply::session("tok-1", 3600))));

	let ticket = client.submit(Endpoint::get(PING), None);

	assert_eq!(client.state(), SessionState::Authenticating);
	assert_eq!(
		client.login("bob", "pw").await.expect_err("Second login should be refused."),
		Error::Session(SessionError::LoginInProgress)
	);

	transport.push(PING, Reply::ok(json!(null)));
	gate.notify_one();

	let completion = client.completions().next().await;

	assert_eq!(completion.ticket, ticket);
	assert!(completion.result.is_ok());
}

#[tokio::test]
async fn logout_fails_pending_calls_and_discards_late_refreshes() {
	let (client, transport, clock) = logged_in().await;
	let gate = Arc::new(Notify::new());

	clock.advance(Duration::seconds(3500));
	transport.push(REFRESH, Reply::Gated(gate.clone(), Box::new(Reply::session("tok-2", 3600))));
	transport.push(LOGOUT, Reply::ok(json!(null)));

	let ticket = client.submit(Endpoint::get(PING), None);

	client.logout().await.expect("Logout should succeed.");

	let completion = client.completions().next().await;

	assert_eq!(completion.ticket, ticket);
	assert_eq!(
		completion.result.expect_err("Pending call should fail."),
		Error::Session(SessionError::LoggedOut)
	);
	assert_eq!(client.state(), SessionState::Unauthenticated);
	assert!(client.credential().session.is_none());

	let logout = transport
		.requests()
		.into_iter()
		.find(|request| request.url.path() == LOGOUT)
		.expect("Logout should have been sent.");

	assert_eq!(logout.url.path(), LOGOUT);
	assert_eq!(logout.header("authorization"), Some("Bearer tok-1"));

	gate.notify_one();
	settle().await;

	assert_eq!(client.state(), SessionState::Unauthenticated);
	assert!(client.credential().session.is_none());
	assert_eq!(transport.hits(PING), 0);
	assert_eq!(client.metrics().discarded_outcomes(), 1);
}

#[tokio::test]
async fn logout_without_a_session_stays_local() {
	let (client, transport, _) = build_scripted_client(scripted_config());

	client.logout().await.expect("Local logout should succeed.");

	assert!(transport.requests().is_empty());
	assert_eq!(client.state(), SessionState::Unauthenticated);
}

#[tokio::test]
async fn cancelled_queued_calls_are_never_dispatched() {
	let (client, transport, clock) = logged_in().await;
	let gate = Arc::new(Notify::new());

	clock.advance(Duration::seconds(3500));
	transport.push(REFRESH, Reply::Gated(gate.clone(), Box::new(Reply::session("tok-2", 3600))));

	let cancelled = tokio::time::timeout(
		std::time::Duration::from_millis(10),
		client.call(Endpoint::get(PING), None),
	)
	.await;

	assert!(cancelled.is_err(), "The call should still be queued when its caller gives up.");

	gate.notify_one();
	settle().await;

	assert_eq!(client.state(), SessionState::Active);
	assert_eq!(transport.hits(PING), 0);
	assert_eq!(
		client.credential().session_token().map(|token| token.expose().to_owned()),
		Some("tok-2".to_owned()),
		"The refresh must complete even though its caller went away."
	);
}

#[tokio::test]
async fn slow_calls_surface_timeouts() {
	let (client, transport, _) = logged_in().await;

	transport.push(PING, Reply::Hang);

	let err = client.call(Endpoint::get(PING), None).await.expect_err("Hung call should time out.");

	assert_eq!(err, Error::Transport(TransportError::Timeout));
	assert_eq!(client.state(), SessionState::Active);
}

#[tokio::test]
async fn typed_calls_decode_the_payload() {
	let (client, transport, _) = logged_in().await;

	transport.push(
		"/api/v2/server/info",
		Reply::ok(json!({
			"authorization": true,
			"incrementBTC": 200,
			"minimumBTCHold": 1000,
			"serverRakeBTCPercentage": 0.25,
			"leetcoinRakePercentage": 0.25,
		})),
	);

	let info = client
		.server_info(&SessionRegistration::hosted("10.0.0.5:7777", "match-1"))
		.await
		.expect("Server info should succeed.");

	assert_eq!(info.kill_reward_btc(), Some(100));

	let request = transport.requests().pop().expect("Server info should have been sent.");
	let body: serde_json::Value =
		serde_json::from_slice(&request.body).expect("Registration body should be JSON.");

	assert_eq!(body, json!({ "session_host_address": "10.0.0.5:7777", "session_id": "match-1" }));

	transport.push(PING, Reply::ok(json!({ "level": "high" })));

	let err = client
		.call_as::<u32>(Endpoint::get(PING), None)
		.await
		.expect_err("Mismatched payload should fail.");

	assert!(matches!(err, Error::Auth(AuthError::MalformedResponse { .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn active_calls_reach_the_transport_in_nonce_order() {
	let (client, transport, _) = logged_in().await;

	for _ in 0..200 {
		transport.push(PING, Reply::ok(json!(null)));
	}

	let submitters = (0..4)
		.map(|_| {
			let client = client.clone();

			tokio::spawn(async move {
				for _ in 0..50 {
					client.submit(Endpoint::get(PING), None);
					tokio::task::yield_now().await;
				}
			})
		})
		.collect::<Vec<_>>();

	for submitter in submitters {
		submitter.await.expect("Submitter should finish.");
	}
	for _ in 0..200 {
		client.completions().next().await.result.expect("Active call should succeed.");
	}

	let nonces = transport.requests()[1..].iter().map(nonce_of).collect::<Vec<_>>();

	assert_eq!(nonces.len(), 200);
	assert!(nonces.windows(2).all(|pair| pair[0] < pair[1]), "Transport order follows nonces.");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn new_calls_wait_behind_released_calls() {
	let (client, transport, clock) = logged_in().await;
	let gate = Arc::new(Notify::new());
	let slow = Arc::new(Notify::new());

	clock.advance(Duration::seconds(3500));
	transport.push(REFRESH, Reply::Gated(gate.clone(), Box::new(Reply::session("tok-2", 3600))));
	transport.push(PING, Reply::Gated(slow.clone(), Box::new(Reply::ok(json!({ "n": 0 })))));

	for n in 1..6 {
		transport.push(PING, Reply::ok(json!({ "n": n })));
	}

	client.submit(Endpoint::get(PING), None);
	gate.notify_one();

	while transport.hits(PING) == 0 {
		tokio::task::yield_now().await;
	}

	for _ in 1..6 {
		client.submit(Endpoint::get(PING), None);
	}

	assert_eq!(transport.hits(PING), 1, "Later calls queue behind the released one.");

	slow.notify_one();

	let mut completions = Vec::new();

	for _ in 0..6 {
		completions.push(client.completions().next().await);
	}

	completions.sort_by_key(|completion| completion.ticket);

	for (n, completion) in completions.into_iter().enumerate() {
		let response = completion.result.expect("Call should succeed.");

		assert_eq!(response.data, json!({ "n": n }));
	}

	let nonces = transport.requests()[2..].iter().map(nonce_of).collect::<Vec<_>>();

	assert!(nonces.windows(2).all(|pair| pair[0] < pair[1]), "Transport order follows nonces.");
}

#[test]
fn engine_threads_submit_without_a_runtime_context() {
	let runtime = tokio::runtime::Builder::new_multi_thread()
		.worker_threads(2)
		.enable_all()
		.build()
		.expect("Runtime should build.");
	let (client, transport, _) = build_scripted_client(scripted_config());
	let client = client.with_runtime(runtime.handle().clone());

	transport.push(LOGIN, Reply::session("tok-1", 3600));
	transport.push(PING, Reply::ok(json!({ "pong": true })));

	let engine = client.clone();
	let ticket = std::thread::spawn(move || engine.submit(Endpoint::get(PING), None))
		.join()
		.expect("Engine thread should not panic.");
	let completion = runtime.block_on(client.completions().next());

	assert_eq!(completion.ticket, ticket);
	assert_eq!(
		completion.result.expect("Submitted call should succeed.").data,
		json!({ "pong": true })
	);
	assert_eq!(transport.paths(), [LOGIN, PING]);
}

#[test]
fn submitting_without_any_runtime_reports_an_error() {
	let (client, transport, _) = build_scripted_client(scripted_config());
	let ticket = client.submit(Endpoint::get(PING), None);
	let completion = client.completions().try_next().expect("Completion should be ready.");

	assert_eq!(completion.ticket, ticket);
	assert_eq!(
		completion.result.expect_err("Submission should fail."),
		Error::Config(ConfigError::NoRuntime)
	);
	assert!(transport.requests().is_empty());
}
