//! Secure session and request-signing client for the Leet online-services backend.
//!
//! Calls are stamped with HMAC-SHA256 signatures, sessions renew themselves before expiry, and
//! dispatch never blocks the caller's frame loop.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod obs;
pub mod session;
pub mod sign;
pub mod store;
#[cfg(any(test, feature = "test"))]
#[doc(hidden)]
pub mod _preludet {
	//! Convenience re-exports and scripted collaborators shared by unit and integration tests.

	pub use crate::_prelude::*;

	// std
	use std::collections::VecDeque;
	// crates.io
	use tokio::sync::Notify;
	// self
	use crate::{
		api::LeetClient,
		clock::ManualClock,
		config::ClientConfig,
		error::TransportError,
		http::{HttpRequest, HttpResponse, Transport, TransportFuture},
	};
	#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;

	/// Client type alias used by scripted tests.
	pub type ScriptedClient = LeetClient<ScriptedTransport>;

	/// Canned reply returned by [`ScriptedTransport`] for one request.
	#[derive(Clone, Debug)]
	pub enum Reply {
		/// Responds with the given HTTP status and JSON body.
		Json(u16, serde_json::Value),
		/// Fails with a transport error.
		Fail(TransportError),
		/// Waits for the gate to open before producing the inner reply.
		Gated(Arc<Notify>, Box<Reply>),
		/// Never resolves; exercises caller-side timeouts.
		Hang,
		/// Panics while polled, as a faulty transport would.
		Panic,
	}
	impl Reply {
		/// Successful envelope wrapping `data`.
		pub fn ok(data: serde_json::Value) -> Self {
			Self::Json(200, serde_json::json!({ "status": "ok", "data": data }))
		}

		/// Error envelope with the given HTTP status and backend code.
		pub fn error(status: u16, code: &str, message: &str) -> Self {
			Self::Json(
				status,
				serde_json::json!({
					"status": "error",
					"error": { "code": code, "message": message },
				}),
			)
		}

		/// Session issuance payload with the provided token and lifetime in seconds.
		pub fn session(token: &str, expires_in: i64) -> Self {
			Self::ok(serde_json::json!({ "session_token": token, "expires_in": expires_in }))
		}
	}

	/// In-process [`Transport`] that answers from per-path reply queues and records every
	/// request it sees, in execution order.
	#[derive(Debug, Default)]
	pub struct ScriptedTransport {
		replies: Mutex<HashMap<String, VecDeque<Reply>>>,
		log: Mutex<Vec<HttpRequest>>,
	}
	impl ScriptedTransport {
		/// Queues a reply for the next request hitting `path`.
		pub fn push(&self, path: &str, reply: Reply) -> &Self {
			self.replies.lock().entry(path.to_owned()).or_default().push_back(reply);

			self
		}

		/// Returns every request executed so far.
		pub fn requests(&self) -> Vec<HttpRequest> {
			self.log.lock().clone()
		}

		/// Returns the paths of every request executed so far.
		pub fn paths(&self) -> Vec<String> {
			self.log.lock().iter().map(|request| request.url.path().to_owned()).collect()
		}

		/// Counts requests executed against `path`.
		pub fn hits(&self, path: &str) -> usize {
			self.log.lock().iter().filter(|request| request.url.path() == path).count()
		}

		fn next_reply(&self, path: &str) -> Reply {
			self.replies
				.lock()
				.get_mut(path)
				.and_then(VecDeque::pop_front)
				.unwrap_or_else(|| Reply::error(404, "not_found", "No scripted reply."))
		}
	}
	impl Transport for ScriptedTransport {
		fn execute(&self, request: HttpRequest) -> TransportFuture {
			let reply = self.next_reply(request.url.path());

			self.log.lock().push(request);

			Box::pin(async move {
				let mut reply = reply;

				loop {
					match reply {
						Reply::Json(status, body) =>
							return Ok(HttpResponse {
								status,
								headers: vec![("content-type".into(), "application/json".into())],
								body: serde_json::to_vec(&body).unwrap_or_default(),
							}),
						Reply::Fail(err) => return Err(err),
						Reply::Gated(gate, inner) => {
							gate.notified().await;

							reply = *inner;
						},
						Reply::Hang => std::future::pending::<()>().await,
					Reply::Panic => panic!("Scripted transport fault."),
					}
				}
			})
		}
	}

	/// Base URL shared by scripted fixtures.
	pub fn scripted_base_url() -> Url {
		Url::parse("https://leet.test").expect("Scripted base URL should parse.")
	}

	/// Configuration with fast backoff suited to scripted tests.
	pub fn scripted_config() -> ClientConfig {
		ClientConfig::builder(scripted_base_url(), "title-7", "shared-secret")
			.initial_backoff(Duration::milliseconds(1))
			.max_backoff(Duration::milliseconds(4))
			.attempt_timeout(Duration::milliseconds(200))
			.call_timeout(Duration::seconds(5))
			.build()
			.expect("Scripted configuration should be valid.")
	}

	/// Builds a client backed by a [`ScriptedTransport`] and a [`ManualClock`].
	pub fn build_scripted_client(
		config: ClientConfig,
	) -> (ScriptedClient, Arc<ScriptedTransport>, Arc<ManualClock>) {
		let transport = Arc::new(ScriptedTransport::default());
		let clock = Arc::new(ManualClock::new(time::macros::datetime!(2025-11-10 12:00 UTC)));
		let client =
			ScriptedClient::with_transport(config, transport.clone()).with_clock(clock.clone());

		(client, transport, clock)
	}

	#[cfg(feature = "reqwest")]
	/// Builds a reqwest-backed client pointed at `base_url`.
	pub fn build_reqwest_test_client(base_url: &str) -> LeetClient<ReqwestTransport> {
		let config = ClientConfig::builder(
			Url::parse(base_url).expect("Mock server URL should parse."),
			"title-http",
			"http-secret",
		)
		.initial_backoff(Duration::milliseconds(1))
		.max_backoff(Duration::milliseconds(4))
		.attempt_timeout(Duration::milliseconds(500))
		.build()
		.expect("Reqwest test configuration should be valid.");

		LeetClient::new(config).expect("Reqwest test client should build.")
	}
}

mod _prelude {
	pub use std::{
		collections::HashMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
