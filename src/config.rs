//! Client configuration, its builder, and JSON loading.

// self
use crate::{
	_prelude::*,
	auth::{ClientId, SharedSecret},
	error::ConfigError,
};

/// Default `User-Agent` header sent with every request.
pub const DEFAULT_USER_AGENT: &str = concat!("leet-client/", env!("CARGO_PKG_VERSION"));

/// Backend paths used by the session and server operations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointPaths {
	/// Credential-issuing login endpoint.
	pub login: String,
	/// Session renewal endpoint.
	pub refresh: String,
	/// Session teardown endpoint.
	pub logout: String,
	/// Server registration and economy lookup endpoint.
	pub server_info: String,
}
impl EndpointPaths {
	fn validate(&self) -> Result<(), ConfigError> {
		for path in [&self.login, &self.refresh, &self.logout, &self.server_info] {
			validate_path(path)?;
		}

		Ok(())
	}
}
impl Default for EndpointPaths {
	fn default() -> Self {
		Self {
			login: "/v1/session/login".into(),
			refresh: "/v1/session/refresh".into(),
			logout: "/v1/session/logout".into(),
			server_info: "/api/v2/server/info".into(),
		}
	}
}

/// Validated client configuration.
///
/// Every timing knob is a default that a title integrating with a real backend is expected to
/// override from the backend's documented contract.
#[derive(Clone, Debug)]
pub struct ClientConfig {
	/// Backend root; endpoint paths are appended to its path.
	pub base_url: Url,
	/// Identifier the backend issued to the title.
	pub client_id: ClientId,
	/// Long-lived signing secret.
	pub shared_secret: SharedSecret,
	/// Backend paths.
	pub endpoints: EndpointPaths,
	/// Deadline for a single transport attempt.
	pub attempt_timeout: Duration,
	/// Deadline for a caller's whole `call()`, including session establishment.
	pub call_timeout: Duration,
	/// Retries allowed after the first login/refresh attempt hits a transient failure.
	pub max_retries: u32,
	/// Backoff before the first retry; doubles on each subsequent retry.
	pub initial_backoff: Duration,
	/// Upper bound for any single backoff.
	pub max_backoff: Duration,
	/// Fraction of the session lifetime, counted back from expiry, inside which calls refresh
	/// first.
	pub refresh_margin: f64,
	/// `User-Agent` header value.
	pub user_agent: String,
}
impl ClientConfig {
	/// Starts a builder for the given backend and title identity.
	pub fn builder(
		base_url: Url,
		client_id: impl Into<String>,
		shared_secret: impl Into<SharedSecret>,
	) -> ClientConfigBuilder {
		ClientConfigBuilder::new(base_url, client_id, shared_secret)
	}

	/// Parses and validates a JSON configuration document.
	///
	/// Durations are expressed in milliseconds; omitted fields keep their defaults.
	pub fn from_json_str(source: &str) -> Result<Self, ConfigError> {
		let mut de = serde_json::Deserializer::from_str(source);
		let document: ConfigDocument =
			serde_path_to_error::deserialize(&mut de).map_err(|err| ConfigError::Parse {
				path: err.path().to_string(),
				message: err.into_inner().to_string(),
			})?;

		document.into_builder().build()
	}

	/// Appends `path` to the base URL, keeping any path prefix the base carries.
	pub fn url_for(&self, path: &str) -> Result<Url, ConfigError> {
		validate_path(path)?;

		let mut url = self.base_url.clone();
		let prefix = url.path().trim_end_matches('/').to_owned();

		url.set_path(&format!("{prefix}{path}"));
		url.set_query(None);
		url.set_fragment(None);

		Ok(url)
	}

	/// Backoff before retry number `retry` (1-based), capped at [`ClientConfig::max_backoff`].
	pub fn backoff_for(&self, retry: u32) -> Duration {
		let factor = 2_i32.saturating_pow(retry.saturating_sub(1).min(30));
		let delay = self.initial_backoff.saturating_mul(factor);

		delay.min(self.max_backoff)
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.base_url.cannot_be_a_base() || self.base_url.host().is_none() {
			return Err(ConfigError::InvalidBaseUrl { url: self.base_url.to_string() });
		}
		if self.shared_secret.is_empty() {
			return Err(ConfigError::MissingSecret);
		}

		for (field, value) in [
			("attempt_timeout", self.attempt_timeout),
			("call_timeout", self.call_timeout),
			("initial_backoff", self.initial_backoff),
			("max_backoff", self.max_backoff),
		] {
			if !value.is_positive() {
				return Err(ConfigError::NonPositiveDuration { field });
			}
		}

		if self.attempt_timeout >= self.call_timeout {
			return Err(ConfigError::AttemptTimeoutTooLong);
		}
		if !(0.0..1.0).contains(&self.refresh_margin) {
			let margin = self.refresh_margin.to_string();

			return Err(ConfigError::InvalidRefreshMargin { margin });
		}

		self.endpoints.validate()
	}
}

/// Builder for [`ClientConfig`] values.
#[derive(Debug)]
pub struct ClientConfigBuilder {
	base_url: Url,
	client_id: String,
	shared_secret: SharedSecret,
	endpoints: EndpointPaths,
	attempt_timeout: Duration,
	call_timeout: Duration,
	max_retries: u32,
	initial_backoff: Duration,
	max_backoff: Duration,
	refresh_margin: f64,
	user_agent: String,
}
impl ClientConfigBuilder {
	/// Creates a builder seeded with the default timings.
	pub fn new(
		base_url: Url,
		client_id: impl Into<String>,
		shared_secret: impl Into<SharedSecret>,
	) -> Self {
		Self {
			base_url,
			client_id: client_id.into(),
			shared_secret: shared_secret.into(),
			endpoints: EndpointPaths::default(),
			attempt_timeout: Duration::seconds(3),
			call_timeout: Duration::seconds(10),
			max_retries: 3,
			initial_backoff: Duration::milliseconds(200),
			max_backoff: Duration::seconds(2),
			refresh_margin: 0.1,
			user_agent: DEFAULT_USER_AGENT.into(),
		}
	}

	/// Overrides the backend paths.
	pub fn endpoints(mut self, endpoints: EndpointPaths) -> Self {
		self.endpoints = endpoints;

		self
	}

	/// Sets the per-attempt transport deadline.
	pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
		self.attempt_timeout = timeout;

		self
	}

	/// Sets the overall call deadline.
	pub fn call_timeout(mut self, timeout: Duration) -> Self {
		self.call_timeout = timeout;

		self
	}

	/// Sets how many times a transient login/refresh failure is retried.
	pub fn max_retries(mut self, retries: u32) -> Self {
		self.max_retries = retries;

		self
	}

	/// Sets the first backoff delay.
	pub fn initial_backoff(mut self, backoff: Duration) -> Self {
		self.initial_backoff = backoff;

		self
	}

	/// Sets the backoff ceiling.
	pub fn max_backoff(mut self, backoff: Duration) -> Self {
		self.max_backoff = backoff;

		self
	}

	/// Sets the refresh margin as a fraction of the session lifetime.
	pub fn refresh_margin(mut self, margin: f64) -> Self {
		self.refresh_margin = margin;

		self
	}

	/// Overrides the `User-Agent` header.
	pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
		self.user_agent = user_agent.into();

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<ClientConfig, ConfigError> {
		let config = ClientConfig {
			base_url: self.base_url,
			client_id: ClientId::new(&self.client_id)?,
			shared_secret: self.shared_secret,
			endpoints: self.endpoints,
			attempt_timeout: self.attempt_timeout,
			call_timeout: self.call_timeout,
			max_retries: self.max_retries,
			initial_backoff: self.initial_backoff,
			max_backoff: self.max_backoff,
			refresh_margin: self.refresh_margin,
			user_agent: self.user_agent,
		};

		config.validate()?;

		Ok(config)
	}
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigDocument {
	base_url: Url,
	client_id: String,
	shared_secret: String,
	#[serde(default)]
	endpoints: EndpointPaths,
	attempt_timeout_ms: Option<u32>,
	call_timeout_ms: Option<u32>,
	max_retries: Option<u32>,
	initial_backoff_ms: Option<u32>,
	max_backoff_ms: Option<u32>,
	refresh_margin: Option<f64>,
	user_agent: Option<String>,
}
impl ConfigDocument {
	fn into_builder(self) -> ClientConfigBuilder {
		let mut builder =
			ClientConfigBuilder::new(self.base_url, self.client_id, self.shared_secret)
				.endpoints(self.endpoints);

		if let Some(ms) = self.attempt_timeout_ms {
			builder = builder.attempt_timeout(Duration::milliseconds(ms.into()));
		}
		if let Some(ms) = self.call_timeout_ms {
			builder = builder.call_timeout(Duration::milliseconds(ms.into()));
		}
		if let Some(retries) = self.max_retries {
			builder = builder.max_retries(retries);
		}
		if let Some(ms) = self.initial_backoff_ms {
			builder = builder.initial_backoff(Duration::milliseconds(ms.into()));
		}
		if let Some(ms) = self.max_backoff_ms {
			builder = builder.max_backoff(Duration::milliseconds(ms.into()));
		}
		if let Some(margin) = self.refresh_margin {
			builder = builder.refresh_margin(margin);
		}
		if let Some(user_agent) = self.user_agent {
			builder = builder.user_agent(user_agent);
		}

		builder
	}
}

fn validate_path(path: &str) -> Result<(), ConfigError> {
	if !path.starts_with('/') || path.starts_with("//") || path.contains(['?', '#']) {
		Err(ConfigError::InvalidEndpoint { path: path.to_owned() })
	} else {
		Ok(())
	}
}
