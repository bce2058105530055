//! Credential snapshots combining the immutable client identity with the renewable session.

// self
use crate::{
	_prelude::*,
	auth::{ClientId, SharedSecret, TokenSecret, Username},
};

/// Lifecycle status for a session credential at a given instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatus {
	/// Token is valid and outside the refresh margin.
	Active,
	/// Token is valid but inside the refresh margin.
	Due,
	/// Token exceeded its expiry instant.
	Expired,
}

/// Short-lived credential issued by the backend.
///
/// The token and its expiry travel together; the store only ever swaps whole values.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCredential {
	/// Session token; also the HMAC key for routine calls.
	pub token: TokenSecret,
	/// Instant the backend issued the token (local clock).
	pub issued_at: OffsetDateTime,
	/// Instant the token stops being accepted.
	pub expires_at: OffsetDateTime,
	/// Player bound to the session, if the login named one.
	pub username: Option<Username>,
}
impl SessionCredential {
	/// Builds a credential that expires `ttl` after `issued_at`.
	///
	/// Returns `None` when the expiry instant is not representable.
	pub fn issued(
		token: TokenSecret,
		issued_at: OffsetDateTime,
		ttl: Duration,
		username: Option<Username>,
	) -> Option<Self> {
		let expires_at = issued_at.checked_add(ttl)?;

		Some(Self { token, issued_at, expires_at, username })
	}

	/// Server-declared lifetime of the token.
	pub fn ttl(&self) -> Duration {
		self.expires_at - self.issued_at
	}

	/// Lifetime left at `instant`, clamped at zero.
	pub fn remaining_at(&self, instant: OffsetDateTime) -> Duration {
		let remaining = self.expires_at - instant;

		if remaining.is_negative() { Duration::ZERO } else { remaining }
	}

	/// Computes the status at `instant` for a refresh margin expressed as a fraction of the TTL.
	pub fn status_at(&self, instant: OffsetDateTime, refresh_margin: f64) -> SessionStatus {
		if instant >= self.expires_at {
			return SessionStatus::Expired;
		}
		if self.remaining_at(instant) <= self.ttl() * refresh_margin {
			return SessionStatus::Due;
		}

		SessionStatus::Active
	}
}
impl Debug for SessionCredential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionCredential")
			.field("token", &self.token)
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.field("username", &self.username)
			.finish()
	}
}

/// Complete credential snapshot handed out by the credential store.
#[derive(Clone, Debug)]
pub struct Credential {
	/// Identifier the backend issued to the title.
	pub client_id: ClientId,
	/// Long-lived secret used to sign credential-issuing requests.
	pub shared_secret: SharedSecret,
	/// Current session, if one has been established.
	pub session: Option<SessionCredential>,
}
impl Credential {
	/// Creates a credential without a session.
	pub fn new(client_id: ClientId, shared_secret: SharedSecret) -> Self {
		Self { client_id, shared_secret, session: None }
	}

	/// Returns a copy carrying `session`.
	pub fn with_session(mut self, session: SessionCredential) -> Self {
		self.session = Some(session);

		self
	}

	/// Returns `true` if both credentials belong to the same client identity.
	pub fn same_identity(&self, other: &Self) -> bool {
		self.client_id == other.client_id && self.shared_secret.same_as(&other.shared_secret)
	}

	/// Session token, if any.
	pub fn session_token(&self) -> Option<&TokenSecret> {
		self.session.as_ref().map(|session| &session.token)
	}

	/// Session expiry, if any.
	pub fn expires_at(&self) -> Option<OffsetDateTime> {
		self.session.as_ref().map(|session| session.expires_at)
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros::datetime;
	// self
	use super::*;

	fn session(ttl: Duration) -> SessionCredential {
		SessionCredential::issued(
			TokenSecret::new("token"),
			datetime!(2025-11-10 12:00 UTC),
			ttl,
			None,
		)
		.expect("Session fixture should be representable.")
	}

	#[test]
	fn unrepresentable_expiry_is_rejected() {
		let issued = SessionCredential::issued(
			TokenSecret::new("token"),
			datetime!(2025-11-10 12:00 UTC),
			Duration::seconds(1_000_000_000_000),
			None,
		);

		assert!(issued.is_none());
	}

	#[test]
	fn status_tracks_refresh_margin() {
		let session = session(Duration::seconds(3600));
		let issued = session.issued_at;

		assert_eq!(session.status_at(issued, 0.1), SessionStatus::Active);
		assert_eq!(session.status_at(issued + Duration::seconds(3239), 0.1), SessionStatus::Active);
		assert_eq!(session.status_at(issued + Duration::seconds(3240), 0.1), SessionStatus::Due);
		assert_eq!(
			session.status_at(issued + Duration::seconds(3600), 0.1),
			SessionStatus::Expired
		);
	}

	#[test]
	fn remaining_is_clamped() {
		let session = session(Duration::seconds(60));

		assert_eq!(session.ttl(), Duration::seconds(60));
		assert_eq!(session.remaining_at(session.issued_at), Duration::seconds(60));
		assert_eq!(session.remaining_at(session.expires_at + Duration::hours(1)), Duration::ZERO);
	}

	#[test]
	fn identity_comparison_ignores_sessions() {
		let client_id = ClientId::new("title-7").expect("Client fixture should be valid.");
		let base = Credential::new(client_id.clone(), SharedSecret::from("secret"));
		let with_session = base.clone().with_session(session(Duration::seconds(60)));

		assert!(base.same_identity(&with_session));
		assert!(!base.same_identity(&Credential::new(client_id, SharedSecret::from("secret"))));
		assert_eq!(with_session.session_token().map(TokenSecret::expose), Some("token"));
		assert!(base.expires_at().is_none());
	}
}
