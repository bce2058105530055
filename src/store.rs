//! Credential store shared by every clone of a client.
//!
//! The store holds one [`Credential`] behind a `parking_lot::RwLock`, so readers always observe
//! a complete snapshot. Only the session manager mutates it, and only on transitions into the
//! active state or on logout.

// self
use crate::{
	_prelude::*,
	auth::{ClientId, Credential, SharedSecret},
};

/// Error type produced by [`CredentialStore`] mutations.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum StoreError {
	/// The replacement belongs to another client identity; the secret is immutable.
	#[error("Credential for `{found}` cannot replace the credential for `{expected}`.")]
	IdentityMismatch {
		/// Client identifier held by the store.
		expected: ClientId,
		/// Client identifier carried by the rejected replacement.
		found: ClientId,
	},
}

/// Owned credential holder with atomic snapshot semantics.
#[derive(Debug)]
pub struct CredentialStore {
	inner: RwLock<Credential>,
}
impl CredentialStore {
	/// Creates a store for `client_id` without a session.
	pub fn new(client_id: ClientId, shared_secret: SharedSecret) -> Self {
		Self { inner: RwLock::new(Credential::new(client_id, shared_secret)) }
	}

	/// Returns a snapshot of the current credential.
	pub fn get(&self) -> Credential {
		self.inner.read().clone()
	}

	/// Replaces the credential in one step.
	pub(crate) fn set(&self, credential: Credential) -> Result<(), StoreError> {
		let mut guard = self.inner.write();

		if !guard.same_identity(&credential) {
			return Err(StoreError::IdentityMismatch {
				expected: guard.client_id.clone(),
				found: credential.client_id,
			});
		}

		*guard = credential;

		Ok(())
	}

	/// Drops the session while keeping the client identity and secret.
	pub(crate) fn invalidate(&self) {
		self.inner.write().session = None;
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::thread;
	// crates.io
	use time::macros::datetime;
	// self
	use super::*;
	use crate::auth::{SessionCredential, TokenSecret};

	fn store() -> CredentialStore {
		CredentialStore::new(
			ClientId::new("title-7").expect("Client fixture should be valid."),
			SharedSecret::from("shared-secret"),
		)
	}

	fn session(token: &str) -> SessionCredential {
		SessionCredential::issued(
			TokenSecret::new(token),
			datetime!(2025-11-10 12:00 UTC),
			Duration::hours(1),
			None,
		)
		.expect("Session fixture should be representable.")
	}

	#[test]
	fn set_and_invalidate_keep_the_identity() {
		let store = store();
		let initial = store.get();

		assert!(initial.session.is_none());

		store
			.set(initial.clone().with_session(session("t1")))
			.expect("Same identity should store.");

		assert_eq!(store.get().session_token().map(TokenSecret::expose), Some("t1"));

		store.invalidate();

		let after = store.get();

		assert!(after.session.is_none());
		assert!(after.same_identity(&initial));
	}

	#[test]
	fn set_rejects_foreign_identities() {
		let store = store();
		let foreign = Credential::new(
			ClientId::new("title-8").expect("Client fixture should be valid."),
			SharedSecret::from("shared-secret"),
		)
		.with_session(session("t1"));
		let err = store.set(foreign).expect_err("Foreign identity must be rejected.");

		assert!(matches!(err, StoreError::IdentityMismatch { .. }));
		assert!(store.get().session.is_none());
	}

	#[test]
	fn readers_never_observe_partial_sessions() {
		let store = Arc::new(store());
		let base = store.get();
		let writer = {
			let store = store.clone();

			thread::spawn(move || {
				for round in 0..500 {
					let token = format!("t{round}");
					let session = SessionCredential::issued(
						TokenSecret::new(token),
						datetime!(2025-11-10 12:00 UTC),
						Duration::seconds(round + 1),
						None,
					)
					.expect("Session fixture should be representable.");

					store
						.set(base.clone().with_session(session))
						.expect("Same identity should store.");
				}
			})
		};

		for _ in 0..500 {
			if let Some(session) = store.get().session {
				let round = session.token.expose()[1..]
					.parse::<i64>()
					.expect("Token should be numbered.");

				assert_eq!(session.ttl(), Duration::seconds(round + 1));
			}
		}

		writer.join().expect("Writer should not panic.");
	}
}
