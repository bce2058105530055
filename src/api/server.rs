//! Server registration and reward terms.

// self
use crate::_prelude::*;

/// Hosted game session announced to the backend alongside the server lookup.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SessionRegistration {
	/// Address players connect to.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub session_host_address: Option<String>,
	/// Engine-side session identifier.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub session_id: Option<String>,
}
impl SessionRegistration {
	/// Registration for a hosted session.
	pub fn hosted(address: impl Into<String>, session_id: impl Into<String>) -> Self {
		Self { session_host_address: Some(address.into()), session_id: Some(session_id.into()) }
	}
}

/// Reward terms the backend grants a game server.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
	/// Whether the server may award and charge players.
	pub authorization: bool,
	/// Satoshi amount moved per kill.
	#[serde(rename = "incrementBTC", default)]
	pub increment_btc: i64,
	/// Balance a player must hold to join.
	#[serde(rename = "minimumBTCHold", default)]
	pub minimum_btc_hold: i64,
	/// Fraction of each increment kept by the server operator.
	#[serde(rename = "serverRakeBTCPercentage", default)]
	pub server_rake: f64,
	/// Fraction of each increment kept by the platform.
	#[serde(rename = "leetcoinRakePercentage", default)]
	pub leetcoin_rake: f64,
}
impl ServerInfo {
	/// Amount credited to the killer after both rakes, truncated; `None` when unauthorized.
	pub fn kill_reward_btc(&self) -> Option<i64> {
		if !self.authorization {
			return None;
		}

		let increment = self.increment_btc as f64;
		let reward = increment - (increment * self.server_rake + increment * self.leetcoin_rake);

		Some(reward.trunc() as i64)
	}
}
