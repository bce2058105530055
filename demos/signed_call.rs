//! Logs a player in against a local mock backend, then issues a signed call and polls a
//! submitted one the way a frame loop would.

// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use serde_json::json;
// self
use leet_client::{
	api::{Endpoint, LeetClient},
	config::ClientConfig,
	url::Url,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let login_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/v1/session/login").header_exists("x-leet-auth");
			then.status(200).json_body(json!({
				"status": "ok",
				"data": { "session_token": "demo-session", "expires_in": 900 },
			}));
		})
		.await;
	let profile_mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/v1/profile")
				.header("authorization", "Bearer demo-session");
			then.status(200)
				.json_body(json!({ "status": "ok", "data": { "player": "ada", "btc": 1200 } }));
		})
		.await;
	let config = ClientConfig::builder(Url::parse(&server.base_url())?, "demo-title", "demo-secret")
		.build()?;
	let client = LeetClient::new(config)?;

	client.login("ada", "correct horse").await?;

	let profile = client.call(Endpoint::get("/v1/profile"), None).await?;

	println!("Profile via {}: {}.", profile.request_id, profile.data);

	let ticket = client.submit(Endpoint::get("/v1/profile"), None);

	loop {
		if let Some(completion) = client.completions().try_next() {
			println!("Ticket {} settled: {:?}.", completion.ticket.get(), completion.result?.data);

			break;
		}

		// Stand-in for one rendered frame.
		tokio::time::sleep(std::time::Duration::from_millis(16)).await;
	}

	println!("Submitted ticket {} drained; session is {}.", ticket.get(), client.state());

	client.logout().await.ok();
	login_mock.assert_calls_async(1).await;
	profile_mock.assert_calls_async(2).await;

	Ok(())
}
