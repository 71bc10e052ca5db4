//! Registers one RTE API family against a mock token endpoint, then shows the cached token being
//! reused by authenticated data requests.

// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
// self
use rte_client::{auth::ApiService, client::RteClient, config::ClientConfig};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token/oauth/");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"demo-access\",\"token_type\":\"Bearer\",\"expires_in\":7200}",
			);
		})
		.await;
	let data_mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/open_api/consumption/v1/short_term")
				.header("authorization", "Bearer demo-access");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"short_term\":[{\"type\":\"REALISED\",\"values\":[]}]}");
		})
		.await;
	// The mock also answers plain HTTP, which the default TLS setup can reach without trusting
	// its self-signed certificate.
	let base_url = format!("http://{}", server.address());
	let config = ClientConfig {
		token_url: format!("{base_url}/token/oauth/"),
		base_url,
		..Default::default()
	}
	.with_credentials(ApiService::ShortTermConsumption, "demo-client", "super-secret");
	let client = RteClient::new(&config).await?;

	for _ in 0..3 {
		let payload: serde_json::Value = client
			.get_json(
				ApiService::ShortTermConsumption,
				"open_api/consumption/v1/short_term",
				&[("type", "REALISED")],
			)
			.await?;

		println!("Short-term consumption payload: {payload}.");
	}

	let record = client.tokens().get_record(ApiService::ShortTermConsumption).await?;

	println!("Token cached until {}.", record.expires_at);
	println!("Grant exchanges: {}.", client.tokens().metrics().attempts());

	token_mock.assert_async().await;
	data_mock.assert_calls_async(3).await;

	Ok(())
}
