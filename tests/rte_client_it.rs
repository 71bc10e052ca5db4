// crates.io
use httpmock::prelude::*;
use serde_json::json;
// self
use rte_client::{
	_preludet::*,
	auth::{ApiService, TokenRecord},
	config::ClientConfig,
	error::ApiError,
	store::TokenStore,
};

const CONSUMPTION_PATH: &str = "/open_api/consumption/v1/short_term";

#[derive(Debug, Deserialize)]
struct ShortTerm {
	short_term: Vec<Forecast>,
}

#[derive(Debug, Deserialize)]
struct Forecast {
	#[serde(rename = "type")]
	kind: String,
	values: Vec<Point>,
}

#[derive(Debug, Deserialize)]
struct Point {
	value: i64,
}

#[derive(Serialize)]
struct Subscription<'a> {
	topic: &'a str,
}

fn config_for(server: &MockServer) -> ClientConfig {
	ClientConfig {
		base_url: server.base_url(),
		token_url: server.url("/token/oauth/"),
		..Default::default()
	}
	.with_credentials(ApiService::ShortTermConsumption, "stc-id", "stc-secret")
}

async fn mock_token<'a>(server: &'a MockServer, token: &str) -> httpmock::Mock<'a> {
	let body = format!(
		"{{\"access_token\":\"{token}\",\"token_type\":\"Bearer\",\"expires_in\":7200}}"
	);

	server
		.mock_async(|when, then| {
			when.method(POST).path("/token/oauth/");
			then.status(200).header("content-type", "application/json").body(body);
		})
		.await
}

#[tokio::test]
async fn get_json_signs_requests_and_decodes_bodies() {
	let server = MockServer::start_async().await;
	let token = mock_token(&server, "data-token").await;
	let data = server
		.mock_async(|when, then| {
			when.method(GET)
				.path(CONSUMPTION_PATH)
				.header("authorization", "Bearer data-token")
				.query_param("type", "D-1");
			then.status(200).header("content-type", "application/json").json_body(json!({
				"short_term": [{ "type": "D-1", "values": [{ "value": 51000 }, { "value": 49500 }] }]
			}));
		})
		.await;
	let (client, _store) = build_reqwest_test_client(&config_for(&server)).await;

	for _ in 0..2 {
		let payload: ShortTerm = client
			.get_json(ApiService::ShortTermConsumption, CONSUMPTION_PATH, &[("type", "D-1")])
			.await
			.expect("Data request should succeed.");

		assert_eq!(payload.short_term[0].kind, "D-1");
		assert_eq!(
			payload.short_term[0].values.iter().map(|point| point.value).collect::<Vec<_>>(),
			vec![51000, 49500]
		);
	}

	token.assert_calls_async(1).await;
	data.assert_calls_async(2).await;
}

#[tokio::test]
async fn post_json_sends_the_body() {
	let server = MockServer::start_async().await;
	let _token = mock_token(&server, "post-token").await;
	let data = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/open_api/subscriptions")
				.header("authorization", "Bearer post-token")
				.json_body(json!({ "topic": "consumption" }));
			then.status(201)
				.header("content-type", "application/json")
				.json_body(json!({ "id": "sub-1" }));
		})
		.await;
	let (client, _store) = build_reqwest_test_client(&config_for(&server)).await;
	let created: serde_json::Value = client
		.post_json(
			ApiService::ShortTermConsumption,
			"open_api/subscriptions",
			&Subscription { topic: "consumption" },
		)
		.await
		.expect("POST should succeed.");

	assert_eq!(created["id"], "sub-1");

	data.assert_async().await;
}

#[tokio::test]
async fn error_bodies_map_to_api_errors() {
	let server = MockServer::start_async().await;
	let _token = mock_token(&server, "err-token").await;
	let _bad_request = server
		.mock_async(|when, then| {
			when.method(GET).path(CONSUMPTION_PATH);
			then.status(400).header("content-type", "application/json").json_body(json!({
				"error": "SHORTTERM_CONSUMPTION_F04",
				"error_description": "The value of 'end_date' field is incorrect."
			}));
		})
		.await;
	let _bad_gateway = server
		.mock_async(|when, then| {
			when.method(GET).path("/open_api/unavailable");
			then.status(502).body("<html>Bad Gateway</html>");
		})
		.await;
	let (client, _store) = build_reqwest_test_client(&config_for(&server)).await;
	let err = client
		.get_json::<serde_json::Value, _>(ApiService::ShortTermConsumption, CONSUMPTION_PATH, &())
		.await
		.expect_err("400 responses should fail.");

	assert_eq!(
		err.to_string(),
		"Request failed with status code 400: The value of 'end_date' field is incorrect. (error: SHORTTERM_CONSUMPTION_F04)."
	);

	let err = client
		.get_json::<serde_json::Value, _>(
			ApiService::ShortTermConsumption,
			"/open_api/unavailable",
			&(),
		)
		.await
		.expect_err("502 responses should fail.");

	assert!(matches!(
		err,
		Error::Api(ApiError::Status { status: 502, ref code, ref description })
			if code == "Unknown" && description == "Failed to parse error details"
	));
}

#[tokio::test]
async fn unauthorized_data_responses_evict_the_token() {
	let server = MockServer::start_async().await;
	let token = mock_token(&server, "revoked-token").await;
	let _rejected = server
		.mock_async(|when, then| {
			when.method(GET).path(CONSUMPTION_PATH);
			then.status(401)
				.header("content-type", "application/json")
				.json_body(json!({ "error": "invalid_token" }));
		})
		.await;
	let (client, store) = build_reqwest_test_client(&config_for(&server)).await;

	for _ in 0..2 {
		let err = client
			.get_json::<serde_json::Value, _>(
				ApiService::ShortTermConsumption,
				CONSUMPTION_PATH,
				&(),
			)
			.await
			.expect_err("401 responses should fail.");

		assert!(matches!(
			err,
			Error::Api(ApiError::Status { status: 401, ref description, .. })
				if description == "Unknown error"
		));
		assert!(store.is_empty(), "Rejected tokens must be evicted.");
	}

	token.assert_calls_async(2).await;
}

#[tokio::test]
async fn unauthorized_data_responses_keep_a_token_refreshed_meanwhile() {
	let server = MockServer::start_async().await;
	let token = mock_token(&server, "stale-token").await;
	let rejected = server
		.mock_async(|when, then| {
			when.method(GET).path(CONSUMPTION_PATH).header("authorization", "Bearer stale-token");
			then.status(401).delay(std::time::Duration::from_millis(500));
		})
		.await;
	let (client, store) = build_reqwest_test_client(&config_for(&server)).await;
	let request = {
		let client = client.clone();

		tokio::spawn(async move {
			client
				.get_json::<serde_json::Value, _>(
					ApiService::ShortTermConsumption,
					CONSUMPTION_PATH,
					&(),
				)
				.await
		})
	};

	tokio::time::sleep(std::time::Duration::from_millis(200)).await;

	// Another caller refreshes the family while the first request is still in flight.
	let scope = client.tokens().scopes().remove(0);

	store
		.save(
			TokenRecord::builder(scope.clone())
				.access_token("refreshed-token")
				.expires_in(Duration::hours(1))
				.build()
				.expect("Record fixture should build."),
		)
		.await
		.expect("Seeding the store should succeed.");

	let err = request
		.await
		.expect("Task should not panic.")
		.expect_err("401 responses should fail.");

	assert!(matches!(err, Error::Api(ApiError::Status { status: 401, .. })));

	let cached = store
		.fetch(&scope)
		.await
		.expect("Fetch should succeed.")
		.expect("The refreshed token must stay cached.");

	assert_eq!(cached.access_token.expose(), "refreshed-token");

	token.assert_calls_async(1).await;
	rejected.assert_calls_async(1).await;
}

#[tokio::test]
async fn unknown_families_fail_before_any_request() {
	let server = MockServer::start_async().await;
	let token = mock_token(&server, "unused").await;
	let (client, _store) = build_reqwest_test_client(&config_for(&server)).await;
	let err = client
		.get_json::<serde_json::Value, _>(ApiService::WholesaleMarket, "/open_api/wholesale", &())
		.await
		.expect_err("Unconfigured families must be rejected.");

	assert!(matches!(err, Error::Config(_)));

	token.assert_calls_async(0).await;
}

#[tokio::test]
async fn undecodable_bodies_report_the_json_path() {
	let server = MockServer::start_async().await;
	let _token = mock_token(&server, "decode-token").await;
	let _data = server
		.mock_async(|when, then| {
			when.method(GET).path(CONSUMPTION_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.json_body(json!({ "short_term": [{ "type": "D-1", "values": [{ "value": "high" }] }] }));
		})
		.await;
	let (client, _store) = build_reqwest_test_client(&config_for(&server)).await;
	let err = client
		.get_json::<ShortTerm, _>(ApiService::ShortTermConsumption, CONSUMPTION_PATH, &())
		.await
		.expect_err("Mismatched payloads should fail.");

	match err {
		Error::Api(ApiError::Decode { source }) =>
			assert_eq!(source.path().to_string(), "short_term[0].values[0].value"),
		other => panic!("Unexpected error variant: {other:?}."),
	}
}
