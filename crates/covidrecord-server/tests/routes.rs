//! Route-level tests: the router is driven with `oneshot` and the providers
//! point at a mock server.

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use covidrecord_providers::{
    BlueButtonProvider, InMemoryStateStore, LighthouseProvider, ProviderConfig,
};
use covidrecord_server::config::DemoConfig;
use covidrecord_server::{AppState, build_app};
use serde_json::{Value, json};
use tower::ServiceExt;
use url::Url;
use wiremock::matchers::{bearer_token, body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn app(server: &MockServer, demo_enabled: bool) -> Router {
    let base = Url::parse(&server.uri()).unwrap();
    let bluebutton = BlueButtonProvider::new(ProviderConfig::new(
        "bb-client",
        "bb-secret",
        base.clone(),
        base.clone(),
        Url::parse("http://localhost:6655/bbcallback").unwrap(),
    ))
    .unwrap();
    let lighthouse = LighthouseProvider::new(ProviderConfig::new(
        "va-client",
        "va-secret",
        base.join("/oauth2/health/v1").unwrap(),
        base.join("/services/fhir/v0/r4").unwrap(),
        Url::parse("http://localhost:6655/callback").unwrap(),
    ))
    .unwrap();

    let demo = DemoConfig {
        enabled: demo_enabled,
        ..DemoConfig::default()
    };

    build_app(AppState {
        bluebutton: Arc::new(bluebutton),
        lighthouse: Arc::new(lighthouse),
        states: Arc::new(InMemoryStateStore::default()),
        demo: Arc::new(demo),
    })
}

async fn get(app: &Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, body.to_vec())
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let (status, _, body) = get(app, uri).await;
    (status, serde_json::from_slice(&body).unwrap())
}

fn state_of(auth_url: &str) -> String {
    Url::parse(auth_url)
        .unwrap()
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .unwrap()
}

async fn mount_bluebutton(server: &MockServer, patient_id: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/o/token/"))
        .and(body_string_contains("code=callback-code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "bb-access",
            "token_type": "Bearer"
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/connect/userinfo"))
        .and(bearer_token("bb-access"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sub": "BBUser00000",
            "patient": patient_id
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/v1/fhir/Patient/{patient_id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resourceType": "Patient",
            "id": patient_id,
            "name": [{"family": "Doe", "given": ["Jane", "X"]}],
            "birthDate": "1999-06-01"
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_healthz() {
    let server = MockServer::start().await;
    let (status, _, body) = get(&app(&server, false), "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");
}

#[tokio::test]
async fn test_bluebutton_round_trip() {
    let server = MockServer::start().await;
    mount_bluebutton(&server, "-10000000000042").await;

    Mock::given(method("GET"))
        .and(path("/v1/fhir/ExplanationOfBenefit"))
        .and(query_param("patient", "-10000000000042"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resourceType": "Bundle",
            "total": 1,
            "entry": [{"resource": {
                "resourceType": "ExplanationOfBenefit",
                "item": [{
                    "servicedDate": "2021-02-01T16:00:00.000+00:00",
                    "productOrService": {"coding": [{"code": "91300", "display": "Pfizer"}]}
                }]
            }}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let app = app(&server, false);
    let (status, index) = get_json(&app, "/").await;
    assert_eq!(status, StatusCode::OK);
    let state = state_of(index["bluebutton_auth_url"].as_str().unwrap());

    let (status, record) =
        get_json(&app, &format!("/bbcallback?code=callback-code&state={state}")).await;
    assert_eq!(status, StatusCode::OK, "{record}");
    assert_eq!(record["name"], "Jane X Doe");
    assert_eq!(record["birth_date"], "1999-06-01");
    assert_eq!(record["vaccinations"].as_array().unwrap().len(), 1);
    assert_eq!(record["vaccinations"][0]["code"], "91300");
    assert_eq!(record["doses_remaining"], 1);
    assert_eq!(record["vaccination_complete"], false);

    // The state is single use.
    let (status, outcome) =
        get_json(&app, &format!("/bbcallback?code=callback-code&state={state}")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(outcome["resourceType"], "OperationOutcome");
}

#[tokio::test]
async fn test_unknown_state_is_rejected_before_token_exchange() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let app = app(&server, false);
    let (status, outcome) = get_json(&app, "/bbcallback?code=abc&state=forged").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(outcome["issue"][0]["code"], "security");

    let (status, _) = get_json(&app, "/callback?code=abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_state_from_other_provider_is_rejected() {
    let server = MockServer::start().await;
    let app = app(&server, false);

    let (_, index) = get_json(&app, "/").await;
    let bb_state = state_of(index["bluebutton_auth_url"].as_str().unwrap());

    let (status, _) = get_json(&app, &format!("/callback?code=abc&state={bb_state}")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_demo_patient_skips_claims() {
    let server = MockServer::start().await;
    mount_bluebutton(&server, "-19990000000001").await;

    Mock::given(method("GET"))
        .and(path("/v1/fhir/ExplanationOfBenefit"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let app = app(&server, true);
    let (_, index) = get_json(&app, "/").await;
    let state = state_of(index["bluebutton_auth_url"].as_str().unwrap());

    let (status, record) =
        get_json(&app, &format!("/bbcallback?code=callback-code&state={state}")).await;
    assert_eq!(status, StatusCode::OK, "{record}");
    assert_eq!(record["vaccinations"].as_array().unwrap().len(), 2);
    assert_eq!(record["doses_remaining"], 0);
    assert_eq!(record["vaccination_complete"], true);
}

#[tokio::test]
async fn test_lighthouse_round_trip() {
    let server = MockServer::start().await;
    let app = app(&server, false);

    let (_, index) = get_json(&app, "/").await;
    let state = state_of(index["lighthouse_auth_url"].as_str().unwrap());

    Mock::given(method("POST"))
        .and(path("/oauth2/health/v1/oauth2/token/"))
        .and(body_string_contains(format!("state={state}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "va-access",
            "token_type": "Bearer",
            "patient": "1558538470",
            "state": state
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/services/fhir/v0/r4/Patient/1558538470"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resourceType": "Patient",
            "name": [{"text": "Mr. Lee Prosacco"}],
            "birthDate": "1948-10-11"
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/services/fhir/v0/r4/Immunization"))
        .and(query_param("patient", "1558538470"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resourceType": "Bundle",
            "entry": [
                {"resource": {
                    "resourceType": "Immunization",
                    "vaccineCode": {"coding": [{"code": "207", "display": "Moderna"}]},
                    "occurrenceDateTime": "2021-01-14T09:30:21Z"
                }},
                {"resource": {
                    "resourceType": "Immunization",
                    "vaccineCode": {"coding": [{"code": "207", "display": "Moderna"}]},
                    "occurrenceDateTime": "2021-02-11T09:30:21Z"
                }}
            ]
        })))
        .mount(&server)
        .await;

    let (status, record) =
        get_json(&app, &format!("/callback?code=va-code&state={state}")).await;
    assert_eq!(status, StatusCode::OK, "{record}");
    assert_eq!(record["name"], "Mr. Lee Prosacco");
    assert_eq!(record["vaccination_complete"], true);
}

#[tokio::test]
async fn test_upstream_rejection_is_bad_gateway() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/o/token/"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let app = app(&server, false);
    let (_, index) = get_json(&app, "/").await;
    let state = state_of(index["bluebutton_auth_url"].as_str().unwrap());

    let (status, outcome) = get_json(&app, &format!("/bbcallback?code=abc&state={state}")).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(
        outcome["issue"][0]["diagnostics"]
            .as_str()
            .unwrap()
            .contains("401")
    );
}

#[tokio::test]
async fn test_provider_error_redirect_is_reported() {
    let server = MockServer::start().await;
    let (status, outcome) = get_json(
        &app(&server, false),
        "/callback?error=access_denied&error_description=user%20declined",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(
        outcome["issue"][0]["diagnostics"]
            .as_str()
            .unwrap()
            .contains("access_denied")
    );
}

#[tokio::test]
async fn test_login_redirects() {
    let server = MockServer::start().await;
    let app = app(&server, false);

    let (status, headers, _) = get(&app, "/login/lighthouse").await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    let location = headers[header::LOCATION].to_str().unwrap();
    assert!(location.starts_with(&format!(
        "{}/oauth2/health/v1/oauth2/authorization?",
        server.uri()
    )));

    let (status, _, _) = get(&app, "/login/epic").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_show_callback() {
    let server = MockServer::start().await;
    let demo_app = app(&server, true);

    let (status, record) = get_json(&demo_app, "/showCallback?vax=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["name"], "Joseph Esposito");
    assert_eq!(record["vaccinations"][1]["date"], "2021-03-01T16:00:00Z");
    assert_eq!(record["vaccination_complete"], true);

    let (_, record) = get_json(&demo_app, "/showCallback?vax=lots").await;
    assert_eq!(record["vaccinations"].as_array().unwrap().len(), 1);
    assert_eq!(record["doses_remaining"], 1);

    let (status, record) = get_json(&demo_app, "/showCallback?vax=1000000000").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["vaccinations"].as_array().unwrap().len(), 10);
    assert_eq!(record["doses_remaining"], 0);

    let (status, _) = get_json(&app(&server, false), "/showCallback").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
