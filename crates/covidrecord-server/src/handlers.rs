use axum::{
    Json,
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect},
};
use covidrecord_providers::{HealthProvider, ProviderId, verify_callback_state};
use serde::{Deserialize, Serialize};

use crate::error::ServerError;
use crate::record::{RecordView, demo_patient, demo_vaccinations};
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct IndexView {
    pub bluebutton_auth_url: String,
    pub lighthouse_auth_url: String,
}

/// Query parameters of an OAuth redirect back to us.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ShowCallbackParams {
    pub vax: Option<String>,
}

pub async fn healthz() -> impl IntoResponse {
    "ok"
}

pub async fn index(State(state): State<AppState>) -> Result<Json<IndexView>, ServerError> {
    Ok(Json(IndexView {
        bluebutton_auth_url: begin_authorization(&state, state.bluebutton.as_ref()).await?,
        lighthouse_auth_url: begin_authorization(&state, state.lighthouse.as_ref()).await?,
    }))
}

pub async fn login(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> Result<Redirect, ServerError> {
    let provider = match provider.parse::<ProviderId>() {
        Ok(ProviderId::BlueButton) => state.bluebutton.as_ref(),
        Ok(ProviderId::Lighthouse) => state.lighthouse.as_ref(),
        Err(_) => return Err(ServerError::NotFound(format!("provider {provider}"))),
    };
    let url = begin_authorization(&state, provider).await?;
    Ok(Redirect::to(&url))
}

pub async fn bluebutton_callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Result<Json<RecordView>, ServerError> {
    complete_authorization(&state, state.bluebutton.as_ref(), params)
        .await
        .map(Json)
}

pub async fn lighthouse_callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Result<Json<RecordView>, ServerError> {
    complete_authorization(&state, state.lighthouse.as_ref(), params)
        .await
        .map(Json)
}

pub async fn show_callback(
    State(state): State<AppState>,
    Query(params): Query<ShowCallbackParams>,
) -> Result<Json<RecordView>, ServerError> {
    if !state.demo.enabled {
        return Err(ServerError::NotFound("demo mode is disabled".into()));
    }
    let doses = params
        .vax
        .as_deref()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(1);

    Ok(Json(RecordView::new(&demo_patient(), demo_vaccinations(doses))))
}

/// Issues a state for `provider` and returns the URL to send the user to.
async fn begin_authorization(
    state: &AppState,
    provider: &dyn HealthProvider,
) -> Result<String, ServerError> {
    let request = provider.authorization_url(None)?;
    state.states.issue(&request.state, provider.id()).await;
    Ok(request.url.into())
}

/// Runs the callback half of the flow: state, token, patient, vaccinations.
async fn complete_authorization(
    state: &AppState,
    provider: &dyn HealthProvider,
    params: CallbackParams,
) -> Result<RecordView, ServerError> {
    if let Some(error) = params.error {
        let detail = params.error_description.unwrap_or_default();
        return Err(ServerError::AuthorizationDenied(
            format!("{error} {detail}").trim().to_string(),
        ));
    }

    let verified = verify_callback_state(
        state.states.as_ref(),
        provider.id(),
        params.state.as_deref(),
    )
    .await?;

    let code = params.code.unwrap_or_default();
    let token = provider
        .exchange_token(&code, Some(verified.as_str()))
        .await?;
    let identity = provider.fetch_identity(&token).await?;
    let patient_id = provider
        .patient_reference(&identity, &token)
        .ok_or(ServerError::MissingPatient)?;

    let patient = provider.fetch_patient(&token, &patient_id).await?;

    let vaccinations = match state.demo.doses_for(&patient_id) {
        Some(doses) => {
            tracing::info!(provider = %provider.id(), doses, "serving demo vaccinations");
            demo_vaccinations(doses)
        }
        None => provider.fetch_vaccinations(&token, &patient_id).await?,
    };

    tracing::info!(
        provider = %provider.id(),
        vaccinations = vaccinations.len(),
        "vaccination record loaded"
    );
    Ok(RecordView::new(&patient, vaccinations))
}
