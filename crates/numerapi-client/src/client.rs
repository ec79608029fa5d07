//! Tournament client.
//!
//! Composes GraphQL queries with the transfer engine: dataset downloads
//! resolve a URL then download it, uploads ask for a pre-signed URL, PUT the
//! file there and then register it with a creation mutation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use numerapi_transfer::{
    DownloadRequest, ReqwestBackend, TransferBackend, TransferControl, TransferEngine,
    UploadRequest, UploadSource,
};
use chrono::{Duration, Utc};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::config::{ClientConfig, Tournament};
use crate::error::{ApiError, ApiResult};
use crate::graphql::{GraphqlRequest, HttpQueryBackend, QueryBackend};
use crate::queries;
use crate::responses::{
    Account, AccountModels, CreatedSubmission, Round, RoundWindow, UploadAuth, field,
};

/// Header carrying the compute node id on Signals uploads.
const COMPUTE_ID_HEADER: &str = "x_compute_id";

/// Client for the tournament API.
///
/// Generic over the query and transfer backends so tests can script both.
/// Production code uses [`NumerApi::new`].
#[derive(Debug)]
pub struct NumerApi<Q = HttpQueryBackend, B = ReqwestBackend> {
    queries: Q,
    engine: TransferEngine<B>,
    config: ClientConfig,
}

impl NumerApi {
    /// Create a client talking to the configured endpoint.
    pub fn new(config: ClientConfig) -> ApiResult<Self> {
        let queries = HttpQueryBackend::new(&config)?;
        let engine = TransferEngine::new(config.transfer.clone())?;
        Ok(Self {
            queries,
            engine,
            config,
        })
    }
}

impl<Q: QueryBackend, B: TransferBackend> NumerApi<Q, B> {
    /// Create a client with custom backends.
    pub fn with_backends(config: ClientConfig, queries: Q, transfers: B) -> Self {
        let engine = TransferEngine::with_backend(transfers, config.transfer.clone());
        Self {
            queries,
            engine,
            config,
        }
    }

    /// Configuration in use.
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The transfer engine used for datasets and uploads.
    pub const fn engine(&self) -> &TransferEngine<B> {
        &self.engine
    }

    /// A fresh transfer control.
    pub fn control(&self) -> TransferControl {
        self.engine.control()
    }

    const fn tournament(&self) -> Tournament {
        self.config.tournament
    }

    async fn execute(&self, request: GraphqlRequest) -> ApiResult<Value> {
        self.queries.execute(&request).await
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Send any query and return its `data` member unchanged.
    pub async fn raw_query(
        &self,
        query: &str,
        variables: Value,
        authorization: bool,
    ) -> ApiResult<Value> {
        let mut request = GraphqlRequest::new(query).with_variables(variables);
        request.authorization = authorization;
        self.execute(request).await
    }

    /// Number of the round currently open, if any.
    pub async fn current_round(&self) -> ApiResult<Option<u32>> {
        let data = self
            .execute(
                GraphqlRequest::new(queries::CURRENT_ROUND)
                    .with_variables(json!({ "tournament": self.tournament().id() })),
            )
            .await?;
        let rounds: Vec<Option<Round>> = field(&data, "rounds")?;
        Ok(rounds.into_iter().next().flatten().map(|round| round.number))
    }

    /// Opening time and deadline of the current round.
    ///
    /// Between rounds the API answers with an error instead of a round; that
    /// is reported as `None`.
    pub async fn round_window(&self) -> ApiResult<Option<RoundWindow>> {
        let result = self
            .execute(
                GraphqlRequest::new(queries::ROUND_WINDOW)
                    .with_variables(json!({ "tournament": self.tournament().id() })),
            )
            .await;
        let data = match result {
            Ok(data) => data,
            Err(ApiError::Graphql { messages }) => {
                debug!(?messages, "No current round");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let rounds: Vec<Option<RoundWindow>> = field(&data, "rounds")?;
        Ok(rounds.into_iter().next().flatten())
    }

    /// Whether the current round accepts submissions right now.
    pub async fn check_round_open(&self) -> ApiResult<bool> {
        let window = self.round_window().await?;
        Ok(window.is_some_and(|w| w.is_open_at(Utc::now())))
    }

    /// Whether a round opened within the last `hours`.
    pub async fn check_new_round(&self, hours: u32) -> ApiResult<bool> {
        let window = self.round_window().await?;
        let span = Duration::hours(i64::from(hours));
        Ok(window.is_some_and(|w| w.opened_within(span, Utc::now())))
    }

    /// Everything about the authenticated account.
    pub async fn account(&self) -> ApiResult<Account> {
        let data = self
            .execute(GraphqlRequest::new(queries::ACCOUNT).authorized())
            .await?;
        field(&data, "account")
    }

    /// Model name to model id, for models in the configured tournament.
    pub async fn models(&self) -> ApiResult<BTreeMap<String, String>> {
        let data = self
            .execute(GraphqlRequest::new(queries::ACCOUNT_MODELS).authorized())
            .await?;
        let account: AccountModels = field(&data, "account")?;
        let tournament = self.tournament().id();
        Ok(account
            .models
            .into_iter()
            .filter(|model| model.tournament == tournament)
            .map(|model| (model.name, model.id))
            .collect())
    }

    /// Files available for `round`, or for the current round.
    pub async fn list_datasets(&self, round: Option<u32>) -> ApiResult<Vec<String>> {
        let data = self
            .execute(
                GraphqlRequest::new(queries::LIST_DATASETS)
                    .with_variables(json!({ "round": round })),
            )
            .await?;
        field(&data, "listDatasets")
    }

    /// Download URL for one dataset file.
    pub async fn dataset_url(&self, filename: &str, round: Option<u32>) -> ApiResult<String> {
        let data = self
            .execute(
                GraphqlRequest::new(queries::DATASET)
                    .with_variables(json!({ "filename": filename, "round": round })),
            )
            .await?;
        field(&data, "dataset")
    }

    // ------------------------------------------------------------------------
    // Transfers
    // ------------------------------------------------------------------------

    /// Download a dataset file.
    ///
    /// Without `dest` the file lands in the data directory under the last
    /// segment of `filename`. Parent directories are created as needed.
    pub async fn download_dataset(
        &self,
        filename: &str,
        dest: Option<&Path>,
        round: Option<u32>,
        resume: bool,
        control: TransferControl,
    ) -> ApiResult<PathBuf> {
        let dest = dest.map_or_else(|| self.default_destination(filename), Path::to_path_buf);
        let url = self.dataset_url(filename, round).await?;
        info!(filename, destination = %dest.display(), "Downloading dataset");

        let request = DownloadRequest::new(&url, dest)?.with_resume(resume);
        Ok(self.engine.download_with(&request, control).await?)
    }

    fn default_destination(&self, filename: &str) -> PathBuf {
        let name = filename.rsplit('/').next().unwrap_or(filename);
        self.config.data_dir.join(name)
    }

    /// Upload predictions for a model and create a submission from them.
    ///
    /// Returns the submission id.
    pub async fn upload_predictions(
        &self,
        source: UploadSource,
        model_id: Option<&str>,
        control: TransferControl,
    ) -> ApiResult<String> {
        let file_name = source.file_name();
        let tournament = self.tournament();
        info!(file = %file_name, %tournament, "Uploading predictions");

        let (auth_query, auth_field, create_query, create_field, auth_vars) = match tournament {
            Tournament::Classic => (
                queries::SUBMISSION_UPLOAD_AUTH,
                "submissionUploadAuth",
                queries::CREATE_SUBMISSION,
                "createSubmission",
                json!({
                    "filename": file_name,
                    "tournament": tournament.id(),
                    "modelId": model_id,
                }),
            ),
            Tournament::Signals => (
                queries::SIGNALS_UPLOAD_AUTH,
                "submissionUploadSignalsAuth",
                queries::CREATE_SIGNALS_SUBMISSION,
                "createSignalsSubmission",
                json!({ "filename": file_name, "modelId": model_id }),
            ),
        };

        // Only Signals uploads report the compute node.
        let headers = match (tournament, &self.config.compute_id) {
            (Tournament::Signals, Some(compute_id)) => {
                vec![(COMPUTE_ID_HEADER.to_string(), compute_id.clone())]
            }
            _ => Vec::new(),
        };
        let filename = self
            .upload_to_presigned(auth_query, auth_field, auth_vars, headers, source, control)
            .await?;

        let mut create_vars = json!({
            "filename": filename,
            "modelId": model_id,
            "triggerId": self.config.trigger_id,
        });
        if tournament == Tournament::Classic {
            create_vars["tournament"] = json!(tournament.id());
        }
        let data = self
            .execute(
                GraphqlRequest::new(create_query)
                    .with_variables(create_vars)
                    .authorized(),
            )
            .await?;
        let created: CreatedSubmission = field(&data, create_field)?;
        info!(submission_id = %created.id, "Submission created");
        Ok(created.id)
    }

    /// Upload predictions for diagnostics.
    ///
    /// Returns the diagnostics id.
    pub async fn upload_diagnostics(
        &self,
        source: UploadSource,
        model_id: Option<&str>,
        control: TransferControl,
    ) -> ApiResult<String> {
        let tournament = self.tournament().id();
        info!(file = %source.file_name(), "Uploading diagnostics");

        let auth_vars = json!({
            "filename": source.file_name(),
            "tournament": tournament,
            "modelId": model_id,
        });
        let filename = self
            .upload_to_presigned(
                queries::DIAGNOSTICS_UPLOAD_AUTH,
                "diagnosticsUploadAuth",
                auth_vars,
                Vec::new(),
                source,
                control,
            )
            .await?;

        let data = self
            .execute(
                GraphqlRequest::new(queries::CREATE_DIAGNOSTICS)
                    .with_variables(json!({
                        "filename": filename,
                        "tournament": tournament,
                        "modelId": model_id,
                    }))
                    .authorized(),
            )
            .await?;
        let created: CreatedSubmission = field(&data, "createDiagnostics")?;
        info!(diagnostics_id = %created.id, "Diagnostics created");
        Ok(created.id)
    }

    /// Ask for upload authorization, then PUT `source` to the returned URL
    /// with the extra `headers`.
    ///
    /// Returns the server-assigned file name.
    async fn upload_to_presigned(
        &self,
        auth_query: &str,
        auth_field: &str,
        auth_vars: Value,
        headers: Vec<(String, String)>,
        source: UploadSource,
        control: TransferControl,
    ) -> ApiResult<String> {
        let data = self
            .execute(
                GraphqlRequest::new(auth_query)
                    .with_variables(auth_vars)
                    .authorized(),
            )
            .await?;
        let auth: UploadAuth = field(&data, auth_field)?;
        if auth.filename.is_empty() {
            return Err(ApiError::invalid("upload authorization returned an empty filename"));
        }
        debug!(filename = %auth.filename, "Received upload authorization");

        let mut request = UploadRequest::new(&auth.url, source)?;
        for (name, value) in headers {
            request = request.with_header(name, value);
        }
        let ack = self.engine.upload_with(&request, control).await?;
        debug!(status = ack.status, "Upload accepted");
        Ok(auth.filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeQueryBackend;
    use numerapi_transfer::testing::{FakeBackend, Fault};
    use numerapi_transfer::{NoBackoff, RetryPolicy, TransferConfig, TransferError};

    fn config() -> ClientConfig {
        ClientConfig::new().with_transfer(
            TransferConfig::new().with_retry(RetryPolicy::new(3).with_backoff(NoBackoff)),
        )
    }

    fn client(
        config: ClientConfig,
        queries: FakeQueryBackend,
        transfers: FakeBackend,
    ) -> NumerApi<FakeQueryBackend, FakeBackend> {
        NumerApi::with_backends(config, queries, transfers)
    }

    #[tokio::test]
    async fn current_round_reads_first_round() {
        let queries = FakeQueryBackend::new().with_response("rounds", json!({"rounds": [{"number": 812}]}));
        let api = client(config(), queries.clone(), FakeBackend::new(Vec::<u8>::new()));

        assert_eq!(api.current_round().await.unwrap(), Some(812));
        assert_eq!(queries.requests()[0].variables, json!({"tournament": 8}));
    }

    #[tokio::test]
    async fn current_round_can_be_absent() {
        let queries = FakeQueryBackend::new().with_response("rounds", json!({"rounds": [null]}));
        let api = client(config(), queries, FakeBackend::new(Vec::<u8>::new()));
        assert_eq!(api.current_round().await.unwrap(), None);
    }

    fn window_at(open_hours_ago: i64, closes_in_hours: i64) -> Value {
        let now = Utc::now();
        json!({"rounds": [{
            "number": 901,
            "openTime": (now - Duration::hours(open_hours_ago)).to_rfc3339(),
            "closeStakingTime": (now + Duration::hours(closes_in_hours)).to_rfc3339(),
        }]})
    }

    #[tokio::test]
    async fn round_checks_use_round_window() {
        let queries = FakeQueryBackend::new().with_response("rounds", window_at(5, 20));
        let api = client(config(), queries.clone(), FakeBackend::new(Vec::<u8>::new()));

        assert!(api.check_round_open().await.unwrap());
        assert!(api.check_new_round(12).await.unwrap());
        assert!(!api.check_new_round(4).await.unwrap());
        assert_eq!(api.round_window().await.unwrap().unwrap().number, 901);
        assert!(!queries.requests()[0].authorization);
    }

    #[tokio::test]
    async fn closed_round_is_not_open() {
        let queries = FakeQueryBackend::new().with_response("rounds", window_at(60, -2));
        let api = client(config(), queries, FakeBackend::new(Vec::<u8>::new()));
        assert!(!api.check_round_open().await.unwrap());
    }

    #[tokio::test]
    async fn between_rounds_nothing_is_open() {
        let queries = FakeQueryBackend::new()
            .with_errors("rounds", &["Current round not open for submissions"]);
        let api = client(config(), queries, FakeBackend::new(Vec::<u8>::new()));

        assert_eq!(api.round_window().await.unwrap(), None);
        assert!(!api.check_round_open().await.unwrap());
        assert!(!api.check_new_round(24).await.unwrap());
    }

    #[tokio::test]
    async fn account_is_authorized_and_typed() {
        let queries = FakeQueryBackend::new().with_response(
            "account",
            json!({"account": {
                "id": "acc-1",
                "username": "uuazed",
                "mfaEnabled": true,
                "models": [{"id": "m-1", "name": "alpha", "tournament": 8}]
            }}),
        );
        let api = client(config(), queries.clone(), FakeBackend::new(Vec::<u8>::new()));

        let account = api.account().await.unwrap();
        assert_eq!(account.id, "acc-1");
        assert_eq!(account.mfa_enabled, Some(true));
        assert_eq!(account.models[0].name, "alpha");
        assert!(queries.requests()[0].authorization);
    }

    #[tokio::test]
    async fn account_without_id_is_invalid() {
        let queries = FakeQueryBackend::new()
            .with_response("account", json!({"account": {"username": "x", "models": []}}));
        let api = client(config(), queries, FakeBackend::new(Vec::<u8>::new()));
        assert!(matches!(api.account().await, Err(ApiError::InvalidResponse { .. })));
    }

    #[tokio::test]
    async fn models_are_filtered_by_tournament() {
        let queries = FakeQueryBackend::new().with_response(
            "account",
            json!({"account": {"models": [
                {"id": "id-1", "name": "alpha", "tournament": 8},
                {"id": "id-2", "name": "beta", "tournament": 11},
            ]}}),
        );
        let api = client(
            config().with_tournament(Tournament::Signals),
            queries.clone(),
            FakeBackend::new(Vec::<u8>::new()),
        );

        let models = api.models().await.unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models["beta"], "id-2");
        assert!(queries.requests()[0].authorization);
    }

    #[tokio::test]
    async fn models_need_credentials() {
        let queries = FakeQueryBackend::new().without_credentials();
        let api = client(config(), queries.clone(), FakeBackend::new(Vec::<u8>::new()));

        assert!(matches!(api.models().await, Err(ApiError::MissingCredentials)));
        assert_eq!(queries.requests().len(), 0);
    }

    #[tokio::test]
    async fn graphql_errors_surface() {
        let queries = FakeQueryBackend::new().with_errors("listDatasets", &["round 9999 not found"]);
        let api = client(config(), queries, FakeBackend::new(Vec::<u8>::new()));

        match api.list_datasets(Some(9999)).await {
            Err(ApiError::Graphql { messages }) => assert_eq!(messages, ["round 9999 not found"]),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn download_dataset_defaults_to_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let queries = FakeQueryBackend::new().with_response(
            "dataset",
            json!({"dataset": "https://datasets.example.com/v5.0/live.parquet?X-Amz-Signature=abc"}),
        );
        let transfers = FakeBackend::new(vec![1u8; 3000]);
        let api = client(
            config().with_data_dir(dir.path().join("data")),
            queries.clone(),
            transfers.clone(),
        );

        let path = api
            .download_dataset("v5.0/live.parquet", None, Some(600), false, api.control())
            .await
            .unwrap();

        assert_eq!(path, std::path::absolute(dir.path().join("data/live.parquet")).unwrap());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 3000);
        assert_eq!(
            queries.requests()[0].variables,
            json!({"filename": "v5.0/live.parquet", "round": 600})
        );
        assert_eq!(transfers.request_count(), 1);
    }

    #[tokio::test]
    async fn classic_submission_flow() {
        let queries = FakeQueryBackend::new()
            .with_response(
                "submissionUploadAuth",
                json!({"submissionUploadAuth": {"filename": "srv/abc.csv", "url": "https://bucket.example.com/abc"}}),
            )
            .with_response("createSubmission", json!({"createSubmission": {"id": "sub-1"}}));
        let transfers = FakeBackend::new(Vec::<u8>::new());
        let api = client(
            config().with_compute_id("node-7").with_trigger_id("trig-1"),
            queries.clone(),
            transfers.clone(),
        );

        let id = api
            .upload_predictions(
                UploadSource::buffer("predictions.csv", b"id,prediction\n".to_vec()),
                Some("model-1"),
                api.control(),
            )
            .await
            .unwrap();
        assert_eq!(id, "sub-1");

        let sent = queries.requests();
        assert_eq!(sent.len(), 2);
        assert_eq!(
            sent[0].variables,
            json!({"filename": "predictions.csv", "tournament": 8, "modelId": "model-1"})
        );
        assert_eq!(
            sent[1].variables,
            json!({"filename": "srv/abc.csv", "tournament": 8, "modelId": "model-1", "triggerId": "trig-1"})
        );

        let uploads = transfers.requests();
        assert_eq!(uploads[0].url, "https://bucket.example.com/abc");
        assert_eq!(uploads[0].received, b"id,prediction\n");
        assert!(uploads[0].headers.is_empty());
    }

    #[tokio::test]
    async fn signals_submission_uses_signals_endpoints() {
        let queries = FakeQueryBackend::new()
            .with_response(
                "submissionUploadSignalsAuth",
                json!({"submissionUploadSignalsAuth": {"filename": "s.csv", "url": "https://bucket.example.com/s"}}),
            )
            .with_response("createSignalsSubmission", json!({"createSignalsSubmission": {"id": "sig-1"}}));
        let transfers = FakeBackend::new(Vec::<u8>::new());
        let api = client(
            config()
                .with_tournament(Tournament::Signals)
                .with_compute_id("node-7"),
            queries.clone(),
            transfers.clone(),
        );

        let id = api
            .upload_predictions(UploadSource::buffer("s.csv", b"ticker\n".to_vec()), None, api.control())
            .await
            .unwrap();
        assert_eq!(id, "sig-1");
        assert_eq!(
            queries.requests()[1].variables,
            json!({"filename": "s.csv", "modelId": null, "triggerId": null})
        );
        assert_eq!(
            transfers.requests()[0].headers,
            vec![("x_compute_id".to_string(), "node-7".to_string())]
        );
    }

    #[tokio::test]
    async fn rejected_upload_skips_creation() {
        let queries = FakeQueryBackend::new().with_response(
            "diagnosticsUploadAuth",
            json!({"diagnosticsUploadAuth": {"filename": "d.csv", "url": "https://bucket.example.com/d"}}),
        );
        let transfers = FakeBackend::new(Vec::<u8>::new()).with_fault(Fault::Status(403, "expired"));
        let api = client(config(), queries.clone(), transfers.clone());

        let err = api
            .upload_diagnostics(UploadSource::buffer("d.csv", b"x".to_vec()), Some("m"), api.control())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ApiError::Transfer(TransferError::NonRetryableRequest { status: 403, .. })
        ));
        assert_eq!(transfers.request_count(), 1);
        assert_eq!(queries.requests().len(), 1);
    }

    #[tokio::test]
    async fn diagnostics_flow_returns_id() {
        let queries = FakeQueryBackend::new()
            .with_response(
                "diagnosticsUploadAuth",
                json!({"diagnosticsUploadAuth": {"filename": "d.csv", "url": "https://bucket.example.com/d"}}),
            )
            .with_response("createDiagnostics", json!({"createDiagnostics": {"id": "diag-1"}}));
        let transfers = FakeBackend::new(Vec::<u8>::new());
        let api = client(config().with_compute_id("node-7"), queries, transfers.clone());

        let id = api
            .upload_diagnostics(UploadSource::buffer("d.csv", b"x".to_vec()), Some("m"), api.control())
            .await
            .unwrap();
        assert_eq!(id, "diag-1");
        assert!(transfers.requests()[0].headers.is_empty());
    }

    #[tokio::test]
    async fn raw_query_passes_through() {
        let queries = FakeQueryBackend::new().with_response("leaderboard", json!({"leaderboard": []}));
        let api = client(config(), queries.clone(), FakeBackend::new(Vec::<u8>::new()));

        let data = api
            .raw_query("query { leaderboard { username } }", Value::Null, false)
            .await
            .unwrap();
        assert_eq!(data, json!({"leaderboard": []}));
        assert!(!queries.requests()[0].authorization);
    }
}
