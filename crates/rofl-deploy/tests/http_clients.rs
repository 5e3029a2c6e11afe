//! HTTP collaborator clients against local stub servers.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use rofl_deploy::artifacts::{ArtifactClient, ArtifactStore};
use rofl_deploy::build::{BuildBackend, BuildClient};
use rofl_deploy::chain::{
    AppRecord, CreateBody, GatewayClient, IdentifierScheme, LedgerReader, ReceiptStatus,
    ReceiptWatcher, RuntimeCall, SignerClient, TransactionSigner,
};
use rofl_deploy::indexer::{EventIndexer, NexusClient, APP_CREATED_EVENT};
use rofl_deploy::manifest::{AppAuthPolicy, BuildInputs};
use rofl_deploy::types::TaskId;
use rofl_deploy::{AppId, AuthToken, DeployConfig, DeployError, Network, TxHash};
use rofl_secrets::SecretEncryptionKey;
use serde_json::{json, Value};
use tokio::net::TcpListener;

async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

fn testnet_config(base: &str) -> DeployConfig {
    let mut config = DeployConfig::default();
    config.networks.testnet.nexus_url = format!("{base}/v1/");
    config.networks.testnet.gateway_url = format!("{base}/api");
    config.networks.testnet.signer_url = base.to_owned();
    config
}

fn token() -> AuthToken {
    AuthToken::new("secret-token")
}

fn create_call() -> RuntimeCall {
    RuntimeCall::Create(CreateBody {
        scheme: IdentifierScheme::CreatorNonce,
        policy: AppAuthPolicy::default(),
        metadata: BTreeMap::new(),
    })
}

type Captured = Arc<Mutex<Vec<(Option<String>, Value)>>>;

#[tokio::test]
async fn build_submit_sends_inputs_with_bearer_token() {
    let captured = Captured::default();
    let router = Router::new()
        .route(
            "/rofl/build",
            post(
                |State(captured): State<Captured>, headers: HeaderMap, Json(body): Json<Value>| async move {
                    captured.lock().unwrap().push((bearer(&headers), body));
                    Json(json!({ "task_id": "t1" }))
                },
            ),
        )
        .with_state(captured.clone());
    let client = BuildClient::with_url(format!("{}/", serve(router).await)).unwrap();

    let inputs = BuildInputs {
        manifest: "name: app\n".to_owned(),
        compose: "services: {}\n".to_owned(),
    };
    let task_id = client.submit(&inputs, &token()).await.unwrap();

    assert_eq!(task_id, TaskId::new("t1"));
    let captured = captured.lock().unwrap();
    assert_eq!(captured[0].0.as_deref(), Some("Bearer secret-token"));
    assert_eq!(
        captured[0].1,
        json!({ "manifest": "name: app\n", "compose": "services: {}\n" })
    );
}

#[tokio::test]
async fn build_submit_rejects_empty_task_id() {
    let router = Router::new().route(
        "/rofl/build",
        post(|| async { Json(json!({ "task_id": "" })) }),
    );
    let client = BuildClient::with_url(serve(router).await).unwrap();

    let inputs = BuildInputs {
        manifest: String::new(),
        compose: String::new(),
    };
    let err = client.submit(&inputs, &token()).await.unwrap_err();

    assert!(matches!(err, DeployError::MissingField("task_id")));
}

#[tokio::test]
async fn build_results_decode_running_and_failed_jobs() {
    let router = Router::new().route(
        "/rofl/build/:id/results",
        get(|Path(id): Path<String>| async move {
            match id.as_str() {
                "running" => Json(json!({ "logs": ["step 1/4"] })),
                _ => Json(json!({ "logs": [], "err": "out of disk" })),
            }
        }),
    );
    let client = BuildClient::with_url(serve(router).await).unwrap();

    let running = client
        .results(&TaskId::new("running"), &token())
        .await
        .unwrap();
    assert!(!running.is_settled());
    assert_eq!(running.logs, vec!["step 1/4".to_owned()]);

    let failed = client
        .results(&TaskId::new("broken"), &token())
        .await
        .unwrap();
    assert_eq!(failed.failure(), Some("out of disk"));
}

#[tokio::test]
async fn unknown_build_task_is_not_found() {
    let router = Router::new().route(
        "/rofl/build/:id/results",
        get(|| async { StatusCode::NOT_FOUND }),
    );
    let client = BuildClient::with_url(serve(router).await).unwrap();

    let err = client
        .results(&TaskId::new("t9"), &token())
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::BuildNotFound(id) if id == "t9"));
}

type Blobs = Arc<Mutex<HashMap<String, Vec<u8>>>>;

#[tokio::test]
async fn artifacts_round_trip_through_store() {
    let blobs = Blobs::default();
    let router = Router::new()
        .route(
            "/artifacts/:id",
            get(
                |State(blobs): State<Blobs>, Path(id): Path<String>| async move {
                    blobs
                        .lock()
                        .unwrap()
                        .get(&id)
                        .cloned()
                        .ok_or(StatusCode::NOT_FOUND)
                },
            )
            .put(
                |State(blobs): State<Blobs>, Path(id): Path<String>, body: Bytes| async move {
                    blobs.lock().unwrap().insert(id, body.to_vec());
                    StatusCode::NO_CONTENT
                },
            ),
        )
        .with_state(blobs.clone());
    let client = ArtifactClient::with_url(serve(router).await).unwrap();

    client
        .upload("rofl1qqq-roflyaml", b"name: app\n".to_vec(), &token())
        .await
        .unwrap();

    assert_eq!(
        client.download("rofl1qqq-roflyaml", &token()).await.unwrap(),
        Some(b"name: app\n".to_vec())
    );
    assert_eq!(
        client.download("rofl1qqq-composeyaml", &token()).await.unwrap(),
        None
    );
}

#[tokio::test]
async fn artifact_upload_failure_reports_status() {
    let router = Router::new().route(
        "/artifacts/:id",
        put(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "disk full") }),
    );
    let client = ArtifactClient::with_url(serve(router).await).unwrap();

    let err = client
        .upload("rofl1qqq-roflyaml", Vec::new(), &token())
        .await
        .unwrap_err();

    match err {
        DeployError::UnexpectedStatus {
            service,
            status,
            body,
        } => {
            assert_eq!(service, "artifact store");
            assert_eq!(status, 500);
            assert_eq!(body, "disk full");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn indexer_queries_events_by_transaction() {
    let router = Router::new().route(
        "/v1/sapphire/events",
        get(|headers: HeaderMap, Query(query): Query<HashMap<String, String>>| async move {
            if bearer(&headers).as_deref() != Some("Bearer secret-token") {
                return Json(json!({ "events": [] }));
            }
            let expected = [
                ("tx_hash", "abc123"),
                ("type", APP_CREATED_EVENT),
                ("limit", "1"),
                ("offset", "0"),
            ];
            if expected
                .iter()
                .any(|(k, v)| query.get(*k).map(String::as_str) != Some(*v))
            {
                return Json(json!({ "events": [] }));
            }
            Json(json!({
                "events": [{ "type": APP_CREATED_EVENT, "body": { "id": "rofl1qqq" } }]
            }))
        }),
    );
    let client = NexusClient::new(&testnet_config(&serve(router).await)).unwrap();

    let page = client
        .events_by_tx(Network::Testnet, APP_CREATED_EVENT, "abc123", &token())
        .await
        .unwrap();

    assert_eq!(page.first_app_id(), Some(AppId::new("rofl1qqq")));
}

#[tokio::test]
async fn indexer_treats_unknown_transaction_as_empty() {
    let router = Router::new().route(
        "/v1/sapphire/events",
        get(|| async { StatusCode::NOT_FOUND }),
    );
    let client = NexusClient::new(&testnet_config(&serve(router).await)).unwrap();

    let page = client
        .events_by_tx(Network::Testnet, APP_CREATED_EVENT, "abc123", &token())
        .await
        .unwrap();

    assert!(page.events.is_empty());
}

#[tokio::test]
async fn signer_submits_call_and_returns_hash() {
    let captured = Captured::default();
    let router = Router::new()
        .route(
            "/transactions",
            post(
                |State(captured): State<Captured>, headers: HeaderMap, Json(body): Json<Value>| async move {
                    captured.lock().unwrap().push((bearer(&headers), body));
                    Json(json!({ "hash": "0xabc123" }))
                },
            ),
        )
        .with_state(captured.clone());
    let client = SignerClient::new(&testnet_config(&serve(router).await)).unwrap();

    let hash = client
        .sign_and_submit(Network::Testnet, &create_call(), &token())
        .await
        .unwrap();

    assert_eq!(hash, TxHash::new("0xabc123"));
    let captured = captured.lock().unwrap();
    assert_eq!(captured[0].0.as_deref(), Some("Bearer secret-token"));
    assert_eq!(captured[0].1["method"], "rofl.Create");
}

#[tokio::test]
async fn signer_refusal_is_declined() {
    let router = Router::new().route("/transactions", post(|| async { StatusCode::FORBIDDEN }));
    let client = SignerClient::new(&testnet_config(&serve(router).await)).unwrap();

    let err = client
        .sign_and_submit(Network::Testnet, &create_call(), &token())
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::SignatureDeclined));
}

#[tokio::test]
async fn gateway_reports_receipt_states() {
    let router = Router::new().route(
        "/api/sapphire/transactions/:hash",
        get(|headers: HeaderMap, Path(hash): Path<String>| async move {
            if bearer(&headers).is_none() {
                return Err(StatusCode::UNAUTHORIZED);
            }
            match hash.as_str() {
                "0xdone" => Ok(Json(json!({ "status": "confirmed" }))),
                "0xbad" => Ok(Json(json!({ "status": "reverted", "reason": "out of gas" }))),
                _ => Err(StatusCode::NOT_FOUND),
            }
        }),
    );
    let client = GatewayClient::new(&testnet_config(&serve(router).await)).unwrap();

    let status = |hash: &'static str| {
        let client = client.clone();
        async move {
            client
                .receipt_status(Network::Testnet, &TxHash::new(hash), &token())
                .await
                .unwrap()
        }
    };

    assert_eq!(status("0xdone").await, ReceiptStatus::Confirmed);
    assert_eq!(
        status("0xbad").await,
        ReceiptStatus::Reverted {
            reason: "out of gas".to_owned()
        }
    );
    assert_eq!(status("0xunknown").await, ReceiptStatus::Pending);
}

#[tokio::test]
async fn gateway_reads_app_record() {
    let record = AppRecord {
        id: AppId::new("rofl1qqq"),
        admin: Some("oasis1qzadmin".to_owned()),
        metadata: BTreeMap::from([("net.oasis.rofl.name".to_owned(), "app".to_owned())]),
        sek: SecretEncryptionKey::from_bytes([9u8; 32]),
        policy: AppAuthPolicy::default(),
        secrets: BTreeMap::from([("API_KEY".to_owned(), "c2VhbGVk".to_owned())]),
    };
    let served = record.clone();
    let router = Router::new().route(
        "/api/sapphire/rofl/apps/:id",
        get(move |Path(id): Path<String>| {
            let served = served.clone();
            async move {
                if id == served.id.as_str() {
                    Ok(Json(served))
                } else {
                    Err(StatusCode::NOT_FOUND)
                }
            }
        }),
    );
    let client = GatewayClient::new(&testnet_config(&serve(router).await)).unwrap();

    let fetched = client
        .app(Network::Testnet, &AppId::new("rofl1qqq"), &token())
        .await
        .unwrap();
    assert_eq!(fetched, record);

    let err = client
        .app(Network::Testnet, &AppId::new("rofl1zzz"), &token())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DeployError::UnexpectedStatus { status: 404, .. }
    ));
}
