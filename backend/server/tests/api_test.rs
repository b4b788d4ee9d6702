//! Integration tests for the SciFund REST API.
//!
//! The router runs against the in-memory repository, ledger and content
//! store; sessions come from real wallet signatures.

use std::sync::Arc;

use axum::http::{header, HeaderValue};
use axum_test::TestServer;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use serde_json::{json, Value};
use sha3::{Digest, Keccak256};

use scifund_server::api::build_router;
use scifund_server::auth::AuthGate;
use scifund_server::content::MemoryContentStore;
use scifund_server::engine::FundingEngine;
use scifund_server::ledger::MemoryLedger;
use scifund_server::memory::MemoryRepository;
use scifund_server::repository::Repository;
use scifund_server::AppState;

struct Wallet {
    secret: SecretKey,
    address: String,
}

impl Wallet {
    fn new(seed: u8) -> Self {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(&[seed; 32]).expect("valid key");
        let public = PublicKey::from_secret_key(&secp, &secret);
        let digest = Keccak256::digest(&public.serialize_uncompressed()[1..]);
        Self {
            secret,
            address: format!("0x{}", hex::encode(&digest[12..])),
        }
    }

    fn personal_sign(&self, message: &str) -> String {
        let mut hasher = Keccak256::new();
        hasher.update(format!("\x19Ethereum Signed Message:\n{}", message.len()).as_bytes());
        hasher.update(message.as_bytes());
        let digest: [u8; 32] = hasher.finalize().into();

        let secp = Secp256k1::new();
        let sig = secp.sign_ecdsa_recoverable(&Message::from_digest(digest), &self.secret);
        let (recovery_id, compact) = sig.serialize_compact();
        let mut bytes = compact.to_vec();
        bytes.push(recovery_id.to_i32() as u8 + 27);
        format!("0x{}", hex::encode(bytes))
    }
}

fn test_server() -> TestServer {
    let repo: Arc<dyn Repository> = Arc::new(MemoryRepository::new());
    let state = AppState {
        engine: Arc::new(FundingEngine::new(
            repo.clone(),
            Arc::new(MemoryLedger::new()),
        )),
        auth: Arc::new(AuthGate::new(repo, "integration-secret", 3600)),
        content: Arc::new(MemoryContentStore::new()),
        gateway: "https://ipfs.io/ipfs/".to_string(),
    };
    TestServer::new(build_router(state)).expect("Failed to create test server")
}

fn bearer(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {token}")).expect("valid header")
}

/// Sign in through the API; returns `(token, user_id)`.
async fn sign_in(server: &TestServer, wallet: &Wallet) -> (String, i64) {
    let response = server
        .get(&format!("/auth/message/{}", wallet.address))
        .await;
    assert_eq!(response.status_code(), 200);
    let message = response.json::<Value>()["message"]
        .as_str()
        .expect("message")
        .to_string();

    let response = server
        .post("/auth/signin")
        .json(&json!({
            "address": wallet.address,
            "signature": wallet.personal_sign(&message),
        }))
        .await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    (
        body["token"].as_str().expect("token").to_string(),
        body["user"]["id"].as_i64().expect("user id"),
    )
}

async fn create_project(server: &TestServer, researcher_id: i64, goal: i64) -> i64 {
    let response = server
        .post("/projects")
        .json(&json!({
            "title": "Deep-sea microbial mats",
            "description": "Sampling hydrothermal vents",
            "fundingGoal": goal,
            "deadline": chrono::Utc::now().timestamp() + 30 * 86_400,
            "researcherId": researcher_id,
            "categoryId": 1,
            "tags": ["ocean", "microbiology"],
            "contentHash": "QmProposal",
        }))
        .await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    assert_eq!(json["status"], "ACTIVE");
    assert_eq!(json["currentFunding"], 0);
    json["id"].as_i64().expect("project id")
}

#[tokio::test]
async fn test_health() {
    let server = test_server();
    let response = server.get("/health").await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_sign_in_flow() {
    let server = test_server();
    let wallet = Wallet::new(0x11);

    let (token, user_id) = sign_in(&server, &wallet).await;

    let response = server
        .get("/auth/session")
        .add_header(header::AUTHORIZATION, bearer(&token))
        .await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    assert_eq!(json["id"], user_id);
    assert_eq!(json["address"], wallet.address);

    // Signing in again reuses the account.
    let (_, again) = sign_in(&server, &wallet).await;
    assert_eq!(again, user_id);

    // Session endpoint without a token.
    let response = server.get("/auth/session").await;
    assert_eq!(response.status_code(), 401);
    assert!(response.json::<Value>()["error"].is_string());
}

#[tokio::test]
async fn test_sign_in_rejects_foreign_signature() {
    let server = test_server();
    let claimed = Wallet::new(0x21);
    let signer = Wallet::new(0x22);
    let message = format!("Sign in to SciFund with address {}", claimed.address);

    let response = server
        .post("/auth/signin")
        .json(&json!({
            "address": claimed.address,
            "signature": signer.personal_sign(&message),
        }))
        .await;
    assert_eq!(response.status_code(), 401);

    let response = server.get("/auth/message/not-an-address").await;
    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn test_funding_lifecycle() {
    let server = test_server();
    let researcher = Wallet::new(0x31);
    let funder = Wallet::new(0x32);
    let (researcher_token, researcher_id) = sign_in(&server, &researcher).await;
    let (funder_token, funder_id) = sign_in(&server, &funder).await;

    let project_id = create_project(&server, researcher_id, 100).await;

    let response = server
        .post(&format!("/projects/{project_id}/fund"))
        .json(&json!({ "amount": 60, "userId": funder_id }))
        .await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    assert_eq!(json["project"]["status"], "ACTIVE");
    assert_eq!(json["project"]["currentFunding"], 60);
    assert_eq!(json["contribution"]["amount"], 60);

    let response = server
        .post(&format!("/projects/{project_id}/fund"))
        .json(&json!({ "amount": 40, "userId": funder_id }))
        .await;
    let json: Value = response.json();
    assert_eq!(json["project"]["status"], "FUNDED");
    assert_eq!(json["project"]["currentFunding"], 100);

    // Funded projects take no more money.
    let response = server
        .post(&format!("/projects/{project_id}/fund"))
        .json(&json!({ "amount": 10, "userId": funder_id }))
        .await;
    assert_eq!(response.status_code(), 400);
    assert_eq!(
        response.json::<Value>()["error"],
        "Project is not accepting funding"
    );

    // Only the researcher publishes.
    let output_body = json!({ "contentHash": "QmResults", "title": "Findings" });
    let response = server
        .post(&format!("/projects/{project_id}/output"))
        .json(&output_body)
        .await;
    assert_eq!(response.status_code(), 401);
    let response = server
        .post(&format!("/projects/{project_id}/output"))
        .add_header(header::AUTHORIZATION, bearer(&funder_token))
        .json(&output_body)
        .await;
    assert_eq!(response.status_code(), 401);

    let response = server
        .post(&format!("/projects/{project_id}/output"))
        .add_header(header::AUTHORIZATION, bearer(&researcher_token))
        .json(&output_body)
        .await;
    assert_eq!(response.status_code(), 200);
    let output_id = response.json::<Value>()["id"].as_i64().expect("output id");

    let response = server.get(&format!("/projects/{project_id}")).await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    assert_eq!(json["status"], "COMPLETED");
    assert_eq!(json["category"], "Biology");
    assert_eq!(json["contributions"].as_array().map(Vec::len), Some(2));
    assert_eq!(json["outputs"][0]["title"], "Findings");

    // Status never moves backwards.
    let response = server
        .put(&format!("/projects/{project_id}"))
        .add_header(header::AUTHORIZATION, bearer(&researcher_token))
        .json(&json!({ "status": "ACTIVE" }))
        .await;
    assert_eq!(response.status_code(), 400);

    let response = server
        .get(&format!("/projects/{project_id}/output/{output_id}"))
        .await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    assert_eq!(json["project"]["id"], project_id);
    assert_eq!(json["researcher"]["id"], researcher_id);
}

#[tokio::test]
async fn test_reviews_and_rewards() {
    let server = test_server();
    let researcher = Wallet::new(0x41);
    let reviewer = Wallet::new(0x42);
    let (researcher_token, researcher_id) = sign_in(&server, &researcher).await;
    let (reviewer_token, _) = sign_in(&server, &reviewer).await;

    let project_id = create_project(&server, researcher_id, 100).await;
    let response = server
        .post(&format!("/projects/{project_id}/output"))
        .add_header(header::AUTHORIZATION, bearer(&researcher_token))
        .json(&json!({ "contentHash": "QmOut" }))
        .await;
    let output_id = response.json::<Value>()["id"].as_i64().expect("output id");
    let base = format!("/projects/{project_id}/output/{output_id}");

    // Reviews.
    let response = server
        .post(&format!("{base}/review"))
        .json(&json!({ "rating": 4, "comment": "anon" }))
        .await;
    assert_eq!(response.status_code(), 401);
    let response = server
        .post(&format!("{base}/review"))
        .add_header(header::AUTHORIZATION, bearer(&reviewer_token))
        .json(&json!({ "rating": 6, "comment": "off the scale" }))
        .await;
    assert_eq!(response.status_code(), 400);
    let response = server
        .post(&format!("{base}/review"))
        .add_header(header::AUTHORIZATION, bearer(&reviewer_token))
        .json(&json!({ "rating": 3, "comment": "Plausible" }))
        .await;
    assert_eq!(response.status_code(), 200);
    let response = server
        .post(&format!("{base}/review"))
        .add_header(header::AUTHORIZATION, bearer(&reviewer_token))
        .json(&json!({ "rating": 5, "comment": "Again" }))
        .await;
    assert_eq!(response.status_code(), 400);

    // Rewards.
    let response = server
        .post(&format!("{base}/rewards"))
        .add_header(header::AUTHORIZATION, bearer(&reviewer_token))
        .json(&json!({ "amount": 50 }))
        .await;
    assert_eq!(response.status_code(), 403);
    let response = server
        .post(&format!("{base}/rewards"))
        .add_header(header::AUTHORIZATION, bearer(&researcher_token))
        .json(&json!({ "amount": 50 }))
        .await;
    assert_eq!(response.status_code(), 404);

    let response = server
        .post(&format!("{base}/token"))
        .add_header(header::AUTHORIZATION, bearer(&researcher_token))
        .json(&json!({ "tokenId": 1 }))
        .await;
    assert_eq!(response.status_code(), 200);

    let response = server
        .post(&format!("{base}/rewards"))
        .add_header(header::AUTHORIZATION, bearer(&researcher_token))
        .json(&json!({ "amount": 0 }))
        .await;
    assert_eq!(response.status_code(), 400);
    let response = server
        .post(&format!("{base}/rewards"))
        .add_header(header::AUTHORIZATION, bearer(&researcher_token))
        .json(&json!({ "amount": 50 }))
        .await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.json::<Value>()["status"], "PENDING");
    let response = server
        .post(&format!("{base}/rewards"))
        .add_header(header::AUTHORIZATION, bearer(&researcher_token))
        .json(&json!({ "amount": 50 }))
        .await;
    assert_eq!(response.status_code(), 400);

    // The output is addressed through a project it does not belong to.
    let foreign = format!("/projects/{}/output/{output_id}", project_id + 1000);
    let response = server
        .post(&format!("{foreign}/review"))
        .add_header(header::AUTHORIZATION, bearer(&researcher_token))
        .json(&json!({ "rating": 4, "comment": "Wrong project" }))
        .await;
    assert_eq!(response.status_code(), 404);
    let response = server
        .post(&format!("{foreign}/token"))
        .add_header(header::AUTHORIZATION, bearer(&researcher_token))
        .json(&json!({ "tokenId": 2 }))
        .await;
    assert_eq!(response.status_code(), 404);
    let response = server.get(&format!("{foreign}/rewards")).await;
    assert_eq!(response.status_code(), 404);

    let response = server.get(&format!("{base}/rewards")).await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    assert_eq!(json["rewardDistributions"].as_array().map(Vec::len), Some(1));
    assert_eq!(
        json["rewardDistributions"][0]["contributorRewards"]
            .as_array()
            .map(Vec::len),
        Some(0)
    );
    assert_eq!(json["token"]["tokenId"], 1);
    assert_eq!(json["project"]["id"], project_id);
}

#[tokio::test]
async fn test_listing_and_deletion() {
    let server = test_server();
    let researcher = Wallet::new(0x51);
    let other = Wallet::new(0x52);
    let (researcher_token, researcher_id) = sign_in(&server, &researcher).await;
    let (other_token, other_id) = sign_in(&server, &other).await;

    let small = create_project(&server, researcher_id, 50).await;
    let large = create_project(&server, researcher_id, 500).await;
    server
        .post(&format!("/projects/{small}/fund"))
        .json(&json!({ "amount": 50, "userId": other_id }))
        .await;

    let response = server.get("/projects?sort=goal").await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    assert_eq!(json[0]["id"], small);
    assert_eq!(json[0]["categoryName"], "Biology");
    assert!(json[0]["researcherName"].is_string());

    let response = server.get("/projects?status=active").await;
    let json: Value = response.json();
    assert_eq!(json.as_array().map(Vec::len), Some(1));
    assert_eq!(json[0]["id"], large);

    let response = server.get("/projects?status=all&category=Physics").await;
    assert_eq!(response.json::<Value>().as_array().map(Vec::len), Some(0));

    let response = server.get("/projects?status=bogus").await;
    assert_eq!(response.status_code(), 400);

    let response = server.delete(&format!("/projects/{large}")).await;
    assert_eq!(response.status_code(), 401);
    let response = server
        .delete(&format!("/projects/{large}"))
        .add_header(header::AUTHORIZATION, bearer(&other_token))
        .await;
    assert_eq!(response.status_code(), 403);
    let response = server
        .delete(&format!("/projects/{large}"))
        .add_header(header::AUTHORIZATION, bearer(&researcher_token))
        .await;
    assert_eq!(response.status_code(), 204);

    let response = server.get(&format!("/projects/{large}")).await;
    assert_eq!(response.status_code(), 404);
    assert_eq!(response.json::<Value>()["error"], "Project not found");
}

#[tokio::test]
async fn test_create_project_validation() {
    let server = test_server();
    let (_, researcher_id) = sign_in(&server, &Wallet::new(0x61)).await;

    let response = server
        .post("/projects")
        .json(&json!({
            "title": "Zero goal",
            "description": "d",
            "fundingGoal": 0,
            "deadline": chrono::Utc::now().timestamp() + 86_400,
            "researcherId": researcher_id,
            "contentHash": "Qm",
        }))
        .await;
    assert_eq!(response.status_code(), 400);

    let response = server
        .post("/projects")
        .json(&json!({ "title": "Missing fields" }))
        .await;
    assert_eq!(response.status_code(), 400);
    assert!(response.json::<Value>()["error"].is_string());

    let response = server
        .post("/projects/999/fund")
        .json(&json!({ "amount": 10, "userId": researcher_id }))
        .await;
    assert_eq!(response.status_code(), 404);
}

#[tokio::test]
async fn test_content_round_trip() {
    let server = test_server();
    let document = json!({ "abstract": "We measure things.", "sections": ["intro", "methods"] });

    let response = server
        .post("/content")
        .json(&json!({
            "document": document,
            "metadata": {
                "name": "Proposal",
                "description": "Project proposal",
                "version": "1.0",
                "timestamp": 1_700_000_000,
            },
        }))
        .await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    let hash = json["hash"].as_str().expect("hash").to_string();
    assert_eq!(json["url"], format!("https://ipfs.io/ipfs/{hash}"));

    let response = server.get(&format!("/content/{hash}")).await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.json::<Value>(), document);

    let response = server.get("/content/unknown").await;
    assert_eq!(response.status_code(), 404);
}
