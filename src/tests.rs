//! Integration tests for the City Fix backend.

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{encode, EncodingKey, Header};
use reqwest::{Client, Method, RequestBuilder};
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::auth::{IdentityVerifier, JwtVerifier, RoleGate};
use crate::config::{Config, LogFormat};
use crate::db::{init_database, Repository};
use crate::models::{Role, UpdateUserRequest};
use crate::quota::QuotaPolicy;
use crate::search::SearchIndex;
use crate::tracking;
use crate::{create_router, AppState};

const JWT_SECRET: &str = "integration-test-secret";
const ADMIN: &str = "admin@cityfix.test";
const CITIZEN: &str = "citizen@cityfix.test";
const NEIGHBOUR: &str = "neighbour@cityfix.test";
const FIELD: &str = "field@cityfix.test";

/// Test fixture for integration tests.
struct TestFixture {
    client: Client,
    base_url: String,
    repo: Arc<Repository>,
    _temp_dir: TempDir,
}

impl TestFixture {
    async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.sqlite");
        let index_path = temp_dir.path().join("index");

        // Initialize database
        let pool = init_database(&db_path, 5)
            .await
            .expect("Failed to init DB");
        let repo = Arc::new(Repository::new(pool));

        // Initialize search index
        let search = Arc::new(SearchIndex::open(&index_path).expect("Failed to init search"));

        // Create config
        let config = Config {
            jwt_secret: JWT_SECRET.to_string(),
            jwt_issuer: None,
            jwt_audience: None,
            db_path,
            db_max_connections: 5,
            index_path,
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "warn".to_string(),
            log_format: LogFormat::Pretty,
            tracking_prefix: "cityfix".to_string(),
            quota: QuotaPolicy::default(),
            request_timeout: Duration::from_secs(30),
            verify_timeout: Duration::from_secs(5),
        };

        let verifier: Arc<dyn IdentityVerifier> = Arc::new(JwtVerifier::from_config(&config));

        let state = AppState {
            repo: repo.clone(),
            gate: RoleGate::new(repo.clone()),
            search,
            config: Arc::new(config),
            verifier,
        };

        let app = create_router(state);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        // Spawn server
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait for server to start
        tokio::time::sleep(Duration::from_millis(100)).await;

        TestFixture {
            client: Client::new(),
            base_url,
            repo,
            _temp_dir: temp_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn token(email: &str) -> String {
        let claims = json!({
            "email": email,
            "email_verified": true,
            "exp": chrono::Utc::now().timestamp() + 3600,
        });
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
        )
        .unwrap()
    }

    /// A request authenticated as `email`.
    fn request(&self, method: Method, path: &str, email: &str) -> RequestBuilder {
        self.client
            .request(method, self.url(path))
            .bearer_auth(Self::token(email))
    }

    async fn login(&self, email: &str) -> Value {
        let resp = self
            .request(Method::POST, "/user", email)
            .json(&json!({ "name": email.split('@').next().unwrap() }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        resp.json().await.unwrap()
    }

    /// Logs in every test actor and makes `ADMIN` an admin.
    async fn with_actors() -> Self {
        let fixture = Self::new().await;
        for email in [ADMIN, CITIZEN, NEIGHBOUR, FIELD] {
            fixture.login(email).await;
        }
        fixture
            .repo
            .update_user(
                ADMIN,
                &UpdateUserRequest {
                    role: Some(Role::Admin),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        fixture
    }

    async fn submit(&self, email: &str, name: &str) -> reqwest::Response {
        self.request(Method::POST, "/issues", email)
            .json(&json!({
                "issueName": name,
                "description": "Reported through the mobile app",
                "category": "Road",
                "division": "Dhaka",
                "district": "Gazipur"
            }))
            .send()
            .await
            .unwrap()
    }

    async fn submit_id(&self, email: &str, name: &str) -> String {
        let resp = self.submit(email, name).await;
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        body["data"]["id"].as_str().unwrap().to_string()
    }

    async fn approve(&self, id: &str) -> Value {
        let resp = self
            .request(Method::PATCH, &format!("/issues/approve/{}", id), ADMIN)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        resp.json().await.unwrap()
    }

    /// Applies as `FIELD`, gets approved and returns the staff id.
    async fn approved_staff(&self) -> String {
        let resp = self
            .request(Method::POST, "/staff", FIELD)
            .json(&json!({ "name": "Karim", "phone": "01700000000", "district": "Gazipur" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        let staff_id = body["data"]["id"].as_str().unwrap().to_string();

        let resp = self
            .request(Method::PATCH, &format!("/staff-approve/{}", staff_id), ADMIN)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        staff_id
    }
}

async fn error_code(resp: reqwest::Response) -> String {
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    body["error"]["code"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_check() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_auth_missing_token() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/issues"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 401);
    assert_eq!(error_code(resp).await, "UNAUTHORIZED");
}

#[tokio::test]
async fn test_auth_invalid_token() {
    let fixture = TestFixture::new().await;

    let forged = encode(
        &Header::default(),
        &json!({ "email": CITIZEN, "exp": chrono::Utc::now().timestamp() + 3600 }),
        &EncodingKey::from_secret(b"wrong-secret"),
    )
    .unwrap();

    let resp = fixture
        .client
        .post(fixture.url("/user"))
        .bearer_auth(forged)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 401);
    assert!(fixture.repo.get_user_by_email(CITIZEN).await.unwrap().is_none());
}

#[tokio::test]
async fn test_login_upsert() {
    let fixture = TestFixture::new().await;

    let first = fixture.login("Citizen@CityFix.test").await;
    assert_eq!(first["success"], true);
    assert_eq!(first["data"]["created"], true);
    assert_eq!(first["data"]["user"]["email"], CITIZEN);
    assert_eq!(first["data"]["user"]["role"], "user");
    assert_eq!(first["data"]["user"]["membership"], "free");

    let second = fixture.login(CITIZEN).await;
    assert_eq!(second["data"]["created"], false);
    assert_eq!(second["data"]["user"]["id"], first["data"]["user"]["id"]);

    let resp = fixture
        .request(Method::GET, &format!("/user/role/{}", CITIZEN), CITIZEN)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["role"], "user");
}

#[tokio::test]
async fn test_admin_only_user_management() {
    let fixture = TestFixture::with_actors().await;

    let resp = fixture
        .request(Method::GET, "/user", CITIZEN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = fixture
        .request(Method::GET, "/user", ADMIN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 4);

    // Users may rename themselves but not upgrade themselves
    let resp = fixture
        .request(Method::PATCH, &format!("/users/{}", CITIZEN), CITIZEN)
        .json(&json!({ "name": "Amina" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = fixture
        .request(Method::PATCH, &format!("/users/{}", CITIZEN), CITIZEN)
        .json(&json!({ "membership": "premium" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = fixture
        .request(Method::PATCH, &format!("/users/{}", CITIZEN), ADMIN)
        .json(&json!({ "membership": "premium" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["membership"], "premium");
    assert_eq!(body["data"]["name"], "Amina");
}

#[tokio::test]
async fn test_quota_enforced_for_free_tier() {
    let fixture = TestFixture::with_actors().await;

    for i in 0..5 {
        fixture.submit_id(CITIZEN, &format!("Pothole {}", i)).await;
    }

    let resp = fixture.submit(CITIZEN, "One too many").await;
    assert_eq!(resp.status(), 403);
    assert_eq!(error_code(resp).await, "QUOTA_EXCEEDED");

    let resp = fixture
        .request(Method::GET, &format!("/users/usage/{}", CITIZEN), CITIZEN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["postCount"], 5);
    assert_eq!(body["data"]["limit"], 5);
    assert_eq!(body["data"]["remaining"], 0);
    assert_eq!(body["data"]["canPost"], false);

    // Someone else's usage is private
    let resp = fixture
        .request(Method::GET, &format!("/users/usage/{}", CITIZEN), NEIGHBOUR)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = fixture
        .request(Method::GET, "/issues", CITIZEN)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_submit_validation() {
    let fixture = TestFixture::with_actors().await;

    let resp = fixture.submit(CITIZEN, "   ").await;
    assert_eq!(resp.status(), 400);
    assert_eq!(error_code(resp).await, "VALIDATION_ERROR");

    let user = fixture.repo.get_user_by_email(CITIZEN).await.unwrap().unwrap();
    assert_eq!(user.post_count, 0);
}

#[tokio::test]
async fn test_approve_and_reject_rules() {
    let fixture = TestFixture::with_actors().await;
    let id = fixture.submit_id(CITIZEN, "Broken streetlight").await;

    // Reporters edit while pending
    let resp = fixture
        .request(Method::PATCH, &format!("/issue-edit/{}", id), CITIZEN)
        .json(&json!({ "description": "Dark for a week" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = fixture
        .request(Method::PATCH, &format!("/issues/approve/{}", id), CITIZEN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let body = fixture.approve(&id).await;
    assert_eq!(body["data"]["status"], "approved");
    assert_eq!(body["data"]["workflow"], "in-progress");
    let tracking_id = body["data"]["trackingId"].as_str().unwrap();
    assert!(tracking::is_well_formed(tracking_id), "bad id {}", tracking_id);
    assert!(tracking_id.starts_with("cityfix-"));

    let resp = fixture
        .request(Method::PATCH, &format!("/issues/reject/{}", id), ADMIN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    assert_eq!(error_code(resp).await, "INVALID_TRANSITION");

    let resp = fixture
        .request(Method::PATCH, &format!("/issue-edit/{}", id), CITIZEN)
        .json(&json!({ "description": "Too late" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);

    // A second issue can be rejected while pending
    let other = fixture.submit_id(CITIZEN, "Duplicate report").await;
    let resp = fixture
        .request(Method::PATCH, &format!("/issues/reject/{}", other), ADMIN)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["status"], "rejected");
    assert_eq!(body["data"]["workflow"], "rejected");
    assert!(body["data"]["trackingId"].is_null());

    let resp = fixture
        .request(Method::GET, "/track-issue", CITIZEN)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    let tracked = body["data"].as_array().unwrap();
    assert_eq!(tracked.len(), 1);
    assert_eq!(tracked[0]["trackingId"], tracking_id);
}

#[tokio::test]
async fn test_upvote_toggle() {
    let fixture = TestFixture::with_actors().await;
    let id = fixture.submit_id(CITIZEN, "Overflowing drain").await;
    fixture.approve(&id).await;
    let path = format!("/issues/upvote/{}", id);

    let resp = fixture
        .request(Method::PATCH, &path, CITIZEN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = fixture
        .request(Method::PATCH, &path, NEIGHBOUR)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["upvoted"], true);
    assert_eq!(body["data"]["upvotes"], 1);

    let resp = fixture
        .client
        .get(fixture.url(&format!("/approve-issues/{}", id)))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["upvotes"], 1);
    assert_eq!(body["data"]["upvotedBy"], json!([NEIGHBOUR]));

    let resp = fixture
        .request(Method::PATCH, &path, NEIGHBOUR)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["upvoted"], false);
    assert_eq!(body["data"]["upvotes"], 0);
}

#[tokio::test]
async fn test_staff_assignment_and_field_work() {
    let fixture = TestFixture::with_actors().await;
    let id = fixture.submit_id(CITIZEN, "Collapsed footbridge").await;
    fixture.approve(&id).await;
    let staff_id = fixture.approved_staff().await;

    let resp = fixture
        .request(Method::GET, &format!("/user/role/{}", FIELD), FIELD)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["role"], "staff");

    // Unavailable staff cannot be assigned
    let resp = fixture
        .request(Method::PATCH, &format!("/staff/{}", staff_id), FIELD)
        .json(&json!({ "availability": "not_available" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let assign_path = format!("/issues/assign/{}", id);
    let resp = fixture
        .request(Method::PATCH, &assign_path, ADMIN)
        .json(&json!({ "staffId": staff_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    assert_eq!(error_code(resp).await, "STAFF_UNAVAILABLE");

    fixture
        .request(Method::PATCH, &format!("/staff/{}", staff_id), FIELD)
        .json(&json!({ "availability": "available" }))
        .send()
        .await
        .unwrap();

    let resp = fixture
        .request(Method::PATCH, &assign_path, ADMIN)
        .json(&json!({ "staffId": staff_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["assign"], "assigned");
    assert_eq!(body["data"]["assignedStaff"]["staffId"], staff_id);
    assert_eq!(body["data"]["assignedStaff"]["email"], FIELD);

    let resp = fixture
        .request(Method::GET, &format!("/issues/assigned/{}", FIELD), FIELD)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    // Only the assigned staff member (or an admin) moves the issue forward
    let resp = fixture
        .request(Method::PATCH, &format!("/accept-issu/{}", id), NEIGHBOUR)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = fixture
        .request(Method::PATCH, &format!("/accept-issu/{}", id), FIELD)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["workflow"], "Working");
    assert!(body["data"]["acceptAt"].is_string());

    let resp = fixture
        .request(Method::PATCH, &format!("/resolved-issu/{}", id), FIELD)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["workflow"], "resolved");
    assert!(body["data"]["resolvedAt"].is_string());

    let resp = fixture
        .client
        .get(fixture.url("/resolved-issue"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"][0]["id"], id.as_str());
}

#[tokio::test]
async fn test_staff_application_rules() {
    let fixture = TestFixture::with_actors().await;
    let staff_id = fixture.approved_staff().await;

    let resp = fixture
        .request(Method::POST, "/staff", FIELD)
        .json(&json!({ "name": "Karim again" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    assert_eq!(error_code(resp).await, "CONFLICT");

    let resp = fixture
        .request(Method::PATCH, &format!("/staff-approve/{}", staff_id), ADMIN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);

    let resp = fixture
        .request(Method::GET, "/approve-staff", ADMIN)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let resp = fixture
        .request(Method::GET, "/staff?status=pending", ADMIN)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert!(body["data"].as_array().unwrap().is_empty());

    // Profiles are visible to their owner, not to other citizens
    let resp = fixture
        .request(Method::GET, &format!("/staff/{}", FIELD), FIELD)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let resp = fixture
        .request(Method::GET, &format!("/staff/{}", FIELD), NEIGHBOUR)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = fixture
        .request(Method::DELETE, &format!("/staff/{}", staff_id), ADMIN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_public_views() {
    let fixture = TestFixture::with_actors().await;
    let approved = fixture.submit_id(CITIZEN, "Open manhole").await;
    let pending = fixture.submit_id(CITIZEN, "Fallen tree").await;
    fixture.approve(&approved).await;

    let resp = fixture
        .client
        .get(fixture.url("/approve-issues"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    let listed = body["data"].as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["id"], approved.as_str());

    let resp = fixture
        .client
        .get(fixture.url(&format!("/approve-issues/{}", pending)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = fixture
        .client
        .get(fixture.url("/approve-issues?workflow=paused"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = fixture
        .client
        .get(fixture.url("/approve-issues?category=Road&workflow=in-progress"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    // Pending issues are private to their reporter and admins
    let resp = fixture
        .request(Method::GET, &format!("/issues/{}", pending), NEIGHBOUR)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    let resp = fixture
        .request(Method::GET, &format!("/issues/{}", pending), CITIZEN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_search_endpoint() {
    let fixture = TestFixture::with_actors().await;

    let drain = fixture.submit_id(CITIZEN, "Blocked drain flooding street").await;
    let light = fixture.submit_id(CITIZEN, "Streetlight flickering").await;
    fixture.submit_id(CITIZEN, "Drain cover missing").await;
    fixture.approve(&drain).await;
    fixture.approve(&light).await;

    // Wait for search index to update
    tokio::time::sleep(Duration::from_millis(200)).await;

    let resp = fixture
        .client
        .get(fixture.url("/search?q=drain&limit=10"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);

    // The pending drain report is not searchable
    let results = body["data"]["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["issue"]["id"], drain.as_str());
    assert!(results[0]["score"].as_f64().unwrap() > 0.0);
    assert_eq!(body["data"]["total"], 1);

    for query in ["q=drain&limit=0", "q=drain&offset=18446744073709551615"] {
        let resp = fixture
            .client
            .get(fixture.url(&format!("/search?{}", query)))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400, "{}", query);
        assert_eq!(error_code(resp).await, "VALIDATION_ERROR");
    }

    let resp = fixture
        .request(Method::DELETE, &format!("/issues/{}", drain), ADMIN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let resp = fixture
        .client
        .get(fixture.url("/search?q=drain"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert!(body["data"]["results"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_not_found_errors() {
    let fixture = TestFixture::with_actors().await;

    let resp = fixture
        .request(Method::PATCH, "/issues/approve/nonexistent", ADMIN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    assert_eq!(error_code(resp).await, "NOT_FOUND");

    let resp = fixture
        .request(Method::DELETE, "/user/nonexistent", ADMIN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = fixture
        .request(Method::PATCH, "/issues/upvote/nonexistent", NEIGHBOUR)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}
