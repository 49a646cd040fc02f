use std::sync::Arc;
use std::time::Duration as StdDuration;

use actix_web::http::StatusCode;
use actix_web::test::{self, TestRequest};
use actix_web::web::{self, Data};
use actix_web::App;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Value};

use boost_server::boost::manager::BoostPolicy;
use boost_server::boost::sweeper::ExpirySweeper;
use boost_server::clock::{Clock, ManualClock};
use boost_server::database::memory::MemoryDatabase;
use boost_server::database::Database;
use boost_server::identity::ADMIN_ID_HEADER;
use boost_server::provider::{Provider, ProviderId};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

struct Harness {
    db: Arc<MemoryDatabase>,
    clock: Arc<ManualClock>,
    sweeper: Arc<ExpirySweeper>,
    policy: BoostPolicy,
    providers: Vec<ProviderId>,
}

async fn harness() -> Harness {
    let db = Arc::new(MemoryDatabase::new());
    let clock = Arc::new(ManualClock::new(t0()));

    let mut providers = vec![];
    for (name, phone) in [("Meera Joshi", "98450 11223"), ("Arjun Rao", "99001 45678")] {
        let provider = Provider {
            id: ProviderId::new(),
            name: name.to_string(),
            email: None,
            phone: Some(phone.to_string()),
            avatar: None,
            created_at: t0(),
        };
        db.providers().insert_provider(&provider).await.unwrap();
        providers.push(provider.id);
    }

    let sweeper = Arc::new(ExpirySweeper::new(
        db.clone(),
        clock.clone(),
        StdDuration::from_secs(60),
        10,
    ));

    Harness {
        db,
        clock,
        sweeper,
        policy: BoostPolicy {
            daily_cost: Decimal::from(500),
            max_duration_days: 30,
            allow_concurrent_boosts: true,
        },
        providers,
    }
}

macro_rules! app {
    ($harness:expr) => {{
        let db: Arc<dyn Database> = $harness.db.clone();
        let clock: Arc<dyn Clock> = $harness.clock.clone();
        test::init_service(
            App::new()
                .app_data(Data::from(db))
                .app_data(Data::from(clock))
                .app_data(Data::new($harness.policy.clone()))
                .app_data(Data::from($harness.sweeper.clone()))
                .configure(boost_server::configure)
                .default_service(web::to(boost_server::path_does_not_exist)),
        )
        .await
    }};
}

macro_rules! send {
    ($app:expr, $req:expr) => {{
        let resp = test::call_service(&$app, $req.to_request()).await;
        let status = resp.status();
        let body: Value = test::read_body_json(resp).await;
        (status, body)
    }};
}

fn admin(req: TestRequest) -> TestRequest {
    req.insert_header((ADMIN_ID_HEADER, "admin1"))
}

fn create(provider_id: ProviderId, duration_days: i32) -> TestRequest {
    admin(TestRequest::post().uri("/admin/boosts/create")).set_json(json!({
        "providerId": provider_id,
        "durationDays": duration_days,
        "categories": ["vedic", "tarot"],
    }))
}

fn action(boost_id: &Value, action: &str) -> TestRequest {
    let uri = format!("/admin/boosts/{}/{}", boost_id.as_str().unwrap(), action);
    admin(TestRequest::post().uri(&uri))
}

#[actix_web::test]
async fn boost_runs_from_creation_to_expiry() {
    let harness = harness().await;
    let app = app!(harness);

    let (status, boost) = send!(app, create(harness.providers[0], 7));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(boost["status"], "pending");
    assert_eq!(boost["totalCost"], "3500");
    assert_eq!(boost["provider"]["name"], "Meera Joshi");
    assert_eq!(boost["timeRemaining"], Value::Null);

    let (status, boost) = send!(app, action(&boost["id"], "approve"));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(boost["status"], "active");
    assert_eq!(boost["approvedBy"], "admin1");
    assert_eq!(boost["progressPercent"], 0.0);
    assert_eq!(boost["timeRemaining"]["days"], 7);

    harness.clock.set(t0() + Duration::days(6));
    let (_, summary) = send!(app, admin(TestRequest::post().uri("/admin/boosts/debug/trigger-expiry")));
    assert_eq!(summary["expiredCount"], 0);

    harness.clock.set(t0() + Duration::days(7) + Duration::seconds(1));
    let (status, summary) = send!(app, admin(TestRequest::post().uri("/admin/boosts/debug/trigger-expiry")));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["totalActiveFound"], 1);
    assert_eq!(summary["expiredCount"], 1);
    assert_eq!(summary["expiredDetails"][0]["boostId"], boost["id"]);

    let (_, summary) = send!(app, admin(TestRequest::post().uri("/admin/boosts/debug/trigger-expiry")));
    assert_eq!(summary["expiredCount"], 0);

    let uri = format!("/admin/boosts/{}", boost["id"].as_str().unwrap());
    let (_, stored) = send!(app, admin(TestRequest::get().uri(&uri)));
    assert_eq!(stored["status"], "expired");
    assert_eq!(stored["progressPercent"], 100.0);
    assert_eq!(stored["timeRemaining"]["state"], "expired");
}

#[actix_web::test]
async fn reject_requires_a_reason() {
    let harness = harness().await;
    let app = app!(harness);
    let (_, boost) = send!(app, create(harness.providers[0], 3));

    let (status, error) = send!(app, action(&boost["id"], "reject").set_json(json!({"reason": ""})));
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["errorCode"], "E4001007");

    let (status, error) = send!(app, action(&boost["id"], "reject").set_json(json!({})));
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["errorCode"], "E4001007");

    let (status, error) = send!(
        app,
        action(&boost["id"], "reject")
            .insert_header(("content-type", "application/json"))
            .set_payload(r#"{"reason": "#)
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["errorCode"], "E4001000");

    let (status, rejected) = send!(
        app,
        action(&boost["id"], "reject").set_json(json!({"reason": "incomplete profile"}))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rejected["status"], "rejected");
    assert_eq!(rejected["rejectionReason"], "incomplete profile");
    assert_eq!(rejected["version"], 1);
}

#[actix_web::test]
async fn approving_an_expired_boost_is_a_conflict() {
    let harness = harness().await;
    let app = app!(harness);
    let (_, boost) = send!(app, create(harness.providers[0], 1));
    send!(app, action(&boost["id"], "approve"));

    harness.clock.advance(Duration::days(1));
    harness.sweeper.sweep().await.unwrap();

    let (status, error) = send!(app, action(&boost["id"], "approve"));
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["errorCode"], "E4091001");
    assert_eq!(error["errorMeta"]["status"], "expired");
    assert_eq!(error["errorMeta"]["event"], "approve");
}

#[actix_web::test]
async fn admin_cancel_stops_the_sweeper_from_touching_a_boost() {
    let harness = harness().await;
    let app = app!(harness);
    let (_, boost) = send!(app, create(harness.providers[1], 7));
    send!(app, action(&boost["id"], "approve"));

    let (status, error) = send!(app, action(&boost["id"], "cancel").set_json(json!({})));
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["errorCode"], "E4001007");

    let (status, error) = send!(
        app,
        action(&boost["id"], "cancel")
            .insert_header(("content-type", "application/json"))
            .set_payload(r#"{"reason": 42}"#)
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["errorCode"], "E4001000");

    harness.clock.advance(Duration::days(2));
    let (status, cancelled) = send!(
        app,
        action(&boost["id"], "cancel").set_json(json!({"reason": "policy violation"}))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "cancelled_by_admin");
    assert_eq!(cancelled["cancelledAt"], json!(t0() + Duration::days(2)));
    assert_eq!(cancelled["cancellationReason"], "policy violation");

    harness.clock.advance(Duration::days(30));
    let summary = harness.sweeper.sweep().await.unwrap();
    assert_eq!(summary.expired_count, 0);

    let uri = format!("/admin/boosts/{}", boost["id"].as_str().unwrap());
    let (_, stored) = send!(app, admin(TestRequest::get().uri(&uri)));
    assert_eq!(stored["status"], "cancelled_by_admin");
}

#[actix_web::test]
async fn create_rejects_invalid_requests() {
    let harness = harness().await;
    let app = app!(harness);

    let (status, error) = send!(app, create(harness.providers[0], 31));
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["errorCode"], "E4001004");
    assert_eq!(error["errorMeta"], json!({"durationDays": 31, "maximum": 30}));

    let (status, error) = send!(app, create(harness.providers[0], 0));
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["errorCode"], "E4001004");

    let (status, error) = send!(
        app,
        admin(TestRequest::post().uri("/admin/boosts/create")).set_json(json!({
            "providerId": harness.providers[0],
            "durationDays": 3,
            "categories": ["  "],
        }))
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["errorCode"], "E4001006");

    let (status, error) = send!(
        app,
        admin(TestRequest::post().uri("/admin/boosts/create")).set_json(json!({
            "providerId": harness.providers[0],
            "durationDays": 3,
            "categories": ["vedic"],
            "startDate": DateTime::<Utc>::MAX_UTC - Duration::days(1),
        }))
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["errorCode"], "E4001002");

    let (status, error) = send!(app, create(ProviderId::new(), 3));
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["errorCode"], "E4041002");

    let (status, error) = send!(
        app,
        admin(TestRequest::post().uri("/admin/boosts/create")).set_json(json!({"durationDays": "three"}))
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["errorCode"], "E4001000");

    let total = harness.db.boosts().average_boost_duration().await.unwrap();
    assert_eq!(total, 0.0);
}

#[actix_web::test]
async fn pre_approved_boost_starts_active() {
    let harness = harness().await;
    let app = app!(harness);

    let (status, boost) = send!(
        app,
        admin(TestRequest::post().uri("/admin/boosts/create")).set_json(json!({
            "providerId": harness.providers[0],
            "durationDays": 2,
            "startDate": t0() + Duration::days(1),
            "categories": ["numerology"],
            "preApproved": true,
        }))
    );

    assert_eq!(status, StatusCode::OK);
    assert_eq!(boost["status"], "active");
    assert_eq!(boost["startDate"], json!(t0() + Duration::days(1)));
    assert_eq!(boost["endDate"], json!(t0() + Duration::days(3)));
    assert_eq!(boost["progressPercent"], 0.0);
}

#[actix_web::test]
async fn requests_without_an_admin_are_unauthorized() {
    let harness = harness().await;
    let app = app!(harness);

    let (status, error) = send!(app, TestRequest::get().uri("/admin/boosts"));

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error["errorCode"], "E4011000");
}

#[actix_web::test]
async fn unknown_paths_and_ids_use_the_error_envelope() {
    let harness = harness().await;
    let app = app!(harness);

    let (status, error) = send!(app, admin(TestRequest::get().uri("/admin/nothing")));
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["errorCode"], "E4041000");

    let (status, error) = send!(app, admin(TestRequest::get().uri("/admin/boosts/not-an-id")));
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["errorCode"], "E4001001");

    let uri = format!("/admin/boosts/{}", boost_server::boost::BoostId::new());
    let (status, error) = send!(app, admin(TestRequest::get().uri(&uri)));
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["errorCode"], "E4041001");
}

#[actix_web::test]
async fn list_filters_searches_and_paginates() {
    let harness = harness().await;
    let app = app!(harness);

    for _ in 0..3 {
        let (_, boost) = send!(app, create(harness.providers[0], 5));
        send!(app, action(&boost["id"], "approve"));
        harness.clock.advance(Duration::minutes(1));
    }
    send!(app, create(harness.providers[1], 10));

    let (status, page) = send!(app, admin(TestRequest::get().uri("/admin/boosts?status=all&limit=2")));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["items"].as_array().unwrap().len(), 2);
    assert_eq!(page["pagination"], json!({"page": 1, "limit": 2, "total": 4, "pages": 2}));
    assert_eq!(page["items"][0]["provider"]["name"], "Arjun Rao");

    let (_, page) = send!(app, admin(TestRequest::get().uri("/admin/boosts?status=active&sort=createdAt")));
    assert_eq!(page["pagination"]["total"], 3);
    assert!(page["items"]
        .as_array()
        .unwrap()
        .iter()
        .all(|item| item["status"] == "active"));

    let (_, page) = send!(app, admin(TestRequest::get().uri("/admin/boosts?search=arjun")));
    assert_eq!(page["pagination"]["total"], 1);
    assert_eq!(page["items"][0]["durationDays"], 10);

    let (_, page) = send!(app, admin(TestRequest::get().uri("/admin/boosts?search=nobody")));
    assert_eq!(page["pagination"]["total"], 0);

    let (status, error) = send!(app, admin(TestRequest::get().uri("/admin/boosts?status=paused")));
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["errorCode"], "E4001010");

    let (status, error) = send!(app, admin(TestRequest::get().uri("/admin/boosts?limit=101")));
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["errorCode"], "E4001008");

    let (status, error) = send!(
        app,
        admin(TestRequest::get().uri("/admin/boosts?page=18446744073709551615&limit=100"))
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["errorCode"], "E4001008");

    let (status, error) = send!(app, admin(TestRequest::get().uri("/admin/boosts?sort=-name")));
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["errorCode"], "E4001009");
}

#[actix_web::test]
async fn statistics_summarize_boosts() {
    let harness = harness().await;
    let app = app!(harness);

    for duration_days in [4, 6] {
        let (_, boost) = send!(app, create(harness.providers[1], duration_days));
        send!(app, action(&boost["id"], "approve"));
    }
    send!(app, create(harness.providers[0], 2));

    let (status, statistics) = send!(app, admin(TestRequest::get().uri("/admin/boosts/statistics")));

    assert_eq!(status, StatusCode::OK);
    assert_eq!(statistics["totalActiveBoosts"], 2);
    assert_eq!(statistics["totalPendingBoosts"], 1);
    assert_eq!(statistics["averageBoostDuration"], 4.0);
    assert_eq!(
        statistics["topBoostedProviders"],
        json!([{
            "providerId": harness.providers[1],
            "name": "Arjun Rao",
            "boostCount": 2,
            "boostedDays": 10,
        }])
    );
}
