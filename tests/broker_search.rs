//! End-to-end broker scenarios over the HTTP router: routing, broadcast,
//! de-duplication, partial failure, and the 400/500 boundaries.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use shoal::api::broker::{router, BrokerState};
use shoal::broker::{route_shard, Broker, PlannerUnderstanding, QueryUnderstanding};
use shoal::config::{IndexConfiguration, QueryPipeline};
use shoal::metrics::ServiceMetrics;
use shoal::models::SearchResult;
use shoal::planning::{QueryPlanner, StageRegistry};
use shoal::searcher::ShardSearcher;
use shoal::testing::{MockSearcher, MockUnderstanding};

fn planner_qu(pipeline_steps: &[&str]) -> Arc<dyn QueryUnderstanding> {
    let config = IndexConfiguration {
        index_schemas: vec![],
        computed_fields: vec![],
        query_planning_pipelines: vec![QueryPipeline {
            name: "main".to_string(),
            steps: pipeline_steps.iter().map(|s| s.to_string()).collect(),
            enabled: true,
        }],
    };
    let planner =
        QueryPlanner::new(Arc::new(StageRegistry::with_builtin_stages()), config).unwrap();
    Arc::new(PlannerUnderstanding::new(Arc::new(planner), "main"))
}

fn app(broker: Broker) -> axum::Router {
    router(BrokerState {
        broker: Arc::new(broker),
        metrics: Arc::new(ServiceMetrics::new().unwrap()),
    })
}

async fn get_search(app: &axum::Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .clone()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

#[tokio::test]
async fn deterministic_routing_invokes_a_single_searcher() {
    // QU lowercases and tokenizes, so "Pizza" becomes keywords=["pizza"]
    // and the hash of "pizza" picks exactly one of the two shards.
    let s0 = Arc::new(MockSearcher::new(0).with_results(vec![("s0-doc", "from shard 0")]));
    let s1 = Arc::new(MockSearcher::new(1).with_results(vec![("s1-doc", "from shard 1")]));
    let broker = Broker::new(
        planner_qu(&["lowercase", "tokenize"]),
        vec![s0.clone(), s1.clone()],
    );
    let app = app(broker);

    let (status, body) = get_search(&app, "/search?q=Pizza").await;
    assert_eq!(status, StatusCode::OK);

    let results: Vec<SearchResult> = serde_json::from_slice(&body).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(s0.call_count() + s1.call_count(), 1);

    let routed = route_shard("pizza", &[0, 1]).unwrap();
    let called: u32 = if s0.call_count() == 1 { 0 } else { 1 };
    assert_eq!(called, routed);
}

#[tokio::test]
async fn no_keywords_broadcasts_to_every_shard() {
    let searchers: Vec<Arc<MockSearcher>> = (0..3)
        .map(|shard| {
            let id = format!("shard{shard}-doc");
            Arc::new(MockSearcher::new(shard).with_results(vec![(id.as_str(), "t")]))
        })
        .collect();
    let broker = Broker::new(
        MockUnderstanding::keywords(&[]).into_arc(),
        searchers
            .iter()
            .map(|s| s.clone() as Arc<dyn ShardSearcher>)
            .collect(),
    );
    let app = app(broker);

    let (status, body) = get_search(&app, "/search?q=whatever").await;
    assert_eq!(status, StatusCode::OK);

    let results: Vec<SearchResult> = serde_json::from_slice(&body).unwrap();
    assert_eq!(results.len(), 3);
    for (shard, searcher) in searchers.iter().enumerate() {
        assert_eq!(searcher.call_count(), 1, "shard {shard} not invoked");
    }
}

#[tokio::test]
async fn duplicates_deduplicate_in_first_arrival_order() {
    // Replicas of the same shard return overlapping ids; the merged output
    // keeps one entry per id, first occurrence winning. The second replica
    // answers later, so the arrival order is fixed.
    let r1 = Arc::new(
        MockSearcher::new(0).with_results(vec![("a", "a"), ("b", "b"), ("c", "c")]),
    );
    let r2 = Arc::new(
        MockSearcher::new(0)
            .with_results(vec![("b", "dup"), ("d", "d")])
            .with_delay(std::time::Duration::from_millis(50)),
    );
    let broker = Broker::new(
        MockUnderstanding::keywords(&["q"]).into_arc(),
        vec![r1, r2],
    );
    let app = app(broker);

    let (status, body) = get_search(&app, "/search?q=q").await;
    assert_eq!(status, StatusCode::OK);

    let results: Vec<SearchResult> = serde_json::from_slice(&body).unwrap();
    let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c", "d"]);
    // The first b is kept; the duplicate's title never overwrites it.
    let b = results.iter().find(|r| r.id == "b").unwrap();
    assert_eq!(b.title, "b");
}

#[tokio::test]
async fn partial_failure_still_returns_200_with_results() {
    let broker = Broker::new(
        MockUnderstanding::keywords(&[]).into_arc(),
        vec![
            Arc::new(MockSearcher::new(0).failing("replica exploded")),
            Arc::new(MockSearcher::new(1).with_results(vec![("ok", "survivor")])),
        ],
    );
    let app = app(broker);

    let (status, body) = get_search(&app, "/search?q=q").await;
    assert_eq!(status, StatusCode::OK);
    let results: Vec<SearchResult> = serde_json::from_slice(&body).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, "ok");
}

#[tokio::test]
async fn all_shards_failed_is_500() {
    let broker = Broker::new(
        MockUnderstanding::keywords(&[]).into_arc(),
        vec![
            Arc::new(MockSearcher::new(0).failing("down")),
            Arc::new(MockSearcher::new(1).failing("down")),
        ],
    );
    let app = app(broker);

    let (status, _body) = get_search(&app, "/search?q=q").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn zero_searchers_is_500_no_shards() {
    let broker = Broker::new(MockUnderstanding::keywords(&["x"]).into_arc(), vec![]);
    let app = app(broker);

    let (status, body) = get_search(&app, "/search?q=q").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let error: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(error["error"], "no_shards");
}

#[tokio::test]
async fn missing_q_is_400() {
    let broker = Broker::new(
        MockUnderstanding::keywords(&["x"]).into_arc(),
        vec![Arc::new(MockSearcher::new(0))],
    );
    let app = app(broker);

    let (status, _body) = get_search(&app, "/search").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn empty_q_is_400_through_query_understanding() {
    let s0 = Arc::new(MockSearcher::new(0));
    let broker = Broker::new(planner_qu(&["lowercase", "tokenize"]), vec![s0]);
    let app = app(broker);

    let (status, body) = get_search(&app, "/search?q=").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(error["error"], "invalid_input");
}

#[tokio::test]
async fn non_get_method_is_405() {
    let broker = Broker::new(
        MockUnderstanding::keywords(&["x"]).into_arc(),
        vec![Arc::new(MockSearcher::new(0))],
    );
    let app = app(broker);

    let response = app
        .oneshot(
            Request::post("/search?q=x")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

/// Helper so `MockUnderstanding` reads naturally at the call sites above
trait IntoArcQu {
    fn into_arc(self) -> Arc<dyn QueryUnderstanding>;
}

impl IntoArcQu for MockUnderstanding {
    fn into_arc(self) -> Arc<dyn QueryUnderstanding> {
        Arc::new(self)
    }
}
