//! Integration tests for graphcache
//!
//! These tests drive the public API end to end: config -> cache -> ingest -> read,
//! and the request coordinator over a scripted transport.

use async_trait::async_trait;
use graphcache::config::{CacheConfig, PersistenceBackend, PersistenceConfig};
use graphcache::network::GraphQLResponse;
use graphcache::{
    CacheError, CacheEvent, IngestOptions, NormalizedCache, RequestCoordinator, RequestStatus,
    Selection, Transport,
};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Configuration for the activity-tracker schema used throughout
fn test_config() -> CacheConfig {
    let mut config = CacheConfig::new();
    for (field, type_name) in [
        ("activity", "Activity"),
        ("activityPrerequisite", "ActivityPrerequisite"),
        ("allUsers", "UsersConnection"),
        ("allActivities", "ActivitiesConnection"),
        ("activitiesByOwner", "ActivitiesConnection"),
        ("commentsByActivity", "CommentsConnection"),
        ("userByOwner", "User"),
        ("activityByActivity", "Activity"),
        ("activityByPrerequisite", "Activity"),
        ("activityPrerequisitesByActivity", "ActivityPrerequisitesConnection"),
        ("activityPrerequisitesByPrerequisite", "ActivityPrerequisitesConnection"),
    ] {
        config.add_field_type(field, type_name);
    }
    config.add_conflict_pair("activityByActivity", "activityPrerequisitesByActivity");
    config.add_conflict_pair("activityByPrerequisite", "activityPrerequisitesByPrerequisite");
    config
}

fn test_cache() -> NormalizedCache {
    NormalizedCache::from_config(&test_config()).unwrap()
}

/// Parse a selection set written as JSON
fn selections(value: Value) -> Vec<Selection> {
    serde_json::from_value(value).unwrap()
}

fn user_page(ids: &[&str]) -> Value {
    let nodes: Vec<Value> = ids
        .iter()
        .map(|id| json!({"__typename": "Activity", "nodeId": id, "title": format!("Activity {}", id)}))
        .collect();
    json!({
        "allUsers": {
            "__typename": "UsersConnection",
            "nodes": [{
                "__typename": "User",
                "nodeId": "u1",
                "name": "Ada",
                "activitiesByOwner": {"__typename": "ActivitiesConnection", "nodes": nodes}
            }]
        }
    })
}

mod config_tests {
    use super::*;

    #[test]
    fn test_config_save_and_reload_drives_cache() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        test_config().save(&config_path).unwrap();
        let loaded = CacheConfig::load(&config_path).unwrap();
        assert_eq!(loaded, test_config());

        let cache = NormalizedCache::from_config(&loaded).unwrap();
        cache.ingest(&user_page(&["a1"])).unwrap();
        assert_eq!(cache.stats().unwrap().entity_count, 2);
    }

    #[test]
    fn test_custom_identifier_field() {
        let mut config = test_config();
        config.normalize.id_field = "id".to_string();
        let cache = NormalizedCache::from_config(&config).unwrap();

        cache
            .ingest(&json!({"activity": {"__typename": "Activity", "id": 7, "title": "Run"}}))
            .unwrap();
        let data = cache
            .read(&selections(json!([
                {"name": "activity", "arguments": {"id": "7"}, "selections": [{"name": "title"}]}
            ])))
            .unwrap();
        assert_eq!(data, json!({"activity": {"title": "Run"}}));
    }
}

mod normalization_tests {
    use super::*;

    #[test]
    fn test_second_ingest_is_silent() {
        let cache = test_cache();
        cache.ingest(&user_page(&["a1", "a2"])).unwrap();
        let before = cache.snapshot().unwrap();

        let mut rx = cache.subscribe();
        let report = cache.ingest(&user_page(&["a1", "a2"])).unwrap();

        assert!(report.changed_types.is_empty());
        assert!(rx.try_recv().is_err());
        assert_eq!(cache.snapshot().unwrap(), before);
    }

    #[test]
    fn test_pages_accumulate_in_first_seen_order() {
        let cache = test_cache();
        cache.ingest(&user_page(&["a1", "a2"])).unwrap();
        cache.ingest(&user_page(&["a3", "a4"])).unwrap();

        let data = cache
            .read(&selections(json!([{
                "name": "allUsers",
                "selections": [{"name": "nodes", "selections": [
                    {"name": "activitiesByOwner", "selections": [
                        {"name": "nodes", "selections": [{"name": "nodeId"}]}
                    ]}
                ]}]
            }])))
            .unwrap();

        let ids: Vec<&str> = data["allUsers"]["nodes"][0]["activitiesByOwner"]["nodes"]
            .as_array()
            .unwrap()
            .iter()
            .map(|node| node["nodeId"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["a1", "a2", "a3", "a4"]);
    }

    #[test]
    fn test_scalar_and_to_one_round_trip() {
        let cache = test_cache();
        cache
            .ingest(&json!({
                "activity": {
                    "__typename": "Activity",
                    "nodeId": "a1",
                    "title": "Run",
                    "tags": ["outdoor", "cardio"],
                    "done": false,
                    "userByOwner": {"__typename": "User", "nodeId": "u1", "name": "Ada"}
                }
            }))
            .unwrap();

        let data = cache
            .read(&selections(json!([{
                "name": "activity",
                "selections": [
                    {"name": "nodeId"},
                    {"name": "title"},
                    {"name": "tags"},
                    {"name": "done"},
                    {"name": "userByOwner", "selections": [{"name": "nodeId"}, {"name": "name"}]}
                ]
            }])))
            .unwrap();

        assert_eq!(
            data,
            json!({
                "activity": {
                    "nodeId": "a1",
                    "title": "Run",
                    "tags": ["outdoor", "cardio"],
                    "done": false,
                    "userByOwner": {"nodeId": "u1", "name": "Ada"}
                }
            })
        );
    }

    #[test]
    fn test_conflicting_relations_survive_both_ways() {
        let cache = test_cache();
        cache
            .ingest(&json!({
                "createActivityPrerequisite": {
                    "__typename": "CreateActivityPrerequisitePayload",
                    "activityPrerequisite": {
                        "__typename": "ActivityPrerequisite",
                        "nodeId": "p1",
                        "activityByActivity": {"__typename": "Activity", "nodeId": "a1", "title": "Marathon"},
                        "activityByPrerequisite": {"__typename": "Activity", "nodeId": "a2", "title": "10k"}
                    }
                }
            }))
            .unwrap();

        let data = cache
            .read(&selections(json!([{
                "name": "activity",
                "arguments": {"nodeId": "p1"},
                "selections": [{"name": "title"}]
            }])))
            .unwrap();
        // p1 is not an Activity
        assert_eq!(data, json!({"activity": null}));

        let data = cache
            .read(&selections(json!([{
                "name": "activity",
                "arguments": {"nodeId": "a1"},
                "selections": [
                    {"name": "title"},
                    {"name": "activityPrerequisitesByActivity", "selections": [
                        {"name": "nodes", "selections": [
                            {"name": "activityByActivity", "selections": [{"name": "title"}]},
                            {"name": "activityByPrerequisite", "selections": [{"name": "title"}]}
                        ]}
                    ]}
                ]
            }])))
            .unwrap();

        assert_eq!(
            data["activity"]["activityPrerequisitesByActivity"]["nodes"],
            json!([{
                "activityByActivity": {"title": "Marathon"},
                "activityByPrerequisite": {"title": "10k"}
            }])
        );
    }

    #[test]
    fn test_connections_of_connections() {
        let cache = test_cache();
        cache
            .ingest(&json!({
                "allUsers": {
                    "__typename": "UsersConnection",
                    "edges": [{
                        "cursor": "c1",
                        "node": {
                            "__typename": "User",
                            "nodeId": "u1",
                            "name": "Ada",
                            "activitiesByOwner": {
                                "__typename": "ActivitiesConnection",
                                "nodes": [{
                                    "__typename": "Activity",
                                    "nodeId": "a1",
                                    "title": "Run",
                                    "commentsByActivity": {
                                        "__typename": "CommentsConnection",
                                        "nodes": [
                                            {"__typename": "Comment", "nodeId": "c1", "body": "Nice"},
                                            {"__typename": "Comment", "nodeId": "c2", "body": "Fast"}
                                        ]
                                    }
                                }]
                            }
                        }
                    }]
                }
            }))
            .unwrap();

        let data = cache
            .read(&selections(json!([{
                "name": "allUsers",
                "selections": [{"name": "edges", "selections": [{"name": "node", "selections": [
                    {"name": "name"},
                    {"name": "activitiesByOwner", "selections": [{"name": "nodes", "selections": [
                        {"name": "title"},
                        {"name": "commentsByActivity", "selections": [
                            {"name": "totalCount"},
                            {"name": "nodes", "selections": [{"name": "body"}]}
                        ]}
                    ]}]}
                ]}]}]
            }])))
            .unwrap();

        assert_eq!(
            data,
            json!({
                "allUsers": {"edges": [{"node": {
                    "name": "Ada",
                    "activitiesByOwner": {"nodes": [{
                        "title": "Run",
                        "commentsByActivity": {
                            "totalCount": 2,
                            "nodes": [{"body": "Nice"}, {"body": "Fast"}]
                        }
                    }]}
                }}]}
            })
        );
    }

    #[test]
    fn test_malformed_response_is_rejected() {
        let cache = test_cache();
        let err = cache
            .ingest(&json!({"activity": {"__typename": "Activity", "title": "no id"}}))
            .unwrap_err();
        assert!(matches!(err, CacheError::MalformedResponse(_)));
        assert_eq!(cache.stats().unwrap().entity_count, 0);
    }
}

mod filtering_tests {
    use super::*;

    fn seeded() -> NormalizedCache {
        let cache = test_cache();
        cache
            .ingest(&json!({
                "allActivities": {
                    "__typename": "ActivitiesConnection",
                    "nodes": [
                        {"__typename": "Activity", "nodeId": "a", "createdAt": "2024-01-01", "done": true},
                        {"__typename": "Activity", "nodeId": "b", "createdAt": "2024-06-01", "done": false}
                    ]
                }
            }))
            .unwrap();
        cache
    }

    fn ids(data: &Value) -> Vec<&str> {
        data["allActivities"]["nodes"]
            .as_array()
            .unwrap()
            .iter()
            .map(|n| n["nodeId"].as_str().unwrap())
            .collect()
    }

    #[test]
    fn test_less_than_or_equal_to_filter() {
        let cache = seeded();
        let data = cache
            .read(&selections(json!([{
                "name": "allActivities",
                "arguments": {"filter": {"createdAt": {"lessThanOrEqualTo": "2024-03-01"}}},
                "selections": [{"name": "nodes", "selections": [{"name": "nodeId"}]}]
            }])))
            .unwrap();
        assert_eq!(ids(&data), vec!["b"]);
    }

    #[test]
    fn test_condition_filter() {
        let cache = seeded();
        let data = cache
            .read(&selections(json!([{
                "name": "allActivities",
                "arguments": {"condition": {"done": true}},
                "selections": [
                    {"name": "totalCount"},
                    {"name": "nodes", "selections": [{"name": "nodeId"}]}
                ]
            }])))
            .unwrap();
        assert_eq!(ids(&data), vec!["a"]);
        assert_eq!(data["allActivities"]["totalCount"], json!(1));
    }
}

mod cache_tests {
    use super::*;

    #[test]
    fn test_clear_then_read_misses() {
        let cache = test_cache();
        cache.ingest(&user_page(&["a1"])).unwrap();
        let query = selections(json!([{
            "name": "activity",
            "arguments": {"nodeId": "a1"},
            "selections": [{"name": "title"}]
        }]));
        assert!(cache.read(&query).is_ok());

        let mut rx = cache.subscribe();
        cache.clear().unwrap();
        assert_eq!(rx.try_recv().unwrap(), CacheEvent::Cleared);

        // the root lookup finds nothing, so ask for a root leaf to force the miss
        let miss = cache.read(&selections(json!([{"name": "allUsers"}])));
        assert!(miss.unwrap_err().is_cache_miss());
        assert_eq!(cache.read(&query).unwrap(), json!({"activity": null}));

        let result = cache.load_query(&selections(json!([{"name": "allUsers"}])));
        assert!(result.error.unwrap().contains("allUsers"));
    }

    #[test]
    fn test_change_events_per_type() {
        let cache = test_cache();
        let mut rx = cache.subscribe();
        cache.ingest(&user_page(&["a1", "a2"])).unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                CacheEvent::TypeChanged("Activity".to_string()),
                CacheEvent::TypeChanged("User".to_string()),
            ]
        );
    }
}

mod ingest_failure_tests {
    use super::*;

    #[test]
    fn test_malformed_second_field_changes_nothing() {
        let cache = test_cache();
        cache.ingest(&user_page(&["a1"])).unwrap();
        let before = cache.snapshot().unwrap();
        let mut rx = cache.subscribe();

        let err = cache
            .ingest(&json!({
                "activity": {"__typename": "Activity", "nodeId": "a2", "title": "fresh"},
                "userByOwner": {"__typename": "User", "name": "no id"}
            }))
            .unwrap_err();

        assert!(matches!(err, CacheError::MalformedResponse(_)));
        assert_eq!(cache.snapshot().unwrap(), before);
        assert_eq!(cache.stats().unwrap().entity_count, 2);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_failed_ingest_leaves_snapshot_alone() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = test_config();
        config.persistence = PersistenceConfig {
            backend: PersistenceBackend::Json,
            path: Some(temp_dir.path().join("cache.json")),
        };

        let writer = NormalizedCache::from_config(&config).unwrap();
        writer.ingest(&user_page(&["a1"])).unwrap();
        assert!(writer
            .ingest(&json!({"activity": {"__typename": "Activity"}}))
            .is_err());

        let reader = NormalizedCache::from_config(&config).unwrap();
        assert!(reader.restore().unwrap());
        assert_eq!(reader.snapshot().unwrap(), writer.snapshot().unwrap());
    }
}

mod persistence_tests {
    use super::*;

    fn round_trip(backend: PersistenceBackend, file: &str) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = test_config();
        config.persistence = PersistenceConfig {
            backend,
            path: Some(temp_dir.path().join(file)),
        };

        let writer = NormalizedCache::from_config(&config).unwrap();
        writer.ingest(&user_page(&["a1", "a2"])).unwrap();

        let reader = NormalizedCache::from_config(&config).unwrap();
        assert!(reader.restore().unwrap());
        assert_eq!(reader.snapshot().unwrap(), writer.snapshot().unwrap());

        writer.clear().unwrap();
        let emptied = NormalizedCache::from_config(&config).unwrap();
        assert!(!emptied.restore().unwrap());
    }

    #[test]
    fn test_json_snapshot_round_trip() {
        round_trip(PersistenceBackend::Json, "cache.json");
    }

    #[test]
    fn test_sqlite_snapshot_round_trip() {
        round_trip(PersistenceBackend::Sqlite, "cache.db");
    }
}

mod coordinator_tests {
    use super::*;

    /// Replays canned data payloads, failing when a reply is `None`
    struct ScriptedTransport {
        calls: AtomicUsize,
        replies: Mutex<VecDeque<Option<Value>>>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<Option<Value>>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                replies: Mutex::new(replies.into()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn post(&self, _query: &str, _variables: &Value) -> graphcache::Result<GraphQLResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(25)).await;
            match self.replies.lock().unwrap().pop_front().flatten() {
                Some(data) => Ok(GraphQLResponse::from_data(data)),
                None => Err(CacheError::Network("upstream unavailable".to_string())),
            }
        }
    }

    const QUERY: &str = "query Users { allUsers { nodes { nodeId name } } }";

    fn read() -> Vec<Selection> {
        selections(json!([{
            "name": "allUsers",
            "selections": [{"name": "nodes", "selections": [{"name": "name"}]}]
        }]))
    }

    fn coordinator(transport: Arc<ScriptedTransport>) -> RequestCoordinator<ScriptedTransport> {
        RequestCoordinator::new(Arc::new(test_cache()), transport)
    }

    #[tokio::test]
    async fn test_identical_calls_coalesce() {
        let transport = ScriptedTransport::new(vec![Some(user_page(&["a1"]))]);
        let coordinator = coordinator(transport.clone());

        let (a, b, c) = tokio::join!(
            coordinator.execute(QUERY, json!({"first": 10}), read(), IngestOptions::default()),
            coordinator.execute(QUERY, json!({"first": 10}), read(), IngestOptions::default()),
            coordinator.execute(QUERY, json!({"first": 10}), read(), IngestOptions::default()),
        );

        assert_eq!(transport.calls(), 1);
        let a = a.unwrap();
        assert_eq!(a, b.unwrap());
        assert_eq!(a, c.unwrap());
        assert_eq!(a, user_page(&["a1"]));
    }

    #[tokio::test]
    async fn test_succeeded_request_reads_cache() {
        let transport = ScriptedTransport::new(vec![Some(user_page(&["a1"]))]);
        let coordinator = coordinator(transport.clone());

        coordinator
            .execute(QUERY, json!({}), read(), IngestOptions::default())
            .await
            .unwrap();
        assert_eq!(coordinator.state(QUERY, &json!({})), RequestStatus::Succeeded);

        let cached = coordinator
            .execute(QUERY, json!({}), read(), IngestOptions::default())
            .await
            .unwrap();
        assert_eq!(transport.calls(), 1);
        assert_eq!(cached, json!({"allUsers": {"nodes": [{"name": "Ada"}]}}));
    }

    #[tokio::test]
    async fn test_failure_shared_and_retried() {
        let transport = ScriptedTransport::new(vec![None, Some(user_page(&["a1"]))]);
        let coordinator = coordinator(transport.clone());

        let (a, b) = tokio::join!(
            coordinator.execute(QUERY, json!({}), read(), IngestOptions::default()),
            coordinator.execute(QUERY, json!({}), read(), IngestOptions::default()),
        );
        let (a, b) = (a.unwrap_err(), b.unwrap_err());
        assert_eq!(a.to_string(), "Network error: upstream unavailable");
        assert_eq!(a.to_string(), b.to_string());
        assert_eq!(transport.calls(), 1);
        assert_eq!(coordinator.state(QUERY, &json!({})), RequestStatus::Failed);

        coordinator
            .execute(QUERY, json!({}), read(), IngestOptions::default())
            .await
            .unwrap();
        assert_eq!(transport.calls(), 2);
        assert_eq!(coordinator.state(QUERY, &json!({})), RequestStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_clear_forgets_requests() {
        let transport =
            ScriptedTransport::new(vec![Some(user_page(&["a1"])), Some(user_page(&["a2"]))]);
        let coordinator = coordinator(transport.clone());

        coordinator
            .execute(QUERY, json!({}), read(), IngestOptions::default())
            .await
            .unwrap();
        coordinator.clear().unwrap();
        assert_eq!(coordinator.state(QUERY, &json!({})), RequestStatus::Idle);
        assert_eq!(coordinator.cache().stats().unwrap().entity_count, 0);

        let refetched = coordinator
            .execute(QUERY, json!({}), read(), IngestOptions::default())
            .await
            .unwrap();
        assert_eq!(refetched, user_page(&["a2"]));
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_clear_while_in_flight_discards_response() {
        let transport =
            ScriptedTransport::new(vec![Some(user_page(&["a1"])), Some(user_page(&["a2"]))]);
        let coordinator = coordinator(transport.clone());

        let (stale, _) = tokio::join!(
            coordinator.execute(QUERY, json!({}), read(), IngestOptions::default()),
            async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                coordinator.clear().unwrap();
            },
        );

        // the caller still gets its data, but the emptied cache stays empty
        assert_eq!(stale.unwrap(), user_page(&["a1"]));
        assert_eq!(coordinator.cache().stats().unwrap().entity_count, 0);
        assert_eq!(coordinator.state(QUERY, &json!({})), RequestStatus::Idle);

        let fresh = coordinator
            .execute(QUERY, json!({}), read(), IngestOptions::default())
            .await
            .unwrap();
        assert_eq!(fresh, user_page(&["a2"]));
        assert_eq!(transport.calls(), 2);
        assert_eq!(coordinator.state(QUERY, &json!({})), RequestStatus::Succeeded);
    }
}
