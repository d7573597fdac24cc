//! Integration tests for the HTTP side of tracksync

use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use tracksync::{LocalChange, NewTrack, SearchQuery, Track, TrackClient, TrackEdit, EVENT_GROUP};
use wiremock::matchers::{body_json, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Track JSON as served by the station logger
fn track_json(id: i64, artist: &str, title: &str, group: &str) -> Value {
    let kind = if group == EVENT_GROUP { "event" } else { "track" };
    json!({
        "id": id,
        "artist": artist,
        "title": title,
        "time": format!("2024-03-01T12:{:02}:00.000Z", id % 60),
        "group": group,
        "type": kind,
        "streaming": [{
            "link": format!("https://open.spotify.com/track/{id}"),
            "artwork": format!("https://i.scdn.co/image/{id}"),
            "service": "spotify"
        }]
    })
}

fn page_json(ids: &[i64], next: Option<String>) -> Value {
    let tracks: Vec<Value> = ids
        .iter()
        .map(|id| track_json(*id, &format!("Artist {id}"), &format!("Title {id}"), "G1"))
        .collect();
    match next {
        Some(next) => json!({ "tracks": tracks, "_links": { "next": next } }),
        None => json!({ "tracks": tracks, "_links": {} }),
    }
}

fn ids(client: &TrackClient) -> Vec<i64> {
    client.store().snapshot().iter().map(|t| t.id).collect()
}

fn client_for(server: &MockServer) -> TrackClient {
    TrackClient::builder()
        .base_url(server.uri())
        .list_count(2)
        .build()
        .unwrap()
}

/// First page at `/api/tracks/list`, then `/api/tracks/page/2`, then the end
async fn mount_listing(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/tracks/list"))
        .and(query_param("count", "2"))
        .and(query_param("underground", "false"))
        .and(query_param_is_missing("artist"))
        .and(query_param_is_missing("song"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(page_json(&[5, 4], Some(format!("{}/api/tracks/page/2", server.uri())))),
        )
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/tracks/page/2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(page_json(&[3, 2], Some("/api/tracks/page/3".into()))),
        )
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/tracks/page/3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_json(&[], None)))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_load_more_follows_cursor() {
    let server = MockServer::start().await;
    mount_listing(&server).await;
    let mut client = client_for(&server);

    assert_eq!(client.load_more().await.unwrap(), 2);
    assert_eq!(ids(&client), vec![5, 4]);
    assert_eq!(
        client.cursor().map(|u| u.as_str().to_string()),
        Some(format!("{}/api/tracks/page/2", server.uri()))
    );

    assert_eq!(client.load_more().await.unwrap(), 2);
    assert_eq!(ids(&client), vec![5, 4, 3, 2]);

    // relative next link, resolved against the page URL
    assert_eq!(
        client.cursor().map(|u| u.path().to_string()),
        Some("/api/tracks/page/3".to_string())
    );

    assert_eq!(client.load_more().await.unwrap(), 0);
    assert_eq!(client.cursor(), None);

    // exhausted listing: no further request
    assert_eq!(client.load_more().await.unwrap(), 0);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_reset_then_load_more_reproduces_first_page() {
    let server = MockServer::start().await;
    mount_listing(&server).await;
    let mut client = client_for(&server);

    client.load_more().await.unwrap();
    client.load_more().await.unwrap();
    client.load_more().await.unwrap();
    assert_eq!(ids(&client), vec![5, 4, 3, 2]);

    client.reset();
    assert_eq!(client.cursor(), Some(client.first_page_url()));

    assert_eq!(client.load_more().await.unwrap(), 2);
    assert_eq!(ids(&client), vec![5, 4]);

    // pagination continues from there
    client.load_more().await.unwrap();
    assert_eq!(ids(&client), vec![5, 4, 3, 2]);
}

#[tokio::test]
async fn test_server_error_leaves_state_untouched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tracks/list"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(page_json(&[5, 4], Some(format!("{}/api/tracks/page/2", server.uri())))),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/tracks/page/2"))
        .respond_with(ResponseTemplate::new(500).set_body_string("database unavailable"))
        .mount(&server)
        .await;

    let mut client = client_for(&server);
    client.load_more().await.unwrap();
    let cursor = client.cursor().cloned();

    let err = client.load_more().await.unwrap_err();
    assert_eq!(err.status_code(), Some(500));
    assert!(err.is_server_error());
    assert!(err.to_string().contains("database unavailable"));

    assert_eq!(client.cursor().cloned(), cursor);
    assert_eq!(ids(&client), vec![5, 4]);
}

#[tokio::test]
async fn test_undecodable_page_is_not_applied() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tracks/list"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let mut client = client_for(&server);
    assert!(matches!(
        client.load_more().await,
        Err(tracksync::Error::Http(_)) | Err(tracksync::Error::Json(_))
    ));
    assert!(client.store().is_empty());
    assert_eq!(client.cursor(), Some(client.first_page_url()));
}

#[tokio::test]
async fn test_filtered_search_then_unfiltered_search() {
    let server = MockServer::start().await;
    mount_listing(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/tracks/list"))
        .and(query_param("count", "2"))
        .and(query_param("underground", "false"))
        .and(query_param("artist", "Artist 9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_json(&[9], None)))
        .mount(&server)
        .await;

    let mut client = client_for(&server);
    client.load_more().await.unwrap();
    client.load_more().await.unwrap();

    let found = client
        .search(&SearchQuery::new().artist("Artist 9"))
        .await
        .unwrap();
    assert_eq!(found, 1);
    assert_eq!(ids(&client), vec![9]);
    assert!(client.store().is_searching());

    // same outcome as reset + load of the first page
    client.search(&SearchQuery::new()).await.unwrap();
    assert!(!client.store().is_searching());
    assert_eq!(ids(&client), vec![5, 4]);
    assert_eq!(
        client.cursor().map(|u| u.path().to_string()),
        Some("/api/tracks/page/2".to_string())
    );
}

#[tokio::test]
async fn test_reset_after_search_ends_the_search() {
    let server = MockServer::start().await;
    mount_listing(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/tracks/list"))
        .and(query_param("artist", "Artist 9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_json(&[9], None)))
        .mount(&server)
        .await;

    let mut client = client_for(&server);
    client
        .search(&SearchQuery::new().artist("Artist 9"))
        .await
        .unwrap();
    assert!(client.store().is_searching());

    client.reset();
    assert_eq!(client.load_more().await.unwrap(), 2);
    assert_eq!(ids(&client), vec![5, 4]);
    assert!(!client.store().is_searching());

    // live pushes are accepted again
    let pushed = Track::from_json(&track_json(10, "Artist 10", "Title 10", "G1").to_string()).unwrap();
    assert!(client.store().insert_from_stream(pushed));
    assert_eq!(ids(&client), vec![10, 5, 4]);
}

#[tokio::test]
async fn test_search_sends_all_filters() {
    let server = MockServer::start().await;
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap();

    Mock::given(method("GET"))
        .and(path("/api/tracks/list"))
        .and(query_param("artist", "Stereolab"))
        .and(query_param("song", "French Disko"))
        .and(query_param("start", start.timestamp_millis().to_string()))
        .and(query_param("end", end.timestamp_millis().to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_json(&[11], None)))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = client_for(&server);
    let query = SearchQuery::new()
        .artist("Stereolab")
        .title("French Disko")
        .between(start, end);
    assert_eq!(client.search(&query).await.unwrap(), 1);
}

#[tokio::test]
async fn test_search_never_sends_single_date_bound() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tracks/list"))
        .and(query_param("song", "Roygbiv"))
        .and(query_param_is_missing("start"))
        .and(query_param_is_missing("end"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_json(&[1], None)))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = client_for(&server);
    let mut query = SearchQuery::new().title("Roygbiv");
    query.start = Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());

    assert_eq!(client.search(&query).await.unwrap(), 1);
    assert!(client.store().is_searching());
}

#[tokio::test]
async fn test_search_flag_is_set_while_request_is_in_flight() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tracks/list"))
        .and(query_param("artist", "Slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(page_json(&[1], None))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let mut client = client_for(&server);
    let store = client.store().clone();
    let pushed: Track =
        serde_json::from_value(track_json(77, "Pushed", "During search", "G1")).unwrap();

    let query = SearchQuery::new().artist("Slow");
    let (result, inserted) = tokio::join!(client.search(&query), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        store.insert_from_stream(pushed)
    });

    assert_eq!(result.unwrap(), 1);
    assert!(!inserted);
    assert_eq!(ids(&client), vec![1]);
}

#[tokio::test]
async fn test_add_puts_created_track_at_head() {
    let server = MockServer::start().await;
    mount_listing(&server).await;

    let played_at = Utc.with_ymd_and_hms(2024, 3, 1, 18, 0, 0).unwrap();
    Mock::given(method("POST"))
        .and(path("/api/tracks/add"))
        .and(query_param("underground", "false"))
        .and(body_json(json!({
            "title": "X",
            "artist": "Y",
            "group": "G1",
            "time": played_at.timestamp_millis()
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(track_json(42, "Y", "X", "G1")))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = client_for(&server);
    client.load_more().await.unwrap();

    let created = assert_ok!(client.add(NewTrack::song("X", "Y", "G1", played_at)).await);
    assert_eq!(created.id, 42);
    assert_eq!(ids(&client), vec![42, 5, 4]);

    // the push channel echoing the same record is dropped
    assert!(!client.store().insert_from_stream(created));
    assert_eq!(ids(&client), vec![42, 5, 4]);
}

#[tokio::test]
async fn test_add_event_forces_title_and_group() {
    let server = MockServer::start().await;
    let played_at = Utc.with_ymd_and_hms(2024, 3, 1, 19, 0, 0).unwrap();
    Mock::given(method("POST"))
        .and(path("/api/tracks/add"))
        .and(body_json(json!({
            "title": "",
            "artist": "Top of the hour",
            "group": "Event",
            "time": played_at.timestamp_millis()
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(track_json(43, "Top of the hour", "", EVENT_GROUP)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let created = client
        .add(NewTrack::event("Top of the hour", played_at))
        .await
        .unwrap();
    assert!(created.is_event());
    assert_eq!(client.store().head().map(|t| t.id), Some(43));
}

#[tokio::test]
async fn test_rejected_add_changes_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/tracks/add"))
        .respond_with(ResponseTemplate::new(400).set_body_string("missing title"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = assert_err!(client.add(NewTrack::song("", "Y", "G1", Utc::now())).await);
    assert_eq!(err.status_code(), Some(400));
    assert!(!err.is_server_error());
    assert!(client.store().is_empty());
}

#[tokio::test]
async fn test_update_event_keeps_artist_and_group() {
    let server = MockServer::start().await;
    let played_at = Utc.with_ymd_and_hms(2024, 3, 1, 20, 0, 0).unwrap();
    Mock::given(method("PATCH"))
        .and(path("/api/tracks/update"))
        .and(query_param("underground", "false"))
        .and(body_json(json!({
            "id": 7,
            "title": "",
            "time": played_at.timestamp_millis()
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let event: Track =
        serde_json::from_value(track_json(7, "Station ID", "", EVENT_GROUP)).unwrap();
    client.store().replace_all(vec![event]);

    let change = client
        .update(
            7,
            TrackEdit {
                title: String::new(),
                artist: "Something else".into(),
                group: "G9".into(),
                played_at,
            },
        )
        .await
        .unwrap();

    assert_eq!(change, LocalChange::Applied);
    let edited = client.store().get(7).unwrap();
    assert_eq!(edited.artist, "Station ID");
    assert_eq!(edited.group, EVENT_GROUP);
    assert_eq!(edited.played_at, played_at);
}

#[tokio::test]
async fn test_update_track_sends_every_field() {
    let server = MockServer::start().await;
    let played_at = Utc.with_ymd_and_hms(2024, 3, 1, 21, 0, 0).unwrap();
    Mock::given(method("PATCH"))
        .and(path("/api/tracks/update"))
        .and(body_json(json!({
            "id": 5,
            "title": "Fixed title",
            "artist": "Fixed artist",
            "group": "G2",
            "time": played_at.timestamp_millis()
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let track: Track = serde_json::from_value(track_json(5, "Typo", "Typo", "G1")).unwrap();
    client.store().replace_all(vec![track]);

    let edit = TrackEdit {
        title: "Fixed title".into(),
        artist: "Fixed artist".into(),
        group: "G2".into(),
        played_at,
    };
    assert_eq!(client.update(5, edit).await.unwrap(), LocalChange::Applied);

    let edited = client.store().get(5).unwrap();
    assert_eq!(edited.title, "Fixed title");
    assert_eq!(edited.artist, "Fixed artist");
    assert_eq!(edited.group, "G2");
    assert_eq!(edited.id, 5);
}

#[tokio::test]
async fn test_update_of_unknown_record_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/api/tracks/update"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let edit = TrackEdit {
        title: "T".into(),
        artist: "A".into(),
        group: "G1".into(),
        played_at: Utc::now(),
    };
    assert_eq!(client.update(404, edit).await.unwrap(), LocalChange::NotPresent);
    assert!(client.store().is_empty());
}

#[tokio::test]
async fn test_rejected_update_changes_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/api/tracks/update"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let track: Track = serde_json::from_value(track_json(5, "A", "T", "G1")).unwrap();
    client.store().replace_all(vec![track.clone()]);

    let edit = TrackEdit {
        title: "New".into(),
        artist: "New".into(),
        group: "G2".into(),
        played_at: Utc::now(),
    };
    let err = client.update(5, edit).await.unwrap_err();
    assert!(err.is_server_error());
    assert_eq!(client.store().get(5), Some(track));
}

#[tokio::test]
async fn test_delete_removes_by_id() {
    let server = MockServer::start().await;
    mount_listing(&server).await;
    Mock::given(method("DELETE"))
        .and(path("/api/tracks/delete"))
        .and(query_param("id", "4"))
        .and(query_param("underground", "false"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let mut client = client_for(&server);
    client.load_more().await.unwrap();
    let target = client.store().get(4).unwrap();

    assert_eq!(client.delete(&target).await.unwrap(), LocalChange::Applied);
    assert_eq!(ids(&client), vec![5]);

    assert_eq!(client.delete(&target).await.unwrap(), LocalChange::NotPresent);
    assert_eq!(ids(&client), vec![5]);
}

#[tokio::test]
async fn test_underground_channel_parameter() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tracks/list"))
        .and(query_param("underground", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_json(&[8], None)))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = TrackClient::builder()
        .base_url(server.uri())
        .underground(true)
        .build()
        .unwrap();
    assert_eq!(client.load_more().await.unwrap(), 1);
}

#[tokio::test]
async fn test_groups_listing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/groups/list"))
        .and(query_param("underground", "false"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(["Rotation", "Feature", "Event"])))
        .mount(&server)
        .await;

    let client = client_for(&server);
    assert_eq!(
        client.groups().await.unwrap(),
        vec!["Rotation", "Feature", "Event"]
    );
}

#[tokio::test]
async fn test_groups_listing_rejected_is_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/groups/list"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = client_for(&server);
    assert!(client.groups().await.unwrap().is_empty());
}
