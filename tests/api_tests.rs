//! API Integration Tests
//!
//! Drives the router directly for the route table and response shapes, and
//! a live hyper server over TCP for the wire behaviour.

use std::sync::Arc;

use hyper::{Method, StatusCode};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use travelstore::api::{self, Reply, Router, RouterConfig};
use travelstore::{Store, StoreConfig};

fn router() -> Router {
    let store = Store::new(StoreConfig {
        shard_count: 11,
        max_users: 1000,
        max_locations: 1000,
        max_visits: 1000,
        ..Default::default()
    })
    .unwrap();
    Router::new(Arc::new(store), RouterConfig::default())
}

fn post(r: &Router, target: &str, body: Value) -> StatusCode {
    r.handle(&Method::POST, target, body.to_string().as_bytes())
        .status
}

fn get(r: &Router, target: &str) -> Reply {
    r.handle(&Method::GET, target, b"")
}

fn get_json(r: &Router, target: &str) -> Value {
    let reply = get(r, target);
    assert_eq!(reply.status, StatusCode::OK, "GET {}", target);
    serde_json::from_slice(&reply.body).unwrap()
}

/// One user, two locations, three visits
fn seeded() -> Router {
    let r = router();
    assert_eq!(
        post(
            &r,
            "/users/new",
            json!({"id": 1, "email": "ann@mail.test", "first_name": "Ann", "last_name": "Lee",
                   "gender": "f", "birth_date": 0})
        ),
        StatusCode::OK
    );
    assert_eq!(
        post(
            &r,
            "/locations/new",
            json!({"id": 1, "place": "Tower", "country": "New Zealand", "city": "Akl", "distance": 5})
        ),
        StatusCode::OK
    );
    assert_eq!(
        post(
            &r,
            "/locations/new",
            json!({"id": 2, "place": "Lake", "country": "Chile", "city": "Stgo", "distance": 50})
        ),
        StatusCode::OK
    );
    for (id, location, at, mark) in [(1, 1, 300, 5), (2, 2, 100, 2), (3, 1, 200, 3)] {
        assert_eq!(
            post(
                &r,
                "/visits/new",
                json!({"id": id, "location": location, "user": 1, "visited_at": at, "mark": mark})
            ),
            StatusCode::OK
        );
    }
    r
}

// =============================================================================
// Route table
// =============================================================================

mod route_tests {
    use super::*;

    #[test]
    fn test_get_entities() {
        let r = seeded();
        let user = get_json(&r, "/users/1");
        assert_eq!(user["first_name"], "Ann");
        assert_eq!(user["gender"], "f");
        assert!(user.get("valid").is_none());

        let visit = get_json(&r, "/visits/2");
        assert_eq!(
            visit,
            json!({"id": 2, "location": 2, "user": 1, "visited_at": 100, "mark": 2})
        );

        assert_eq!(get(&r, "/users/2").status, StatusCode::NOT_FOUND);
        assert_eq!(get(&r, "/visits/999999").status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_user_visits_listing() {
        let r = seeded();
        let body = get_json(&r, "/users/1/visits");
        assert_eq!(
            body,
            json!({"visits": [
                {"mark": 2, "visited_at": 100, "place": "Lake"},
                {"mark": 3, "visited_at": 200, "place": "Tower"},
                {"mark": 5, "visited_at": 300, "place": "Tower"}
            ]})
        );

        let body = get_json(&r, "/users/1/visits?country=New%20Zealand&fromDate=200");
        assert_eq!(body["visits"].as_array().unwrap().len(), 1);
        assert_eq!(body["visits"][0]["visited_at"], 300);

        let body = get_json(&r, "/users/1/visits?country=New+Zealand");
        assert_eq!(body["visits"].as_array().unwrap().len(), 2);

        assert_eq!(
            get(&r, "/users/1/visits?toDistance=far").status,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(get(&r, "/users/7/visits").status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_location_avg() {
        let r = seeded();
        let reply = get(&r, "/locations/1/avg");
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(&reply.body[..], br#"{"avg": 4.00000}"#);

        let reply = get(&r, "/locations/1/avg?fromDate=250");
        assert_eq!(&reply.body[..], br#"{"avg": 5.00000}"#);

        let reply = get(&r, "/locations/1/avg?gender=m");
        assert_eq!(&reply.body[..], br#"{"avg": 0.00000}"#);

        assert_eq!(
            get(&r, "/locations/1/avg?gender=q").status,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(get(&r, "/locations/3/avg").status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_avg_rounds_to_five_places() {
        let r = seeded();
        assert_eq!(
            post(
                &r,
                "/visits/new",
                json!({"id": 4, "location": 1, "user": 1, "visited_at": 400, "mark": 0})
            ),
            StatusCode::OK
        );
        // (5 + 3 + 0) / 3
        let reply = get(&r, "/locations/1/avg");
        assert_eq!(&reply.body[..], br#"{"avg": 2.66667}"#);
    }

    #[test]
    fn test_location_marks_debug_path() {
        let r = seeded();
        let body = get_json(&r, "/locations/2/marks");
        assert_eq!(body["marks"].as_array().unwrap().len(), 1);
        assert_eq!(body["marks"][0]["user_id"], 1);
        assert_eq!(body["marks"][0]["gender"], "f");
    }

    #[test]
    fn test_new_is_post_only() {
        let r = seeded();
        assert_eq!(get(&r, "/visits/new").status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            r.handle(&Method::PUT, "/visits/1", b"{}").status,
            StatusCode::METHOD_NOT_ALLOWED
        );
    }
}

// =============================================================================
// Writes
// =============================================================================

mod write_tests {
    use super::*;

    #[test]
    fn test_visit_update_moves_between_locations() {
        let r = seeded();
        assert_eq!(
            post(&r, "/visits/1", json!({"location": 2, "mark": 1})),
            StatusCode::OK
        );
        assert_eq!(&get(&r, "/locations/1/avg").body[..], br#"{"avg": 3.00000}"#);
        assert_eq!(&get(&r, "/locations/2/avg").body[..], br#"{"avg": 1.50000}"#);

        let visit = get_json(&r, "/visits/1");
        assert_eq!(visit["location"], 2);
        assert_eq!(visit["visited_at"], 300);
    }

    #[test]
    fn test_location_update_visible_in_listing() {
        let r = seeded();
        assert_eq!(post(&r, "/locations/2", json!({"place": "Fjord"})), StatusCode::OK);
        let body = get_json(&r, "/users/1/visits");
        assert_eq!(body["visits"][0]["place"], "Fjord");
    }

    #[test]
    fn test_bad_writes() {
        let r = seeded();
        // Unknown references
        assert_eq!(
            post(
                &r,
                "/visits/new",
                json!({"id": 9, "location": 77, "user": 1, "visited_at": 1, "mark": 1})
            ),
            StatusCode::BAD_REQUEST
        );
        // Missing field
        assert_eq!(
            post(&r, "/users/new", json!({"id": 5, "email": "x"})),
            StatusCode::BAD_REQUEST
        );
        // Null field on update
        assert_eq!(
            post(&r, "/locations/1", json!({"distance": null})),
            StatusCode::BAD_REQUEST
        );
        // Mark out of range on update leaves the visit intact
        assert_eq!(post(&r, "/visits/1", json!({"mark": 6})), StatusCode::BAD_REQUEST);
        assert_eq!(get_json(&r, "/visits/1")["mark"], 5);
        // Unknown id
        assert_eq!(post(&r, "/visits/123", json!({"mark": 1})), StatusCode::NOT_FOUND);
        assert_eq!(post(&r, "/visits/abc", json!({})), StatusCode::NOT_FOUND);
    }
}

// =============================================================================
// Live server
// =============================================================================

mod server_tests {
    use super::*;

    async fn request(addr: std::net::SocketAddr, raw: String) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(raw.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_http_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = Arc::new(router());
        let server = tokio::spawn(api::serve_listener(listener, router, false));

        let body = r#"{"id":3,"email":"a@b","first_name":"A","last_name":"B","gender":"m","birth_date":5}"#;
        let response = request(
            addr,
            format!(
                "POST /users/new HTTP/1.1\r\nHost: test\r\nContent-Length: {}\r\n\r\n{}",
                body.len(),
                body
            ),
        )
        .await;
        assert!(response.starts_with("HTTP/1.1 200 OK"), "{}", response);
        assert!(response.to_lowercase().contains("connection: close"));
        assert!(response.ends_with("{}"));

        let response = request(
            addr,
            "GET /users/3 HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n".to_string(),
        )
        .await;
        assert!(response.starts_with("HTTP/1.1 200 OK"), "{}", response);
        assert!(response.contains("application/json"));
        assert!(response.contains(r#""birth_date":5"#));

        let response = request(
            addr,
            "GET /users/4 HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n".to_string(),
        )
        .await;
        assert!(response.starts_with("HTTP/1.1 404"), "{}", response);

        server.abort();
    }
}
