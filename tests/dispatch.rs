use noheadache::middleware::{from_fn, CorsMiddleware, Flow};
use noheadache::{endpoints, Body, DispatchError, Request, Response, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

fn get(path: &str) -> http::Request<Body> {
    http::Request::get(path).body(Body::empty()).unwrap()
}

fn post_json(path: &str, body: &'static str) -> http::Request<Body> {
    http::Request::post(path)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap()
}

async fn body_json(response: http::Response<Body>) -> Value {
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_text(response: http::Response<Body>) -> String {
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn show_user(request: Request, mut response: Response) -> Result<(), anyhow::Error> {
    let id = request.param("id").unwrap_or_default();
    response.json(&json!({
        "user": { "id": id, "name": format!("User {}", id) },
        "include": request.query().get("include"),
    }))?;
    Ok(())
}

#[tokio::test]
async fn test_routes_dynamic_segments_and_queries() {
    let mut http = noheadache::http();
    http.get("/users/:id", show_user);

    let response = http.handle(get("/users/42?include=profile")).await;
    assert_eq!(response.status(), http::StatusCode::OK);
    assert_eq!(
        response.headers()[http::header::CONTENT_TYPE],
        "application/json"
    );
    assert_eq!(
        body_json(response).await,
        json!({
            "user": { "id": "42", "name": "User 42" },
            "include": "profile",
        })
    );
}

#[tokio::test]
async fn test_decodes_parameters() {
    let mut http = noheadache::http();
    http.get("/users/:id", show_user);

    let response = http.handle(get("/users/a%2Fb")).await;
    assert_eq!(body_json(response).await["user"]["id"], "a/b");
}

#[tokio::test]
async fn test_encoded_literals_match_as_sent() {
    let mut http = noheadache::http();
    http.get("/caf%C3%A9", show_user)
        .get("/caf%C3%A9/:id", show_user)
        .get("/a b/:id", show_user);

    let response = http.handle(get("/caf%C3%A9")).await;
    assert_eq!(response.status(), http::StatusCode::OK);
    let response = http.handle(get("/caf%C3%A9/7")).await;
    assert_eq!(body_json(response).await["user"]["id"], "7");
    let response = http.handle(get("/a%20b/1")).await;
    assert_eq!(response.status(), http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_routes_are_not_found() {
    let mut http = noheadache::http();
    http.get("/users/:id", show_user);

    for (method, path) in [("GET", "/users"), ("POST", "/users/1"), ("GET", "/a/b/c")] {
        let request = http::Request::builder()
            .method(method)
            .uri(path)
            .body(Body::empty())
            .unwrap();
        let response = http.handle(request).await;
        assert_eq!(response.status(), http::StatusCode::NOT_FOUND);

        let body = body_json(response).await;
        assert_eq!(body["error"], format!("Cannot {} {}", method, path));
        assert!(body["suggestion"].as_str().unwrap().contains("routes directory"));
        let timestamp = body["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
        assert!(timestamp.ends_with('Z'));
    }
}

#[tokio::test]
async fn test_last_registration_wins() {
    let mut http = noheadache::http();
    http.get(
        "/greeting",
        endpoints::simple(|response| {
            response.text("first")?;
            Ok::<_, DispatchError>(())
        }),
    );
    http.get(
        "/greeting",
        endpoints::simple(|response| {
            response.text("second")?;
            Ok::<_, DispatchError>(())
        }),
    );

    let response = http.handle(get("/greeting")).await;
    assert_eq!(body_text(response).await, "second");
}

#[tokio::test]
async fn test_middleware_runs_in_order_and_aborts() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let handled = Arc::new(Mutex::new(false));

    let mut http = noheadache::http();
    for (name, abort) in [("a", false), ("b", true), ("c", false)] {
        let seen = seen.clone();
        http.with(from_fn(move |_, _| {
            seen.lock().push(name);
            if abort {
                Flow::abort(anyhow::anyhow!("{} refused", name))
            } else {
                Flow::Continue
            }
        }));
    }
    let flag = handled.clone();
    http.get(
        "/",
        endpoints::simple(move |response| {
            *flag.lock() = true;
            response.end();
        }),
    );

    let response = http.handle(get("/")).await;
    assert_eq!(response.status(), http::StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["error"], "Internal Server Error");
    assert_eq!(*seen.lock(), vec!["a", "b"]);
    assert!(!*handled.lock());
}

#[tokio::test]
async fn test_middleware_sees_every_request_in_order() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut http = noheadache::http();
    for name in ["a", "b", "c"] {
        let seen = seen.clone();
        http.with(from_fn(move |request, _| {
            seen.lock().push(name);
            request.set_ext(name);
            Flow::Continue
        }));
    }
    http.get(
        "/",
        endpoints::sync(|request, response| {
            response.text(*request.ext::<&'static str>().unwrap())?;
            Ok::<_, DispatchError>(())
        }),
    );

    let response = http.handle(get("/")).await;
    assert_eq!(body_text(response).await, "c");
    assert_eq!(*seen.lock(), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_preflight_short_circuits() {
    let later = Arc::new(Mutex::new(false));
    let flag = later.clone();

    let mut http = noheadache::http();
    http.with(CorsMiddleware::new())
        .with(from_fn(move |_, _| {
            *flag.lock() = true;
            Flow::Continue
        }))
        .register(
            http::Method::OPTIONS,
            "/users",
            endpoints::simple(|response| {
                response.status(500).end();
            }),
        );

    let request = http::Request::options("/users").body(Body::empty()).unwrap();
    let response = http.handle(request).await;
    assert_eq!(response.status(), http::StatusCode::OK);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    assert_eq!(body_text(response).await, "");
    assert!(!*later.lock());
}

#[tokio::test]
async fn test_cors_headers_reach_regular_responses() {
    let mut http = noheadache::http();
    http.with(CorsMiddleware::new()).get("/users/:id", show_user);

    let response = http.handle(get("/users/1")).await;
    assert_eq!(response.status(), http::StatusCode::OK);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");

    let response = http.handle(get("/nowhere")).await;
    assert_eq!(response.status(), http::StatusCode::NOT_FOUND);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
}

#[tokio::test]
async fn test_json_bodies_are_parsed() {
    let mut http = noheadache::http();
    http.post(
        "/users",
        endpoints::sync(|request, response| {
            let body = request.payload().as_json().cloned().unwrap_or_default();
            response.status(201).json(&json!({ "created": body }))?;
            Ok::<_, DispatchError>(())
        }),
    );

    let response = http.handle(post_json("/users", r#"{"name":"x"}"#)).await;
    assert_eq!(response.status(), http::StatusCode::CREATED);
    assert_eq!(body_json(response).await, json!({ "created": { "name": "x" } }));
}

#[tokio::test]
async fn test_malformed_json_is_an_internal_error() {
    let mut http = noheadache::http();
    http.post(
        "/users",
        endpoints::simple(|response| {
            response.end();
        }),
    );

    let response = http.handle(post_json("/users", r#"{"name":"#)).await;
    assert_eq!(response.status(), http::StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Internal Server Error");
    assert!(body.get("suggestion").is_none());
}

#[tokio::test]
async fn test_oversized_bodies_are_rejected() {
    let mut http = noheadache::http();
    http.body_limit(4).post(
        "/users",
        endpoints::simple(|response| {
            response.end();
        }),
    );

    let response = http.handle(post_json("/users", r#"{"name":"x"}"#)).await;
    assert_eq!(response.status(), http::StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["error"], "Internal Server Error");
}

#[tokio::test]
async fn test_forms_and_text_are_parsed() {
    let mut http = noheadache::http();
    http.put(
        "/echo",
        endpoints::sync(|request, response| {
            match request.payload().form_value("name") {
                Some(name) => response.text(format!("form:{}", name))?,
                None => {
                    let text = request.payload().as_text().unwrap_or_default();
                    response.text(format!("text:{}", text))?
                }
            };
            Ok::<_, DispatchError>(())
        }),
    );

    let request = http::Request::put("/echo")
        .header(http::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("name=x+y&other=1"))
        .unwrap();
    assert_eq!(body_text(http.handle(request).await).await, "form:x y");

    let request = http::Request::put("/echo")
        .header(http::header::CONTENT_TYPE, "text/plain")
        .body(Body::from("hello"))
        .unwrap();
    assert_eq!(body_text(http.handle(request).await).await, "text:hello");
}

#[tokio::test]
async fn test_double_completion_sends_one_response() {
    let mut http = noheadache::http();
    http.get("/twice", |_: Request, mut response: Response| async move {
        response.json(&json!({ "n": 1 }))?;
        response.status(500).json(&json!({ "n": 2 }))?;
        Ok::<_, DispatchError>(())
    });

    let response = http.handle(get("/twice")).await;
    assert_eq!(response.status(), http::StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "n": 1 }));
}

#[tokio::test]
async fn test_handler_errors_are_internal() {
    let mut http = noheadache::http();
    http.get("/fails", |_: Request, _: Response| async move {
        Err::<(), _>(anyhow::anyhow!("database is down"))
    });

    let response = http.handle(get("/fails")).await;
    assert_eq!(response.status(), http::StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Internal Server Error");
    assert!(body.get("suggestion").is_none());
}

struct Unserializable;

impl serde::Serialize for Unserializable {
    fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
        Err(serde::ser::Error::custom("cannot serialize"))
    }
}

#[tokio::test]
async fn test_serialization_failures_are_internal() {
    let mut http = noheadache::http();
    http.get("/propagated", |_: Request, mut response: Response| async move {
        response.header("X-Stage", "before")?.json(&Unserializable)?;
        Ok::<_, DispatchError>(())
    });
    http.get(
        "/ignored",
        endpoints::simple(|response| {
            let _ = response.json(&Unserializable);
        }),
    );

    for path in ["/propagated", "/ignored"] {
        let response = http.handle(get(path)).await;
        assert_eq!(response.status(), http::StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers()[http::header::CONTENT_TYPE],
            "application/json"
        );
        assert_eq!(body_json(response).await["error"], "Internal Server Error");
    }
}

#[tokio::test]
async fn test_handler_panics_are_internal() {
    let mut http = noheadache::http();
    http.get("/panics", endpoints::simple(|_| -> () { panic!("boom") }));

    let response = http.handle(get("/panics")).await;
    assert_eq!(response.status(), http::StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_errors_after_sending_are_only_logged() {
    let mut http = noheadache::http();
    http.get("/late", |_: Request, mut response: Response| async move {
        response.status(202).end();
        Err::<(), _>(anyhow::anyhow!("too late to matter"))
    });

    let response = http.handle(get("/late")).await;
    assert_eq!(response.status(), http::StatusCode::ACCEPTED);
    assert_eq!(body_text(response).await, "");
}

#[tokio::test]
async fn test_open_responses_are_completed() {
    let mut http = noheadache::http();
    http.get("/silent", |_: Request, mut response: Response| async move {
        response.status(204).header("X-Quiet", "yes")?;
        Ok::<_, DispatchError>(())
    });

    let response = http.handle(get("/silent")).await;
    assert_eq!(response.status(), http::StatusCode::NO_CONTENT);
    assert_eq!(response.headers()["x-quiet"], "yes");
    assert_eq!(body_text(response).await, "");
}

#[tokio::test]
async fn test_redirects_and_files() {
    let path = std::env::temp_dir().join(format!("noheadache-files-{}.json", std::process::id()));
    tokio::fs::write(&path, r#"{"ok":true}"#).await.unwrap();

    let mut http = noheadache::http();
    http.get(
        "/old",
        endpoints::simple(|response| {
            response.redirect("/new")?;
            Ok::<_, DispatchError>(())
        }),
    );
    let file = path.clone();
    http.get("/file", move |_: Request, mut response: Response| {
        let file = file.clone();
        async move {
            response.send_file_guess(&file).await?;
            Ok::<_, DispatchError>(())
        }
    });
    http.get("/missing", |_: Request, mut response: Response| async move {
        response
            .send_file("/definitely/not/here.txt", "text/plain")
            .await?;
        Ok::<_, DispatchError>(())
    });

    let response = http.handle(get("/old")).await;
    assert_eq!(response.status(), http::StatusCode::FOUND);
    assert_eq!(response.headers()[http::header::LOCATION], "/new");

    let response = http.handle(get("/file")).await;
    assert_eq!(response.status(), http::StatusCode::OK);
    assert_eq!(
        response.headers()[http::header::CONTENT_TYPE],
        "application/json"
    );
    assert_eq!(body_json(response).await, json!({ "ok": true }));

    let response = http.handle(get("/missing")).await;
    assert_eq!(response.status(), http::StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], "File not found");

    tokio::fs::remove_file(&path).await.unwrap();
}

#[tokio::test]
async fn test_router_is_shareable_across_tasks() {
    let mut http = Router::default();
    http.get("/users/:id", show_user);
    let http = Arc::new(http);

    let tasks = (0..8)
        .map(|i| {
            let http = http.clone();
            tokio::spawn(async move {
                let response = http.handle(get(&format!("/users/{}", i))).await;
                body_json(response).await["user"]["id"].clone()
            })
        })
        .collect::<Vec<_>>();
    for (i, task) in tasks.into_iter().enumerate() {
        assert_eq!(task.await.unwrap(), json!(i.to_string()));
    }
}

#[tokio::test]
async fn test_clients_can_hang_up_mid_file() {
    let path = std::env::temp_dir().join(format!("noheadache-large-{}.bin", std::process::id()));
    tokio::fs::write(&path, vec![b'x'; 8 * 1024 * 1024]).await.unwrap();

    let mut http = noheadache::http();
    let file = path.clone();
    http.get("/large", move |_: Request, mut response: Response| {
        let file = file.clone();
        async move {
            response.send_file(&file, "application/octet-stream").await?;
            Ok::<_, DispatchError>(())
        }
    });
    http.get(
        "/ping",
        endpoints::simple(|response| {
            response.text("pong")?;
            Ok::<_, DispatchError>(())
        }),
    );
    let terminate = http.termination_signal();
    let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();
    let server = tokio::spawn(http.listen_with("127.0.0.1:0", move |address| {
        let _ = ready_tx.send(address);
    }));
    let address = ready_rx.await.unwrap();

    let mut stream = tokio::net::TcpStream::connect(address).await.unwrap();
    stream
        .write_all(b"GET /large HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();
    let mut head = [0_u8; 1024];
    let read = stream.read(&mut head).await.unwrap();
    assert!(head[..read].starts_with(b"HTTP/1.1 200 OK"));
    drop(stream);

    let response = hyper::Client::new()
        .get(format!("http://{}/ping", address).parse().unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), http::StatusCode::OK);
    assert_eq!(body_text(response).await, "pong");

    terminate.send(true).unwrap();
    server.await.unwrap().unwrap();
    tokio::fs::remove_file(&path).await.unwrap();
}
