//! A local HTTP server for exercising [`crate::provider`] implementations without a real
//! network call. Each test gets its own [`MockServer`] bound to an ephemeral port; routes
//! are matched by exact path (ignoring any query string) and HTTP method.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tiny_http::{Method, Response, Server};

pub enum Body {
    Json(serde_json::Value),
    Bytes(Vec<u8>),
    Empty(u16),
}

type RouteFn = Box<dyn Fn(&str) -> Body + Send + Sync>;

#[derive(Default)]
struct Routes {
    get: HashMap<String, RouteFn>,
    post: HashMap<String, RouteFn>,
}

pub struct MockServer {
    url: String,
    routes: Arc<RwLock<Routes>>,
    _handle: std::thread::JoinHandle<()>,
}

impl MockServer {
    pub fn start() -> Self {
        let server = Server::http("127.0.0.1:0").expect("bind ephemeral port");
        let url = format!("http://{}", server.server_addr().to_ip().expect("ip addr"));
        let routes = Arc::new(RwLock::new(Routes::default()));

        let handle = {
            let routes = Arc::clone(&routes);
            std::thread::spawn(move || {
                for request in server.incoming_requests() {
                    let path = request.url().split('?').next().unwrap_or("").to_owned();
                    let method = request.method().clone();

                    let mut request = request;
                    let mut raw_body = String::new();
                    let _ = std::io::Read::read_to_string(request.as_reader(), &mut raw_body);

                    let table = routes.read();
                    let route = match method {
                        Method::Get => table.get.get(&path),
                        Method::Post => table.post.get(&path),
                        _ => None,
                    };

                    let body = match route {
                        Some(route) => route(&raw_body),
                        None => Body::Empty(404),
                    };
                    drop(table);

                    let _ = match body {
                        Body::Json(value) => {
                            let bytes = serde_json::to_vec(&value).unwrap_or_default();
                            request.respond(
                                Response::from_data(bytes).with_status_code(200),
                            )
                        }
                        Body::Bytes(bytes) => {
                            request.respond(Response::from_data(bytes).with_status_code(200))
                        }
                        Body::Empty(status) => {
                            request.respond(Response::empty(status))
                        }
                    };
                }
            })
        };

        Self { url, routes, _handle: handle }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn on_get(&self, path: &str, handler: impl Fn(&str) -> Body + Send + Sync + 'static) {
        self.routes.write().get.insert(path.to_owned(), Box::new(handler));
    }

    pub fn on_post(&self, path: &str, handler: impl Fn(&str) -> Body + Send + Sync + 'static) {
        self.routes.write().post.insert(path.to_owned(), Box::new(handler));
    }
}
