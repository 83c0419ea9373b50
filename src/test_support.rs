//! Local stand-in for the board origin, served by actix-web on an ephemeral port.

use actix_web::http::StatusCode;
use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
struct MockResponse {
    status: u16,
    body: Vec<u8>,
    headers: Vec<(String, String)>,
}

#[derive(Clone, Default)]
pub struct MockOrigin {
    routes: Arc<Mutex<HashMap<String, MockResponse>>>,
    hits: Arc<Mutex<HashMap<String, usize>>>,
}

impl MockOrigin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, path: &str, status: u16, body: impl Into<Vec<u8>>) {
        self.set_with_headers(path, status, body, &[]);
    }

    pub fn set_with_headers(
        &self,
        path: &str,
        status: u16,
        body: impl Into<Vec<u8>>,
        headers: &[(&str, &str)],
    ) {
        let response = MockResponse {
            status,
            body: body.into(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        };
        self.routes.lock().unwrap().insert(path.to_string(), response);
    }

    pub fn hits(&self, path: &str) -> usize {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    /// Starts serving and returns the base URL, with a trailing slash.
    pub async fn start(&self) -> String {
        let data = web::Data::new(self.clone());
        let server = HttpServer::new(move || {
            App::new()
                .app_data(data.clone())
                .default_service(web::to(serve))
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();

        let addr = server.addrs()[0];
        actix_web::rt::spawn(server.run());
        format!("http://{}/", addr)
    }
}

async fn serve(req: HttpRequest, origin: web::Data<MockOrigin>) -> HttpResponse {
    let path = req.path().to_string();
    *origin.hits.lock().unwrap().entry(path.clone()).or_insert(0) += 1;

    let Some(response) = origin.routes.lock().unwrap().get(&path).cloned() else {
        return HttpResponse::NotFound().finish();
    };

    let mut builder = HttpResponse::build(StatusCode::from_u16(response.status).unwrap());
    for (name, value) in &response.headers {
        builder.insert_header((name.as_str(), value.as_str()));
    }
    builder.body(response.body)
}
