use actix_files::NamedFile;
use actix_web::cookie::{time::Duration as CookieDuration, Cookie};
use actix_web::http::header::{CacheControl, CacheDirective, Expires, LastModified};
use actix_web::http::StatusCode;
use actix_web::{get, web, HttpRequest, HttpResponse, Responder, ResponseError};
use std::time::{Duration, SystemTime};
use tracing::{error, info};

use crate::board::models::ClipRecord;
use crate::config::Config;
use crate::player::playback::{ClipSource, PlaybackCoordinator, PlaybackError};
use crate::player::sessions::ResolvedSession;

pub const SESSION_COOKIE: &str = "clipstream_session";

// Cached clips never change, so let browsers and proxies keep them for a year.
const CLIP_CACHE_LIFETIME: Duration = Duration::from_secs(365 * 24 * 60 * 60);

impl ResponseError for PlaybackError {
    fn status_code(&self) -> StatusCode {
        match self {
            PlaybackError::EmptyQueue => StatusCode::SERVICE_UNAVAILABLE,
            PlaybackError::ClipGone(_) => StatusCode::NOT_FOUND,
            PlaybackError::Origin(_) | PlaybackError::OriginStatus(_) => StatusCode::BAD_GATEWAY,
            PlaybackError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Maps a play command to a cursor move.
pub fn command_delta(command: &str) -> Option<i64> {
    match command {
        "" => Some(0),
        "next" => Some(1),
        "prev" => Some(-1),
        "next10" => Some(10),
        "prev10" => Some(-10),
        _ => None,
    }
}

async fn request_session(req: &HttpRequest, player: &PlaybackCoordinator) -> ResolvedSession {
    let cookie = req.cookie(SESSION_COOKIE);
    if cookie.is_none() {
        info!("Serving new viewer without session cookie");
    }
    player
        .resolve_session(cookie.as_ref().map(|c| c.value()))
        .await
}

fn with_session(mut res: HttpResponse, session: &ResolvedSession) -> HttpResponse {
    if session.is_new {
        let cookie = Cookie::build(SESSION_COOKIE, session.id.clone())
            .path("/")
            .max_age(CookieDuration::hours(24))
            .finish();
        if let Err(e) = res.add_cookie(&cookie) {
            error!("Failed to set session cookie: {}", e);
        }
    }
    res
}

#[get("/play/info")]
pub async fn clip_info(req: HttpRequest, player: web::Data<PlaybackCoordinator>) -> HttpResponse {
    let session = request_session(&req, &player).await;
    let res = match player.navigate(&session.id, 0).await {
        Ok(clip) => {
            info!(session = %session.id, clip = %clip.name, "Serving clip info");
            HttpResponse::Ok().json(clip)
        }
        Err(e) => e.error_response(),
    };
    with_session(res, &session)
}

#[get("/play/{command:.*}")]
pub async fn play(
    req: HttpRequest,
    command: web::Path<String>,
    player: web::Data<PlaybackCoordinator>,
) -> HttpResponse {
    let Some(delta) = command_delta(&command) else {
        return HttpResponse::NotFound().body("unknown play command");
    };

    let session = request_session(&req, &player).await;
    let res = match player.navigate(&session.id, delta).await {
        Ok(clip) => match stream_clip(&req, &player, &clip).await {
            Ok(res) => res,
            Err(e) => {
                error!(clip = %clip.name, "Error on playing clip: {}", e);
                e.error_response()
            }
        },
        Err(e) => e.error_response(),
    };
    with_session(res, &session)
}

/// Streams a clip from disk, or from the origin while it fills the cache.
pub async fn stream_clip(
    req: &HttpRequest,
    player: &PlaybackCoordinator,
    clip: &ClipRecord,
) -> Result<HttpResponse, PlaybackError> {
    match player.open_clip(clip).await? {
        ClipSource::Cached(path) => {
            let file = NamedFile::open_async(&path).await?;
            let expires = SystemTime::now() + CLIP_CACHE_LIFETIME;
            Ok(file
                .use_last_modified(true)
                .customize()
                .insert_header(Expires(expires.into()))
                .insert_header(CacheControl(vec![
                    CacheDirective::Public,
                    CacheDirective::MaxAge(CLIP_CACHE_LIFETIME.as_secs() as u32),
                ]))
                .respond_to(req)
                .map_into_boxed_body())
        }
        ClipSource::Origin(stream) => {
            let mut builder = HttpResponse::Ok();
            builder.content_type(
                stream
                    .content_type
                    .unwrap_or_else(|| "video/webm".to_string()),
            );
            if let Some(modified) = stream.last_modified {
                builder.insert_header(LastModified(modified.into()));
            }
            let body = futures_util::stream::unfold(stream.body, |mut rx| async move {
                rx.recv().await.map(|chunk| (chunk, rx))
            });
            Ok(builder.streaming(body))
        }
    }
}

// Handler for the player page
#[get("/")]
pub async fn index(config: web::Data<Config>) -> HttpResponse {
    let html = PLAYER_PAGE.replace("{origin}", &config.download_url);

    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(html)
}

const PLAYER_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>clipstream</title>
    <style>
        body { font-family: Arial, sans-serif; margin: 0; padding: 20px; background-color: #111; color: #eee; text-align: center; }
        video { height: 80vh; max-width: 100%; background-color: #000; }
        .controls input { margin: 8px 4px; padding: 6px 12px; }
        a { color: #8cf; }
    </style>
</head>
<body>
    <h1>clipstream</h1>
    <video id="player" controls autoplay src="/play/"></video>
    <div class="controls">
        <input type="button" value="Prev10 (z)" onclick="play('prev10')">
        <input type="button" value="Prev (x)" onclick="play('prev')">
        <input type="button" value="Next (b)" onclick="play('next')">
        <input type="button" value="Skip10 (n)" onclick="play('next10')">
    </div>
    <div id="info"></div>
    <script>
        const origin = "{origin}";
        const keys = {
            b: 'next', 'и': 'next',
            n: 'next10', 'т': 'next10',
            x: 'prev', 'ч': 'prev',
            z: 'prev10', 'я': 'prev10',
        };

        function updateInfo() {
            fetch('/play/info')
                .then(r => r.ok ? r.json() : Promise.reject(r.status))
                .then(info => {
                    document.getElementById('info').innerHTML =
                        'Original clip: <a href="' + origin + info.path + '">' + origin + info.path + '</a><br>' +
                        'Original post: <a href="' + origin + 'res/' + info.thread + '.html#' + info.post + '">' +
                        origin + 'res/' + info.thread + '.html#' + info.post + '</a>';
                })
                .catch(() => { document.getElementById('info').textContent = 'No clips yet'; });
        }

        function play(command) {
            document.getElementById('player').src = '/play/' + command;
            setTimeout(updateInfo, 500);
        }

        function togglePause() {
            const player = document.getElementById('player');
            if (player.paused) { player.play(); } else { player.pause(); }
        }

        document.addEventListener('DOMContentLoaded', () => {
            setTimeout(updateInfo, 1500);
            document.getElementById('player').addEventListener('ended', () => play('next'));
            window.addEventListener('keypress', e => {
                const key = e.key.toLowerCase();
                if (keys[key]) { play(keys[key]); }
                if (key === 'c' || key === 'с' || key === ' ') { togglePause(); }
            });
        });
    </script>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::client::BoardClient;
    use crate::board::queue::{clip, ClipQueue};
    use crate::config::settings::test_config;
    use crate::player::cache::DiskCacheIndex;
    use crate::player::sessions::SessionStore;
    use crate::test_support::MockOrigin;
    use actix_web::http::header;
    use actix_web::test::{call_service, init_service, read_body, read_body_json, TestRequest};
    use actix_web::App;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn coordinator(
        base: &str,
        save: &std::path::Path,
        scratch: &std::path::Path,
    ) -> (PlaybackCoordinator, Arc<ClipQueue>, Arc<DiskCacheIndex>) {
        let config = test_config(base, save.to_str().unwrap());
        let client = BoardClient::new(&config).unwrap();
        let queue = Arc::new(ClipQueue::new());
        let cache = Arc::new(DiskCacheIndex::new(save));
        let player = PlaybackCoordinator::new(
            Arc::new(config),
            client,
            queue.clone(),
            Arc::new(SessionStore::new()),
            cache.clone(),
            scratch.to_path_buf(),
        );
        (player, queue, cache)
    }

    fn get_uri(uri: &str) -> TestRequest {
        TestRequest::get().uri(uri)
    }

    #[test]
    fn test_command_delta() {
        assert_eq!(command_delta(""), Some(0));
        assert_eq!(command_delta("next"), Some(1));
        assert_eq!(command_delta("prev"), Some(-1));
        assert_eq!(command_delta("next10"), Some(10));
        assert_eq!(command_delta("prev10"), Some(-10));
        assert_eq!(command_delta("rewind"), None);
    }

    #[actix_web::test]
    async fn test_info_sets_cookie_once() {
        let save = tempdir().unwrap();
        let scratch = tempdir().unwrap();
        let (player, queue, _) =
            coordinator("http://127.0.0.1:9/", save.path(), scratch.path());
        queue.push(clip("a.webm", "1")).await;

        let app = init_service(
            App::new()
                .app_data(web::Data::new(player))
                .service(clip_info)
                .service(play),
        )
        .await;

        let res = call_service(&app, get_uri("/play/info").to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
        let cookie = res
            .response()
            .cookies()
            .find(|c| c.name() == SESSION_COOKIE)
            .unwrap()
            .into_owned();
        let body: serde_json::Value = read_body_json(res).await;
        assert_eq!(body["name"], "a.webm");
        assert_eq!(body["thread"], "1");

        let req = TestRequest::get()
            .uri("/play/info")
            .cookie(cookie)
            .to_request();
        let res = call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.response().cookies().count(), 0);
    }

    #[actix_web::test]
    async fn test_empty_queue_is_unavailable() {
        let save = tempdir().unwrap();
        let scratch = tempdir().unwrap();
        let (player, _, _) =
            coordinator("http://127.0.0.1:9/", save.path(), scratch.path());
        let app = init_service(
            App::new()
                .app_data(web::Data::new(player))
                .service(clip_info)
                .service(play),
        )
        .await;

        let res = call_service(&app, get_uri("/play/next").to_request()).await;
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);

        let res = call_service(&app, get_uri("/play/sideways").to_request()).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_play_fills_then_serves_cached_with_headers() {
        let origin = MockOrigin::new();
        origin.set("/src/1/a.webm", 200, vec![3u8; 1000]);
        let base = origin.start().await;
        let save = tempdir().unwrap();
        let scratch = tempdir().unwrap();
        let (player, queue, cache) = coordinator(&base, save.path(), scratch.path());
        queue.push(clip("a.webm", "1")).await;

        let app = init_service(
            App::new()
                .app_data(web::Data::new(player))
                .service(clip_info)
                .service(play),
        )
        .await;

        let res = call_service(&app, get_uri("/play/").to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(read_body(res).await.len(), 1000);
        assert!(cache.lookup("a.webm").await.is_some());

        let res = call_service(&app, get_uri("/play/").to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
        let headers = res.headers();
        assert!(headers.contains_key(header::LAST_MODIFIED));
        assert!(headers.contains_key(header::EXPIRES));
        let cache_control = headers.get(header::CACHE_CONTROL).unwrap().to_str().unwrap();
        assert!(cache_control.contains("public"));
        assert!(cache_control.contains("max-age=31536000"));
        assert_eq!(read_body(res).await.len(), 1000);

        assert_eq!(origin.hits("/src/1/a.webm"), 1);
    }

    #[actix_web::test]
    async fn test_index_links_to_origin() {
        let config = test_config("http://board.test/b/", "/tmp");
        let app = init_service(
            App::new()
                .app_data(web::Data::new(config))
                .service(index),
        )
        .await;
        let res = call_service(&app, get_uri("/").to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = read_body(res).await;
        let html = std::str::from_utf8(&body).unwrap();
        assert!(html.contains(r#"const origin = "http://board.test/b/";"#));
    }
}
