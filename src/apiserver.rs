// apiserver.rs

use core::fmt::Write;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{Response, StatusCode, header},
    response::IntoResponse,
    routing::*,
};
pub use axum_macros::debug_handler;

use crate::*;

/// Largest JSON document the endpoint will produce.
pub const METRICS_BUF_SIZE: usize = 256;

pub fn router(state: Arc<Pin<Box<MyState>>>) -> Router {
    Router::new()
        .route("/metrics", get(get_metrics))
        .with_state(state)
}

pub async fn run_api_server(state: Arc<Pin<Box<MyState>>>) -> anyhow::Result<()> {
    loop {
        if *state.wifi_up.read().await {
            break;
        }
        sleep(Duration::from_secs(1)).await;
    }

    let listen = format!("0.0.0.0:{}", state.config.port);
    let addr = listen.parse::<net::SocketAddr>()?;

    let app = router(state.clone());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(
        "API server listening to {listen}, GET http://{}:{}/metrics for data",
        *state.ip_addr.read().await,
        state.config.port
    );
    Ok(axum::serve(listener, app.into_make_service()).await?)
}

/// Fixed-layout JSON of one snapshot, refusing to truncate when `N` is too small.
pub fn format_metrics<const N: usize>(
    m: &MetricsSnapshot,
) -> Result<heapless::String<N>, MetricsError> {
    let mut buf = heapless::String::<N>::new();
    write!(
        buf,
        "{{\"co2_ppm\":{:.1},\"temperature_c\":{:.2},\"humidity_rh\":{:.2},\
         \"voc_index\":{},\"nox_index\":{},\"pressure_hpa\":{:.2}}}",
        m.co2_ppm, m.temperature_c, m.humidity_rh, m.voc_index, m.nox_index, m.pressure_hpa
    )
    .map_err(|_| MetricsError::SerializationOverflow)?;
    Ok(buf)
}

#[debug_handler]
pub async fn get_metrics(State(state): State<Arc<Pin<Box<MyState>>>>) -> Response<Body> {
    let cnt = state.api_cnt.fetch_add(1, Ordering::Relaxed);
    info!("#{cnt} get_metrics()");

    let body = state
        .cache
        .fetch()
        .await
        .and_then(|m| format_metrics::<METRICS_BUF_SIZE>(&m));

    match body {
        Ok(json) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            json.as_str().to_owned(),
        )
            .into_response(),
        Err(e) => {
            error!("#{cnt} get_metrics() failed: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;

    const ZERO_JSON: &str = r#"{"co2_ppm":0.0,"temperature_c":0.00,"humidity_rh":0.00,"voc_index":0,"nox_index":0,"pressure_hpa":0.00}"#;

    fn new_state() -> Arc<Pin<Box<MyState>>> {
        Arc::new(Box::pin(MyState::new(MyConfig::default())))
    }

    async fn call(state: Arc<Pin<Box<MyState>>>) -> (StatusCode, Option<String>, String) {
        let req = Request::get("/metrics").body(Body::empty()).unwrap();
        let resp = router(state).oneshot(req).await.unwrap();
        let status = resp.status();
        let ctype = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, ctype, String::from_utf8(body.to_vec()).unwrap())
    }

    fn sample() -> MetricsSnapshot {
        MetricsSnapshot {
            co2_ppm: 612.0,
            temperature_c: 23.456,
            humidity_rh: 41.2,
            voc_index: 100,
            nox_index: 1,
            pressure_hpa: 1013.25,
        }
    }

    #[test]
    fn json_layout_is_fixed() {
        let json = format_metrics::<METRICS_BUF_SIZE>(&sample()).unwrap();
        assert_eq!(
            json.as_str(),
            r#"{"co2_ppm":612.0,"temperature_c":23.46,"humidity_rh":41.20,"voc_index":100,"nox_index":1,"pressure_hpa":1013.25}"#
        );
    }

    #[test]
    fn json_parses_back_at_stated_precision() {
        let snapshots = [
            MetricsSnapshot::default(),
            sample(),
            MetricsSnapshot {
                co2_ppm: 40000.0,
                temperature_c: -45.0,
                humidity_rh: 100.0,
                voc_index: u16::MAX,
                nox_index: 500,
                pressure_hpa: -1.0,
            },
            MetricsSnapshot {
                co2_ppm: 415.0,
                temperature_c: -3.337,
                humidity_rh: 0.004,
                voc_index: 1,
                nox_index: 0,
                pressure_hpa: 260.5,
            },
        ];

        for m in snapshots {
            let json = format_metrics::<METRICS_BUF_SIZE>(&m).unwrap();
            let v: serde_json::Value = serde_json::from_str(&json).unwrap();

            let close = |key: &str, want: f32, step: f64| {
                let got = v[key].as_f64().unwrap();
                assert!(
                    (got - f64::from(want)).abs() <= step / 2.0 + 1e-4,
                    "{key}: {got} vs {want}"
                );
            };
            close("co2_ppm", m.co2_ppm, 0.1);
            close("temperature_c", m.temperature_c, 0.01);
            close("humidity_rh", m.humidity_rh, 0.01);
            close("pressure_hpa", m.pressure_hpa, 0.01);
            assert_eq!(v["voc_index"].as_u64(), Some(u64::from(m.voc_index)));
            assert_eq!(v["nox_index"].as_u64(), Some(u64::from(m.nox_index)));
        }
    }

    #[test]
    fn small_buffer_overflows_instead_of_truncating() {
        assert_eq!(
            format_metrics::<16>(&sample()),
            Err(MetricsError::SerializationOverflow)
        );
    }

    #[tokio::test]
    async fn initial_metrics_are_zero() {
        let (status, ctype, body) = call(new_state()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ctype.as_deref(), Some("application/json"));
        assert_eq!(body, ZERO_JSON);
    }

    #[tokio::test]
    async fn serves_latest_snapshot() {
        let state = new_state();
        state.cache.publish(sample()).await;

        let (status, _, body) = call(state.clone()).await;
        assert_eq!(status, StatusCode::OK);
        let v: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(v["voc_index"], 100);
        assert_eq!(v["pressure_hpa"].as_f64(), Some(1013.25));
        assert_eq!(state.api_cnt.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn held_lock_gives_server_error() {
        let state = new_state();
        let guard = state.cache.hold().await;

        let (status, ctype, body) = call(state.clone()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_ne!(ctype.as_deref(), Some("application/json"));
        assert_eq!(body, "metrics locked");
        drop(guard);
    }

    #[tokio::test]
    async fn oversized_snapshot_gives_server_error() {
        let state = new_state();
        state
            .cache
            .publish(MetricsSnapshot {
                co2_ppm: f32::MAX,
                temperature_c: f32::MAX,
                humidity_rh: f32::MAX,
                voc_index: u16::MAX,
                nox_index: u16::MAX,
                pressure_hpa: f32::MAX,
            })
            .await;

        let (status, _, body) = call(state).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "metrics buffer overflow");
    }
}

// EOF
