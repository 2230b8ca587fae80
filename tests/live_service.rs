use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use lane_console::console::LiveMonitor;
use lane_console::lane::Point;
use lane_console::roi::http::HttpRoiClient;
use lane_console::roi::{CommitOutcome, RoiClient, RoiError, RoiSession};
use lane_console::stream::websocket::ConnectionManager;
use lane_console::stream::{ConnectionEvent, EventFeed, StreamPayload};
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const JPEG_STUB: [u8; 4] = [0xff, 0xd8, 0xff, 0xd9];

type Saved = Arc<Mutex<Vec<(u8, Vec<[f64; 2]>)>>>;

async fn spawn_service(app: Router) -> Result<SocketAddr, std::io::Error> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(addr)
}

fn png_frame(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    image::RgbImage::new(width, height)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .expect("encode png");
    bytes
}

async fn get_frame() -> Response {
    ([(header::CONTENT_TYPE, "image/png")], png_frame(640, 480)).into_response()
}

async fn missing_frame() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"message": "Video file not found."})),
    )
        .into_response()
}

async fn save_roi(
    Path(lane_id): Path<u8>,
    State(saved): State<Saved>,
    Json(points): Json<Vec<[f64; 2]>>,
) -> StatusCode {
    if points.len() != 4 || !(1..=4).contains(&lane_id) {
        return StatusCode::UNPROCESSABLE_ENTITY;
    }
    saved.lock().expect("saved lock").push((lane_id, points));
    StatusCode::OK
}

async fn stream(ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(stream_lanes)
}

async fn stream_lanes(mut socket: WebSocket) {
    let metadata = serde_json::json!({
        "lane_id": 2,
        "vehicle_counts": {"car": 5, "motorcycle": 0, "bus": 0, "truck": 0, "bicycle": 0},
        "green_time": 12,
        "detections": [{"x1": 10, "y1": 20, "x2": 50, "y2": 60}],
        "roi": [[10, 10], [100, 10], [100, 100], [10, 100]],
        "latitude": 28.705,
        "longitude": 77.103,
        "recommendation": "Fast Lane - Cars Only"
    });
    let _ = socket.send(Message::Text(metadata.to_string().into())).await;
    let _ = socket.send(Message::Binary(JPEG_STUB.to_vec().into())).await;
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: 1008,
            reason: Utf8Bytes::from_static("demo over"),
        })))
        .await;
}

fn service(saved: Saved) -> Router {
    Router::new()
        .route("/get-frame", get(get_frame))
        .route("/roi/{lane_id}", post(save_roi))
        .route("/ws", get(stream))
        .with_state(saved)
}

#[tokio::test]
async fn websocket_events_arrive_tagged_and_in_order() -> Result<(), Box<dyn std::error::Error>> {
    let addr = spawn_service(service(Saved::default())).await?;
    let mut connection = ConnectionManager::new(format!("ws://{addr}/ws"));
    connection.connect()?;

    let mut events = Vec::new();
    while let Some(event) =
        tokio::time::timeout(Duration::from_secs(5), connection.next_event()).await?
    {
        events.push(event);
    }
    connection.close().await;

    assert_eq!(events.len(), 4);
    assert_eq!(events[0], ConnectionEvent::Opened);
    assert!(matches!(
        &events[1],
        ConnectionEvent::MessageReceived(StreamPayload::Text(text))
            if text.contains("\"lane_id\":2")
    ));
    assert_eq!(
        events[2],
        ConnectionEvent::MessageReceived(StreamPayload::Binary(JPEG_STUB.to_vec()))
    );
    assert_eq!(events[3], ConnectionEvent::Closed("demo over (1008)".to_string()));
    Ok(())
}

#[tokio::test]
async fn websocket_stream_feeds_the_store() -> Result<(), Box<dyn std::error::Error>> {
    let addr = spawn_service(service(Saved::default())).await?;
    let mut connection = ConnectionManager::new(format!("ws://{addr}/ws"));
    connection.connect()?;
    let mut monitor = LiveMonitor::new();

    while let Some(event) =
        tokio::time::timeout(Duration::from_secs(5), connection.next_event()).await?
    {
        monitor.handle_event(event);
    }
    connection.close().await;

    let lane = monitor.store().lane(2).ok_or("lane 2 missing")?;
    assert_eq!(lane.vehicle_counts.get("car"), Some(&5));
    assert_eq!(lane.total_vehicles(), 5);
    assert_eq!(lane.green_time, 12.0);
    assert_eq!(lane.frame.as_deref(), Some(&JPEG_STUB[..]));
    assert_eq!(lane.detections.len(), 1);
    assert_eq!(lane.roi.map(|quad| quad[1]), Some(Point::new(100.0, 10.0)));
    assert_eq!(lane.recommendation.as_deref(), Some("Fast Lane - Cars Only"));
    assert_eq!(monitor.store().active_lane(), Some(2));
    assert!(monitor.store().board().is_stale());
    Ok(())
}

#[tokio::test]
async fn http_client_maps_all_four_lanes() -> Result<(), Box<dyn std::error::Error>> {
    let saved = Saved::default();
    let addr = spawn_service(service(Arc::clone(&saved))).await?;
    let client = HttpRoiClient::new(format!("http://{addr}"), Duration::from_secs(5))?;
    let mut session = RoiSession::new();

    session.load(&client).await?;
    assert_eq!(session.reference().map(|r| (r.width(), r.height())), Some((640, 480)));

    let mut last = CommitOutcome::Ignored;
    for _ in 0..4 {
        for (x, y) in [(10.0, 10.0), (100.0, 10.0), (100.0, 100.0), (10.0, 100.0)] {
            assert!(session.click(x, y));
        }
        last = session.commit(&client).await?;
    }

    assert_eq!(last, CommitOutcome::Configured);
    let saved = saved.lock().map_err(|_| "saved lock poisoned")?.clone();
    assert_eq!(saved.iter().map(|(lane, _)| *lane).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
    assert_eq!(
        saved[0].1,
        vec![[10.0, 10.0], [100.0, 10.0], [100.0, 100.0], [10.0, 100.0]]
    );
    Ok(())
}

#[tokio::test]
async fn http_client_surfaces_service_error_message() -> Result<(), Box<dyn std::error::Error>> {
    let app = Router::new().route("/get-frame", get(missing_frame));
    let addr = spawn_service(app).await?;
    let client = HttpRoiClient::new(format!("http://{addr}"), Duration::from_secs(5))?;

    let result = client.fetch_reference_frame().await;

    assert_eq!(result, Err(RoiError::Fetch("Video file not found.".to_string())));
    Ok(())
}

#[tokio::test]
async fn http_client_reports_rejected_commit() -> Result<(), Box<dyn std::error::Error>> {
    let addr = spawn_service(service(Saved::default())).await?;
    let client = HttpRoiClient::new(format!("http://{addr}"), Duration::from_secs(5))?;
    let request = lane_console::roi::CommitRequest {
        lane: 9,
        points: [Point::new(1.0, 1.0); 4],
    };

    let result = client.commit_roi(request).await;

    assert!(matches!(
        result,
        Err(RoiError::Commit { lane: 9, ref reason }) if reason.starts_with("http status 422")
    ));
    Ok(())
}
