//! In-process HTTP stubs for adapter tests.

use std::collections::HashMap;
use std::net::TcpListener as StdListener;
use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Map, Value};

/// Serve `router` on an ephemeral localhost port from a background thread.
///
/// Returns the base URL (`http://127.0.0.1:PORT`). The server lives until the
/// test process exits.
pub(crate) fn serve(router: axum::Router) -> String {
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("Should build runtime");
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                .await
                .expect("Should bind");
            let addr = listener.local_addr().expect("Should have address");
            tx.send(format!("http://{addr}")).expect("Should report address");
            axum::serve(listener, router).await.expect("Should serve");
        });
    });
    rx.recv().expect("Server should start")
}

/// A localhost URL nothing is listening on.
pub(crate) fn closed_url() -> String {
    let listener = StdListener::bind("127.0.0.1:0").expect("Should bind");
    let addr = listener.local_addr().expect("Should have address");
    drop(listener);
    format!("http://{addr}")
}

/// Sheet header row and the keys the web app reads/writes for each column.
const SHEET_COLUMNS: [(&str, &str); 19] = [
    ("ID", "id"),
    ("Full Name", "fullName"),
    ("Age", "age"),
    ("Gender", "gender"),
    ("Weight (kg)", "weight"),
    ("Height (m)", "height"),
    ("Glucose (mg/dL)", "glucose"),
    ("Triglycerides (mg/dL)", "triglycerides"),
    ("HDL (mg/dL)", "hdl"),
    ("HbA1c (%)", "hba1c"),
    ("Diabetes Status", "diabetes"),
    ("BMI", "bmi"),
    ("TyG Index", "tygIndex"),
    ("TG/HDL Ratio", "tgHdlRatio"),
    ("Risk Level", "riskLevel"),
    ("Risk Description", "riskDescription"),
    ("AI Recommendations", "aiRecommendations"),
    ("Created At", "createdAt"),
    ("Created By", "createdBy"),
];

type Sheet = Arc<Mutex<Vec<Vec<Value>>>>;

/// A running spreadsheet web-app stub and its backing rows.
pub(crate) struct SheetStub {
    pub url: String,
    pub rows: Sheet,
}

impl SheetStub {
    pub(crate) fn row_count(&self) -> usize {
        self.rows.lock().expect("sheet lock").len()
    }
}

fn error_reply(message: &str) -> Response {
    Json(json!({ "status": "error", "message": message })).into_response()
}

/// Build a sheet row the way the web app does: missing values become "",
/// numeric-looking ids are auto-typed as numbers.
fn to_sheet_row(data: &Map<String, Value>) -> Vec<Value> {
    SHEET_COLUMNS
        .iter()
        .map(|(_, key)| {
            match data.get(*key) {
                None | Some(Value::Null) => Value::String(String::new()),
                Some(Value::String(s)) if *key == "id" => s
                    .parse::<i64>()
                    .map_or_else(|_| Value::String(s.clone()), |n| Value::Number(n.into())),
                Some(v) => v.clone(),
            }
        })
        .collect()
}

async fn sheet_get(State(sheet): State<Sheet>, Query(params): Query<HashMap<String, String>>) -> Response {
    match params.get("action").map(String::as_str) {
        Some("test") => "Google Apps Script is working!".into_response(),
        Some("getPatients") => {
            let rows = sheet.lock().expect("sheet lock");
            let data: Vec<Value> = rows
                .iter()
                .map(|row| {
                    let object: Map<String, Value> = SHEET_COLUMNS
                        .iter()
                        .zip(row)
                        .map(|((_, key), v)| ((*key).to_string(), v.clone()))
                        .collect();
                    Value::Object(object)
                })
                .collect();
            Json(json!({ "status": "success", "data": data })).into_response()
        }
        _ => error_reply("Invalid action parameter"),
    }
}

async fn sheet_post(State(sheet): State<Sheet>, body: String) -> Response {
    let Ok(request) = serde_json::from_str::<Value>(&body) else {
        return error_reply("Unexpected token in JSON");
    };
    let mut rows = sheet.lock().expect("sheet lock");
    match (request["action"].as_str(), &request["data"]) {
        (Some("savePatient"), Value::Object(data)) => {
            rows.push(to_sheet_row(data));
            Json(json!({
                "status": "success",
                "message": "Patient record saved successfully",
                "rowNumber": rows.len() + 1,
            }))
            .into_response()
        }
        (Some("bulkSave"), Value::Array(items)) => {
            let mut count = 0;
            for item in items {
                if let Value::Object(data) = item {
                    rows.push(to_sheet_row(data));
                    count += 1;
                }
            }
            Json(json!({
                "status": "success",
                "message": format!("Successfully saved {count} patient records"),
                "count": count,
            }))
            .into_response()
        }
        _ => error_reply("Invalid action"),
    }
}

/// Start a stub of the spreadsheet web app.
pub(crate) fn sheet_stub() -> SheetStub {
    let rows: Sheet = Arc::new(Mutex::new(Vec::new()));
    let router = Router::new()
        .route("/exec", get(sheet_get).post(sheet_post))
        .with_state(Arc::clone(&rows));
    SheetStub {
        url: format!("{}/exec", serve(router)),
        rows,
    }
}

/// A stub whose every response is `status` with `body` (content type JSON).
pub(crate) fn fixed_reply_stub(status: StatusCode, body: &'static str) -> String {
    let reply = move || async move {
        (status, [("content-type", "application/json")], body).into_response()
    };
    let router = Router::new().route("/exec", get(reply).post(reply));
    format!("{}/exec", serve(router))
}
