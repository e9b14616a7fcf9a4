//! Mock PHD2 server for testing
//!
//! A simple mock PHD2 server that answers the JSON-RPC methods this
//! client uses and emits a Version event on connect. Guide and dither
//! requests are followed by a scripted Settling / SettleDone sequence.
//!
//! Usage:
//!   mock_phd2 [--port PORT]
//!
//! The port can also be set via the MOCK_PHD2_PORT environment variable.
//! Command line argument takes precedence over environment variable.
//! Default port is 4400 (same as PHD2).

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};

fn main() {
    // Port priority: command line arg > environment variable > default (4400)
    let port = std::env::args()
        .nth(2)
        .and_then(|s| s.parse().ok())
        .or_else(|| {
            std::env::var("MOCK_PHD2_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
        })
        .unwrap_or(4400u16);

    let listener = match TcpListener::bind(format!("127.0.0.1:{}", port)) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to bind to port {}: {}", port, e);
            std::process::exit(1);
        }
    };

    eprintln!("Mock PHD2 listening on port {}", port);

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                std::thread::spawn(move || {
                    handle_client(stream);
                });
            }
            Err(e) => {
                eprintln!("Accept error: {}", e);
            }
        }
    }
}

fn handle_client(mut stream: TcpStream) {
    stream
        .set_write_timeout(Some(std::time::Duration::from_secs(5)))
        .ok();

    // Send Version and AppState events on connect, like PHD2 does
    let greeting = [
        r#"{"Event":"Version","PHDVersion":"2.6.11-mock","PHDSubver":"test","MsgVersion":1}"#,
        r#"{"Event":"AppState","State":"Stopped"}"#,
    ];
    for line in greeting {
        if writeln!(stream, "{}", line).is_err() {
            return;
        }
    }
    if stream.flush().is_err() {
        return;
    }

    let reader = BufReader::new(stream.try_clone().unwrap());

    for line in reader.lines() {
        match line {
            Ok(request) => {
                if request.is_empty() {
                    continue;
                }

                eprintln!("Received: {}", request);

                for response in handle_request(&request) {
                    eprintln!("Sending: {}", response);
                    if writeln!(stream, "{}", response).is_err() {
                        return;
                    }
                }
                if stream.flush().is_err() {
                    return;
                }
            }
            Err(_) => {
                break;
            }
        }
    }

    eprintln!("Client disconnected");
}

fn handle_request(request: &str) -> Vec<String> {
    let req: serde_json::Value = match serde_json::from_str(request) {
        Ok(v) => v,
        Err(_) => {
            return vec![
                r#"{"jsonrpc":"2.0","error":{"code":-32700,"message":"Parse error"},"id":null}"#
                    .to_string(),
            ];
        }
    };

    let id = req.get("id").cloned().unwrap_or(serde_json::Value::Null);
    let method = req.get("method").and_then(|m| m.as_str()).unwrap_or("");

    let mut follow_up = Vec::new();
    let result = match method {
        "get_profiles" => serde_json::json!([
            {"id": 1, "name": "Simulator"},
            {"id": 2, "name": "Main Rig"}
        ]),
        "set_profile" => serde_json::json!(0),
        "set_connected" => serde_json::json!(0),
        "get_pixel_scale" => serde_json::json!(1.21),
        "get_settling" => serde_json::json!(false),
        "get_paused" => serde_json::json!(false),
        "set_paused" => serde_json::json!(0),
        "loop" => serde_json::json!(0),
        "stop_capture" => serde_json::json!(0),
        "guide" | "dither" => {
            // A short settle sequence follows the acknowledgement
            follow_up.push(r#"{"Event":"SettleBegin"}"#.to_string());
            follow_up.push(
                r#"{"Event":"Settling","Distance":2.1,"Time":1.0,"SettleTime":10.0,"StarLocked":true}"#
                    .to_string(),
            );
            follow_up.push(r#"{"Event":"SettleDone","Status":0}"#.to_string());
            serde_json::json!(0)
        }
        _ => {
            return vec![format!(
                r#"{{"jsonrpc":"2.0","error":{{"code":-32601,"message":"Method not found: {}"}},"id":{}}}"#,
                method, id
            )];
        }
    };

    let mut lines = vec![format!(
        r#"{{"jsonrpc":"2.0","result":{},"id":{}}}"#,
        result, id
    )];
    lines.extend(follow_up);
    lines
}
