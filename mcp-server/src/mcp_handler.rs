use anyhow::Result;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Write};
use std::sync::Arc;
use tracing::{info, warn};

use crate::use_cases::{BetUseCase, DrawUseCase, RemoteUseCase, StatsUseCase};

const PARSE_ERROR: i32 = -32700;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
const INTERNAL_ERROR: i32 = -32603;

/// One line of input. Requests without an `id` are notifications.
#[derive(Debug, serde::Deserialize)]
struct JsonRpcRequest {
    method: String,
    params: Option<Value>,
    id: Option<Value>,
}

#[derive(Debug, serde::Serialize)]
struct JsonRpcResponse {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
    id: Value,
}

#[derive(Debug, serde::Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl JsonRpcResponse {
    fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            result: Some(result),
            error: None,
            id,
        }
    }

    fn failure(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
            id,
        }
    }

    fn with_data(mut self, data: Value) -> Self {
        if let Some(error) = self.error.as_mut() {
            error.data = Some(data);
        }
        self
    }
}

#[derive(Debug, serde::Serialize)]
struct Tool {
    name: String,
    description: String,
    #[serde(rename = "inputSchema")]
    input_schema: Value,
}

pub struct MCPHandler {
    draw_use_case: Arc<DrawUseCase>,
    bet_use_case: Arc<BetUseCase>,
    stats_use_case: Arc<StatsUseCase>,
    remote_use_case: Arc<RemoteUseCase>,
}

fn write_response<W: Write>(writer: &mut W, response: &JsonRpcResponse) -> Result<()> {
    writeln!(writer, "{}", serde_json::to_string(response)?)?;
    writer.flush()?;
    Ok(())
}

impl MCPHandler {
    pub fn new(
        draw_use_case: Arc<DrawUseCase>,
        bet_use_case: Arc<BetUseCase>,
        stats_use_case: Arc<StatsUseCase>,
        remote_use_case: Arc<RemoteUseCase>,
    ) -> Self {
        Self {
            draw_use_case,
            bet_use_case,
            stats_use_case,
            remote_use_case,
        }
    }

    /// Answers one JSON-RPC request per input line until the reader is exhausted.
    pub async fn serve<R, W>(self, reader: R, mut writer: W) -> Result<()>
    where
        R: BufRead,
        W: Write,
    {
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let request = match serde_json::from_str::<JsonRpcRequest>(&line) {
                Ok(request) => request,
                Err(e) => {
                    warn!("✗ Unreadable request ({}): {}", e, line);
                    let response = JsonRpcResponse::failure(Value::Null, PARSE_ERROR, "Parse error")
                        .with_data(json!(e.to_string()));
                    write_response(&mut writer, &response)?;
                    continue;
                }
            };

            let Some(id) = request.id.clone() else {
                if request.method == "notifications/initialized" {
                    info!("🎰 Client initialized");
                }
                continue;
            };
            if request.method.starts_with("notifications/") {
                continue;
            }

            let response = self.handle_request(id, request).await;
            write_response(&mut writer, &response)?;
        }

        Ok(())
    }

    async fn handle_request(&self, id: Value, request: JsonRpcRequest) -> JsonRpcResponse {
        match request.method.as_str() {
            "initialize" => {
                info!("🎰 Initializing Mark Six stats server");
                JsonRpcResponse::success(
                    id,
                    json!({
                        "protocolVersion": "2024-11-05",
                        "capabilities": {
                            "tools": {}
                        },
                        "serverInfo": {
                            "name": "mark-stats-mcp-server",
                            "version": env!("CARGO_PKG_VERSION")
                        }
                    }),
                )
            }
            "tools/list" => JsonRpcResponse::success(id, json!({ "tools": self.get_tools() })),
            "tools/call" => self.handle_call_tool(id, request.params).await,
            other => JsonRpcResponse::failure(id, METHOD_NOT_FOUND, format!("Method not found: {}", other)),
        }
    }

    async fn handle_call_tool(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        let Some(params) = params else {
            return JsonRpcResponse::failure(id, INVALID_PARAMS, "Missing params");
        };
        let Some(tool_name) = params.get("name").and_then(|n| n.as_str()) else {
            return JsonRpcResponse::failure(id, INVALID_PARAMS, "Missing tool name");
        };

        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
        let arguments: HashMap<String, Value> = match serde_json::from_value(arguments) {
            Ok(map) => map,
            Err(e) => {
                return JsonRpcResponse::failure(id, INVALID_PARAMS, format!("Invalid arguments: {}", e));
            }
        };

        match self.execute_tool(tool_name, &arguments).await {
            Ok(content) => JsonRpcResponse::success(
                id,
                json!({
                    "content": [
                        {
                            "type": "text",
                            "text": content
                        }
                    ]
                }),
            ),
            Err(e) => {
                warn!("✗ {} failed: {:#}", tool_name, e);
                JsonRpcResponse::failure(id, INTERNAL_ERROR, format!("Tool execution error: {:#}", e))
            }
        }
    }

    async fn execute_tool(&self, tool_name: &str, arguments: &HashMap<String, Value>) -> Result<String> {
        match tool_name {
            "add_draw" => self.draw_use_case.add_draw(arguments).await,
            "list_draws" => self.draw_use_case.list_draws(arguments).await,
            "get_draw" => self.draw_use_case.get_draw(arguments).await,
            "update_draw" => self.draw_use_case.update_draw(arguments).await,
            "delete_draw" => self.draw_use_case.delete_draw(arguments).await,
            "next_period" => self.draw_use_case.next_period(arguments).await,
            "parse_and_insert_raw_json" => self.draw_use_case.parse_and_insert_raw_json(arguments).await,
            "export_all" => self.draw_use_case.export_all(arguments).await,
            "import_all" => self.draw_use_case.import_all(arguments).await,
            "add_bet" => self.bet_use_case.add_bet(arguments).await,
            "list_bets" => self.bet_use_case.list_bets(arguments).await,
            "update_bet" => self.bet_use_case.update_bet(arguments).await,
            "delete_bet" => self.bet_use_case.delete_bet(arguments).await,
            "get_setting" => self.bet_use_case.get_setting(arguments).await,
            "set_setting" => self.bet_use_case.set_setting(arguments).await,
            "number_stats" => self.stats_use_case.number_stats(arguments).await,
            "play_type_stats" => self.stats_use_case.play_type_stats(arguments).await,
            "number_bet_stats" => self.stats_use_case.number_bet_stats(arguments).await,
            "zodiac_stats" => self.stats_use_case.zodiac_stats(arguments).await,
            "color_stats" => self.stats_use_case.color_stats(arguments).await,
            "trend" => self.stats_use_case.trend(arguments).await,
            "period_stats" => self.stats_use_case.period_stats(arguments).await,
            "heatmap" => self.stats_use_case.heatmap(arguments).await,
            "number_attributes" => self.stats_use_case.number_attributes(arguments).await,
            "fetch_history" => self.remote_use_case.fetch_history(arguments).await,
            "fetch_latest" => self.remote_use_case.fetch_latest(arguments).await,
            _ => Err(anyhow::anyhow!("Unknown tool: {}", tool_name)),
        }
    }

    fn get_tools(&self) -> Vec<Tool> {
        let snapshot = json!({
            "type": "object",
            "properties": {
                "draw_limit": {
                    "type": "integer",
                    "description": "Most recent draws to include (default: 200)"
                },
                "bet_limit": {
                    "type": "integer",
                    "description": "Most recent bets to include (default: 1000)"
                },
                "settled_only": {
                    "type": "boolean",
                    "description": "Ignore bets without a recorded result"
                }
            }
        });

        vec![
            tool(
                "add_draw",
                "Store a draw with six regular numbers and a special number",
                json!({
                    "type": "object",
                    "properties": {
                        "period": {"type": "string", "description": "Period label, e.g. 2025-001"},
                        "open_time": {"type": "string", "description": "RFC 3339 or YYYY-MM-DD HH:MM:SS (UTC+8)"},
                        "numbers": {
                            "type": "array",
                            "items": {"type": "integer", "minimum": 1, "maximum": 49},
                            "minItems": 6,
                            "maxItems": 6
                        },
                        "special": {"type": "integer", "minimum": 1, "maximum": 49}
                    },
                    "required": ["period", "numbers", "special"]
                }),
            ),
            tool(
                "list_draws",
                "List the most recent draws, newest first",
                json!({
                    "type": "object",
                    "properties": {
                        "limit": {"type": "integer", "description": "Number of draws (default: 100)"}
                    }
                }),
            ),
            tool(
                "get_draw",
                "Get a draw and its bets by id or period",
                json!({
                    "type": "object",
                    "properties": {
                        "id": {"type": "string"},
                        "period": {"type": "string"}
                    }
                }),
            ),
            tool(
                "update_draw",
                "Change the period, open time or numbers of a stored draw",
                json!({
                    "type": "object",
                    "properties": {
                        "id": {"type": "string"},
                        "period": {"type": "string"},
                        "open_time": {"type": "string"},
                        "numbers": {"type": "array", "items": {"type": "integer"}},
                        "special": {"type": "integer"}
                    },
                    "required": ["id"]
                }),
            ),
            tool(
                "delete_draw",
                "Delete a draw together with every bet placed on it",
                json!({
                    "type": "object",
                    "properties": {"id": {"type": "string"}},
                    "required": ["id"]
                }),
            ),
            tool(
                "next_period",
                "Period label expected for the next draw",
                json!({"type": "object", "properties": {}}),
            ),
            tool(
                "parse_and_insert_raw_json",
                "Merge a backup bundle, history response or feed item list into the store",
                json!({
                    "type": "object",
                    "properties": {
                        "raw_json": {"type": "string", "description": "Raw JSON document"}
                    },
                    "required": ["raw_json"]
                }),
            ),
            tool(
                "export_all",
                "Export every draw, bet and setting as a backup bundle",
                json!({"type": "object", "properties": {}}),
            ),
            tool(
                "import_all",
                "Replace the whole store with a backup bundle",
                json!({
                    "type": "object",
                    "properties": {"data": {"type": "object"}},
                    "required": ["data"]
                }),
            ),
            tool(
                "add_bet",
                "Record a bet on a draw",
                json!({
                    "type": "object",
                    "properties": {
                        "draw_id": {"type": "string"},
                        "play_type": {
                            "type": "string",
                            "enum": ["TE_MA", "ZHENG_MA", "LIAN_MA", "SE_BO", "SHENG_XIAO", "HE_DAN_SHUANG", "HE_DA_XIAO", "WEI_DA_XIAO"]
                        },
                        "selection": {"description": "Numbers, colors, zodiacs or a parity/size word for the play type"},
                        "stake": {"type": "number"},
                        "odds": {"type": "number"},
                        "result": {"type": "number", "description": "Net win or loss once settled"}
                    },
                    "required": ["draw_id", "play_type", "selection", "stake", "odds"]
                }),
            ),
            tool(
                "list_bets",
                "List bets by draw, by play type, or the most recent ones",
                json!({
                    "type": "object",
                    "properties": {
                        "draw_id": {"type": "string"},
                        "play_type": {"type": "string"},
                        "limit": {"type": "integer", "description": "Number of bets (default: 200)"}
                    }
                }),
            ),
            tool(
                "update_bet",
                "Change fields of a stored bet; pass result null to unsettle it",
                json!({
                    "type": "object",
                    "properties": {
                        "id": {"type": "string"},
                        "draw_id": {"type": "string"},
                        "play_type": {"type": "string"},
                        "selection": {},
                        "stake": {"type": "number"},
                        "odds": {"type": "number"},
                        "result": {"type": ["number", "null"]}
                    },
                    "required": ["id"]
                }),
            ),
            tool(
                "delete_bet",
                "Delete a bet",
                json!({
                    "type": "object",
                    "properties": {"id": {"type": "string"}},
                    "required": ["id"]
                }),
            ),
            tool(
                "get_setting",
                "Read a stored setting",
                json!({
                    "type": "object",
                    "properties": {"key": {"type": "string"}},
                    "required": ["key"]
                }),
            ),
            tool(
                "set_setting",
                "Store a setting value (any JSON)",
                json!({
                    "type": "object",
                    "properties": {"key": {"type": "string"}, "value": {}},
                    "required": ["key", "value"]
                }),
            ),
            tool("number_stats", "Frequency and gap statistics for numbers 1-49", snapshot.clone()),
            tool("play_type_stats", "Stake, result and hit rate per play type", snapshot.clone()),
            tool("number_bet_stats", "Stake and result attributed to each number", snapshot.clone()),
            tool("zodiac_stats", "Bet results split across zodiac signs", snapshot.clone()),
            tool("color_stats", "Bet results split across wave colors", snapshot.clone()),
            tool("trend", "Per-period results with a running total, oldest first", snapshot.clone()),
            tool("period_stats", "Per-period bet totals, newest first", snapshot.clone()),
            tool(
                "heatmap",
                "Appearance counts per number over consecutive windows of draws",
                json!({
                    "type": "object",
                    "properties": {
                        "draw_limit": {"type": "integer"},
                        "window": {"type": "integer", "description": "Draws per row (default: 20)"}
                    }
                }),
            ),
            tool(
                "number_attributes",
                "Zodiac, color, size, parity and sum attributes of a number",
                json!({
                    "type": "object",
                    "properties": {"number": {"type": "integer", "minimum": 1, "maximum": 49}},
                    "required": ["number"]
                }),
            ),
            tool(
                "fetch_history",
                "Fetch draw history for the given years and store new periods",
                json!({
                    "type": "object",
                    "properties": {
                        "years": {"type": "array", "items": {"type": "string"}}
                    },
                    "required": ["years"]
                }),
            ),
            tool(
                "fetch_latest",
                "Fetch the latest draw from the feed",
                json!({
                    "type": "object",
                    "properties": {
                        "live": {"type": "boolean", "description": "Use the live feed"},
                        "save": {"type": "boolean", "description": "Store the draw (default: true)"}
                    }
                }),
            ),
        ]
    }
}

fn tool(name: &str, description: &str, input_schema: Value) -> Tool {
    Tool {
        name: name.to_string(),
        description: description.to_string(),
        input_schema,
    }
}

pub fn stdio() -> (BufReader<io::Stdin>, io::Stdout) {
    (BufReader::new(io::stdin()), io::stdout())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::in_memory;
    use mark_stats::config::Config;
    use std::io::Cursor;

    fn handler() -> MCPHandler {
        let conn = Arc::new(in_memory().unwrap());
        MCPHandler::new(
            Arc::new(DrawUseCase::new(Arc::clone(&conn))),
            Arc::new(BetUseCase::new(Arc::clone(&conn))),
            Arc::new(StatsUseCase::new(Arc::clone(&conn))),
            Arc::new(RemoteUseCase::new(Arc::clone(&conn), Config::default())),
        )
    }

    async fn run(requests: &[Value]) -> Vec<Value> {
        let input: String = requests.iter().map(|r| format!("{}\n", r)).collect();
        let mut output = Vec::new();
        handler().serve(Cursor::new(input), &mut output).await.unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    fn call(id: i64, name: &str, arguments: Value) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/call",
            "params": {"name": name, "arguments": arguments}
        })
    }

    fn text(response: &Value) -> Value {
        let text = response["result"]["content"][0]["text"].as_str().unwrap();
        serde_json::from_str(text).unwrap()
    }

    #[tokio::test]
    async fn test_initialize_and_list_tools() {
        let responses = run(&[
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"}),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
        ])
        .await;

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["result"]["serverInfo"]["name"], "mark-stats-mcp-server");
        let tools = responses[1]["result"]["tools"].as_array().unwrap();
        assert!(tools.iter().any(|t| t["name"] == "zodiac_stats"));
        assert!(tools.iter().all(|t| t["inputSchema"]["type"] == "object"));
    }

    #[tokio::test]
    async fn test_protocol_errors() {
        let input = "{not json\n\n{\"jsonrpc\":\"2.0\",\"id\":3,\"method\":\"resources/list\"}\n";
        let mut output = Vec::new();
        handler().serve(Cursor::new(input), &mut output).await.unwrap();
        let responses: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(responses[0]["error"]["code"], -32700);
        assert!(responses[0]["id"].is_null());
        assert!(responses[0]["error"]["data"].is_string());
        assert_eq!(responses[0]["jsonrpc"], "2.0");
        assert_eq!(responses[1]["error"]["code"], -32601);
        assert_eq!(responses[1]["id"], 3);

        let responses = run(&[
            json!({"jsonrpc": "2.0", "id": 4, "method": "tools/call"}),
            call(5, "no_such_tool", json!({})),
            call(6, "add_bet", json!({"draw_id": "d1", "play_type": "MIXED_BET", "selection": [1], "stake": 10, "odds": 2})),
        ])
        .await;
        assert_eq!(responses[0]["error"]["code"], -32602);
        assert_eq!(responses[0]["id"], 4);
        assert_eq!(responses[1]["error"]["code"], -32603);
        assert_eq!(responses[2]["error"]["code"], -32603);
    }

    #[tokio::test]
    async fn test_add_and_list_draws() {
        let responses = run(&[
            call(
                1,
                "add_draw",
                json!({"period": "2025-001", "open_time": "2025-01-01 21:30:00", "numbers": [1, 13, 25, 2, 3, 4], "special": 37}),
            ),
            call(2, "list_draws", json!({})),
        ])
        .await;
        let added = text(&responses[0]);
        assert_eq!(added["success"], true);
        let draws = text(&responses[1]);
        assert_eq!(draws["draws"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_bet_flow_over_one_session() {
        let conn = Arc::new(in_memory().unwrap());
        let handler = MCPHandler::new(
            Arc::new(DrawUseCase::new(Arc::clone(&conn))),
            Arc::new(BetUseCase::new(Arc::clone(&conn))),
            Arc::new(StatsUseCase::new(Arc::clone(&conn))),
            Arc::new(RemoteUseCase::new(Arc::clone(&conn), Config::default())),
        );

        let draw = mark_stats::Draw::with_id(
            "d1",
            "2025-001",
            chrono::Utc::now(),
            [6, 13, 25, 2, 3, 4],
            37,
        )
        .unwrap();
        mark_stats::database::add_draw(&conn, &draw).unwrap();

        let requests = [
            call(
                1,
                "add_bet",
                json!({"draw_id": "d1", "play_type": "SHENG_XIAO", "selection": ["鼠", "牛"], "stake": 100, "odds": 1.9, "result": 90}),
            ),
            call(2, "zodiac_stats", json!({})),
            call(3, "play_type_stats", json!({"settled_only": true})),
            call(4, "get_draw", json!({"period": "2025-001"})),
            call(5, "next_period", json!({})),
        ];
        let input: String = requests.iter().map(|r| format!("{}\n", r)).collect();
        let mut output = Vec::new();
        handler.serve(Cursor::new(input), &mut output).await.unwrap();
        let responses: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(text(&responses[0])["success"], true);

        let zodiac = text(&responses[1]);
        let rat = &zodiac["stats"]["Rat"];
        assert_eq!(rat["total_bets"], 1);
        assert_eq!(rat["hits"], 1);
        assert_eq!(rat["total_stake"], 50.0);
        assert_eq!(zodiac["stats"]["Ox"]["hits"], 0);
        assert_eq!(zodiac["stats"]["Ox"]["total_result"], -50.0);

        let play_types = text(&responses[2]);
        assert_eq!(play_types["stats"][0]["play_type"], "SHENG_XIAO");

        let detail = text(&responses[3]);
        assert_eq!(detail["draw"]["period"], "2025-001");
        assert_eq!(detail["bets"].as_array().unwrap().len(), 1);

        assert_eq!(text(&responses[4])["period"], "2025-002");
    }

    #[tokio::test]
    async fn test_settings_and_backup_round_trip() {
        let responses = run(&[
            call(1, "set_setting", json!({"key": "default_odds", "value": {"TE_MA": 47}})),
            call(2, "get_setting", json!({"key": "default_odds"})),
            call(3, "add_draw", json!({"period": "2025-010", "numbers": [1, 2, 3, 4, 5, 6], "special": 7})),
            call(4, "export_all", json!({})),
            call(5, "get_setting", json!({"key": "missing"})),
        ])
        .await;

        assert_eq!(text(&responses[1])["value"]["TE_MA"], 47);
        let backup = text(&responses[3]);
        assert_eq!(backup["draws"].as_array().unwrap().len(), 1);
        assert_eq!(backup["version"], "1.0.0");
        assert!(text(&responses[4])["value"].is_null());

        let responses = run(&[
            call(1, "import_all", json!({"data": backup})),
            call(2, "list_draws", json!({})),
            call(3, "get_setting", json!({"key": "default_odds"})),
        ])
        .await;
        assert_eq!(text(&responses[0])["draws"], 1);
        assert_eq!(text(&responses[1])["draws"][0]["period"], "2025-010");
        assert_eq!(text(&responses[2])["value"]["TE_MA"], 47);
    }
}
