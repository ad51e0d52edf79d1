use std::{
    collections::VecDeque,
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use matlab_repl_core::{
    ops::{breakpoints, execution, inspect},
    types::SessionMode,
    ReplConfig, ReplError, ReplSession, SessionEvent,
};
use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters, ServerHandler},
    model::*,
    tool, tool_handler, tool_router, transport, ErrorData as McpError, ServiceExt,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{
    sync::{broadcast, Mutex},
    time::timeout,
};
use tracing_subscriber::EnvFilter;

const MAX_RECENT_EVENTS: usize = 1024;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct ReplLaunchParams {
    /// Script to run, e.g. /work/project/main.m
    program: String,
    #[serde(default)]
    stop_on_entry: bool,
    #[serde(default)]
    executable: Option<String>,
    #[serde(default)]
    license_path: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct ReplSetBreakpointsParams {
    source_path: String,
    lines: Vec<u32>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct ReplClearBreakpointsParams {
    /// Clears every breakpoint when omitted.
    #[serde(default)]
    source_path: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct ReplBreakpointStatusParams {
    source_path: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct ReplContinueParams {}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct ReplStepParams {}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct ReplStackTraceParams {}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct ReplEvaluateParams {
    /// Single-line expression, executed verbatim.
    expression: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct ReplStatusParams {}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct ReplEventsParams {
    #[serde(default)]
    since_seq: u64,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct ReplTerminateParams {}

struct ActiveRepl {
    session: ReplSession,
    program: String,
}

struct SessionManager {
    config: ReplConfig,
    active: Option<ActiveRepl>,
}

impl SessionManager {
    fn new(config: ReplConfig) -> Self {
        Self {
            config,
            active: None,
        }
    }
}

#[derive(Clone)]
struct MatlabDebugMcpServer {
    tool_router: ToolRouter<Self>,
    session: Arc<Mutex<SessionManager>>,
    recent_events: Arc<Mutex<VecDeque<(u64, SessionEvent)>>>,
    next_event_seq: Arc<AtomicU64>,
}

async fn event_pump(
    mut rx: broadcast::Receiver<SessionEvent>,
    recent_events: Arc<Mutex<VecDeque<(u64, SessionEvent)>>>,
    next_event_seq: Arc<AtomicU64>,
) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                let seq = next_event_seq.fetch_add(1, Ordering::SeqCst);
                let mut events = recent_events.lock().await;
                push_recent_event(&mut events, seq, event);
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Session event listener lagged; events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn push_recent_event(events: &mut VecDeque<(u64, SessionEvent)>, seq: u64, event: SessionEvent) {
    events.push_back((seq, event));
    while events.len() > MAX_RECENT_EVENTS {
        events.pop_front();
    }
}

fn events_since(events: &VecDeque<(u64, SessionEvent)>, since_seq: u64) -> Vec<Value> {
    events
        .iter()
        .filter(|(seq, _)| *seq >= since_seq)
        .map(|(seq, event)| json!({ "seq": seq, "event": event }))
        .collect()
}

fn to_mcp_error(message: impl Into<String>) -> McpError {
    McpError::internal_error(message.into(), None)
}

fn repl_error(tool_name: &str, error: ReplError) -> McpError {
    match error {
        ReplError::WrongMode { .. } => to_mcp_error(format!(
            "{tool_name} requires the REPL to be paused (K>> prompt): {error}"
        )),
        other => to_mcp_error(format!("{tool_name} failed: {other}")),
    }
}

fn no_session_error(tool_name: &str) -> McpError {
    to_mcp_error(format!(
        "{tool_name} requires a running REPL session. Call repl_launch first."
    ))
}

/// Bounds one core operation. The core never times out on its own.
async fn with_timeout<T, F>(tool_name: &str, limit: Duration, operation: F) -> Result<T, McpError>
where
    F: Future<Output = matlab_repl_core::Result<T>>,
{
    match timeout(limit, operation).await {
        Ok(result) => result.map_err(|e| repl_error(tool_name, e)),
        Err(_) => Err(to_mcp_error(format!(
            "{tool_name} timed out after {} ms waiting for the REPL prompt",
            limit.as_millis()
        ))),
    }
}

fn mode_state(mode: SessionMode) -> &'static str {
    if mode.is_paused() {
        "paused"
    } else {
        "idle"
    }
}

#[tool_router]
impl MatlabDebugMcpServer {
    fn new(config: ReplConfig) -> Self {
        Self {
            tool_router: Self::tool_router(),
            session: Arc::new(Mutex::new(SessionManager::new(config))),
            recent_events: Arc::new(Mutex::new(VecDeque::new())),
            next_event_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Clones the live session out of the manager so the lock is not held
    /// while a command is in flight.
    async fn active_session(
        &self,
        tool_name: &str,
    ) -> Result<(ReplSession, String, Duration), McpError> {
        let manager = self.session.lock().await;
        match manager.active.as_ref() {
            Some(active) if !active.session.is_terminated() => Ok((
                active.session.clone(),
                active.program.clone(),
                manager.config.command_timeout,
            )),
            _ => Err(no_session_error(tool_name)),
        }
    }

    #[tool(description = "Start the MATLAB REPL and run a script, optionally stopping on entry")]
    async fn repl_launch(
        &self,
        params: Parameters<ReplLaunchParams>,
    ) -> Result<CallToolResult, McpError> {
        let params = params.0;
        let (session, startup_timeout) = {
            let mut manager = self.session.lock().await;

            if manager
                .active
                .as_ref()
                .is_some_and(|active| !active.session.is_terminated())
            {
                return Err(to_mcp_error(
                    "A REPL session is already running. Call repl_terminate before launching again.",
                ));
            }

            let mut config = manager.config.clone();
            if let Some(executable) = params.executable.clone() {
                config.executable = executable;
            }
            if params.license_path.is_some() {
                config.license_path = params.license_path.clone();
            }

            let session = ReplSession::spawn(&config)
                .await
                .map_err(|e| repl_error("repl_launch", e))?;

            tokio::spawn(event_pump(
                session.subscribe(),
                self.recent_events.clone(),
                self.next_event_seq.clone(),
            ));

            manager.active = Some(ActiveRepl {
                session: session.clone(),
                program: params.program.clone(),
            });
            (session, config.startup_timeout)
        };

        let mode = with_timeout(
            "repl_launch",
            startup_timeout,
            execution::launch(&session, &params.program, params.stop_on_entry),
        )
        .await?;

        Ok(CallToolResult::structured(json!({
            "ok": true,
            "pid": session.pid(),
            "program": params.program,
            "mode": mode,
            "state": mode_state(mode),
        })))
    }

    #[tool(description = "Replace all breakpoints in a file with the given lines")]
    async fn repl_set_breakpoints(
        &self,
        params: Parameters<ReplSetBreakpointsParams>,
    ) -> Result<CallToolResult, McpError> {
        let params = params.0;
        let (session, _, limit) = self.active_session("repl_set_breakpoints").await?;

        let set = with_timeout(
            "repl_set_breakpoints",
            limit,
            breakpoints::set_breakpoints(&session, &params.source_path, &params.lines),
        )
        .await?;

        Ok(CallToolResult::structured(json!({
            "ok": true,
            "source_path": params.source_path,
            "breakpoints": set,
        })))
    }

    #[tool(description = "Clear breakpoints in one file, or everywhere when no file is given")]
    async fn repl_clear_breakpoints(
        &self,
        params: Parameters<ReplClearBreakpointsParams>,
    ) -> Result<CallToolResult, McpError> {
        let params = params.0;
        let (session, _, limit) = self.active_session("repl_clear_breakpoints").await?;

        let cleared = with_timeout(
            "repl_clear_breakpoints",
            limit,
            breakpoints::clear_breakpoints(&session, params.source_path.as_deref()),
        )
        .await?;

        Ok(CallToolResult::structured(json!({
            "ok": true,
            "cleared": cleared,
            "source_path": params.source_path,
        })))
    }

    #[tool(description = "Breakpoints the REPL reports for a file (dbstatus)")]
    async fn repl_breakpoint_status(
        &self,
        params: Parameters<ReplBreakpointStatusParams>,
    ) -> Result<CallToolResult, McpError> {
        let params = params.0;
        let (session, _, limit) = self.active_session("repl_breakpoint_status").await?;

        let status = with_timeout(
            "repl_breakpoint_status",
            limit,
            breakpoints::breakpoint_status(&session, &params.source_path),
        )
        .await?;

        Ok(CallToolResult::structured(json!({
            "ok": true,
            "status": status,
        })))
    }

    #[tool(description = "Continue when paused, otherwise run the launched script again")]
    async fn repl_continue(
        &self,
        _params: Parameters<ReplContinueParams>,
    ) -> Result<CallToolResult, McpError> {
        let (session, program, limit) = self.active_session("repl_continue").await?;

        let previous = with_timeout("repl_continue", limit, inspect::probe_mode(&session)).await?;
        let accepted = with_timeout(
            "repl_continue",
            limit,
            execution::run_or_continue(&session, previous, Some(&program)),
        )
        .await?;
        let mode = with_timeout("repl_continue", limit, inspect::probe_mode(&session)).await?;

        Ok(CallToolResult::structured(json!({
            "ok": true,
            "accepted": accepted,
            "previous_mode": previous,
            "mode": mode,
            "state": mode_state(mode),
        })))
    }

    #[tool(description = "Execute the next line of the paused script")]
    async fn repl_step(
        &self,
        _params: Parameters<ReplStepParams>,
    ) -> Result<CallToolResult, McpError> {
        let (session, _, limit) = self.active_session("repl_step").await?;

        let stepped = with_timeout("repl_step", limit, execution::step(&session)).await?;

        Ok(CallToolResult::structured(json!({
            "ok": true,
            "stepped": stepped,
        })))
    }

    #[tool(description = "Call stack of the paused script, innermost frame first")]
    async fn repl_stack_trace(
        &self,
        _params: Parameters<ReplStackTraceParams>,
    ) -> Result<CallToolResult, McpError> {
        let (session, _, limit) = self.active_session("repl_stack_trace").await?;

        let frames = with_timeout("repl_stack_trace", limit, inspect::stack_trace(&session)).await?;

        Ok(CallToolResult::structured(json!({
            "ok": true,
            "frames": frames,
        })))
    }

    #[tool(description = "Evaluate an expression in the current workspace and return its printed value")]
    async fn repl_evaluate(
        &self,
        params: Parameters<ReplEvaluateParams>,
    ) -> Result<CallToolResult, McpError> {
        let params = params.0;
        let (session, _, limit) = self.active_session("repl_evaluate").await?;

        let result = with_timeout(
            "repl_evaluate",
            limit,
            inspect::evaluate(&session, &params.expression),
        )
        .await?;

        Ok(CallToolResult::structured(json!({
            "ok": true,
            "text": result.text,
            "values": result.values(),
        })))
    }

    #[tool(description = "Current REPL session state")]
    async fn repl_status(
        &self,
        _params: Parameters<ReplStatusParams>,
    ) -> Result<CallToolResult, McpError> {
        let manager = self.session.lock().await;
        let Some(active) = manager.active.as_ref() else {
            return Ok(CallToolResult::structured(json!({
                "ok": true,
                "state": "none",
            })));
        };

        let state = if active.session.is_terminated() {
            "terminated"
        } else {
            "running"
        };

        Ok(CallToolResult::structured(json!({
            "ok": true,
            "state": state,
            "pid": active.session.pid(),
            "program": active.program,
            "pending_commands": active.session.pending_commands().await,
            "last_observed_line": active.session.last_observed_line().await,
        })))
    }

    #[tool(description = "Session events (stops, steps, stderr output, exit) at or after a sequence number")]
    async fn repl_events(
        &self,
        params: Parameters<ReplEventsParams>,
    ) -> Result<CallToolResult, McpError> {
        let params = params.0;
        let events = self.recent_events.lock().await;
        let selected = events_since(&events, params.since_seq);

        Ok(CallToolResult::structured(json!({
            "ok": true,
            "events": selected,
            "next_seq": self.next_event_seq.load(Ordering::SeqCst),
        })))
    }

    #[tool(description = "Kill the REPL process")]
    async fn repl_terminate(
        &self,
        _params: Parameters<ReplTerminateParams>,
    ) -> Result<CallToolResult, McpError> {
        let mut manager = self.session.lock().await;
        let Some(active) = manager.active.take() else {
            return Err(no_session_error("repl_terminate"));
        };

        active.session.terminate().await;
        tracing::info!(program = %active.program, "REPL session terminated");

        Ok(CallToolResult::structured(json!({
            "ok": true,
            "state": "terminated",
        })))
    }
}

#[tool_handler]
impl ServerHandler for MatlabDebugMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "MATLAB debug MCP server: drives a single MATLAB REPL session through its prompts".into(),
            ),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Stdout carries the MCP transport.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = ReplConfig::from_env();
    tracing::info!(executable = %config.executable, "Starting MATLAB Debug MCP Server on stdio...");

    let server = MatlabDebugMcpServer::new(config);
    let transport = transport::stdio();

    server.serve(transport).await?.waiting().await?;

    Ok(())
}
