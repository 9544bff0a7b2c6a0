//! Executors for languages run by an external interpreter.
//!
//! Each compiled script owns one long-lived worker: the interpreter started
//! with a small driver program that speaks line-delimited JSON.
//!
//! 1. The first request line is `{"script": ...}`; the driver compiles the
//!    script once and answers `{"ready": true}` or `{"error": "..."}`.
//! 2. Every following `{"bindings": {...}}` line is answered with one
//!    `{"result": ...}` or `{"error": "..."}` line.
//!
//! Requests to a worker are serialized behind a lock. A worker that dies, or
//! whose exchange was cut short by a dropped future, is discarded and a new
//! one is started on the next run. Output the script prints goes to stderr
//! and is logged at debug level.

use super::builtins::{GROOVY, PYTHON, RUBY};
use super::{CompiledScript, ScriptExecutor};
use crate::engine::error::{Result, TransformError};
use crate::engine::variables::Bindings;
use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

const PYTHON_DRIVER: &str = include_str!("drivers/python_driver.py");
const RUBY_DRIVER: &str = include_str!("drivers/ruby_driver.rb");
const GROOVY_DRIVER: &str = include_str!("drivers/groovy_driver.groovy");

/// Runs scripts through an interpreter process
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    language: &'static str,
    program: String,
    eval_flag: &'static str,
    driver: &'static str,
}

impl ProcessExecutor {
    /// An executor that starts `program eval_flag driver`
    pub fn new(
        language: &'static str,
        program: impl Into<String>,
        eval_flag: &'static str,
        driver: &'static str,
    ) -> Self {
        Self {
            language,
            program: program.into(),
            eval_flag,
            driver,
        }
    }

    /// `python3 -c <driver>`
    pub fn python() -> Self {
        Self::new(PYTHON, "python3", "-c", PYTHON_DRIVER)
    }

    /// `ruby -e <driver>`
    pub fn ruby() -> Self {
        Self::new(RUBY, "ruby", "-e", RUBY_DRIVER)
    }

    /// `groovy -e <driver>`
    pub fn groovy() -> Self {
        Self::new(GROOVY, "groovy", "-e", GROOVY_DRIVER)
    }

    /// The process executor for a canonical language identifier
    pub fn for_language(language: &str) -> Option<Self> {
        match language {
            PYTHON => Some(Self::python()),
            RUBY => Some(Self::ruby()),
            GROOVY => Some(Self::groovy()),
            _ => None,
        }
    }

    /// Use a different interpreter program
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    async fn start_worker(&self, source: &str) -> Result<Worker> {
        let mut child = Command::new(&self.program)
            .arg(self.eval_flag)
            .arg(self.driver)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                TransformError::Script(format!(
                    "Failed to start {} interpreter '{}': {}",
                    self.language, self.program, e
                ))
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(TransformError::Script(format!(
                "{} interpreter has no stdio pipes",
                self.language
            )));
        };
        if let Some(stderr) = child.stderr.take() {
            let language = self.language;
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("{} script stderr: {}", language, line);
                }
            });
        }

        let mut worker = Worker {
            language: self.language,
            child,
            stdin,
            stdout: BufReader::new(stdout),
        };
        let reply = worker.exchange(&DriverRequest::Compile { script: source }).await?;
        if let Some(error) = reply.error {
            worker.stop().await;
            return Err(TransformError::Script(format!(
                "{} script failed to compile: {}",
                self.language, error
            )));
        }

        debug!(
            "Started {} worker '{}' (pid {:?})",
            self.language,
            self.program,
            worker.child.id()
        );
        Ok(worker)
    }
}

impl ScriptExecutor for ProcessExecutor {
    fn language(&self) -> &str {
        self.language
    }

    /// The interpreter starts on the first run; syntax errors surface there.
    fn compile(&self, source: &str) -> Result<Arc<dyn CompiledScript>> {
        debug!(
            "Prepared {} script for {} ({} bytes)",
            self.language,
            self.program,
            source.len()
        );
        Ok(Arc::new(ProcessScript {
            executor: self.clone(),
            source: Arc::from(source),
            worker: Mutex::new(None),
        }))
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum DriverRequest<'a> {
    Compile { script: &'a str },
    Run { bindings: &'a Bindings },
}

#[derive(Debug, Deserialize)]
struct DriverReply {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

/// A running interpreter with the script compiled
struct Worker {
    language: &'static str,
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl Worker {
    /// Send one request line and read one reply line
    ///
    /// An `Err` means the worker can no longer be trusted.
    async fn exchange(&mut self, request: &DriverRequest<'_>) -> Result<DriverReply> {
        let mut line = serde_json::to_vec(request).map_err(TransformError::from_serde)?;
        line.push(b'\n');

        let written = match self.stdin.write_all(&line).await {
            Ok(()) => self.stdin.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            return Err(self.exited(format!("request could not be written: {}", e)));
        }

        let mut reply = String::new();
        match self.stdout.read_line(&mut reply).await {
            Ok(0) => Err(self.exited("no reply".to_string())),
            Ok(_) => serde_json::from_str(&reply).map_err(|e| {
                TransformError::Script(format!(
                    "{} interpreter sent an invalid reply ({}): {}",
                    self.language,
                    e,
                    reply.trim_end()
                ))
            }),
            Err(e) => Err(self.exited(format!("reply could not be read: {}", e))),
        }
    }

    fn exited(&mut self, reason: String) -> TransformError {
        let status = match self.child.try_wait() {
            Ok(Some(status)) => status.to_string(),
            _ => "still running".to_string(),
        };
        TransformError::Script(format!(
            "{} interpreter failed ({}): {}",
            self.language, status, reason
        ))
    }

    async fn stop(mut self) {
        if let Err(e) = self.child.kill().await {
            debug!("Failed to stop {} interpreter: {}", self.language, e);
        }
    }
}

struct ProcessScript {
    executor: ProcessExecutor,
    source: Arc<str>,
    worker: Mutex<Option<Worker>>,
}

#[async_trait]
impl CompiledScript for ProcessScript {
    async fn run(&self, bindings: Bindings) -> Result<Value> {
        let mut slot = self.worker.lock().await;

        // Taken out for the exchange so a cancelled run cannot leave a
        // half-answered worker behind
        let mut worker = match slot.take() {
            Some(worker) => worker,
            None => self.executor.start_worker(&self.source).await?,
        };

        match worker.exchange(&DriverRequest::Run { bindings: &bindings }).await {
            Ok(reply) => {
                *slot = Some(worker);
                match reply.error {
                    Some(error) => Err(TransformError::Script(error)),
                    None => Ok(reply.result),
                }
            }
            Err(e) => {
                warn!("Discarding {} worker: {}", self.executor.language, e);
                worker.stop().await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // Speaks the driver protocol; echoes each request with a per-worker counter
    const STUB_DRIVER: &str = r#"
read -r request
case "$request" in *fail-compile*) echo '{"error":"SyntaxError: unexpected token"}'; exit 1 ;; esac
echo '{"ready":true}'
count=0
while read -r request; do
  count=$((count + 1))
  case "$request" in
    *crash*) exit 3 ;;
    *raise*) echo '{"error":"RuntimeError: boom"}' ;;
    *garbage*) echo 'not json' ;;
    *) echo "{\"result\":{\"count\":$count,\"request\":$request}}" ;;
  esac
done
"#;

    fn stub() -> ProcessExecutor {
        ProcessExecutor::new(RUBY, "sh", "-c", STUB_DRIVER)
    }

    fn bindings(value: Value) -> Bindings {
        match value {
            Value::Object(map) => map,
            _ => panic!("bindings must be an object"),
        }
    }

    #[test]
    fn test_for_language() {
        assert_eq!(ProcessExecutor::for_language(PYTHON).unwrap().program(), "python3");
        assert_eq!(ProcessExecutor::for_language(RUBY).unwrap().program(), "ruby");
        assert_eq!(ProcessExecutor::for_language(GROOVY).unwrap().program(), "groovy");
        assert!(ProcessExecutor::for_language("javascript").is_none());
    }

    #[test]
    fn test_with_program() {
        let executor = ProcessExecutor::python().with_program("/usr/local/bin/python3.12");
        assert_eq!(executor.program(), "/usr/local/bin/python3.12");
        assert_eq!(executor.language(), PYTHON);
    }

    #[test]
    fn test_request_lines() {
        let compile = serde_json::to_string(&DriverRequest::Compile { script: "payload" }).unwrap();
        assert_eq!(compile, r#"{"script":"payload"}"#);

        let vars = bindings(json!({"payload": 1}));
        let run = serde_json::to_string(&DriverRequest::Run { bindings: &vars }).unwrap();
        assert_eq!(run, r#"{"bindings":{"payload":1}}"#);
    }

    #[test]
    fn test_driver_reply_parsing() {
        let reply: DriverReply = serde_json::from_str(r#"{"result": {"a": 1}}"#).unwrap();
        assert_eq!(reply.result, json!({"a": 1}));
        assert!(reply.error.is_none());

        let reply: DriverReply = serde_json::from_str(r#"{"error": "boom"}"#).unwrap();
        assert_eq!(reply.result, Value::Null);
        assert_eq!(reply.error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_missing_interpreter() {
        let script = ProcessExecutor::ruby()
            .with_program("definitely-not-an-interpreter")
            .compile("payload")
            .unwrap();

        let err = script.run(Bindings::new()).await.unwrap_err();
        match err {
            TransformError::Script(msg) => assert!(msg.contains("definitely-not-an-interpreter")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_worker_is_reused_between_runs() {
        let script = stub().compile("payload").unwrap();

        let first = script.run(bindings(json!({"payload": "a"}))).await.unwrap();
        let second = script.run(bindings(json!({"payload": "b"}))).await.unwrap();

        assert_eq!(first, json!({"count": 1, "request": {"bindings": {"payload": "a"}}}));
        assert_eq!(second, json!({"count": 2, "request": {"bindings": {"payload": "b"}}}));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_script_error_keeps_worker() {
        let script = stub().compile("payload").unwrap();

        let err = script.run(bindings(json!({"payload": "raise"}))).await.unwrap_err();
        match err {
            TransformError::Script(msg) => assert_eq!(msg, "RuntimeError: boom"),
            other => panic!("unexpected error: {:?}", other),
        }

        let next = script.run(bindings(json!({"payload": 1}))).await.unwrap();
        assert_eq!(next["count"], json!(2));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_invalid_reply_names_the_parse_error() {
        let script = stub().compile("payload").unwrap();

        let err = script.run(bindings(json!({"payload": "garbage"}))).await.unwrap_err();
        match err {
            TransformError::Script(msg) => {
                assert!(msg.contains("invalid reply"));
                assert!(msg.contains("expected"));
                assert!(msg.contains("not json"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_crashed_worker_is_restarted() {
        let script = stub().compile("payload").unwrap();
        script.run(bindings(json!({"payload": 1}))).await.unwrap();

        let err = script.run(bindings(json!({"payload": "crash"}))).await.unwrap_err();
        match err {
            TransformError::Script(msg) => assert!(msg.contains("interpreter failed")),
            other => panic!("unexpected error: {:?}", other),
        }

        let next = script.run(bindings(json!({"payload": 2}))).await.unwrap();
        assert_eq!(next["count"], json!(1));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_compile_error_is_reported() {
        let script = stub().compile("fail-compile").unwrap();

        let err = script.run(Bindings::new()).await.unwrap_err();
        match err {
            TransformError::Script(msg) => {
                assert!(msg.contains("failed to compile"));
                assert!(msg.contains("SyntaxError"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
