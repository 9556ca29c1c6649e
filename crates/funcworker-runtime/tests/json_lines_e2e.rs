//! JSON-lines transport end to end: a config file, a dispatcher built from
//! it, and raw protocol lines on both sides.

use std::sync::Arc;

use funcworker_config::WorkerConfig;
use funcworker_core::{NativeValue, WorkerError};
use funcworker_runtime::config_bridge::build_dispatcher;
use funcworker_runtime::{JsonLinesSink, JsonLinesSource};
use funcworker_test::{MockEngineFactory, init_test_logging};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::task::JoinHandle;

struct LineHost {
    writer: DuplexStream,
    reader: tokio::io::Lines<BufReader<DuplexStream>>,
    worker: JoinHandle<Result<(), WorkerError>>,
}

impl LineHost {
    async fn start(config: &WorkerConfig, factory: MockEngineFactory) -> Self {
        init_test_logging();
        let (writer, worker_in) = tokio::io::duplex(64 * 1024);
        let (worker_out, reader) = tokio::io::duplex(64 * 1024);

        let dispatcher = build_dispatcher(config, Arc::new(factory));
        let worker = tokio::spawn(async move {
            dispatcher
                .run(
                    JsonLinesSource::new(worker_in),
                    Arc::new(JsonLinesSink::new(worker_out)),
                )
                .await
        });

        Self {
            writer,
            reader: BufReader::new(reader).lines(),
            worker,
        }
    }

    async fn send_line(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
    }

    async fn send(&mut self, message: Value) {
        self.send_line(&message.to_string()).await;
    }

    async fn recv(&mut self) -> Value {
        let line = self.reader.next_line().await.unwrap().unwrap();
        serde_json::from_str(&line).unwrap()
    }

    async fn request(&mut self, message: Value) -> Value {
        self.send(message).await;
        self.recv().await
    }

    async fn close(self) -> Result<(), WorkerError> {
        drop(self.writer);
        self.worker.await.unwrap()
    }
}

fn load_message(dir: &std::path::Path) -> Value {
    let function_dir = dir.join("Echo");
    json!({
        "requestId": "r2",
        "functionLoadRequest": {
            "functionId": "f1",
            "metadata": {
                "name": "Echo",
                "directory": function_dir.display().to_string(),
                "scriptFile": function_dir.join("run.script").display().to_string(),
                "bindings": [
                    { "name": "req", "type": "string", "direction": "in", "dataType": "string" },
                    { "name": "res", "type": "string", "direction": "out" },
                    { "name": "blob", "type": "blob", "direction": "out" }
                ]
            }
        }
    })
}

#[tokio::test]
async fn test_full_conversation_over_json_lines() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("worker.toml");
    std::fs::write(
        &config_path,
        r#"
[environment]
profile_file_name = "startup.profile"

[environment.capabilities]
RpcHttpBodyOnly = "true"

[[environment.type_aliases]]
alias = "Json"
target = "System.Text.Json"
"#,
    )
    .unwrap();
    std::fs::write(dir.path().join("startup.profile"), "# profile").unwrap();
    let config = WorkerConfig::load(Some(config_path.as_path())).unwrap();

    let factory = MockEngineFactory::new().with_outputs(
        "Echo",
        vec![
            ("res", NativeValue::String("hello-out".into())),
            ("blob", NativeValue::Bytes(b"hi".to_vec())),
        ],
    );
    let state = factory.state();
    let mut host = LineHost::start(&config, factory).await;

    let init = host
        .request(json!({ "requestId": "r1", "workerInitRequest": { "hostVersion": "4.0" } }))
        .await;
    assert_eq!(init["requestId"], "r1");
    assert_eq!(init["workerInitResponse"]["result"]["status"], "success");
    assert_eq!(
        init["workerInitResponse"]["capabilities"]["RpcHttpBodyOnly"],
        "true"
    );

    let load = host.request(load_message(dir.path())).await;
    assert_eq!(load["requestId"], "r2");
    assert_eq!(load["functionLoadResponse"]["functionId"], "f1");
    assert_eq!(load["functionLoadResponse"]["result"]["status"], "success");

    let setup = state.prepared_setup().unwrap();
    assert_eq!(setup.environment.function_app_root, dir.path());
    assert_eq!(
        setup.environment.profile_path,
        Some(dir.path().join("startup.profile"))
    );
    assert_eq!(setup.type_aliases.len(), 1);
    assert_eq!(setup.type_aliases[0].alias, "Json");

    let invocation = host
        .request(json!({
            "requestId": "r3",
            "invocationRequest": {
                "invocationId": "inv-1",
                "functionId": "f1",
                "inputData": [ { "name": "req", "data": { "bytes": "aGVsbG8=" } } ]
            }
        }))
        .await;
    let response = &invocation["invocationResponse"];
    assert_eq!(invocation["requestId"], "r3");
    assert_eq!(response["invocationId"], "inv-1");
    assert_eq!(response["result"]["status"], "success");
    assert_eq!(
        response["outputData"],
        json!([
            { "name": "res", "data": { "string": "hello-out" } },
            { "name": "blob", "data": { "bytes": "aGk=" } }
        ])
    );

    assert!(host.close().await.is_ok());
}

#[tokio::test]
async fn test_unknown_kind_line_stops_worker() {
    let config = WorkerConfig::default();
    let mut host = LineHost::start(&config, MockEngineFactory::new()).await;

    host.send(json!({ "requestId": "r1", "rpcLog": { "message": "hi" } }))
        .await;

    let result = host.worker.await.unwrap();
    assert!(matches!(result, Err(WorkerError::ProtocolViolation(_))));
    assert_eq!(host.reader.next_line().await.unwrap(), None);
}

#[tokio::test]
async fn test_bad_payload_shape_gets_failure_reply() {
    let config = WorkerConfig::default();
    let mut host = LineHost::start(&config, MockEngineFactory::new()).await;

    let response = host
        .request(json!({
            "requestId": "r1",
            "invocationRequest": { "invocationId": "i1", "inputData": 7 }
        }))
        .await;

    assert_eq!(response["requestId"], "r1");
    let invocation = &response["invocationResponse"];
    assert_eq!(invocation["invocationId"], "i1");
    assert_eq!(invocation["result"]["status"], "failure");
    assert_eq!(
        invocation["result"]["exception"]["typeName"],
        "MalformedRequest"
    );

    let init = host
        .request(json!({ "requestId": "r2", "workerInitRequest": {} }))
        .await;
    assert_eq!(init["workerInitResponse"]["result"]["status"], "success");
    assert!(host.close().await.is_ok());
}

#[tokio::test]
async fn test_malformed_line_is_transport_error() {
    let config = WorkerConfig::default();
    let mut host = LineHost::start(&config, MockEngineFactory::new()).await;

    host.send_line("").await;
    host.send_line("{not json").await;

    let result = host.worker.await.unwrap();
    assert!(matches!(result, Err(WorkerError::Transport(_))));
}
