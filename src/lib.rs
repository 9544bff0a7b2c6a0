/*!
# Scriptflow-rs

A script-transform stage for stream-processing pipelines: each message payload
is handed to a user-supplied script and the script's result becomes the new
payload.

## Overview

The stage is configured once at startup with a language and either an inline
script or a script file, plus optional variables. Configuration problems are
rejected before the first message is seen. After that the transformer is
immutable and can be shared between concurrent workers.

## Key Components

* **ScriptTransformProperties**: The configuration surface (`language`, `script`, `scriptFile`, `variables`, `variablesLocation`)
* **PropertiesValidator**: Fail-fast checks that report every configuration violation at once
* **ScriptSourceResolver**: Determines the final language and script text, decoding inline scripts and inferring the language from file suffixes
* **ExecutorRegistry**: Maps case-insensitive language identifiers to script executors
* **VariableGenerator**: Supplies the named values a script sees alongside `payload` and `headers`
* **ScriptTransformer**: Runs the compiled script against each message

## Built-in Languages

* **javascript** (`js`, `ecmascript`): embedded Boa engine
* **rhai**: embedded Rhai engine
* **python** (`py`, `jython`): embedded with the `python` feature, otherwise run through `python3`
* **ruby** (`rb`, `jruby`), **groovy**: one interpreter process per script, found on `PATH`

## Usage Example

```rust,no_run
use scriptflow_rs::{ExecutorRegistry, Message, ScriptTransformProperties, ScriptTransformer};
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ScriptTransformProperties::from_properties(
        "language=js\nscript=\"payload + foo\"\nvariables=foo=\\ WORLD",
    )?;

    // Fails here, not at the first message, if the configuration is wrong
    let transformer = ScriptTransformer::from_properties(&config, &ExecutorRegistry::default())?;

    let mut message = Message::from_value(&json!("hello world"));
    transformer.process_message(&mut message).await?;

    println!("Transformed payload: {}", message.payload);
    Ok(())
}
```

## Error Handling

Startup failures are `Configuration` or `Io` errors. Per-message failures are
`Execution` errors carrying the interpreter's error as their source; the
pipeline-facing `process_message` also records them on the message:

```rust,no_run
use scriptflow_rs::{ExecutorRegistry, Message, Result, ScriptTransformProperties, ScriptTransformer};
use serde_json::json;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    let config = ScriptTransformProperties::with_script("rhai", "payload.total * 2");
    let transformer = ScriptTransformer::from_properties(&config, &ExecutorRegistry::default())?
        .with_timeout(Duration::from_secs(5));

    let mut message = Message::from_value(&json!({"total": "not a number"}));
    if transformer.process_message(&mut message).await.is_err() {
        for error in &message.errors {
            println!("{} (retryable: {}): {}", error.code, error.retryable, error.message);
        }
    }

    Ok(())
}
```

## Adding a Language

Implement [`ScriptExecutor`] and register it under one or more identifiers:

```rust,no_run
use async_trait::async_trait;
use scriptflow_rs::{Bindings, CompiledScript, ExecutorRegistry, Result, ScriptExecutor};
use serde_json::Value;
use std::sync::Arc;

struct Identity;

struct IdentityScript;

impl ScriptExecutor for Identity {
    fn language(&self) -> &str {
        "identity"
    }

    fn compile(&self, _source: &str) -> Result<Arc<dyn CompiledScript>> {
        Ok(Arc::new(IdentityScript))
    }
}

#[async_trait]
impl CompiledScript for IdentityScript {
    async fn run(&self, bindings: Bindings) -> Result<Value> {
        Ok(bindings.get("payload").cloned().unwrap_or(Value::Null))
    }
}

let mut registry = ExecutorRegistry::default();
registry.register(["identity", "id"], Arc::new(Identity));
```
*/

pub mod engine;

// Re-export all public APIs for easier access
pub use engine::config::ScriptTransformProperties;
pub use engine::error::{ErrorInfo, Result, TransformError};
pub use engine::executors::{CompiledScript, ExecutorRegistry, ScriptExecutor};
pub use engine::message::{Headers, Message};
pub use engine::resolver::{ResolvedScript, ScriptOrigin, ScriptSourceResolver};
pub use engine::transformer::ScriptTransformer;
pub use engine::validator::{PropertiesValidator, Violation};
pub use engine::variables::{Bindings, StaticVariableGenerator, VariableGenerator};
