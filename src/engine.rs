// ---------------------------------------------------------------------------
// engine.rs - execute one endpoint call end to end
// ---------------------------------------------------------------------------

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::error::GatewayError;
use crate::marshal::{Marshaler, TempFiles};
use crate::plugins::registry::Registry;
use crate::plugins::{EndpointDescriptor, HandlerArgs, HandlerOutput};

#[derive(Clone)]
pub struct ExecutionEngine {
    registry: Arc<Registry>,
    marshaler: Marshaler,
    timeout: Duration,
    clear_temp_files: bool,
}

impl ExecutionEngine {
    pub fn new(registry: Arc<Registry>, marshaler: Marshaler, timeout: Duration, clear_temp_files: bool) -> Self {
        Self {
            registry,
            marshaler,
            timeout,
            clear_temp_files,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Resolve `path` against the live table and execute it.
    pub async fn execute(&self, path: &str, payload: Value) -> Result<Value, GatewayError> {
        let descriptor = self
            .registry
            .get(path)
            .await
            .ok_or_else(|| GatewayError::NotFound(format!("API endpoint {} not found", path)))?;
        self.execute_descriptor(&descriptor, payload).await
    }

    /// Validate, then decode, invoke, normalize and encode on the blocking
    /// pool. The blocking task owns the call's temp files and removes them
    /// once the handler returns, even when the caller already gave up on a
    /// timeout.
    pub async fn execute_descriptor(
        &self,
        descriptor: &EndpointDescriptor,
        payload: Value,
    ) -> Result<Value, GatewayError> {
        let Value::Object(body) = payload else {
            return Err(GatewayError::invalid_input("Request body must be a JSON object"));
        };
        if let Some(missing) = descriptor.required_inputs().find(|f| !body.contains_key(&f.name)) {
            return Err(GatewayError::missing_field(&missing.name));
        }

        let engine = self.clone();
        let owned = descriptor.clone();
        let task = tokio::task::spawn_blocking(move || engine.run_blocking(&owned, body));

        match tokio::time::timeout(self.timeout, task).await {
            Err(_) => {
                tracing::error!("engine: {} timed out after {:?}", descriptor.path, self.timeout);
                Err(GatewayError::Timeout(self.timeout))
            }
            Ok(Err(join_err)) => {
                let reason = panic_message(join_err.try_into_panic().ok());
                tracing::error!("engine: {} aborted: {}", descriptor.path, reason);
                Err(GatewayError::Api(format!("Error executing API: {}", reason)))
            }
            Ok(Ok(result)) => result,
        }
    }

    fn run_blocking(&self, descriptor: &EndpointDescriptor, mut body: Map<String, Value>) -> Result<Value, GatewayError> {
        let mut temp = TempFiles::default();
        let result = self
            .decode_args(descriptor, &mut body, &mut temp)
            .and_then(|args| call_handler(descriptor, args))
            .and_then(|output| self.normalize(descriptor, output));
        if self.clear_temp_files {
            temp.cleanup();
        }
        result
    }

    fn decode_args(
        &self,
        descriptor: &EndpointDescriptor,
        body: &mut Map<String, Value>,
        temp: &mut TempFiles,
    ) -> Result<HandlerArgs, GatewayError> {
        let mut args = HandlerArgs::new();
        for field in &descriptor.inputs {
            match body.remove(&field.name) {
                Some(Value::Null) if !field.required => {}
                Some(value) => {
                    let native = self.marshaler.decode(&field.name, field.tag, value, temp)?;
                    args.insert(field.name.clone(), native);
                }
                None => {}
            }
        }
        Ok(args)
    }

    fn normalize(&self, descriptor: &EndpointDescriptor, output: HandlerOutput) -> Result<Value, GatewayError> {
        let named: Vec<(String, _)> = match output {
            HandlerOutput::Positional(values) => values
                .into_iter()
                .enumerate()
                .map(|(i, v)| {
                    let name = descriptor
                        .outputs
                        .get(i)
                        .map(|slot| slot.name.clone())
                        .unwrap_or_else(|| format!("output_{}", i));
                    (name, v)
                })
                .collect(),
            HandlerOutput::Named(pairs) => pairs,
        };

        let mut result = Map::with_capacity(named.len());
        for (name, value) in named {
            let tag = descriptor.output(&name).map(|slot| slot.tag);
            let encoded = self.marshaler.encode(&name, tag, value)?;
            result.insert(name, encoded);
        }
        Ok(Value::Object(result))
    }
}

/// Runs the handler, turning an error or a panic into `API_ERROR`.
fn call_handler(descriptor: &EndpointDescriptor, args: HandlerArgs) -> Result<HandlerOutput, GatewayError> {
    let handler = &descriptor.handler;
    match std::panic::catch_unwind(AssertUnwindSafe(|| handler.call(args))) {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => {
            tracing::error!("engine: error executing {}: {:#}", descriptor.path, e);
            Err(GatewayError::Api(format!("Error executing API: {:#}", e)))
        }
        Err(payload) => {
            let reason = panic_message(Some(payload));
            tracing::error!("engine: {} panicked: {}", descriptor.path, reason);
            Err(GatewayError::Api(format!("Error executing API: {}", reason)))
        }
    }
}

fn panic_message(payload: Option<Box<dyn Any + Send>>) -> String {
    let Some(payload) = payload else {
        return "handler task was cancelled".to_string();
    };
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
