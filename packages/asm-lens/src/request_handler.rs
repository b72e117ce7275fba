// Copyright (c) 2026 asm-lens Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Request parsing and dispatch for the main request loop.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::Error;
use crate::options::Options;
use crate::protocol::*;
use crate::registry::Registry;
use crate::transport::Transport;

/// Answers front-end requests against a shared registry.
pub struct Service {
    registry: Arc<Registry>,
    options: Options,
}

impl Service {
    pub fn new(registry: Arc<Registry>, options: Options) -> Self {
        Self { registry, options }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Parse and dispatch one request based on its `req` discriminant.
    /// Always produces a response; failures become `{req, seq, error}`.
    pub fn handle(&self, msg: &Value) -> Value {
        let req = msg.get("req").and_then(Value::as_str).unwrap_or_default();
        let seq = msg.get("seq").and_then(Value::as_u64).unwrap_or(0);
        let reply = match req {
            "load" => self.with_request(msg, |r: LoadRequest| self.load(r)),
            "files" => self.with_request(msg, |r: FilesRequest| {
                Ok(FilesResponse { req: r.req, seq: r.seq, files: self.registry.list() })
            }),
            "close" => self.with_request(msg, |r: CloseRequest| {
                self.registry.remove(&r.file)?;
                Ok(AckResponse { req: r.req, seq: r.seq })
            }),
            "functions" => self.with_request(msg, |r: FunctionsRequest| self.functions(r)),
            "code" => self.with_request(msg, |r: CodeRequest| self.code(r)),
            _ => {
                log::warn!("Unknown request type: {:?}", req);
                Err(Reply::BadRequest(format!("unknown request type {:?}", req)))
            }
        };
        match reply {
            Ok(value) => value,
            Err(Reply::Failed(e)) => {
                log::debug!("{} #{} failed: {}", req, seq, e);
                error_response(req, seq, WireError::from(&e))
            }
            Err(Reply::BadRequest(message)) => {
                error_response(req, seq, WireError { kind: "badRequest".into(), message })
            }
        }
    }

    fn with_request<T, R, F>(&self, msg: &Value, f: F) -> Result<Value, Reply>
    where
        T: DeserializeOwned,
        R: Serialize,
        F: FnOnce(T) -> Result<R, Error>,
    {
        let typed = serde_json::from_value::<T>(msg.clone())
            .map_err(|e| Reply::BadRequest(format!("malformed request: {}", e)))?;
        let response = f(typed).map_err(Reply::Failed)?;
        serde_json::to_value(response).map_err(|e| Reply::BadRequest(e.to_string()))
    }

    fn load(&self, r: LoadRequest) -> Result<LoadResponse, Error> {
        let exe = self.registry.add(&r.file)?;
        Ok(LoadResponse {
            req: r.req,
            seq: r.seq,
            file: exe.path().to_string(),
            functions: exe.symbols().len(),
        })
    }

    fn functions(&self, r: FunctionsRequest) -> Result<FunctionsResponse, Error> {
        let functions = self.registry.functions(&r.file, r.filter.as_deref())?;
        Ok(FunctionsResponse {
            req: r.req,
            seq: r.seq,
            functions: functions.iter().map(FunctionInfo::from).collect(),
        })
    }

    fn code(&self, r: CodeRequest) -> Result<CodeResponse, Error> {
        let options = match r.context {
            Some(context) => Options::with_context(context as usize),
            None => self.options,
        };
        let decoded = self.registry.code(&r.file, &r.name, &options)?;
        Ok(CodeResponse { req: r.req, seq: r.seq, code: Code::from(&decoded) })
    }
}

enum Reply {
    Failed(Error),
    BadRequest(String),
}

fn error_response(req: &str, seq: u64, error: WireError) -> Value {
    json!({ "req": req, "seq": seq, "error": error })
}

/// Reads requests until the peer closes the stream. Transport failures end
/// the loop; request failures are answered and the loop continues.
pub fn serve<T: Transport>(service: &Service, transport: &mut T) -> Result<(), Error> {
    while let Some(msg) = transport.read_message()? {
        let response = service.handle(&msg);
        transport.write_message(&response)?;
    }
    log::info!("request stream closed");
    Ok(())
}
