//! Request and response interceptor chains
//!
//! Every outgoing request runs through an ordered list of request
//! interceptors before it reaches the wire; every response runs through
//! the response interceptors before the caller sees it. Execution is
//! serial and the first rejection short-circuits the rest of the chain.
//!
//! The default response chain, in order:
//!
//! 1. **delta** — reassemble delta-encoded results against the cached
//!    patchee for `(handle, method)`
//! 2. **error** — turn an engine error body into `Err(Error::Rpc)`
//! 3. **extraction** — normalize the result payload
//!
//! Delta patch application itself sits behind the [`DeltaPatcher`] seam;
//! [`JsonPatch`] is the default implementation.

use crate::session::Session;
use axon_core::{Error, Request, Response, Result};
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;

/// Transforms a request before it is sent, or rejects it.
pub type RequestInterceptor =
    Arc<dyn Fn(Session, Request) -> BoxFuture<'static, Result<Request>> + Send + Sync>;

/// Transforms a response before the caller sees it, or rejects it.
pub type ResponseInterceptor = Arc<
    dyn Fn(Session, Arc<Request>, Response) -> BoxFuture<'static, Result<Response>> + Send + Sync,
>;

/// Applies a delta patch to the previously seen payload.
///
/// `base` is the cached patchee (absent on the first delta for a
/// `(handle, method)` pair), `patches` is whatever the engine put into the
/// result field of a delta response.
pub trait DeltaPatcher: Send + Sync {
    fn apply(&self, base: Option<&Value>, patches: &Value) -> Result<Value>;
}

/// Default patcher: JSON-Pointer based add/replace/remove operations.
pub struct JsonPatch;

impl DeltaPatcher for JsonPatch {
    fn apply(&self, base: Option<&Value>, patches: &Value) -> Result<Value> {
        let ops = patches
            .as_array()
            .ok_or_else(|| Error::Protocol("delta patches must be an array".to_string()))?;

        let mut doc = base.cloned().unwrap_or(Value::Null);
        for op in ops {
            let kind = op
                .get("op")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::Protocol("patch op missing 'op'".to_string()))?;
            let path = op
                .get("path")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::Protocol("patch op missing 'path'".to_string()))?;

            match kind {
                "add" | "replace" => {
                    let value = op
                        .get("value")
                        .cloned()
                        .ok_or_else(|| Error::Protocol("patch op missing 'value'".to_string()))?;
                    set_path(&mut doc, path, value)?;
                }
                "remove" => remove_path(&mut doc, path)?,
                other => {
                    return Err(Error::Protocol(format!("unsupported patch op '{other}'")));
                }
            }
        }
        Ok(doc)
    }
}

/// Write `value` at `path`, replacing the whole document for the root
/// pointer.
fn set_path(doc: &mut Value, path: &str, value: Value) -> Result<()> {
    if path.is_empty() || path == "/" {
        *doc = value;
        return Ok(());
    }
    let (parent_path, token) = split_pointer(path)?;
    let parent = doc
        .pointer_mut(parent_path)
        .ok_or_else(|| Error::Protocol(format!("patch path '{path}' does not resolve")))?;

    match parent {
        Value::Object(map) => {
            map.insert(decode_token(token), value);
            Ok(())
        }
        Value::Array(items) => {
            if token == "-" {
                items.push(value);
                return Ok(());
            }
            let index: usize = token
                .parse()
                .map_err(|_| Error::Protocol(format!("bad array index in '{path}'")))?;
            if index < items.len() {
                items[index] = value;
            } else if index == items.len() {
                items.push(value);
            } else {
                return Err(Error::Protocol(format!("index out of bounds in '{path}'")));
            }
            Ok(())
        }
        _ => Err(Error::Protocol(format!(
            "patch path '{path}' points into a scalar"
        ))),
    }
}

fn remove_path(doc: &mut Value, path: &str) -> Result<()> {
    if path.is_empty() || path == "/" {
        *doc = Value::Null;
        return Ok(());
    }
    let (parent_path, token) = split_pointer(path)?;
    let parent = doc
        .pointer_mut(parent_path)
        .ok_or_else(|| Error::Protocol(format!("patch path '{path}' does not resolve")))?;

    match parent {
        Value::Object(map) => {
            map.remove(&decode_token(token));
            Ok(())
        }
        Value::Array(items) => {
            let index: usize = token
                .parse()
                .map_err(|_| Error::Protocol(format!("bad array index in '{path}'")))?;
            if index < items.len() {
                items.remove(index);
            }
            Ok(())
        }
        _ => Err(Error::Protocol(format!(
            "patch path '{path}' points into a scalar"
        ))),
    }
}

fn split_pointer(path: &str) -> Result<(&str, &str)> {
    if !path.starts_with('/') {
        return Err(Error::Protocol(format!("invalid patch path '{path}'")));
    }
    let split = path.rfind('/').unwrap_or(0);
    Ok((&path[..split], &path[split + 1..]))
}

fn decode_token(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

/// Default request chain: empty, the session-level option merge already
/// happened before the chain runs.
pub fn default_request_chain() -> Vec<RequestInterceptor> {
    Vec::new()
}

/// The default response chain: delta, error, extraction.
pub fn default_response_chain(patcher: Arc<dyn DeltaPatcher>) -> Vec<ResponseInterceptor> {
    vec![
        delta_interceptor(patcher),
        error_interceptor(),
        extraction_interceptor(),
    ]
}

/// Reassemble delta-encoded results and keep the patchee store current.
pub fn delta_interceptor(patcher: Arc<dyn DeltaPatcher>) -> ResponseInterceptor {
    Arc::new(move |session, request, mut response| {
        let patcher = Arc::clone(&patcher);
        Box::pin(async move {
            if request.delta != Some(true) || response.error.is_some() {
                return Ok(response);
            }
            if response.delta == Some(true) {
                let patches = response.result.take().unwrap_or(Value::Array(Vec::new()));
                let base = session.get_patchee(request.handle, &request.method);
                let full = patcher.apply(base.as_ref(), &patches)?;
                session.set_patchee(request.handle, &request.method, full.clone());
                response.result = Some(full);
                response.delta = Some(false);
            } else if let Some(result) = &response.result {
                session.set_patchee(request.handle, &request.method, result.clone());
            }
            Ok(response)
        })
    })
}

/// Convert an engine error body into an exception carrying code, message
/// and parameter verbatim.
pub fn error_interceptor() -> ResponseInterceptor {
    Arc::new(|_session, _request, mut response| {
        Box::pin(async move {
            match response.error.take() {
                Some(data) => Err(Error::Rpc(data)),
                None => Ok(response),
            }
        })
    })
}

/// Normalize the result payload: `return_empty` calls resolve to null,
/// and a success without a result body resolves to null rather than
/// failing downstream.
pub fn extraction_interceptor() -> ResponseInterceptor {
    Arc::new(|_session, request, mut response| {
        Box::pin(async move {
            if request.return_empty == Some(true) {
                response.result = Some(Value::Null);
            } else if response.result.is_none() {
                response.result = Some(Value::Null);
            }
            Ok(response)
        })
    })
}
