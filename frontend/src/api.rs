use gloo_net::http::Request;
use js_sys::{Reflect, Uint8Array};
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::ReadableStreamDefaultReader;

use crate::models::{RelayRequest, Turn};

/// Base URL of the relay server.
const API_BASE: &str = "http://localhost:3000";
/// Header the relay reads the caller id from.
const AUTH_HEADER: &str = "x-user-id";
const CHAT_ID_HEADER: &str = "X-Chat-Id";
const CALLER_STORAGE_KEY: &str = "stream-chat.caller-id";

/// Anonymous caller id, kept in `localStorage` so a browser keeps owning
/// the conversations it started.
pub fn caller_id() -> String {
    let storage = web_sys::window().and_then(|w| w.local_storage().ok().flatten());

    if let Some(existing) = storage
        .as_ref()
        .and_then(|s| s.get_item(CALLER_STORAGE_KEY).ok().flatten())
    {
        return existing;
    }

    let id = format!(
        "anon-{:x}-{:x}",
        js_sys::Date::now() as u64,
        (js_sys::Math::random() * u32::MAX as f64) as u32
    );
    if let Some(storage) = storage {
        if storage.set_item(CALLER_STORAGE_KEY, &id).is_err() {
            log::warn!("Could not persist caller id, conversations will not survive a reload");
        }
    }
    id
}

/// Response head of a relay call.
pub struct RelayResponse {
    /// Value of `X-Chat-Id`, if the relay sent one.
    pub conversation_id: Option<String>,
    status: u16,
    ok: bool,
    body: Option<web_sys::ReadableStream>,
}

impl RelayResponse {
    /// Succeeds only for a successful response with an open body.
    pub fn into_stream(self) -> Result<BodyReader, String> {
        if !self.ok {
            return Err(format!("Server error: {}", self.status));
        }
        let stream = self.body.ok_or_else(|| "Streaming failed: empty body".to_string())?;
        Ok(BodyReader {
            reader: stream.get_reader().unchecked_into::<ReadableStreamDefaultReader>(),
        })
    }
}

/// Reads a response body one network chunk at a time.
pub struct BodyReader {
    reader: ReadableStreamDefaultReader,
}

impl BodyReader {
    /// Next raw chunk, or `None` once the stream is closed.
    pub async fn next_chunk(&self) -> Result<Option<Vec<u8>>, String> {
        let result = JsFuture::from(self.reader.read())
            .await
            .map_err(|e| format!("Read error: {e:?}"))?;

        let done = Reflect::get(&result, &JsValue::from_str("done"))
            .map_err(|e| format!("Read error: {e:?}"))?
            .as_bool()
            .unwrap_or(true);
        if done {
            return Ok(None);
        }

        let value = Reflect::get(&result, &JsValue::from_str("value"))
            .map_err(|e| format!("Read error: {e:?}"))?;
        Ok(Some(Uint8Array::new(&value).to_vec()))
    }

    /// Abandons the stream; the relay sees the client disconnect.
    pub fn cancel(&self) {
        let _ = self.reader.cancel();
    }
}

/// Posts a turn to the relay and returns once the response head arrives.
pub async fn open_relay(
    turn: &Turn,
    conversation_id: Option<&str>,
    language: &str,
) -> Result<RelayResponse, String> {
    let body = RelayRequest {
        message: turn.clone(),
        language: language.to_string(),
    };

    let resp = Request::post(&format!("{API_BASE}/api/messages"))
        .query([("conversationRef", conversation_id.unwrap_or_default())])
        .header(AUTH_HEADER, &caller_id())
        .json(&body)
        .map_err(|e| format!("Serialize error: {e}"))?
        .send()
        .await
        .map_err(|e| format!("Network error: {e}"))?;

    Ok(RelayResponse {
        conversation_id: resp.headers().get(CHAT_ID_HEADER).filter(|id| !id.is_empty()),
        status: resp.status(),
        ok: resp.ok(),
        body: resp.body(),
    })
}
