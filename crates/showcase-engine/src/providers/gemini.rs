use std::thread;
use std::time::Duration;

use anyhow::{bail, Context};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Map, Value};
use showcase_contracts::brief::ProjectBrief;
use showcase_contracts::verify::{lenient_json_object, parse_verdict, Verdict};

use super::{
    ConsistencyJudge, ImageData, ImageSynthesizer, JudgeRequest, ProjectAnalyst,
    SynthesisRequest,
};
use crate::config::EngineSettings;
use crate::prompts;
use crate::truncate_text;

const VISION_MAX_DIM: u32 = 1024;

/// Google Generative Language transport for synthesis, judging and analysis.
pub struct GeminiProvider {
    http: HttpClient,
    api_key: String,
    api_base: String,
    image_model: String,
    vision_model: String,
    text_model: String,
    request_timeout_s: f64,
    transport_retries: usize,
    retry_backoff_s: f64,
}

impl GeminiProvider {
    pub fn new(settings: &EngineSettings) -> anyhow::Result<Self> {
        let Some(api_key) = settings.api_key.clone() else {
            bail!("GEMINI_API_KEY, GOOGLE_API_KEY or GOOGLE_AI_API_KEY not set");
        };
        Ok(Self {
            http: HttpClient::new(),
            api_key,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            image_model: settings.image_model.clone(),
            vision_model: settings.vision_model.clone(),
            text_model: settings.text_model.clone(),
            request_timeout_s: settings.request_timeout_s,
            transport_retries: settings.transport_retries,
            retry_backoff_s: settings.retry_backoff_s,
        })
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn default_safety_settings() -> Vec<Value> {
        [
            "HARM_CATEGORY_HARASSMENT",
            "HARM_CATEGORY_HATE_SPEECH",
            "HARM_CATEGORY_SEXUALLY_EXPLICIT",
            "HARM_CATEGORY_DANGEROUS_CONTENT",
        ]
        .into_iter()
        .map(|category| {
            json!({
                "category": category,
                "threshold": "OFF",
            })
        })
        .collect()
    }

    fn generate_content(
        &self,
        model: &str,
        parts: Vec<Value>,
        generation_config: Value,
    ) -> anyhow::Result<Value> {
        let endpoint = self.endpoint_for_model(model);
        let payload = json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": generation_config,
            "safetySettings": Self::default_safety_settings(),
        });
        let response = self.post_with_transport_retries(&endpoint, &payload)?;
        response_json_or_error("Gemini", response)
    }

    fn post_with_transport_retries(
        &self,
        endpoint: &str,
        payload: &Value,
    ) -> anyhow::Result<HttpResponse> {
        let mut attempt = 0usize;
        loop {
            let response = self
                .http
                .post(endpoint)
                .query(&[("key", self.api_key.as_str())])
                .timeout(Duration::from_secs_f64(self.request_timeout_s))
                .json(payload)
                .send();

            match response {
                Ok(ok) => return Ok(ok),
                Err(raw) => {
                    let err = anyhow::Error::new(raw)
                        .context(format!("Gemini request failed ({endpoint})"));
                    if !is_retryable_transport_error(&err) || attempt >= self.transport_retries {
                        return Err(err);
                    }
                    attempt += 1;
                    thread::sleep(Duration::from_secs_f64(
                        self.retry_backoff_s * attempt as f64,
                    ));
                }
            }
        }
    }

    fn text_reply(&self, model: &str, parts: Vec<Value>, config: Value) -> anyhow::Result<String> {
        let payload = self.generate_content(model, parts, config)?;
        let text = extract_text(&payload);
        if text.is_empty() {
            bail!("Gemini returned no text ({model})");
        }
        Ok(text)
    }
}

impl ImageSynthesizer for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn synthesize(&self, request: &SynthesisRequest<'_>) -> anyhow::Result<Option<ImageData>> {
        let mut parts = Vec::new();
        if let Some(reference) = request.reference {
            parts.push(inline_part(reference));
        }
        parts.push(json!({ "text": request.instruction }));
        let config = json!({
            "responseModalities": ["IMAGE", "TEXT"],
            "temperature": 1.0,
            "imageConfig": {
                "aspectRatio": request.aspect_ratio,
                "imageSize": "2K",
            },
        });
        let payload = self.generate_content(&self.image_model, parts, config)?;
        Ok(extract_image_items(&payload)?.into_iter().next())
    }
}

impl ConsistencyJudge for GeminiProvider {
    fn judge(&self, request: &JudgeRequest<'_>) -> anyhow::Result<Verdict> {
        let parts = vec![
            vision_part(request.reference),
            vision_part(request.candidate),
            json!({ "text": prompts::rubric_prompt(request.profile, request.shot, request.brief) }),
        ];
        let config = json!({
            "responseMimeType": "application/json",
            "temperature": 1.0,
        });
        let text = self.text_reply(&self.vision_model, parts, config)?;
        parse_verdict(&text)
    }
}

impl ProjectAnalyst for GeminiProvider {
    fn parse_brief(&self, prompt: &str) -> anyhow::Result<ProjectBrief> {
        let parts = vec![json!({ "text": prompts::brief_parse_prompt(prompt) })];
        let config = json!({
            "responseMimeType": "application/json",
            "temperature": 1.0,
        });
        let text = self.text_reply(&self.text_model, parts, config)?;
        ProjectBrief::from_analyst_reply(&text, prompt)
    }

    fn describe_reference(&self, image: &ImageData) -> anyhow::Result<String> {
        let parts = vec![
            vision_part(image),
            json!({ "text": prompts::describe_reference_prompt() }),
        ];
        self.text_reply(&self.vision_model, parts, json!({ "temperature": 1.0 }))
    }

    fn analyze_inspiration(&self, image: &ImageData) -> anyhow::Result<Map<String, Value>> {
        let parts = vec![
            vision_part(image),
            json!({ "text": prompts::style_analysis_prompt() }),
        ];
        let config = json!({
            "responseMimeType": "application/json",
            "temperature": 0.5,
        });
        let text = self.text_reply(&self.vision_model, parts, config)?;
        lenient_json_object(&text).context("Gemini returned an unusable style analysis")
    }
}

fn inline_part(image: &ImageData) -> Value {
    json!({
        "inlineData": {
            "mimeType": image.mime_type,
            "data": BASE64.encode(&image.bytes),
        }
    })
}

/// Downscaled JPEG copy for vision calls; falls back to the original bytes.
fn vision_part(image: &ImageData) -> Value {
    match downscale_for_vision(&image.bytes, VISION_MAX_DIM) {
        Some(bytes) => inline_part(&ImageData::new(bytes, "image/jpeg")),
        None => inline_part(image),
    }
}

fn downscale_for_vision(bytes: &[u8], max_dim: u32) -> Option<Vec<u8>> {
    let decoded = image::load_from_memory(bytes).ok()?;
    let resized = if decoded.width().max(decoded.height()) > max_dim {
        decoded.resize(max_dim, max_dim, FilterType::Triangle)
    } else {
        decoded
    };
    let rgb = resized.to_rgb8();
    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, 90);
    encoder.encode_image(&rgb).ok()?;
    Some(out)
}

fn extract_image_items(response_payload: &Value) -> anyhow::Result<Vec<ImageData>> {
    let candidates = response_payload
        .get("candidates")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let mut out = Vec::new();

    for candidate in candidates {
        let parts = candidate
            .get("content")
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for part in parts {
            let Some(inline) = part
                .get("inlineData")
                .or_else(|| part.get("inline_data"))
                .and_then(Value::as_object)
            else {
                continue;
            };
            let data = inline
                .get("data")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if data.is_empty() {
                continue;
            }
            let mime_type = inline
                .get("mimeType")
                .or_else(|| inline.get("mime_type"))
                .and_then(Value::as_str)
                .unwrap_or("image/png");
            if !mime_type.starts_with("image/") {
                continue;
            }
            let bytes = BASE64
                .decode(data.as_bytes())
                .context("Gemini image base64 decode failed")?;
            out.push(ImageData::new(bytes, mime_type));
        }
    }

    Ok(out)
}

fn extract_text(response_payload: &Value) -> String {
    response_payload
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|rows| rows.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> anyhow::Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}

fn is_retryable_transport_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<reqwest::Error>()
            .map(|reqwest_err| {
                reqwest_err.is_timeout() || reqwest_err.is_connect() || reqwest_err.is_request()
            })
            .unwrap_or(false)
    })
}
