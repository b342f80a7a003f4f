use serde_json::{json, Value};
use uuid::Uuid;

pub const SYSTEM_PROMPT: &str = "You are an analyst reviewing point-of-sale cashier transcripts for upsell \
behavior. Read the transcript and return ONLY a JSON object matching the given schema. Do not add \
commentary outside the JSON.";

pub fn user_prompt(transcript: &str, duration_sec: f64, point_id: Uuid, register_id: Uuid) -> String {
    format!(
        "Point: {point_id}\nRegister: {register_id}\nDialogue duration: {duration_sec:.1}s\n\nTranscript:\n\"\"\"\n{transcript}\n\"\"\"\n\n\
Evaluate whether the cashier attempted an upsell and how it went.",
    )
}

/// The structured-output schema, shared verbatim between the
/// schema-constrained call and the JSON-mode fallback (where it is
/// embedded directly into the prompt instead of passed as a tool schema).
pub fn upsell_analysis_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "attempted": {"type": "string", "enum": ["yes", "no", "uncertain"]},
            "quality_score": {"type": "integer", "minimum": 0, "maximum": 3},
            "categories": {
                "type": "array",
                "items": {
                    "type": "string",
                    "enum": ["coffee_size", "dessert", "pastry", "add_ons", "syrup", "combo", "takeaway", "other"]
                }
            },
            "closing_question": {"type": "boolean"},
            "customer_reaction": {"type": "string", "enum": ["accepted", "rejected", "unclear"]},
            "evidence_quotes": {
                "type": "array",
                "items": {"type": "string", "maxLength": 100},
                "maxItems": 3
            },
            "summary": {"type": "string", "maxLength": 200},
            "confidence": {"type": "number", "minimum": 0.0, "maximum": 1.0}
        },
        "required": [
            "attempted", "quality_score", "categories", "closing_question",
            "customer_reaction", "evidence_quotes", "summary", "confidence"
        ],
        "additionalProperties": false
    })
}

pub fn schema_embedded_json_mode_prompt(transcript: &str, duration_sec: f64, point_id: Uuid, register_id: Uuid) -> String {
    format!(
        "{}\n\nRespond with a JSON object matching exactly this schema:\n{}",
        user_prompt(transcript, duration_sec, point_id, register_id),
        serde_json::to_string_pretty(&upsell_analysis_schema()).unwrap_or_default(),
    )
}
