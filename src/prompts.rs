//! Instructions sent to the models.
//!
//! Schema text is interpolated verbatim: it is never parsed or validated,
//! only shown to the model as a target shape.

/// System message for the OCR structuring call.
pub const STRUCTURING_SYSTEM_PROMPT: &str = "You are a data extractor. Output only valid JSON.";

/// Instruction for the vision model.
///
/// Demands a JSON-only reply; with a schema, demands conformance to it.
pub fn vision_prompt(schema: Option<&str>) -> String {
    match schema {
        Some(schema) => format!(
            "I want you to generate a JSON file of the document with no other text. \
Just a JSON file according to this schema: {schema} . JSON file : "
        ),
        None => "I want you to generate a JSON file of the document with no other text. \
Just a JSON file. JSON file : "
            .to_string(),
    }
}

/// User message for the OCR structuring call.
pub fn structuring_prompt(ocr_text: &str, schema: Option<&str>) -> String {
    let mut prompt = format!(
        "You are an expert in data extraction. Here is raw text produced by OCR:\n\n\
--- OCR DATA ---\n\
{ocr_text}\n\
----------------\n\n\
Your task:\n\
1. Analyse this text to identify the key information.\n\
2. Correct obvious OCR errors.\n\
3. Produce a single structured JSON object containing this information.\n"
    );
    if let Some(schema) = schema {
        prompt.push_str(&format!(
            "4. The JSON object must conform to this schema:\n{schema}\n"
        ));
    }
    prompt.push_str(
        "\nIMPORTANT: Answer ONLY with the JSON. No introduction, no markdown \
(```json). Just the raw JSON.",
    );
    prompt
}
