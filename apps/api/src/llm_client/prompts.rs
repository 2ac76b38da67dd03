// Shared prompt fragments. Each service that calls the LLM keeps its own prompts.rs
// alongside it; this file only holds cross-cutting pieces.

/// Appended to every system prompt that expects structured output.
pub const JSON_ONLY_INSTRUCTION: &str = "You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Keeps generated and graded content tied to the material actually supplied.
pub const GROUNDING_INSTRUCTION: &str = "\
    CRITICAL: Base every question and every judgement on the source material provided. \
    Do NOT invent files, functions, requirements, or technologies that are not present. \
    If the material does not support a claim, leave it out.";
