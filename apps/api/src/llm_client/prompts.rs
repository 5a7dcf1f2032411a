// Shared prompt fragments.
// Each service that needs LLM calls defines its own prompts.rs alongside it.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You are a precise, structured assistant. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Instruction that keeps recommendations inside the supplied company list.
pub const GROUNDING_INSTRUCTION: &str = "\
    CRITICAL: Only recommend companies that appear verbatim in the AVAILABLE COMPANIES list. \
    Copy each company_name exactly as written there. \
    Do NOT invent companies, booths or venues.";
