// Shared prompt fragments.
// Each agent defines its own prompts alongside it (agents::prompts); this file
// holds the cross-cutting rules every analysis prompt carries.

/// Appended to every analysis prompt: JSON only, no fences.
pub const JSON_INSTRUCTION: &str = "\
    IMPORTANT: Return a plain JSON object only. \
    Do NOT wrap the JSON in markdown code fences. \
    Do NOT include any text outside the JSON object.";

/// The anti-hallucination rule shared by screening and matching.
pub const EVIDENCE_INSTRUCTION: &str = "\
    CRITICAL: You MUST NOT hallucinate. Every factual claim must be supported by evidence \
    from session memory. For each claim, call search_memory with the exact text you rely on \
    and copy the returned snippet, its memory key (as `source`) and its `offset` into the \
    claim's evidence array exactly as returned. Never write a snippet you did not get back \
    from search_memory. If a search returns no matches, do not make the claim. \
    Use no tool other than search_memory.";
