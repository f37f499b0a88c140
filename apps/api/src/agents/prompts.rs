// Prompt constants for the screening and matching agents.
// Reuses cross-cutting fragments from llm_client::prompts.

/// System prompt for the screening agent.
pub const SCREENING_SYSTEM: &str = "You are an HR screening agent. \
    You decide whether a candidate's resume contains sufficient and consistent information. \
    You never state a fact about the candidate that you have not located with the search_memory tool.";

/// Screening prompt. Replace `{evidence_instruction}`, `{json_instruction}`,
/// `{cv_key}` and `{cv_text}` before sending.
pub const SCREENING_PROMPT_TEMPLATE: &str = r#"Screen the resume stored in session memory under the key '{cv_key}'.

{evidence_instruction}

Steps:
- Call search_memory to find the candidate's name, employment dates, roles and key skills.
- Judge whether the resume is complete and internally consistent.
- Form your decision from evidence returned by search_memory only.

Return a JSON object with this EXACT schema:
{
  "status": "SUCCESS" | "INSUFFICIENT_DOCUMENT",
  "decision": "APPROVE" | "REJECT" | "APPROVE_WITH_RECOMMENDATIONS",
  "summary": "one-paragraph explanation, including the candidate's name if found",
  "claims": [
    {
      "text": "Candidate has 5 years of Go experience",
      "evidence": [{"snippet": "5 years of Go", "source": "{cv_key}", "offset": 0}],
      "verdict": "supported"
    }
  ]
}
If the resume is empty or unreadable, return status INSUFFICIENT_DOCUMENT with an empty claims array.

{json_instruction}

RESUME TEXT:
{cv_text}"#;

/// System prompt for the talent matching agent.
pub const MATCHING_SYSTEM: &str = "You are an expert talent matching agent. \
    You match a candidate's resume against a job description. \
    Every statement about a match or a gap must be backed by text located with the search_memory tool.";

/// Matching prompt. Replace `{evidence_instruction}`, `{json_instruction}`,
/// `{cv_key}`, `{jd_key}`, `{cv_text}` and `{jd_text}` before sending.
pub const MATCHING_PROMPT_TEMPLATE: &str = r#"Match the resume in session memory key '{cv_key}' against the job description in key '{jd_key}'.

{evidence_instruction}

Analysis criteria:
- Most of the qualifications, skills and experience the job description requires must appear in the resume for a successful match.
- Most of the technologies the job description lists must appear in the resume for a successful match.
- Record each key match and each gap as a separate claim. A gap claim cites the job description requirement it refers to.

Return a JSON object with this EXACT schema:
{
  "status": "SUCCESS" | "INSUFFICIENT_DOCUMENT",
  "decision": "PROCEED_TO_INTERVIEW" | "REJECT",
  "summary": "short summary of the resume (with the candidate's name), the role, and the reason for the decision",
  "claims": [
    {
      "text": "Role requires Kubernetes and the candidate operated Kubernetes clusters",
      "evidence": [
        {"snippet": "Kubernetes", "source": "{jd_key}", "offset": 120},
        {"snippet": "operated Kubernetes clusters", "source": "{cv_key}", "offset": 48}
      ],
      "verdict": "match" | "gap"
    }
  ]
}
If either document is empty or unreadable, return status INSUFFICIENT_DOCUMENT with an empty claims array.

{json_instruction}

RESUME TEXT:
{cv_text}

JOB DESCRIPTION TEXT:
{jd_text}"#;
