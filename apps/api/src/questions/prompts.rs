// Prompt constants for question generation.
// Cross-cutting fragments come from llm_client::prompts.

pub const QUESTION_GENERATION_SYSTEM: &str = "You are a senior technical interviewer. \
    You write interview questions that test whether a candidate really understands \
    the material in front of them.";

/// Shared schema and distribution rules.
/// Replace: {role}, {role_description}, {skills}, {source_kind}, {source}, {grounding_instruction}
pub const QUESTION_GENERATION_TEMPLATE: &str = r#"{grounding_instruction}

Write exactly 10 interview questions for a {role} candidate ({role_description}).
Key skills for this role: {skills}

The questions are based on the following {source_kind}:
---
{source}
---

DISTRIBUTION (mandatory):
- question_type: exactly 2 "why", 3 "what", 3 "how", 2 "where"
- difficulty: exactly 3 "easy", 5 "medium", 2 "hard"

QUESTION TYPES:
- "why": design decisions and trade-offs
- "what": concepts, components and their purpose
- "how": implementation details and data flow
- "where": locating functionality, boundaries, debugging entry points

Return a JSON object with this EXACT schema:
{
  "questions": [
    {
      "text": "How does the retry loop decide when to give up?",
      "question_type": "how",
      "difficulty": "medium",
      "context": "src/client.rs or the requirement this question targets",
      "expected_keywords": ["backoff", "attempts"],
      "evaluation_criteria": ["Explains the stop condition"]
    }
  ]
}"#;

pub const JOB_DESCRIPTION_SOURCE: &str = "job description";
pub const REPOSITORY_SOURCE: &str = "repository analysis (project summary and code artifacts)";
