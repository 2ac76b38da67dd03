// Prompt constants for answer grading.

pub const GRADING_SYSTEM: &str = "You are an expert technical evaluator scoring a candidate's \
    answer to an interview question. Be strict and consistent.";

/// Replace: {question_type}, {question}, {keywords}, {answer}, {context}
pub const GRADING_PROMPT_TEMPLATE: &str = r#"## Question
Type: {question_type}
Question: {question}

## Expected keywords / concepts
{keywords}

## Candidate's answer
{answer}

## Supporting context
{context}

## Task
Score the answer on each dimension from 0 to 10:
1. understanding: does the candidate grasp the core concepts?
2. technical: is the explanation technically deep and well reasoned?
3. accuracy: is it factually correct given the context?
4. communication: is it clear and well structured?
5. relevance: does it address the question asked?

Scale: 0-3 poor, 4-6 partial, 7-8 good, 9-10 exceptional.

Set "inconsistency" to true only if the answer contradicts the supporting context or
describes code or requirements that do not exist there.

Return a JSON object with this EXACT schema:
{
  "understanding": 7,
  "technical": 6,
  "accuracy": 8,
  "communication": 7,
  "relevance": 9,
  "feedback": "One or two sentences of feedback.",
  "strengths": ["short phrase"],
  "weaknesses": ["short phrase"],
  "inconsistency": false
}"#;

/// Characters of context quoted into a grading prompt.
pub const MAX_CONTEXT_CHARS: usize = 2000;
