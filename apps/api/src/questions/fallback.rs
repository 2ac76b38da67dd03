//! Static 10-question template used whenever generation fails or returns the wrong shape.
//! Pure and infallible: the same role always yields the same questions.

use crate::models::question::{Difficulty, Question, QuestionType};
use crate::questions::number_questions;
use crate::roles::RoleType;

struct Slot {
    question_type: QuestionType,
    difficulty: Difficulty,
    /// `{skill}` is replaced with one of the role's required skills.
    template: &'static str,
    /// Index into the role's required skills (wraps).
    skill: usize,
    keywords: &'static [&'static str],
    criteria: &'static [&'static str],
}

const SLOTS: [Slot; 10] = [
    Slot {
        question_type: QuestionType::Why,
        difficulty: Difficulty::Easy,
        template: "Why did you choose your approach to {skill} in a recent project, and what alternatives did you consider?",
        skill: 0,
        keywords: &["because", "alternative", "trade-off"],
        criteria: &["Names a concrete alternative", "Explains the deciding factor"],
    },
    Slot {
        question_type: QuestionType::Why,
        difficulty: Difficulty::Medium,
        template: "Why does {skill} matter for the reliability of a production system you have worked on?",
        skill: 1,
        keywords: &["reliability", "failure", "impact"],
        criteria: &["Connects the skill to a failure mode", "Gives a real example"],
    },
    Slot {
        question_type: QuestionType::What,
        difficulty: Difficulty::Easy,
        template: "What are the core building blocks of {skill} as you have used them?",
        skill: 2,
        keywords: &["component", "concept", "example"],
        criteria: &["Identifies the main concepts correctly"],
    },
    Slot {
        question_type: QuestionType::What,
        difficulty: Difficulty::Medium,
        template: "What problems did you run into with {skill}, and what did you change as a result?",
        skill: 3,
        keywords: &["problem", "fix", "change", "result"],
        criteria: &["Describes a specific problem", "Explains the change made"],
    },
    Slot {
        question_type: QuestionType::What,
        difficulty: Difficulty::Hard,
        template: "What would break first if the load on the part of your system that handles {skill} grew tenfold?",
        skill: 4,
        keywords: &["bottleneck", "scale", "limit", "latency"],
        criteria: &["Identifies a plausible bottleneck", "Proposes a mitigation"],
    },
    Slot {
        question_type: QuestionType::How,
        difficulty: Difficulty::Easy,
        template: "How did you set up {skill} in your project, step by step?",
        skill: 0,
        keywords: &["setup", "configure", "step"],
        criteria: &["Steps are in a sensible order"],
    },
    Slot {
        question_type: QuestionType::How,
        difficulty: Difficulty::Medium,
        template: "How do you test code that depends on {skill}?",
        skill: 1,
        keywords: &["test", "mock", "assert", "coverage"],
        criteria: &["Describes an isolation strategy", "Mentions what is asserted"],
    },
    Slot {
        question_type: QuestionType::How,
        difficulty: Difficulty::Medium,
        template: "How does data flow through the part of your code responsible for {skill}?",
        skill: 2,
        keywords: &["input", "output", "flow", "function"],
        criteria: &["Traces data through concrete components"],
    },
    Slot {
        question_type: QuestionType::Where,
        difficulty: Difficulty::Medium,
        template: "Where in your codebase would you look first when something related to {skill} fails?",
        skill: 3,
        keywords: &["log", "module", "file", "debug"],
        criteria: &["Points at a specific location", "Describes a debugging path"],
    },
    Slot {
        question_type: QuestionType::Where,
        difficulty: Difficulty::Hard,
        template: "Where would you draw module boundaries to keep {skill} concerns isolated as the project grows?",
        skill: 5,
        keywords: &["boundary", "module", "interface", "coupling"],
        criteria: &["Proposes explicit boundaries", "Justifies the split"],
    },
];

/// The fallback question set for `role`, already numbered 1..=10.
pub fn fallback_questions(role: RoleType) -> Vec<Question> {
    let skills = role.profile().required_skill_names();

    let questions = SLOTS
        .iter()
        .map(|slot| {
            let skill = skills
                .get(slot.skill % skills.len().max(1))
                .copied()
                .unwrap_or(role.as_str());
            let mut expected_keywords: Vec<String> = skill
                .split(|c: char| !c.is_alphanumeric())
                .filter(|w| w.len() > 2)
                .map(str::to_lowercase)
                .collect();
            expected_keywords.extend(slot.keywords.iter().map(|k| k.to_string()));

            Question {
                index: 0,
                text: slot.template.replace("{skill}", skill),
                question_type: slot.question_type,
                difficulty: slot.difficulty,
                context: format!("{} role: {skill}", role.as_str()),
                expected_keywords,
                evaluation_criteria: slot.criteria.iter().map(|c| c.to_string()).collect(),
            }
        })
        .collect();

    number_questions(questions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_is_numbered_and_deterministic() {
        let first = fallback_questions(RoleType::DevOps);
        let second = fallback_questions(RoleType::DevOps);
        assert_eq!(first, second);
        let indices: Vec<u8> = first.iter().map(|q| q.index).collect();
        assert_eq!(indices, (1..=10).collect::<Vec<u8>>());
    }

    #[test]
    fn test_fallback_is_parameterised_by_role() {
        let frontend = fallback_questions(RoleType::Frontend);
        let ml = fallback_questions(RoleType::Ml);
        assert!(frontend[0].text.contains("React"));
        assert!(ml[0].text.contains("Model Training"));
        assert!(!frontend[0].text.contains("{skill}"));
    }

    #[test]
    fn test_fallback_keywords_include_skill_words() {
        let backend = fallback_questions(RoleType::Backend);
        assert!(backend[0].expected_keywords.contains(&"web".to_string()));
        assert!(backend[0].expected_keywords.contains(&"frameworks".to_string()));
    }
}
