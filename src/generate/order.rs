//! Sentence-order problems.
//!
//! The first sentence is shown as given context; the following three
//! (basic) or up to five (advanced) are shuffled and labelled `(A)`, `(B)`,
//! ... The options are a fixed list of orderings rather than ones derived
//! from the shuffle, so the true order can be missing from them. The answer
//! is then `"0"`, which [`crate::problem::is_valid`] rejects.

use super::sentences::split_sentences;
use crate::error::ForgeError;
use crate::problem::Problem;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

pub const MIN_SENTENCES: usize = 4;

const LABELS: [&str; 5] = ["(A)", "(B)", "(C)", "(D)", "(E)"];

pub const BASIC_OPTIONS: [&str; 6] = [
    "(A)-(C)-(B)",
    "(B)-(A)-(C)",
    "(B)-(C)-(A)",
    "(C)-(A)-(B)",
    "(C)-(B)-(A)",
    "(A)-(B)-(C)",
];

pub const ADVANCED_OPTIONS: [&str; 5] = [
    "(A)-(C)-(B)-(E)-(D)",
    "(B)-(D)-(A)-(C)-(E)",
    "(C)-(A)-(E)-(B)-(D)",
    "(D)-(B)-(E)-(A)-(C)",
    "(E)-(C)-(A)-(D)-(B)",
];

const QUESTION: &str = "주어진 글 다음에 이어질 글의 순서로 가장 적절한 것은?";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum Difficulty {
    #[default]
    Basic,
    Advanced,
}

impl Difficulty {
    fn span(self) -> usize {
        match self {
            Difficulty::Basic => 3,
            Difficulty::Advanced => 5,
        }
    }

    fn options(self) -> &'static [&'static str] {
        match self {
            Difficulty::Basic => &BASIC_OPTIONS,
            Difficulty::Advanced => &ADVANCED_OPTIONS,
        }
    }
}

pub fn generate_order_problem(text: &str, difficulty: Difficulty) -> Result<Problem, ForgeError> {
    generate_order_problem_with_rng(text, difficulty, &mut rand::thread_rng())
}

pub fn generate_order_problem_with_rng<R: Rng + ?Sized>(
    text: &str,
    difficulty: Difficulty,
    rng: &mut R,
) -> Result<Problem, ForgeError> {
    let sentences = split_sentences(text);
    if sentences.len() < MIN_SENTENCES {
        return Err(ForgeError::InsufficientSentences {
            required: MIN_SENTENCES,
            found: sentences.len(),
        });
    }

    let given = &sentences[0];
    let take = difficulty.span().min(sentences.len() - 1);
    let picked: Vec<&String> = sentences[1..=take].iter().collect();

    let mut shuffled: Vec<usize> = (0..picked.len()).collect();
    shuffled.shuffle(rng);

    // label of original sentence i = LABELS[position of i in the shuffle]
    let correct_order = (0..picked.len())
        .filter_map(|orig| shuffled.iter().position(|&s| s == orig))
        .map(|pos| LABELS[pos])
        .collect::<Vec<_>>()
        .join("-");

    let options: Vec<String> = difficulty.options().iter().map(|s| s.to_string()).collect();
    let answer = options
        .iter()
        .position(|o| *o == correct_order)
        .map_or(0, |i| i + 1);
    if answer == 0 {
        warn!(
            "Correct order {} is not among the {:?} options; answer is 0",
            correct_order, difficulty
        );
    }

    let labelled: Vec<String> = shuffled
        .iter()
        .enumerate()
        .map(|(pos, &orig)| format!("{} {}", LABELS[pos], picked[orig]))
        .collect();

    debug!("order problem: {} sentences, answer {}", picked.len(), answer);

    Ok(Problem {
        kind: "order".to_string(),
        question: format!("{QUESTION}\n\n{given}\n\n{}", labelled.join("\n")),
        options: Some(options),
        answer: answer.to_string(),
        explanation: Some(format!("정답 순서: {correct_order}")),
        metadata: Some(json!({
            "difficulty": difficulty,
            "given": given,
            "sentences": labelled,
            "correctOrder": correct_order,
        })),
    })
}
