//! Sentence-insertion problems.

use super::sentences::split_sentences;
use super::CIRCLED;
use crate::error::ForgeError;
use crate::problem::Problem;
use rand::Rng;
use serde_json::json;
use tracing::debug;

pub const MIN_SENTENCES: usize = 5;

const MAX_MARKERS: usize = 5;

const QUESTION: &str = "글의 흐름으로 보아, 주어진 문장이 들어가기에 가장 적절한 곳은?";

pub fn generate_insertion_problem(text: &str) -> Result<Problem, ForgeError> {
    generate_insertion_problem_with_rng(text, &mut rand::thread_rng())
}

/// Remove one of the 2nd to 4th sentences and ask where it belongs.
///
/// A marker `( ① )` precedes every remaining sentence after the first, and
/// one more closes the passage, five at most. The answer is the marker that
/// now stands where the removed sentence was.
pub fn generate_insertion_problem_with_rng<R: Rng + ?Sized>(
    text: &str,
    rng: &mut R,
) -> Result<Problem, ForgeError> {
    let mut sentences = split_sentences(text);
    if sentences.len() < MIN_SENTENCES {
        return Err(ForgeError::InsufficientSentences {
            required: MIN_SENTENCES,
            found: sentences.len(),
        });
    }

    let removed_at = rng.gen_range(1..=3);
    let target = sentences.remove(removed_at);

    let mut body = String::new();
    let mut markers = 0usize;
    for (i, sentence) in sentences.iter().enumerate() {
        if i > 0 {
            body.push(' ');
            if markers < MAX_MARKERS {
                body.push_str(&format!("( {} ) ", CIRCLED[markers]));
                markers += 1;
            }
        }
        body.push_str(sentence);
    }
    if markers < MAX_MARKERS {
        body.push_str(&format!(" ( {} )", CIRCLED[markers]));
        markers += 1;
    }

    // marker k sits before what was sentence k before the removal
    let answer = removed_at.clamp(1, markers);
    debug!("insertion problem: {} markers, answer {}", markers, answer);

    Ok(Problem {
        kind: "insertion".to_string(),
        question: format!("{QUESTION}\n\n{target}\n\n{body}"),
        options: Some(CIRCLED[..markers].iter().map(|s| s.to_string()).collect()),
        answer: answer.to_string(),
        explanation: None,
        metadata: Some(json!({
            "insertSentence": target,
            "markers": markers,
        })),
    })
}
