//! Prompts for AI-backed vocabulary problems.
//!
//! Every prompt the pipeline sends lives here so prompt changes are made in
//! one place and unit tests can inspect them without calling a model.

use crate::generate::vocabulary::{VocabularyRequest, VocabularyTarget, VocabularyVariant};

/// System prompt for vocabulary-usage item writing.
pub const VOCABULARY_SYSTEM_PROMPT: &str = r#"You are an experienced writer of Korean high-school English exams (수능 / 내신 style).
You write vocabulary-usage items: five words or short phrases in an English passage are underlined, and students judge whether each is used appropriately in context.

Rules:
1. Keep the passage's meaning, order and length. Only the underlined words may change.
2. Underline exactly five spans with <u>…</u>, spread across the passage, in reading order.
3. A misused span must be a plausible word (often an antonym or near-synonym) that clearly breaks the logic of its sentence.
4. Correctly used spans must be unambiguous in context.
5. Respond with a single JSON object. No Markdown fences, no commentary."#;

/// Guidance excerpted from the item-writing manual.
pub const MANUAL_EXCERPT: &str = r#"Item-writing manual (vocabulary):
- Choose content words (verbs, adjectives, nouns, adverbs) whose meaning is decided by the surrounding logic, not by grammar.
- Build a misuse by swapping in the opposite direction (increase ↔ decrease, accept ↔ reject, rare ↔ common).
- Never misuse a word in a way that only a grammar rule could detect.
- Each option reason states, in Korean, why the word fits or what it should be."#;

/// System prompt for the repair pass.
pub const REPAIR_SYSTEM_PROMPT: &str = r#"You fix malformed JSON payloads for English vocabulary exam items.
Return the corrected payload as a single JSON object with the same keys. Keep every field that was already correct. No Markdown fences, no commentary."#;

/// The JSON shape the model must return for `variant`.
pub fn json_blueprint(variant: &VocabularyVariant) -> String {
    let corrections = (1..=variant.incorrect_count)
        .map(|_| r#"{"index": <1-5>, "original": "<underlined word>", "replacement": "<word that fits>"}"#)
        .collect::<Vec<_>>()
        .join(",\n    ");
    format!(
        r#"{{
  "question": "{question}",
  "passage": "<full passage with exactly five <u>…</u> spans>",
  "options": ["① <span 1>", "② <span 2>", "③ <span 3>", "④ <span 4>", "⑤ <span 5>"],
  "answer": "<1-5>",
  "explanation": "<Korean explanation of the answer>",
  "optionReasons": {{"1": "<reason>", "2": "<reason>", "3": "<reason>", "4": "<reason>", "5": "<reason>"}},
  "corrections": [
    {corrections}
  ]
}}"#,
        question = variant.question,
    )
}

fn variant_instruction(variant: &VocabularyVariant) -> String {
    match variant.target {
        VocabularyTarget::Incorrect => format!(
            "Use {} spans correctly and misuse exactly {}. The answer is the misused span.",
            variant.correct_count, variant.incorrect_count
        ),
        VocabularyTarget::Correct => format!(
            "Use exactly {} span correctly and misuse the other {}. The answer is the correctly used span.",
            variant.correct_count, variant.incorrect_count
        ),
    }
}

/// User prompt for one attempt.
///
/// `tag` makes every attempt's prompt unique; `directives` are earlier
/// failure reasons the model must avoid repeating.
pub fn build_vocabulary_prompt(request: &VocabularyRequest, tag: &str, directives: &[String]) -> String {
    let variant = &request.variant;
    let mut prompt = format!(
        "[{tag}] Variant: {label} ({id})\n\n{manual}\n\nTask: {instruction}\n\
         Provide one `corrections` entry per misused span.\n\n\
         Passage #{index}:\n\"\"\"\n{passage}\n\"\"\"\n",
        label = variant.label,
        id = variant.id,
        manual = MANUAL_EXCERPT,
        instruction = variant_instruction(variant),
        index = request.passage_index + 1,
        passage = request.passage.trim(),
    );

    if let Some(extra) = request.extra_context.as_deref().filter(|s| !s.trim().is_empty()) {
        prompt.push_str(&format!("\nAdditional context:\n{}\n", extra.trim()));
    }

    if !directives.is_empty() {
        prompt.push_str("\nPrevious attempts were rejected. Fix these problems:\n");
        for d in directives {
            prompt.push_str(&format!("- {d}\n"));
        }
    }

    prompt.push_str(&format!("\nReturn JSON shaped exactly like:\n{}", json_blueprint(variant)));
    prompt
}

/// User prompt for the repair pass.
pub fn build_repair_prompt(raw: &str, reason: &str, variant: &VocabularyVariant) -> String {
    format!(
        "This payload was rejected: {reason}\n\n{instruction}\n\n\
         Payload:\n\"\"\"\n{raw}\n\"\"\"\n\nExpected shape:\n{blueprint}",
        instruction = variant_instruction(variant),
        raw = raw.trim(),
        blueprint = json_blueprint(variant),
    )
}
