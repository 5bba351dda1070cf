//! Prompt assembly for evaluator calls.
//!
//! Builds the per-hop evaluation prompt and the holistic re-validation
//! prompt. Both ask for a single JSON object so the reply can be parsed
//! into the closed decision vocabulary.

use bidscout_model::{CandidateSignal, Hypothesis};

use crate::backend::traits::ModelCapabilities;

/// Tokens kept free for the system prompt and the instructions.
const PROMPT_OVERHEAD_TOKENS: u32 = 768;

/// Never truncate evidence below this many characters.
const MIN_EVIDENCE_CHARS: usize = 2_000;

/// Assembles evaluator prompts.
pub struct EvaluationPrompt;

impl EvaluationPrompt {
    /// System prompt for per-hop evidence evaluation.
    pub fn evaluation_system() -> String {
        let mut prompt = String::new();

        prompt.push_str("# PROCUREMENT EVIDENCE EVALUATION\n\n");
        prompt.push_str("You judge whether a piece of web evidence supports a hypothesis that an\n");
        prompt.push_str("organization is about to buy, tender or procure something.\n\n");

        prompt.push_str("## DECISIONS\n\n");
        prompt.push_str("- ACCEPT: the evidence directly supports the hypothesis\n");
        prompt.push_str("- WEAK_ACCEPT: the evidence is related but indirect\n");
        prompt.push_str("- NO_PROGRESS: the evidence is irrelevant, empty or inconclusive\n");
        prompt.push_str("- REJECT: the evidence contradicts the hypothesis\n\n");

        prompt.push_str("## RULES\n\n");
        prompt.push_str("1. Judge only the text you are given; do not assume facts not in it\n");
        prompt.push_str("2. List each distinct procurement signal separately under \"signals\"\n");
        prompt.push_str("3. confidence_delta is a number between 0.0 and 0.10\n");
        prompt.push_str("4. Respond with one JSON object and nothing else\n");

        prompt
    }

    /// User prompt for one hypothesis and one piece of fetched evidence.
    pub fn evaluation_user(
        hypothesis: &Hypothesis,
        evidence_text: &str,
        capabilities: &ModelCapabilities,
    ) -> String {
        let mut prompt = String::new();

        prompt.push_str("# HYPOTHESIS\n\n");
        prompt.push_str(&format!("**Entity**: {}\n", hypothesis.entity_id));
        prompt.push_str(&format!("**Category**: {}\n", hypothesis.category));
        prompt.push_str(&format!("**Statement**: {}\n", hypothesis.statement));
        prompt.push_str(&format!(
            "**Current confidence**: {:.2}\n\n",
            hypothesis.current_confidence
        ));

        prompt.push_str("# EVIDENCE\n\n");
        prompt.push_str(truncate_evidence(evidence_text, capabilities));
        prompt.push_str("\n\n");

        prompt.push_str("## Required Response Format\n\n");
        prompt.push_str("```json\n");
        prompt.push_str("{\n");
        prompt.push_str("  \"decision\": \"ACCEPT|WEAK_ACCEPT|NO_PROGRESS|REJECT\",\n");
        prompt.push_str("  \"confidence_delta\": 0.0-0.10,\n");
        prompt.push_str("  \"reasoning\": \"<short explanation>\",\n");
        prompt.push_str("  \"signals\": [\n");
        prompt.push_str("    {\n");
        prompt.push_str("      \"type\": \"RFP_DETECTED|TENDER_NOTICE|HIRING|PARTNERSHIP|TECHNOLOGY_ADOPTION|EXECUTIVE_CHANGE\",\n");
        prompt.push_str("      \"category\": \"<signal category>\",\n");
        prompt.push_str("      \"description\": \"<one sentence>\",\n");
        prompt.push_str("      \"excerpt\": \"<quoted supporting text>\",\n");
        prompt.push_str("      \"decision\": \"ACCEPT|WEAK_ACCEPT\",\n");
        prompt.push_str("      \"confidence_delta\": 0.0-0.10\n");
        prompt.push_str("    }\n");
        prompt.push_str("  ]\n");
        prompt.push_str("}\n");
        prompt.push_str("```\n");

        prompt
    }

    /// System prompt for holistic signal re-validation.
    pub fn validation_system() -> String {
        let mut prompt = String::new();

        prompt.push_str("# SIGNAL RE-VALIDATION\n\n");
        prompt.push_str("You review a candidate procurement signal together with its full evidence\n");
        prompt.push_str("bundle. Judge the bundle as a whole: individually plausible items that do\n");
        prompt.push_str("not describe one coherent buying intent must be rejected.\n\n");
        prompt.push_str("Respond with one JSON object and nothing else.\n");

        prompt
    }

    /// User prompt carrying the candidate signal and its evidence.
    pub fn validation_user(signal: &CandidateSignal, capabilities: &ModelCapabilities) -> String {
        let mut prompt = String::new();

        prompt.push_str("# CANDIDATE SIGNAL\n\n");
        prompt.push_str(&format!("**Entity**: {}\n", signal.entity_id));
        prompt.push_str(&format!("**Type**: {}\n", signal.signal_type));
        prompt.push_str(&format!("**Category**: {}\n", signal.category));
        prompt.push_str(&format!("**Description**: {}\n", signal.description));
        prompt.push_str(&format!("**Confidence**: {:.2}\n\n", signal.confidence));

        prompt.push_str("# EVIDENCE BUNDLE\n\n");
        let mut bundle = String::new();
        for (i, item) in signal.evidence.iter().enumerate() {
            bundle.push_str(&format!(
                "{}. [{}] {} (credibility {:.2}, {})\n   {}\n",
                i + 1,
                item.hop_type,
                item.source,
                item.credibility_score,
                item.date.format("%Y-%m-%d"),
                item.excerpt
            ));
        }
        prompt.push_str(truncate_evidence(&bundle, capabilities));

        prompt.push_str("\n## Required Response Format\n\n");
        prompt.push_str("```json\n");
        prompt.push_str("{\"verdict\": \"PASS|REJECT\", \"reason\": \"<required when REJECT>\"}\n");
        prompt.push_str("```\n");

        prompt
    }

    /// Follow-up message sent after an unparseable reply.
    pub fn repair(error: &str) -> String {
        format!(
            "Your previous reply could not be parsed ({}). Reply again with only the JSON object in the required format.",
            error
        )
    }

    /// Estimate token count for a prompt (rough approximation).
    ///
    /// Uses 4 characters per token.
    pub fn estimate_tokens(prompt: &str) -> usize {
        prompt.len() / 4
    }
}

/// Cut evidence text to what fits the model's context window.
fn truncate_evidence<'a>(text: &'a str, capabilities: &ModelCapabilities) -> &'a str {
    let budget_tokens = capabilities
        .context_window
        .saturating_sub(capabilities.max_output_tokens)
        .saturating_sub(PROMPT_OVERHEAD_TOKENS);
    let max_chars = (budget_tokens as usize * 4).max(MIN_EVIDENCE_CHARS);

    if text.len() <= max_chars {
        return text;
    }

    let mut end = max_chars;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
