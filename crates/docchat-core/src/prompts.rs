//! Prompt builders for every generation-collaborator call.
//!
//! Each builder returns `(system_prompt, user_prompt)`.

use std::collections::BTreeMap;

/// Rewrite a follow-up into a standalone question.
pub fn follow_up(topic: &str, last_query: &str, message: &str) -> (String, String) {
    (
        "Convert follow-up questions into standalone, context-aware search queries. \
         Reply with the rewritten question only."
            .to_string(),
        format!(
            "Previous topic: {topic}\n\
             Last query: {last_query}\n\
             Follow-up: {message}\n\n\
             Create a standalone question that explicitly includes the needed context."
        ),
    )
}

/// Light normalisation of a standalone query.
pub fn normalize(message: &str, key_terms: &BTreeMap<String, Vec<String>>) -> (String, String) {
    let mut user = String::from(
        "Improve this query for document search:\n\
         1. Correct spelling and grammar\n\
         2. Expand domain-specific abbreviations\n\
         3. Maintain the original intent\n",
    );
    if !key_terms.is_empty() {
        user.push_str("Prefer these formal terms where a variation is used:\n");
        for (term, variations) in key_terms {
            user.push_str(&format!("- {}: {}\n", term, variations.join(", ")));
        }
    }
    user.push_str(&format!("\nOriginal: {message}\nImproved:"));
    (
        "You are a query optimization engine. Reply with the improved query only.".to_string(),
        user,
    )
}

/// Extract a short topic descriptor from a completed turn.
pub fn topic(query: &str, context: &str) -> (String, String) {
    (
        "Extract the topic of a conversation turn.".to_string(),
        format!(
            "Identify the core business topic of this interaction.\n\
             Query: {query}\n\
             Context: {context}\n\
             Return a 3-5 word topic descriptor focusing on key entities and actions."
        ),
    )
}

/// Extract key terms and their colloquial variations as strict JSON.
pub fn key_terms(sample: &str) -> (String, String) {
    (
        "Extract key terms and their variations from business documents. \
         Respond with a single JSON object and nothing else."
            .to_string(),
        format!(
            "Analyze this text and list the important business terms, policies, and \
             common concepts together with the variations people use for them.\n\
             Format: {{\"formal_term\": [\"variation1\", \"variation2\"]}}\n\n\
             Text: {sample}"
        ),
    )
}

/// Synthesize the final answer strictly from retrieved context.
pub fn answer(context: &str, question: &str) -> (String, String) {
    (
        "You are a precision-focused assistant answering from company documentation.".to_string(),
        format!(
            "Answer STRICTLY using the context. Follow these rules:\n\
             1. Cite exact numbers, dates and percentages when available\n\
             2. For policies, list all conditions and steps\n\
             3. Use bullet points for multi-part answers\n\
             4. If unsure, say \"According to documentation: [EXCERPT]\"\n\
             5. Never invent numbers\n\n\
             Context: {context}\n\
             Question: {question}\n\
             Answer:"
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_follow_up_mentions_topic_and_query() {
        let (_, user) = follow_up("refund policy", "How do refunds work?", "what about that?");
        assert!(user.contains("refund policy"));
        assert!(user.contains("How do refunds work?"));
        assert!(user.contains("what about that?"));
    }

    #[test]
    fn test_normalize_lists_key_terms() {
        let mut terms = BTreeMap::new();
        terms.insert("return policy".to_string(), vec!["refund".to_string()]);
        let (_, user) = normalize("refnd rules", &terms);
        assert!(user.contains("- return policy: refund"));
        assert!(user.ends_with("Original: refnd rules\nImproved:"));

        let (_, bare) = normalize("refnd rules", &BTreeMap::new());
        assert!(!bare.contains("formal terms"));
    }
}
