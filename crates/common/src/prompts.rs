//! Prompt templates for the language model collaborator

const EVALUATION_TEMPLATE: &str = r#"
You are a highly intelligent graph evaluator for a Retrieval-Augmented Generation system.
Your task is to evaluate the usefulness of a given Subgraph for answering a specific User Query.

Based on the following criteria, please provide a score from 0.0 to 1.0.
1.  **Richness**: How much useful information does the subgraph contain?
2.  **Relevance**: How directly relevant is the information to the User Query? Ignore irrelevant information.
3.  **Connectivity**: Are the entities and relationships well-connected to form a coherent story for the query?

Provide your output ONLY in JSON format like this: {"score": 0.85, "reason": "The subgraph is highly relevant..."}

---
**User Query:** "{query}"

**Subgraph to Evaluate:**
{subgraph}
---
"#;

const ENTITY_EXTRACTION_TEMPLATE: &str = r#"
You are a Named Entity Recognition specialist.
From the User Query below, extract all key entities such as people, organizations, locations, or concepts.
Extract ONLY the names of the entities.

Your output MUST be a JSON array of strings, like this: ["entity1", "entity2", "entity3"]

---
**User Query:** "{query}"
---
"#;

const FINAL_ANSWER_TEMPLATE: &str = r#"
You are a helpful AI assistant answering questions based on the context provided from a knowledge graph.
Your task is to synthesize the information in the 'Context' section to answer the 'User's Question'.
Answer ONLY with the information provided in the context. Do not use any of your prior knowledge.
If the context does not contain the answer, say that you cannot find the answer in the provided information.
{language}
---
**[Context from Knowledge Graph]**
{context}
---
**[User's Question]**
{query}
"#;

/// Prompt asking the model to score a rendered subgraph against the query
pub fn evaluation_prompt(query: &str, rendered_subgraph: &str) -> String {
    fill(
        EVALUATION_TEMPLATE,
        &[("query", query), ("subgraph", rendered_subgraph)],
    )
}

/// Prompt asking the model for the entity names mentioned in the query
pub fn entity_extraction_prompt(query: &str) -> String {
    fill(ENTITY_EXTRACTION_TEMPLATE, &[("query", query)])
}

/// Prompt asking the model to answer from the serialized context only
pub fn final_answer_prompt(context: &str, query: &str, answer_language: Option<&str>) -> String {
    let language = match answer_language {
        Some(lang) if !lang.trim().is_empty() => format!("Answer in {}.\n", lang.trim()),
        _ => String::new(),
    };

    fill(
        FINAL_ANSWER_TEMPLATE,
        &[("language", &language), ("context", context), ("query", query)],
    )
}

/// Single-pass placeholder substitution; substituted text is never rescanned
fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len() + 256);
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let replaced = tail.find('}').and_then(|close| {
            let key = &tail[1..close];
            values
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v, close))
        });

        match replaced {
            Some((value, close)) => {
                out.push_str(value);
                rest = &tail[close + 1..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluation_prompt_embeds_query_and_subgraph() {
        let prompt = evaluation_prompt("Why did Son move?", "Entities:\n- Son (Player)\n");
        assert!(prompt.contains("**User Query:** \"Why did Son move?\""));
        assert!(prompt.contains("- Son (Player)"));
        assert!(prompt.contains("{\"score\": 0.85"));
    }

    #[test]
    fn test_entity_extraction_prompt() {
        let prompt = entity_extraction_prompt("Who is LAFC's owner?");
        assert!(prompt.contains("JSON array of strings"));
        assert!(prompt.contains("Who is LAFC's owner?"));
    }

    #[test]
    fn test_final_prompt_language_line() {
        let with_lang = final_answer_prompt("ctx", "q", Some("Korean"));
        assert!(with_lang.contains("Answer in Korean.\n"));

        let without = final_answer_prompt("ctx", "q", None);
        assert!(!without.contains("Answer in"));
        assert!(without.contains("**[Context from Knowledge Graph]**\nctx\n"));
    }

    #[test]
    fn test_user_text_is_not_reexpanded() {
        let prompt = final_answer_prompt("mentions {query} literally", "real question", None);
        assert!(prompt.contains("mentions {query} literally"));
        assert!(prompt.contains("**[User's Question]**\nreal question"));
    }
}
