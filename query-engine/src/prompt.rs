//! Grounded prompt assembly.

use vector_index::SearchHit;

/// Builds the bounded generation prompt from retrieved chunks.
///
/// Each chunk is labeled by position; the instruction template constrains
/// the model to the supplied context and to an explicit "not found" answer
/// instead of fabrication.
pub fn build_prompt(question: &str, hits: &[SearchHit]) -> String {
    let context = hits
        .iter()
        .enumerate()
        .map(|(i, hit)| format!("[Document {}]\n{}", i + 1, hit.content))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are a retrieval-augmented assistant.\n\
         Use ONLY the provided context to answer the question accurately.\n\
         \n\
         RESPONSE POLICY:\n\
         - Stick strictly to facts found in the context.\n\
         - Do not use outside knowledge or fabricate information.\n\
         - If the answer is not present, say: \"The provided context does not contain information about this.\"\n\
         - Respond in plain text only, without special formatting.\n\
         - Where helpful, combine information from multiple context chunks naturally.\n\
         \n\
         Context:\n\
         {context}\n\
         \n\
         User Question:\n\
         {question}\n\
         \n\
         Answer:\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(content: &str) -> SearchHit {
        SearchHit {
            score: 0.9,
            content: content.to_string(),
            source: "https://example.com".into(),
            title: "t".into(),
            chunk_index: 0,
            payload: serde_json::Value::Null,
        }
    }

    #[test]
    fn labels_chunks_by_position() {
        let prompt = build_prompt("what is rust?", &[hit("first"), hit("second")]);
        assert!(prompt.contains("[Document 1]\nfirst"));
        assert!(prompt.contains("[Document 2]\nsecond"));
        assert!(prompt.contains("what is rust?"));
    }

    #[test]
    fn constrains_to_context() {
        let prompt = build_prompt("q", &[hit("c")]);
        assert!(prompt.contains("ONLY the provided context"));
        assert!(prompt.contains("does not contain information"));
    }
}
